//! SQLite storage for accounts, posts, media and publish results

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{DbError, Result};
use crate::store::SocialStore;
use crate::types::{
    MediaItem, Platform, PlatformPostResult, PostStatus, SocialAccount, SocialPost, TokenPair,
};

const POST_COLUMNS: &str = "id, user_id, content, content_variants, media_ids, link_url, \
     platforms, status, scheduled_at, posted_at, is_evergreen, evergreen_interval_days, \
     recycle_count, last_recycled_at, created_at";

const ACCOUNT_COLUMNS: &str = "id, user_id, platform, platform_user_id, username, \
     encrypted_access_token, encrypted_refresh_token, token_expires_at, is_active, created_at";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }
        }

        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));
        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        Self::from_pool(pool).await
    }

    /// A private in-memory database, used by tests and dry runs
    pub async fn in_memory() -> Result<Self> {
        // Every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(DbError::SqlxError)?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Set a post's schedule, moving it to Scheduled
    pub async fn schedule_post(&self, post_id: &str, scheduled_at: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE social_posts SET status = 'scheduled', scheduled_at = ?
            WHERE id = ? AND status IN ('draft', 'failed')
            "#,
        )
        .bind(scheduled_at)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SocialStore for Database {
    async fn get_post(&self, post_id: &str) -> Result<Option<SocialPost>> {
        let sql = format!("SELECT {} FROM social_posts WHERE id = ?", POST_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.as_ref().map(post_from_row).transpose()
    }

    async fn insert_post(&self, post: &SocialPost) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(DbError::SqlxError)?;
        write_post(&mut conn, post).await
    }

    async fn begin_publishing(&self, post_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE social_posts SET status = 'publishing'
            WHERE id = ? AND status IN ('draft', 'scheduled')
            "#,
        )
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    async fn finish_publishing(
        &self,
        post_id: &str,
        status: PostStatus,
        posted_at: Option<i64>,
    ) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(DbError::SqlxError)?;
        write_status(&mut conn, post_id, status, posted_at).await
    }

    async fn record_attempt(
        &self,
        post_id: &str,
        results: &[PlatformPostResult],
        status: PostStatus,
        posted_at: Option<i64>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;
        for result in results {
            write_result(&mut tx, result).await?;
        }
        write_status(&mut tx, post_id, status, posted_at).await?;
        tx.commit().await.map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn record_recycle(&self, copy: &SocialPost, original_id: &str, at: i64) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;
        write_post(&mut tx, copy).await?;
        sqlx::query("UPDATE social_posts SET last_recycled_at = ? WHERE id = ?")
            .bind(at)
            .bind(original_id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;
        tx.commit().await.map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn due_posts(&self, now: i64) -> Result<Vec<SocialPost>> {
        let sql = format!(
            "SELECT {} FROM social_posts \
             WHERE status = 'scheduled' AND scheduled_at IS NOT NULL AND scheduled_at <= ? \
             ORDER BY scheduled_at ASC, created_at ASC",
            POST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    async fn active_accounts(
        &self,
        user_id: &str,
        platforms: &[Platform],
    ) -> Result<Vec<SocialAccount>> {
        let sql = format!(
            "SELECT {} FROM social_accounts \
             WHERE user_id = ? AND is_active = 1 ORDER BY created_at ASC",
            ACCOUNT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        let mut accounts = Vec::with_capacity(rows.len());
        for row in &rows {
            let account = account_from_row(row)?;
            if platforms.contains(&account.platform) {
                accounts.push(account);
            }
        }
        Ok(accounts)
    }

    async fn get_account(&self, account_id: &str) -> Result<Option<SocialAccount>> {
        let sql = format!("SELECT {} FROM social_accounts WHERE id = ?", ACCOUNT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_account(
        &self,
        user_id: &str,
        platform: Platform,
        platform_user_id: &str,
    ) -> Result<Option<SocialAccount>> {
        let sql = format!(
            "SELECT {} FROM social_accounts \
             WHERE user_id = ? AND platform = ? AND platform_user_id = ?",
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(platform.as_str())
            .bind(platform_user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn insert_account(&self, account: &SocialAccount) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO social_accounts (
                id, user_id, platform, platform_user_id, username, encrypted_access_token,
                encrypted_refresh_token, token_expires_at, is_active, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.user_id)
        .bind(account.platform.as_str())
        .bind(&account.platform_user_id)
        .bind(&account.username)
        .bind(&account.encrypted_access_token)
        .bind(&account.encrypted_refresh_token)
        .bind(account.token_expires_at)
        .bind(account.is_active)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn update_account_tokens(&self, account_id: &str, tokens: &TokenPair) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE social_accounts
            SET encrypted_access_token = ?,
                encrypted_refresh_token = COALESCE(?, encrypted_refresh_token),
                token_expires_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&tokens.encrypted_access_token)
        .bind(&tokens.encrypted_refresh_token)
        .bind(tokens.expires_at)
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn set_account_active(&self, account_id: &str, active: bool) -> Result<()> {
        sqlx::query("UPDATE social_accounts SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn media_by_ids(&self, ids: &[String]) -> Result<Vec<MediaItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, file_url, mime_type FROM media_items WHERE id IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        let mut by_id: HashMap<String, MediaItem> = rows
            .iter()
            .map(|r| {
                let item = MediaItem {
                    id: r.get("id"),
                    file_url: r.get("file_url"),
                    mime_type: r.get("mime_type"),
                };
                (item.id.clone(), item)
            })
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn insert_media(&self, item: &MediaItem) -> Result<()> {
        sqlx::query("INSERT INTO media_items (id, file_url, mime_type) VALUES (?, ?, ?)")
            .bind(&item.id)
            .bind(&item.file_url)
            .bind(&item.mime_type)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn results_for_post(&self, post_id: &str) -> Result<Vec<PlatformPostResult>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, account_id, platform, outcome, remote_post_id,
                   remote_post_url, error_message, attempted_at
            FROM platform_post_results
            WHERE post_id = ?
            ORDER BY attempted_at ASC, rowid ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| {
                Ok(PlatformPostResult {
                    id: r.get("id"),
                    post_id: r.get("post_id"),
                    account_id: r.get("account_id"),
                    platform: parse_column(r, "platform")?,
                    outcome: parse_column(r, "outcome")?,
                    remote_post_id: r.get("remote_post_id"),
                    remote_post_url: r.get("remote_post_url"),
                    error_message: r.get("error_message"),
                    attempted_at: r.get("attempted_at"),
                })
            })
            .collect()
    }
}

async fn write_post(conn: &mut SqliteConnection, post: &SocialPost) -> Result<()> {
    let variants: HashMap<&str, &String> = post
        .content_variants
        .iter()
        .map(|(platform, text)| (platform.as_str(), text))
        .collect();
    let variants = serde_json::to_string(&variants).map_err(DbError::Serialization)?;
    let media_ids = serde_json::to_string(&post.media_ids).map_err(DbError::Serialization)?;
    let platforms = serde_json::to_string(&post.platforms).map_err(DbError::Serialization)?;

    sqlx::query(
        r#"
        INSERT INTO social_posts (
            id, user_id, content, content_variants, media_ids, link_url, platforms,
            status, scheduled_at, posted_at, is_evergreen, evergreen_interval_days,
            recycle_count, last_recycled_at, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&post.id)
    .bind(&post.user_id)
    .bind(&post.content)
    .bind(variants)
    .bind(media_ids)
    .bind(&post.link_url)
    .bind(platforms)
    .bind(post.status.as_str())
    .bind(post.scheduled_at)
    .bind(post.posted_at)
    .bind(post.is_evergreen)
    .bind(post.evergreen_interval_days.map(i64::from))
    .bind(i64::from(post.recycle_count))
    .bind(post.last_recycled_at)
    .bind(post.created_at)
    .execute(conn)
    .await
    .map_err(DbError::SqlxError)?;

    Ok(())
}

/// Settle a claimed post; posts not in Publishing are left untouched
async fn write_status(
    conn: &mut SqliteConnection,
    post_id: &str,
    status: PostStatus,
    posted_at: Option<i64>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE social_posts SET status = ?, posted_at = COALESCE(?, posted_at)
        WHERE id = ? AND status = 'publishing'
        "#,
    )
    .bind(status.as_str())
    .bind(posted_at)
    .bind(post_id)
    .execute(conn)
    .await
    .map_err(DbError::SqlxError)?;

    Ok(())
}

async fn write_result(conn: &mut SqliteConnection, result: &PlatformPostResult) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO platform_post_results (
            id, post_id, account_id, platform, outcome, remote_post_id,
            remote_post_url, error_message, attempted_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&result.id)
    .bind(&result.post_id)
    .bind(&result.account_id)
    .bind(result.platform.as_str())
    .bind(result.outcome.as_str())
    .bind(&result.remote_post_id)
    .bind(&result.remote_post_url)
    .bind(&result.error_message)
    .bind(result.attempted_at)
    .execute(conn)
    .await
    .map_err(DbError::SqlxError)?;

    Ok(())
}

fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(column);
    raw.parse::<T>()
        .map_err(|e| DbError::CorruptRow(format!("{}: {}", column, e)).into())
}

fn json_column<T: serde::de::DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<T> {
    let raw: String = row.get(column);
    serde_json::from_str(&raw).map_err(|e| DbError::Serialization(e).into())
}

fn post_from_row(r: &SqliteRow) -> Result<SocialPost> {
    let raw_variants: HashMap<String, String> = json_column(r, "content_variants")?;
    let mut content_variants = HashMap::with_capacity(raw_variants.len());
    for (key, text) in raw_variants {
        let platform = key
            .parse::<Platform>()
            .map_err(|e| DbError::CorruptRow(format!("content_variants: {}", e)))?;
        content_variants.insert(platform, text);
    }

    let interval: Option<i64> = r.get("evergreen_interval_days");
    let recycle_count: i64 = r.get("recycle_count");

    Ok(SocialPost {
        id: r.get("id"),
        user_id: r.get("user_id"),
        content: r.get("content"),
        content_variants,
        media_ids: json_column(r, "media_ids")?,
        link_url: r.get("link_url"),
        platforms: json_column(r, "platforms")?,
        status: parse_column(r, "status")?,
        scheduled_at: r.get("scheduled_at"),
        posted_at: r.get("posted_at"),
        is_evergreen: r.get("is_evergreen"),
        evergreen_interval_days: interval.and_then(|days| u32::try_from(days).ok()),
        recycle_count: u32::try_from(recycle_count).unwrap_or(0),
        last_recycled_at: r.get("last_recycled_at"),
        created_at: r.get("created_at"),
    })
}

fn account_from_row(r: &SqliteRow) -> Result<SocialAccount> {
    Ok(SocialAccount {
        id: r.get("id"),
        user_id: r.get("user_id"),
        platform: parse_column(r, "platform")?,
        platform_user_id: r.get("platform_user_id"),
        username: r.get("username"),
        encrypted_access_token: r.get("encrypted_access_token"),
        encrypted_refresh_token: r.get("encrypted_refresh_token"),
        token_expires_at: r.get("token_expires_at"),
        is_active: r.get("is_active"),
        created_at: r.get("created_at"),
    })
}
