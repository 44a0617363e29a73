//! Persistence seam for the publishing engine
//!
//! The publisher, scheduler and refresher only see this trait, so tests can
//! wrap or replace the SQLite implementation in [`crate::db::Database`].

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    MediaItem, Platform, PlatformPostResult, PostStatus, SocialAccount, SocialPost, TokenPair,
};

#[async_trait]
pub trait SocialStore: Send + Sync {
    async fn get_post(&self, post_id: &str) -> Result<Option<SocialPost>>;

    async fn insert_post(&self, post: &SocialPost) -> Result<()>;

    /// Atomically move a post from Draft or Scheduled to Publishing
    ///
    /// Returns `false` when the post is missing or in any other state, which
    /// means another attempt already owns it.
    async fn begin_publishing(&self, post_id: &str) -> Result<bool>;

    /// Record the terminal status of a publish attempt
    async fn finish_publishing(
        &self,
        post_id: &str,
        status: PostStatus,
        posted_at: Option<i64>,
    ) -> Result<()>;

    /// Store every per-account result of an attempt and settle the post
    ///
    /// All of `results` and the status change are written together or not
    /// at all. The status only changes while the post is still Publishing.
    async fn record_attempt(
        &self,
        post_id: &str,
        results: &[PlatformPostResult],
        status: PostStatus,
        posted_at: Option<i64>,
    ) -> Result<()>;

    /// Insert the next evergreen occurrence and stamp `original_id` as
    /// recycled at `at`, as one unit
    async fn record_recycle(&self, copy: &SocialPost, original_id: &str, at: i64) -> Result<()>;

    /// Scheduled posts whose `scheduled_at` is at or before `now`, oldest first
    async fn due_posts(&self, now: i64) -> Result<Vec<SocialPost>>;

    /// Active accounts of `user_id` on any of `platforms`
    async fn active_accounts(
        &self,
        user_id: &str,
        platforms: &[Platform],
    ) -> Result<Vec<SocialAccount>>;

    async fn get_account(&self, account_id: &str) -> Result<Option<SocialAccount>>;

    /// Account by its natural key, active or not
    async fn find_account(
        &self,
        user_id: &str,
        platform: Platform,
        platform_user_id: &str,
    ) -> Result<Option<SocialAccount>>;

    async fn insert_account(&self, account: &SocialAccount) -> Result<()>;

    async fn update_account_tokens(&self, account_id: &str, tokens: &TokenPair) -> Result<()>;

    async fn set_account_active(&self, account_id: &str, active: bool) -> Result<()>;

    /// Media items with the given ids, in the order the ids were given
    async fn media_by_ids(&self, ids: &[String]) -> Result<Vec<MediaItem>>;

    async fn insert_media(&self, item: &MediaItem) -> Result<()>;

    async fn results_for_post(&self, post_id: &str) -> Result<Vec<PlatformPostResult>>;
}
