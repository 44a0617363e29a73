//! Shared fixtures for the engine integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use libsyndicate::evergreen::EvergreenScheduler;
use libsyndicate::platforms::mock::MockPlatform;
use libsyndicate::refresh::TokenRefresher;
use libsyndicate::types::{MediaItem, PlatformPostResult};
use libsyndicate::{
    Database, Dispatcher, Platform, PlatformRegistry, PostStatus, Publisher, Result,
    SocialAccount, SocialPost, SocialStore, TokenPair,
};

pub const USER: &str = "user-1";

/// Publisher, dispatcher and store over an in-memory database
pub struct Harness {
    pub db: Arc<Database>,
    pub publisher: Arc<Publisher>,
    pub dispatcher: Dispatcher,
}

impl Harness {
    pub async fn new(clients: Vec<MockPlatform>) -> Self {
        Self::with_timeout(clients, Duration::from_secs(5)).await
    }

    /// Same bound for one request and for a whole per-account publish
    pub async fn with_timeout(clients: Vec<MockPlatform>, request_timeout: Duration) -> Self {
        Self::with_timeouts(clients, request_timeout, request_timeout).await
    }

    pub async fn with_timeouts(
        clients: Vec<MockPlatform>,
        request_timeout: Duration,
        publish_timeout: Duration,
    ) -> Self {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let store: Arc<dyn SocialStore> = db.clone();
        Self::build(db, store, clients, request_timeout, publish_timeout)
    }

    /// Publisher over `wrap(db)` instead of the database itself
    pub async fn with_store<F>(clients: Vec<MockPlatform>, wrap: F) -> Self
    where
        F: FnOnce(Arc<Database>) -> Arc<dyn SocialStore>,
    {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let store = wrap(db.clone());
        let timeout = Duration::from_secs(5);
        Self::build(db, store, clients, timeout, timeout)
    }

    fn build(
        db: Arc<Database>,
        store: Arc<dyn SocialStore>,
        clients: Vec<MockPlatform>,
        request_timeout: Duration,
        publish_timeout: Duration,
    ) -> Self {
        let mut registry = PlatformRegistry::new();
        for client in clients {
            registry.register(Arc::new(client));
        }

        let publisher = Arc::new(Publisher::new(
            store.clone(),
            Arc::new(registry),
            Arc::new(EvergreenScheduler::new(store.clone(), 30)),
            Arc::new(TokenRefresher::new(store.clone())),
            request_timeout,
            publish_timeout,
        ));
        let dispatcher = Dispatcher::new(store, publisher.clone(), 2);

        Self {
            db,
            publisher,
            dispatcher,
        }
    }

    /// Insert an active account for `USER`
    pub async fn account(&self, platform: Platform, username: &str) -> SocialAccount {
        self.account_expiring(platform, username, None).await
    }

    pub async fn account_expiring(
        &self,
        platform: Platform,
        username: &str,
        expires_at: Option<i64>,
    ) -> SocialAccount {
        let account = SocialAccount::new(
            USER.to_string(),
            platform,
            format!("{}-{}", platform, username),
            username.to_string(),
            TokenPair {
                encrypted_access_token: format!("access-{}", username),
                encrypted_refresh_token: Some(format!("refresh-{}", username)),
                expires_at,
            },
        );
        self.db.insert_account(&account).await.unwrap();
        account
    }

    /// Insert a draft post for `USER` targeting `platforms`
    pub async fn draft(&self, content: &str, platforms: &[Platform]) -> SocialPost {
        let post = SocialPost::new(USER.to_string(), content.to_string(), platforms.to_vec());
        self.db.insert_post(&post).await.unwrap();
        post
    }

    /// Insert a post scheduled at `at`
    pub async fn scheduled(&self, content: &str, platforms: &[Platform], at: i64) -> SocialPost {
        let mut post = SocialPost::new(USER.to_string(), content.to_string(), platforms.to_vec());
        post.status = PostStatus::Scheduled;
        post.scheduled_at = Some(at);
        self.db.insert_post(&post).await.unwrap();
        post
    }

    pub async fn status(&self, post_id: &str) -> PostStatus {
        self.db.get_post(post_id).await.unwrap().unwrap().status
    }
}

/// Store that slips a result for a nonexistent post into every attempt,
/// so the final write fails after the real results went in
pub struct OrphanResultStore {
    inner: Arc<Database>,
}

impl OrphanResultStore {
    pub fn wrap(inner: Arc<Database>) -> Arc<dyn SocialStore> {
        Arc::new(Self { inner })
    }
}

#[async_trait]
impl SocialStore for OrphanResultStore {
    async fn get_post(&self, post_id: &str) -> Result<Option<SocialPost>> {
        self.inner.get_post(post_id).await
    }

    async fn insert_post(&self, post: &SocialPost) -> Result<()> {
        self.inner.insert_post(post).await
    }

    async fn begin_publishing(&self, post_id: &str) -> Result<bool> {
        self.inner.begin_publishing(post_id).await
    }

    async fn finish_publishing(
        &self,
        post_id: &str,
        status: PostStatus,
        posted_at: Option<i64>,
    ) -> Result<()> {
        self.inner.finish_publishing(post_id, status, posted_at).await
    }

    async fn record_attempt(
        &self,
        post_id: &str,
        results: &[PlatformPostResult],
        status: PostStatus,
        posted_at: Option<i64>,
    ) -> Result<()> {
        let mut results = results.to_vec();
        if let Some(first) = results.first() {
            let mut orphan = first.clone();
            orphan.id = format!("{}-orphan", first.id);
            orphan.post_id = "no-such-post".to_string();
            results.push(orphan);
        }
        self.inner
            .record_attempt(post_id, &results, status, posted_at)
            .await
    }

    async fn record_recycle(&self, copy: &SocialPost, original_id: &str, at: i64) -> Result<()> {
        self.inner.record_recycle(copy, original_id, at).await
    }

    async fn due_posts(&self, now: i64) -> Result<Vec<SocialPost>> {
        self.inner.due_posts(now).await
    }

    async fn active_accounts(
        &self,
        user_id: &str,
        platforms: &[Platform],
    ) -> Result<Vec<SocialAccount>> {
        self.inner.active_accounts(user_id, platforms).await
    }

    async fn get_account(&self, account_id: &str) -> Result<Option<SocialAccount>> {
        self.inner.get_account(account_id).await
    }

    async fn find_account(
        &self,
        user_id: &str,
        platform: Platform,
        platform_user_id: &str,
    ) -> Result<Option<SocialAccount>> {
        self.inner
            .find_account(user_id, platform, platform_user_id)
            .await
    }

    async fn insert_account(&self, account: &SocialAccount) -> Result<()> {
        self.inner.insert_account(account).await
    }

    async fn update_account_tokens(&self, account_id: &str, tokens: &TokenPair) -> Result<()> {
        self.inner.update_account_tokens(account_id, tokens).await
    }

    async fn set_account_active(&self, account_id: &str, active: bool) -> Result<()> {
        self.inner.set_account_active(account_id, active).await
    }

    async fn media_by_ids(&self, ids: &[String]) -> Result<Vec<MediaItem>> {
        self.inner.media_by_ids(ids).await
    }

    async fn insert_media(&self, item: &MediaItem) -> Result<()> {
        self.inner.insert_media(item).await
    }

    async fn results_for_post(&self, post_id: &str) -> Result<Vec<PlatformPostResult>> {
        self.inner.results_for_post(post_id).await
    }
}
