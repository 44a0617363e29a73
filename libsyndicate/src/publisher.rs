//! Fan-out publishing of one post to every connected account
//!
//! A publish attempt claims the post (`Draft`/`Scheduled` → `Publishing`)
//! before any platform is contacted, publishes to all eligible accounts
//! concurrently, then stores one [`PlatformPostResult`] per account together
//! with the final status: `Published` when at least one account succeeded.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::{PlatformError, Result, SyndicateError};
use crate::evergreen::EvergreenScheduler;
use crate::platforms::{PlatformClient, PlatformRegistry};
use crate::refresh::TokenRefresher;
use crate::store::SocialStore;
use crate::types::{
    MediaItem, Platform, PlatformPostResult, PostAnalytics, PostStatus, SocialAccount, SocialPost,
};

/// Outcome of one `publish_post` call
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub post_id: String,
    pub status: PostStatus,
    pub results: Vec<PlatformPostResult>,
    /// Id of the next evergreen occurrence, when one was scheduled
    pub recycled_post_id: Option<String>,
    /// Why scheduling the next evergreen occurrence failed
    pub recycle_error: Option<String>,
}

impl PublishReport {
    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.is_posted()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.successful()
    }
}

/// Result of removing one remote copy
#[derive(Debug, Clone, Serialize)]
pub struct UnpublishOutcome {
    pub account_id: String,
    pub platform: Platform,
    pub remote_post_id: String,
    pub error: Option<String>,
}

/// Metrics for one remote copy
#[derive(Debug, Clone, Serialize)]
pub struct AccountAnalytics {
    pub account_id: String,
    pub platform: Platform,
    pub remote_post_id: String,
    pub analytics: Option<PostAnalytics>,
    pub error: Option<String>,
}

pub struct Publisher {
    store: Arc<dyn SocialStore>,
    registry: Arc<PlatformRegistry>,
    evergreen: Arc<EvergreenScheduler>,
    refresher: Arc<TokenRefresher>,
    request_timeout: Duration,
    publish_timeout: Duration,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn SocialStore>,
        registry: Arc<PlatformRegistry>,
        evergreen: Arc<EvergreenScheduler>,
        refresher: Arc<TokenRefresher>,
        request_timeout: Duration,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            evergreen,
            refresher,
            request_timeout,
            publish_timeout,
        }
    }

    /// Publish a post to every active account targeted by it
    ///
    /// # Errors
    ///
    /// - `NotFound` if the post does not exist
    /// - `Validation` if the post cannot be claimed (already publishing or
    ///   terminal), has no eligible accounts, or has no content
    /// - store errors after the claim, in which case the post is left `Failed`
    ///
    /// Per-account failures are not errors; they are recorded in the report.
    pub async fn publish_post(&self, post_id: &str) -> Result<PublishReport> {
        let post = self
            .store
            .get_post(post_id)
            .await?
            .ok_or_else(|| SyndicateError::NotFound(format!("post {}", post_id)))?;

        if !post.status.can_transition_to(PostStatus::Publishing)
            || !self.store.begin_publishing(post_id).await?
        {
            return Err(SyndicateError::Validation(format!(
                "post {} cannot be published from its current state",
                post_id
            )));
        }

        match self.publish_claimed(&post).await {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!(post = %post.id, "Publish aborted: {}", e);
                if let Err(mark_err) = self
                    .store
                    .finish_publishing(&post.id, PostStatus::Failed, None)
                    .await
                {
                    tracing::error!(post = %post.id, "Could not mark post failed: {}", mark_err);
                }
                Err(e)
            }
        }
    }

    async fn publish_claimed(&self, post: &SocialPost) -> Result<PublishReport> {
        let accounts = self
            .store
            .active_accounts(&post.user_id, &post.platforms)
            .await?;

        if accounts.is_empty() {
            return Err(SyndicateError::Validation(format!(
                "post {} has no active accounts for its target platforms",
                post.id
            )));
        }
        if !post.has_publishable_content() {
            return Err(SyndicateError::Validation(format!(
                "post {} has no text or media",
                post.id
            )));
        }

        let media = self.load_media(post).await;

        info!(
            post = %post.id,
            accounts = accounts.len(),
            media = media.len(),
            "Publishing post"
        );

        let results = join_all(
            accounts
                .iter()
                .map(|account| self.publish_to_account(post, account, &media)),
        )
        .await;

        let now = chrono::Utc::now().timestamp();
        let published = results.iter().any(PlatformPostResult::is_posted);
        let status = if published {
            PostStatus::Published
        } else {
            PostStatus::Failed
        };
        self.store
            .record_attempt(&post.id, &results, status, published.then_some(now))
            .await?;

        let mut report = PublishReport {
            post_id: post.id.clone(),
            status,
            results,
            recycled_post_id: None,
            recycle_error: None,
        };

        info!(
            post = %post.id,
            status = %status,
            successful = report.successful(),
            failed = report.failed(),
            "Publish finished"
        );

        if published && post.is_evergreen {
            match self.evergreen.recycle(post, now).await {
                Ok(next) => report.recycled_post_id = Some(next.id),
                Err(e) => {
                    warn!(post = %post.id, "Evergreen recycle failed: {}", e);
                    report.recycle_error = Some(e.to_string());
                }
            }
        }

        Ok(report)
    }

    /// Media referenced by the post; lookup failures degrade to none
    async fn load_media(&self, post: &SocialPost) -> Vec<MediaItem> {
        if post.media_ids.is_empty() {
            return Vec::new();
        }
        match self.store.media_by_ids(&post.media_ids).await {
            Ok(items) => {
                if items.len() < post.media_ids.len() {
                    warn!(
                        post = %post.id,
                        "{} of {} media items are missing",
                        post.media_ids.len() - items.len(),
                        post.media_ids.len()
                    );
                }
                items
            }
            Err(e) => {
                warn!(post = %post.id, "Media lookup failed, publishing without media: {}", e);
                Vec::new()
            }
        }
    }

    async fn publish_to_account(
        &self,
        post: &SocialPost,
        account: &SocialAccount,
        media: &[MediaItem],
    ) -> PlatformPostResult {
        if !post.has_content_for(account.platform) {
            warn!(account = %account.id, platform = %account.platform, "Nothing to publish");
            return PlatformPostResult::failed(
                &post.id,
                account,
                format!("no content for {}", account.platform.display_name()),
            );
        }

        let client = match self.registry.get(account.platform) {
            Ok(client) => client,
            Err(e) => {
                warn!(account = %account.id, "{}", e);
                return PlatformPostResult::failed(&post.id, account, e.to_string());
            }
        };

        let mut account = account.clone();
        if account.token_expired(chrono::Utc::now().timestamp()) && client.supports_refresh() {
            match self.refresh_bounded(client.as_ref(), &account).await {
                Ok(updated) => account = updated,
                Err(e) => {
                    warn!(account = %account.id, "Token refresh before publish failed: {}", e);
                    return PlatformPostResult::failed(
                        &post.id,
                        &account,
                        format!("token refresh failed: {}", e),
                    );
                }
            }
        }

        let content = post.content_for(account.platform);
        let attempt = timeout(
            self.publish_timeout,
            client.publish_post(&account, &content, media),
        )
        .await;

        match attempt {
            Ok(Ok(published)) => {
                info!(
                    account = %account.id,
                    platform = %account.platform,
                    remote_id = %published.remote_post_id,
                    "Published"
                );
                PlatformPostResult::posted(&post.id, &account, published)
            }
            Ok(Err(e)) => {
                warn!(account = %account.id, platform = %account.platform, "Publish failed: {}", e);
                if e.is_authentication() && client.supports_refresh() {
                    // Only the stored token is repaired; this attempt stays failed
                    if let Err(refresh_err) = self.refresh_bounded(client.as_ref(), &account).await
                    {
                        warn!(account = %account.id, "Token refresh after auth failure failed: {}", refresh_err);
                    }
                }
                PlatformPostResult::failed(&post.id, &account, e.to_string())
            }
            Err(_) => {
                let e = PlatformError::Timeout(format!(
                    "{} publish exceeded {:?}",
                    account.platform.display_name(),
                    self.publish_timeout
                ));
                warn!(account = %account.id, "{}", e);
                PlatformPostResult::failed(&post.id, &account, e.to_string())
            }
        }
    }

    async fn refresh_bounded(
        &self,
        client: &dyn PlatformClient,
        account: &SocialAccount,
    ) -> Result<SocialAccount> {
        timeout(self.request_timeout, self.refresher.refresh(client, account))
            .await
            .unwrap_or_else(|_| {
                Err(PlatformError::Timeout(format!(
                    "{} token refresh exceeded {:?}",
                    account.platform.display_name(),
                    self.request_timeout
                ))
                .into())
            })
    }

    /// Posted results of a post together with the accounts they belong to
    async fn posted_copies(
        &self,
        post_id: &str,
    ) -> Result<Vec<(PlatformPostResult, Option<SocialAccount>)>> {
        if self.store.get_post(post_id).await?.is_none() {
            return Err(SyndicateError::NotFound(format!("post {}", post_id)));
        }

        let mut copies = Vec::new();
        for result in self.store.results_for_post(post_id).await? {
            if result.is_posted() && result.remote_post_id.is_some() {
                let account = self.store.get_account(&result.account_id).await?;
                copies.push((result, account));
            }
        }
        Ok(copies)
    }

    /// Delete every remote copy of a published post
    pub async fn unpublish(&self, post_id: &str) -> Result<Vec<UnpublishOutcome>> {
        let copies = self.posted_copies(post_id).await?;

        let outcomes = join_all(copies.into_iter().map(|(result, account)| async move {
            let remote_post_id = result.remote_post_id.clone().unwrap_or_default();
            let error = match account {
                Some(account) => match self.registry.get(result.platform) {
                    Ok(client) => {
                        match timeout(
                            self.request_timeout,
                            client.delete_post(&account, &remote_post_id),
                        )
                        .await
                        {
                            Ok(Ok(())) => None,
                            Ok(Err(e)) => Some(e.to_string()),
                            Err(_) => Some("delete timed out".to_string()),
                        }
                    }
                    Err(e) => Some(e.to_string()),
                },
                None => Some(format!("account {} no longer exists", result.account_id)),
            };

            if let Some(error) = &error {
                warn!(post = %result.post_id, remote_id = %remote_post_id, "Delete failed: {}", error);
            }
            UnpublishOutcome {
                account_id: result.account_id,
                platform: result.platform,
                remote_post_id,
                error,
            }
        }))
        .await;

        Ok(outcomes)
    }

    /// Fetch metrics for every remote copy of a published post
    pub async fn collect_analytics(&self, post_id: &str) -> Result<Vec<AccountAnalytics>> {
        let copies = self.posted_copies(post_id).await?;

        let collected = join_all(copies.into_iter().map(|(result, account)| async move {
            let remote_post_id = result.remote_post_id.clone().unwrap_or_default();
            let outcome = match account {
                Some(account) => match self.registry.get(result.platform) {
                    Ok(client) => {
                        match timeout(
                            self.request_timeout,
                            client.get_analytics(&account, &remote_post_id),
                        )
                        .await
                        {
                            Ok(outcome) => outcome.map_err(|e| e.to_string()),
                            Err(_) => Err("analytics request timed out".to_string()),
                        }
                    }
                    Err(e) => Err(e.to_string()),
                },
                None => Err(format!("account {} no longer exists", result.account_id)),
            };

            let (analytics, error) = match outcome {
                Ok(analytics) => (Some(analytics), None),
                Err(e) => (None, Some(e)),
            };
            AccountAnalytics {
                account_id: result.account_id,
                platform: result.platform,
                remote_post_id,
                analytics,
                error,
            }
        }))
        .await;

        Ok(collected)
    }
}
