//! Mock platform client for testing
//!
//! Simulates successes, failures, slow responses and token refreshes without
//! network access. Clones share their counters, so a test can register one
//! clone with the registry and inspect calls through another.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::PlatformClient;
use crate::types::{
    MediaItem, Platform, PostAnalytics, PostContent, PublishedPost, SocialAccount, TokenPair,
};

/// A call to `publish_post` as the mock saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishCall {
    pub account_id: String,
    pub text: String,
    pub link_url: Option<String>,
    pub media_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub platform: Platform,

    /// Error returned by every publish; `None` means publishes succeed
    pub publish_error: Option<PlatformError>,

    /// Usernames whose publishes fail even when `publish_error` is `None`
    pub failing_usernames: HashSet<String>,

    /// Result of `validate_token`
    pub token_valid: bool,

    /// Whether `refresh_token` is supported at all
    pub supports_refresh: bool,

    /// Error returned by `refresh_token`; `None` means refreshes succeed
    pub refresh_error: Option<PlatformError>,

    /// Latency added before every call completes
    pub delay: Duration,

    /// Analytics returned by `get_analytics`
    pub analytics: PostAnalytics,
}

impl MockConfig {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            publish_error: None,
            failing_usernames: HashSet::new(),
            token_valid: true,
            supports_refresh: true,
            refresh_error: None,
            delay: Duration::ZERO,
            analytics: PostAnalytics::default(),
        }
    }
}

#[derive(Debug, Default)]
struct CallLog {
    publishes: AtomicUsize,
    refreshes: AtomicUsize,
    validations: AtomicUsize,
    deletes: AtomicUsize,
    published: Mutex<Vec<PublishCall>>,
    deleted: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone)]
pub struct MockPlatform {
    config: MockConfig,
    log: Arc<CallLog>,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            log: Arc::new(CallLog::default()),
        }
    }

    /// Every operation succeeds
    pub fn success(platform: Platform) -> Self {
        Self::new(MockConfig::new(platform))
    }

    /// Every publish fails with `error`
    pub fn publish_failure(platform: Platform, error: PlatformError) -> Self {
        let mut config = MockConfig::new(platform);
        config.publish_error = Some(error);
        Self::new(config)
    }

    /// Every publish is rejected as unauthenticated
    pub fn auth_failure(platform: Platform) -> Self {
        Self::publish_failure(
            platform,
            PlatformError::Authentication("mock token rejected".to_string()),
        )
    }

    /// Publishes fail only for the given usernames
    pub fn failing_for(platform: Platform, usernames: &[&str]) -> Self {
        let mut config = MockConfig::new(platform);
        config.failing_usernames = usernames.iter().map(|u| u.to_string()).collect();
        Self::new(config)
    }

    /// Every call waits `delay` before completing
    pub fn with_delay(platform: Platform, delay: Duration) -> Self {
        let mut config = MockConfig::new(platform);
        config.delay = delay;
        Self::new(config)
    }

    /// Refresh is not available, like LinkedIn
    pub fn without_refresh(mut self) -> Self {
        self.config.supports_refresh = false;
        self
    }

    pub fn with_token_valid(mut self, valid: bool) -> Self {
        self.config.token_valid = valid;
        self
    }

    pub fn with_refresh_error(mut self, error: PlatformError) -> Self {
        self.config.refresh_error = Some(error);
        self
    }

    pub fn with_analytics(mut self, analytics: PostAnalytics) -> Self {
        self.config.analytics = analytics;
        self
    }

    pub fn publish_count(&self) -> usize {
        self.log.publishes.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> usize {
        self.log.refreshes.load(Ordering::SeqCst)
    }

    pub fn validate_count(&self) -> usize {
        self.log.validations.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.log.deletes.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<PublishCall> {
        lock(&self.log.published).clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        lock(&self.log.deleted).clone()
    }

    async fn simulate_latency(&self) {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    fn supports_refresh(&self) -> bool {
        self.config.supports_refresh
    }

    async fn validate_token(&self, _account: &SocialAccount) -> bool {
        self.log.validations.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.config.token_valid
    }

    async fn refresh_token(&self, account: &SocialAccount) -> Result<TokenPair> {
        let n = self.log.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        self.simulate_latency().await;

        if !self.config.supports_refresh {
            return Err(PlatformError::RefreshUnsupported(format!(
                "{} has no refresh grant",
                self.config.platform.display_name()
            ))
            .into());
        }
        if let Some(error) = &self.config.refresh_error {
            return Err(error.clone().into());
        }

        Ok(TokenPair {
            encrypted_access_token: format!("mock-refreshed-{}-{}", account.id, n),
            encrypted_refresh_token: None,
            expires_at: Some(chrono::Utc::now().timestamp() + 3600),
        })
    }

    async fn publish_post(
        &self,
        account: &SocialAccount,
        content: &PostContent,
        media: &[MediaItem],
    ) -> Result<PublishedPost> {
        let n = self.log.publishes.fetch_add(1, Ordering::SeqCst) + 1;
        self.simulate_latency().await;

        if let Some(error) = &self.config.publish_error {
            return Err(error.clone().into());
        }
        if self.config.failing_usernames.contains(&account.username) {
            return Err(PlatformError::Api {
                platform: self.config.platform.as_str().to_string(),
                status: 500,
                body: format!("mock failure for {}", account.username),
            }
            .into());
        }

        lock(&self.log.published).push(PublishCall {
            account_id: account.id.clone(),
            text: content.text.clone(),
            link_url: content.link_url.clone(),
            media_ids: media.iter().map(|m| m.id.clone()).collect(),
        });

        let remote_post_id = format!("mock-{}-{}", self.config.platform.as_str(), n);
        Ok(PublishedPost {
            remote_post_url: format!(
                "https://mock.invalid/{}/{}",
                account.username, remote_post_id
            ),
            remote_post_id,
            posted_at: chrono::Utc::now().timestamp(),
        })
    }

    async fn delete_post(&self, _account: &SocialAccount, remote_post_id: &str) -> Result<()> {
        self.log.deletes.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        lock(&self.log.deleted).push(remote_post_id.to_string());
        Ok(())
    }

    async fn get_analytics(
        &self,
        _account: &SocialAccount,
        _remote_post_id: &str,
    ) -> Result<PostAnalytics> {
        self.simulate_latency().await;
        Ok(self.config.analytics)
    }
}
