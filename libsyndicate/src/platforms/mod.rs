//! Platform clients
//!
//! Every supported social network is wrapped behind [`PlatformClient`] so the
//! publisher can fan a post out without knowing which API it is talking to.
//! Clients never store tokens themselves: each call receives the account with
//! its encrypted tokens and decrypts them only for the duration of the request.
//!
//! ```no_run
//! use std::sync::Arc;
//! use libsyndicate::platforms::{PlatformClient, twitter::TwitterClient};
//! use libsyndicate::types::{PostContent, SocialAccount};
//! use libsyndicate::TokenCipher;
//!
//! # async fn example(account: SocialAccount) -> libsyndicate::Result<()> {
//! let cipher = Arc::new(TokenCipher::from_env()?);
//! let client = TwitterClient::new(cipher, None)?;
//!
//! if client.validate_token(&account).await {
//!     let published = client
//!         .publish_post(&account, &PostContent::new("Hello from Syndicate"), &[])
//!         .await?;
//!     println!("Posted: {}", published.remote_post_url);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    MediaItem, Platform, PostAnalytics, PostContent, PublishedPost, SocialAccount, TokenPair,
};

pub mod http;
pub mod linkedin;
pub mod registry;
pub mod twitter;

// Available outside of tests so integration tests and dry runs can use it
pub mod mock;

pub use registry::PlatformRegistry;

/// Common interface over a social platform's REST API
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Which platform this client talks to
    fn platform(&self) -> Platform;

    /// Whether [`refresh_token`](Self::refresh_token) can ever succeed
    fn supports_refresh(&self) -> bool {
        true
    }

    /// Check that the account's access token is still accepted
    ///
    /// Never fails: any error (including a token that cannot be decrypted)
    /// is reported as `false`.
    async fn validate_token(&self, account: &SocialAccount) -> bool;

    /// Exchange the account's refresh token for a new token pair
    ///
    /// The returned pair is already encrypted and ready to persist.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::RefreshUnsupported` for platforms without a
    /// refresh grant and `PlatformError::Authentication` when the account
    /// has no refresh token or the platform rejects it.
    async fn refresh_token(&self, account: &SocialAccount) -> Result<TokenPair>;

    /// Publish content (and optional media) on behalf of the account
    async fn publish_post(
        &self,
        account: &SocialAccount,
        content: &PostContent,
        media: &[MediaItem],
    ) -> Result<PublishedPost>;

    /// Remove a previously published post
    async fn delete_post(&self, account: &SocialAccount, remote_post_id: &str) -> Result<()>;

    /// Engagement metrics for a previously published post
    async fn get_analytics(
        &self,
        account: &SocialAccount,
        remote_post_id: &str,
    ) -> Result<PostAnalytics>;
}
