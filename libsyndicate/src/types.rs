//! Core types for Syndicate

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Seconds before expiry at which a token is treated as expired.
pub const TOKEN_EXPIRY_SKEW_SECS: i64 = 60;

/// Social platforms an account can be connected to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    LinkedIn,
    Facebook,
    Instagram,
    Threads,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Twitter,
        Platform::LinkedIn,
        Platform::Facebook,
        Platform::Instagram,
        Platform::Threads,
    ];

    /// Lowercase storage identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::LinkedIn => "linkedin",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::Threads => "threads",
        }
    }

    /// Human-readable name for messages
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Twitter => "Twitter",
            Platform::LinkedIn => "LinkedIn",
            Platform::Facebook => "Facebook",
            Platform::Instagram => "Instagram",
            Platform::Threads => "Threads",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "twitter" | "x" => Ok(Platform::Twitter),
            "linkedin" => Ok(Platform::LinkedIn),
            "facebook" => Ok(Platform::Facebook),
            "instagram" => Ok(Platform::Instagram),
            "threads" => Ok(Platform::Threads),
            other => Err(format!("Unknown platform: '{}'", other)),
        }
    }
}

/// Lifecycle of a post
///
/// `Draft -> Scheduled -> Publishing -> {Published, Failed}`. A draft may be
/// published immediately, and a failed post may be rescheduled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Publishing,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Publishing => "publishing",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: PostStatus) -> bool {
        use PostStatus::*;
        matches!(
            (self, next),
            (Draft, Scheduled)
                | (Draft, Publishing)
                | (Scheduled, Publishing)
                | (Scheduled, Draft)
                | (Publishing, Published)
                | (Publishing, Failed)
                | (Failed, Scheduled)
        )
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "scheduled" => Ok(PostStatus::Scheduled),
            "publishing" => Ok(PostStatus::Publishing),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            other => Err(format!("Unknown post status: '{}'", other)),
        }
    }
}

/// Encrypted OAuth credentials produced by a code exchange or a refresh
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub encrypted_access_token: String,
    pub encrypted_refresh_token: Option<String>,
    pub expires_at: Option<i64>,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("encrypted_access_token", &"[redacted]")
            .field(
                "encrypted_refresh_token",
                &self.encrypted_refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A connected platform account
///
/// Tokens are held in their encrypted wire form only.
#[derive(Clone)]
pub struct SocialAccount {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    pub platform_user_id: String,
    pub username: String,
    pub encrypted_access_token: String,
    pub encrypted_refresh_token: Option<String>,
    pub token_expires_at: Option<i64>,
    pub is_active: bool,
    pub created_at: i64,
}

impl SocialAccount {
    /// Create an active account from a fresh token pair
    pub fn new(
        user_id: String,
        platform: Platform,
        platform_user_id: String,
        username: String,
        tokens: TokenPair,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            platform,
            platform_user_id,
            username,
            encrypted_access_token: tokens.encrypted_access_token,
            encrypted_refresh_token: tokens.encrypted_refresh_token,
            token_expires_at: tokens.expires_at,
            is_active: true,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// True when the access token is expired (or about to be) at `now`
    pub fn token_expired(&self, now: i64) -> bool {
        self.token_expires_at
            .is_some_and(|expires_at| expires_at <= now + TOKEN_EXPIRY_SKEW_SECS)
    }

    /// Replace the stored tokens with a refreshed pair
    pub fn apply_tokens(&mut self, tokens: TokenPair) {
        self.encrypted_access_token = tokens.encrypted_access_token;
        if tokens.encrypted_refresh_token.is_some() {
            self.encrypted_refresh_token = tokens.encrypted_refresh_token;
        }
        self.token_expires_at = tokens.expires_at;
    }
}

impl fmt::Debug for SocialAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocialAccount")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("platform", &self.platform)
            .field("platform_user_id", &self.platform_user_id)
            .field("username", &self.username)
            .field("token_expires_at", &self.token_expires_at)
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}

/// An authored post and its scheduling state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SocialPost {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub content_variants: HashMap<Platform, String>,
    pub media_ids: Vec<String>,
    pub link_url: Option<String>,
    pub platforms: Vec<Platform>,
    pub status: PostStatus,
    pub scheduled_at: Option<i64>,
    pub posted_at: Option<i64>,
    pub is_evergreen: bool,
    pub evergreen_interval_days: Option<u32>,
    pub recycle_count: u32,
    pub last_recycled_at: Option<i64>,
    pub created_at: i64,
}

impl SocialPost {
    pub fn new(user_id: String, content: String, platforms: Vec<Platform>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            content,
            content_variants: HashMap::new(),
            media_ids: Vec::new(),
            link_url: None,
            platforms,
            status: PostStatus::Draft,
            scheduled_at: None,
            posted_at: None,
            is_evergreen: false,
            evergreen_interval_days: None,
            recycle_count: 0,
            last_recycled_at: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Content for one platform, using its override text when present
    pub fn content_for(&self, platform: Platform) -> PostContent {
        let text = self
            .content_variants
            .get(&platform)
            .filter(|variant| !variant.trim().is_empty())
            .unwrap_or(&self.content)
            .clone();

        PostContent {
            text,
            link_url: self.link_url.clone(),
        }
    }

    /// Whether `platform` would receive text or at least one media item
    pub fn has_content_for(&self, platform: Platform) -> bool {
        !self.content_for(platform).text.trim().is_empty() || !self.media_ids.is_empty()
    }

    /// At least one target platform has something to publish
    pub fn has_publishable_content(&self) -> bool {
        self.platforms.iter().any(|p| self.has_content_for(*p))
    }
}

/// Resolved per-platform content handed to a platform client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostContent {
    pub text: String,
    pub link_url: Option<String>,
}

impl PostContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            link_url: None,
        }
    }

    /// Text with the link appended on its own paragraph unless already present
    pub fn text_with_link(&self) -> String {
        match &self.link_url {
            Some(link) if !link.is_empty() && !self.text.contains(link.as_str()) => {
                if self.text.trim().is_empty() {
                    link.clone()
                } else {
                    format!("{}\n\n{}", self.text, link)
                }
            }
            _ => self.text.clone(),
        }
    }
}

/// A media library item referenced by a post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaItem {
    pub id: String,
    pub file_url: String,
    pub mime_type: String,
}

impl MediaItem {
    pub fn new(file_url: String, mime_type: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            file_url,
            mime_type,
        }
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }

    pub fn is_gif(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case("image/gif")
    }
}

/// What a platform returned for a successful publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPost {
    pub remote_post_id: String,
    pub remote_post_url: String,
    pub posted_at: i64,
}

/// Engagement metrics for a published post
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostAnalytics {
    pub impressions: u64,
    pub engagements: u64,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub clicks: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PublishOutcome {
    Posted,
    Failed,
}

impl PublishOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishOutcome::Posted => "posted",
            PublishOutcome::Failed => "failed",
        }
    }
}

impl FromStr for PublishOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "posted" => Ok(PublishOutcome::Posted),
            "failed" => Ok(PublishOutcome::Failed),
            other => Err(format!("Unknown publish outcome: '{}'", other)),
        }
    }
}

/// Immutable record of one publish attempt for one account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformPostResult {
    pub id: String,
    pub post_id: String,
    pub account_id: String,
    pub platform: Platform,
    pub outcome: PublishOutcome,
    pub remote_post_id: Option<String>,
    pub remote_post_url: Option<String>,
    pub error_message: Option<String>,
    pub attempted_at: i64,
}

impl PlatformPostResult {
    pub fn posted(post_id: &str, account: &SocialAccount, published: PublishedPost) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            post_id: post_id.to_string(),
            account_id: account.id.clone(),
            platform: account.platform,
            outcome: PublishOutcome::Posted,
            remote_post_id: Some(published.remote_post_id),
            remote_post_url: Some(published.remote_post_url),
            error_message: None,
            attempted_at: published.posted_at,
        }
    }

    pub fn failed(post_id: &str, account: &SocialAccount, error: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            post_id: post_id.to_string(),
            account_id: account.id.clone(),
            platform: account.platform,
            outcome: PublishOutcome::Failed,
            remote_post_id: None,
            remote_post_url: None,
            error_message: Some(error),
            attempted_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn is_posted(&self) -> bool {
        self.outcome == PublishOutcome::Posted
    }
}
