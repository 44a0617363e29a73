//! Twitter/X client over the v2 REST API
//!
//! Media goes through the v1.1 chunked upload endpoint (INIT, APPEND,
//! FINALIZE) before the tweet referencing it is created.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::cipher::TokenCipher;
use crate::error::{ConfigError, PlatformError, Result};
use crate::oauth::{refresh_grant, OAuthCredentials, OAuthEndpoints};
use crate::platforms::http::{
    access_token, build_client, ensure_success, fetch_media, map_transport_error, read_json,
    DEFAULT_TIMEOUT,
};
use crate::platforms::PlatformClient;
use crate::types::{
    MediaItem, Platform, PostAnalytics, PostContent, PublishedPost, SocialAccount, TokenPair,
};

pub const TWITTER_API_BASE: &str = "https://api.twitter.com";
pub const TWITTER_UPLOAD_BASE: &str = "https://upload.twitter.com";

/// Tweet length limit in characters
pub const MAX_TWEET_CHARS: usize = 280;
/// Media items allowed on one tweet
pub const MAX_MEDIA: usize = 4;

const TRUNCATION_SUFFIX: &str = "...";
const APPEND_CHUNK_BYTES: usize = 1024 * 1024;
const MAX_STATUS_POLLS: u32 = 10;

#[derive(Debug, Serialize)]
struct CreateTweetRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<TweetMedia>,
}

#[derive(Debug, Serialize)]
struct TweetMedia {
    media_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct CreatedTweet {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DeletedTweet {
    deleted: bool,
}

#[derive(Debug, Deserialize)]
struct TweetWithMetrics {
    #[serde(default)]
    public_metrics: PublicMetrics,
}

#[derive(Debug, Default, Deserialize)]
struct PublicMetrics {
    #[serde(default)]
    retweet_count: u64,
    #[serde(default)]
    reply_count: u64,
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    quote_count: u64,
    #[serde(default)]
    impression_count: u64,
}

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    media_id_string: String,
    #[serde(default)]
    processing_info: Option<ProcessingInfo>,
}

#[derive(Debug, Deserialize)]
struct ProcessingInfo {
    state: String,
    #[serde(default)]
    check_after_secs: Option<u64>,
    #[serde(default)]
    error: Option<ProcessingError>,
}

#[derive(Debug, Deserialize)]
struct ProcessingError {
    #[serde(default)]
    message: Option<String>,
}

/// Cut text to the tweet limit, appending the link first when there is one
pub fn format_tweet(content: &PostContent) -> String {
    let text = content.text_with_link();
    if text.chars().count() <= MAX_TWEET_CHARS {
        return text;
    }
    let keep = MAX_TWEET_CHARS - TRUNCATION_SUFFIX.chars().count();
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_SUFFIX);
    truncated
}

/// Public URL of a tweet
pub fn tweet_url(username: &str, tweet_id: &str) -> String {
    format!("https://x.com/{}/status/{}", username, tweet_id)
}

fn media_category(item: &MediaItem) -> &'static str {
    if item.is_gif() {
        "tweet_gif"
    } else if item.is_video() {
        "tweet_video"
    } else {
        "tweet_image"
    }
}

pub struct TwitterClient {
    http: reqwest::Client,
    cipher: Arc<TokenCipher>,
    credentials: Option<OAuthCredentials>,
    api_base: String,
    upload_base: String,
    token_url: String,
}

impl TwitterClient {
    pub fn new(cipher: Arc<TokenCipher>, credentials: Option<OAuthCredentials>) -> Result<Self> {
        Self::with_timeout(cipher, credentials, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        cipher: Arc<TokenCipher>,
        credentials: Option<OAuthCredentials>,
        timeout: Duration,
    ) -> Result<Self> {
        let token_url = OAuthEndpoints::for_platform(Platform::Twitter)
            .map(|e| e.token_url)
            .unwrap_or_default();

        Ok(Self {
            http: build_client(timeout)?,
            cipher,
            credentials,
            api_base: TWITTER_API_BASE.to_string(),
            upload_base: TWITTER_UPLOAD_BASE.to_string(),
            token_url,
        })
    }

    /// Send API and upload calls to other hosts
    pub fn with_base_urls(mut self, api_base: &str, upload_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.upload_base = upload_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_token_url(mut self, token_url: &str) -> Self {
        self.token_url = token_url.to_string();
        self
    }

    fn upload_url(&self) -> String {
        format!("{}/1.1/media/upload.json", self.upload_base)
    }

    async fn upload_command(
        &self,
        token: &SecretString,
        form: &[(&str, String)],
    ) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(self.upload_url())
            .bearer_auth(token.expose_secret())
            .form(form)
            .send()
            .await
            .map_err(|e| map_transport_error(Platform::Twitter, "media upload", e))?;
        ensure_success(Platform::Twitter, response).await
    }

    /// Upload one media item and return its media id
    async fn upload_media(&self, token: &SecretString, item: &MediaItem) -> Result<String> {
        let bytes = fetch_media(&self.http, Platform::Twitter, item).await?;

        let init = self
            .upload_command(
                token,
                &[
                    ("command", "INIT".to_string()),
                    ("total_bytes", bytes.len().to_string()),
                    ("media_type", item.mime_type.clone()),
                    ("media_category", media_category(item).to_string()),
                ],
            )
            .await?;
        let init: MediaUploadResponse = parse_body(init, "media INIT").await?;
        let media_id = init.media_id_string;

        for (index, chunk) in bytes.chunks(APPEND_CHUNK_BYTES).enumerate() {
            self.upload_command(
                token,
                &[
                    ("command", "APPEND".to_string()),
                    ("media_id", media_id.clone()),
                    ("segment_index", index.to_string()),
                    ("media_data", STANDARD.encode(chunk)),
                ],
            )
            .await?;
        }

        let finalize = self
            .upload_command(
                token,
                &[
                    ("command", "FINALIZE".to_string()),
                    ("media_id", media_id.clone()),
                ],
            )
            .await?;
        let finalize: MediaUploadResponse = parse_body(finalize, "media FINALIZE").await?;

        if let Some(info) = finalize.processing_info {
            self.wait_for_processing(token, &media_id, info).await?;
        }

        tracing::debug!(media_id = %media_id, item = %item.id, "Uploaded media to Twitter");
        Ok(media_id)
    }

    /// Poll STATUS until async media processing (video, GIF) completes
    async fn wait_for_processing(
        &self,
        token: &SecretString,
        media_id: &str,
        mut info: ProcessingInfo,
    ) -> Result<()> {
        for _ in 0..MAX_STATUS_POLLS {
            match info.state.as_str() {
                "succeeded" => return Ok(()),
                "failed" => {
                    let message = info
                        .error
                        .and_then(|e| e.message)
                        .unwrap_or_else(|| "processing failed".to_string());
                    return Err(PlatformError::Validation(format!(
                        "Twitter rejected media {}: {}",
                        media_id, message
                    ))
                    .into());
                }
                _ => {}
            }

            tokio::time::sleep(Duration::from_secs(info.check_after_secs.unwrap_or(1))).await;

            let response = self
                .http
                .get(self.upload_url())
                .bearer_auth(token.expose_secret())
                .query(&[("command", "STATUS"), ("media_id", media_id)])
                .send()
                .await
                .map_err(|e| map_transport_error(Platform::Twitter, "media STATUS", e))?;
            let status: MediaUploadResponse =
                read_json(Platform::Twitter, "media STATUS", response).await?;
            match status.processing_info {
                Some(next) => info = next,
                None => return Ok(()),
            }
        }

        Err(PlatformError::Timeout(format!(
            "Twitter media {} still processing after {} checks",
            media_id, MAX_STATUS_POLLS
        ))
        .into())
    }
}

async fn parse_body<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    context: &str,
) -> Result<T> {
    let body = response
        .text()
        .await
        .map_err(|e| map_transport_error(Platform::Twitter, context, e))?;
    serde_json::from_str(&body).map_err(|e| {
        PlatformError::Parse(format!("Twitter {} returned unexpected JSON: {}", context, e)).into()
    })
}

#[async_trait]
impl PlatformClient for TwitterClient {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    async fn validate_token(&self, account: &SocialAccount) -> bool {
        let token = match access_token(&self.cipher, account) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(account = %account.id, "Cannot decrypt Twitter token: {}", e);
                return false;
            }
        };

        match self
            .http
            .get(format!("{}/2/users/me", self.api_base))
            .bearer_auth(token.expose_secret())
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(account = %account.id, "Twitter validation request failed: {}", e);
                false
            }
        }
    }

    async fn refresh_token(&self, account: &SocialAccount) -> Result<TokenPair> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            ConfigError::MissingField("TWITTER_CLIENT_ID / TWITTER_CLIENT_SECRET".to_string())
        })?;
        let encrypted = account.encrypted_refresh_token.as_deref().ok_or_else(|| {
            PlatformError::Authentication(format!(
                "Twitter account {} has no refresh token; re-authentication required",
                account.username
            ))
        })?;
        let refresh_token = SecretString::from(self.cipher.decrypt(encrypted)?);

        let response = refresh_grant(
            &self.http,
            Platform::Twitter,
            &self.token_url,
            credentials,
            &refresh_token,
        )
        .await?;
        response.into_token_pair(&self.cipher, chrono::Utc::now().timestamp())
    }

    async fn publish_post(
        &self,
        account: &SocialAccount,
        content: &PostContent,
        media: &[MediaItem],
    ) -> Result<PublishedPost> {
        let token = access_token(&self.cipher, account)?;
        let text = format_tweet(content);

        if media.len() > MAX_MEDIA {
            tracing::warn!(
                "Twitter allows {} media items per tweet; dropping {}",
                MAX_MEDIA,
                media.len() - MAX_MEDIA
            );
        }
        let mut media_ids = Vec::new();
        for item in media.iter().take(MAX_MEDIA) {
            media_ids.push(self.upload_media(&token, item).await?);
        }

        if text.trim().is_empty() && media_ids.is_empty() {
            return Err(PlatformError::Validation("tweet has no text or media".to_string()).into());
        }

        let request = CreateTweetRequest {
            text: &text,
            media: (!media_ids.is_empty()).then(|| TweetMedia { media_ids }),
        };
        let response = self
            .http
            .post(format!("{}/2/tweets", self.api_base))
            .bearer_auth(token.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error(Platform::Twitter, "publish", e))?;
        let created: DataEnvelope<CreatedTweet> =
            read_json(Platform::Twitter, "publish", response).await?;

        let tweet_id = created.data.id;
        Ok(PublishedPost {
            remote_post_url: tweet_url(&account.username, &tweet_id),
            remote_post_id: tweet_id,
            posted_at: chrono::Utc::now().timestamp(),
        })
    }

    async fn delete_post(&self, account: &SocialAccount, remote_post_id: &str) -> Result<()> {
        let token = access_token(&self.cipher, account)?;
        let response = self
            .http
            .delete(format!("{}/2/tweets/{}", self.api_base, remote_post_id))
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| map_transport_error(Platform::Twitter, "delete", e))?;
        let deleted: DataEnvelope<DeletedTweet> =
            read_json(Platform::Twitter, "delete", response).await?;

        if !deleted.data.deleted {
            return Err(PlatformError::Api {
                platform: Platform::Twitter.as_str().to_string(),
                status: 200,
                body: format!("tweet {} was not deleted", remote_post_id),
            }
            .into());
        }
        Ok(())
    }

    async fn get_analytics(
        &self,
        account: &SocialAccount,
        remote_post_id: &str,
    ) -> Result<PostAnalytics> {
        let token = access_token(&self.cipher, account)?;
        let response = self
            .http
            .get(format!("{}/2/tweets/{}", self.api_base, remote_post_id))
            .bearer_auth(token.expose_secret())
            .query(&[("tweet.fields", "public_metrics")])
            .send()
            .await
            .map_err(|e| map_transport_error(Platform::Twitter, "analytics", e))?;
        let tweet: DataEnvelope<TweetWithMetrics> =
            read_json(Platform::Twitter, "analytics", response).await?;

        let m = tweet.data.public_metrics;
        let shares = m.retweet_count + m.quote_count;
        Ok(PostAnalytics {
            impressions: m.impression_count,
            engagements: m.like_count + m.reply_count + shares,
            likes: m.like_count,
            comments: m.reply_count,
            shares,
            clicks: 0,
        })
    }
}
