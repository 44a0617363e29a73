//! LinkedIn client over the UGC posts API

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::cipher::TokenCipher;
use crate::error::{PlatformError, Result};
use crate::platforms::http::{
    access_token, build_client, ensure_success, fetch_media, map_transport_error, read_json,
    DEFAULT_TIMEOUT,
};
use crate::platforms::PlatformClient;
use crate::types::{
    MediaItem, Platform, PostAnalytics, PostContent, PublishedPost, SocialAccount, TokenPair,
};

pub const LINKEDIN_API_BASE: &str = "https://api.linkedin.com";

/// Media items allowed on one share
pub const MAX_MEDIA: usize = 9;

const RESTLI_PROTOCOL_HEADER: &str = "X-Restli-Protocol-Version";
const RESTLI_ID_HEADER: &str = "x-restli-id";
const UPLOAD_MECHANISM: &str = "com.linkedin.digitalmedia.uploading.MediaUploadHttpRequest";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UgcPostRequest {
    author: String,
    lifecycle_state: &'static str,
    specific_content: SpecificContent,
    visibility: Visibility,
}

#[derive(Debug, Serialize)]
struct SpecificContent {
    #[serde(rename = "com.linkedin.ugc.ShareContent")]
    share_content: ShareContent,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShareContent {
    share_commentary: ShareCommentary,
    share_media_category: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    media: Vec<ShareMedia>,
}

#[derive(Debug, Serialize)]
struct ShareCommentary {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShareMedia {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct Visibility {
    #[serde(rename = "com.linkedin.ugc.MemberNetworkVisibility")]
    member_network: &'static str,
}

#[derive(Debug, Deserialize)]
struct UgcPostResponse {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterUploadRequest {
    register_upload_request: RegisterUpload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterUpload {
    recipes: Vec<&'static str>,
    owner: String,
    service_relationships: Vec<ServiceRelationship>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceRelationship {
    relationship_type: &'static str,
    identifier: &'static str,
}

#[derive(Debug, Deserialize)]
struct RegisterUploadResponse {
    value: RegisteredUpload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisteredUpload {
    asset: String,
    upload_mechanism: std::collections::HashMap<String, UploadHttpRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadHttpRequest {
    upload_url: String,
}

/// Person URN for an account, accepting ids that are already URNs
pub fn author_urn(platform_user_id: &str) -> String {
    if platform_user_id.starts_with("urn:li:") {
        platform_user_id.to_string()
    } else {
        format!("urn:li:person:{}", platform_user_id)
    }
}

/// Public URL of a share
pub fn share_url(share_id: &str) -> String {
    format!("https://www.linkedin.com/feed/update/{}", share_id)
}

/// Percent-encode a URN for use as a single path segment
fn encode_path_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

fn recipe(item: &MediaItem) -> &'static str {
    if item.is_video() {
        "urn:li:digitalmediaRecipe:feedshare-video"
    } else {
        "urn:li:digitalmediaRecipe:feedshare-image"
    }
}

pub struct LinkedInClient {
    http: reqwest::Client,
    cipher: Arc<TokenCipher>,
    api_base: String,
}

impl LinkedInClient {
    pub fn new(cipher: Arc<TokenCipher>) -> Result<Self> {
        Self::with_timeout(cipher, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(cipher: Arc<TokenCipher>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            cipher,
            api_base: LINKEDIN_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    /// Register an asset, upload the bytes and return the asset URN
    async fn upload_media(
        &self,
        token: &SecretString,
        owner: &str,
        item: &MediaItem,
    ) -> Result<String> {
        let request = RegisterUploadRequest {
            register_upload_request: RegisterUpload {
                recipes: vec![recipe(item)],
                owner: owner.to_string(),
                service_relationships: vec![ServiceRelationship {
                    relationship_type: "OWNER",
                    identifier: "urn:li:userGeneratedContent",
                }],
            },
        };
        let response = self
            .http
            .post(format!("{}/v2/assets", self.api_base))
            .query(&[("action", "registerUpload")])
            .bearer_auth(token.expose_secret())
            .header(RESTLI_PROTOCOL_HEADER, "2.0.0")
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error(Platform::LinkedIn, "registerUpload", e))?;
        let registered: RegisterUploadResponse =
            read_json(Platform::LinkedIn, "registerUpload", response).await?;

        let upload_url = registered
            .value
            .upload_mechanism
            .get(UPLOAD_MECHANISM)
            .map(|m| m.upload_url.clone())
            .ok_or_else(|| {
                PlatformError::Parse("LinkedIn registerUpload returned no upload URL".to_string())
            })?;

        let bytes = fetch_media(&self.http, Platform::LinkedIn, item).await?;
        let response = self
            .http
            .put(&upload_url)
            .bearer_auth(token.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, item.mime_type.as_str())
            .body(bytes)
            .send()
            .await
            .map_err(|e| map_transport_error(Platform::LinkedIn, "media upload", e))?;
        ensure_success(Platform::LinkedIn, response).await?;

        tracing::debug!(asset = %registered.value.asset, item = %item.id, "Uploaded media to LinkedIn");
        Ok(registered.value.asset)
    }
}

#[async_trait]
impl PlatformClient for LinkedInClient {
    fn platform(&self) -> Platform {
        Platform::LinkedIn
    }

    fn supports_refresh(&self) -> bool {
        false
    }

    async fn validate_token(&self, account: &SocialAccount) -> bool {
        let token = match access_token(&self.cipher, account) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(account = %account.id, "Cannot decrypt LinkedIn token: {}", e);
                return false;
            }
        };

        match self
            .http
            .get(format!("{}/v2/userinfo", self.api_base))
            .bearer_auth(token.expose_secret())
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(account = %account.id, "LinkedIn validation request failed: {}", e);
                false
            }
        }
    }

    async fn refresh_token(&self, account: &SocialAccount) -> Result<TokenPair> {
        Err(PlatformError::RefreshUnsupported(format!(
            "LinkedIn account {} must re-authenticate",
            account.username
        ))
        .into())
    }

    async fn publish_post(
        &self,
        account: &SocialAccount,
        content: &PostContent,
        media: &[MediaItem],
    ) -> Result<PublishedPost> {
        let token = access_token(&self.cipher, account)?;
        let author = author_urn(&account.platform_user_id);

        if media.len() > MAX_MEDIA {
            tracing::warn!(
                "LinkedIn allows {} media items per share; dropping {}",
                MAX_MEDIA,
                media.len() - MAX_MEDIA
            );
        }
        let media = &media[..media.len().min(MAX_MEDIA)];

        let mut share_media = Vec::with_capacity(media.len());
        for item in media {
            let asset = self.upload_media(&token, &author, item).await?;
            share_media.push(ShareMedia {
                status: "READY",
                media: Some(asset),
                original_url: None,
            });
        }

        let category = if !share_media.is_empty() {
            if media.iter().any(MediaItem::is_video) {
                "VIDEO"
            } else {
                "IMAGE"
            }
        } else if let Some(link) = content.link_url.as_ref().filter(|l| !l.is_empty()) {
            share_media.push(ShareMedia {
                status: "READY",
                media: None,
                original_url: Some(link.clone()),
            });
            "ARTICLE"
        } else {
            "NONE"
        };

        let request = UgcPostRequest {
            author,
            lifecycle_state: "PUBLISHED",
            specific_content: SpecificContent {
                share_content: ShareContent {
                    share_commentary: ShareCommentary {
                        text: content.text.clone(),
                    },
                    share_media_category: category,
                    media: share_media,
                },
            },
            visibility: Visibility {
                member_network: "PUBLIC",
            },
        };

        let response = self
            .http
            .post(format!("{}/v2/ugcPosts", self.api_base))
            .bearer_auth(token.expose_secret())
            .header(RESTLI_PROTOCOL_HEADER, "2.0.0")
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error(Platform::LinkedIn, "publish", e))?;
        let response = ensure_success(Platform::LinkedIn, response).await?;

        let header_id = response
            .headers()
            .get(RESTLI_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let share_id = match header_id {
            Some(id) => id,
            None => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| map_transport_error(Platform::LinkedIn, "publish", e))?;
                serde_json::from_str::<UgcPostResponse>(&body)
                    .ok()
                    .and_then(|r| r.id)
                    .ok_or_else(|| {
                        PlatformError::Parse(format!(
                            "LinkedIn publish response carried no share id: {}",
                            body
                        ))
                    })?
            }
        };

        Ok(PublishedPost {
            remote_post_url: share_url(&share_id),
            remote_post_id: share_id,
            posted_at: chrono::Utc::now().timestamp(),
        })
    }

    async fn delete_post(&self, account: &SocialAccount, remote_post_id: &str) -> Result<()> {
        let token = access_token(&self.cipher, account)?;
        let response = self
            .http
            .delete(format!(
                "{}/v2/ugcPosts/{}",
                self.api_base,
                encode_path_segment(remote_post_id)
            ))
            .bearer_auth(token.expose_secret())
            .header(RESTLI_PROTOCOL_HEADER, "2.0.0")
            .send()
            .await
            .map_err(|e| map_transport_error(Platform::LinkedIn, "delete", e))?;
        ensure_success(Platform::LinkedIn, response).await?;
        Ok(())
    }

    async fn get_analytics(
        &self,
        _account: &SocialAccount,
        _remote_post_id: &str,
    ) -> Result<PostAnalytics> {
        Ok(PostAnalytics::default())
    }
}
