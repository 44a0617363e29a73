//! HTTP plumbing shared by the REST platform clients

use reqwest::{Response, StatusCode};
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::cipher::TokenCipher;
use crate::error::{PlatformError, Result};
use crate::types::{MediaItem, Platform, SocialAccount};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the reqwest client used for one platform
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("syndicate/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PlatformError::Network(format!("failed to build HTTP client: {}", e)).into())
}

/// Classify a transport failure
pub fn map_transport_error(platform: Platform, context: &str, error: reqwest::Error) -> PlatformError {
    if error.is_timeout() {
        PlatformError::Timeout(format!("{} {} timed out", platform.display_name(), context))
    } else if error.is_decode() {
        PlatformError::Parse(format!(
            "{} {} returned an unreadable body: {}",
            platform.display_name(),
            context,
            error
        ))
    } else {
        PlatformError::Network(format!(
            "{} {} failed: {}",
            platform.display_name(),
            context,
            error
        ))
    }
}

/// Map a non-2xx status and its raw body to a platform error
///
/// Only 401 marks the token as rejected; 403 stays an API error.
pub fn map_status(platform: Platform, status: StatusCode, body: String) -> PlatformError {
    match status {
        StatusCode::UNAUTHORIZED => PlatformError::Authentication(format!(
            "{} rejected the access token ({}): {}",
            platform.display_name(),
            status.as_u16(),
            body
        )),
        StatusCode::TOO_MANY_REQUESTS => {
            PlatformError::RateLimit(format!("{}: {}", platform.display_name(), body))
        }
        _ => PlatformError::Api {
            platform: platform.as_str().to_string(),
            status: status.as_u16(),
            body,
        },
    }
}

/// Pass a successful response through, or turn it into a platform error
pub async fn ensure_success(platform: Platform, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(map_status(platform, status, body).into())
}

/// Read a successful response as JSON
pub async fn read_json<T: DeserializeOwned>(
    platform: Platform,
    context: &str,
    response: Response,
) -> Result<T> {
    let response = ensure_success(platform, response).await?;
    let body = response
        .text()
        .await
        .map_err(|e| map_transport_error(platform, context, e))?;
    serde_json::from_str(&body).map_err(|e| {
        PlatformError::Parse(format!(
            "{} {} returned unexpected JSON: {}",
            platform.display_name(),
            context,
            e
        ))
        .into()
    })
}

/// Decrypt the account's access token for a single request
pub fn access_token(cipher: &TokenCipher, account: &SocialAccount) -> Result<SecretString> {
    cipher.decrypt(&account.encrypted_access_token).map(SecretString::from)
}

/// Download the bytes of a media library item
pub async fn fetch_media(
    client: &reqwest::Client,
    platform: Platform,
    item: &MediaItem,
) -> Result<Vec<u8>> {
    let response = client
        .get(&item.file_url)
        .send()
        .await
        .map_err(|e| map_transport_error(platform, "media download", e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(PlatformError::Api {
            platform: platform.as_str().to_string(),
            status: status.as_u16(),
            body: format!("media {} could not be downloaded", item.id),
        }
        .into());
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| map_transport_error(platform, "media download", e))?;
    Ok(bytes.to_vec())
}
