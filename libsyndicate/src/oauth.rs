//! OAuth 2.0 helpers for connecting platform accounts
//!
//! Builds authorization URLs, generates PKCE pairs and performs the
//! authorization-code and refresh-token grants. Tokens returned by a platform
//! are encrypted before they leave this module.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

use crate::cipher::TokenCipher;
use crate::config::{OAuthClientConfig, OAuthConfig};
use crate::error::{ConfigError, PlatformError, Result, SyndicateError};
use crate::platforms::http::{map_status, map_transport_error};
use crate::types::{Platform, TokenPair};

/// A platform application's client id and secret
#[derive(Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    client_secret: SecretString,
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
        }
    }

    pub fn client_secret(&self) -> &str {
        self.client_secret.expose_secret()
    }
}

impl From<&OAuthClientConfig> for OAuthCredentials {
    fn from(config: &OAuthClientConfig) -> Self {
        Self::new(config.client_id.clone(), config.client_secret.clone())
    }
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// PKCE verifier and its S256 challenge
pub struct PkcePair {
    verifier: SecretString,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self::from_verifier(&URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Rebuild the pair from a verifier kept between the redirect and the callback
    pub fn from_verifier(verifier: &str) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier: SecretString::from(verifier.to_string()),
            challenge,
        }
    }

    pub fn verifier(&self) -> &str {
        self.verifier.expose_secret()
    }
}

/// Authorization and token endpoints of a platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEndpoints {
    pub authorize_url: String,
    pub token_url: String,
}

impl OAuthEndpoints {
    pub fn for_platform(platform: Platform) -> Option<Self> {
        match platform {
            Platform::Twitter => Some(Self {
                authorize_url: "https://twitter.com/i/oauth2/authorize".to_string(),
                token_url: "https://api.twitter.com/2/oauth2/token".to_string(),
            }),
            Platform::LinkedIn => Some(Self {
                authorize_url: "https://www.linkedin.com/oauth/v2/authorization".to_string(),
                token_url: "https://www.linkedin.com/oauth/v2/accessToken".to_string(),
            }),
            _ => None,
        }
    }
}

/// Scopes requested when connecting an account
pub fn scopes(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Twitter => &[
            "tweet.read",
            "tweet.write",
            "users.read",
            "offline.access",
            "media.write",
        ],
        Platform::LinkedIn => &["openid", "profile", "w_member_social"],
        _ => &[],
    }
}

/// Token endpoint response
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl TokenResponse {
    /// Encrypt the tokens and resolve the expiry against `now`
    pub fn into_token_pair(self, cipher: &TokenCipher, now: i64) -> Result<TokenPair> {
        let encrypted_access_token = cipher.encrypt(&self.access_token)?;
        let encrypted_refresh_token = match self.refresh_token.as_deref() {
            Some(token) if !token.is_empty() => Some(cipher.encrypt(token)?),
            _ => None,
        };

        Ok(TokenPair {
            encrypted_access_token,
            encrypted_refresh_token,
            expires_at: self.expires_in.map(|secs| now + secs),
        })
    }
}

/// POST a grant to a token endpoint
///
/// Twitter authenticates the client with HTTP Basic; LinkedIn expects the
/// client id and secret as form fields.
pub async fn request_token(
    http: &reqwest::Client,
    platform: Platform,
    token_url: &str,
    credentials: &OAuthCredentials,
    mut form: Vec<(&'static str, String)>,
) -> Result<TokenResponse> {
    let request = match platform {
        Platform::Twitter => {
            form.push(("client_id", credentials.client_id.clone()));
            http.post(token_url)
                .basic_auth(&credentials.client_id, Some(credentials.client_secret()))
        }
        _ => {
            form.push(("client_id", credentials.client_id.clone()));
            form.push(("client_secret", credentials.client_secret().to_string()));
            http.post(token_url)
        }
    };

    let response = request
        .form(&form)
        .send()
        .await
        .map_err(|e| map_transport_error(platform, "token request", e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        // invalid_grant and friends come back as 400
        if status == reqwest::StatusCode::BAD_REQUEST {
            return Err(PlatformError::Authentication(format!(
                "{} rejected the grant: {}",
                platform.display_name(),
                body
            ))
            .into());
        }
        return Err(map_status(platform, status, body).into());
    }

    response.json::<TokenResponse>().await.map_err(|e| {
        PlatformError::Parse(format!(
            "{} token response: {}",
            platform.display_name(),
            e
        ))
        .into()
    })
}

/// Refresh-token grant shared by platforms that support it
pub async fn refresh_grant(
    http: &reqwest::Client,
    platform: Platform,
    token_url: &str,
    credentials: &OAuthCredentials,
    refresh_token: &SecretString,
) -> Result<TokenResponse> {
    request_token(
        http,
        platform,
        token_url,
        credentials,
        vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.expose_secret().to_string()),
        ],
    )
    .await
}

/// Connect-account flow for every platform with OAuth support
pub struct OAuthFlow {
    http: reqwest::Client,
    cipher: Arc<TokenCipher>,
    base_redirect_url: String,
    clients: HashMap<Platform, OAuthCredentials>,
    endpoints: HashMap<Platform, OAuthEndpoints>,
}

impl OAuthFlow {
    pub fn new(http: reqwest::Client, cipher: Arc<TokenCipher>, config: &OAuthConfig) -> Self {
        let mut clients = HashMap::new();
        let mut endpoints = HashMap::new();
        for platform in [Platform::Twitter, Platform::LinkedIn] {
            if let Some(client) = config.client(platform) {
                clients.insert(platform, OAuthCredentials::from(client));
            }
            if let Some(urls) = OAuthEndpoints::for_platform(platform) {
                endpoints.insert(platform, urls);
            }
        }

        Self {
            http,
            cipher,
            base_redirect_url: config.base_redirect_url.trim_end_matches('/').to_string(),
            clients,
            endpoints,
        }
    }

    /// Point a platform at different endpoints
    pub fn with_endpoints(mut self, platform: Platform, endpoints: OAuthEndpoints) -> Self {
        self.endpoints.insert(platform, endpoints);
        self
    }

    pub fn redirect_uri(&self, platform: Platform) -> String {
        format!(
            "{}/api/social/{}/callback",
            self.base_redirect_url,
            platform.as_str()
        )
    }

    fn resolve(&self, platform: Platform) -> Result<(&OAuthEndpoints, &OAuthCredentials)> {
        let endpoints = self.endpoints.get(&platform).ok_or_else(|| {
            SyndicateError::from(PlatformError::Unsupported(
                platform.display_name().to_string(),
            ))
        })?;
        let credentials = self.clients.get(&platform).ok_or_else(|| {
            ConfigError::MissingField(format!(
                "{}_CLIENT_ID / {}_CLIENT_SECRET",
                platform.as_str().to_uppercase(),
                platform.as_str().to_uppercase()
            ))
        })?;
        Ok((endpoints, credentials))
    }

    /// URL the user is sent to for consent
    ///
    /// Twitter requires a PKCE pair.
    pub fn authorization_url(
        &self,
        platform: Platform,
        state: &str,
        pkce: Option<&PkcePair>,
    ) -> Result<String> {
        let (endpoints, credentials) = self.resolve(platform)?;
        if state.is_empty() {
            return Err(SyndicateError::Validation("OAuth state must not be empty".to_string()));
        }

        let redirect_uri = self.redirect_uri(platform);
        let scope = scopes(platform).join(" ");
        let mut params: Vec<(&str, &str)> = vec![
            ("response_type", "code"),
            ("client_id", credentials.client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("scope", scope.as_str()),
            ("state", state),
        ];

        if platform == Platform::Twitter {
            let pkce = pkce.ok_or_else(|| {
                SyndicateError::Validation("Twitter authorization requires PKCE".to_string())
            })?;
            params.push(("code_challenge", pkce.challenge.as_str()));
            params.push(("code_challenge_method", "S256"));
        }

        let url = reqwest::Url::parse_with_params(&endpoints.authorize_url, &params).map_err(
            |e| ConfigError::InvalidValue {
                field: format!("{} authorize URL", platform.as_str()),
                reason: e.to_string(),
            },
        )?;
        Ok(url.to_string())
    }

    /// Exchange an authorization code for an encrypted token pair
    pub async fn exchange_code(
        &self,
        platform: Platform,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<TokenPair> {
        let (endpoints, credentials) = self.resolve(platform)?;
        if code.is_empty() {
            return Err(SyndicateError::Validation(
                "authorization code must not be empty".to_string(),
            ));
        }

        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", self.redirect_uri(platform)),
        ];
        if platform == Platform::Twitter {
            let verifier = pkce_verifier.ok_or_else(|| {
                SyndicateError::Validation("Twitter code exchange requires a PKCE verifier".to_string())
            })?;
            form.push(("code_verifier", verifier.to_string()));
        }

        let response =
            request_token(&self.http, platform, &endpoints.token_url, credentials, form).await?;
        tracing::info!(platform = %platform, "Exchanged authorization code");
        response.into_token_pair(&self.cipher, chrono::Utc::now().timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuthClientConfig;

    fn flow() -> OAuthFlow {
        let config = OAuthConfig {
            base_redirect_url: "https://app.example.com/".to_string(),
            twitter: Some(OAuthClientConfig {
                client_id: "tw-client".to_string(),
                client_secret: "tw-secret".to_string(),
            }),
            linkedin: Some(OAuthClientConfig {
                client_id: "li-client".to_string(),
                client_secret: "li-secret".to_string(),
            }),
        };
        OAuthFlow::new(
            reqwest::Client::new(),
            Arc::new(TokenCipher::new(&[9u8; 32]).unwrap()),
            &config,
        )
    }

    fn query(url: &str) -> HashMap<String, String> {
        reqwest::Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_pkce_challenge_is_sha256_of_verifier() {
        // RFC 7636 appendix B
        let pair = PkcePair::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(pair.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_pkce_generate_is_unique() {
        let a = PkcePair::generate();
        let b = PkcePair::generate();
        assert_ne!(a.verifier(), b.verifier());
        assert_eq!(a.verifier().len(), 43);
    }

    #[test]
    fn test_twitter_authorization_url() {
        let pkce = PkcePair::generate();
        let url = flow()
            .authorization_url(Platform::Twitter, "state-123", Some(&pkce))
            .unwrap();
        assert!(url.starts_with("https://twitter.com/i/oauth2/authorize?"));

        let params = query(&url);
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["client_id"], "tw-client");
        assert_eq!(
            params["redirect_uri"],
            "https://app.example.com/api/social/twitter/callback"
        );
        assert_eq!(
            params["scope"],
            "tweet.read tweet.write users.read offline.access media.write"
        );
        assert_eq!(params["state"], "state-123");
        assert_eq!(params["code_challenge"], pkce.challenge);
        assert_eq!(params["code_challenge_method"], "S256");
    }

    #[test]
    fn test_linkedin_authorization_url_has_no_pkce() {
        let url = flow()
            .authorization_url(Platform::LinkedIn, "s", None)
            .unwrap();
        let params = query(&url);
        assert_eq!(params["scope"], "openid profile w_member_social");
        assert!(!params.contains_key("code_challenge"));
    }

    #[test]
    fn test_twitter_requires_pkce() {
        let result = flow().authorization_url(Platform::Twitter, "s", None);
        assert!(matches!(result, Err(SyndicateError::Validation(_))));
    }

    #[test]
    fn test_unsupported_platform() {
        let result = flow().authorization_url(Platform::Threads, "s", None);
        assert!(matches!(
            result,
            Err(SyndicateError::Platform(PlatformError::Unsupported(_)))
        ));
    }

    #[test]
    fn test_missing_client_credentials() {
        let flow = OAuthFlow::new(
            reqwest::Client::new(),
            Arc::new(TokenCipher::new(&[9u8; 32]).unwrap()),
            &OAuthConfig::default(),
        );
        let result = flow.authorization_url(Platform::LinkedIn, "s", None);
        assert!(matches!(result, Err(SyndicateError::Config(_))));
    }

    #[test]
    fn test_token_response_into_pair() {
        let cipher = TokenCipher::new(&[1u8; 32]).unwrap();
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"at","refresh_token":"rt","expires_in":7200,"token_type":"bearer"}"#,
        )
        .unwrap();

        let pair = response.into_token_pair(&cipher, 1_000).unwrap();
        assert_eq!(cipher.decrypt(&pair.encrypted_access_token).unwrap(), "at");
        assert_eq!(
            cipher
                .decrypt(pair.encrypted_refresh_token.as_deref().unwrap())
                .unwrap(),
            "rt"
        );
        assert_eq!(pair.expires_at, Some(8_200));
    }

    #[test]
    fn test_token_response_without_refresh() {
        let cipher = TokenCipher::new(&[1u8; 32]).unwrap();
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"at"}"#).unwrap();
        let pair = response.into_token_pair(&cipher, 0).unwrap();
        assert!(pair.encrypted_refresh_token.is_none());
        assert!(pair.expires_at.is_none());
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = OAuthCredentials::new("id", "hidden-secret");
        assert!(!format!("{:?}", creds).contains("hidden-secret"));
    }
}
