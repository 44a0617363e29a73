//! Configuration management for Syndicate
//!
//! Non-secret settings come from an optional TOML file; OAuth client
//! credentials and the base redirect URL may be overridden from the
//! environment. The token encryption key is read only from the environment
//! (see [`crate::cipher::TokenCipher::from_env`]).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::types::Platform;

pub const CONFIG_PATH_ENV: &str = "SYNDICATE_CONFIG";
pub const DATABASE_PATH_ENV: &str = "SYNDICATE_DATABASE_PATH";
pub const BASE_URL_ENV: &str = "SYNDICATE_BASE_URL";
pub const TWITTER_CLIENT_ID_ENV: &str = "TWITTER_CLIENT_ID";
pub const TWITTER_CLIENT_SECRET_ENV: &str = "TWITTER_CLIENT_SECRET";
pub const LINKEDIN_CLIENT_ID_ENV: &str = "LINKEDIN_CLIENT_ID";
pub const LINKEDIN_CLIENT_SECRET_ENV: &str = "LINKEDIN_CLIENT_SECRET";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub publishing: PublishingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/syndicate/syndicate.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Base URL the platform callbacks are built from
    pub base_redirect_url: String,
    /// Client credentials are only ever taken from the environment
    #[serde(skip)]
    pub twitter: Option<OAuthClientConfig>,
    #[serde(skip)]
    pub linkedin: Option<OAuthClientConfig>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            base_redirect_url: "http://localhost:3000".to_string(),
            twitter: None,
            linkedin: None,
        }
    }
}

impl OAuthConfig {
    /// Client credentials for a platform, if configured
    pub fn client(&self, platform: Platform) -> Option<&OAuthClientConfig> {
        match platform {
            Platform::Twitter => self.twitter.as_ref(),
            Platform::LinkedIn => self.linkedin.as_ref(),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .finish()
    }
}

/// Default per-account publish budget, in request timeouts
const PUBLISH_TIMEOUT_FACTOR: u32 = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishingConfig {
    /// Upper bound for a single outbound platform call
    pub request_timeout_secs: u64,
    /// Upper bound for publishing to one account, media uploads included.
    /// Defaults to a multiple of the request timeout.
    pub publish_timeout_secs: Option<u64>,
    /// Posts published in parallel by one due-post scan
    pub max_concurrent_posts: usize,
    /// Recycle interval for evergreen posts that do not set one
    pub default_evergreen_interval_days: u32,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            publish_timeout_secs: None,
            max_concurrent_posts: 4,
            default_evergreen_interval_days: 30,
        }
    }
}

impl PublishingConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Never shorter than one request
    pub fn publish_timeout(&self) -> Duration {
        let request = self.request_timeout();
        match self.publish_timeout_secs {
            Some(secs) => request.max(Duration::from_secs(secs)),
            None => request * PUBLISH_TIMEOUT_FACTOR,
        }
    }
}

impl Config {
    /// Load configuration from the default location, then apply environment overrides
    ///
    /// A missing config file is not an error; defaults are used instead.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Defaults plus environment overrides, without touching the filesystem
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Overlay values found in the environment
    pub fn apply_env_overrides(&mut self) {
        if let Some(path) = env_value(DATABASE_PATH_ENV) {
            self.database.path = path;
        }
        if let Some(base_url) = env_value(BASE_URL_ENV) {
            self.oauth.base_redirect_url = base_url;
        }
        if let Some(client) = client_from_env(TWITTER_CLIENT_ID_ENV, TWITTER_CLIENT_SECRET_ENV) {
            self.oauth.twitter = Some(client);
        }
        if let Some(client) = client_from_env(LINKEDIN_CLIENT_ID_ENV, LINKEDIN_CLIENT_SECRET_ENV) {
            self.oauth.linkedin = Some(client);
        }
    }

    /// Reject values that would only fail later at first use
    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::MissingField("database.path".to_string()).into());
        }
        if self.publishing.max_concurrent_posts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "publishing.max_concurrent_posts".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        for (name, client) in [
            ("oauth.twitter", &self.oauth.twitter),
            ("oauth.linkedin", &self.oauth.linkedin),
        ] {
            if let Some(client) = client {
                if client.client_id.is_empty() || client.client_secret.is_empty() {
                    return Err(ConfigError::MissingField(format!(
                        "{}.client_id / {}.client_secret",
                        name, name
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn client_from_env(id_var: &str, secret_var: &str) -> Option<OAuthClientConfig> {
    match (env_value(id_var), env_value(secret_var)) {
        (Some(client_id), Some(client_secret)) => Some(OAuthClientConfig {
            client_id,
            client_secret,
        }),
        (Some(_), None) | (None, Some(_)) => {
            tracing::warn!(
                "Only one of {} / {} is set; ignoring both",
                id_var,
                secret_var
            );
            None
        }
        (None, None) => None,
    }
}

/// Resolve the configuration file path (XDG config dir unless overridden)
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("syndicate").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyndicateError;
    use serial_test::serial;
    use tempfile::TempDir;

    const ALL_ENV: [&str; 7] = [
        CONFIG_PATH_ENV,
        DATABASE_PATH_ENV,
        BASE_URL_ENV,
        TWITTER_CLIENT_ID_ENV,
        TWITTER_CLIENT_SECRET_ENV,
        LINKEDIN_CLIENT_ID_ENV,
        LINKEDIN_CLIENT_SECRET_ENV,
    ];

    fn clear_env() {
        for name in ALL_ENV {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.publishing.request_timeout_secs, 30);
        assert_eq!(config.publishing.publish_timeout(), Duration::from_secs(120));
        assert_eq!(config.publishing.max_concurrent_posts, 4);
        assert_eq!(config.publishing.default_evergreen_interval_days, 30);
        assert!(config.oauth.twitter.is_none());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [database]
            path = "/tmp/syndicate.db"

            [publishing]
            request_timeout_secs = 5

            [oauth]
            base_redirect_url = "https://app.example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, "/tmp/syndicate.db");
        assert_eq!(config.publishing.request_timeout_secs, 5);
        assert_eq!(config.publishing.publish_timeout(), Duration::from_secs(20));
        assert_eq!(config.publishing.max_concurrent_posts, 4);
        assert_eq!(config.oauth.base_redirect_url, "https://app.example.com");
        assert!(config.oauth.client(Platform::LinkedIn).is_none());
    }

    #[test]
    fn test_publish_timeout_never_below_request_timeout() {
        let mut publishing = PublishingConfig {
            request_timeout_secs: 10,
            publish_timeout_secs: Some(300),
            ..PublishingConfig::default()
        };
        assert_eq!(publishing.publish_timeout(), Duration::from_secs(300));

        publishing.publish_timeout_secs = Some(2);
        assert_eq!(publishing.publish_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_client_secret_redacted_in_debug() {
        let client = OAuthClientConfig {
            client_id: "id".to_string(),
            client_secret: "very-secret".to_string(),
        };
        assert!(!format!("{:?}", client).contains("very-secret"));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.publishing.max_concurrent_posts = 0;
        assert!(matches!(
            config.validate(),
            Err(SyndicateError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var(DATABASE_PATH_ENV, "/tmp/env.db");
        std::env::set_var(BASE_URL_ENV, "https://env.example.com");
        std::env::set_var(TWITTER_CLIENT_ID_ENV, "tw-id");
        std::env::set_var(TWITTER_CLIENT_SECRET_ENV, "tw-secret");
        std::env::set_var(LINKEDIN_CLIENT_ID_ENV, "li-id");

        let config = Config::from_env().unwrap();
        assert_eq!(config.database.path, "/tmp/env.db");
        assert_eq!(config.oauth.base_redirect_url, "https://env.example.com");
        assert_eq!(config.oauth.twitter.as_ref().unwrap().client_id, "tw-id");
        // Half-configured clients are ignored
        assert!(config.oauth.linkedin.is_none());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_from_env_path() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [database]
            path = "/tmp/from-file.db"
            "#,
        )
        .unwrap();
        std::env::set_var(CONFIG_PATH_ENV, path.to_str().unwrap());

        let config = Config::load().unwrap();
        assert_eq!(config.database.path, "/tmp/from-file.db");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_missing_file_uses_defaults() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        std::env::set_var(
            CONFIG_PATH_ENV,
            temp_dir.path().join("absent.toml").to_str().unwrap(),
        );

        let config = Config::load().unwrap();
        assert_eq!(config.database.path, DatabaseConfig::default().path);

        clear_env();
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.toml");
        std::fs::write(&path, "database = [").unwrap();

        assert!(matches!(
            Config::load_from_path(&path),
            Err(SyndicateError::Config(ConfigError::ParseError(_)))
        ));
    }
}
