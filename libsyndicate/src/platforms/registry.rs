//! Platform → client lookup

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cipher::TokenCipher;
use crate::config::Config;
use crate::error::{PlatformError, Result};
use crate::oauth::OAuthCredentials;
use crate::platforms::linkedin::LinkedInClient;
use crate::platforms::twitter::TwitterClient;
use crate::platforms::PlatformClient;
use crate::types::Platform;

/// Maps each platform to the client that talks to it
#[derive(Default, Clone)]
pub struct PlatformRegistry {
    clients: HashMap<Platform, Arc<dyn PlatformClient>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the Twitter and LinkedIn clients
    pub fn from_config(config: &Config, cipher: Arc<TokenCipher>) -> Result<Self> {
        let timeout: Duration = config.publishing.request_timeout();
        let twitter_credentials = config
            .oauth
            .client(Platform::Twitter)
            .map(OAuthCredentials::from);

        let mut registry = Self::new();
        registry.register(Arc::new(TwitterClient::with_timeout(
            cipher.clone(),
            twitter_credentials,
            timeout,
        )?));
        registry.register(Arc::new(LinkedInClient::with_timeout(cipher, timeout)?));
        Ok(registry)
    }

    /// Register a client under its own platform, replacing any previous one
    pub fn register(&mut self, client: Arc<dyn PlatformClient>) {
        self.clients.insert(client.platform(), client);
    }

    pub fn with_client(mut self, client: Arc<dyn PlatformClient>) -> Self {
        self.register(client);
        self
    }

    /// Client for `platform`
    ///
    /// # Errors
    ///
    /// `PlatformError::Unsupported` when nothing is registered for it.
    pub fn get(&self, platform: Platform) -> Result<Arc<dyn PlatformClient>> {
        self.clients.get(&platform).cloned().ok_or_else(|| {
            PlatformError::Unsupported(platform.display_name().to_string()).into()
        })
    }

    pub fn is_supported(&self, platform: Platform) -> bool {
        self.clients.contains_key(&platform)
    }

    pub fn supported(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.clients.contains_key(p))
            .collect()
    }
}
