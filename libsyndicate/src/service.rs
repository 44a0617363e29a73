//! Service facade wiring the engine together
//!
//! Everything is constructed once, at startup, from a [`Config`] and the
//! encryption key. A missing or malformed key fails construction, so nothing
//! downstream can run without it.
//!
//! ```no_run
//! use libsyndicate::SyndicateService;
//!
//! # async fn example() -> libsyndicate::Result<()> {
//! let service = SyndicateService::new().await?;
//! let summary = service.dispatcher().publish_due_posts().await?;
//! println!("{} of {} due posts published", summary.successful, summary.total);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::accounts::AccountManager;
use crate::cipher::TokenCipher;
use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::evergreen::EvergreenScheduler;
use crate::oauth::OAuthFlow;
use crate::platforms::http::build_client;
use crate::platforms::PlatformRegistry;
use crate::publisher::Publisher;
use crate::refresh::TokenRefresher;
use crate::scheduling::Dispatcher;
use crate::store::SocialStore;

pub struct SyndicateService {
    config: Arc<Config>,
    cipher: Arc<TokenCipher>,
    store: Arc<dyn SocialStore>,
    publisher: Arc<Publisher>,
    dispatcher: Dispatcher,
    accounts: AccountManager,
    oauth: OAuthFlow,
}

impl SyndicateService {
    /// Load configuration and the key from the environment and build the service
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Build the service from an explicit configuration
    ///
    /// # Errors
    ///
    /// Fails if `SYNDICATE_ENCRYPTION_KEY` is missing or invalid, or if the
    /// database cannot be opened or migrated.
    pub async fn from_config(config: Config) -> Result<Self> {
        let cipher = Arc::new(TokenCipher::from_env()?);
        let store: Arc<dyn SocialStore> =
            Arc::new(Database::new(&config.database.path).await?);
        let registry = PlatformRegistry::from_config(&config, cipher.clone())?;
        Self::from_parts(config, cipher, store, registry)
    }

    /// Assemble the service around an existing store and registry
    pub fn from_parts(
        config: Config,
        cipher: Arc<TokenCipher>,
        store: Arc<dyn SocialStore>,
        registry: PlatformRegistry,
    ) -> Result<Self> {
        let registry = Arc::new(registry);
        let publishing = &config.publishing;

        let evergreen = Arc::new(EvergreenScheduler::new(
            store.clone(),
            publishing.default_evergreen_interval_days,
        ));
        let refresher = Arc::new(TokenRefresher::new(store.clone()));
        let publisher = Arc::new(Publisher::new(
            store.clone(),
            registry.clone(),
            evergreen,
            refresher,
            publishing.request_timeout(),
            publishing.publish_timeout(),
        ));
        let dispatcher = Dispatcher::new(
            store.clone(),
            publisher.clone(),
            publishing.max_concurrent_posts,
        );
        let accounts = AccountManager::new(store.clone(), registry);
        let oauth = OAuthFlow::new(
            build_client(publishing.request_timeout())?,
            cipher.clone(),
            &config.oauth,
        );

        Ok(Self {
            config: Arc::new(config),
            cipher,
            store,
            publisher,
            dispatcher,
            accounts,
            oauth,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cipher(&self) -> &Arc<TokenCipher> {
        &self.cipher
    }

    pub fn store(&self) -> &Arc<dyn SocialStore> {
        &self.store
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn accounts(&self) -> &AccountManager {
        &self.accounts
    }

    pub fn oauth(&self) -> &OAuthFlow {
        &self.oauth
    }
}
