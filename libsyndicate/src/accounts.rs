//! Connected-account lifecycle
//!
//! Accounts are created from a completed OAuth exchange, deactivated when the
//! platform stops accepting their token, and deactivated on disconnect.
//! Deactivated accounts are kept so their publish history stays attributable.

use std::sync::Arc;

use crate::error::{Result, SyndicateError};
use crate::platforms::PlatformRegistry;
use crate::store::SocialStore;
use crate::types::{Platform, SocialAccount, TokenPair};

#[derive(Clone)]
pub struct AccountManager {
    store: Arc<dyn SocialStore>,
    registry: Arc<PlatformRegistry>,
}

impl AccountManager {
    pub fn new(store: Arc<dyn SocialStore>, registry: Arc<PlatformRegistry>) -> Self {
        Self { store, registry }
    }

    /// Store a freshly exchanged token pair for a platform identity
    ///
    /// Reconnecting an identity the user already connected replaces its
    /// tokens and reactivates it instead of creating a duplicate.
    pub async fn connect(
        &self,
        user_id: &str,
        platform: Platform,
        platform_user_id: &str,
        username: &str,
        tokens: TokenPair,
    ) -> Result<SocialAccount> {
        if user_id.is_empty() || platform_user_id.is_empty() {
            return Err(SyndicateError::Validation(
                "user id and platform user id are required".to_string(),
            ));
        }
        if !self.registry.is_supported(platform) {
            return Err(crate::error::PlatformError::Unsupported(
                platform.display_name().to_string(),
            )
            .into());
        }

        if let Some(mut existing) = self
            .store
            .find_account(user_id, platform, platform_user_id)
            .await?
        {
            self.store
                .update_account_tokens(&existing.id, &tokens)
                .await?;
            self.store.set_account_active(&existing.id, true).await?;
            existing.apply_tokens(tokens);
            existing.is_active = true;
            tracing::info!(account = %existing.id, platform = %platform, "Reconnected account");
            return Ok(existing);
        }

        let account = SocialAccount::new(
            user_id.to_string(),
            platform,
            platform_user_id.to_string(),
            username.to_string(),
            tokens,
        );
        self.store.insert_account(&account).await?;
        tracing::info!(account = %account.id, platform = %platform, "Connected account");
        Ok(account)
    }

    /// Ask the platform whether the stored token still works
    ///
    /// An account whose token is rejected is deactivated.
    pub async fn validate(&self, account_id: &str) -> Result<bool> {
        let account = self.get(account_id).await?;
        let client = self.registry.get(account.platform)?;

        let valid = client.validate_token(&account).await;
        if !valid && account.is_active {
            tracing::warn!(
                account = %account.id,
                platform = %account.platform,
                "Token rejected, deactivating account"
            );
            self.store.set_account_active(&account.id, false).await?;
        }
        Ok(valid)
    }

    /// Deactivate an account at the user's request
    pub async fn disconnect(&self, account_id: &str) -> Result<()> {
        let account = self.get(account_id).await?;
        self.store.set_account_active(&account.id, false).await?;
        tracing::info!(account = %account.id, "Disconnected account");
        Ok(())
    }

    /// Active accounts of a user across every platform
    pub async fn list(&self, user_id: &str) -> Result<Vec<SocialAccount>> {
        self.store.active_accounts(user_id, &Platform::ALL).await
    }

    async fn get(&self, account_id: &str) -> Result<SocialAccount> {
        self.store
            .get_account(account_id)
            .await?
            .ok_or_else(|| SyndicateError::NotFound(format!("account {}", account_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::PlatformError;
    use crate::platforms::mock::MockPlatform;

    fn tokens(access: &str) -> TokenPair {
        TokenPair {
            encrypted_access_token: access.to_string(),
            encrypted_refresh_token: Some("refresh".to_string()),
            expires_at: None,
        }
    }

    async fn manager(twitter: MockPlatform) -> (AccountManager, Arc<Database>) {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let registry = PlatformRegistry::new()
            .with_client(Arc::new(twitter))
            .with_client(Arc::new(MockPlatform::success(Platform::LinkedIn)));
        (AccountManager::new(db.clone(), Arc::new(registry)), db)
    }

    #[tokio::test]
    async fn test_connect_creates_account() {
        let (manager, _db) = manager(MockPlatform::success(Platform::Twitter)).await;
        let account = manager
            .connect("user-1", Platform::Twitter, "42", "alice", tokens("a"))
            .await
            .unwrap();

        assert!(account.is_active);
        let listed = manager.list("user-1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, account.id);
    }

    #[tokio::test]
    async fn test_reconnect_reuses_account() {
        let (manager, db) = manager(MockPlatform::success(Platform::Twitter)).await;
        let first = manager
            .connect("user-1", Platform::Twitter, "42", "alice", tokens("a"))
            .await
            .unwrap();
        manager.disconnect(&first.id).await.unwrap();

        let second = manager
            .connect("user-1", Platform::Twitter, "42", "alice", tokens("b"))
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert!(second.is_active);

        let stored = db.get_account(&first.id).await.unwrap().unwrap();
        assert_eq!(stored.encrypted_access_token, "b");
        assert!(stored.is_active);
    }

    #[tokio::test]
    async fn test_connect_unsupported_platform() {
        let (manager, _db) = manager(MockPlatform::success(Platform::Twitter)).await;
        let result = manager
            .connect("user-1", Platform::Instagram, "9", "insta", tokens("a"))
            .await;
        assert!(matches!(
            result,
            Err(SyndicateError::Platform(PlatformError::Unsupported(_)))
        ));
    }

    #[tokio::test]
    async fn test_validate_deactivates_rejected_token() {
        let (manager, db) =
            manager(MockPlatform::success(Platform::Twitter).with_token_valid(false)).await;
        let account = manager
            .connect("user-1", Platform::Twitter, "42", "alice", tokens("a"))
            .await
            .unwrap();

        assert!(!manager.validate(&account.id).await.unwrap());
        let stored = db.get_account(&account.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert!(manager.list("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validate_keeps_valid_account() {
        let (manager, _db) = manager(MockPlatform::success(Platform::Twitter)).await;
        let account = manager
            .connect("user-1", Platform::Twitter, "42", "alice", tokens("a"))
            .await
            .unwrap();
        assert!(manager.validate(&account.id).await.unwrap());
        assert_eq!(manager.list("user-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_account() {
        let (manager, _db) = manager(MockPlatform::success(Platform::Twitter)).await;
        assert!(matches!(
            manager.validate("nope").await,
            Err(SyndicateError::NotFound(_))
        ));
        assert!(matches!(
            manager.disconnect("nope").await,
            Err(SyndicateError::NotFound(_))
        ));
    }
}
