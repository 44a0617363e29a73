//! Per-account serialized token refresh
//!
//! Concurrent publishes for the same account must not race on the refresh
//! grant: most platforms rotate the refresh token, so the second request would
//! present an already-consumed token. Each account gets its own async mutex;
//! whoever waits on it re-reads the account afterwards and reuses a token the
//! previous holder just stored.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Mutex as AsyncMutex;

use crate::cipher::TokenCipher;
use crate::error::{Result, SyndicateError};
use crate::platforms::PlatformClient;
use crate::store::SocialStore;
use crate::types::SocialAccount;

pub struct TokenRefresher {
    store: Arc<dyn SocialStore>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl TokenRefresher {
    pub fn new(store: Arc<dyn SocialStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_table(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_for(&self, account_id: &str) -> Arc<AsyncMutex<()>> {
        self.lock_table()
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drop the account's lock once no other caller holds or awaits it
    fn release(&self, account_id: &str, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self.lock_table();
        let ours = locks
            .get(account_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock));
        // One reference in the map, one in `lock`
        if ours && Arc::strong_count(&lock) == 2 {
            locks.remove(account_id);
        }
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.lock_table().len()
    }

    /// Refresh `stale` unless another caller already did
    ///
    /// Returns the account carrying the token to use. `stale` is the copy the
    /// caller saw; if the stored token differs from it and is not expired,
    /// no request is made.
    pub async fn refresh(
        &self,
        client: &dyn PlatformClient,
        stale: &SocialAccount,
    ) -> Result<SocialAccount> {
        let lock = self.lock_for(&stale.id);
        let outcome = {
            let _guard = lock.lock().await;
            self.refresh_locked(client, stale).await
        };
        self.release(&stale.id, lock);
        outcome
    }

    async fn refresh_locked(
        &self,
        client: &dyn PlatformClient,
        stale: &SocialAccount,
    ) -> Result<SocialAccount> {
        let now = chrono::Utc::now().timestamp();
        let mut current = self
            .store
            .get_account(&stale.id)
            .await?
            .ok_or_else(|| SyndicateError::NotFound(format!("account {}", stale.id)))?;

        if current.encrypted_access_token != stale.encrypted_access_token
            && !current.token_expired(now)
        {
            tracing::debug!(account = %current.id, "Token already refreshed by another task");
            return Ok(current);
        }

        let tokens = client.refresh_token(&current).await?;
        self.store
            .update_account_tokens(&current.id, &tokens)
            .await?;
        current.apply_tokens(tokens);

        tracing::info!(
            account = %current.id,
            platform = %current.platform,
            token = %TokenCipher::fingerprint(&current.encrypted_access_token),
            "Refreshed access token"
        );
        Ok(current)
    }
}
