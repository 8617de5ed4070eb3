//! Lazy resolution of the social account a delivery is recorded against
//!
//! Every (owner, platform) pair maps to exactly one `SocialAccount`. The
//! account is created with placeholder values the first time the owner
//! publishes to that platform.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::error::Result;
use crate::store::ContentStore;
use crate::types::{PlatformKind, SocialAccount};

type AccountKey = (String, PlatformKind);
type KeyLocks = Arc<Mutex<HashMap<AccountKey, Arc<AsyncMutex<()>>>>>;

/// Find-or-create for social accounts, serialized per (owner, platform).
///
/// The per-key lock covers callers sharing this resolver; the store's
/// insert-if-absent covers separate processes sharing one database.
#[derive(Clone)]
pub struct AccountResolver {
    store: Arc<dyn ContentStore>,
    locks: KeyLocks,
}

impl AccountResolver {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lease(&self, owner_id: &str, platform: PlatformKind) -> KeyLease {
        let key = (owner_id.to_string(), platform);
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let lock = locks.entry(key.clone()).or_default().clone();
        KeyLease {
            locks: self.locks.clone(),
            key,
            lock,
        }
    }

    pub async fn resolve(&self, owner_id: &str, platform: PlatformKind) -> Result<SocialAccount> {
        let lease = self.lease(owner_id, platform);
        let _guard = lease.lock.lock().await;

        if let Some(account) = self.store.find_account(owner_id, platform).await? {
            return Ok(account);
        }

        let account = self
            .store
            .create_account(&SocialAccount::placeholder(owner_id, platform))
            .await?;
        debug!(
            "Created {} account {} for owner {}",
            platform, account.id, owner_id
        );
        Ok(account)
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// A caller's share of a per-key lock. The map entry is dropped with the
/// last lease.
struct KeyLease {
    locks: KeyLocks,
    key: AccountKey,
    lock: Arc<AsyncMutex<()>>,
}

impl Drop for KeyLease {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map, one here
        let last = locks
            .get(&self.key)
            .is_some_and(|entry| Arc::ptr_eq(entry, &self.lock) && Arc::strong_count(entry) == 2);
        if last {
            locks.remove(&self.key);
        }
    }
}
