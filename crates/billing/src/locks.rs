//! Per-key async mutual exclusion
//!
//! The profile store offers atomic single-record updates but no multi-row
//! transactions, so every read-modify-write sequence (balance mutation,
//! premium update, notification settlement) runs inside a per-key critical
//! section. Keys are user ids for ledger operations and order ids for
//! settlement.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A map of lazily-created async mutexes, one per key.
///
/// Entries are never removed; the map is bounded by the set of keys active
/// over the process lifetime, which is acceptable for per-user and per-order
/// serialization. Cross-process serialization is handled by the store's
/// conditional updates, not by this map.
pub struct LockMap<K> {
    inner: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K: Eq + Hash + Clone> LockMap<K> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the mutex for `key`, creating it on first use.
    pub async fn acquire(&self, key: K) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(key).or_default().clone()
        };
        mutex.lock_owned().await
    }
}

impl<K: Eq + Hash + Clone> Default for LockMap<K> {
    fn default() -> Self {
        Self::new()
    }
}
