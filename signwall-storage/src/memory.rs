//! In-memory key-value backend with lazy expiry.

use crate::clock::{Clock, SystemClock};
use crate::kv::KeyValueStore;
use async_trait::async_trait;
use signwall_core::{SignwallResult, StoreError, Timestamp};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Timestamp>,
}

/// Process-local store. Expired entries are dropped when next touched.
pub struct InMemoryKvStore {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Remaining lifetime of a key, `None` when absent or persistent.
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entries = self.entries.read().ok()?;
        let expires_at = entries.get(key)?.expires_at?;
        (expires_at - now).to_std().ok()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .read()
            .map(|entries| entries.values().filter(|e| is_live(e, now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable {
            reason: "in-memory store lock poisoned".to_string(),
        }
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_live(entry: &Entry, now: Timestamp) -> bool {
    entry.expires_at.is_none_or(|at| at > now)
}

#[async_trait]
impl KeyValueStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> SignwallResult<Option<Vec<u8>>> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().map_err(|_| Self::poisoned())?;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if is_live(entry, now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        if entries.get(key).is_some_and(|entry| !is_live(entry, now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> SignwallResult<()> {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl));
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_persistent(&self, key: &str, value: &[u8]) -> SignwallResult<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> SignwallResult<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.remove(key);
        Ok(())
    }
}
