//! Response Cache
//!
//! Time-boxed store of decoded API responses keyed by request id.
//!
//! Expiry is checked on read only; reads never mutate the map. Expired
//! entries are physically dropped when their key is written again or by
//! [`ResponseCache::sweep_expired`].

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Default time-to-live for cached responses
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
struct CacheEntry {
    payload: Arc<Value>,
    stored_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) <= ttl
    }
}

/// Shared response cache
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the stored payload if it is still within its TTL
    pub async fn get(&self, key: &str) -> Option<Arc<Value>> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;

        if entry.is_fresh(self.ttl, Instant::now()) {
            Some(Arc::clone(&entry.payload))
        } else {
            tracing::trace!("Cache entry {} expired", key);
            None
        }
    }

    /// Store a payload, replacing any previous entry for the key
    pub async fn set(&self, key: impl Into<String>, payload: Arc<Value>) {
        let entry = CacheEntry {
            payload,
            stored_at: Instant::now(),
        };

        let mut entries = self.entries.write().await;
        entries.insert(key.into(), entry);
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }

    /// Number of stored entries, expired ones included until swept
    pub async fn size(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Drop every expired entry, returning how many were removed
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(self.ttl, now));
        let removed = before - entries.len();

        if removed > 0 {
            tracing::debug!("Swept {} expired cache entries", removed);
        }
        removed
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
