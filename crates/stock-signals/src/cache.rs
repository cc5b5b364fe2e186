//! Append-only fetch cache with read-time expiry

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;

/// Default lifetime of a cached fetch
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// One cached fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub content: String,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Build an entry fetched at `now` that lives for `ttl`
    pub fn new(key: impl Into<String>, content: impl Into<String>, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
            fetched_at: now,
            expires_at: expiry(now, ttl),
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }
}

/// `now + ttl`, saturating at the largest representable instant
pub(crate) fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Keyed store of fetched payloads
///
/// `put` never overwrites: every call appends a record, and `get` returns the
/// most recently fetched record that has not expired.
#[async_trait]
pub trait FetchCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn put(&self, key: &str, content: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Drop expired records, returning how many went
    async fn purge_expired(&self) -> Result<usize, StoreError>;
}

/// In-process [`FetchCache`]
pub struct MemoryFetchCache {
    entries: RwLock<HashMap<String, Vec<CacheEntry>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryFetchCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored records, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryFetchCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchCache for MemoryFetchCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let hit = entries.get(key).and_then(|records| {
            records
                .iter()
                .filter(|entry| entry.is_fresh(now))
                .max_by_key(|entry| entry.fetched_at)
                .map(|entry| entry.content.clone())
        });
        Ok(hit)
    }

    async fn put(&self, key: &str, content: &str, ttl: Duration) -> Result<(), StoreError> {
        let entry = CacheEntry::new(key, content, self.clock.now(), ttl);
        self.entries
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let mut purged = 0;
        for records in entries.values_mut() {
            let before = records.len();
            records.retain(|entry| entry.is_fresh(now));
            purged += before - records.len();
        }
        entries.retain(|_, records| !records.is_empty());
        Ok(purged)
    }
}
