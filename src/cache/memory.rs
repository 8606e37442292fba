//! In-process result store.
//!
//! Expiry is checked lazily: lookups ignore expired entries and every write
//! prunes them. There is no background sweep. The number of entries is capped;
//! at capacity the oldest entry is evicted.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::{CacheError, ResultStore};
use crate::models::envelope::QueryResult;

#[derive(Clone)]
struct CacheEntry {
    value: QueryResult,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) > self.ttl
    }
}

pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    max_entries: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max.max(1);
        self
    }

    /// Entries currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<QueryResult>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| !e.is_expired(Instant::now()))
            .map(|e| e.value.clone()))
    }

    async fn put(&self, key: &str, value: &QueryResult, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        let pruned = before - entries.len();
        if pruned > 0 {
            debug!("memory cache pruned {pruned} expired entries");
        }

        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.stored_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.clone(),
                stored_at: now,
                ttl,
            },
        );
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.entries.write().await.clear();
        Ok(())
    }
}
