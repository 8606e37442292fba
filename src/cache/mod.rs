//! Lexical result cache in front of a backend.
//!
//! Keys are derived from the query text and time parameters only, so two
//! spellings of the same question are cached separately.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::backend::{Backend, Signal};
use crate::error::QueryError;
use crate::models::envelope::QueryResult;
use crate::models::query::{TimeRange, TranslatedQuery};
use crate::visualize::GraphOutcome;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store error: {0}")]
    Store(String),
    #[error("cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Storage for cached results. Implementations must honor the TTL passed to
/// `put` and treat expired entries as absent.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<QueryResult>, CacheError>;

    async fn put(&self, key: &str, value: &QueryResult, ttl: Duration) -> Result<(), CacheError>;

    async fn clear(&self) -> Result<(), CacheError>;
}

/// Hex SHA-256 over backend name, query text and time parameters.
/// Instant queries hash a fixed marker in place of the range.
pub fn cache_key(backend: &str, query: &TranslatedQuery, range: Option<&TimeRange>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(backend.as_bytes());
    hasher.update([0u8]);
    hasher.update(query.text.as_bytes());
    hasher.update([0u8]);
    match range {
        None => hasher.update(b"instant"),
        Some(r) => {
            let step = r
                .step
                .map(|s| s.as_millis().to_string())
                .unwrap_or_else(|| "-".to_string());
            hasher.update(
                format!(
                    "range:{}:{}:{step}",
                    r.start.timestamp_micros(),
                    r.end.timestamp_micros()
                )
                .as_bytes(),
            );
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Wraps a backend and serves repeated queries from a `ResultStore`.
pub struct CachedBackend {
    inner: Arc<dyn Backend>,
    store: Arc<dyn ResultStore>,
    ttl: Duration,
}

impl CachedBackend {
    pub fn new(inner: Arc<dyn Backend>, store: Arc<dyn ResultStore>, ttl: Duration) -> Self {
        Self { inner, store, ttl }
    }

    async fn lookup(&self, key: &str) -> Option<QueryResult> {
        match self.store.get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!("{}: cache read failed, treating as miss: {e}", self.inner.name());
                None
            }
        }
    }

    async fn store(&self, key: &str, result: &QueryResult) {
        if let Err(e) = self.store.put(key, result, self.ttl).await {
            tracing::warn!("{}: cache write failed: {e}", self.inner.name());
        }
    }
}

#[async_trait]
impl Backend for CachedBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn signal(&self) -> Signal {
        self.inner.signal()
    }

    async fn query(
        &self,
        query: &TranslatedQuery,
        cancel: &CancellationToken,
    ) -> Result<QueryResult, QueryError> {
        let key = cache_key(self.name(), query, None);
        if let Some(hit) = self.lookup(&key).await {
            tracing::debug!("{}: cache hit for `{}`", self.name(), query.text);
            return Ok(hit);
        }
        tracing::debug!("{}: cache miss for `{}`", self.name(), query.text);
        let result = self.inner.query(query, cancel).await?;
        self.store(&key, &result).await;
        Ok(result)
    }

    async fn query_range(
        &self,
        query: &TranslatedQuery,
        range: &TimeRange,
        cancel: &CancellationToken,
    ) -> Result<QueryResult, QueryError> {
        range.validate(self.name(), &query.text)?;
        let key = cache_key(self.name(), query, Some(range));
        if let Some(hit) = self.lookup(&key).await {
            tracing::debug!("{}: cache hit for range `{}`", self.name(), query.text);
            return Ok(hit);
        }
        tracing::debug!("{}: cache miss for range `{}`", self.name(), query.text);
        let result = self.inner.query_range(query, range, cancel).await?;
        self.store(&key, &result).await;
        Ok(result)
    }

    fn format_result(&self, raw: &serde_json::Value) -> Result<QueryResult, QueryError> {
        self.inner.format_result(raw)
    }

    fn generate_graph(&self, data: &QueryResult, title: &str) -> GraphOutcome {
        self.inner.generate_graph(data, title)
    }

    async fn ping(&self, cancel: &CancellationToken) -> Result<(), QueryError> {
        self.inner.ping(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryErrorKind;
    use crate::models::metrics::{LabelSet, MetricsResult, VectorSample};
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingBackend {
        calls: AtomicU32,
    }

    impl CountingBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn answer(&self) -> QueryResult {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            QueryResult::Metrics(MetricsResult::Vector(vec![VectorSample {
                metric: LabelSet::new(),
                timestamp: 1_700_000_000.0,
                value: n as f64,
            }]))
        }
    }

    #[async_trait]
    impl Backend for CountingBackend {
        fn name(&self) -> &str {
            "stub"
        }

        fn signal(&self) -> Signal {
            Signal::Metrics
        }

        async fn query(
            &self,
            _query: &TranslatedQuery,
            _cancel: &CancellationToken,
        ) -> Result<QueryResult, QueryError> {
            Ok(self.answer())
        }

        async fn query_range(
            &self,
            _query: &TranslatedQuery,
            _range: &TimeRange,
            _cancel: &CancellationToken,
        ) -> Result<QueryResult, QueryError> {
            Ok(self.answer())
        }

        fn format_result(&self, _raw: &serde_json::Value) -> Result<QueryResult, QueryError> {
            Err(QueryError::malformed("stub", "", "unused"))
        }

        async fn ping(&self, _cancel: &CancellationToken) -> Result<(), QueryError> {
            Ok(())
        }
    }

    fn cached(inner: Arc<CountingBackend>, ttl: Duration) -> CachedBackend {
        CachedBackend::new(inner, Arc::new(MemoryStore::new()), ttl)
    }

    #[tokio::test]
    async fn second_identical_query_is_served_from_cache() {
        let inner = CountingBackend::new();
        let backend = cached(inner.clone(), Duration::from_secs(600));
        let cancel = CancellationToken::new();
        let q = TranslatedQuery::promql("sum(rate(http_requests_total[5m]))");
        let end = Utc::now();
        let range = TimeRange::new(end - chrono::Duration::hours(1), end)
            .with_step(Duration::from_secs(60));

        let first = backend.query_range(&q, &range, &cancel).await.unwrap();
        let second = backend.query_range(&q, &range, &cancel).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.calls(), 1);

        backend.query(&q, &cancel).await.unwrap();
        backend.query(&q, &cancel).await.unwrap();
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_trigger_a_fresh_call() {
        let inner = CountingBackend::new();
        let ttl = Duration::from_secs(30);
        let backend = cached(inner.clone(), ttl);
        let cancel = CancellationToken::new();
        let q = TranslatedQuery::promql("up");

        backend.query(&q, &cancel).await.unwrap();
        tokio::time::advance(ttl).await;
        backend.query(&q, &cancel).await.unwrap();
        assert_eq!(inner.calls(), 1);

        tokio::time::advance(Duration::from_millis(1)).await;
        backend.query(&q, &cancel).await.unwrap();
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn inverted_range_never_reaches_the_backend() {
        let inner = CountingBackend::new();
        let backend = cached(inner.clone(), Duration::from_secs(600));
        let end = Utc::now();
        let range = TimeRange::new(end + chrono::Duration::minutes(1), end);
        let err = backend
            .query_range(&TranslatedQuery::promql("up"), &range, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::InvalidInput);
        assert_eq!(inner.calls(), 0);
    }

    #[test]
    fn keys_are_lexical() {
        let end = Utc::now();
        let range = TimeRange::new(end - chrono::Duration::hours(1), end);
        let a = TranslatedQuery::promql("sum(up)");
        let b = TranslatedQuery::promql("sum (up)");
        assert_eq!(cache_key("p", &a, Some(&range)), cache_key("p", &a, Some(&range)));
        assert_ne!(cache_key("p", &a, Some(&range)), cache_key("p", &b, Some(&range)));
        assert_ne!(cache_key("p", &a, None), cache_key("p", &a, Some(&range)));
        let stepped = range.clone().with_step(Duration::from_secs(30));
        assert_ne!(cache_key("p", &a, Some(&range)), cache_key("p", &a, Some(&stepped)));
        assert_eq!(cache_key("p", &a, None).len(), 64);
    }
}
