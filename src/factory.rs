//! Builds the backend/engine pairs for a configured backend type.
//!
//! The backend kind is chosen once here. Everything downstream works with
//! `Arc<dyn Backend>` and never inspects the concrete type again.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::backend::{Backend, CombinedBackend, LokiBackend, PrometheusBackend};
use crate::cache::{CachedBackend, MemoryStore, RedisStore, ResultStore};
use crate::config::{BackendConfig, CacheStoreKind, SherlogConfig};
use crate::engine::QueryEngine;
use crate::error::ConfigurationError;
use crate::llm::LlmClient;
use crate::models::query::QueryLanguage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    MetricsOnly,
    LogsOnly,
    Combined,
}

impl BackendType {
    pub const ALL: [BackendType; 3] = [Self::MetricsOnly, Self::LogsOnly, Self::Combined];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MetricsOnly => "metrics-only",
            Self::LogsOnly => "logs-only",
            Self::Combined => "combined",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::MetricsOnly => "Prometheus metrics only",
            Self::LogsOnly => "Loki logs only",
            Self::Combined => "Combined Prometheus metrics and Loki logs",
        }
    }

    pub fn supported() -> Vec<String> {
        Self::ALL.iter().map(|t| t.as_str().to_string()).collect()
    }

    fn wants_metrics(&self) -> bool {
        matches!(self, Self::MetricsOnly | Self::Combined)
    }

    fn wants_logs(&self) -> bool {
        matches!(self, Self::LogsOnly | Self::Combined)
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| ConfigurationError::UnsupportedBackend {
                requested: s.to_string(),
                supported: Self::supported(),
            })
    }
}

/// Configured backends plus the engine that translates for each of them.
pub struct ObservabilityStack {
    backend_type: BackendType,
    backends: CombinedBackend,
    metrics_engine: Option<QueryEngine>,
    logs_engine: Option<QueryEngine>,
    cached: bool,
}

impl ObservabilityStack {
    /// Assemble a stack from already-built backends, pairing each present
    /// side with an engine for its language. No cache wrapping is applied.
    pub fn from_parts(backends: CombinedBackend, llm: Arc<dyn LlmClient>) -> Self {
        let backend_type = match (backends.metrics().is_some(), backends.logs().is_some()) {
            (true, false) => BackendType::MetricsOnly,
            (false, true) => BackendType::LogsOnly,
            _ => BackendType::Combined,
        };
        let metrics_engine = backends
            .metrics()
            .map(|_| QueryEngine::new(llm.clone(), QueryLanguage::PromQl));
        let logs_engine = backends
            .logs()
            .map(|_| QueryEngine::new(llm.clone(), QueryLanguage::LogQl));
        Self {
            backend_type,
            backends,
            metrics_engine,
            logs_engine,
            cached: false,
        }
    }

    pub fn backend_type(&self) -> BackendType {
        self.backend_type
    }

    pub fn backends(&self) -> &CombinedBackend {
        &self.backends
    }

    pub fn metrics(&self) -> Option<(&Arc<dyn Backend>, &QueryEngine)> {
        self.backends.metrics().zip(self.metrics_engine.as_ref())
    }

    pub fn logs(&self) -> Option<(&Arc<dyn Backend>, &QueryEngine)> {
        self.backends.logs().zip(self.logs_engine.as_ref())
    }

    pub fn is_cached(&self) -> bool {
        self.cached
    }
}

/// Fail-fast construction: every selected backend must have its URL, and
/// no network or LLM call is made here.
pub fn create_backend(
    backend_type: &str,
    llm: Arc<dyn LlmClient>,
    config: &SherlogConfig,
) -> Result<ObservabilityStack, ConfigurationError> {
    let backend_type: BackendType = backend_type.parse()?;
    let shared_store = shared_cache_store(config)?;

    let wrap = |backend: Arc<dyn Backend>, backend_config: &BackendConfig| -> Arc<dyn Backend> {
        if !config.cache.enabled {
            return backend;
        }
        let store: Arc<dyn ResultStore> = match &shared_store {
            Some(store) => store.clone(),
            None => Arc::new(MemoryStore::new().with_max_entries(config.cache.max_entries)),
        };
        Arc::new(CachedBackend::new(backend, store, config.cache_ttl_for(backend_config)))
    };

    let metrics = if backend_type.wants_metrics() {
        let cfg = &config.backend.prometheus;
        let prom: Arc<dyn Backend> = Arc::new(PrometheusBackend::new(cfg)?);
        Some(wrap(prom, cfg))
    } else {
        None
    };
    let logs = if backend_type.wants_logs() {
        let cfg = &config.backend.loki;
        let loki: Arc<dyn Backend> = Arc::new(LokiBackend::new(cfg)?);
        Some(wrap(loki, cfg))
    } else {
        None
    };

    let backends = CombinedBackend::new(metrics, logs);
    tracing::info!(
        "backend stack ready: type={backend_type} backends={:?} cache={}",
        backends.names(),
        config.cache.enabled
    );

    let mut stack = ObservabilityStack::from_parts(backends, llm);
    stack.backend_type = backend_type;
    stack.cached = config.cache.enabled;
    Ok(stack)
}

/// Redis is shared by every backend; the in-memory store is per backend.
fn shared_cache_store(
    config: &SherlogConfig,
) -> Result<Option<Arc<dyn ResultStore>>, ConfigurationError> {
    if !config.cache.enabled {
        return Ok(None);
    }
    match config.cache.store {
        CacheStoreKind::Memory => Ok(None),
        CacheStoreKind::Redis => {
            let store = RedisStore::open(&config.cache.redis_url, config.cache.key_prefix.clone())?;
            Ok(Some(Arc::new(store)))
        }
    }
}
