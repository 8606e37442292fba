//! Backend capability interface and the concrete metrics/logs backends.

pub mod combined;
pub mod http;
pub mod loki;
pub mod prometheus;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::error::QueryError;
use crate::models::envelope::QueryResult;
use crate::models::query::{TimeRange, TranslatedQuery};
use crate::visualize::GraphOutcome;

pub use combined::CombinedBackend;
pub use loki::LokiBackend;
pub use prometheus::PrometheusBackend;

/// What kind of telemetry a backend serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Metrics,
    Logs,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metrics => f.write_str("metrics"),
            Self::Logs => f.write_str("logs"),
        }
    }
}

/// Operations every metrics or logs source supports.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    fn signal(&self) -> Signal;

    /// Instant (point-in-time) query.
    async fn query(
        &self,
        query: &TranslatedQuery,
        cancel: &CancellationToken,
    ) -> Result<QueryResult, QueryError>;

    /// Time-bounded query. Rejects `start > end` before touching the network.
    async fn query_range(
        &self,
        query: &TranslatedQuery,
        range: &TimeRange,
        cancel: &CancellationToken,
    ) -> Result<QueryResult, QueryError>;

    /// Normalize a backend-native payload. Pure: same input, same output.
    fn format_result(&self, raw: &serde_json::Value) -> Result<QueryResult, QueryError>;

    fn generate_graph(&self, _data: &QueryResult, _title: &str) -> GraphOutcome {
        GraphOutcome::Unsupported
    }

    /// Readiness check against the remote service.
    async fn ping(&self, cancel: &CancellationToken) -> Result<(), QueryError>;
}
