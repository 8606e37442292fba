use serde::{Deserialize, Serialize};

use super::log::LogsResult;
use super::metrics::MetricsResult;
use super::query::QueryScope;
use crate::error::{ConfigurationError, QueryError, QueryErrorKind, TranslationError};
use crate::visualize::Graph;

/// Every backend result is normalized into exactly one of these shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum QueryResult {
    Metrics(MetricsResult),
    Logs(LogsResult),
}

impl QueryResult {
    pub fn as_metrics(&self) -> Option<&MetricsResult> {
        match self {
            Self::Metrics(m) => Some(m),
            Self::Logs(_) => None,
        }
    }

    pub fn as_logs(&self) -> Option<&LogsResult> {
        match self {
            Self::Logs(l) => Some(l),
            Self::Metrics(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    /// Bad request parameters (time range, step). Nothing was executed.
    InvalidInput,
    Translation,
    Provider,
    Query,
    Cancelled,
}

/// Where in the request lifecycle a scope failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Received,
    Translating,
    Executing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub phase: Phase,
    pub message: String,
    /// The translated query when one exists, otherwise the natural-language input.
    pub query: String,
}

impl ErrorDetail {
    pub fn configuration(err: &ConfigurationError, query: &str) -> Self {
        Self {
            kind: ErrorKind::Configuration,
            phase: Phase::Received,
            message: err.to_string(),
            query: query.to_string(),
        }
    }

    pub fn invalid_input(message: impl Into<String>, query: &str) -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
            phase: Phase::Received,
            message: message.into(),
            query: query.to_string(),
        }
    }

    pub fn translation(err: &TranslationError, query: &str) -> Self {
        let kind = if err.is_provider() {
            ErrorKind::Provider
        } else {
            ErrorKind::Translation
        };
        Self {
            kind,
            phase: Phase::Translating,
            message: err.to_string(),
            query: query.to_string(),
        }
    }

    pub fn execution(err: &QueryError) -> Self {
        let kind = match err.kind {
            QueryErrorKind::Cancelled => ErrorKind::Cancelled,
            QueryErrorKind::InvalidInput => ErrorKind::InvalidInput,
            _ => ErrorKind::Query,
        };
        Self {
            kind,
            phase: Phase::Executing,
            message: err.to_string(),
            query: err.query.clone(),
        }
    }
}

/// Outcome of one scope (metrics or logs) of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ScopeOutcome {
    Success {
        query: String,
        result: QueryResult,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        graph: Option<Graph>,
    },
    Error(ErrorDetail),
}

impl ScopeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn result(&self) -> Option<&QueryResult> {
        match self {
            Self::Success { result, .. } => Some(result),
            Self::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorDetail> {
        match self {
            Self::Error(e) => Some(e),
            Self::Success { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Completed,
    /// Combined scope where one side succeeded and the other failed.
    Partial,
    Failed,
}

/// What the orchestrator hands back to the web layer. Populated per requested scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub request_id: String,
    pub query: String,
    pub scope: QueryScope,
    pub status: EnvelopeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ScopeOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<ScopeOutcome>,
}

impl ResponseEnvelope {
    pub fn new(
        request_id: impl Into<String>,
        query: impl Into<String>,
        scope: QueryScope,
        metrics: Option<ScopeOutcome>,
        logs: Option<ScopeOutcome>,
    ) -> Self {
        let outcomes: Vec<&ScopeOutcome> = metrics.iter().chain(logs.iter()).collect();
        let ok = outcomes.iter().filter(|o| o.is_success()).count();
        let status = if outcomes.is_empty() || ok == 0 {
            EnvelopeStatus::Failed
        } else if ok == outcomes.len() {
            EnvelopeStatus::Completed
        } else {
            EnvelopeStatus::Partial
        };
        Self {
            request_id: request_id.into(),
            query: query.into(),
            scope,
            status,
            metrics,
            logs,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &ErrorDetail> {
        self.metrics
            .iter()
            .chain(self.logs.iter())
            .filter_map(ScopeOutcome::error)
    }
}
