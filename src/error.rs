//! Error taxonomy shared by backends, the query engine and the orchestrator.

use thiserror::Error;

/// Invalid or missing backend configuration. Always raised at construction time.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("unsupported backend type '{requested}'; supported types: {}", .supported.join(", "))]
    UnsupportedBackend {
        requested: String,
        supported: Vec<String>,
    },
    #[error("missing required option '{field}' for the {backend} backend")]
    MissingField { backend: String, field: String },
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
    #[error("failed to set up cache store: {0}")]
    Cache(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Rejected before any network call (bad time range, empty query).
    InvalidInput,
    /// Connection-level failure.
    Transport,
    Timeout,
    /// Non-success HTTP status from the backend.
    Status(u16),
    MalformedPayload,
    /// The backend answered 200 but reported `status: error` in its payload.
    Remote,
    Cancelled,
}

impl QueryErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Status(_) => "status",
            Self::MalformedPayload => "malformed_payload",
            Self::Remote => "remote",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Backend execution failure. Carries the offending query and the backend name.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{backend} query `{query}` failed ({}): {message}", .kind.as_str())]
pub struct QueryError {
    pub backend: String,
    pub query: String,
    pub kind: QueryErrorKind,
    pub message: String,
}

impl QueryError {
    pub fn new(
        backend: impl Into<String>,
        query: impl Into<String>,
        kind: QueryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            backend: backend.into(),
            query: query.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_input(
        backend: impl Into<String>,
        query: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(backend, query, QueryErrorKind::InvalidInput, message)
    }

    pub fn malformed(
        backend: impl Into<String>,
        query: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(backend, query, QueryErrorKind::MalformedPayload, message)
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Connection errors, timeouts and 5xx responses. 4xx is permanent.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            QueryErrorKind::Transport | QueryErrorKind::Timeout => true,
            QueryErrorKind::Status(code) => (500..600).contains(&code),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Auth,
    RateLimited,
    Network,
    Timeout,
    Status(u16),
    /// The provider answered but the body had no completion text.
    Malformed,
    Cancelled,
}

/// LLM-provider level failure, distinct from unusable model output.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("LLM provider {provider} failed ({kind:?}): {message}")]
pub struct ProviderError {
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        match self.kind {
            ProviderErrorKind::RateLimited
            | ProviderErrorKind::Network
            | ProviderErrorKind::Timeout => true,
            ProviderErrorKind::Status(code) => (500..600).contains(&code),
            _ => false,
        }
    }
}

/// The LLM produced no usable query, or the channel itself failed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TranslationError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("model returned an empty query")]
    Empty,
    #[error("model returned prose instead of a query: {output}")]
    Prose { output: String },
    #[error("model output is not valid {language}: {reason} (output: {output})")]
    InvalidSyntax {
        language: String,
        reason: String,
        output: String,
    },
}

impl TranslationError {
    pub fn is_provider(&self) -> bool {
        matches!(self, Self::Provider(_))
    }
}
