use serde::{Deserialize, Serialize};

use super::query::{QueryContext, QueryLanguage, QueryScope};

/// Body of `POST /api/v1/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default = "default_scope")]
    pub scope: QueryScope,
    #[serde(default)]
    pub context: QueryContext,
    /// Also post the answer to the configured Slack webhook.
    #[serde(default)]
    pub relay: bool,
}

fn default_scope() -> QueryScope {
    QueryScope::Combined
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslateParams {
    pub query: String,
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExplainRequest {
    pub query: String,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "promql".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct ExplainResponse {
    pub query: String,
    pub language: QueryLanguage,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendTypeInfo {
    #[serde(rename = "type")]
    pub backend_type: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendsResponse {
    pub active: String,
    pub configured: Vec<String>,
    pub cache_enabled: bool,
    pub supported: Vec<BackendTypeInfo>,
}
