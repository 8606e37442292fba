//! Shared HTTP plumbing for remote query backends.
//!
//! One `reqwest::Client` (and so one connection pool) per backend instance,
//! scoped to a single base URL, with a fixed per-call timeout and the
//! backend's retry policy.

use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::config::BackendConfig;
use crate::error::{ConfigurationError, QueryError, QueryErrorKind};
use crate::retry::{RetryError, RetryPolicy, retry_with_backoff};

#[derive(Debug, Clone)]
pub struct HttpTransport {
    backend: &'static str,
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    /// Fails fast when the base URL is missing or malformed.
    pub fn new(backend: &'static str, config: &BackendConfig) -> Result<Self, ConfigurationError> {
        let base_url = config
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ConfigurationError::MissingField {
                backend: backend.to_string(),
                field: "url".to_string(),
            })?;
        reqwest::Url::parse(base_url).map_err(|e| ConfigurationError::InvalidValue {
            field: format!("{backend}.url"),
            reason: e.to_string(),
        })?;
        RetryPolicy::check_multiplier(config.retry_backoff).map_err(|reason| {
            ConfigurationError::InvalidValue {
                field: format!("{backend}.retry_backoff"),
                reason,
            }
        })?;
        if config.timeout_secs == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: format!("{backend}.timeout_secs"),
                reason: "must be greater than zero".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigurationError::HttpClient(e.to_string()))?;

        Ok(Self {
            backend,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            retry: config.retry_policy(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `{base_url}{path}` and decode the JSON body, retrying transient failures.
    pub async fn get_json(
        &self,
        path: &str,
        params: &[(&str, String)],
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, QueryError> {
        let url = format!("{}{}", self.base_url, path);
        let operation = format!("{} {path}", self.backend);

        retry_with_backoff(&self.retry, cancel, &operation, |_| {
            self.get_json_once(&url, params, query)
        })
        .await
        .map_err(|e| match e {
            RetryError::Cancelled { attempts } => QueryError::new(
                self.backend,
                query,
                QueryErrorKind::Cancelled,
                format!("request cancelled after {attempts} attempt(s)"),
            ),
            RetryError::Failed { source, .. } => source,
        })
    }

    async fn get_json_once(
        &self,
        url: &str,
        params: &[(&str, String)],
        query: &str,
    ) -> Result<serde_json::Value, QueryError> {
        let resp = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| self.transport_error(query, e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| self.transport_error(query, e))?;

        if !status.is_success() {
            return Err(self.status_error(query, status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            QueryError::malformed(self.backend, query, format!("invalid JSON response: {e}"))
        })
    }

    /// GET a readiness endpoint; any 2xx counts as ready. Not retried.
    pub async fn check_ready(&self, path: &str, cancel: &CancellationToken) -> Result<(), QueryError> {
        let url = format!("{}{}", self.base_url, path);
        let send = self.client.get(&url).send();
        let resp = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(QueryError::new(self.backend, path, QueryErrorKind::Cancelled, "readiness check cancelled"));
            }
            r = send => r.map_err(|e| self.transport_error(path, e))?,
        };
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(self.status_error(path, status, &body))
        }
    }

    fn transport_error(&self, query: &str, e: reqwest::Error) -> QueryError {
        let kind = if e.is_timeout() {
            QueryErrorKind::Timeout
        } else if e.is_decode() {
            QueryErrorKind::MalformedPayload
        } else {
            QueryErrorKind::Transport
        };
        QueryError::new(self.backend, query, kind, e.to_string())
    }

    fn status_error(&self, query: &str, status: StatusCode, body: &str) -> QueryError {
        // Prometheus and Loki both return `{"status":"error","error":"..."}` on 4xx.
        let detail = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or_else(|| body.trim().chars().take(500).collect());
        QueryError::new(
            self.backend,
            query,
            QueryErrorKind::Status(status.as_u16()),
            format!("HTTP {status}: {detail}"),
        )
    }
}
