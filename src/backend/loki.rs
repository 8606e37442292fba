//! Loki HTTP API backend.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

use super::http::HttpTransport;
use super::prometheus::format_prometheus;
use super::{Backend, Signal};
use crate::config::BackendConfig;
use crate::error::{ConfigurationError, QueryError, QueryErrorKind};
use crate::models::envelope::QueryResult;
use crate::models::log::{LogEntry, LogStream, LogsResult, LokiStreamItem};
use crate::models::metrics::LabelSet;
use crate::models::query::{TimeRange, TranslatedQuery};

const NAME: &str = "loki";
const DEFAULT_LIMIT: u32 = 1000;

#[derive(Debug, Clone)]
pub struct LokiBackend {
    http: HttpTransport,
    limit: u32,
}

impl LokiBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, ConfigurationError> {
        Ok(Self {
            http: HttpTransport::new(NAME, config)?,
            limit: DEFAULT_LIMIT,
        })
    }
}

#[async_trait]
impl Backend for LokiBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn signal(&self) -> Signal {
        Signal::Logs
    }

    async fn query(
        &self,
        query: &TranslatedQuery,
        cancel: &CancellationToken,
    ) -> Result<QueryResult, QueryError> {
        if query.text.trim().is_empty() {
            return Err(QueryError::invalid_input(NAME, &query.text, "empty query"));
        }
        let params = [
            ("query", query.text.clone()),
            ("limit", self.limit.to_string()),
        ];
        let raw = self
            .http
            .get_json("/loki/api/v1/query", &params, &query.text, cancel)
            .await?;
        self.format_result(&raw).map_err(|e| e.with_query(&query.text))
    }

    async fn query_range(
        &self,
        query: &TranslatedQuery,
        range: &TimeRange,
        cancel: &CancellationToken,
    ) -> Result<QueryResult, QueryError> {
        range.validate(NAME, &query.text)?;
        if query.text.trim().is_empty() {
            return Err(QueryError::invalid_input(NAME, &query.text, "empty query"));
        }
        // Loki expects nanosecond timestamps.
        let mut params = vec![
            ("query", query.text.clone()),
            ("start", nanos(range.start).to_string()),
            ("end", nanos(range.end).to_string()),
            ("limit", self.limit.to_string()),
            ("direction", "forward".to_string()),
        ];
        if let Some(step) = range.step {
            params.push(("step", format!("{}s", step.as_secs_f64())));
        }
        let raw = self
            .http
            .get_json("/loki/api/v1/query_range", &params, &query.text, cancel)
            .await?;
        self.format_result(&raw).map_err(|e| e.with_query(&query.text))
    }

    fn format_result(&self, raw: &serde_json::Value) -> Result<QueryResult, QueryError> {
        let status = raw.get("status").and_then(|s| s.as_str());
        if status != Some("success") {
            let msg = raw
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown error");
            return Err(QueryError::new(NAME, "", QueryErrorKind::Remote, msg));
        }
        let result_type = raw
            .pointer("/data/resultType")
            .and_then(|t| t.as_str())
            .ok_or_else(|| QueryError::malformed(NAME, "", "response has no resultType"))?;

        match result_type {
            "streams" => {
                let result = raw.pointer("/data/result").cloned().unwrap_or_default();
                let items: Vec<LokiStreamItem> = serde_json::from_value(result).map_err(|e| {
                    QueryError::malformed(NAME, "", format!("unexpected streams shape: {e}"))
                })?;
                group_streams(items).map(QueryResult::Logs)
            }
            // Metric LogQL (count_over_time, rate, ...) answers in Prometheus shapes.
            "vector" | "matrix" | "scalar" => format_prometheus(raw)
                .map(QueryResult::Metrics)
                .map_err(|e| QueryError { backend: NAME.to_string(), ..e }),
            other => Err(QueryError::malformed(
                NAME,
                "",
                format!("unsupported result type: {other}"),
            )),
        }
    }

    async fn ping(&self, cancel: &CancellationToken) -> Result<(), QueryError> {
        self.http.check_ready("/ready", cancel).await
    }
}

fn nanos(t: chrono::DateTime<chrono::Utc>) -> i64 {
    t.timestamp_nanos_opt()
        .unwrap_or_else(|| t.timestamp().saturating_mul(1_000_000_000))
}

/// Merge entries into one stream per label-set and sort each stream by
/// timestamp. Upstream ordering is not trusted.
fn group_streams(items: Vec<LokiStreamItem>) -> Result<LogsResult, QueryError> {
    let mut map: BTreeMap<LabelSet, Vec<LogEntry>> = BTreeMap::new();
    for item in items {
        let entries = map.entry(item.stream).or_default();
        for value in item.values {
            entries.push(parse_entry(&value)?);
        }
    }
    let streams = map
        .into_iter()
        .map(|(labels, mut entries)| {
            // Stable, so equal timestamps keep arrival order.
            entries.sort_by_key(|e| e.timestamp_ns);
            LogStream { labels, entries }
        })
        .collect();
    Ok(LogsResult { streams })
}

fn parse_entry(value: &[serde_json::Value]) -> Result<LogEntry, QueryError> {
    let (Some(ts), Some(line)) = (value.first(), value.get(1)) else {
        return Err(QueryError::malformed(NAME, "", "log entry needs a timestamp and a line"));
    };
    let timestamp_ns = match ts {
        serde_json::Value::String(s) => s.parse::<i64>().ok(),
        serde_json::Value::Number(n) => n.as_i64(),
        _ => None,
    }
    .ok_or_else(|| QueryError::malformed(NAME, "", format!("invalid log timestamp: {ts}")))?;
    let line = line
        .as_str()
        .ok_or_else(|| QueryError::malformed(NAME, "", "log line is not a string"))?;
    Ok(LogEntry {
        timestamp_ns,
        line: line.to_string(),
    })
}
