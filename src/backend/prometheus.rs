//! Prometheus HTTP API backend.

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::http::HttpTransport;
use super::{Backend, Signal};
use crate::config::BackendConfig;
use crate::error::{ConfigurationError, QueryError, QueryErrorKind};
use crate::models::envelope::QueryResult;
use crate::models::metrics::*;
use crate::models::query::{TimeRange, TranslatedQuery};
use crate::visualize::{self, GraphOutcome};

const NAME: &str = "prometheus";
const DEFAULT_STEP: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct PrometheusBackend {
    http: HttpTransport,
}

impl PrometheusBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, ConfigurationError> {
        Ok(Self {
            http: HttpTransport::new(NAME, config)?,
        })
    }
}

#[async_trait]
impl Backend for PrometheusBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn signal(&self) -> Signal {
        Signal::Metrics
    }

    async fn query(
        &self,
        query: &TranslatedQuery,
        cancel: &CancellationToken,
    ) -> Result<QueryResult, QueryError> {
        if query.text.trim().is_empty() {
            return Err(QueryError::invalid_input(NAME, &query.text, "empty query"));
        }
        let params = [("query", query.text.clone())];
        let raw = self
            .http
            .get_json("/api/v1/query", &params, &query.text, cancel)
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
        let step = range.step.unwrap_or(DEFAULT_STEP);
        let params = [
            ("query", query.text.clone()),
            ("start", unix_secs(range.start)),
            ("end", unix_secs(range.end)),
            ("step", format!("{}", step.as_secs_f64())),
        ];
        let raw = self
            .http
            .get_json("/api/v1/query_range", &params, &query.text, cancel)
            .await?;
        self.format_result(&raw).map_err(|e| e.with_query(&query.text))
    }

    fn format_result(&self, raw: &serde_json::Value) -> Result<QueryResult, QueryError> {
        format_prometheus(raw).map(QueryResult::Metrics)
    }

    fn generate_graph(&self, data: &QueryResult, title: &str) -> GraphOutcome {
        visualize::time_series(data, title)
    }

    async fn ping(&self, cancel: &CancellationToken) -> Result<(), QueryError> {
        self.http.check_ready("/-/ready", cancel).await
    }
}

fn unix_secs(t: chrono::DateTime<chrono::Utc>) -> String {
    format!("{:.3}", t.timestamp_millis() as f64 / 1000.0)
}

/// Normalize a Prometheus `/api/v1/query*` payload (also used for Loki metric queries).
pub(crate) fn format_prometheus(raw: &serde_json::Value) -> Result<MetricsResult, QueryError> {
    let envelope: PromEnvelope = serde_json::from_value(raw.clone())
        .map_err(|e| QueryError::malformed(NAME, "", format!("unexpected response shape: {e}")))?;

    if envelope.status != "success" {
        let msg = envelope.error.unwrap_or_else(|| "unknown error".to_string());
        let kind = envelope.error_type.unwrap_or_else(|| "error".to_string());
        return Err(QueryError::new(NAME, "", QueryErrorKind::Remote, format!("{kind}: {msg}")));
    }

    let data = envelope
        .data
        .ok_or_else(|| QueryError::malformed(NAME, "", "response has no data"))?;

    match data.result_type.as_str() {
        "vector" => {
            let items: Vec<PromVectorItem> = decode(data.result)?;
            let samples = items
                .into_iter()
                .map(|item| {
                    Ok(VectorSample {
                        metric: item.metric,
                        timestamp: item.value.0,
                        value: sample(&item.value.1)?,
                    })
                })
                .collect::<Result<Vec<_>, QueryError>>()?;
            Ok(MetricsResult::Vector(samples))
        }
        "matrix" => {
            let items: Vec<PromMatrixItem> = decode(data.result)?;
            let series = items
                .into_iter()
                .map(|item| {
                    let values = item
                        .values
                        .iter()
                        .map(|(ts, v)| Ok(SamplePoint { timestamp: *ts, value: sample(v)? }))
                        .collect::<Result<Vec<_>, QueryError>>()?;
                    Ok(MatrixSeries {
                        metric: item.metric,
                        values,
                    })
                })
                .collect::<Result<Vec<_>, QueryError>>()?;
            Ok(MetricsResult::Matrix(series))
        }
        "scalar" => {
            let (ts, v): (f64, String) = decode(data.result)?;
            Ok(MetricsResult::Vector(vec![VectorSample {
                metric: LabelSet::new(),
                timestamp: ts,
                value: sample(&v)?,
            }]))
        }
        other => Err(QueryError::malformed(
            NAME,
            "",
            format!("unsupported result type: {other}"),
        )),
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, QueryError> {
    serde_json::from_value(value)
        .map_err(|e| QueryError::malformed(NAME, "", format!("unexpected result shape: {e}")))
}

fn sample(raw: &str) -> Result<f64, QueryError> {
    parse_sample_value(raw).map_err(|e| QueryError::malformed(NAME, "", e))
}
