//! Slack relay for answered questions (incoming webhook, mrkdwn text).

use std::time::Duration;
use thiserror::Error;

use crate::models::envelope::{QueryResult, ResponseEnvelope, ScopeOutcome};
use crate::models::metrics::{LabelSet, MetricsResult};

const SUMMARY_SERIES: usize = 3;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("slack webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("slack webhook returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone)]
pub struct SlackRelay {
    webhook_url: String,
    client: reqwest::Client,
}

impl SlackRelay {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            webhook_url: webhook_url.into(),
            client,
        })
    }

    pub async fn post(&self, envelope: &ResponseEnvelope) -> Result<(), RelayError> {
        let payload = serde_json::json!({ "text": format_envelope(envelope) });
        let resp = self.client.post(&self.webhook_url).json(&payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::Status {
                status: status.as_u16(),
                body,
            });
        }
        tracing::debug!("relayed request {} to slack", envelope.request_id);
        Ok(())
    }
}

pub fn format_envelope(envelope: &ResponseEnvelope) -> String {
    let mut out = vec![format!("*Question:* {}", envelope.query)];
    for (scope, outcome) in [("Metrics", &envelope.metrics), ("Logs", &envelope.logs)] {
        let Some(outcome) = outcome else { continue };
        match outcome {
            ScopeOutcome::Success { query, result, .. } => {
                out.push(format!("*{scope} query:*\n```{query}```"));
                format_result(result, &mut out);
            }
            ScopeOutcome::Error(err) => {
                out.push(format!(":warning: *{scope} failed* ({:?}): {}", err.kind, err.message));
            }
        }
    }
    out.join("\n")
}

fn format_result(result: &QueryResult, out: &mut Vec<String>) {
    match result {
        QueryResult::Metrics(MetricsResult::Vector(samples)) => {
            out.push("*Results:*".to_string());
            if samples.is_empty() {
                out.push("_no data_".to_string());
            }
            for s in samples {
                out.push(format!("• {}: {}", format_labels(&s.metric), format_value(s.value)));
            }
        }
        QueryResult::Metrics(MetricsResult::Matrix(series)) => {
            out.push(format!("*Results:* {} series", series.len()));
            for s in series.iter().take(SUMMARY_SERIES) {
                out.push(format!("• {}: {} data points", format_labels(&s.metric), s.values.len()));
            }
        }
        QueryResult::Logs(logs) => {
            out.push(format!(
                "*Results:* {} log lines in {} streams",
                logs.entry_count(),
                logs.streams.len()
            ));
            for s in logs.streams.iter().take(SUMMARY_SERIES) {
                out.push(format!("• {}: {} entries", format_labels(&s.labels), s.entries.len()));
            }
        }
    }
}

fn format_labels(labels: &LabelSet) -> String {
    if labels.is_empty() {
        return "{}".to_string();
    }
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_value(value: f64) -> String {
    if value.abs() >= 1_000_000.0 {
        format!("{:.2}M", value / 1_000_000.0)
    } else if value.abs() >= 1_000.0 {
        format!("{:.2}K", value / 1_000.0)
    } else {
        format!("{value:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::envelope::{ErrorDetail, ErrorKind, Phase};
    use crate::models::metrics::VectorSample;
    use crate::models::query::QueryScope;

    #[test]
    fn values_get_unit_suffixes() {
        assert_eq!(format_value(42.0), "42.00");
        assert_eq!(format_value(1_500.0), "1.50K");
        assert_eq!(format_value(-2_500_000.0), "-2.50M");
    }

    #[test]
    fn envelope_lists_results_and_errors() {
        let mut labels = LabelSet::new();
        labels.insert("service".into(), "checkout".into());
        let env = ResponseEnvelope::new(
            "req-1",
            "checkout throughput",
            QueryScope::Combined,
            Some(ScopeOutcome::Success {
                query: "sum(rate(http_requests_total[5m]))".into(),
                result: QueryResult::Metrics(MetricsResult::Vector(vec![VectorSample {
                    metric: labels,
                    timestamp: 1.0,
                    value: 1234.0,
                }])),
                graph: None,
            }),
            Some(ScopeOutcome::Error(ErrorDetail {
                kind: ErrorKind::Query,
                phase: Phase::Executing,
                message: "loki unreachable".into(),
                query: "{service=\"checkout\"}".into(),
            })),
        );
        let text = format_envelope(&env);
        assert!(text.contains("```sum(rate(http_requests_total[5m]))```"));
        assert!(text.contains("• service=checkout: 1.23K"));
        assert!(text.contains("*Logs failed*"));
        assert!(text.contains("loki unreachable"));
    }
}
