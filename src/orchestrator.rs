//! The single entry point the web layer calls: question in, envelope out.
//!
//! Per request: received, translating, executing, formatting, completed.
//! Nothing escapes as an `Err`; every failure lands in the envelope.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::backend::{Backend, Signal};
use crate::engine::QueryEngine;
use crate::error::ConfigurationError;
use crate::factory::ObservabilityStack;
use crate::models::envelope::{ErrorDetail, QueryResult, ResponseEnvelope, ScopeOutcome};
use crate::models::query::{
    Query, QueryContext, QueryLanguage, QueryScope, TimeRange, TranslatedQuery, align_up,
    duration_from_secs, parse_duration,
};

const DEFAULT_LOG_LOOKBACK: Duration = Duration::from_secs(3600);
const DEFAULT_STEP: Duration = Duration::from_secs(15);
/// Bucket for the end of windows relative to now, so repeats hit the cache.
const RELATIVE_ALIGNMENT: Duration = Duration::from_secs(60);

/// How a scope is executed against its backend.
#[derive(Debug, Clone, PartialEq)]
enum Window {
    Instant,
    Range(TimeRange),
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    pub name: String,
    pub signal: Signal,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Orchestrator {
    stack: ObservabilityStack,
}

impl Orchestrator {
    pub fn new(stack: ObservabilityStack) -> Self {
        Self { stack }
    }

    pub fn stack(&self) -> &ObservabilityStack {
        &self.stack
    }

    pub async fn answer(
        &self,
        question: &str,
        scope: QueryScope,
        context: QueryContext,
        cancel: &CancellationToken,
    ) -> ResponseEnvelope {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("answer", request_id = %request_id, scope = ?scope);
        async {
            tracing::info!("received question: {question}");
            let query = Query::new(question).with_context(context);

            let windows = range_from_context(&query.context).and_then(|range| {
                let metrics = match &range {
                    Some(r) => Window::Range(r.clone().with_step(r.step.unwrap_or(DEFAULT_STEP))),
                    None => Window::Instant,
                };
                let logs = match range {
                    Some(r) => r,
                    None => TimeRange::last(DEFAULT_LOG_LOOKBACK, RELATIVE_ALIGNMENT)?,
                };
                Ok((metrics, Window::Range(logs)))
            });
            let (metrics_window, logs_window) = match windows {
                Ok(windows) => windows,
                Err(msg) => {
                    tracing::warn!("rejecting request: {msg}");
                    let detail = || ScopeOutcome::Error(ErrorDetail::invalid_input(&msg, question));
                    return ResponseEnvelope::new(
                        &request_id,
                        question,
                        scope,
                        scope.includes_metrics().then(detail),
                        scope.includes_logs().then(detail),
                    );
                }
            };

            let (metrics, logs) = match scope {
                QueryScope::Metrics => (
                    Some(self.run_scope(Signal::Metrics, &query, &metrics_window, cancel).await),
                    None,
                ),
                QueryScope::Logs => (
                    None,
                    Some(self.run_scope(Signal::Logs, &query, &logs_window, cancel).await),
                ),
                QueryScope::Combined => {
                    // Independent failure domains: each side reports its own outcome.
                    let (m, l) = tokio::join!(
                        self.run_scope(Signal::Metrics, &query, &metrics_window, cancel),
                        self.run_scope(Signal::Logs, &query, &logs_window, cancel),
                    );
                    (Some(m), Some(l))
                }
            };

            let envelope = ResponseEnvelope::new(&request_id, question, scope, metrics, logs);
            tracing::info!("request finished with status {:?}", envelope.status);
            envelope
        }
        .instrument(span)
        .await
    }

    async fn run_scope(
        &self,
        signal: Signal,
        query: &Query,
        window: &Window,
        cancel: &CancellationToken,
    ) -> ScopeOutcome {
        let Some((backend, engine)) = self.pair(signal) else {
            let err = self.not_configured(signal);
            tracing::warn!("{signal} scope requested but not configured: {err}");
            return ScopeOutcome::Error(ErrorDetail::configuration(&err, &query.text));
        };

        let translated = match engine.translate_query(query, cancel).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("{signal} translation failed: {e}");
                return ScopeOutcome::Error(ErrorDetail::translation(&e, &query.text));
            }
        };

        let result = match window {
            Window::Instant => backend.query(&translated, cancel).await,
            Window::Range(range) => backend.query_range(&translated, range, cancel).await,
        };

        match result {
            Ok(result) => {
                let rows = match &result {
                    QueryResult::Metrics(m) => m.series_count(),
                    QueryResult::Logs(l) => l.entry_count(),
                };
                tracing::info!("{signal} query returned {rows} rows");
                let graph = backend.generate_graph(&result, &query.text).into_graph();
                ScopeOutcome::Success {
                    query: translated.text,
                    result,
                    graph,
                }
            }
            Err(e) => {
                tracing::error!("{signal} query failed: {e}");
                ScopeOutcome::Error(ErrorDetail::execution(&e))
            }
        }
    }

    /// Translate without executing.
    pub async fn translate(
        &self,
        question: &str,
        language: QueryLanguage,
        context: QueryContext,
        cancel: &CancellationToken,
    ) -> Result<TranslatedQuery, ErrorDetail> {
        let signal = signal_for(language);
        let (_, engine) = self
            .pair(signal)
            .ok_or_else(|| ErrorDetail::configuration(&self.not_configured(signal), question))?;
        let query = Query::new(question).with_context(context);
        engine
            .translate_query(&query, cancel)
            .await
            .map_err(|e| ErrorDetail::translation(&e, question))
    }

    pub async fn explain(
        &self,
        query: &TranslatedQuery,
        cancel: &CancellationToken,
    ) -> Result<String, ErrorDetail> {
        let signal = signal_for(query.language);
        let (_, engine) = self
            .pair(signal)
            .ok_or_else(|| ErrorDetail::configuration(&self.not_configured(signal), &query.text))?;
        engine
            .explain_query(query, cancel)
            .await
            .map_err(|e| ErrorDetail::translation(&e, &query.text))
    }

    /// Check every configured backend concurrently.
    pub async fn readiness(&self, cancel: &CancellationToken) -> Vec<BackendHealth> {
        let backends = self.stack.backends();
        let (m, l) = tokio::join!(
            check_backend(backends.metrics(), cancel),
            check_backend(backends.logs(), cancel)
        );
        m.into_iter().chain(l).collect()
    }

    fn pair(&self, signal: Signal) -> Option<(&Arc<dyn Backend>, &QueryEngine)> {
        match signal {
            Signal::Metrics => self.stack.metrics(),
            Signal::Logs => self.stack.logs(),
        }
    }

    fn not_configured(&self, signal: Signal) -> ConfigurationError {
        ConfigurationError::InvalidValue {
            field: "scope".to_string(),
            reason: format!(
                "no {signal} backend is configured for backend type '{}'",
                self.stack.backend_type()
            ),
        }
    }
}

fn signal_for(language: QueryLanguage) -> Signal {
    match language {
        QueryLanguage::PromQl => Signal::Metrics,
        QueryLanguage::LogQl => Signal::Logs,
    }
}

async fn check_backend(backend: Option<&Arc<dyn Backend>>, cancel: &CancellationToken) -> Option<BackendHealth> {
    let backend = backend?;
    let outcome = backend.ping(cancel).await;
    if let Err(e) = &outcome {
        tracing::warn!("{} is not ready: {e}", backend.name());
    }
    Some(BackendHealth {
        name: backend.name().to_string(),
        signal: backend.signal(),
        ready: outcome.is_ok(),
        error: outcome.err().map(|e| e.to_string()),
    })
}

/// Resolve a range from `start_time`/`end_time` or `time_range`, plus `step`.
/// `Ok(None)` means the context asks for no particular window. Windows that
/// end at "now" have their end rounded up to the step (or a minute).
fn range_from_context(context: &QueryContext) -> Result<Option<TimeRange>, String> {
    let start = context.get("start_time").map(parse_time).transpose()?;
    let end = context.get("end_time").map(parse_time).transpose()?;
    let lookback = context
        .get("time_range")
        .map(|v| match v {
            serde_json::Value::String(s) => parse_duration(s),
            other => Err(format!("time_range must be a duration string, got {other}")),
        })
        .transpose()?;
    let step = context.get("step").map(parse_step).transpose()?;

    let align = step.unwrap_or(RELATIVE_ALIGNMENT);

    let range = match (start, end, lookback) {
        (Some(start), Some(end), _) => TimeRange::new(start, end),
        (Some(start), None, _) => TimeRange::new(start, align_up(Utc::now(), align)),
        (None, Some(end), lookback) => {
            TimeRange::ending_at(end, lookback.unwrap_or(DEFAULT_LOG_LOOKBACK))?
        }
        (None, None, Some(lookback)) => TimeRange::last(lookback, align)?,
        (None, None, None) => return Ok(None),
    };
    if range.start > range.end {
        return Err(format!(
            "start_time {} is after end_time {}",
            range.start.to_rfc3339(),
            range.end.to_rfc3339()
        ));
    }
    Ok(Some(match step {
        Some(step) => range.with_step(step),
        None => range,
    }))
}

/// RFC 3339 text, or Unix seconds as a number or numeric string.
fn parse_time(value: &serde_json::Value) -> Result<DateTime<Utc>, String> {
    let secs = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => {
            if let Ok(t) = DateTime::parse_from_rfc3339(s) {
                return Ok(t.with_timezone(&Utc));
            }
            s.trim().parse::<f64>().ok()
        }
        _ => None,
    }
    .ok_or_else(|| format!("invalid timestamp: {value}"))?;
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    DateTime::from_timestamp(whole as i64, nanos).ok_or_else(|| format!("timestamp out of range: {value}"))
}

fn parse_step(value: &serde_json::Value) -> Result<Duration, String> {
    match value {
        serde_json::Value::String(s) => parse_duration(s),
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("invalid step: {n}"))
            .and_then(duration_from_secs),
        other => Err(format!("invalid step: {other}")),
    }
}
