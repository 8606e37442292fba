use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::QueryError;

/// Scoping hints attached to a question (service name, time range, ...).
pub type QueryContext = BTreeMap<String, serde_json::Value>;

/// A natural-language question as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    #[serde(default)]
    pub context: QueryContext,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context: QueryContext::new(),
        }
    }

    pub fn with_context(mut self, context: QueryContext) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryLanguage {
    PromQl,
    LogQl,
}

impl QueryLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PromQl => "PromQL",
            Self::LogQl => "LogQL",
        }
    }
}

impl fmt::Display for QueryLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "promql" | "metrics" => Ok(Self::PromQl),
            "logql" | "logs" => Ok(Self::LogQl),
            other => Err(format!("unknown query language: {other}")),
        }
    }
}

/// Backend-specific query text produced by a query engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedQuery {
    pub text: String,
    pub language: QueryLanguage,
}

impl TranslatedQuery {
    pub fn new(text: impl Into<String>, language: QueryLanguage) -> Self {
        Self {
            text: text.into(),
            language,
        }
    }

    pub fn promql(text: impl Into<String>) -> Self {
        Self::new(text, QueryLanguage::PromQl)
    }

    pub fn logql(text: impl Into<String>) -> Self {
        Self::new(text, QueryLanguage::LogQl)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryScope {
    Metrics,
    Logs,
    Combined,
}

impl QueryScope {
    pub fn includes_metrics(&self) -> bool {
        matches!(self, Self::Metrics | Self::Combined)
    }

    pub fn includes_logs(&self) -> bool {
        matches!(self, Self::Logs | Self::Combined)
    }
}

impl FromStr for QueryScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metrics" => Ok(Self::Metrics),
            "logs" => Ok(Self::Logs),
            "combined" => Ok(Self::Combined),
            other => Err(format!(
                "unknown scope '{other}'; expected metrics, logs or combined"
            )),
        }
    }
}

/// Time bounds for a range query. `step` controls metrics resolution; logs
/// backends only use it for metric-style LogQL.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step: Option<Duration>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            step: None,
        }
    }

    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = Some(step);
        self
    }

    /// The `lookback` window ending at `end`. Fails when the start would fall
    /// outside the representable date range.
    pub fn ending_at(end: DateTime<Utc>, lookback: Duration) -> Result<Self, String> {
        let span = chrono::Duration::from_std(lookback)
            .map_err(|_| format!("lookback of {}s is too large", lookback.as_secs()))?;
        let start = end
            .checked_sub_signed(span)
            .ok_or_else(|| format!("lookback of {}s reaches past the earliest supported time", lookback.as_secs()))?;
        Ok(Self::new(start, end))
    }

    /// The last `lookback`, with the end rounded up to a multiple of `align`.
    /// Repeated relative queries within one bucket get identical bounds.
    pub fn last(lookback: Duration, align: Duration) -> Result<Self, String> {
        Self::ending_at(align_up(Utc::now(), align), lookback)
    }

    pub fn validate(&self, backend: &str, query: &str) -> Result<(), QueryError> {
        if self.start > self.end {
            return Err(QueryError::invalid_input(
                backend,
                query,
                format!(
                    "start time {} is after end time {}",
                    self.start.to_rfc3339(),
                    self.end.to_rfc3339()
                ),
            ));
        }
        if matches!(self.step, Some(step) if step.is_zero()) {
            return Err(QueryError::invalid_input(backend, query, "step must be positive"));
        }
        Ok(())
    }
}

/// Round `t` up to the next multiple of `align` since the epoch.
pub fn align_up(t: DateTime<Utc>, align: Duration) -> DateTime<Utc> {
    let Ok(align_ms) = i64::try_from(align.as_millis()) else {
        return t;
    };
    if align_ms <= 0 {
        return t;
    }
    let ms = t.timestamp_millis();
    let rem = ms.rem_euclid(align_ms);
    if rem == 0 {
        return t;
    }
    ms.checked_add(align_ms - rem)
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or(t)
}

/// Build a `Duration` from user-supplied seconds without panicking.
pub fn duration_from_secs(secs: f64) -> Result<Duration, String> {
    if secs.is_nan() || secs <= 0.0 {
        return Err(format!("duration must be positive, got {secs}"));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| format!("duration of {secs}s is out of range"))
}

/// Parse a duration string like "5m", "1h30m", "30s".
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    let mut total_secs = 0.0;
    let mut num_str = String::new();

    for c in input.chars() {
        if c.is_ascii_digit() || c == '.' {
            num_str.push(c);
        } else {
            let num: f64 = num_str
                .parse()
                .map_err(|_| format!("invalid duration number: {num_str}"))?;
            num_str.clear();
            total_secs += match c {
                's' => num,
                'm' => num * 60.0,
                'h' => num * 3600.0,
                'd' => num * 86400.0,
                'w' => num * 604800.0,
                _ => return Err(format!("unknown duration unit: {c}")),
            };
        }
    }

    // A bare number is read as seconds.
    if !num_str.is_empty() {
        total_secs += num_str
            .parse::<f64>()
            .map_err(|_| format!("invalid duration number: {num_str}"))?;
    }

    if total_secs <= 0.0 {
        return Err("empty duration".to_string());
    }
    duration_from_secs(total_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compound_durations() {
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5x").is_err());
    }

    #[test]
    fn oversized_durations_are_errors() {
        assert!(parse_duration("99999999999999999999w").is_err());
        assert!(duration_from_secs(1e30).is_err());
        assert!(duration_from_secs(f64::NAN).is_err());
        assert!(duration_from_secs(-1.0).is_err());
    }

    #[test]
    fn lookback_past_the_date_range_is_an_error() {
        let end = Utc::now();
        assert!(TimeRange::ending_at(end, Duration::from_secs(5_000_000_000 * 604_800)).is_err());
        assert!(TimeRange::ending_at(end, Duration::from_secs(u64::MAX)).is_err());
        let range = TimeRange::ending_at(end, Duration::from_secs(3600)).unwrap();
        assert_eq!(range.end - range.start, chrono::Duration::hours(1));
    }

    #[test]
    fn relative_windows_align_their_end() {
        let t = DateTime::from_timestamp(1_700_000_007, 0).unwrap();
        let aligned = align_up(t, Duration::from_secs(60));
        assert_eq!(aligned.timestamp(), 1_700_000_040);
        assert_eq!(align_up(aligned, Duration::from_secs(60)), aligned);
        assert_eq!(align_up(t, Duration::ZERO), t);

        let a = TimeRange::last(Duration::from_secs(3600), Duration::from_secs(60)).unwrap();
        assert_eq!(a.end.timestamp() % 60, 0);
        assert!(a.end >= Utc::now() - chrono::Duration::seconds(1));
        assert_eq!(a.end - a.start, chrono::Duration::hours(1));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let end = Utc::now();
        let start = end + chrono::Duration::minutes(5);
        let err = TimeRange::new(start, end).validate("prometheus", "up").unwrap_err();
        assert_eq!(err.kind, crate::error::QueryErrorKind::InvalidInput);
        assert_eq!(err.query, "up");
        assert_eq!(err.backend, "prometheus");
    }

    #[test]
    fn equal_bounds_are_allowed() {
        let t = Utc::now();
        assert!(TimeRange::new(t, t).validate("loki", "{a=\"b\"}").is_ok());
    }

    #[test]
    fn scope_parsing() {
        assert_eq!("combined".parse::<QueryScope>().unwrap(), QueryScope::Combined);
        assert!("traces".parse::<QueryScope>().is_err());
        assert!(QueryScope::Combined.includes_logs());
        assert!(!QueryScope::Metrics.includes_logs());
    }
}
