//! Renderer-neutral chart artifacts for metrics results.

use serde::{Deserialize, Serialize};

use crate::models::envelope::QueryResult;
use crate::models::metrics::{LabelSet, MetricsResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub title: String,
    pub x_axis: String,
    pub y_axis: String,
    pub series: Vec<GraphSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSeries {
    pub name: String,
    pub points: Vec<(f64, f64)>, // (timestamp_secs, value)
}

/// Result of asking a backend for a graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphOutcome {
    Rendered(Graph),
    /// The data has nothing to plot (instant vector, empty matrix).
    Empty,
    /// The backend does not visualize its results at all.
    Unsupported,
}

impl GraphOutcome {
    pub fn into_graph(self) -> Option<Graph> {
        match self {
            Self::Rendered(g) => Some(g),
            _ => None,
        }
    }
}

/// Legend name for a series: `__name__` followed by the remaining labels.
pub fn series_name(labels: &LabelSet) -> String {
    let rest = labels
        .iter()
        .filter(|(k, _)| k.as_str() != "__name__")
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ");
    match labels.get("__name__") {
        Some(name) if rest.is_empty() => name.clone(),
        Some(name) => format!("{name}{{{rest}}}"),
        None if rest.is_empty() => "{}".to_string(),
        None => format!("{{{rest}}}"),
    }
}

/// Time-series line chart from a matrix result.
pub fn time_series(data: &QueryResult, title: &str) -> GraphOutcome {
    let Some(MetricsResult::Matrix(series)) = data.as_metrics() else {
        return GraphOutcome::Empty;
    };
    let series: Vec<GraphSeries> = series
        .iter()
        .filter(|s| !s.values.is_empty())
        .map(|s| GraphSeries {
            name: series_name(&s.metric),
            points: s.values.iter().map(|p| (p.timestamp, p.value)).collect(),
        })
        .collect();
    if series.is_empty() {
        return GraphOutcome::Empty;
    }
    GraphOutcome::Rendered(Graph {
        title: title.to_string(),
        x_axis: "Time".to_string(),
        y_axis: "Value".to_string(),
        series,
    })
}
