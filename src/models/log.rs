use serde::{Deserialize, Serialize};

use super::metrics::LabelSet;

/// Normalized logs query result: one stream per unique label-set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LogsResult {
    pub streams: Vec<LogStream>,
}

impl LogsResult {
    pub fn entry_count(&self) -> usize {
        self.streams.iter().map(|s| s.entries.len()).sum()
    }
}

/// Entries are timestamp-ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogStream {
    pub labels: LabelSet,
    pub entries: Vec<LogEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unix nanoseconds, as Loki reports them.
    pub timestamp_ns: i64,
    pub line: String,
}

impl LogEntry {
    pub fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_nanos(self.timestamp_ns)
    }
}

/// A single stream from a Loki `streams` result.
#[derive(Debug, Deserialize)]
pub struct LokiStreamItem {
    #[serde(default)]
    pub stream: LabelSet,
    /// `[timestamp_ns_string, line]`, optionally followed by structured metadata.
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}
