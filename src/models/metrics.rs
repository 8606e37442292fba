use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label name → label value. A `BTreeMap` so two label-sets compare equal
/// regardless of the order the backend listed them in.
pub type LabelSet = BTreeMap<String, String>;

/// Normalized metrics query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "results", rename_all = "lowercase")]
pub enum MetricsResult {
    /// One sample per label-set at a single instant.
    Vector(Vec<VectorSample>),
    /// A timestamp-ordered series per label-set.
    Matrix(Vec<MatrixSeries>),
}

impl MetricsResult {
    pub fn series_count(&self) -> usize {
        match self {
            Self::Vector(v) => v.len(),
            Self::Matrix(m) => m.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSample {
    pub metric: LabelSet,
    /// Unix seconds, fractional.
    pub timestamp: f64,
    #[serde(with = "sample_value")]
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixSeries {
    pub metric: LabelSet,
    pub values: Vec<SamplePoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub timestamp: f64,
    #[serde(with = "sample_value")]
    pub value: f64,
}

/// Finite values are JSON numbers. `NaN` and the infinities have no JSON
/// number form, so they are written as the strings Prometheus uses
/// (`"NaN"`, `"+Inf"`, `"-Inf"`). Either form is accepted when reading.
pub mod sample_value {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "+Inf" } else { "-Inf" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(n),
            Raw::Text(s) => super::parse_sample_value(&s).map_err(de::Error::custom),
        }
    }
}

// ── Prometheus JSON response types ──

/// Top-level `/api/v1/query*` response body.
#[derive(Debug, Deserialize)]
pub struct PromEnvelope {
    pub status: String,
    pub data: Option<PromData>,
    #[serde(rename = "errorType")]
    pub error_type: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PromData {
    #[serde(rename = "resultType")]
    pub result_type: String,
    pub result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct PromVectorItem {
    #[serde(default)]
    pub metric: LabelSet,
    pub value: (f64, String), // (timestamp, value_string)
}

#[derive(Debug, Deserialize)]
pub struct PromMatrixItem {
    #[serde(default)]
    pub metric: LabelSet,
    pub values: Vec<(f64, String)>, // [(timestamp, value_string), ...]
}

/// Prometheus encodes sample values as strings, including `NaN` and `+Inf`.
pub fn parse_sample_value(raw: &str) -> Result<f64, String> {
    raw.parse::<f64>()
        .map_err(|_| format!("invalid sample value: {raw}"))
}
