use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::catalog::{lenient, lenient_strings, lenient_vec, scalar_string, ModelCatalog};
use crate::selection::FeatureSelection;

pub mod http;

pub use http::HttpApi;

/// Failure talking to the forecast service. No retries happen at this
/// layer; every error is terminal for the attempt that produced it.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),
    /// Non-2xx response. `detail` is the server's own message when the
    /// body carried one.
    #[error("{}", status_message(.status, .detail))]
    Status { status: u16, detail: Option<String> },
    #[error("malformed response: {0}")]
    Decode(String),
}

fn status_message(status: &u16, detail: &Option<String>) -> String {
    match detail {
        Some(detail) => detail.clone(),
        None => format!("request failed with status {}", status),
    }
}

impl ApiError {
    /// Server-supplied detail, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Status { detail: Some(d), .. } => Some(d.as_str()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

/// Body of `GET /api/health`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HealthReport {
    #[serde(default)]
    pub status: String,
}

impl HealthReport {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Body of `POST /api/predict`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictRequest {
    pub model_type: String,
    pub region: String,
    pub feature_selection: FeatureSelection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    pub horizon: u32,
}

impl PredictRequest {
    /// Short content hash for correlating log lines of one submission.
    pub fn fingerprint(&self) -> String {
        let body = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&body);
        hex::encode(digest)[..12].to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewRow {
    #[serde(default, deserialize_with = "scalar_string")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient")]
    pub actual: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub predicted: Option<f64>,
}

/// Complete static series for the settled chart. Missing points are NaN,
/// which chart backends draw as gaps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlotSeries {
    #[serde(default, deserialize_with = "lenient_strings")]
    pub timestamps: Vec<String>,
    #[serde(default, deserialize_with = "points")]
    pub actual: Vec<f64>,
    #[serde(default, deserialize_with = "points")]
    pub predicted: Vec<f64>,
}

impl PlotSeries {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty() && self.actual.is_empty() && self.predicted.is_empty()
    }

    pub fn push(&mut self, step: &PlaybackStep) {
        self.timestamps.push(step.timestamp.clone());
        self.actual.push(step.actual);
        self.predicted.push(step.predicted);
    }
}

/// One horizon step of the playback sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackStep {
    #[serde(default, deserialize_with = "scalar_string")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "point")]
    pub actual: f64,
    #[serde(default, deserialize_with = "point")]
    pub predicted: f64,
}

/// Body of a successful `POST /api/predict`. Null or malformed sections
/// decode as empty so a usable run is never discarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Metric name → value, in server order.
    #[serde(default, deserialize_with = "lenient")]
    pub metrics: Map<String, Value>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub preview: Vec<PreviewRow>,
    #[serde(default, deserialize_with = "lenient")]
    pub plot: Option<PlotSeries>,
    /// Ordered by time ascending.
    #[serde(default, deserialize_with = "lenient_vec")]
    pub progress: Vec<PlaybackStep>,
    #[serde(default, deserialize_with = "lenient")]
    pub feature_match: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub horizon: Option<u32>,
}

fn value_to_point(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Null or non-numeric chart values become NaN.
fn point<'de, D>(de: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_point(&Value::deserialize(de)?))
}

fn points<'de, D>(de: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(de)? {
        Value::Array(items) => items.iter().map(value_to_point).collect(),
        _ => Vec::new(),
    })
}

impl PredictionResult {
    /// Matched unless the server explicitly said otherwise.
    pub fn matched(&self) -> bool {
        self.feature_match != Some(false)
    }
}

#[async_trait]
pub trait ForecastApi {
    async fn health(&self) -> Result<HealthReport, ApiError>;
    async fn options(&self) -> Result<ModelCatalog, ApiError>;
    async fn predict(&self, request: &PredictRequest) -> Result<PredictionResult, ApiError>;
}
