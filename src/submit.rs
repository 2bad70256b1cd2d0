//! Submission validation, payload building and outcome classification.

use thiserror::Error;

use crate::api::{ApiError, PredictRequest, PredictionResult};
use crate::selection::FeatureSelection;
use crate::state::FormState;

pub const MSG_RUNNING: &str = "running rolling forecast, please wait...";
pub const MSG_DRAWING: &str = "computation finished, drawing the forecast...";
pub const MSG_DONE: &str = "prediction complete.";
pub const MSG_FAILED: &str = "an error occurred while running the prediction.";

/// Incomplete configuration. Reported as a status line; the request is
/// never sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("select a model domain first.")]
    MissingDomain,
    #[error("select an algorithm and a region first.")]
    MissingAlgorithmOrRegion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Validation failed; nothing was sent.
    Rejected(ConfigError),
    Succeeded { matched: bool },
    Failed { message: String },
    /// Playback was interrupted; the chart settled on the full plot.
    Interrupted,
}

/// Fail-fast validation, first failing check wins. An empty feature
/// selection is valid: the server decides the auto-match.
pub fn validate(form: &FormState) -> Result<(), ConfigError> {
    if form.category.is_empty() {
        return Err(ConfigError::MissingDomain);
    }
    if form.model_type.is_empty() || form.region.is_empty() {
        return Err(ConfigError::MissingAlgorithmOrRegion);
    }
    Ok(())
}

/// Integer prefix of the input (`"12h"` → 12, `"3.9"` → 3). Unparsable or
/// non-positive values silently become `default`.
pub fn parse_horizon(raw: &str, default: u32) -> u32 {
    let trimmed = raw.trim();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    if negative || end == 0 {
        return default;
    }
    match digits[..end].parse::<u32>() {
        Ok(h) if h > 0 => h,
        _ => default,
    }
}

pub fn build_request(
    form: &FormState,
    feature_selection: FeatureSelection,
    default_horizon: u32,
) -> Result<PredictRequest, ConfigError> {
    validate(form)?;
    Ok(PredictRequest {
        model_type: form.model_type.clone(),
        region: form.region.clone(),
        feature_selection,
        variant_id: Some(form.variant_id.clone()).filter(|v| !v.is_empty()),
        horizon: parse_horizon(&form.horizon_raw, default_horizon),
    })
}

/// Status line for a failed run: the server's detail when present.
pub fn failure_message(err: &ApiError) -> String {
    if let Some(detail) = err.detail() {
        return detail.to_string();
    }
    match err {
        ApiError::Status { status, .. } => format!("prediction failed: HTTP {}", status),
        ApiError::Transport(_) | ApiError::Decode(_) => MSG_FAILED.to_string(),
    }
}

/// Status line for a successful run.
pub fn success_message(result: &PredictionResult) -> String {
    result
        .message
        .as_deref()
        .filter(|m| !m.is_empty())
        .unwrap_or(MSG_DONE)
        .to_string()
}
