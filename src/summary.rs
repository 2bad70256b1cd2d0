//! Configuration summary projection.
//!
//! Pure: recomputed from the catalog and form state after every event,
//! never cached.

use crate::api::PredictionResult;
use crate::catalog::ModelCatalog;
use crate::selection::{selection_text, FeatureSelection, SUMMARY_AWAITING};
use crate::state::FormState;

/// Marker for an unset or unresolvable value.
pub const UNSET: &str = "—";
pub const AUTO_MATCH: &str = "auto-match (by features)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub label: &'static str,
    pub value: String,
}

impl SummaryRow {
    /// Rendered dimmed when nothing meaningful is set.
    pub fn muted(&self) -> bool {
        self.value == UNSET || self.value == SUMMARY_AWAITING
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryView {
    pub rows: Vec<SummaryRow>,
}

impl SummaryView {
    pub fn value(&self, label: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|r| r.label == label)
            .map(|r| r.value.as_str())
    }
}

pub const LABEL_DOMAIN: &str = "Model domain";
pub const LABEL_ALGORITHM: &str = "Algorithm";
pub const LABEL_VARIANT: &str = "Variant";
pub const LABEL_REGION: &str = "Region";
pub const LABEL_HORIZON: &str = "Horizon";
pub const LABEL_FEATURES: &str = "Features";

/// Six rows in fixed order: domain, algorithm, variant, region, horizon,
/// features.
pub fn project(
    catalog: &ModelCatalog,
    form: &FormState,
    selection: &FeatureSelection,
    last_result: Option<&PredictionResult>,
    default_horizon: u32,
) -> SummaryView {
    let domain = catalog
        .category(&form.category)
        .map(|c| c.label.clone())
        .unwrap_or_else(|| UNSET.to_string());

    let algorithm = catalog
        .model_label(&form.model_type)
        .map(str::to_string)
        .unwrap_or_else(|| UNSET.to_string());

    // An empty variant id under a chosen algorithm is the auto-match mode.
    let variant = if form.variant_id.is_empty() {
        if catalog.model_label(&form.model_type).is_some() {
            AUTO_MATCH.to_string()
        } else {
            UNSET.to_string()
        }
    } else {
        catalog
            .variant(&form.model_type, &form.variant_id)
            .map(|v| v.label.clone())
            .unwrap_or_else(|| UNSET.to_string())
    };

    let region = if catalog.has_region(&form.region) {
        form.region.clone()
    } else {
        UNSET.to_string()
    };

    let explicit = form.horizon_raw.trim();
    let horizon = if !explicit.is_empty() {
        explicit.to_string()
    } else if let Some(h) = last_result.and_then(|r| r.horizon) {
        h.to_string()
    } else {
        format!("default {}", default_horizon)
    };

    SummaryView {
        rows: vec![
            SummaryRow { label: LABEL_DOMAIN, value: domain },
            SummaryRow { label: LABEL_ALGORITHM, value: algorithm },
            SummaryRow { label: LABEL_VARIANT, value: variant },
            SummaryRow { label: LABEL_REGION, value: region },
            SummaryRow { label: LABEL_HORIZON, value: horizon },
            SummaryRow { label: LABEL_FEATURES, value: selection_text(selection) },
        ],
    }
}
