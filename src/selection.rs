//! Feature selection engine.
//!
//! `ControlState` is the typed stand-in for the feature checkboxes. The
//! engine reads it into a normalized `FeatureSelection` and writes a
//! variant's declared features back into it. Nothing here fails: unknown
//! sections, unparsable values, and missing variants all degrade to empty
//! selections.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::catalog::{parse_number, FeatureControlSchema, FeatureSet, ModelCatalog, ValueType};

/// Delimiter between feature groups in hint and summary text.
pub const GROUP_DELIMITER: &str = " | ";
/// Hint shown when a variant declares no features at all.
pub const HINT_AWAITING: &str = "Awaiting selection: custom features are matched server-side, unmatched runs fall back to the default configuration.";
/// Summary text when nothing is checked.
pub const SUMMARY_AWAITING: &str = "awaiting selection";

pub const HINT_AUTO_MATCH: &str = "A pre-trained variant will be matched from the selected features.";
pub const HINT_PREFILLED: &str = "Features prefilled from the default variant; adjust freely.";
pub const HINT_NO_VARIANTS: &str = "This algorithm has no pre-trained variants; choose features manually.";

/// Section ids the engine understands. Section identity is the join key
/// between the schema, variant feature sets and the live controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKey {
    Time,
    Cyclical,
    Lags,
    RollingWindows,
    RollingStats,
    DiffPeriods,
}

impl FeatureKey {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "time" => Some(FeatureKey::Time),
            "cyclical" => Some(FeatureKey::Cyclical),
            "lags" => Some(FeatureKey::Lags),
            "rolling_windows" => Some(FeatureKey::RollingWindows),
            "rolling_stats" => Some(FeatureKey::RollingStats),
            "diff_periods" => Some(FeatureKey::DiffPeriods),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKey::Time => "time",
            FeatureKey::Cyclical => "cyclical",
            FeatureKey::Lags => "lags",
            FeatureKey::RollingWindows => "rolling_windows",
            FeatureKey::RollingStats => "rolling_stats",
            FeatureKey::DiffPeriods => "diff_periods",
        }
    }
}

/// Normalized record of the active features. Every field is always
/// present; `lags` collapses to the single largest checked lag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeatureSelection {
    pub time: Vec<String>,
    pub cyclical: Vec<String>,
    pub lags: Option<i64>,
    pub rolling_windows: Vec<i64>,
    pub rolling_stats: Vec<String>,
    pub diff_periods: Vec<i64>,
}

impl FeatureSelection {
    pub fn is_empty(&self) -> bool {
        *self == FeatureSelection::default()
    }
}

/// Checked state of every feature control, keyed by section id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlState {
    checked: BTreeMap<String, BTreeSet<String>>,
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, section: &str, value: &str, checked: bool) {
        if checked {
            self.checked
                .entry(section.to_string())
                .or_default()
                .insert(value.to_string());
        } else if let Some(values) = self.checked.get_mut(section) {
            values.remove(value);
            if values.is_empty() {
                self.checked.remove(section);
            }
        }
    }

    pub fn is_checked(&self, section: &str, value: &str) -> bool {
        self.checked
            .get(section)
            .map(|values| values.contains(value))
            .unwrap_or(false)
    }

    pub fn clear(&mut self) {
        self.checked.clear();
    }

    pub fn checked_count(&self) -> usize {
        self.checked.values().map(BTreeSet::len).sum()
    }
}

/// Read the live controls into a normalized selection.
///
/// Only schema sections are read, in schema option order. Values of
/// `number` sections that do not parse are dropped. Checked lags reduce to
/// their maximum; a maximum ≤ 0 counts as no lag.
pub fn gather_selection(schema: &FeatureControlSchema, controls: &ControlState) -> FeatureSelection {
    let mut selection = FeatureSelection::default();

    for section in &schema.sections {
        let Some(key) = FeatureKey::from_id(&section.id) else {
            continue;
        };
        let values: Vec<&str> = section
            .options
            .iter()
            .map(|opt| opt.value.as_str())
            .filter(|value| controls.is_checked(&section.id, value))
            .filter(|value| section.value_type != ValueType::Number || parse_number(value).is_some())
            .collect();
        if values.is_empty() {
            continue;
        }

        let strings = || values.iter().map(|v| v.to_string()).collect::<Vec<_>>();
        let numbers = || values.iter().filter_map(|v| parse_number(v)).collect::<Vec<_>>();
        match key {
            FeatureKey::Time => selection.time = strings(),
            FeatureKey::Cyclical => selection.cyclical = strings(),
            FeatureKey::Lags => {
                selection.lags = numbers().into_iter().max().filter(|max| *max > 0);
            }
            FeatureKey::RollingWindows => selection.rolling_windows = numbers(),
            FeatureKey::RollingStats => selection.rolling_stats = strings(),
            FeatureKey::DiffPeriods => selection.diff_periods = numbers(),
        }
    }

    selection
}

/// Check exactly the controls a variant declares, clearing everything
/// else. Lags check only the control matching the variant's largest lag.
/// Returns the regenerated hint text.
pub fn apply_variant_features(
    schema: &FeatureControlSchema,
    controls: &mut ControlState,
    features: &FeatureSet,
) -> String {
    controls.clear();

    let max_lag = features.max_lag();
    for section in &schema.sections {
        let Some(key) = FeatureKey::from_id(&section.id) else {
            continue;
        };
        for option in &section.options {
            let wanted = match key {
                FeatureKey::Time => features.time.contains(&option.value),
                FeatureKey::Cyclical => features.cyclical.contains(&option.value),
                FeatureKey::RollingStats => features.rolling_stats.contains(&option.value),
                FeatureKey::Lags => max_lag.is_some() && parse_number(&option.value) == max_lag,
                FeatureKey::RollingWindows => {
                    numeric_member(&option.value, &features.rolling_windows)
                }
                FeatureKey::DiffPeriods => numeric_member(&option.value, &features.diff_periods),
            };
            if wanted {
                controls.set(&section.id, &option.value, true);
            }
        }
    }

    variant_hint(features)
}

/// Resolve a variant by algorithm type and id and apply it. A failed
/// lookup clears every control and returns the empty-features hint.
pub fn apply_variant(
    catalog: &ModelCatalog,
    controls: &mut ControlState,
    model_type: &str,
    variant_id: &str,
) -> String {
    match catalog.variant(model_type, variant_id) {
        Some(variant) => {
            apply_variant_features(&catalog.feature_controls, controls, &variant.features)
        }
        None => {
            controls.clear();
            variant_hint(&FeatureSet::default())
        }
    }
}

fn numeric_member(raw: &str, declared: &[i64]) -> bool {
    parse_number(raw).map(|n| declared.contains(&n)).unwrap_or(false)
}

fn join<T: ToString>(items: &[T], sep: &str) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(sep)
}

/// Hint for a variant's declared features, in fixed group order:
/// time, cyclical, lag (as the maximum), rolling windows, diff periods.
pub fn variant_hint(features: &FeatureSet) -> String {
    let mut parts = Vec::new();
    if !features.time.is_empty() {
        parts.push(format!("time: {}", join(&features.time, ", ")));
    }
    if !features.cyclical.is_empty() {
        parts.push(format!("cyclical: {}", join(&features.cyclical, ", ")));
    }
    if let Some(max) = features.max_lag() {
        parts.push(format!("lag: {}", max));
    }
    if !features.rolling_windows.is_empty() {
        parts.push(format!("rolling windows: {}", join(&features.rolling_windows, ", ")));
    }
    if !features.diff_periods.is_empty() {
        parts.push(format!("diff: {}", join(&features.diff_periods, ", ")));
    }
    if parts.is_empty() {
        HINT_AWAITING.to_string()
    } else {
        parts.join(GROUP_DELIMITER)
    }
}

/// Summary text for the live selection. Same group order as the hint,
/// plus rolling stats after the windows.
pub fn selection_text(selection: &FeatureSelection) -> String {
    let mut blocks = Vec::new();
    if !selection.time.is_empty() {
        blocks.push(format!("time: {}", join(&selection.time, "/")));
    }
    if !selection.cyclical.is_empty() {
        blocks.push(format!("cyclical: {}", join(&selection.cyclical, "/")));
    }
    if let Some(lag) = selection.lags {
        blocks.push(format!("lag: {}", lag));
    }
    if !selection.rolling_windows.is_empty() {
        blocks.push(format!("rolling windows: {}", join(&selection.rolling_windows, ", ")));
    }
    if !selection.rolling_stats.is_empty() {
        blocks.push(format!("rolling stats: {}", join(&selection.rolling_stats, "/")));
    }
    if !selection.diff_periods.is_empty() {
        blocks.push(format!("diff: {}", join(&selection.diff_periods, ", ")));
    }
    if blocks.is_empty() {
        SUMMARY_AWAITING.to_string()
    } else {
        blocks.join(GROUP_DELIMITER)
    }
}
