//! Server-provided model catalog.
//!
//! Read-only once fetched; replaced wholesale on reload. Every field is
//! optional on the wire and malformed entries degrade to empty values
//! instead of failing the whole payload.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelCatalog {
    #[serde(rename = "modelCategories", default, deserialize_with = "lenient_vec")]
    pub categories: Vec<Category>,
    /// Algorithms with their variants, keyed by `type`.
    #[serde(default, deserialize_with = "lenient_vec")]
    pub models: Vec<Algorithm>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub regions: Vec<String>,
    #[serde(rename = "featureControls", default, deserialize_with = "lenient")]
    pub feature_controls: FeatureControlSchema,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Category {
    #[serde(default, deserialize_with = "scalar_string")]
    pub id: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub label: String,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub models: Vec<ModelSummary>,
    #[serde(default, deserialize_with = "lenient")]
    pub disabled: bool,
}

/// A category's reference to an algorithm.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelSummary {
    #[serde(rename = "type", default, deserialize_with = "scalar_string")]
    pub model_type: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Algorithm {
    #[serde(rename = "type", default, deserialize_with = "scalar_string")]
    pub model_type: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub label: String,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub variants: Vec<ModelVariant>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelVariant {
    #[serde(default, deserialize_with = "scalar_string")]
    pub id: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub label: String,
    #[serde(default, deserialize_with = "lenient")]
    pub features: FeatureSet,
}

/// Features a variant was trained with. Absent fields are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet {
    #[serde(default, deserialize_with = "lenient_strings")]
    pub time: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub cyclical: Vec<String>,
    #[serde(default, deserialize_with = "lenient_numbers")]
    pub lags: Vec<i64>,
    #[serde(default, deserialize_with = "lenient_numbers")]
    pub rolling_windows: Vec<i64>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub rolling_stats: Vec<String>,
    #[serde(default, deserialize_with = "lenient_numbers")]
    pub diff_periods: Vec<i64>,
}

impl FeatureSet {
    /// The variant's effective lag: the largest declared lag.
    pub fn max_lag(&self) -> Option<i64> {
        self.lags.iter().copied().max()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FeatureControlSchema {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub sections: Vec<Section>,
}

impl FeatureControlSchema {
    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    String,
    Number,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Section {
    #[serde(default, deserialize_with = "scalar_string")]
    pub id: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub label: String,
    #[serde(rename = "valueType", default, deserialize_with = "lenient")]
    pub value_type: ValueType,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub options: Vec<FeatureOption>,
}

/// One checkbox. `value` is the control's string value; numeric wire
/// values are rendered to their JSON text.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FeatureOption {
    #[serde(default, deserialize_with = "scalar_string")]
    pub value: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub label: String,
}

impl ModelCatalog {
    pub fn category(&self, id: &str) -> Option<&Category> {
        if id.is_empty() {
            return None;
        }
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn algorithm(&self, model_type: &str) -> Option<&Algorithm> {
        if model_type.is_empty() {
            return None;
        }
        self.models.iter().find(|m| m.model_type == model_type)
    }

    /// Algorithms listed under a category; empty when the id is unknown.
    pub fn models_in(&self, category_id: &str) -> &[ModelSummary] {
        self.category(category_id)
            .map(|c| c.models.as_slice())
            .unwrap_or(&[])
    }

    pub fn variants_of(&self, model_type: &str) -> &[ModelVariant] {
        self.algorithm(model_type)
            .map(|a| a.variants.as_slice())
            .unwrap_or(&[])
    }

    pub fn variant(&self, model_type: &str, variant_id: &str) -> Option<&ModelVariant> {
        if variant_id.is_empty() {
            return None;
        }
        self.variants_of(model_type).iter().find(|v| v.id == variant_id)
    }

    /// Display label for an algorithm: the algorithm list first, then any
    /// category reference that names it.
    pub fn model_label(&self, model_type: &str) -> Option<&str> {
        if let Some(algo) = self.algorithm(model_type) {
            return Some(algo.label.as_str());
        }
        if model_type.is_empty() {
            return None;
        }
        self.categories
            .iter()
            .flat_map(|c| c.models.iter())
            .find(|m| m.model_type == model_type)
            .map(|m| m.label.as_str())
    }

    pub fn has_region(&self, region: &str) -> bool {
        !region.is_empty() && self.regions.iter().any(|r| r == region)
    }
}

// =============================================================================
// Numeric coercion
// =============================================================================

/// Coerce a control or wire value to a whole number.
/// `"6"`, `" 6 "`, `"6.0"` → 6; fractional, empty, or non-numeric → None.
pub fn parse_number(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Some(n);
    }
    let f = trimmed.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn value_to_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(|f| parse_number(&f.to_string()))),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// =============================================================================
// Lenient deserializers
// =============================================================================

/// Any type mismatch falls back to `T::default()`.
pub(crate) fn lenient<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned + Default,
{
    let value = Value::deserialize(de)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Non-arrays become empty; elements that fail to parse are dropped.
pub(crate) fn lenient_vec<'de, D, T>(de: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(de)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

pub(crate) fn lenient_strings<'de, D>(de: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(de)?;
    Ok(match value {
        Value::Array(items) => items.iter().filter_map(value_to_string).collect(),
        _ => Vec::new(),
    })
}

fn lenient_numbers<'de, D>(de: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(de)?;
    Ok(match value {
        Value::Array(items) => items.iter().filter_map(value_to_number).collect(),
        _ => Vec::new(),
    })
}

pub(crate) fn scalar_string<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(de)?;
    Ok(value_to_string(&value).unwrap_or_default())
}
