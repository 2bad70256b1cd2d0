//! Display formatting for metrics and the preview table.

use serde_json::{Map, Value};

use crate::api::PreviewRow;

pub const METRICS_PLACEHOLDER_TITLE: &str = "metrics pending";
pub const METRICS_PLACEHOLDER_TEXT: &str = "filled in after a prediction run";
pub const PREVIEW_PLACEHOLDER: &str = "run a prediction to see the full test-set data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricCard {
    pub name: String,
    pub value: String,
    pub placeholder: bool,
}

impl MetricCard {
    /// One card per metric in server order; numbers get 3 decimals.
    /// No metrics yields a single placeholder card.
    pub fn render(metrics: Option<&Map<String, Value>>) -> Vec<MetricCard> {
        match metrics {
            Some(m) if !m.is_empty() => m
                .iter()
                .map(|(name, value)| MetricCard {
                    name: name.clone(),
                    value: match value {
                        Value::Number(n) => n
                            .as_f64()
                            .map(|f| format!("{:.3}", f))
                            .unwrap_or_else(|| n.to_string()),
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    },
                    placeholder: false,
                })
                .collect(),
            _ => vec![MetricCard {
                name: METRICS_PLACEHOLDER_TITLE.to_string(),
                value: METRICS_PLACEHOLDER_TEXT.to_string(),
                placeholder: true,
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewLine {
    /// 1-based row number.
    pub index: usize,
    pub timestamp: String,
    pub actual: String,
    pub predicted: String,
}

/// Rendered preview table. Keeps the source rows so exports read exactly
/// what the table shows.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewTable {
    pub source: Vec<PreviewRow>,
    pub rows: Vec<PreviewLine>,
    pub placeholder: Option<String>,
}

impl PreviewTable {
    pub fn render(preview: &[PreviewRow]) -> Self {
        if preview.is_empty() {
            return Self {
                source: Vec::new(),
                rows: Vec::new(),
                placeholder: Some(PREVIEW_PLACEHOLDER.to_string()),
            };
        }
        let rows = preview
            .iter()
            .enumerate()
            .map(|(i, row)| PreviewLine {
                index: i + 1,
                timestamp: row.timestamp.clone(),
                actual: fmt_cell(row.actual),
                predicted: fmt_cell(row.predicted),
            })
            .collect();
        Self {
            source: preview.to_vec(),
            rows,
            placeholder: None,
        }
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }
}

fn fmt_cell(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}
