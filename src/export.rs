//! CSV export of the preview table.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::api::PreviewRow;
use crate::logging::{log, obj, ts_epoch_ms, v_num, v_str, Domain, Level};

pub const CSV_HEADER: &str = "timestamp,actual,predicted";

/// Header plus one line per row. Missing values are empty cells.
pub fn preview_csv(rows: &[PreviewRow]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + rows.len() * 40);
    out.push_str(CSV_HEADER);
    for row in rows {
        out.push('\n');
        out.push_str(&csv_field(&row.timestamp));
        out.push(',');
        out.push_str(&cell(row.actual));
        out.push(',');
        out.push_str(&cell(row.predicted));
    }
    out
}

pub fn export_file_name(epoch_ms: u64) -> String {
    format!("forecast_preview_{}.csv", epoch_ms)
}

/// Write rendered CSV into `dir` under a timestamped name, creating `dir`.
pub fn write_csv(dir: &Path, csv: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(export_file_name(ts_epoch_ms()));
    fs::write(&path, csv).with_context(|| format!("writing {}", path.display()))?;
    log(
        Level::Info,
        Domain::System,
        "preview_exported",
        obj(&[
            ("path", v_str(&path.display().to_string())),
            ("rows", v_num(csv.lines().count().saturating_sub(1) as f64)),
        ]),
    );
    Ok(path)
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
