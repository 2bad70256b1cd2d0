//! Text-mode chart and progress bar for the headless driver.

use std::io::Write;

use crate::api::PlotSeries;
use crate::playback::{
    ChartBackend, ChartError, ChartInstance, ProgressIndicator, Redraw, SeriesDelta, SeriesSpec,
};

const BLOCKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Downsample to `width` buckets (bucket mean) and map onto block glyphs.
/// Non-finite points render as spaces.
pub fn sparkline(values: &[f64], width: usize) -> String {
    let present: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if present.is_empty() || width == 0 {
        return String::new();
    }
    let lo = present.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = present.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let span = hi - lo;

    let buckets = width.min(values.len());
    (0..buckets)
        .map(|b| {
            let start = b * values.len() / buckets;
            let end = ((b + 1) * values.len() / buckets).max(start + 1);
            let slice: Vec<f64> = values[start..end].iter().copied().filter(|v| v.is_finite()).collect();
            if slice.is_empty() {
                return ' ';
            }
            let mean = slice.iter().sum::<f64>() / slice.len() as f64;
            let level = if span > 0.0 {
                ((mean - lo) / span * (BLOCKS.len() - 1) as f64).round() as usize
            } else {
                BLOCKS.len() / 2
            };
            BLOCKS[level.min(BLOCKS.len() - 1)]
        })
        .collect()
}

pub struct TerminalChart {
    series: PlotSeries,
    width: usize,
    labels: (&'static str, &'static str),
}

impl TerminalChart {
    pub fn series(&self) -> &PlotSeries {
        &self.series
    }

    fn print(&self) {
        let span = match (self.series.timestamps.first(), self.series.timestamps.last()) {
            (Some(first), Some(last)) => format!("{} .. {}", first, last),
            _ => "no data".to_string(),
        };
        println!("chart [{} points, {}]", self.series.len(), span);
        println!("  {:>9} {}", self.labels.0, sparkline(&self.series.actual, self.width));
        println!("  {:>9} {}", self.labels.1, sparkline(&self.series.predicted, self.width));
    }
}

impl ChartInstance for TerminalChart {
    fn update(&mut self, delta: SeriesDelta<'_>, redraw: Redraw) {
        match delta {
            SeriesDelta::Append(step) => self.series.push(step),
            SeriesDelta::Replace(plot) => self.series = plot.clone(),
        }
        // per-frame redraws stay silent; only settled renders print
        if redraw == Redraw::Animated {
            self.print();
        }
    }

    fn reset_view(&mut self) -> bool {
        false
    }

    fn destroy(self) {}
}

pub struct TerminalBackend {
    pub width: usize,
}

impl Default for TerminalBackend {
    fn default() -> Self {
        Self { width: 60 }
    }
}

impl ChartBackend for TerminalBackend {
    type Chart = TerminalChart;

    fn create(&mut self, spec: &SeriesSpec) -> Result<TerminalChart, ChartError> {
        let chart = TerminalChart {
            series: spec.initial.clone(),
            width: self.width,
            labels: (spec.actual_label, spec.predicted_label),
        };
        if spec.animated && !chart.series.is_empty() {
            chart.print();
        }
        Ok(chart)
    }
}

/// Prints one line per quarter of progress.
#[derive(Default)]
pub struct TerminalProgress {
    visible: bool,
    last_quarter: u8,
}

impl ProgressIndicator for TerminalProgress {
    fn show(&mut self) {
        self.visible = true;
        self.last_quarter = 0;
    }

    fn set(&mut self, percent: u8) {
        if !self.visible {
            return;
        }
        let quarter = percent / 25;
        if quarter > self.last_quarter {
            self.last_quarter = quarter;
            println!("playback {:>3}%", percent);
            let _ = std::io::stdout().flush();
        }
    }

    fn hide(&mut self) {
        self.visible = false;
        self.last_quarter = 0;
    }
}
