//! Progressive result playback.
//!
//! State machine over a single chart instance:
//!
//! ```text
//!   Empty ──(non-empty steps)──► Animating ──(last step / cancel)──► Settled
//!     ▲                                                              │
//!     └──────────────────────(clear / failure)───────────────────────┘
//! ```
//!
//! The charting capability is injected through [`ChartBackend`]; the
//! renderer never probes for it. At most one [`ChartInstance`] is alive:
//! the old one is destroyed before a new one is created.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};

use crate::api::{PlaybackStep, PlotSeries, PredictionResult};
use crate::logging::{log, log_playback, obj, v_str, Domain, Level};

pub const CHART_UNAVAILABLE_NOTICE: &str =
    "chart component failed to load; refresh or check the network and retry.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChartError {
    #[error("charting capability unavailable: {0}")]
    Unavailable(String),
}

/// What a new chart starts with.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSpec {
    pub actual_label: &'static str,
    pub predicted_label: &'static str,
    pub initial: PlotSeries,
    /// False while animating: frames redraw without transition.
    pub animated: bool,
}

impl SeriesSpec {
    fn new(initial: PlotSeries, animated: bool) -> Self {
        Self {
            actual_label: "actual",
            predicted_label: "predicted",
            initial,
            animated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redraw {
    /// No transition; used for per-frame updates.
    Immediate,
    Animated,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeriesDelta<'a> {
    /// Append one point to each of the three parallel series.
    Append(&'a PlaybackStep),
    /// Replace all series in place.
    Replace(&'a PlotSeries),
}

pub trait ChartInstance {
    fn update(&mut self, delta: SeriesDelta<'_>, redraw: Redraw);
    /// Undo zoom/pan. False when the backend has no view state.
    fn reset_view(&mut self) -> bool;
    fn destroy(self);
}

pub trait ChartBackend {
    type Chart: ChartInstance;

    fn create(&mut self, spec: &SeriesSpec) -> Result<Self::Chart, ChartError>;
}

pub trait ProgressIndicator {
    fn show(&mut self);
    fn set(&mut self, percent: u8);
    /// Hide and reset to 0%.
    fn hide(&mut self);
}

/// One-shot stop request for a running playback. Clones share the flag;
/// once stopped it stays stopped.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `stop` has been called, immediately if it already was.
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame delay parameters, all in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSchedule {
    pub budget_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for FrameSchedule {
    fn default() -> Self {
        Self { budget_ms: 4000, min_ms: 6, max_ms: 30 }
    }
}

impl FrameSchedule {
    /// `clamp(budget / total_steps, min, max)`, computed once per run.
    pub fn delay_ms(&self, total_steps: usize) -> u64 {
        if total_steps == 0 {
            return self.max_ms;
        }
        (self.budget_ms / total_steps as u64).clamp(self.min_ms, self.max_ms)
    }
}

/// `round(100 * current / total)`, 0 when there are no steps.
pub fn progress_percent(current: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (current as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Animating,
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// All frames shown (zero for a static render), chart settled.
    Settled { frames: usize },
    /// Stopped early; chart settled on the full plot.
    Cancelled { frames: usize },
    /// Result carried nothing to draw; chart released.
    Cleared,
    /// Charting capability missing; nothing drawn.
    Unavailable,
}

pub struct PlaybackRenderer<B: ChartBackend> {
    backend: B,
    chart: Option<B::Chart>,
    phase: Phase,
    schedule: FrameSchedule,
    unavailable_notified: bool,
    notice: Option<String>,
}

impl<B: ChartBackend> PlaybackRenderer<B> {
    pub fn new(backend: B, schedule: FrameSchedule) -> Self {
        Self {
            backend,
            chart: None,
            phase: Phase::Empty,
            schedule,
            unavailable_notified: false,
            notice: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn has_chart(&self) -> bool {
        self.chart.is_some()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The once-per-outage capability notice, if one is pending.
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    fn release(&mut self) {
        if let Some(chart) = self.chart.take() {
            chart.destroy();
        }
    }

    /// Destroy-then-create. Reports a missing capability once per outage.
    fn recreate(&mut self, spec: SeriesSpec) -> bool {
        self.release();
        match self.backend.create(&spec) {
            Ok(chart) => {
                self.chart = Some(chart);
                self.unavailable_notified = false;
                true
            }
            Err(err) => {
                if !self.unavailable_notified {
                    log(
                        Level::Error,
                        Domain::Chart,
                        "chart_unavailable",
                        obj(&[("msg", v_str(&err.to_string()))]),
                    );
                    self.notice = Some(CHART_UNAVAILABLE_NOTICE.to_string());
                    self.unavailable_notified = true;
                }
                false
            }
        }
    }

    /// Destroy the chart and return to Empty.
    pub fn clear(&mut self) {
        self.release();
        self.phase = Phase::Empty;
    }

    /// Non-animated final render. An existing chart is updated in place;
    /// otherwise one is created with the full series.
    pub fn show_final(&mut self, plot: &PlotSeries) -> bool {
        if let Some(chart) = self.chart.as_mut() {
            chart.update(SeriesDelta::Replace(plot), Redraw::Animated);
            self.phase = Phase::Settled;
            return true;
        }
        if self.recreate(SeriesSpec::new(plot.clone(), true)) {
            self.phase = Phase::Settled;
            true
        } else {
            self.phase = Phase::Empty;
            false
        }
    }

    pub fn reset_view(&mut self) -> bool {
        self.chart.as_mut().map(|c| c.reset_view()).unwrap_or(false)
    }

    /// Replay a result frame by frame, then settle.
    ///
    /// Each frame appends one step with an immediate redraw, reports
    /// progress, then yields for the frame delay. Stopping `stop`
    /// between frames jumps straight to the settled full plot.
    pub async fn play<P: ProgressIndicator>(
        &mut self,
        result: &PredictionResult,
        progress: &mut P,
        stop: &StopSignal,
    ) -> PlaybackOutcome {
        let steps = &result.progress;
        if steps.is_empty() {
            progress.hide();
            return match &result.plot {
                Some(plot) => {
                    if self.show_final(plot) {
                        PlaybackOutcome::Settled { frames: 0 }
                    } else {
                        PlaybackOutcome::Unavailable
                    }
                }
                None => {
                    self.clear();
                    PlaybackOutcome::Cleared
                }
            };
        }

        if !self.recreate(SeriesSpec::new(PlotSeries::default(), false)) {
            progress.hide();
            self.phase = Phase::Empty;
            return PlaybackOutcome::Unavailable;
        }
        self.phase = Phase::Animating;

        let total = steps.len();
        let delay = self.schedule.delay_ms(total);
        log_playback("playback_started", total, delay);

        let mut accumulated = PlotSeries::default();
        progress.show();
        progress.set(0);

        let mut frames = 0;
        let mut cancelled = stop.is_stopped();
        if !cancelled {
            for (i, step) in steps.iter().enumerate() {
                accumulated.push(step);
                if let Some(chart) = self.chart.as_mut() {
                    chart.update(SeriesDelta::Append(step), Redraw::Immediate);
                }
                frames = i + 1;
                progress.set(progress_percent(frames, total));

                tokio::select! {
                    _ = sleep(Duration::from_millis(delay)) => {}
                    _ = stop.stopped() => {
                        cancelled = true;
                        break;
                    }
                }
            }
        }

        let full = result.plot.as_ref().unwrap_or(&accumulated);
        if let Some(chart) = self.chart.as_mut() {
            chart.update(SeriesDelta::Replace(full), Redraw::Animated);
        }
        self.phase = Phase::Settled;
        progress.hide();

        if cancelled {
            log_playback("playback_cancelled", frames, delay);
            PlaybackOutcome::Cancelled { frames }
        } else {
            log_playback("playback_finished", total, delay);
            PlaybackOutcome::Settled { frames }
        }
    }
}
