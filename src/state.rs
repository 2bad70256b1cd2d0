use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use crate::api::PredictionResult;
use crate::catalog::ModelCatalog;
use crate::playback::FrameSchedule;
use crate::render::{MetricCard, PreviewTable};
use crate::selection::{ControlState, HINT_AUTO_MATCH};
use crate::summary::SummaryView;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000";

#[derive(Clone, Debug)]
pub struct Config {
    pub api_base: String,
    pub docs_path: String,
    /// Total playback time the frame delay aims for.
    pub playback_budget_ms: u64,
    pub frame_min_ms: u64,
    pub frame_max_ms: u64,
    pub default_horizon: u32,
    /// None: requests wait as long as the server takes.
    pub http_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            docs_path: "/docs".to_string(),
            playback_budget_ms: 4000,
            frame_min_ms: 6,
            frame_max_ms: 30,
            default_horizon: 6,
            http_timeout: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            api_base: std::env::var("FORECAST_API_BASE").unwrap_or(d.api_base),
            docs_path: std::env::var("FORECAST_DOCS_PATH").unwrap_or(d.docs_path),
            playback_budget_ms: std::env::var("PLAYBACK_BUDGET_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.playback_budget_ms),
            frame_min_ms: std::env::var("FRAME_MIN_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.frame_min_ms),
            frame_max_ms: std::env::var("FRAME_MAX_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.frame_max_ms),
            default_horizon: std::env::var("DEFAULT_HORIZON").ok().and_then(|v| v.parse().ok()).filter(|h| *h > 0).unwrap_or(d.default_horizon),
            http_timeout: std::env::var("HTTP_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).map(Duration::from_secs),
        }
    }

    /// `from_env` plus a check that the API base is a usable URL.
    pub fn try_from_env() -> Result<Self> {
        let cfg = Self::from_env();
        cfg.base_url()
            .with_context(|| format!("invalid FORECAST_API_BASE: {}", cfg.api_base))?;
        Ok(cfg)
    }

    fn base_url(&self) -> Result<Url, url::ParseError> {
        let mut base = self.api_base.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&base)
    }

    /// Resolve an API path against the base, keeping any base path prefix.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url()?.join(path.trim_start_matches('/'))
    }

    pub fn docs_url(&self) -> String {
        self.endpoint(&self.docs_path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}{}", self.api_base, self.docs_path))
    }

    pub fn frame_schedule(&self) -> FrameSchedule {
        FrameSchedule {
            budget_ms: self.playback_budget_ms,
            min_ms: self.frame_min_ms,
            max_ms: self.frame_max_ms.max(self.frame_min_ms),
        }
    }
}

// =============================================================================
// View-model state
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub kind: StatusKind,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self { text: text.into(), kind: StatusKind::Info }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self { text: text.into(), kind: StatusKind::Success }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { text: text.into(), kind: StatusKind::Error }
    }
}

/// Server-reported match state of the last run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPill {
    Idle,
    Matched,
    Fallback,
    Failed,
}

impl MatchPill {
    pub fn from_match(matched: bool) -> Self {
        if matched {
            MatchPill::Matched
        } else {
            MatchPill::Fallback
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MatchPill::Idle => "awaiting run",
            MatchPill::Matched => "feature configuration matched",
            MatchPill::Fallback => "fell back to default configuration",
            MatchPill::Failed => "run failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkflowStep {
    Domain = 1,
    Algorithm = 2,
    Region = 3,
    Running = 4,
    Results = 5,
}

impl WorkflowStep {
    pub fn index(&self) -> u8 {
        *self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthIndicator {
    Unknown,
    Healthy,
    /// Reachable but not reporting `ok`.
    Degraded,
    Down,
}

impl HealthIndicator {
    pub fn label(&self) -> &'static str {
        match self {
            HealthIndicator::Unknown => "checking",
            HealthIndicator::Healthy => "service ok",
            HealthIndicator::Degraded => "needs check",
            HealthIndicator::Down => "service unavailable",
        }
    }
}

/// Raw form inputs as the user left them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    pub category: String,
    pub model_type: String,
    /// Empty means auto-match.
    pub variant_id: String,
    pub region: String,
    pub horizon_raw: String,
}

/// All mutable client state, owned by the controller.
#[derive(Debug, Clone)]
pub struct AppState {
    pub catalog: ModelCatalog,
    pub form: FormState,
    pub controls: ControlState,
    pub variant_hint: String,
    pub model_select_enabled: bool,
    pub variant_select_enabled: bool,
    pub last_result: Option<PredictionResult>,
    pub metrics: Vec<MetricCard>,
    pub preview: PreviewTable,
    pub status: StatusMessage,
    pub pill: MatchPill,
    pub step: WorkflowStep,
    pub health: HealthIndicator,
    pub loading: bool,
    pub summary: SummaryView,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            catalog: ModelCatalog::default(),
            form: FormState::default(),
            controls: ControlState::new(),
            variant_hint: HINT_AUTO_MATCH.to_string(),
            model_select_enabled: false,
            variant_select_enabled: false,
            last_result: None,
            metrics: MetricCard::render(None),
            preview: PreviewTable::render(&[]),
            status: StatusMessage::info(""),
            pill: MatchPill::Idle,
            step: WorkflowStep::Domain,
            health: HealthIndicator::Unknown,
            loading: false,
            summary: SummaryView::default(),
        }
    }

    /// Drop every rendered result artifact.
    pub fn clear_results(&mut self) {
        self.last_result = None;
        self.metrics = MetricCard::render(None);
        self.preview = PreviewTable::render(&[]);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
