//! The single controller context.
//!
//! Owns the client state, the service client, the playback renderer and
//! the progress indicator. Every event handler mutates `AppState` and ends
//! by re-projecting the summary, so the summary is never stale.
//!
//! Exclusivity: handlers take `&mut self`, so no two events interleave
//! while a submission is in flight. The only cross-event control is the
//! [`InterruptHandle`], which stops a running playback (cancel-and-restart).

use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::api::{ApiError, ForecastApi, PredictionResult};
use crate::catalog::ModelCatalog;
use crate::export;
use crate::logging::{
    log, log_catalog_loaded, log_submit_outcome, obj, v_num, v_str, Domain, Level,
};
use crate::playback::{
    ChartBackend, PlaybackOutcome, PlaybackRenderer, ProgressIndicator, StopSignal,
};
use crate::render::{MetricCard, PreviewTable};
use crate::selection::{
    apply_variant, gather_selection, FeatureSelection, HINT_AUTO_MATCH, HINT_NO_VARIANTS,
    HINT_PREFILLED,
};
use crate::state::{
    AppState, Config, FormState, HealthIndicator, MatchPill, StatusMessage, WorkflowStep,
};
use crate::submit::{
    build_request, failure_message, success_message, SubmitOutcome, MSG_DRAWING, MSG_RUNNING,
};
use crate::summary::project;

pub const MSG_LOADING_CATALOG: &str = "loading available models and regions...";
pub const MSG_READY: &str = "ready; configure a forecast.";
pub const MSG_NO_ALGORITHMS: &str = "no algorithms are available for this domain.";
pub const MSG_RESET: &str = "reset; configure the forecast again.";
pub const MSG_ZOOM_RESET: &str = "chart zoom reset.";
pub const MSG_NOTHING_TO_EXPORT: &str = "no preview data to export.";

/// Cancels whichever playback is currently running. Cloneable so the
/// event loop can hold one while a submission borrows the controller.
#[derive(Clone, Default)]
pub struct InterruptHandle {
    current: Arc<Mutex<StopSignal>>,
}

impl InterruptHandle {
    pub fn interrupt(&self) {
        if let Ok(signal) = self.current.lock() {
            signal.stop();
        }
    }

    /// Install a fresh signal for a new run.
    fn arm(&self) -> StopSignal {
        let signal = StopSignal::new();
        if let Ok(mut current) = self.current.lock() {
            *current = signal.clone();
        }
        signal
    }
}

pub struct Controller<A, B: ChartBackend, P> {
    cfg: Config,
    api: A,
    renderer: PlaybackRenderer<B>,
    progress: P,
    state: AppState,
    interrupt: InterruptHandle,
}

impl<A, B, P> Controller<A, B, P>
where
    A: ForecastApi,
    B: ChartBackend,
    P: ProgressIndicator,
{
    pub fn new(cfg: Config, api: A, backend: B, progress: P) -> Self {
        let renderer = PlaybackRenderer::new(backend, cfg.frame_schedule());
        let mut ctl = Self {
            cfg,
            api,
            renderer,
            progress,
            state: AppState::new(),
            interrupt: InterruptHandle::default(),
        };
        ctl.refresh_summary();
        ctl
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn renderer(&self) -> &PlaybackRenderer<B> {
        &self.renderer
    }

    pub fn progress(&self) -> &P {
        &self.progress
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn selection(&self) -> FeatureSelection {
        gather_selection(&self.state.catalog.feature_controls, &self.state.controls)
    }

    pub fn refresh_summary(&mut self) {
        let selection = self.selection();
        self.state.summary = project(
            &self.state.catalog,
            &self.state.form,
            &selection,
            self.state.last_result.as_ref(),
            self.cfg.default_horizon,
        );
    }

    // =========================================================================
    // Startup
    // =========================================================================

    pub async fn check_health(&mut self) -> HealthIndicator {
        let indicator = match self.api.health().await {
            Ok(report) if report.is_ok() => HealthIndicator::Healthy,
            Ok(_) => HealthIndicator::Degraded,
            Err(err) => {
                log(
                    Level::Warn,
                    Domain::Health,
                    "health_failed",
                    obj(&[("msg", v_str(&err.to_string()))]),
                );
                HealthIndicator::Down
            }
        };
        self.state.health = indicator;
        indicator
    }

    /// Fetch the catalog. On failure the previous catalog stays in place.
    pub async fn load_catalog(&mut self) -> bool {
        self.state.status = StatusMessage::info(MSG_LOADING_CATALOG);
        let loaded = match self.api.options().await {
            Ok(catalog) => {
                log_catalog_loaded(
                    catalog.categories.len(),
                    catalog.models.len(),
                    catalog.regions.len(),
                    catalog.feature_controls.sections.len(),
                );
                self.install_catalog(catalog);
                self.state.status = StatusMessage::success(MSG_READY);
                true
            }
            Err(err) => {
                log(
                    Level::Error,
                    Domain::Catalog,
                    "catalog_failed",
                    obj(&[("msg", v_str(&err.to_string()))]),
                );
                self.state.status =
                    StatusMessage::error(format!("failed to load configuration: {}", err));
                false
            }
        };
        self.refresh_summary();
        loaded
    }

    fn install_catalog(&mut self, catalog: ModelCatalog) {
        self.state.catalog = catalog;
        let horizon_raw = std::mem::take(&mut self.state.form.horizon_raw);
        self.state.form = FormState { horizon_raw, ..FormState::default() };
        self.state.controls.clear();
        self.state.model_select_enabled = false;
        self.state.variant_select_enabled = false;
        self.state.step = WorkflowStep::Domain;
    }

    // =========================================================================
    // Form events
    // =========================================================================

    pub fn on_category_change(&mut self, category_id: &str) {
        self.state.form.category = category_id.to_string();
        self.state.form.model_type.clear();
        self.state.form.variant_id.clear();

        let has_models = !self.state.catalog.models_in(category_id).is_empty();
        self.state.model_select_enabled = has_models;
        self.state.variant_select_enabled = has_models;
        if !has_models {
            self.state.status = StatusMessage::info(MSG_NO_ALGORITHMS);
        }

        self.state.controls.clear();
        self.state.variant_hint = HINT_AUTO_MATCH.to_string();
        self.state.step = WorkflowStep::Domain;
        self.refresh_summary();
    }

    /// Lists the algorithm's variants and prefills controls from the first
    /// one. The variant select itself stays on auto-match.
    pub fn on_model_change(&mut self, model_type: &str) {
        self.state.form.model_type = model_type.to_string();
        self.state.form.variant_id.clear();

        let first = self
            .state
            .catalog
            .variants_of(model_type)
            .first()
            .map(|v| v.id.clone());
        self.state.variant_select_enabled = first.is_some();
        match first {
            Some(variant_id) => {
                apply_variant(&self.state.catalog, &mut self.state.controls, model_type, &variant_id);
                self.state.variant_hint = HINT_PREFILLED.to_string();
                log(
                    Level::Debug,
                    Domain::Selection,
                    "variant_prefilled",
                    obj(&[("model_type", v_str(model_type)), ("variant_id", v_str(&variant_id))]),
                );
            }
            None => {
                self.state.controls.clear();
                self.state.variant_hint = HINT_NO_VARIANTS.to_string();
            }
        }

        self.state.step = if model_type.is_empty() {
            WorkflowStep::Domain
        } else {
            WorkflowStep::Algorithm
        };
        self.refresh_summary();
    }

    pub fn on_variant_change(&mut self, variant_id: &str) {
        self.state.form.variant_id = variant_id.to_string();
        let model_type = self.state.form.model_type.clone();
        if !model_type.is_empty() {
            if variant_id.is_empty() {
                self.state.variant_hint = HINT_AUTO_MATCH.to_string();
            } else {
                self.state.variant_hint =
                    apply_variant(&self.state.catalog, &mut self.state.controls, &model_type, variant_id);
                log(
                    Level::Debug,
                    Domain::Selection,
                    "variant_applied",
                    obj(&[("model_type", v_str(&model_type)), ("variant_id", v_str(variant_id))]),
                );
            }
        }
        self.refresh_summary();
    }

    pub fn on_region_change(&mut self, region: &str) {
        self.state.form.region = region.to_string();
        if !region.is_empty() {
            self.state.step = WorkflowStep::Region;
        }
        self.refresh_summary();
    }

    pub fn on_horizon_input(&mut self, raw: &str) {
        self.state.form.horizon_raw = raw.to_string();
        self.refresh_summary();
    }

    /// Toggles for sections or values the catalog does not offer are dropped.
    pub fn on_feature_toggle(&mut self, section: &str, value: &str, checked: bool) {
        let offered = self
            .state
            .catalog
            .feature_controls
            .section(section)
            .map(|s| s.options.iter().any(|opt| opt.value == value))
            .unwrap_or(false);
        if offered {
            self.state.controls.set(section, value, checked);
            log(
                Level::Trace,
                Domain::Selection,
                "feature_toggled",
                obj(&[
                    ("section", v_str(section)),
                    ("value", v_str(value)),
                    ("checked", Value::Bool(checked)),
                    ("active", v_num(self.state.controls.checked_count() as f64)),
                ]),
            );
        } else {
            log(
                Level::Warn,
                Domain::Selection,
                "unknown_feature_control",
                obj(&[("section", v_str(section)), ("value", v_str(value))]),
            );
        }
        self.refresh_summary();
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Validate, send, and play back one prediction.
    ///
    /// A configuration error returns before any request is made. Success
    /// and failure both leave the controller re-enterable with a fresh
    /// summary.
    pub async fn submit(&mut self) -> SubmitOutcome {
        if self.state.loading {
            // only reachable when a previous submit future was dropped mid-flight
            log(Level::Warn, Domain::Submit, "stale_loading_recovered", obj(&[]));
        }

        let request = match build_request(&self.state.form, self.selection(), self.cfg.default_horizon) {
            Ok(request) => request,
            Err(err) => {
                self.state.status = StatusMessage::error(err.to_string());
                log(
                    Level::Info,
                    Domain::Submit,
                    "submit_rejected",
                    obj(&[("msg", v_str(&err.to_string()))]),
                );
                self.refresh_summary();
                return SubmitOutcome::Rejected(err);
            }
        };
        let fingerprint = request.fingerprint();
        let stop = self.interrupt.arm();

        self.progress.hide();
        self.state.status = StatusMessage::info(MSG_RUNNING);
        self.state.loading = true;
        self.state.step = WorkflowStep::Running;

        let outcome = match self.api.predict(&request).await {
            Ok(result) => self.finish_success(result, &stop).await,
            Err(err) => self.finish_failure(&err),
        };

        let detail = match &outcome {
            SubmitOutcome::Failed { message } => message.clone(),
            _ => self.state.status.text.clone(),
        };
        log_submit_outcome(&fingerprint, outcome_name(&outcome), &detail);

        self.refresh_summary();
        outcome
    }

    async fn finish_success(&mut self, result: PredictionResult, stop: &StopSignal) -> SubmitOutcome {
        self.state.metrics = MetricCard::render(Some(&result.metrics));
        self.state.status = StatusMessage::info(MSG_DRAWING);

        let playback = self.renderer.play(&result, &mut self.progress, stop).await;

        self.state.preview = PreviewTable::render(&result.preview);
        let matched = result.matched();
        self.state.pill = MatchPill::from_match(matched);
        self.state.status = match self.renderer.take_notice() {
            Some(notice) => StatusMessage::error(notice),
            None => StatusMessage::success(success_message(&result)),
        };
        self.state.last_result = Some(result);
        self.state.loading = false;
        self.state.step = WorkflowStep::Results;

        match playback {
            PlaybackOutcome::Cancelled { .. } => SubmitOutcome::Interrupted,
            _ => SubmitOutcome::Succeeded { matched },
        }
    }

    fn finish_failure(&mut self, err: &ApiError) -> SubmitOutcome {
        let message = failure_message(err);
        self.progress.hide();
        self.renderer.clear();
        self.state.clear_results();
        self.state.status = StatusMessage::error(message.clone());
        self.state.pill = MatchPill::Failed;
        self.state.step = WorkflowStep::Region;
        self.state.loading = false;
        SubmitOutcome::Failed { message }
    }

    // =========================================================================
    // Secondary actions
    // =========================================================================

    /// Back to a blank form with the current catalog.
    pub fn reset(&mut self) {
        self.interrupt.interrupt();
        self.state.form = FormState::default();
        self.state.controls.clear();
        self.state.model_select_enabled = false;
        self.state.variant_select_enabled = false;
        self.state.variant_hint = HINT_AUTO_MATCH.to_string();
        self.state.clear_results();
        self.renderer.clear();
        self.progress.hide();
        self.state.pill = MatchPill::Idle;
        self.state.status = StatusMessage::info(MSG_RESET);
        self.state.step = WorkflowStep::Domain;
        self.state.loading = false;
        self.refresh_summary();
    }

    pub fn reset_zoom(&mut self) -> bool {
        let reset = self.renderer.reset_view();
        if reset {
            self.state.status = StatusMessage::info(MSG_ZOOM_RESET);
        }
        reset
    }

    pub fn docs_url(&self) -> String {
        self.cfg.docs_url()
    }

    /// CSV of the rows the preview table currently shows.
    pub fn export_preview(&mut self) -> Option<String> {
        if self.state.preview.source.is_empty() {
            self.state.status = StatusMessage::info(MSG_NOTHING_TO_EXPORT);
            return None;
        }
        Some(export::preview_csv(&self.state.preview.source))
    }
}

fn outcome_name(outcome: &SubmitOutcome) -> &'static str {
    match outcome {
        SubmitOutcome::Rejected(_) => "rejected",
        SubmitOutcome::Succeeded { .. } => "succeeded",
        SubmitOutcome::Failed { .. } => "failed",
        SubmitOutcome::Interrupted => "interrupted",
    }
}
