//! End-to-end controller scenarios against an in-memory service and a
//! recording chart.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::time::{sleep, Duration};

use forecastfx::api::{
    ApiError, ForecastApi, HealthReport, PlaybackStep, PlotSeries, PredictRequest, PredictionResult,
    PreviewRow,
};
use forecastfx::catalog::ModelCatalog;
use forecastfx::controller::{Controller, MSG_NO_ALGORITHMS, MSG_NOTHING_TO_EXPORT};
use forecastfx::playback::{
    ChartBackend, ChartError, ChartInstance, ProgressIndicator, Redraw, SeriesDelta, SeriesSpec,
    CHART_UNAVAILABLE_NOTICE,
};
use forecastfx::selection::{HINT_NO_VARIANTS, HINT_PREFILLED};
use forecastfx::state::{Config, FormState, HealthIndicator, MatchPill, StatusKind, WorkflowStep};
use forecastfx::submit::{ConfigError, SubmitOutcome};
use forecastfx::summary::{LABEL_DOMAIN, LABEL_FEATURES, LABEL_VARIANT, UNSET};

// =============================================================================
// Fakes
// =============================================================================

#[derive(Default)]
struct Service {
    health: Option<HealthReport>,
    catalog: Option<ModelCatalog>,
    predictions: VecDeque<Result<PredictionResult, ApiError>>,
    requests: Vec<PredictRequest>,
}

#[derive(Clone, Default)]
struct FakeApi(Arc<Mutex<Service>>);

impl FakeApi {
    fn with_catalog() -> Self {
        let api = FakeApi::default();
        {
            let mut svc = api.0.lock().unwrap();
            svc.health = Some(HealthReport { status: "ok".into() });
            svc.catalog = Some(catalog());
        }
        api
    }

    fn queue(&self, response: Result<PredictionResult, ApiError>) {
        self.0.lock().unwrap().predictions.push_back(response);
    }

    fn requests(&self) -> Vec<PredictRequest> {
        self.0.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl ForecastApi for FakeApi {
    async fn health(&self) -> Result<HealthReport, ApiError> {
        self.0
            .lock()
            .unwrap()
            .health
            .clone()
            .ok_or_else(|| ApiError::Transport("connection refused".into()))
    }

    async fn options(&self) -> Result<ModelCatalog, ApiError> {
        self.0
            .lock()
            .unwrap()
            .catalog
            .clone()
            .ok_or(ApiError::Status { status: 500, detail: None })
    }

    async fn predict(&self, request: &PredictRequest) -> Result<PredictionResult, ApiError> {
        let mut svc = self.0.lock().unwrap();
        svc.requests.push(request.clone());
        svc.predictions
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Transport("no response queued".into())))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Ev {
    Create { animated: bool, initial_len: usize },
    Append(String),
    Replace(usize),
    Destroy,
    Show,
    Set(u8),
    Hide,
}

type Log = Arc<Mutex<Vec<Ev>>>;

fn count(log: &Log, pred: impl Fn(&Ev) -> bool) -> usize {
    log.lock().unwrap().iter().filter(|e| pred(e)).count()
}

#[derive(Clone, Default)]
struct Recorder {
    log: Log,
    fail: Arc<Mutex<bool>>,
}

struct RecChart(Log);

impl ChartInstance for RecChart {
    fn update(&mut self, delta: SeriesDelta<'_>, _redraw: Redraw) {
        let ev = match delta {
            SeriesDelta::Append(step) => Ev::Append(step.timestamp.clone()),
            SeriesDelta::Replace(plot) => Ev::Replace(plot.len()),
        };
        self.0.lock().unwrap().push(ev);
    }

    fn reset_view(&mut self) -> bool {
        true
    }

    fn destroy(self) {
        self.0.lock().unwrap().push(Ev::Destroy);
    }
}

impl ChartBackend for Recorder {
    type Chart = RecChart;

    fn create(&mut self, spec: &SeriesSpec) -> Result<RecChart, ChartError> {
        if *self.fail.lock().unwrap() {
            return Err(ChartError::Unavailable("bundle not loaded".into()));
        }
        self.log.lock().unwrap().push(Ev::Create {
            animated: spec.animated,
            initial_len: spec.initial.len(),
        });
        Ok(RecChart(self.log.clone()))
    }
}

#[derive(Clone, Default)]
struct Bar(Log);

impl ProgressIndicator for Bar {
    fn show(&mut self) {
        self.0.lock().unwrap().push(Ev::Show);
    }
    fn set(&mut self, percent: u8) {
        self.0.lock().unwrap().push(Ev::Set(percent));
    }
    fn hide(&mut self) {
        self.0.lock().unwrap().push(Ev::Hide);
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn catalog() -> ModelCatalog {
    serde_json::from_value(json!({
        "modelCategories": [
            {"id": "demand", "label": "Demand", "models": [
                {"type": "lstm", "label": "LSTM"},
                {"type": "xgb", "label": "XGBoost"}
            ]},
            {"id": "price", "label": "Price", "models": []}
        ],
        "models": [
            {"type": "lstm", "label": "LSTM", "variants": [
                {"id": "v1", "label": "Lag 3/6 hourly", "features": {
                    "time": ["hour"], "lags": [3, 6], "diff_periods": [1]
                }},
                {"id": "v2", "label": "Bare", "features": {}}
            ]},
            {"type": "xgb", "label": "XGBoost", "variants": []}
        ],
        "regions": ["north", "south"],
        "featureControls": {"sections": [
            {"id": "time", "label": "Time", "valueType": "string", "options": [
                {"value": "hour", "label": "Hour"},
                {"value": "month", "label": "Month"}
            ]},
            {"id": "lags", "label": "Lags", "valueType": "number", "options": [
                {"value": 3, "label": "3"},
                {"value": 6, "label": "6"},
                {"value": 12, "label": "12"}
            ]},
            {"id": "diff_periods", "label": "Differencing", "valueType": "number", "options": [
                {"value": 1, "label": "1"}
            ]}
        ]}
    }))
    .unwrap()
}

fn result_with_steps(n: usize) -> PredictionResult {
    let progress: Vec<PlaybackStep> = (0..n)
        .map(|i| PlaybackStep {
            timestamp: format!("2024-01-01T{:02}:00", i),
            actual: i as f64,
            predicted: i as f64 + 0.5,
        })
        .collect();
    let mut plot = PlotSeries::default();
    for step in &progress {
        plot.push(step);
    }
    PredictionResult {
        metrics: json!({"rmse": 0.5, "mae": 0.25}).as_object().cloned().unwrap(),
        preview: vec![
            PreviewRow { timestamp: "2024-01-01T00:00".into(), actual: Some(0.0), predicted: Some(0.5) },
            PreviewRow { timestamp: "2024-01-01T01:00".into(), actual: Some(1.0), predicted: Some(1.5) },
        ],
        plot: Some(plot),
        progress,
        feature_match: Some(true),
        message: Some("matched variant v1".into()),
        horizon: Some(6),
    }
}

type Ctl = Controller<FakeApi, Recorder, Bar>;

struct Rig {
    ctl: Ctl,
    api: FakeApi,
    chart: Recorder,
    bar: Log,
}

async fn rig_with(api: FakeApi) -> Rig {
    let chart = Recorder::default();
    let bar = Bar::default();
    let log = bar.0.clone();
    let mut ctl = Controller::new(Config::default(), api.clone(), chart.clone(), bar);
    ctl.check_health().await;
    ctl.load_catalog().await;
    Rig { ctl, api, chart, bar: log }
}

async fn rig() -> Rig {
    rig_with(FakeApi::with_catalog()).await
}

fn configure(ctl: &mut Ctl) {
    ctl.on_category_change("demand");
    ctl.on_model_change("lstm");
    ctl.on_variant_change("v1");
    ctl.on_region_change("north");
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_catalog_failure_leaves_health_and_selects_alone() {
    let api = FakeApi::default();
    api.0.lock().unwrap().health = Some(HealthReport { status: "ok".into() });
    let Rig { ctl, .. } = rig_with(api).await;

    let state = ctl.state();
    assert_eq!(state.health, HealthIndicator::Healthy);
    assert!(state.catalog.categories.is_empty());
    assert!(state.catalog.regions.is_empty());
    assert!(!state.model_select_enabled);
    assert_eq!(state.status.kind, StatusKind::Error);
    assert!(state.status.text.starts_with("failed to load configuration"));
}

#[tokio::test]
async fn test_health_states() {
    let degraded = FakeApi::with_catalog();
    degraded.0.lock().unwrap().health = Some(HealthReport { status: "starting".into() });
    assert_eq!(rig_with(degraded).await.ctl.state().health, HealthIndicator::Degraded);

    let down = FakeApi::with_catalog();
    down.0.lock().unwrap().health = None;
    let r = rig_with(down).await;
    assert_eq!(r.ctl.state().health, HealthIndicator::Down);
    // catalog loads independently of health
    assert_eq!(r.ctl.state().catalog.categories.len(), 2);
}

#[tokio::test]
async fn test_variant_lags_reduce_to_maximum() {
    let Rig { mut ctl, .. } = rig().await;
    configure(&mut ctl);

    assert_eq!(ctl.selection().lags, Some(6));
    assert_eq!(ctl.selection().time, vec!["hour"]);
    assert!(ctl.state().variant_hint.contains("lag: 6"));
    assert!(!ctl.state().variant_hint.contains("lag: 3"));
    assert_eq!(ctl.state().summary.value(LABEL_VARIANT), Some("Lag 3/6 hourly"));
    assert!(ctl.state().summary.value(LABEL_FEATURES).unwrap().contains("lag: 6"));
}

#[tokio::test]
async fn test_model_change_prefills_first_variant_but_stays_on_auto_match() {
    let Rig { mut ctl, api, .. } = rig().await;
    ctl.on_category_change("demand");
    ctl.on_model_change("lstm");
    ctl.on_region_change("north");

    assert_eq!(ctl.state().variant_hint, HINT_PREFILLED);
    assert_eq!(ctl.state().form.variant_id, "");
    assert_eq!(ctl.selection().lags, Some(6));
    assert_eq!(ctl.state().step, WorkflowStep::Region);

    api.queue(Ok(result_with_steps(0)));
    ctl.submit().await;
    assert_eq!(api.requests()[0].variant_id, None);
}

#[tokio::test]
async fn test_model_without_variants_clears_controls() {
    let Rig { mut ctl, .. } = rig().await;
    configure(&mut ctl);
    ctl.on_model_change("xgb");

    assert_eq!(ctl.state().variant_hint, HINT_NO_VARIANTS);
    assert!(ctl.selection().is_empty());
    assert!(!ctl.state().variant_select_enabled);
}

#[tokio::test]
async fn test_category_without_models_disables_algorithm_select() {
    let Rig { mut ctl, .. } = rig().await;
    ctl.on_category_change("price");

    assert!(!ctl.state().model_select_enabled);
    assert_eq!(ctl.state().status.text, MSG_NO_ALGORITHMS);
    assert_eq!(ctl.state().summary.value(LABEL_DOMAIN), Some("Price"));
}

#[tokio::test]
async fn test_submit_without_algorithm_or_region_sends_nothing() {
    let Rig { mut ctl, api, .. } = rig().await;
    ctl.on_category_change("demand");

    let outcome = ctl.submit().await;
    assert_eq!(outcome, SubmitOutcome::Rejected(ConfigError::MissingAlgorithmOrRegion));
    assert!(api.requests().is_empty());
    assert_eq!(ctl.state().status.kind, StatusKind::Error);
    assert_eq!(ctl.state().status.text, "select an algorithm and a region first.");

    let Rig { mut ctl, api, .. } = rig().await;
    assert_eq!(ctl.submit().await, SubmitOutcome::Rejected(ConfigError::MissingDomain));
    assert!(api.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_playback_of_24_steps() {
    let Rig { mut ctl, api, chart, bar } = rig().await;
    configure(&mut ctl);
    api.queue(Ok(result_with_steps(24)));

    let outcome = ctl.submit().await;
    assert_eq!(outcome, SubmitOutcome::Succeeded { matched: true });

    let log = &chart.log;
    assert_eq!(count(log, |e| matches!(e, Ev::Create { .. })), 1);
    assert_eq!(
        log.lock().unwrap()[0],
        Ev::Create { animated: false, initial_len: 0 }
    );
    assert_eq!(count(log, |e| matches!(e, Ev::Append(_))), 24);
    assert_eq!(count(log, |e| matches!(e, Ev::Replace(_))), 1);
    assert_eq!(log.lock().unwrap().last(), Some(&Ev::Replace(24)));

    let bar = bar.lock().unwrap().clone();
    let hundred = bar.iter().position(|e| *e == Ev::Set(100)).unwrap();
    let last_hide = bar.iter().rposition(|e| *e == Ev::Hide).unwrap();
    assert!(hundred < last_hide);
    assert_eq!(bar.last(), Some(&Ev::Hide));

    let state = ctl.state();
    assert_eq!(state.step, WorkflowStep::Results);
    assert_eq!(state.pill, MatchPill::Matched);
    assert_eq!(state.status.kind, StatusKind::Success);
    assert_eq!(state.status.text, "matched variant v1");
    assert_eq!(state.metrics.len(), 2);
    assert_eq!(state.metrics[0].value, "0.500");
    assert_eq!(state.preview.count(), 2);
    assert!(!state.loading);
}

#[tokio::test]
async fn test_fallback_pill_follows_server() {
    let Rig { mut ctl, api, .. } = rig().await;
    configure(&mut ctl);
    api.queue(Ok(PredictionResult { feature_match: Some(false), ..result_with_steps(0) }));

    assert_eq!(ctl.submit().await, SubmitOutcome::Succeeded { matched: false });
    assert_eq!(ctl.state().pill, MatchPill::Fallback);
}

#[tokio::test]
async fn test_failure_clears_results() {
    let Rig { mut ctl, api, chart, .. } = rig().await;
    configure(&mut ctl);
    api.queue(Ok(result_with_steps(0)));
    ctl.submit().await;
    assert!(ctl.renderer().has_chart());

    api.queue(Err(ApiError::Status { status: 400, detail: Some("unknown region".into()) }));
    let outcome = ctl.submit().await;
    assert_eq!(outcome, SubmitOutcome::Failed { message: "unknown region".into() });

    let state = ctl.state();
    assert_eq!(state.status.kind, StatusKind::Error);
    assert_eq!(state.pill, MatchPill::Failed);
    assert_eq!(state.step, WorkflowStep::Region);
    assert!(state.last_result.is_none());
    assert!(state.metrics[0].placeholder);
    assert!(state.preview.placeholder.is_some());
    assert!(!ctl.renderer().has_chart());
    assert_eq!(count(&chart.log, |e| *e == Ev::Destroy), 1);
}

#[tokio::test]
async fn test_generic_status_failure_message() {
    let Rig { mut ctl, api, .. } = rig().await;
    configure(&mut ctl);
    api.queue(Err(ApiError::Status { status: 502, detail: None }));
    ctl.submit().await;
    assert_eq!(ctl.state().status.text, "prediction failed: HTTP 502");
}

#[tokio::test]
async fn test_horizon_falls_back_to_default() {
    let Rig { mut ctl, api, .. } = rig().await;
    configure(&mut ctl);

    ctl.on_horizon_input("abc");
    api.queue(Ok(result_with_steps(0)));
    ctl.submit().await;

    ctl.on_horizon_input("12");
    api.queue(Ok(result_with_steps(0)));
    ctl.submit().await;

    let horizons: Vec<u32> = api.requests().iter().map(|r| r.horizon).collect();
    assert_eq!(horizons, vec![6, 12]);
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_settles_and_allows_restart() {
    let Rig { mut ctl, api, chart, .. } = rig().await;
    configure(&mut ctl);
    api.queue(Ok(result_with_steps(24)));
    api.queue(Ok(result_with_steps(3)));

    let handle = ctl.interrupt_handle();
    let (outcome, _) = tokio::join!(ctl.submit(), async {
        sleep(Duration::from_millis(50)).await;
        handle.interrupt();
    });
    assert_eq!(outcome, SubmitOutcome::Interrupted);

    let appended = count(&chart.log, |e| matches!(e, Ev::Append(_)));
    assert!(appended > 0 && appended < 24, "appended {}", appended);
    assert_eq!(chart.log.lock().unwrap().last(), Some(&Ev::Replace(24)));
    assert_eq!(ctl.state().preview.count(), 2);
    assert!(!ctl.state().loading);

    // the next run starts clean on a fresh chart
    chart.log.lock().unwrap().clear();
    assert_eq!(ctl.submit().await, SubmitOutcome::Succeeded { matched: true });
    let log = chart.log.lock().unwrap().clone();
    assert_eq!(log[0], Ev::Destroy);
    assert_eq!(log.iter().filter(|e| matches!(e, Ev::Append(_))).count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_submit_recovers_on_next_run() {
    let Rig { mut ctl, api, chart, .. } = rig().await;
    configure(&mut ctl);
    api.queue(Ok(result_with_steps(24)));
    api.queue(Ok(result_with_steps(3)));

    // the caller gives up mid-playback and drops the future
    let abandoned = tokio::time::timeout(Duration::from_millis(50), ctl.submit()).await;
    assert!(abandoned.is_err());
    assert!(ctl.state().loading);
    assert_eq!(ctl.state().step, WorkflowStep::Running);

    assert_eq!(ctl.submit().await, SubmitOutcome::Succeeded { matched: true });
    assert!(!ctl.state().loading);
    assert_eq!(ctl.state().step, WorkflowStep::Results);
    assert_eq!(api.requests().len(), 2);

    let created = count(&chart.log, |e| matches!(e, Ev::Create { .. }));
    let destroyed = count(&chart.log, |e| *e == Ev::Destroy);
    assert_eq!(created - destroyed, 1);
    assert!(ctl.renderer().has_chart());
    assert_eq!(chart.log.lock().unwrap().last(), Some(&Ev::Replace(3)));
}

#[tokio::test]
async fn test_chart_unavailable_reported_once() {
    let Rig { mut ctl, api, chart, .. } = rig().await;
    configure(&mut ctl);
    *chart.fail.lock().unwrap() = true;

    api.queue(Ok(result_with_steps(4)));
    assert_eq!(ctl.submit().await, SubmitOutcome::Succeeded { matched: true });
    assert_eq!(ctl.state().status.kind, StatusKind::Error);
    assert_eq!(ctl.state().status.text, CHART_UNAVAILABLE_NOTICE);
    // the rest of the result still renders
    assert_eq!(ctl.state().preview.count(), 2);
    assert_eq!(ctl.state().pill, MatchPill::Matched);

    api.queue(Ok(result_with_steps(4)));
    ctl.submit().await;
    assert_eq!(ctl.state().status.kind, StatusKind::Success);
}

#[tokio::test]
async fn test_reset_returns_to_blank_form() {
    let Rig { mut ctl, api, chart, bar } = rig().await;
    configure(&mut ctl);
    ctl.on_horizon_input("24");
    api.queue(Ok(result_with_steps(0)));
    ctl.submit().await;

    ctl.reset();
    let state = ctl.state();
    assert_eq!(state.form, FormState::default());
    assert_eq!(state.pill, MatchPill::Idle);
    assert_eq!(state.step, WorkflowStep::Domain);
    assert!(state.last_result.is_none());
    assert!(ctl.selection().is_empty());
    assert_eq!(state.summary.value(LABEL_DOMAIN), Some(UNSET));
    assert_eq!(state.summary.value("Horizon"), Some("default 6"));
    assert!(!ctl.renderer().has_chart());
    assert_eq!(count(&chart.log, |e| *e == Ev::Destroy), 1);
    assert_eq!(bar.lock().unwrap().last(), Some(&Ev::Hide));
    // catalog survives a reset
    assert_eq!(state.catalog.regions.len(), 2);
}

#[tokio::test]
async fn test_export_reads_the_rendered_preview() {
    let Rig { mut ctl, api, .. } = rig().await;
    assert_eq!(ctl.export_preview(), None);
    assert_eq!(ctl.state().status.text, MSG_NOTHING_TO_EXPORT);

    configure(&mut ctl);
    api.queue(Ok(result_with_steps(0)));
    ctl.submit().await;

    let csv = ctl.export_preview().unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "timestamp,actual,predicted");
    assert_eq!(lines[1], "2024-01-01T00:00,0,0.5");
    assert_eq!(lines.len(), 3);
}

#[tokio::test]
async fn test_zoom_reset_needs_a_chart() {
    let Rig { mut ctl, api, .. } = rig().await;
    assert!(!ctl.reset_zoom());

    configure(&mut ctl);
    api.queue(Ok(result_with_steps(0)));
    ctl.submit().await;
    assert!(ctl.reset_zoom());
    assert_eq!(ctl.docs_url(), "http://localhost:8000/docs");
}

#[tokio::test]
async fn test_unknown_feature_controls_are_ignored() {
    let Rig { mut ctl, .. } = rig().await;
    ctl.on_category_change("demand");
    ctl.on_model_change("xgb");

    ctl.on_feature_toggle("weather", "rain", true);
    ctl.on_feature_toggle("lags", "48", true);
    assert!(ctl.selection().is_empty());
    assert_eq!(ctl.state().controls.checked_count(), 0);

    ctl.on_feature_toggle("lags", "12", true);
    assert_eq!(ctl.state().controls.checked_count(), 1);
    assert_eq!(ctl.selection().lags, Some(12));
}
