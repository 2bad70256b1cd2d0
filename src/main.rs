use std::path::PathBuf;

use anyhow::{bail, Result};
use forecastfx::api::HttpApi;
use forecastfx::controller::Controller;
use forecastfx::export::write_csv;
use forecastfx::logging::{log, obj, v_str, Domain, Level};
use forecastfx::state::Config;
use forecastfx::submit::SubmitOutcome;
use forecastfx::terminal::{TerminalBackend, TerminalProgress};

/// What to run, read from the environment.
#[derive(Debug, Default)]
struct RunRequest {
    category: String,
    model_type: String,
    region: String,
    variant: Option<String>,
    horizon: Option<String>,
    features: Vec<(String, String)>,
    export_dir: Option<PathBuf>,
}

impl RunRequest {
    fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            category: var("CATEGORY").unwrap_or_default(),
            model_type: var("MODEL_TYPE").unwrap_or_default(),
            region: var("REGION").unwrap_or_default(),
            variant: var("VARIANT"),
            horizon: var("HORIZON"),
            features: var("FEATURES").map(|f| parse_features(&f)).unwrap_or_default(),
            export_dir: var("EXPORT_DIR").map(PathBuf::from),
        }
    }
}

/// `time=hour,dayofweek;lags=6` → `[(time, hour), (time, dayofweek), (lags, 6)]`
fn parse_features(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|group| group.split_once('='))
        .flat_map(|(section, values)| {
            let section = section.trim().to_string();
            values
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(move |v| (section.clone(), v.to_string()))
        })
        .filter(|(section, _)| !section.is_empty())
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::try_from_env()?;
    let run = RunRequest::from_env();

    let api = HttpApi::new(cfg.clone());
    let mut ctl = Controller::new(cfg, api, TerminalBackend::default(), TerminalProgress::default());

    let health = ctl.check_health().await;
    println!("service: {} (docs: {})", health.label(), ctl.docs_url());

    if !ctl.load_catalog().await {
        bail!("{}", ctl.state().status.text);
    }

    ctl.on_category_change(&run.category);
    ctl.on_model_change(&run.model_type);
    if let Some(variant) = &run.variant {
        ctl.on_variant_change(variant);
    }
    ctl.on_region_change(&run.region);
    if let Some(horizon) = &run.horizon {
        ctl.on_horizon_input(horizon);
    }
    for (section, value) in &run.features {
        ctl.on_feature_toggle(section, value, true);
    }

    log(
        Level::Info,
        Domain::System,
        "run_configured",
        obj(&[
            ("model_type", v_str(&run.model_type)),
            ("region", v_str(&run.region)),
            ("msg", v_str(&ctl.state().variant_hint)),
        ]),
    );

    let outcome = ctl.submit().await;
    let state = ctl.state();

    println!();
    for row in &state.summary.rows {
        println!("{:<14} {}", row.label, row.value);
    }
    println!();
    match outcome {
        SubmitOutcome::Rejected(err) => bail!("{}", err),
        SubmitOutcome::Failed { message } => bail!("{}", message),
        SubmitOutcome::Succeeded { .. } | SubmitOutcome::Interrupted => {}
    }

    println!("{} | {}", state.status.text, state.pill.label());
    for card in &state.metrics {
        println!("  {:<12} {}", card.name, card.value);
    }
    println!();
    match &state.preview.placeholder {
        Some(text) => println!("{}", text),
        None => {
            println!("{:>4}  {:<20} {:>12} {:>12}", "#", "timestamp", "actual", "predicted");
            for line in &state.preview.rows {
                println!(
                    "{:>4}  {:<20} {:>12} {:>12}",
                    line.index, line.timestamp, line.actual, line.predicted
                );
            }
        }
    }

    if let Some(dir) = &run.export_dir {
        match ctl.export_preview() {
            Some(csv) => {
                let path = write_csv(dir, &csv)?;
                println!("preview written to {}", path.display());
            }
            None => println!("{}", ctl.state().status.text),
        }
    }

    Ok(())
}
