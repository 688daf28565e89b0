//! `glyco`: forecast glucose and recommend insulin from CSV history.

mod cli;
mod error_fmt;
mod report;

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser};
use eyre::{Result, WrapErr, eyre};
use glyco_core::conversions;
use glyco_core::{
    CarbEntry, Engine, EngineError, EngineSettings, InMemoryHistory, InsulinDose,
    PredictionSnapshot, StaticParameters, assemble_snapshot,
};
use glyco_traits::{FixedClock, SystemClock};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if cli.cmd.needs_history() && cli.glucose.is_none() {
        Cli::command()
            .error(
                clap::error::ErrorKind::MissingRequiredArgument,
                "--glucose <FILE> is required for forecast and recommend",
            )
            .exit();
    }

    if let Err(e) = run(&cli) {
        tracing::error!(error = %format!("{e:#}"), "glyco failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", error_fmt::format_error_json(&e));
        } else {
            eprintln!("{}", error_fmt::humanize(&e));
        }
        std::process::exit(error_fmt::exit_code_for_error(&e));
    }
}

fn run(cli: &Cli) -> Result<()> {
    let text = fs::read_to_string(&cli.config)
        .wrap_err_with(|| format!("read config {}", cli.config.display()))?;
    let cfg: glyco_config::Config = toml::from_str(&text).wrap_err("parse config TOML")?;
    init_tracing(cli, &cfg.logging)?;

    cfg.validate()
        .map_err(|e| eyre::Report::new(EngineError::ParameterOutOfRange(e.to_string())))?;
    let settings = EngineSettings::try_from(&cfg)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    let engine = Engine::new();
    let out = match cli.cmd {
        Commands::CheckConfig => report::settings(&settings, cli.json)?,
        Commands::Forecast => {
            let snapshot = load_snapshot(cli, settings)?;
            let forecast = engine.forecast(&snapshot)?;
            tracing::info!(
                points = forecast.trajectory.points().len(),
                warnings = forecast.warnings.len(),
                "forecast ready"
            );
            report::forecast(&forecast, cli.json)?
        }
        Commands::Recommend => {
            let snapshot = load_snapshot(cli, settings)?;
            let output = engine.evaluate(&snapshot)?;
            report::recommendation(&output, cli.json)?
        }
    };
    // JSON output is one line; text already ends with a newline.
    if cli.json {
        println!("{out}");
    } else {
        print!("{out}");
    }
    Ok(())
}

fn load_snapshot(cli: &Cli, settings: EngineSettings) -> Result<PredictionSnapshot> {
    let path = cli
        .glucose
        .as_deref()
        .ok_or_else(|| eyre!("--glucose is required"))?;
    let glucose = glyco_config::load_glucose_csv(path)?
        .iter()
        .map(conversions::glucose_reading)
        .collect::<Result<Vec<_>>>()
        .wrap_err_with(|| format!("glucose CSV {}", path.display()))?;
    let doses: Vec<InsulinDose> = match cli.doses.as_deref() {
        Some(p) => glyco_config::load_doses_csv(p)?
            .iter()
            .map(conversions::insulin_dose)
            .collect(),
        None => Vec::new(),
    };
    let carbs: Vec<CarbEntry> = match cli.carbs.as_deref() {
        Some(p) => glyco_config::load_carbs_csv(p)?
            .iter()
            .map(conversions::carb_entry)
            .collect(),
        None => Vec::new(),
    };
    tracing::debug!(
        glucose = glucose.len(),
        doses = doses.len(),
        carbs = carbs.len(),
        "history loaded"
    );

    let coverage = cli
        .doses_complete_since
        .or_else(|| cli.doses.as_ref().and_then(|_| earliest_dose(&doses)));
    let mut history = InMemoryHistory::new(glucose, doses, carbs);
    if let Some(since) = coverage {
        history = history.complete_since(since);
    }
    let params = StaticParameters(settings);
    match cli.now {
        Some(now) => assemble_snapshot(&history, &params, &FixedClock::new(now)),
        None => assemble_snapshot(&history, &params, &SystemClock::new()),
    }
}

/// A dose file vouches for history back to its first record, not before.
fn earliest_dose(doses: &[InsulinDose]) -> Option<DateTime<Utc>> {
    doses.iter().map(|d| d.start).min()
}

fn init_tracing(cli: &Cli, logging: &glyco_config::Logging) -> Result<()> {
    use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

    let level = cli
        .log_level
        .as_deref()
        .or(logging.level.as_deref())
        .unwrap_or("info");
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(level).wrap_err_with(|| format!("invalid log level {level:?}"))?,
    };

    // Console logs go to stderr so stdout stays machine-readable.
    let console = if cli.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match logging.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre!("logging.file has no file name: {}", path.display()))?;
            let appender = match logging.rotation.as_deref().unwrap_or("never") {
                "never" => tracing_appender::rolling::never(dir, name),
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                other => eyre::bail!("logging.rotation must be never, daily or hourly, got {other:?}"),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| eyre!("init logging: {e}"))
}
