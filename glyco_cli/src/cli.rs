//! CLI argument definitions and shared statics.

use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Set once at startup; error rendering picks JSON or text from it.
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(
    name = "glyco",
    version,
    about = "Glucose forecast and insulin dose recommendation"
)]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/glyco_config.toml")]
    pub config: PathBuf,

    /// Glucose history CSV (headers: date,mg_dl[,source])
    #[arg(long, value_name = "FILE", global = true)]
    pub glucose: Option<PathBuf>,

    /// Insulin dose history CSV (headers: type,start,end,units)
    #[arg(long, value_name = "FILE", global = true)]
    pub doses: Option<PathBuf>,

    /// Carb entry CSV (headers: date,grams,absorption_min,partially_absorbed)
    #[arg(long, value_name = "FILE", global = true)]
    pub carbs: Option<PathBuf>,

    /// Evaluation time (RFC 3339). Defaults to the system clock.
    #[arg(long, value_name = "RFC3339", global = true)]
    pub now: Option<DateTime<Utc>>,

    /// Instant from which the dose CSV is complete. Defaults to the earliest
    /// dose record when --doses is given.
    #[arg(long = "doses-complete-since", value_name = "RFC3339", global = true)]
    pub doses_complete_since: Option<DateTime<Utc>>,

    /// Emit results and errors as single-line JSON on stdout
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    pub json: bool,

    /// Log level (error|warn|info|debug|trace). Overrides [logging].level; RUST_LOG wins over both.
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Predict glucose over the configured horizon
    Forecast,
    /// Predict and recommend a dose
    Recommend,
    /// Load and validate the config, then print the effective settings
    CheckConfig,
}

impl Commands {
    pub fn needs_history(self) -> bool {
        !matches!(self, Self::CheckConfig)
    }
}
