//! Snapshot assembly from collaborators.
//!
//! Hosts that keep history behind a `HistoryProvider` call
//! `assemble_snapshot` once per cycle; the engine itself never queries.

use chrono::{DateTime, Utc};
use glyco_traits::{Clock, HistoryProvider, ParameterProvider, Timestamped};
use tracing::{debug, instrument};

use crate::config::{AbsorptionMode, EngineSettings};
use crate::error::Result;
use crate::provider_error::map_provider_error;
use crate::snapshot::PredictionSnapshot;
use crate::util::add_minutes;

/// How far back history must reach for every effect to be computed.
pub fn lookback_min(settings: &EngineSettings) -> f64 {
    let carbs = match settings.carbs.mode {
        AbsorptionMode::Dynamic { absorption_overrun } => {
            settings.carbs.max_absorption_min * absorption_overrun
        }
        AbsorptionMode::Static => settings.carbs.max_absorption_min,
    };
    let r = &settings.retrospective;
    settings.insulin.action_duration_min.max(carbs)
        + r.window_min
        + r.tolerance_min
        + settings.momentum.window_min
}

fn sorted<T: Timestamped>(mut v: Vec<T>) -> Vec<T> {
    v.sort_by_key(|x| x.timestamp());
    v
}

fn fetch<T>(what: &str, r: std::result::Result<Vec<T>, glyco_traits::BoxError>) -> Result<Vec<T>> {
    r.map_err(|e| eyre::Report::new(map_provider_error(e.as_ref())))
        .map_err(|e| e.wrap_err(format!("fetch {what} history")))
}

/// Query history and settings for the window ending at `clock.now()` and
/// build a validated snapshot.
#[instrument(level = "debug", skip_all)]
pub fn assemble_snapshot<H, P, C>(history: &H, params: &P, clock: &C) -> Result<PredictionSnapshot>
where
    H: HistoryProvider + ?Sized,
    P: ParameterProvider<EngineSettings> + ?Sized,
    C: Clock + ?Sized,
{
    let settings = params
        .parameters()
        .map_err(|e| eyre::Report::new(map_provider_error(e.as_ref())))?;
    let now: DateTime<Utc> = clock.now();
    let start = add_minutes(now, -lookback_min(&settings));

    let glucose = sorted(fetch("glucose", history.glucose(start, now))?);
    let doses = sorted(fetch("dose", history.doses(start, now))?);
    let carbs = sorted(fetch("carb", history.carbs(start, now))?);
    debug!(
        %start,
        %now,
        glucose = glucose.len(),
        doses = doses.len(),
        carbs = carbs.len(),
        "history fetched"
    );

    let mut builder = PredictionSnapshot::builder()
        .with_glucose(glucose)
        .with_settings(settings)
        .at(now)
        .with_doses(doses)
        .with_carbs(carbs);
    if let Some(since) = history.dose_history_complete_since() {
        builder = builder.dose_history_complete_since(since.min(now));
    }
    builder.build()
}
