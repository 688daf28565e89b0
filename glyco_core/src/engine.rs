//! Engine facade: one call per cycle, deterministic for a given snapshot.

use chrono::{DateTime, Utc};
use glyco_traits::GlucoseReading;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::carbs::CarbAbsorption;
use crate::error::{Result, insufficient};
use crate::insulin::{last_bolus, running_temp_basal};
use crate::momentum::MomentumEffect;
use crate::predictor::{self, GlucoseTrajectory, Prediction};
use crate::recommender::{self, DoseRecommendation, DosingContext};
use crate::retrospective::RetrospectiveEffect;
use crate::snapshot::PredictionSnapshot;
use crate::util::{add_minutes, minutes_between};
use crate::warning::Warning;

/// State behind a forecast, for display and audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectSummary {
    pub glucose_mg_dl: f64,
    pub glucose_at: DateTime<Utc>,
    pub iob_units: f64,
    pub cob_grams: f64,
    pub scheduled_basal_rate: f64,
    pub last_bolus: Option<DateTime<Utc>>,
    pub momentum: Option<MomentumEffect>,
    pub retrospective: Option<RetrospectiveEffect>,
    pub carb_absorption: Vec<CarbAbsorption>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub trajectory: GlucoseTrajectory,
    pub summary: EffectSummary,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineOutput {
    pub trajectory: GlucoseTrajectory,
    pub recommendation: DoseRecommendation,
    pub summary: EffectSummary,
    pub warnings: Vec<Warning>,
}

/// Stateless entry point. Holds no data between calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct Engine;

impl Engine {
    pub fn new() -> Self {
        Self
    }

    /// Forecast only. Needs at least one glucose reading; a stale reading
    /// is reported as a warning.
    #[instrument(level = "debug", skip_all, fields(now = %snapshot.now()))]
    pub fn forecast(&self, snapshot: &PredictionSnapshot) -> Result<Forecast> {
        let mut warnings = Vec::new();
        if snapshot.merged_duplicates() > 0 {
            warnings.push(Warning::DuplicateReadingsMerged {
                count: snapshot.merged_duplicates(),
            });
        }
        let Some(latest) = snapshot.latest_glucose() else {
            return Err(insufficient("no glucose readings"));
        };
        let age = minutes_between(latest.timestamp, snapshot.now());
        if age > snapshot.settings().safety.max_glucose_age_min {
            warn!(age_min = age, "newest glucose is stale");
            warnings.push(Warning::StaleGlucose { age_min: age });
        }
        let prediction = predictor::predict(snapshot)?;
        Ok(assemble_forecast(snapshot, latest, prediction, warnings))
    }

    /// Forecast plus a dose recommendation.
    ///
    /// Refuses with `InsufficientData` when the newest glucose is older than
    /// the configured maximum age or the dose history does not cover the
    /// insulin action duration.
    #[instrument(level = "debug", skip_all, fields(now = %snapshot.now()))]
    pub fn evaluate(&self, snapshot: &PredictionSnapshot) -> Result<EngineOutput> {
        let settings = snapshot.settings();
        let now = snapshot.now();
        let Some(latest) = snapshot.latest_glucose() else {
            return Err(insufficient("no glucose readings"));
        };
        let age = minutes_between(latest.timestamp, now);
        if age > settings.safety.max_glucose_age_min {
            return Err(insufficient(format!(
                "newest glucose is {age:.1} min old (max {})",
                settings.safety.max_glucose_age_min
            )));
        }
        let needed = add_minutes(now, -settings.insulin.action_duration_min);
        match snapshot.dose_history_since() {
            Some(since) if since <= needed => {}
            Some(since) => {
                return Err(insufficient(format!(
                    "dose history starts at {since}, needs to reach back to {needed}"
                )));
            }
            None => return Err(insufficient("dose history completeness is unknown")),
        }

        let forecast = self.forecast(snapshot)?;
        let mut warnings = forecast.warnings;
        let ctx = DosingContext {
            iob_units: forecast.summary.iob_units,
            scheduled_basal_rate: forecast.summary.scheduled_basal_rate,
            temp_basal_running: running_temp_basal(snapshot.doses(), now).is_some(),
        };
        let recommendation = recommender::recommend(&forecast.trajectory, settings, &ctx, &mut warnings);
        info!(
            action = ?recommendation.action,
            rule = ?recommendation.rationale.rule,
            iob = ctx.iob_units,
            "recommendation"
        );
        Ok(EngineOutput {
            trajectory: forecast.trajectory,
            recommendation,
            summary: forecast.summary,
            warnings,
        })
    }
}

fn assemble_forecast(
    snapshot: &PredictionSnapshot,
    latest: &GlucoseReading,
    p: Prediction,
    mut warnings: Vec<Warning>,
) -> Forecast {
    warnings.extend(p.warnings);
    let now = snapshot.now();
    Forecast {
        trajectory: p.trajectory,
        summary: EffectSummary {
            glucose_mg_dl: latest.mg_dl,
            glucose_at: latest.timestamp,
            iob_units: p.iob_units,
            cob_grams: p.cob_grams,
            scheduled_basal_rate: snapshot.settings().patient.basal.rate_at(now),
            last_bolus: last_bolus(snapshot.doses(), now),
            momentum: p.momentum,
            retrospective: p.retrospective,
            carb_absorption: p.carb_absorption,
        },
        warnings,
    }
}
