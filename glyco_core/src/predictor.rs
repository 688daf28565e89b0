//! Glucose trajectory: the newest reading plus the sum of every effect's
//! cumulative change, sampled on a fixed grid from now to the horizon.

use chrono::{DateTime, Utc};
use glyco_traits::GlucoseReading;
use serde::Serialize;
use tracing::{debug, warn};

use crate::carbs::{self, CarbAbsorption, CarbEffect, CarbInputs};
use crate::curves::InsulinCurve;
use crate::error::{EngineError, Report, Result, insufficient, is_insufficient_data, out_of_range};
use crate::insulin::{self, InsulinEffect};
use crate::momentum::{self, MomentumEffect};
use crate::retrospective::{self, RetrospectiveEffect};
use crate::snapshot::PredictionSnapshot;
use crate::util::add_minutes;
use crate::warning::Warning;

/// Contribution of each effect at one point, relative to the anchor reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct EffectBreakdown {
    pub insulin: f64,
    pub carbs: f64,
    pub momentum: f64,
    pub retrospective: f64,
}

impl EffectBreakdown {
    pub fn total(&self) -> f64 {
        self.insulin + self.carbs + self.momentum + self.retrospective
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectoryPoint {
    pub timestamp: DateTime<Utc>,
    pub mg_dl: f64,
    pub effects: EffectBreakdown,
}

/// Predicted glucose at fixed intervals, starting at now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlucoseTrajectory {
    pub start: DateTime<Utc>,
    pub interval_min: f64,
    pub points: Vec<TrajectoryPoint>,
}

impl GlucoseTrajectory {
    pub fn points(&self) -> &[TrajectoryPoint] {
        &self.points
    }

    pub fn first(&self) -> Option<&TrajectoryPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&TrajectoryPoint> {
        self.points.last()
    }

    /// First point at or after `offset_min` from the start, else the last point.
    pub fn at_offset(&self, offset_min: f64) -> Option<&TrajectoryPoint> {
        let at = add_minutes(self.start, offset_min);
        self.points
            .iter()
            .find(|p| p.timestamp >= at)
            .or_else(|| self.points.last())
    }

    /// Lowest point within `minutes` of the start, earliest on ties.
    pub fn min_within(&self, minutes: f64) -> Option<&TrajectoryPoint> {
        let until = add_minutes(self.start, minutes);
        self.points
            .iter()
            .take_while(|p| p.timestamp <= until)
            .fold(None, |best: Option<&TrajectoryPoint>, p| match best {
                Some(b) if b.mg_dl <= p.mg_dl => Some(b),
                _ => Some(p),
            })
    }
}

/// The effects a trajectory is composed from.
#[derive(Debug, Clone)]
pub(crate) struct Effects {
    pub insulin: InsulinEffect,
    pub carbs: CarbEffect,
    pub momentum: Option<MomentumEffect>,
    pub retrospective: Option<RetrospectiveEffect>,
}

/// Anchor and physiological effects, before any corrective effect.
struct Base {
    anchor: GlucoseReading,
    insulin: InsulinEffect,
    carbs: CarbEffect,
    carb_absorption: Vec<CarbAbsorption>,
    warnings: Vec<Warning>,
}

fn base(snapshot: &PredictionSnapshot) -> Result<Base> {
    let settings = snapshot.settings();
    let Some(anchor) = snapshot.latest_glucose().cloned() else {
        return Err(insufficient("no glucose readings"));
    };
    let curve = InsulinCurve::from_cfg(&settings.insulin)?;
    let pulses = insulin::normalize(snapshot.doses(), &settings.patient.basal, snapshot.now());
    let insulin = InsulinEffect::new(curve, pulses, settings.patient.insulin_sensitivity);
    let (carbs, carb_absorption, warnings) = carbs::plan(&CarbInputs {
        entries: snapshot.carbs(),
        cfg: &settings.carbs,
        sensitivity: settings.patient.carb_sensitivity(),
        anchor: anchor.timestamp,
        glucose: snapshot.glucose(),
        insulin: &insulin,
    })?;
    Ok(Base {
        anchor,
        insulin,
        carbs,
        carb_absorption,
        warnings,
    })
}

/// Evaluate the composed effects at each of `times`, each relative to its
/// value at the anchor reading.
pub(crate) fn project(anchor: &GlucoseReading, effects: &Effects, times: &[DateTime<Utc>]) -> Vec<TrajectoryPoint> {
    let at = |t: DateTime<Utc>| EffectBreakdown {
        insulin: effects.insulin.cumulative(t),
        carbs: effects.carbs.cumulative(t),
        momentum: effects.momentum.map_or(0.0, |m| m.cumulative(t)),
        retrospective: effects.retrospective.map_or(0.0, |r| r.cumulative(t)),
    };
    let zero = at(anchor.timestamp);
    times
        .iter()
        .map(|&t| {
            let raw = at(t);
            let breakdown = EffectBreakdown {
                insulin: raw.insulin - zero.insulin,
                carbs: raw.carbs - zero.carbs,
                momentum: raw.momentum - zero.momentum,
                retrospective: raw.retrospective - zero.retrospective,
            };
            TrajectoryPoint {
                timestamp: t,
                mg_dl: anchor.mg_dl + breakdown.total(),
                effects: breakdown,
            }
        })
        .collect()
}

/// Most steps a forecast grid may have.
const MAX_GRID_STEPS: f64 = 20_000.0;

/// Grid instants from `now` through the horizon, inclusive.
fn grid(now: DateTime<Utc>, horizon_min: f64, interval_min: f64) -> Result<Vec<DateTime<Utc>>> {
    let steps = (horizon_min / interval_min - 1e-9).ceil().max(0.0);
    if !(steps.is_finite() && steps <= MAX_GRID_STEPS) {
        return Err(out_of_range(format!(
            "forecast of {horizon_min} min every {interval_min} min exceeds {MAX_GRID_STEPS} steps"
        )));
    }
    Ok((0..=steps as usize)
        .map(|k| add_minutes(now, interval_min * k as f64))
        .collect())
}

/// Replay the physiological effects of `past` and return the glucose they
/// predict at `at`.
pub(crate) fn replay(past: &PredictionSnapshot, at: DateTime<Utc>) -> Result<f64> {
    let b = base(past)?;
    let effects = Effects {
        insulin: b.insulin,
        carbs: b.carbs,
        momentum: None,
        retrospective: None,
    };
    project(&b.anchor, &effects, &[at])
        .first()
        .map(|p| p.mg_dl)
        .ok_or_else(|| Report::new(EngineError::InternalInconsistency("empty replay".into())))
}

fn skip_reason(e: &Report) -> String {
    match e.downcast_ref::<EngineError>() {
        Some(EngineError::InsufficientData(msg)) => msg.clone(),
        _ => e.to_string(),
    }
}

/// A forecast with the state it was derived from.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub trajectory: GlucoseTrajectory,
    pub iob_units: f64,
    pub cob_grams: f64,
    pub carb_absorption: Vec<CarbAbsorption>,
    pub momentum: Option<MomentumEffect>,
    pub retrospective: Option<RetrospectiveEffect>,
    pub warnings: Vec<Warning>,
}

/// Compose every effect and sample the trajectory.
///
/// Momentum and retrospective correction degrade to zero with a warning when
/// their data is insufficient; any other failure is returned.
pub fn predict(snapshot: &PredictionSnapshot) -> Result<Prediction> {
    let settings = snapshot.settings();
    let b = base(snapshot)?;
    let mut warnings = b.warnings;

    let momentum = if snapshot.momentum_enabled() && settings.momentum.enabled {
        match momentum::estimate(snapshot.glucose(), &settings.momentum) {
            Ok(m) => Some(m),
            Err(e) if is_insufficient_data(&e) => {
                debug!(error = %e, "momentum skipped");
                warnings.push(Warning::MomentumSkipped {
                    reason: skip_reason(&e),
                });
                None
            }
            Err(e) => return Err(e),
        }
    } else {
        None
    };

    let retrospective = if snapshot.retrospective_enabled() && settings.retrospective.enabled {
        match retrospective::estimate(snapshot) {
            Ok(r) => {
                if r.is_capped() {
                    warn!(
                        discrepancy = r.discrepancy_mg_dl,
                        bias = r.bias_mg_dl,
                        "retrospective bias capped"
                    );
                    warnings.push(Warning::RetrospectiveCapped {
                        unclamped_mg_dl: r.discrepancy_mg_dl,
                        clamped_mg_dl: r.bias_mg_dl,
                    });
                }
                Some(r)
            }
            Err(e) if is_insufficient_data(&e) => {
                debug!(error = %e, "retrospective correction skipped");
                warnings.push(Warning::RetrospectiveSkipped {
                    reason: skip_reason(&e),
                });
                None
            }
            Err(e) => return Err(e),
        }
    } else {
        None
    };

    let effects = Effects {
        insulin: b.insulin,
        carbs: b.carbs,
        momentum,
        retrospective,
    };
    let now = snapshot.now();
    let times = grid(now, settings.predictor.horizon_min, settings.predictor.interval_min)?;
    let points = project(&b.anchor, &effects, &times);
    debug!(
        anchor = b.anchor.mg_dl,
        points = points.len(),
        eventual = points.last().map(|p| p.mg_dl),
        "trajectory composed"
    );

    Ok(Prediction {
        trajectory: GlucoseTrajectory {
            start: now,
            interval_min: settings.predictor.interval_min,
            points,
        },
        iob_units: effects.insulin.on_board(now),
        cob_grams: effects.carbs.on_board(now),
        carb_absorption: b.carb_absorption,
        momentum,
        retrospective,
        warnings,
    })
}
