//! Retrospective correction: replay the model from an earlier reading and
//! carry the miss forward as a decaying bias.

use chrono::{DateTime, Utc};
use glyco_traits::GlucoseReading;
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, insufficient};
use crate::predictor;
use crate::snapshot::PredictionSnapshot;
use crate::util::{add_minutes, minutes_between};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RetrospectiveEffect {
    /// Replay start.
    pub past: DateTime<Utc>,
    pub anchor: DateTime<Utc>,
    /// Observed minus replayed glucose at the anchor, before capping.
    pub discrepancy_mg_dl: f64,
    /// Capped discrepancy applied to the forecast.
    pub bias_mg_dl: f64,
    pub window_min: f64,
    pub correction_window_min: f64,
}

impl RetrospectiveEffect {
    /// mg/dL per minute at the anchor.
    pub fn velocity(&self) -> f64 {
        self.bias_mg_dl / self.window_min
    }

    /// Cumulative contribution at `t`; the velocity fades linearly to zero
    /// over the correction window.
    pub fn cumulative(&self, t: DateTime<Utc>) -> f64 {
        let tau = minutes_between(self.anchor, t).max(0.0);
        let d = self.correction_window_min;
        let v = self.velocity();
        if tau >= d {
            v * d / 2.0
        } else {
            v * (tau - tau * tau / (2.0 * d))
        }
    }

    pub fn is_capped(&self) -> bool {
        (self.bias_mg_dl - self.discrepancy_mg_dl).abs() > 1e-9
    }
}

/// Latest sensor reading in `[target - tolerance, target]`.
fn past_reading(glucose: &[GlucoseReading], target: DateTime<Utc>, tolerance_min: f64) -> Option<&GlucoseReading> {
    let earliest = add_minutes(target, -tolerance_min);
    glucose
        .iter()
        .filter(|g| !g.is_fingerstick() && g.timestamp >= earliest && g.timestamp <= target)
        .max_by_key(|g| g.timestamp)
}

/// Compare the newest sensor reading with what the model would have predicted
/// for it from a reading `window_min` earlier.
pub fn estimate(snapshot: &PredictionSnapshot) -> Result<RetrospectiveEffect> {
    let cfg = &snapshot.settings().retrospective;
    let Some(current) = snapshot.glucose().iter().rev().find(|g| !g.is_fingerstick()) else {
        return Err(insufficient("no sensor readings"));
    };
    let target = add_minutes(current.timestamp, -cfg.window_min);
    let Some(past) = past_reading(snapshot.glucose(), target, cfg.tolerance_min) else {
        return Err(insufficient(format!(
            "no reading between {} and {} min before the newest",
            cfg.window_min,
            cfg.window_min + cfg.tolerance_min
        )));
    };

    let replayed = predictor::replay(&snapshot.rewound(past.timestamp), current.timestamp)?;
    let discrepancy = current.mg_dl - replayed;
    let bias = discrepancy.clamp(-cfg.max_bias_mg_dl, cfg.max_bias_mg_dl);
    debug!(
        past = %past.timestamp,
        replayed,
        observed = current.mg_dl,
        discrepancy,
        bias,
        "retrospective correction"
    );
    Ok(RetrospectiveEffect {
        past: past.timestamp,
        anchor: current.timestamp,
        discrepancy_mg_dl: discrepancy,
        bias_mg_dl: bias,
        window_min: minutes_between(past.timestamp, current.timestamp).max(f64::EPSILON),
        correction_window_min: cfg.correction_window_min,
    })
}
