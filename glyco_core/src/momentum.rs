//! Short-term glucose momentum from a least-squares fit of recent readings.

use chrono::{DateTime, Utc};
use glyco_traits::GlucoseReading;
use serde::Serialize;

use crate::config::MomentumCfg;
use crate::error::{Result, insufficient};
use crate::util::minutes_between;

/// Recent trend, projected forward and fading linearly to zero over
/// `duration_min`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MomentumEffect {
    /// mg/dL per minute.
    pub slope: f64,
    pub anchor: DateTime<Utc>,
    pub duration_min: f64,
    pub rms_residual: f64,
}

impl MomentumEffect {
    /// Cumulative contribution at `t`; zero at or before the anchor.
    pub fn cumulative(&self, t: DateTime<Utc>) -> f64 {
        let tau = minutes_between(self.anchor, t).max(0.0);
        let d = self.duration_min;
        if tau >= d {
            self.slope * d / 2.0
        } else {
            self.slope * (tau - tau * tau / (2.0 * d))
        }
    }
}

/// Fit the sensor readings in the window ending at the newest reading.
///
/// Fails with `InsufficientData` when there are too few readings, a gap is
/// too wide, or the fit is too noisy to trust.
pub fn estimate(glucose: &[GlucoseReading], cfg: &MomentumCfg) -> Result<MomentumEffect> {
    let Some(newest) = glucose.iter().filter(|g| !g.is_fingerstick()).map(|g| g.timestamp).max() else {
        return Err(insufficient("no sensor readings"));
    };
    let window: Vec<(f64, f64)> = glucose
        .iter()
        .filter(|g| !g.is_fingerstick())
        .map(|g| (minutes_between(newest, g.timestamp), g.mg_dl))
        .filter(|(x, _)| *x >= -cfg.window_min)
        .collect();

    if window.len() < cfg.min_readings {
        return Err(insufficient(format!(
            "{} readings in the last {} min, need {}",
            window.len(),
            cfg.window_min,
            cfg.min_readings
        )));
    }
    if let Some(gap) = window
        .windows(2)
        .map(|w| w[1].0 - w[0].0)
        .find(|gap| *gap > cfg.max_gap_min)
    {
        return Err(insufficient(format!("{gap:.1} min gap between readings")));
    }

    let n = window.len() as f64;
    let mean_x = window.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = window.iter().map(|p| p.1).sum::<f64>() / n;
    let sxx: f64 = window.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    let sxy: f64 = window.iter().map(|p| (p.0 - mean_x) * (p.1 - mean_y)).sum();
    if sxx <= f64::EPSILON {
        return Err(insufficient("readings share a single timestamp"));
    }
    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let rms_residual = (window
        .iter()
        .map(|p| (p.1 - (intercept + slope * p.0)).powi(2))
        .sum::<f64>()
        / n)
        .sqrt();
    if rms_residual > cfg.max_residual_mg_dl {
        return Err(insufficient(format!(
            "trend too noisy (rms residual {rms_residual:.1} mg/dL)"
        )));
    }

    Ok(MomentumEffect {
        slope,
        anchor: newest,
        duration_min: cfg.duration_min,
        rms_residual,
    })
}
