//! Effect curves: how much of a dose or meal is still pending after a given
//! elapsed time, and how fast it is acting.
//!
//! Both curves are pure functions of elapsed minutes. A delay at the start
//! holds the remaining fraction at 1; the curve then falls monotonically and
//! reaches exactly 0 at the end of its duration.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{CarbAbsorptionModel, InsulinCfg};
use crate::error::{Result, invalid, out_of_range};
use crate::util::minutes_between;

/// Non-negative elapsed time in minutes.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct Elapsed(f64);

impl Elapsed {
    pub fn new(minutes: f64) -> Result<Self> {
        if !minutes.is_finite() || minutes < 0.0 {
            return Err(invalid(format!("elapsed time must be >= 0, got {minutes}")));
        }
        Ok(Self(minutes))
    }

    /// Elapsed time from `start` to `at`, or `None` when `at` precedes `start`.
    #[inline]
    pub fn between(start: DateTime<Utc>, at: DateTime<Utc>) -> Option<Self> {
        let m = minutes_between(start, at);
        (m >= 0.0).then_some(Self(m))
    }

    #[inline]
    pub fn minutes(self) -> f64 {
        self.0
    }
}

/// Remaining fraction and instantaneous rate (fraction per minute).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurvePoint {
    pub remaining: f64,
    pub rate: f64,
}

impl CurvePoint {
    const UNSTARTED: Self = Self {
        remaining: 1.0,
        rate: 0.0,
    };
    const EXHAUSTED: Self = Self {
        remaining: 0.0,
        rate: 0.0,
    };
}

// ── Insulin ──────────────────────────────────────────────────────────────────

/// Walsh remaining-effect polynomials for 3, 4, 5 and 6 hour action,
/// coefficients of m⁴ down to m⁰ with m in minutes.
const WALSH: [[f64; 5]; 4] = [
    [-3.2030e-9, 1.354e-6, -1.759e-4, 9.255e-4, 0.99951],
    [-3.310e-10, 2.530e-7, -5.510e-5, -9.086e-4, 0.99950],
    [-2.950e-10, 2.320e-7, -5.550e-5, 4.490e-4, 0.99300],
    [-1.493e-10, 1.413e-7, -4.095e-5, 6.365e-4, 0.99700],
];
/// Minute at which each polynomial tops out; the curve holds at 1 until then.
const WALSH_TOP_MIN: [f64; 4] = [2.716, 0.0, 4.153, 8.109];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Shape {
    Exponential { tau: f64, a: f64, s: f64 },
    /// `scale` maps curve minutes onto the nearest modelled duration.
    Walsh { coeffs: [f64; 5], scale: f64, top_min: f64, top: f64 },
}

fn poly(c: &[f64; 5], m: f64) -> f64 {
    c.iter().fold(0.0, |acc, k| acc * m + k)
}

fn poly_slope(c: &[f64; 5], m: f64) -> f64 {
    ((4.0 * c[0] * m + 3.0 * c[1]) * m + 2.0 * c[2]) * m + c[3]
}

/// Insulin activity curve over `[delay, action_duration]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsulinCurve {
    delay: f64,
    active: f64,
    shape: Shape,
}

fn active_window(action_duration_min: f64, delay_min: f64) -> Result<f64> {
    let active = action_duration_min - delay_min;
    if !(active.is_finite() && active > 0.0 && delay_min >= 0.0) {
        return Err(out_of_range("insulin action duration must exceed its delay"));
    }
    Ok(active)
}

impl InsulinCurve {
    /// Exponential curve parameterised by action duration and peak activity time.
    pub fn exponential(action_duration_min: f64, peak_activity_min: f64, delay_min: f64) -> Result<Self> {
        let active = active_window(action_duration_min, delay_min)?;
        let peak = peak_activity_min;
        if !(peak > 0.0 && peak < active / 2.0) {
            return Err(out_of_range(format!(
                "insulin peak {peak} min must be in (0, {})",
                active / 2.0
            )));
        }
        let tau = peak * (1.0 - peak / active) / (1.0 - 2.0 * peak / active);
        let a = 2.0 * tau / active;
        let s = 1.0 / (1.0 - a + (1.0 + a) * (-active / tau).exp());
        Ok(Self {
            delay: delay_min,
            active,
            shape: Shape::Exponential { tau, a, s },
        })
    }

    /// Walsh curve stretched over the active window. Windows outside
    /// 3-6 hours use the nearest modelled polynomial.
    pub fn walsh(action_duration_min: f64, delay_min: f64) -> Result<Self> {
        let active = active_window(action_duration_min, delay_min)?;
        let hours = (active / 60.0).round().clamp(3.0, 6.0);
        let idx = hours as usize - 3;
        let coeffs = WALSH[idx];
        let top_min = WALSH_TOP_MIN[idx];
        Ok(Self {
            delay: delay_min,
            active,
            shape: Shape::Walsh {
                coeffs,
                scale: hours * 60.0 / active,
                top_min,
                top: poly(&coeffs, top_min),
            },
        })
    }

    pub fn from_cfg(cfg: &InsulinCfg) -> Result<Self> {
        match cfg.model.peak_activity_min() {
            Some(peak) => Self::exponential(cfg.action_duration_min, peak, cfg.delay_min),
            None => Self::walsh(cfg.action_duration_min, cfg.delay_min),
        }
    }

    /// Delivery to exhaustion, delay included.
    pub fn action_duration_min(&self) -> f64 {
        self.delay + self.active
    }

    pub fn at(&self, elapsed: Elapsed) -> CurvePoint {
        let t = elapsed.minutes() - self.delay;
        if t <= 0.0 {
            return CurvePoint::UNSTARTED;
        }
        if t >= self.active {
            return CurvePoint::EXHAUSTED;
        }
        match self.shape {
            Shape::Exponential { tau, a, s } => {
                let td = self.active;
                let decay = (-t / tau).exp();
                let remaining =
                    1.0 - s * (1.0 - a) * ((t * t / (tau * td * (1.0 - a)) - t / tau - 1.0) * decay + 1.0);
                let rate = s / (tau * tau) * t * (1.0 - t / td) * decay;
                CurvePoint {
                    remaining: remaining.clamp(0.0, 1.0),
                    rate: rate.max(0.0),
                }
            }
            Shape::Walsh {
                coeffs,
                scale,
                top_min,
                top,
            } => {
                let m = t * scale;
                if m <= top_min {
                    return CurvePoint::UNSTARTED;
                }
                let p = poly(&coeffs, m) / top;
                if p >= 1.0 {
                    return CurvePoint::UNSTARTED;
                }
                if p <= 0.0 {
                    return CurvePoint::EXHAUSTED;
                }
                CurvePoint {
                    remaining: p,
                    rate: (-poly_slope(&coeffs, m) * scale / top).max(0.0),
                }
            }
        }
    }

    #[inline]
    pub fn remaining(&self, elapsed: Elapsed) -> f64 {
        self.at(elapsed).remaining
    }
}

// ── Carbohydrate ─────────────────────────────────────────────────────────────

const PIECEWISE_RISE: f64 = 0.15;
const PIECEWISE_FALL: f64 = 0.5;

impl CarbAbsorptionModel {
    /// Fraction absorbed at normalised time `x` in `[0, 1]`.
    pub fn absorbed(self, x: f64) -> f64 {
        let x = x.clamp(0.0, 1.0);
        match self {
            Self::Linear => x,
            Self::Parabolic => {
                if x < 0.5 {
                    2.0 * x * x
                } else {
                    -1.0 + 4.0 * x - 2.0 * x * x
                }
            }
            Self::PiecewiseLinear => {
                let scale = 2.0 / (1.0 + PIECEWISE_FALL - PIECEWISE_RISE);
                let v = if x < PIECEWISE_RISE {
                    0.5 * scale * x * x / PIECEWISE_RISE
                } else if x < PIECEWISE_FALL {
                    scale * (x - PIECEWISE_RISE / 2.0)
                } else {
                    let d = x - PIECEWISE_FALL;
                    scale
                        * (PIECEWISE_FALL - PIECEWISE_RISE / 2.0 + d
                            - d * d / (2.0 * (1.0 - PIECEWISE_FALL)))
                };
                v.min(1.0)
            }
        }
    }

    /// Derivative of `absorbed` with respect to normalised time.
    pub fn rate(self, x: f64) -> f64 {
        if !(0.0..=1.0).contains(&x) {
            return 0.0;
        }
        match self {
            Self::Linear => 1.0,
            Self::Parabolic => {
                if x < 0.5 {
                    4.0 * x
                } else {
                    4.0 - 4.0 * x
                }
            }
            Self::PiecewiseLinear => {
                let scale = 2.0 / (1.0 + PIECEWISE_FALL - PIECEWISE_RISE);
                if x < PIECEWISE_RISE {
                    scale * x / PIECEWISE_RISE
                } else if x < PIECEWISE_FALL {
                    scale
                } else {
                    scale * (1.0 - (x - PIECEWISE_FALL) / (1.0 - PIECEWISE_FALL))
                }
            }
        }
    }
}

/// Absorption curve for one meal: `model` stretched over
/// `[delay, absorption_min]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarbCurve {
    model: CarbAbsorptionModel,
    delay: f64,
    span: f64,
}

impl CarbCurve {
    pub fn new(model: CarbAbsorptionModel, absorption_min: f64, delay_min: f64) -> Result<Self> {
        let span = absorption_min - delay_min;
        if !(span.is_finite() && span > 0.0 && delay_min >= 0.0) {
            return Err(out_of_range(format!(
                "absorption time {absorption_min} min must exceed the {delay_min} min delay"
            )));
        }
        Ok(Self {
            model,
            delay: delay_min,
            span,
        })
    }

    pub fn absorption_min(&self) -> f64 {
        self.delay + self.span
    }

    pub fn at(&self, elapsed: Elapsed) -> CurvePoint {
        let t = elapsed.minutes() - self.delay;
        if t <= 0.0 {
            return CurvePoint::UNSTARTED;
        }
        if t >= self.span {
            return CurvePoint::EXHAUSTED;
        }
        let x = t / self.span;
        CurvePoint {
            remaining: (1.0 - self.model.absorbed(x)).clamp(0.0, 1.0),
            rate: self.model.rate(x) / self.span,
        }
    }

    #[inline]
    pub fn remaining(&self, elapsed: Elapsed) -> f64 {
        self.at(elapsed).remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InsulinModel;

    fn adult() -> InsulinCurve {
        InsulinCurve::from_cfg(&InsulinCfg::default()).unwrap()
    }

    fn e(m: f64) -> Elapsed {
        Elapsed::new(m).unwrap()
    }

    #[test]
    fn insulin_holds_during_delay_and_exhausts_at_duration() {
        let c = adult();
        assert_eq!(c.remaining(e(0.0)), 1.0);
        assert_eq!(c.remaining(e(10.0)), 1.0);
        assert_eq!(c.remaining(e(360.0)), 0.0);
        assert_eq!(c.remaining(e(600.0)), 0.0);
        assert!((c.action_duration_min() - 360.0).abs() < 1e-9);
    }

    #[test]
    fn insulin_activity_peaks_near_configured_peak() {
        let c = adult();
        let peak = InsulinModel::RapidActingAdult.peak_activity_min().unwrap_or_default() + 10.0;
        let r_peak = c.at(e(peak)).rate;
        assert!(r_peak > c.at(e(peak - 20.0)).rate);
        assert!(r_peak > c.at(e(peak + 20.0)).rate);
    }

    #[test]
    fn walsh_follows_six_hour_polynomial() {
        let c = InsulinCurve::walsh(370.0, 10.0).unwrap();
        assert_eq!(c.remaining(e(0.0)), 1.0);
        assert_eq!(c.remaining(e(15.0)), 1.0);
        assert!((c.remaining(e(190.0)) - 0.4524).abs() < 1e-3);
        assert!(c.at(e(190.0)).rate > 0.0);
        assert_eq!(c.remaining(e(370.0)), 0.0);
    }

    #[test]
    fn walsh_scales_durations_outside_the_modelled_range() {
        // 7.5 h of action uses the 6 h polynomial stretched by 1.25.
        let long = InsulinCurve::walsh(460.0, 10.0).unwrap();
        let six = InsulinCurve::walsh(370.0, 10.0).unwrap();
        assert!((long.remaining(e(10.0 + 225.0)) - six.remaining(e(10.0 + 180.0))).abs() < 1e-12);
    }

    #[test]
    fn negative_elapsed_is_rejected() {
        assert!(Elapsed::new(-1.0).is_err());
        assert!(Elapsed::new(f64::NAN).is_err());
    }

    #[test]
    fn carb_models_absorb_everything_by_the_end() {
        for model in [
            CarbAbsorptionModel::Linear,
            CarbAbsorptionModel::Parabolic,
            CarbAbsorptionModel::PiecewiseLinear,
        ] {
            assert_eq!(model.absorbed(0.0), 0.0);
            assert!((model.absorbed(1.0) - 1.0).abs() < 1e-12, "{model:?}");
            let c = CarbCurve::new(model, 180.0, 10.0).unwrap();
            assert_eq!(c.remaining(e(5.0)), 1.0);
            assert_eq!(c.remaining(e(180.0)), 0.0);
        }
    }

    #[test]
    fn carb_curve_rejects_absorption_shorter_than_delay() {
        assert!(CarbCurve::new(CarbAbsorptionModel::Linear, 10.0, 10.0).is_err());
    }
}
