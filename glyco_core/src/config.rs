//! Runtime settings consumed by the engine.
//!
//! These are separate from the TOML-deserialized config in `glyco_config`;
//! `conversions` bridges the two.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Result, out_of_range};
use crate::util::{add_minutes, minute_of_day, minutes_between};

const MINUTES_PER_DAY: f64 = 1440.0;

/// Daily basal schedule in UTC. Each entry is `(minute_of_day, units_per_hour)`,
/// sorted by start and beginning at midnight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasalSchedule {
    entries: Vec<(u32, f64)>,
}

impl BasalSchedule {
    pub fn flat(rate: f64) -> Self {
        Self {
            entries: vec![(0, rate)],
        }
    }

    pub fn new(mut entries: Vec<(u32, f64)>) -> Result<Self> {
        entries.sort_by_key(|e| e.0);
        match entries.first() {
            None => return Err(out_of_range("basal schedule is empty")),
            Some((start, _)) if *start != 0 => {
                return Err(out_of_range("basal schedule must start at 00:00"));
            }
            _ => {}
        }
        if entries.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(out_of_range("basal schedule has duplicate start times"));
        }
        if entries.iter().any(|e| e.0 >= 1440) {
            return Err(out_of_range("basal schedule start must be before 24:00"));
        }
        if entries.iter().any(|e| !e.1.is_finite() || e.1 < 0.0) {
            return Err(out_of_range("basal rates must be finite and >= 0"));
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[(u32, f64)] {
        &self.entries
    }

    /// Scheduled rate (U/h) in effect at `t`.
    pub fn rate_at(&self, t: DateTime<Utc>) -> f64 {
        self.rate_at_minute(minute_of_day(t))
    }

    fn rate_at_minute(&self, m: f64) -> f64 {
        self.entries
            .iter()
            .rev()
            .find(|(start, _)| f64::from(*start) <= m)
            .map_or(0.0, |(_, r)| *r)
    }

    /// Minutes until the next schedule boundary after minute-of-day `m`.
    fn minutes_to_boundary(&self, m: f64) -> f64 {
        self.entries
            .iter()
            .map(|(s, _)| f64::from(*s))
            .find(|s| *s > m)
            .unwrap_or(MINUTES_PER_DAY)
            - m
    }

    /// Units the schedule delivers over `[start, end]`.
    pub fn units_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        let mut remaining = minutes_between(start, end);
        let mut cursor = start;
        let mut units = 0.0;
        while remaining > 1e-9 {
            let m = minute_of_day(cursor);
            let span = self.minutes_to_boundary(m).min(remaining).max(1e-6);
            units += self.rate_at_minute(m) * span / 60.0;
            remaining -= span;
            cursor = add_minutes(cursor, span);
        }
        units
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientParams {
    /// mg/dL drop per unit of insulin.
    pub insulin_sensitivity: f64,
    /// Grams covered by one unit.
    pub carb_ratio: f64,
    pub basal: BasalSchedule,
}

impl PatientParams {
    /// mg/dL rise per gram of carbohydrate.
    #[inline]
    pub fn carb_sensitivity(&self) -> f64 {
        self.insulin_sensitivity / self.carb_ratio
    }
}

/// Closed set of insulin activity curves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InsulinModel {
    RapidActingAdult,
    RapidActingChild,
    Fiasp,
    Exponential { peak_activity_min: f64 },
    /// Polynomial curve; no explicit peak.
    Walsh,
}

impl InsulinModel {
    /// Peak of the exponential family; `None` for Walsh.
    pub fn peak_activity_min(&self) -> Option<f64> {
        match self {
            Self::RapidActingAdult => Some(75.0),
            Self::RapidActingChild => Some(65.0),
            Self::Fiasp => Some(55.0),
            Self::Exponential { peak_activity_min } => Some(*peak_activity_min),
            Self::Walsh => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InsulinCfg {
    pub model: InsulinModel,
    /// Delivery to exhaustion, delay included.
    pub action_duration_min: f64,
    pub delay_min: f64,
}

impl Default for InsulinCfg {
    fn default() -> Self {
        Self {
            model: InsulinModel::RapidActingAdult,
            action_duration_min: 360.0,
            delay_min: 10.0,
        }
    }
}

/// Closed set of carbohydrate absorption shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CarbAbsorptionModel {
    Linear,
    Parabolic,
    PiecewiseLinear,
}

/// Static follows the nominal curve; dynamic re-fits entries under way
/// against the glucose actually observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbsorptionMode {
    Static,
    Dynamic { absorption_overrun: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CarbCfg {
    pub model: CarbAbsorptionModel,
    pub mode: AbsorptionMode,
    pub default_absorption_min: f64,
    pub min_absorption_min: f64,
    pub max_absorption_min: f64,
    pub delay_min: f64,
}

impl Default for CarbCfg {
    fn default() -> Self {
        Self {
            model: CarbAbsorptionModel::PiecewiseLinear,
            mode: AbsorptionMode::Dynamic {
                absorption_overrun: 1.5,
            },
            default_absorption_min: 180.0,
            min_absorption_min: 60.0,
            max_absorption_min: 360.0,
            delay_min: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TargetRange {
    pub low: f64,
    pub high: f64,
}

impl TargetRange {
    #[inline]
    pub fn midpoint(&self) -> f64 {
        (self.low + self.high) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DosingLimits {
    pub max_bolus: f64,
    pub max_basal_rate: f64,
    pub max_iob: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SafetyCfg {
    /// Inclusive; a near-term prediction at this value triggers suspension.
    pub suspend_threshold: f64,
    pub near_term_min: f64,
    pub max_glucose_age_min: f64,
}

impl Default for SafetyCfg {
    fn default() -> Self {
        Self {
            suspend_threshold: 70.0,
            near_term_min: 60.0,
            max_glucose_age_min: 15.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictorCfg {
    pub horizon_min: f64,
    pub interval_min: f64,
    /// Offset from now of the point corrections are computed against.
    /// `None` means the last point of the horizon.
    pub evaluation_min: Option<f64>,
}

impl Default for PredictorCfg {
    fn default() -> Self {
        Self {
            horizon_min: 360.0,
            interval_min: 5.0,
            evaluation_min: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MomentumCfg {
    pub enabled: bool,
    pub window_min: f64,
    pub min_readings: usize,
    pub max_gap_min: f64,
    pub duration_min: f64,
    pub max_residual_mg_dl: f64,
}

impl Default for MomentumCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            window_min: 15.0,
            min_readings: 3,
            max_gap_min: 10.0,
            duration_min: 20.0,
            max_residual_mg_dl: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RetrospectiveCfg {
    pub enabled: bool,
    pub window_min: f64,
    pub tolerance_min: f64,
    pub correction_window_min: f64,
    pub max_bias_mg_dl: f64,
}

impl Default for RetrospectiveCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            window_min: 30.0,
            tolerance_min: 10.0,
            correction_window_min: 60.0,
            max_bias_mg_dl: 40.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Bolus,
    TempBasal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecommendationCfg {
    pub delivery: Delivery,
    pub temp_basal_duration_min: f64,
}

impl Default for RecommendationCfg {
    fn default() -> Self {
        Self {
            delivery: Delivery::Bolus,
            temp_basal_duration_min: 30.0,
        }
    }
}

/// Everything the engine needs to know about the patient and its own tuning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSettings {
    pub patient: PatientParams,
    pub insulin: InsulinCfg,
    pub carbs: CarbCfg,
    pub target: TargetRange,
    pub limits: DosingLimits,
    pub safety: SafetyCfg,
    pub predictor: PredictorCfg,
    pub momentum: MomentumCfg,
    pub retrospective: RetrospectiveCfg,
    pub recommendation: RecommendationCfg,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            patient: PatientParams {
                insulin_sensitivity: 50.0,
                carb_ratio: 10.0,
                basal: BasalSchedule::flat(1.0),
            },
            insulin: InsulinCfg::default(),
            carbs: CarbCfg::default(),
            target: TargetRange {
                low: 100.0,
                high: 120.0,
            },
            limits: DosingLimits {
                max_bolus: 5.0,
                max_basal_rate: 3.0,
                max_iob: 8.0,
            },
            safety: SafetyCfg::default(),
            predictor: PredictorCfg::default(),
            momentum: MomentumCfg::default(),
            retrospective: RetrospectiveCfg::default(),
            recommendation: RecommendationCfg::default(),
        }
    }
}

/// Longest forecast the grid is built for.
pub const MAX_HORIZON_MIN: f64 = 1440.0;

/// `lo <= v <= hi`; false for NaN.
fn within(v: f64, lo: f64, hi: f64) -> bool {
    (lo..=hi).contains(&v)
}

/// `0 < v <= hi`; false for NaN.
fn up_to(v: f64, hi: f64) -> bool {
    v > 0.0 && v <= hi
}

impl EngineSettings {
    /// Reject settings outside physiologically plausible bounds or that the
    /// models cannot operate on.
    pub fn validate(&self) -> Result<()> {
        let p = &self.patient;
        if !within(p.insulin_sensitivity, 10.0, 500.0) {
            return Err(out_of_range(format!(
                "insulin sensitivity {} must be in [10, 500] mg/dL/U",
                p.insulin_sensitivity
            )));
        }
        if !within(p.carb_ratio, 2.0, 150.0) {
            return Err(out_of_range(format!(
                "carb ratio {} must be in [2, 150] g/U",
                p.carb_ratio
            )));
        }
        if p.basal.entries().iter().any(|e| !within(e.1, 0.0, 10.0)) {
            return Err(out_of_range("basal rates must be in [0, 10] U/h"));
        }

        let ins = &self.insulin;
        if !within(ins.action_duration_min, 120.0, 600.0) {
            return Err(out_of_range(format!(
                "insulin action duration {} min must be in [120, 600]",
                ins.action_duration_min
            )));
        }
        if !within(ins.delay_min, 0.0, 30.0) {
            return Err(out_of_range("insulin delay must be in [0, 30] min"));
        }
        let active = ins.action_duration_min - ins.delay_min;
        if let Some(peak) = ins.model.peak_activity_min()
            && !(peak > 0.0 && peak < active / 2.0)
        {
            return Err(out_of_range(format!(
                "insulin peak {peak} min must be in (0, {})",
                active / 2.0
            )));
        }

        let c = &self.carbs;
        if !within(c.delay_min, 0.0, 30.0) {
            return Err(out_of_range("carb delay must be in [0, 30] min"));
        }
        if !(c.min_absorption_min > c.delay_min
            && c.min_absorption_min <= c.default_absorption_min
            && c.default_absorption_min <= c.max_absorption_min
            && c.max_absorption_min <= MAX_HORIZON_MIN)
        {
            return Err(out_of_range(
                "carb absorption times must satisfy delay < min <= default <= max <= 1440",
            ));
        }
        if let AbsorptionMode::Dynamic { absorption_overrun } = c.mode
            && !within(absorption_overrun, 1.0, 3.0)
        {
            return Err(out_of_range("absorption overrun must be in [1, 3]"));
        }

        if !(self.target.low > 0.0 && self.target.low < self.target.high && self.target.high <= 400.0) {
            return Err(out_of_range("target range must satisfy 0 < low < high <= 400"));
        }
        let l = &self.limits;
        if !within(l.max_bolus, 0.0, 30.0) {
            return Err(out_of_range("max bolus must be in [0, 30] U"));
        }
        if !within(l.max_basal_rate, 0.0, 35.0) {
            return Err(out_of_range("max basal rate must be in [0, 35] U/h"));
        }
        if !within(l.max_iob, 0.0, 100.0) {
            return Err(out_of_range("max IOB must be in [0, 100] U"));
        }

        let s = &self.safety;
        if !within(s.suspend_threshold, 40.0, self.target.low) {
            return Err(out_of_range("suspend threshold must be in [40, target low]"));
        }
        if !up_to(s.near_term_min, MAX_HORIZON_MIN) || !up_to(s.max_glucose_age_min, 120.0) {
            return Err(out_of_range(
                "safety windows must be in (0, 1440] (near term) and (0, 120] (glucose age)",
            ));
        }

        let pr = &self.predictor;
        if !within(pr.interval_min, 1.0, 60.0) {
            return Err(out_of_range("predictor interval must be in [1, 60] min"));
        }
        if !within(pr.horizon_min, pr.interval_min, MAX_HORIZON_MIN) {
            return Err(out_of_range("predictor horizon must be in [interval, 1440] min"));
        }
        if let Some(e) = pr.evaluation_min
            && !within(e, 0.0, pr.horizon_min)
        {
            return Err(out_of_range("evaluation point must lie within the horizon"));
        }

        let m = &self.momentum;
        if m.min_readings < 2
            || !up_to(m.window_min, 120.0)
            || !up_to(m.max_gap_min, 60.0)
            || !up_to(m.duration_min, 30.0)
            || !up_to(m.max_residual_mg_dl, 100.0)
        {
            return Err(out_of_range(
                "momentum needs >= 2 readings, window <= 120, gap <= 60, duration <= 30, residual <= 100",
            ));
        }

        let r = &self.retrospective;
        if !up_to(r.window_min, 240.0)
            || !up_to(r.correction_window_min, 480.0)
            || !up_to(r.max_bias_mg_dl, 200.0)
            || !within(r.tolerance_min, 0.0, 60.0)
        {
            return Err(out_of_range(
                "retrospective window <= 240, correction window <= 480, bias <= 200, tolerance in [0, 60]",
            ));
        }

        if !within(self.recommendation.temp_basal_duration_min, 5.0, 120.0) {
            return Err(out_of_range("temp basal duration must be in [5, 120] min"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn schedule_integrates_across_boundaries() {
        let sched = BasalSchedule::new(vec![(0, 1.0), (360, 2.0)]).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 5, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 6, 30, 0).unwrap();
        assert!((sched.units_between(start, end) - 1.5).abs() < 1e-6);
        assert_eq!(sched.rate_at(end), 2.0);
    }

    #[test]
    fn schedule_wraps_past_midnight() {
        let sched = BasalSchedule::new(vec![(0, 0.5), (1380, 1.5)]).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 2, 0, 30, 0).unwrap();
        assert!((sched.units_between(start, end) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn schedule_must_start_at_midnight() {
        assert!(BasalSchedule::new(vec![(60, 1.0)]).is_err());
        assert!(BasalSchedule::new(vec![]).is_err());
    }

    #[test]
    fn defaults_validate() {
        EngineSettings::default().validate().unwrap();
    }

    #[test]
    fn peak_past_half_active_window_is_rejected() {
        let mut s = EngineSettings::default();
        s.insulin.model = InsulinModel::Exponential {
            peak_activity_min: 200.0,
        };
        let err = s.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::error::EngineError>(),
            Some(crate::error::EngineError::ParameterOutOfRange(_))
        ));
    }
}
