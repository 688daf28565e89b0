#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and history parsing for the glucose engine.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - History CSV loaders enforce exact headers before deserializing rows.
use serde::Deserialize;
use serde::de::Deserializer;

pub mod history;

pub use history::{CarbRow, DoseRow, DoseRowKind, GlucoseRow};
pub use history::{load_carbs_csv, load_doses_csv, load_glucose_csv};

/// One segment of the daily basal schedule. `start` is a UTC time of day.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct BasalEntry {
    /// Accepts "HH:MM" or "HH:MM:SS"; stored as minutes after midnight.
    #[serde(deserialize_with = "de_time_of_day")]
    pub start: u32,
    /// Units per hour.
    pub rate: f64,
}

#[derive(Debug, Deserialize)]
pub struct Patient {
    /// Glucose drop per unit of insulin (mg/dL/U).
    pub insulin_sensitivity: f64,
    /// Grams of carbohydrate covered by one unit (g/U).
    pub carb_ratio: f64,
    /// Flat scheduled basal rate (U/h). Ignored when `basal_schedule` is non-empty.
    #[serde(default)]
    pub basal_rate: Option<f64>,
    /// Time-of-day basal schedule. Accepts either
    /// - array of tables: [{ start = "00:00", rate = 0.8 }, ...]
    /// - array of tuples: [["00:00", 0.8], ...]
    #[serde(default, deserialize_with = "de_basal_schedule")]
    pub basal_schedule: Vec<BasalEntry>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsulinCurve {
    #[default]
    RapidActingAdult,
    RapidActingChild,
    Fiasp,
    /// Exponential curve with explicit `peak_activity_min`.
    Exponential,
    /// Polynomial curve scaled to `action_duration_min`; takes no peak.
    Walsh,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct InsulinCfg {
    pub model: InsulinCurve,
    /// Total time from delivery until the effect is exhausted (includes delay).
    pub action_duration_min: f64,
    /// Required for `model = "exponential"`; presets carry their own peak and
    /// `walsh` rejects one.
    pub peak_activity_min: Option<f64>,
    pub delay_min: f64,
}

impl Default for InsulinCfg {
    fn default() -> Self {
        Self {
            model: InsulinCurve::RapidActingAdult,
            action_duration_min: 360.0,
            peak_activity_min: None,
            delay_min: 10.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AbsorptionCurve {
    Linear,
    Parabolic,
    #[default]
    PiecewiseLinear,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CarbsCfg {
    pub model: AbsorptionCurve,
    pub default_absorption_min: f64,
    /// Lower bound on the effective absorption time in dynamic mode.
    pub min_absorption_min: f64,
    /// Upper bound on the effective absorption time in dynamic mode.
    pub max_absorption_min: f64,
    pub delay_min: f64,
    /// Adjust absorption from observed glucose (dynamic mode).
    pub dynamic: bool,
    /// Multiplier applied to the absorption time to get the slowest plausible rate.
    pub absorption_overrun: f64,
}

impl Default for CarbsCfg {
    fn default() -> Self {
        Self {
            model: AbsorptionCurve::PiecewiseLinear,
            default_absorption_min: 180.0,
            min_absorption_min: 60.0,
            max_absorption_min: 360.0,
            delay_min: 10.0,
            dynamic: true,
            absorption_overrun: 1.5,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Target {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Deserialize)]
pub struct Limits {
    pub max_bolus: f64,
    pub max_basal_rate: f64,
    pub max_iob: f64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Safety {
    /// Suspend when any prediction inside `near_term_min` is at or below this value.
    pub suspend_threshold: f64,
    pub near_term_min: f64,
    /// Newest glucose must be at most this old for a recommendation.
    pub max_glucose_age_min: f64,
}

impl Default for Safety {
    fn default() -> Self {
        Self {
            suspend_threshold: 70.0,
            near_term_min: 60.0,
            max_glucose_age_min: 15.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PredictorCfg {
    pub horizon_min: f64,
    pub interval_min: f64,
    /// Offset of the correction evaluation point; defaults to the horizon end.
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MomentumCfg {
    pub enabled: bool,
    /// Readings within this many minutes of the newest reading feed the fit.
    pub window_min: f64,
    pub min_readings: usize,
    /// Gap between consecutive readings that invalidates the fit.
    pub max_gap_min: f64,
    /// Projection length; the trend fades linearly to zero over it.
    pub duration_min: f64,
    /// RMS residual above which the fit is considered noise.
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetrospectiveCfg {
    pub enabled: bool,
    /// How far back the replayed prediction starts.
    pub window_min: f64,
    /// How far before the replay start the past reading may be.
    pub tolerance_min: f64,
    /// Decay window of the bias term.
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

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    #[default]
    Bolus,
    TempBasal,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RecommendationCfg {
    /// How corrections are delivered: "bolus" or "temp_basal".
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

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub patient: Patient,
    #[serde(default)]
    pub insulin: InsulinCfg,
    #[serde(default)]
    pub carbs: CarbsCfg,
    pub target: Target,
    pub limits: Limits,
    #[serde(default)]
    pub safety: Safety,
    #[serde(default)]
    pub predictor: PredictorCfg,
    #[serde(default)]
    pub momentum: MomentumCfg,
    #[serde(default)]
    pub retrospective: RetrospectiveCfg,
    #[serde(default)]
    pub recommendation: RecommendationCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Parse "HH:MM" or "HH:MM:SS" into minutes after midnight.
pub fn parse_time_of_day(s: &str) -> Option<u32> {
    let t = chrono::NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| chrono::NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()?;
    use chrono::Timelike;
    Some(t.hour() * 60 + t.minute())
}

fn de_time_of_day<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_time_of_day(&s)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid time of day {s:?}")))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BasalToml {
    Tuple((String, f64)),
    Table { start: String, rate: f64 },
}

fn de_basal_schedule<'de, D>(deserializer: D) -> Result<Vec<BasalEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Vec<BasalToml>> = Option::deserialize(deserializer)?;
    let mut out = Vec::new();
    if let Some(items) = opt {
        for b in items {
            let (start, rate) = match b {
                BasalToml::Tuple((start, rate)) => (start, rate),
                BasalToml::Table { start, rate } => (start, rate),
            };
            let start = parse_time_of_day(&start).ok_or_else(|| {
                serde::de::Error::custom(format!("invalid basal start {start:?}"))
            })?;
            out.push(BasalEntry { start, rate });
        }
    }
    Ok(out)
}

/// `v` in (0, hi]; false for NaN.
fn up_to(v: f64, hi: f64) -> bool {
    v > 0.0 && v <= hi
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Patient
        let p = &self.patient;
        if !(10.0..=500.0).contains(&p.insulin_sensitivity) {
            eyre::bail!("patient.insulin_sensitivity must be in [10, 500] mg/dL/U");
        }
        if !(2.0..=150.0).contains(&p.carb_ratio) {
            eyre::bail!("patient.carb_ratio must be in [2, 150] g/U");
        }
        if p.basal_schedule.is_empty() {
            match p.basal_rate {
                Some(r) if (0.0..=10.0).contains(&r) => {}
                Some(_) => eyre::bail!("patient.basal_rate must be in [0, 10] U/h"),
                None => eyre::bail!("patient.basal_rate or patient.basal_schedule is required"),
            }
        } else {
            if p.basal_schedule[0].start != 0 {
                eyre::bail!("patient.basal_schedule must start at 00:00");
            }
            for w in p.basal_schedule.windows(2) {
                if w[1].start <= w[0].start {
                    eyre::bail!("patient.basal_schedule entries must be strictly increasing");
                }
            }
            if p.basal_schedule.iter().any(|e| !(0.0..=10.0).contains(&e.rate)) {
                eyre::bail!("patient.basal_schedule rates must be in [0, 10] U/h");
            }
        }

        // Insulin
        let ins = &self.insulin;
        if !(120.0..=600.0).contains(&ins.action_duration_min) {
            eyre::bail!("insulin.action_duration_min must be in [120, 600]");
        }
        if !(0.0..=30.0).contains(&ins.delay_min) {
            eyre::bail!("insulin.delay_min must be in [0, 30]");
        }
        let peak = match (ins.model, ins.peak_activity_min) {
            (InsulinCurve::Exponential, None) => {
                eyre::bail!("insulin.peak_activity_min is required for the exponential model")
            }
            (InsulinCurve::Walsh, Some(_)) => {
                eyre::bail!("insulin.peak_activity_min does not apply to the walsh model")
            }
            (InsulinCurve::Walsh, None) => None,
            (_, Some(peak)) => Some(peak),
            (InsulinCurve::RapidActingAdult, None) => Some(75.0),
            (InsulinCurve::RapidActingChild, None) => Some(65.0),
            (InsulinCurve::Fiasp, None) => Some(55.0),
        };
        let active = ins.action_duration_min - ins.delay_min;
        if let Some(peak) = peak
            && !(peak > 0.0 && peak < active / 2.0)
        {
            eyre::bail!(
                "insulin peak ({peak} min) must be in (0, (action_duration_min - delay_min) / 2)"
            );
        }

        // Carbs
        let c = &self.carbs;
        if !(c.min_absorption_min > c.delay_min) {
            eyre::bail!("carbs.min_absorption_min must exceed carbs.delay_min");
        }
        if !(c.max_absorption_min <= 24.0 * 60.0) {
            eyre::bail!("carbs.max_absorption_min is unreasonably large (>24h)");
        }
        if !(c.min_absorption_min <= c.default_absorption_min
            && c.default_absorption_min <= c.max_absorption_min)
        {
            eyre::bail!(
                "carbs.default_absorption_min must be within [min_absorption_min, max_absorption_min]"
            );
        }
        if !(0.0..=30.0).contains(&c.delay_min) {
            eyre::bail!("carbs.delay_min must be in [0, 30]");
        }
        if !(1.0..=3.0).contains(&c.absorption_overrun) {
            eyre::bail!("carbs.absorption_overrun must be in [1.0, 3.0]");
        }

        // Target
        if !(self.target.low > 0.0 && self.target.low < self.target.high) {
            eyre::bail!("target.low must be > 0 and below target.high");
        }
        if !(self.target.high <= 400.0) {
            eyre::bail!("target.high is unreasonably large (>400 mg/dL)");
        }

        // Limits
        if !(0.0..=30.0).contains(&self.limits.max_bolus) {
            eyre::bail!("limits.max_bolus must be in [0, 30] U");
        }
        if !(0.0..=35.0).contains(&self.limits.max_basal_rate) {
            eyre::bail!("limits.max_basal_rate must be in [0, 35] U/h");
        }
        if !(0.0..=100.0).contains(&self.limits.max_iob) {
            eyre::bail!("limits.max_iob must be in [0, 100] U");
        }

        // Safety
        if !(40.0..=self.target.low).contains(&self.safety.suspend_threshold) {
            eyre::bail!("safety.suspend_threshold must be in [40, target.low]");
        }
        if !up_to(self.safety.near_term_min, 24.0 * 60.0) {
            eyre::bail!("safety.near_term_min must be in (0, 1440]");
        }
        if !up_to(self.safety.max_glucose_age_min, 120.0) {
            eyre::bail!("safety.max_glucose_age_min must be in (0, 120]");
        }

        // Predictor
        let pr = &self.predictor;
        if !(1.0..=60.0).contains(&pr.interval_min) {
            eyre::bail!("predictor.interval_min must be in [1, 60]");
        }
        if !(pr.horizon_min >= pr.interval_min && pr.horizon_min <= 24.0 * 60.0) {
            eyre::bail!("predictor.horizon_min must be in [interval_min, 1440]");
        }
        if let Some(eval) = pr.evaluation_min
            && !(eval >= 0.0 && eval <= pr.horizon_min)
        {
            eyre::bail!("predictor.evaluation_min must be in [0, horizon_min]");
        }

        // Momentum
        let m = &self.momentum;
        if m.min_readings < 2 {
            eyre::bail!("momentum.min_readings must be >= 2");
        }
        if !up_to(m.window_min, 120.0) || !up_to(m.max_gap_min, 60.0) {
            eyre::bail!("momentum.window_min must be in (0, 120] and momentum.max_gap_min in (0, 60]");
        }
        if !up_to(m.duration_min, 30.0) {
            eyre::bail!("momentum.duration_min must be in (0, 30]");
        }
        if !up_to(m.max_residual_mg_dl, 100.0) {
            eyre::bail!("momentum.max_residual_mg_dl must be in (0, 100]");
        }

        // Retrospective
        let r = &self.retrospective;
        if !up_to(r.window_min, 240.0) || !up_to(r.correction_window_min, 480.0) {
            eyre::bail!("retrospective.window_min must be in (0, 240] and correction_window_min in (0, 480]");
        }
        if !(0.0..=60.0).contains(&r.tolerance_min) {
            eyre::bail!("retrospective.tolerance_min must be in [0, 60]");
        }
        if !up_to(r.max_bias_mg_dl, 200.0) {
            eyre::bail!("retrospective.max_bias_mg_dl must be in (0, 200]");
        }

        // Recommendation
        if !(5.0..=120.0).contains(&self.recommendation.temp_basal_duration_min) {
            eyre::bail!("recommendation.temp_basal_duration_min must be in [5, 120]");
        }

        Ok(())
    }
}
