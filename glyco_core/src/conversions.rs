//! Conversions bridging `glyco_config` types to engine types.

use glyco_traits::{CarbEntry, DoseKind, GlucoseReading, InsulinDose, Provenance};

use crate::config::{
    AbsorptionMode, BasalSchedule, CarbAbsorptionModel, CarbCfg, Delivery, DosingLimits,
    EngineSettings, InsulinCfg, InsulinModel, MomentumCfg, PatientParams, PredictorCfg,
    RecommendationCfg, RetrospectiveCfg, SafetyCfg, TargetRange,
};
use crate::error::{EngineError, Report, Result, out_of_range};

// ── Patient ──────────────────────────────────────────────────────────────────

impl TryFrom<&glyco_config::Patient> for PatientParams {
    type Error = Report;

    fn try_from(c: &glyco_config::Patient) -> Result<Self> {
        let basal = if c.basal_schedule.is_empty() {
            BasalSchedule::flat(
                c.basal_rate
                    .ok_or_else(|| out_of_range("basal rate or schedule is required"))?,
            )
        } else {
            BasalSchedule::new(c.basal_schedule.iter().map(|e| (e.start, e.rate)).collect())?
        };
        Ok(Self {
            insulin_sensitivity: c.insulin_sensitivity,
            carb_ratio: c.carb_ratio,
            basal,
        })
    }
}

// ── Insulin ──────────────────────────────────────────────────────────────────

impl TryFrom<&glyco_config::InsulinCfg> for InsulinCfg {
    type Error = Report;

    fn try_from(c: &glyco_config::InsulinCfg) -> Result<Self> {
        use glyco_config::InsulinCurve as C;
        let model = match (c.model, c.peak_activity_min) {
            (C::Walsh, Some(_)) => {
                return Err(out_of_range("walsh insulin model takes no peak"));
            }
            (C::Walsh, None) => InsulinModel::Walsh,
            (_, Some(peak)) => InsulinModel::Exponential {
                peak_activity_min: peak,
            },
            (C::Exponential, None) => {
                return Err(out_of_range("exponential insulin model needs a peak"));
            }
            (C::RapidActingAdult, None) => InsulinModel::RapidActingAdult,
            (C::RapidActingChild, None) => InsulinModel::RapidActingChild,
            (C::Fiasp, None) => InsulinModel::Fiasp,
        };
        Ok(Self {
            model,
            action_duration_min: c.action_duration_min,
            delay_min: c.delay_min,
        })
    }
}

// ── Carbs ────────────────────────────────────────────────────────────────────

impl From<glyco_config::AbsorptionCurve> for CarbAbsorptionModel {
    fn from(c: glyco_config::AbsorptionCurve) -> Self {
        match c {
            glyco_config::AbsorptionCurve::Linear => Self::Linear,
            glyco_config::AbsorptionCurve::Parabolic => Self::Parabolic,
            glyco_config::AbsorptionCurve::PiecewiseLinear => Self::PiecewiseLinear,
        }
    }
}

impl From<&glyco_config::CarbsCfg> for CarbCfg {
    fn from(c: &glyco_config::CarbsCfg) -> Self {
        Self {
            model: c.model.into(),
            mode: if c.dynamic {
                AbsorptionMode::Dynamic {
                    absorption_overrun: c.absorption_overrun,
                }
            } else {
                AbsorptionMode::Static
            },
            default_absorption_min: c.default_absorption_min,
            min_absorption_min: c.min_absorption_min,
            max_absorption_min: c.max_absorption_min,
            delay_min: c.delay_min,
        }
    }
}

// ── Targets, limits, safety ──────────────────────────────────────────────────

impl From<&glyco_config::Target> for TargetRange {
    fn from(c: &glyco_config::Target) -> Self {
        Self {
            low: c.low,
            high: c.high,
        }
    }
}

impl From<&glyco_config::Limits> for DosingLimits {
    fn from(c: &glyco_config::Limits) -> Self {
        Self {
            max_bolus: c.max_bolus,
            max_basal_rate: c.max_basal_rate,
            max_iob: c.max_iob,
        }
    }
}

impl From<&glyco_config::Safety> for SafetyCfg {
    fn from(c: &glyco_config::Safety) -> Self {
        Self {
            suspend_threshold: c.suspend_threshold,
            near_term_min: c.near_term_min,
            max_glucose_age_min: c.max_glucose_age_min,
        }
    }
}

// ── Predictor and corrective effects ─────────────────────────────────────────

impl From<&glyco_config::PredictorCfg> for PredictorCfg {
    fn from(c: &glyco_config::PredictorCfg) -> Self {
        Self {
            horizon_min: c.horizon_min,
            interval_min: c.interval_min,
            evaluation_min: c.evaluation_min,
        }
    }
}

impl From<&glyco_config::MomentumCfg> for MomentumCfg {
    fn from(c: &glyco_config::MomentumCfg) -> Self {
        Self {
            enabled: c.enabled,
            window_min: c.window_min,
            min_readings: c.min_readings,
            max_gap_min: c.max_gap_min,
            duration_min: c.duration_min,
            max_residual_mg_dl: c.max_residual_mg_dl,
        }
    }
}

impl From<&glyco_config::RetrospectiveCfg> for RetrospectiveCfg {
    fn from(c: &glyco_config::RetrospectiveCfg) -> Self {
        Self {
            enabled: c.enabled,
            window_min: c.window_min,
            tolerance_min: c.tolerance_min,
            correction_window_min: c.correction_window_min,
            max_bias_mg_dl: c.max_bias_mg_dl,
        }
    }
}

impl From<&glyco_config::RecommendationCfg> for RecommendationCfg {
    fn from(c: &glyco_config::RecommendationCfg) -> Self {
        Self {
            delivery: match c.delivery {
                glyco_config::Delivery::Bolus => Delivery::Bolus,
                glyco_config::Delivery::TempBasal => Delivery::TempBasal,
            },
            temp_basal_duration_min: c.temp_basal_duration_min,
        }
    }
}

// ── EngineSettings ───────────────────────────────────────────────────────────

impl TryFrom<&glyco_config::Config> for EngineSettings {
    type Error = Report;

    fn try_from(c: &glyco_config::Config) -> Result<Self> {
        let settings = Self {
            patient: (&c.patient).try_into()?,
            insulin: (&c.insulin).try_into()?,
            carbs: (&c.carbs).into(),
            target: (&c.target).into(),
            limits: (&c.limits).into(),
            safety: (&c.safety).into(),
            predictor: (&c.predictor).into(),
            momentum: (&c.momentum).into(),
            retrospective: (&c.retrospective).into(),
            recommendation: (&c.recommendation).into(),
        };
        settings.validate()?;
        Ok(settings)
    }
}

// ── History rows ─────────────────────────────────────────────────────────────
// Both sides live in other crates, so these are functions rather than `From` impls.

/// Unknown `source` values are rejected; empty means unspecified.
pub fn glucose_reading(r: &glyco_config::GlucoseRow) -> Result<GlucoseReading> {
    let provenance = match r.source.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("") => None,
        Some("sensor" | "cgm") => Some(Provenance::Sensor),
        Some("fingerstick" | "meter") => Some(Provenance::Fingerstick),
        Some(other) => {
            return Err(Report::new(EngineError::InvalidInput(format!(
                "unknown glucose source {other:?} at {}",
                r.date
            ))));
        }
    };
    Ok(GlucoseReading {
        timestamp: r.date,
        mg_dl: r.mg_dl,
        provenance,
    })
}

pub fn insulin_dose(r: &glyco_config::DoseRow) -> InsulinDose {
    use glyco_config::DoseRowKind as K;
    InsulinDose {
        kind: match r.kind {
            K::Bolus => DoseKind::Bolus,
            K::ScheduledBasal => DoseKind::ScheduledBasal,
            K::TempBasal => DoseKind::TempBasal,
            K::Suspend => DoseKind::Suspend,
        },
        start: r.start,
        end: r.end,
        units: r.units,
    }
}

pub fn carb_entry(r: &glyco_config::CarbRow) -> CarbEntry {
    CarbEntry {
        timestamp: r.date,
        grams: r.grams,
        absorption_min: r.absorption_min,
        partially_absorbed: r.partially_absorbed,
    }
}
