//! Non-fatal conditions reported alongside engine output.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Which limit cut a dose down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseLimit {
    MaxBolus,
    MaxIob,
    MaxBasalRate,
    ZeroFloor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Momentum was left out of the forecast.
    MomentumSkipped { reason: String },
    /// Retrospective correction was left out of the forecast.
    RetrospectiveSkipped { reason: String },
    RetrospectiveCapped { unclamped_mg_dl: f64, clamped_mg_dl: f64 },
    DoseClamped {
        limit: DoseLimit,
        unclamped: f64,
        clamped: f64,
    },
    /// Dynamic absorption time fell outside the configured bounds.
    AbsorptionBounded {
        entry: DateTime<Utc>,
        unbounded_min: f64,
        bounded_min: f64,
    },
    StaleGlucose { age_min: f64 },
    DuplicateReadingsMerged { count: usize },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MomentumSkipped { reason } => write!(f, "momentum skipped: {reason}"),
            Self::RetrospectiveSkipped { reason } => {
                write!(f, "retrospective correction skipped: {reason}")
            }
            Self::RetrospectiveCapped {
                unclamped_mg_dl,
                clamped_mg_dl,
            } => write!(
                f,
                "retrospective bias {unclamped_mg_dl:.1} mg/dL capped to {clamped_mg_dl:.1}"
            ),
            Self::DoseClamped {
                limit,
                unclamped,
                clamped,
            } => write!(f, "dose {unclamped:.3} clamped to {clamped:.3} by {limit:?}"),
            Self::AbsorptionBounded {
                entry,
                unbounded_min,
                bounded_min,
            } => write!(
                f,
                "carb entry at {entry}: absorption {unbounded_min:.0} min bounded to {bounded_min:.0}"
            ),
            Self::StaleGlucose { age_min } => write!(f, "newest glucose is {age_min:.1} min old"),
            Self::DuplicateReadingsMerged { count } => {
                write!(f, "{count} duplicate glucose readings merged")
            }
        }
    }
}
