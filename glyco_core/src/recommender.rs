//! Dose recommendation from a forecast.
//!
//! Rules apply in priority order; the first that fires decides:
//! 1. any near-term point at or below the suspend threshold: zero temp basal
//! 2. evaluation point above range: correction, limited by max IOB and then
//!    by max bolus or max basal rate depending on delivery
//! 3. evaluation point below range: reduced temp basal
//! 4. otherwise cancel a running temp basal, or do nothing

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{Delivery, EngineSettings};
use crate::predictor::{GlucoseTrajectory, TrajectoryPoint};
use crate::warning::{DoseLimit, Warning};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DoseAction {
    NoAction,
    Bolus { units: f64 },
    TempBasal { rate_u_per_hr: f64, duration_min: f64 },
    CancelTempBasal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    SuspendBelowThreshold,
    CorrectHigh,
    ReduceLow,
    InRange,
}

/// Why a recommendation was made.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rationale {
    pub rule: Rule,
    /// Trajectory point(s) that triggered the rule.
    pub trigger: Vec<TrajectoryPoint>,
    /// Dose or rate before limits were applied.
    pub unclamped: Option<f64>,
    pub clamped: Option<f64>,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoseRecommendation {
    pub action: DoseAction,
    pub rationale: Rationale,
}

/// Delivery state at now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DosingContext {
    pub iob_units: f64,
    pub scheduled_basal_rate: f64,
    pub temp_basal_running: bool,
}

fn clamp_to(value: f64, limit: f64, kind: DoseLimit, warnings: &mut Vec<Warning>) -> f64 {
    if value > limit {
        warn!(?kind, value, limit, "dose clamped");
        warnings.push(Warning::DoseClamped {
            limit: kind,
            unclamped: value,
            clamped: limit,
        });
        limit
    } else {
        value
    }
}

fn no_action(rule: Rule, trigger: Vec<TrajectoryPoint>, note: String, ctx: &DosingContext) -> DoseRecommendation {
    let action = if ctx.temp_basal_running {
        DoseAction::CancelTempBasal
    } else {
        DoseAction::NoAction
    };
    DoseRecommendation {
        action,
        rationale: Rationale {
            rule,
            trigger,
            unclamped: None,
            clamped: None,
            note,
        },
    }
}

/// Pick exactly one action for `trajectory`.
pub fn recommend(
    trajectory: &GlucoseTrajectory,
    settings: &EngineSettings,
    ctx: &DosingContext,
    warnings: &mut Vec<Warning>,
) -> DoseRecommendation {
    let isf = settings.patient.insulin_sensitivity;
    let target = settings.target;
    let limits = settings.limits;
    let duration = settings.recommendation.temp_basal_duration_min;
    let hours = duration / 60.0;

    // ── Rule 1: suspend ──────────────────────────────────────────────────────
    if let Some(low) = trajectory.min_within(settings.safety.near_term_min)
        && low.mg_dl <= settings.safety.suspend_threshold
    {
        info!(at = %low.timestamp, mg_dl = low.mg_dl, "suspend threshold reached");
        return DoseRecommendation {
            action: DoseAction::TempBasal {
                rate_u_per_hr: 0.0,
                duration_min: duration,
            },
            rationale: Rationale {
                rule: Rule::SuspendBelowThreshold,
                trigger: vec![low.clone()],
                unclamped: Some(0.0),
                clamped: Some(0.0),
                note: format!(
                    "predicted {:.0} mg/dL within {:.0} min is at or below {:.0}",
                    low.mg_dl, settings.safety.near_term_min, settings.safety.suspend_threshold
                ),
            },
        };
    }

    let eval_offset = settings
        .predictor
        .evaluation_min
        .unwrap_or(settings.predictor.horizon_min);
    let Some(eval) = trajectory.at_offset(eval_offset) else {
        return no_action(Rule::InRange, Vec::new(), "empty trajectory".into(), ctx);
    };

    // ── Rule 2: correct high ─────────────────────────────────────────────────
    if eval.mg_dl > target.high {
        let iob = ctx.iob_units.max(0.0);
        let raw = (eval.mg_dl - target.midpoint()) / isf - iob;
        let headroom = (limits.max_iob - iob).max(0.0);
        let units = clamp_to(raw.max(0.0), headroom, DoseLimit::MaxIob, warnings);

        let note = format!(
            "predicted {:.0} mg/dL above {:.0}; {:.2} U needed after {:.2} U on board",
            eval.mg_dl, target.high, raw.max(0.0), iob
        );
        let trigger = vec![eval.clone()];
        if units <= 0.0 {
            let mut rec = no_action(Rule::CorrectHigh, trigger, note, ctx);
            rec.rationale.unclamped = Some(raw);
            rec.rationale.clamped = Some(0.0);
            return rec;
        }
        return match settings.recommendation.delivery {
            Delivery::Bolus => {
                let units = clamp_to(units, limits.max_bolus, DoseLimit::MaxBolus, warnings);
                DoseRecommendation {
                    action: DoseAction::Bolus { units },
                    rationale: Rationale {
                        rule: Rule::CorrectHigh,
                        trigger,
                        unclamped: Some(raw),
                        clamped: Some(units),
                        note,
                    },
                }
            }
            Delivery::TempBasal => {
                let unclamped_rate = ctx.scheduled_basal_rate + units / hours;
                let rate = clamp_to(unclamped_rate, limits.max_basal_rate, DoseLimit::MaxBasalRate, warnings);
                DoseRecommendation {
                    action: DoseAction::TempBasal {
                        rate_u_per_hr: rate,
                        duration_min: duration,
                    },
                    rationale: Rationale {
                        rule: Rule::CorrectHigh,
                        trigger,
                        unclamped: Some(ctx.scheduled_basal_rate + raw.max(0.0) / hours),
                        clamped: Some(rate),
                        note,
                    },
                }
            }
        };
    }

    // ── Rule 3: reduce low ───────────────────────────────────────────────────
    if eval.mg_dl < target.low {
        let shortfall_units = (target.midpoint() - eval.mg_dl) / isf;
        let unclamped = ctx.scheduled_basal_rate - shortfall_units / hours;
        let mut rate = unclamped;
        if rate < 0.0 {
            warnings.push(Warning::DoseClamped {
                limit: DoseLimit::ZeroFloor,
                unclamped: rate,
                clamped: 0.0,
            });
            rate = 0.0;
        }
        rate = clamp_to(rate, limits.max_basal_rate, DoseLimit::MaxBasalRate, warnings);
        return DoseRecommendation {
            action: DoseAction::TempBasal {
                rate_u_per_hr: rate,
                duration_min: duration,
            },
            rationale: Rationale {
                rule: Rule::ReduceLow,
                trigger: vec![eval.clone()],
                unclamped: Some(unclamped),
                clamped: Some(rate),
                note: format!(
                    "predicted {:.0} mg/dL below {:.0}; withhold {:.2} U",
                    eval.mg_dl, target.low, shortfall_units
                ),
            },
        };
    }

    // ── Rule 4: in range ─────────────────────────────────────────────────────
    no_action(
        Rule::InRange,
        vec![eval.clone()],
        format!(
            "predicted {:.0} mg/dL within [{:.0}, {:.0}]",
            eval.mg_dl, target.low, target.high
        ),
        ctx,
    )
}
