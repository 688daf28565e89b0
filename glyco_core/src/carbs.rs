//! Carbohydrate absorption: static curves and dynamic re-fitting against
//! observed glucose.
//!
//! In dynamic mode each meal already under way at the glucose anchor gets an
//! observed absorption, derived from insulin counteraction effects (the part
//! of each glucose change the insulin model cannot explain). Whatever is left
//! is absorbed linearly at no less than the slowest plausible rate.

use chrono::{DateTime, Utc};
use glyco_traits::{CarbEntry, GlucoseReading, TimestampedValue};
use serde::Serialize;
use tracing::debug;

use crate::config::{AbsorptionMode, CarbCfg};
use crate::curves::{CarbCurve, Elapsed};
use crate::error::Result;
use crate::insulin::InsulinEffect;
use crate::util::{add_minutes, minutes_between};
use crate::warning::Warning;

/// Consecutive readings further apart than this yield no counteraction sample.
const MAX_COUNTERACTION_GAP_MIN: f64 = 30.0;
/// Shortest time over which the remainder of a dynamic entry is spread.
const MIN_REMAINING_MIN: f64 = 5.0;

/// Per-entry absorption state at the glucose anchor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarbAbsorption {
    pub timestamp: DateTime<Utc>,
    pub grams: f64,
    pub absorption_min: f64,
    pub dynamic: bool,
    /// Grams attributed from observed glucose; `None` in static mode.
    pub observed_grams: Option<f64>,
    pub absorbed_grams: f64,
    pub remaining_grams: f64,
    pub effective_absorption_min: f64,
}

#[derive(Debug, Clone)]
enum Plan {
    Static(CarbCurve),
    Dynamic {
        curve: CarbCurve,
        anchor: DateTime<Utc>,
        absorbed: f64,
        remaining: f64,
        remaining_min: f64,
    },
}

#[derive(Debug, Clone)]
struct Planned {
    start: DateTime<Utc>,
    grams: f64,
    plan: Plan,
}

impl Planned {
    /// Grams absorbed by `t`. Dynamic entries follow their nominal curve
    /// before the anchor.
    fn absorbed(&self, t: DateTime<Utc>) -> f64 {
        let Some(elapsed) = Elapsed::between(self.start, t) else {
            return 0.0;
        };
        match &self.plan {
            Plan::Static(curve) => self.grams * (1.0 - curve.remaining(elapsed)),
            Plan::Dynamic {
                curve,
                anchor,
                absorbed,
                remaining,
                remaining_min,
            } => {
                let since = minutes_between(*anchor, t);
                if since < 0.0 {
                    (self.grams * (1.0 - curve.remaining(elapsed))).min(*absorbed)
                } else {
                    absorbed + remaining * (since / remaining_min).min(1.0)
                }
            }
        }
    }
}

/// Cumulative carbohydrate effect and carbs on board.
#[derive(Debug, Clone)]
pub struct CarbEffect {
    entries: Vec<Planned>,
    sensitivity: f64,
}

impl CarbEffect {
    /// Cumulative glucose rise (mg/dL) from absorbed carbs up to `t`.
    pub fn cumulative(&self, t: DateTime<Utc>) -> f64 {
        self.sensitivity * self.entries.iter().map(|e| e.absorbed(t)).sum::<f64>()
    }

    /// Grams not yet absorbed at `t` among entries started by then.
    pub fn on_board(&self, t: DateTime<Utc>) -> f64 {
        self.entries
            .iter()
            .filter(|e| e.start <= t)
            .map(|e| (e.grams - e.absorbed(t)).max(0.0))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything carb planning needs from the snapshot.
pub struct CarbInputs<'a> {
    pub entries: &'a [CarbEntry],
    pub cfg: &'a CarbCfg,
    /// mg/dL per gram.
    pub sensitivity: f64,
    /// Time of the newest glucose reading.
    pub anchor: DateTime<Utc>,
    pub glucose: &'a [GlucoseReading],
    pub insulin: &'a InsulinEffect,
}

/// Glucose change not explained by insulin over each gap between sensor
/// readings, stamped at the start of the gap.
fn counteraction_effects(
    glucose: &[GlucoseReading],
    anchor: DateTime<Utc>,
    insulin: &InsulinEffect,
) -> Vec<TimestampedValue> {
    let sensor: Vec<&GlucoseReading> = glucose
        .iter()
        .filter(|g| !g.is_fingerstick() && g.timestamp <= anchor)
        .collect();
    sensor
        .windows(2)
        .filter_map(|w| {
            let (a, b) = (w[0], w[1]);
            let dt = minutes_between(a.timestamp, b.timestamp);
            if dt <= 0.0 || dt > MAX_COUNTERACTION_GAP_MIN {
                return None;
            }
            let explained = insulin.cumulative(b.timestamp) - insulin.cumulative(a.timestamp);
            Some(TimestampedValue::new(a.timestamp, (b.mg_dl - a.mg_dl) - explained))
        })
        .collect()
}

struct Builder {
    start: DateTime<Utc>,
    grams: f64,
    absorption_min: f64,
    /// Slowest plausible absorption, grams per minute.
    min_rate: f64,
    active_from: DateTime<Utc>,
    active_until: DateTime<Utc>,
    observed_mg_dl: f64,
}

/// Resolve each entry to a static or dynamic absorption plan.
pub fn plan(inputs: &CarbInputs<'_>) -> Result<(CarbEffect, Vec<CarbAbsorption>, Vec<Warning>)> {
    let cfg = inputs.cfg;
    let csf = inputs.sensitivity;
    let mut entries = Vec::with_capacity(inputs.entries.len());
    let mut statuses = Vec::with_capacity(inputs.entries.len());
    let mut warnings = Vec::new();

    let overrun = match cfg.mode {
        AbsorptionMode::Dynamic { absorption_overrun } => Some(absorption_overrun),
        AbsorptionMode::Static => None,
    };

    // ── Static entries and dynamic candidates ────────────────────────────────
    let mut builders: Vec<(usize, Builder)> = Vec::new();
    for entry in inputs.entries {
        let absorption_min = entry.absorption_min.unwrap_or(cfg.default_absorption_min);
        let curve = CarbCurve::new(cfg.model, absorption_min, cfg.delay_min)?;
        let under_way = entry.timestamp <= inputs.anchor && entry.partially_absorbed != Some(false);
        match overrun {
            Some(overrun) if under_way && entry.grams > 0.0 => {
                let stretched = absorption_min * overrun;
                builders.push((
                    entries.len(),
                    Builder {
                        start: entry.timestamp,
                        grams: entry.grams,
                        absorption_min,
                        min_rate: entry.grams / stretched,
                        active_from: entry.timestamp,
                        active_until: add_minutes(entry.timestamp, stretched + cfg.delay_min),
                        observed_mg_dl: 0.0,
                    },
                ));
                // Placeholder replaced once observations are attributed.
                entries.push(Planned {
                    start: entry.timestamp,
                    grams: entry.grams,
                    plan: Plan::Static(curve),
                });
            }
            _ => {
                let absorbed = entry.grams
                    * Elapsed::between(entry.timestamp, inputs.anchor)
                        .map_or(0.0, |e| 1.0 - curve.remaining(e));
                statuses.push(CarbAbsorption {
                    timestamp: entry.timestamp,
                    grams: entry.grams,
                    absorption_min,
                    dynamic: false,
                    observed_grams: None,
                    absorbed_grams: absorbed,
                    remaining_grams: entry.grams - absorbed,
                    effective_absorption_min: absorption_min,
                });
                entries.push(Planned {
                    start: entry.timestamp,
                    grams: entry.grams,
                    plan: Plan::Static(curve),
                });
            }
        }
    }

    if builders.is_empty() {
        return Ok((
            CarbEffect {
                entries,
                sensitivity: csf,
            },
            statuses,
            warnings,
        ));
    }

    // ── Attribute counteraction to active entries ────────────────────────────
    let effects = counteraction_effects(inputs.glucose, inputs.anchor, inputs.insulin);
    for ce in &effects {
        let active: Vec<usize> = builders
            .iter()
            .enumerate()
            .filter(|(_, (_, b))| b.active_from <= ce.timestamp && ce.timestamp < b.active_until)
            .map(|(i, _)| i)
            .collect();
        let Some(&last) = active.last() else {
            continue;
        };
        let mut value = ce.value.max(0.0);
        let mut total_rate: f64 = active.iter().map(|&i| builders[i].1.min_rate).sum();
        for &i in &active {
            let b = &mut builders[i].1;
            let capacity = (b.grams * csf - b.observed_mg_dl).max(0.0);
            let share = if total_rate > 0.0 {
                value * b.min_rate / total_rate
            } else {
                0.0
            };
            let partial = share.min(capacity);
            b.observed_mg_dl += partial;
            value -= partial;
            total_rate -= b.min_rate;
        }
        if value > 1e-9 {
            builders[last].1.observed_mg_dl += value;
        }
    }

    // ── Resolve dynamic plans ────────────────────────────────────────────────
    for (idx, b) in builders {
        let elapsed = minutes_between(b.start, inputs.anchor);
        let observed = b.observed_mg_dl / csf;
        let span = (b.absorption_min * overrun.unwrap_or(1.0)).max(f64::EPSILON);
        let linear_floor = b.grams * ((elapsed - cfg.delay_min) / span).clamp(0.0, 1.0);
        let absorbed = observed.max(linear_floor).min(b.grams);
        let remaining = b.grams - absorbed;

        let unbounded = elapsed + remaining / b.min_rate;
        let bounded = unbounded.clamp(cfg.min_absorption_min, cfg.max_absorption_min);
        if remaining > 1e-9 && (bounded - unbounded).abs() > 1e-9 {
            warnings.push(Warning::AbsorptionBounded {
                entry: b.start,
                unbounded_min: unbounded,
                bounded_min: bounded,
            });
        }
        let remaining_min = (bounded - elapsed).max(MIN_REMAINING_MIN);
        debug!(
            entry = %b.start,
            grams = b.grams,
            observed,
            absorbed,
            remaining,
            remaining_min,
            "dynamic carb absorption"
        );

        let curve = CarbCurve::new(cfg.model, b.absorption_min, cfg.delay_min)?;
        entries[idx].plan = Plan::Dynamic {
            curve,
            anchor: inputs.anchor,
            absorbed,
            remaining,
            remaining_min,
        };
        statuses.push(CarbAbsorption {
            timestamp: b.start,
            grams: b.grams,
            absorption_min: b.absorption_min,
            dynamic: true,
            observed_grams: Some(observed.min(b.grams)),
            absorbed_grams: absorbed,
            remaining_grams: remaining,
            effective_absorption_min: elapsed + remaining_min,
        });
    }
    statuses.sort_by_key(|s| s.timestamp);

    Ok((
        CarbEffect {
            entries,
            sensitivity: csf,
        },
        statuses,
        warnings,
    ))
}
