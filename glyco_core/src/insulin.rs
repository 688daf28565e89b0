//! Dose normalisation, insulin on board and the cumulative insulin effect.
//!
//! Every dose becomes one or more *pulses*: net units delivered at an instant,
//! relative to what the basal schedule would have delivered anyway.

use chrono::{DateTime, Utc};
use glyco_traits::{DoseKind, InsulinDose};

use crate::config::BasalSchedule;
use crate::curves::{Elapsed, InsulinCurve};
use crate::util::{add_minutes, minutes_between};

/// Continuous deliveries are split into segments no longer than this.
pub const MAX_SEGMENT_MIN: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsulinPulse {
    pub at: DateTime<Utc>,
    pub net_units: f64,
}

/// Convert doses into net pulses.
///
/// Basal-class deliveries are truncated at `now` and expressed relative to
/// the schedule; a suspension contributes the negative of the skipped basal.
/// Scheduled basal carries no net insulin.
pub fn normalize(doses: &[InsulinDose], basal: &BasalSchedule, now: DateTime<Utc>) -> Vec<InsulinPulse> {
    let mut pulses = Vec::with_capacity(doses.len());
    for d in doses {
        match d.kind {
            DoseKind::Bolus => pulses.push(InsulinPulse {
                at: d.start,
                net_units: d.units,
            }),
            DoseKind::ScheduledBasal => {}
            DoseKind::TempBasal | DoseKind::Suspend => {
                let end = d.end.min(now);
                let total = minutes_between(d.start, d.end);
                let effective = minutes_between(d.start, end);
                if effective <= 0.0 {
                    continue;
                }
                let delivered = match d.kind {
                    DoseKind::Suspend => 0.0,
                    _ => d.units * (effective / total),
                };
                split(d.start, effective, delivered, basal, &mut pulses);
            }
        }
    }
    pulses.sort_by_key(|p| p.at);
    pulses
}

/// Spread `delivered` over `[start, start + minutes]` in short segments,
/// each netted against the schedule and placed at the segment midpoint.
fn split(
    start: DateTime<Utc>,
    minutes: f64,
    delivered: f64,
    basal: &BasalSchedule,
    out: &mut Vec<InsulinPulse>,
) {
    let n = (minutes / MAX_SEGMENT_MIN).ceil().max(1.0) as usize;
    let seg = minutes / n as f64;
    for i in 0..n {
        let s = add_minutes(start, seg * i as f64);
        let e = add_minutes(start, seg * (i + 1) as f64);
        let scheduled = basal.units_between(s, e);
        out.push(InsulinPulse {
            at: add_minutes(s, seg / 2.0),
            net_units: delivered / n as f64 - scheduled,
        });
    }
}

/// Cumulative insulin effect and insulin on board for a set of pulses.
#[derive(Debug, Clone)]
pub struct InsulinEffect {
    curve: InsulinCurve,
    pulses: Vec<InsulinPulse>,
    sensitivity: f64,
}

impl InsulinEffect {
    pub fn new(curve: InsulinCurve, pulses: Vec<InsulinPulse>, sensitivity: f64) -> Self {
        Self {
            curve,
            pulses,
            sensitivity,
        }
    }

    /// Net units not yet acted on at `t`. Negative after a suspension.
    pub fn on_board(&self, t: DateTime<Utc>) -> f64 {
        self.pulses
            .iter()
            .filter_map(|p| Elapsed::between(p.at, t).map(|e| p.net_units * self.curve.remaining(e)))
            .sum()
    }

    /// Cumulative glucose change (mg/dL) caused by the pulses up to `t`.
    /// Only differences between two instants are meaningful.
    pub fn cumulative(&self, t: DateTime<Utc>) -> f64 {
        -self.sensitivity
            * self
                .pulses
                .iter()
                .filter_map(|p| {
                    Elapsed::between(p.at, t).map(|e| p.net_units * (1.0 - self.curve.remaining(e)))
                })
                .sum::<f64>()
    }

    pub fn pulses(&self) -> &[InsulinPulse] {
        &self.pulses
    }
}

/// Start of the most recent bolus at or before `now`.
pub fn last_bolus(doses: &[InsulinDose], now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    doses
        .iter()
        .filter(|d| d.kind == DoseKind::Bolus && d.start <= now)
        .map(|d| d.start)
        .max()
}

/// Temp basal running at `now`, if any.
pub fn running_temp_basal(doses: &[InsulinDose], now: DateTime<Utc>) -> Option<&InsulinDose> {
    doses
        .iter()
        .find(|d| d.kind == DoseKind::TempBasal && d.start <= now && now < d.end)
}
