//! Immutable prediction input and its type-state builder.
//!
//! The builder enforces at compile time that glucose history, settings and
//! the evaluation time are provided before `build()` is available.
//! `try_build()` is always available for dynamic checks.

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use glyco_traits::{CarbEntry, DoseKind, GlucoseReading, InsulinDose};
use tracing::warn;

use crate::config::EngineSettings;
use crate::error::{BuildError, Result, inconsistent, invalid};

/// Everything one forecast or recommendation is computed from.
///
/// Records are sorted chronologically, contain nothing after `now`, and have
/// passed validation. Owned and immutable, so it can be shared across
/// threads.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionSnapshot {
    now: DateTime<Utc>,
    glucose: Vec<GlucoseReading>,
    doses: Vec<InsulinDose>,
    carbs: Vec<CarbEntry>,
    settings: EngineSettings,
    dose_history_since: Option<DateTime<Utc>>,
    momentum: bool,
    retrospective: bool,
    merged_duplicates: usize,
}

impl PredictionSnapshot {
    /// Start building a snapshot.
    pub fn builder() -> SnapshotBuilder<Missing, Missing, Missing> {
        SnapshotBuilder::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }
    pub fn glucose(&self) -> &[GlucoseReading] {
        &self.glucose
    }
    pub fn doses(&self) -> &[InsulinDose] {
        &self.doses
    }
    pub fn carbs(&self) -> &[CarbEntry] {
        &self.carbs
    }
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
    /// Earliest instant from which the dose history is complete.
    pub fn dose_history_since(&self) -> Option<DateTime<Utc>> {
        self.dose_history_since
    }
    pub fn momentum_enabled(&self) -> bool {
        self.momentum
    }
    pub fn retrospective_enabled(&self) -> bool {
        self.retrospective
    }
    pub fn merged_duplicates(&self) -> usize {
        self.merged_duplicates
    }

    /// Newest glucose reading, sensor or fingerstick.
    pub fn latest_glucose(&self) -> Option<&GlucoseReading> {
        self.glucose.last()
    }

    /// The same treatments seen from an earlier glucose anchor: readings
    /// after `until` are dropped and the corrective effects are disabled.
    pub(crate) fn rewound(&self, until: DateTime<Utc>) -> Self {
        Self {
            glucose: self
                .glucose
                .iter()
                .filter(|g| g.timestamp <= until)
                .cloned()
                .collect(),
            momentum: false,
            retrospective: false,
            merged_duplicates: 0,
            ..self.clone()
        }
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `PredictionSnapshot`. All records are validated on `build()`.
pub struct SnapshotBuilder<G, S, N> {
    glucose: Option<Vec<GlucoseReading>>,
    settings: Option<EngineSettings>,
    now: Option<DateTime<Utc>>,
    doses: Vec<InsulinDose>,
    carbs: Vec<CarbEntry>,
    dose_history_since: Option<DateTime<Utc>>,
    momentum: bool,
    retrospective: bool,
    _g: PhantomData<G>,
    _s: PhantomData<S>,
    _n: PhantomData<N>,
}

impl Default for SnapshotBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            glucose: None,
            settings: None,
            now: None,
            doses: Vec::new(),
            carbs: Vec::new(),
            dose_history_since: None,
            momentum: true,
            retrospective: true,
            _g: PhantomData,
            _s: PhantomData,
            _n: PhantomData,
        }
    }
}

/// Validate records and construct the snapshot.
///
/// This is the single source of truth for validation, used by both
/// `try_build()` and `build()`.
#[allow(clippy::too_many_arguments)]
fn validate_and_build(
    now: DateTime<Utc>,
    glucose: Vec<GlucoseReading>,
    doses: Vec<InsulinDose>,
    carbs: Vec<CarbEntry>,
    settings: EngineSettings,
    dose_history_since: Option<DateTime<Utc>>,
    momentum: bool,
    retrospective: bool,
) -> Result<PredictionSnapshot> {
    settings.validate()?;

    // ── Glucose ──────────────────────────────────────────────────────────────
    let mut merged = Vec::with_capacity(glucose.len());
    let mut duplicates = 0usize;
    for g in glucose {
        if !(g.mg_dl.is_finite() && g.mg_dl > 0.0) {
            return Err(invalid(format!(
                "glucose at {} must be a positive number, got {}",
                g.timestamp, g.mg_dl
            )));
        }
        if g.timestamp > now {
            return Err(invalid(format!("glucose at {} is after now ({now})", g.timestamp)));
        }
        let prev = merged
            .last()
            .map(|p: &GlucoseReading| (p.timestamp, p.mg_dl));
        match prev {
            Some((ts, _)) if ts > g.timestamp => {
                return Err(invalid("glucose history is not in chronological order"));
            }
            Some((ts, value)) if ts == g.timestamp => {
                if (value - g.mg_dl).abs() > 1e-9 {
                    return Err(invalid(format!(
                        "conflicting glucose values at {}: {} and {}",
                        g.timestamp, value, g.mg_dl
                    )));
                }
                duplicates += 1;
            }
            _ => merged.push(g),
        }
    }
    if duplicates > 0 {
        warn!(count = duplicates, "merged duplicate glucose readings");
    }

    // ── Doses ────────────────────────────────────────────────────────────────
    for w in doses.windows(2) {
        if w[1].start < w[0].start {
            return Err(invalid("dose history is not in chronological order"));
        }
    }
    for d in &doses {
        if !(d.units.is_finite() && d.units >= 0.0) {
            return Err(invalid(format!("dose at {} has invalid units {}", d.start, d.units)));
        }
        if d.end < d.start {
            return Err(invalid(format!("dose at {} ends before it starts", d.start)));
        }
        if d.start > now {
            return Err(invalid(format!("dose at {} is after now ({now})", d.start)));
        }
        match d.kind {
            DoseKind::Bolus if d.end != d.start => {
                return Err(invalid(format!("bolus at {} must have end == start", d.start)));
            }
            DoseKind::Suspend if d.units != 0.0 => {
                return Err(invalid(format!("suspend at {} must carry 0 units", d.start)));
            }
            DoseKind::TempBasal | DoseKind::ScheduledBasal if d.end == d.start && d.units > 0.0 => {
                return Err(invalid(format!(
                    "basal delivery at {} has units but no duration",
                    d.start
                )));
            }
            _ => {}
        }
    }
    let mut basal: Vec<&InsulinDose> = doses.iter().filter(|d| d.is_basal_class()).collect();
    basal.sort_by_key(|d| d.start);
    if let Some(w) = basal.windows(2).find(|w| w[1].start < w[0].end) {
        return Err(inconsistent(format!(
            "basal deliveries overlap: {:?} from {} and {:?} from {}",
            w[0].kind, w[0].start, w[1].kind, w[1].start
        )));
    }

    // ── Carbs ────────────────────────────────────────────────────────────────
    let cc = &settings.carbs;
    for w in carbs.windows(2) {
        if w[1].timestamp < w[0].timestamp {
            return Err(invalid("carb history is not in chronological order"));
        }
    }
    for c in &carbs {
        if !(c.grams.is_finite() && c.grams >= 0.0) {
            return Err(invalid(format!("carb entry at {} has invalid grams {}", c.timestamp, c.grams)));
        }
        if c.timestamp > now {
            return Err(invalid(format!("carb entry at {} is after now ({now})", c.timestamp)));
        }
        if let Some(a) = c.absorption_min
            && !(a.is_finite() && a > cc.delay_min && a <= cc.max_absorption_min)
        {
            return Err(invalid(format!(
                "carb entry at {} has absorption {a} min outside ({}, {}]",
                c.timestamp, cc.delay_min, cc.max_absorption_min
            )));
        }
    }

    if let Some(since) = dose_history_since
        && since > now
    {
        return Err(invalid("dose history coverage starts after now"));
    }

    Ok(PredictionSnapshot {
        now,
        glucose: merged,
        doses,
        carbs,
        settings,
        dose_history_since,
        momentum,
        retrospective,
        merged_duplicates: duplicates,
    })
}

impl<G, S, N> SnapshotBuilder<G, S, N> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<PredictionSnapshot> {
        let glucose = self
            .glucose
            .ok_or_else(|| eyre::Report::new(BuildError::MissingGlucose))?;
        let settings = self
            .settings
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSettings))?;
        let now = self
            .now
            .ok_or_else(|| eyre::Report::new(BuildError::MissingNow))?;
        validate_and_build(
            now,
            glucose,
            self.doses,
            self.carbs,
            settings,
            self.dose_history_since,
            self.momentum,
            self.retrospective,
        )
    }
}

/// Chainable setters that do not affect type-state.
impl<G, S, N> SnapshotBuilder<G, S, N> {
    pub fn with_doses(mut self, doses: Vec<InsulinDose>) -> Self {
        self.doses = doses;
        self
    }
    pub fn with_carbs(mut self, carbs: Vec<CarbEntry>) -> Self {
        self.carbs = carbs;
        self
    }
    /// Declare the dose history complete from `since` onwards.
    pub fn dose_history_complete_since(mut self, since: DateTime<Utc>) -> Self {
        self.dose_history_since = Some(since);
        self
    }
    /// Toggle the momentum effect (on by default).
    pub fn with_momentum(mut self, enabled: bool) -> Self {
        self.momentum = enabled;
        self
    }
    /// Toggle retrospective correction (on by default).
    pub fn with_retrospective(mut self, enabled: bool) -> Self {
        self.retrospective = enabled;
        self
    }
}

// Setters that advance type-state
impl<S, N> SnapshotBuilder<Missing, S, N> {
    pub fn with_glucose(self, glucose: Vec<GlucoseReading>) -> SnapshotBuilder<Set, S, N> {
        SnapshotBuilder {
            glucose: Some(glucose),
            settings: self.settings,
            now: self.now,
            doses: self.doses,
            carbs: self.carbs,
            dose_history_since: self.dose_history_since,
            momentum: self.momentum,
            retrospective: self.retrospective,
            _g: PhantomData,
            _s: PhantomData,
            _n: PhantomData,
        }
    }
}

impl<G, N> SnapshotBuilder<G, Missing, N> {
    pub fn with_settings(self, settings: EngineSettings) -> SnapshotBuilder<G, Set, N> {
        SnapshotBuilder {
            glucose: self.glucose,
            settings: Some(settings),
            now: self.now,
            doses: self.doses,
            carbs: self.carbs,
            dose_history_since: self.dose_history_since,
            momentum: self.momentum,
            retrospective: self.retrospective,
            _g: PhantomData,
            _s: PhantomData,
            _n: PhantomData,
        }
    }
}

impl<G, S> SnapshotBuilder<G, S, Missing> {
    pub fn at(self, now: DateTime<Utc>) -> SnapshotBuilder<G, S, Set> {
        SnapshotBuilder {
            glucose: self.glucose,
            settings: self.settings,
            now: Some(now),
            doses: self.doses,
            carbs: self.carbs,
            dose_history_since: self.dose_history_since,
            momentum: self.momentum,
            retrospective: self.retrospective,
            _g: PhantomData,
            _s: PhantomData,
            _n: PhantomData,
        }
    }
}

impl SnapshotBuilder<Set, Set, Set> {
    /// Validate and build. Only available when glucose, settings and now are set.
    pub fn build(self) -> Result<PredictionSnapshot> {
        self.try_build()
    }
}
