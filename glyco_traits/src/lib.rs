//! Boundary records and collaborator traits shared by the engine and its hosts.
//!
//! The engine never talks to storage or devices directly. Hosts hand it
//! records through `HistoryProvider` and settings through `ParameterProvider`.
pub mod clock;

pub use clock::{Clock, FixedClock, SystemClock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error type crossing the collaborator boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Anything positioned on the timeline.
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

/// A single sample on the timeline with optional metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedValue<M = ()> {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub metadata: Option<M>,
}

impl<M> TimestampedValue<M> {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp,
            value,
            metadata: None,
        }
    }
}

impl<M> Timestamped for TimestampedValue<M> {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Where a glucose value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Sensor,
    Fingerstick,
}

/// Glucose value in mg/dL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlucoseReading {
    pub timestamp: DateTime<Utc>,
    pub mg_dl: f64,
    #[serde(default)]
    pub provenance: Option<Provenance>,
}

impl GlucoseReading {
    pub fn sensor(timestamp: DateTime<Utc>, mg_dl: f64) -> Self {
        Self {
            timestamp,
            mg_dl,
            provenance: Some(Provenance::Sensor),
        }
    }

    /// Fingerstick readings calibrate the sensor but do not describe its trend.
    pub fn is_fingerstick(&self) -> bool {
        matches!(self.provenance, Some(Provenance::Fingerstick))
    }
}

impl Timestamped for GlucoseReading {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseKind {
    Bolus,
    ScheduledBasal,
    TempBasal,
    Suspend,
}

/// Insulin delivered between `start` and `end` (equal for a bolus).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsulinDose {
    pub kind: DoseKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub units: f64,
}

impl InsulinDose {
    pub fn bolus(at: DateTime<Utc>, units: f64) -> Self {
        Self {
            kind: DoseKind::Bolus,
            start: at,
            end: at,
            units,
        }
    }

    pub fn temp_basal(start: DateTime<Utc>, end: DateTime<Utc>, units: f64) -> Self {
        Self {
            kind: DoseKind::TempBasal,
            start,
            end,
            units,
        }
    }

    pub fn suspend(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            kind: DoseKind::Suspend,
            start,
            end,
            units: 0.0,
        }
    }

    /// Deliveries that replace the background rate; at most one may run at a time.
    pub fn is_basal_class(&self) -> bool {
        !matches!(self.kind, DoseKind::Bolus)
    }
}

impl Timestamped for InsulinDose {
    fn timestamp(&self) -> DateTime<Utc> {
        self.start
    }
}

/// Reported carbohydrate intake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarbEntry {
    pub timestamp: DateTime<Utc>,
    pub grams: f64,
    /// Expected absorption time in minutes; the configured default applies when absent.
    #[serde(default)]
    pub absorption_min: Option<f64>,
    /// Host hint that absorption is already under way at prediction start.
    /// Inferred from the timestamp when absent.
    #[serde(default)]
    pub partially_absorbed: Option<bool>,
}

impl CarbEntry {
    pub fn new(timestamp: DateTime<Utc>, grams: f64) -> Self {
        Self {
            timestamp,
            grams,
            absorption_min: None,
            partially_absorbed: None,
        }
    }

    pub fn with_absorption_min(mut self, minutes: f64) -> Self {
        self.absorption_min = Some(minutes);
        self
    }
}

impl Timestamped for CarbEntry {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Read-only access to stored history for a closed time window.
pub trait HistoryProvider {
    fn glucose(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<GlucoseReading>, BoxError>;

    fn doses(&self, start: DateTime<Utc>, end: DateTime<Utc>)
    -> Result<Vec<InsulinDose>, BoxError>;

    fn carbs(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<CarbEntry>, BoxError>;

    /// Earliest instant from which the dose history is known to be complete.
    /// `None` means the provider cannot vouch for completeness.
    fn dose_history_complete_since(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// Read-only per-patient configuration.
pub trait ParameterProvider<P> {
    fn parameters(&self) -> Result<P, BoxError>;
}
