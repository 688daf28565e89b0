//! In-memory collaborators for hosts that already hold their history, and
//! for tests.

use chrono::{DateTime, Utc};
use glyco_traits::{
    BoxError, CarbEntry, GlucoseReading, HistoryProvider, InsulinDose, ParameterProvider,
};

use crate::config::EngineSettings;

/// History held in vectors, filtered per request.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistory {
    pub glucose: Vec<GlucoseReading>,
    pub doses: Vec<InsulinDose>,
    pub carbs: Vec<CarbEntry>,
    complete_since: Option<DateTime<Utc>>,
}

impl InMemoryHistory {
    pub fn new(glucose: Vec<GlucoseReading>, doses: Vec<InsulinDose>, carbs: Vec<CarbEntry>) -> Self {
        Self {
            glucose,
            doses,
            carbs,
            complete_since: None,
        }
    }

    /// Vouch that the dose history is complete from `since` onwards.
    pub fn complete_since(mut self, since: DateTime<Utc>) -> Self {
        self.complete_since = Some(since);
        self
    }
}

impl HistoryProvider for InMemoryHistory {
    fn glucose(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<GlucoseReading>, BoxError> {
        Ok(self
            .glucose
            .iter()
            .filter(|g| g.timestamp >= start && g.timestamp <= end)
            .cloned()
            .collect())
    }

    /// Doses overlapping the window, so a long temp basal that began before
    /// `start` is still reported.
    fn doses(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<InsulinDose>, BoxError> {
        Ok(self
            .doses
            .iter()
            .filter(|d| d.end >= start && d.start <= end)
            .cloned()
            .collect())
    }

    fn carbs(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<CarbEntry>, BoxError> {
        Ok(self
            .carbs
            .iter()
            .filter(|c| c.timestamp >= start && c.timestamp <= end)
            .cloned()
            .collect())
    }

    fn dose_history_complete_since(&self) -> Option<DateTime<Utc>> {
        self.complete_since
    }
}

/// Fixed settings.
#[derive(Debug, Clone)]
pub struct StaticParameters(pub EngineSettings);

impl ParameterProvider<EngineSettings> for StaticParameters {
    fn parameters(&self) -> Result<EngineSettings, BoxError> {
        Ok(self.0.clone())
    }
}

/// A history store that always fails; useful for exercising error paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableHistory;

impl HistoryProvider for UnavailableHistory {
    fn glucose(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<GlucoseReading>, BoxError> {
        Err(Box::new(std::io::Error::other("history store unavailable")))
    }

    fn doses(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<InsulinDose>, BoxError> {
        Err(Box::new(std::io::Error::other("history store unavailable")))
    }

    fn carbs(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<CarbEntry>, BoxError> {
        Err(Box::new(std::io::Error::other("history store unavailable")))
    }
}
