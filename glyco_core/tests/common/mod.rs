#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use glyco_core::{EngineSettings, GlucoseReading, PredictionSnapshot, SnapshotBuilder};
use glyco_core::snapshot::Set;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn mins(m: i64) -> Duration {
    Duration::minutes(m)
}

/// Sensor readings every 5 minutes ending at `t0()`, oldest first.
pub fn readings(values: &[f64]) -> Vec<GlucoseReading> {
    let n = values.len() as i64;
    values
        .iter()
        .enumerate()
        .map(|(i, v)| GlucoseReading::sensor(t0() - mins(5 * (n - 1 - i as i64)), *v))
        .collect()
}

pub fn settings() -> EngineSettings {
    EngineSettings::default()
}

/// Builder with glucose, settings and now set, and a complete dose history.
pub fn snapshot(glucose: Vec<GlucoseReading>, settings: EngineSettings) -> SnapshotBuilder<Set, Set, Set> {
    PredictionSnapshot::builder()
        .with_glucose(glucose)
        .with_settings(settings)
        .at(t0())
        .dose_history_complete_since(t0() - mins(24 * 60))
}
