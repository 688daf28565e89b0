//! Strict-header CSV loaders for glucose, dose, and carb history.
//!
//! Expected headers:
//! - glucose: `date,mg_dl` or `date,mg_dl,source`
//! - doses: `type,start,end,units`
//! - carbs: `date,grams,absorption_min,partially_absorbed`
//!
//! Dates are RFC 3339 (e.g. `2024-03-01T12:00:00Z`). Empty optional fields
//! deserialize to `None`.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;

#[derive(Debug, Deserialize, Clone)]
pub struct GlucoseRow {
    pub date: DateTime<Utc>,
    pub mg_dl: f64,
    /// "sensor" or "fingerstick"
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DoseRowKind {
    Bolus,
    ScheduledBasal,
    TempBasal,
    Suspend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DoseRow {
    #[serde(rename = "type")]
    pub kind: DoseRowKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub units: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CarbRow {
    pub date: DateTime<Utc>,
    pub grams: f64,
    pub absorption_min: Option<f64>,
    pub partially_absorbed: Option<bool>,
}

pub fn load_glucose_csv(path: &Path) -> eyre::Result<Vec<GlucoseRow>> {
    load_rows(path, &[&["date", "mg_dl"], &["date", "mg_dl", "source"]])
}

pub fn load_doses_csv(path: &Path) -> eyre::Result<Vec<DoseRow>> {
    load_rows(path, &[&["type", "start", "end", "units"]])
}

pub fn load_carbs_csv(path: &Path) -> eyre::Result<Vec<CarbRow>> {
    load_rows(
        path,
        &[&["date", "grams", "absorption_min", "partially_absorbed"]],
    )
}

fn load_rows<T: DeserializeOwned>(path: &Path, accepted: &[&[&str]]) -> eyre::Result<Vec<T>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open history CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if !accepted.iter().any(|set| *set == actual.as_slice()) {
        let expected: Vec<String> = accepted.iter().map(|set| set.join(",")).collect();
        eyre::bail!(
            "history CSV {:?} must have headers '{}', got: {}",
            path,
            expected.join("' or '"),
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<T>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    Ok(rows)
}
