#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

pub const NOW: &str = "2024-03-01T12:00:00Z";
pub const COVERED_SINCE: &str = "2024-03-01T05:00:00Z";

// Minimal valid TOML; optional sections fall back to defaults.
pub const VALID_CONFIG: &str = r#"
[patient]
insulin_sensitivity = 50.0
carb_ratio = 10.0
basal_rate = 1.0

[target]
low = 100.0
high = 120.0

[limits]
max_bolus = 5.0
max_basal_rate = 3.0
max_iob = 8.0
"#;

pub fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    path
}

pub fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    write(dir, "cfg.toml", VALID_CONFIG)
}

/// One reading every 5 minutes from 11:00 to 12:00 at `mg_dl`.
pub fn write_flat_glucose(dir: &tempfile::TempDir, mg_dl: f64) -> PathBuf {
    let mut body = String::from("date,mg_dl,source\n");
    for i in 0..=12 {
        let minute = i * 5;
        let (h, m) = if minute == 60 { (12, 0) } else { (11, minute) };
        body.push_str(&format!("2024-03-01T{h:02}:{m:02}:00Z,{mg_dl},sensor\n"));
    }
    write(dir, "glucose.csv", &body)
}

/// One reading every 5 minutes from `from_hour`:00 through 12:00 at `mg_dl`.
pub fn write_glucose_since(dir: &tempfile::TempDir, from_hour: u32, mg_dl: f64) -> PathBuf {
    let mut body = String::from("date,mg_dl,source\n");
    for minute in (from_hour * 60..=12 * 60).step_by(5) {
        body.push_str(&format!(
            "2024-03-01T{:02}:{:02}:00Z,{mg_dl},sensor\n",
            minute / 60,
            minute % 60
        ));
    }
    write(dir, "glucose.csv", &body)
}
