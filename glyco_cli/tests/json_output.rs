mod common;

use assert_cmd::prelude::*;
use common::*;
use rstest::rstest;
use std::process::Command;
use tempfile::tempdir;

fn json_line(stdout: &[u8]) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(stdout);
    let line = stdout
        .lines()
        .find(|l| l.trim_start().starts_with('{'))
        .unwrap_or("")
        .to_string();
    assert!(!line.is_empty(), "no JSON line found; stdout was: {stdout}");
    serde_json::from_str(&line).expect("valid JSON")
}

/// Carbs eaten shortly before now push the forecast up; the summary carries COB.
#[rstest]
fn forecast_json_schema_with_meal() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let glucose = write_flat_glucose(&dir, 110.0);
    let carbs = write(
        &dir,
        "carbs.csv",
        "date,grams,absorption_min,partially_absorbed\n2024-03-01T11:45:00Z,40,180,\n",
    );

    let mut cmd = Command::cargo_bin("glyco").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("--glucose")
        .arg(&glucose)
        .arg("--carbs")
        .arg(&carbs)
        .arg("--now")
        .arg(NOW)
        .arg("forecast");

    let out = cmd.assert().success().get_output().stdout.clone();
    let v = json_line(&out);

    let points = v["trajectory"]["points"].as_array().expect("points array");
    assert_eq!(points.len(), 73);
    let first = points[0]["mg_dl"].as_f64().unwrap();
    let last = points[72]["mg_dl"].as_f64().unwrap();
    assert!((first - 110.0).abs() < 1e-6);
    assert!(last > first, "meal should raise the forecast: {first} -> {last}");
    for key in ["insulin", "carbs", "momentum", "retrospective"] {
        assert!(points[72]["effects"][key].as_f64().is_some(), "{key} missing");
    }

    let summary = &v["summary"];
    assert!(summary["cob_grams"].as_f64().unwrap() > 0.0);
    assert_eq!(summary["carb_absorption"].as_array().unwrap().len(), 1);
    assert!(v["warnings"].is_array());
}

#[rstest]
fn recommend_json_carries_action_and_rationale() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let glucose = write_flat_glucose(&dir, 250.0);

    let mut cmd = Command::cargo_bin("glyco").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("--glucose")
        .arg(&glucose)
        .arg("--now")
        .arg(NOW)
        .arg("--doses-complete-since")
        .arg(COVERED_SINCE)
        .arg("recommend");

    let out = cmd.assert().success().get_output().stdout.clone();
    let v = json_line(&out);

    let rec = &v["recommendation"];
    assert_eq!(rec["action"]["kind"], "bolus");
    let units = rec["action"]["units"].as_f64().unwrap();
    assert!((units - 2.8).abs() < 1e-9);
    assert_eq!(rec["rationale"]["rule"], "correct_high");
    assert_eq!(rec["rationale"]["trigger"].as_array().unwrap().len(), 1);
}

#[rstest]
fn errors_are_structured_in_json_mode() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let glucose = write_flat_glucose(&dir, 110.0);

    let mut cmd = Command::cargo_bin("glyco").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("--glucose")
        .arg(&glucose)
        .arg("--now")
        .arg(NOW)
        .arg("recommend");

    let out = cmd.assert().code(4).get_output().stdout.clone();
    let v = json_line(&out);
    assert_eq!(v["reason"], "insufficient_data");
    assert_eq!(v["exit_code"], 4);
    assert!(v["message"].as_str().unwrap().contains("What happened"));
}

#[rstest]
fn check_config_json_echoes_settings() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("glyco").unwrap();
    cmd.arg("--json")
        .arg("--config")
        .arg(&cfg)
        .arg("check-config");

    let out = cmd.assert().success().get_output().stdout.clone();
    let v = json_line(&out);
    assert_eq!(v["status"], "ok");
    assert_eq!(v["settings"]["limits"]["max_bolus"], 5.0);
}
