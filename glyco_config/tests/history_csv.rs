use std::fs::File;
use std::io::Write;

use glyco_config::{DoseRowKind, load_carbs_csv, load_doses_csv, load_glucose_csv};
use rstest::rstest;
use tempfile::tempdir;

fn write(dir: &tempfile::TempDir, name: &str, lines: &[&str]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut f = File::create(&path).unwrap();
    for l in lines {
        writeln!(f, "{l}").unwrap();
    }
    path
}

#[rstest]
fn glucose_csv_with_and_without_source() {
    let dir = tempdir().unwrap();
    let p = write(
        &dir,
        "g.csv",
        &[
            "date,mg_dl,source",
            "2024-03-01T11:50:00Z,150,sensor",
            "2024-03-01T11:55:00Z,152,",
        ],
    );
    let rows = load_glucose_csv(&p).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].source.as_deref(), Some("sensor"));
    assert!(rows[1].source.is_none());

    let p2 = write(&dir, "g2.csv", &["date,mg_dl", "2024-03-01T12:00:00Z,140"]);
    assert_eq!(load_glucose_csv(&p2).unwrap().len(), 1);
}

#[rstest]
fn doses_csv_parses_kinds() {
    let dir = tempdir().unwrap();
    let p = write(
        &dir,
        "d.csv",
        &[
            "type,start,end,units",
            "bolus,2024-03-01T10:00:00Z,2024-03-01T10:00:00Z,2.5",
            "temp_basal,2024-03-01T10:30:00Z,2024-03-01T11:00:00Z,0.75",
            "suspend,2024-03-01T11:00:00Z,2024-03-01T11:20:00Z,0",
        ],
    );
    let rows = load_doses_csv(&p).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].kind, DoseRowKind::Bolus);
    assert_eq!(rows[1].kind, DoseRowKind::TempBasal);
    assert_eq!(rows[2].kind, DoseRowKind::Suspend);
}

#[rstest]
fn carbs_csv_optional_fields() {
    let dir = tempdir().unwrap();
    let p = write(
        &dir,
        "c.csv",
        &[
            "date,grams,absorption_min,partially_absorbed",
            "2024-03-01T10:00:00Z,40,180,",
            "2024-03-01T11:00:00Z,15,,true",
        ],
    );
    let rows = load_carbs_csv(&p).unwrap();
    assert_eq!(rows[0].absorption_min, Some(180.0));
    assert_eq!(rows[0].partially_absorbed, None);
    assert_eq!(rows[1].absorption_min, None);
    assert_eq!(rows[1].partially_absorbed, Some(true));
}

#[rstest]
fn rejects_wrong_headers() {
    let dir = tempdir().unwrap();
    let p = write(&dir, "g.csv", &["time,value", "2024-03-01T12:00:00Z,140"]);
    let err = load_glucose_csv(&p).expect_err("bad headers");
    assert!(format!("{err}").contains("must have headers"));
}

#[rstest]
fn reports_row_number_of_bad_record() {
    let dir = tempdir().unwrap();
    let p = write(
        &dir,
        "g.csv",
        &[
            "date,mg_dl",
            "2024-03-01T12:00:00Z,140",
            "not-a-date,150",
        ],
    );
    let err = load_glucose_csv(&p).expect_err("bad date");
    assert!(format!("{err}").contains("invalid CSV row 3"));
}
