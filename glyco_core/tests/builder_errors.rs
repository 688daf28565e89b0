mod common;

use common::{mins, readings, settings, snapshot, t0};
use glyco_core::error::BuildError;
use glyco_core::{CarbEntry, DoseKind, Engine, EngineError, EngineSettings, GlucoseReading, InsulinDose, InsulinModel, PredictionSnapshot};
use rstest::rstest;

fn engine_error(err: &eyre::Report) -> &EngineError {
    err.downcast_ref::<EngineError>()
        .unwrap_or_else(|| panic!("expected EngineError, got: {err:?}"))
}

#[rstest]
fn missing_glucose_yields_typed_build_error() {
    let err = PredictionSnapshot::builder()
        // missing with_glucose()
        .with_settings(settings())
        .at(t0())
        .try_build()
        .expect_err("should fail with MissingGlucose");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingGlucose) => {}
        other => panic!("expected MissingGlucose, got: {other:?}"),
    }
}

#[rstest]
fn missing_now_yields_typed_build_error() {
    let err = PredictionSnapshot::builder()
        .with_glucose(readings(&[120.0]))
        .with_settings(settings())
        .try_build()
        .expect_err("should fail with MissingNow");
    assert!(matches!(err.downcast_ref::<BuildError>(), Some(BuildError::MissingNow)));
}

#[rstest]
fn unordered_glucose_is_invalid_input() {
    let mut g = readings(&[110.0, 115.0, 120.0]);
    g.swap(0, 2);
    let err = snapshot(g, settings()).build().unwrap_err();
    assert!(matches!(engine_error(&err), EngineError::InvalidInput(_)));
}

#[rstest]
fn identical_duplicates_are_merged() {
    let mut g = readings(&[110.0, 115.0, 120.0]);
    g.insert(1, g[1].clone());
    let snap = snapshot(g, settings()).build().unwrap();
    assert_eq!(snap.glucose().len(), 3);
    assert_eq!(snap.merged_duplicates(), 1);
}

#[rstest]
fn conflicting_duplicates_are_invalid_input() {
    let mut g = readings(&[110.0, 115.0, 120.0]);
    let mut dup = g[1].clone();
    dup.mg_dl = 140.0;
    g.insert(2, dup);
    let err = snapshot(g, settings()).build().unwrap_err();
    assert!(matches!(engine_error(&err), EngineError::InvalidInput(_)));
}

#[rstest]
#[case::glucose_after_now(vec![GlucoseReading::sensor(t0() + mins(5), 120.0)], vec![], vec![])]
#[case::bolus_after_now(readings(&[120.0]), vec![InsulinDose::bolus(t0() + mins(1), 1.0)], vec![])]
#[case::carbs_after_now(readings(&[120.0]), vec![], vec![CarbEntry::new(t0() + mins(10), 30.0)])]
#[case::negative_units(readings(&[120.0]), vec![InsulinDose::bolus(t0() - mins(10), -1.0)], vec![])]
#[case::bolus_with_duration(
    readings(&[120.0]),
    vec![InsulinDose { kind: DoseKind::Bolus, start: t0() - mins(30), end: t0(), units: 1.0 }],
    vec![]
)]
#[case::absorption_too_long(
    readings(&[120.0]),
    vec![],
    vec![CarbEntry::new(t0() - mins(30), 30.0).with_absorption_min(900.0)]
)]
#[case::nan_glucose(vec![GlucoseReading::sensor(t0(), f64::NAN)], vec![], vec![])]
fn invalid_records_are_rejected(
    #[case] glucose: Vec<GlucoseReading>,
    #[case] doses: Vec<InsulinDose>,
    #[case] carbs: Vec<CarbEntry>,
) {
    let err = snapshot(glucose, settings())
        .with_doses(doses)
        .with_carbs(carbs)
        .build()
        .unwrap_err();
    assert!(
        matches!(engine_error(&err), EngineError::InvalidInput(_)),
        "got {err:?}"
    );
}

#[rstest]
fn overlapping_basal_deliveries_are_inconsistent() {
    let doses = vec![
        InsulinDose::temp_basal(t0() - mins(60), t0() - mins(20), 1.0),
        InsulinDose::suspend(t0() - mins(30), t0() - mins(10)),
    ];
    let err = snapshot(readings(&[120.0]), settings())
        .with_doses(doses)
        .build()
        .unwrap_err();
    assert!(matches!(
        engine_error(&err),
        EngineError::InternalInconsistency(_)
    ));
}

#[rstest]
#[case::inverted_target(|s: &mut EngineSettings| { s.target.low = 150.0; s.target.high = 140.0; })]
#[case::tiny_sensitivity(|s: &mut EngineSettings| s.patient.insulin_sensitivity = 0.5)]
#[case::tiny_carb_ratio(|s: &mut EngineSettings| s.patient.carb_ratio = 0.01)]
#[case::short_action(|s: &mut EngineSettings| s.insulin.action_duration_min = 60.0)]
#[case::infinite_horizon(|s: &mut EngineSettings| s.predictor.horizon_min = f64::INFINITY)]
#[case::nan_near_term(|s: &mut EngineSettings| s.safety.near_term_min = f64::NAN)]
#[case::huge_bolus_limit(|s: &mut EngineSettings| s.limits.max_bolus = 100.0)]
#[case::nan_basal_limit(|s: &mut EngineSettings| s.limits.max_basal_rate = f64::NAN)]
#[case::sub_minute_interval(|s: &mut EngineSettings| s.predictor.interval_min = 0.001)]
fn out_of_range_settings_are_rejected(#[case] tweak: fn(&mut EngineSettings)) {
    let mut s = settings();
    tweak(&mut s);
    let err = snapshot(readings(&[120.0]), s).build().unwrap_err();
    assert!(matches!(
        engine_error(&err),
        EngineError::ParameterOutOfRange(_)
    ));
}

#[rstest]
fn walsh_model_builds_and_forecasts() {
    let mut s = settings();
    s.insulin.model = InsulinModel::Walsh;
    s.insulin.action_duration_min = 300.0;
    let snap = snapshot(readings(&[150.0]), s)
        .with_doses(vec![InsulinDose::bolus(t0() - mins(60), 2.0)])
        .build()
        .unwrap();
    let f = Engine::new().forecast(&snap).unwrap();
    let first = f.trajectory.first().unwrap().mg_dl;
    let last = f.trajectory.last().unwrap().mg_dl;
    assert!(last < first, "insulin should keep lowering glucose: {first} -> {last}");
    assert!(f.summary.iob_units > 0.0 && f.summary.iob_units < 2.0);
}
