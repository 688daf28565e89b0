mod common;

use common::{mins, readings, settings, snapshot, t0};
use glyco_core::{
    AbsorptionMode, CarbEntry, DoseAction, DoseLimit, Engine, EngineError, EngineSettings,
    InsulinDose, Rule, Warning,
};
use rstest::rstest;

/// Target 70-140, max bolus 5 U, ISF 50.
fn scenario_settings() -> EngineSettings {
    let mut s = settings();
    s.target.low = 70.0;
    s.target.high = 140.0;
    s.limits.max_bolus = 5.0;
    s.patient.insulin_sensitivity = 50.0;
    s
}

#[rstest]
fn single_reading_without_history_is_flat() {
    let snap = snapshot(readings(&[120.0]), settings()).build().unwrap();
    let f = Engine::new().forecast(&snap).unwrap();
    assert_eq!(f.trajectory.points.len(), 73);
    for p in &f.trajectory.points {
        assert!((p.mg_dl - 120.0).abs() < 1e-9, "drift at {}: {}", p.timestamp, p.mg_dl);
    }
    assert!(f.warnings.iter().any(|w| matches!(w, Warning::MomentumSkipped { .. })));
    assert!(f.warnings.iter().any(|w| matches!(w, Warning::RetrospectiveSkipped { .. })));
}

#[rstest]
fn meal_two_hours_ago_rises_and_recommends_capped_bolus() {
    let carbs = vec![CarbEntry::new(t0() - mins(120), 40.0).with_absorption_min(180.0)];
    let snap = snapshot(readings(&[180.0]), scenario_settings())
        .with_carbs(carbs)
        .build()
        .unwrap();
    let out = Engine::new().evaluate(&snap).unwrap();
    let pts = &out.trajectory.points;

    assert!((pts[0].mg_dl - 180.0).abs() < 1e-9);
    assert!(pts[1].mg_dl > pts[0].mg_dl);
    assert!(pts.windows(2).all(|w| w[1].mg_dl >= w[0].mg_dl - 1e-9));
    // Carbs are fully absorbed well before the horizon; the tail is flat.
    let tail = &pts[pts.len() - 12..];
    assert!(tail.iter().all(|p| (p.mg_dl - tail[0].mg_dl).abs() < 1e-9));
    assert!(out.summary.cob_grams > 0.0);

    assert_eq!(out.recommendation.rationale.rule, Rule::CorrectHigh);
    match out.recommendation.action {
        DoseAction::Bolus { units } => assert!(units > 0.0 && units <= 5.0, "units {units}"),
        other => panic!("expected bolus, got {other:?}"),
    }
}

#[rstest]
fn meal_with_bolus_rises_then_falls() {
    let mut s = scenario_settings();
    s.carbs.mode = AbsorptionMode::Static;
    let snap = snapshot(readings(&[180.0]), s)
        .with_carbs(vec![CarbEntry::new(t0() - mins(120), 40.0).with_absorption_min(180.0)])
        .with_doses(vec![InsulinDose::bolus(t0() - mins(120), 2.0)])
        .build()
        .unwrap();
    let f = Engine::new().forecast(&snap).unwrap();
    let pts = &f.trajectory.points;
    let (peak_idx, peak) = pts
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.mg_dl.total_cmp(&b.1.mg_dl))
        .unwrap();
    assert!(peak_idx > 0 && peak_idx < pts.len() - 1);
    assert!(pts.last().unwrap().mg_dl < peak.mg_dl - 10.0);
    assert!(f.summary.iob_units > 0.0);
    assert_eq!(f.summary.last_bolus, Some(t0() - mins(120)));
}

#[rstest]
fn correction_above_max_bolus_is_clamped_with_warning() {
    let snap = snapshot(readings(&[400.0]), scenario_settings()).build().unwrap();
    let out = Engine::new().evaluate(&snap).unwrap();
    assert_eq!(out.recommendation.action, DoseAction::Bolus { units: 5.0 });
    let unclamped = out.recommendation.rationale.unclamped.unwrap();
    assert!((unclamped - (400.0 - 105.0) / 50.0).abs() < 1e-9);
    assert!(out.warnings.iter().any(|w| matches!(
        w,
        Warning::DoseClamped { limit: DoseLimit::MaxBolus, unclamped: u, clamped } if (*u - unclamped).abs() < 1e-9 && *clamped == 5.0
    )));
}

#[rstest]
fn low_reading_suspends() {
    let snap = snapshot(readings(&[68.0]), settings()).build().unwrap();
    let out = Engine::new().evaluate(&snap).unwrap();
    assert_eq!(out.recommendation.rationale.rule, Rule::SuspendBelowThreshold);
    assert_eq!(
        out.recommendation.action,
        DoseAction::TempBasal {
            rate_u_per_hr: 0.0,
            duration_min: 30.0
        }
    );
}

#[rstest]
fn in_range_with_running_temp_basal_cancels_it() {
    let snap = snapshot(readings(&[110.0]), settings())
        .with_doses(vec![InsulinDose::temp_basal(t0() - mins(10), t0() + mins(20), 1.0)])
        .build()
        .unwrap();
    let out = Engine::new().evaluate(&snap).unwrap();
    assert_eq!(out.recommendation.action, DoseAction::CancelTempBasal);
}

#[rstest]
fn evaluation_is_idempotent() {
    let carbs = vec![CarbEntry::new(t0() - mins(45), 30.0)];
    let doses = vec![InsulinDose::bolus(t0() - mins(40), 3.0)];
    let snap = snapshot(readings(&[120.0, 126.0, 133.0, 139.0, 144.0, 150.0, 155.0]), settings())
        .with_carbs(carbs)
        .with_doses(doses)
        .build()
        .unwrap();
    let engine = Engine::new();
    let a = serde_json::to_string(&engine.evaluate(&snap).unwrap()).unwrap();
    let b = serde_json::to_string(&engine.evaluate(&snap).unwrap()).unwrap();
    assert_eq!(a, b);
}

#[rstest]
fn snapshots_evaluate_concurrently() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<glyco_core::PredictionSnapshot>();
    assert_send_sync::<Engine>();

    let snaps: Vec<_> = [90.0, 150.0, 240.0]
        .iter()
        .map(|v| snapshot(readings(&[*v]), settings()).build().unwrap())
        .collect();
    let engine = Engine::new();
    let serial: Vec<_> = snaps.iter().map(|s| engine.evaluate(s).unwrap()).collect();
    let parallel: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = snaps
            .iter()
            .map(|s| scope.spawn(move || engine.evaluate(s).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(serial, parallel);
}

#[rstest]
#[case::stale_glucose(mins(20), true)]
#[case::no_dose_coverage(mins(0), false)]
fn evaluate_refuses_without_minimum_data(#[case] age: chrono::Duration, #[case] covered: bool) {
    let mut g = readings(&[120.0]);
    g[0].timestamp -= age;
    let mut b = glyco_core::PredictionSnapshot::builder()
        .with_glucose(g)
        .with_settings(settings())
        .at(t0());
    if covered {
        b = b.dose_history_complete_since(t0() - mins(360));
    } else {
        b = b.dose_history_complete_since(t0() - mins(60));
    }
    let snap = b.build().unwrap();
    let err = Engine::new().evaluate(&snap).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::InsufficientData(_))
    ));
}

#[rstest]
fn forecast_reports_stale_glucose_instead_of_failing() {
    let mut g = readings(&[120.0]);
    g[0].timestamp -= mins(30);
    let snap = snapshot(g, settings()).build().unwrap();
    let f = Engine::new().forecast(&snap).unwrap();
    assert!(f.warnings.iter().any(|w| matches!(w, Warning::StaleGlucose { .. })));
}
