mod common;

use common::{mins, readings, settings, t0};
use glyco_core::providers::UnavailableHistory;
use glyco_core::{
    CarbEntry, Engine, EngineError, InMemoryHistory, InsulinDose, StaticParameters,
    assemble_snapshot,
};
use glyco_traits::FixedClock;

#[test]
fn assembles_window_from_providers() {
    let history = InMemoryHistory::new(
        readings(&[110.0, 112.0, 115.0]),
        vec![
            // Long before the window; must not be fetched.
            InsulinDose::bolus(t0() - mins(3 * 24 * 60), 4.0),
            InsulinDose::bolus(t0() - mins(90), 1.0),
        ],
        vec![CarbEntry::new(t0() - mins(100), 20.0)],
    )
    .complete_since(t0() - mins(12 * 60));
    let clock = FixedClock::new(t0());
    let snap = assemble_snapshot(&history, &StaticParameters(settings()), &clock).unwrap();

    assert_eq!(snap.now(), t0());
    assert_eq!(snap.glucose().len(), 3);
    assert_eq!(snap.doses().len(), 1);
    assert_eq!(snap.carbs().len(), 1);
    assert_eq!(snap.dose_history_since(), Some(t0() - mins(12 * 60)));
    Engine::new().evaluate(&snap).unwrap();
}

#[test]
fn unsorted_provider_output_is_ordered() {
    let mut g = readings(&[110.0, 112.0, 115.0]);
    g.reverse();
    let history = InMemoryHistory::new(g, vec![], vec![]);
    let snap = assemble_snapshot(&history, &StaticParameters(settings()), &FixedClock::new(t0())).unwrap();
    assert!(snap.glucose().windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    assert_eq!(snap.dose_history_since(), None);
}

#[test]
fn provider_failure_maps_to_typed_error() {
    let err = assemble_snapshot(&UnavailableHistory, &StaticParameters(settings()), &FixedClock::new(t0()))
        .unwrap_err();
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::Provider(msg)) => assert!(msg.contains("unavailable")),
        other => panic!("expected Provider, got: {other:?}"),
    }
}
