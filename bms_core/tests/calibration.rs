mod common;

use bms_core::mocks::{MemoryOffsetStore, RecordingReporter};
use bms_core::{BmsError, CalibrationState, CycleStatus, Engine, HealthState, Soc};
use bms_hardware::SimulatedPlant;
use bms_traits::clock::test_clock::TestClock;
use bms_traits::{SwitchBank, SwitchConfig};
use common::*;

const SENSOR_OFFSETS: [i16; 6] = [5, -3, 7, 2, 4, 9];

fn loaded_plant() -> SimulatedPlant {
    let p = plant(&[V_FULL, V_GOOD, V_GOOD]);
    p.set_sensor_offsets(&SENSOR_OFFSETS);
    p.set_load(0, 200, 3100);
    p.set_load(1, 200, 3100);
    p
}

fn engine_with_store(p: &SimulatedPlant, store: MemoryOffsetStore) -> (Engine, RecordingReporter) {
    let rec = RecordingReporter::default();
    let e = Engine::builder()
        .with_hardware(p.clone())
        .with_charger(p.clone())
        .with_config(cfg(3))
        .with_reporter(rec.clone())
        .with_offset_store(store)
        .with_clock(Box::new(TestClock::new()))
        .build()
        .unwrap();
    (e, rec)
}

#[test]
fn derives_sensor_offsets_and_quiescent_current() {
    let p = loaded_plant();
    let (mut e, rec) = engine(&p, cfg(3));
    e.initialize().unwrap();
    let report = e.calibrate().unwrap();

    assert_eq!(report.offsets, SENSOR_OFFSETS.to_vec());
    assert_eq!(report.quiescent, Some(0));
    assert!(report.missing.is_empty());
    assert_eq!(e.offsets().as_slice(), &SENSOR_OFFSETS);
    assert_eq!(e.calibration_state(), CalibrationState::Idle);

    // One progress record per test, then the summary.
    let pq = rec.values("pQ");
    assert_eq!(pq.len(), 8);
    assert_eq!(pq[0], vec![0, 0]);
    assert_eq!(pq[7], vec![0, 7]);
}

#[test]
fn switches_are_restored_afterwards() {
    let p = loaded_plant();
    let before = SwitchConfig {
        load1: Some(b(1)),
        load2: Some(b(0)),
        panel: Some(b(2)),
    };
    p.clone().apply_config(before).unwrap();
    let (mut e, rec) = engine(&p, cfg(3));
    e.initialize().unwrap();
    let report = e.calibrate().unwrap();
    assert_eq!(report.restored, before);
    assert_eq!(p.switches(), before);
    assert_eq!(rec.values("dS"), vec![vec![i32::from(before.bits())]]);
    assert_eq!(rec.values("dD"), vec![vec![bms_core::report::CONTROL_CALIBRATING]]);
}

#[test]
fn repeated_runs_agree() {
    let p = loaded_plant();
    let (mut e, _) = engine(&p, cfg(3));
    e.initialize().unwrap();
    let first = e.calibrate().unwrap();
    let second = e.calibrate().unwrap();
    assert_eq!(first, second);
}

#[test]
fn absent_battery_is_found_missing() {
    let p = loaded_plant();
    p.set_present(b(1), false);
    let (mut e, _) = engine(&p, cfg(3));
    e.initialize().unwrap();
    let report = e.calibrate().unwrap();

    assert_eq!(report.missing, vec![b(1)]);
    let h = e.handle();
    assert_eq!(h.battery_health(b(1)), Some(HealthState::Missing));
    assert_eq!(h.battery_soc(b(1)), Some(Soc::EMPTY));
    assert_eq!(h.battery_health(b(0)), Some(HealthState::Good));
    // The sensor still has its zero error with nothing connected.
    assert_eq!(report.offsets[1], -3);
}

#[test]
fn queued_request_runs_instead_of_a_cycle() {
    let p = loaded_plant();
    let (mut e, _) = engine(&p, cfg(3));
    e.initialize().unwrap();
    let h = e.handle();
    h.request_calibration().unwrap();

    match e.step().unwrap() {
        CycleStatus::Calibrated(report) => assert_eq!(report.offsets, SENSOR_OFFSETS.to_vec()),
        other => panic!("expected calibration, got {other:?}"),
    }
    assert!(!h.calibrating());
    assert_eq!(h.cycles(), 0);

    // The next step is an ordinary cycle again.
    assert!(e.step().unwrap().allocation().is_some());
}

#[test]
fn failed_run_keeps_previous_offsets() {
    let p = loaded_plant();
    let before = SwitchConfig {
        load1: None,
        load2: Some(b(2)),
        panel: None,
    };
    p.clone().apply_config(before).unwrap();
    let previous = vec![1i16; 6];
    let mut e = Engine::builder()
        .with_hardware(p.clone())
        .with_charger(p.clone())
        .with_config(cfg(3))
        .with_offsets(previous.clone())
        .with_clock(Box::new(TestClock::new()))
        .build()
        .unwrap();
    e.initialize().unwrap();

    p.set_fail_reads(true);
    let err = e.calibrate().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BmsError>(),
        Some(BmsError::HardwareFault(_))
    ));
    assert_eq!(e.offsets().as_slice(), previous.as_slice());
    assert_eq!(p.switches(), before);
    assert_eq!(e.calibration_state(), CalibrationState::Idle);
    assert!(!e.handle().calibrating());
}

#[test]
fn offsets_are_persisted() {
    let p = loaded_plant();
    let store = MemoryOffsetStore::default();
    let (mut e, _) = engine_with_store(&p, store.clone());
    e.initialize().unwrap();
    e.calibrate().unwrap();
    assert_eq!(store.saved().len(), 1);
    assert_eq!(store.last(), Some(SENSOR_OFFSETS.to_vec()));
}

#[test]
fn store_failure_does_not_fail_the_run() {
    let p = loaded_plant();
    let store = MemoryOffsetStore::failing();
    let (mut e, _) = engine_with_store(&p, store.clone());
    e.initialize().unwrap();
    let report = e.calibrate().unwrap();
    assert_eq!(report.offsets, SENSOR_OFFSETS.to_vec());
    assert_eq!(e.offsets().as_slice(), &SENSOR_OFFSETS);
    assert!(store.saved().is_empty());
}
