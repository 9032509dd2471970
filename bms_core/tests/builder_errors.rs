mod common;

use bms_core::error::BuildError;
use bms_core::{BatteryCfg, Engine, EngineCfg, EngineLink};
use bms_hardware::SimulatedPlant;
use common::cfg;
use rstest::rstest;

fn build_error(err: &eyre::Report) -> &BuildError {
    err.downcast_ref::<BuildError>()
        .unwrap_or_else(|| panic!("expected BuildError, got: {err:?}"))
}

#[rstest]
fn builder_missing_hardware_yields_typed_build_error() {
    let plant = SimulatedPlant::new(2);
    let err = Engine::builder()
        // missing with_hardware()
        .with_charger(plant)
        .with_config(cfg(2))
        .try_build()
        .expect_err("should fail with MissingHardware");

    match build_error(&err) {
        BuildError::MissingHardware => {}
        other => panic!("expected MissingHardware, got: {other:?}"),
    }
}

#[rstest]
fn builder_missing_charger_yields_typed_build_error() {
    let plant = SimulatedPlant::new(2);
    let err = Engine::builder()
        .with_hardware(plant)
        .try_build()
        .expect_err("should fail with MissingCharger");
    assert!(matches!(build_error(&err), BuildError::MissingCharger));
}

fn invalid(cfg: EngineCfg) -> BuildError {
    let plant = SimulatedPlant::new(cfg.batteries.len().max(1));
    let err = Engine::builder()
        .with_hardware(plant.clone())
        .with_charger(plant)
        .with_config(cfg)
        .build()
        .expect_err("config should be rejected");
    build_error(&err).clone()
}

#[rstest]
#[case::no_batteries(cfg(0))]
#[case::too_many_batteries(cfg(9))]
#[case::zero_capacity({
    let mut c = cfg(2);
    c.batteries[1] = BatteryCfg { capacity_ah: 0, ..BatteryCfg::default() };
    c
})]
#[case::capacity_overflows_counter({
    let mut c = cfg(2);
    c.batteries[0] = BatteryCfg { capacity_ah: 5000, ..BatteryCfg::default() };
    c
})]
#[case::zero_monitor_period({
    let mut c = cfg(2);
    c.timing.monitor_ms = 0;
    c
})]
#[case::zero_watchdog_period({
    let mut c = cfg(2);
    c.timing.watchdog_ms = 0;
    c
})]
fn invalid_configs_are_rejected(#[case] c: EngineCfg) {
    assert!(matches!(invalid(c), BuildError::InvalidConfig(_)));
}

#[test]
fn offsets_must_cover_every_interface() {
    let plant = SimulatedPlant::new(2);
    let err = Engine::builder()
        .with_hardware(plant.clone())
        .with_charger(plant)
        .with_config(cfg(2))
        .with_offsets(vec![0; 3])
        .build()
        .expect_err("short offsets");
    assert!(matches!(build_error(&err), BuildError::InvalidConfig(_)));
}

#[test]
fn link_must_match_battery_count() {
    let plant = SimulatedPlant::new(2);
    let err = Engine::builder()
        .with_hardware(plant.clone())
        .with_charger(plant)
        .with_config(cfg(2))
        .with_link(EngineLink::new(3))
        .build()
        .expect_err("mismatched link");
    assert!(matches!(build_error(&err), BuildError::InvalidConfig(_)));
}

#[test]
fn shared_link_is_used_by_the_engine() {
    let plant = SimulatedPlant::new(2);
    let link = EngineLink::new(2);
    let mut c = cfg(2);
    c.auto_track = true;
    let mut engine = Engine::builder()
        .with_hardware(plant.clone())
        .with_charger(plant)
        .with_config(c)
        .with_link(link.clone())
        .build()
        .unwrap();
    assert!(!link.handle().auto_track());
    engine.initialize().unwrap();
    assert!(link.handle().auto_track());
}
