#![allow(dead_code)]

use bms_core::mocks::RecordingReporter;
use bms_core::soc::REFERENCE_TEMPERATURE;
use bms_core::{BatteryCfg, Engine, EngineCfg, Timing};
use bms_hardware::SimulatedPlant;
use bms_traits::BatteryId;
use bms_traits::clock::test_clock::TestClock;

/// 18 V, comfortably above any battery.
pub const PANEL_DAY: i32 = 18 * 256;
/// 12.66 V: 100 % at the reference temperature.
pub const V_FULL: i32 = 3242;
/// 79.5 %.
pub const V_GOOD: i32 = 3200;
/// 43.4 %, below the critical SoC.
pub const V_CRITICAL: i32 = 3126;

pub fn b(i: u8) -> BatteryId {
    BatteryId::new(i)
}

pub fn cfg(batteries: usize) -> EngineCfg {
    let mut cfg = EngineCfg {
        batteries: vec![BatteryCfg::default(); batteries],
        timing: Timing {
            monitor_ms: 1000,
            watchdog_ms: 500,
            calibration_delay_ms: 10,
            startup_delay_ms: 0,
        },
        ..EngineCfg::default()
    };
    // Tests run at the SoC reference temperature, which is above the default
    // charger cut-off.
    cfg.thresholds.temperature_limit = 60 * 256;
    cfg
}

/// A plant at the reference temperature with the given battery voltages.
pub fn plant(voltages: &[i32]) -> SimulatedPlant {
    let plant = SimulatedPlant::new(voltages.len());
    plant.set_voltages(voltages);
    plant.set_temperature(REFERENCE_TEMPERATURE);
    plant
}

pub fn engine(plant: &SimulatedPlant, cfg: EngineCfg) -> (Engine, RecordingReporter) {
    let rec = RecordingReporter::default();
    let engine = Engine::builder()
        .with_hardware(plant.clone())
        .with_charger(plant.clone())
        .with_config(cfg)
        .with_reporter(rec.clone())
        .with_clock(Box::new(TestClock::new()))
        .build()
        .expect("build engine");
    (engine, rec)
}
