//! Configuration types for the battery management engine.
//!
//! These are the runtime configuration structs used by `Engine`, already in
//! the engine's fixed-point units. They are separate from the TOML-deserialized
//! config in `bms_config`.

use crate::fixed_point::{SCALE, Soc};
use crate::soc::Chemistry;

/// Per-battery static configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryCfg {
    /// Rated capacity, ampere-hours.
    pub capacity_ah: u32,
    pub chemistry: Chemistry,
}

impl Default for BatteryCfg {
    fn default() -> Self {
        Self {
            capacity_ah: 100,
            chemistry: Chemistry::Wet,
        }
    }
}

/// Fill and safety thresholds. Voltages and temperature are ×256.
#[derive(Debug, Clone)]
pub struct Thresholds {
    pub low_voltage: i32,
    pub critical_voltage: i32,
    /// Absolute dropout voltage; below it the battery is labelled Weak.
    pub weak_voltage: i32,
    pub low_soc: Soc,
    pub critical_soc: Soc,
    /// A battery in Float drops back to Bulk below this SoC.
    pub float_bulk_soc: Soc,
    /// The panel must exceed a battery's voltage minus this margin for the
    /// charger to stay on.
    pub panel_margin: i32,
    /// Charger switch is withheld at or above this temperature.
    pub temperature_limit: i32,
    /// Battery current magnitude (sensor units) counted as idle.
    pub steady_current: i16,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low_voltage: 2944,      // 11.5 V
            critical_voltage: 2867, // 11.2 V
            weak_voltage: 2688,     // 10.5 V
            low_soc: Soc::from_raw(60 * i64::from(SCALE)),
            critical_soc: Soc::from_raw(45 * i64::from(SCALE)),
            float_bulk_soc: Soc::from_raw(95 * i64::from(SCALE)),
            panel_margin: SCALE / 2,
            temperature_limit: 40 * SCALE,
            steady_current: 30,
        }
    }
}

/// Allocation strategy bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strategy(u8);

impl Strategy {
    /// Keep the loads off the battery under charge.
    pub const SEPARATE_LOAD: u8 = 1 << 0;
    /// Keep the longest-isolated battery out of service.
    pub const PRESERVE_ISOLATION: u8 = 1 << 1;

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn separate_load(self) -> bool {
        self.0 & Self::SEPARATE_LOAD != 0
    }

    pub const fn preserve_isolation(self) -> bool {
        self.0 & Self::PRESERVE_ISOLATION != 0
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Self(0xFF)
    }
}

/// Periods of the control loop and its watchdog.
#[derive(Debug, Clone)]
pub struct Timing {
    pub monitor_ms: u64,
    pub watchdog_ms: u64,
    /// Settling time per calibration test.
    pub calibration_delay_ms: u64,
    /// Delay before the first cycle so measurements can settle.
    pub startup_delay_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            monitor_ms: 1000,
            watchdog_ms: 500,
            calibration_delay_ms: 1000,
            startup_delay_ms: 1000,
        }
    }
}

/// Everything the engine needs besides its collaborators.
#[derive(Debug, Clone, Default)]
pub struct EngineCfg {
    pub batteries: Vec<BatteryCfg>,
    pub thresholds: Thresholds,
    pub strategy: Strategy,
    pub timing: Timing,
    /// Drive the switches from the allocation result.
    pub auto_track: bool,
}
