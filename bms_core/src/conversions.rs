//! `From` implementations bridging `bms_config` types to `bms_core` types.
//!
//! The file format speaks volts, percent and °C; the engine speaks ×256.

use crate::config::{BatteryCfg, EngineCfg, Strategy, Thresholds, Timing};
use crate::fixed_point::{Soc, to_fixed};
use crate::soc::Chemistry;

// ── Chemistry ────────────────────────────────────────────────────────────────

impl From<bms_config::Chemistry> for Chemistry {
    fn from(c: bms_config::Chemistry) -> Self {
        match c {
            bms_config::Chemistry::Wet => Chemistry::Wet,
            bms_config::Chemistry::Gel => Chemistry::Gel,
            bms_config::Chemistry::Agm => Chemistry::Agm,
        }
    }
}

// ── BatteryCfg ───────────────────────────────────────────────────────────────

impl From<&bms_config::BatteryCfg> for BatteryCfg {
    fn from(c: &bms_config::BatteryCfg) -> Self {
        Self {
            capacity_ah: c.capacity_ah,
            chemistry: c.chemistry.into(),
        }
    }
}

// ── Thresholds ───────────────────────────────────────────────────────────────

impl From<&bms_config::Thresholds> for Thresholds {
    fn from(c: &bms_config::Thresholds) -> Self {
        Self {
            low_voltage: to_fixed(c.low_voltage_v),
            critical_voltage: to_fixed(c.critical_voltage_v),
            weak_voltage: to_fixed(c.weak_voltage_v),
            low_soc: Soc::from_percent(c.low_soc_pct),
            critical_soc: Soc::from_percent(c.critical_soc_pct),
            float_bulk_soc: Soc::from_percent(c.float_bulk_soc_pct),
            panel_margin: to_fixed(c.panel_margin_v),
            temperature_limit: to_fixed(c.temperature_limit_c),
            steady_current: c.steady_current,
        }
    }
}

// ── Strategy ─────────────────────────────────────────────────────────────────

impl From<&bms_config::StrategyCfg> for Strategy {
    fn from(c: &bms_config::StrategyCfg) -> Self {
        if let Some(bits) = c.bits {
            return Strategy::from_bits(bits);
        }
        let mut bits = 0;
        if c.separate_load {
            bits |= Strategy::SEPARATE_LOAD;
        }
        if c.preserve_isolation {
            bits |= Strategy::PRESERVE_ISOLATION;
        }
        Strategy::from_bits(bits)
    }
}

// ── Timing ───────────────────────────────────────────────────────────────────

impl From<&bms_config::Timing> for Timing {
    fn from(c: &bms_config::Timing) -> Self {
        Self {
            monitor_ms: c.monitor_ms,
            watchdog_ms: c.watchdog_ms,
            calibration_delay_ms: c.calibration_delay_ms,
            startup_delay_ms: c.startup_delay_ms,
        }
    }
}

// ── EngineCfg ────────────────────────────────────────────────────────────────

impl From<&bms_config::Config> for EngineCfg {
    fn from(c: &bms_config::Config) -> Self {
        Self {
            batteries: c.batteries.iter().map(BatteryCfg::from).collect(),
            thresholds: (&c.thresholds).into(),
            strategy: (&c.strategy).into(),
            timing: (&c.timing).into(),
            auto_track: c.tracking.auto_track,
        }
    }
}
