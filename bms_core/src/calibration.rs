//! Current-offset calibration.
//!
//! The sequencer walks a fixed plan of switch configurations (each load on
//! each battery in turn, then everything open), samples every current
//! interface after each one, and derives:
//!
//! - per-interface offsets: the smallest sample above the noise threshold;
//! - the quiescent current: the largest offset-corrected battery sample.
//!
//! The hardware-facing part of the sequence lives in `Engine::calibrate`; this
//! module holds the plan and the arithmetic so both can be tested in isolation.

use bms_traits::{BatteryId, Line, SwitchConfig};

/// Samples at or below this are treated as sensor anomalies.
pub const CALIBRATION_THRESHOLD: i16 = -50;
/// Offsets are only taken from samples below this ceiling.
pub const OFFSET_CEILING: i16 = 100;
/// Reported quiescent current when no sample qualified.
pub const QUIESCENT_FLOOR: i16 = -100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationState {
    #[default]
    Idle,
    Running,
    Finalizing,
}

/// Switch configurations visited by a calibration run. Load 2 goes on each
/// battery, then load 1, and the last test leaves every switch open so the
/// panel can be measured.
pub fn test_plan(batteries: usize) -> Vec<SwitchConfig> {
    let mut plan = Vec::with_capacity(2 * batteries + 1);
    for line in [Line::Load2, Line::Load1] {
        for i in 0..batteries {
            let mut cfg = SwitchConfig::OPEN;
            cfg.set(line, Some(BatteryId::new(i as u8)));
            plan.push(cfg);
        }
    }
    plan.push(SwitchConfig::OPEN);
    plan
}

/// Batteries whose interface indicator shows no connection.
///
/// A missing battery only shows up while a load is connected to it, so this
/// never clears an existing Missing flag.
pub fn missing_from_indicators(indicators: u32, batteries: usize) -> Vec<BatteryId> {
    (0..batteries)
        .filter(|&i| (indicators >> (2 * i)) & 0x02 == 0)
        .map(|i| BatteryId::new(i as u8))
        .collect()
}

/// Raw samples collected during one calibration run, `[test][interface]`.
#[derive(Debug, Clone, Default)]
pub struct CalibrationSession {
    interfaces: usize,
    samples: Vec<Vec<i16>>,
}

impl CalibrationSession {
    pub fn new(interfaces: usize, tests: usize) -> Self {
        Self {
            interfaces,
            samples: Vec::with_capacity(tests),
        }
    }

    /// Store one test's samples; missing interfaces read as 0.
    pub fn record(&mut self, mut samples: Vec<i16>) {
        samples.resize(self.interfaces, 0);
        self.samples.push(samples);
    }

    pub fn tests_recorded(&self) -> usize {
        self.samples.len()
    }

    /// Per interface, the minimum sample inside the valid window, or 0 when
    /// no sample qualifies.
    pub fn derive_offsets(&self) -> Vec<i16> {
        (0..self.interfaces)
            .map(|iface| {
                self.samples
                    .iter()
                    .map(|test| test[iface])
                    .filter(|&s| s > CALIBRATION_THRESHOLD && s < OFFSET_CEILING)
                    .min()
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Largest offset-corrected sample over all tests on present batteries.
    /// `present[i]` covers battery interface `i`.
    pub fn quiescent_current(&self, offsets: &[i16], present: &[bool]) -> Option<i16> {
        present
            .iter()
            .enumerate()
            .filter(|(_, p)| **p)
            .flat_map(|(iface, _)| {
                let offset = offsets.get(iface).copied().unwrap_or(0);
                self.samples
                    .iter()
                    .map(move |test| test[iface].saturating_sub(offset))
            })
            .filter(|&s| s > CALIBRATION_THRESHOLD)
            .max()
    }
}

/// Result of a completed calibration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationReport {
    pub offsets: Vec<i16>,
    pub quiescent: Option<i16>,
    /// Batteries newly found missing during the run.
    pub missing: Vec<BatteryId>,
    /// Switch configuration restored at the end of the run.
    pub restored: SwitchConfig,
}
