//! Open-circuit-voltage State of Charge model.
//!
//! The measured terminal voltage is referred to 48.9 °C with a quadratic
//! temperature correction, then mapped linearly to SoC. Gel and AGM cells get
//! a steeper slope between 25 % and 50 %.

use crate::fixed_point::{OCV_SCALE, Soc};

/// Reference temperature 48.9 °C, ×256.
pub const REFERENCE_TEMPERATURE: i32 = 12_518;

/// Full-charge OCV of flooded cells (12.66 V ×256).
pub const WET_V100: i64 = 3_242;
/// Full-charge OCV of calcium cells (12.81 V ×256).
pub const GEL_V100: i64 = 3_280;
/// Slope breakpoint for calcium cells (12.41 V ×256).
pub const GEL_V50: i64 = 3_178;
/// Floor of the steep section (12.01 V ×256).
pub const GEL_V25: i64 = 3_075;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Chemistry {
    #[default]
    Wet,
    Gel,
    Agm,
}

impl Chemistry {
    const fn v100(self) -> i64 {
        match self {
            Chemistry::Wet => WET_V100,
            Chemistry::Gel | Chemistry::Agm => GEL_V100,
        }
    }

    const fn is_calcium(self) -> bool {
        matches!(self, Chemistry::Gel | Chemistry::Agm)
    }
}

/// Temperature correction factor, ×65536. Never below 1.
#[inline]
fn voltage_factor(temperature: i32) -> i64 {
    let t_diff = i64::from(REFERENCE_TEMPERATURE - temperature) >> 2;
    (OCV_SCALE - ((42 * t_diff * t_diff) >> 20)).max(1)
}

/// Open-circuit voltage referred to the reference temperature, volts ×256.
#[inline]
pub fn reference_ocv(voltage: i32, temperature: i32) -> i64 {
    i64::from(voltage) * OCV_SCALE / voltage_factor(temperature)
}

/// Estimate SoC from a rested terminal voltage (volts ×256) and ambient
/// temperature (°C ×256). Total over its domain; the result is clamped.
pub fn compute_soc(voltage: i32, temperature: i32, chemistry: Chemistry) -> Soc {
    let ocv = reference_ocv(voltage, temperature);
    let mut soc = 100 * (OCV_SCALE - 320 * (chemistry.v100() - ocv));
    if chemistry.is_calcium() && ocv < GEL_V50 {
        soc += 100 * 160 * (GEL_V50 - ocv.max(GEL_V25));
    }
    Soc::from_raw(soc >> 8)
}
