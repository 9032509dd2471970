//! Fixed-point scales used throughout the engine.
//!
//! Physical quantities (volts, °C, percent) are carried as `i32`/`u16` times 256.
//! The OCV temperature correction works at ×65536 internally.

use std::fmt;

/// Scale of physical quantities: 1.0 == 256.
pub const SCALE: i32 = 256;
/// Internal precision of the OCV correction factor.
pub const OCV_SCALE: i64 = 65_536;

/// Convert a value in natural units to the ×256 scale, rounding to nearest.
/// Non-finite inputs map to 0.
#[inline]
pub fn to_fixed(x: f32) -> i32 {
    if !x.is_finite() {
        return 0;
    }
    let scaled = (x * SCALE as f32).round();
    if scaled >= i32::MAX as f32 {
        i32::MAX
    } else if scaled <= i32::MIN as f32 {
        i32::MIN
    } else {
        scaled as i32
    }
}

/// Convert a ×256 value back to natural units (for display only).
#[inline]
pub fn from_fixed(v: i32) -> f32 {
    v as f32 / SCALE as f32
}

/// State of charge, percent ×256. Always within `0..=25600`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Soc(u16);

impl Soc {
    pub const EMPTY: Soc = Soc(0);
    pub const FULL: Soc = Soc(25_600);

    /// Clamp a raw ×256 value into range.
    #[inline]
    pub fn from_raw(raw: i64) -> Self {
        Self(raw.clamp(0, i64::from(Self::FULL.0)) as u16)
    }

    #[inline]
    pub fn from_percent(pct: f32) -> Self {
        Self::from_raw(i64::from(to_fixed(pct)))
    }

    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }

    #[inline]
    pub fn percent(self) -> f32 {
        f32::from(self.0) / SCALE as f32
    }

    #[inline]
    pub const fn is_full(self) -> bool {
        self.0 >= Self::FULL.0
    }

    /// `self` exceeds `other` by more than `margin_pct` whole percent.
    #[inline]
    pub fn exceeds_by(self, other: Soc, margin_pct: u16) -> bool {
        u32::from(self.0) > u32::from(other.0) + u32::from(margin_pct) * SCALE as u32
    }
}

impl fmt::Display for Soc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.percent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_fixed_rounds_and_rejects_nan() {
        assert_eq!(to_fixed(12.66), 3241);
        assert_eq!(to_fixed(0.5), 128);
        assert_eq!(to_fixed(f32::NAN), 0);
        assert_eq!(to_fixed(f32::INFINITY), 0);
    }

    #[test]
    fn soc_clamps_into_range() {
        assert_eq!(Soc::from_raw(-5), Soc::EMPTY);
        assert_eq!(Soc::from_raw(99_999), Soc::FULL);
        assert_eq!(Soc::from_percent(50.0).raw(), 12_800);
    }

    #[test]
    fn exceeds_by_is_strict() {
        let a = Soc::from_percent(65.0);
        let b = Soc::from_percent(60.0);
        assert!(!a.exceeds_by(b, 5));
        assert!(Soc::from_raw(i64::from(a.raw()) + 1).exceeds_by(b, 5));
    }
}
