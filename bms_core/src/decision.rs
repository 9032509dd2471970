//! Diagnostic record of which allocation branches fired in a cycle.

use std::fmt;

/// Bitmask of allocation branches. Reported as `dd` while auto-tracking.
///
/// Some charger/load codes share bits (`0x03`, `0x30`); they are diagnostic
/// codes, not independent flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DecisionStatus(u16);

impl DecisionStatus {
    pub const CHARGER_PRESERVING: u16 = 0x01;
    pub const CHARGER_ANY: u16 = 0x02;
    pub const CHARGER_REFINED: u16 = 0x03;
    pub const WEAK_PRIORITY: u16 = 0x04;
    pub const CRITICAL_PRIORITY: u16 = 0x08;
    pub const LOAD_PRESERVING: u16 = 0x10;
    pub const LOAD_ANY: u16 = 0x20;
    pub const LOAD_REFINED: u16 = 0x30;
    /// Multi-battery: load fell back to any non-weak battery.
    /// Single battery: load withheld from a weak battery.
    pub const LOAD_NOT_WEAK: u16 = 0x40;
    pub const LOAD_SHARED: u16 = 0x80;
    pub const CHARGER_ON: u16 = 0x100;
    pub const ALL_FLOAT: u16 = 0x200;
    pub const SINGLE_BATTERY: u16 = 0x1000;
    pub const MULTI_BATTERY: u16 = 0x2000;

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub fn set(&mut self, bits: u16) {
        self.0 |= bits;
    }

    /// All of `bits` are set.
    pub const fn contains(self, bits: u16) -> bool {
        self.0 & bits == bits
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}
