//! Per-battery record: health, fill and operational state plus the Coulomb
//! counter that SoC is derived from.

use bms_traits::BatteryId;

use crate::config::BatteryCfg;
use crate::fixed_point::Soc;
use crate::soc::{Chemistry, compute_soc};

/// Isolation timer value after a handover; non-zero so the battery that is
/// currently preserved can be told apart from freshly released ones.
pub const HANDOVER_ISOLATION: u32 = 10;

/// Charge per percent of SoC for 1 Ah: 3600 As / 100 %.
const CHARGE_PER_AH_PERCENT: i32 = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthState {
    #[default]
    Good,
    Weak,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillState {
    #[default]
    Normal,
    Low,
    Critical,
    Faulty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpState {
    #[default]
    Isolated,
    Loaded,
    Charging,
}

macro_rules! two_bit_code {
    ($ty:ident { $($variant:ident = $code:literal),+ $(,)? }) => {
        impl $ty {
            /// Two-bit code used in reports and on the status board.
            pub const fn code(self) -> u8 {
                match self {
                    $($ty::$variant => $code),+
                }
            }

            pub const fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some($ty::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

two_bit_code!(HealthState { Good = 0, Weak = 1, Missing = 2 });
two_bit_code!(FillState { Normal = 0, Low = 1, Critical = 2, Faulty = 3 });
two_bit_code!(OpState { Isolated = 0, Loaded = 1, Charging = 2 });

#[derive(Debug, Clone)]
pub struct BatteryRecord {
    id: BatteryId,
    capacity_ah: u32,
    chemistry: Chemistry,
    pub health: HealthState,
    pub fill: FillState,
    pub op: OpState,
    soc: Soc,
    charge: i32,
    /// Cycles spent isolated since the last reset.
    pub isolation_time: u32,
    /// Consecutive cycles with battery current below the idle threshold.
    pub current_steady: u32,
}

impl BatteryRecord {
    pub fn new(id: BatteryId, cfg: &BatteryCfg) -> Self {
        Self {
            id,
            capacity_ah: cfg.capacity_ah,
            chemistry: cfg.chemistry,
            health: HealthState::Good,
            fill: FillState::Normal,
            op: OpState::Isolated,
            soc: Soc::EMPTY,
            charge: 0,
            isolation_time: 0,
            current_steady: 0,
        }
    }

    pub const fn id(&self) -> BatteryId {
        self.id
    }

    pub const fn chemistry(&self) -> Chemistry {
        self.chemistry
    }

    pub const fn soc(&self) -> Soc {
        self.soc
    }

    /// Accumulated charge, ampere-seconds ×256.
    pub const fn charge(&self) -> i32 {
        self.charge
    }

    pub const fn is_missing(&self) -> bool {
        matches!(self.health, HealthState::Missing)
    }

    pub const fn is_weak(&self) -> bool {
        matches!(self.health, HealthState::Weak)
    }

    fn charge_per_percent(&self) -> i32 {
        self.capacity_ah as i32 * CHARGE_PER_AH_PERCENT
    }

    /// Full capacity in ampere-seconds ×256.
    pub fn max_charge(&self) -> i32 {
        self.charge_per_percent() * i32::from(Soc::FULL.raw())
    }

    /// Set SoC and keep the Coulomb counter consistent with it.
    pub fn set_soc(&mut self, soc: Soc) {
        self.soc = soc;
        self.charge = i32::from(soc.raw()) * self.charge_per_percent();
    }

    /// Add a signed charge delta (ampere-seconds ×256), clamp to capacity and
    /// rederive SoC.
    pub fn accumulate(&mut self, delta: i32) {
        let next = i64::from(self.charge) + i64::from(delta);
        self.charge = next.clamp(0, i64::from(self.max_charge())) as i32;
        self.soc = Soc::from_raw(i64::from(self.charge / self.charge_per_percent()));
    }

    /// Replace the Coulomb-counted SoC with the OCV estimate.
    pub fn resync_from_ocv(&mut self, voltage: i32, temperature: i32) {
        let soc = compute_soc(voltage, temperature, self.chemistry);
        tracing::debug!(battery = %self.id, from = %self.soc, to = %soc, "soc resync from ocv");
        self.set_soc(soc);
    }

    /// Force SoC to 100 %. A battery that was not already full is marked
    /// Faulty until fill is next derived.
    pub fn reset_full(&mut self) {
        if !self.soc.is_full() {
            self.fill = FillState::Faulty;
        }
        self.set_soc(Soc::FULL);
    }

    pub fn set_missing(&mut self, missing: bool) {
        if missing {
            self.health = HealthState::Missing;
        } else {
            self.health = HealthState::Good;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(capacity_ah: u32) -> BatteryRecord {
        BatteryRecord::new(
            BatteryId::new(0),
            &BatteryCfg {
                capacity_ah,
                chemistry: Chemistry::Wet,
            },
        )
    }

    #[test]
    fn accumulate_clamps_to_capacity() {
        let mut b = record(100);
        b.set_soc(Soc::from_percent(99.0));
        b.accumulate(i32::MAX);
        assert_eq!(b.soc(), Soc::FULL);
        assert_eq!(b.charge(), 100 * 3600 * 256);
        b.accumulate(i32::MIN);
        assert_eq!(b.soc(), Soc::EMPTY);
        assert_eq!(b.charge(), 0);
    }

    #[test]
    fn reset_full_marks_faulty_only_when_not_full() {
        let mut b = record(100);
        b.set_soc(Soc::from_percent(80.0));
        b.reset_full();
        assert_eq!(b.fill, FillState::Faulty);
        assert_eq!(b.soc(), Soc::FULL);

        let mut full = record(100);
        full.set_soc(Soc::FULL);
        full.reset_full();
        assert_eq!(full.fill, FillState::Normal);
    }

    #[test]
    fn clearing_missing_restores_good_health() {
        let mut b = record(50);
        b.set_missing(true);
        assert!(b.is_missing());
        b.set_missing(false);
        assert_eq!(b.health, HealthState::Good);
    }

    #[test]
    fn codes_round_trip() {
        for f in [
            FillState::Normal,
            FillState::Low,
            FillState::Critical,
            FillState::Faulty,
        ] {
            assert_eq!(FillState::from_code(f.code()), Some(f));
        }
        assert_eq!(HealthState::from_code(3), None);
    }

    proptest! {
        #[test]
        fn set_soc_keeps_charge_consistent(cap in 1u32..=2330, raw in 0u16..=25_600) {
            let mut b = record(cap);
            b.set_soc(Soc::from_raw(i64::from(raw)));
            prop_assert_eq!(i64::from(b.charge()), i64::from(raw) * i64::from(cap) * 36);
        }

        #[test]
        fn accumulate_stays_in_bounds(cap in 1u32..=2330, start in 0u16..=25_600, deltas in proptest::collection::vec(any::<i32>(), 1..20)) {
            let mut b = record(cap);
            b.set_soc(Soc::from_raw(i64::from(start)));
            for d in deltas {
                b.accumulate(d);
                prop_assert!(b.charge() >= 0 && b.charge() <= b.max_charge());
                prop_assert!(b.soc() <= Soc::FULL);
            }
        }
    }
}
