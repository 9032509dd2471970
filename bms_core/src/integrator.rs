//! Coulomb counting, fill-state derivation and the periodic OCV resyncs that
//! bound counting drift.

use crate::allocation::AllocationState;
use crate::battery::{BatteryRecord, FillState, HealthState};
use crate::config::Thresholds;
use crate::fixed_point::Soc;
use crate::snapshot::Snapshot;
use bms_traits::ChargingPhase;

/// Missing batteries read empty and are never left holding a target.
pub fn clear_missing(records: &mut [BatteryRecord], alloc: &mut AllocationState) {
    for rec in records.iter_mut().filter(|r| r.is_missing()) {
        rec.set_soc(Soc::EMPTY);
        if alloc.under_load == Some(rec.id()) {
            alloc.under_load = None;
        }
        if alloc.under_charge == Some(rec.id()) {
            alloc.under_charge = None;
        }
    }
}

/// Classify fill from terminal voltage and SoC. Runs every cycle, so a
/// Faulty mark from a forced reset lasts until the next derivation.
pub fn derive_fill(voltage: i32, soc: Soc, th: &Thresholds) -> FillState {
    if voltage < th.critical_voltage || soc < th.critical_soc {
        FillState::Critical
    } else if voltage < th.low_voltage || soc < th.low_soc {
        FillState::Low
    } else {
        FillState::Normal
    }
}

/// Apply this cycle's charge deltas and refresh fill and health.
pub fn integrate(records: &mut [BatteryRecord], snap: &Snapshot, th: &Thresholds) {
    for rec in records.iter_mut().filter(|r| !r.is_missing()) {
        let i = rec.id().index();
        rec.accumulate(snap.charge_delta.get(i).copied().unwrap_or(0));

        let voltage = snap.voltage(rec.id()).saturating_abs();
        rec.fill = derive_fill(voltage, rec.soc(), th);

        if voltage < th.weak_voltage {
            if !rec.is_weak() {
                tracing::warn!(battery = %rec.id(), voltage, "battery below dropout voltage; marked weak");
            }
            rec.health = HealthState::Weak;
            rec.fill = FillState::Critical;
            rec.set_soc(Soc::EMPTY);
        }
        if snap.phase(rec.id()) == ChargingPhase::Rest {
            rec.health = HealthState::Good;
        }
    }
}

/// Idle and long-isolation resyncs. Increments the steady-current and
/// isolation counters and replaces SoC with the OCV estimate once either
/// passes its bound (one hour idle, eight hours isolated).
pub fn resync_idle(
    records: &mut [BatteryRecord],
    snap: &Snapshot,
    th: &Thresholds,
    cycles_per_hour: u32,
) {
    for rec in records.iter_mut().filter(|r| !r.is_missing()) {
        let i = rec.id().index();
        let current = snap.battery_current.get(i).copied().unwrap_or(0);
        if current.saturating_abs() < th.steady_current {
            rec.current_steady = rec.current_steady.saturating_add(1);
        } else {
            rec.current_steady = 0;
        }
        if rec.current_steady > cycles_per_hour {
            rec.resync_from_ocv(snap.voltage(rec.id()), snap.temperature);
            rec.current_steady = 0;
        }

        rec.isolation_time = rec.isolation_time.saturating_add(1);
        if rec.isolation_time > cycles_per_hour.saturating_mul(8) {
            rec.resync_from_ocv(snap.voltage(rec.id()), snap.temperature);
            rec.isolation_time = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatteryCfg;
    use crate::soc::REFERENCE_TEMPERATURE;
    use bms_traits::BatteryId;
    use rstest::rstest;

    fn records(n: u8) -> Vec<BatteryRecord> {
        (0..n)
            .map(|i| BatteryRecord::new(BatteryId::new(i), &BatteryCfg::default()))
            .collect()
    }

    fn snapshot(n: usize, voltage: i32) -> Snapshot {
        Snapshot {
            battery_voltage: vec![voltage; n],
            battery_current: vec![0; n],
            charge_delta: vec![0; n],
            phases: vec![ChargingPhase::Bulk; n],
            temperature: REFERENCE_TEMPERATURE,
            ..Snapshot::default()
        }
    }

    #[rstest]
    #[case(3200, 80.0, FillState::Normal)]
    #[case(2900, 80.0, FillState::Low)]
    #[case(3200, 50.0, FillState::Low)]
    #[case(2800, 80.0, FillState::Critical)]
    #[case(3200, 40.0, FillState::Critical)]
    fn fill_thresholds(#[case] voltage: i32, #[case] pct: f32, #[case] expected: FillState) {
        let th = Thresholds::default();
        assert_eq!(
            derive_fill(voltage, Soc::from_percent(pct), &th),
            expected
        );
    }

    #[test]
    fn faulty_mark_is_replaced_on_the_next_cycle() {
        let th = Thresholds::default();
        let mut recs = records(1);
        recs[0].set_soc(Soc::from_percent(80.0));
        recs[0].reset_full();
        assert_eq!(recs[0].fill, FillState::Faulty);

        recs[0].set_soc(Soc::from_percent(5.0));
        integrate(&mut recs, &snapshot(1, 3200), &th);
        assert_eq!(recs[0].fill, FillState::Critical);
    }

    #[test]
    fn dropout_voltage_marks_weak_and_rest_restores_health() {
        let th = Thresholds::default();
        let mut recs = records(2);
        recs[0].set_soc(Soc::from_percent(70.0));
        let mut snap = snapshot(2, 3200);
        snap.battery_voltage[0] = 2600;
        integrate(&mut recs, &snap, &th);
        assert_eq!(recs[0].health, HealthState::Weak);
        assert_eq!(recs[0].fill, FillState::Critical);
        assert_eq!(recs[0].soc(), Soc::EMPTY);

        snap.battery_voltage[0] = 3200;
        snap.phases[0] = ChargingPhase::Rest;
        integrate(&mut recs, &snap, &th);
        assert_eq!(recs[0].health, HealthState::Good);
    }

    #[test]
    fn missing_batteries_are_skipped_and_released() {
        let mut recs = records(2);
        recs[1].set_soc(Soc::from_percent(90.0));
        recs[1].set_missing(true);
        let mut alloc = AllocationState {
            under_charge: Some(BatteryId::new(1)),
            under_load: Some(BatteryId::new(0)),
            ..AllocationState::default()
        };
        clear_missing(&mut recs, &mut alloc);
        assert_eq!(recs[1].soc(), Soc::EMPTY);
        assert_eq!(alloc.under_charge, None);
        assert_eq!(alloc.under_load, Some(BatteryId::new(0)));
    }

    #[test]
    fn idle_for_an_hour_resyncs_from_ocv() {
        let th = Thresholds::default();
        let mut recs = records(1);
        recs[0].set_soc(Soc::from_percent(10.0));
        let snap = snapshot(1, 3242);
        for _ in 0..=4 {
            resync_idle(&mut recs, &snap, &th, 4);
        }
        assert_eq!(recs[0].soc(), Soc::FULL);
        assert_eq!(recs[0].current_steady, 0);
    }

    #[test]
    fn busy_battery_never_idle_resyncs() {
        let th = Thresholds::default();
        let mut recs = records(1);
        recs[0].set_soc(Soc::from_percent(10.0));
        recs[0].isolation_time = 0;
        let mut snap = snapshot(1, 3242);
        snap.battery_current[0] = -200;
        for _ in 0..10 {
            resync_idle(&mut recs, &snap, &th, 4);
            recs[0].isolation_time = 0;
        }
        assert_eq!(recs[0].soc(), Soc::from_percent(10.0));
    }

    #[test]
    fn eight_hours_isolated_resyncs() {
        let th = Thresholds::default();
        let mut recs = records(1);
        recs[0].set_soc(Soc::from_percent(10.0));
        let mut snap = snapshot(1, 3242);
        snap.battery_current[0] = 500;
        for _ in 0..=8 {
            resync_idle(&mut recs, &snap, &th, 1);
        }
        assert_eq!(recs[0].soc(), Soc::FULL);
        assert_eq!(recs[0].isolation_time, 0);
    }
}
