//! Operational state and isolation timer bookkeeping after allocation.

use crate::allocation::AllocationState;
use crate::battery::{BatteryRecord, HANDOVER_ISOLATION, OpState};
use crate::snapshot::Snapshot;

/// Isolation long enough that a battery leaving it gets its SoC re-read.
pub const ISOLATION_RESYNC_HOURS: u32 = 4;

/// Move each present battery to the operational state implied by the
/// allocation and hand its isolation timer over.
pub fn update_op_states(
    records: &mut [BatteryRecord],
    alloc: &AllocationState,
    snap: &Snapshot,
    cycles_per_hour: u32,
) {
    let shared = alloc.shared();
    let resync_after = cycles_per_hour.saturating_mul(ISOLATION_RESYNC_HOURS);
    for rec in records.iter_mut().filter(|r| !r.is_missing()) {
        let last = rec.op;
        rec.op = if alloc.under_charge == Some(rec.id()) {
            OpState::Charging
        } else if alloc.under_load == Some(rec.id()) {
            OpState::Loaded
        } else {
            OpState::Isolated
        };

        if last == OpState::Isolated
            && rec.op != OpState::Isolated
            && rec.isolation_time > resync_after
        {
            rec.resync_from_ocv(snap.voltage(rec.id()), snap.temperature);
            rec.isolation_time = 0;
        }

        // With charger and loads on one battery no battery is truly isolated.
        if rec.op != OpState::Isolated || shared {
            rec.isolation_time = HANDOVER_ISOLATION;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatteryCfg;
    use crate::fixed_point::Soc;
    use crate::soc::REFERENCE_TEMPERATURE;
    use bms_traits::BatteryId;

    fn setup() -> (Vec<BatteryRecord>, Snapshot) {
        let recs = (0..3)
            .map(|i| {
                let mut r = BatteryRecord::new(BatteryId::new(i), &BatteryCfg::default());
                r.set_soc(Soc::from_percent(50.0));
                r.isolation_time = 100;
                r
            })
            .collect();
        let snap = Snapshot {
            battery_voltage: vec![3242; 3],
            temperature: REFERENCE_TEMPERATURE,
            ..Snapshot::default()
        };
        (recs, snap)
    }

    #[test]
    fn op_states_follow_targets() {
        let (mut recs, snap) = setup();
        let alloc = AllocationState {
            under_charge: Some(BatteryId::new(0)),
            under_load: Some(BatteryId::new(1)),
            ..AllocationState::default()
        };
        update_op_states(&mut recs, &alloc, &snap, 3600);
        assert_eq!(recs[0].op, OpState::Charging);
        assert_eq!(recs[1].op, OpState::Loaded);
        assert_eq!(recs[2].op, OpState::Isolated);
        assert_eq!(recs[0].isolation_time, HANDOVER_ISOLATION);
        assert_eq!(recs[2].isolation_time, 100);
    }

    #[test]
    fn shared_battery_resets_every_isolation_timer() {
        let (mut recs, snap) = setup();
        let alloc = AllocationState {
            under_charge: Some(BatteryId::new(0)),
            under_load: Some(BatteryId::new(0)),
            ..AllocationState::default()
        };
        update_op_states(&mut recs, &alloc, &snap, 3600);
        assert_eq!(recs[0].op, OpState::Charging);
        assert!(recs.iter().all(|r| r.isolation_time == HANDOVER_ISOLATION));
    }

    #[test]
    fn nothing_allocated_keeps_isolation_running() {
        let (mut recs, snap) = setup();
        update_op_states(&mut recs, &AllocationState::default(), &snap, 3600);
        assert!(recs.iter().all(|r| r.isolation_time == 100));
    }

    #[test]
    fn leaving_long_isolation_resyncs_soc() {
        let (mut recs, snap) = setup();
        recs[1].isolation_time = 4 * 10 + 1;
        let alloc = AllocationState {
            under_load: Some(BatteryId::new(1)),
            ..AllocationState::default()
        };
        update_op_states(&mut recs, &alloc, &snap, 10);
        assert_eq!(recs[1].soc(), Soc::FULL);
        assert_eq!(recs[1].isolation_time, HANDOVER_ISOLATION);
        assert_eq!(recs[0].soc(), Soc::from_percent(50.0));
    }
}
