//! Outbound data records.
//!
//! Record ids are short tags followed by a one-based index where the record
//! concerns one battery, load or panel (`dB1`, `dL2`, `dM1`).

use bms_traits::{ChargingPhase, NUM_LOADS, Reporter, SwitchConfig};

use crate::allocation::AllocationState;
use crate::battery::{BatteryRecord, FillState, HealthState, OpState};
use crate::snapshot::Snapshot;

/// Emits every record as a `tracing` event on target `bms::report`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&mut self, id: &str, values: &[i32]) {
        tracing::debug!(target: "bms::report", id, ?values);
    }
}

/// Packed per-battery state: `op | fill << 2 | phase << 4 | health << 6`.
pub fn state_word(op: OpState, fill: FillState, phase: ChargingPhase, health: HealthState) -> i32 {
    i32::from(op.code())
        | i32::from(fill.code()) << 2
        | i32::from(phase.code()) << 4
        | i32::from(health.code()) << 6
}

/// `dD` bit: switches follow the allocation.
pub const CONTROL_AUTO_TRACK: i32 = 0x01;
/// `dD` bit: a calibration is in progress.
pub const CONTROL_CALIBRATING: i32 = 0x02;

pub fn control_flags(auto_track: bool, calibrating: bool) -> i32 {
    let mut flags = 0;
    if auto_track {
        flags |= CONTROL_AUTO_TRACK;
    }
    if calibrating {
        flags |= CONTROL_CALIBRATING;
    }
    flags
}

pub(crate) fn report_control<R: Reporter + ?Sized>(out: &mut R, auto_track: bool, calibrating: bool) {
    out.report("dD", &[control_flags(auto_track, calibrating)]);
}

pub(crate) fn report_cycle<R: Reporter + ?Sized>(
    out: &mut R,
    records: &[BatteryRecord],
    snap: &Snapshot,
    switches: SwitchConfig,
    alloc: &AllocationState,
    auto_track: bool,
) {
    for rec in records {
        let n = rec.id().index() + 1;
        let i = rec.id().index();
        out.report(
            &format!("dB{n}"),
            &[
                i32::from(snap.battery_current.get(i).copied().unwrap_or(0)),
                snap.voltage(rec.id()),
            ],
        );
        out.report(&format!("dC{n}"), &[i32::from(rec.soc().raw())]);
        out.report(
            &format!("dO{n}"),
            &[state_word(rec.op, rec.fill, snap.phase(rec.id()), rec.health)],
        );
    }
    for load in 0..NUM_LOADS {
        out.report(
            &format!("dL{}", load + 1),
            &[
                i32::from(snap.load_current[load]),
                snap.load_voltage[load],
            ],
        );
    }
    out.report(
        "dM1",
        &[i32::from(snap.panel_current), snap.panel_voltage],
    );
    out.report("dT", &[snap.temperature]);
    out.report("ds", &[i32::from(switches.bits())]);
    report_control(out, auto_track, false);
    if auto_track {
        out.report("dd", &[i32::from(alloc.decision.bits())]);
    }
    out.report("dI", &[snap.indicators as i32]);
}

pub(crate) fn report_calibration_test<R: Reporter + ?Sized>(out: &mut R, test: usize) {
    out.report("pQ", &[0, test as i32]);
}

pub(crate) fn report_calibration_done<R: Reporter + ?Sized>(
    out: &mut R,
    quiescent: i16,
    tests: usize,
    restored: SwitchConfig,
) {
    out.report("pQ", &[i32::from(quiescent), tests as i32]);
    out.report("dS", &[i32::from(restored.bits())]);
}
