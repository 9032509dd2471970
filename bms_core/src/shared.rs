//! State shared between the engine thread and everybody else.
//!
//! The engine is the only writer. Readers go through `EngineHandle`, which
//! copies scalars out of atomics; a multi-field read of one battery may mix
//! two cycles. Mutations are queued as `Request`s and applied by the engine
//! at the start of its next cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU16, AtomicU32, AtomicU64, Ordering};

use crossbeam_channel as xch;

use bms_traits::BatteryId;

use crate::allocation::AllocationState;
use crate::battery::{BatteryRecord, FillState, HealthState, OpState};
use crate::decision::DecisionStatus;
use crate::error::{BmsError, Result};
use crate::fixed_point::Soc;

/// Mutations requested from outside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Calibrate,
    SetMissing(BatteryId, bool),
    ForceSoc(BatteryId, Soc),
    /// Set SoC to 100 %; flags the battery Faulty if it was not already full.
    ResetSoc(BatteryId),
    SetAutoTrack(bool),
}

#[derive(Debug, Default)]
struct BatterySlot {
    soc: AtomicU16,
    health: AtomicU8,
    fill: AtomicU8,
    op: AtomicU8,
}

/// Latest published engine state.
#[derive(Debug)]
pub struct StatusBoard {
    batteries: Vec<BatterySlot>,
    under_charge: AtomicU8,
    under_load: AtomicU8,
    charger_off: AtomicBool,
    decision: AtomicU16,
    calibrating: AtomicBool,
    auto_track: AtomicBool,
    cycles: AtomicU64,
}

impl StatusBoard {
    fn new(batteries: usize) -> Self {
        Self {
            batteries: (0..batteries).map(|_| BatterySlot::default()).collect(),
            under_charge: AtomicU8::new(0),
            under_load: AtomicU8::new(0),
            charger_off: AtomicBool::new(false),
            decision: AtomicU16::new(0),
            calibrating: AtomicBool::new(false),
            auto_track: AtomicBool::new(false),
            cycles: AtomicU64::new(0),
        }
    }

    pub(crate) fn publish(&self, records: &[BatteryRecord], alloc: &AllocationState) {
        for (slot, rec) in self.batteries.iter().zip(records) {
            slot.soc.store(rec.soc().raw(), Ordering::Relaxed);
            slot.health.store(rec.health.code(), Ordering::Relaxed);
            slot.fill.store(rec.fill.code(), Ordering::Relaxed);
            slot.op.store(rec.op.code(), Ordering::Relaxed);
        }
        self.under_charge
            .store(BatteryId::encode(alloc.under_charge), Ordering::Relaxed);
        self.under_load
            .store(BatteryId::encode(alloc.under_load), Ordering::Relaxed);
        self.charger_off.store(alloc.charger_off, Ordering::Relaxed);
        self.decision
            .store(alloc.decision.bits(), Ordering::Relaxed);
    }

    pub(crate) fn set_calibrating(&self, on: bool) {
        self.calibrating.store(on, Ordering::Relaxed);
    }

    pub(crate) fn set_auto_track(&self, on: bool) {
        self.auto_track.store(on, Ordering::Relaxed);
    }

    pub(crate) fn count_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    fn slot(&self, id: BatteryId) -> Option<&BatterySlot> {
        self.batteries.get(id.index())
    }
}

/// Engine liveness counter. The engine pets it every cycle (and every
/// calibration test); the watchdog ticks it and restarts the engine once it
/// passes its bound.
#[derive(Debug, Default)]
pub struct Liveness(AtomicU32);

impl Liveness {
    pub fn pet(&self) {
        self.0.store(0, Ordering::Relaxed);
    }

    /// Count one watchdog period; returns the value before the increment.
    pub fn tick(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    pub fn count(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Engine-side end of the shared state. Cloned into every engine instance a
/// supervisor creates, so the board and queue outlive restarts.
#[derive(Debug, Clone)]
pub struct EngineLink {
    board: Arc<StatusBoard>,
    liveness: Arc<Liveness>,
    tx: xch::Sender<Request>,
    rx: xch::Receiver<Request>,
}

impl EngineLink {
    pub fn new(batteries: usize) -> Self {
        let (tx, rx) = xch::unbounded();
        Self {
            board: Arc::new(StatusBoard::new(batteries)),
            liveness: Arc::new(Liveness::default()),
            tx,
            rx,
        }
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            board: Arc::clone(&self.board),
            liveness: Arc::clone(&self.liveness),
            tx: self.tx.clone(),
        }
    }

    pub fn batteries(&self) -> usize {
        self.board.batteries.len()
    }

    pub(crate) fn board(&self) -> &StatusBoard {
        &self.board
    }

    pub(crate) fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    /// Pending requests, oldest first, without blocking.
    pub(crate) fn drain(&self) -> impl Iterator<Item = Request> + '_ {
        self.rx.try_iter()
    }
}

/// Read accessors and request API for collaborators (comms, CLI, tests).
#[derive(Debug, Clone)]
pub struct EngineHandle {
    board: Arc<StatusBoard>,
    liveness: Arc<Liveness>,
    tx: xch::Sender<Request>,
}

impl EngineHandle {
    fn send(&self, req: Request) -> Result<()> {
        self.tx
            .send(req)
            .map_err(|_| eyre::Report::new(BmsError::Stopped))
    }

    fn check(&self, id: BatteryId) -> Result<()> {
        if id.index() >= self.board.batteries.len() {
            return Err(eyre::Report::new(BmsError::Config(format!(
                "no battery {id}"
            ))));
        }
        Ok(())
    }

    pub fn request_calibration(&self) -> Result<()> {
        self.send(Request::Calibrate)
    }

    pub fn set_battery_missing(&self, id: BatteryId, missing: bool) -> Result<()> {
        self.check(id)?;
        self.send(Request::SetMissing(id, missing))
    }

    pub fn force_soc(&self, id: BatteryId, soc: Soc) -> Result<()> {
        self.check(id)?;
        self.send(Request::ForceSoc(id, soc))
    }

    pub fn reset_soc(&self, id: BatteryId) -> Result<()> {
        self.check(id)?;
        self.send(Request::ResetSoc(id))
    }

    pub fn set_auto_track(&self, on: bool) -> Result<()> {
        self.send(Request::SetAutoTrack(on))
    }

    pub fn battery_count(&self) -> usize {
        self.board.batteries.len()
    }

    pub fn battery_soc(&self, id: BatteryId) -> Option<Soc> {
        self.board
            .slot(id)
            .map(|s| Soc::from_raw(i64::from(s.soc.load(Ordering::Relaxed))))
    }

    pub fn battery_health(&self, id: BatteryId) -> Option<HealthState> {
        self.board
            .slot(id)
            .and_then(|s| HealthState::from_code(s.health.load(Ordering::Relaxed)))
    }

    pub fn battery_fill(&self, id: BatteryId) -> Option<FillState> {
        self.board
            .slot(id)
            .and_then(|s| FillState::from_code(s.fill.load(Ordering::Relaxed)))
    }

    pub fn battery_op_state(&self, id: BatteryId) -> Option<OpState> {
        self.board
            .slot(id)
            .and_then(|s| OpState::from_code(s.op.load(Ordering::Relaxed)))
    }

    pub fn battery_under_load(&self) -> Option<BatteryId> {
        BatteryId::decode(self.board.under_load.load(Ordering::Relaxed))
    }

    pub fn battery_under_charge(&self) -> Option<BatteryId> {
        BatteryId::decode(self.board.under_charge.load(Ordering::Relaxed))
    }

    pub fn charger_off(&self) -> bool {
        self.board.charger_off.load(Ordering::Relaxed)
    }

    pub fn decision_status(&self) -> DecisionStatus {
        DecisionStatus::from_bits(self.board.decision.load(Ordering::Relaxed))
    }

    pub fn calibrating(&self) -> bool {
        self.board.calibrating.load(Ordering::Relaxed)
    }

    pub fn auto_track(&self) -> bool {
        self.board.auto_track.load(Ordering::Relaxed)
    }

    /// Completed control cycles across all engine instances.
    pub fn cycles(&self) -> u64 {
        self.board.cycles.load(Ordering::Relaxed)
    }

    pub fn liveness(&self) -> u32 {
        self.liveness.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatteryCfg;

    #[test]
    fn requests_arrive_in_order() {
        let link = EngineLink::new(2);
        let handle = link.handle();
        handle.request_calibration().unwrap();
        handle.reset_soc(BatteryId::new(1)).unwrap();
        let got: Vec<Request> = link.drain().collect();
        assert_eq!(
            got,
            vec![Request::Calibrate, Request::ResetSoc(BatteryId::new(1))]
        );
        assert_eq!(link.drain().count(), 0);
    }

    #[test]
    fn out_of_range_battery_is_rejected() {
        let handle = EngineLink::new(2).handle();
        let err = handle
            .force_soc(BatteryId::new(5), Soc::FULL)
            .expect_err("no battery 6");
        assert!(matches!(
            err.downcast_ref::<BmsError>(),
            Some(BmsError::Config(_))
        ));
    }

    #[test]
    fn publish_is_visible_through_handle() {
        let link = EngineLink::new(2);
        let handle = link.handle();
        let mut recs: Vec<BatteryRecord> = (0..2)
            .map(|i| BatteryRecord::new(BatteryId::new(i), &BatteryCfg::default()))
            .collect();
        recs[1].set_soc(Soc::from_percent(75.0));
        recs[1].fill = FillState::Low;
        recs[0].health = HealthState::Weak;
        let alloc = AllocationState {
            under_charge: Some(BatteryId::new(0)),
            under_load: Some(BatteryId::new(1)),
            charger_off: false,
            decision: DecisionStatus::from_bits(0x2011),
        };
        link.board().publish(&recs, &alloc);
        assert_eq!(
            handle.battery_soc(BatteryId::new(1)),
            Some(Soc::from_percent(75.0))
        );
        assert_eq!(handle.battery_fill(BatteryId::new(1)), Some(FillState::Low));
        assert_eq!(
            handle.battery_health(BatteryId::new(0)),
            Some(HealthState::Weak)
        );
        assert_eq!(handle.battery_under_charge(), Some(BatteryId::new(0)));
        assert_eq!(handle.battery_under_load(), Some(BatteryId::new(1)));
        assert_eq!(handle.decision_status().bits(), 0x2011);
        assert_eq!(handle.battery_soc(BatteryId::new(4)), None);
    }

    #[test]
    fn liveness_tick_and_pet() {
        let l = Liveness::default();
        assert_eq!(l.tick(), 0);
        assert_eq!(l.tick(), 1);
        assert_eq!(l.count(), 2);
        l.pet();
        assert_eq!(l.count(), 0);
    }
}
