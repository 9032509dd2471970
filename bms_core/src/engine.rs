//! The control loop.
//!
//! One `Engine` owns the battery records, the allocation state and the
//! current offsets, and is the only writer of all three. Each `step()`:
//!
//! 1. applies queued requests;
//! 2. runs a pending calibration instead of a normal cycle, or
//! 3. reads a `Snapshot`, integrates charge, ranks, allocates, updates
//!    operational state, drives the switches when tracking, resyncs idle
//!    batteries, reports and publishes to the status board.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bms_traits::clock::Clock;
use bms_traits::{
    BatteryId, ChargerPhases, ChargingPhase, HwResult, OffsetStore, Reporter, Sensors, SwitchBank,
    SwitchConfig,
};
use eyre::WrapErr;

use crate::allocation::{
    AllocationInput, AllocationState, BatteryView, allocate, float_restarts, plan_switches,
    preserved_battery,
};
use crate::battery::{BatteryRecord, OpState};
use crate::builder::{EngineBuilder, Missing};
use crate::calibration::{
    CalibrationReport, CalibrationSession, CalibrationState, QUIESCENT_FLOOR,
    missing_from_indicators, test_plan,
};
use crate::config::EngineCfg;
use crate::error::{BmsError, Result};
use crate::fixed_point::Soc;
use crate::hw_error::hw_report;
use crate::integrator::{clear_missing, integrate, resync_idle};
use crate::offsets::CurrentOffsets;
use crate::ranking::Ranking;
use crate::report::{
    report_calibration_done, report_calibration_test, report_control, report_cycle,
};
use crate::shared::{EngineHandle, EngineLink, Request};
use crate::snapshot::Snapshot;
use crate::status::CycleStatus;
use crate::tracker::update_op_states;
use crate::util::cycles_per_hour;

/// Switch matrix plus measurements: everything the engine drives or reads
/// apart from the charger.
pub trait Hardware: SwitchBank + Sensors {}

impl<T: SwitchBank + Sensors + ?Sized> Hardware for T {}

pub struct Engine {
    pub(crate) hw: Box<dyn Hardware + Send>,
    pub(crate) charger: Box<dyn ChargerPhases + Send>,
    pub(crate) reporter: Box<dyn Reporter + Send>,
    pub(crate) store: Option<Box<dyn OffsetStore + Send>>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) link: EngineLink,
    pub(crate) cfg: EngineCfg,
    pub(crate) records: Vec<BatteryRecord>,
    pub(crate) alloc: AllocationState,
    pub(crate) offsets: CurrentOffsets,
    pub(crate) calibration: CalibrationState,
    pub(crate) auto_track: bool,
    pub(crate) pending_calibration: bool,
    pub(crate) cycles_per_hour: u32,
}

impl core::fmt::Debug for Engine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("batteries", &self.records.len())
            .field("alloc", &self.alloc)
            .field("calibration", &self.calibration)
            .field("auto_track", &self.auto_track)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Start building an Engine.
    pub fn builder() -> EngineBuilder<Missing, Missing> {
        EngineBuilder::default()
    }

    pub fn handle(&self) -> EngineHandle {
        self.link.handle()
    }

    pub fn records(&self) -> &[BatteryRecord] {
        &self.records
    }

    pub fn allocation(&self) -> &AllocationState {
        &self.alloc
    }

    pub fn config(&self) -> &EngineCfg {
        &self.cfg
    }

    pub fn calibration_state(&self) -> CalibrationState {
        self.calibration
    }

    pub fn offsets(&self) -> &CurrentOffsets {
        &self.offsets
    }

    pub fn battery_current_offset(&self, battery: BatteryId) -> i16 {
        self.offsets.battery(battery)
    }

    pub fn load_current_offset(&self, load: usize) -> i16 {
        self.offsets.load(load)
    }

    pub fn panel_current_offset(&self, panel: usize) -> i16 {
        self.offsets.panel(panel)
    }

    /// Startup state: SoC from OCV for every battery, all isolated and
    /// healthy, nothing allocated.
    pub fn initialize(&mut self) -> Result<()> {
        let temperature = self.hw.temperature().map_err(|e| hw_report(&e))?;
        for rec in &mut self.records {
            let voltage = self
                .hw
                .battery_voltage(rec.id())
                .map_err(|e| hw_report(&e))
                .wrap_err_with(|| format!("initial voltage of {}", rec.id()))?;
            rec.set_missing(false);
            rec.resync_from_ocv(voltage, temperature);
            rec.op = OpState::Isolated;
            rec.isolation_time = 0;
            rec.current_steady = 0;
        }
        self.alloc = AllocationState::default();
        self.link.board().set_auto_track(self.auto_track);
        self.link.board().publish(&self.records, &self.alloc);
        tracing::info!(
            batteries = self.records.len(),
            auto_track = self.auto_track,
            "engine initialized"
        );
        Ok(())
    }

    /// One control period.
    pub fn step(&mut self) -> Result<CycleStatus> {
        self.apply_requests();
        if self.pending_calibration {
            self.pending_calibration = false;
            return self.calibrate().map(CycleStatus::Calibrated);
        }

        let mut snap =
            Snapshot::read(&mut *self.hw, &*self.charger, &self.offsets).map_err(|e| hw_report(&e))?;
        let th = &self.cfg.thresholds;

        clear_missing(&mut self.records, &mut self.alloc);
        integrate(&mut self.records, &snap, th);

        let ranking = Ranking::new(&self.records);
        let mut views = BatteryView::collect(&self.records, &snap);
        for id in float_restarts(&ranking, &views, th) {
            tracing::info!(battery = %id, soc = %views[id.index()].soc, "float to bulk restart");
            self.charger.set_phase(id, ChargingPhase::Bulk);
            views[id.index()].phase = ChargingPhase::Bulk;
            snap.phases[id.index()] = ChargingPhase::Bulk;
        }

        let preserved = preserved_battery(&self.records, self.cfg.strategy);
        let next = allocate(
            &self.alloc,
            &AllocationInput {
                ranking: &ranking,
                views: &views,
                battery_voltage: &snap.battery_voltage,
                panel_voltage: snap.panel_voltage,
                thresholds: th,
                strategy: self.cfg.strategy,
                preserved,
            },
        );
        if next.under_charge != self.alloc.under_charge || next.under_load != self.alloc.under_load {
            tracing::info!(
                charge = ?next.under_charge,
                load = ?next.under_load,
                charger_off = next.charger_off,
                "allocation changed"
            );
        }
        tracing::debug!(decision_status = %next.decision, ?preserved, "allocation decided");
        self.alloc = next;

        update_op_states(&mut self.records, &self.alloc, &snap, self.cycles_per_hour);

        let switches = if self.auto_track {
            let planned = plan_switches(&self.alloc, &self.records, snap.temperature, th);
            self.hw
                .apply_config(planned)
                .map_err(|e| hw_report(&e))
                .wrap_err("apply switch plan")?;
            self.charger.set_preferred(self.alloc.under_charge);
            planned
        } else {
            self.hw.switch_config()
        };

        resync_idle(&mut self.records, &snap, th, self.cycles_per_hour);

        report_cycle(
            &mut *self.reporter,
            &self.records,
            &snap,
            switches,
            &self.alloc,
            self.auto_track,
        );
        self.link.board().publish(&self.records, &self.alloc);
        self.link.board().count_cycle();
        Ok(CycleStatus::Tracked(self.alloc))
    }

    fn apply_requests(&mut self) {
        let requests: Vec<Request> = self.link.drain().collect();
        let touched = requests
            .iter()
            .any(|r| !matches!(r, Request::Calibrate | Request::SetAutoTrack(_)));
        for req in requests {
            tracing::debug!(?req, "request");
            match req {
                Request::Calibrate => self.pending_calibration = true,
                Request::SetAutoTrack(on) => {
                    self.auto_track = on;
                    self.link.board().set_auto_track(on);
                }
                Request::SetMissing(id, missing) => {
                    if let Some(rec) = self.records.get_mut(id.index()) {
                        rec.set_missing(missing);
                        if missing {
                            rec.set_soc(Soc::EMPTY);
                        }
                        tracing::info!(battery = %id, missing, "missing flag set");
                    }
                }
                Request::ForceSoc(id, soc) => {
                    if let Some(rec) = self.records.get_mut(id.index()) {
                        rec.set_soc(soc);
                    }
                }
                Request::ResetSoc(id) => {
                    if let Some(rec) = self.records.get_mut(id.index()) {
                        rec.reset_full();
                        tracing::info!(battery = %id, fill = ?rec.fill, "soc reset to full");
                    }
                }
            }
        }
        // Readers see request effects even if this cycle aborts on hardware.
        if touched {
            self.link.board().publish(&self.records, &self.alloc);
        }
    }

    /// Run a full calibration now. On a hardware error the run is abandoned:
    /// the previous offsets stay active and the switches are restored on a
    /// best-effort basis.
    pub fn calibrate(&mut self) -> Result<CalibrationReport> {
        tracing::info!(batteries = self.records.len(), "calibration started");
        self.calibration = CalibrationState::Running;
        self.link.board().set_calibrating(true);
        report_control(&mut *self.reporter, self.auto_track, true);
        let saved = self.hw.switch_config();

        let result = self.run_calibration(saved);

        if let Err(e) = &result {
            tracing::warn!(error = %e, "calibration abandoned");
            if let Err(restore) = self.hw.apply_config(saved) {
                tracing::warn!(error = %restore, "could not restore switches after calibration");
            }
        }
        self.calibration = CalibrationState::Idle;
        self.link.board().set_calibrating(false);
        result
    }

    fn run_calibration(&mut self, saved: SwitchConfig) -> Result<CalibrationReport> {
        let layout = self.offsets.layout();
        let batteries = self.records.len();
        let plan = test_plan(batteries);
        let delay = Duration::from_millis(self.cfg.timing.calibration_delay_ms);
        let mut session = CalibrationSession::new(layout.count(), plan.len());
        let mut missing = Vec::new();

        for (test, config) in plan.iter().enumerate() {
            self.hw
                .apply_config(*config)
                .map_err(|e| hw_report(&e))
                .wrap_err_with(|| format!("calibration test {test}"))?;
            self.settle(delay);

            let indicators = self.hw.indicators().map_err(|e| hw_report(&e))?;
            for id in missing_from_indicators(indicators, batteries) {
                if let Some(rec) = self.records.get_mut(id.index()) {
                    if !rec.is_missing() {
                        tracing::warn!(battery = %id, test, "battery missing");
                        rec.set_missing(true);
                        rec.set_soc(Soc::EMPTY);
                        missing.push(id);
                    }
                }
            }
            self.link.liveness().pet();

            let samples = (0..layout.count())
                .map(|iface| self.hw.current(iface))
                .collect::<HwResult<Vec<i16>>>()
                .map_err(|e| hw_report(&e))?;
            tracing::trace!(test, ?samples, "calibration samples");
            session.record(samples);
            report_calibration_test(&mut *self.reporter, test);
        }

        self.calibration = CalibrationState::Finalizing;
        let offsets = session.derive_offsets();
        let present: Vec<bool> = self.records.iter().map(|r| !r.is_missing()).collect();
        let quiescent = session.quiescent_current(&offsets, &present);

        self.hw
            .apply_config(saved)
            .map_err(|e| hw_report(&e))
            .wrap_err("restore switches after calibration")?;
        report_calibration_done(
            &mut *self.reporter,
            quiescent.unwrap_or(QUIESCENT_FLOOR),
            session.tests_recorded(),
            saved,
        );

        let temperature = self.hw.temperature().map_err(|e| hw_report(&e))?;
        for rec in &mut self.records {
            if !rec.is_missing() {
                let voltage = self.hw.battery_voltage(rec.id()).map_err(|e| hw_report(&e))?;
                rec.resync_from_ocv(voltage, temperature);
            }
            rec.isolation_time = 0;
            rec.current_steady = 0;
            rec.op = OpState::Isolated;
        }
        self.alloc.clear_targets();

        self.offsets = CurrentOffsets::from_values(layout, offsets.clone()).ok_or_else(|| {
            eyre::Report::new(BmsError::State("offset count does not match layout".into()))
        })?;
        if let Some(store) = self.store.as_mut() {
            if let Err(e) = store.persist(&offsets) {
                tracing::warn!(error = %e, "could not persist current offsets");
            }
        }
        self.link.board().publish(&self.records, &self.alloc);

        tracing::info!(?offsets, ?quiescent, ?missing, "calibration finished");
        Ok(CalibrationReport {
            offsets,
            quiescent,
            missing,
            restored: saved,
        })
    }

    /// Sleep for `total`, petting liveness at least once per watchdog period
    /// so long settling delays never look like a hang.
    fn settle(&self, total: Duration) {
        let chunk = Duration::from_millis(self.cfg.timing.watchdog_ms.max(1));
        let mut left = total;
        while !left.is_zero() {
            let step = left.min(chunk);
            self.clock.sleep(step);
            self.link.liveness().pet();
            left -= step;
        }
    }

    /// Control loop: settle, initialize, then one `step()` per monitor period
    /// until `stop` is raised. Cycle errors are logged and the loop goes on.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        self.settle(Duration::from_millis(self.cfg.timing.startup_delay_ms));
        self.initialize()?;
        let period = Duration::from_millis(self.cfg.timing.monitor_ms);
        while !stop.load(Ordering::Relaxed) {
            if let Err(e) = self.step() {
                tracing::warn!(error = %e, "control cycle aborted");
            }
            self.link.liveness().pet();
            self.clock.sleep(period);
        }
        tracing::debug!("engine loop stopped");
        Ok(())
    }
}

pub(crate) fn new_engine(parts: crate::builder::Parts) -> Engine {
    let crate::builder::Parts {
        hw,
        charger,
        reporter,
        store,
        clock,
        link,
        cfg,
        offsets,
    } = parts;
    let records = cfg
        .batteries
        .iter()
        .enumerate()
        .map(|(i, b)| BatteryRecord::new(BatteryId::new(i as u8), b))
        .collect();
    let cycles_per_hour = cycles_per_hour(cfg.timing.monitor_ms);
    let auto_track = cfg.auto_track;
    Engine {
        hw,
        charger,
        reporter,
        store,
        clock,
        link,
        cfg,
        records,
        alloc: AllocationState::default(),
        offsets,
        calibration: CalibrationState::Idle,
        auto_track,
        pending_calibration: false,
        cycles_per_hour,
    }
}
