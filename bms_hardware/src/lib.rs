//! Simulated battery bank: switch matrix, sensors and charger phases.
//!
//! `SimulatedPlant` is cheap to clone; clones share one plant, so a test can
//! hand one clone to the engine as hardware, another as charger, and keep a
//! third to move voltages around or inject faults.

pub mod error;
pub mod util;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bms_traits::{
    BatteryId, ChargerPhases, ChargingPhase, HwResult, InterfaceLayout, Line, NUM_LOADS, Sensors,
    SwitchBank, SwitchConfig,
};

use crate::error::HwError;

/// 12.6 V, a rested full lead-acid battery.
const DEFAULT_VOLTAGE: i32 = 3226;
/// 25 °C.
const DEFAULT_TEMPERATURE: i32 = 25 * 256;

#[derive(Debug, Clone)]
struct PlantBattery {
    present: bool,
    voltage: i32,
    /// Charge reported per `accumulated_charge` call, ampere-seconds ×256.
    charge_rate: i32,
}

#[derive(Debug)]
struct PlantState {
    batteries: Vec<PlantBattery>,
    layout: InterfaceLayout,
    switches: SwitchConfig,
    sensor_offsets: Vec<i16>,
    load_demand: [i16; NUM_LOADS],
    load_voltage: [i32; NUM_LOADS],
    panel_current: i16,
    panel_voltage: i32,
    temperature: i32,
    phases: Vec<ChargingPhase>,
    preferred: Option<BatteryId>,
    hang: bool,
    hang_timeout: Duration,
    fail_reads: bool,
    fail_switches: bool,
}

impl PlantState {
    fn present(&self, battery: Option<BatteryId>) -> Option<BatteryId> {
        battery.filter(|b| self.batteries.get(b.index()).is_some_and(|p| p.present))
    }

    fn load_on(&self, load: usize) -> Option<BatteryId> {
        Line::load(load).and_then(|line| self.present(self.switches.get(line)))
    }

    /// Current through one interface with the sensor offset included.
    fn current(&self, interface: usize) -> i16 {
        let offset = self.sensor_offsets.get(interface).copied().unwrap_or(0);
        let n = self.layout.batteries();
        let flow = if interface < n {
            let id = BatteryId::new(interface as u8);
            let mut flow = 0i16;
            if self.present(Some(id)).is_some() {
                if self.switches.panel == Some(id) {
                    flow = flow.saturating_add(self.panel_current);
                }
                for load in 0..NUM_LOADS {
                    if self.load_on(load) == Some(id) {
                        flow = flow.saturating_sub(self.load_demand[load]);
                    }
                }
            }
            flow
        } else if interface < self.layout.panel(0) {
            let load = interface - n;
            if self.load_on(load).is_some() {
                self.load_demand[load]
            } else {
                0
            }
        } else if self.present(self.switches.panel).is_some() {
            self.panel_current
        } else {
            0
        };
        offset.saturating_add(flow)
    }

    /// Two indicator bits per battery: bit 2i lit while the panel feeds a
    /// present battery, bit 2i+1 dark only when a load is switched onto an
    /// absent battery.
    fn indicators(&self) -> u32 {
        let mut bits = 0u32;
        for (i, b) in self.batteries.iter().enumerate() {
            let id = Some(BatteryId::new(i as u8));
            let loaded = self.switches.load1 == id || self.switches.load2 == id;
            if b.present || !loaded {
                bits |= 1 << (2 * i + 1);
            }
            if b.present && self.switches.panel == id {
                bits |= 1 << (2 * i);
            }
        }
        bits
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedPlant {
    state: Arc<Mutex<PlantState>>,
}

impl SimulatedPlant {
    /// A plant with `batteries` present, rested batteries, no sun and no load.
    pub fn new(batteries: usize) -> Self {
        let layout = InterfaceLayout::new(batteries);
        Self {
            state: Arc::new(Mutex::new(PlantState {
                batteries: vec![
                    PlantBattery {
                        present: true,
                        voltage: DEFAULT_VOLTAGE,
                        charge_rate: 0,
                    };
                    batteries
                ],
                layout,
                switches: SwitchConfig::OPEN,
                sensor_offsets: vec![0; layout.count()],
                load_demand: [0; NUM_LOADS],
                load_voltage: [0; NUM_LOADS],
                panel_current: 0,
                panel_voltage: 0,
                temperature: DEFAULT_TEMPERATURE,
                phases: vec![ChargingPhase::Bulk; batteries],
                preferred: None,
                hang: false,
                hang_timeout: Duration::from_secs(30),
                fail_reads: false,
                fail_switches: false,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, PlantState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn battery_mut(&self, battery: BatteryId, f: impl FnOnce(&mut PlantBattery)) {
        if let Some(b) = self.state().batteries.get_mut(battery.index()) {
            f(b);
        }
    }

    pub fn set_present(&self, battery: BatteryId, present: bool) {
        self.battery_mut(battery, |b| b.present = present);
    }

    /// Terminal voltage, volts ×256.
    pub fn set_voltage(&self, battery: BatteryId, voltage: i32) {
        self.battery_mut(battery, |b| b.voltage = voltage);
    }

    pub fn set_voltages(&self, voltages: &[i32]) {
        for (i, &v) in voltages.iter().enumerate() {
            self.set_voltage(BatteryId::new(i as u8), v);
        }
    }

    pub fn set_charge_rate(&self, battery: BatteryId, rate: i32) {
        self.battery_mut(battery, |b| b.charge_rate = rate);
    }

    /// Sensor zero errors, one per interface.
    pub fn set_sensor_offsets(&self, offsets: &[i16]) {
        let mut s = self.state();
        for (slot, &o) in s.sensor_offsets.iter_mut().zip(offsets) {
            *slot = o;
        }
    }

    pub fn set_load(&self, load: usize, demand: i16, voltage: i32) {
        let mut s = self.state();
        if load < NUM_LOADS {
            s.load_demand[load] = demand;
            s.load_voltage[load] = voltage;
        }
    }

    pub fn set_panel(&self, current: i16, voltage: i32) {
        let mut s = self.state();
        s.panel_current = current;
        s.panel_voltage = voltage;
    }

    /// Ambient temperature, °C ×256.
    pub fn set_temperature(&self, temperature: i32) {
        self.state().temperature = temperature;
    }

    /// While set, every sensor read blocks (up to the hang timeout).
    pub fn set_hang(&self, hang: bool) {
        self.state().hang = hang;
    }

    pub fn set_hang_timeout(&self, timeout: Duration) {
        self.state().hang_timeout = timeout;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state().fail_reads = fail;
    }

    pub fn set_fail_switches(&self, fail: bool) {
        self.state().fail_switches = fail;
    }

    pub fn switches(&self) -> SwitchConfig {
        self.state().switches
    }

    pub fn preferred(&self) -> Option<BatteryId> {
        self.state().preferred
    }

    /// Wait out a simulated hang without holding the lock, then fail the read
    /// if reads are set to fail.
    fn ready(&self) -> HwResult<()> {
        let timeout = self.state().hang_timeout;
        util::wait_while_with_timeout(|| self.state().hang, timeout, Duration::from_millis(1))?;
        if self.state().fail_reads {
            return Err(HwError::Sensor("simulated read failure".into()).into());
        }
        Ok(())
    }
}

impl SwitchBank for SimulatedPlant {
    fn set_switch(&mut self, battery: Option<BatteryId>, line: Line) -> HwResult<()> {
        let mut s = self.state();
        if s.fail_switches {
            return Err(HwError::Switch(format!("simulated failure on {line:?}")).into());
        }
        if let Some(b) = battery {
            if b.index() >= s.batteries.len() {
                return Err(HwError::Switch(format!("no battery {b}")).into());
            }
        }
        if s.switches.get(line) != battery {
            tracing::debug!(?line, ?battery, "switch");
        }
        s.switches.set(line, battery);
        Ok(())
    }

    fn switch_config(&self) -> SwitchConfig {
        self.state().switches
    }
}

impl Sensors for SimulatedPlant {
    fn indicators(&mut self) -> HwResult<u32> {
        self.ready()?;
        Ok(self.state().indicators())
    }

    fn current(&mut self, interface: usize) -> HwResult<i16> {
        self.ready()?;
        let s = self.state();
        if interface >= s.layout.count() {
            return Err(HwError::Sensor(format!("no current interface {interface}")).into());
        }
        Ok(s.current(interface))
    }

    fn battery_voltage(&mut self, battery: BatteryId) -> HwResult<i32> {
        self.ready()?;
        let s = self.state();
        let b = s
            .batteries
            .get(battery.index())
            .ok_or_else(|| HwError::Sensor(format!("no battery {battery}")))?;
        Ok(if b.present { b.voltage } else { 0 })
    }

    fn load_voltage(&mut self, load: usize) -> HwResult<i32> {
        self.ready()?;
        let s = self.state();
        Ok(if s.load_on(load).is_some() {
            s.load_voltage.get(load).copied().unwrap_or(0)
        } else {
            0
        })
    }

    fn panel_voltage(&mut self) -> HwResult<i32> {
        self.ready()?;
        Ok(self.state().panel_voltage)
    }

    fn temperature(&mut self) -> HwResult<i32> {
        self.ready()?;
        Ok(self.state().temperature)
    }

    fn accumulated_charge(&mut self, battery: BatteryId) -> HwResult<i32> {
        self.ready()?;
        let s = self.state();
        Ok(s.batteries
            .get(battery.index())
            .filter(|b| b.present)
            .map_or(0, |b| b.charge_rate))
    }
}

impl ChargerPhases for SimulatedPlant {
    fn phase(&self, battery: BatteryId) -> ChargingPhase {
        self.state()
            .phases
            .get(battery.index())
            .copied()
            .unwrap_or_default()
    }

    fn set_phase(&mut self, battery: BatteryId, phase: ChargingPhase) {
        if let Some(p) = self.state().phases.get_mut(battery.index()) {
            *p = phase;
        }
    }

    fn set_preferred(&mut self, battery: Option<BatteryId>) {
        self.state().preferred = battery;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_current_flows_out_of_the_connected_battery() {
        let mut plant = SimulatedPlant::new(2);
        plant.set_load(1, 200, 3100);
        plant
            .set_switch(Some(BatteryId::new(1)), Line::Load2)
            .unwrap();
        assert_eq!(plant.current(0).unwrap(), 0);
        assert_eq!(plant.current(1).unwrap(), -200);
        // interfaces: 2 batteries, load1 = 2, load2 = 3, panel = 4
        assert_eq!(plant.current(3).unwrap(), 200);
        assert_eq!(plant.load_voltage(1).unwrap(), 3100);
    }

    #[test]
    fn charger_phase_round_trip() {
        let mut plant = SimulatedPlant::new(2);
        plant.set_phase(BatteryId::new(1), ChargingPhase::Float);
        assert_eq!(plant.phase(BatteryId::new(1)), ChargingPhase::Float);
        assert_eq!(plant.phase(BatteryId::new(0)), ChargingPhase::Bulk);
    }
}
