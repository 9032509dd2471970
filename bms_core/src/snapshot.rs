//! One cycle's worth of measurements, read up front so the decision logic
//! works on a consistent picture.

use bms_traits::{BatteryId, ChargerPhases, ChargingPhase, HwResult, NUM_LOADS, Sensors};

use crate::offsets::CurrentOffsets;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Terminal voltage per battery, volts ×256.
    pub battery_voltage: Vec<i32>,
    /// Offset-corrected battery current, sensor units.
    pub battery_current: Vec<i16>,
    /// Charge moved since the previous cycle, ampere-seconds ×256.
    pub charge_delta: Vec<i32>,
    pub phases: Vec<ChargingPhase>,
    /// Offset-corrected load currents and load voltages.
    pub load_current: [i16; NUM_LOADS],
    pub load_voltage: [i32; NUM_LOADS],
    pub panel_current: i16,
    pub panel_voltage: i32,
    /// Ambient temperature, °C ×256.
    pub temperature: i32,
    pub indicators: u32,
}

impl Snapshot {
    pub fn read<H, C>(hw: &mut H, charger: &C, offsets: &CurrentOffsets) -> HwResult<Self>
    where
        H: Sensors + ?Sized,
        C: ChargerPhases + ?Sized,
    {
        let layout = offsets.layout();
        let n = layout.batteries();
        let mut snap = Snapshot {
            battery_voltage: Vec::with_capacity(n),
            battery_current: Vec::with_capacity(n),
            charge_delta: Vec::with_capacity(n),
            phases: Vec::with_capacity(n),
            ..Snapshot::default()
        };
        for i in 0..n {
            let id = BatteryId::new(i as u8);
            snap.battery_voltage.push(hw.battery_voltage(id)?);
            let iface = layout.battery(id);
            snap.battery_current
                .push(offsets.correct(iface, hw.current(iface)?));
            snap.charge_delta.push(hw.accumulated_charge(id)?);
            snap.phases.push(charger.phase(id));
        }
        for load in 0..NUM_LOADS {
            let iface = layout.load(load);
            snap.load_current[load] = offsets.correct(iface, hw.current(iface)?);
            snap.load_voltage[load] = hw.load_voltage(load)?;
        }
        let iface = layout.panel(0);
        snap.panel_current = offsets.correct(iface, hw.current(iface)?);
        snap.panel_voltage = hw.panel_voltage()?;
        snap.temperature = hw.temperature()?;
        snap.indicators = hw.indicators()?;
        Ok(snap)
    }

    pub fn voltage(&self, id: BatteryId) -> i32 {
        self.battery_voltage.get(id.index()).copied().unwrap_or(0)
    }

    pub fn phase(&self, id: BatteryId) -> ChargingPhase {
        self.phases.get(id.index()).copied().unwrap_or_default()
    }
}
