//! Capability traits between the battery management engine and the outside world.
//!
//! The engine never talks to hardware, the charger state machine, the
//! reporting transport or persistent storage directly; it goes through the
//! traits defined here. Errors crossing these boundaries are boxed so that
//! implementations stay free to use their own error types.

pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::fmt;

/// Boxed error returned across capability boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
pub type HwResult<T> = Result<T, BoxError>;

/// Number of switched load lines.
pub const NUM_LOADS: usize = 2;
/// Number of solar panels (charger inputs).
pub const NUM_PANELS: usize = 1;

/// Zero-based battery index. Displays one-based (`B1`, `B2`, ...) to match
/// the labels printed on the interface boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatteryId(u8);

impl BatteryId {
    #[inline]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Wire encoding used by reporting and switch registers: 0 = none, n = battery n.
    #[inline]
    pub fn encode(id: Option<Self>) -> u8 {
        id.map_or(0, |b| b.0 + 1)
    }

    #[inline]
    pub fn decode(raw: u8) -> Option<Self> {
        raw.checked_sub(1).map(Self)
    }
}

impl fmt::Display for BatteryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0 + 1)
    }
}

/// Switched output lines. Each line can be connected to at most one battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    /// Secondary (sheddable) loads.
    Load1,
    /// Priority loads.
    Load2,
    /// Solar panel through the charger.
    Panel,
}

impl Line {
    pub const ALL: [Line; 3] = [Line::Load1, Line::Load2, Line::Panel];

    /// Load line for a zero-based load index.
    #[inline]
    pub fn load(index: usize) -> Option<Self> {
        match index {
            0 => Some(Line::Load1),
            1 => Some(Line::Load2),
            _ => None,
        }
    }
}

/// Snapshot of which battery each line is connected to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwitchConfig {
    pub load1: Option<BatteryId>,
    pub load2: Option<BatteryId>,
    pub panel: Option<BatteryId>,
}

impl SwitchConfig {
    pub const OPEN: SwitchConfig = SwitchConfig {
        load1: None,
        load2: None,
        panel: None,
    };

    pub fn get(&self, line: Line) -> Option<BatteryId> {
        match line {
            Line::Load1 => self.load1,
            Line::Load2 => self.load2,
            Line::Panel => self.panel,
        }
    }

    pub fn set(&mut self, line: Line, battery: Option<BatteryId>) {
        match line {
            Line::Load1 => self.load1 = battery,
            Line::Load2 => self.load2 = battery,
            Line::Panel => self.panel = battery,
        }
    }

    /// Packed control bits: two bits per battery, `bit0` = load 1, `bit1` = load 2,
    /// plus the panel battery in the top nibble.
    pub fn bits(&self) -> u16 {
        let mut bits = 0u16;
        if let Some(b) = self.load1 {
            bits |= 1 << (2 * b.index());
        }
        if let Some(b) = self.load2 {
            bits |= 2 << (2 * b.index());
        }
        bits | (u16::from(BatteryId::encode(self.panel)) << 12)
    }
}

/// Charging phase as driven by the external charger state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChargingPhase {
    #[default]
    Bulk,
    Absorption,
    Float,
    Rest,
}

impl ChargingPhase {
    /// Two-bit code used in the reported battery state word.
    pub const fn code(self) -> u16 {
        match self {
            ChargingPhase::Bulk => 0,
            ChargingPhase::Absorption => 1,
            ChargingPhase::Float => 2,
            ChargingPhase::Rest => 3,
        }
    }
}

/// Index layout of the current/voltage interfaces: batteries first, then the
/// loads, then the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceLayout {
    batteries: usize,
}

impl InterfaceLayout {
    pub const fn new(batteries: usize) -> Self {
        Self { batteries }
    }

    pub const fn batteries(&self) -> usize {
        self.batteries
    }

    pub const fn count(&self) -> usize {
        self.batteries + NUM_LOADS + NUM_PANELS
    }

    pub const fn battery(&self, id: BatteryId) -> usize {
        id.index()
    }

    pub const fn load(&self, load: usize) -> usize {
        self.batteries + load
    }

    pub const fn panel(&self, panel: usize) -> usize {
        self.batteries + NUM_LOADS + panel
    }
}

/// Battery/load/panel switch matrix.
pub trait SwitchBank {
    /// Connect `line` to `battery`, or disconnect it when `battery` is `None`.
    fn set_switch(&mut self, battery: Option<BatteryId>, line: Line) -> HwResult<()>;

    /// Current switch configuration as last commanded.
    fn switch_config(&self) -> SwitchConfig;

    fn apply_config(&mut self, config: SwitchConfig) -> HwResult<()> {
        for line in Line::ALL {
            self.set_switch(config.get(line), line)?;
        }
        Ok(())
    }

    fn open_all(&mut self) -> HwResult<()> {
        self.apply_config(SwitchConfig::OPEN)
    }
}

/// Analogue and digital measurements. Voltages are volts ×256, temperature
/// is °C ×256, currents are raw sensor units (offsets not removed).
pub trait Sensors {
    /// Interface board indicator LEDs, two bits per battery.
    fn indicators(&mut self) -> HwResult<u32>;
    fn current(&mut self, interface: usize) -> HwResult<i16>;
    fn battery_voltage(&mut self, battery: BatteryId) -> HwResult<i32>;
    fn load_voltage(&mut self, load: usize) -> HwResult<i32>;
    fn panel_voltage(&mut self) -> HwResult<i32>;
    fn temperature(&mut self) -> HwResult<i32>;
    /// Charge moved into (positive) or out of the battery since the last call,
    /// ampere-seconds ×256.
    fn accumulated_charge(&mut self, battery: BatteryId) -> HwResult<i32>;
}

/// Read/write view of the external charger state machine.
pub trait ChargerPhases {
    fn phase(&self, battery: BatteryId) -> ChargingPhase;
    fn set_phase(&mut self, battery: BatteryId, phase: ChargingPhase);
    /// Battery the charger should keep using if tracking is switched off.
    fn set_preferred(&mut self, battery: Option<BatteryId>);
}

/// Outbound data records; the transport is not the engine's business.
pub trait Reporter {
    fn report(&mut self, id: &str, values: &[i32]);
}

/// Write path for derived current offsets.
pub trait OffsetStore {
    fn persist(&mut self, offsets: &[i16]) -> HwResult<()>;
}

impl<T: Reporter + ?Sized> Reporter for Box<T> {
    fn report(&mut self, id: &str, values: &[i32]) {
        (**self).report(id, values);
    }
}

impl<T: OffsetStore + ?Sized> OffsetStore for Box<T> {
    fn persist(&mut self, offsets: &[i16]) -> HwResult<()> {
        (**self).persist(offsets)
    }
}
