//! Type-state builder for `Engine`.
//!
//! The builder enforces at compile time that hardware and charger are provided
//! before `build()` is available. `try_build()` is always available for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use bms_traits::clock::{Clock, MonotonicClock};
use bms_traits::{ChargerPhases, InterfaceLayout, OffsetStore, Reporter};

use crate::config::EngineCfg;
use crate::engine::{Engine, Hardware, new_engine};
use crate::error::{BuildError, Result};
use crate::offsets::CurrentOffsets;
use crate::report::TracingReporter;
use crate::shared::EngineLink;

// Type-state markers for the builder
pub struct Missing;
pub struct Set;

/// Validated pieces handed to the engine constructor.
pub(crate) struct Parts {
    pub hw: Box<dyn Hardware + Send>,
    pub charger: Box<dyn ChargerPhases + Send>,
    pub reporter: Box<dyn Reporter + Send>,
    pub store: Option<Box<dyn OffsetStore + Send>>,
    pub clock: Arc<dyn Clock + Send + Sync>,
    pub link: EngineLink,
    pub cfg: EngineCfg,
    pub offsets: CurrentOffsets,
}

/// Builder for `Engine`. All fields are validated on `build()`.
pub struct EngineBuilder<H, C> {
    hw: Option<Box<dyn Hardware + Send>>,
    charger: Option<Box<dyn ChargerPhases + Send>>,
    cfg: Option<EngineCfg>,
    reporter: Option<Box<dyn Reporter + Send>>,
    store: Option<Box<dyn OffsetStore + Send>>,
    offsets: Option<Vec<i16>>,
    // Optional clock for tests
    clock: Option<Box<dyn Clock + Send + Sync>>,
    link: Option<EngineLink>,
    _h: PhantomData<H>,
    _c: PhantomData<C>,
}

impl Default for EngineBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            hw: None,
            charger: None,
            cfg: None,
            reporter: None,
            store: None,
            offsets: None,
            clock: None,
            link: None,
            _h: PhantomData,
            _c: PhantomData,
        }
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

impl<H, C> EngineBuilder<H, C> {
    /// Fallible build available in any type-state; returns detailed BuildError for missing pieces.
    pub fn try_build(self) -> Result<Engine> {
        let EngineBuilder {
            hw,
            charger,
            cfg,
            reporter,
            store,
            offsets,
            clock,
            link,
            _h: _,
            _c: _,
        } = self;

        let hw = hw.ok_or_else(|| eyre::Report::new(BuildError::MissingHardware))?;
        let charger = charger.ok_or_else(|| eyre::Report::new(BuildError::MissingCharger))?;
        let cfg = cfg.unwrap_or_default();

        let batteries = cfg.batteries.len();
        if batteries == 0 {
            return Err(invalid("at least one battery is required"));
        }
        if batteries > bms_config::MAX_BATTERIES {
            return Err(invalid("too many batteries"));
        }
        for b in &cfg.batteries {
            if b.capacity_ah == 0 {
                return Err(invalid("capacity_ah must be > 0"));
            }
            if b.capacity_ah > bms_config::MAX_CAPACITY_AH {
                return Err(invalid("capacity_ah too large for the charge counter"));
            }
        }
        if cfg.timing.monitor_ms == 0 {
            return Err(invalid("monitor_ms must be >= 1"));
        }
        if cfg.timing.watchdog_ms == 0 {
            return Err(invalid("watchdog_ms must be >= 1"));
        }

        let layout = InterfaceLayout::new(batteries);
        let offsets = match offsets {
            Some(v) => CurrentOffsets::from_values(layout, v)
                .ok_or_else(|| invalid("offset count must match the interface count"))?,
            None => CurrentOffsets::zeroed(layout),
        };

        let link = link.unwrap_or_else(|| EngineLink::new(batteries));
        if link.batteries() != batteries {
            return Err(invalid("engine link sized for a different battery count"));
        }

        let clock: Arc<dyn Clock + Send + Sync> = match clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };
        let reporter = reporter.unwrap_or_else(|| Box::new(TracingReporter));

        Ok(new_engine(Parts {
            hw,
            charger,
            reporter,
            store,
            clock,
            link,
            cfg,
            offsets,
        }))
    }
}

/// Chainable setters that do not affect type-state
impl<H, C> EngineBuilder<H, C> {
    pub fn with_config(mut self, cfg: EngineCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }
    /// Defaults to `TracingReporter`.
    pub fn with_reporter(mut self, reporter: impl Reporter + Send + 'static) -> Self {
        self.reporter = Some(Box::new(reporter));
        self
    }
    /// Where calibration writes the offsets it derives. Without a store the
    /// offsets only live as long as the engine.
    pub fn with_offset_store(mut self, store: impl OffsetStore + Send + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }
    /// Offsets persisted by an earlier calibration, one per interface.
    pub fn with_offsets(mut self, offsets: Vec<i16>) -> Self {
        self.offsets = Some(offsets);
        self
    }
    /// Provide a custom clock implementation; defaults to MonotonicClock when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
    /// Share a status board and request queue that outlive this engine.
    pub fn with_link(mut self, link: EngineLink) -> Self {
        self.link = Some(link);
        self
    }
}

// Setters that advance type-state when providing mandatory components
impl<C> EngineBuilder<Missing, C> {
    pub fn with_hardware(self, hw: impl Hardware + Send + 'static) -> EngineBuilder<Set, C> {
        EngineBuilder {
            hw: Some(Box::new(hw)),
            charger: self.charger,
            cfg: self.cfg,
            reporter: self.reporter,
            store: self.store,
            offsets: self.offsets,
            clock: self.clock,
            link: self.link,
            _h: PhantomData,
            _c: PhantomData,
        }
    }
}

impl<H> EngineBuilder<H, Missing> {
    pub fn with_charger(
        self,
        charger: impl ChargerPhases + Send + 'static,
    ) -> EngineBuilder<H, Set> {
        EngineBuilder {
            hw: self.hw,
            charger: Some(Box::new(charger)),
            cfg: self.cfg,
            reporter: self.reporter,
            store: self.store,
            offsets: self.offsets,
            clock: self.clock,
            link: self.link,
            _h: PhantomData,
            _c: PhantomData,
        }
    }
}

impl EngineBuilder<Set, Set> {
    /// Validate and build the Engine. Only available when hardware and charger are set.
    pub fn build(self) -> Result<Engine> {
        self.try_build()
    }
}
