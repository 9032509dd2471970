//! Active current offsets and their persistent CSV store.

use std::path::PathBuf;

use bms_traits::{BatteryId, HwResult, InterfaceLayout, OffsetStore};

use crate::atomic::write_atomic;

/// Per-interface current offsets (sensor units), laid out batteries first,
/// then loads, then panels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentOffsets {
    layout: InterfaceLayout,
    values: Vec<i16>,
}

impl CurrentOffsets {
    pub fn zeroed(layout: InterfaceLayout) -> Self {
        Self {
            layout,
            values: vec![0; layout.count()],
        }
    }

    /// Wrap persisted values; `None` when the length does not match the layout.
    pub fn from_values(layout: InterfaceLayout, values: Vec<i16>) -> Option<Self> {
        (values.len() == layout.count()).then_some(Self { layout, values })
    }

    pub const fn layout(&self) -> InterfaceLayout {
        self.layout
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.values
    }

    pub fn get(&self, interface: usize) -> i16 {
        self.values.get(interface).copied().unwrap_or(0)
    }

    pub fn battery(&self, battery: BatteryId) -> i16 {
        self.get(self.layout.battery(battery))
    }

    pub fn load(&self, load: usize) -> i16 {
        self.get(self.layout.load(load))
    }

    pub fn panel(&self, panel: usize) -> i16 {
        self.get(self.layout.panel(panel))
    }

    /// Sensor reading with this interface's offset removed.
    pub fn correct(&self, interface: usize, raw: i16) -> i16 {
        raw.saturating_sub(self.get(interface))
    }
}

/// Persists offsets as `interface,offset` CSV, replacing the file atomically.
#[derive(Debug, Clone)]
pub struct CsvOffsetStore {
    path: PathBuf,
}

impl CsvOffsetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Read back the persisted offsets, if the file exists.
    pub fn load(&self) -> eyre::Result<Option<Vec<i16>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        bms_config::load_offsets_csv(&self.path).map(Some)
    }
}

impl OffsetStore for CsvOffsetStore {
    fn persist(&mut self, offsets: &[i16]) -> HwResult<()> {
        let bytes = bms_config::offsets_to_csv(offsets).map_err(|e| e.to_string())?;
        write_atomic(&self.path, &bytes)?;
        tracing::info!(path = %self.path.display(), count = offsets.len(), "current offsets saved");
        Ok(())
    }
}
