//! Test and helper collaborators for bms_core

use std::sync::{Arc, Mutex};

use bms_traits::{HwResult, OffsetStore, Reporter};

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&mut self, _id: &str, _values: &[i32]) {}
}

/// Keeps every record in memory; clones share the same log.
#[derive(Debug, Default, Clone)]
pub struct RecordingReporter {
    log: Arc<Mutex<Vec<(String, Vec<i32>)>>>,
}

impl RecordingReporter {
    pub fn records(&self) -> Vec<(String, Vec<i32>)> {
        self.log.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Values of every record with the given id, oldest first.
    pub fn values(&self, id: &str) -> Vec<Vec<i32>> {
        self.records()
            .into_iter()
            .filter(|(rid, _)| rid == id)
            .map(|(_, v)| v)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut g) = self.log.lock() {
            g.clear();
        }
    }
}

impl Reporter for RecordingReporter {
    fn report(&mut self, id: &str, values: &[i32]) {
        if let Ok(mut g) = self.log.lock() {
            g.push((id.to_owned(), values.to_vec()));
        }
    }
}

/// In-memory offset store; clones share the same history.
#[derive(Debug, Default, Clone)]
pub struct MemoryOffsetStore {
    saved: Arc<Mutex<Vec<Vec<i16>>>>,
    fail: bool,
}

impl MemoryOffsetStore {
    /// A store whose every write fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn saved(&self) -> Vec<Vec<i16>> {
        self.saved.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<Vec<i16>> {
        self.saved().pop()
    }
}

impl OffsetStore for MemoryOffsetStore {
    fn persist(&mut self, offsets: &[i16]) -> HwResult<()> {
        if self.fail {
            return Err("offset store unavailable".into());
        }
        self.saved
            .lock()
            .map_err(|_| "offset store poisoned")?
            .push(offsets.to_vec());
        Ok(())
    }
}
