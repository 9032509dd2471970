//! Battery ranking by SoC, missing batteries demoted to the tail.

use std::cmp::Reverse;

use bms_traits::BatteryId;

use crate::battery::BatteryRecord;

/// Battery order for one cycle, highest SoC first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranking {
    order: Vec<BatteryId>,
    present: usize,
}

impl Ranking {
    /// Stable descending sort by SoC, then a second stable pass that moves
    /// every Missing battery behind the present ones. Ties keep index order.
    pub fn new(records: &[BatteryRecord]) -> Self {
        let mut order: Vec<BatteryId> = records.iter().map(BatteryRecord::id).collect();
        order.sort_by_key(|id| Reverse(records[id.index()].soc()));
        order.sort_by_key(|id| records[id.index()].is_missing());
        let present = records.iter().filter(|r| !r.is_missing()).count();
        Self { order, present }
    }

    /// Full order including missing batteries.
    pub fn all(&self) -> &[BatteryId] {
        &self.order
    }

    /// Present batteries only, highest SoC first.
    pub fn present(&self) -> &[BatteryId] {
        &self.order[..self.present]
    }

    pub fn present_count(&self) -> usize {
        self.present
    }

    pub fn highest(&self) -> Option<BatteryId> {
        self.present().first().copied()
    }

    pub fn lowest(&self) -> Option<BatteryId> {
        self.present().last().copied()
    }
}
