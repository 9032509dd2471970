//! Outcome of one engine step.

use crate::allocation::AllocationState;
use crate::calibration::CalibrationReport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStatus {
    /// A normal control cycle ran; carries this cycle's allocation.
    Tracked(AllocationState),
    /// The step was taken up by a calibration run.
    Calibrated(CalibrationReport),
}

impl CycleStatus {
    pub fn allocation(&self) -> Option<&AllocationState> {
        match self {
            Self::Tracked(a) => Some(a),
            Self::Calibrated(_) => None,
        }
    }
}
