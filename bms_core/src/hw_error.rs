//! Maps `Box<dyn Error>` from trait boundaries to typed `BmsError`.
//!
//! The traits in `bms_traits` use `Box<dyn Error + Send + Sync>` so any backend
//! can plug in; this module converts those to our typed error enum, with an
//! optional feature-gated path for `bms_hardware::HwError` downcasting.

use crate::error::BmsError;

/// Map a trait-boundary error to a typed `BmsError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> BmsError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<bms_hardware::error::HwError>() {
            return match hw {
                bms_hardware::error::HwError::Timeout => BmsError::Timeout,
                bms_hardware::error::HwError::Io(io) => BmsError::Io(io.to_string()),
                other => BmsError::HardwareFault(other.to_string()),
            };
        }
    }

    if let Some(io) = e.downcast_ref::<std::io::Error>() {
        return BmsError::Io(io.to_string());
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        BmsError::Timeout
    } else {
        BmsError::Hardware(s)
    }
}

/// Convert a boxed trait error into an `eyre::Report` carrying a typed `BmsError`.
pub(crate) fn hw_report(e: &bms_traits::BoxError) -> eyre::Report {
    eyre::Report::new(map_hw_error(e.as_ref()))
}
