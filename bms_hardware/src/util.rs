use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Wait until the provided `busy` predicate becomes false, or a timeout
/// expires. Sleeps in small intervals to avoid CPU spinning.
pub fn wait_while_with_timeout(
    mut busy: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while busy() {
        if Instant::now() >= deadline {
            return Err(HwError::Timeout);
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}
