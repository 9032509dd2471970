//! Cycle-count helpers shared by the tracker and the watchdog.

/// Number of milliseconds in one hour.
pub const MILLIS_PER_HOUR: u64 = 3_600_000;

/// Control cycles per hour for a given monitor period.
/// - Clamps `monitor_ms` to at least 1 to avoid division by zero.
/// - Ensures result is at least 1 cycle.
#[inline]
pub fn cycles_per_hour(monitor_ms: u64) -> u32 {
    let n = (MILLIS_PER_HOUR / monitor_ms.max(1)).max(1);
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Watchdog ticks allowed between liveness pets before the engine is restarted:
/// ten control periods expressed in watchdog periods.
#[inline]
pub fn watchdog_bound(monitor_ms: u64, watchdog_ms: u64) -> u32 {
    let n = (10 * monitor_ms.max(1) / watchdog_ms.max(1)).max(1);
    u32::try_from(n).unwrap_or(u32::MAX)
}
