//! Timestamp utilities

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Source of wall-clock timestamps
///
/// Cache bookkeeping orders records by `last_played_at`, so components that
/// stamp records take a clock instead of calling `Utc::now()` directly.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Clock backed by the system time
pub fn system_clock() -> Clock {
    Arc::new(now)
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Convert fractional seconds to a duration
///
/// Negative or NaN input gives zero; values past the representable range
/// saturate.
pub fn secs_to_duration(secs: f64) -> std::time::Duration {
    if secs.is_finite() && secs > 0.0 {
        std::time::Duration::try_from_secs_f64(secs).unwrap_or(std::time::Duration::MAX)
    } else {
        std::time::Duration::ZERO
    }
}
