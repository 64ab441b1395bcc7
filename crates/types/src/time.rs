//! Millisecond wall-clock helpers.
//!
//! Scheduling and envelope freshness both work in absolute unix milliseconds.

use std::time::{SystemTime, UNIX_EPOCH};

/// The current unix time in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
