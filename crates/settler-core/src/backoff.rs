//! Exponential backoff for in-worker retries (spec §4.6, §9).
//!
//! Parameters are fixed by the spec: 100ms base, factor 2, at most 2
//! additional attempts (3 total). Not configurable — the spec gives
//! exact numbers, not a tunable policy.

use std::time::Duration;

pub const BASE_DELAY: Duration = Duration::from_millis(100);
pub const MAX_ADDITIONAL_ATTEMPTS: u32 = 2;

/// Delay before retry attempt `attempt` (0-indexed: the *first* retry,
/// i.e. the second overall attempt, is `attempt = 0`).
pub fn retry_delay(attempt: u32) -> Duration {
    BASE_DELAY * 2u32.pow(attempt)
}
