//! Reconnect backoff policy.
//!
//! Reconnection itself belongs to the transport. This module only computes
//! the schedule a transport implementation should follow: exponential growth
//! from a minimum delay, capped at a maximum, with random jitter so that many
//! clients dropped by the same server restart do not reconnect in lockstep.

use std::time::Duration;

/// Upper bound on jitter as a fraction of the base delay (1/JITTER_DIVISOR).
const JITTER_DIVISOR: u64 = 5;

/// Reconnect schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Whether the transport should reconnect at all.
    pub enabled: bool,
    /// Delay before the first attempt.
    pub min_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
    /// Attempts before giving up (0 = unbounded).
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            min_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 0,
        }
    }
}

impl ReconnectPolicy {
    /// Whether another attempt is allowed. `attempt` is 1-based.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.enabled && attempt > 0 && (self.max_attempts == 0 || attempt <= self.max_attempts)
    }

    /// Delay before the given attempt (1-based), or `None` once exhausted.
    ///
    /// Formula: min(max_delay, min_delay * 2^(attempt-1) + jitter)
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if !self.should_retry(attempt) {
            return None;
        }

        let min_ms = duration_ms(self.min_delay);
        let max_ms = duration_ms(self.max_delay).max(min_ms);

        let shift = (attempt - 1).min(32);
        let base_ms = min_ms.saturating_mul(1u64 << shift).min(max_ms);
        let jitter_ms = random_jitter_ms(base_ms / JITTER_DIVISOR);

        Some(Duration::from_millis(
            base_ms.saturating_add(jitter_ms).min(max_ms),
        ))
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Random jitter in `0..=bound` milliseconds.
///
/// Falls back to no jitter if the OS random source is unavailable.
fn random_jitter_ms(bound: u64) -> u64 {
    if bound == 0 {
        return 0;
    }
    let mut bytes = [0u8; 8];
    if getrandom::getrandom(&mut bytes).is_err() {
        return 0;
    }
    u64::from_le_bytes(bytes) % (bound + 1)
}
