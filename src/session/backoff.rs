//! Exponential reconnect backoff with jitter.
//!
//! ```text
//! Attempt    Delay (base=10ms, max=5s)    With jitter (±20%)
//! ──────────────────────────────────────────────────────────
//!    0              10ms                     8ms - 12ms
//!    1              20ms                    16ms - 24ms
//!    4             160ms                   128ms - 192ms
//!    9            5120ms → 5s             4s - 5s (capped)
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rand::Rng;

// ============================================================================
// Backoff
// ============================================================================

/// Reconnect delay schedule.
///
/// `delay = min(base * 2^attempt, max) ± jitter`, never above `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
}

impl Backoff {
    /// Creates a schedule.
    #[inline]
    #[must_use]
    pub const fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self { base, max, jitter }
    }

    /// Base delay.
    #[inline]
    #[must_use]
    pub const fn base(&self) -> Duration {
        self.base
    }

    /// Maximum delay.
    #[inline]
    #[must_use]
    pub const fn max(&self) -> Duration {
        self.max
    }

    /// Delay before the given zero-indexed reconnect attempt, without jitter.
    #[must_use]
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay before the given zero-indexed reconnect attempt.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.nominal_delay(attempt);
        let nanos = delay.as_nanos().min(u128::from(u64::MAX)) as u64;

        let jitter_range = (nanos as f64 * self.jitter) as u64;
        let jittered = if jitter_range > 0 {
            rand::thread_rng()
                .gen_range(nanos.saturating_sub(jitter_range)..=nanos.saturating_add(jitter_range))
        } else {
            nanos
        };

        Duration::from_nanos(jittered).min(self.max)
    }
}

// ============================================================================
// Tests
// ============================================================================
