//! Type-safe identifiers.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`AttemptId`] | One transport connect attempt within a session |
//! | [`RefCounter`] | Generator for wire-level message refs |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// AttemptId
// ============================================================================

/// Identifies a single transport attempt.
///
/// Allocated by the session in strictly increasing order. Transport events
/// are tagged with the attempt that produced them so that events from a
/// torn-down transport can be recognized and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(u64);

impl AttemptId {
    /// Creates an attempt ID from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the ID following this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// RefCounter
// ============================================================================

/// Monotonic generator for message refs.
///
/// Refs are decimal strings starting at `"1"`, as expected by the server.
/// Shared between the socket handle and the controller task.
#[derive(Debug, Default)]
pub struct RefCounter(AtomicU64);

impl RefCounter {
    /// Creates a counter whose first ref is `"1"`.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Returns the next ref.
    #[inline]
    pub fn next(&self) -> String {
        (self.0.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_id_ordering() {
        let first = AttemptId::new(1);
        assert!(first.next() > first);
        assert_eq!(first.next().as_u64(), 2);
    }

    #[test]
    fn test_attempt_id_display() {
        assert_eq!(AttemptId::new(3).to_string(), "#3");
    }

    #[test]
    fn test_ref_counter_starts_at_one() {
        let refs = RefCounter::new();
        assert_eq!(refs.next(), "1");
        assert_eq!(refs.next(), "2");
    }
}
