//! Session configuration.
//!
//! Controls reconnection timing, fallback behaviour, heartbeats and the
//! params sent with every connect.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use live_socket::SocketConfig;
//!
//! let config = SocketConfig::new()
//!     .with_reconnect_delays(Duration::from_millis(50), Duration::from_secs(10))
//!     .with_param("_csrf_token", "abc")
//!     .with_fallback(true);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::session::Backoff;

// ============================================================================
// Constants
// ============================================================================

/// Failed primary attempts before the fallback transport is engaged.
///
/// Fixed: the first capability failure swaps transports.
pub const MAX_ATTEMPTS_BEFORE_FALLBACK_SWAP: u32 = 1;

const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_millis(10);
const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_RECONNECT_JITTER: f64 = 0.2;
const DEFAULT_MAX_UNOPENED_ATTEMPTS: u32 = 10;
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_LONG_POLL_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SEND_BUFFER_LIMIT: usize = 100;

// ============================================================================
// SocketConfig
// ============================================================================

/// Live socket configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketConfig {
    /// Delay before the first reconnect attempt; doubles per attempt.
    pub reconnect_base_delay: Duration,

    /// Upper bound for the reconnect delay.
    pub reconnect_max_delay: Duration,

    /// Jitter as a fraction of the delay (`0.2` = ±20%).
    pub reconnect_jitter: f64,

    /// Failed attempts (both transports counted) after which a session
    /// that never opened stops retrying.
    pub max_unopened_attempts: u32,

    /// Engage the long-poll transport when the WebSocket never opens.
    pub fallback_enabled: bool,

    /// Reconnect after a user-initiated disconnect with a retryable code.
    pub reconnect_after_user_disconnect: bool,

    /// Heartbeat period while open, `None` disables heartbeats.
    pub heartbeat_interval: Option<Duration>,

    /// Server-side hold time of one long-poll request.
    pub long_poll_timeout: Duration,

    /// Time to wait for a reply to a pushed frame.
    pub push_timeout: Duration,

    /// Frames buffered while the session is not open.
    pub send_buffer_limit: usize,

    /// Query params sent with every connect (CSRF token, request id, ...).
    pub params: Vec<(String, String)>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl SocketConfig {
    /// Creates a configuration with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            reconnect_max_delay: DEFAULT_RECONNECT_MAX_DELAY,
            reconnect_jitter: DEFAULT_RECONNECT_JITTER,
            max_unopened_attempts: DEFAULT_MAX_UNOPENED_ATTEMPTS,
            fallback_enabled: true,
            reconnect_after_user_disconnect: false,
            heartbeat_interval: Some(DEFAULT_HEARTBEAT_INTERVAL),
            long_poll_timeout: DEFAULT_LONG_POLL_TIMEOUT,
            push_timeout: DEFAULT_PUSH_TIMEOUT,
            send_buffer_limit: DEFAULT_SEND_BUFFER_LIMIT,
            params: Vec::new(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SocketConfig {
    /// Sets base and maximum reconnect delays.
    #[inline]
    #[must_use]
    pub fn with_reconnect_delays(mut self, base: Duration, max: Duration) -> Self {
        self.reconnect_base_delay = base;
        self.reconnect_max_delay = max;
        self
    }

    /// Sets the jitter fraction.
    #[inline]
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.reconnect_jitter = jitter;
        self
    }

    /// Sets how many failed attempts a never-opened session makes.
    #[inline]
    #[must_use]
    pub fn with_max_unopened_attempts(mut self, attempts: u32) -> Self {
        self.max_unopened_attempts = attempts;
        self
    }

    /// Enables or disables the long-poll fallback.
    #[inline]
    #[must_use]
    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    /// Enables reconnecting after a user-initiated disconnect.
    #[inline]
    #[must_use]
    pub fn with_reconnect_after_user_disconnect(mut self, enabled: bool) -> Self {
        self.reconnect_after_user_disconnect = enabled;
        self
    }

    /// Sets the heartbeat period; `None` disables heartbeats.
    #[inline]
    #[must_use]
    pub fn with_heartbeat(mut self, interval: Option<Duration>) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the long-poll hold time.
    #[inline]
    #[must_use]
    pub fn with_long_poll_timeout(mut self, timeout: Duration) -> Self {
        self.long_poll_timeout = timeout;
        self
    }

    /// Sets the push reply timeout.
    #[inline]
    #[must_use]
    pub fn with_push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self
    }

    /// Sets the send buffer limit.
    #[inline]
    #[must_use]
    pub fn with_send_buffer_limit(mut self, limit: usize) -> Self {
        self.send_buffer_limit = limit;
        self
    }

    /// Adds a connect param.
    #[inline]
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

// ============================================================================
// Derived Values
// ============================================================================

impl SocketConfig {
    /// Returns the backoff schedule described by this configuration.
    #[inline]
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            self.reconnect_base_delay,
            self.reconnect_max_delay,
            self.reconnect_jitter,
        )
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if delays, jitter or limits are out of range.
    pub fn validate(&self) -> Result<()> {
        if self.reconnect_base_delay.is_zero() {
            return Err(Error::config("reconnect_base_delay must be greater than zero"));
        }

        if self.reconnect_max_delay < self.reconnect_base_delay {
            return Err(Error::config(format!(
                "reconnect_max_delay ({:?}) is below reconnect_base_delay ({:?})",
                self.reconnect_max_delay, self.reconnect_base_delay
            )));
        }

        if !(0.0..=1.0).contains(&self.reconnect_jitter) {
            return Err(Error::config(format!(
                "reconnect_jitter must be within 0.0..=1.0, got {}",
                self.reconnect_jitter
            )));
        }

        if self.max_unopened_attempts == 0 {
            return Err(Error::config("max_unopened_attempts must be at least 1"));
        }

        if self.heartbeat_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(Error::config("heartbeat_interval must be greater than zero"));
        }

        if self.send_buffer_limit == 0 {
            return Err(Error::config("send_buffer_limit must be at least 1"));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SocketConfig::new();
        assert_eq!(config.reconnect_base_delay, Duration::from_millis(10));
        assert_eq!(config.reconnect_max_delay, Duration::from_secs(5));
        assert!(config.fallback_enabled);
        assert!(!config.reconnect_after_user_disconnect);
        assert_eq!(config.heartbeat_interval, Some(Duration::from_secs(30)));
        assert!(config.params.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_matches_new() {
        assert_eq!(SocketConfig::default(), SocketConfig::new());
    }

    #[test]
    fn test_swap_threshold_is_fixed() {
        assert_eq!(MAX_ATTEMPTS_BEFORE_FALLBACK_SWAP, 1);
    }

    #[test]
    fn test_builder_methods() {
        let config = SocketConfig::new()
            .with_reconnect_delays(Duration::from_millis(100), Duration::from_secs(1))
            .with_jitter(0.0)
            .with_fallback(false)
            .with_heartbeat(None)
            .with_param("_csrf_token", "token")
            .with_param("_request_id", "req");

        assert_eq!(config.reconnect_base_delay, Duration::from_millis(100));
        assert_eq!(config.reconnect_jitter, 0.0);
        assert!(!config.fallback_enabled);
        assert_eq!(config.heartbeat_interval, None);
        assert_eq!(config.params.len(), 2);
        assert_eq!(config.params[0], ("_csrf_token".to_string(), "token".to_string()));
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let config = SocketConfig::new()
            .with_reconnect_delays(Duration::from_secs(2), Duration::from_secs(1));

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("reconnect_max_delay"));
    }

    #[test]
    fn test_validate_rejects_bad_jitter() {
        assert!(SocketConfig::new().with_jitter(1.5).validate().is_err());
        assert!(SocketConfig::new().with_jitter(-0.1).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        assert!(SocketConfig::new().with_max_unopened_attempts(0).validate().is_err());
        assert!(SocketConfig::new().with_send_buffer_limit(0).validate().is_err());
        assert!(
            SocketConfig::new()
                .with_heartbeat(Some(Duration::ZERO))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_sub_millisecond_base_delay_is_not_zero() {
        let config = SocketConfig::new()
            .with_jitter(0.0)
            .with_reconnect_delays(Duration::from_micros(500), Duration::from_secs(1));

        assert!(config.validate().is_ok());
        assert_eq!(config.backoff().delay(0), Duration::from_micros(500));
    }
}
