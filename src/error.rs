//! Error types for the live socket client.
//!
//! This module defines all error types used throughout the crate.
//!
//! Transport failures never surface here: they are contained by the session
//! controller and only observable as state transitions. What remains are
//! configuration mistakes and failures of caller-initiated operations
//! (pushes, joins, sends while the controller is gone).
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use live_socket::{LiveSocket, Result};
//!
//! async fn example(socket: &LiveSocket) -> Result<()> {
//!     let mut channel = socket.channel("lv:page", serde_json::json!({}));
//!     channel.join().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidEndpoint`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::SessionStopped`] |
//! | Messaging | [`Error::SendBufferFull`], [`Error::RequestTimeout`], [`Error::Rejected`], [`Error::Protocol`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::Http`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when socket configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Endpoint URL cannot be used by any transport.
    #[error("Invalid endpoint {url}: {message}")]
    InvalidEndpoint {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection closed before a pending request completed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The session controller is no longer running.
    ///
    /// Returned after [`LiveSocket::teardown`](crate::LiveSocket::teardown).
    #[error("Session stopped")]
    SessionStopped,

    // ========================================================================
    // Messaging Errors
    // ========================================================================
    /// Too many frames buffered while the session is not open.
    #[error("Send buffer full ({limit} frames)")]
    SendBufferFull {
        /// Configured buffer limit.
        limit: usize,
    },

    /// No reply received for a pushed message in time.
    #[error("Request {msg_ref} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The message ref that timed out.
        msg_ref: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Server replied with a non-ok status.
    #[error("Server rejected {event} on {topic}: {status}")]
    Rejected {
        /// Channel topic.
        topic: String,
        /// Event that was rejected.
        event: String,
        /// Reply status (usually `"error"`).
        status: String,
        /// Reply body.
        response: Value,
    },

    /// Protocol violation or unexpected frame.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP error from the long-poll transport.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Reply channel dropped.
    #[error("Reply channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid endpoint error.
    #[inline]
    pub fn invalid_endpoint(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(msg_ref: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            msg_ref: msg_ref.into(),
            timeout_ms,
        }
    }

    /// Creates a rejected-reply error.
    #[inline]
    pub fn rejected(
        topic: impl Into<String>,
        event: impl Into<String>,
        status: impl Into<String>,
        response: Value,
    ) -> Self {
        Self::Rejected {
            topic: topic.into(),
            event: event.into(),
            status: status.into(),
            response,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::SessionStopped
                | Self::WebSocket(_)
                | Self::Http(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry once the session reconnects.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RequestTimeout { .. } | Self::ConnectionClosed | Self::SendBufferFull { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("max delay below base delay");
        assert_eq!(
            err.to_string(),
            "Configuration error: max delay below base delay"
        );
    }

    #[test]
    fn test_rejected_display() {
        let err = Error::rejected("lv:1", "phx_join", "error", json!({"reason": "unauthorized"}));
        assert_eq!(err.to_string(), "Server rejected phx_join on lv:1: error");
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::request_timeout("7", 10_000);
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::SessionStopped.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::SendBufferFull { limit: 100 }.is_recoverable());
        assert!(Error::request_timeout("1", 5).is_recoverable());
        assert!(!Error::SessionStopped.is_recoverable());
        assert!(!Error::config("test").is_recoverable());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_from_url_error() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: Error = url_err.into();
        assert!(matches!(err, Error::Url(_)));
    }
}
