//! Transport layer.
//!
//! A transport carries encoded frames between the client and the server.
//! Two implementations exist:
//!
//! | Kind | Type | Role |
//! |------|------|------|
//! | [`TransportKind::WebSocket`] | [`WebSocketTransport`] | Primary, low latency, full duplex |
//! | [`TransportKind::LongPoll`] | [`LongPollTransport`] | Fallback, HTTP polling |
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   open(kind, sink)   ┌─────────────────────┐
//! │  Session controller  │─────────────────────►│  TransportFactory   │
//! │                      │                      └──────────┬──────────┘
//! │                      │  send / close                   │ spawns
//! │                      │─────────────────────►┌──────────▼──────────┐
//! │                      │                      │  Transport I/O task │
//! │                      │◄─────────────────────│                     │
//! └──────────────────────┘  (AttemptId, Event)  └─────────────────────┘
//! ```
//!
//! Transports never reconnect on their own and never decide anything: they
//! report [`TransportEvent`]s, tagged with the attempt that created them,
//! and the controller reacts. Per attempt the event order is
//! `Open → Message* → Close`, or a single `Error` in place of `Open`.
//! A transport closed locally through [`Transport::close`] reports nothing
//! further.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `endpoint` | Per-transport URL construction |
//! | `long_poll` | HTTP long-poll transport |
//! | `websocket` | WebSocket transport |

// ============================================================================
// Submodules
// ============================================================================

/// Endpoint URL construction.
pub mod endpoint;

/// HTTP long-poll transport.
pub mod long_poll;

/// WebSocket transport.
pub mod websocket;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::identifiers::AttemptId;
use crate::protocol::CloseCode;

// ============================================================================
// Re-exports
// ============================================================================

pub use endpoint::Endpoint;
pub use long_poll::LongPollTransport;
pub use websocket::WebSocketTransport;

// ============================================================================
// TransportKind
// ============================================================================

/// Which transport carries the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Primary transport.
    #[default]
    WebSocket,
    /// Fallback transport.
    LongPoll,
}

impl TransportKind {
    /// Returns `true` for the primary transport.
    #[inline]
    #[must_use]
    pub const fn is_primary(self) -> bool {
        matches!(self, Self::WebSocket)
    }

    /// Returns `true` for the fallback transport.
    #[inline]
    #[must_use]
    pub const fn is_fallback(self) -> bool {
        matches!(self, Self::LongPoll)
    }

    /// Returns the wire name (`"websocket"` / `"longpoll"`).
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::LongPoll => "longpoll",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TransportEvent
// ============================================================================

/// Lifecycle and data events reported by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The transport is ready to carry frames.
    Open,
    /// The transport could not be established.
    Error {
        /// Human-readable cause.
        reason: String,
    },
    /// An open transport was closed by the peer or the network.
    Close {
        /// Close status.
        code: CloseCode,
        /// Close reason, possibly empty.
        reason: String,
    },
    /// An encoded frame arrived.
    Message(String),
}

// ============================================================================
// EventSink
// ============================================================================

/// Channel half a transport uses to report events for one attempt.
#[derive(Debug, Clone)]
pub struct EventSink {
    attempt: AttemptId,
    tx: mpsc::UnboundedSender<(AttemptId, TransportEvent)>,
}

impl EventSink {
    /// Creates a sink for one attempt.
    #[inline]
    #[must_use]
    pub fn new(attempt: AttemptId, tx: mpsc::UnboundedSender<(AttemptId, TransportEvent)>) -> Self {
        Self { attempt, tx }
    }

    /// Returns the attempt this sink reports for.
    #[inline]
    #[must_use]
    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    /// Reports an event. Returns `false` if the controller is gone.
    #[inline]
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send((self.attempt, event)).is_ok()
    }
}

// ============================================================================
// Transport
// ============================================================================

/// A live transport instance.
///
/// Implementations run their I/O on spawned tasks; both methods return
/// immediately.
pub trait Transport: Send + Sync {
    /// Returns the kind of this transport.
    fn kind(&self) -> TransportKind;

    /// Queues an encoded frame for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed)
    /// if the I/O task has stopped.
    fn send(&self, frame: String) -> Result<()>;

    /// Closes the transport with a status code.
    ///
    /// No events are reported for this attempt afterwards.
    fn close(&self, code: CloseCode, reason: &str);
}

// ============================================================================
// TransportFactory
// ============================================================================

/// Creates transport instances for the controller.
pub trait TransportFactory: Send + Sync + 'static {
    /// Starts a connect attempt of the given kind.
    ///
    /// The outcome is reported through `sink`, never returned.
    fn open(&self, kind: TransportKind, endpoint: &Endpoint, sink: EventSink) -> Box<dyn Transport>;
}

// ============================================================================
// DefaultTransports
// ============================================================================

/// Factory for the built-in WebSocket and long-poll transports.
#[derive(Debug, Clone)]
pub struct DefaultTransports {
    http: reqwest::Client,
    long_poll_timeout: Duration,
}

impl DefaultTransports {
    /// Creates the factory.
    ///
    /// `long_poll_timeout` is the server hold time; HTTP requests are given
    /// a few extra seconds on top of it.
    #[must_use]
    pub fn new(long_poll_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            long_poll_timeout,
        }
    }

    /// Creates the factory with a caller-provided HTTP client.
    #[must_use]
    pub fn with_client(http: reqwest::Client, long_poll_timeout: Duration) -> Self {
        Self {
            http,
            long_poll_timeout,
        }
    }
}

impl TransportFactory for DefaultTransports {
    fn open(&self, kind: TransportKind, endpoint: &Endpoint, sink: EventSink) -> Box<dyn Transport> {
        match kind {
            TransportKind::WebSocket => {
                Box::new(WebSocketTransport::open(endpoint.websocket_url(), sink))
            }
            TransportKind::LongPoll => Box::new(LongPollTransport::open(
                self.http.clone(),
                endpoint.long_poll_url(),
                self.long_poll_timeout,
                sink,
            )),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_defaults_to_primary() {
        assert_eq!(TransportKind::default(), TransportKind::WebSocket);
        assert!(TransportKind::WebSocket.is_primary());
        assert!(TransportKind::LongPoll.is_fallback());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(TransportKind::WebSocket.to_string(), "websocket");
        assert_eq!(TransportKind::LongPoll.to_string(), "longpoll");
    }

    #[test]
    fn test_kind_serde() {
        let json = serde_json::to_string(&TransportKind::LongPoll).expect("serialize");
        assert_eq!(json, "\"longpoll\"");
    }

    #[tokio::test]
    async fn test_sink_tags_attempt() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(AttemptId::new(7), tx);

        assert!(sink.emit(TransportEvent::Open));

        let (attempt, event) = rx.recv().await.expect("event");
        assert_eq!(attempt, AttemptId::new(7));
        assert_eq!(event, TransportEvent::Open);
    }

    #[tokio::test]
    async fn test_sink_reports_dropped_controller() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(AttemptId::new(1), tx);
        drop(rx);

        assert!(!sink.emit(TransportEvent::Open));
    }
}
