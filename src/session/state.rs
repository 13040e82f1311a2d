//! Session state types.
//!
//! [`Session`] is the data the transition function works on. It is owned by
//! exactly one controller task; everything else observes it through
//! [`SessionSnapshot`]s and [`SessionEvent`]s.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::{Duration, Instant};

use crate::identifiers::AttemptId;
use crate::protocol::CloseCode;
use crate::transport::TransportKind;

// ============================================================================
// ConnectionState
// ============================================================================

/// Observable connection state.
///
/// ```text
/// Idle ──► Connecting(k) ──► Open(k) ──► Reconnecting(k) ──► Connecting(k)
///               │                               ▲
///               ├── capability failure ──► Connecting(LongPoll)
///               ├── transient failure ──────────┘
///               └── attempt cap reached ──► Disconnected
///
/// any ── disconnect / teardown ──► Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Nothing attempted yet.
    #[default]
    Idle,
    /// A transport attempt is in flight.
    Connecting(TransportKind),
    /// A transport is open.
    Open(TransportKind),
    /// Waiting for the reconnect timer.
    Reconnecting(TransportKind),
    /// Gave up after the attempt cap; only a manual connect leaves this state.
    Disconnected,
    /// Closed by the user, torn down, or left closed by an interceptor.
    Closed,
}

impl ConnectionState {
    /// Returns `true` if a transport is open.
    #[inline]
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open(_))
    }

    /// Returns `true` while an attempt is in flight or scheduled.
    #[inline]
    #[must_use]
    pub const fn is_connecting(self) -> bool {
        matches!(self, Self::Connecting(_) | Self::Reconnecting(_))
    }

    /// Returns `true` if no automatic attempts will follow.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Closed)
    }

    /// Returns the transport kind involved, if any.
    #[inline]
    #[must_use]
    pub const fn kind(self) -> Option<TransportKind> {
        match self {
            Self::Connecting(kind) | Self::Open(kind) | Self::Reconnecting(kind) => Some(kind),
            Self::Idle | Self::Disconnected | Self::Closed => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Connecting(kind) => write!(f, "connecting({kind})"),
            Self::Open(kind) => write!(f, "open({kind})"),
            Self::Reconnecting(kind) => write!(f, "reconnecting({kind})"),
            Self::Disconnected => f.write_str("disconnected"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

// ============================================================================
// TransportAttempt
// ============================================================================

/// Outcome of a transport attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Waiting for the transport to open or fail.
    Pending,
    /// The transport opened.
    Succeeded,
    /// The transport failed before opening.
    Failed,
}

/// One connect operation using one transport kind.
#[derive(Debug, Clone)]
pub struct TransportAttempt {
    /// Attempt identifier.
    pub id: AttemptId,
    /// Transport kind used.
    pub kind: TransportKind,
    /// When the attempt started.
    pub started_at: Instant,
    /// Current outcome.
    pub outcome: AttemptOutcome,
}

impl TransportAttempt {
    /// Starts a pending attempt.
    #[must_use]
    pub fn new(id: AttemptId, kind: TransportKind) -> Self {
        Self {
            id,
            kind,
            started_at: Instant::now(),
            outcome: AttemptOutcome::Pending,
        }
    }

    /// Time since the attempt started.
    #[inline]
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Marks the attempt as settled.
    #[inline]
    pub(super) fn settle(&mut self, outcome: AttemptOutcome) {
        self.outcome = outcome;
    }
}

// ============================================================================
// FailureClass
// ============================================================================

/// Classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The primary transport cannot be established on this network path.
    Capability,
    /// A drop after an open, or any failure already on the fallback.
    Transient,
    /// Never opened within the attempt cap.
    Fatal,
}

// ============================================================================
// SessionEvent
// ============================================================================

/// Lifecycle notifications published by the controller.
///
/// Events carry transport kinds and counters only.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A transport attempt started.
    Connecting {
        /// Transport kind.
        kind: TransportKind,
        /// Attempt identifier.
        attempt: AttemptId,
    },
    /// A transport opened.
    Open {
        /// Transport kind.
        kind: TransportKind,
    },
    /// A transport attempt failed.
    Error {
        /// Transport kind.
        kind: TransportKind,
        /// Failure cause.
        reason: String,
    },
    /// An open transport was closed by the peer or the network.
    Closed {
        /// Transport kind.
        kind: TransportKind,
        /// Close status.
        code: CloseCode,
    },
    /// The session switched to the fallback transport for good.
    FallbackEngaged {
        /// Kind that failed.
        from: TransportKind,
        /// Kind used from now on.
        to: TransportKind,
        /// Failed attempts so far.
        attempts: u32,
    },
    /// A reconnect was scheduled.
    Reconnecting {
        /// Transport kind.
        kind: TransportKind,
        /// Reconnect attempt number since the last open, starting at 1.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// The session never opened within the attempt cap.
    GaveUp {
        /// Last transport kind tried.
        kind: TransportKind,
        /// Failed attempts.
        attempts: u32,
    },
    /// The session was closed by the user or torn down.
    Disconnected {
        /// Close status sent to the server.
        code: CloseCode,
    },
}

// ============================================================================
// SessionSnapshot
// ============================================================================

/// Read-only view of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    /// Connection state.
    pub state: ConnectionState,
    /// Selected transport kind.
    pub kind: TransportKind,
    /// Reconnect attempts since the last open.
    pub reconnect_attempts: u32,
    /// A transport has opened at least once.
    pub ever_opened: bool,
    /// The fallback transport is engaged.
    pub fallback_engaged: bool,
}

// ============================================================================
// Session
// ============================================================================

/// One logical realtime connection, spanning many transport attempts.
#[derive(Debug, Clone)]
pub struct Session {
    pub(super) kind: TransportKind,
    pub(super) state: ConnectionState,
    pub(super) reconnect_attempts: u32,
    pub(super) ever_opened: bool,
    pub(super) unopened_failures: u32,
    pub(super) fallback_engaged: bool,
    /// Attempt waiting for open or failure.
    pub(super) attempt: Option<TransportAttempt>,
    /// Attempt whose transport is open.
    pub(super) active: Option<AttemptId>,
    pub(super) next_attempt: AttemptId,
    pub(super) torn_down: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Creates an idle session on the primary transport.
    #[must_use]
    pub fn new() -> Self {
        Self {
            kind: TransportKind::WebSocket,
            state: ConnectionState::Idle,
            reconnect_attempts: 0,
            ever_opened: false,
            unopened_failures: 0,
            fallback_engaged: false,
            attempt: None,
            active: None,
            next_attempt: AttemptId::new(1),
            torn_down: false,
        }
    }

    /// Selected transport kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnect attempts since the last open.
    #[inline]
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Returns `true` once any transport has opened.
    #[inline]
    #[must_use]
    pub fn ever_opened(&self) -> bool {
        self.ever_opened
    }

    /// Failed attempts while never opened.
    #[inline]
    #[must_use]
    pub fn unopened_failures(&self) -> u32 {
        self.unopened_failures
    }

    /// Returns `true` once the fallback transport is engaged.
    #[inline]
    #[must_use]
    pub fn fallback_engaged(&self) -> bool {
        self.fallback_engaged
    }

    /// The attempt in flight, if any.
    #[inline]
    #[must_use]
    pub fn pending_attempt(&self) -> Option<&TransportAttempt> {
        self.attempt.as_ref()
    }

    /// The attempt whose transport is open, if any.
    #[inline]
    #[must_use]
    pub fn active_attempt(&self) -> Option<AttemptId> {
        self.active
    }

    /// Returns `true` after teardown.
    #[inline]
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Returns `true` if a transport exists, pending or open.
    #[inline]
    #[must_use]
    pub fn has_transport(&self) -> bool {
        self.attempt.is_some() || self.active.is_some()
    }

    /// Returns a read-only view.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            kind: self.kind,
            reconnect_attempts: self.reconnect_attempts,
            ever_opened: self.ever_opened,
            fallback_engaged: self.fallback_engaged,
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
    fn test_new_session_is_idle_on_primary() {
        let session = Session::new();
        assert_eq!(session.state(), ConnectionState::Idle);
        assert_eq!(session.kind(), TransportKind::WebSocket);
        assert!(!session.ever_opened());
        assert!(!session.has_transport());
    }

    #[test]
    fn test_state_predicates() {
        let open = ConnectionState::Open(TransportKind::LongPoll);
        assert!(open.is_open());
        assert_eq!(open.kind(), Some(TransportKind::LongPoll));

        assert!(ConnectionState::Reconnecting(TransportKind::WebSocket).is_connecting());
        assert!(ConnectionState::Disconnected.is_terminal());
        assert!(ConnectionState::Closed.is_terminal());
        assert!(!ConnectionState::Idle.is_terminal());
        assert_eq!(ConnectionState::Closed.kind(), None);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(
            ConnectionState::Connecting(TransportKind::WebSocket).to_string(),
            "connecting(websocket)"
        );
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
    }

    #[test]
    fn test_attempt_starts_pending() {
        let mut attempt = TransportAttempt::new(AttemptId::new(3), TransportKind::WebSocket);
        assert_eq!(attempt.outcome, AttemptOutcome::Pending);

        attempt.settle(AttemptOutcome::Failed);
        assert_eq!(attempt.outcome, AttemptOutcome::Failed);
    }

    #[test]
    fn test_snapshot_mirrors_session() {
        let mut session = Session::new();
        session.kind = TransportKind::LongPoll;
        session.fallback_engaged = true;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.kind, TransportKind::LongPoll);
        assert!(snapshot.fallback_engaged);
        assert_eq!(snapshot.state, ConnectionState::Idle);
    }
}
