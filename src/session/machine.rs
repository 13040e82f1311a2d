//! Transport selection and reconnection state machine.
//!
//! [`Selector::step`] is a pure transition function: it takes one [`Input`],
//! updates the [`Session`] and returns the [`Effect`]s the controller must
//! carry out. It performs no I/O and owns no timers, so every scenario can
//! be driven synchronously.
//!
//! # Transitions
//!
//! | Input | State | Result |
//! |-------|-------|--------|
//! | `Connect` | attempt pending or open | nothing |
//! | `Connect` | otherwise | `OpenTransport(kind)` |
//! | `TransportOpen` | pending attempt | `Open(kind)`, fallback disabled for good |
//! | `TransportError` / `TransportClose` | current attempt | interceptor chain |
//! | `ReconnectTimerFired` | `Reconnecting` | `OpenTransport(kind)` |
//! | `HeartbeatTimeout` | `Open` | close transport, interceptor chain |
//! | `Disconnect` | any | close transport, `Closed` |
//! | `Teardown` | any | close transport, `Closed`, later inputs ignored |
//!
//! Events tagged with an attempt that is neither pending nor open are stale
//! and ignored.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tracing::{debug, info, trace};

use crate::config::{MAX_ATTEMPTS_BEFORE_FALLBACK_SWAP, SocketConfig};
use crate::identifiers::AttemptId;
use crate::protocol::CloseCode;
use crate::transport::TransportKind;

use super::intercept::{ErrorContext, InterceptorChain};
use super::state::{
    AttemptOutcome, ConnectionState, FailureClass, Session, SessionEvent, SessionSnapshot,
    TransportAttempt,
};

// ============================================================================
// Input
// ============================================================================

/// Something that happened to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Connect requested.
    Connect,
    /// A transport opened.
    TransportOpen {
        /// Attempt that opened.
        attempt: AttemptId,
    },
    /// A transport could not be established.
    TransportError {
        /// Attempt that failed.
        attempt: AttemptId,
        /// Failure cause.
        reason: String,
    },
    /// A transport was closed by the peer or the network.
    TransportClose {
        /// Attempt that closed.
        attempt: AttemptId,
        /// Close status.
        code: CloseCode,
        /// Close reason.
        reason: String,
    },
    /// The reconnect delay elapsed.
    ReconnectTimerFired,
    /// The previous heartbeat went unanswered.
    HeartbeatTimeout,
    /// User-initiated disconnect.
    Disconnect {
        /// Close status sent to the server.
        code: CloseCode,
        /// Close reason.
        reason: String,
    },
    /// Page-unload analogue: close everything and ignore later inputs.
    Teardown,
}

// ============================================================================
// Effect
// ============================================================================

/// Work the controller must carry out after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start a transport attempt.
    OpenTransport {
        /// Attempt identifier to tag events with.
        attempt: AttemptId,
        /// Transport kind.
        kind: TransportKind,
    },
    /// Close the current transport.
    CloseTransport {
        /// Close status.
        code: CloseCode,
        /// Close reason.
        reason: String,
    },
    /// Arm the reconnect timer.
    ScheduleReconnect {
        /// Delay before [`Input::ReconnectTimerFired`].
        delay: Duration,
    },
    /// Disarm the reconnect timer.
    CancelReconnect,
    /// Publish an event.
    Emit(SessionEvent),
}

// ============================================================================
// Helpers
// ============================================================================

/// Starts an attempt on the session's current kind.
pub(super) fn start_attempt(session: &mut Session, effects: &mut Vec<Effect>) {
    debug_assert!(session.attempt.is_none(), "attempt already pending");

    let id = session.next_attempt;
    session.next_attempt = id.next();

    let kind = session.kind;
    session.attempt = Some(TransportAttempt::new(id, kind));
    session.state = ConnectionState::Connecting(kind);

    debug!(%kind, attempt = %id, "Starting transport attempt");

    effects.push(Effect::OpenTransport { attempt: id, kind });
    effects.push(Effect::Emit(SessionEvent::Connecting { kind, attempt: id }));
}

// ============================================================================
// Selector
// ============================================================================

/// Transport selector and reconnection controller.
#[derive(Debug)]
pub struct Selector {
    session: Session,
    config: SocketConfig,
    chain: InterceptorChain,
}

impl Selector {
    /// Creates a selector with the standard interceptor chain.
    #[must_use]
    pub fn new(config: SocketConfig) -> Self {
        Self::with_chain(config, InterceptorChain::standard())
    }

    /// Creates a selector with a custom interceptor chain.
    #[must_use]
    pub fn with_chain(config: SocketConfig, chain: InterceptorChain) -> Self {
        Self {
            session: Session::new(),
            config,
            chain,
        }
    }

    /// Returns the session.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    /// Returns a read-only view of the session.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Applies one input and returns the resulting effects.
    pub fn step(&mut self, input: Input) -> Vec<Effect> {
        let mut effects = Vec::new();

        if self.session.torn_down {
            trace!(?input, "Session torn down, input ignored");
            return effects;
        }

        match input {
            Input::Connect => self.connect(&mut effects),
            Input::TransportOpen { attempt } => self.transport_open(attempt, &mut effects),
            Input::TransportError { attempt, reason } => {
                self.transport_error(attempt, &reason, &mut effects);
            }
            Input::TransportClose {
                attempt,
                code,
                reason,
            } => self.transport_close(attempt, code, &reason, &mut effects),
            Input::ReconnectTimerFired => self.reconnect_timer_fired(&mut effects),
            Input::HeartbeatTimeout => self.heartbeat_timeout(&mut effects),
            Input::Disconnect { code, reason } => self.disconnect(code, reason, &mut effects),
            Input::Teardown => self.teardown(&mut effects),
        }

        effects
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    fn connect(&mut self, effects: &mut Vec<Effect>) {
        if self.session.attempt.is_some() || self.session.state.is_open() {
            trace!(state = %self.session.state, "Connect ignored");
            return;
        }

        match self.session.state {
            ConnectionState::Disconnected => {
                debug!("Manual connect after giving up");
                self.session.unopened_failures = 0;
            }
            ConnectionState::Reconnecting(_) => effects.push(Effect::CancelReconnect),
            _ => {}
        }

        start_attempt(&mut self.session, effects);
    }

    fn transport_open(&mut self, attempt: AttemptId, effects: &mut Vec<Effect>) {
        let Some(mut opened) = self
            .session
            .attempt
            .take_if(|pending| pending.id == attempt)
        else {
            trace!(%attempt, "Stale open ignored");
            return;
        };
        opened.settle(AttemptOutcome::Succeeded);

        let kind = opened.kind;
        self.session.active = Some(attempt);
        self.session.ever_opened = true;
        self.session.reconnect_attempts = 0;
        self.session.unopened_failures = 0;
        self.session.state = ConnectionState::Open(kind);

        info!(
            %kind,
            %attempt,
            elapsed_ms = opened.elapsed().as_millis() as u64,
            "Transport open"
        );

        effects.push(Effect::Emit(SessionEvent::Open { kind }));
    }

    fn transport_error(&mut self, attempt: AttemptId, reason: &str, effects: &mut Vec<Effect>) {
        let Some(kind) = self.settle_failed(attempt) else {
            trace!(%attempt, "Stale error ignored");
            return;
        };

        effects.push(Effect::Emit(SessionEvent::Error {
            kind,
            reason: reason.to_string(),
        }));
        self.handle_failure(reason, effects);
    }

    fn transport_close(
        &mut self,
        attempt: AttemptId,
        code: CloseCode,
        reason: &str,
        effects: &mut Vec<Effect>,
    ) {
        if self.session.attempt.as_ref().is_some_and(|a| a.id == attempt) {
            // Closed before it ever opened
            let reason = format!("closed before open ({code}) {reason}");
            self.transport_error(attempt, reason.trim_end(), effects);
            return;
        }

        if self.session.active != Some(attempt) {
            trace!(%attempt, "Stale close ignored");
            return;
        }

        let kind = self.session.kind;
        self.session.active = None;

        info!(%kind, %attempt, %code, "Transport closed");
        effects.push(Effect::Emit(SessionEvent::Closed { kind, code }));

        if !code.is_retryable() {
            self.session.state = ConnectionState::Closed;
            effects.push(Effect::Emit(SessionEvent::Disconnected { code }));
            return;
        }

        self.handle_failure(reason, effects);
    }

    fn reconnect_timer_fired(&mut self, effects: &mut Vec<Effect>) {
        if !matches!(self.session.state, ConnectionState::Reconnecting(_))
            || self.session.attempt.is_some()
        {
            trace!(state = %self.session.state, "Reconnect timer ignored");
            return;
        }

        start_attempt(&mut self.session, effects);
    }

    fn heartbeat_timeout(&mut self, effects: &mut Vec<Effect>) {
        if self.session.active.take().is_none() {
            return;
        }

        let kind = self.session.kind;
        debug!(%kind, "Heartbeat timed out");

        // 1006 is reserved for local reporting and never sent in a close frame
        effects.push(Effect::CloseTransport {
            code: CloseCode::NORMAL,
            reason: "heartbeat timeout".to_string(),
        });
        effects.push(Effect::Emit(SessionEvent::Closed {
            kind,
            code: CloseCode::ABNORMAL,
        }));
        self.handle_failure("heartbeat timeout", effects);
    }

    fn disconnect(&mut self, code: CloseCode, reason: String, effects: &mut Vec<Effect>) {
        effects.push(Effect::CancelReconnect);

        if self.session.has_transport() {
            effects.push(Effect::CloseTransport {
                code,
                reason: reason.clone(),
            });
        }
        self.session.attempt = None;
        self.session.active = None;

        info!(%code, %reason, "Disconnect requested");
        effects.push(Effect::Emit(SessionEvent::Disconnected { code }));

        if self.config.reconnect_after_user_disconnect && code.is_retryable() {
            let mut ctx = ErrorContext::new(
                &mut self.session,
                &self.config,
                effects,
                FailureClass::Transient,
                &reason,
            );
            ctx.schedule_reconnect();
        } else {
            self.session.state = ConnectionState::Closed;
        }
    }

    fn teardown(&mut self, effects: &mut Vec<Effect>) {
        if self.session.has_transport() {
            effects.push(Effect::CloseTransport {
                code: CloseCode::GOING_AWAY,
                reason: "teardown".to_string(),
            });
        }
        effects.push(Effect::CancelReconnect);

        self.session.attempt = None;
        self.session.active = None;
        self.session.state = ConnectionState::Closed;
        self.session.torn_down = true;

        info!("Session torn down");
        effects.push(Effect::Emit(SessionEvent::Disconnected {
            code: CloseCode::GOING_AWAY,
        }));
    }

    // ========================================================================
    // Failure Handling
    // ========================================================================

    /// Settles the pending or open attempt with the given id.
    ///
    /// Returns the kind of the settled attempt, or `None` if the id is stale.
    fn settle_failed(&mut self, attempt: AttemptId) -> Option<TransportKind> {
        if let Some(mut failed) = self.session.attempt.take_if(|pending| pending.id == attempt) {
            failed.settle(AttemptOutcome::Failed);
            debug!(
                kind = %failed.kind,
                %attempt,
                elapsed_ms = failed.elapsed().as_millis() as u64,
                "Transport attempt failed"
            );
            return Some(failed.kind);
        }

        if self.session.active == Some(attempt) {
            self.session.active = None;
            return Some(self.session.kind);
        }

        None
    }

    fn classify(&self) -> FailureClass {
        let session = &self.session;

        if session.ever_opened {
            return FailureClass::Transient;
        }

        if session.kind.is_primary()
            && self.config.fallback_enabled
            && !session.fallback_engaged
            && session.unopened_failures >= MAX_ATTEMPTS_BEFORE_FALLBACK_SWAP
        {
            return FailureClass::Capability;
        }

        if session.unopened_failures >= self.config.max_unopened_attempts {
            return FailureClass::Fatal;
        }

        FailureClass::Transient
    }

    fn handle_failure(&mut self, reason: &str, effects: &mut Vec<Effect>) {
        if !self.session.ever_opened {
            self.session.unopened_failures = self.session.unopened_failures.saturating_add(1);
        }

        // No transport is pending or open past this point. An interceptor
        // that handles the failure without acting leaves the session closed.
        self.session.state = ConnectionState::Closed;

        let class = self.classify();
        let mut ctx = ErrorContext::new(&mut self.session, &self.config, effects, class, reason);
        self.chain.run(&mut ctx);
    }
}

// ============================================================================
// Tests
// ============================================================================
