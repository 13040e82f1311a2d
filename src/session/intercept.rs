//! Transport failure interceptors.
//!
//! Every failed or dropped attempt is offered to an ordered chain of
//! [`ErrorInterceptor`]s. Each one either handles the failure or passes it
//! on. The standard chain:
//!
//! | Order | Interceptor | Handles |
//! |-------|-------------|---------|
//! | 1 | [`FallbackSwap`] | [`FailureClass::Capability`]: swap to long-poll, once |
//! | 2 | [`CapabilityCap`] | [`FailureClass::Fatal`]: stop retrying |
//! | 3 | [`ReconnectWithBackoff`] | Everything else: retry on the same kind |
//!
//! Custom interceptors are placed in front with
//! [`InterceptorChain::prepend`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tracing::{debug, info, warn};

use crate::config::SocketConfig;
use crate::protocol::CloseCode;
use crate::transport::TransportKind;

use super::machine::{Effect, start_attempt};
use super::state::{ConnectionState, FailureClass, Session, SessionEvent};

// ============================================================================
// Flow
// ============================================================================

/// Result of an interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// The failure was dealt with; stop the chain.
    Handled,
    /// Pass the failure to the next interceptor.
    Continue,
}

// ============================================================================
// ErrorContext
// ============================================================================

/// A failure being routed through the chain.
///
/// Interceptors read the session through it and act through its methods,
/// which update the session and queue effects.
pub struct ErrorContext<'a> {
    session: &'a mut Session,
    config: &'a SocketConfig,
    effects: &'a mut Vec<Effect>,
    class: FailureClass,
    reason: &'a str,
}

impl<'a> ErrorContext<'a> {
    pub(super) fn new(
        session: &'a mut Session,
        config: &'a SocketConfig,
        effects: &'a mut Vec<Effect>,
        class: FailureClass,
        reason: &'a str,
    ) -> Self {
        Self {
            session,
            config,
            effects,
            class,
            reason,
        }
    }

    /// The session, after the failed attempt was settled.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &Session {
        self.session
    }

    /// Active configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SocketConfig {
        self.config
    }

    /// Failure classification.
    #[inline]
    #[must_use]
    pub fn class(&self) -> FailureClass {
        self.class
    }

    /// Failure cause as reported by the transport.
    #[inline]
    #[must_use]
    pub fn reason(&self) -> &str {
        self.reason
    }

    /// Publishes an event.
    pub fn emit(&mut self, event: SessionEvent) {
        self.effects.push(Effect::Emit(event));
    }

    /// Switches to the long-poll transport for good and connects on it.
    ///
    /// The failed transport is closed with [`CloseCode::FALLBACK_SWAP`].
    /// Does nothing if the fallback is already engaged.
    pub fn engage_fallback(&mut self) {
        if self.session.fallback_engaged {
            return;
        }

        let from = self.session.kind;
        self.session.kind = TransportKind::LongPoll;
        self.session.fallback_engaged = true;

        info!(
            %from,
            attempts = self.session.unopened_failures,
            "Engaging long-poll fallback"
        );

        self.effects.push(Effect::CloseTransport {
            code: CloseCode::FALLBACK_SWAP,
            reason: "fallback".to_string(),
        });
        self.emit(SessionEvent::FallbackEngaged {
            from,
            to: TransportKind::LongPoll,
            attempts: self.session.unopened_failures,
        });

        start_attempt(self.session, self.effects);
    }

    /// Schedules a reconnect on the current kind with backoff.
    pub fn schedule_reconnect(&mut self) {
        let kind = self.session.kind;
        let delay = self.config.backoff().delay(self.session.reconnect_attempts);
        self.session.reconnect_attempts = self.session.reconnect_attempts.saturating_add(1);
        self.session.state = ConnectionState::Reconnecting(kind);

        debug!(
            %kind,
            attempt = self.session.reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "Reconnect scheduled"
        );

        self.effects.push(Effect::ScheduleReconnect { delay });
        self.emit(SessionEvent::Reconnecting {
            kind,
            attempt: self.session.reconnect_attempts,
            delay,
        });
    }

    /// Stops automatic attempts; the session becomes
    /// [`ConnectionState::Disconnected`].
    pub fn give_up(&mut self) {
        let kind = self.session.kind;
        let attempts = self.session.unopened_failures;
        self.session.state = ConnectionState::Disconnected;

        warn!(%kind, attempts, "Giving up, transport never opened");

        self.effects.push(Effect::CancelReconnect);
        self.emit(SessionEvent::GaveUp { kind, attempts });
    }
}

impl fmt::Debug for ErrorContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorContext")
            .field("class", &self.class)
            .field("reason", &self.reason)
            .field("state", &self.session.state)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ErrorInterceptor
// ============================================================================

/// A link in the failure handling chain.
pub trait ErrorInterceptor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Inspects a failure and optionally handles it.
    fn intercept(&self, ctx: &mut ErrorContext<'_>) -> Flow;
}

// ============================================================================
// Standard Interceptors
// ============================================================================

/// Swaps to the fallback transport on a capability failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackSwap;

impl ErrorInterceptor for FallbackSwap {
    fn name(&self) -> &'static str {
        "fallback_swap"
    }

    fn intercept(&self, ctx: &mut ErrorContext<'_>) -> Flow {
        if ctx.class() != FailureClass::Capability {
            return Flow::Continue;
        }
        ctx.engage_fallback();
        Flow::Handled
    }
}

/// Gives up once a never-opened session reaches the attempt cap.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityCap;

impl ErrorInterceptor for CapabilityCap {
    fn name(&self) -> &'static str {
        "capability_cap"
    }

    fn intercept(&self, ctx: &mut ErrorContext<'_>) -> Flow {
        if ctx.class() != FailureClass::Fatal {
            return Flow::Continue;
        }
        ctx.give_up();
        Flow::Handled
    }
}

/// Retries on the same transport kind with exponential backoff.
///
/// Handles everything it sees; place it last.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconnectWithBackoff;

impl ErrorInterceptor for ReconnectWithBackoff {
    fn name(&self) -> &'static str {
        "reconnect_with_backoff"
    }

    fn intercept(&self, ctx: &mut ErrorContext<'_>) -> Flow {
        ctx.schedule_reconnect();
        Flow::Handled
    }
}

// ============================================================================
// InterceptorChain
// ============================================================================

/// Ordered list of interceptors.
pub struct InterceptorChain {
    interceptors: Vec<Box<dyn ErrorInterceptor>>,
}

impl Default for InterceptorChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl InterceptorChain {
    /// The standard chain: fallback swap, capability cap, backoff.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            interceptors: vec![
                Box::new(FallbackSwap),
                Box::new(CapabilityCap),
                Box::new(ReconnectWithBackoff),
            ],
        }
    }

    /// Places an interceptor in front of the chain.
    pub fn prepend(&mut self, interceptor: Box<dyn ErrorInterceptor>) {
        self.interceptors.insert(0, interceptor);
    }

    /// Interceptor names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// Routes a failure through the chain.
    ///
    /// If no interceptor handles it, a reconnect is scheduled.
    pub fn run(&self, ctx: &mut ErrorContext<'_>) {
        for interceptor in &self.interceptors {
            if interceptor.intercept(ctx) == Flow::Handled {
                debug!(interceptor = interceptor.name(), class = ?ctx.class(), "Failure handled");
                return;
            }
        }

        warn!(class = ?ctx.class(), "No interceptor handled failure, reconnecting");
        ctx.schedule_reconnect();
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> SocketConfig {
        SocketConfig::new().with_jitter(0.0)
    }

    fn run_chain(chain: &InterceptorChain, session: &mut Session, class: FailureClass) -> Vec<Effect> {
        let config = config();
        let mut effects = Vec::new();
        let mut ctx = ErrorContext::new(session, &config, &mut effects, class, "boom");
        chain.run(&mut ctx);
        effects
    }

    #[test]
    fn test_standard_order() {
        let chain = InterceptorChain::standard();
        assert_eq!(
            chain.names(),
            vec!["fallback_swap", "capability_cap", "reconnect_with_backoff"]
        );
    }

    #[test]
    fn test_capability_engages_fallback() {
        let mut session = Session::new();
        session.unopened_failures = 1;

        let effects = run_chain(&InterceptorChain::standard(), &mut session, FailureClass::Capability);

        assert_eq!(session.kind(), TransportKind::LongPoll);
        assert!(session.fallback_engaged());
        assert_eq!(
            effects[0],
            Effect::CloseTransport {
                code: CloseCode::FALLBACK_SWAP,
                reason: "fallback".to_string(),
            }
        );
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::OpenTransport {
                kind: TransportKind::LongPoll,
                ..
            }
        )));
    }

    #[test]
    fn test_fatal_gives_up() {
        let mut session = Session::new();
        let effects = run_chain(&InterceptorChain::standard(), &mut session, FailureClass::Fatal);

        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(effects.iter().any(|e| matches!(e, Effect::Emit(SessionEvent::GaveUp { .. }))));
        assert!(!effects.iter().any(|e| matches!(e, Effect::OpenTransport { .. })));
    }

    #[test]
    fn test_transient_schedules_reconnect() {
        let mut session = Session::new();
        let effects = run_chain(&InterceptorChain::standard(), &mut session, FailureClass::Transient);

        assert_eq!(
            session.state(),
            ConnectionState::Reconnecting(TransportKind::WebSocket)
        );
        assert_eq!(session.reconnect_attempts(), 1);
        assert!(effects.contains(&Effect::ScheduleReconnect {
            delay: std::time::Duration::from_millis(10)
        }));
    }

    struct Counting(Arc<AtomicU32>, Flow);

    impl ErrorInterceptor for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn intercept(&self, _ctx: &mut ErrorContext<'_>) -> Flow {
            self.0.fetch_add(1, Ordering::SeqCst);
            self.1
        }
    }

    #[test]
    fn test_prepended_interceptor_runs_first() {
        let seen = Arc::new(AtomicU32::new(0));
        let mut chain = InterceptorChain::standard();
        chain.prepend(Box::new(Counting(Arc::clone(&seen), Flow::Continue)));

        assert_eq!(chain.names()[0], "counting");

        let mut session = Session::new();
        run_chain(&chain, &mut session, FailureClass::Transient);

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(session.state().is_connecting());
    }

    #[test]
    fn test_handled_stops_chain() {
        let seen = Arc::new(AtomicU32::new(0));
        let mut chain = InterceptorChain::standard();
        chain.prepend(Box::new(Counting(Arc::clone(&seen), Flow::Handled)));

        let mut session = Session::new();
        let effects = run_chain(&chain, &mut session, FailureClass::Capability);

        assert!(effects.is_empty());
        assert_eq!(session.kind(), TransportKind::WebSocket);
    }
}
