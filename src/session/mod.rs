//! Session management.
//!
//! A session is one logical realtime connection that may span many
//! transport attempts. It decides which transport carries it, reacts to
//! transport failures and drives reconnection.
//!
//! # Architecture
//!
//! ```text
//! Input ──► Selector::step ──► Vec<Effect>
//!               │
//!               ├── ErrorContext ──► InterceptorChain
//!               │                     FallbackSwap → CapabilityCap → ReconnectWithBackoff
//!               ▼
//!            Session (kind, state, counters, pending attempt)
//! ```
//!
//! The selector is pure; the controller task feeds it inputs from commands,
//! transports and timers, and executes the returned effects.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backoff` | Reconnect delay schedule |
//! | `controller` | Tokio task owning the session |
//! | `intercept` | Failure interceptor chain |
//! | `machine` | Pure transition function |
//! | `state` | Session data and events |

// ============================================================================
// Submodules
// ============================================================================

/// Reconnect delay schedule.
pub mod backoff;

/// Session controller task.
pub(crate) mod controller;

/// Failure interceptor chain.
pub mod intercept;

/// Transition function.
pub mod machine;

/// Session state types.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::Backoff;
pub use intercept::{
    CapabilityCap, ErrorContext, ErrorInterceptor, FallbackSwap, Flow, InterceptorChain,
    ReconnectWithBackoff,
};
pub use machine::{Effect, Input, Selector};
pub use state::{
    AttemptOutcome, ConnectionState, FailureClass, Session, SessionEvent, SessionSnapshot,
    TransportAttempt,
};
