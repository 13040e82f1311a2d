//! Live Socket - Realtime session client with transport fallback.
//!
//! This library maintains one logical realtime session to a
//! Phoenix-compatible endpoint, carried by a WebSocket and, when the
//! WebSocket cannot be established, by HTTP long-polling.
//!
//! # Architecture
//!
//! The socket follows a controller model:
//!
//! - **Facade**: [`LiveSocket`] and [`Channel`] send commands and observe events
//! - **Controller**: One tokio task owns the session, its transport and its timers
//! - **Selector**: A pure state machine decides transport kind, fallback and backoff
//!
//! Key design principles:
//!
//! - At most one transport attempt is pending at any time
//! - Fallback is one-directional: WebSocket → long-poll, never back
//! - The abandoned WebSocket is closed with code `3000`
//! - Failures flow through an ordered [`InterceptorChain`]
//!
//! # Quick Start
//!
//! ```no_run
//! use live_socket::{LiveSocket, LoadingSignal, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let socket = LiveSocket::builder("https://example.com/live")
//!         .param("_csrf_token", "token")
//!         .param("_request_id", "F1a2b3")
//!         .build()?;
//!
//!     // Drive a progress indicator from the session
//!     let loading = LoadingSignal::new();
//!     loading.follow(&socket);
//!
//!     socket.connect()?;
//!     let kind = socket.wait_until_open().await?;
//!     println!("Connected over {kind}");
//!
//!     let mut channel = socket.channel("lv:phx-F1", json!({}));
//!     channel.join().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | [`SocketConfig`] and defaults |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Attempt ids and message refs |
//! | [`loading`] | [`LoadingSignal`] for page lifecycle events |
//! | [`protocol`] | Wire frames and close codes |
//! | [`session`] | Session state machine and controller |
//! | [`socket`] | [`LiveSocket`] facade and [`Channel`] |
//! | [`transport`] | WebSocket and long-poll transports |

// ============================================================================
// Modules
// ============================================================================

/// Session configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Typed identifiers for attempts and messages.
pub mod identifiers;

/// Loading-state signal.
pub mod loading;

/// Wire protocol types.
///
/// Frame encoding, close codes and long-poll response bodies.
pub mod protocol;

/// Session state machine, interceptors and controller task.
pub mod session;

/// Session facade.
///
/// Use [`LiveSocket::builder()`] to create a socket.
pub mod socket;

/// Transport layer.
///
/// The [`Transport`] and [`TransportFactory`] seams plus the built-in
/// WebSocket and long-poll implementations.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::{MAX_ATTEMPTS_BEFORE_FALLBACK_SWAP, SocketConfig};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{AttemptId, RefCounter};

// Loading signal
pub use loading::{LoadingSignal, LoadingState, PageEvent};

// Protocol types
pub use protocol::{CloseCode, Message};

// Session types
pub use session::{
    Backoff, ConnectionState, Effect, ErrorContext, ErrorInterceptor, FailureClass, Flow, Input,
    InterceptorChain, Selector, SessionEvent, SessionSnapshot,
};

// Socket types
pub use socket::{Channel, LiveSocket, LiveSocketBuilder};

// Transport types
pub use transport::{
    DefaultTransports, Endpoint, EventSink, Transport, TransportEvent, TransportFactory,
    TransportKind,
};
