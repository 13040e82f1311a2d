//! Session facade.
//!
//! The stable handle application code depends on.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`LiveSocket`] | Connection lifecycle, sending, observation |
//! | [`LiveSocketBuilder`] | Fluent configuration builder |
//! | [`Channel`] | Join, push to and receive from one topic |
//!
//! # Example
//!
//! ```no_run
//! use live_socket::{LiveSocket, Result, SessionEvent};
//! use serde_json::json;
//!
//! # async fn example() -> Result<()> {
//! let socket = LiveSocket::builder("https://example.com/live")
//!     .param("_csrf_token", "token")
//!     .build()?;
//!
//! let mut events = socket.subscribe();
//! socket.connect()?;
//!
//! let mut channel = socket.channel("lv:phx-F1", json!({}));
//! channel.join().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     if let SessionEvent::FallbackEngaged { attempts, .. } = event {
//!         println!("long-poll fallback after {attempts} attempt(s)");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for socket configuration.
pub mod builder;

/// Topic channels.
pub mod channel;

/// Core socket implementation.
pub mod core;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::LiveSocketBuilder;
pub use channel::Channel;
pub use core::LiveSocket;
