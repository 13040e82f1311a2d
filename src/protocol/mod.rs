//! Wire protocol types.
//!
//! This module defines the frames exchanged with the server. Payloads are
//! opaque: the crate routes frames by topic and ref, it never interprets
//! application content.
//!
//! # Protocol Overview
//!
//! | Frame | Direction | Purpose |
//! |-------|-----------|---------|
//! | `phx_join` | Client → Server | Join a topic |
//! | `phx_leave` | Client → Server | Leave a topic |
//! | `heartbeat` | Client → Server | Keep-alive on topic `phoenix` |
//! | `phx_reply` | Server → Client | Reply to a ref'd push |
//! | `phx_error` / `phx_close` | Server → Client | Channel crashed / closed |
//! | anything else | Both | Application event |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `close` | Transport close codes |
//! | `long_poll` | Long-poll response envelope |
//! | `message` | The `[join_ref, ref, topic, event, payload]` frame |

// ============================================================================
// Submodules
// ============================================================================

/// Transport close codes.
pub mod close;

/// Long-poll response envelope.
pub mod long_poll;

/// Wire frame type.
pub mod message;

// ============================================================================
// Reserved Events
// ============================================================================

/// Reserved event and topic names.
pub mod events {
    /// Join a topic.
    pub const JOIN: &str = "phx_join";

    /// Leave a topic.
    pub const LEAVE: &str = "phx_leave";

    /// Reply to a ref'd push.
    pub const REPLY: &str = "phx_reply";

    /// Channel process crashed on the server.
    pub const ERROR: &str = "phx_error";

    /// Channel closed by the server.
    pub const CLOSE: &str = "phx_close";

    /// Keep-alive event.
    pub const HEARTBEAT: &str = "heartbeat";

    /// Topic used for heartbeats.
    pub const PHOENIX_TOPIC: &str = "phoenix";

    /// Protocol version sent as the `vsn` query parameter.
    pub const VSN: &str = "2.0.0";
}

// ============================================================================
// Re-exports
// ============================================================================

pub use close::CloseCode;
pub use long_poll::{PollResponse, PollStatus};
pub use message::Message;
