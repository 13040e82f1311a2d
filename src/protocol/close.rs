//! Close status codes.
//!
//! | Code | Constant | Meaning |
//! |------|----------|---------|
//! | 1000 | [`CloseCode::NORMAL`] | Orderly close, default for user disconnects |
//! | 1001 | [`CloseCode::GOING_AWAY`] | Session torn down (page unload) |
//! | 1005 | [`CloseCode::NO_STATUS`] | Peer closed without a status |
//! | 1006 | [`CloseCode::ABNORMAL`] | Connection lost, heartbeat timeout |
//! | 1015 | [`CloseCode::TLS_FAILURE`] | TLS handshake failed |
//! | 3000 | [`CloseCode::FALLBACK_SWAP`] | Primary abandoned for the fallback, never retried |
//!
//! 1005, 1006 and 1015 only describe a close locally. A close frame carrying
//! one of them is a protocol violation, so [`CloseCode::on_wire`] sends
//! [`CloseCode::NORMAL`] in their place.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// CloseCode
// ============================================================================

/// Status code attached to a transport close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(u16);

impl CloseCode {
    /// Orderly close.
    pub const NORMAL: Self = Self(1000);

    /// Endpoint going away.
    pub const GOING_AWAY: Self = Self(1001);

    /// Close frame carried no status.
    pub const NO_STATUS: Self = Self(1005);

    /// Connection dropped without a close frame.
    pub const ABNORMAL: Self = Self(1006);

    /// TLS handshake failed.
    pub const TLS_FAILURE: Self = Self(1015);

    /// Primary transport closed to engage the fallback transport.
    ///
    /// A transport closed with this code must not reconnect on its own.
    pub const FALLBACK_SWAP: Self = Self(3000);

    /// Creates a close code from its numeric value.
    #[inline]
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns `true` for codes that must not appear in a close frame.
    #[inline]
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        matches!(self.0, 1005 | 1006 | 1015)
    }

    /// Returns the code to put in an outgoing close frame.
    #[inline]
    #[must_use]
    pub const fn on_wire(self) -> Self {
        if self.is_reserved() { Self::NORMAL } else { self }
    }

    /// Returns `true` if a close with this code may be followed by a reconnect.
    #[inline]
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        self.0 != Self::FALLBACK_SWAP.0
    }
}

impl From<u16> for CloseCode {
    #[inline]
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
