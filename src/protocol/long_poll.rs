//! Long-poll response envelope.
//!
//! Every poll is answered with a JSON object whose `status` field carries
//! the poll outcome independently of the HTTP status:
//!
//! ```json
//! { "status": 200, "token": "SFMyNTY...", "messages": ["[null,null,\"lv:1\",\"diff\",{}]"] }
//! ```
//!
//! | Status | Meaning |
//! |--------|---------|
//! | 200 | `messages` holds encoded frames |
//! | 204 | Poll expired with nothing to deliver |
//! | 410 | New server session, `token` must be used from now on |
//! | 403 | Session refused |

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;

// ============================================================================
// PollResponse
// ============================================================================

/// Body of a long-poll GET or POST response.
#[derive(Debug, Clone, Deserialize)]
pub struct PollResponse {
    /// Poll outcome.
    pub status: u16,

    /// Session token, present with status 410.
    #[serde(default)]
    pub token: Option<String>,

    /// Encoded frames, present with status 200.
    #[serde(default)]
    pub messages: Vec<String>,
}

/// Classified poll outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// Frames delivered.
    Messages(Vec<String>),
    /// Nothing to deliver.
    Empty,
    /// A new server session was created.
    Session(String),
    /// The server refused the session.
    Forbidden,
    /// Any other status.
    Unexpected(u16),
}

impl PollResponse {
    /// Classifies the response.
    #[must_use]
    pub fn into_status(self) -> PollStatus {
        match self.status {
            200 => PollStatus::Messages(self.messages),
            204 => PollStatus::Empty,
            410 => match self.token {
                Some(token) => PollStatus::Session(token),
                None => PollStatus::Unexpected(410),
            },
            403 => PollStatus::Forbidden,
            other => PollStatus::Unexpected(other),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> PollStatus {
        serde_json::from_str::<PollResponse>(json)
            .expect("parse")
            .into_status()
    }

    #[test]
    fn test_gone_carries_token() {
        assert_eq!(
            parse(r#"{"status":410,"token":"abc"}"#),
            PollStatus::Session("abc".to_string())
        );
    }

    #[test]
    fn test_gone_without_token_is_unexpected() {
        assert_eq!(parse(r#"{"status":410}"#), PollStatus::Unexpected(410));
    }

    #[test]
    fn test_messages() {
        let status = parse(r#"{"status":200,"token":"abc","messages":["[null,null,\"t\",\"e\",{}]"]}"#);
        match status {
            PollStatus::Messages(messages) => assert_eq!(messages.len(), 1),
            other => panic!("Expected messages, got {other:?}"),
        }
    }

    #[test]
    fn test_no_content_and_forbidden() {
        assert_eq!(parse(r#"{"status":204}"#), PollStatus::Empty);
        assert_eq!(parse(r#"{"status":403}"#), PollStatus::Forbidden);
        assert_eq!(parse(r#"{"status":500}"#), PollStatus::Unexpected(500));
    }
}
