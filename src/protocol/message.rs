//! Wire frame type.
//!
//! Every frame, in both directions and on both transports, is a JSON array:
//!
//! ```json
//! [join_ref, ref, topic, event, payload]
//! ```
//!
//! Replies to a pushed frame arrive as `phx_reply` on the same topic with
//! the same `ref` and a payload of the form:
//!
//! ```json
//! { "status": "ok", "response": { ... } }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Value, from_str, json, to_string};

use crate::error::{Error, Result};

use super::events;

// ============================================================================
// Message
// ============================================================================

/// A single frame exchanged with the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Ref of the `phx_join` that opened the channel this frame belongs to.
    pub join_ref: Option<String>,

    /// Ref used to correlate a push with its reply.
    pub msg_ref: Option<String>,

    /// Channel topic (e.g. `"lv:phx-F1"`).
    pub topic: String,

    /// Event name.
    pub event: String,

    /// Opaque event payload.
    pub payload: Value,
}

type Frame = (Option<String>, Option<String>, String, String, Value);

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        (
            &self.join_ref,
            &self.msg_ref,
            &self.topic,
            &self.event,
            &self.payload,
        )
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let (join_ref, msg_ref, topic, event, payload) = Frame::deserialize(deserializer)?;
        Ok(Self {
            join_ref,
            msg_ref,
            topic,
            event,
            payload,
        })
    }
}

// ============================================================================
// Message - Constructors
// ============================================================================

impl Message {
    /// Creates a frame without refs.
    #[inline]
    #[must_use]
    pub fn new(topic: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
        Self {
            join_ref: None,
            msg_ref: None,
            topic: topic.into(),
            event: event.into(),
            payload,
        }
    }

    /// Creates a `phx_join` frame. The join ref doubles as the message ref.
    #[must_use]
    pub fn join(topic: impl Into<String>, join_ref: impl Into<String>, payload: Value) -> Self {
        let join_ref = join_ref.into();
        Self {
            join_ref: Some(join_ref.clone()),
            msg_ref: Some(join_ref),
            topic: topic.into(),
            event: events::JOIN.to_string(),
            payload,
        }
    }

    /// Creates a `phx_leave` frame.
    #[must_use]
    pub fn leave(
        topic: impl Into<String>,
        join_ref: Option<String>,
        msg_ref: impl Into<String>,
    ) -> Self {
        Self {
            join_ref,
            msg_ref: Some(msg_ref.into()),
            topic: topic.into(),
            event: events::LEAVE.to_string(),
            payload: json!({}),
        }
    }

    /// Creates a heartbeat frame on the reserved `phoenix` topic.
    #[must_use]
    pub fn heartbeat(msg_ref: impl Into<String>) -> Self {
        Self {
            join_ref: None,
            msg_ref: Some(msg_ref.into()),
            topic: events::PHOENIX_TOPIC.to_string(),
            event: events::HEARTBEAT.to_string(),
            payload: json!({}),
        }
    }

    /// Sets the join ref.
    #[inline]
    #[must_use]
    pub fn with_join_ref(mut self, join_ref: impl Into<String>) -> Self {
        self.join_ref = Some(join_ref.into());
        self
    }

    /// Sets the message ref.
    #[inline]
    #[must_use]
    pub fn with_ref(mut self, msg_ref: impl Into<String>) -> Self {
        self.msg_ref = Some(msg_ref.into());
        self
    }
}

// ============================================================================
// Message - Codec
// ============================================================================

impl Message {
    /// Encodes the frame as a JSON array string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the payload cannot be serialized.
    pub fn encode(&self) -> Result<String> {
        Ok(to_string(self)?)
    }

    /// Decodes a frame from a JSON array string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the text is not a five-element frame.
    pub fn decode(text: &str) -> Result<Self> {
        from_str(text).map_err(|e| Error::protocol(format!("Malformed frame: {e}")))
    }
}

// ============================================================================
// Message - Reply Helpers
// ============================================================================

impl Message {
    /// Returns `true` if this is a `phx_reply` frame.
    #[inline]
    #[must_use]
    pub fn is_reply(&self) -> bool {
        self.event == events::REPLY
    }

    /// Returns `true` if this is the reply to a heartbeat.
    #[inline]
    #[must_use]
    pub fn is_heartbeat_reply(&self) -> bool {
        self.is_reply() && self.topic == events::PHOENIX_TOPIC
    }

    /// Returns the reply status (`"ok"`, `"error"`, ...), if any.
    #[inline]
    #[must_use]
    pub fn reply_status(&self) -> Option<&str> {
        self.payload.get("status").and_then(Value::as_str)
    }

    /// Returns the reply body, or `Null` if absent.
    #[inline]
    #[must_use]
    pub fn reply_response(&self) -> Value {
        self.payload.get("response").cloned().unwrap_or(Value::Null)
    }

    /// Converts a reply into its response body.
    ///
    /// `request_event` names the event this frame replies to, for errors.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if this is not a reply
    /// - [`Error::Rejected`] if the status is not `"ok"`
    pub fn into_reply(self, request_event: &str) -> Result<Value> {
        if !self.is_reply() {
            return Err(Error::protocol(format!(
                "Expected {} on {}, got {}",
                events::REPLY,
                self.topic,
                self.event
            )));
        }

        let status = self.reply_status().unwrap_or("unknown").to_string();
        let response = self.reply_response();

        if status == "ok" {
            Ok(response)
        } else {
            Err(Error::rejected(self.topic, request_event, status, response))
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
    fn test_encode_is_five_element_array() {
        let message = Message::new("lv:1", "event", json!({"value": 1}))
            .with_join_ref("1")
            .with_ref("4");

        let text = message.encode().expect("encode");
        assert_eq!(text, r#"["1","4","lv:1","event",{"value":1}]"#);
    }

    #[test]
    fn test_decode_null_refs() {
        let message =
            Message::decode(r#"[null,null,"lv:1","diff",{"0":"x"}]"#).expect("decode");

        assert_eq!(message.join_ref, None);
        assert_eq!(message.msg_ref, None);
        assert_eq!(message.topic, "lv:1");
        assert_eq!(message.event, "diff");
    }

    #[test]
    fn test_decode_rejects_short_frame() {
        let err = Message::decode(r#"["1","2","lv:1"]"#).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_join_uses_join_ref_as_ref() {
        let join = Message::join("lv:1", "3", json!({"session": "abc"}));
        assert_eq!(join.event, "phx_join");
        assert_eq!(join.join_ref.as_deref(), Some("3"));
        assert_eq!(join.msg_ref.as_deref(), Some("3"));
    }

    #[test]
    fn test_heartbeat_topic() {
        let heartbeat = Message::heartbeat("9");
        assert_eq!(heartbeat.topic, "phoenix");
        assert_eq!(heartbeat.event, "heartbeat");
        assert_eq!(heartbeat.msg_ref.as_deref(), Some("9"));
    }

    #[test]
    fn test_into_reply_ok() {
        let reply = Message::decode(
            r#"["1","1","lv:1","phx_reply",{"status":"ok","response":{"rendered":{}}}]"#,
        )
        .expect("decode");

        let response = reply.into_reply("phx_join").expect("ok reply");
        assert!(response.get("rendered").is_some());
    }

    #[test]
    fn test_into_reply_error() {
        let reply = Message::decode(
            r#"["1","1","lv:1","phx_reply",{"status":"error","response":{"reason":"stale"}}]"#,
        )
        .expect("decode");

        let err = reply.into_reply("phx_join").unwrap_err();
        match err {
            Error::Rejected {
                topic,
                event,
                status,
                response,
            } => {
                assert_eq!(topic, "lv:1");
                assert_eq!(event, "phx_join");
                assert_eq!(status, "error");
                assert_eq!(response["reason"], "stale");
            }
            other => panic!("Expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn test_heartbeat_reply_detection() {
        let reply = Message::decode(r#"[null,"5","phoenix","phx_reply",{"status":"ok","response":{}}]"#)
            .expect("decode");
        assert!(reply.is_heartbeat_reply());
    }
}
