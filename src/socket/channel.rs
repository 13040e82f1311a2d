//! Topic channels.
//!
//! A [`Channel`] is a subscription to one topic on a [`LiveSocket`]. Once
//! joined it stays joined across reconnects: the controller rejoins it with
//! the original params after every open.
//!
//! # Example
//!
//! ```no_run
//! use live_socket::LiveSocket;
//! use serde_json::json;
//!
//! # async fn example(socket: LiveSocket) -> live_socket::Result<()> {
//! let mut channel = socket.channel("lv:phx-F1", json!({ "session": "..." }));
//! let rendered = channel.join().await?;
//!
//! channel.push("event", json!({ "type": "click", "event": "inc" })).await?;
//!
//! while let Some(message) = channel.recv().await {
//!     println!("{}: {}", message.event, message.payload);
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::Result;
use crate::protocol::{Message, events};
use crate::session::controller::Command;

use super::core::LiveSocket;

// ============================================================================
// Channel
// ============================================================================

/// Handle to one topic on a socket.
#[derive(Debug)]
pub struct Channel {
    socket: LiveSocket,
    topic: String,
    params: Value,
    /// Join ref of the first successful join.
    join_ref: Option<String>,
    inbound_rx: Option<mpsc::UnboundedReceiver<Message>>,
}

impl Channel {
    pub(crate) fn new(socket: LiveSocket, topic: String, params: Value) -> Self {
        Self {
            socket,
            topic,
            params,
            join_ref: None,
            inbound_rx: None,
        }
    }

    /// Returns the topic.
    #[inline]
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the join params.
    #[inline]
    #[must_use]
    pub fn params(&self) -> &Value {
        &self.params
    }

    /// Returns `true` once a join was acknowledged.
    #[inline]
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.join_ref.is_some()
    }

    /// Joins the topic and returns the server's join response.
    ///
    /// If the socket is not open yet, the join is sent on the next open.
    ///
    /// # Errors
    ///
    /// - [`Error::Rejected`](crate::Error::Rejected) if the server refuses the join
    /// - [`Error::RequestTimeout`](crate::Error::RequestTimeout) if no reply arrives in time
    /// - [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) if the session drops or
    ///   gives up first
    /// - [`Error::SessionStopped`](crate::Error::SessionStopped) after teardown
    ///
    /// A failed join leaves nothing registered: it is not sent on a later open.
    pub async fn join(&mut self) -> Result<Value> {
        let join_ref = self.socket.next_ref();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = oneshot::channel();

        debug!(topic = %self.topic, %join_ref, "Join requested");

        self.socket.command(Command::Join {
            topic: self.topic.clone(),
            join_ref: join_ref.clone(),
            payload: self.params.clone(),
            inbound_tx,
            reply_tx,
        })?;
        self.inbound_rx = Some(inbound_rx);

        let response = self
            .socket
            .await_reply(join_ref.clone(), reply_rx)
            .await
            .and_then(|reply| reply.into_reply(events::JOIN));

        match response {
            Ok(response) => {
                self.join_ref = Some(join_ref);
                Ok(response)
            }
            Err(e) => {
                // The controller has forgotten the channel
                self.inbound_rx = None;
                Err(e)
            }
        }
    }

    /// Pushes an event and returns the reply body.
    ///
    /// # Errors
    ///
    /// - [`Error::Rejected`](crate::Error::Rejected) if the reply status is not `ok`
    /// - Any error of [`LiveSocket::request`]
    pub async fn push(&self, event: impl Into<String>, payload: Value) -> Result<Value> {
        let event = event.into();
        let message = Message::new(self.topic.clone(), event.clone(), payload);

        let reply = self.socket.request(message).await?;
        reply.into_reply(&event)
    }

    /// Sends an event without waiting for a reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionStopped`](crate::Error::SessionStopped) after teardown.
    pub fn send(&self, event: impl Into<String>, payload: Value) -> Result<()> {
        self.socket
            .send(Message::new(self.topic.clone(), event, payload))
    }

    /// Receives the next server frame for this topic.
    ///
    /// Returns `None` before [`join`](Self::join), after [`leave`](Self::leave),
    /// after a rejected join and after teardown.
    pub async fn recv(&mut self) -> Option<Message> {
        match self.inbound_rx.as_mut() {
            Some(inbound_rx) => inbound_rx.recv().await,
            None => None,
        }
    }

    /// Leaves the topic.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`](crate::Error::Protocol) if the channel is not registered
    /// - Any error of [`LiveSocket::request`]
    pub async fn leave(&mut self) -> Result<Value> {
        let msg_ref = self.socket.next_ref();
        let (reply_tx, reply_rx) = oneshot::channel();

        self.socket.command(Command::Leave {
            topic: self.topic.clone(),
            msg_ref: msg_ref.clone(),
            reply_tx,
        })?;
        self.inbound_rx = None;
        self.join_ref = None;

        let reply = self.socket.await_reply(msg_ref, reply_rx).await?;
        reply.into_reply(events::LEAVE)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use crate::config::SocketConfig;
    use crate::error::Error;
    use crate::protocol::Message;
    use crate::transport::TransportEvent;
    use crate::transport::mock::{Behavior, MockTransports};

    use super::*;

    fn socket(mock: &MockTransports) -> LiveSocket {
        LiveSocket::builder("http://localhost:4000/live")
            .config(SocketConfig::new().with_jitter(0.0).with_heartbeat(None))
            .transport_factory(mock.clone())
            .build()
            .expect("build")
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_push_leave() {
        let mock = MockTransports::new([Behavior::Open]).with_auto_reply();
        let socket = socket(&mock);
        socket.connect().expect("connect");

        let mut channel = socket.channel("lv:page", json!({"session": "s"}));
        assert!(!channel.is_joined());

        let response = channel.join().await.expect("join");
        assert_eq!(response, json!({"echo": "phx_join"}));
        assert!(channel.is_joined());

        let response = channel.push("event", json!({"type": "click"})).await.expect("push");
        assert_eq!(response, json!({"echo": "event"}));

        let sent = mock.sent();
        let join = sent.iter().find(|m| m.event == events::JOIN).expect("join frame");
        let push = sent.iter().find(|m| m.event == "event").expect("push frame");
        assert_eq!(join.payload, json!({"session": "s"}));
        assert_eq!(push.join_ref, join.join_ref, "push carries the join ref");

        channel.leave().await.expect("leave");
        assert!(!channel.is_joined());
        assert!(channel.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_before_connect_waits_for_open() {
        let mock = MockTransports::new([Behavior::Open]).with_auto_reply();
        let socket = socket(&mock);

        let mut channel = socket.channel("lv:page", json!({}));
        let join = tokio::spawn(async move {
            let result = channel.join().await;
            (channel, result)
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(mock.sent().is_empty());

        socket.connect().expect("connect");
        let (channel, result) = join.await.expect("join task");
        result.expect("join");
        assert!(channel.is_joined());
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_timeout_before_open_is_forgotten() {
        let mock = MockTransports::new([Behavior::Open]).with_auto_reply();
        let socket = LiveSocket::builder("http://localhost:4000/live")
            .config(
                SocketConfig::new()
                    .with_heartbeat(None)
                    .with_push_timeout(Duration::from_secs(1)),
            )
            .transport_factory(mock.clone())
            .build()
            .expect("build");

        let mut channel = socket.channel("lv:page", json!({}));
        let err = channel.join().await.unwrap_err();
        assert!(err.is_timeout());
        assert!(!channel.is_joined());

        socket.connect().expect("connect");
        socket.wait_until_open().await.expect("open");
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(mock.sent().iter().all(|m| m.event != events::JOIN));
        assert!(channel.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_join() {
        let mock = MockTransports::new([Behavior::Open]).with_auto_reply();
        let socket = socket(&mock);
        socket.connect().expect("connect");

        let mut channel = socket.channel("reject:page", json!({}));
        let err = channel.join().await.unwrap_err();

        assert!(matches!(err, Error::Rejected { ref status, .. } if status == "error"));
        assert!(!channel.is_joined());
        assert!(channel.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_server_push() {
        let mock = MockTransports::new([Behavior::Open]).with_auto_reply();
        let socket = socket(&mock);
        socket.connect().expect("connect");

        let mut channel = socket.channel("lv:page", json!({}));
        channel.join().await.expect("join");

        let join_ref = mock
            .sent()
            .into_iter()
            .find(|m| m.event == events::JOIN)
            .and_then(|m| m.join_ref)
            .expect("join ref");
        let diff = Message::new("lv:page", "diff", json!({"0": "1"})).with_join_ref(join_ref);
        mock.emit(0, TransportEvent::Message(diff.encode().expect("encode")));

        let received = channel.recv().await.expect("frame");
        assert_eq!(received.event, "diff");
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_unknown_topic() {
        let mock = MockTransports::new([Behavior::Open]);
        let socket = socket(&mock);

        let mut channel = socket.channel("lv:never", json!({}));
        let err = channel.leave().await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_before_join_is_none() {
        let mock = MockTransports::default();
        let socket = socket(&mock);
        let mut channel = socket.channel("lv:page", json!({}));

        assert!(channel.recv().await.is_none());
    }
}
