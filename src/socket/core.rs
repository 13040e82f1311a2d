//! Live socket facade.
//!
//! [`LiveSocket`] is the handle application code holds. It forwards every
//! call to the session controller task, which owns the active transport, so
//! callers never know or care which transport carries the session.
//!
//! # Example
//!
//! ```no_run
//! use live_socket::{LiveSocket, Result};
//!
//! # async fn example() -> Result<()> {
//! let socket = LiveSocket::builder("https://example.com/live")
//!     .param("_csrf_token", "token")
//!     .build()?;
//!
//! socket.connect()?;
//! let kind = socket.wait_until_open().await?;
//! println!("connected over {kind}");
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::debug;

use crate::config::SocketConfig;
use crate::error::{Error, Result};
use crate::identifiers::RefCounter;
use crate::protocol::{CloseCode, Message};
use crate::session::controller::{Command, ControllerHandle};
use crate::session::{ConnectionState, SessionEvent, SessionSnapshot};
use crate::transport::{Endpoint, TransportKind};

use super::builder::LiveSocketBuilder;
use super::channel::Channel;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the socket.
pub(crate) struct SocketInner {
    /// Parsed endpoint.
    pub endpoint: Endpoint,

    /// Configuration the session was built with.
    pub config: SocketConfig,

    /// Message ref generator, shared with the controller.
    pub refs: Arc<RefCounter>,

    /// Command channel to the controller task.
    pub command_tx: mpsc::UnboundedSender<Command>,

    /// Latest session snapshot.
    pub state_rx: watch::Receiver<SessionSnapshot>,

    /// Session event broadcast.
    pub events_tx: broadcast::Sender<SessionEvent>,
}

// ============================================================================
// LiveSocket
// ============================================================================

/// Handle to a realtime session.
///
/// Cheap to clone; all clones share one session. The session is torn down
/// when [`teardown`](Self::teardown) is called or the last clone (including
/// clones held by [`Channel`]s) is dropped.
#[derive(Clone)]
pub struct LiveSocket {
    pub(crate) inner: Arc<SocketInner>,
}

impl fmt::Debug for LiveSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSocket")
            .field("endpoint", &self.inner.endpoint.base().as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// LiveSocket - Construction
// ============================================================================

impl LiveSocket {
    /// Creates a builder for a socket on `url`.
    ///
    /// `url` is the socket base URL, e.g. `https://example.com/live`.
    #[inline]
    #[must_use]
    pub fn builder(url: impl Into<String>) -> LiveSocketBuilder {
        LiveSocketBuilder::new(url)
    }

    pub(crate) fn from_parts(
        endpoint: Endpoint,
        config: SocketConfig,
        refs: Arc<RefCounter>,
        handle: ControllerHandle,
    ) -> Self {
        Self {
            inner: Arc::new(SocketInner {
                endpoint,
                config,
                refs,
                command_tx: handle.command_tx,
                state_rx: handle.state_rx,
                events_tx: handle.events_tx,
            }),
        }
    }
}

// ============================================================================
// LiveSocket - Lifecycle
// ============================================================================

impl LiveSocket {
    /// Starts connecting.
    ///
    /// Idempotent: does nothing while an attempt is in flight or the
    /// session is open. The outcome is observable through
    /// [`watch`](Self::watch) and [`subscribe`](Self::subscribe).
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionStopped`] after teardown.
    pub fn connect(&self) -> Result<()> {
        self.command(Command::Connect)
    }

    /// Closes the session with a status code.
    ///
    /// The session does not reconnect on its own afterwards unless
    /// [`SocketConfig::reconnect_after_user_disconnect`] is set and `code`
    /// is retryable. [`connect`](Self::connect) starts it again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionStopped`] after teardown.
    pub fn disconnect(&self, code: CloseCode, reason: impl Into<String>) -> Result<()> {
        self.command(Command::Disconnect {
            code,
            reason: reason.into(),
        })
    }

    /// Closes the transport, cancels timers and stops the session for good.
    pub fn teardown(&self) {
        debug!("Tearing down session");
        let _ = self.inner.command_tx.send(Command::Teardown);
    }

    /// Waits until a transport is open.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the session gave up or was closed
    /// - [`Error::SessionStopped`] if the controller is gone
    pub async fn wait_until_open(&self) -> Result<TransportKind> {
        let mut state_rx = self.watch();
        let snapshot = *state_rx
            .wait_for(|s| s.state.is_open() || s.state.is_terminal())
            .await
            .map_err(|_| Error::SessionStopped)?;

        match snapshot.state {
            ConnectionState::Open(kind) => Ok(kind),
            state => Err(Error::connection(format!("session is {state}"))),
        }
    }
}

// ============================================================================
// LiveSocket - Messaging
// ============================================================================

impl LiveSocket {
    /// Sends a frame without waiting for a reply.
    ///
    /// Frames sent while no transport is open are buffered and delivered
    /// on the next open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionStopped`] after teardown.
    pub fn send(&self, message: Message) -> Result<()> {
        self.command(Command::Push {
            message,
            reply_tx: None,
        })
    }

    /// Sends a frame and waits for the `phx_reply` to its ref.
    ///
    /// A ref is assigned if the frame has none.
    ///
    /// # Errors
    ///
    /// - [`Error::RequestTimeout`] if no reply arrives within the push timeout
    /// - [`Error::ConnectionClosed`] if the transport drops first
    /// - [`Error::SendBufferFull`] if the frame cannot be buffered
    /// - [`Error::SessionStopped`] after teardown
    pub async fn request(&self, mut message: Message) -> Result<Message> {
        let msg_ref = match &message.msg_ref {
            Some(msg_ref) => msg_ref.clone(),
            None => {
                let msg_ref = self.next_ref();
                message.msg_ref = Some(msg_ref.clone());
                msg_ref
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(Command::Push {
            message,
            reply_tx: Some(reply_tx),
        })?;

        self.await_reply(msg_ref, reply_rx).await
    }

    /// Creates a channel handle for `topic`.
    ///
    /// Nothing is sent until [`Channel::join`].
    #[must_use]
    pub fn channel(&self, topic: impl Into<String>, params: Value) -> Channel {
        Channel::new(self.clone(), topic.into(), params)
    }
}

// ============================================================================
// LiveSocket - Observation
// ============================================================================

impl LiveSocket {
    /// Subscribes to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Returns a receiver for session snapshots.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state_rx.clone()
    }

    /// Returns the latest session snapshot.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        *self.inner.state_rx.borrow()
    }

    /// Returns the connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.snapshot().state
    }

    /// Returns the selected transport kind.
    #[inline]
    #[must_use]
    pub fn transport_kind(&self) -> TransportKind {
        self.snapshot().kind
    }

    /// Returns `true` if a transport is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Returns the endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SocketConfig {
        &self.inner.config
    }
}

// ============================================================================
// LiveSocket - Internal
// ============================================================================

impl LiveSocket {
    pub(crate) fn next_ref(&self) -> String {
        self.inner.refs.next()
    }

    pub(crate) fn command(&self, command: Command) -> Result<()> {
        self.inner
            .command_tx
            .send(command)
            .map_err(|_| Error::SessionStopped)
    }

    /// Waits for a reply, cleaning up the correlation on timeout.
    pub(crate) async fn await_reply(
        &self,
        msg_ref: String,
        reply_rx: oneshot::Receiver<Result<Message>>,
    ) -> Result<Message> {
        let timeout = self.inner.config.push_timeout;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                let _ = self.command(Command::RemoveCorrelation {
                    msg_ref: msg_ref.clone(),
                });
                Err(Error::request_timeout(msg_ref, timeout.as_millis() as u64))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
