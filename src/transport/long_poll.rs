//! HTTP long-poll transport.
//!
//! The fallback transport, used when the network path refuses WebSockets.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   LongPollTransport                      │
//! │                                                          │
//! │  Transport::send(frame) ──► command task                 │
//! │                               POST ?token=… ───────────► │
//! │                                                          │
//! │  EventSink ◄── poll task                                 │
//! │                  GET ?token=… (held by server) ◄──────── │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The first poll carries no token and is answered with status 410 and a
//! fresh token: that is the moment the transport counts as open. Any
//! failure after that is reported once as a close; before it, as an error.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{CloseCode, PollResponse, PollStatus};

use super::{EventSink, Transport, TransportEvent, TransportKind};

// ============================================================================
// Constants
// ============================================================================

/// Extra time granted to a poll request beyond the server hold time.
const POLL_GRACE: Duration = Duration::from_secs(5);

// ============================================================================
// PollCommand
// ============================================================================

/// Internal commands for the command task.
enum PollCommand {
    /// POST an encoded frame.
    Send(String),
    /// Stop polling.
    Close { code: CloseCode },
}

// ============================================================================
// Shared
// ============================================================================

/// State shared by the poll task and the command task.
struct Shared {
    http: reqwest::Client,
    url: Url,
    poll_timeout: Duration,
    sink: EventSink,
    /// Server session token, set by the first 410.
    token: Mutex<Option<String>>,
    /// Open has been reported.
    opened: AtomicBool,
    /// A terminal event was reported or the transport was closed locally.
    closed: AtomicBool,
}

impl Shared {
    /// Returns the endpoint URL with the current token.
    fn url_with_token(&self) -> Url {
        let mut url = self.url.clone();
        if let Some(token) = self.token.lock().as_deref() {
            url.query_pairs_mut().append_pair("token", token);
        }
        url
    }

    /// Reports the single terminal event for this attempt.
    fn fail(&self, reason: String) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let attempt = self.sink.attempt();
        if self.opened.load(Ordering::SeqCst) {
            debug!(%attempt, %reason, "Long-poll dropped");
            self.sink.emit(TransportEvent::Close {
                code: CloseCode::ABNORMAL,
                reason,
            });
        } else {
            debug!(%attempt, %reason, "Long-poll failed to open");
            self.sink.emit(TransportEvent::Error { reason });
        }
    }

    /// Performs one poll request.
    async fn poll_once(&self) -> Result<PollStatus> {
        let response = self
            .http
            .get(self.url_with_token())
            .header(ACCEPT, "application/json")
            .timeout(self.poll_timeout + POLL_GRACE)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::connection(format!("poll returned HTTP {status}")));
        }

        let body: PollResponse = response.json().await?;
        Ok(body.into_status())
    }

    /// Publishes one frame.
    async fn post(&self, frame: String) -> Result<()> {
        let response = self
            .http
            .post(self.url_with_token())
            .header(CONTENT_TYPE, "application/json")
            .body(frame)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::connection(format!("publish returned HTTP {status}")));
        }

        let body: PollResponse = response.json().await?;
        match body.status {
            200 => Ok(()),
            other => Err(Error::connection(format!("publish returned status {other}"))),
        }
    }
}

// ============================================================================
// LongPollTransport
// ============================================================================

/// Long-poll transport instance.
pub struct LongPollTransport {
    /// Channel for sending commands to the command task.
    command_tx: mpsc::UnboundedSender<PollCommand>,
}

impl LongPollTransport {
    /// Starts polling `url`.
    ///
    /// Returns immediately; the outcome is reported through `sink`.
    #[must_use]
    pub fn open(http: reqwest::Client, url: Url, poll_timeout: Duration, sink: EventSink) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            http,
            url,
            poll_timeout,
            sink,
            token: Mutex::new(None),
            opened: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(Self::run(shared, command_rx));

        Self { command_tx }
    }

    /// Command task body. Owns the poll task.
    async fn run(shared: Arc<Shared>, mut command_rx: mpsc::UnboundedReceiver<PollCommand>) {
        let attempt = shared.sink.attempt();
        debug!(%attempt, url = %shared.url, "Long-poll starting");

        let poller = tokio::spawn(Self::poll_loop(Arc::clone(&shared)));

        while let Some(command) = command_rx.recv().await {
            match command {
                PollCommand::Send(frame) => {
                    if shared.closed.load(Ordering::SeqCst) {
                        warn!(%attempt, "Dropping frame sent after close");
                        continue;
                    }
                    if let Err(e) = shared.post(frame).await {
                        shared.fail(e.to_string());
                    }
                }

                PollCommand::Close { code } => {
                    debug!(%attempt, %code, "Long-poll closing");
                    break;
                }
            }
        }

        shared.closed.store(true, Ordering::SeqCst);
        poller.abort();

        debug!(%attempt, "Long-poll task terminated");
    }

    /// Poll task body.
    async fn poll_loop(shared: Arc<Shared>) {
        let attempt = shared.sink.attempt();

        loop {
            if shared.closed.load(Ordering::SeqCst) {
                break;
            }

            match shared.poll_once().await {
                Ok(PollStatus::Session(token)) => {
                    *shared.token.lock() = Some(token);
                    if !shared.opened.swap(true, Ordering::SeqCst) {
                        debug!(%attempt, "Long-poll open");
                        shared.sink.emit(TransportEvent::Open);
                    }
                }

                Ok(PollStatus::Messages(frames)) => {
                    trace!(%attempt, count = frames.len(), "Poll delivered frames");
                    for frame in frames {
                        if shared.closed.load(Ordering::SeqCst) {
                            break;
                        }
                        shared.sink.emit(TransportEvent::Message(frame));
                    }
                }

                Ok(PollStatus::Empty) => {}

                Ok(PollStatus::Forbidden) => {
                    shared.fail("session forbidden".to_string());
                    break;
                }

                Ok(PollStatus::Unexpected(status)) => {
                    shared.fail(format!("unexpected poll status {status}"));
                    break;
                }

                Err(e) => {
                    shared.fail(e.to_string());
                    break;
                }
            }
        }
    }
}

impl Transport for LongPollTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::LongPoll
    }

    fn send(&self, frame: String) -> Result<()> {
        self.command_tx
            .send(PollCommand::Send(frame))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self, code: CloseCode, _reason: &str) {
        let _ = self.command_tx.send(PollCommand::Close { code });
    }
}

// ============================================================================
// Tests
// ============================================================================
