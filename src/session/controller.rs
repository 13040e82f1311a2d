//! Session controller task.
//!
//! One tokio task per session owns the [`Selector`], the active transport
//! and every piece of mutable session state. Everything else talks to it
//! through channels.
//!
//! # Event Loop
//!
//! ```text
//!               ┌──────────────────────────────────────────────┐
//! Command ─────►│                                              │──► Transport::send / close
//!               │   select! {                                  │
//! (AttemptId,   │     command       → Selector / channels      │──► watch<SessionSnapshot>
//!  Transport ──►│     transport evt → Selector / routing       │
//!  Event)       │     reconnect_at  → ReconnectTimerFired      │──► broadcast<SessionEvent>
//!               │     heartbeat_at  → heartbeat / timeout      │
//!               │   }                                          │──► Channel inboxes, replies
//!               └──────────────────────────────────────────────┘
//! ```
//!
//! Replies are correlated by message ref. Requests in flight on a transport
//! that goes away are failed with [`Error::ConnectionClosed`]; frames sent
//! while no transport is open are buffered and flushed on the next open,
//! after every joined channel has been rejoined.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{AttemptId, RefCounter};
use crate::protocol::{CloseCode, Message, events};
use crate::transport::{Endpoint, EventSink, Transport, TransportEvent, TransportFactory};

use super::machine::{Effect, Input, Selector};
use super::state::{SessionEvent, SessionSnapshot};

// ============================================================================
// Constants
// ============================================================================

/// Capacity of the session event broadcast.
const EVENT_CAPACITY: usize = 256;

// ============================================================================
// Types
// ============================================================================

/// Reply sender for a correlated request.
pub(crate) type ReplySender = oneshot::Sender<Result<Message>>;

/// Commands accepted by the controller.
pub(crate) enum Command {
    /// Connect.
    Connect,
    /// User-initiated disconnect.
    Disconnect { code: CloseCode, reason: String },
    /// Send a frame, optionally waiting for the reply to its ref.
    Push {
        message: Message,
        reply_tx: Option<ReplySender>,
    },
    /// Register a channel and join it.
    Join {
        topic: String,
        join_ref: String,
        payload: Value,
        inbound_tx: mpsc::UnboundedSender<Message>,
        reply_tx: ReplySender,
    },
    /// Leave a channel.
    Leave {
        topic: String,
        msg_ref: String,
        reply_tx: ReplySender,
    },
    /// Forget a request that timed out.
    RemoveCorrelation { msg_ref: String },
    /// Close everything and stop the task.
    Teardown,
}

/// What a pending ref belongs to.
#[derive(Debug)]
enum PendingKind {
    Push,
    Join { topic: String },
    Leave,
}

struct Pending {
    kind: PendingKind,
    reply_tx: Option<ReplySender>,
}

/// A registered channel.
struct ChannelEntry {
    payload: Value,
    /// Ref of the join currently in effect.
    join_ref: Option<String>,
    /// Ref reserved for the first join, used when it is sent.
    first_join_ref: Option<String>,
    /// Caller waiting for the first join reply.
    join_waiter: Option<ReplySender>,
    inbound_tx: mpsc::UnboundedSender<Message>,
}

/// Channel ends held by the socket facade.
pub(crate) struct ControllerHandle {
    pub(crate) command_tx: mpsc::UnboundedSender<Command>,
    pub(crate) state_rx: watch::Receiver<SessionSnapshot>,
    pub(crate) events_tx: broadcast::Sender<SessionEvent>,
}

// ============================================================================
// Controller
// ============================================================================

/// State owned by the controller task.
pub(crate) struct Controller {
    selector: Selector,
    factory: Arc<dyn TransportFactory>,
    endpoint: Endpoint,
    refs: Arc<RefCounter>,

    /// Transport of the pending or open attempt.
    transport: Option<(AttemptId, Box<dyn Transport>)>,
    event_tx: mpsc::UnboundedSender<(AttemptId, TransportEvent)>,

    pending: FxHashMap<String, Pending>,
    channels: FxHashMap<String, ChannelEntry>,
    outbox: VecDeque<Message>,
    pending_heartbeat: Option<String>,

    reconnect_at: Option<Instant>,
    heartbeat_at: Option<Instant>,

    state_tx: watch::Sender<SessionSnapshot>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl Controller {
    /// Spawns the controller task.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn(
        selector: Selector,
        factory: Arc<dyn TransportFactory>,
        endpoint: Endpoint,
        refs: Arc<RefCounter>,
    ) -> ControllerHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(selector.snapshot());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let controller = Self {
            selector,
            factory,
            endpoint,
            refs,
            transport: None,
            event_tx,
            pending: FxHashMap::default(),
            channels: FxHashMap::default(),
            outbox: VecDeque::new(),
            pending_heartbeat: None,
            reconnect_at: None,
            heartbeat_at: None,
            state_tx,
            events_tx: events_tx.clone(),
        };

        tokio::spawn(controller.run(command_rx, event_rx));

        ControllerHandle {
            command_tx,
            state_rx,
            events_tx,
        }
    }

    /// Main event loop.
    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<Command>,
        mut event_rx: mpsc::UnboundedReceiver<(AttemptId, TransportEvent)>,
    ) {
        debug!(endpoint = %self.endpoint.base(), "Session controller started");

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(Command::Teardown) | None => {
                        self.apply(Input::Teardown);
                        break;
                    }
                    Some(command) => self.handle_command(command),
                },

                Some((attempt, event)) = event_rx.recv() => {
                    self.handle_transport_event(attempt, event);
                }

                () = sleep_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.apply(Input::ReconnectTimerFired);
                }

                () = sleep_until(self.heartbeat_at) => {
                    self.heartbeat_tick();
                }
            }
        }

        self.channels.clear();
        debug!("Session controller terminated");
    }

    // ========================================================================
    // State Machine
    // ========================================================================

    /// Feeds an input to the selector and carries out the effects.
    fn apply(&mut self, input: Input) {
        let had_active = self.selector.session().active_attempt().is_some();

        for effect in self.selector.step(input) {
            self.execute(effect);
        }

        let session = self.selector.session();
        let lost_active = had_active && session.active_attempt().is_none();
        let terminal = session.state().is_terminal();
        let torn_down = session.is_torn_down();

        if lost_active {
            self.heartbeat_at = None;
            self.pending_heartbeat = None;
            self.fail_pending_requests(|| Error::ConnectionClosed);
        }

        if terminal {
            let error: fn() -> Error = if torn_down {
                || Error::SessionStopped
            } else {
                || Error::ConnectionClosed
            };

            self.outbox.clear();
            self.fail_pending_requests(error);

            // Channels whose first join never went out are forgotten with it
            self.channels.retain(|topic, entry| match entry.join_waiter.take() {
                Some(reply_tx) => {
                    debug!(%topic, "Dropping channel, join never sent");
                    let _ = reply_tx.send(Err(error()));
                    false
                }
                None => true,
            });
        }

        self.state_tx.send_replace(self.selector.snapshot());
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::OpenTransport { attempt, kind } => {
                let sink = EventSink::new(attempt, self.event_tx.clone());
                let transport = self.factory.open(kind, &self.endpoint, sink);
                self.transport = Some((attempt, transport));
            }

            Effect::CloseTransport { code, reason } => {
                if let Some((attempt, transport)) = self.transport.take() {
                    debug!(%attempt, kind = %transport.kind(), %code, "Closing transport");
                    transport.close(code, &reason);
                }
            }

            Effect::ScheduleReconnect { delay } => {
                self.reconnect_at = Some(Instant::now() + delay);
            }

            Effect::CancelReconnect => {
                self.reconnect_at = None;
            }

            Effect::Emit(event) => {
                if matches!(event, SessionEvent::Open { .. }) {
                    self.on_open();
                }
                let _ = self.events_tx.send(event);
            }
        }
    }

    /// Rejoins channels, flushes buffered frames and starts heartbeats.
    fn on_open(&mut self) {
        let topics: Vec<String> = self.channels.keys().cloned().collect();
        for topic in topics {
            self.send_join(&topic);
        }

        let buffered = std::mem::take(&mut self.outbox);
        if !buffered.is_empty() {
            debug!(count = buffered.len(), "Flushing buffered frames");
        }
        for message in buffered {
            self.transmit(message);
        }

        self.pending_heartbeat = None;
        self.heartbeat_at = self
            .selector
            .config()
            .heartbeat_interval
            .map(|interval| Instant::now() + interval);
    }

    // ========================================================================
    // Transport Events
    // ========================================================================

    fn handle_transport_event(&mut self, attempt: AttemptId, event: TransportEvent) {
        match event {
            TransportEvent::Open => self.apply(Input::TransportOpen { attempt }),

            TransportEvent::Error { reason } => {
                self.apply(Input::TransportError { attempt, reason });
                self.release(attempt);
            }

            TransportEvent::Close { code, reason } => {
                self.apply(Input::TransportClose {
                    attempt,
                    code,
                    reason,
                });
                self.release(attempt);
            }

            TransportEvent::Message(text) => {
                if self.selector.session().active_attempt() == Some(attempt) {
                    self.route(&text);
                } else {
                    trace!(%attempt, "Frame from stale transport dropped");
                }
            }
        }
    }

    /// Drops the transport of a finished attempt.
    fn release(&mut self, attempt: AttemptId) {
        if self.transport.as_ref().is_some_and(|(id, _)| *id == attempt) {
            self.transport = None;
        }
    }

    /// Routes an inbound frame to its waiter or channel.
    fn route(&mut self, text: &str) {
        let message = match Message::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                return;
            }
        };

        if message.is_reply()
            && let Some(msg_ref) = message.msg_ref.as_deref()
        {
            if self.pending_heartbeat.as_deref() == Some(msg_ref) {
                trace!(msg_ref, "Heartbeat acknowledged");
                self.pending_heartbeat = None;
                return;
            }

            if let Some(pending) = self.pending.remove(msg_ref) {
                self.complete(pending, message);
                return;
            }
        }

        let Some(entry) = self.channels.get(&message.topic) else {
            trace!(topic = %message.topic, event = %message.event, "Frame for unknown topic dropped");
            return;
        };

        if message.join_ref.is_some() && message.join_ref != entry.join_ref {
            trace!(topic = %message.topic, "Frame for previous join dropped");
            return;
        }

        let topic = message.topic.clone();
        if entry.inbound_tx.send(message).is_err() {
            debug!(%topic, "Channel handle dropped, forgetting channel");
            self.channels.remove(&topic);
        }
    }

    /// Delivers a reply to its waiter.
    fn complete(&mut self, pending: Pending, reply: Message) {
        if let PendingKind::Join { topic } = &pending.kind
            && reply.reply_status() != Some("ok")
        {
            debug!(%topic, status = ?reply.reply_status(), "Join rejected");
            self.channels.remove(topic);
        }

        if let Some(reply_tx) = pending.reply_tx {
            let _ = reply_tx.send(Ok(reply));
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.apply(Input::Connect),

            Command::Disconnect { code, reason } => {
                self.apply(Input::Disconnect { code, reason });
            }

            Command::Push { message, reply_tx } => self.push(message, reply_tx),

            Command::Join {
                topic,
                join_ref,
                payload,
                inbound_tx,
                reply_tx,
            } => self.join(topic, join_ref, payload, inbound_tx, reply_tx),

            Command::Leave {
                topic,
                msg_ref,
                reply_tx,
            } => self.leave(topic, msg_ref, reply_tx),

            Command::RemoveCorrelation { msg_ref } => self.remove_correlation(&msg_ref),

            // Handled by the event loop
            Command::Teardown => {}
        }
    }

    /// Forgets a request whose caller stopped waiting.
    ///
    /// A first join that timed out also unregisters its channel, whether
    /// it was sent or still waiting for the socket to open.
    fn remove_correlation(&mut self, msg_ref: &str) {
        if let Some(pending) = self.pending.remove(msg_ref) {
            debug!(%msg_ref, "Removed timed-out correlation");
            if let PendingKind::Join { topic } = pending.kind {
                self.forget_channel(&topic, msg_ref);
            }
            return;
        }

        let unsent = self
            .channels
            .iter()
            .find(|(_, entry)| entry.first_join_ref.as_deref() == Some(msg_ref))
            .map(|(topic, _)| topic.clone());
        if let Some(topic) = unsent {
            debug!(%topic, %msg_ref, "Join timed out before open, forgetting channel");
            self.channels.remove(&topic);
        }
    }

    /// Unregisters `topic` if `join_ref` is still the join in effect.
    fn forget_channel(&mut self, topic: &str, join_ref: &str) {
        let current = self
            .channels
            .get(topic)
            .is_some_and(|entry| entry.join_ref.as_deref() == Some(join_ref));
        if current {
            debug!(%topic, %join_ref, "First join failed, forgetting channel");
            self.channels.remove(topic);
        }
    }

    fn push(&mut self, message: Message, reply_tx: Option<ReplySender>) {
        let open = self.is_open();
        let limit = self.selector.config().send_buffer_limit;

        if !open && self.outbox.len() >= limit {
            warn!(limit, topic = %message.topic, "Send buffer full, dropping frame");
            if let Some(reply_tx) = reply_tx {
                let _ = reply_tx.send(Err(Error::SendBufferFull { limit }));
            }
            return;
        }

        if let (Some(reply_tx), Some(msg_ref)) = (reply_tx, message.msg_ref.clone()) {
            self.pending.insert(
                msg_ref,
                Pending {
                    kind: PendingKind::Push,
                    reply_tx: Some(reply_tx),
                },
            );
        }

        if open {
            self.transmit(message);
        } else {
            trace!(topic = %message.topic, event = %message.event, "Buffering frame");
            self.outbox.push_back(message);
        }
    }

    fn join(
        &mut self,
        topic: String,
        join_ref: String,
        payload: Value,
        inbound_tx: mpsc::UnboundedSender<Message>,
        reply_tx: ReplySender,
    ) {
        let entry = ChannelEntry {
            payload,
            join_ref: None,
            first_join_ref: Some(join_ref),
            join_waiter: Some(reply_tx),
            inbound_tx,
        };

        if self.channels.insert(topic.clone(), entry).is_some() {
            debug!(%topic, "Replacing existing channel");
        }

        if self.is_open() {
            self.send_join(&topic);
        }
    }

    fn send_join(&mut self, topic: &str) {
        let Some(entry) = self.channels.get_mut(topic) else {
            return;
        };

        let join_ref = entry
            .first_join_ref
            .take()
            .unwrap_or_else(|| self.refs.next());
        entry.join_ref = Some(join_ref.clone());

        let message = Message::join(topic, join_ref.clone(), entry.payload.clone());
        let reply_tx = entry.join_waiter.take();

        debug!(%topic, %join_ref, "Joining channel");

        self.pending.insert(
            join_ref,
            Pending {
                kind: PendingKind::Join {
                    topic: topic.to_string(),
                },
                reply_tx,
            },
        );
        self.transmit(message);
    }

    fn leave(&mut self, topic: String, msg_ref: String, reply_tx: ReplySender) {
        let Some(entry) = self.channels.remove(&topic) else {
            let _ = reply_tx.send(Err(Error::protocol(format!("Not joined to {topic}"))));
            return;
        };

        if !self.is_open() {
            // Nothing on the server to leave
            let reply = Message::new(
                topic,
                events::REPLY,
                json!({ "status": "ok", "response": {} }),
            )
            .with_ref(msg_ref);
            let _ = reply_tx.send(Ok(reply));
            return;
        }

        debug!(%topic, "Leaving channel");

        self.pending.insert(
            msg_ref.clone(),
            Pending {
                kind: PendingKind::Leave,
                reply_tx: Some(reply_tx),
            },
        );
        self.transmit(Message::leave(topic, entry.join_ref, msg_ref));
    }

    // ========================================================================
    // Heartbeat
    // ========================================================================

    fn heartbeat_tick(&mut self) {
        self.heartbeat_at = None;

        if !self.is_open() {
            return;
        }

        if let Some(msg_ref) = self.pending_heartbeat.take() {
            warn!(%msg_ref, "Heartbeat unanswered");
            self.apply(Input::HeartbeatTimeout);
            return;
        }

        let msg_ref = self.refs.next();
        trace!(%msg_ref, "Sending heartbeat");
        self.pending_heartbeat = Some(msg_ref.clone());
        self.transmit(Message::heartbeat(msg_ref));

        self.heartbeat_at = self
            .selector
            .config()
            .heartbeat_interval
            .map(|interval| Instant::now() + interval);
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn is_open(&self) -> bool {
        self.selector.session().state().is_open() && self.transport.is_some()
    }

    /// Encodes and sends a frame on the open transport.
    fn transmit(&mut self, mut message: Message) {
        if message.join_ref.is_none()
            && message.event != events::JOIN
            && let Some(entry) = self.channels.get(&message.topic)
        {
            message.join_ref = entry.join_ref.clone();
        }

        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, topic = %message.topic, "Failed to encode frame");
                if let Some(pending) = message.msg_ref.and_then(|r| self.pending.remove(&r))
                    && let Some(reply_tx) = pending.reply_tx
                {
                    let _ = reply_tx.send(Err(e));
                }
                return;
            }
        };

        let Some((attempt, transport)) = &self.transport else {
            return;
        };

        // A dead transport reports its own close
        if let Err(e) = transport.send(frame) {
            debug!(%attempt, error = %e, "Transport send failed");
        }
    }

    /// Fails every pending request.
    ///
    /// A channel whose first join is among them is unregistered, since its
    /// caller sees the join fail.
    fn fail_pending_requests(&mut self, error: fn() -> Error) {
        let pending: Vec<_> = self.pending.drain().collect();
        let count = pending.len();

        for (msg_ref, Pending { kind, reply_tx }) in pending {
            let Some(reply_tx) = reply_tx else {
                continue;
            };
            if let PendingKind::Join { topic } = kind {
                self.forget_channel(&topic, &msg_ref);
            }
            let _ = reply_tx.send(Err(error()));
        }

        if count > 0 {
            debug!(count, "Failed pending requests");
        }
    }
}

/// Sleeps until `deadline`, or forever if there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================
