//! Scripted in-memory transports for controller and socket tests.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use crate::error::Result;
use crate::protocol::{CloseCode, Message, events};

use super::{Endpoint, EventSink, Transport, TransportEvent, TransportFactory, TransportKind};

// ============================================================================
// Behavior
// ============================================================================

/// What a scripted transport does as soon as it is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behavior {
    /// Report `Open`.
    Open,
    /// Report `Error`.
    Fail,
    /// Report nothing; the test drives it through [`MockTransports::emit`].
    Silent,
}

#[derive(Default)]
struct Record {
    opened: Vec<TransportKind>,
    closed: Vec<CloseCode>,
    sent: Vec<String>,
    sinks: Vec<EventSink>,
}

// ============================================================================
// MockTransports
// ============================================================================

/// Factory handing out scripted transports.
///
/// Attempts consume the script in order; once it runs out every further
/// attempt is [`Behavior::Silent`].
#[derive(Clone, Default)]
pub(crate) struct MockTransports {
    script: Arc<Mutex<VecDeque<Behavior>>>,
    record: Arc<Mutex<Record>>,
    auto_reply: bool,
}

impl MockTransports {
    pub(crate) fn new(script: impl IntoIterator<Item = Behavior>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            ..Self::default()
        }
    }

    /// Answers every frame carrying a ref with a `phx_reply`.
    ///
    /// Topics starting with `reject:` get an `error` status.
    pub(crate) fn with_auto_reply(mut self) -> Self {
        self.auto_reply = true;
        self
    }

    pub(crate) fn opened(&self) -> Vec<TransportKind> {
        self.record.lock().opened.clone()
    }

    pub(crate) fn closed(&self) -> Vec<CloseCode> {
        self.record.lock().closed.clone()
    }

    pub(crate) fn sent(&self) -> Vec<Message> {
        self.record
            .lock()
            .sent
            .iter()
            .filter_map(|frame| Message::decode(frame).ok())
            .collect()
    }

    /// Reports an event on behalf of the `index`-th opened transport.
    pub(crate) fn emit(&self, index: usize, event: TransportEvent) -> bool {
        let sink = self.record.lock().sinks.get(index).cloned();
        sink.is_some_and(|sink| sink.emit(event))
    }
}

impl TransportFactory for MockTransports {
    fn open(&self, kind: TransportKind, _endpoint: &Endpoint, sink: EventSink) -> Box<dyn Transport> {
        let behavior = self.script.lock().pop_front().unwrap_or(Behavior::Silent);

        {
            let mut record = self.record.lock();
            record.opened.push(kind);
            record.sinks.push(sink.clone());
        }

        match behavior {
            Behavior::Open => {
                sink.emit(TransportEvent::Open);
            }
            Behavior::Fail => {
                sink.emit(TransportEvent::Error {
                    reason: "mock refused".to_string(),
                });
            }
            Behavior::Silent => {}
        }

        Box::new(MockTransport {
            kind,
            sink,
            record: Arc::clone(&self.record),
            auto_reply: self.auto_reply,
        })
    }
}

// ============================================================================
// MockTransport
// ============================================================================

struct MockTransport {
    kind: TransportKind,
    sink: EventSink,
    record: Arc<Mutex<Record>>,
    auto_reply: bool,
}

impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn send(&self, frame: String) -> Result<()> {
        self.record.lock().sent.push(frame.clone());

        if !self.auto_reply {
            return Ok(());
        }

        let request = Message::decode(&frame)?;
        if request.msg_ref.is_none() {
            return Ok(());
        }

        let status = if request.topic.starts_with("reject:") {
            "error"
        } else {
            "ok"
        };
        let reply = Message {
            join_ref: request.join_ref,
            msg_ref: request.msg_ref,
            topic: request.topic,
            event: events::REPLY.to_string(),
            payload: json!({ "status": status, "response": { "echo": request.event } }),
        };
        self.sink.emit(TransportEvent::Message(reply.encode()?));
        Ok(())
    }

    fn close(&self, code: CloseCode, _reason: &str) {
        self.record.lock().closed.push(code);
    }
}
