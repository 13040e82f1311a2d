//! WebSocket transport.
//!
//! The primary transport. Each instance spawns one tokio task that connects,
//! then multiplexes between the socket and commands from the controller.
//!
//! # Event Loop
//!
//! - Text frames from the server → [`TransportEvent::Message`]
//! - Close frame, stream end or socket error → [`TransportEvent::Close`]
//! - Handshake failure → [`TransportEvent::Error`]
//! - `Send` command → text frame to the server
//! - `Close` command → close frame with the given code, then stop silently
//!
//! `wss://` URLs are served over rustls with the webpki root store.

// ============================================================================
// Imports
// ============================================================================

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::CloseCode;

use super::{EventSink, Transport, TransportEvent, TransportKind};

/// Client stream, TLS-wrapped for `wss://`.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// WsCommand
// ============================================================================

/// Internal commands for the I/O task.
enum WsCommand {
    /// Send an encoded frame.
    Send(String),
    /// Close the socket.
    Close { code: CloseCode, reason: String },
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// WebSocket transport instance.
///
/// Dropping the handle without calling [`Transport::close`] stops the I/O
/// task as well, with a normal close.
pub struct WebSocketTransport {
    /// Channel for sending commands to the I/O task.
    command_tx: mpsc::UnboundedSender<WsCommand>,
}

impl WebSocketTransport {
    /// Starts connecting to `url`.
    ///
    /// Returns immediately; the outcome is reported through `sink`.
    #[must_use]
    pub fn open(url: Url, sink: EventSink) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::run(url, command_rx, sink));

        Self { command_tx }
    }

    /// I/O task body.
    async fn run(url: Url, mut command_rx: mpsc::UnboundedReceiver<WsCommand>, sink: EventSink) {
        let attempt = sink.attempt();
        debug!(%attempt, %url, "WebSocket connecting");

        let connect = Self::handshake(&url);
        tokio::pin!(connect);

        let ws_stream = loop {
            tokio::select! {
                result = &mut connect => match result {
                    Ok(stream) => break stream,
                    Err(e) => {
                        debug!(%attempt, error = %e, "WebSocket handshake failed");
                        sink.emit(TransportEvent::Error { reason: e.to_string() });
                        return;
                    }
                },

                command = command_rx.recv() => match command {
                    Some(WsCommand::Send(_)) => {
                        warn!(%attempt, "Dropping frame sent before open");
                    }
                    Some(WsCommand::Close { code, .. }) => {
                        debug!(%attempt, %code, "WebSocket closed before open");
                        return;
                    }
                    None => return,
                },
            }
        };

        debug!(%attempt, "WebSocket open");
        if !sink.emit(TransportEvent::Open) {
            return;
        }

        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming frames from the server
                message = ws_read.next() => {
                    match message {
                        Some(Ok(WsMessage::Text(text))) => {
                            trace!(%attempt, len = text.len(), "Frame received");
                            sink.emit(TransportEvent::Message(text.as_str().to_owned()));
                        }

                        Some(Ok(WsMessage::Close(frame))) => {
                            let (code, reason) = match frame {
                                Some(frame) => (
                                    CloseCode::new(u16::from(frame.code)),
                                    frame.reason.as_str().to_owned(),
                                ),
                                None => (CloseCode::NO_STATUS, String::new()),
                            };
                            debug!(%attempt, %code, "WebSocket closed by remote");
                            sink.emit(TransportEvent::Close { code, reason });
                            break;
                        }

                        Some(Err(e)) => {
                            let e = Error::from(e);
                            debug!(%attempt, error = %e, "WebSocket error");
                            sink.emit(TransportEvent::Close {
                                code: CloseCode::ABNORMAL,
                                reason: e.to_string(),
                            });
                            break;
                        }

                        None => {
                            debug!(%attempt, "WebSocket stream ended");
                            sink.emit(TransportEvent::Close {
                                code: CloseCode::ABNORMAL,
                                reason: "stream ended".to_string(),
                            });
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the controller
                command = command_rx.recv() => {
                    match command {
                        Some(WsCommand::Send(frame)) => {
                            let sent = ws_write
                                .send(WsMessage::Text(frame.into()))
                                .await
                                .map_err(Error::from);
                            if let Err(e) = sent {
                                debug!(%attempt, error = %e, "WebSocket write failed");
                                sink.emit(TransportEvent::Close {
                                    code: CloseCode::ABNORMAL,
                                    reason: e.to_string(),
                                });
                                break;
                            }
                        }

                        Some(WsCommand::Close { code, reason }) => {
                            debug!(%attempt, %code, "WebSocket closing");
                            let frame = CloseFrame {
                                code: code.on_wire().as_u16().into(),
                                reason: reason.into(),
                            };
                            let _ = ws_write.send(WsMessage::Close(Some(frame))).await;
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!(%attempt, "Transport handle dropped");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        debug!(%attempt, "WebSocket task terminated");
    }

    /// Opens the TCP connection and runs the upgrade handshake.
    async fn handshake(url: &Url) -> Result<WsStream> {
        let (stream, _response) = connect_async(url.as_str()).await?;
        Ok(stream)
    }
}

impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn send(&self, frame: String) -> Result<()> {
        self.command_tx
            .send(WsCommand::Send(frame))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self, code: CloseCode, reason: &str) {
        let _ = self.command_tx.send(WsCommand::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    use crate::identifiers::AttemptId;

    type Events = mpsc::UnboundedReceiver<(crate::identifiers::AttemptId, TransportEvent)>;

    fn sink() -> (EventSink, Events) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSink::new(AttemptId::new(1), tx), rx)
    }

    async fn next_event(events: &mut Events) -> TransportEvent {
        timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event within timeout")
            .expect("channel open")
            .1
    }

    /// Spawns a one-shot server that echoes text frames back.
    async fn echo_server() -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("upgrade");
            while let Some(Ok(message)) = ws.next().await {
                match message {
                    WsMessage::Text(_) => {
                        if ws.send(message).await.is_err() {
                            break;
                        }
                    }
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
        });

        Url::parse(&format!("ws://127.0.0.1:{port}/live/websocket")).expect("url")
    }

    #[tokio::test]
    async fn test_open_and_echo() {
        let url = echo_server().await;
        let (sink, mut events) = sink();

        let transport = WebSocketTransport::open(url, sink);
        assert_eq!(next_event(&mut events).await, TransportEvent::Open);

        transport.send("[null,null,\"t\",\"e\",{}]".to_string()).expect("send");
        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::Message("[null,null,\"t\",\"e\",{}]".to_string())
        );

        transport.close(CloseCode::NORMAL, "done");
    }

    #[tokio::test]
    async fn test_refused_reports_error() {
        // Bind then drop to obtain a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let url = Url::parse(&format!("ws://127.0.0.1:{port}/live/websocket")).expect("url");
        let (sink, mut events) = sink();

        let _transport = WebSocketTransport::open(url, sink);
        match next_event(&mut events).await {
            TransportEvent::Error { reason } => {
                assert!(reason.starts_with("WebSocket error:"), "{reason}");
            }
            other => panic!("expected handshake error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_local_close_reports_nothing() {
        let url = echo_server().await;
        let (sink, mut events) = sink();

        let transport = WebSocketTransport::open(url, sink);
        assert_eq!(next_event(&mut events).await, TransportEvent::Open);

        transport.close(CloseCode::FALLBACK_SWAP, "fallback");

        // Either nothing arrives or the sink is dropped with the task
        let after = timeout(Duration::from_millis(200), events.recv()).await;
        assert!(
            !matches!(after, Ok(Some(_))),
            "no event expected after local close"
        );
    }

    #[tokio::test]
    async fn test_reserved_close_code_sent_as_normal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let (frame_tx, frame_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("upgrade");
            while let Some(Ok(message)) = ws.next().await {
                if let WsMessage::Close(frame) = message {
                    let frame = frame.map(|f| (u16::from(f.code), f.reason.as_str().to_owned()));
                    let _ = frame_tx.send(frame);
                    break;
                }
            }
        });

        let url = Url::parse(&format!("ws://127.0.0.1:{port}/live/websocket")).expect("url");
        let (sink, mut events) = sink();
        let transport = WebSocketTransport::open(url, sink);
        assert_eq!(next_event(&mut events).await, TransportEvent::Open);

        transport.close(CloseCode::ABNORMAL, "heartbeat timeout");

        let frame = timeout(Duration::from_secs(5), frame_rx)
            .await
            .expect("close within timeout")
            .expect("server saw close");
        assert_eq!(frame, Some((1000, "heartbeat timeout".to_string())));
    }

    #[tokio::test]
    async fn test_wss_starts_tls_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let mut record_type = [0u8; 1];
            stream.read_exact(&mut record_type).await.expect("read");
            record_type[0]
        });

        let url = Url::parse(&format!("wss://127.0.0.1:{port}/live/websocket")).expect("url");
        let (sink, mut events) = sink();
        let _transport = WebSocketTransport::open(url, sink);

        // 0x16 is a TLS handshake record (ClientHello)
        let record_type = timeout(Duration::from_secs(5), server)
            .await
            .expect("connection within timeout")
            .expect("server task");
        assert_eq!(record_type, 0x16);

        match next_event(&mut events).await {
            TransportEvent::Error { reason } => {
                assert!(!reason.contains("TLS support not compiled in"), "{reason}");
            }
            other => panic!("expected handshake error, got {other:?}"),
        }
    }

    #[test]
    fn test_kind() {
        let (command_tx, _command_rx) = mpsc::unbounded_channel();
        let transport = WebSocketTransport { command_tx };
        assert_eq!(transport.kind(), TransportKind::WebSocket);
    }
}
