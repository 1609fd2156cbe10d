//! Push channel transport adapter.
//!
//! Wraps a message-queue style duplex connection behind the narrow
//! [`PushTransport`] trait: connect, per-destination subscribe, publish,
//! disconnect, plus a lifecycle event stream. The wire framing is a small
//! tagged-JSON protocol over one websocket; upper layers never see it —
//! they consume [`TransportEvent`]s and destination strings only.
//!
//! Contract notes:
//! - exactly one active subscription per destination; a duplicate subscribe
//!   is a warned no-op (prevents doubled message handling)
//! - publish while disconnected fails fast with `NotConnected`
//! - disconnect unsubscribes every destination before tearing the socket
//!   down, so no handler fires on a half-closed connection

use std::collections::HashSet;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{NotifyError, Result};

/// Wire frames exchanged with the push endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Client → server: present the bearer credential.
    Connect { token: String },
    /// Client → server: start receiving messages for a destination.
    Subscribe { destination: String },
    /// Client → server: stop receiving messages for a destination.
    Unsubscribe { destination: String },
    /// Client → server: fire-and-forget publish.
    Send {
        destination: String,
        body: serde_json::Value,
    },
    /// Server → client: a message delivered to a subscribed destination.
    Message {
        destination: String,
        body: serde_json::Value,
    },
    /// Server → client: protocol-level error report.
    Error { message: String },
}

/// Lifecycle events consumed by the reconnection controller, never by
/// upper layers directly.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The connection dropped (socket close or error).
    Disconnected { reason: String },
    /// A message arrived for a subscribed destination.
    Message {
        destination: String,
        body: serde_json::Value,
    },
    /// The server reported a protocol error (may be auth-class).
    ProtocolError { message: String },
}

/// Narrow transport seam so the underlying socket library is swappable
/// and mockable in tests.
#[async_trait]
pub trait PushTransport: Send {
    /// Establish one connection for the authenticated session.
    /// Fails with `Auth` when no usable credential is present.
    async fn connect(&mut self, token: &str) -> Result<()>;

    /// Register interest in a destination. Duplicate subscribe is a
    /// warned no-op.
    async fn subscribe(&mut self, destination: &str) -> Result<()>;

    /// Drop interest in a destination. No-op if absent.
    async fn unsubscribe(&mut self, destination: &str) -> Result<()>;

    /// Fire-and-forget send. Fails fast with `NotConnected` when down.
    async fn publish(&mut self, destination: &str, body: serde_json::Value) -> Result<()>;

    /// Unsubscribe all destinations, then tear down the connection.
    async fn disconnect(&mut self);

    /// Next lifecycle event. Returns `None` once the transport is torn down.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Whether the underlying connection is currently active.
    fn is_connected(&self) -> bool;

    /// Currently registered destinations.
    fn subscriptions(&self) -> Vec<String>;
}

type WsSink = futures::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<TcpStream>>,
    WsMessage,
>;

struct WsConnection {
    sink: WsSink,
    events: mpsc::Receiver<TransportEvent>,
    reader: JoinHandle<()>,
}

/// Websocket-backed transport.
pub struct WsTransport {
    url: String,
    conn: Option<WsConnection>,
    subscriptions: HashSet<String>,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            conn: None,
            subscriptions: HashSet::new(),
        }
    }

    async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        let conn = self.conn.as_mut().ok_or(NotifyError::NotConnected)?;
        let text = serde_json::to_string(frame)?;
        conn.sink
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| NotifyError::connection(e.to_string()))
    }

    /// Reader task: turns inbound frames into transport events. Sends a
    /// terminal `Disconnected` when the stream ends, then exits.
    async fn read_loop(
        mut stream: futures::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
        events: mpsc::Sender<TransportEvent>,
    ) {
        let reason = loop {
            match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<Frame>(&text) {
                        Ok(Frame::Message { destination, body }) => {
                            if events
                                .send(TransportEvent::Message { destination, body })
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                        Ok(Frame::Error { message }) => {
                            if events
                                .send(TransportEvent::ProtocolError { message })
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                        Ok(other) => {
                            debug!(frame = ?other, "ignoring client-bound frame echo");
                        }
                        Err(e) => {
                            warn!(error = %e, "unparseable frame on push channel");
                        }
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    break frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "closed by server".to_string());
                }
                Some(Ok(_)) => {} // ping/pong/binary: nothing to deliver
                Some(Err(e)) => break e.to_string(),
                None => break "stream ended".to_string(),
            }
        };
        let _ = events.send(TransportEvent::Disconnected { reason }).await;
    }
}

#[async_trait]
impl PushTransport for WsTransport {
    async fn connect(&mut self, token: &str) -> Result<()> {
        if token.is_empty() {
            return Err(NotifyError::auth("no credential available"));
        }
        if self.conn.is_some() {
            debug!("connect called while already connected, tearing down first");
            self.disconnect().await;
        }

        let (ws, _resp) = connect_async(&self.url)
            .await
            .map_err(|e| NotifyError::connection(e.to_string()))?;
        let (sink, stream) = ws.split();
        let (tx, rx) = mpsc::channel(64);
        let reader = tokio::spawn(Self::read_loop(stream, tx));

        self.conn = Some(WsConnection {
            sink,
            events: rx,
            reader,
        });
        self.send_frame(&Frame::Connect {
            token: token.to_string(),
        })
        .await?;
        debug!(url = %self.url, "push channel established");
        Ok(())
    }

    async fn subscribe(&mut self, destination: &str) -> Result<()> {
        if self.conn.is_none() {
            return Err(NotifyError::NotConnected);
        }
        if self.subscriptions.contains(destination) {
            warn!(destination, "already subscribed, ignoring duplicate subscribe");
            return Ok(());
        }
        self.send_frame(&Frame::Subscribe {
            destination: destination.to_string(),
        })
        .await?;
        self.subscriptions.insert(destination.to_string());
        debug!(destination, "subscribed");
        Ok(())
    }

    async fn unsubscribe(&mut self, destination: &str) -> Result<()> {
        if !self.subscriptions.remove(destination) {
            return Ok(());
        }
        if self.conn.is_some() {
            self.send_frame(&Frame::Unsubscribe {
                destination: destination.to_string(),
            })
            .await?;
        }
        debug!(destination, "unsubscribed");
        Ok(())
    }

    async fn publish(&mut self, destination: &str, body: serde_json::Value) -> Result<()> {
        if self.conn.is_none() {
            return Err(NotifyError::NotConnected);
        }
        self.send_frame(&Frame::Send {
            destination: destination.to_string(),
            body,
        })
        .await
    }

    async fn disconnect(&mut self) {
        // Ordering matters: unsubscribe-then-deactivate, so no handler
        // callback fires on a half-closed connection.
        let destinations: Vec<String> = self.subscriptions.iter().cloned().collect();
        for destination in destinations {
            if let Err(e) = self.unsubscribe(&destination).await {
                debug!(destination = %destination, error = %e, "unsubscribe during teardown failed");
            }
        }
        self.subscriptions.clear();

        if let Some(mut conn) = self.conn.take() {
            let _ = conn.sink.send(WsMessage::Close(None)).await;
            conn.reader.abort();
        }
        debug!("push channel torn down");
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        match self.conn.as_mut() {
            Some(conn) => conn.events.recv().await,
            None => None,
        }
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.iter().cloned().collect()
    }
}

/// Per-user destination for single notification pushes.
pub fn notifications_destination(email: &str) -> String {
    format!("user/{}/topic/notifications", email)
}

/// Per-user destination for aggregate summary pushes.
pub fn summary_destination(email: &str) -> String {
    format!("user/{}/topic/notification-summary", email)
}
