//! Transport seam between the session loop and the socket.
//!
//! A transport is a stream of [`TransportEvent`]s plus a way to close it.
//! [`WsTransport`] talks to the simulation server over WebSocket;
//! [`ChannelTransport`] is fed in-process, for embedding and tests.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::Stream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::protocol::InboundMessage;

/// Something that happened on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Failed(String),
    Closed,
}

impl TransportEvent {
    /// No further events follow a terminal one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportEvent::Failed(_) | TransportEvent::Closed)
    }
}

pub trait Transport: Stream<Item = TransportEvent> + Unpin + Send {
    /// Close the underlying connection. Must be safe to call repeatedly.
    fn close(&mut self);
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// WebSocket client transport. The connection is made by a background task
/// which forwards every frame as an event; `Opened` or `Failed` is always the
/// first event.
pub struct WsTransport {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    close_tx: Option<oneshot::Sender<()>>,
}

impl WsTransport {
    pub fn connect(url: impl Into<String>) -> Self {
        let url = url.into();
        let (tx, events) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();
        tokio::spawn(pump(url, tx, close_rx));
        Self { events, close_tx: Some(close_tx) }
    }
}

async fn pump(
    url: String,
    tx: mpsc::UnboundedSender<TransportEvent>,
    mut close_rx: oneshot::Receiver<()>,
) {
    let ws = tokio::select! {
        _ = &mut close_rx => return,
        res = tokio_tungstenite::connect_async(url.as_str()) => match res {
            Ok((ws, _response)) => ws,
            Err(e) => {
                let _ = tx.send(TransportEvent::Failed(e.to_string()));
                return;
            }
        },
    };
    info!(%url, "websocket connected");
    let _ = tx.send(TransportEvent::Opened);

    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            _ = &mut close_rx => {
                if let Err(e) = sink.send(WsMessage::Close(None)).await {
                    debug!(error = %e, "close frame not delivered");
                }
                break;
            }
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if tx.send(TransportEvent::Message(text)).is_err() {
                        break;
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    let _ = tx.send(TransportEvent::Closed);
                    break;
                }
                Some(Ok(_)) => {} // binary / ping / pong
                Some(Err(e)) => {
                    warn!(error = %e, "websocket read failed");
                    let _ = tx.send(TransportEvent::Failed(e.to_string()));
                    break;
                }
            }
        }
    }
}

impl Stream for WsTransport {
    type Item = TransportEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Transport for WsTransport {
    fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
        self.events.close();
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// In-process channel
// ---------------------------------------------------------------------------

/// Transport fed from an unbounded channel.
pub struct ChannelTransport {
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Producer half of a [`ChannelTransport`].
#[derive(Debug, Clone)]
pub struct ChannelFeed {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl ChannelTransport {
    pub fn new() -> (ChannelFeed, Self) {
        let (tx, events) = mpsc::unbounded_channel();
        (ChannelFeed { tx }, Self { events })
    }
}

impl Stream for ChannelTransport {
    type Item = TransportEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Transport for ChannelTransport {
    fn close(&mut self) {
        self.events.close();
    }
}

impl ChannelFeed {
    /// Push a raw event. Returns `false` once the transport was closed.
    pub fn push(&self, event: TransportEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn open(&self) -> bool {
        self.push(TransportEvent::Opened)
    }

    pub fn text(&self, raw: impl Into<String>) -> bool {
        self.push(TransportEvent::Message(raw.into()))
    }

    pub fn message(&self, msg: &InboundMessage) -> bool {
        self.text(msg.encode())
    }

    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.push(TransportEvent::Failed(reason.into()))
    }

    pub fn close(&self) -> bool {
        self.push(TransportEvent::Closed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
