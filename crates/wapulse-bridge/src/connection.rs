// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One sidecar socket per protocol session.
//!
//! A writer task owns the sink and a reader task owns the stream. Requests
//! wait on a oneshot keyed by request id until the matching `response` frame
//! arrives or the request timeout elapses.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use wapulse_core::{Jid, OutboundPayload, ProtocolConnection, ProtocolEvent, WapulseError};

use crate::wire::{ClientFrame, Incoming, Reply, SendContent, decode};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Pending = Arc<DashMap<u64, oneshot::Sender<Reply>>>;

pub struct BridgeConnection {
    session: String,
    outgoing: mpsc::UnboundedSender<Message>,
    pending: Pending,
    next_id: AtomicU64,
    request_timeout: Duration,
    closed: CancellationToken,
}

impl BridgeConnection {
    /// Splits `socket` into reader and writer tasks. Decoded events go to
    /// `events`; the channel closes when the socket does.
    pub(crate) fn spawn(
        session: String,
        socket: Socket,
        events: mpsc::Sender<ProtocolEvent>,
        request_timeout: Duration,
    ) -> Self {
        let (sink, stream) = socket.split();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let pending: Pending = Arc::new(DashMap::new());
        let closed = CancellationToken::new();

        tokio::spawn(write_loop(sink, outgoing_rx, closed.clone()));
        tokio::spawn(read_loop(
            session.clone(),
            stream,
            events,
            Arc::clone(&pending),
            outgoing.clone(),
            closed.clone(),
        ));

        Self {
            session,
            outgoing,
            pending,
            next_id: AtomicU64::new(1),
            request_timeout,
            closed,
        }
    }

    /// Queues a frame that expects no reply.
    pub(crate) fn push(&self, frame: &ClientFrame) -> Result<(), WapulseError> {
        let text = encode(frame)?;
        self.outgoing
            .send(Message::text(text))
            .map_err(|_| self.closed_error())
    }

    fn closed_error(&self) -> WapulseError {
        WapulseError::protocol(format!("bridge connection for {} is closed", self.session))
    }

    async fn request(&self, build: impl FnOnce(u64) -> ClientFrame) -> Result<Reply, WapulseError> {
        if self.closed.is_cancelled() {
            return Err(self.closed_error());
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = encode(&build(id))?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        if self.outgoing.send(Message::text(frame)).is_err() {
            self.pending.remove(&id);
            return Err(self.closed_error());
        }

        let reply = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(self.closed_error()),
            Err(_) => {
                self.pending.remove(&id);
                return Err(WapulseError::Timeout {
                    duration: self.request_timeout,
                });
            }
        };
        if reply.ok {
            Ok(reply)
        } else {
            Err(WapulseError::protocol(
                reply
                    .error
                    .unwrap_or_else(|| "bridge request failed".to_string()),
            ))
        }
    }
}

fn encode(frame: &ClientFrame) -> Result<String, WapulseError> {
    serde_json::to_string(frame).map_err(|e| WapulseError::Protocol {
        message: format!("failed to encode bridge frame: {e}"),
        source: Some(Box::new(e)),
    })
}

#[async_trait]
impl ProtocolConnection for BridgeConnection {
    async fn exists(&self, jid: &Jid) -> Result<bool, WapulseError> {
        let reply = self
            .request(|id| ClientFrame::Exists {
                id,
                jid: jid.to_string(),
            })
            .await?;
        Ok(reply.exists.unwrap_or(false))
    }

    async fn send(&self, to: &Jid, payload: &OutboundPayload) -> Result<(), WapulseError> {
        self.request(|id| ClientFrame::Send {
            id,
            to: to.to_string(),
            content: SendContent::from(payload),
        })
        .await
        .map(drop)
    }

    async fn send_typing(&self, to: &Jid) -> Result<(), WapulseError> {
        self.request(|id| ClientFrame::Typing {
            id,
            to: to.to_string(),
        })
        .await
        .map(drop)
    }

    async fn logout(&self) -> Result<(), WapulseError> {
        self.request(|id| ClientFrame::Logout { id }).await.map(drop)
    }

    async fn close(&self) {
        if !self.closed.is_cancelled() {
            debug!(session = %self.session, "closing bridge connection");
            self.closed.cancel();
        }
    }
}

impl Drop for BridgeConnection {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

async fn write_loop(
    mut sink: futures::stream::SplitSink<Socket, Message>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    closed: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            message = outgoing.recv() => {
                let Some(message) = message else { break };
                if let Err(e) = sink.send(message).await {
                    warn!(error = %e, "bridge write failed");
                    closed.cancel();
                    return;
                }
            }
        }
    }
    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
}

async fn read_loop(
    session: String,
    mut stream: futures::stream::SplitStream<Socket>,
    events: mpsc::Sender<ProtocolEvent>,
    pending: Pending,
    outgoing: mpsc::UnboundedSender<Message>,
    closed: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = closed.cancelled() => break,
            frame = stream.next() => frame,
        };
        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Ping(data))) => {
                let _ = outgoing.send(Message::Pong(data));
                continue;
            }
            Some(Ok(Message::Close(_))) | None => {
                debug!(session = %session, "bridge socket closed by sidecar");
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!(session = %session, error = %e, "bridge read failed");
                break;
            }
        };

        match decode(&text) {
            Ok(Incoming::Event(event)) => {
                trace!(session = %session, ?event, "bridge event");
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Ok(Incoming::Reply { id, reply }) => match pending.remove(&id) {
                Some((_, waiter)) => {
                    let _ = waiter.send(reply);
                }
                None => debug!(session = %session, id, "reply for unknown request"),
            },
            Ok(Incoming::Ignored) => {}
            Err(e) => warn!(session = %session, error = %e, "ignoring bridge frame"),
        }
    }
    closed.cancel();
    // Dropping the waiters fails every in-flight request.
    pending.clear();
}
