// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared handle to one supervised session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::warn;
use wapulse_core::{
    ConnectionLink, ConnectionState, InboundEnvelope, Jid, OutboundPayload, ProtocolConnection,
    SessionKey, WapulseError,
};

struct ConnectionSlot {
    connection: Arc<dyn ProtocolConnection>,
    generation: u64,
}

/// The supervisor's view of a session, and the [`ConnectionLink`] handed out
/// to the filter engine, the campaign dispatcher and the auto-responder.
///
/// The current connection sits in an atomically swappable slot. A caller that
/// loaded a connection just before a reconnect keeps talking to the old one,
/// which fails cleanly once closed. All I/O through the link is serialized by
/// one lock, so a connection never sees concurrent writes from this side.
pub struct SessionHandle {
    key: SessionKey,
    state: watch::Sender<ConnectionState>,
    slot: ArcSwapOption<ConnectionSlot>,
    generation: AtomicU64,
    io_lock: tokio::sync::Mutex<()>,
    inbound: mpsc::Sender<InboundEnvelope>,
    cancel: CancellationToken,
    last_error: Mutex<Option<String>>,
}

impl SessionHandle {
    pub(crate) fn new(
        key: SessionKey,
        inbound_buffer: usize,
        cancel: CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<InboundEnvelope>) {
        let (inbound, inbound_rx) = mpsc::channel(inbound_buffer.max(1));
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let handle = Arc::new(Self {
            key,
            state,
            slot: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            io_lock: tokio::sync::Mutex::new(()),
            inbound,
            cancel,
            last_error: Mutex::new(None),
        });
        (handle, inbound_rx)
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Watches state changes. The current value is available immediately.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// Number of connections opened for this handle so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    pub(crate) fn set_last_error(&self, error: impl Into<String>) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = Some(error.into());
        }
    }

    /// Installs a new connection and returns its generation.
    pub(crate) fn install(&self, connection: Arc<dyn ProtocolConnection>) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.slot.store(Some(Arc::new(ConnectionSlot {
            connection,
            generation,
        })));
        generation
    }

    /// Empties the slot and returns the connection that was in it.
    pub(crate) fn take_connection(&self) -> Option<Arc<dyn ProtocolConnection>> {
        self.slot.swap(None).map(|slot| Arc::clone(&slot.connection))
    }

    pub(crate) fn deliver(&self, envelope: InboundEnvelope) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.inbound.try_send(envelope) {
            warn!(session = %self.key, "inbound queue full, message dropped");
        }
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn current(&self) -> Result<Arc<dyn ProtocolConnection>, WapulseError> {
        let not_connected = || WapulseError::NotConnected {
            session: self.key.to_string(),
        };
        if !self.state().is_connected() {
            return Err(not_connected());
        }
        self.slot
            .load_full()
            .map(|slot| {
                tracing::trace!(session = %self.key, generation = slot.generation, "using connection");
                Arc::clone(&slot.connection)
            })
            .ok_or_else(not_connected)
    }
}

#[async_trait]
impl ConnectionLink for SessionHandle {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    async fn exists(&self, jid: &Jid) -> Result<bool, WapulseError> {
        let _io = self.io_lock.lock().await;
        self.current()?.exists(jid).await
    }

    async fn send(&self, to: &Jid, payload: &OutboundPayload) -> Result<(), WapulseError> {
        let _io = self.io_lock.lock().await;
        self.current()?.send(to, payload).await
    }

    async fn send_typing(&self, to: &Jid) -> Result<(), WapulseError> {
        let _io = self.io_lock.lock().await;
        self.current()?.send_typing(to).await
    }
}
