// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The opaque protocol capability: connect, pair, send, look up, receive.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::WapulseError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ConnectionState, Jid, OutboundPayload, ProtocolEvent, SessionKey};

/// A freshly opened protocol session.
///
/// The event stream ends when the underlying connection is gone. An ended
/// stream without a preceding `Disconnected` event is treated as a
/// recoverable disconnect.
pub struct ProtocolSession {
    pub connection: Arc<dyn ProtocolConnection>,
    pub events: mpsc::Receiver<ProtocolEvent>,
}

/// Opens protocol connections.
#[async_trait]
pub trait ProtocolConnector: PluginAdapter {
    /// Opens a connection for `key`, resuming from `credentials` when present.
    /// Without credentials the connection starts a fresh pairing handshake.
    async fn connect(
        &self,
        key: &SessionKey,
        credentials: Option<Vec<u8>>,
    ) -> Result<ProtocolSession, WapulseError>;
}

/// One live protocol connection.
///
/// Calls on a connection that has since been replaced or closed must return
/// an error rather than panic.
#[async_trait]
pub trait ProtocolConnection: Send + Sync {
    /// Asks the network whether `jid` is a registered account.
    async fn exists(&self, jid: &Jid) -> Result<bool, WapulseError>;

    async fn send(&self, to: &Jid, payload: &OutboundPayload) -> Result<(), WapulseError>;

    /// Shows a "composing" presence to `to`.
    async fn send_typing(&self, to: &Jid) -> Result<(), WapulseError>;

    /// Revokes the paired device remotely.
    async fn logout(&self) -> Result<(), WapulseError>;

    /// Closes the transport without revoking credentials.
    async fn close(&self);
}

/// A session as seen by the components that consume it.
///
/// Implemented by the supervisor's session handle; every call goes to
/// whichever connection is current at the time of the call.
#[async_trait]
pub trait ConnectionLink: Send + Sync {
    fn state(&self) -> ConnectionState;

    async fn exists(&self, jid: &Jid) -> Result<bool, WapulseError>;

    async fn send(&self, to: &Jid, payload: &OutboundPayload) -> Result<(), WapulseError>;

    async fn send_typing(&self, to: &Jid) -> Result<(), WapulseError>;
}
