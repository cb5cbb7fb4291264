// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket protocol connector for Wapulse.
//!
//! The WhatsApp protocol itself lives in an external sidecar process. This
//! crate opens one socket per session, announces the session (and any stored
//! credentials) in a `connect` frame, then exchanges JSON frames described in
//! [`wire`].

pub mod connection;
pub mod wire;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tracing::{debug, info};
use wapulse_config::model::BridgeConfig;
use wapulse_core::{
    AdapterType, HealthStatus, PluginAdapter, ProtocolConnector, ProtocolSession, SessionKey,
    WapulseError,
};

pub use connection::BridgeConnection;
pub use wire::normalize_message;

use crate::wire::ClientFrame;

/// Opens protocol sessions through the WhatsApp sidecar's WebSocket.
pub struct BridgeConnector {
    url: String,
    request_timeout: Duration,
    inbound_buffer: usize,
}

impl BridgeConnector {
    pub fn new(config: &BridgeConfig, inbound_buffer: usize) -> Self {
        Self {
            url: config.url.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            inbound_buffer: inbound_buffer.max(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PluginAdapter for BridgeConnector {
    fn name(&self) -> &str {
        "bridge"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Protocol
    }

    async fn health_check(&self) -> Result<HealthStatus, WapulseError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WapulseError> {
        debug!(url = %self.url, "bridge connector shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProtocolConnector for BridgeConnector {
    async fn connect(
        &self,
        key: &SessionKey,
        credentials: Option<Vec<u8>>,
    ) -> Result<ProtocolSession, WapulseError> {
        let session = key.storage_name();
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| WapulseError::Protocol {
                message: format!("failed to reach protocol sidecar at {}: {e}", self.url),
                source: Some(Box::new(e)),
            })?;

        let (events_tx, events) = mpsc::channel(self.inbound_buffer);
        let connection =
            BridgeConnection::spawn(session.clone(), socket, events_tx, self.request_timeout);
        connection.push(&ClientFrame::connect(session.clone(), credentials.as_deref()))?;
        info!(
            session = %session,
            resumed = credentials.is_some(),
            "bridge session opened"
        );

        Ok(ProtocolSession {
            connection: Arc::new(connection),
            events,
        })
    }
}
