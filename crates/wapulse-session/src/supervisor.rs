// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection supervisor: owns every protocol session and drives its state machine.
//!
//! Each session runs as one driver task (connect, pump events through
//! [`transition`], apply effects, reconnect) plus one inbound worker that
//! hands messages to the [`SessionListener`] one at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use wapulse_config::model::SessionsConfig;
use wapulse_core::{
    ConnectionLink, ConnectionState, InboundEnvelope, Observer, ObserverEvent, ObserverId,
    ProtocolConnector, ProtocolEvent, SessionKey, SessionStore, TenantId, WapulseError,
};

use crate::backoff::Backoff;
use crate::fsm::{Effect, SessionKind, transition};
use crate::handle::SessionHandle;
use crate::qr;
use crate::registry::{Claim, SessionRegistry};

/// Receives what tenant sessions produce beyond status notifications.
#[async_trait]
pub trait SessionListener: Send + Sync {
    /// Called sequentially, per tenant, for every message received while connected.
    async fn on_message(
        &self,
        tenant: &TenantId,
        link: Arc<dyn ConnectionLink>,
        envelope: InboundEnvelope,
    );

    /// Called once the tenant's credentials are gone, before `DataWiped` is published.
    async fn on_logged_out(&self, tenant: &TenantId);
}

/// Tunables for the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    pub inbound_buffer: usize,
}

impl From<&SessionsConfig> for SupervisorConfig {
    fn from(config: &SessionsConfig) -> Self {
        Self {
            reconnect_initial: Duration::from_millis(config.reconnect_initial_ms),
            reconnect_max: Duration::from_millis(config.reconnect_max_ms),
            inbound_buffer: config.inbound_buffer,
        }
    }
}

enum Outcome {
    Reconnect,
    Stop,
}

/// Owns the tenant registry and the system session.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

struct Inner {
    connector: Arc<dyn ProtocolConnector>,
    store: Arc<dyn SessionStore>,
    observer: Arc<dyn Observer>,
    listener: Arc<dyn SessionListener>,
    registry: SessionRegistry,
    system: Arc<SessionHandle>,
    system_started: AtomicBool,
    config: SupervisorConfig,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl Supervisor {
    pub fn new(
        connector: Arc<dyn ProtocolConnector>,
        store: Arc<dyn SessionStore>,
        observer: Arc<dyn Observer>,
        listener: Arc<dyn SessionListener>,
        config: SupervisorConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (system, _) = SessionHandle::new(SessionKey::System, 1, cancel.child_token());
        Self {
            inner: Arc::new(Inner {
                connector,
                store,
                observer,
                listener,
                registry: SessionRegistry::default(),
                system,
                system_started: AtomicBool::new(false),
                config,
                cancel,
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Starts the shared system session. Later calls are no-ops.
    pub fn start_system(&self) {
        if self.inner.system_started.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("starting system session");
        let inner = Arc::clone(&self.inner);
        let handle = Arc::clone(&self.inner.system);
        self.inner.tasks.spawn(inner.drive(handle));
    }

    pub fn system(&self) -> Arc<SessionHandle> {
        Arc::clone(&self.inner.system)
    }

    /// The system session, for existence lookups.
    pub fn system_link(&self) -> Arc<dyn ConnectionLink> {
        self.system()
    }

    pub fn system_state(&self) -> ConnectionState {
        self.inner.system.state()
    }

    /// Starts (or reuses) the tenant's session.
    ///
    /// A connected handle is reused and `Connected` is reported right away.
    /// Any other handle for the tenant is replaced by a fresh one that loads
    /// the persisted credentials, or pairs from scratch without them.
    pub fn start_session(&self, tenant: &TenantId) -> Result<Arc<SessionHandle>, WapulseError> {
        if self.inner.cancel.is_cancelled() {
            return Err(WapulseError::Internal("supervisor is shutting down".into()));
        }

        let mut inbound = None;
        let claim = self.inner.registry.claim(tenant, || {
            let (handle, rx) = SessionHandle::new(
                SessionKey::Tenant(tenant.clone()),
                self.inner.config.inbound_buffer,
                self.inner.cancel.child_token(),
            );
            inbound = Some(rx);
            handle
        });

        match claim {
            Claim::Existing(handle) => {
                info!(tenant = %tenant, "session already connected");
                self.inner.observer.notify(
                    &ObserverId::from(tenant),
                    ObserverEvent::status(ConnectionState::Connected),
                );
                Ok(handle)
            }
            Claim::Created { handle, replaced } => {
                if let Some(old) = replaced {
                    info!(tenant = %tenant, "replacing stale session handle");
                    old.cancel();
                }
                let inbound = inbound
                    .ok_or_else(|| WapulseError::Internal("session handle built without queue".into()))?;
                info!(tenant = %tenant, "starting session");
                let inner = Arc::clone(&self.inner);
                self.inner
                    .tasks
                    .spawn(Arc::clone(&inner).inbound_worker(Arc::clone(&handle), inbound));
                self.inner.tasks.spawn(inner.drive(Arc::clone(&handle)));
                Ok(handle)
            }
        }
    }

    /// Logs the tenant out and wipes its session data.
    ///
    /// The remote logout is best-effort; the credential blob is deleted and
    /// the wipe cascades through the listener whether or not a session was live.
    pub async fn stop_session(&self, tenant: &TenantId) -> Result<(), WapulseError> {
        let key = SessionKey::Tenant(tenant.clone());

        if let Some(handle) = self.inner.registry.remove(tenant) {
            handle.set_state(ConnectionState::LoggedOut);
            let connection = handle.take_connection();
            handle.cancel();
            if let Some(connection) = connection {
                if let Err(e) = connection.logout().await {
                    warn!(tenant = %tenant, error = %e, "remote logout failed");
                }
                connection.close().await;
            }
        }

        self.inner.store.delete(&key).await?;
        info!(tenant = %tenant, "session logged out");

        let observer = ObserverId::from(tenant);
        self.inner
            .observer
            .notify(&observer, ObserverEvent::status(ConnectionState::LoggedOut));
        self.inner.wipe(tenant).await;
        Ok(())
    }

    pub fn tenant(&self, tenant: &TenantId) -> Option<Arc<SessionHandle>> {
        self.inner.registry.get(tenant)
    }

    pub fn tenant_link(&self, tenant: &TenantId) -> Option<Arc<dyn ConnectionLink>> {
        self.tenant(tenant)
            .map(|handle| handle as Arc<dyn ConnectionLink>)
    }

    pub fn tenants(&self) -> Vec<TenantId> {
        self.inner.registry.tenants()
    }

    /// Closes every connection (without logging out) and waits for all session tasks.
    pub async fn shutdown(&self) {
        info!("supervisor shutting down");
        self.inner.cancel.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        info!("supervisor stopped");
    }
}

impl Inner {
    fn publish(&self, handle: &SessionHandle, event: ObserverEvent) {
        if let Some(tenant) = handle.key().tenant() {
            self.observer.notify(&ObserverId::from(tenant), event);
        }
    }

    async fn wipe(&self, tenant: &TenantId) {
        self.listener.on_logged_out(tenant).await;
        self.observer
            .notify(&ObserverId::from(tenant), ObserverEvent::DataWiped);
    }

    async fn drive(self: Arc<Self>, handle: Arc<SessionHandle>) {
        let key = handle.key().clone();
        let kind = if key.is_system() {
            SessionKind::System
        } else {
            SessionKind::Tenant
        };
        let mut backoff = Backoff::new(self.config.reconnect_initial, self.config.reconnect_max);

        loop {
            let credentials = match self.store.load(&key).await {
                Ok(credentials) => credentials,
                Err(e) => {
                    warn!(session = %key, error = %e, "failed to load credentials, pairing afresh");
                    None
                }
            };
            debug!(session = %key, resumed = credentials.is_some(), "opening protocol connection");

            let opened = tokio::select! {
                biased;
                _ = handle.cancelled() => break,
                opened = self.connector.connect(&key, credentials) => opened,
            };

            let outcome = match opened {
                Ok(session) => {
                    let generation = handle.install(session.connection);
                    debug!(session = %key, generation, "protocol connection opened");
                    let outcome = self.pump(&handle, kind, session.events, &mut backoff).await;
                    if let Some(connection) = handle.take_connection() {
                        connection.close().await;
                    }
                    outcome
                }
                Err(e) => {
                    warn!(session = %key, error = %e, "connect failed");
                    handle.set_last_error(e.to_string());
                    handle.set_state(ConnectionState::Reconnecting);
                    self.publish(&handle, ObserverEvent::status(ConnectionState::Reconnecting));
                    Outcome::Reconnect
                }
            };

            match outcome {
                Outcome::Stop => break,
                Outcome::Reconnect => {
                    let delay = backoff.next_delay();
                    warn!(session = %key, delay_ms = delay.as_millis() as u64, "reconnecting");
                    tokio::select! {
                        biased;
                        _ = handle.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        if let Some(connection) = handle.take_connection() {
            connection.close().await;
        }
        if handle.state() != ConnectionState::LoggedOut {
            handle.set_state(ConnectionState::Disconnected);
        }
        info!(session = %key, "session stopped");
    }

    async fn pump(
        &self,
        handle: &Arc<SessionHandle>,
        kind: SessionKind,
        mut events: mpsc::Receiver<ProtocolEvent>,
        backoff: &mut Backoff,
    ) -> Outcome {
        let key = handle.key();
        loop {
            let event = tokio::select! {
                biased;
                _ = handle.cancelled() => return Outcome::Stop,
                event = events.recv() => event.unwrap_or_else(|| ProtocolEvent::Disconnected {
                    reason: "event stream closed".into(),
                    logged_out: false,
                }),
            };

            if let ProtocolEvent::Disconnected { reason, logged_out } = &event {
                info!(session = %key, reason = %reason, logged_out, "connection closed");
                handle.set_last_error(reason.clone());
            }

            let (next, effects) = transition(kind, handle.state(), event);
            handle.set_state(next);

            let mut outcome = None;
            for effect in effects {
                match effect {
                    Effect::PersistCredentials(blob) => {
                        if let Err(e) = self.store.save(key, &blob).await {
                            error!(session = %key, error = %e, "failed to persist credentials");
                            handle.set_last_error(e.to_string());
                        }
                    }
                    Effect::DeleteCredentials => {
                        if let Err(e) = self.store.delete(key).await {
                            error!(session = %key, error = %e, "failed to delete credentials");
                        }
                    }
                    Effect::PublishQr(qr) => {
                        debug!(session = %key, "pairing challenge issued");
                        self.publish(handle, ObserverEvent::QrChallenge { qr });
                    }
                    Effect::RenderConsoleQr(data) => match qr::render_terminal(&data) {
                        Ok(rendered) => {
                            info!("system session awaiting pairing, scan the QR code below");
                            println!("{rendered}");
                        }
                        Err(e) => warn!(error = %e, "could not render system QR code"),
                    },
                    Effect::PublishStatus(state) => {
                        self.publish(handle, ObserverEvent::status(state));
                    }
                    Effect::ResetBackoff => {
                        info!(session = %key, "session connected");
                        backoff.reset();
                    }
                    Effect::Deliver(envelope) => handle.deliver(envelope),
                    Effect::Reconnect => outcome = Some(Outcome::Reconnect),
                    Effect::Terminate => {
                        if let Some(tenant) = key.tenant() {
                            self.registry.remove_exact(tenant, handle);
                            handle.cancel();
                            info!(tenant = %tenant, "logged out remotely, wiping session data");
                            self.wipe(tenant).await;
                        }
                        outcome = Some(Outcome::Stop);
                    }
                }
            }
            if let Some(outcome) = outcome {
                return outcome;
            }
        }
    }

    async fn inbound_worker(
        self: Arc<Self>,
        handle: Arc<SessionHandle>,
        mut inbound: mpsc::Receiver<InboundEnvelope>,
    ) {
        let Some(tenant) = handle.key().tenant().cloned() else {
            return;
        };
        let link: Arc<dyn ConnectionLink> = Arc::clone(&handle) as Arc<dyn ConnectionLink>;
        loop {
            let envelope = tokio::select! {
                biased;
                _ = handle.cancelled() => break,
                envelope = inbound.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            self.listener
                .on_message(&tenant, Arc::clone(&link), envelope)
                .await;
        }
        debug!(tenant = %tenant, "inbound worker stopped");
    }
}
