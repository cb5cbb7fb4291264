// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scriptable protocol connector for supervisor and end-to-end tests.
//!
//! Every connect opens a fresh [`MockConnection`] whose event stream stays
//! open until the test drops it or the connection is closed. Without a
//! scripted event list a connect without credentials issues one QR
//! challenge and a connect with credentials reports `Connected`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use wapulse_core::{
    AdapterType, HealthStatus, Jid, OutboundPayload, PluginAdapter, ProtocolConnection,
    ProtocolConnector, ProtocolEvent, ProtocolSession, SessionKey, WapulseError,
};

use crate::{lock, wait_until};

/// A message captured by a mock connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub session: SessionKey,
    pub to: Jid,
    pub payload: OutboundPayload,
}

#[derive(Default)]
struct State {
    registered: HashSet<String>,
    failing_lookups: HashSet<String>,
    failing_sends: HashSet<String>,
    scripts: HashMap<SessionKey, VecDeque<Vec<ProtocolEvent>>>,
    connect_failures: HashMap<SessionKey, usize>,
    live: HashMap<SessionKey, (u64, mpsc::Sender<ProtocolEvent>)>,
    next_connection: u64,
    connects: Vec<(SessionKey, Option<Vec<u8>>)>,
    sent: Vec<SentMessage>,
    typing: Vec<(SessionKey, Jid)>,
    lookups: Vec<(SessionKey, Jid)>,
    logouts: Vec<SessionKey>,
    lookup_delay: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct MockProtocol {
    state: Arc<Mutex<State>>,
}

impl MockProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks phone numbers (digits only) as registered accounts.
    pub fn register_numbers<I, S>(&self, phones: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.state)
            .registered
            .extend(phones.into_iter().map(Into::into));
    }

    /// Lookups for these numbers fail with a protocol error.
    pub fn fail_lookups_for<I, S>(&self, phones: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.state)
            .failing_lookups
            .extend(phones.into_iter().map(Into::into));
    }

    /// Sends to these numbers fail with a protocol error.
    pub fn fail_sends_to<I, S>(&self, phones: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.state)
            .failing_sends
            .extend(phones.into_iter().map(Into::into));
    }

    /// Events the next connect for `key` emits instead of the default ones.
    pub fn script_next_connect(&self, key: &SessionKey, events: Vec<ProtocolEvent>) {
        lock(&self.state)
            .scripts
            .entry(key.clone())
            .or_default()
            .push_back(events);
    }

    /// Makes the next connect attempt for `key` fail.
    pub fn fail_next_connect(&self, key: &SessionKey) {
        *lock(&self.state)
            .connect_failures
            .entry(key.clone())
            .or_default() += 1;
    }

    /// Pushes an event into the live connection for `key`.
    /// Returns false when no connection is live.
    pub fn inject(&self, key: &SessionKey, event: ProtocolEvent) -> bool {
        let sender = lock(&self.state).live.get(key).map(|(_, tx)| tx.clone());
        match sender {
            Some(tx) => tx.try_send(event).is_ok(),
            None => false,
        }
    }

    /// Ends the event stream of the live connection for `key` without a
    /// `Disconnected` event, as a dropped socket would.
    pub fn drop_connection(&self, key: &SessionKey) -> bool {
        lock(&self.state).live.remove(key).is_some()
    }

    pub fn is_live(&self, key: &SessionKey) -> bool {
        lock(&self.state).live.contains_key(key)
    }

    pub fn connect_count(&self, key: &SessionKey) -> usize {
        lock(&self.state)
            .connects
            .iter()
            .filter(|(k, _)| k == key)
            .count()
    }

    /// Credentials passed to each connect for `key`, in order.
    pub fn connect_credentials(&self, key: &SessionKey) -> Vec<Option<Vec<u8>>> {
        lock(&self.state)
            .connects
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, creds)| creds.clone())
            .collect()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.state).sent.clone()
    }

    pub fn typing(&self) -> Vec<(SessionKey, Jid)> {
        lock(&self.state).typing.clone()
    }

    pub fn lookups(&self) -> Vec<(SessionKey, Jid)> {
        lock(&self.state).lookups.clone()
    }

    pub fn logouts(&self) -> Vec<SessionKey> {
        lock(&self.state).logouts.clone()
    }

    /// Delays every existence lookup by `delay`.
    pub fn set_lookup_delay(&self, delay: Duration) {
        lock(&self.state).lookup_delay = Some(delay);
    }

    /// Waits until `key` has been connected at least `count` times and the
    /// latest connection is live.
    pub async fn wait_for_connects(&self, key: &SessionKey, count: usize) -> bool {
        wait_until(|| self.connect_count(key) >= count && self.is_live(key)).await
    }
}

#[async_trait]
impl PluginAdapter for MockProtocol {
    fn name(&self) -> &str {
        "mock-protocol"
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
        lock(&self.state).live.clear();
        Ok(())
    }
}

#[async_trait]
impl ProtocolConnector for MockProtocol {
    async fn connect(
        &self,
        key: &SessionKey,
        credentials: Option<Vec<u8>>,
    ) -> Result<ProtocolSession, WapulseError> {
        let mut state = lock(&self.state);
        state.connects.push((key.clone(), credentials.clone()));

        if let Some(failures) = state.connect_failures.get_mut(key) {
            if *failures > 0 {
                *failures -= 1;
                return Err(WapulseError::protocol("mock connect refused"));
            }
        }

        let attempt = state.connects.iter().filter(|(k, _)| k == key).count();
        let events = state
            .scripts
            .get_mut(key)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| match credentials {
                Some(_) => vec![ProtocolEvent::Connected],
                None => vec![ProtocolEvent::Qr(format!("qr:{key}:{attempt}"))],
            });

        let (tx, rx) = mpsc::channel(64);
        for event in events {
            // Buffer is large enough for any scripted batch.
            let _ = tx.try_send(event);
        }
        state.next_connection += 1;
        let id = state.next_connection;
        state.live.insert(key.clone(), (id, tx));
        tracing::debug!(session = %key, connection = id, "mock connection opened");

        Ok(ProtocolSession {
            connection: Arc::new(MockConnection {
                id,
                key: key.clone(),
                shared: Arc::clone(&self.state),
                closed: AtomicBool::new(false),
            }),
            events: rx,
        })
    }
}

/// One connection opened by [`MockProtocol`]. Fails every call once closed.
pub struct MockConnection {
    id: u64,
    key: SessionKey,
    shared: Arc<Mutex<State>>,
    closed: AtomicBool,
}

impl MockConnection {
    fn ensure_open(&self) -> Result<(), WapulseError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WapulseError::protocol("connection closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl ProtocolConnection for MockConnection {
    async fn exists(&self, jid: &Jid) -> Result<bool, WapulseError> {
        self.ensure_open()?;
        let delay = {
            let mut state = lock(&self.shared);
            state.lookups.push((self.key.clone(), jid.clone()));
            state.lookup_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = lock(&self.shared);
        if state.failing_lookups.contains(jid.user()) {
            return Err(WapulseError::protocol("mock lookup failed"));
        }
        Ok(state.registered.contains(jid.user()))
    }

    async fn send(&self, to: &Jid, payload: &OutboundPayload) -> Result<(), WapulseError> {
        self.ensure_open()?;
        let mut state = lock(&self.shared);
        if state.failing_sends.contains(to.user()) {
            return Err(WapulseError::protocol("mock send failed"));
        }
        state.sent.push(SentMessage {
            session: self.key.clone(),
            to: to.clone(),
            payload: payload.clone(),
        });
        Ok(())
    }

    async fn send_typing(&self, to: &Jid) -> Result<(), WapulseError> {
        self.ensure_open()?;
        lock(&self.shared)
            .typing
            .push((self.key.clone(), to.clone()));
        Ok(())
    }

    async fn logout(&self) -> Result<(), WapulseError> {
        self.ensure_open()?;
        lock(&self.shared).logouts.push(self.key.clone());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let mut state = lock(&self.shared);
        if state.live.get(&self.key).is_some_and(|(id, _)| *id == self.id) {
            state.live.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_connect_pairs_without_credentials() {
        let protocol = MockProtocol::new();
        let mut session = protocol.connect(&SessionKey::System, None).await.unwrap();
        assert_eq!(
            session.events.recv().await,
            Some(ProtocolEvent::Qr("qr:system:1".into()))
        );

        let mut resumed = protocol
            .connect(&SessionKey::System, Some(b"creds".to_vec()))
            .await
            .unwrap();
        assert_eq!(resumed.events.recv().await, Some(ProtocolEvent::Connected));
        assert_eq!(protocol.connect_count(&SessionKey::System), 2);
    }

    #[tokio::test]
    async fn closed_connection_rejects_calls() {
        let protocol = MockProtocol::new();
        protocol.register_numbers(["111"]);
        let session = protocol.connect(&SessionKey::System, None).await.unwrap();
        assert!(session.connection.exists(&Jid::from_phone("111")).await.unwrap());
        session.connection.close().await;
        assert!(session.connection.exists(&Jid::from_phone("111")).await.is_err());
        assert!(!protocol.is_live(&SessionKey::System));
    }

    #[tokio::test]
    async fn dropping_connection_ends_stream() {
        let protocol = MockProtocol::new();
        let mut session = protocol.connect(&SessionKey::System, None).await.unwrap();
        let _ = session.events.recv().await;
        assert!(protocol.drop_connection(&SessionKey::System));
        assert_eq!(session.events.recv().await, None);
    }

    #[tokio::test]
    async fn scripted_connect_replaces_defaults_once() {
        let protocol = MockProtocol::new();
        protocol.script_next_connect(
            &SessionKey::System,
            vec![ProtocolEvent::Disconnected {
                reason: "401".into(),
                logged_out: true,
            }],
        );

        let mut scripted = protocol.connect(&SessionKey::System, None).await.unwrap();
        assert!(matches!(
            scripted.events.recv().await,
            Some(ProtocolEvent::Disconnected { logged_out: true, .. })
        ));

        let mut next = protocol.connect(&SessionKey::System, None).await.unwrap();
        assert_eq!(
            next.events.recv().await,
            Some(ProtocolEvent::Qr("qr:system:2".into()))
        );
    }
}
