// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Supervisor lifecycle tests against the mock protocol and on-disk credentials.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use wapulse_core::{
    ConnectionLink, ConnectionState, InboundContent, InboundEnvelope, Jid, ObserverEvent,
    OutboundPayload, ProtocolEvent, SessionKey, SessionStore, TenantId,
};
use wapulse_session::{SessionHandle, SessionListener, Supervisor, SupervisorConfig};
use wapulse_storage::FileSessionStore;
use wapulse_test_utils::{MockProtocol, RecordingObserver, WAIT_TIMEOUT, wait_until};

#[derive(Default)]
struct RecordingListener {
    messages: Mutex<Vec<(TenantId, InboundEnvelope)>>,
    logged_out: Mutex<Vec<TenantId>>,
}

#[async_trait]
impl SessionListener for RecordingListener {
    async fn on_message(
        &self,
        tenant: &TenantId,
        link: Arc<dyn ConnectionLink>,
        envelope: InboundEnvelope,
    ) {
        let reply = OutboundPayload::Text("ack".into());
        let _ = link.send(&envelope.sender, &reply).await;
        self.messages
            .lock()
            .unwrap()
            .push((tenant.clone(), envelope));
    }

    async fn on_logged_out(&self, tenant: &TenantId) {
        self.logged_out.lock().unwrap().push(tenant.clone());
    }
}

struct Harness {
    _dir: TempDir,
    protocol: MockProtocol,
    store: Arc<FileSessionStore>,
    observer: Arc<RecordingObserver>,
    listener: Arc<RecordingListener>,
    supervisor: Supervisor,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let protocol = MockProtocol::new();
    let store = Arc::new(FileSessionStore::new(dir.path().join("sessions")));
    let observer = RecordingObserver::new();
    let listener = Arc::new(RecordingListener::default());
    let supervisor = Supervisor::new(
        Arc::new(protocol.clone()),
        store.clone(),
        observer.clone(),
        listener.clone(),
        SupervisorConfig {
            reconnect_initial: Duration::from_millis(10),
            reconnect_max: Duration::from_millis(40),
            inbound_buffer: 8,
        },
    );
    Harness {
        _dir: dir,
        protocol,
        store,
        observer,
        listener,
        supervisor,
    }
}

fn tenant(id: &str) -> TenantId {
    TenantId::parse(id).unwrap()
}

fn key(id: &str) -> SessionKey {
    SessionKey::Tenant(tenant(id))
}

async fn wait_state(handle: &SessionHandle, target: ConnectionState) {
    let mut rx = handle.subscribe_state();
    tokio::time::timeout(WAIT_TIMEOUT, rx.wait_for(|state| *state == target))
        .await
        .expect("state reached in time")
        .expect("state channel open");
}

fn is_status(state: ConnectionState) -> impl Fn(&ObserverEvent) -> bool {
    move |event| matches!(event, ObserverEvent::ConnectionStatus { state: s, .. } if *s == state)
}

fn is_qr(event: &ObserverEvent) -> bool {
    matches!(event, ObserverEvent::QrChallenge { .. })
}

/// Starts a session and completes pairing with `creds`.
async fn pair(h: &Harness, id: &str, creds: &[u8]) -> Arc<SessionHandle> {
    let handle = h.supervisor.start_session(&tenant(id)).unwrap();
    wait_state(&handle, ConnectionState::AwaitingScan).await;
    assert!(h.protocol.inject(
        &key(id),
        ProtocolEvent::CredentialsRotated(creds.to_vec())
    ));
    assert!(h.protocol.inject(&key(id), ProtocolEvent::Connected));
    wait_state(&handle, ConnectionState::Connected).await;
    handle
}

#[tokio::test]
async fn fresh_session_publishes_qr_challenge() {
    let h = harness();
    let handle = h.supervisor.start_session(&tenant("7")).unwrap();

    assert!(h.observer.wait_for("7", is_qr).await);
    wait_state(&handle, ConnectionState::AwaitingScan).await;
    assert!(
        h.observer
            .events_for("7")
            .contains(&ObserverEvent::QrChallenge { qr: "qr:tenant:7:1".into() })
    );
    assert_eq!(h.protocol.connect_credentials(&key("7")), vec![None]);
}

#[tokio::test]
async fn pairing_persists_credentials_before_connected() {
    let h = harness();
    pair(&h, "7", b"paired-creds").await;

    assert!(h.observer.wait_for("7", is_status(ConnectionState::Connected)).await);
    let stored = h.store.load(&key("7")).await.unwrap();
    assert_eq!(stored.as_deref(), Some(&b"paired-creds"[..]));
}

#[tokio::test]
async fn starting_connected_session_reuses_it() {
    let h = harness();
    let first = pair(&h, "7", b"creds").await;

    let second = h.supervisor.start_session(&tenant("7")).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(h.protocol.connect_count(&key("7")), 1);
    assert_eq!(h.observer.count_for("7", is_qr), 1);
    assert_eq!(
        h.observer
            .count_for("7", is_status(ConnectionState::Connected)),
        2
    );
}

#[tokio::test]
async fn stored_credentials_resume_without_qr() {
    let h = harness();
    h.store.save(&key("9"), b"saved").await.unwrap();

    let handle = h.supervisor.start_session(&tenant("9")).unwrap();
    wait_state(&handle, ConnectionState::Connected).await;

    assert_eq!(
        h.protocol.connect_credentials(&key("9")),
        vec![Some(b"saved".to_vec())]
    );
    assert_eq!(h.observer.count_for("9", is_qr), 0);
}

#[tokio::test]
async fn stop_session_logs_out_and_wipes() {
    let h = harness();
    let handle = pair(&h, "7", b"creds").await;

    h.supervisor.stop_session(&tenant("7")).await.unwrap();

    assert_eq!(h.protocol.logouts(), vec![key("7")]);
    assert!(h.store.load(&key("7")).await.unwrap().is_none());
    assert!(!h.store.session_dir(&key("7")).exists());
    assert!(h.supervisor.tenant(&tenant("7")).is_none());
    assert_eq!(handle.state(), ConnectionState::LoggedOut);

    let events = h.observer.events_for("7");
    let logged_out = ObserverEvent::status(ConnectionState::LoggedOut);
    assert_eq!(events.iter().filter(|e| **e == logged_out).count(), 1);
    let logged_out_at = events.iter().position(|e| *e == logged_out);
    let wiped_at = events.iter().position(|e| *e == ObserverEvent::DataWiped);
    assert_eq!(logged_out_at.map(|i| i + 1), wiped_at);
    assert_eq!(*h.listener.logged_out.lock().unwrap(), vec![tenant("7")]);

    // A restart pairs from scratch.
    let restarted = h.supervisor.start_session(&tenant("7")).unwrap();
    wait_state(&restarted, ConnectionState::AwaitingScan).await;
    assert_eq!(h.protocol.connect_credentials(&key("7")).last(), Some(&None));
}

#[tokio::test]
async fn stop_without_live_session_still_wipes() {
    let h = harness();
    h.store.save(&key("3"), b"stale").await.unwrap();

    h.supervisor.stop_session(&tenant("3")).await.unwrap();

    assert!(h.store.load(&key("3")).await.unwrap().is_none());
    assert!(h.observer.events_for("3").contains(&ObserverEvent::DataWiped));
}

#[tokio::test]
async fn remote_logout_cascades() {
    let h = harness();
    let handle = pair(&h, "7", b"creds").await;

    assert!(h.protocol.inject(
        &key("7"),
        ProtocolEvent::Disconnected {
            reason: "device removed".into(),
            logged_out: true,
        }
    ));

    assert!(h.observer.wait_for("7", |e| *e == ObserverEvent::DataWiped).await);
    assert_eq!(handle.state(), ConnectionState::LoggedOut);
    let logged_out = ObserverEvent::status(ConnectionState::LoggedOut);
    assert_eq!(h.observer.count_for("7", |e| *e == logged_out), 1);
    assert!(h.store.load(&key("7")).await.unwrap().is_none());
    assert!(h.supervisor.tenant(&tenant("7")).is_none());
    assert_eq!(*h.listener.logged_out.lock().unwrap(), vec![tenant("7")]);
    assert_eq!(h.protocol.connect_count(&key("7")), 1);
}

#[tokio::test]
async fn dropped_connection_reconnects_with_credentials() {
    let h = harness();
    let handle = pair(&h, "7", b"creds").await;

    assert!(h.protocol.drop_connection(&key("7")));

    assert!(h.protocol.wait_for_connects(&key("7"), 2).await);
    wait_state(&handle, ConnectionState::Connected).await;
    assert_eq!(
        h.protocol.connect_credentials(&key("7")).last(),
        Some(&Some(b"creds".to_vec()))
    );
    assert!(h.observer.count_for("7", is_status(ConnectionState::Reconnecting)) >= 1);
    assert_eq!(handle.generation(), 2);
}

#[tokio::test]
async fn failed_connect_is_retried() {
    let h = harness();
    h.protocol.fail_next_connect(&key("5"));

    let handle = h.supervisor.start_session(&tenant("5")).unwrap();

    assert!(h.protocol.wait_for_connects(&key("5"), 2).await);
    wait_state(&handle, ConnectionState::AwaitingScan).await;
    assert!(handle.last_error().unwrap().contains("refused"));
}

#[tokio::test]
async fn messages_are_delivered_while_connected() {
    let h = harness();
    pair(&h, "7", b"creds").await;

    let envelope = InboundEnvelope {
        sender: Jid::from_phone("15550001"),
        from_me: false,
        content: InboundContent::Text("hello".into()),
    };
    assert!(h
        .protocol
        .inject(&key("7"), ProtocolEvent::Message(envelope.clone())));

    assert!(wait_until(|| !h.listener.messages.lock().unwrap().is_empty()).await);
    assert_eq!(
        h.listener.messages.lock().unwrap()[0],
        (tenant("7"), envelope)
    );
    assert!(wait_until(|| !h.protocol.sent().is_empty()).await);
    assert_eq!(h.protocol.sent()[0].to, Jid::from_phone("15550001"));
}

#[tokio::test]
async fn link_refuses_io_before_connected() {
    let h = harness();
    let handle = h.supervisor.start_session(&tenant("7")).unwrap();
    wait_state(&handle, ConnectionState::AwaitingScan).await;

    let link = h.supervisor.tenant_link(&tenant("7")).unwrap();
    let err = link
        .send(&Jid::from_phone("1"), &OutboundPayload::Text("x".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, wapulse_core::WapulseError::NotConnected { .. }));
}

#[tokio::test]
async fn system_logout_pairs_again() {
    let h = harness();
    h.store.save(&SessionKey::System, b"sys").await.unwrap();
    h.supervisor.start_system();
    assert!(h.protocol.wait_for_connects(&SessionKey::System, 1).await);
    assert!(wait_until(|| h.supervisor.system_state().is_connected()).await);

    assert!(h.protocol.inject(
        &SessionKey::System,
        ProtocolEvent::Disconnected {
            reason: "logged out".into(),
            logged_out: true,
        }
    ));

    assert!(h.protocol.wait_for_connects(&SessionKey::System, 2).await);
    assert_eq!(
        h.protocol.connect_credentials(&SessionKey::System).last(),
        Some(&None)
    );
    assert!(h.store.load(&SessionKey::System).await.unwrap().is_none());
    // The system session never notifies tenants.
    assert!(h.observer.events().is_empty());
}

#[tokio::test]
async fn shutdown_closes_without_logging_out() {
    let h = harness();
    let handle = pair(&h, "7", b"creds").await;

    tokio::time::timeout(WAIT_TIMEOUT, h.supervisor.shutdown())
        .await
        .expect("shutdown completes");

    assert!(!h.protocol.is_live(&key("7")));
    assert!(h.protocol.logouts().is_empty());
    assert_eq!(handle.state(), ConnectionState::Disconnected);
    assert!(h.store.load(&key("7")).await.unwrap().is_some());
    assert!(h.supervisor.start_session(&tenant("8")).is_err());
}
