// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket round trips against a runtime built on mocks.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use wapulse_agent::{Runtime, RuntimeDeps};
use wapulse_bus::EventBridge;
use wapulse_config::WapulseConfig;
use wapulse_config::model::GatewayConfig;
use wapulse_gateway::{GatewayState, serve_on};
use wapulse_storage::{Database, FileSessionStore, JsonPromoStore, SqliteContactStore};
use wapulse_test_utils::{MockCompletion, MockProtocol};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Harness {
    _dir: TempDir,
    url: String,
    shutdown: CancellationToken,
}

async fn start(bearer_token: Option<&str>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let promos = dir.path().join("promos");
    std::fs::create_dir_all(promos.join("user_7")).unwrap();
    std::fs::write(
        promos.join("user_7").join("promos.json"),
        r#"[{"id": 1, "text": "{Big|Huge} sale"}]"#,
    )
    .unwrap();

    let bridge = Arc::new(EventBridge::default());
    let runtime = Runtime::new(
        &WapulseConfig::default(),
        RuntimeDeps {
            connector: Arc::new(MockProtocol::new()),
            sessions: Arc::new(FileSessionStore::new(dir.path().join("sessions"))),
            contacts: Arc::new(SqliteContactStore::new(
                Database::open_in_memory().await.unwrap(),
            )),
            promos: Arc::new(JsonPromoStore::new(promos, dir.path().join("media"))),
            completion: MockCompletion::replying("ok"),
            spintax: MockCompletion::replying("{Big|Huge} sale"),
            observer: bridge.clone(),
        },
    );
    let config = GatewayConfig {
        bearer_token: bearer_token.map(str::to_string),
        ..GatewayConfig::default()
    };
    let state = GatewayState::new(Arc::new(runtime), bridge, &config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    let shutdown = CancellationToken::new();
    tokio::spawn(serve_on(listener, state, shutdown.clone()));

    Harness {
        _dir: dir,
        url,
        shutdown,
    }
}

async fn connect(h: &Harness) -> Client {
    connect_async(h.url.as_str()).await.unwrap().0
}

async fn send(client: &mut Client, frame: Value) {
    client.send(Message::text(frame.to_string())).await.unwrap();
}

/// Next frame whose `event` tag equals `event`.
async fn next_event(client: &mut Client, event: &str) -> Value {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            let Some(Ok(Message::Text(text))) = client.next().await else {
                panic!("socket closed while waiting for {event}");
            };
            let value: Value = serde_json::from_str(&text).unwrap();
            if value["event"] == event {
                return value;
            }
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn commands_require_init() {
    let h = start(None).await;
    let mut client = connect(&h).await;

    send(&mut client, json!({"type": "list-promos"})).await;
    let reply = next_event(&mut client, "reply").await;
    assert_eq!(reply["ok"], false);
    assert_eq!(reply["command"], "list-promos");

    send(&mut client, json!({"type": "init", "tenant": "undefined"})).await;
    let reply = next_event(&mut client, "reply").await;
    assert_eq!(reply["ok"], false);

    send(&mut client, json!({"type": "init", "tenant": "7"})).await;
    let reply = next_event(&mut client, "reply").await;
    assert_eq!(reply, json!({"event": "reply", "command": "init", "ok": true, "data": {"tenant": "7"}}));

    send(&mut client, json!({"type": "list-promos"})).await;
    let reply = next_event(&mut client, "reply").await;
    assert_eq!(reply["data"][0]["id"], 1);
    h.shutdown.cancel();
}

#[tokio::test]
async fn init_checks_the_configured_token() {
    let h = start(Some("s3cret")).await;
    let mut client = connect(&h).await;

    send(&mut client, json!({"type": "init", "tenant": "7", "token": "guess"})).await;
    assert_eq!(next_event(&mut client, "reply").await["ok"], false);

    send(&mut client, json!({"type": "init", "tenant": "7", "token": "s3cret"})).await;
    assert_eq!(next_event(&mut client, "reply").await["ok"], true);
    h.shutdown.cancel();
}

#[tokio::test]
async fn session_notifications_are_pushed() {
    let h = start(None).await;
    let mut client = connect(&h).await;
    send(&mut client, json!({"type": "init", "tenant": "7"})).await;
    next_event(&mut client, "reply").await;

    send(&mut client, json!({"type": "start-session"})).await;
    assert_eq!(next_event(&mut client, "reply").await["ok"], true);

    let qr = next_event(&mut client, "qr-challenge").await;
    assert_eq!(qr["qr"], "qr:tenant:7:1");
    h.shutdown.cancel();
}

#[tokio::test]
async fn malformed_frames_get_an_error_reply() {
    let h = start(None).await;
    let mut client = connect(&h).await;

    client.send(Message::text("{not json".to_string())).await.unwrap();
    let reply = next_event(&mut client, "reply").await;
    assert_eq!(reply["ok"], false);
    assert_eq!(reply["command"], "unknown");

    send(&mut client, json!({"type": "init", "tenant": "7"})).await;
    next_event(&mut client, "reply").await;
    send(&mut client, json!({"type": "generate-spintax", "text": "Big sale"})).await;
    let reply = next_event(&mut client, "reply").await;
    assert_eq!(reply["data"]["spintax"], "{Big|Huge} sale");
    h.shutdown.cancel();
}
