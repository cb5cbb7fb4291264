// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket handler: one socket per dashboard client.
//!
//! The first accepted command must be `init`. Once bound, the socket
//! subscribes to its tenant's notifications and every other command runs
//! against the runtime. Closing the socket does not stop the tenant's
//! session.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wapulse_bus::SubscriptionId;
use wapulse_core::{ObserverId, TenantId, WapulseError};

use crate::protocol::{ClientCommand, Reply, execute};
use crate::server::GatewayState;

/// Upgrades `/ws` to a client socket. Commands other than `init` are
/// rejected until the socket is bound to a tenant.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

struct Binding {
    tenant: TenantId,
    observer: ObserverId,
    subscription: SubscriptionId,
    forwarder: JoinHandle<()>,
}

async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let socket_id = uuid::Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<String>(64);
    debug!(%socket_id, "dashboard socket opened");

    let sender_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut binding: Option<Binding> = None;
    while let Some(Ok(msg)) = ws_receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let command: ClientCommand = match serde_json::from_str(&text) {
            Ok(command) => command,
            Err(e) => {
                warn!(%socket_id, error = %e, "invalid WebSocket command");
                if !push(&tx, &Reply::error("unknown", format!("invalid command: {e}"))).await {
                    break;
                }
                continue;
            }
        };
        let name = command.name();

        let bound_tenant = binding.as_ref().map(|bound| bound.tenant.clone());
        let reply = match (command, bound_tenant) {
            (ClientCommand::Init { tenant, token }, None) => {
                match bind(&state, &tx, &tenant, token.as_deref()) {
                    Err(e) => {
                        warn!(%socket_id, error = %e, "init rejected");
                        Reply::error(name, e)
                    }
                    Ok(bound) => {
                        let reply = Reply::ok(name, json!({ "tenant": bound.tenant.as_str() }));
                        binding = Some(bound);
                        reply
                    }
                }
            }
            (ClientCommand::Init { .. }, Some(_)) => {
                Reply::error(name, "socket is already initialized")
            }
            (_, None) => Reply::error(name, "send init first"),
            (command, Some(tenant)) => {
                let result = execute(&state.runtime, &tenant, command).await;
                if let Err(e) = &result {
                    debug!(tenant = %tenant, command = name, error = %e, "command failed");
                }
                Reply::from_result(name, result)
            }
        };
        if !push(&tx, &reply).await {
            break;
        }
    }

    if let Some(bound) = binding {
        bound.forwarder.abort();
        state.bridge.unsubscribe(&bound.observer, bound.subscription);
        info!(%socket_id, tenant = %bound.tenant, "dashboard client disconnected");
    } else {
        debug!(%socket_id, "dashboard socket closed before init");
    }
    sender_task.abort();
}

/// Checks the token and subscribes the socket to the tenant's notifications.
fn bind(
    state: &GatewayState,
    tx: &mpsc::Sender<String>,
    tenant: &str,
    token: Option<&str>,
) -> Result<Binding, WapulseError> {
    if let Some(expected) = &state.bearer_token {
        if token != Some(expected.as_str()) {
            return Err(WapulseError::Config("token verification failed".to_string()));
        }
    }
    let tenant = TenantId::parse(tenant)?;
    let observer = ObserverId::from(&tenant);
    let mut subscription = state.bridge.subscribe(observer.clone());
    let subscription_id = subscription.id;

    let tx = tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = subscription.events.recv().await {
            match serde_json::to_string(&event) {
                Ok(text) => {
                    if tx.send(text).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode notification"),
            }
        }
    });

    info!(tenant = %tenant, "dashboard client bound");
    Ok(Binding {
        tenant,
        observer,
        subscription: subscription_id,
        forwarder,
    })
}

/// Queues a reply for the socket. Returns false once the socket is gone.
async fn push(tx: &mpsc::Sender<String>, reply: &Reply) -> bool {
    match serde_json::to_string(reply) {
        Ok(text) => tx.send(text).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "failed to encode reply");
            true
        }
    }
}
