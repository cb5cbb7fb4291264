// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `wapulse serve` command implementation.
//!
//! Opens the stores, connects the protocol bridge and the OpenAI providers,
//! starts the system session and serves the gateway until a shutdown signal
//! arrives. Sessions are closed on the way out but never logged out.

use std::sync::Arc;

use tracing::{error, info};
use wapulse_agent::{Runtime, RuntimeDeps, shutdown};
use wapulse_bridge::BridgeConnector;
use wapulse_bus::EventBridge;
use wapulse_config::WapulseConfig;
use wapulse_core::WapulseError;
use wapulse_gateway::GatewayState;
use wapulse_openai::OpenAiCompletion;
use wapulse_storage::{Database, FileSessionStore, JsonPromoStore, SqliteContactStore};

const DATABASE_FILE: &str = "wapulse.db";

pub async fn run_serve(config: WapulseConfig) -> Result<(), WapulseError> {
    init_tracing(&config.service.log_level);
    info!(name = %config.service.name, data_dir = %config.service.data_dir, "starting wapulse serve");

    let sessions = Arc::new(FileSessionStore::new(
        config.resolve_dir(&config.sessions.credentials_dir),
    ));
    let database = Database::open(&config.resolve_dir(DATABASE_FILE)).await?;
    let contacts = Arc::new(SqliteContactStore::new(database));
    let promos = Arc::new(JsonPromoStore::new(
        config.resolve_dir(&config.campaign.promos_dir),
        config.resolve_dir(&config.campaign.media_dir),
    ));

    let (completion, spintax) = match (
        OpenAiCompletion::chat(&config.openai),
        OpenAiCompletion::spintax(&config.openai),
    ) {
        (Ok(completion), Ok(spintax)) => (Arc::new(completion), Arc::new(spintax)),
        (Err(e), _) | (_, Err(e)) => {
            error!(error = %e, "failed to initialize OpenAI providers");
            eprintln!(
                "error: OpenAI API key required. Set openai.api_key in config, \
                 WAPULSE_OPENAI_API_KEY or OPENAI_API_KEY"
            );
            return Err(e);
        }
    };

    let connector = Arc::new(BridgeConnector::new(
        &config.bridge,
        config.sessions.inbound_buffer,
    ));
    info!(url = %connector.url(), "protocol bridge configured");

    let bridge = Arc::new(EventBridge::default());
    let runtime = Arc::new(Runtime::new(
        &config,
        RuntimeDeps {
            connector,
            sessions,
            contacts,
            promos,
            completion,
            spintax,
            observer: bridge.clone(),
        },
    ));
    runtime.start();

    let cancel = shutdown::install_signal_handler();
    let state = GatewayState::new(Arc::clone(&runtime), bridge, &config.gateway);
    let served = wapulse_gateway::serve(&config.gateway, state, cancel.clone()).await;
    if let Err(e) = &served {
        error!(error = %e, "gateway stopped unexpectedly");
        cancel.cancel();
    }

    runtime.shutdown().await;
    info!("wapulse serve shutdown complete");
    served
}

/// `RUST_LOG` wins; otherwise `wapulse={log_level},warn`.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wapulse={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
