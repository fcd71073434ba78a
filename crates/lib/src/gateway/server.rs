//! Gateway HTTP + WebSocket server (single port).

use crate::channel::WsChannel;
use crate::config::{self, Config};
use crate::gateway::uploads;
use crate::llm::{LlmBackend, OpenAiClient};
use crate::relay::{self, RelaySettings};
use crate::storage::{LocalObjectStore, ObjectStore};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        DefaultBodyLimit, State,
    },
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

/// Shared state for the gateway (config, upstream backend, object store).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Upstream chat backend; one instance shared by every session.
    pub backend: Arc<dyn LlmBackend>,
    pub relay: Arc<RelaySettings>,
    pub store: Arc<dyn ObjectStore>,
    /// Bucket that uploads go into.
    pub bucket: String,
    /// Fired once on shutdown; every open chat session holds a receiver.
    pub shutdown_tx: broadcast::Sender<()>,
}

fn relay_settings(config: &Config, model: String) -> RelaySettings {
    let mut settings = RelaySettings::new(model);
    settings.system_prompt = config
        .relay
        .system_prompt
        .clone()
        .filter(|s| !s.trim().is_empty());
    settings.error_frame = config.relay.error_frame.clone();
    settings
}

/// Build the router: health, chat WebSocket, image upload/delete, and the object files.
pub fn build_router(state: GatewayState, storage_root: &Path) -> Router {
    let max_upload = state.config.storage.max_upload_bytes;
    Router::new()
        .route("/", get(health_http))
        .route("/chat", get(ws_handler))
        .route(
            "/upload",
            post(uploads::upload_image).layer(DefaultBodyLimit::max(max_upload)),
        )
        .route("/delete-image", post(uploads::delete_image))
        .nest_service("/objects", ServeDir::new(storage_root))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the gateway until SIGINT/SIGTERM. Fails fast when no model is configured.
pub async fn run_gateway(config: Config, config_path: PathBuf) -> Result<()> {
    let model = config::resolve_model(&config).context(
        "no model configured (set provider.model in config or OPENAI_API_MODEL)",
    )?;
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        log::warn!(
            "gateway bound to non-loopback address {}; /chat and /upload have no authentication",
            bind
        );
    }

    let client = OpenAiClient::new(
        config::resolve_provider_base_url(&config),
        config::resolve_provider_api_key(&config),
    );
    log::info!("upstream provider {} with model {}", client.base_url(), model);

    let storage_root = config::resolve_storage_dir(&config, &config_path);
    let store = LocalObjectStore::new(&storage_root, config::resolve_public_base_url(&config));
    let bucket = config.storage.bucket.trim().to_string();
    store
        .ensure_bucket(&bucket)
        .await
        .with_context(|| format!("preparing bucket {} under {}", bucket, storage_root.display()))?;

    {
        let client = client.clone();
        let model = model.clone();
        tokio::spawn(async move {
            match client.list_models().await {
                Ok(list) if list.iter().any(|m| m == &model) => {
                    log::info!("model discovery completed ({} models)", list.len());
                }
                Ok(list) => {
                    log::warn!(
                        "model {} not listed by provider ({} models available)",
                        model,
                        list.len()
                    );
                }
                Err(e) => {
                    log::debug!("model discovery failed: {}", e);
                }
            }
        });
    }

    let (shutdown_tx, _) = broadcast::channel(1);
    let state = GatewayState {
        relay: Arc::new(relay_settings(&config, model)),
        config: Arc::new(config.clone()),
        backend: Arc::new(client),
        store: Arc::new(store),
        bucket,
        shutdown_tx: shutdown_tx.clone(),
    };
    let app = build_router(state, &storage_root);

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Completes on SIGINT or SIGTERM, after telling open chat sessions to close.
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, closing chat sessions");
    let _ = shutdown_tx.send(());
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "model": state.relay.model,
        "port": state.config.gateway.port,
    }))
}

/// GET /chat upgrades to WebSocket; each connection is one chat session.
async fn ws_handler(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let mut channel = WsChannel::new(socket, state.shutdown_tx.subscribe());
    let session = relay::run_session(&mut channel, state.backend.as_ref(), &state.relay).await;
    log::debug!(
        "session {} ended with {} message(s) in history",
        session.id(),
        session.len()
    );
    channel.close().await;
}
