//! Shared helpers for gateway integration tests: free ports, temp config dirs, a fake
//! OpenAI-compatible upstream, and a gateway started in the background.

#![allow(dead_code)]

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use lib::config::Config;
use lib::gateway;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MODEL: &str = "test-vl-model";

pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

pub fn temp_config_dir() -> (PathBuf, PathBuf) {
    let dir = std::env::temp_dir().join(format!("iris-gateway-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp config dir");
    let config_path = dir.join("config.json");
    std::fs::write(&config_path, b"{}").expect("write config.json");
    (dir, config_path)
}

/// Request bodies received by the fake upstream, in arrival order.
pub type Captured = Arc<Mutex<Vec<Value>>>;

fn sse_event(content: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({ "choices": [{ "index": 0, "delta": { "content": content } }] })
    )
}

async fn fake_completions(State(captured): State<Captured>, Json(body): Json<Value>) -> impl IntoResponse {
    captured.lock().expect("captured lock").push(body);
    let mut sse = String::new();
    sse.push_str(&sse_event("Hel"));
    sse.push_str(&sse_event("lo!"));
    sse.push_str("data: [DONE]\n\n");
    ([(header::CONTENT_TYPE, "text/event-stream")], sse)
}

async fn fake_models() -> Json<Value> {
    Json(json!({ "object": "list", "data": [{ "id": MODEL, "object": "model" }] }))
}

/// Start an upstream that answers every completion with "Hel", "lo!" and records the
/// request bodies. Returns its base URL (with `/v1`) and the capture list.
pub async fn spawn_fake_upstream() -> (String, Captured) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/v1/chat/completions", post(fake_completions))
        .route("/v1/models", get(fake_models))
        .with_state(captured.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake upstream");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{}/v1", addr), captured)
}

/// Config for a gateway on `port` talking to `upstream`, storing images in the temp dir.
pub fn gateway_config(port: u16, upstream: &str, dir: &PathBuf) -> Config {
    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    config.provider.base_url = Some(upstream.to_string());
    config.provider.model = Some(MODEL.to_string());
    config.storage.directory = Some(dir.join("objects"));
    config
}

/// Run the gateway in the background and wait until GET / answers.
pub async fn start_gateway(config: Config, config_path: PathBuf) -> tokio::task::JoinHandle<()> {
    let port = config.gateway.port;
    let handle = tokio::spawn(async move {
        if let Err(e) = gateway::run_gateway(config, config_path).await {
            panic!("gateway exited: {:#}", e);
        }
    });

    let url = format!("http://127.0.0.1:{}/", port);
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return handle;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    handle.abort();
    panic!("gateway on port {} did not become ready within 5s", port);
}
