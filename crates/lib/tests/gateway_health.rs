//! Integration test: start the gateway on a free port, GET /, assert health JSON; then
//! upload an image, fetch it back through /objects, and delete it.
//! The upstream is an in-process fake; server tasks are left running when the tests end.

mod common;

use common::{free_port, gateway_config, spawn_fake_upstream, start_gateway, temp_config_dir, MODEL};
use serde_json::{json, Value};

#[tokio::test]
async fn gateway_health_http_responds_with_running() {
    let port = free_port();
    let (dir, config_path) = temp_config_dir();
    let (upstream, _) = spawn_fake_upstream().await;
    let _gateway = start_gateway(gateway_config(port, &upstream, &dir), config_path).await;

    let url = format!("http://127.0.0.1:{}/", port);
    let resp = reqwest::get(&url).await.expect("GET /");
    assert!(resp.status().is_success());
    let json: Value = resp.json().await.expect("parse JSON");
    assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
    assert_eq!(json.get("model").and_then(|v| v.as_str()), Some(MODEL));
    assert_eq!(json.get("port").and_then(|v| v.as_u64()), Some(port as u64));
}

#[tokio::test]
async fn gateway_allows_any_origin() {
    let port = free_port();
    let (dir, config_path) = temp_config_dir();
    let (upstream, _) = spawn_fake_upstream().await;
    let _gateway = start_gateway(gateway_config(port, &upstream, &dir), config_path).await;

    let resp = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{}/", port))
        .header("Origin", "http://example.com")
        .send()
        .await
        .expect("GET / with origin");
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn upload_serve_and_delete_image() {
    let port = free_port();
    let (dir, config_path) = temp_config_dir();
    let (upstream, _) = spawn_fake_upstream().await;
    let _gateway = start_gateway(gateway_config(port, &upstream, &dir), config_path).await;
    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();

    let part = reqwest::multipart::Part::bytes(b"fake-jpeg".to_vec())
        .file_name("bird.jpeg")
        .mime_str("image/jpeg")
        .expect("mime");
    let form = reqwest::multipart::Form::new().part("image", part);
    let resp = client
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .expect("POST /upload");
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.expect("upload JSON");
    assert_eq!(body["errno"], 0);
    let url = body["data"].as_str().expect("data url").to_string();
    let prefix = format!("{}/objects/images/uploads/", base);
    assert!(url.starts_with(&prefix), "unexpected url {}", url);
    assert!(url.ends_with("_bird.jpeg"), "unexpected url {}", url);

    let fetched = client.get(&url).send().await.expect("GET object");
    assert_eq!(fetched.status().as_u16(), 200);
    assert_eq!(fetched.bytes().await.expect("object bytes").as_ref(), b"fake-jpeg");

    let filename = url.trim_start_matches(&prefix).to_string();
    let resp = client
        .post(format!("{}/delete-image", base))
        .json(&json!({ "filename": filename }))
        .send()
        .await
        .expect("POST /delete-image");
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.expect("delete JSON");
    assert_eq!(body["message"], "deleted");

    let gone = client.get(&url).send().await.expect("GET deleted object");
    assert_eq!(gone.status().as_u16(), 404);
}

#[tokio::test]
async fn upload_and_delete_reject_bad_input() {
    let port = free_port();
    let (dir, config_path) = temp_config_dir();
    let (upstream, _) = spawn_fake_upstream().await;
    let _gateway = start_gateway(gateway_config(port, &upstream, &dir), config_path).await;
    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();

    let form = reqwest::multipart::Form::new().text("caption", "no file here");
    let resp = client
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .expect("POST /upload");
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.expect("error JSON");
    assert!(body["error"].is_string());

    for filename in ["../config.json", "a/b.png", ""] {
        let resp = client
            .post(format!("{}/delete-image", base))
            .json(&json!({ "filename": filename }))
            .send()
            .await
            .expect("POST /delete-image");
        assert_eq!(resp.status().as_u16(), 400, "filename {:?}", filename);
    }
    assert!(dir.join("config.json").exists());

    let resp = client
        .post(format!("{}/delete-image", base))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .expect("POST /delete-image");
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn upload_with_reserved_characters_is_fetchable() {
    let port = free_port();
    let (dir, config_path) = temp_config_dir();
    let (upstream, _) = spawn_fake_upstream().await;
    let _gateway = start_gateway(gateway_config(port, &upstream, &dir), config_path).await;
    let client = reqwest::Client::new();

    let part = reqwest::multipart::Part::bytes(b"png".to_vec()).file_name("photo #1?.png");
    let resp = client
        .post(format!("http://127.0.0.1:{}/upload", port))
        .multipart(reqwest::multipart::Form::new().part("image", part))
        .send()
        .await
        .expect("POST /upload");
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.expect("upload JSON");
    let url = body["data"].as_str().expect("data url").to_string();
    assert!(url.ends_with("_photo%20%231%3F.png"), "unexpected url {}", url);

    let fetched = client.get(&url).send().await.expect("GET object");
    assert_eq!(fetched.status().as_u16(), 200);
    assert_eq!(fetched.bytes().await.expect("object bytes").as_ref(), b"png");
}

#[tokio::test]
async fn oversized_upload_is_rejected_with_413() {
    let port = free_port();
    let (dir, config_path) = temp_config_dir();
    let (upstream, _) = spawn_fake_upstream().await;
    let mut config = gateway_config(port, &upstream, &dir);
    config.storage.max_upload_bytes = 1024;
    let _gateway = start_gateway(config, config_path).await;

    let part = reqwest::multipart::Part::bytes(vec![0u8; 8 * 1024]).file_name("big.jpeg");
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/upload", port))
        .multipart(reqwest::multipart::Form::new().part("image", part))
        .send()
        .await
        .expect("POST /upload");
    assert_eq!(resp.status().as_u16(), 413);
    let body: Value = resp.json().await.expect("error JSON");
    assert!(body["error"].is_string());
    assert!(!dir.join("objects/images/uploads").exists());
}
