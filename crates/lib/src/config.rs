//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.iris/config.json`) and environment.
//! Provider settings can come entirely from the environment (`OPENAI_API_*`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Upstream model provider (OpenAI-compatible endpoint).
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Chat relay behavior.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Image object storage.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP and WebSocket (default 8080).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Upstream provider. Each field is overridden by its environment variable when set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// API base including the version segment, e.g. "https://dashscope.aliyuncs.com/compatible-mode/v1".
    /// Overridden by OPENAI_API_BASE.
    pub base_url: Option<String>,
    /// Bearer token. Overridden by OPENAI_API_KEY. Omit for local servers without auth.
    pub api_key: Option<String>,
    /// Model id used for every request (e.g. "qwen-vl-plus"). Overridden by OPENAI_API_MODEL.
    pub model: Option<String>,
}

/// Relay options applied to every chat session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// System message sent ahead of the conversation on every turn (not stored in history).
    pub system_prompt: Option<String>,
    /// Frame sent when the upstream stream fails mid-answer. Unset: no frame, the client only
    /// sees that the end-of-answer sentinel never arrived.
    pub error_frame: Option<String>,
}

/// Object storage for uploaded images.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Storage root. Relative paths are resolved against the config file's parent.
    /// Default: `storage` next to the config file.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Bucket that uploads go into (default "images").
    #[serde(default = "default_storage_bucket")]
    pub bucket: String,
    /// Base for object URLs handed to the model; must be reachable by the provider.
    /// Default: `http://<bind>:<port>/objects`.
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// Largest accepted upload body in bytes (default 10 MiB).
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_storage_bucket() -> String {
    "images".to_string()
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: None,
            bucket: default_storage_bucket(),
            public_base_url: None,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Non-blank, trimmed value of an environment variable.
fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn nonblank(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the provider base URL: env OPENAI_API_BASE overrides config.
pub fn resolve_provider_base_url(config: &Config) -> Option<String> {
    env_nonempty("OPENAI_API_BASE").or_else(|| nonblank(config.provider.base_url.as_ref()))
}

/// Resolve the provider API key: env OPENAI_API_KEY overrides config.
pub fn resolve_provider_api_key(config: &Config) -> Option<String> {
    env_nonempty("OPENAI_API_KEY").or_else(|| nonblank(config.provider.api_key.as_ref()))
}

/// Resolve the model id: env OPENAI_API_MODEL overrides config.
pub fn resolve_model(config: &Config) -> Option<String> {
    env_nonempty("OPENAI_API_MODEL").or_else(|| nonblank(config.provider.model.as_ref()))
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("IRIS_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".iris").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, or the default path (or IRIS_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used (for resolving the config directory).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

fn config_dir(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Default storage root when no override is set: `storage` subdirectory of the config file's parent.
pub fn storage_dir(config_path: &Path) -> PathBuf {
    config_dir(config_path).join("storage")
}

/// Resolve the storage root: `config.storage.directory` if set (relative paths resolved against the
/// config file's parent), otherwise the default `storage` subdirectory.
pub fn resolve_storage_dir(config: &Config, config_path: &Path) -> PathBuf {
    match &config.storage.directory {
        Some(d) if !d.as_os_str().is_empty() => {
            if d.is_absolute() {
                d.clone()
            } else {
                config_dir(config_path).join(d)
            }
        }
        _ => storage_dir(config_path),
    }
}

/// Base URL for stored objects: `storage.publicBaseUrl` or the gateway's own `/objects` route.
pub fn resolve_public_base_url(config: &Config) -> String {
    nonblank(config.storage.public_base_url.as_ref())
        .map(|u| u.trim_end_matches('/').to_string())
        .unwrap_or_else(|| {
            format!(
                "http://{}:{}/objects",
                config.gateway.bind.trim(),
                config.gateway.port
            )
        })
}
