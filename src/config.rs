use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub push: PushConfig,
    pub chat: ChatConfig,
    pub composer: ComposerConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".to_string(),
            timeout_seconds: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub url: Option<String>,
    pub reconnect_max_seconds: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: None,
            reconnect_max_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub page_size: usize,
    pub conversation_page_limit: u32,
    pub typing_window_ms: u64,
    pub typing_sweep_ms: u64,
    pub typing_notify_throttle_ms: u64,
    pub unread_poll_seconds: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            conversation_page_limit: 20,
            typing_window_ms: 5000,
            typing_sweep_ms: 1000,
            typing_notify_throttle_ms: 3000,
            unread_poll_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub max_attachment_bytes: u64,
    pub allowed_mime_types: Vec<String>,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
            allowed_mime_types: [
                "image/jpeg",
                "image/png",
                "image/gif",
                "image/webp",
                "application/pdf",
                "text/plain",
                "audio/mpeg",
                "audio/ogg",
                "video/mp4",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: "~/.guild-chat/session.json".to_string(),
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn resolve_config_path() -> PathBuf {
    env::var("GUILD_CHAT_CONFIG")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| expand_tilde("~/.guild-chat/guild-chat.json"))
}

pub fn ensure_config_dir() {
    let path = resolve_config_path();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
}

pub fn load_config() -> Config {
    let config_path = resolve_config_path();
    let mut cfg = Config::default();

    if config_path.exists() {
        if let Ok(raw) = fs::read_to_string(&config_path) {
            match serde_json::from_str::<Config>(&raw) {
                Ok(file_cfg) => cfg = file_cfg,
                Err(err) => tracing::warn!("ignoring malformed config {}: {err}", config_path.display()),
            }
        }
    }

    apply_env_overrides(&mut cfg);
    cfg
}

pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(url) = env::var("GUILD_CHAT_API_URL") {
        if !url.trim().is_empty() {
            cfg.api.base_url = url;
        }
    }

    if let Ok(url) = env::var("GUILD_CHAT_PUSH_URL") {
        if !url.trim().is_empty() {
            cfg.push.url = Some(url);
        }
    }

    if let Ok(path) = env::var("GUILD_CHAT_SESSION_PATH") {
        if !path.trim().is_empty() {
            cfg.session.path = path;
        }
    }
}

pub fn resolve_session_path(cfg: &Config) -> PathBuf {
    expand_tilde(&cfg.session.path)
}
