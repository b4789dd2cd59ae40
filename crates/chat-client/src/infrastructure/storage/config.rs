//! TOML-based configuration for the chat client.
//!
//! Reads and writes [`ClientConfig`] at the platform-appropriate path:
//! - Windows:  `%APPDATA%\chat-client\config.toml`
//! - Linux:    `~/.config/chat-client/config.toml`
//! - macOS:    `~/Library/Application Support/chat-client/config.toml`
//!
//! Example:
//!
//! ```toml
//! log_level = "debug"
//!
//! [server]
//! base_url = "http://chat.internal:8080"
//!
//! [session]
//! handshake_timeout_ms = 5000
//! history_timeout_ms = 3000
//! subscribe_receipts = true
//!
//! [transport]
//! strategies = ["sockjs-websocket", "xhr-polling"]
//! ```
//!
//! Every field has a serde default, so a missing file, a missing section or a
//! missing key all fall back to the built-in values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::room_session::SessionConfig;
use crate::infrastructure::network::{NetworkTransportConfig, TransportStrategy};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub transport: TransportSettings,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Where the chat server lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path of the broker endpoint under `base_url`.
    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: String,
    /// Path prefix of the REST API under `base_url`.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default = "default_history_page_size")]
    pub history_page_size: u32,
}

/// Broker session behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSettings {
    #[serde(default = "default_timeout_ms")]
    pub open_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub history_timeout_ms: u64,
    #[serde(default)]
    pub subscribe_receipts: bool,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    #[serde(default = "default_send_prefix")]
    pub send_prefix: String,
}

/// Transport negotiation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportSettings {
    /// Tried in order until one opens.
    #[serde(default = "default_strategies")]
    pub strategies: Vec<TransportStrategy>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_endpoint_path() -> String {
    "/chat".to_string()
}
fn default_api_prefix() -> String {
    "/api/v1".to_string()
}
fn default_history_page_size() -> u32 {
    50
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_topic_prefix() -> String {
    "/topic/room/".to_string()
}
fn default_send_prefix() -> String {
    "/app/sendMessage/".to_string()
}
fn default_strategies() -> Vec<TransportStrategy> {
    vec![
        TransportStrategy::Websocket,
        TransportStrategy::SockjsWebsocket,
        TransportStrategy::XhrPolling,
    ]
}
fn default_poll_interval_ms() -> u64 {
    250
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            session: SessionSettings::default(),
            transport: TransportSettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            endpoint_path: default_endpoint_path(),
            api_prefix: default_api_prefix(),
            history_page_size: default_history_page_size(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            open_timeout_ms: default_timeout_ms(),
            handshake_timeout_ms: default_timeout_ms(),
            history_timeout_ms: default_timeout_ms(),
            subscribe_receipts: false,
            topic_prefix: default_topic_prefix(),
            send_prefix: default_send_prefix(),
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

// ── Derived runtime settings ──────────────────────────────────────────────────

impl ClientConfig {
    fn base_url(&self) -> &str {
        self.server.base_url.trim_end_matches('/')
    }

    /// Full broker endpoint URL, e.g. `http://localhost:8080/chat`.
    pub fn endpoint_url(&self) -> String {
        format!("{}{}", self.base_url(), self.server.endpoint_path)
    }

    /// Full REST API base URL, e.g. `http://localhost:8080/api/v1`.
    pub fn api_url(&self) -> String {
        format!("{}{}", self.base_url(), self.server.api_prefix)
    }

    /// Host part of `base_url`, used as the CONNECT `host` header.
    pub fn broker_host(&self) -> String {
        let without_scheme = self
            .base_url()
            .split_once("://")
            .map_or(self.base_url(), |(_, rest)| rest);
        let authority = without_scheme.split('/').next().unwrap_or(without_scheme);
        authority
            .rsplit_once(':')
            .map_or(authority, |(host, _port)| host)
            .to_string()
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            endpoint: self.endpoint_url(),
            host: self.broker_host(),
            handshake_timeout: Duration::from_millis(self.session.handshake_timeout_ms),
            history_timeout: Duration::from_millis(self.session.history_timeout_ms),
            subscribe_receipts: self.session.subscribe_receipts,
            topic_prefix: self.session.topic_prefix.clone(),
            send_prefix: self.session.send_prefix.clone(),
        }
    }

    pub fn network_config(&self) -> NetworkTransportConfig {
        NetworkTransportConfig {
            strategies: self.transport.strategies.clone(),
            open_timeout: Duration::from_millis(self.session.open_timeout_ms),
            poll_interval: Duration::from_millis(self.transport.poll_interval_ms),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the default path, or defaults if there is none.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `ClientConfig` from `path`, returning `ClientConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<ClientConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &ClientConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory with the `chat-client`
/// subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("chat-client"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("chat-client"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("chat-client")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
