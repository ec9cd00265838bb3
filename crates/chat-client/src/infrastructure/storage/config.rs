//! TOML-based configuration for the chat client.
//!
//! Reads `ClientConfig` from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\TcpChat\client.toml`
//! - Linux:    `~/.config/tcpchat/client.toml`
//! - macOS:    `~/Library/Application Support/TcpChat/client.toml`
//!
//! ```toml
//! [network]
//! server_address = "127.0.0.1"
//! port = 9999
//!
//! [auth]
//! shared_secret = "change-me"
//!
//! [timeouts]
//! connect_secs = 5
//! handshake_secs = 10
//! ```
//!
//! A missing file, section, or key falls back to its default.  Timeouts are
//! unbounded unless set.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
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
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// The server the client offers to connect to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    #[serde(default = "default_server_address")]
    pub server_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    #[serde(default = "default_shared_secret")]
    pub shared_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TimeoutConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handshake_secs: Option<u64>,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Option<Duration> {
        self.connect_secs.map(Duration::from_secs)
    }

    pub fn handshake(&self) -> Option<Duration> {
        self.handshake_secs.map(Duration::from_secs)
    }
}

fn default_server_address() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    9999
}
fn default_shared_secret() -> String {
    "tcpchat".to_string()
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_address: default_server_address(),
            port: default_port(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            shared_secret: default_shared_secret(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("client.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config at `path`, or defaults if the file does not exist.
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

/// Loads the config from the default location.
///
/// # Errors
///
/// See [`config_file_path`] and [`load_config_from`].
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("TcpChat"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("tcpchat"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("TcpChat")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_points_at_local_server() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.network.server_address, "127.0.0.1");
        assert_eq!(cfg.network.port, 9999);
        assert_eq!(cfg.timeouts.connect(), None);
        assert_eq!(cfg.timeouts.handshake(), None);
    }

    #[test]
    fn test_timeouts_section_is_optional_per_key() {
        let cfg: ClientConfig = toml::from_str("[timeouts]\nconnect_secs = 3\n").unwrap();
        assert_eq!(cfg.timeouts.connect(), Some(Duration::from_secs(3)));
        assert_eq!(cfg.timeouts.handshake(), None);
        assert_eq!(cfg.auth, AuthConfig::default());
    }

    #[test]
    fn test_unparseable_port_is_parse_error() {
        let result: Result<ClientConfig, _> = toml::from_str("[network]\nport = \"abc\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let path = std::env::temp_dir()
            .join(format!("chat-client-missing-{}", std::process::id()))
            .join("client.toml");
        assert_eq!(load_config_from(&path).unwrap(), ClientConfig::default());
    }
}
