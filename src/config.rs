//! Configuration file support for bm-lastheard.
//!
//! Loads settings from `~/.config/bm-lastheard/config.toml` on Linux
//! (or platform-appropriate location on other OSes). Every key is optional;
//! command line flags override whatever the file sets.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::{BM_LASTHEARD_URL, LastHeardClientConfig};
use crate::log_file::DEFAULT_LOG_DIR;
use crate::lookup::{LookupSettings, RADIOID_CSV_URL, default_cache_path};
use crate::session::SessionSettings;

/// RadioID database settings (`[lookup]` table).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Load the database at startup.
    pub enabled: bool,

    /// Download location of the CSV export.
    pub csv_url: String,

    /// Re-download once the cache is older than this many days.
    pub max_age_days: u64,

    /// Cache file location. Defaults to the platform cache directory.
    pub cache_path: Option<PathBuf>,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            csv_url: RADIOID_CSV_URL.to_string(),
            max_age_days: 14,
            cache_path: None,
        }
    }
}

impl LookupConfig {
    pub fn settings(&self) -> LookupSettings {
        LookupSettings {
            csv_url: self.csv_url.clone(),
            cache_path: self.cache_path.clone().unwrap_or_else(default_cache_path),
            max_age: Duration::from_secs(self.max_age_days * 24 * 60 * 60),
            ..Default::default()
        }
    }
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Socket.IO WebSocket endpoint.
    pub url: String,

    /// Connection timeout in seconds.
    pub connect_timeout: u64,

    /// Read timeout in seconds.
    pub read_timeout: u64,

    /// Whether to try one reconnect after the feed drops.
    pub reconnect: bool,

    /// Directory for session log files.
    pub log_dir: PathBuf,

    /// Drop events whose session started more than this many seconds ago.
    pub max_event_age: u64,

    /// Print a session id at most once within this many seconds.
    pub dedup_window: u64,

    pub lookup: LookupConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: BM_LASTHEARD_URL.to_string(),
            connect_timeout: 30,
            read_timeout: 90,
            reconnect: true,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            max_event_age: 120,
            dedup_window: 30,
            lookup: LookupConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default config file location.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but is malformed.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Config::default()),
        }
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in config file: {}", path.display()))
    }

    /// Returns the path to the config file.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("bm-lastheard/config.toml"))
    }

    /// Feed client settings.
    pub fn client_config(&self) -> LastHeardClientConfig {
        LastHeardClientConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout),
            read_timeout: Duration::from_secs(self.read_timeout),
            reconnect_attempts: u32::from(self.reconnect),
            ..Default::default()
        }
        .with_url(self.url.clone())
    }

    /// Session settings outside the filter.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            log_dir: self.log_dir.clone(),
            max_event_age: Duration::from_secs(self.max_event_age),
            dedup_window: Duration::from_secs(self.dedup_window),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.url, BM_LASTHEARD_URL);
        assert!(config.reconnect);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert!(config.lookup.enabled);
        assert_eq!(config.lookup.max_age_days, 14);
    }

    #[test]
    fn test_parse_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.url, BM_LASTHEARD_URL);
        assert_eq!(config.max_event_age, 120);
        assert_eq!(config.dedup_window, 30);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            url = "ws://localhost:8080/lh/socket.io/?EIO=4&transport=websocket"
            connect_timeout = 10
            read_timeout = 60
            reconnect = false
            log_dir = "/var/log/bm"
            max_event_age = 300
            dedup_window = 15

            [lookup]
            enabled = false
            csv_url = "https://mirror.example.net/user.csv"
            max_age_days = 7
            cache_path = "/tmp/user.csv"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.connect_timeout, 10);
        assert!(!config.reconnect);
        assert_eq!(config.log_dir, PathBuf::from("/var/log/bm"));
        assert!(!config.lookup.enabled);
        assert_eq!(config.lookup.cache_path, Some(PathBuf::from("/tmp/user.csv")));

        let client = config.client_config();
        assert!(client.url.starts_with("ws://localhost:8080"));
        assert_eq!(client.connect_timeout, Duration::from_secs(10));
        assert_eq!(client.read_timeout, Duration::from_secs(60));
        assert_eq!(client.reconnect_attempts, 0);

        let session = config.session_settings();
        assert_eq!(session.max_event_age, Duration::from_secs(300));
        assert_eq!(session.dedup_window, Duration::from_secs(15));

        let lookup = config.lookup.settings();
        assert_eq!(lookup.csv_url, "https://mirror.example.net/user.csv");
        assert_eq!(lookup.cache_path, PathBuf::from("/tmp/user.csv"));
        assert_eq!(lookup.max_age, Duration::from_secs(7 * 86_400));
    }

    #[test]
    fn test_reconnect_maps_to_one_attempt() {
        assert_eq!(Config::default().client_config().reconnect_attempts, 1);
    }

    #[test]
    fn test_lookup_table_partial() {
        let toml = r#"
            [lookup]
            max_age_days = 30
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.lookup.enabled);
        assert_eq!(config.lookup.csv_url, RADIOID_CSV_URL);
        assert_eq!(config.lookup.settings().cache_path, default_cache_path());
    }

    #[test]
    fn test_load_from_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "reconnect = \"maybe\"").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid TOML"));
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from(&dir.path().join("nope.toml")).is_err());
    }
}
