//! Festa configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FestaConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for FestaConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            push: PushConfig::default(),
            notifier: NotifierConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl FestaConfig {
    /// Load config from `FESTA_CONFIG` if set, else the default path
    /// (~/.festa/config.toml). A missing file yields defaults.
    pub fn load() -> Result<Self> {
        let path = match std::env::var("FESTA_CONFIG") {
            Ok(custom) => PathBuf::from(custom),
            Err(_) => Self::default_path(),
        };
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::FestaError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            crate::error::FestaError::Config(format!("Failed to parse config: {e}"))
        })?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| {
            crate::error::FestaError::Config(format!("Failed to serialize config: {e}"))
        })?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Secrets come from the environment when present, overriding the
    /// file so credentials never need to live on disk.
    pub fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var("CRON_SECRET")
            && !secret.is_empty()
        {
            self.gateway.cron_secret = secret;
        }
        if let Ok(key) = std::env::var("FCM_SERVER_KEY")
            && !key.is_empty()
        {
            self.push.server_key = key;
        }
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Festa home directory (~/.festa).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".festa")
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Shared secret the external cron scheduler must present.
    /// Empty ⇒ the cron endpoint rejects every request.
    #[serde(default)]
    pub cron_secret: String,
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            cron_secret: String::new(),
        }
    }
}

/// Remote push (FCM) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// FCM server key. Empty ⇒ simulation mode.
    #[serde(default)]
    pub server_key: String,
    #[serde(default = "default_push_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_push_timeout")]
    pub timeout_secs: u64,
    /// Provider error codes that mark a device token permanently dead.
    #[serde(default = "default_permanent_errors")]
    pub permanent_errors: Vec<String>,
}

fn bool_true() -> bool {
    true
}
fn default_push_endpoint() -> String {
    "https://fcm.googleapis.com/fcm/send".into()
}
fn default_push_timeout() -> u64 {
    10
}
fn default_permanent_errors() -> Vec<String> {
    vec!["InvalidRegistration".into(), "NotRegistered".into()]
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server_key: String::new(),
            endpoint: default_push_endpoint(),
            timeout_secs: default_push_timeout(),
            permanent_errors: default_permanent_errors(),
        }
    }
}

/// Local notifier (in-process timer driver) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Owner whose birthdays the local driver watches. None ⇒ the
    /// local driver is not spawned.
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

fn default_tick_secs() -> u64 {
    60
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            owner: None,
            tick_secs: default_tick_secs(),
        }
    }
}

/// Persistent store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "~/.festa/festa.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FestaConfig::default();
        assert_eq!(config.gateway.port, 3000);
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert!(config.gateway.cron_secret.is_empty());
        assert_eq!(config.notifier.tick_secs, 60);
        assert!(config.notifier.owner.is_none());
        assert_eq!(
            config.push.permanent_errors,
            vec!["InvalidRegistration", "NotRegistered"]
        );
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: FestaConfig = toml::from_str(
            r#"
            [gateway]
            port = 8080
            cron_secret = "s3cret"

            [notifier]
            owner = "user-1"
            "#,
        )
        .unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.cron_secret, "s3cret");
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.notifier.owner.as_deref(), Some("user-1"));
        assert_eq!(config.push.endpoint, "https://fcm.googleapis.com/fcm/send");
    }

    #[test]
    fn test_roundtrip() {
        let mut config = FestaConfig::default();
        config.push.server_key = "key-123".into();
        config.notifier.tick_secs = 30;
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: FestaConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.push.server_key, "key-123");
        assert_eq!(parsed.notifier.tick_secs, 30);
    }
}
