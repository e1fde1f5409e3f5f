//! Startup configuration
//!
//! Connection parameters come from the environment; optional tuning comes from
//! a TOML file named by `AIS_BRIDGE_CONFIG`. Both are read exactly once and
//! handed to the components as an immutable [`BridgeConfig`].
//!
//! ```toml
//! [mqtt]
//! keep_alive_secs = 30
//! connect_timeout_ms = 10000
//!
//! [forwarding]
//! max_attempts = 3
//! skip_unchanged = false
//! track_traffic = true
//! ignore_types = [4, 27]
//!
//! [reconnect]
//! initial_backoff_ms = 1000
//! max_backoff_ms = 60000
//! ```

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_CLIENT_ID: &str = "ais-bridge";

/// Longest accepted traffic window, one week
pub const MAX_TRAFFIC_WINDOW_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Clone, PartialEq, Eq)]
pub struct MqttCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for MqttCredentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MqttCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub credentials: Option<MqttCredentials>,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

impl fmt::Display for MqttSettings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.credentials {
            Some(c) => write!(f, "{}@{}:{}/{}", c.username, self.host, self.port, self.topic),
            None => write!(f, "{}:{}/{}", self.host, self.port, self.topic),
        }
    }
}

#[derive(Clone, PartialEq)]
pub struct HomeAssistantSettings {
    pub uri: Url,
    pub token: String,
}

impl fmt::Debug for HomeAssistantSettings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HomeAssistantSettings")
            .field("uri", &self.uri.as_str())
            .field("token", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MqttTuning {
    pub keep_alive_secs: u64,
    pub connect_timeout_ms: u64,
}

impl Default for MqttTuning {
    fn default() -> Self {
        Self {
            keep_alive_secs: 30,
            connect_timeout_ms: 10_000,
        }
    }
}

/// Delivery policy of the state forwarder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForwardingSettings {
    /// Total attempts per update, including the first one
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub request_timeout_ms: u64,
    /// Skip a send when state and attributes equal the last delivered update
    pub skip_unchanged: bool,
    /// Enrich updates with recent vessel count and remembered ship names
    pub track_traffic: bool,
    pub traffic_window_minutes: u64,
    /// AIS message types that are never forwarded
    pub ignore_types: Vec<u8>,
}

impl Default for ForwardingSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 5_000,
            request_timeout_ms: 5_000,
            skip_unchanged: false,
            track_traffic: false,
            traffic_window_minutes: 60,
            ignore_types: Vec::new(),
        }
    }
}

impl ForwardingSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn backoff(&self) -> BackoffSettings {
        BackoffSettings {
            initial: Duration::from_millis(self.initial_backoff_ms),
            max: Duration::from_millis(self.max_backoff_ms),
        }
    }

    pub fn traffic_window(&self) -> Duration {
        Duration::from_secs(self.traffic_window_minutes.saturating_mul(60))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconnectSettings {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Consecutive failed connects before giving up; unlimited when absent
    pub max_connect_attempts: Option<u32>,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            max_connect_attempts: None,
        }
    }
}

impl ReconnectSettings {
    pub fn backoff(&self) -> BackoffSettings {
        BackoffSettings {
            initial: Duration::from_millis(self.initial_backoff_ms),
            max: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSettings {
    pub initial: Duration,
    pub max: Duration,
}

/// Contents of the optional TOML tuning file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TuningFile {
    pub mqtt: MqttTuning,
    pub forwarding: ForwardingSettings,
    pub reconnect: ReconnectSettings,
}

impl TuningFile {
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded tuning file {}", path.display());
        Self::parse(&content)
    }
}

/// Complete, validated configuration of one bridge instance
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub mqtt: MqttSettings,
    pub home_assistant: HomeAssistantSettings,
    pub forwarding: ForwardingSettings,
    pub reconnect: ReconnectSettings,
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let tuning = match get("AIS_BRIDGE_CONFIG") {
            Some(path) => TuningFile::load(Path::new(&path))?,
            None => TuningFile::default(),
        };

        let host = require("MQTT_SERVER")?;
        let topic = require("MQTT_TOPIC")?;
        let uri = require("HA_URI")?;
        let token = require("HA_TOKEN")?;

        let port = match get("MQTT_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| ConfigError::Invalid {
                    key: "MQTT_PORT",
                    reason: format!("'{}' is not a valid port", raw),
                })?,
            None => DEFAULT_MQTT_PORT,
        };

        let credentials = match (get("MQTT_USERNAME"), get("MQTT_PASSWORD")) {
            (Some(username), Some(password)) => Some(MqttCredentials { username, password }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid {
                    key: "MQTT_USERNAME",
                    reason: "MQTT_USERNAME and MQTT_PASSWORD must be set together".to_string(),
                })
            }
        };

        let uri = Url::parse(&uri).map_err(|e| ConfigError::Invalid {
            key: "HA_URI",
            reason: e.to_string(),
        })?;
        if !matches!(uri.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                key: "HA_URI",
                reason: format!("unsupported scheme '{}'", uri.scheme()),
            });
        }

        let mut forwarding = tuning.forwarding;
        if let Some(raw) = get("IGNORE_TYPES") {
            for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let message_type = item.parse::<u8>().map_err(|_| ConfigError::Invalid {
                    key: "IGNORE_TYPES",
                    reason: format!("'{}' is not a message type", item),
                })?;
                if !forwarding.ignore_types.contains(&message_type) {
                    forwarding.ignore_types.push(message_type);
                }
            }
        }

        let config = Self {
            mqtt: MqttSettings {
                host,
                port,
                topic,
                client_id: get("MQTT_CLIENT_ID").unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
                credentials,
                keep_alive: Duration::from_secs(tuning.mqtt.keep_alive_secs),
                connect_timeout: Duration::from_millis(tuning.mqtt.connect_timeout_ms),
            },
            home_assistant: HomeAssistantSettings { uri, token },
            forwarding,
            reconnect: tuning.reconnect,
        };
        config.validate()?;

        info!(
            "Configuration loaded: broker {}, endpoint {}",
            config.mqtt,
            config.home_assistant.uri
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(key: &'static str, reason: &str) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                key,
                reason: reason.to_string(),
            })
        }

        if self.forwarding.max_attempts == 0 {
            return invalid("forwarding.max_attempts", "must be at least 1");
        }
        if self.forwarding.initial_backoff_ms > self.forwarding.max_backoff_ms {
            return invalid("forwarding.initial_backoff_ms", "exceeds max_backoff_ms");
        }
        if self.forwarding.request_timeout_ms == 0 {
            return invalid("forwarding.request_timeout_ms", "must be positive");
        }
        if self.forwarding.track_traffic && self.forwarding.traffic_window_minutes == 0 {
            return invalid("forwarding.traffic_window_minutes", "must be positive");
        }
        if self.forwarding.traffic_window_minutes > MAX_TRAFFIC_WINDOW_MINUTES {
            return invalid("forwarding.traffic_window_minutes", "must not exceed one week");
        }
        if self.reconnect.initial_backoff_ms > self.reconnect.max_backoff_ms {
            return invalid("reconnect.initial_backoff_ms", "exceeds max_backoff_ms");
        }
        if self.reconnect.max_connect_attempts == Some(0) {
            return invalid("reconnect.max_connect_attempts", "must be at least 1 when set");
        }
        if self.mqtt.keep_alive.as_secs() < 5 {
            return invalid("mqtt.keep_alive_secs", "must be at least 5 seconds");
        }
        if self.mqtt.connect_timeout.is_zero() {
            return invalid("mqtt.connect_timeout_ms", "must be positive");
        }
        Ok(())
    }
}
