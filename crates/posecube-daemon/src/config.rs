//! Configuration loading

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub animation: AnimationConfig,
    #[serde(default)]
    pub hotspot: HotspotConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for web server
    #[serde(default = "default_bind")]
    pub bind: String,
    /// TLS configuration (optional - enables HTTPS when present)
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            tls: None,
        }
    }
}

/// TLS/HTTPS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM format)
    pub cert: String,
    /// Path to private key file (PEM format)
    pub key: String,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Initial value of the broker URL field
    #[serde(default)]
    pub url: String,
    /// Initial value of the topic field
    #[serde(default)]
    pub topic: String,
    /// Connect as soon as the daemon starts
    #[serde(default)]
    pub auto_connect: bool,
    /// MQTT keep-alive in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            topic: String::new(),
            auto_connect: false,
            keep_alive_secs: default_keep_alive(),
        }
    }
}

fn default_keep_alive() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationConfig {
    /// Milliseconds between animation ticks
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

impl AnimationConfig {
    pub fn interval(&self) -> Duration {
        // tokio panics on a zero period
        Duration::from_millis(self.interval_ms.max(1))
    }
}

fn default_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotspotConfig {
    /// Endpoint returning `{ "message": "..." }`
    #[serde(default = "default_hotspot_url")]
    pub url: String,
    /// Request timeout in seconds
    #[serde(default = "default_hotspot_timeout")]
    pub timeout_secs: u64,
}

impl Default for HotspotConfig {
    fn default() -> Self {
        Self {
            url: default_hotspot_url(),
            timeout_secs: default_hotspot_timeout(),
        }
    }
}

fn default_hotspot_url() -> String {
    "http://localhost:5000/random-message".to_string()
}

fn default_hotspot_timeout() -> u64 {
    10
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let config = Config {
        broker: BrokerConfig {
            url: "mqtt://localhost:1883".to_string(),
            topic: "posecube/pose".to_string(),
            ..BrokerConfig::default()
        },
        ..Config::default()
    };

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    Ok(())
}
