// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::control::{ThresholdConfig, ValveMode};
use crate::link::Parity;
use crate::protocol::DEFAULT_MAX_LINE;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level
    pub log_level: String,

    /// Run against a simulated sensor node and camera
    pub demo_mode: bool,

    /// Serial link configuration
    pub link: LinkConfig,

    /// Valve control configuration
    pub control: ControlConfig,

    /// People-flow detection configuration
    pub detection: DetectionConfig,

    /// Cloud telemetry configuration
    pub telemetry: TelemetryConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Status API configuration
    pub api: ApiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            demo_mode: false,
            link: LinkConfig::default(),
            control: ControlConfig::default(),
            detection: DetectionConfig::default(),
            telemetry: TelemetryConfig::default(),
            database: DatabaseConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.control.thresholds.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("fireguard"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Serial link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial device, e.g. `/dev/ttyUSB0` or `COM3`
    pub port: Option<String>,

    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,

    /// Upper bound on one blocking read
    pub poll_timeout_ms: u64,

    /// Longest line accepted before it is dropped
    pub max_line_len: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            poll_timeout_ms: 15,
            max_line_len: DEFAULT_MAX_LINE,
        }
    }
}

impl LinkConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms.max(1))
    }
}

/// Valve control configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Mode at startup
    pub initial_mode: ValveMode,

    pub thresholds: ThresholdConfig,

    /// Budget for one telemetry publish from the acquisition loop
    pub publish_timeout_ms: u64,

    /// Budget for one persistence acknowledgement from the acquisition loop
    pub persist_timeout_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            initial_mode: ValveMode::Auto,
            thresholds: ThresholdConfig::default(),
            publish_timeout_ms: 2000,
            persist_timeout_ms: 1000,
        }
    }
}

/// People-flow detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Start detection with the session
    pub enabled: bool,

    /// Capture cadence
    pub frame_interval_ms: u64,

    /// Counts buffered between capture and reporting
    pub report_queue: usize,

    /// Capture device index
    pub camera_index: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            frame_interval_ms: 30,
            report_queue: 8,
            camera_index: 0,
        }
    }
}

/// Telemetry backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryBackend {
    Disabled,
    Http,
    Mqtt,
}

/// Cloud telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub backend: TelemetryBackend,

    /// Property-post endpoint for the HTTP backend
    pub http_endpoint: String,

    /// Extra request headers, e.g. an access token
    pub http_headers: BTreeMap<String, String>,

    pub mqtt_broker: String,
    pub mqtt_port: u16,
    pub mqtt_client_id: String,
    pub mqtt_topic: String,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,

    /// Per-request timeout
    pub timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            backend: TelemetryBackend::Disabled,
            http_endpoint: "http://localhost:8080/properties".to_string(),
            http_headers: BTreeMap::new(),
            mqtt_broker: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_client_id: "fireguard".to_string(),
            mqtt_topic: "fireguard/properties".to_string(),
            mqtt_username: None,
            mqtt_password: None,
            timeout_ms: 2000,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database path
    pub path: PathBuf,

    /// Pending operations the writer accepts before callers wait
    pub queue_depth: usize,

    /// Longest a status query waits for the store
    pub read_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/fireguard.db"),
            queue_depth: 256,
            read_timeout_ms: 500,
        }
    }
}

impl DatabaseConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Status API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind: SocketAddr,

    /// Rows returned by history endpoints when no limit is given
    pub history_limit: usize,

    /// Largest limit a client may request
    pub max_limit: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: SocketAddr::from(([0, 0, 0, 0], 5000)),
            history_limit: 10,
            max_limit: 100,
        }
    }
}
