//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All configuration sections are defined here with appropriate defaults.

use super::error::{ConfigError, ConfigResult};
use crate::bridge::{BridgeConfig, HistoryPolicy, DEFAULT_SUBSCRIBER_BUFFER};
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::transport::{default_port_name, TransportSource};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bridge behaviour
    pub bridge: BridgeSection,
    /// Serial device
    pub serial: SerialConfig,
    /// Synthetic data source
    pub simulator: SimulatorConfig,
    /// HTTP/WebSocket server
    pub server: ServerConfig,
    /// Logging
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values the bridge cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.bridge.history_capacity == 0 {
            return Err(ConfigError::validation(
                "bridge.history_capacity",
                "must be at least 1",
            ));
        }
        if self.bridge.read_timeout_ms == 0 {
            return Err(ConfigError::validation(
                "bridge.read_timeout_ms",
                "must be greater than 0",
            ));
        }
        if self.bridge.shutdown_timeout_ms <= self.bridge.read_timeout_ms {
            return Err(ConfigError::validation(
                "bridge.shutdown_timeout_ms",
                format!(
                    "must exceed bridge.read_timeout_ms ({})",
                    self.bridge.read_timeout_ms
                ),
            ));
        }
        if self.bridge.subscriber_buffer == 0 {
            return Err(ConfigError::validation(
                "bridge.subscriber_buffer",
                "must be at least 1",
            ));
        }
        if self.serial.baud == 0 {
            return Err(ConfigError::validation("serial.baud", "must be greater than 0"));
        }
        if self.serial.port.trim().is_empty() {
            return Err(ConfigError::validation("serial.port", "must not be empty"));
        }
        if self.simulator.emit_interval_ms == 0 {
            return Err(ConfigError::validation(
                "simulator.emit_interval_ms",
                "must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.simulator.motion_probability) {
            return Err(ConfigError::validation(
                "simulator.motion_probability",
                format!("{} is outside 0.0..=1.0", self.simulator.motion_probability),
            ));
        }
        Ok(())
    }

    /// Resolve into the runtime settings of a bridge.
    ///
    /// An unset `fallback_on_disconnect` means no fallback.
    pub fn bridge_config(&self) -> BridgeConfig {
        self.bridge_config_with_fallback(false)
    }

    /// Like [`bridge_config`](Self::bridge_config), with `fallback_default`
    /// used when `fallback_on_disconnect` is not configured.
    pub fn bridge_config_with_fallback(&self, fallback_default: bool) -> BridgeConfig {
        BridgeConfig {
            source: if self.bridge.use_serial {
                TransportSource::Serial
            } else {
                TransportSource::Simulator
            },
            transport_address: self.serial.port.clone(),
            baud_rate: self.serial.baud,
            settle_delay: Duration::from_millis(self.serial.settle_delay_ms),
            history_capacity: self.bridge.history_capacity,
            history_policy: self.bridge.history_policy,
            read_timeout: Duration::from_millis(self.bridge.read_timeout_ms),
            emission_interval: self.simulator.emit_interval(),
            simulator_baseline_cm: self.simulator.baseline_cm,
            simulator_jitter_cm: self.simulator.jitter_cm,
            motion_probability: self.simulator.motion_probability,
            simulator_seed: self.simulator.seed,
            fallback_on_disconnect: self
                .bridge
                .fallback_on_disconnect
                .unwrap_or(fallback_default),
            shutdown_timeout: Duration::from_millis(self.bridge.shutdown_timeout_ms),
            subscriber_buffer: self.bridge.subscriber_buffer,
        }
    }
}

/// `[bridge]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
    /// Read from the serial device; otherwise start on the simulator
    pub use_serial: bool,
    /// Readings kept for plotting
    pub history_capacity: usize,
    /// "retain" or "clear_on_close"
    pub history_policy: HistoryPolicy,
    /// Upper bound on one blocking read
    pub read_timeout_ms: u64,
    /// Switch to the simulator when the device is lost. Unset: the console
    /// stops, the web server falls back.
    pub fallback_on_disconnect: Option<bool>,
    /// How long `close` waits for ingestion to stop; longer than one read
    pub shutdown_timeout_ms: u64,
    /// Per-subscriber queue depth
    pub subscriber_buffer: usize,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            use_serial: false,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            history_policy: HistoryPolicy::Retain,
            read_timeout_ms: 1000,
            fallback_on_disconnect: None,
            shutdown_timeout_ms: 1500,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

/// `[serial]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device name, e.g. `/dev/ttyACM0` or `COM4`
    pub port: String,
    pub baud: u32,
    /// Wait after opening while the board resets
    pub settle_delay_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port_name().to_string(),
            baud: 9600,
            settle_delay_ms: 2000,
        }
    }
}

/// `[simulator]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Time between synthesized readings
    pub emit_interval_ms: u64,
    pub baseline_cm: u32,
    pub jitter_cm: u32,
    /// Chance of a motion flag per reading, 0.0 to 1.0
    pub motion_probability: f64,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            emit_interval_ms: 600,
            baseline_cm: 2500,
            jitter_cm: 50,
            motion_probability: 0.05,
            seed: None,
        }
    }
}

impl SimulatorConfig {
    pub fn emit_interval(&self) -> Duration {
        Duration::from_millis(self.emit_interval_ms)
    }
}

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port number for HTTP server
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log format: "full" or "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Full,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Timestamps, levels and targets
    #[default]
    Full,
    /// One short line per event
    Compact,
}
