//! Configuration module for the telemetry bridge.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `TELEMETRY_BRIDGE_CONFIG` environment variable (explicit path)
//! 2. `./telemetry-bridge.toml` (current directory)
//! 3. `~/.config/telemetry-bridge/config.toml` (XDG on Linux/macOS)
//! 4. `%APPDATA%\telemetry-bridge\config.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Configuration values can be overridden via environment variables.
//! The pattern is: `TELEMETRY_BRIDGE_<SECTION>_<KEY>`
//!
//! Examples:
//! - `TELEMETRY_BRIDGE_SERVER_PORT=8080`
//! - `TELEMETRY_BRIDGE_SERIAL_BAUD=115200`
//! - `TELEMETRY_BRIDGE_BRIDGE_FALLBACK_ON_DISCONNECT=true`
//!
//! Legacy environment variables are also supported:
//! - `USE_SERIAL`, `SERIAL_PORT`, `SERIAL_BAUD`
//! - `EMIT_INTERVAL` (seconds, fractional), `PORT`
//!
//! # Example
//!
//! ```rust,no_run
//! use telemetry_bridge::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//!
//! println!("Serial port: {}", config.serial.port);
//! let bridge_config = config.bridge_config();
//! # Ok::<(), telemetry_bridge::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{get_default_config_path, resolve_config_path, ConfigLoader};
pub use schema::{
    BridgeSection, Config, LogFormat, LoggingConfig, SerialConfig, ServerConfig, SimulatorConfig,
};
