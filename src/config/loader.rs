//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "TELEMETRY_BRIDGE";

/// Config file name looked up in the working directory
const LOCAL_CONFIG_FILE_NAME: &str = "telemetry-bridge.toml";

/// Config file name inside the per-user config directory
const CONFIG_FILE_NAME: &str = "config.toml";

const APP_DIR_NAME: &str = "telemetry-bridge";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "TELEMETRY_BRIDGE_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `TELEMETRY_BRIDGE_CONFIG` environment variable (explicit path)
    /// 2. `./telemetry-bridge.toml` (current directory)
    /// 3. `~/.config/telemetry-bridge/config.toml` (XDG on Linux/macOS)
    /// 4. `%APPDATA%\telemetry-bridge\config.toml` (Windows)
    /// 5. Built-in defaults (no file required)
    ///
    /// Environment variables override file values; the result is validated.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> ConfigResult<Self> {
        let mut config = Config::default();
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: None,
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(&self.config)?)
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(LOCAL_CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. XDG config directory (Linux/macOS) or APPDATA (Windows)
    if let Some(app_config) = get_default_config_path() {
        if app_config.exists() {
            return Some(app_config);
        }
    }

    None
}

/// Get the platform-specific config directory.
fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

/// Get the default per-user config file path.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

/// First set variable among `names`, with the name that matched.
fn env_lookup(names: &[&str]) -> Option<(String, String)> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok().map(|val| (name.to_string(), val)))
}

fn parse_env<T: FromStr>(var: &str, val: &str, what: &str) -> ConfigResult<T> {
    val.trim()
        .parse()
        .map_err(|_| ConfigError::env_parse(var, format!("Invalid {what}: {val:?}")))
}

fn parse_env_bool(var: &str, val: &str) -> ConfigResult<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::env_parse(var, format!("Invalid boolean: {val:?}"))),
    }
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `TELEMETRY_BRIDGE_<SECTION>_<KEY>`
/// For example:
/// - `TELEMETRY_BRIDGE_SERIAL_PORT=COM4`
/// - `TELEMETRY_BRIDGE_SIMULATOR_EMIT_INTERVAL_MS=250`
///
/// The unprefixed variables of older deployments (`USE_SERIAL`, `SERIAL_PORT`,
/// `SERIAL_BAUD`, `EMIT_INTERVAL` in seconds, `PORT`) are honoured when the
/// prefixed form is absent.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    let prefixed = |key: &str| format!("{ENV_PREFIX}_{key}");

    // Bridge overrides
    if let Some((var, val)) = env_lookup(&[prefixed("BRIDGE_USE_SERIAL").as_str(), "USE_SERIAL"]) {
        config.bridge.use_serial = parse_env_bool(&var, &val)?;
    }
    if let Some((var, val)) = env_lookup(&[prefixed("BRIDGE_HISTORY_CAPACITY").as_str()]) {
        config.bridge.history_capacity = parse_env(&var, &val, "capacity")?;
    }
    if let Some((var, val)) = env_lookup(&[prefixed("BRIDGE_READ_TIMEOUT_MS").as_str()]) {
        config.bridge.read_timeout_ms = parse_env(&var, &val, "timeout")?;
    }
    if let Some((var, val)) = env_lookup(&[prefixed("BRIDGE_FALLBACK_ON_DISCONNECT").as_str()]) {
        config.bridge.fallback_on_disconnect = Some(parse_env_bool(&var, &val)?);
    }

    // Serial overrides
    if let Some((var, val)) = env_lookup(&[prefixed("SERIAL_PORT").as_str(), "SERIAL_PORT"]) {
        if val.trim().is_empty() {
            return Err(ConfigError::env_parse(var, "Port name is empty"));
        }
        config.serial.port = val;
    }
    if let Some((var, val)) = env_lookup(&[prefixed("SERIAL_BAUD").as_str(), "SERIAL_BAUD"]) {
        config.serial.baud = parse_env(&var, &val, "baud rate")?;
    }

    // Simulator overrides
    if let Some((var, val)) = env_lookup(&[prefixed("SIMULATOR_EMIT_INTERVAL_MS").as_str()]) {
        config.simulator.emit_interval_ms = parse_env(&var, &val, "interval")?;
    } else if let Some((var, val)) = env_lookup(&["EMIT_INTERVAL"]) {
        let seconds: f64 = parse_env(&var, &val, "interval")?;
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(ConfigError::env_parse(var, "Interval must be positive"));
        }
        config.simulator.emit_interval_ms = (seconds * 1000.0).round() as u64;
    }
    if let Some((var, val)) = env_lookup(&[prefixed("SIMULATOR_SEED").as_str()]) {
        config.simulator.seed = Some(parse_env(&var, &val, "seed")?);
    }

    // Server overrides
    if let Some((_, val)) = env_lookup(&[prefixed("SERVER_HOST").as_str()]) {
        config.server.host = val;
    }
    if let Some((var, val)) = env_lookup(&[prefixed("SERVER_PORT").as_str(), "PORT"]) {
        config.server.port = parse_env(&var, &val, "port number")?;
    }

    // Logging overrides
    if let Some((_, val)) = env_lookup(&[prefixed("LOGGING_LEVEL").as_str()]) {
        config.logging.level = val;
    }
    if let Some((var, val)) = env_lookup(&[prefixed("LOGGING_FORMAT").as_str()]) {
        config.logging.format = match val.trim().to_ascii_lowercase().as_str() {
            "full" => LogFormat::Full,
            "compact" => LogFormat::Compact,
            _ => return Err(ConfigError::env_parse(var, "Expected \"full\" or \"compact\"")),
        };
    }

    Ok(())
}
