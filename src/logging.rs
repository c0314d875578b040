//! Tracing subscriber setup.
//!
//! Logs go to stderr so the console dashboard keeps stdout to itself.
//! `RUST_LOG`, when set, takes precedence over the configured level.

use crate::config::{LogFormat, LoggingConfig};
use std::io;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter: `RUST_LOG` first, then the configured level, then `info`.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TryInitError> {
    let (full, compact) = match config.format {
        LogFormat::Full => (Some(fmt::layer().with_writer(io::stderr)), None),
        LogFormat::Compact => (
            None,
            Some(fmt::layer().compact().with_target(false).with_writer(io::stderr)),
        ),
    };

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(full)
        .with(compact)
        .try_init()
}
