//! Telemetry Bridge Library
//!
//! Reads `D:<distance>,M:<0|1>` lines from a serial-attached sensor board (or
//! a simulator), keeps a bounded history, fans readings out to subscribers
//! and forwards servo commands back to the board.
//!
//! # Modules
//!
//! - `bridge`: Connection lifecycle, ingestion and subscriber fan-out
//! - `codec`: Line protocol parsing and command encoding
//! - `history`: Bounded reading history
//! - `transport`: Serial, simulator and mock transports
//! - `config`: Configuration management with TOML support
//! - `error`: Bridge error type
//! - `logging`: Tracing subscriber setup
//! - `console`: Line-oriented dashboard
//! - `rest_api` / `websocket`: HTTP and WebSocket server (when `web` feature is enabled)

pub mod bridge;
pub mod codec;
pub mod config;
pub mod console;
pub mod error;
pub mod history;
pub mod logging;
pub mod transport;

#[cfg(feature = "web")]
pub mod rest_api;

#[cfg(feature = "web")]
pub mod websocket;

// Re-export commonly used types for convenience
pub use bridge::{
    Bridge, BridgeConfig, BridgeEvent, BridgeStats, ConnectionState, HistoryPolicy, StateChange,
    SubscriberId, Subscription,
};
pub use codec::{encode_command, parse_line, LineCodec, ParseError, Reading};
pub use error::{BridgeError, BridgeResult};
pub use history::{HistoryBuffer, HistorySnapshot};
pub use transport::{
    MockTransport, SerialTransport, SimulatorTransport, Transport, TransportDescriptor,
    TransportError, TransportFactory, TransportKind, TransportSource,
};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
