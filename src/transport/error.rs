//! Transport-specific error types.
//!
//! Kept separate from the bridge-level errors so that the ingestion loop can
//! decide on its own whether a failure means "device gone" or "try again".

use thiserror::Error;

/// Errors that can occur while opening or driving a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The named device does not exist on this system.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// The device exists but could not be opened (busy, permissions, bad settings).
    #[error("Failed to open {address}: {message}")]
    Open { address: String, message: String },

    /// An I/O error occurred mid-session.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Attempted to use a transport that is not open.
    #[error("Transport is not open")]
    NotOpen,

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl TransportError {
    /// Create a NotFound error from a port name.
    pub fn not_found(address: impl Into<String>) -> Self {
        Self::NotFound(address.into())
    }

    /// Create an Open error for the given address.
    pub fn open(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Open {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error of the given kind, mostly useful for mocks.
    pub fn io(kind: std::io::ErrorKind, message: impl Into<String>) -> Self {
        Self::Io(std::io::Error::new(kind, message.into()))
    }
}
