#[cfg(feature = "web")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
#[cfg(feature = "web")]
use serde_json::json;
use thiserror::Error;

use crate::transport::TransportError;

/// Highest servo angle the firmware understands.
pub const MAX_SERVO_POSITION: i64 = 180;

/// A specialized `Result` type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors returned synchronously by bridge operations.
///
/// Nothing here is fatal to the process; at worst the bridge ends up
/// disconnected and waits for the caller to open it again.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The device is absent or busy. Not retried automatically.
    #[error("Failed to open transport: {0}")]
    TransportOpen(#[source] TransportError),

    /// The device failed while in use.
    #[error("Transport I/O failed: {0}")]
    TransportIo(#[source] TransportError),

    #[error("Bridge is already connected. Close it before opening again.")]
    AlreadyConnected,

    #[error("Operation requires a connected bridge, but it is not connected.")]
    NotConnected,

    #[error("Servo position {0} is outside 0..=180")]
    CommandOutOfRange(i64),

    /// The ingestion worker thread could not be spawned.
    #[error("Failed to start ingestion worker: {0}")]
    Worker(#[source] std::io::Error),
}

impl BridgeError {
    /// Stable identifier used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransportOpen(_) => "TransportOpen",
            Self::TransportIo(_) => "TransportIo",
            Self::AlreadyConnected => "AlreadyConnected",
            Self::NotConnected => "NotConnected",
            Self::CommandOutOfRange(_) => "CommandOutOfRange",
            Self::Worker(_) => "Worker",
        }
    }
}

/// Allows Axum to convert `BridgeError` into an HTTP response.
#[cfg(feature = "web")]
impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::AlreadyConnected | Self::NotConnected => StatusCode::CONFLICT,
            Self::CommandOutOfRange(_) => StatusCode::BAD_REQUEST,
            Self::TransportOpen(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::TransportIo(_) | Self::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = axum::Json(json!({
            "status": "error",
            "error": { "type": self.kind(), "message": self.to_string() }
        }));
        (status, body).into_response()
    }
}
