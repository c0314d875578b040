//! Core traits for the transport abstraction.
//!
//! Defines the `Transport` trait that lets the real serial port, the simulator
//! and the test mock be used interchangeably by the bridge.

use super::error::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Which concrete transport backs a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Serial,
    Simulator,
    Mock,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Simulator => write!(f, "simulator"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

/// Identifies the device behind a transport.
///
/// Only used for diagnostics and state messages; the bridge never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportDescriptor {
    pub kind: TransportKind,
    pub address: String,
    pub baud_rate: u32,
}

impl TransportDescriptor {
    pub fn new(kind: TransportKind, address: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            kind,
            address: address.into(),
            baud_rate,
        }
    }
}

impl fmt::Display for TransportDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} baud", self.address, self.baud_rate)
    }
}

/// Outcome of a single `read_line` attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A complete line, terminator already stripped.
    Line(Vec<u8>),
    /// Nothing arrived before the timeout. Not an error.
    Idle,
}

/// A line-oriented byte stream that can be opened, read, written and closed.
///
/// Every method takes `&self`: implementations keep their read and write sides
/// behind separate locks so the ingestion loop can block in `read_line` while a
/// caller writes a command.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Open the underlying device.
    fn open(&self) -> Result<TransportDescriptor, TransportError>;

    /// Wait at most `timeout` for one complete line.
    ///
    /// `Ok(LineRead::Idle)` means "no data yet"; an `Err` means the device is
    /// gone and the session should end.
    fn read_line(&self, timeout: Duration) -> Result<LineRead, TransportError>;

    /// Write raw bytes, returning the number of bytes written.
    fn write(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Release the device. Closing an already-closed transport is a no-op.
    fn close(&self);

    /// Whether `open` succeeded and `close` has not been called since.
    fn is_open(&self) -> bool;

    /// Describe the device this transport talks to.
    fn descriptor(&self) -> TransportDescriptor;
}

/// Builds the transports a bridge session runs on.
///
/// `primary` is used by `open`; `fallback` is used when the primary transport
/// dies mid-session and fallback is enabled.
pub trait TransportFactory: Send + Sync {
    fn primary(&self) -> Arc<dyn Transport>;

    fn fallback(&self) -> Arc<dyn Transport>;
}
