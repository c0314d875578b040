//! Connection lifecycle states and the events pushed to subscribers.

use crate::codec::Reading;
use crate::transport::TransportDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the bridge is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", content = "details", rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected(TransportDescriptor),
    /// The session ended; carries the reason.
    Disconnected(String),
    /// The last `open` failed; carries the error.
    Failed(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    /// Connected or on its way there.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connected(_) | Self::Connecting)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected(_) => "connected",
            Self::Disconnected(_) => "disconnected",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected(desc) => write!(f, "Connected to {desc}"),
            Self::Disconnected(reason) => write!(f, "Disconnected ({reason})"),
            Self::Failed(error) => write!(f, "Error: {error}"),
        }
    }
}

/// A lifecycle transition as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub state: ConnectionState,
    /// Human-readable context, e.g. which device was lost.
    pub detail: String,
}

/// Everything a subscriber can receive, in publication order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    Reading(Reading),
    State(StateChange),
}

impl BridgeEvent {
    pub fn as_reading(&self) -> Option<&Reading> {
        match self {
            Self::Reading(reading) => Some(reading),
            Self::State(_) => None,
        }
    }

    pub fn as_state(&self) -> Option<&ConnectionState> {
        match self {
            Self::State(change) => Some(&change.state),
            Self::Reading(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportKind;

    #[test]
    fn test_state_predicates() {
        let connected =
            ConnectionState::Connected(TransportDescriptor::new(TransportKind::Serial, "COM4", 9600));
        assert!(connected.is_connected());
        assert!(connected.is_active());
        assert!(ConnectionState::Connecting.is_active());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::Failed("busy".into()).is_active());
        assert_eq!(ConnectionState::default(), ConnectionState::Idle);
    }

    #[test]
    fn test_state_display() {
        let connected =
            ConnectionState::Connected(TransportDescriptor::new(TransportKind::Serial, "COM4", 9600));
        assert_eq!(connected.to_string(), "Connected to COM4 @ 9600 baud");
        assert_eq!(
            ConnectionState::Failed("Access denied".into()).to_string(),
            "Error: Access denied"
        );
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(ConnectionState::Disconnected("unplugged".into())).unwrap();
        assert_eq!(json["status"], "disconnected");
        assert_eq!(json["details"], "unplugged");

        let json = serde_json::to_value(ConnectionState::Idle).unwrap();
        assert_eq!(json["status"], "idle");
    }
}
