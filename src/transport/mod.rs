//! Transport abstraction layer.
//!
//! Provides the `Transport` trait plus the serial, simulator and mock
//! implementations, enabling dependency injection and hardware-free testing.

pub mod error;
pub mod line_buffer;
pub mod mock;
pub mod serial;
pub mod simulator;
pub mod traits;

pub use error::TransportError;
pub use line_buffer::LineBuffer;
pub use mock::MockTransport;
pub use serial::{available_ports, default_port_name, SerialSettings, SerialTransport};
pub use simulator::{SimulatorSettings, SimulatorTransport};
pub use traits::*;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which transport `open` should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportSource {
    #[default]
    Serial,
    Simulator,
}

/// Builds a fresh serial or simulator transport for every session.
#[derive(Debug, Clone)]
pub struct StandardTransports {
    pub source: TransportSource,
    pub serial: SerialSettings,
    pub simulator: SimulatorSettings,
}

impl TransportFactory for StandardTransports {
    fn primary(&self) -> Arc<dyn Transport> {
        match self.source {
            TransportSource::Serial => Arc::new(SerialTransport::new(self.serial.clone())),
            TransportSource::Simulator => self.fallback(),
        }
    }

    fn fallback(&self) -> Arc<dyn Transport> {
        Arc::new(SimulatorTransport::new(self.simulator.clone()))
    }
}

/// Hands out the same pre-built transports on every call.
///
/// Handy when the caller wants to keep a handle on the transport, as tests do
/// with `MockTransport`.
#[derive(Debug, Clone)]
pub struct FixedTransports {
    primary: Arc<dyn Transport>,
    fallback: Arc<dyn Transport>,
}

impl FixedTransports {
    pub fn new(primary: Arc<dyn Transport>, fallback: Arc<dyn Transport>) -> Self {
        Self { primary, fallback }
    }
}

impl TransportFactory for FixedTransports {
    fn primary(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.primary)
    }

    fn fallback(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_transports_pick_source() {
        let mut factory = StandardTransports {
            source: TransportSource::Serial,
            serial: SerialSettings::default(),
            simulator: SimulatorSettings::default(),
        };
        assert_eq!(factory.primary().descriptor().kind, TransportKind::Serial);
        assert_eq!(factory.fallback().descriptor().kind, TransportKind::Simulator);

        factory.source = TransportSource::Simulator;
        assert_eq!(factory.primary().descriptor().kind, TransportKind::Simulator);
    }

    #[test]
    fn test_fixed_transports_share_instances() {
        let mock = MockTransport::new("MOCK0");
        let factory = FixedTransports::new(
            Arc::new(mock.clone()),
            Arc::new(SimulatorTransport::new(SimulatorSettings::default())),
        );

        factory.primary().open().unwrap();
        assert!(mock.is_open());
    }
}
