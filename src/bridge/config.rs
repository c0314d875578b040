use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::transport::{
    default_port_name, SerialSettings, SimulatorSettings, StandardTransports, TransportSource,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::hub::DEFAULT_SUBSCRIBER_BUFFER;

/// What `close` does to the history window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryPolicy {
    /// Keep readings across sessions; the plot continues after a reconnect.
    #[default]
    Retain,
    /// Start every session with an empty window.
    ClearOnClose,
}

/// Runtime settings for one bridge.
///
/// This is the resolved, in-memory form. The file/env form lives in
/// [`crate::config::Config`] and converts into this with `bridge_config()`.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Which transport `open` uses.
    pub source: TransportSource,
    pub transport_address: String,
    pub baud_rate: u32,
    /// Pause after opening the serial port before reading.
    pub settle_delay: Duration,
    pub history_capacity: usize,
    pub history_policy: HistoryPolicy,
    /// Upper bound on one blocking read; also how quickly `close` is noticed.
    pub read_timeout: Duration,
    /// Simulator line period.
    pub emission_interval: Duration,
    pub simulator_baseline_cm: u32,
    pub simulator_jitter_cm: u32,
    pub motion_probability: f64,
    pub simulator_seed: Option<u64>,
    /// Switch to the simulator when the primary transport is lost.
    pub fallback_on_disconnect: bool,
    /// How long `close` waits for the ingestion loop before detaching it.
    /// Should exceed `read_timeout`, since the loop only notices the stop
    /// flag between reads.
    pub shutdown_timeout: Duration,
    /// Per-subscriber queue depth.
    pub subscriber_buffer: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let simulator = SimulatorSettings::default();
        Self {
            source: TransportSource::Serial,
            transport_address: default_port_name().to_string(),
            baud_rate: 9600,
            settle_delay: Duration::from_secs(2),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            history_policy: HistoryPolicy::Retain,
            read_timeout: Duration::from_secs(1),
            emission_interval: simulator.interval,
            simulator_baseline_cm: simulator.baseline_cm,
            simulator_jitter_cm: simulator.jitter_cm,
            motion_probability: simulator.motion_probability,
            simulator_seed: None,
            fallback_on_disconnect: false,
            shutdown_timeout: Duration::from_millis(1500),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

impl BridgeConfig {
    /// Defaults with the simulator as the primary source.
    pub fn simulated() -> Self {
        Self {
            source: TransportSource::Simulator,
            ..Self::default()
        }
    }

    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            address: self.transport_address.clone(),
            baud_rate: self.baud_rate,
            settle_delay: self.settle_delay,
        }
    }

    pub fn simulator_settings(&self) -> SimulatorSettings {
        SimulatorSettings {
            interval: self.emission_interval,
            baseline_cm: self.simulator_baseline_cm,
            jitter_cm: self.simulator_jitter_cm,
            motion_probability: self.motion_probability,
            seed: self.simulator_seed,
        }
    }

    /// The transport factory this configuration describes.
    pub fn transports(&self) -> StandardTransports {
        StandardTransports {
            source: self.source,
            serial: self.serial_settings(),
            simulator: self.simulator_settings(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{TransportFactory, TransportKind};

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.history_capacity, 120);
        assert_eq!(config.emission_interval, Duration::from_millis(600));
        assert_eq!(config.history_policy, HistoryPolicy::Retain);
        assert!(!config.fallback_on_disconnect);
    }

    #[test]
    fn test_settings_derivation() {
        let config = BridgeConfig {
            transport_address: "COM7".into(),
            baud_rate: 115_200,
            emission_interval: Duration::from_millis(50),
            simulator_seed: Some(7),
            ..BridgeConfig::default()
        };

        let serial = config.serial_settings();
        assert_eq!(serial.address, "COM7");
        assert_eq!(serial.baud_rate, 115_200);

        let simulator = config.simulator_settings();
        assert_eq!(simulator.interval, Duration::from_millis(50));
        assert_eq!(simulator.seed, Some(7));
    }

    #[test]
    fn test_simulated_source() {
        let factory = BridgeConfig::simulated().transports();
        assert_eq!(factory.primary().descriptor().kind, TransportKind::Simulator);
    }
}
