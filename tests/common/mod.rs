//! Shared test utilities for telemetry bridge tests.
//!
//! This module provides common test infrastructure including:
//! - A bridge wired to scriptable mock transports
//! - Event collection helpers for subscriptions
//! - Polling helpers for asynchronous state changes

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry_bridge::transport::{FixedTransports, SimulatorSettings};
use telemetry_bridge::{
    Bridge, BridgeConfig, BridgeEvent, ConnectionState, MockTransport, SimulatorTransport,
    Subscription, Transport,
};

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(3);

/// Bridge settings with short timeouts so tests stay fast.
pub fn fast_config() -> BridgeConfig {
    BridgeConfig {
        read_timeout: Duration::from_millis(20),
        emission_interval: Duration::from_millis(10),
        settle_delay: Duration::ZERO,
        shutdown_timeout: Duration::from_secs(1),
        ..BridgeConfig::default()
    }
}

/// A bridge plus handles on the transports it will use.
pub struct MockRig {
    pub bridge: Bridge,
    pub device: MockTransport,
}

/// Primary transport is a mock named `COM4`; fallback is a seeded simulator.
pub fn mock_rig(config: BridgeConfig) -> MockRig {
    let device = MockTransport::new("COM4");
    let simulator: Arc<dyn Transport> = Arc::new(SimulatorTransport::new(SimulatorSettings {
        interval: Duration::from_millis(10),
        seed: Some(7),
        ..SimulatorSettings::default()
    }));
    let bridge = Bridge::with_transports(
        config,
        FixedTransports::new(Arc::new(device.clone()), simulator),
    );
    MockRig { bridge, device }
}

/// Poll `condition` until it holds or [`WAIT`] elapses.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Pull events until `done` says the collection is complete, or time runs out.
pub fn collect_until(
    subscription: &mut Subscription,
    mut done: impl FnMut(&[BridgeEvent]) -> bool,
) -> Vec<BridgeEvent> {
    let deadline = Instant::now() + WAIT;
    let mut events = Vec::new();
    while Instant::now() < deadline && !done(&events) {
        match subscription.try_recv() {
            Some(event) => events.push(event),
            None => std::thread::sleep(Duration::from_millis(2)),
        }
    }
    events
}

/// Everything already queued on the subscription.
pub fn drain(subscription: &mut Subscription) -> Vec<BridgeEvent> {
    std::iter::from_fn(|| subscription.try_recv()).collect()
}

/// The state changes in `events`, labels only.
pub fn state_labels(events: &[BridgeEvent]) -> Vec<&'static str> {
    events
        .iter()
        .filter_map(BridgeEvent::as_state)
        .map(ConnectionState::label)
        .collect()
}

/// Distances of the readings in `events`.
pub fn distances(events: &[BridgeEvent]) -> Vec<u32> {
    events
        .iter()
        .filter_map(BridgeEvent::as_reading)
        .map(|r| r.distance_cm)
        .collect()
}
