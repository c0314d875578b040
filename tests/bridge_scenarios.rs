//! Bridge lifecycle tests against scripted transports.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use telemetry_bridge::transport::{FixedTransports, LineRead, SimulatorSettings};
use telemetry_bridge::{
    Bridge, BridgeConfig, BridgeError, BridgeEvent, ConnectionState, HistoryBuffer,
    HistoryPolicy, LineCodec, SimulatorTransport, Transport, TransportDescriptor, TransportError,
    TransportKind,
};

/// A device whose reads finish late, then deliver a reading.
#[derive(Debug, Default)]
struct LaggingTransport {
    open: AtomicBool,
}

impl Transport for LaggingTransport {
    fn open(&self) -> Result<TransportDescriptor, TransportError> {
        self.open.store(true, Ordering::Release);
        Ok(self.descriptor())
    }

    fn read_line(&self, timeout: Duration) -> Result<LineRead, TransportError> {
        std::thread::sleep(timeout + Duration::from_millis(50));
        Ok(LineRead::Line(b"D:99,M:1".to_vec()))
    }

    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        Ok(data.len())
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn descriptor(&self) -> TransportDescriptor {
        TransportDescriptor::new(TransportKind::Mock, "LAG0", 9600)
    }
}

#[test]
fn test_readings_published_in_order_and_noise_skipped() {
    let rig = mock_rig(fast_config());
    let mut events = rig.bridge.subscribe();
    rig.device.enqueue_line("D:120,M:0");
    rig.device.enqueue_line("GARBAGE");
    rig.device.enqueue_line("D:45,M:1");

    rig.bridge.open().unwrap();
    let collected = collect_until(&mut events, |evs| distances(evs).len() == 2);

    let readings: Vec<_> = collected
        .iter()
        .filter_map(BridgeEvent::as_reading)
        .map(|r| (r.distance_cm, r.motion_detected))
        .collect();
    assert_eq!(readings, vec![(120, false), (45, true)]);

    let sequences: Vec<u64> = collected
        .iter()
        .filter_map(BridgeEvent::as_reading)
        .map(|r| r.sequence)
        .collect();
    assert_eq!(sequences, vec![1, 2]);
    assert_eq!(rig.bridge.stats().lines_rejected, 1);

    rig.bridge.close();
    assert!(distances(&drain(&mut events)).is_empty());
}

#[test]
fn test_connected_published_before_first_reading() {
    let rig = mock_rig(fast_config());
    let mut events = rig.bridge.subscribe();
    rig.device.enqueue_line("D:5,M:0");

    rig.bridge.open().unwrap();
    let collected = collect_until(&mut events, |evs| !distances(evs).is_empty());

    let first_reading = collected
        .iter()
        .position(|e| e.as_reading().is_some())
        .unwrap();
    let connected = collected
        .iter()
        .position(|e| matches!(e.as_state(), Some(ConnectionState::Connected(_))))
        .unwrap();
    assert!(connected < first_reading);
    rig.bridge.close();
}

#[test]
fn test_open_failure_reports_failed_without_ingestion() {
    let rig = mock_rig(fast_config());
    assert_eq!(rig.bridge.current_state(), ConnectionState::Idle);
    let mut events = rig.bridge.subscribe();
    rig.device.fail_next_open("Access denied");

    let err = rig.bridge.open().unwrap_err();
    assert!(matches!(err, BridgeError::TransportOpen(_)));

    let collected = drain(&mut events);
    assert_eq!(state_labels(&collected), vec!["connecting", "failed"]);
    assert!(matches!(
        rig.bridge.current_state(),
        ConnectionState::Failed(ref reason) if reason.contains("Access denied")
    ));
    assert_eq!(rig.bridge.stats().sessions_started, 0);

    assert!(matches!(rig.bridge.send(90), Err(BridgeError::NotConnected)));
    assert!(rig.device.write_log().is_empty());
}

#[test]
fn test_fallback_keeps_readings_flowing() {
    let config = BridgeConfig {
        fallback_on_disconnect: true,
        ..fast_config()
    };
    let rig = mock_rig(config);
    let mut events = rig.bridge.subscribe();
    rig.device.enqueue_line("D:120,M:0");
    rig.device.enqueue_failure(ErrorKind::BrokenPipe, "device unplugged");

    rig.bridge.open().unwrap();
    let collected = collect_until(&mut events, |evs| distances(evs).len() >= 4);

    assert_eq!(
        state_labels(&collected),
        vec!["connecting", "connected", "disconnected", "connecting", "connected"]
    );

    let final_kind = collected
        .iter()
        .filter_map(BridgeEvent::as_state)
        .filter_map(|s| match s {
            ConnectionState::Connected(desc) => Some(desc.kind),
            _ => None,
        })
        .last();
    assert_eq!(final_kind, Some(TransportKind::Simulator));

    let after_switch = distances(&collected);
    assert_eq!(after_switch[0], 120);
    assert!(after_switch[1..].iter().all(|d| (2450..=2550).contains(d)));

    // Sequence numbers continue across the switch.
    let sequences: Vec<u64> = collected
        .iter()
        .filter_map(BridgeEvent::as_reading)
        .map(|r| r.sequence)
        .collect();
    assert!(sequences.windows(2).all(|w| w[1] == w[0] + 1));

    assert!(!rig.device.is_open());
    assert_eq!(rig.bridge.stats().fallbacks, 1);
    rig.bridge.close();
}

#[test]
fn test_loss_without_fallback_ends_in_disconnected() {
    let rig = mock_rig(fast_config());
    let mut events = rig.bridge.subscribe();
    rig.device.enqueue_failure(ErrorKind::BrokenPipe, "device unplugged");

    rig.bridge.open().unwrap();
    let collected = collect_until(&mut events, |evs| state_labels(evs).len() == 3);

    assert_eq!(
        state_labels(&collected),
        vec!["connecting", "connected", "disconnected"]
    );
    assert!(matches!(
        rig.bridge.current_state(),
        ConnectionState::Disconnected(ref reason) if reason.contains("device unplugged")
    ));
    assert_eq!(rig.device.close_count(), 1);

    // The device can be opened again explicitly.
    rig.bridge.open().unwrap();
    assert!(rig.bridge.current_state().is_connected());
    rig.bridge.close();
}

#[test]
fn test_history_window_keeps_last_three() {
    let mut history = HistoryBuffer::new(3);
    let codec = LineCodec::new();
    for line in ["D:10,M:0", "D:20,M:0", "D:30,M:0", "D:40,M:0"] {
        history.append(codec.parse_line(line.as_bytes()).unwrap());
    }
    assert_eq!(history.snapshot().distances(), vec![20, 30, 40]);
}

#[test]
fn test_bridge_history_bounded() {
    let config = BridgeConfig {
        history_capacity: 3,
        ..fast_config()
    };
    let rig = mock_rig(config);
    for d in [10, 20, 30, 40] {
        rig.device.enqueue_line(&format!("D:{d},M:0"));
    }

    rig.bridge.open().unwrap();
    assert!(wait_until(|| rig.bridge.stats().readings_accepted == 4));
    assert_eq!(rig.bridge.history_snapshot().distances(), vec![20, 30, 40]);
    rig.bridge.close();
}

#[test]
fn test_close_is_idempotent() {
    let rig = mock_rig(fast_config());
    let mut events = rig.bridge.subscribe();

    rig.bridge.close();
    assert_eq!(rig.bridge.current_state(), ConnectionState::Idle);
    assert!(drain(&mut events).is_empty());

    rig.bridge.open().unwrap();
    rig.bridge.close();
    rig.bridge.close();

    let collected = drain(&mut events);
    assert_eq!(
        state_labels(&collected),
        vec!["connecting", "connected", "disconnected"]
    );
    assert_eq!(rig.device.close_count(), 1);
}

#[test]
fn test_close_clears_latest_and_applies_policy() {
    let rig = mock_rig(fast_config());
    rig.device.enqueue_line("D:77,M:1");
    rig.bridge.open().unwrap();
    assert!(wait_until(|| rig.bridge.latest().is_some()));

    rig.bridge.close();
    assert!(rig.bridge.latest().is_none());
    assert_eq!(rig.bridge.history_snapshot().distances(), vec![77]);

    let config = BridgeConfig {
        history_policy: HistoryPolicy::ClearOnClose,
        ..fast_config()
    };
    let rig = mock_rig(config);
    rig.device.enqueue_line("D:77,M:1");
    rig.bridge.open().unwrap();
    assert!(wait_until(|| rig.bridge.latest().is_some()));
    rig.bridge.close();
    assert!(rig.bridge.history_snapshot().is_empty());
}

#[test]
fn test_send_validates_and_writes() {
    let rig = mock_rig(fast_config());
    assert!(matches!(rig.bridge.send(180), Err(BridgeError::NotConnected)));

    rig.bridge.open().unwrap();
    assert_eq!(rig.bridge.send(180).unwrap(), 4);
    assert_eq!(rig.bridge.send(0).unwrap(), 2);
    assert!(matches!(
        rig.bridge.send(181),
        Err(BridgeError::CommandOutOfRange(181))
    ));
    assert!(matches!(
        rig.bridge.send(-1),
        Err(BridgeError::CommandOutOfRange(-1))
    ));
    assert_eq!(rig.device.write_log(), vec![b"180\n".to_vec(), b"0\n".to_vec()]);

    rig.bridge.close();
    assert!(matches!(rig.bridge.send(90), Err(BridgeError::NotConnected)));
    assert_eq!(rig.device.write_log().len(), 2);
}

#[test]
fn test_unsubscribed_receives_nothing_more() {
    let rig = mock_rig(fast_config());
    let mut kept = rig.bridge.subscribe();
    let mut removed = rig.bridge.subscribe();
    assert!(rig.bridge.unsubscribe(removed.id()));
    assert_eq!(rig.bridge.stats().subscribers, 1);

    rig.device.enqueue_line("D:1,M:0");
    rig.bridge.open().unwrap();
    let collected = collect_until(&mut kept, |evs| !distances(evs).is_empty());
    assert_eq!(distances(&collected), vec![1]);

    assert!(removed.try_recv().is_none());
    rig.bridge.close();
}

#[test]
fn test_slow_subscriber_does_not_stall_ingestion() {
    let config = BridgeConfig {
        subscriber_buffer: 2,
        ..fast_config()
    };
    let rig = mock_rig(config);
    let _stalled = rig.bridge.subscribe();
    let mut live = rig.bridge.subscribe();
    for d in 0..20 {
        rig.device.enqueue_line(&format!("D:{d},M:0"));
    }

    rig.bridge.open().unwrap();
    assert!(wait_until(|| rig.bridge.stats().readings_accepted == 20));
    assert!(rig.bridge.stats().events_dropped > 0);
    assert_eq!(rig.bridge.history_snapshot().len(), 20);

    // The live subscriber only lost what overflowed its own queue.
    assert!(live.try_recv().is_some());
    rig.bridge.close();
}

#[test]
fn test_reopen_after_close_continues_sequence() {
    let rig = mock_rig(fast_config());
    rig.device.enqueue_line("D:1,M:0");
    rig.bridge.open().unwrap();
    assert!(wait_until(|| rig.bridge.latest().is_some()));
    rig.bridge.close();

    rig.device.enqueue_line("D:2,M:0");
    rig.bridge.open().unwrap();
    assert!(wait_until(|| rig.bridge.latest().is_some()));
    assert_eq!(rig.bridge.latest().map(|r| r.sequence), Some(2));
    assert_eq!(rig.device.open_count(), 2);
    rig.bridge.close();
}

#[test]
fn test_close_waits_for_worker() {
    let config = BridgeConfig {
        read_timeout: Duration::from_millis(200),
        ..fast_config()
    };
    let rig = mock_rig(config);
    rig.bridge.open().unwrap();

    rig.bridge.close();
    assert!(!rig.device.is_open());
    assert_eq!(
        rig.bridge.current_state(),
        ConnectionState::Disconnected("closed by caller".into())
    );
}

#[test]
fn test_detached_worker_publishes_nothing_after_close() {
    let config = BridgeConfig {
        read_timeout: Duration::from_millis(200),
        shutdown_timeout: Duration::from_millis(200),
        history_policy: HistoryPolicy::ClearOnClose,
        ..fast_config()
    };
    let bridge = Bridge::with_transports(
        config,
        FixedTransports::new(
            Arc::new(LaggingTransport::default()),
            Arc::new(SimulatorTransport::new(SimulatorSettings::default())),
        ),
    );
    let mut events = bridge.subscribe();

    bridge.open().unwrap();
    std::thread::sleep(Duration::from_millis(20));
    bridge.close();
    assert!(bridge.latest().is_none());

    // Let the overrunning read finish on the detached worker.
    std::thread::sleep(Duration::from_millis(400));
    assert!(bridge.latest().is_none());
    assert!(bridge.history_snapshot().is_empty());
    assert_eq!(bridge.stats().readings_accepted, 0);

    let collected = drain(&mut events);
    assert!(distances(&collected).is_empty());
    assert_eq!(
        state_labels(&collected),
        vec!["connecting", "connected", "disconnected"]
    );
}
