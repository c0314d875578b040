//! The telemetry bridge: connection lifecycle, ingestion, history and fan-out.
//!
//! A [`Bridge`] owns at most one transport session at a time. While a session
//! is live a dedicated thread reads lines, decodes them, appends them to the
//! history window and publishes them to every subscriber. Lifecycle
//! transitions (`open`, `close`, and transport loss detected by the worker)
//! are serialized by one lock, so subscribers observe them in a consistent
//! order. Queries and `send` never take that lock.
//!
//! ```no_run
//! use telemetry_bridge::bridge::{Bridge, BridgeConfig, BridgeEvent};
//!
//! let bridge = Bridge::new(BridgeConfig::simulated());
//! let mut events = bridge.subscribe();
//! bridge.open()?;
//! while let Some(event) = events.blocking_recv() {
//!     if let BridgeEvent::Reading(reading) = event {
//!         println!("{} cm", reading.distance_cm);
//!     }
//! }
//! # Ok::<(), telemetry_bridge::BridgeError>(())
//! ```

mod config;
mod hub;
mod state;
mod worker;

pub use config::{BridgeConfig, HistoryPolicy};
pub use hub::{SubscriberId, Subscription, DEFAULT_SUBSCRIBER_BUFFER};
pub use state::{BridgeEvent, ConnectionState, StateChange};

use crate::codec::{encode_command, LineCodec, Reading};
use crate::error::{BridgeError, BridgeResult, MAX_SERVO_POSITION};
use crate::history::{HistoryBuffer, HistorySnapshot};
use crate::transport::{Transport, TransportDescriptor, TransportError, TransportFactory};
use hub::SubscriberHub;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use worker::IngestionWorker;

/// Reason recorded when the caller closes the bridge.
pub const CLOSED_BY_CALLER: &str = "closed by caller";

/// How often a failing worker re-checks its stop flag while waiting for the
/// lifecycle lock.
const LIFECYCLE_POLL: Duration = Duration::from_millis(20);

/// Counters describing what the bridge has done since it was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub readings_accepted: u64,
    pub lines_rejected: u64,
    pub events_dropped: u64,
    pub sessions_started: u64,
    pub fallbacks: u64,
    pub subscribers: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) readings: AtomicU64,
    pub(crate) rejected: AtomicU64,
    pub(crate) sessions: AtomicU64,
    pub(crate) fallbacks: AtomicU64,
}

/// State the ingestion worker writes to.
pub(crate) struct Shared {
    pub(crate) history: Mutex<HistoryBuffer>,
    pub(crate) latest: Mutex<Option<Reading>>,
    pub(crate) hub: SubscriberHub,
    pub(crate) codec: LineCodec,
    pub(crate) counters: Counters,
}

struct Session {
    id: u64,
    transport: Arc<dyn Transport>,
    stop: Arc<AtomicBool>,
    finished: mpsc::Receiver<()>,
    handle: Option<JoinHandle<()>>,
    /// Sessions started by fallback never fall back again.
    fallback: bool,
}

#[derive(Default)]
struct Lifecycle {
    session: Option<Session>,
}

#[derive(Default)]
struct Status {
    state: ConnectionState,
    /// Set only while `Connected`; `send` writes through it.
    transport: Option<Arc<dyn Transport>>,
}

pub(crate) struct Inner {
    config: BridgeConfig,
    transports: Box<dyn TransportFactory>,
    lifecycle: Mutex<Lifecycle>,
    status: RwLock<Status>,
    shared: Arc<Shared>,
    next_session: AtomicU64,
}

/// Handle to a telemetry bridge. Cheap to clone; all clones share one bridge.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("state", &self.current_state())
            .field("history_len", &self.inner.shared.history.lock().len())
            .finish()
    }
}

impl Bridge {
    /// A bridge whose transports are built from `config`.
    pub fn new(config: BridgeConfig) -> Self {
        let transports = config.transports();
        Self::with_transports(config, transports)
    }

    /// A bridge that takes its transports from a caller-supplied factory.
    pub fn with_transports(config: BridgeConfig, transports: impl TransportFactory + 'static) -> Self {
        let shared = Arc::new(Shared {
            history: Mutex::new(HistoryBuffer::new(config.history_capacity)),
            latest: Mutex::new(None),
            hub: SubscriberHub::new(config.subscriber_buffer),
            codec: LineCodec::new(),
            counters: Counters::default(),
        });
        Self {
            inner: Arc::new(Inner {
                config,
                transports: Box::new(transports),
                lifecycle: Mutex::new(Lifecycle::default()),
                status: RwLock::new(Status::default()),
                shared,
                next_session: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Open the primary transport and start ingesting.
    ///
    /// Publishes `Connecting` and then either `Connected` or `Failed`. There is
    /// no automatic retry after a failed open.
    pub fn open(&self) -> BridgeResult<TransportDescriptor> {
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.session.is_some() || self.current_state().is_active() {
            return Err(BridgeError::AlreadyConnected);
        }
        let transport = self.inner.transports.primary();
        Inner::start_session(&self.inner, &mut lifecycle, transport, false)
    }

    /// Like [`open`](Self::open), but when the primary transport cannot be
    /// opened and `fallback_on_disconnect` is set, start on the fallback
    /// transport instead.
    pub fn open_or_fallback(&self) -> BridgeResult<TransportDescriptor> {
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.session.is_some() || self.current_state().is_active() {
            return Err(BridgeError::AlreadyConnected);
        }
        let primary = self.inner.transports.primary();
        match Inner::start_session(&self.inner, &mut lifecycle, primary, false) {
            Err(BridgeError::TransportOpen(err)) if self.inner.config.fallback_on_disconnect => {
                warn!(error = %err, "Primary transport unavailable; starting on fallback");
                self.inner
                    .shared
                    .counters
                    .fallbacks
                    .fetch_add(1, Ordering::Relaxed);
                let fallback = self.inner.transports.fallback();
                Inner::start_session(&self.inner, &mut lifecycle, fallback, true)
            }
            other => other,
        }
    }

    /// Stop ingestion and release the transport.
    ///
    /// Idempotent: closing a bridge that is not connected does nothing.
    /// Waits up to `shutdown_timeout` for the ingestion loop to exit.
    pub fn close(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        let Some(session) = lifecycle.session.take() else {
            return;
        };
        let descriptor = session.transport.descriptor();
        info!(session = session.id, transport = %descriptor, "Closing bridge");

        session.stop.store(true, Ordering::Release);
        match session.finished.recv_timeout(self.inner.config.shutdown_timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    session = session.id,
                    timeout = ?self.inner.config.shutdown_timeout,
                    "Ingestion loop did not stop in time; detaching it"
                );
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = session.handle {
                    if handle.join().is_err() {
                        error!(session = session.id, "Ingestion loop panicked");
                    }
                }
            }
        }
        session.transport.close();

        if self.inner.config.history_policy == HistoryPolicy::ClearOnClose {
            self.inner.shared.history.lock().clear();
        }
        *self.inner.shared.latest.lock() = None;

        self.inner.set_state(
            ConnectionState::Disconnected(CLOSED_BY_CALLER.to_string()),
            format!("closed {descriptor}"),
        );
    }

    /// Write a servo position to the connected device.
    ///
    /// Returns the number of bytes written. Positions outside `0..=180` are
    /// rejected before anything reaches the transport.
    pub fn send(&self, position: i64) -> BridgeResult<usize> {
        let transport = {
            let status = self.inner.status.read();
            match (&status.state, &status.transport) {
                (ConnectionState::Connected(_), Some(transport)) => Arc::clone(transport),
                _ => return Err(BridgeError::NotConnected),
            }
        };

        let position = u16::try_from(position)
            .ok()
            .filter(|p| i64::from(*p) <= MAX_SERVO_POSITION)
            .ok_or(BridgeError::CommandOutOfRange(position))?;

        let written = transport
            .write(&encode_command(position))
            .map_err(BridgeError::TransportIo)?;
        debug!(position, bytes = written, "Command sent");
        Ok(written)
    }

    /// Register for readings and state changes published from now on.
    pub fn subscribe(&self) -> Subscription {
        self.inner.shared.hub.subscribe()
    }

    /// Stop delivery to `id`. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.shared.hub.unsubscribe(id)
    }

    pub fn current_state(&self) -> ConnectionState {
        self.inner.status.read().state.clone()
    }

    pub fn history_snapshot(&self) -> HistorySnapshot {
        self.inner.shared.history.lock().snapshot()
    }

    /// Most recent reading of the current session; `None` after `close`.
    pub fn latest(&self) -> Option<Reading> {
        self.inner.shared.latest.lock().clone()
    }

    pub fn stats(&self) -> BridgeStats {
        let shared = &self.inner.shared;
        BridgeStats {
            readings_accepted: shared.counters.readings.load(Ordering::Relaxed),
            lines_rejected: shared.counters.rejected.load(Ordering::Relaxed),
            events_dropped: shared.hub.dropped(),
            sessions_started: shared.counters.sessions.load(Ordering::Relaxed),
            fallbacks: shared.counters.fallbacks.load(Ordering::Relaxed),
            subscribers: shared.hub.len(),
        }
    }
}

impl Inner {
    /// Open `transport` and spawn its worker. Caller holds the lifecycle lock.
    fn start_session(
        this: &Arc<Inner>,
        lifecycle: &mut Lifecycle,
        transport: Arc<dyn Transport>,
        fallback: bool,
    ) -> BridgeResult<TransportDescriptor> {
        let target = transport.descriptor();
        this.set_state(ConnectionState::Connecting, format!("opening {target}"));

        let descriptor = match transport.open() {
            Ok(descriptor) => descriptor,
            Err(err) => {
                let message = err.to_string();
                error!(transport = %target, error = %message, "Failed to open transport");
                this.set_state(
                    ConnectionState::Failed(message.clone()),
                    format!("could not open {target}"),
                );
                return Err(BridgeError::TransportOpen(err));
            }
        };

        let session_id = this.next_session.fetch_add(1, Ordering::Relaxed);
        let stop = Arc::new(AtomicBool::new(false));
        let (finished_tx, finished_rx) = mpsc::channel();

        // Connected goes out before the first reading can.
        this.set_connected(descriptor.clone(), Arc::clone(&transport), fallback);

        let worker = IngestionWorker {
            session_id,
            transport: Arc::clone(&transport),
            stop: Arc::clone(&stop),
            shared: Arc::clone(&this.shared),
            bridge: Arc::downgrade(this),
            read_timeout: this.config.read_timeout,
            _finished: finished_tx,
        };

        match worker.spawn() {
            Ok(handle) => {
                this.shared.counters.sessions.fetch_add(1, Ordering::Relaxed);
                lifecycle.session = Some(Session {
                    id: session_id,
                    transport,
                    stop,
                    finished: finished_rx,
                    handle: Some(handle),
                    fallback,
                });
                Ok(descriptor)
            }
            Err(err) => {
                transport.close();
                this.set_state(
                    ConnectionState::Failed(err.to_string()),
                    format!("could not start ingestion for {descriptor}"),
                );
                Err(BridgeError::Worker(err))
            }
        }
    }

    /// Called from a worker whose transport failed.
    ///
    /// Publishes `Disconnected` and, when enabled, switches to the simulator.
    /// A session that was already closed or replaced is left alone.
    pub(crate) fn handle_transport_loss(
        self: &Arc<Self>,
        session_id: u64,
        stop: &AtomicBool,
        err: TransportError,
    ) {
        let Some(mut lifecycle) = self.lock_lifecycle_unless_stopped(stop) else {
            return;
        };
        let is_current = lifecycle
            .session
            .as_ref()
            .is_some_and(|session| session.id == session_id);
        if !is_current {
            return;
        }
        let Some(session) = lifecycle.session.take() else {
            return;
        };

        let descriptor = session.transport.descriptor();
        session.transport.close();
        *self.shared.latest.lock() = None;
        self.set_state(
            ConnectionState::Disconnected(err.to_string()),
            format!("lost {descriptor}"),
        );

        if !self.config.fallback_on_disconnect || session.fallback {
            return;
        }

        info!(lost = %descriptor, "Falling back to simulator");
        self.shared.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
        let transport = self.transports.fallback();
        if let Err(err) = Inner::start_session(self, &mut lifecycle, transport, true) {
            error!(error = %err, "Fallback transport failed to start");
        }
    }

    /// Wait for the lifecycle lock, giving up once `stop` is raised.
    ///
    /// `close` holds the lock while it waits for the worker, so a worker that
    /// blocked unconditionally here would never exit.
    fn lock_lifecycle_unless_stopped(&self, stop: &AtomicBool) -> Option<MutexGuard<'_, Lifecycle>> {
        loop {
            if stop.load(Ordering::Acquire) {
                return None;
            }
            if let Some(guard) = self.lifecycle.try_lock_for(LIFECYCLE_POLL) {
                return Some(guard);
            }
        }
    }

    fn set_connected(&self, descriptor: TransportDescriptor, transport: Arc<dyn Transport>, fallback: bool) {
        {
            let mut status = self.status.write();
            status.state = ConnectionState::Connected(descriptor.clone());
            status.transport = Some(transport);
        }
        let detail = if fallback {
            format!("fallback to {descriptor}")
        } else {
            format!("opened {descriptor}")
        };
        info!(transport = %descriptor, fallback, "Bridge connected");
        self.shared.hub.publish(&BridgeEvent::State(StateChange {
            state: ConnectionState::Connected(descriptor),
            detail,
        }));
    }

    fn set_state(&self, state: ConnectionState, detail: String) {
        {
            let mut status = self.status.write();
            status.state = state.clone();
            status.transport = None;
        }
        debug!(state = %state, %detail, "Bridge state changed");
        self.shared
            .hub
            .publish(&BridgeEvent::State(StateChange { state, detail }));
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // May run on the worker thread itself, so signal and release without joining.
        if let Some(session) = self.lifecycle.get_mut().session.take() {
            session.stop.store(true, Ordering::Release);
            session.transport.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{FixedTransports, MockTransport, SimulatorSettings, SimulatorTransport};
    use std::io::ErrorKind;
    use std::time::Instant;

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            read_timeout: Duration::from_millis(20),
            emission_interval: Duration::from_millis(5),
            settle_delay: Duration::ZERO,
            simulator_seed: Some(42),
            ..BridgeConfig::default()
        }
    }

    fn mock_bridge(config: BridgeConfig) -> (Bridge, MockTransport) {
        let mock = MockTransport::new("MOCK0");
        let simulator = SimulatorTransport::new(SimulatorSettings {
            interval: Duration::from_millis(5),
            seed: Some(1),
            ..SimulatorSettings::default()
        });
        let bridge = Bridge::with_transports(
            config,
            FixedTransports::new(Arc::new(mock.clone()), Arc::new(simulator)),
        );
        (bridge, mock)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_open_ingest_close() {
        let (bridge, mock) = mock_bridge(test_config());
        mock.enqueue_line("D:120,M:0");
        mock.enqueue_line("D:45,M:1");

        let descriptor = bridge.open().unwrap();
        assert_eq!(descriptor.address, "MOCK0");
        assert!(wait_for(|| bridge.history_snapshot().len() == 2));
        assert_eq!(bridge.latest().map(|r| r.distance_cm), Some(45));

        bridge.close();
        assert_eq!(
            bridge.current_state(),
            ConnectionState::Disconnected(CLOSED_BY_CALLER.into())
        );
        assert!(bridge.latest().is_none());
        assert_eq!(bridge.history_snapshot().len(), 2);
        assert!(!mock.is_open());
    }

    #[test]
    fn test_open_twice_rejected() {
        let (bridge, _mock) = mock_bridge(test_config());
        bridge.open().unwrap();
        assert!(matches!(bridge.open(), Err(BridgeError::AlreadyConnected)));
        bridge.close();
    }

    #[test]
    fn test_failed_open_reports_state() {
        let (bridge, mock) = mock_bridge(test_config());
        mock.fail_next_open("Access denied");

        assert!(matches!(bridge.open(), Err(BridgeError::TransportOpen(_))));
        assert!(matches!(bridge.current_state(), ConnectionState::Failed(_)));

        // Failed is not active, so the caller may retry.
        bridge.open().unwrap();
        bridge.close();
    }

    #[test]
    fn test_clear_on_close_policy() {
        let config = BridgeConfig {
            history_policy: HistoryPolicy::ClearOnClose,
            ..test_config()
        };
        let (bridge, mock) = mock_bridge(config);
        mock.enqueue_line("D:10,M:0");
        bridge.open().unwrap();
        assert!(wait_for(|| bridge.history_snapshot().len() == 1));

        bridge.close();
        assert!(bridge.history_snapshot().is_empty());
    }

    #[test]
    fn test_transport_loss_without_fallback() {
        let (bridge, mock) = mock_bridge(test_config());
        mock.enqueue_line("D:10,M:0");
        mock.enqueue_failure(ErrorKind::BrokenPipe, "device unplugged");

        bridge.open().unwrap();
        assert!(wait_for(|| matches!(
            bridge.current_state(),
            ConnectionState::Disconnected(_)
        )));
        assert!(matches!(bridge.send(90), Err(BridgeError::NotConnected)));
        assert_eq!(bridge.stats().fallbacks, 0);
    }

    #[test]
    fn test_transport_loss_with_fallback() {
        let config = BridgeConfig {
            fallback_on_disconnect: true,
            ..test_config()
        };
        let (bridge, mock) = mock_bridge(config);
        mock.enqueue_failure(ErrorKind::BrokenPipe, "device unplugged");

        bridge.open().unwrap();
        assert!(wait_for(|| matches!(
            bridge.current_state(),
            ConnectionState::Connected(ref d) if d.address == "simulator"
        )));
        assert!(wait_for(|| !bridge.history_snapshot().is_empty()));
        assert_eq!(bridge.stats().fallbacks, 1);
        bridge.close();
    }

    #[test]
    fn test_open_or_fallback_when_primary_missing() {
        let config = BridgeConfig {
            fallback_on_disconnect: true,
            ..test_config()
        };
        let (bridge, mock) = mock_bridge(config);
        mock.fail_next_open("No such device");

        let descriptor = bridge.open_or_fallback().unwrap();
        assert_eq!(descriptor.address, "simulator");
        assert!(bridge.current_state().is_connected());
        assert_eq!(bridge.stats().fallbacks, 1);
        bridge.close();
    }

    #[test]
    fn test_open_or_fallback_without_fallback_fails() {
        let (bridge, mock) = mock_bridge(test_config());
        mock.fail_next_open("No such device");

        assert!(matches!(
            bridge.open_or_fallback(),
            Err(BridgeError::TransportOpen(_))
        ));
        assert!(matches!(bridge.current_state(), ConnectionState::Failed(_)));
    }

    #[test]
    fn test_stats_count_rejections() {
        let (bridge, mock) = mock_bridge(test_config());
        mock.enqueue_line("GARBAGE");
        mock.enqueue_line("D:abc,M:1");
        mock.enqueue_line("D:1,M:0");
        bridge.open().unwrap();

        assert!(wait_for(|| bridge.stats().readings_accepted == 1));
        assert!(wait_for(|| bridge.stats().lines_rejected == 2));
        assert_eq!(bridge.stats().sessions_started, 1);
        bridge.close();
    }

    #[test]
    fn test_dropping_bridge_stops_worker() {
        let (bridge, mock) = mock_bridge(test_config());
        bridge.open().unwrap();
        drop(bridge);
        assert!(wait_for(|| !mock.is_open()));
    }
}
