//! Per-session ingestion loop.
//!
//! One OS thread per session drives the blocking transport: read a line,
//! decode it, append it to history and fan it out. The loop ends when the
//! session's stop flag is raised or the transport fails; a failure is handed
//! back to the bridge, which decides whether to fall back to the simulator.

use super::state::BridgeEvent;
use super::{Inner, Shared};
use crate::codec::ParseError;
use crate::transport::{LineRead, Transport, TransportError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Pause after an idle read so a transport that returns early cannot spin.
const IDLE_BACKOFF: Duration = Duration::from_millis(10);

pub(crate) struct IngestionWorker {
    pub(crate) session_id: u64,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) stop: Arc<AtomicBool>,
    pub(crate) shared: Arc<Shared>,
    pub(crate) bridge: Weak<Inner>,
    pub(crate) read_timeout: Duration,
    /// Dropped when the thread exits; `close` waits on the paired receiver.
    pub(crate) _finished: mpsc::Sender<()>,
}

impl IngestionWorker {
    pub(crate) fn spawn(self) -> std::io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("bridge-ingest-{}", self.session_id))
            .spawn(move || self.run())
    }

    fn run(self) {
        let descriptor = self.transport.descriptor();
        info!(session = self.session_id, transport = %descriptor, "Ingestion loop started");

        loop {
            if self.stopping() {
                break;
            }
            match self.transport.read_line(self.read_timeout) {
                // A read can outlive `close`; once stopped, nothing more is published.
                Ok(LineRead::Line(_)) if self.stopping() => break,
                Ok(LineRead::Line(raw)) => self.ingest(&raw),
                Ok(LineRead::Idle) => thread::sleep(IDLE_BACKOFF),
                Err(err) => {
                    if !self.stopping() {
                        self.report_loss(err);
                    }
                    break;
                }
            }
        }

        debug!(session = self.session_id, "Ingestion loop exited");
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn ingest(&self, raw: &[u8]) {
        match self.shared.codec.parse_line(raw) {
            Ok(reading) => {
                self.shared.history.lock().append(reading.clone());
                *self.shared.latest.lock() = Some(reading.clone());
                self.shared.counters.readings.fetch_add(1, Ordering::Relaxed);
                trace!(
                    sequence = reading.sequence,
                    distance_cm = reading.distance_cm,
                    motion = reading.motion_detected,
                    "Reading accepted"
                );
                self.shared.hub.publish(&BridgeEvent::Reading(reading));
            }
            Err(err) => {
                self.shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
                match err {
                    ParseError::Malformed { .. } => debug!(error = %err, "Line rejected"),
                    ParseError::UnrecognizedFormat(_) => trace!(error = %err, "Line skipped"),
                }
            }
        }
    }

    fn report_loss(&self, err: TransportError) {
        warn!(session = self.session_id, error = %err, "Transport lost");
        match self.bridge.upgrade() {
            Some(inner) => inner.handle_transport_loss(self.session_id, &self.stop, err),
            None => self.transport.close(),
        }
    }
}
