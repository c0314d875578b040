//! Synthetic transport that manufactures plausible sensor lines.
//!
//! Used when no hardware is configured, and as the fallback when the serial
//! device disappears mid-session. It emits the same wire format a real board
//! does, so everything downstream of the transport is exercised unchanged.

use super::error::TransportError;
use super::traits::{LineRead, Transport, TransportDescriptor, TransportKind};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Parameters for the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorSettings {
    /// Time between two synthesized lines.
    pub interval: Duration,
    /// Distance the jitter is applied around, in centimeters.
    pub baseline_cm: u32,
    /// Maximum deviation from the baseline, in centimeters.
    pub jitter_cm: u32,
    /// Chance that a line carries `M:1`.
    pub motion_probability: f64,
    /// Fixed RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(600),
            baseline_cm: 2500,
            jitter_cm: 50,
            motion_probability: 0.05,
            seed: None,
        }
    }
}

struct EmitterState {
    rng: StdRng,
    next_emit: Instant,
}

/// A transport that never fails and emits `D:<n>,M:<0|1>` lines on a timer.
pub struct SimulatorTransport {
    settings: SimulatorSettings,
    emitter: Mutex<EmitterState>,
    written: Mutex<Vec<Vec<u8>>>,
    open: AtomicBool,
}

impl SimulatorTransport {
    /// A non-finite `motion_probability` is treated as 0.0; finite values are
    /// clamped to `0.0..=1.0`.
    pub fn new(mut settings: SimulatorSettings) -> Self {
        settings.motion_probability = if settings.motion_probability.is_finite() {
            settings.motion_probability.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            settings,
            emitter: Mutex::new(EmitterState {
                rng,
                next_emit: Instant::now(),
            }),
            written: Mutex::new(Vec::new()),
            open: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &SimulatorSettings {
        &self.settings
    }

    /// Every command written so far, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().clone()
    }

    fn synthesize(&self, rng: &mut StdRng) -> Vec<u8> {
        let jitter = i64::from(self.settings.jitter_cm);
        let offset = if jitter == 0 {
            0
        } else {
            rng.gen_range(-jitter..=jitter)
        };
        let distance = (i64::from(self.settings.baseline_cm) + offset).max(0);
        let motion = rng.gen_bool(self.settings.motion_probability);
        format!("D:{},M:{}", distance, u8::from(motion)).into_bytes()
    }
}

impl Transport for SimulatorTransport {
    fn open(&self) -> Result<TransportDescriptor, TransportError> {
        self.emitter.lock().next_emit = Instant::now();
        self.open.store(true, Ordering::Release);
        info!(interval = ?self.settings.interval, "Simulator started");
        Ok(self.descriptor())
    }

    fn read_line(&self, timeout: Duration) -> Result<LineRead, TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }

        let mut emitter = self.emitter.lock();
        let now = Instant::now();
        if emitter.next_emit > now {
            let wait = emitter.next_emit - now;
            if wait > timeout {
                std::thread::sleep(timeout);
                return Ok(LineRead::Idle);
            }
            std::thread::sleep(wait);
        }

        let line = self.synthesize(&mut emitter.rng);
        emitter.next_emit = Instant::now() + self.settings.interval;
        Ok(LineRead::Line(line))
    }

    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        debug!(command = %String::from_utf8_lossy(data).trim_end(), "Simulator accepted command");
        self.written.lock().push(data.to_vec());
        Ok(data.len())
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            info!("Simulator stopped");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn descriptor(&self) -> TransportDescriptor {
        TransportDescriptor::new(TransportKind::Simulator, "simulator", 0)
    }
}

impl std::fmt::Debug for SimulatorTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatorTransport")
            .field("settings", &self.settings)
            .field("open", &self.is_open())
            .finish()
    }
}
