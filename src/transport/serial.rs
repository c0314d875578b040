//! Serial transport.
//!
//! Wraps the `serialport` crate. The handle is cloned at open time so the read
//! side (owned by the ingestion loop) and the write side (used by `send`) never
//! contend for the same lock.

use super::error::TransportError;
use super::line_buffer::LineBuffer;
use super::traits::{LineRead, Transport, TransportDescriptor, TransportKind};
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-call timeout handed to the OS; `read_line` loops over these slices
/// until its own deadline so it stays responsive to newly buffered lines.
const READ_SLICE: Duration = Duration::from_millis(50);

/// How long `close` waits for an in-flight read before giving up on the reader.
const CLOSE_LOCK_WAIT: Duration = Duration::from_millis(1500);

/// Parameters for opening a serial transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Port name, e.g. `/dev/ttyACM0` or `COM4`.
    pub address: String,
    pub baud_rate: u32,
    /// Pause after opening; most boards reset when the port is opened.
    pub settle_delay: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            address: default_port_name().to_string(),
            baud_rate: 9600,
            settle_delay: Duration::from_secs(2),
        }
    }
}

/// Platform-appropriate default port name.
pub fn default_port_name() -> &'static str {
    if cfg!(windows) {
        "COM4"
    } else {
        "/dev/ttyACM0"
    }
}

/// List the serial ports present on this machine.
pub fn available_ports() -> Result<Vec<String>, TransportError> {
    let ports = serialport::available_ports()?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

struct SerialReader {
    port: Box<dyn serialport::SerialPort>,
    lines: LineBuffer,
    /// Timeout currently set on the port.
    slice: Duration,
}

impl SerialReader {
    fn read_line(&mut self, timeout: Duration) -> Result<LineRead, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 256];

        loop {
            if let Some(line) = self.lines.next_line() {
                return Ok(LineRead::Line(line));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(LineRead::Idle);
            }

            // The last slice never runs past the caller's deadline.
            let slice = READ_SLICE.min(deadline - now);
            if slice != self.slice {
                self.port.set_timeout(slice)?;
                self.slice = slice;
            }

            match self.port.read(&mut chunk) {
                Ok(0) => std::thread::sleep(slice),
                Ok(n) => self.lines.extend(&chunk[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::TimedOut
                            | std::io::ErrorKind::WouldBlock
                            | std::io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }
}

/// A transport backed by a real serial port.
pub struct SerialTransport {
    settings: SerialSettings,
    reader: Mutex<Option<SerialReader>>,
    writer: Mutex<Option<Box<dyn serialport::SerialPort>>>,
    open: AtomicBool,
}

impl SerialTransport {
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            settings,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            open: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

impl Transport for SerialTransport {
    fn open(&self) -> Result<TransportDescriptor, TransportError> {
        if self.is_open() {
            return Ok(self.descriptor());
        }

        let address = &self.settings.address;
        let port = serialport::new(address, self.settings.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .flow_control(serialport::FlowControl::None)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(READ_SLICE)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => TransportError::not_found(address.as_str()),
                _ => TransportError::open(address.as_str(), e.to_string()),
            })?;

        let writer = port
            .try_clone()
            .map_err(|e| TransportError::open(address.as_str(), e.to_string()))?;

        if !self.settings.settle_delay.is_zero() {
            debug!(delay = ?self.settings.settle_delay, "Waiting for device to settle");
            std::thread::sleep(self.settings.settle_delay);
        }

        *self.reader.lock() = Some(SerialReader {
            port,
            lines: LineBuffer::new(),
            slice: READ_SLICE,
        });
        *self.writer.lock() = Some(writer);
        self.open.store(true, Ordering::Release);

        info!(port = %address, baud = self.settings.baud_rate, "Serial port opened");
        Ok(self.descriptor())
    }

    fn read_line(&self, timeout: Duration) -> Result<LineRead, TransportError> {
        let mut guard = self.reader.lock();
        let reader = guard.as_mut().ok_or(TransportError::NotOpen)?;
        reader.read_line(timeout)
    }

    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let mut guard = self.writer.lock();
        let port = guard.as_mut().ok_or(TransportError::NotOpen)?;
        port.write_all(data)?;
        port.flush()?;
        Ok(data.len())
    }

    fn close(&self) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }

        self.writer.lock().take();
        match self.reader.try_lock_for(CLOSE_LOCK_WAIT) {
            Some(mut reader) => {
                reader.take();
            }
            None => warn!(port = %self.settings.address, "Reader still busy; port released on its exit"),
        }
        info!(port = %self.settings.address, "Serial port closed");
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn descriptor(&self) -> TransportDescriptor {
        TransportDescriptor::new(
            TransportKind::Serial,
            self.settings.address.clone(),
            self.settings.baud_rate,
        )
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("address", &self.settings.address)
            .field("baud_rate", &self.settings.baud_rate)
            .field("open", &self.is_open())
            .finish()
    }
}
