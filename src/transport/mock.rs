//! Mock transport implementation for testing.
//!
//! Provides a `MockTransport` that replays a script of raw bytes, idle reads
//! and I/O failures without requiring hardware, and records every write.

use super::error::TransportError;
use super::line_buffer::LineBuffer;
use super::traits::{LineRead, Transport, TransportDescriptor, TransportKind};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

/// How long an unscripted read waits before reporting idle.
const EMPTY_SCRIPT_WAIT: Duration = Duration::from_millis(5);

#[derive(Debug)]
enum Step {
    Bytes(Vec<u8>),
    Idle,
    Fail(ErrorKind, String),
}

/// Inner state of the mock, shared between clones.
#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<Step>,
    lines: LineBuffer,
    write_log: Vec<Vec<u8>>,
    open: bool,
    fail_open: Option<String>,
    open_count: usize,
    close_count: usize,
}

/// Scriptable transport for tests.
///
/// Clones share state, so a test can keep one handle while the bridge owns
/// another and feed lines into a live session.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use telemetry_bridge::transport::{LineRead, MockTransport, Transport};
///
/// let port = MockTransport::new("MOCK0");
/// port.enqueue_line("D:120,M:0");
/// port.open().unwrap();
///
/// let read = port.read_line(Duration::from_millis(10)).unwrap();
/// assert_eq!(read, LineRead::Line(b"D:120,M:0".to_vec()));
///
/// port.write(b"90\n").unwrap();
/// assert_eq!(port.write_log(), vec![b"90\n".to_vec()]);
/// ```
#[derive(Clone)]
pub struct MockTransport {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Queue one line; the newline is appended for you.
    pub fn enqueue_line(&self, line: &str) {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        self.enqueue_bytes(&bytes);
    }

    /// Queue a raw chunk exactly as a device would send it.
    pub fn enqueue_bytes(&self, data: &[u8]) {
        self.state.lock().script.push_back(Step::Bytes(data.to_vec()));
    }

    /// Queue one "no data yet" read.
    pub fn enqueue_idle(&self) {
        self.state.lock().script.push_back(Step::Idle);
    }

    /// Queue a read that fails as if the device vanished.
    pub fn enqueue_failure(&self, kind: ErrorKind, message: impl Into<String>) {
        self.state
            .lock()
            .script
            .push_back(Step::Fail(kind, message.into()));
    }

    /// Make the next `open` fail with the given message.
    pub fn fail_next_open(&self, message: impl Into<String>) {
        self.state.lock().fail_open = Some(message.into());
    }

    /// Every write so far, in order.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().close_count
    }

    /// Scripted steps not yet consumed.
    pub fn pending_steps(&self) -> usize {
        self.state.lock().script.len()
    }
}

impl Transport for MockTransport {
    fn open(&self) -> Result<TransportDescriptor, TransportError> {
        let mut state = self.state.lock();
        if let Some(message) = state.fail_open.take() {
            return Err(TransportError::open(self.name.as_str(), message));
        }
        state.open = true;
        state.open_count += 1;
        Ok(self.descriptor())
    }

    fn read_line(&self, timeout: Duration) -> Result<LineRead, TransportError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(TransportError::NotOpen);
        }

        loop {
            if let Some(line) = state.lines.next_line() {
                return Ok(LineRead::Line(line));
            }
            match state.script.pop_front() {
                Some(Step::Bytes(bytes)) => state.lines.extend(&bytes),
                Some(Step::Idle) => return Ok(LineRead::Idle),
                Some(Step::Fail(kind, message)) => return Err(TransportError::io(kind, message)),
                None => {
                    drop(state);
                    std::thread::sleep(timeout.min(EMPTY_SCRIPT_WAIT));
                    return Ok(LineRead::Idle);
                }
            }
        }
    }

    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        state.write_log.push(data.to_vec());
        Ok(data.len())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        if state.open {
            state.open = false;
            state.close_count += 1;
            state.lines.clear();
        }
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn descriptor(&self) -> TransportDescriptor {
        TransportDescriptor::new(TransportKind::Mock, self.name.clone(), 9600)
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("name", &self.name)
            .field("pending_steps", &self.pending_steps())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(10);

    #[test]
    fn test_script_replay_in_order() {
        let port = MockTransport::new("MOCK0");
        port.enqueue_line("one");
        port.enqueue_idle();
        port.enqueue_bytes(b"tw");
        port.enqueue_bytes(b"o\r\n");
        port.open().unwrap();

        assert_eq!(port.read_line(WAIT).unwrap(), LineRead::Line(b"one".to_vec()));
        assert_eq!(port.read_line(WAIT).unwrap(), LineRead::Idle);
        assert_eq!(port.read_line(WAIT).unwrap(), LineRead::Line(b"two".to_vec()));
        assert_eq!(port.read_line(WAIT).unwrap(), LineRead::Idle);
    }

    #[test]
    fn test_failure_step() {
        let port = MockTransport::new("MOCK0");
        port.enqueue_failure(ErrorKind::BrokenPipe, "device unplugged");
        port.open().unwrap();

        match port.read_line(WAIT) {
            Err(TransportError::Io(e)) => assert_eq!(e.kind(), ErrorKind::BrokenPipe),
            other => panic!("Expected I/O failure, got: {:?}", other),
        }
    }

    #[test]
    fn test_fail_next_open_only_once() {
        let port = MockTransport::new("MOCK0");
        port.fail_next_open("busy");

        assert!(port.open().is_err());
        assert!(!port.is_open());
        assert!(port.open().is_ok());
        assert_eq!(port.open_count(), 1);
    }

    #[test]
    fn test_closed_port_rejects_io() {
        let port = MockTransport::new("MOCK0");
        assert!(matches!(port.read_line(WAIT), Err(TransportError::NotOpen)));
        assert!(matches!(port.write(b"1\n"), Err(TransportError::NotOpen)));
        assert!(port.write_log().is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let port = MockTransport::new("MOCK0");
        let handle = port.clone();
        port.open().unwrap();
        port.write(b"0\n").unwrap();
        port.close();
        port.close();

        assert_eq!(handle.write_log(), vec![b"0\n".to_vec()]);
        assert_eq!(handle.close_count(), 1);
        assert!(!handle.is_open());
    }
}
