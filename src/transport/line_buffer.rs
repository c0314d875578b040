//! Newline framing for byte streams that arrive in arbitrary chunks.

use tracing::warn;

/// Longest unterminated run we keep before assuming the stream is garbage.
pub const MAX_PENDING_BYTES: usize = 4096;

/// Accumulates raw bytes and hands back complete `\n`-terminated lines.
///
/// A trailing `\r` is stripped and empty lines are skipped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk read from the device.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        if self.pending.len() > MAX_PENDING_BYTES && memchr::memchr(b'\n', &self.pending).is_none()
        {
            warn!(
                discarded = self.pending.len(),
                "Discarding unterminated input that exceeded the line limit"
            );
            self.pending.clear();
        }
    }

    /// Pop the next complete, non-empty line.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        while let Some(pos) = memchr::memchr(b'\n', &self.pending) {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.is_empty() {
                return Some(line);
            }
        }
        None
    }

    /// Bytes waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
