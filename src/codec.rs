//! Line protocol codec.
//!
//! Inbound lines look like `D:<distance_cm>,M:<0|1>`; anything else a board
//! prints on the same stream (boot banners, debug text) is rejected and
//! skipped. Outbound commands are a servo angle followed by `\n`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

const DISTANCE_PREFIX: &str = "D:";
const MOTION_SEPARATOR: &str = ",M:";

/// One normalized sensor sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// Distance to the nearest obstacle, in centimeters.
    pub distance_cm: u32,
    pub motion_detected: bool,
    /// Ingestion order within one bridge; never reused across reconnects.
    pub sequence: u64,
    pub received_at: DateTime<Utc>,
}

/// Why a line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Not a sensor line at all.
    #[error("Unrecognized line: {0:?}")]
    UnrecognizedFormat(String),

    /// Shaped like a sensor line but a field did not parse.
    #[error("Malformed sensor line {line:?}: {reason}")]
    Malformed { line: String, reason: String },
}

impl ParseError {
    fn malformed(line: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parses lines and stamps accepted ones with a sequence number.
///
/// Clones share the counter, so the bridge can hand one to every session and
/// sequence numbers keep increasing across reconnects.
#[derive(Debug, Clone)]
pub struct LineCodec {
    next_sequence: Arc<AtomicU64>,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCodec {
    /// First accepted reading gets sequence 1.
    pub fn new() -> Self {
        Self {
            next_sequence: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Parse one line (terminator already stripped).
    ///
    /// Rejected lines do not consume a sequence number.
    pub fn parse_line(&self, raw: &[u8]) -> Result<Reading, ParseError> {
        let (distance_cm, motion_detected) = decode_fields(raw)?;
        Ok(Reading {
            distance_cm,
            motion_detected,
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
            received_at: Utc::now(),
        })
    }

    /// Number of readings accepted so far by this codec and its clones.
    pub fn accepted(&self) -> u64 {
        self.next_sequence.load(Ordering::Relaxed) - 1
    }
}

/// Parse one line without a sequence counter; the result carries sequence 0.
pub fn parse_line(raw: &[u8]) -> Result<Reading, ParseError> {
    let (distance_cm, motion_detected) = decode_fields(raw)?;
    Ok(Reading {
        distance_cm,
        motion_detected,
        sequence: 0,
        received_at: Utc::now(),
    })
}

/// Encode a servo position as a command line.
///
/// No range check happens here; the bridge decides what positions are allowed.
pub fn encode_command(position: u16) -> Vec<u8> {
    format!("{position}\n").into_bytes()
}

fn decode_fields(raw: &[u8]) -> Result<(u32, bool), ParseError> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim_matches(|c: char| c.is_ascii_whitespace());

    let rest = line
        .strip_prefix(DISTANCE_PREFIX)
        .ok_or_else(|| ParseError::UnrecognizedFormat(line.to_string()))?;
    let (distance, motion) = rest
        .split_once(MOTION_SEPARATOR)
        .ok_or_else(|| ParseError::UnrecognizedFormat(line.to_string()))?;

    if distance.is_empty() || !distance.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::malformed(line, "distance is not a non-negative integer"));
    }
    let distance_cm: u32 = distance
        .parse()
        .map_err(|_| ParseError::malformed(line, "distance out of range"))?;

    let motion_detected = match motion {
        "0" => false,
        "1" => true,
        _ => return Err(ParseError::malformed(line, "motion flag must be 0 or 1")),
    };

    Ok((distance_cm, motion_detected))
}
