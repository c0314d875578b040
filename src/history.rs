//! Bounded history of recent readings.

use crate::codec::Reading;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of readings kept, matching the dashboard's plot width.
pub const DEFAULT_HISTORY_CAPACITY: usize = 120;

/// Fixed-capacity FIFO of readings in arrival order.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    capacity: usize,
    readings: VecDeque<Reading>,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryBuffer {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            readings: VecDeque::with_capacity(capacity),
        }
    }

    /// Append, evicting the oldest reading when full.
    pub fn append(&mut self, reading: Reading) {
        if self.readings.len() == self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
    }

    /// Point-in-time copy of the window.
    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            capacity: self.capacity,
            readings: self.readings.iter().cloned().collect(),
        }
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.readings.back()
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Owned copy of the history window, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub capacity: usize,
    pub readings: Vec<Reading>,
}

impl HistorySnapshot {
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn distances(&self) -> Vec<u32> {
        self.readings.iter().map(|r| r.distance_cm).collect()
    }

    /// Motion flags aligned index-for-index with `distances`.
    pub fn motion_flags(&self) -> Vec<bool> {
        self.readings.iter().map(|r| r.motion_detected).collect()
    }

    /// Window positions where motion was detected, for scatter overlays.
    pub fn motion_indices(&self) -> Vec<usize> {
        self.readings
            .iter()
            .enumerate()
            .filter(|(_, r)| r.motion_detected)
            .map(|(i, _)| i)
            .collect()
    }
}
