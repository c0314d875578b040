//! Subscriber registry and non-blocking fan-out.
//!
//! Each subscriber owns a bounded queue. Publishing never waits: a full queue
//! loses the event (counted and logged) and a dropped receiver is pruned, so a
//! stalled consumer can never hold up ingestion.

use super::state::BridgeEvent;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Default per-subscriber queue depth.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Opaque handle identifying one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Receiving end of a registration.
///
/// Works from plain threads (`blocking_recv`, `try_recv`) and from async
/// tasks (`recv().await`). Dropping it is enough to unregister; the hub
/// prunes it on the next publish.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<BridgeEvent>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event. `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<BridgeEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is queued.
    pub fn try_recv(&mut self) -> Option<BridgeEvent> {
        self.rx.try_recv().ok()
    }

    /// Block the current thread for the next event.
    ///
    /// Must not be called from inside an async runtime.
    pub fn blocking_recv(&mut self) -> Option<BridgeEvent> {
        self.rx.blocking_recv()
    }
}

struct Slot {
    id: SubscriberId,
    tx: mpsc::Sender<BridgeEvent>,
}

pub(crate) struct SubscriberHub {
    buffer: usize,
    next_id: AtomicU64,
    slots: Mutex<Vec<Slot>>,
    dropped: AtomicU64,
}

impl SubscriberHub {
    pub(crate) fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            next_id: AtomicU64::new(1),
            slots: Mutex::new(Vec::new()),
            dropped: AtomicU64::new(0),
        }
    }

    pub(crate) fn subscribe(&self) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.buffer);
        self.slots.lock().push(Slot { id, tx });
        debug!(subscriber = %id, "Subscriber registered");
        Subscription { id, rx }
    }

    /// Returns whether the id was registered.
    pub(crate) fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|slot| slot.id != id);
        let removed = slots.len() != before;
        if removed {
            debug!(subscriber = %id, "Subscriber unregistered");
        }
        removed
    }

    pub(crate) fn publish(&self, event: &BridgeEvent) {
        let mut slots = self.slots.lock();
        slots.retain(|slot| match slot.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(subscriber = %slot.id, "Subscriber queue full; event dropped");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = %slot.id, "Subscriber gone; pruning");
                false
            }
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
