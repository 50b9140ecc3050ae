//! Connection slots reserved before a WebSocket upgrade is accepted.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts reserved connection slots against a fixed limit.
#[derive(Debug)]
pub struct ConnectionSlots {
    in_use: AtomicUsize,
    limit: usize,
}

impl ConnectionSlots {
    /// Allow at most `limit` concurrent slots.
    pub fn new(limit: usize) -> Self {
        Self {
            in_use: AtomicUsize::new(0),
            limit,
        }
    }

    /// Reserve a slot, or `None` when all are taken.
    ///
    /// The slot is released when the returned guard drops.
    pub fn try_acquire(self: &Arc<Self>) -> Option<SlotGuard> {
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.limit).then_some(n + 1)
            })
            .ok()?;
        Some(SlotGuard {
            slots: Arc::clone(self),
        })
    }

    /// Slots currently reserved.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Configured limit.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// A reserved slot; dropping it frees the slot.
#[derive(Debug)]
pub struct SlotGuard {
    slots: Arc<ConnectionSlots>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let _ = self.slots.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}
