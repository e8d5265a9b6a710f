//! Bounded replay history for late-joining observers.
//!
//! Storage is a stack-allocated `heapless::Deque` sized for the largest
//! configurable capacity; the runtime capacity is enforced on push.  One
//! mutex guards both `push` (acquisition thread) and `snapshot` (observer
//! attach), and neither ever sleeps while holding it.

use std::sync::{Mutex, MutexGuard};

use heapless::Deque;

use crate::reading::SensorReading;

/// Largest capacity a configuration may ask for.
pub const MAX_BUFFER_CAPACITY: usize = 64;

struct Inner {
    entries: Deque<SensorReading, MAX_BUFFER_CAPACITY>,
    /// Total readings ever pushed, evicted ones included.
    pushed: u64,
}

/// Fixed-capacity FIFO of the most recent readings.
pub struct RingBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl RingBuffer {
    /// `capacity` is clamped to `1..=MAX_BUFFER_CAPACITY`; config validation
    /// rejects anything outside that range before it gets here.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.clamp(1, MAX_BUFFER_CAPACITY),
            inner: Mutex::new(Inner {
                entries: Deque::new(),
                pushed: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a reading, evicting the oldest one when full.  O(1).
    pub fn push(&self, reading: SensorReading) {
        let mut inner = self.lock();
        if inner.entries.len() >= self.capacity {
            let _ = inner.entries.pop_front();
        }
        // Cannot fail: len < capacity <= MAX_BUFFER_CAPACITY after the pop.
        let _ = inner.entries.push_back(reading);
        inner.pushed += 1;
    }

    /// Current contents, oldest first.
    pub fn snapshot(&self) -> Vec<SensorReading> {
        self.snapshot_with_count().0
    }

    /// Current contents plus the total number of pushes, read atomically.
    ///
    /// The count lets a broadcaster tell which buffered readings it has
    /// already fanned out.
    pub fn snapshot_with_count(&self) -> (Vec<SensorReading>, u64) {
        let inner = self.lock();
        (inner.entries.iter().copied().collect(), inner.pushed)
    }

    /// Most recent reading, if any cycle has completed yet.
    pub fn latest(&self) -> Option<SensorReading> {
        self.lock().entries.back().copied()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave a Deque half-written.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
