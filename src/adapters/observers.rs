//! In-process observer fan-out with history replay.
//!
//! Each observer is an `mpsc` receiver.  [`attach`](ObserverHub::attach)
//! replays the buffered history, then registers the observer for live
//! readings, both under the lock that [`publish`](Broadcaster::publish)
//! takes.  A reading is therefore delivered to a new observer exactly
//! once, either in the replay or live, never both.
//!
//! The hub must be fed from the same [`RingBuffer`] it replays from, one
//! `publish` per `push`, pushes first.  It counts publishes to tell which
//! buffered readings have not been fanned out yet.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard};

use log::debug;

use crate::app::ports::Broadcaster;
use crate::buffer::RingBuffer;
use crate::reading::SensorReading;

#[derive(Default)]
struct Inner {
    observers: Vec<Sender<SensorReading>>,
    published: u64,
}

#[derive(Default)]
pub struct ObserverHub {
    inner: Mutex<Inner>,
}

impl ObserverHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new observer.  The returned receiver first yields the
    /// buffered history (oldest first) and then every live reading.
    pub fn attach(&self, history: &RingBuffer) -> Receiver<SensorReading> {
        let (tx, rx) = mpsc::channel();
        let mut inner = self.lock();
        let (buffered, pushed) = history.snapshot_with_count();
        // Pushed but not yet published: these arrive live, not in the replay.
        let in_flight = usize::try_from(pushed.saturating_sub(inner.published)).unwrap_or(usize::MAX);
        let replay = buffered.len().saturating_sub(in_flight);
        for reading in &buffered[..replay] {
            // The receiver is still in hand, so this cannot fail.
            let _ = tx.send(*reading);
        }
        inner.observers.push(tx);
        debug!(
            "Observer attached: {} replayed, {} attached",
            replay,
            inner.observers.len()
        );
        rx
    }

    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Broadcaster for ObserverHub {
    fn publish(&self, reading: &SensorReading) {
        let mut inner = self.lock();
        inner.published += 1;
        let before = inner.observers.len();
        inner.observers.retain(|tx| tx.send(*reading).is_ok());
        let dropped = before - inner.observers.len();
        if dropped > 0 {
            debug!("{} observer(s) detached", dropped);
        }
    }
}
