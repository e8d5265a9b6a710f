//! The 1 Hz acquisition loop.
//!
//! Each cycle reads every sensor into one [`SensorReading`], pushes it
//! into the replay buffer, appends it to the data log and fans it out to
//! observers, in that order.  The loop survives anything an adapter can
//! do to it:
//!
//! - a failed read becomes that field's fallback value
//! - a panic while reading produces an all-fallback reading
//! - a failed or panicking append is logged and the reading is still
//!   broadcast
//! - a panicking broadcast is logged and the next cycle runs as usual

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use log::error;

use crate::app::events::{AppEvent, LoopId};
use crate::app::ports::{Broadcaster, EventSink, Persistence, SensorPort};
use crate::buffer::RingBuffer;
use crate::reading::SensorReading;
use crate::scheduler::{run_periodic, Clock, StopToken, Ticker};
use crate::sensors;

pub struct AcquisitionLoop {
    sensors: Arc<dyn SensorPort>,
    buffer: Arc<RingBuffer>,
    persistence: Box<dyn Persistence>,
    broadcaster: Arc<dyn Broadcaster>,
    sink: Arc<dyn EventSink>,
}

impl AcquisitionLoop {
    pub fn new(
        sensors: Arc<dyn SensorPort>,
        buffer: Arc<RingBuffer>,
        persistence: Box<dyn Persistence>,
        broadcaster: Arc<dyn Broadcaster>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            sensors,
            buffer,
            persistence,
            broadcaster,
            sink,
        }
    }

    /// One complete cycle stamped with `timestamp`.  Never fails.
    pub fn run_cycle(&mut self, timestamp: u64) -> SensorReading {
        let port = self.sensors.as_ref();
        let reading = panic::catch_unwind(AssertUnwindSafe(|| sensors::read_all(port, timestamp)))
            .unwrap_or_else(|_| {
                error!("Sensor sweep panicked, substituting fallback reading");
                self.sink.emit(&AppEvent::CycleFailed(LoopId::Acquisition));
                SensorReading::fallback(timestamp)
            });

        self.buffer.push(reading);

        let persistence = &mut self.persistence;
        match panic::catch_unwind(AssertUnwindSafe(|| persistence.append(&reading))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Data log append failed: {e}"),
            Err(_) => error!("Data log append panicked"),
        }

        let broadcaster = self.broadcaster.as_ref();
        if panic::catch_unwind(AssertUnwindSafe(|| broadcaster.publish(&reading))).is_err() {
            error!("Broadcast panicked");
        }

        self.sink.emit(&AppEvent::Reading(reading));
        reading
    }

    /// Run until `stop` is raised, one cycle per `period`.
    pub fn run(&mut self, clock: Arc<dyn Clock>, period: Duration, stop: &StopToken) {
        let mut ticker = Ticker::new(clock, period);
        let sink = Arc::clone(&self.sink);
        run_periodic(
            LoopId::Acquisition.as_str(),
            &mut ticker,
            stop,
            |timestamp| {
                self.run_cycle(timestamp);
            },
            |elapsed| {
                sink.emit(&AppEvent::CycleOverrun {
                    loop_id: LoopId::Acquisition,
                    elapsed,
                })
            },
        );
    }
}
