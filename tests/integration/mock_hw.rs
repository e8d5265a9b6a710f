//! Mock adapters for integration tests.
//!
//! Records every actuator call (with the virtual time it happened at) so
//! tests can assert on the full command history without real hardware.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chamber::app::devices::{DeviceId, Switch};
use chamber::app::events::AppEvent;
use chamber::app::ports::{
    ActuatorPort, Broadcaster, EventSink, Persistence, SensorPort, StorageError,
};
use chamber::error::{ActuatorError, SensorError};
use chamber::reading::{SensorReading, TEMPERATURE_PROBES};
use chamber::scheduler::{Clock, ManualClock, StopToken};

// ── Actuator call record ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorCall {
    Set { device: DeviceId, state: Switch, at: Duration },
    Pump { percent: u8, at: Duration },
}

// ── MockChamber ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct SlowProbe {
    pub probe: usize,
    pub thread: &'static str,
    pub block: Duration,
}

pub struct MockState {
    pub temperatures: Vec<Result<f32, SensorError>>,
    pub humidity: Result<f32, SensorError>,
    pub oxygen: Result<f32, SensorError>,
    pub co2: Result<f32, SensorError>,
    /// Add 1.0 to humidity after every read, making each reading unique.
    pub count_humidity: bool,
    pub panic_on_read: bool,
    /// Virtual time each humidity read takes (simulates slow sensors).
    pub read_delay: Duration,
    /// Real time each humidity read blocks for.
    pub read_block: Duration,
    /// Real time a temperature read of `probe` blocks for, only on the
    /// thread named `thread`.
    pub slow_probe: Option<SlowProbe>,
    pub failing: Vec<DeviceId>,
    /// Devices whose Off writes fail (On writes still succeed).
    pub failing_off: Vec<DeviceId>,
    pub pump_fails: bool,
    pub calls: Vec<ActuatorCall>,
}

/// Sensor and actuator double sharing one state.
pub struct MockChamber {
    pub clock: Arc<dyn Clock>,
    /// Set when running on virtual time; slow reads advance it.
    pub manual: Option<Arc<ManualClock>>,
    pub state: Mutex<MockState>,
}

impl MockChamber {
    /// On virtual time.  All probes at `temperature`, CO2 at `co2`,
    /// everything healthy.
    pub fn new(clock: Arc<ManualClock>, temperature: f32, co2: f32) -> Self {
        let mut mock = Self::on_clock(clock.clone(), temperature, co2);
        mock.manual = Some(clock);
        mock
    }

    /// On any clock (real time for threaded service tests).
    pub fn on_clock(clock: Arc<dyn Clock>, temperature: f32, co2: f32) -> Self {
        Self {
            clock,
            manual: None,
            state: Mutex::new(MockState {
                temperatures: vec![Ok(temperature); TEMPERATURE_PROBES],
                humidity: Ok(55.0),
                oxygen: Ok(20.9),
                co2: Ok(co2),
                count_humidity: false,
                panic_on_read: false,
                read_delay: Duration::ZERO,
                read_block: Duration::ZERO,
                slow_probe: None,
                failing: Vec::new(),
                failing_off: Vec::new(),
                pump_fails: false,
                calls: Vec::new(),
            }),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn set_temperature(&self, probe: usize, value: Result<f32, SensorError>) {
        self.with(|s| s.temperatures[probe] = value);
    }

    pub fn set_co2(&self, value: Result<f32, SensorError>) {
        self.with(|s| s.co2 = value);
    }

    pub fn fail_device(&self, device: DeviceId, fail: bool) {
        self.with(|s| {
            s.failing.retain(|d| *d != device);
            if fail {
                s.failing.push(device);
            }
        });
    }

    pub fn calls(&self) -> Vec<ActuatorCall> {
        self.with(|s| s.calls.clone())
    }

    /// Accepted writes to `device`, in order.
    pub fn writes(&self, device: DeviceId) -> Vec<(Switch, Duration)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ActuatorCall::Set { device: d, state, at } if d == device => Some((state, at)),
                _ => None,
            })
            .collect()
    }

    pub fn pump_speeds(&self) -> Vec<u8> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ActuatorCall::Pump { percent, .. } => Some(percent),
                ActuatorCall::Set { .. } => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }
}

impl SensorPort for MockChamber {
    fn probe_count(&self) -> usize {
        self.with(|s| s.temperatures.len())
    }

    fn read_temperature(&self, probe: usize) -> Result<f32, SensorError> {
        let (panic, value, slow) =
            self.with(|s| (s.panic_on_read, s.temperatures[probe], s.slow_probe));
        if panic {
            panic!("probe {probe} driver crashed");
        }
        if let Some(slow) = slow {
            if slow.probe == probe && std::thread::current().name() == Some(slow.thread) {
                std::thread::sleep(slow.block);
            }
        }
        value
    }

    fn read_humidity(&self) -> Result<f32, SensorError> {
        let (value, delay, block) = self.with(|s| {
            let value = s.humidity;
            if s.count_humidity {
                if let Ok(h) = &mut s.humidity {
                    *h += 1.0;
                }
            }
            (value, s.read_delay, s.read_block)
        });
        if !block.is_zero() {
            std::thread::sleep(block);
        }
        if let Some(manual) = &self.manual {
            // Slow read: virtual time passes without a scheduled sleep.
            manual.advance(delay);
        }
        value
    }

    fn read_oxygen(&self) -> Result<f32, SensorError> {
        self.with(|s| s.oxygen)
    }

    fn read_co2(&self) -> Result<f32, SensorError> {
        self.with(|s| s.co2)
    }
}

impl ActuatorPort for MockChamber {
    fn set_device_state(&self, device: DeviceId, state: Switch) -> Result<(), ActuatorError> {
        let at = self.clock.monotonic();
        self.with(|s| {
            if s.failing.contains(&device)
                || (state == Switch::Off && s.failing_off.contains(&device))
            {
                return Err(ActuatorError::GpioWriteFailed);
            }
            s.calls.push(ActuatorCall::Set { device, state, at });
            Ok(())
        })
    }

    fn set_pump_speed(&self, percent: u8) -> Result<(), ActuatorError> {
        let at = self.clock.monotonic();
        self.with(|s| {
            if s.pump_fails {
                return Err(ActuatorError::PwmWriteFailed);
            }
            s.calls.push(ActuatorCall::Pump { percent, at });
            Ok(())
        })
    }
}

// ── Recording sinks ───────────────────────────────────────────

/// Event sink that keeps every event.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<AppEvent>>,
}

impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &AppEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// In-memory data log.  Shares its rows through an `Arc`.
#[derive(Clone, Default)]
pub struct MemoryLog {
    pub rows: Arc<Mutex<Vec<SensorReading>>>,
    pub fail: Arc<Mutex<bool>>,
}

impl Persistence for MemoryLog {
    fn append(&mut self, reading: &SensorReading) -> Result<(), StorageError> {
        if *self.fail.lock().unwrap() {
            return Err(StorageError::IoError);
        }
        self.rows.lock().unwrap().push(*reading);
        Ok(())
    }
}

/// Broadcaster that records readings and raises `stop` after `limit` of them.
pub struct StopAfter {
    pub seen: Mutex<Vec<SensorReading>>,
    pub limit: usize,
    pub stop: StopToken,
}

impl StopAfter {
    pub fn new(limit: usize, stop: StopToken) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            limit,
            stop,
        }
    }
}

impl Broadcaster for StopAfter {
    fn publish(&self, reading: &SensorReading) {
        let mut seen = self.seen.lock().unwrap();
        seen.push(*reading);
        if seen.len() >= self.limit {
            self.stop.stop();
        }
    }
}
