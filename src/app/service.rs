//! Application service: the composition of the three loops.
//!
//! [`ChamberService`] owns the shared state (replay buffer, device
//! controller, live thresholds, stop signal) and the loop threads.  All
//! I/O flows through the port traits handed to [`ChamberService::new`],
//! so the whole service runs against mock adapters in tests.
//!
//! ```text
//!                  ┌──────────── ChamberService ─────────────┐
//!  SensorPort ───▶ │ acquisition ─▶ RingBuffer ─▶ ObserverHub │ ──▶ observers
//!                  │      └──────▶ Persistence                │
//!                  │ temp-control ┐                           │
//!                  │ co2-control  ┴▶ DeviceController ────────│ ──▶ ActuatorPort
//!                  └──────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! `new` → `start` → (`attach_observer`, `latest`, threshold updates) →
//! `shutdown`.  Shutdown raises the stop signal once, waits up to the
//! configured timeout for every loop to acknowledge, drives all devices
//! off once, and is idempotent.  Dropping a started service shuts it down.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::{bail, Context};
use log::{error, info, warn};

use crate::acquisition::AcquisitionLoop;
use crate::adapters::observers::ObserverHub;
use crate::buffer::RingBuffer;
use crate::config::{ChamberConfig, SharedThresholds};
use crate::control::co2::Co2Control;
use crate::control::heater::TemperatureControl;
use crate::error::ConfigError;
use crate::reading::SensorReading;
use crate::scheduler::{Clock, StopToken};

use super::devices::{DeviceController, DeviceId, Switch};
use super::events::{AppEvent, LoopId};
use super::ports::{ActuatorPort, EventSink, Persistence, SensorPort};

// ───────────────────────────────────────────────────────────────
// ShutdownReport
// ───────────────────────────────────────────────────────────────

/// Which loops acknowledged the stop signal in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub stopped: Vec<LoopId>,
    /// Still running when the timeout expired.  Their threads are detached.
    pub lagging: Vec<LoopId>,
}

// ───────────────────────────────────────────────────────────────
// ChamberService
// ───────────────────────────────────────────────────────────────

pub struct ChamberService {
    config: ChamberConfig,
    sensors: Arc<dyn SensorPort>,
    devices: Arc<DeviceController>,
    buffer: Arc<RingBuffer>,
    hub: Arc<ObserverHub>,
    thresholds: SharedThresholds,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    stop: StopToken,
    /// Handed to the acquisition loop on `start`.
    persistence: Option<Box<dyn Persistence>>,
    workers: Vec<(LoopId, JoinHandle<()>)>,
    acks: Option<Receiver<LoopId>>,
    shut_down: bool,
}

impl ChamberService {
    /// Validate `config` and wire the shared state.  No thread runs and no
    /// device is touched until [`start`](Self::start).
    pub fn new(
        config: ChamberConfig,
        sensors: Arc<dyn SensorPort>,
        actuators: Arc<dyn ActuatorPort>,
        persistence: Box<dyn Persistence>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            thresholds: SharedThresholds::from_config(&config),
            buffer: Arc::new(RingBuffer::new(config.buffer_capacity)),
            devices: Arc::new(DeviceController::new(actuators)),
            hub: Arc::new(ObserverHub::new()),
            config,
            sensors,
            clock,
            sink,
            stop: StopToken::new(),
            persistence: Some(persistence),
            workers: Vec::new(),
            acks: None,
            shut_down: false,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Drive the heater and solenoid off, start the pump, then spawn the
    /// acquisition, temperature and CO2 loops.
    ///
    /// Device writes that fail here are logged and left to the control
    /// loops to retry.  Fails only if the service was already started or
    /// a loop thread could not be spawned.
    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.shut_down {
            bail!("service has been shut down");
        }
        let Some(persistence) = self.persistence.take() else {
            bail!("service already started");
        };

        for device in [DeviceId::Heater, DeviceId::Co2Solenoid] {
            if let Err(e) = self.devices.force(device, Switch::Off) {
                warn!("Initial {device} off failed: {e}");
            }
        }
        if let Err(e) = self.devices.set_pump_speed(self.config.pump_duty_percent) {
            warn!("Initial pump speed failed: {e}");
        }

        let (ack_tx, ack_rx) = mpsc::channel();
        self.acks = Some(ack_rx);

        let mut acquisition = AcquisitionLoop::new(
            Arc::clone(&self.sensors),
            Arc::clone(&self.buffer),
            persistence,
            self.hub.clone(),
            Arc::clone(&self.sink),
        );
        let clock = Arc::clone(&self.clock);
        let period = self.config.acquisition_interval();
        self.spawn(LoopId::Acquisition, ack_tx.clone(), move |stop| {
            acquisition.run(clock, period, &stop);
        })?;

        let heater = TemperatureControl::new(
            Arc::clone(&self.sensors),
            Arc::clone(&self.devices),
            self.thresholds.clone(),
            Arc::clone(&self.sink),
        );
        let clock = Arc::clone(&self.clock);
        let period = self.config.temp_control_interval();
        self.spawn(LoopId::TemperatureControl, ack_tx.clone(), move |stop| {
            heater.run(clock, period, &stop);
        })?;

        let co2 = Co2Control::new(
            Arc::clone(&self.sensors),
            Arc::clone(&self.devices),
            self.thresholds.clone(),
            Arc::clone(&self.clock),
            self.config.solenoid_on_time(),
            self.config.co2_dead_band_percent,
            Arc::clone(&self.sink),
        );
        let period = self.config.co2_control_interval();
        self.spawn(LoopId::Co2Control, ack_tx, move |stop| {
            co2.run(period, &stop);
        })?;

        info!(
            "Chamber running: acquisition {} ms, temperature {} ms, CO2 {} ms",
            self.config.acquisition_interval_ms,
            self.config.temp_control_interval_ms,
            self.config.co2_control_interval_ms
        );
        self.sink.emit(&AppEvent::Started);
        Ok(())
    }

    fn spawn(
        &mut self,
        id: LoopId,
        acks: Sender<LoopId>,
        body: impl FnOnce(StopToken) + Send + 'static,
    ) -> anyhow::Result<()> {
        let stop = self.stop.clone();
        let sink = Arc::clone(&self.sink);
        let spawned = thread::Builder::new()
            .name(id.as_str().into())
            .spawn(move || {
                info!("{id} loop started");
                body(stop);
                sink.emit(&AppEvent::LoopStopped(id));
                // The service may have stopped listening after its timeout.
                let _ = acks.send(id);
            });
        match spawned {
            Ok(handle) => {
                self.workers.push((id, handle));
                Ok(())
            }
            Err(e) => {
                self.stop.stop();
                Err(e).with_context(|| format!("spawning {id} loop"))
            }
        }
    }

    /// Stop every loop, seal the device controller and drive all devices
    /// off.  Safe to call more than once; only the first call has any effect.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.shut_down {
            return ShutdownReport::default();
        }
        self.shut_down = true;

        let timeout = self.config.shutdown_timeout();
        if self.stop.stop() {
            info!("Stop requested, waiting up to {} ms for loops", timeout.as_millis());
        }
        // A loop that misses the deadline may still command devices; from
        // here on it can only switch them off.
        self.devices.seal();

        let mut report = ShutdownReport {
            stopped: Vec::new(),
            lagging: self.workers.iter().map(|(id, _)| *id).collect(),
        };
        if let Some(acks) = self.acks.take() {
            let deadline = Instant::now() + timeout;
            while !report.lagging.is_empty() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let Ok(id) = acks.recv_timeout(remaining) else {
                    break;
                };
                report.lagging.retain(|l| *l != id);
                report.stopped.push(id);
            }
        }

        for (id, handle) in self.workers.drain(..) {
            if report.stopped.contains(&id) {
                if handle.join().is_err() {
                    error!("{id} loop thread panicked on exit");
                }
            } else {
                warn!("{id} loop still running after {} ms, detaching", timeout.as_millis());
            }
        }

        match self.devices.all_off() {
            Ok(()) => info!("All devices off"),
            Err(e) => error!("Could not drive every device off: {e}"),
        }
        self.sink.emit(&AppEvent::ShutdownComplete {
            lagging: report.lagging.len(),
        });
        report
    }

    // ── Queries & handles ─────────────────────────────────────

    /// Attach an observer.  It first receives the buffered history, oldest
    /// first, then every new reading exactly once.
    pub fn attach_observer(&self) -> Receiver<SensorReading> {
        self.hub.attach(&self.buffer)
    }

    /// Most recent reading, if any cycle has completed.
    pub fn latest(&self) -> Option<SensorReading> {
        self.buffer.latest()
    }

    /// Buffered history, oldest first.
    pub fn history(&self) -> Vec<SensorReading> {
        self.buffer.snapshot()
    }

    /// Live thresholds.  Updates take effect on each control loop's next cycle.
    pub fn thresholds(&self) -> &SharedThresholds {
        &self.thresholds
    }

    pub fn devices(&self) -> &DeviceController {
        &self.devices
    }

    /// A handle on the stop signal, for callers that wait on it.
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.workers.is_empty() && !self.shut_down
    }

    pub fn config(&self) -> &ChamberConfig {
        &self.config
    }
}

impl Drop for ChamberService {
    fn drop(&mut self) {
        if self.is_running() {
            self.shutdown();
        }
    }
}
