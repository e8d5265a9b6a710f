//! Pulsed CO2 dosing.
//!
//! Below the threshold the solenoid is opened for a fixed hold time and
//! closed again within the same cycle.  A negative reading is the `-1`
//! fallback: the cycle is skipped and nothing is written.  Readings at or
//! below the dead band are implausibly low, so they are never dosed on.
//!
//! ```text
//!   co2 < 0                  ─▶ Skip   (no write)
//!   0 ≤ co2 ≤ dead_band      ─▶ Close  (ensure closed)
//!   dead_band < co2 < thr    ─▶ Dose   (ON ─ hold ─ OFF)
//!   co2 ≥ thr                ─▶ Close  (ensure closed)
//! ```

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::app::devices::{Command, DeviceController, DeviceId, Switch};
use crate::app::events::{AppEvent, LoopId, SkipReason};
use crate::app::ports::{EventSink, SensorPort};
use crate::config::SharedThresholds;
use crate::error::ActuatorError;
use crate::scheduler::{run_periodic, Clock, StopToken, Ticker, Wake};
use crate::sensors;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DosingDecision {
    Skip,
    Dose,
    Close,
}

pub fn decide(co2: f32, threshold: f32, dead_band: f32) -> DosingDecision {
    if co2 < 0.0 {
        DosingDecision::Skip
    } else if co2 <= dead_band {
        DosingDecision::Close
    } else if co2 < threshold {
        DosingDecision::Dose
    } else {
        DosingDecision::Close
    }
}

/// What one dosing cycle actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DosingOutcome {
    /// No usable reading; nothing was written.
    Skipped,
    /// At or above threshold, or inside the dead band; no dose.
    Satisfied,
    /// Full ON-hold-OFF pulse.
    Pulsed { held: Duration },
    /// Stop arrived during the hold, or shutdown refused the open; the
    /// valve was still closed.
    Interrupted { held: Duration },
    /// A solenoid write failed.
    Failed(ActuatorError),
}

pub struct Co2Control {
    sensors: Arc<dyn SensorPort>,
    devices: Arc<DeviceController>,
    thresholds: SharedThresholds,
    clock: Arc<dyn Clock>,
    hold: Duration,
    dead_band: f32,
    sink: Arc<dyn EventSink>,
}

impl Co2Control {
    pub fn new(
        sensors: Arc<dyn SensorPort>,
        devices: Arc<DeviceController>,
        thresholds: SharedThresholds,
        clock: Arc<dyn Clock>,
        hold: Duration,
        dead_band: f32,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            sensors,
            devices,
            thresholds,
            clock,
            hold,
            dead_band,
            sink,
        }
    }

    /// One dosing cycle.  `stop` only shortens the hold; unless the reading
    /// is the fallback, the valve is commanded closed before this returns.
    pub fn tick(&self, stop: &StopToken) -> DosingOutcome {
        let co2 = sensors::read_co2(self.sensors.as_ref());
        let threshold = self.thresholds.current().co2_threshold;
        match decide(co2, threshold, self.dead_band) {
            DosingDecision::Skip => {
                warn!("CO2 reading unavailable, skipping dosing");
                self.sink.emit(&AppEvent::ControlSkipped {
                    loop_id: LoopId::Co2Control,
                    reason: SkipReason::Co2Unavailable,
                });
                DosingOutcome::Skipped
            }
            DosingDecision::Close => {
                debug!("CO2 {co2:.2}% not dosed (threshold {threshold:.2}%)");
                self.ensure_closed().map_or_else(DosingOutcome::Failed, |()| DosingOutcome::Satisfied)
            }
            DosingDecision::Dose => {
                info!("CO2 {co2:.2}% below {threshold:.2}%, dosing");
                self.pulse(stop)
            }
        }
    }

    fn pulse(&self, stop: &StopToken) -> DosingOutcome {
        match self.switch(Switch::On) {
            Ok(Command::Refused) => return DosingOutcome::Interrupted { held: Duration::ZERO },
            Ok(_) => {}
            Err(error) => return DosingOutcome::Failed(error),
        }
        let opened = self.clock.monotonic();
        let wake = self.clock.sleep(self.hold, stop);
        let closed = self.switch(Switch::Off);
        let held = self.clock.monotonic().saturating_sub(opened);
        if let Err(error) = closed {
            // State still reads On: the next cycle retries the close.
            return DosingOutcome::Failed(error);
        }
        self.sink.emit(&AppEvent::SolenoidPulsed { held });
        match wake {
            Wake::Elapsed => DosingOutcome::Pulsed { held },
            Wake::Stopped => DosingOutcome::Interrupted { held },
        }
    }

    fn ensure_closed(&self) -> Result<(), ActuatorError> {
        self.switch(Switch::Off).map(|_| ())
    }

    fn switch(&self, target: Switch) -> Result<Command, ActuatorError> {
        match self.devices.set(DeviceId::Co2Solenoid, target) {
            Ok(Command::Written) => {
                self.sink.emit(&AppEvent::DeviceSwitched {
                    device: DeviceId::Co2Solenoid,
                    state: target,
                });
                Ok(Command::Written)
            }
            Ok(other) => Ok(other),
            Err(error) => {
                self.sink.emit(&AppEvent::ActuationFailed {
                    device: DeviceId::Co2Solenoid,
                    error,
                });
                Err(error)
            }
        }
    }

    /// Run until `stop` is raised.
    pub fn run(&self, period: Duration, stop: &StopToken) {
        let mut ticker = Ticker::new(Arc::clone(&self.clock), period);
        run_periodic(
            LoopId::Co2Control.as_str(),
            &mut ticker,
            stop,
            |_| {
                self.tick(stop);
            },
            |elapsed| {
                self.sink.emit(&AppEvent::CycleOverrun {
                    loop_id: LoopId::Co2Control,
                    elapsed,
                })
            },
        );
    }
}
