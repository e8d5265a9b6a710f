//! Heater hysteresis controller.
//!
//! The control temperature is the mean of probes 3 and 4 (the two at the
//! sample shelf).  If either of them reports its fallback value the cycle
//! is skipped: averaging a sentinel would command the heater from a
//! meaningless number.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::app::devices::{Command, DeviceController, DeviceId, Switch};
use crate::app::events::{AppEvent, LoopId, SkipReason};
use crate::app::ports::{EventSink, SensorPort};
use crate::config::{SharedThresholds, Thresholds};
use crate::reading::{FALLBACK_TEMPERATURE, TEMPERATURE_PROBES};
use crate::scheduler::{run_periodic, Clock, StopToken, Ticker};
use crate::sensors;

use super::round_centi;

/// Indices of the probes averaged for control.
pub const REFERENCE_PROBES: [usize; 2] = [2, 3];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeaterDecision {
    /// A reference probe is unavailable.
    Skip,
    /// Average below the lower bound.
    TurnOn(f32),
    /// Average above the upper bound.
    TurnOff(f32),
    /// Inside the band: leave the heater as it is.
    Hold(f32),
}

/// Mean of the reference probes rounded to 0.01 °C, or `None` if either
/// reports its fallback.
pub fn control_temperature(temperatures: &[f32; TEMPERATURE_PROBES]) -> Option<f32> {
    let [a, b] = REFERENCE_PROBES.map(|i| temperatures[i]);
    if a == FALLBACK_TEMPERATURE || b == FALLBACK_TEMPERATURE {
        return None;
    }
    Some(round_centi((a + b) / 2.0))
}

pub fn decide(temperatures: &[f32; TEMPERATURE_PROBES], thresholds: &Thresholds) -> HeaterDecision {
    match control_temperature(temperatures) {
        None => HeaterDecision::Skip,
        Some(avg) if avg < thresholds.temp_lower => HeaterDecision::TurnOn(avg),
        Some(avg) if avg > thresholds.temp_upper => HeaterDecision::TurnOff(avg),
        Some(avg) => HeaterDecision::Hold(avg),
    }
}

pub struct TemperatureControl {
    sensors: Arc<dyn SensorPort>,
    devices: Arc<DeviceController>,
    thresholds: SharedThresholds,
    sink: Arc<dyn EventSink>,
}

impl TemperatureControl {
    pub fn new(
        sensors: Arc<dyn SensorPort>,
        devices: Arc<DeviceController>,
        thresholds: SharedThresholds,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            sensors,
            devices,
            thresholds,
            sink,
        }
    }

    /// One control cycle: read, decide, actuate.
    pub fn tick(&self) -> HeaterDecision {
        let temperatures = sensors::read_temperatures(self.sensors.as_ref());
        let decision = decide(&temperatures, &self.thresholds.current());
        match decision {
            HeaterDecision::Skip => {
                warn!(
                    "Reference probe unavailable (t3={}, t4={}), skipping heater control",
                    temperatures[REFERENCE_PROBES[0]],
                    temperatures[REFERENCE_PROBES[1]]
                );
                self.sink.emit(&AppEvent::ControlSkipped {
                    loop_id: LoopId::TemperatureControl,
                    reason: SkipReason::TemperatureUnavailable,
                });
            }
            HeaterDecision::TurnOn(avg) => self.command(Switch::On, avg),
            HeaterDecision::TurnOff(avg) => self.command(Switch::Off, avg),
            HeaterDecision::Hold(avg) => debug!("Average temperature {avg:.2}C within band"),
        }
        decision
    }

    fn command(&self, target: Switch, avg: f32) {
        match self.devices.set(DeviceId::Heater, target) {
            Ok(Command::Written) => {
                info!("Average temperature {avg:.2}C, heater {target}");
                self.sink.emit(&AppEvent::DeviceSwitched {
                    device: DeviceId::Heater,
                    state: target,
                });
            }
            Ok(Command::Unchanged) => {}
            Ok(Command::Refused) => debug!("Heater {target} refused, controller sealed"),
            Err(error) => self.sink.emit(&AppEvent::ActuationFailed {
                device: DeviceId::Heater,
                error,
            }),
        }
    }

    /// Run until `stop` is raised.
    pub fn run(&self, clock: Arc<dyn Clock>, period: Duration, stop: &StopToken) {
        let mut ticker = Ticker::new(clock, period);
        run_periodic(
            LoopId::TemperatureControl.as_str(),
            &mut ticker,
            stop,
            |_| {
                self.tick();
            },
            |elapsed| {
                self.sink.emit(&AppEvent::CycleOverrun {
                    loop_id: LoopId::TemperatureControl,
                    elapsed,
                })
            },
        );
    }
}
