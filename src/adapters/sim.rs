//! Simulated chamber: a first-order thermal and CO2 model behind both
//! hardware ports.
//!
//! The model integrates lazily on every port call using the injected
//! [`Clock`], so it runs equally well on real time (the binary without
//! hardware) and on a [`ManualClock`](crate::scheduler::ManualClock).
//!
//! ```text
//!   dT/dt   = heater·HEAT_RATE − LOSS·(T − AMBIENT)
//!   dCO2/dt = valve·VALVE_FLOW − LEAK·(CO2 − AMBIENT_CO2)
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::app::devices::{DeviceId, Switch, PUMP_ON_DUTY};
use crate::app::ports::{ActuatorPort, SensorPort};
use crate::error::{ActuatorError, SensorError};
use crate::reading::TEMPERATURE_PROBES;
use crate::scheduler::Clock;

const AMBIENT_TEMPERATURE: f32 = 22.0;
/// °C per second with the heater on.
const HEAT_RATE: f32 = 0.05;
/// Fraction of the gap to ambient lost per second.
const LOSS: f32 = 0.001;

const AMBIENT_CO2: f32 = 0.04;
/// CO2 percentage points per second with the valve open.
const VALVE_FLOW: f32 = 2.0;
const LEAK: f32 = 0.000_5;

/// Fixed per-probe offsets so the five probes disagree a little.
const PROBE_OFFSETS: [f32; TEMPERATURE_PROBES] = [-0.2, -0.1, 0.0, 0.05, 0.1];

struct Model {
    temperature: f32,
    co2: f32,
    humidity: f32,
    heater: bool,
    valve: bool,
    pump_duty: u8,
    updated: Duration,
    failed_probes: [bool; TEMPERATURE_PROBES],
    co2_failed: bool,
}

impl Model {
    fn integrate(&mut self, now: Duration) {
        let dt = now.saturating_sub(self.updated).as_secs_f32();
        self.updated = now;
        if dt == 0.0 {
            return;
        }
        let heat = if self.heater { HEAT_RATE } else { 0.0 };
        self.temperature += (heat - LOSS * (self.temperature - AMBIENT_TEMPERATURE)) * dt;
        let flow = if self.valve { VALVE_FLOW } else { 0.0 };
        self.co2 = (self.co2 + (flow - LEAK * (self.co2 - AMBIENT_CO2)) * dt).max(0.0);
    }
}

pub struct SimulatedChamber {
    clock: Arc<dyn Clock>,
    model: Mutex<Model>,
}

impl SimulatedChamber {
    /// A chamber starting at `temperature` °C and `co2` %.
    pub fn new(clock: Arc<dyn Clock>, temperature: f32, co2: f32) -> Self {
        let updated = clock.monotonic();
        Self {
            clock,
            model: Mutex::new(Model {
                temperature,
                co2,
                humidity: 60.0,
                heater: false,
                valve: false,
                pump_duty: 0,
                updated,
                failed_probes: [false; TEMPERATURE_PROBES],
                co2_failed: false,
            }),
        }
    }

    /// Make a probe fail (or recover) on subsequent reads.
    pub fn set_probe_failed(&self, probe: usize, failed: bool) {
        if let Some(flag) = self.model().failed_probes.get_mut(probe) {
            *flag = failed;
        }
    }

    pub fn set_co2_failed(&self, failed: bool) {
        self.model().co2_failed = failed;
    }

    /// True chamber temperature (no probe offset).
    pub fn temperature(&self) -> f32 {
        self.model().temperature
    }

    pub fn co2(&self) -> f32 {
        self.model().co2
    }

    pub fn heater_on(&self) -> bool {
        self.model().heater
    }

    pub fn pump_duty(&self) -> u8 {
        self.model().pump_duty
    }

    /// Lock the model, integrated up to now.
    fn model(&self) -> MutexGuard<'_, Model> {
        let mut model = match self.model.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        model.integrate(self.clock.monotonic());
        model
    }
}

impl SensorPort for SimulatedChamber {
    fn probe_count(&self) -> usize {
        TEMPERATURE_PROBES
    }

    fn read_temperature(&self, probe: usize) -> Result<f32, SensorError> {
        let model = self.model();
        match model.failed_probes.get(probe) {
            None => Err(SensorError::Absent),
            Some(true) => Err(SensorError::NoResponse),
            Some(false) => Ok(model.temperature + PROBE_OFFSETS[probe]),
        }
    }

    fn read_humidity(&self) -> Result<f32, SensorError> {
        Ok(self.model().humidity)
    }

    fn read_oxygen(&self) -> Result<f32, SensorError> {
        // Dosed CO2 displaces air.
        let co2 = self.model().co2;
        Ok(20.95 * (1.0 - co2 / 100.0))
    }

    fn read_co2(&self) -> Result<f32, SensorError> {
        let model = self.model();
        if model.co2_failed {
            return Err(SensorError::NoResponse);
        }
        Ok((model.co2 * 100.0).round() / 100.0)
    }
}

impl ActuatorPort for SimulatedChamber {
    fn set_device_state(&self, device: DeviceId, state: Switch) -> Result<(), ActuatorError> {
        let mut model = self.model();
        match device {
            DeviceId::Heater => model.heater = state.is_on(),
            DeviceId::Co2Solenoid => model.valve = state.is_on(),
            DeviceId::Pump => model.pump_duty = if state.is_on() { PUMP_ON_DUTY } else { 0 },
        }
        Ok(())
    }

    fn set_pump_speed(&self, percent: u8) -> Result<(), ActuatorError> {
        if percent > 100 {
            return Err(ActuatorError::InvalidSpeed);
        }
        self.model().pump_duty = percent;
        Ok(())
    }
}
