//! Hardware adapter: bridges physical channels to the domain port traits.
//!
//! Every channel sits behind its own mutex.  The acquisition loop and the
//! control loops may read the same probe concurrently, and a serial
//! transaction must never interleave with another on the same port.
//! Channels on different buses do not contend.
//!
//! A sensor channel that was never installed reads as
//! [`SensorError::Absent`], and a value outside the physically plausible
//! range (an open RTD, a saturated cell) as [`SensorError::OutOfRange`].
//! The loops turn both into the field's fallback value.

use std::io::{Read, Write};
use std::ops::RangeInclusive;
use std::sync::{Mutex, MutexGuard};

use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;
use log::warn;

use crate::app::devices::{DeviceId, Switch, PUMP_ON_DUTY};
use crate::app::ports::{ActuatorPort, SensorPort};
use crate::config::ChamberConfig;
use crate::drivers::pump::PumpDriver;
use crate::drivers::relay::Relay;
use crate::error::{ActuatorError, SensorError};
use crate::sensors::co2_serial::Co2SerialSensor;

/// Plausible RTD temperature (°C).
const TEMPERATURE_RANGE: RangeInclusive<f32> = -40.0..=150.0;
/// Plausible humidity, oxygen and CO2 (%).
const PERCENT_RANGE: RangeInclusive<f32> = 0.0..=100.0;

// ── Channel traits ────────────────────────────────────────────

/// A sensor that yields one scalar per read.
pub trait Channel: Send {
    fn read(&mut self) -> Result<f32, SensorError>;
}

/// A two-state output (relay coil).
pub trait OnOff: Send {
    fn set_on(&mut self, on: bool) -> Result<(), ActuatorError>;
}

/// A variable-speed motor output.
pub trait SpeedControl: Send {
    fn set_speed(&mut self, percent: u8) -> Result<(), ActuatorError>;
}

impl<P: Read + Write + Send> Channel for Co2SerialSensor<P> {
    fn read(&mut self) -> Result<f32, SensorError> {
        self.read_percent()
    }
}

impl<P: OutputPin + Send> OnOff for Relay<P> {
    fn set_on(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.set(on)
    }
}

impl<EN, DIR> SpeedControl for PumpDriver<EN, DIR>
where
    EN: SetDutyCycle + Send,
    DIR: OutputPin + Send,
{
    fn set_speed(&mut self, percent: u8) -> Result<(), ActuatorError> {
        PumpDriver::set_speed(self, percent)
    }
}

// ── Adapter ───────────────────────────────────────────────────

type Guarded<T> = Mutex<Box<T>>;

/// Concrete adapter that combines all chamber hardware behind port traits.
pub struct HardwareAdapter {
    probes: Vec<Guarded<dyn Channel>>,
    humidity: Option<Guarded<dyn Channel>>,
    oxygen: Option<Guarded<dyn Channel>>,
    co2: Option<Guarded<dyn Channel>>,
    heater: Guarded<dyn OnOff>,
    co2_solenoid: Guarded<dyn OnOff>,
    pump: Guarded<dyn SpeedControl>,
}

impl HardwareAdapter {
    /// Start from the actuators; sensor channels are added one by one.
    pub fn new(
        heater: Box<dyn OnOff>,
        co2_solenoid: Box<dyn OnOff>,
        pump: Box<dyn SpeedControl>,
    ) -> Self {
        Self {
            probes: Vec::new(),
            humidity: None,
            oxygen: None,
            co2: None,
            heater: Mutex::new(heater),
            co2_solenoid: Mutex::new(co2_solenoid),
            pump: Mutex::new(pump),
        }
    }

    /// Append the next temperature probe (probe indices follow call order).
    pub fn with_temperature_probe(mut self, probe: Box<dyn Channel>) -> Self {
        self.probes.push(Mutex::new(probe));
        self
    }

    pub fn with_humidity(mut self, sensor: Box<dyn Channel>) -> Self {
        self.humidity = Some(Mutex::new(sensor));
        self
    }

    pub fn with_oxygen(mut self, sensor: Box<dyn Channel>) -> Self {
        self.oxygen = Some(Mutex::new(sensor));
        self
    }

    pub fn with_co2(mut self, sensor: Box<dyn Channel>) -> Self {
        self.co2 = Some(Mutex::new(sensor));
        self
    }

    /// Install the serial CO2 sensor on `port`, scaled by the configured
    /// raw multiplier, and switch it to polling mode.  A sensor that does
    /// not take the mode command is still installed; its reads will fail
    /// until it answers.
    pub fn with_co2_serial<P>(self, port: P, config: &ChamberConfig) -> Self
    where
        P: Read + Write + Send + 'static,
    {
        let mut sensor = Co2SerialSensor::new(port, config.co2_raw_multiplier);
        if let Err(e) = sensor.init() {
            warn!("co2 sensor init failed: {e}");
        }
        self.with_co2(Box::new(sensor))
    }
}

fn lock<T: ?Sized>(m: &Mutex<Box<T>>) -> MutexGuard<'_, Box<T>> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn plausible(value: f32, range: &RangeInclusive<f32>) -> Result<f32, SensorError> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(SensorError::OutOfRange)
    }
}

fn read_scalar(channel: Option<&Guarded<dyn Channel>>) -> Result<f32, SensorError> {
    let channel = channel.ok_or(SensorError::Absent)?;
    let value = lock(channel).read()?;
    plausible(value, &PERCENT_RANGE)
}

// ── SensorPort implementation ─────────────────────────────────

impl SensorPort for HardwareAdapter {
    fn probe_count(&self) -> usize {
        self.probes.len()
    }

    fn read_temperature(&self, probe: usize) -> Result<f32, SensorError> {
        let channel = self.probes.get(probe).ok_or(SensorError::Absent)?;
        let value = lock(channel).read()?;
        plausible(value, &TEMPERATURE_RANGE)
    }

    fn read_humidity(&self) -> Result<f32, SensorError> {
        read_scalar(self.humidity.as_ref())
    }

    fn read_oxygen(&self) -> Result<f32, SensorError> {
        read_scalar(self.oxygen.as_ref())
    }

    fn read_co2(&self) -> Result<f32, SensorError> {
        read_scalar(self.co2.as_ref())
    }
}

// ── ActuatorPort implementation ───────────────────────────────

impl ActuatorPort for HardwareAdapter {
    fn set_device_state(&self, device: DeviceId, state: Switch) -> Result<(), ActuatorError> {
        match device {
            DeviceId::Heater => lock(&self.heater).set_on(state.is_on()),
            DeviceId::Co2Solenoid => lock(&self.co2_solenoid).set_on(state.is_on()),
            DeviceId::Pump => {
                let duty = if state.is_on() { PUMP_ON_DUTY } else { 0 };
                lock(&self.pump).set_speed(duty)
            }
        }
    }

    fn set_pump_speed(&self, percent: u8) -> Result<(), ActuatorError> {
        lock(&self.pump).set_speed(percent)
    }
}
