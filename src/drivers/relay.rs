//! Relay channel driver (heater, CO2 solenoid).
//!
//! The relay board is active-low: driving the input LOW energises the
//! coil.  Construction drives the de-energised level so a freshly built
//! relay never starts in the ON position.

use embedded_hal::digital::OutputPin;

use crate::error::ActuatorError;

/// Input polarity of a relay channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    ActiveLow,
    ActiveHigh,
}

pub struct Relay<P> {
    pin: P,
    polarity: Polarity,
    on: bool,
}

impl<P: OutputPin> Relay<P> {
    /// Take ownership of `pin` and release the relay.
    pub fn new(pin: P, polarity: Polarity) -> Result<Self, ActuatorError> {
        let mut relay = Self {
            pin,
            polarity,
            on: false,
        };
        relay.set(false)?;
        Ok(relay)
    }

    /// Energise (`true`) or release (`false`) the coil.
    pub fn set(&mut self, on: bool) -> Result<(), ActuatorError> {
        let drive_low = match self.polarity {
            Polarity::ActiveLow => on,
            Polarity::ActiveHigh => !on,
        };
        let written = if drive_low {
            self.pin.set_low()
        } else {
            self.pin.set_high()
        };
        written.map_err(|_| ActuatorError::GpioWriteFailed)?;
        self.on = on;
        Ok(())
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}
