//! Circulation pump driver (H-bridge: one PWM enable, one direction input).
//!
//! The pump only ever runs forward.  Speed is a duty cycle in percent;
//! 0 stops the motor and releases the direction input.
//!
//! Generic over `embedded-hal` traits so the same driver runs against a
//! real PWM channel or a recording double.

use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;

use crate::error::ActuatorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Stopped,
    Running { duty: u8 },
}

pub struct PumpDriver<EN, DIR> {
    enable: EN,
    direction: DIR,
    state: PumpState,
}

impl<EN: SetDutyCycle, DIR: OutputPin> PumpDriver<EN, DIR> {
    /// Take ownership of the pins and make sure the motor is stopped.
    pub fn new(enable: EN, direction: DIR) -> Result<Self, ActuatorError> {
        let mut pump = Self {
            enable,
            direction,
            state: PumpState::Stopped,
        };
        pump.stop()?;
        Ok(pump)
    }

    /// Run forward at `percent` duty.  0 stops.
    pub fn set_speed(&mut self, percent: u8) -> Result<(), ActuatorError> {
        if percent > 100 {
            return Err(ActuatorError::InvalidSpeed);
        }
        if percent == 0 {
            return self.stop();
        }
        self.direction
            .set_high()
            .map_err(|_| ActuatorError::GpioWriteFailed)?;
        self.enable
            .set_duty_cycle_percent(percent)
            .map_err(|_| ActuatorError::PwmWriteFailed)?;
        self.state = PumpState::Running { duty: percent };
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), ActuatorError> {
        self.enable
            .set_duty_cycle_fully_off()
            .map_err(|_| ActuatorError::PwmWriteFailed)?;
        self.direction
            .set_low()
            .map_err(|_| ActuatorError::GpioWriteFailed)?;
        self.state = PumpState::Stopped;
        Ok(())
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    pub fn current_duty(&self) -> u8 {
        match self.state {
            PumpState::Stopped => 0,
            PumpState::Running { duty } => duty,
        }
    }
}
