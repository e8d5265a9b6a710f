//! Commanded device state and the single path that mutates it.
//!
//! [`DeviceController`] is the only caller of [`ActuatorPort`].  It remembers
//! the last state it successfully commanded and trusts it: a request for
//! the state a device is already in is not written again.  A failed write
//! leaves the remembered state untouched, so the next control cycle asks
//! for the same transition and retries it.

use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use heapless::FnvIndexMap;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::ActuatorError;

use super::ports::ActuatorPort;

/// Duty applied when the pump is simply switched "on".
pub const PUMP_ON_DUTY: u8 = 75;

/// Every actuated device in the chamber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceId {
    Heater,
    Co2Solenoid,
    Pump,
}

impl DeviceId {
    pub const ALL: [DeviceId; 3] = [Self::Heater, Self::Co2Solenoid, Self::Pump];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Heater => "heater",
            Self::Co2Solenoid => "co2-solenoid",
            Self::Pump => "pump",
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub const fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

impl From<bool> for Switch {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

impl fmt::Display for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_on() { "on" } else { "off" })
    }
}

// ───────────────────────────────────────────────────────────────
// DeviceState
// ───────────────────────────────────────────────────────────────

/// Last successfully commanded state of every device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    switches: FnvIndexMap<DeviceId, Switch, 4>,
    pump_duty: u8,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceState {
    /// Everything off, which is also what the relays default to.
    pub fn new() -> Self {
        let mut switches = FnvIndexMap::new();
        for device in DeviceId::ALL {
            // Capacity 4 holds all three devices.
            let _ = switches.insert(device, Switch::Off);
        }
        Self {
            switches,
            pump_duty: 0,
        }
    }

    pub fn get(&self, device: DeviceId) -> Switch {
        self.switches.get(&device).copied().unwrap_or(Switch::Off)
    }

    /// Pump duty cycle (0–100 %).
    pub fn pump_duty(&self) -> u8 {
        self.pump_duty
    }

    fn record(&mut self, device: DeviceId, state: Switch) {
        let _ = self.switches.insert(device, state);
    }
}

/// Whether a command reached the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// The device was already in the requested state; nothing written.
    Unchanged,
    /// The adapter accepted the write.
    Written,
    /// The controller is sealed for shutdown and the command would have
    /// energised a device; nothing written.
    Refused,
}

// ───────────────────────────────────────────────────────────────
// DeviceController
// ───────────────────────────────────────────────────────────────

/// Owns [`DeviceState`] and the actuator port.  Shared by both control loops.
///
/// Once [`seal`](Self::seal)ed, `set` and `set_pump_speed` refuse anything
/// that would switch a device on.  Switching off stays allowed, and
/// [`force`](Self::force) bypasses the seal so shutdown can drive the
/// safe state.
pub struct DeviceController {
    port: Arc<dyn ActuatorPort>,
    state: Mutex<DeviceState>,
    /// Only written under the `state` lock.
    sealed: AtomicBool,
}

impl DeviceController {
    pub fn new(port: Arc<dyn ActuatorPort>) -> Self {
        Self {
            port,
            state: Mutex::new(DeviceState::new()),
            sealed: AtomicBool::new(false),
        }
    }

    /// Copy of the commanded state of every device.
    pub fn state(&self) -> DeviceState {
        self.lock().clone()
    }

    pub fn switch(&self, device: DeviceId) -> Switch {
        self.lock().get(device)
    }

    /// Command `device` to `target` unless it is already there.
    pub fn set(&self, device: DeviceId, target: Switch) -> Result<Command, ActuatorError> {
        let mut state = self.lock();
        if state.get(device) == target {
            return Ok(Command::Unchanged);
        }
        if target.is_on() && self.is_sealed() {
            warn!("{} {} refused: shutting down", device, target);
            return Ok(Command::Refused);
        }
        if device == DeviceId::Pump {
            let duty = if target.is_on() { PUMP_ON_DUTY } else { 0 };
            self.write_pump(&mut state, duty)?;
        } else {
            self.write(&mut state, device, target)?;
        }
        Ok(Command::Written)
    }

    /// Write `target` regardless of the remembered state or the seal.
    ///
    /// Used at startup and shutdown, when the hardware may disagree with
    /// what the controller last remembers.
    pub fn force(&self, device: DeviceId, target: Switch) -> Result<(), ActuatorError> {
        let mut state = self.lock();
        if device == DeviceId::Pump {
            let duty = if target.is_on() { PUMP_ON_DUTY } else { 0 };
            return self.write_pump(&mut state, duty);
        }
        self.write(&mut state, device, target)
    }

    /// Set the pump duty.  A duty of 0 switches the pump off.
    pub fn set_pump_speed(&self, percent: u8) -> Result<Command, ActuatorError> {
        if percent > 100 {
            error!("Pump speed {}% rejected (must be 0-100)", percent);
            return Err(ActuatorError::InvalidSpeed);
        }
        let mut state = self.lock();
        if percent > 0 && self.is_sealed() {
            warn!("pump {}% refused: shutting down", percent);
            return Ok(Command::Refused);
        }
        self.write_pump(&mut state, percent)?;
        Ok(Command::Written)
    }

    /// Refuse every later command that would switch a device on.
    ///
    /// Takes the state lock, so a write already in progress completes
    /// before this returns and nothing energises afterwards.
    pub fn seal(&self) {
        let _state = self.lock();
        self.sealed.store(true, Ordering::SeqCst);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    /// Drive every device to its safe state.  Each device is attempted even
    /// if an earlier one fails; the first failure is returned.
    pub fn all_off(&self) -> Result<(), ActuatorError> {
        let mut first_error = None;
        for device in DeviceId::ALL {
            if let Err(e) = self.force(device, Switch::Off) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn write_pump(&self, state: &mut DeviceState, percent: u8) -> Result<(), ActuatorError> {
        match self.port.set_pump_speed(percent) {
            Ok(()) => {
                state.pump_duty = percent;
                state.record(DeviceId::Pump, Switch::from(percent > 0));
                info!("pump set to {}%", percent);
                Ok(())
            }
            Err(e) => {
                error!("Failed to set pump speed to {}%: {}", percent, e);
                Err(e)
            }
        }
    }

    fn write(
        &self,
        state: &mut DeviceState,
        device: DeviceId,
        target: Switch,
    ) -> Result<(), ActuatorError> {
        match self.port.set_device_state(device, target) {
            Ok(()) => {
                state.record(device, target);
                info!("{} set to {}", device, target);
                Ok(())
            }
            Err(e) => {
                error!("Failed to set {} {}: {}", device, target, e);
                Err(e)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
