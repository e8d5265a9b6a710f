//! Outbound application events.
//!
//! The loops and the [`ChamberService`](super::service::ChamberService)
//! emit these through the [`EventSink`](super::ports::EventSink) port.
//! Adapters on the other side decide what to do with them: log to the
//! console, count them, drive a status line.

use core::fmt;
use std::time::Duration;

use crate::error::ActuatorError;
use crate::reading::SensorReading;

use super::devices::{DeviceId, Switch};

/// The three long-lived loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopId {
    Acquisition,
    TemperatureControl,
    Co2Control,
}

impl LoopId {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Acquisition => "acquisition",
            Self::TemperatureControl => "temp-control",
            Self::Co2Control => "co2-control",
        }
    }
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a control cycle took no action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A reference temperature probe reported its fallback value.
    TemperatureUnavailable,
    /// The CO2 reading is the fallback value.
    Co2Unavailable,
}

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Devices were driven to their initial state and the loops spawned.
    Started,

    /// One acquisition cycle completed.
    Reading(SensorReading),

    /// The acquisition cycle failed outright; an all-fallback reading was
    /// substituted.
    CycleFailed(LoopId),

    /// A cycle took longer than its period.
    CycleOverrun { loop_id: LoopId, elapsed: Duration },

    /// A device changed state.
    DeviceSwitched { device: DeviceId, state: Switch },

    /// A device write was rejected by the actuator adapter.
    ActuationFailed { device: DeviceId, error: ActuatorError },

    /// A control cycle was skipped.
    ControlSkipped { loop_id: LoopId, reason: SkipReason },

    /// The solenoid completed an ON-hold-OFF pulse.
    SolenoidPulsed { held: Duration },

    /// A loop observed the stop signal and exited.
    LoopStopped(LoopId),

    /// Shutdown finished; `lagging` loops did not acknowledge in time.
    ShutdownComplete { lagging: usize },
}
