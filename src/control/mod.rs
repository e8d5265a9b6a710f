//! Closed-loop control: heater hysteresis and pulsed CO2 dosing.
//!
//! Each controller is split into a pure `decide` function (thresholds in,
//! decision out) and a controller struct that reads the sensors, applies
//! the decision through the shared [`DeviceController`] and reports
//! through the [`EventSink`].  Thresholds are re-read every cycle.
//!
//! [`DeviceController`]: crate::app::devices::DeviceController
//! [`EventSink`]: crate::app::ports::EventSink

pub mod co2;
pub mod heater;

/// Round to two decimal places (0.01 resolution of the displayed values).
pub fn round_centi(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}
