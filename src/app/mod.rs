//! Application core: loop orchestration and device state.
//!
//! This module holds the port traits, the device controller shared by the
//! control loops, the outbound event vocabulary, and the service that
//! wires the three loops together.  All interaction with hardware happens
//! through the traits in [`ports`], keeping this layer fully testable
//! without real peripherals.

pub mod devices;
pub mod events;
pub mod ports;
pub mod service;
