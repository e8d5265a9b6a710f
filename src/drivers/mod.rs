//! Actuator drivers over `embedded-hal` output traits.

pub mod pump;
pub mod relay;
