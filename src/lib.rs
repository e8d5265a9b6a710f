//! Environmental chamber core library.
//!
//! Sensor acquisition, replay history and threshold control for an
//! incubation chamber.  Hardware, storage and observers sit behind the
//! port traits in [`app::ports`]; everything else is plain logic that
//! the integration tests drive with mock adapters and virtual time.

#![deny(unused_must_use)]

pub mod acquisition;
pub mod adapters;
pub mod app;
pub mod buffer;
pub mod config;
pub mod control;
pub mod drivers;
pub mod error;
pub mod reading;
pub mod scheduler;
pub mod sensors;
