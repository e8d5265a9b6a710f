//! Port traits: the hexagonal boundary between the loops and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ acquisition / control loops
//! ```
//!
//! Driven adapters (sensors, actuators, data log, observers, event sinks,
//! config storage) implement these traits.  The loops hold them as shared
//! trait objects, so the core never touches hardware directly.
//!
//! ## Concurrency contract
//!
//! Sensor and actuator ports take `&self` and must be `Sync`: the
//! acquisition loop and a control loop may call the same adapter at the
//! same time.  If the underlying bus cannot take concurrent transactions,
//! the adapter serializes them itself.  The core imposes no per-call
//! timeout; adapters must return within a bounded time.

use crate::config::ChamberConfig;
use crate::error::{ActuatorError, ConfigError, SensorError};
use crate::reading::SensorReading;

use super::devices::{DeviceId, Switch};
use super::events::AppEvent;

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → core)
// ───────────────────────────────────────────────────────────────

/// Read-side port: one call per physical quantity.
pub trait SensorPort: Send + Sync {
    /// Number of temperature probes the adapter exposes.
    fn probe_count(&self) -> usize;

    /// Read one temperature probe (°C).
    fn read_temperature(&self, probe: usize) -> Result<f32, SensorError>;

    /// Relative humidity (%).
    fn read_humidity(&self) -> Result<f32, SensorError>;

    /// Oxygen concentration (%).
    fn read_oxygen(&self) -> Result<f32, SensorError>;

    /// CO2 concentration (%).
    fn read_co2(&self) -> Result<f32, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: core → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port.  Only the [`DeviceController`] calls this.
///
/// [`DeviceController`]: super::devices::DeviceController
pub trait ActuatorPort: Send + Sync {
    /// Switch a device on or off.
    fn set_device_state(&self, device: DeviceId, state: Switch) -> Result<(), ActuatorError>;

    /// Set the circulation pump duty cycle (0–100 %).  0 stops the pump.
    fn set_pump_speed(&self, percent: u8) -> Result<(), ActuatorError>;
}

// ───────────────────────────────────────────────────────────────
// Broadcaster port (core → observers)
// ───────────────────────────────────────────────────────────────

/// Fan-out of each reading to whoever is attached right now.
///
/// Fire-and-forget: a slow or vanished observer must never block or
/// fail the acquisition loop.
pub trait Broadcaster: Send + Sync {
    fn publish(&self, reading: &SensorReading);
}

// ───────────────────────────────────────────────────────────────
// Persistence port (core → durable history)
// ───────────────────────────────────────────────────────────────

/// Append-only history.  Owned by the acquisition loop alone.
pub trait Persistence: Send {
    /// Append one record.  Field order is fixed:
    /// `timestamp, co2, o2, temperature_1..5, humidity`.
    fn append(&mut self, reading: &SensorReading) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (core → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The loops emit structured [`AppEvent`]s through this port.  Adapters
/// decide where they go (log, metrics, a UI status line).
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (core ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the chamber configuration.
///
/// Implementations MUST validate before persisting.  Invalid ranges are
/// rejected with [`ConfigError::ValidationFailed`], not silently clamped.
pub trait ConfigPort {
    /// Load configuration.
    /// Returns [`ChamberConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<ChamberConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &ChamberConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`Persistence`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Underlying file or device refused the write.
    IoError,
    /// The record could not be encoded.
    Encoding,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::IoError => write!(f, "I/O error"),
            Self::Encoding => write!(f, "encoding error"),
        }
    }
}

impl std::error::Error for StorageError {}
