//! Chamber configuration parameters
//!
//! All tunable parameters for the acquisition and control loops.
//! Values are loaded once at startup through a [`ConfigPort`]; the
//! threshold subset can be hot-reloaded through [`SharedThresholds`].
//!
//! [`ConfigPort`]: crate::app::ports::ConfigPort

use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::buffer::MAX_BUFFER_CAPACITY;
use crate::error::ConfigError;

/// Control thresholds.  Read fresh by every control cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Heater turns ON below this average temperature (°C)
    pub temp_lower: f32,
    /// Heater turns OFF above this average temperature (°C)
    pub temp_upper: f32,
    /// Solenoid doses only while CO2 (%) is below this value
    pub co2_threshold: f32,
    /// Oxygen reference (%).  Informational, no O2 actuator exists.
    pub o2_threshold: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            temp_lower: 36.9,
            temp_upper: 37.1,
            co2_threshold: 5.0,
            o2_threshold: 21.0,
        }
    }
}

impl Thresholds {
    /// Range-check the thresholds.  Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.temp_lower.is_finite() || !self.temp_upper.is_finite() {
            return Err(ConfigError::ValidationFailed("temperature bounds must be finite"));
        }
        if self.temp_lower >= self.temp_upper {
            return Err(ConfigError::ValidationFailed("temp_lower must be below temp_upper"));
        }
        if !self.co2_threshold.is_finite() || self.co2_threshold <= 0.0 {
            return Err(ConfigError::ValidationFailed("co2_threshold must be positive"));
        }
        if !(0.0..=100.0).contains(&self.o2_threshold) {
            return Err(ConfigError::ValidationFailed("o2_threshold must be 0-100%"));
        }
        Ok(())
    }
}

/// Core chamber configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChamberConfig {
    // --- Thresholds ---
    pub thresholds: Thresholds,

    // --- Timing ---
    /// Acquisition period (milliseconds)
    pub acquisition_interval_ms: u32,
    /// Temperature control period (milliseconds)
    pub temp_control_interval_ms: u32,
    /// CO2 control period (milliseconds)
    pub co2_control_interval_ms: u32,
    /// How long the CO2 solenoid stays open per dose (milliseconds)
    pub solenoid_on_time_ms: u32,
    /// Upper bound on waiting for the loops to stop (milliseconds)
    pub shutdown_timeout_ms: u32,

    // --- History ---
    /// Readings kept for replay to late-joining observers
    pub buffer_capacity: usize,

    // --- CO2 calibration ---
    /// Readings at or below this value (%) are treated as sensor noise
    pub co2_dead_band_percent: f32,
    /// Raw serial units are multiplied by this before conversion to ppm
    pub co2_raw_multiplier: f32,

    // --- Pump ---
    /// Circulation pump duty applied at startup (0-100%)
    pub pump_duty_percent: u8,
}

impl Default for ChamberConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),

            // Timing
            acquisition_interval_ms: 1_000,   // 1 Hz
            temp_control_interval_ms: 10_000, // every 10 s
            co2_control_interval_ms: 30_000,  // every 30 s
            solenoid_on_time_ms: 100,
            shutdown_timeout_ms: 2_000,

            // History
            buffer_capacity: 20,

            // CO2 calibration
            co2_dead_band_percent: 0.01,
            co2_raw_multiplier: 10.0,

            // Pump
            pump_duty_percent: 75,
        }
    }
}

impl ChamberConfig {
    /// Range-check every field.  Rejects rather than clamps.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;

        if self.acquisition_interval_ms == 0
            || self.temp_control_interval_ms == 0
            || self.co2_control_interval_ms == 0
        {
            return Err(ConfigError::ValidationFailed("loop intervals must be non-zero"));
        }
        if self.solenoid_on_time_ms == 0 {
            return Err(ConfigError::ValidationFailed("solenoid_on_time_ms must be non-zero"));
        }
        if self.solenoid_on_time_ms >= self.co2_control_interval_ms {
            return Err(ConfigError::ValidationFailed(
                "solenoid_on_time_ms must be shorter than the CO2 control interval",
            ));
        }
        if self.buffer_capacity == 0 || self.buffer_capacity > MAX_BUFFER_CAPACITY {
            return Err(ConfigError::ValidationFailed("buffer_capacity out of range"));
        }
        if !self.co2_dead_band_percent.is_finite() || self.co2_dead_band_percent < 0.0 {
            return Err(ConfigError::ValidationFailed("co2_dead_band_percent must be >= 0"));
        }
        if self.co2_dead_band_percent >= self.thresholds.co2_threshold {
            return Err(ConfigError::ValidationFailed(
                "co2_dead_band_percent must be below co2_threshold",
            ));
        }
        if !self.co2_raw_multiplier.is_finite() || self.co2_raw_multiplier <= 0.0 {
            return Err(ConfigError::ValidationFailed("co2_raw_multiplier must be positive"));
        }
        if self.pump_duty_percent > 100 {
            return Err(ConfigError::ValidationFailed("pump_duty_percent must be 0-100"));
        }
        Ok(())
    }

    pub fn acquisition_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.acquisition_interval_ms))
    }

    pub fn temp_control_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.temp_control_interval_ms))
    }

    pub fn co2_control_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.co2_control_interval_ms))
    }

    pub fn solenoid_on_time(&self) -> Duration {
        Duration::from_millis(u64::from(self.solenoid_on_time_ms))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.shutdown_timeout_ms))
    }
}

// ───────────────────────────────────────────────────────────────
// Hot-reloadable thresholds
// ───────────────────────────────────────────────────────────────

/// Shared handle to the live thresholds.
///
/// Control loops call [`current`](Self::current) once per cycle and never
/// hold on to the value across cycles, so an [`update`](Self::update) from
/// the web layer takes effect on the next tick of each loop.
///
/// The CO2 dead band is fixed at construction; an update whose CO2
/// threshold does not clear it is rejected.
#[derive(Debug, Clone)]
pub struct SharedThresholds {
    inner: Arc<RwLock<Thresholds>>,
    co2_dead_band: f32,
}

impl SharedThresholds {
    /// Thresholds checked against the default CO2 dead band.
    pub fn new(thresholds: Thresholds) -> Self {
        Self::with_dead_band(thresholds, ChamberConfig::default().co2_dead_band_percent)
    }

    /// Thresholds and dead band taken from a validated config.
    pub fn from_config(config: &ChamberConfig) -> Self {
        Self::with_dead_band(config.thresholds, config.co2_dead_band_percent)
    }

    fn with_dead_band(thresholds: Thresholds, co2_dead_band: f32) -> Self {
        Self {
            inner: Arc::new(RwLock::new(thresholds)),
            co2_dead_band,
        }
    }

    /// Copy of the thresholds as they are right now.
    pub fn current(&self) -> Thresholds {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Validate and swap in new thresholds.
    pub fn update(&self, thresholds: Thresholds) -> Result<(), ConfigError> {
        thresholds.validate()?;
        if thresholds.co2_threshold <= self.co2_dead_band {
            return Err(ConfigError::ValidationFailed(
                "co2_threshold must be above co2_dead_band_percent",
            ));
        }
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = thresholds;
        info!(
            "Thresholds updated: temp=[{:.2}, {:.2}]C co2<{:.2}% o2={:.1}%",
            thresholds.temp_lower,
            thresholds.temp_upper,
            thresholds.co2_threshold,
            thresholds.o2_threshold
        );
        Ok(())
    }
}
