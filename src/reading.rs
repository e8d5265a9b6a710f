//! The per-cycle sensor snapshot and its fallback sentinels.
//!
//! A failed field is never missing: it carries a fixed out-of-range
//! sentinel so that every consumer (CSV columns, dashboard) sees the same
//! schema whether the sensor is up or down.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::SensorError;

/// Number of RTD probes in every reading.
pub const TEMPERATURE_PROBES: usize = 5;

/// Substituted for a temperature probe that could not be read.
pub const FALLBACK_TEMPERATURE: f32 = 999.0;
/// Substituted for a failed humidity read.
pub const FALLBACK_HUMIDITY: f32 = -1.0;
/// Substituted for a failed oxygen read.
pub const FALLBACK_OXYGEN: f32 = -1.0;
/// Substituted for a failed CO2 read.
pub const FALLBACK_CO2_PERCENT: f32 = -1.0;

/// Immutable snapshot produced once per acquisition cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Unix seconds at the start of the cycle that produced this reading.
    pub timestamp: u64,
    pub temperatures: [f32; TEMPERATURE_PROBES],
    pub humidity: f32,
    #[serde(rename = "o2")]
    pub oxygen: f32,
    /// CO2 concentration in percent.
    pub co2: f32,
}

impl SensorReading {
    /// The reading emitted when nothing could be read at all.
    pub const fn fallback(timestamp: u64) -> Self {
        Self {
            timestamp,
            temperatures: [FALLBACK_TEMPERATURE; TEMPERATURE_PROBES],
            humidity: FALLBACK_HUMIDITY,
            oxygen: FALLBACK_OXYGEN,
            co2: FALLBACK_CO2_PERCENT,
        }
    }

    /// True when every field carries its sentinel.
    pub fn is_all_fallback(&self) -> bool {
        self.temperatures.iter().all(|t| *t == FALLBACK_TEMPERATURE)
            && self.humidity == FALLBACK_HUMIDITY
            && self.oxygen == FALLBACK_OXYGEN
            && self.co2 == FALLBACK_CO2_PERCENT
    }

    /// Dashboard payload.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Resolve one sensor outcome to a value, substituting `fallback` on error.
///
/// `field` only names the quantity in the warning.
pub fn or_fallback(
    outcome: Result<f32, SensorError>,
    fallback: f32,
    field: impl core::fmt::Display,
) -> f32 {
    match outcome {
        Ok(value) if value.is_finite() => value,
        Ok(value) => {
            warn!("{field}: non-finite reading {value}, using fallback {fallback}");
            fallback
        }
        Err(e) => {
            warn!("{field}: {e}, using fallback {fallback}");
            fallback
        }
    }
}
