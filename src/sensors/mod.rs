//! Sensor subsystem: drivers plus the helpers that turn a [`SensorPort`]
//! into a complete [`SensorReading`].
//!
//! Every helper here is total.  A failed or absent sensor becomes its
//! fallback sentinel and a warning; nothing propagates to the caller.

pub mod co2_serial;

use log::warn;

use crate::app::ports::SensorPort;
use crate::reading::{
    or_fallback, SensorReading, FALLBACK_CO2_PERCENT, FALLBACK_HUMIDITY,
    FALLBACK_OXYGEN, FALLBACK_TEMPERATURE, TEMPERATURE_PROBES,
};

/// Read every temperature probe, fitted to exactly [`TEMPERATURE_PROBES`]
/// values.
pub fn read_temperatures(sensors: &dyn SensorPort) -> [f32; TEMPERATURE_PROBES] {
    let count = sensors.probe_count();
    if count != TEMPERATURE_PROBES {
        warn!(
            "Expected {} temperature probes, adapter reports {}; {}",
            TEMPERATURE_PROBES,
            count,
            if count < TEMPERATURE_PROBES { "padding with fallback" } else { "ignoring extras" }
        );
    }
    let mut values = [FALLBACK_TEMPERATURE; TEMPERATURE_PROBES];
    let readable = count.min(TEMPERATURE_PROBES);
    for (probe, slot) in values.iter_mut().enumerate().take(readable) {
        *slot = or_fallback(
            sensors.read_temperature(probe),
            FALLBACK_TEMPERATURE,
            format_args!("temperature probe {}", probe + 1),
        );
    }
    values
}

/// Read the CO2 concentration (%), or its fallback.
pub fn read_co2(sensors: &dyn SensorPort) -> f32 {
    or_fallback(sensors.read_co2(), FALLBACK_CO2_PERCENT, "co2")
}

/// One full sweep of every sensor.
pub fn read_all(sensors: &dyn SensorPort, timestamp: u64) -> SensorReading {
    SensorReading {
        timestamp,
        temperatures: read_temperatures(sensors),
        humidity: or_fallback(sensors.read_humidity(), FALLBACK_HUMIDITY, "humidity"),
        oxygen: or_fallback(sensors.read_oxygen(), FALLBACK_OXYGEN, "oxygen"),
        co2: read_co2(sensors),
    }
}
