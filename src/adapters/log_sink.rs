//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events
//! through the `log` facade, so whatever logger the binary installs
//! decides where they end up.

use log::{debug, error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&self, event: &AppEvent) {
        match event {
            AppEvent::Started => info!("START | devices initialised, loops running"),
            AppEvent::Reading(r) => {
                let t = &r.temperatures;
                debug!(
                    "READ  | ts={} | T=[{:.2} {:.2} {:.2} {:.2} {:.2}]\u{00b0}C | \
                     RH={:.1}% | O2={:.2}% | CO2={:.2}%",
                    r.timestamp, t[0], t[1], t[2], t[3], t[4], r.humidity, r.oxygen, r.co2,
                );
            }
            AppEvent::CycleFailed(loop_id) => {
                error!("CYCLE | {} failed, fallback reading substituted", loop_id);
            }
            AppEvent::CycleOverrun { loop_id, elapsed } => {
                warn!("CYCLE | {} overran: {} ms", loop_id, elapsed.as_millis());
            }
            AppEvent::DeviceSwitched { device, state } => {
                info!("DEV   | {} -> {}", device, state);
            }
            AppEvent::ActuationFailed { device, error } => {
                error!("DEV   | {} write failed: {}", device, error);
            }
            AppEvent::ControlSkipped { loop_id, reason } => {
                debug!("SKIP  | {}: {:?}", loop_id, reason);
            }
            AppEvent::SolenoidPulsed { held } => {
                info!("DOSE  | co2-solenoid pulsed for {} ms", held.as_millis());
            }
            AppEvent::LoopStopped(loop_id) => info!("STOP  | {} loop exited", loop_id),
            AppEvent::ShutdownComplete { lagging } => {
                if *lagging == 0 {
                    info!("STOP  | shutdown complete");
                } else {
                    warn!("STOP  | shutdown complete, {} loop(s) still running", lagging);
                }
            }
        }
    }
}
