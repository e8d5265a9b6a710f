//! Full service lifecycle on real threads and short periods.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chamber::adapters::datalog::{CsvDataLog, HEADER};
use chamber::adapters::sim::SimulatedChamber;
use chamber::app::devices::{DeviceId, Switch};
use chamber::app::events::{AppEvent, LoopId};
use chamber::app::service::ChamberService;
use chamber::config::{ChamberConfig, Thresholds};
use chamber::error::ConfigError;
use chamber::scheduler::SystemClock;

use crate::mock_hw::{ActuatorCall, MemoryLog, MockChamber, RecordingSink, SlowProbe};

fn fast_config() -> ChamberConfig {
    ChamberConfig {
        acquisition_interval_ms: 20,
        temp_control_interval_ms: 20,
        co2_control_interval_ms: 50,
        solenoid_on_time_ms: 5,
        shutdown_timeout_ms: 1_000,
        ..ChamberConfig::default()
    }
}

struct Rig {
    chamber: Arc<MockChamber>,
    log: MemoryLog,
    sink: Arc<RecordingSink>,
    service: ChamberService,
}

fn rig_with(config: ChamberConfig, temperature: f32, co2: f32) -> Rig {
    let clock = Arc::new(SystemClock::new());
    let chamber = Arc::new(MockChamber::on_clock(clock.clone(), temperature, co2));
    let log = MemoryLog::default();
    let sink = Arc::new(RecordingSink::default());
    let service = ChamberService::new(
        config,
        chamber.clone(),
        chamber.clone(),
        Box::new(log.clone()),
        clock,
        sink.clone(),
    )
    .unwrap();
    Rig {
        chamber,
        log,
        sink,
        service,
    }
}

/// Steady chamber: temperature inside the band, CO2 at threshold.
fn rig() -> Rig {
    rig_with(fast_config(), 37.0, 5.0)
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[derive(Debug, PartialEq)]
enum Cmd {
    Set(DeviceId, Switch),
    Pump(u8),
}

fn untimed(calls: Vec<ActuatorCall>) -> Vec<Cmd> {
    calls
        .into_iter()
        .map(|c| match c {
            ActuatorCall::Set { device, state, .. } => Cmd::Set(device, state),
            ActuatorCall::Pump { percent, .. } => Cmd::Pump(percent),
        })
        .collect()
}

// ── Lifecycle ─────────────────────────────────────────────────

#[test]
fn start_and_shutdown_drive_devices_in_order() {
    let mut rig = rig();
    rig.service.start().unwrap();
    assert!(rig.service.is_running());

    assert_eq!(
        untimed(rig.chamber.calls()),
        vec![
            Cmd::Set(DeviceId::Heater, Switch::Off),
            Cmd::Set(DeviceId::Co2Solenoid, Switch::Off),
            Cmd::Pump(75),
        ]
    );
    assert!(wait_until(Duration::from_secs(2), || rig.log.rows.lock().unwrap().len() >= 3));

    let report = rig.service.shutdown();
    assert_eq!(report.stopped.len(), 3);
    assert!(report.lagging.is_empty());
    assert!(!rig.service.is_running());

    let calls = untimed(rig.chamber.calls());
    assert_eq!(
        calls[calls.len() - 3..],
        [
            Cmd::Set(DeviceId::Heater, Switch::Off),
            Cmd::Set(DeviceId::Co2Solenoid, Switch::Off),
            Cmd::Pump(0),
        ]
    );
}

#[test]
fn shutdown_is_idempotent() {
    let mut rig = rig();
    rig.service.start().unwrap();

    rig.service.shutdown();
    let writes_after_first = rig.chamber.calls().len();
    let second = rig.service.shutdown();

    assert!(second.stopped.is_empty() && second.lagging.is_empty());
    assert_eq!(rig.chamber.calls().len(), writes_after_first);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::ShutdownComplete { .. })), 1);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::LoopStopped(_))), 3);
}

#[test]
fn no_reading_is_produced_after_shutdown() {
    let mut rig = rig();
    rig.service.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || rig.service.latest().is_some()));

    rig.service.shutdown();
    let rows = rig.log.rows.lock().unwrap().len();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(rig.log.rows.lock().unwrap().len(), rows);
}

#[test]
fn starting_twice_is_rejected() {
    let mut rig = rig();
    rig.service.start().unwrap();
    assert!(rig.service.start().is_err());
    rig.service.shutdown();
    assert!(rig.service.start().is_err(), "a stopped service cannot restart");
}

#[test]
fn invalid_config_is_rejected_before_start() {
    let mut config = fast_config();
    config.thresholds.temp_lower = 38.0;
    config.thresholds.temp_upper = 37.0;
    let clock = Arc::new(SystemClock::new());
    let chamber = Arc::new(MockChamber::on_clock(clock.clone(), 37.0, 5.0));

    let result = ChamberService::new(
        config,
        chamber.clone(),
        chamber.clone(),
        Box::new(MemoryLog::default()),
        clock,
        Arc::new(RecordingSink::default()),
    );

    assert!(matches!(result, Err(ConfigError::ValidationFailed(_))));
    assert!(chamber.calls().is_empty());
}

#[test]
fn lagging_loop_is_reported_and_devices_still_go_off() {
    let config = ChamberConfig {
        shutdown_timeout_ms: 100,
        ..fast_config()
    };
    let mut rig = rig_with(config, 37.0, 5.0);
    rig.chamber.with(|s| s.read_block = Duration::from_millis(600));
    rig.service.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let report = rig.service.shutdown();

    assert_eq!(report.lagging, vec![LoopId::Acquisition]);
    assert_eq!(report.stopped.len(), 2);
    let calls = untimed(rig.chamber.calls());
    assert_eq!(calls.last(), Some(&Cmd::Pump(0)));
    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::ShutdownComplete { lagging: 1 })),
        1
    );
}

#[test]
fn lagging_heater_loop_cannot_switch_the_heater_back_on() {
    let config = ChamberConfig {
        shutdown_timeout_ms: 100,
        ..fast_config()
    };
    // Cold chamber: every completed heater cycle wants the heater on.
    let mut rig = rig_with(config, 30.0, 5.0);
    rig.chamber.with(|s| {
        s.slow_probe = Some(SlowProbe {
            probe: 2,
            thread: LoopId::TemperatureControl.as_str(),
            block: Duration::from_millis(400),
        })
    });
    rig.service.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let report = rig.service.shutdown();
    assert_eq!(report.lagging, vec![LoopId::TemperatureControl]);

    // Let the detached loop finish its read and try to act on it.
    std::thread::sleep(Duration::from_millis(600));

    let heater: Vec<Switch> = rig
        .chamber
        .writes(DeviceId::Heater)
        .into_iter()
        .map(|w| w.0)
        .collect();
    assert_eq!(heater, vec![Switch::Off, Switch::Off], "start and shutdown only");
    assert_eq!(rig.service.devices().switch(DeviceId::Heater), Switch::Off);
    assert!(rig.service.devices().is_sealed());
}

#[test]
fn dropping_a_running_service_turns_everything_off() {
    let rig = rig();
    let Rig {
        chamber,
        mut service,
        ..
    } = rig;
    service.start().unwrap();
    drop(service);

    let calls = untimed(chamber.calls());
    assert_eq!(calls.last(), Some(&Cmd::Pump(0)));
}

// ── Observers ─────────────────────────────────────────────────

#[test]
fn late_observer_gets_history_then_every_live_reading_once() {
    let mut rig = rig();
    rig.chamber.with(|s| s.count_humidity = true);
    rig.service.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || rig.service.history().len() >= 3));

    let rx = rig.service.attach_observer();
    std::thread::sleep(Duration::from_millis(150));
    rig.service.shutdown();

    let received: Vec<f32> = rx.try_iter().map(|r| r.humidity).collect();
    assert!(received.len() >= 4, "got {received:?}");
    assert!(
        received.windows(2).all(|w| w[1] == w[0] + 1.0),
        "duplicate or missing reading in {received:?}"
    );
    assert_eq!(received.last().copied(), rig.service.latest().map(|r| r.humidity));
}

#[test]
fn observer_attached_after_shutdown_sees_full_history() {
    let mut rig = rig();
    rig.service.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || rig.service.history().len() >= 2));
    rig.service.shutdown();

    let replay: Vec<_> = rig.service.attach_observer().try_iter().collect();
    assert_eq!(replay, rig.service.history());
}

// ── Control through the service ───────────────────────────────

#[test]
fn threshold_update_reaches_the_running_heater_loop() {
    let mut rig = rig();
    rig.service.start().unwrap();
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(rig.service.devices().switch(DeviceId::Heater), Switch::Off);

    rig.service
        .thresholds()
        .update(Thresholds {
            temp_lower: 37.5,
            temp_upper: 38.0,
            ..Thresholds::default()
        })
        .unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        rig.service.devices().switch(DeviceId::Heater) == Switch::On
    }));
    rig.service.shutdown();
    assert_eq!(rig.service.devices().switch(DeviceId::Heater), Switch::Off);
}

#[test]
fn low_co2_is_dosed_while_running() {
    let mut rig = rig_with(fast_config(), 37.0, 2.0);
    rig.service.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        rig.sink.count(|e| matches!(e, AppEvent::SolenoidPulsed { .. })) >= 2
    }));
    rig.service.shutdown();

    let writes = rig.chamber.writes(DeviceId::Co2Solenoid);
    // Skip the forced OFF at start; then strictly alternating ON/OFF pairs.
    for pair in writes[1..].chunks(2) {
        if let [(Switch::On, opened), (Switch::Off, closed)] = pair {
            assert!(*closed - *opened >= Duration::from_millis(5));
        }
    }
    assert_eq!(writes.last().map(|w| w.0), Some(Switch::Off));
}

// ── End to end ────────────────────────────────────────────────

#[test]
fn simulated_chamber_is_heated_dosed_and_logged() {
    let path = std::env::temp_dir().join(format!("chamber-e2e-{}.csv", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let clock = Arc::new(SystemClock::new());
    let sim = Arc::new(SimulatedChamber::new(clock.clone(), 35.0, 3.0));
    let sink = Arc::new(RecordingSink::default());
    let mut service = ChamberService::new(
        fast_config(),
        sim.clone(),
        sim.clone(),
        Box::new(CsvDataLog::open(&path).unwrap()),
        clock,
        sink.clone(),
    )
    .unwrap();
    service.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || sim.heater_on()));
    assert!(wait_until(Duration::from_secs(2), || {
        sink.count(|e| matches!(e, AppEvent::SolenoidPulsed { .. })) >= 1
    }));
    assert_eq!(sim.pump_duty(), 75);
    service.shutdown();

    assert!(!sim.heater_on());
    assert_eq!(sim.pump_duty(), 0);
    let text = std::fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some(HEADER.join(",").as_str()));
    let rows = lines.count();
    assert!(rows >= 1 && rows >= service.history().len());
    let _ = std::fs::remove_file(&path);
}
