//! Shared test doubles for the integration tests.
//!
//! Records every actuator call and alarm report so tests can assert on the
//! full command history, and compare two runs byte for byte, without any
//! real hardware.

use openvent::app::events::ControlEvent;
use openvent::app::ports::{
    ActuatorPort, AlarmSink, Clock, ControlSwitch, EventSink, SensorPort, Watchdog,
};
use openvent::safety::AlarmCode;

// ── Scripted sensor + recording actuators ─────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuatorCall {
    BlowerValve(i32),
    PatientValve(i32),
    BlowerSpeed(i32),
    BlowerStop,
}

/// Plays a pressure trace indexed by tick and records every actuator call.
pub struct TestHarness {
    pub trace: Vec<i16>,
    pub calls: Vec<ActuatorCall>,
}

#[allow(dead_code)]
impl TestHarness {
    pub fn with_trace(trace: Vec<i16>) -> Self {
        Self {
            trace,
            calls: Vec::new(),
        }
    }

    /// Constant-pressure harness.
    pub fn flat(pressure: i16, len: usize) -> Self {
        Self::with_trace(vec![pressure; len])
    }

    pub fn last_blower_speed(&self) -> Option<i32> {
        self.calls.iter().rev().find_map(|c| match c {
            ActuatorCall::BlowerSpeed(s) => Some(*s),
            ActuatorCall::BlowerStop => Some(0),
            _ => None,
        })
    }

    pub fn last_blower_valve(&self) -> Option<i32> {
        self.calls.iter().rev().find_map(|c| match c {
            ActuatorCall::BlowerValve(p) => Some(*p),
            _ => None,
        })
    }

    pub fn last_patient_valve(&self) -> Option<i32> {
        self.calls.iter().rev().find_map(|c| match c {
            ActuatorCall::PatientValve(p) => Some(*p),
            _ => None,
        })
    }
}

impl SensorPort for TestHarness {
    fn read_pressure(&mut self, tick: u16) -> i16 {
        let idx = usize::from(tick).min(self.trace.len().saturating_sub(1));
        self.trace[idx]
    }
}

impl ActuatorPort for TestHarness {
    fn set_blower_valve(&mut self, position: i32) {
        self.calls.push(ActuatorCall::BlowerValve(position));
    }

    fn set_patient_valve(&mut self, position: i32) {
        self.calls.push(ActuatorCall::PatientValve(position));
    }

    fn set_blower_speed(&mut self, speed: i32) {
        self.calls.push(ActuatorCall::BlowerSpeed(speed));
    }

    fn stop_blower(&mut self) {
        self.calls.push(ActuatorCall::BlowerStop);
    }
}

// ── Recording alarm sink ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmReport {
    Detected(AlarmCode, u32),
    NotDetected(AlarmCode),
}

#[derive(Debug, Default)]
pub struct AlarmLog {
    pub reports: Vec<AlarmReport>,
}

#[allow(dead_code)]
impl AlarmLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `code` was reported detected.
    pub fn detections(&self, code: AlarmCode) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r, AlarmReport::Detected(c, _) if *c == code))
            .count()
    }

    pub fn ever_detected(&self, code: AlarmCode) -> bool {
        self.detections(code) > 0
    }

    /// The latest report for `code`, if any.
    pub fn last_state(&self, code: AlarmCode) -> Option<bool> {
        self.reports.iter().rev().find_map(|r| match r {
            AlarmReport::Detected(c, _) if *c == code => Some(true),
            AlarmReport::NotDetected(c) if *c == code => Some(false),
            _ => None,
        })
    }
}

impl AlarmSink for AlarmLog {
    fn detected(&mut self, code: AlarmCode, cycle: u32) {
        self.reports.push(AlarmReport::Detected(code, cycle));
    }

    fn not_detected(&mut self, code: AlarmCode) {
        self.reports.push(AlarmReport::NotDetected(code));
    }
}

// ── Event collector ───────────────────────────────────────────

#[derive(Default)]
pub struct EventLog {
    pub events: Vec<ControlEvent>,
}

#[allow(dead_code)]
impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_snapshots(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, ControlEvent::DataSnapshot(_)))
            .count()
    }

    pub fn last_machine_state(&self) -> Option<&openvent::app::events::MachineStateSnapshot> {
        self.events.iter().rev().find_map(|e| match e {
            ControlEvent::MachineStateSnapshot(s) => Some(s),
            _ => None,
        })
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: &ControlEvent) {
        self.events.push(event.clone());
    }
}

// ── Timing ────────────────────────────────────────────────────

/// Advances one millisecond per poll, so every compute period elapses
/// after a fixed number of polls and `dt` is exactly the nominal period.
#[derive(Debug, Default)]
pub struct TestClock {
    now_ms: u64,
}

impl Clock for TestClock {
    fn now_millis(&mut self) -> u64 {
        self.now_ms += 1;
        self.now_ms
    }

    fn now_micros(&mut self) -> u64 {
        self.now_ms * 1000
    }
}

#[derive(Debug, Default)]
pub struct CountingWatchdog {
    pub reloads: u64,
}

impl Watchdog for CountingWatchdog {
    fn reload(&mut self) {
        self.reloads += 1;
    }
}

/// Switch that is on for the first `n` polls.
#[derive(Debug)]
pub struct OnFor {
    left: u32,
}

#[allow(dead_code)]
impl OnFor {
    pub fn cycles(n: u32) -> Self {
        Self { left: n }
    }
}

impl ControlSwitch for OnFor {
    fn is_running(&mut self) -> bool {
        if self.left == 0 {
            return false;
        }
        self.left -= 1;
        true
    }
}
