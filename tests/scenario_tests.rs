//! End-to-end breathing scenarios against scripted pressure traces.
//!
//! These run whole respiratory cycles through the cycle driver on the host
//! and assert on measured state, actuator history and alarm reports.
//! All pressures are mmH₂O; with the default 20 cycles/min a cycle is 300
//! ticks and the inhalation 100.

mod common;

use common::{ActuatorCall, AlarmLog, CountingWatchdog, EventLog, OnFor, TestClock, TestHarness};
use openvent::app::commands::ControlCommand;
use openvent::app::service::CycleDriver;
use openvent::config::VentilationConfig;
use openvent::control::pid::PidSettings;
use openvent::cycle::CycleController;
use openvent::safety::AlarmCode;

/// A well-behaved breath: climb to the plateau command, hold, exhale down
/// to PEEP level.
fn normal_trace() -> Vec<i16> {
    let mut trace = Vec::with_capacity(300);
    for tick in 0..300i32 {
        let p = if tick <= 80 {
            50 + tick * 200 / 80
        } else if tick < 100 {
            250
        } else if tick < 200 {
            250 - 2 * (tick - 100)
        } else {
            50
        };
        trace.push(p as i16);
    }
    trace
}

struct Rig {
    driver: CycleDriver,
    hw: TestHarness,
    alarms: AlarmLog,
    events: EventLog,
    clock: TestClock,
    watchdog: CountingWatchdog,
}

impl Rig {
    fn new(config: VentilationConfig, trace: Vec<i16>) -> Self {
        Self {
            driver: CycleDriver::new(config),
            hw: TestHarness::with_trace(trace),
            alarms: AlarmLog::new(),
            events: EventLog::new(),
            clock: TestClock::default(),
            watchdog: CountingWatchdog::default(),
        }
    }

    fn run_cycles(&mut self, n: u32) {
        let mut switch = OnFor::cycles(n);
        for _ in 0..n {
            self.driver.run_cycle(
                &mut self.hw,
                &mut self.alarms,
                &mut self.events,
                &mut self.clock,
                &mut self.watchdog,
                &mut switch,
            );
        }
    }
}

// ── Scenario: normal cycle converging to the target plateau ───

#[test]
fn normal_cycle_reaches_plateau_and_peep() {
    let mut rig = Rig::new(VentilationConfig::default(), normal_trace());
    rig.run_cycles(1);

    let ctrl = rig.driver.controller();
    assert!(ctrl.peak_pressure() >= 250, "peak {}", ctrl.peak_pressure());
    assert!(
        (240..=260).contains(&ctrl.plateau_pressure()),
        "plateau {}",
        ctrl.plateau_pressure()
    );
    assert_eq!(ctrl.peep(), 50);

    // Plateau landed inside its ±20% band.
    assert_eq!(
        rig.alarms.last_state(AlarmCode::PlateauNotReached),
        Some(false)
    );

    // No pressure-bound or hold alarms anywhere in the cycle.
    assert!(!rig.alarms.ever_detected(AlarmCode::PressureTooHigh));
    assert!(!rig.alarms.ever_detected(AlarmCode::PressureTooLow));
    assert!(!rig.alarms.ever_detected(AlarmCode::PlateauTooHigh));
    assert!(!rig.alarms.ever_detected(AlarmCode::PlateauTooLow));

    // The PEEP band is crossed while pressure falls, then satisfied.
    assert!(rig.alarms.ever_detected(AlarmCode::PeepNotMaintained));
    assert_eq!(
        rig.alarms.last_state(AlarmCode::PeepNotMaintained),
        Some(false)
    );
}

// ── Scenario: peak blows through its ceiling ──────────────────

#[test]
fn early_overshoot_slows_the_blower_next_cycle() {
    // 40 cmH₂O against a 30 cmH₂O peak command for the opening 30 ticks.
    let mut trace = vec![400i16; 30];
    trace.extend(vec![60i16; 270]);

    let mut rig = Rig::new(VentilationConfig::default(), trace);
    rig.run_cycles(1);

    assert_eq!(rig.driver.controller().blower_increment(), -1);
    // Over-pressure alarm reported on each of the 30 hot ticks.
    assert_eq!(rig.alarms.detections(AlarmCode::PressureTooHigh), 30);

    let speed_after_first = rig.driver.controller().blower_speed();
    rig.run_cycles(1);
    assert_eq!(rig.driver.controller().blower_speed(), speed_after_first - 1);
    assert!(rig
        .hw
        .calls
        .contains(&ActuatorCall::BlowerSpeed(speed_after_first - 1)));
}

// ── Scenario: plateau too low ⇒ inter-cycle peak increase ─────

#[test]
fn low_plateau_raises_peak_command_between_cycles() {
    let config = VentilationConfig {
        default_max_plateau: 200,
        default_max_peak: 300,
        ..Default::default()
    };
    assert!(config.validate().is_ok());

    // Climb near the peak command (so no blower trim latches), sag onto a
    // 150 mmH₂O plateau, exhale.
    let mut trace = Vec::with_capacity(300);
    for tick in 0..300i32 {
        let p = if tick <= 40 {
            50 + tick * 6
        } else if tick < 68 {
            290 - 5 * (tick - 40)
        } else if tick < 100 {
            150
        } else {
            (150 - 2 * (tick - 100)).max(50)
        };
        trace.push(p as i16);
    }

    let mut rig = Rig::new(config, trace);
    rig.run_cycles(1);

    let ctrl = rig.driver.controller();
    assert_eq!(ctrl.blower_increment(), 0, "no turbine trim should pend");
    // Measured plateau ≈ 146–150 against a 200 command: trim of 10.
    assert_eq!(ctrl.max_peak_pressure_command(), 310);
    assert_eq!(
        rig.alarms.last_state(AlarmCode::PlateauNotReached),
        Some(true)
    );
}

// ── Scenario: PEEP drift during exhale ────────────────────────

#[test]
fn peep_drift_raises_both_peep_codes_on_either_side() {
    for exhale_pressure in [30i16, 90i16] {
        let config = VentilationConfig {
            default_min_peep: 60,
            ..Default::default()
        };
        let mut trace = vec![250i16; 100];
        trace.extend(vec![exhale_pressure; 200]);

        let mut rig = Rig::new(config, trace);
        rig.run_cycles(1);

        // Reported on every one of the 200 exhale ticks, on both codes.
        assert_eq!(
            rig.alarms.detections(AlarmCode::PeepNotMaintained),
            200,
            "exhale at {exhale_pressure}"
        );
        assert_eq!(
            rig.alarms.detections(AlarmCode::PeepOutOfBounds),
            200,
            "exhale at {exhale_pressure}"
        );
    }
}

// ── Scenario: adjustment while running ────────────────────────

#[test]
fn plateau_adjustment_latches_at_next_cycle_start() {
    let mut rig = Rig::new(VentilationConfig::default(), normal_trace());
    rig.run_cycles(1);

    let latched = rig.driver.controller().max_plateau_pressure();
    rig.driver.handle_command(ControlCommand::PlateauPressureIncrease);
    assert_eq!(
        rig.driver.controller().max_plateau_pressure(),
        latched,
        "running cycle keeps its latched value"
    );
    assert_eq!(
        rig.driver.controller().max_plateau_pressure_command(),
        latched + 10
    );

    rig.run_cycles(1);
    assert_eq!(
        rig.driver.controller().max_plateau_pressure(),
        latched + 10
    );
    let snapshot = rig.events.last_machine_state().expect("snapshot");
    assert_eq!(snapshot.max_plateau_command, latched + 10);
}

// ── Scenario: first-tick derivative guard ─────────────────────

#[test]
fn first_tick_command_is_proportional_only() {
    let config = VentilationConfig {
        pid_blower: PidSettings {
            kp: 1,
            ki: 0,
            kd: 1000,
            integral_min: -1000,
            integral_max: 1000,
        },
        ..Default::default()
    };
    let mut ctrl = CycleController::new(config);
    let mut hw = TestHarness::flat(0, 1);
    let mut alarms = AlarmLog::new();
    ctrl.init_respiratory_cycle(&mut hw);

    // First compute of the cycle: error = 300 − 50 = 250, derivative
    // suppressed by the first-sample marker, so the command is pure Kp and
    // the aperture lands at 125 + (25−125)·250/1000 = 100.
    ctrl.update_pressure(50);
    ctrl.update_dt(10_000);
    ctrl.compute(0, &mut hw, &mut alarms);
    assert_eq!(hw.last_blower_valve(), Some(100));

    // From the second tick on the derivative term participates: the error
    // shrank by 10 over 10 ms, swinging the command negative and the valve
    // to its closed stop.
    ctrl.update_pressure(60);
    ctrl.update_dt(10_000);
    ctrl.compute(1, &mut hw, &mut alarms);
    assert_eq!(hw.last_blower_valve(), Some(125));
}

// ── Boundary: dt = 0 on the first tick ────────────────────────

#[test]
fn zero_dt_first_tick_is_harmless() {
    let mut ctrl = CycleController::new(VentilationConfig::default());
    let mut hw = TestHarness::flat(0, 1);
    let mut alarms = AlarmLog::new();
    ctrl.init_respiratory_cycle(&mut hw);

    ctrl.update_pressure(50);
    ctrl.update_dt(0);
    ctrl.compute(0, &mut hw, &mut alarms);

    let aperture = hw.last_blower_valve().expect("valve commanded");
    assert!((25..=125).contains(&aperture));
}

// ── Boundary: no plateau estimate during inhalation ───────────

#[test]
fn plateau_stays_zero_until_exhale() {
    let mut ctrl = CycleController::new(VentilationConfig::default());
    let mut hw = TestHarness::flat(0, 1);
    let mut alarms = AlarmLog::new();
    ctrl.init_respiratory_cycle(&mut hw);

    let trace = normal_trace();
    for tick in 0..100u16 {
        ctrl.update_pressure(i32::from(trace[usize::from(tick)]));
        ctrl.update_dt(10_000);
        ctrl.compute(tick, &mut hw, &mut alarms);
        assert_eq!(ctrl.plateau_pressure(), 0);
    }
}

// ── Law: replay determinism ───────────────────────────────────

#[test]
fn identical_traces_replay_to_identical_outputs() {
    let run = || {
        let mut rig = Rig::new(VentilationConfig::default(), normal_trace());
        rig.run_cycles(3);
        (rig.hw.calls, rig.alarms.reports)
    };

    let (calls_a, alarms_a) = run();
    let (calls_b, alarms_b) = run();
    assert_eq!(calls_a, calls_b);
    assert_eq!(alarms_a, alarms_b);
}
