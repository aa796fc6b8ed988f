//! The breathing-cycle controller.
//!
//! Owns everything one breath needs: the commanded parameters and their
//! per-cycle latches, the two pressure loops, the staged valves, the
//! turbine setpoint, the sliding pressure window, and the safeguard
//! monitor. The cycle driver calls [`compute`](CycleController::compute)
//! once per centisecond tick; within a tick the order is fixed and
//! observable:
//!
//! 1. blower trim update
//! 2. phase update
//! 3. sub-phase action (PID + valve staging), gated by the vigilance flag
//! 4. plateau estimation (inside the exhale action)
//! 5. safeguards, against the phase assigned in step 2
//! 6. `execute()` on both valves
//!
//! Reordering these is a functional bug: the safeguards must see the fresh
//! pressure against the fresh phase, and the valves must move exactly once.

use log::{debug, info};

use crate::actuators::{Blower, PressureValve};
use crate::app::ports::{ActuatorPort, AlarmSink};
use crate::config::VentilationConfig;
use crate::control::pid::PressurePid;
use crate::cycle::plateau::{PlateauEstimator, PressureWindow};
use crate::cycle::{ExhalationStep, InhalationStep, Phase};
use crate::safety::SafeguardMonitor;

/// One keypress on a pressure setting: 1 cmH₂O.
const PRESSURE_STEP: i32 = 10;

pub struct CycleController {
    config: VentilationConfig,

    // ── Commanded parameters (operator-facing) ───────────────
    cycles_per_minute_command: i32,
    min_peep_command: i32,
    max_plateau_pressure_command: i32,
    max_peak_pressure_command: i32,

    // ── Per-cycle latches ────────────────────────────────────
    // Captured at cycle start so mid-cycle edits leave the breath in
    // progress untouched.
    cycles_per_minute: i32,
    min_peep: i32,
    max_plateau_pressure: i32,

    // ── Derived timing (centiseconds) ────────────────────────
    centi_sec_per_cycle: u16,
    centi_sec_per_inhalation: u16,

    // ── Measured state (mmH₂O) ───────────────────────────────
    pressure: i32,
    peak_pressure: i32,
    plateau_pressure: i32,
    peep: i32,
    /// Setpoint handed to whichever pressure loop the sub-phase runs.
    pressure_command: i32,

    // ── Phase state ──────────────────────────────────────────
    phase: Phase,
    /// Reserved inhibition hook: while engaged, the sub-phase action is
    /// skipped (valves keep their staged commands) but safeguards and the
    /// commit step still run. Cleared by every sub-phase entry. No core
    /// code path engages it.
    vigilance: bool,

    // ── Control loops ────────────────────────────────────────
    blower_pid: PressurePid,
    patient_pid: PressurePid,
    /// Measured microseconds between the last two compute calls.
    dt_us: i32,

    // ── Plateau estimation ───────────────────────────────────
    window: PressureWindow,
    plateau_estimator: PlateauEstimator,

    // ── Actuators ────────────────────────────────────────────
    blower_valve: PressureValve,
    patient_valve: PressureValve,
    blower: Blower,
    /// Pending turbine adjustment, applied and zeroed at next cycle start.
    blower_increment: i32,

    // ── Safeguards ───────────────────────────────────────────
    safeguards: SafeguardMonitor,

    cycle_number: u32,
}

impl CycleController {
    /// A fresh controller, born in the safe state: both valves staged
    /// closed, measured state zeroed, commands at their configured
    /// defaults. `config` must have passed
    /// [`validate`](VentilationConfig::validate).
    pub fn new(config: VentilationConfig) -> Self {
        let mut controller = Self {
            cycles_per_minute_command: config.initial_cycles_per_minute,
            min_peep_command: config.default_min_peep,
            max_plateau_pressure_command: config.default_max_plateau,
            max_peak_pressure_command: config.default_max_peak,

            cycles_per_minute: config.initial_cycles_per_minute,
            min_peep: config.default_min_peep,
            max_plateau_pressure: config.default_max_plateau,

            centi_sec_per_cycle: 0,
            centi_sec_per_inhalation: 0,

            pressure: 0,
            peak_pressure: 0,
            plateau_pressure: 0,
            peep: 0,
            pressure_command: 0,

            phase: Phase::Inhalation(InhalationStep::Inspiration),
            vigilance: false,

            blower_pid: PressurePid::new(config.pid_blower),
            patient_pid: PressurePid::new(config.pid_patient),
            dt_us: 0,

            window: PressureWindow::new(config.max_pressure_samples),
            plateau_estimator: PlateauEstimator::new(),

            blower_valve: PressureValve::new(config.min_aperture, config.max_aperture),
            patient_valve: PressureValve::new(config.min_aperture, config.max_aperture),
            blower: Blower::new(
                config.min_blower_speed,
                config.max_blower_speed,
                config.default_blower_speed,
            ),
            blower_increment: 0,

            safeguards: SafeguardMonitor::new(&config),

            cycle_number: 0,

            config,
        };
        controller.compute_centi_sec_parameters();
        controller
    }

    /// Commit the safe state to hardware before ventilation starts.
    pub fn setup(&mut self, hw: &mut impl ActuatorPort) {
        self.blower_valve.close();
        self.patient_valve.close();
        self.execute_commands(hw);

        self.peak_pressure = 0;
        self.plateau_pressure = 0;
        self.peep = 0;
        self.cycle_number = 0;
    }

    // ── Cycle lifecycle ───────────────────────────────────────

    /// Begin a new respiratory cycle: latch the commanded parameters,
    /// derive this cycle's timing, reset the loops and the pressure
    /// window, and apply the turbine trim accumulated last cycle.
    pub fn init_respiratory_cycle(&mut self, hw: &mut impl ActuatorPort) {
        self.set_phase(Phase::Inhalation(InhalationStep::Inspiration));
        self.cycle_number = self.cycle_number.wrapping_add(1);
        self.plateau_pressure = 0;
        self.peak_pressure = 0;

        self.blower_pid.reset();
        self.patient_pid.reset();

        self.cycles_per_minute = self.cycles_per_minute_command;
        self.min_peep = self.min_peep_command;
        self.max_plateau_pressure = self.max_plateau_pressure_command;
        self.compute_centi_sec_parameters();

        let step = self.blower_increment.clamp(
            -self.config.max_blower_increment,
            self.config.max_blower_increment,
        );
        self.blower.run_speed(self.blower.speed() + step);
        hw.set_blower_speed(self.blower.speed());
        self.blower_increment = 0;

        self.window.reset();
        self.plateau_estimator.reset();

        info!(
            "cycle {} start: {} cpm ({} cs, inhalation {} cs), blower {}",
            self.cycle_number,
            self.cycles_per_minute,
            self.centi_sec_per_cycle,
            self.centi_sec_per_inhalation,
            self.blower.speed(),
        );
    }

    /// Close out a cycle: run the cycle-level safeguard, then converge the
    /// peak command toward whatever produces the commanded plateau.
    ///
    /// The peak trim only runs when no turbine correction is pending: a
    /// blower that is already being re-trimmed would double-correct.
    pub fn end_respiratory_cycle(&mut self, alarms: &mut impl AlarmSink) {
        self.safeguards.end_of_cycle(
            self.plateau_pressure,
            self.max_plateau_pressure_command,
            self.cycle_number,
            alarms,
        );

        if self.blower_increment == 0 {
            let command = self.max_plateau_pressure_command;
            if self.plateau_pressure > command * 105 / 100 {
                let trim = ((self.plateau_pressure - command) * 2 / 10)
                    .min(self.config.max_peak_increment);
                self.on_peak_pressure_decrease(trim);
            } else if self.plateau_pressure < command * 95 / 100 {
                let trim = ((command - self.plateau_pressure) * 2 / 10)
                    .min(self.config.max_peak_increment);
                self.on_peak_pressure_increase(trim);
            }
        }

        info!(
            "cycle {} end: peak {} plateau {} peep {} (peak command now {})",
            self.cycle_number,
            self.peak_pressure,
            self.plateau_pressure,
            self.peep,
            self.max_peak_pressure_command,
        );
    }

    // ── Per-tick inputs ───────────────────────────────────────

    /// Record the tick's pressure sample and feed the sliding window.
    pub fn update_pressure(&mut self, pressure: i32) {
        self.pressure = pressure;
        self.window.push(pressure);
    }

    /// Record the measured microseconds since the previous compute call.
    pub fn update_dt(&mut self, dt_us: i32) {
        self.dt_us = dt_us;
    }

    // ── The tick ──────────────────────────────────────────────

    /// Advance the cycle by one centisecond tick.
    pub fn compute(&mut self, tick: u16, hw: &mut impl ActuatorPort, alarms: &mut impl AlarmSink) {
        self.update_blower_trim(tick);
        self.update_phase(tick);

        if !self.vigilance {
            match self.phase {
                Phase::Inhalation(InhalationStep::Inspiration) => self.inhale(),
                Phase::Inhalation(InhalationStep::HoldInspiration) => self.hold_inspiration(),
                Phase::Exhalation(ExhalationStep::Exhale) => {
                    self.exhale();
                    // The window still holds the hold-phase samples here;
                    // the estimate freezes once the exhale drains them out.
                    self.compute_plateau(tick);
                }
                Phase::Exhalation(ExhalationStep::HoldExhale) => self.hold_exhalation(),
            }
        }

        self.safeguards.per_tick(
            self.pressure,
            self.phase,
            self.min_peep_command,
            self.cycle_number,
            alarms,
        );

        self.execute_commands(hw);
    }

    /// Keep the machine inert while the activation switch is off: turbine
    /// idle, both valves closed, breathing alarms cleared.
    pub fn halt(&mut self, hw: &mut impl ActuatorPort, alarms: &mut impl AlarmSink) {
        self.blower.stop();
        hw.stop_blower();
        self.blower_valve.close();
        self.patient_valve.close();
        self.execute_commands(hw);
        self.safeguards.clear_all(alarms);
    }

    // ── Operator adjustments ──────────────────────────────────
    // Applied to the commanded parameters immediately, clamped at the
    // keypress; they reach the running cycle at the next cycle start.

    pub fn on_cycle_increase(&mut self) {
        self.cycles_per_minute_command =
            (self.cycles_per_minute_command + 1).min(self.config.max_cycles_per_minute);
    }

    pub fn on_cycle_decrease(&mut self) {
        self.cycles_per_minute_command =
            (self.cycles_per_minute_command - 1).max(self.config.min_cycles_per_minute);
    }

    /// Raise the PEEP command one step. Capped by both the configured PEEP
    /// ceiling and the plateau command, so the command ordering
    /// `peep ≤ plateau ≤ peak` survives any keypress sequence.
    pub fn on_peep_pressure_increase(&mut self) {
        let ceiling = self
            .config
            .max_peep_pressure
            .min(self.max_plateau_pressure_command);
        self.min_peep_command = (self.min_peep_command + PRESSURE_STEP).min(ceiling);
    }

    pub fn on_peep_pressure_decrease(&mut self) {
        self.min_peep_command =
            (self.min_peep_command - PRESSURE_STEP).max(self.config.min_peep_pressure);
    }

    /// Raise the plateau command one step, dragging the peak command with
    /// it so the plateau never overtakes the peak.
    pub fn on_plateau_pressure_increase(&mut self) {
        self.max_plateau_pressure_command =
            (self.max_plateau_pressure_command + PRESSURE_STEP).min(self.config.max_plateau_pressure);
        self.on_peak_pressure_increase(PRESSURE_STEP);
    }

    /// Lower the plateau command one step (never below the PEEP command),
    /// dragging the peak command with it.
    pub fn on_plateau_pressure_decrease(&mut self) {
        let floor = self.config.min_plateau_pressure.max(self.min_peep_command);
        self.max_plateau_pressure_command =
            (self.max_plateau_pressure_command - PRESSURE_STEP).max(floor);
        self.on_peak_pressure_decrease(PRESSURE_STEP);
    }

    /// Raise the peak command by `increment` (keypress step or a trim
    /// computed by [`end_respiratory_cycle`](Self::end_respiratory_cycle)).
    pub fn on_peak_pressure_increase(&mut self, increment: i32) {
        self.max_peak_pressure_command =
            (self.max_peak_pressure_command + increment).min(self.config.max_peak_pressure);
    }

    /// Lower the peak command by `decrement`, never below the plateau
    /// command.
    pub fn on_peak_pressure_decrease(&mut self, decrement: i32) {
        self.max_peak_pressure_command =
            (self.max_peak_pressure_command - decrement).max(self.max_plateau_pressure_command);
    }

    /// Engage or release the sub-phase inhibition hook.
    pub fn set_vigilance(&mut self, engaged: bool) {
        self.vigilance = engaged;
    }

    /// Whether the sub-phase inhibition hook is currently engaged.
    pub fn vigilance(&self) -> bool {
        self.vigilance
    }

    // ── Display / telemetry accessors ─────────────────────────

    pub fn pressure(&self) -> i32 {
        self.pressure
    }

    pub fn peak_pressure(&self) -> i32 {
        self.peak_pressure
    }

    pub fn plateau_pressure(&self) -> i32 {
        self.plateau_pressure
    }

    pub fn peep(&self) -> i32 {
        self.peep
    }

    pub fn cycles_per_minute_command(&self) -> i32 {
        self.cycles_per_minute_command
    }

    pub fn max_peak_pressure_command(&self) -> i32 {
        self.max_peak_pressure_command
    }

    pub fn max_plateau_pressure_command(&self) -> i32 {
        self.max_plateau_pressure_command
    }

    pub fn min_peep_command(&self) -> i32 {
        self.min_peep_command
    }

    pub fn cycle_number(&self) -> u32 {
        self.cycle_number
    }

    /// The cycles/min latched for the breath in progress.
    pub fn cycles_per_minute(&self) -> i32 {
        self.cycles_per_minute
    }

    /// The PEEP command latched for the breath in progress.
    pub fn min_peep(&self) -> i32 {
        self.min_peep
    }

    /// The plateau command latched for the breath in progress.
    pub fn max_plateau_pressure(&self) -> i32 {
        self.max_plateau_pressure
    }

    pub fn centi_sec_per_cycle(&self) -> u16 {
        self.centi_sec_per_cycle
    }

    pub fn centi_sec_per_inhalation(&self) -> u16 {
        self.centi_sec_per_inhalation
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The setpoint currently handed to the pressure loops.
    pub fn pressure_command(&self) -> i32 {
        self.pressure_command
    }

    /// Pending turbine adjustment for the next cycle start.
    pub fn blower_increment(&self) -> i32 {
        self.blower_increment
    }

    pub fn blower_speed(&self) -> i32 {
        self.blower.speed()
    }

    pub fn blower_valve(&self) -> &PressureValve {
        &self.blower_valve
    }

    pub fn patient_valve(&self) -> &PressureValve {
        &self.patient_valve
    }

    pub fn safeguards(&self) -> &SafeguardMonitor {
        &self.safeguards
    }

    // ── Internal: phase machine ───────────────────────────────

    fn update_phase(&mut self, tick: u16) {
        if tick < self.centi_sec_per_inhalation {
            // Drive toward the peak command for the first 80% of the
            // inhalation, as long as the peak has not been reached. Once
            // either condition fails, hold: the setpoint falls to the
            // plateau command and both valves close.
            if tick < self.centi_sec_per_inhalation * 80 / 100
                && self.pressure < self.max_peak_pressure_command
            {
                if self.phase != Phase::Inhalation(InhalationStep::HoldInspiration) {
                    self.pressure_command = self.max_peak_pressure_command;
                    self.set_phase(Phase::Inhalation(InhalationStep::Inspiration));
                }
            } else {
                self.pressure_command = self.max_plateau_pressure_command;
                self.set_phase(Phase::Inhalation(InhalationStep::HoldInspiration));
            }
        } else {
            self.pressure_command = self.min_peep_command;
            if self.phase != Phase::Exhalation(ExhalationStep::HoldExhale) {
                self.set_phase(Phase::Exhalation(ExhalationStep::Exhale));
            }
        }
    }

    /// Every sub-phase entry releases the vigilance gate.
    fn set_phase(&mut self, phase: Phase) {
        if phase != self.phase {
            debug!("sub-phase {} -> {}", self.phase.label(), phase.label());
        }
        self.phase = phase;
        self.vigilance = false;
    }

    // ── Internal: sub-phase actions ───────────────────────────

    fn inhale(&mut self) {
        let aperture =
            self.blower_valve_aperture(self.pressure_command, self.pressure, self.dt_us);
        self.blower_valve.open(aperture);
        self.patient_valve.close();

        self.peak_pressure = self.peak_pressure.max(self.pressure);
    }

    fn hold_inspiration(&mut self) {
        self.blower_valve.close();
        self.patient_valve.close();

        self.peak_pressure = self.peak_pressure.max(self.pressure);
    }

    fn exhale(&mut self) {
        self.blower_valve.close();
        let aperture =
            self.patient_valve_aperture(self.pressure_command, self.pressure, self.dt_us);
        self.patient_valve.open(aperture);

        // PEEP is whatever the airway settles at; the last exhale sample
        // wins.
        self.peep = self.pressure;
    }

    fn hold_exhalation(&mut self) {
        self.blower_valve.close();
        self.patient_valve.close();
    }

    fn compute_plateau(&mut self, tick: u16) {
        if let Some(plateau) =
            self.plateau_estimator
                .evaluate(&self.window, tick, self.centi_sec_per_inhalation)
        {
            self.plateau_pressure = plateau;
        }
    }

    // ── Internal: trims and commits ───────────────────────────

    /// Latch a turbine adjustment intent from this cycle's pressure shape.
    /// Applied at the next cycle start.
    fn update_blower_trim(&mut self, tick: u16) {
        // Turbine too slow: late in the inhalation and the peak never came
        // close to its command.
        if self.phase.is_inhalation()
            && tick > self.centi_sec_per_inhalation * 80 / 100
            && self.peak_pressure < self.max_peak_pressure_command * 95 / 100
        {
            self.blower_increment = 1;
        }

        // Turbine too fast: the peak command was blown through in the
        // opening third of the inhalation.
        if self.phase.is_inhalation()
            && tick < self.centi_sec_per_inhalation * 30 / 100
            && self.peak_pressure > self.max_peak_pressure_command * 105 / 100
        {
            self.blower_increment = -1;
        }
    }

    /// Flush both staged valve commands to hardware.
    fn execute_commands(&mut self, hw: &mut impl ActuatorPort) {
        hw.set_blower_valve(self.blower_valve.execute());
        hw.set_patient_valve(self.patient_valve.execute());
    }

    fn compute_centi_sec_parameters(&mut self) {
        self.centi_sec_per_cycle = (60 * 100 / self.cycles_per_minute) as u16;
        // Inhalation is one third of the breath, exhalation two thirds.
        self.centi_sec_per_inhalation = self.centi_sec_per_cycle / 3;
    }

    // ── Internal: pressure loops ──────────────────────────────

    /// Blower-side loop: a positive command swings the valve toward fully
    /// open (more flow into the circuit).
    fn blower_valve_aperture(&mut self, target: i32, measured: i32, dt_us: i32) -> i32 {
        let command = self.blower_pid.compute(target, measured, dt_us);

        let min_a = i64::from(self.blower_valve.min_aperture());
        let max_a = i64::from(self.blower_valve.max_aperture());
        let aperture = max_a + (min_a - max_a) * i64::from(command) / 1000;
        aperture.clamp(min_a, max_a) as i32
    }

    /// Patient-side loop: the sign is reversed relative to the blower
    /// loop. The two valves sit on opposite sides of the circuit, and a
    /// pressure excess over the (offset) PEEP target must *open* the
    /// patient valve to vent it.
    fn patient_valve_aperture(&mut self, target: i32, measured: i32, dt_us: i32) -> i32 {
        let target = target + self.config.pid_patient_safety_peep_offset;
        let command = self.patient_pid.compute(target, measured, dt_us);

        let min_a = i64::from(self.patient_valve.min_aperture());
        let max_a = i64::from(self.patient_valve.max_aperture());
        let aperture = max_a + (max_a - min_a) * i64::from(command) / 1000;
        aperture.clamp(min_a, max_a) as i32
    }
}
