//! Cycle driver: the outer loop.
//!
//! Owns the [`CycleController`] and runs it one respiratory cycle at a
//! time: polls the millisecond clock, quantizes time into centisecond
//! ticks, feeds the controller its pressure sample and measured `dt`, and
//! sequences `init` / `compute` / `end` around the activation switch.
//!
//! ```text
//!  SensorPort ──▶ ┌──────────────────────────┐ ──▶ AlarmSink
//!                 │       CycleDriver         │ ──▶ EventSink
//! ActuatorPort ◀──│  CycleController          │
//!                 │  phases · PID · safeguards│ ◀── Clock / ControlSwitch
//!                 └──────────────────────────┘ ──▶ Watchdog
//! ```
//!
//! Everything runs on one thread, cooperatively: keyboard, display and
//! alarm-effect work belongs between compute ticks, on the far side of the
//! ports.

use log::info;

use crate::app::commands::ControlCommand;
use crate::app::events::{ControlEvent, DataSnapshot, MachineStateSnapshot};
use crate::app::ports::{
    ActuatorPort, AlarmSink, Clock, ControlSwitch, EventSink, SensorPort, Watchdog,
};
use crate::config::VentilationConfig;
use crate::cycle::CycleController;

pub struct CycleDriver {
    controller: CycleController,
    compute_period_ms: u64,
    last_compute_ms: u64,
    last_micros: u64,
    started: bool,
}

impl CycleDriver {
    pub fn new(config: VentilationConfig) -> Self {
        Self {
            compute_period_ms: config.compute_period_ms,
            controller: CycleController::new(config),
            last_compute_ms: 0,
            last_micros: 0,
            started: false,
        }
    }

    /// Commit the safe state and arm the timing references. Call once
    /// before the first [`run_cycle`](Self::run_cycle).
    pub fn setup(&mut self, hw: &mut impl ActuatorPort, clock: &mut impl Clock) {
        self.controller.setup(hw);
        self.last_compute_ms = clock.now_millis();
        self.last_micros = clock.now_micros();
        self.started = false;
    }

    /// Run one full respiratory cycle.
    ///
    /// The activation switch is polled exactly once, here, before the
    /// cycle starts: switching off mid-cycle lets the breath in progress
    /// complete. While off, the slot still ticks at the compute period:
    /// turbine idle, valves closed, breathing alarms cleared, watchdog
    /// fed. Flipping the switch back on resumes within one cycle
    /// length.
    pub fn run_cycle(
        &mut self,
        hw: &mut (impl SensorPort + ActuatorPort),
        alarms: &mut impl AlarmSink,
        sink: &mut impl EventSink,
        clock: &mut impl Clock,
        watchdog: &mut impl Watchdog,
        switch: &mut impl ControlSwitch,
    ) {
        let running = switch.is_running();

        if running {
            if !self.started {
                self.started = true;
                sink.emit(&ControlEvent::Started {
                    cycles_per_minute: self.controller.cycles_per_minute_command(),
                });
            }
            self.controller.init_respiratory_cycle(hw);
            sink.emit(&ControlEvent::CycleStarted {
                cycle: self.controller.cycle_number(),
            });
        }

        let mut tick: u16 = 0;
        while tick < self.controller.centi_sec_per_cycle() {
            let now = clock.now_millis();
            if now.wrapping_sub(self.last_compute_ms) < self.compute_period_ms {
                continue;
            }
            self.last_compute_ms = now;

            if running {
                let pressure = hw.read_pressure(tick);
                self.controller.update_pressure(i32::from(pressure));

                let now_us = clock.now_micros();
                self.controller
                    .update_dt(now_us.wrapping_sub(self.last_micros) as i32);
                self.last_micros = now_us;

                self.controller.compute(tick, hw, alarms);

                sink.emit(&ControlEvent::DataSnapshot(DataSnapshot {
                    tick,
                    pressure: self.controller.pressure(),
                    phase: self.controller.phase(),
                    blower_valve_position: self.controller.blower_valve().position(),
                    patient_valve_position: self.controller.patient_valve().position(),
                    blower_speed: self.controller.blower_speed(),
                }));
            } else {
                self.controller.halt(hw, alarms);
            }

            tick += 1;
            watchdog.reload();
        }

        if running {
            self.controller.end_respiratory_cycle(alarms);
            sink.emit(&ControlEvent::MachineStateSnapshot(MachineStateSnapshot {
                cycle: self.controller.cycle_number(),
                cycles_per_minute_command: self.controller.cycles_per_minute_command(),
                max_peak_command: self.controller.max_peak_pressure_command(),
                max_plateau_command: self.controller.max_plateau_pressure_command(),
                min_peep_command: self.controller.min_peep_command(),
                previous_peak_pressure: self.controller.peak_pressure(),
                previous_plateau_pressure: self.controller.plateau_pressure(),
                previous_peep_pressure: self.controller.peep(),
                active_alarms: self.controller.safeguards().active_codes(),
            }));
        } else if self.started {
            self.started = false;
            info!("ventilation stopped; machine held in safe state");
        }
    }

    /// Forward an operator intent to the controller's adjusters. Takes
    /// effect on the commanded parameters immediately; the running breath
    /// keeps its latched values.
    pub fn handle_command(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::CycleIncrease => self.controller.on_cycle_increase(),
            ControlCommand::CycleDecrease => self.controller.on_cycle_decrease(),
            ControlCommand::PeepPressureIncrease => self.controller.on_peep_pressure_increase(),
            ControlCommand::PeepPressureDecrease => self.controller.on_peep_pressure_decrease(),
            ControlCommand::PlateauPressureIncrease => {
                self.controller.on_plateau_pressure_increase()
            }
            ControlCommand::PlateauPressureDecrease => {
                self.controller.on_plateau_pressure_decrease()
            }
        }
    }

    pub fn controller(&self) -> &CycleController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut CycleController {
        &mut self.controller
    }
}
