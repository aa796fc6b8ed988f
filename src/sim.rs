//! Host-side simulation adapters.
//!
//! A first-order pneumatic model plus implementations of every port, so the
//! whole control loop runs on a development machine in milliseconds. The
//! binary (`src/main.rs`) wires these together; the integration tests use
//! their own scripted adapters instead, because scripted traces make
//! assertions exact.

use rand::random_range;

use crate::app::events::ControlEvent;
use crate::app::ports::{
    ActuatorPort, AlarmSink, Clock, ControlSwitch, EventSink, SensorPort, Watchdog,
};
use crate::config::VentilationConfig;
use crate::safety::AlarmCode;

// ───────────────────────────────────────────────────────────────
// Pneumatic model
// ───────────────────────────────────────────────────────────────

/// Lumped model of the breathing circuit: one pressure state driven by the
/// turbine through the blower valve, vented through the patient valve, with
/// a small constant leak.
#[derive(Debug)]
pub struct PneumaticModel {
    /// Airway pressure (mmH₂O).
    pressure: f64,
    /// Turbine head pressure at full speed (mmH₂O).
    head_pressure: f64,
    /// Inflow conductance through a fully open blower valve.
    k_in: f64,
    /// Outflow conductance through a fully open patient valve.
    k_out: f64,
    /// Circuit leak conductance.
    k_leak: f64,
}

impl PneumaticModel {
    pub fn new() -> Self {
        Self {
            pressure: 0.0,
            head_pressure: 600.0,
            k_in: 14.0,
            k_out: 10.0,
            k_leak: 0.12,
        }
    }

    /// Advance the circuit by `dt_s` seconds.
    ///
    /// `blower_open` and `patient_open` are valve opening fractions in
    /// `0..=1`; `speed_frac` is the turbine speed as a fraction of its
    /// ceiling.
    pub fn update(&mut self, blower_open: f64, patient_open: f64, speed_frac: f64, dt_s: f64) {
        let source = self.head_pressure * speed_frac;
        let inflow = self.k_in * blower_open * (source - self.pressure).max(0.0);
        let outflow = self.k_out * patient_open * self.pressure;
        let leak = self.k_leak * self.pressure;

        self.pressure += (inflow - outflow - leak) * dt_s;
        self.pressure = self.pressure.max(0.0);
    }

    pub fn pressure(&self) -> f64 {
        self.pressure
    }
}

impl Default for PneumaticModel {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// Hardware harness (SensorPort + ActuatorPort)
// ───────────────────────────────────────────────────────────────

/// Simulated pneumatics behind the sensor and actuator ports.
///
/// The model advances once per pressure read (i.e. once per control tick)
/// using whatever the actuators were last commanded to.
pub struct SimHarness {
    model: PneumaticModel,
    min_aperture: i32,
    max_aperture: i32,
    max_blower_speed: i32,
    blower_valve_position: i32,
    patient_valve_position: i32,
    blower_speed: i32,
    tick_seconds: f64,
    /// Peak-to-peak sensor noise (mmH₂O); zero disables it.
    noise: i32,
}

impl SimHarness {
    pub fn new(config: &VentilationConfig) -> Self {
        Self {
            model: PneumaticModel::new(),
            min_aperture: config.min_aperture,
            max_aperture: config.max_aperture,
            max_blower_speed: config.max_blower_speed,
            blower_valve_position: config.max_aperture,
            patient_valve_position: config.max_aperture,
            blower_speed: 0,
            tick_seconds: config.compute_period_ms as f64 / 1000.0,
            noise: 3,
        }
    }

    fn opening(&self, position: i32) -> f64 {
        f64::from(self.max_aperture - position) / f64::from(self.max_aperture - self.min_aperture)
    }
}

impl SensorPort for SimHarness {
    fn read_pressure(&mut self, _tick: u16) -> i16 {
        self.model.update(
            self.opening(self.blower_valve_position),
            self.opening(self.patient_valve_position),
            f64::from(self.blower_speed) / f64::from(self.max_blower_speed),
            self.tick_seconds,
        );

        let jitter = if self.noise > 0 {
            random_range(-self.noise..=self.noise)
        } else {
            0
        };
        (self.model.pressure() as i32 + jitter).clamp(0, i32::from(i16::MAX)) as i16
    }
}

impl ActuatorPort for SimHarness {
    fn set_blower_valve(&mut self, position: i32) {
        self.blower_valve_position = position;
    }

    fn set_patient_valve(&mut self, position: i32) {
        self.patient_valve_position = position;
    }

    fn set_blower_speed(&mut self, speed: i32) {
        self.blower_speed = speed;
    }

    fn stop_blower(&mut self) {
        self.blower_speed = 0;
    }
}

// ───────────────────────────────────────────────────────────────
// Timing ports
// ───────────────────────────────────────────────────────────────

/// Simulated monotonic clock: each millisecond poll advances sim time by
/// one millisecond, so a cycle runs as fast as the host allows.
#[derive(Debug, Default)]
pub struct SimClock {
    now_ms: u64,
}

impl Clock for SimClock {
    fn now_millis(&mut self) -> u64 {
        self.now_ms += 1;
        self.now_ms
    }

    fn now_micros(&mut self) -> u64 {
        self.now_ms * 1000
    }
}

/// Counts reloads; a real watchdog resets the machine when starved.
#[derive(Debug, Default)]
pub struct SimWatchdog {
    pub reloads: u64,
}

impl Watchdog for SimWatchdog {
    fn reload(&mut self) {
        self.reloads += 1;
    }
}

/// Activation switch that stays on for a fixed number of cycles.
#[derive(Debug)]
pub struct SimSwitch {
    cycles_left: u32,
}

impl SimSwitch {
    pub fn on_for(cycles: u32) -> Self {
        Self {
            cycles_left: cycles,
        }
    }
}

impl ControlSwitch for SimSwitch {
    fn is_running(&mut self) -> bool {
        if self.cycles_left == 0 {
            return false;
        }
        self.cycles_left -= 1;
        true
    }
}

// ───────────────────────────────────────────────────────────────
// Sinks
// ───────────────────────────────────────────────────────────────

/// Logs cycle-level events; per-tick snapshots go to `trace`.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&mut self, event: &ControlEvent) {
        match event {
            ControlEvent::Started { cycles_per_minute } => {
                log::info!("ventilation started at {cycles_per_minute} cycles/min");
            }
            ControlEvent::CycleStarted { cycle } => {
                log::debug!("cycle {cycle} started");
            }
            ControlEvent::DataSnapshot(snap) => {
                log::trace!(
                    "t={:3} p={:3} {} blower[{} @{}] patient[{}]",
                    snap.tick,
                    snap.pressure,
                    snap.phase.label(),
                    snap.blower_valve_position,
                    snap.blower_speed,
                    snap.patient_valve_position,
                );
            }
            ControlEvent::MachineStateSnapshot(snap) => {
                log::info!(
                    "cycle {}: peak {} plateau {} peep {} (commands peak {} plateau {} peep {}) alarms {:?}",
                    snap.cycle,
                    snap.previous_peak_pressure,
                    snap.previous_plateau_pressure,
                    snap.previous_peep_pressure,
                    snap.max_peak_command,
                    snap.max_plateau_command,
                    snap.min_peep_command,
                    snap.active_alarms,
                );
            }
        }
    }
}

/// Alarm sink for the simulation: the safeguard monitor already logs
/// raise/clear transitions, so this only mirrors the active set.
#[derive(Debug, Default)]
pub struct SimAlarms {
    active: u32,
}

impl SimAlarms {
    pub fn is_active(&self, code: AlarmCode) -> bool {
        self.active & (1 << code.code()) != 0
    }
}

impl AlarmSink for SimAlarms {
    fn detected(&mut self, code: AlarmCode, _cycle: u32) {
        self.active |= 1 << code.code();
    }

    fn not_detected(&mut self, code: AlarmCode) {
        self.active &= !(1 << code.code());
    }
}
