//! Ventilation configuration parameters.
//!
//! All tunable parameters for the breathing-cycle controller. Pressures are
//! integer mmH₂O throughout (1 cmH₂O = 10 mmH₂O); the control math is
//! integer-only by design, so every value here is an integer as well.
//!
//! A whole configuration loaded from the outside is **validated, not
//! clamped**: rejecting out-of-range values prevents a compromised
//! provisioning channel from injecting dangerous operating parameters.
//! Per-keypress user adjustments, by contrast, are clamped at the moment
//! they are applied (see `CycleController`).

use serde::{Deserialize, Serialize};

use crate::control::pid::PidSettings;
use crate::error::Error;

/// Core ventilation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VentilationConfig {
    // --- Respiratory rate ---
    /// Cycles per minute commanded at boot.
    pub initial_cycles_per_minute: i32,
    /// Lower bound on the cycles/min command.
    pub min_cycles_per_minute: i32,
    /// Upper bound on the cycles/min command.
    pub max_cycles_per_minute: i32,

    // --- Pressure commands (mmH₂O) ---
    /// PEEP target commanded at boot.
    pub default_min_peep: i32,
    /// Lower bound on the PEEP command.
    pub min_peep_pressure: i32,
    /// Upper bound on the PEEP command.
    pub max_peep_pressure: i32,
    /// Plateau target commanded at boot.
    pub default_max_plateau: i32,
    /// Lower bound on the plateau command.
    pub min_plateau_pressure: i32,
    /// Upper bound on the plateau command.
    pub max_plateau_pressure: i32,
    /// Peak ceiling commanded at boot.
    pub default_max_peak: i32,
    /// Absolute peak ceiling.
    pub max_peak_pressure: i32,

    // --- Inter-cycle trims ---
    /// Cap on the per-cycle peak-command trim (mmH₂O).
    pub max_peak_increment: i32,
    /// Cap on the per-cycle blower speed step.
    pub max_blower_increment: i32,

    // --- Plateau estimation ---
    /// Length of the sliding pressure window (samples).
    pub max_pressure_samples: usize,

    // --- Valves ---
    /// Servo position for a fully open valve.
    pub min_aperture: i32,
    /// Servo position for a fully closed valve.
    pub max_aperture: i32,

    // --- Blower ---
    /// Lowest running speed the turbine sustains.
    pub min_blower_speed: i32,
    /// Hardware ceiling on turbine speed.
    pub max_blower_speed: i32,
    /// Turbine speed commanded at boot.
    pub default_blower_speed: i32,

    // --- PID ---
    /// Blower-side pressure loop gains.
    pub pid_blower: PidSettings,
    /// Patient-side pressure loop gains.
    pub pid_patient: PidSettings,
    /// Bias added to the patient-loop target so the exhale valve settles
    /// slightly above the commanded PEEP (mmH₂O).
    pub pid_patient_safety_peep_offset: i32,

    // --- Timing ---
    /// Control tick period (milliseconds).
    pub compute_period_ms: u64,

    // --- Alarm thresholds (mmH₂O) ---
    /// Instantaneous over-pressure threshold (35 cmH₂O).
    pub alarm_pressure_high: i32,
    /// Instantaneous under-pressure threshold (2 cmH₂O).
    pub alarm_pressure_low: i32,
    /// Over-pressure threshold during the inspiratory hold (80 cmH₂O).
    pub alarm_plateau_high: i32,
    /// Under-pressure threshold during the inspiratory hold (2 cmH₂O).
    pub alarm_plateau_low: i32,
    /// Allowed deviation around the PEEP command during exhalation (2 cmH₂O).
    pub alarm_peep_tolerance: i32,
}

impl Default for VentilationConfig {
    fn default() -> Self {
        Self {
            // Respiratory rate
            initial_cycles_per_minute: 20,
            min_cycles_per_minute: 5,
            max_cycles_per_minute: 35,

            // Pressure commands [mmH₂O]
            default_min_peep: 70,
            min_peep_pressure: 0,
            max_peep_pressure: 300,
            default_max_plateau: 250,
            min_plateau_pressure: 100,
            max_plateau_pressure: 400,
            default_max_peak: 300,
            max_peak_pressure: 700,

            // Trims
            max_peak_increment: 30,
            max_blower_increment: 3,

            // Plateau window
            max_pressure_samples: 10,

            // Valves (servo positions)
            min_aperture: 25,
            max_aperture: 125,

            // Blower (ESC pulse widths)
            min_blower_speed: 300,
            max_blower_speed: 1800,
            default_blower_speed: 900,

            // PID
            pid_blower: PidSettings {
                kp: 2000,
                ki: 50,
                kd: 0,
                integral_min: -1000,
                integral_max: 1000,
            },
            pid_patient: PidSettings {
                kp: 4000,
                ki: 100,
                kd: 0,
                integral_min: -1000,
                integral_max: 1000,
            },
            pid_patient_safety_peep_offset: 20,

            // Timing
            compute_period_ms: 10,

            // Alarm thresholds [mmH₂O]
            alarm_pressure_high: 350,
            alarm_pressure_low: 20,
            alarm_plateau_high: 800,
            alarm_plateau_low: 20,
            alarm_peep_tolerance: 20,
        }
    }
}

impl VentilationConfig {
    /// Validate a whole configuration before it is accepted.
    ///
    /// Rejects inconsistent bounds and defaults outside their bounds.
    pub fn validate(&self) -> Result<(), Error> {
        if self.min_cycles_per_minute < 1 || self.min_cycles_per_minute > self.max_cycles_per_minute
        {
            return Err(Error::Config("cycles/min bounds out of order"));
        }
        if self.initial_cycles_per_minute < self.min_cycles_per_minute
            || self.initial_cycles_per_minute > self.max_cycles_per_minute
        {
            return Err(Error::Config("initial cycles/min outside bounds"));
        }
        if self.min_peep_pressure > self.max_peep_pressure
            || self.default_min_peep < self.min_peep_pressure
            || self.default_min_peep > self.max_peep_pressure
        {
            return Err(Error::Config("PEEP command outside bounds"));
        }
        if self.min_plateau_pressure > self.max_plateau_pressure
            || self.default_max_plateau < self.min_plateau_pressure
            || self.default_max_plateau > self.max_plateau_pressure
        {
            return Err(Error::Config("plateau command outside bounds"));
        }
        if self.default_max_peak < self.default_max_plateau
            || self.default_max_peak > self.max_peak_pressure
        {
            return Err(Error::Config("peak command outside bounds"));
        }
        if self.max_plateau_pressure > self.max_peak_pressure {
            return Err(Error::Config("plateau ceiling above peak ceiling"));
        }
        if self.default_min_peep > self.default_max_plateau {
            return Err(Error::Config("PEEP command above plateau command"));
        }
        if self.max_pressure_samples < 2 {
            return Err(Error::Config("pressure window too short"));
        }
        if self.min_aperture >= self.max_aperture {
            return Err(Error::Config("valve aperture range inverted"));
        }
        if self.min_blower_speed > self.max_blower_speed
            || self.default_blower_speed < self.min_blower_speed
            || self.default_blower_speed > self.max_blower_speed
        {
            return Err(Error::Config("blower speed outside bounds"));
        }
        if self.compute_period_ms == 0 {
            return Err(Error::Config("compute period must be at least 1 ms"));
        }
        Ok(())
    }
}
