//! Safeguard monitor.
//!
//! Runs **every tick after the sub-phase action** and checks the freshly
//! measured pressure against the phase the state machine just assigned.
//! For every alarm code, every tick, it either reports `detected` or
//! `not_detected` through the [`AlarmSink`] port. The monitor is
//! **edge-free**: it reasserts or clears based on current conditions only,
//! and debouncing belongs to the downstream alarm controller.
//!
//! The monitor also mirrors the currently-firing set in a bitmask so the
//! cycle driver can attach it to machine-state snapshots.

use heapless::Vec;
use log::{error, info};

use crate::app::ports::AlarmSink;
use crate::config::VentilationConfig;
use crate::cycle::{InhalationStep, Phase};

/// Alarm codes of the breathing-cycle safeguards.
///
/// Discriminants are the stable wire identifiers of the requirement matrix
/// (`RCM-SW-n`) and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlarmCode {
    /// Instantaneous pressure above 35 cmH₂O.
    PressureTooHigh = 1,
    /// Instantaneous pressure below 2 cmH₂O.
    PressureTooLow = 2,
    /// Pressure outside the PEEP band during exhalation.
    PeepNotMaintained = 3,
    /// Plateau pressure missed its target band over a whole cycle.
    PlateauNotReached = 14,
    /// Companion code to [`PeepNotMaintained`](Self::PeepNotMaintained);
    /// raised and cleared together with it.
    PeepOutOfBounds = 15,
    /// Pressure above 80 cmH₂O during the inspiratory hold.
    PlateauTooHigh = 18,
    /// Pressure below 2 cmH₂O during the inspiratory hold.
    PlateauTooLow = 19,
}

impl AlarmCode {
    /// Every breathing-cycle code, for bulk clears when ventilation stops.
    pub const ALL: [AlarmCode; 7] = [
        AlarmCode::PressureTooHigh,
        AlarmCode::PressureTooLow,
        AlarmCode::PeepNotMaintained,
        AlarmCode::PlateauNotReached,
        AlarmCode::PeepOutOfBounds,
        AlarmCode::PlateauTooHigh,
        AlarmCode::PlateauTooLow,
    ];

    /// Wire identifier (the `n` of `RCM-SW-n`).
    pub const fn code(self) -> u8 {
        self as u8
    }

    const fn mask(self) -> u32 {
        1 << (self as u8)
    }
}

impl core::fmt::Display for AlarmCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RCM-SW-{}", self.code())
    }
}

/// Per-tick and per-cycle safeguard evaluation.
#[derive(Debug, Clone)]
pub struct SafeguardMonitor {
    pressure_high: i32,
    pressure_low: i32,
    plateau_high: i32,
    plateau_low: i32,
    peep_tolerance: i32,
    /// Currently-firing codes, mirrored from what was last reported.
    active: u32,
}

impl SafeguardMonitor {
    pub fn new(config: &VentilationConfig) -> Self {
        Self {
            pressure_high: config.alarm_pressure_high,
            pressure_low: config.alarm_pressure_low,
            plateau_high: config.alarm_plateau_high,
            plateau_low: config.alarm_plateau_low,
            peep_tolerance: config.alarm_peep_tolerance,
            active: 0,
        }
    }

    /// Evaluate the instantaneous and phase-scoped safeguards for one tick.
    pub fn per_tick(
        &mut self,
        pressure: i32,
        phase: Phase,
        min_peep_command: i32,
        cycle: u32,
        alarms: &mut impl AlarmSink,
    ) {
        self.report(
            AlarmCode::PressureTooHigh,
            pressure > self.pressure_high,
            cycle,
            alarms,
        );
        self.report(
            AlarmCode::PressureTooLow,
            pressure < self.pressure_low,
            cycle,
            alarms,
        );

        if phase == Phase::Inhalation(InhalationStep::HoldInspiration) {
            self.report(
                AlarmCode::PlateauTooHigh,
                pressure > self.plateau_high,
                cycle,
                alarms,
            );
            self.report(
                AlarmCode::PlateauTooLow,
                pressure < self.plateau_low,
                cycle,
                alarms,
            );
        }

        if phase.is_exhalation() {
            let below = pressure < min_peep_command - self.peep_tolerance;
            let above = pressure > min_peep_command + self.peep_tolerance;
            let out_of_band = below || above;
            self.report(AlarmCode::PeepNotMaintained, out_of_band, cycle, alarms);
            self.report(AlarmCode::PeepOutOfBounds, out_of_band, cycle, alarms);
        }
    }

    /// Evaluate the cycle-level safeguard: the measured plateau must land
    /// within ±20% of its command.
    pub fn end_of_cycle(
        &mut self,
        plateau_pressure: i32,
        max_plateau_command: i32,
        cycle: u32,
        alarms: &mut impl AlarmSink,
    ) {
        let floor = max_plateau_command * 80 / 100;
        let ceiling = max_plateau_command * 120 / 100;
        let missed = plateau_pressure < floor || plateau_pressure > ceiling;
        self.report(AlarmCode::PlateauNotReached, missed, cycle, alarms);
    }

    /// Clear every breathing-cycle alarm. Used while ventilation is
    /// switched off: a stopped machine must not keep breathing alarms
    /// asserted.
    pub fn clear_all(&mut self, alarms: &mut impl AlarmSink) {
        for code in AlarmCode::ALL {
            if self.active & code.mask() != 0 {
                info!("alarm {code} cleared (ventilation stopped)");
            }
            alarms.not_detected(code);
        }
        self.active = 0;
    }

    /// Codes currently firing, for snapshot events.
    pub fn active_codes(&self) -> Vec<AlarmCode, 8> {
        let mut out = Vec::new();
        for code in AlarmCode::ALL {
            if self.active & code.mask() != 0 {
                // ALL has 7 entries, capacity is 8.
                let _ = out.push(code);
            }
        }
        out
    }

    /// Whether a specific code is currently firing.
    pub fn is_active(&self, code: AlarmCode) -> bool {
        self.active & code.mask() != 0
    }

    // ── Internal ──────────────────────────────────────────────

    /// Report one code for this tick and keep the mirror mask in sync.
    fn report(&mut self, code: AlarmCode, condition: bool, cycle: u32, alarms: &mut impl AlarmSink) {
        if condition {
            if self.active & code.mask() == 0 {
                error!("alarm {code} raised (cycle {cycle})");
            }
            self.active |= code.mask();
            alarms.detected(code, cycle);
        } else {
            if self.active & code.mask() != 0 {
                info!("alarm {code} cleared");
            }
            self.active &= !code.mask();
            alarms.not_detected(code);
        }
    }
}
