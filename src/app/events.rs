//! Outbound control events.
//!
//! The cycle driver emits these through the
//! [`EventSink`](super::ports::EventSink) port. Adapters on the other side
//! decide what to do with them: encode onto the serial telemetry link,
//! append to a log, feed a live display.

use heapless::Vec;

use crate::cycle::Phase;
use crate::safety::AlarmCode;

/// Structured events emitted by the control core.
#[derive(Debug, Clone)]
pub enum ControlEvent {
    /// Ventilation was engaged and the first cycle is about to start.
    Started { cycles_per_minute: i32 },

    /// A new respiratory cycle began.
    CycleStarted { cycle: u32 },

    /// Per-tick measurement snapshot.
    DataSnapshot(DataSnapshot),

    /// End-of-cycle machine state.
    MachineStateSnapshot(MachineStateSnapshot),
}

/// One control tick as observed after actuation.
#[derive(Debug, Clone, Copy)]
pub struct DataSnapshot {
    pub tick: u16,
    /// Measured airway pressure (mmH₂O).
    pub pressure: i32,
    pub phase: Phase,
    /// Committed blower-side valve position.
    pub blower_valve_position: i32,
    /// Committed patient-side valve position.
    pub patient_valve_position: i32,
    /// Commanded turbine speed.
    pub blower_speed: i32,
}

/// Cycle-granularity state, captured after the inter-cycle trims ran.
#[derive(Debug, Clone)]
pub struct MachineStateSnapshot {
    pub cycle: u32,
    pub cycles_per_minute_command: i32,
    pub max_peak_command: i32,
    pub max_plateau_command: i32,
    pub min_peep_command: i32,
    /// Highest pressure measured during the finished cycle.
    pub previous_peak_pressure: i32,
    /// Plateau estimate of the finished cycle.
    pub previous_plateau_pressure: i32,
    /// End-expiratory pressure of the finished cycle.
    pub previous_peep_pressure: i32,
    /// Safeguards firing as of cycle end.
    pub active_alarms: Vec<AlarmCode, 8>,
}
