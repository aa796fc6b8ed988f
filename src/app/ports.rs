//! Port traits: the boundary between the control core and the outside
//! world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ CycleDriver / CycleController (domain)
//! ```
//!
//! Driven adapters (pressure sensor, valve servos, alarm controller, event
//! sinks, clocks) implement these traits. The domain consumes them via
//! generics, so the core never touches hardware directly, and a full
//! respiratory cycle can be replayed deterministically against recorded
//! inputs.

use crate::app::events::ControlEvent;
use crate::safety::AlarmCode;

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port: the domain calls this once per control tick.
pub trait SensorPort {
    /// Sample the airway pressure, in mmH₂O.
    ///
    /// The tick index is passed for simulation and replay adapters; real
    /// hardware ignores it.
    fn read_pressure(&mut self, tick: u16) -> i16;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port: the domain calls this to move the pneumatics.
///
/// Valve positions arrive only from `PressureValve::execute()`; the staged
/// command/commit split upstream guarantees at most one hardware write per
/// valve per tick.
pub trait ActuatorPort {
    /// Move the blower-side valve servo.
    fn set_blower_valve(&mut self, position: i32);

    /// Move the patient-side valve servo.
    fn set_patient_valve(&mut self, position: i32);

    /// Command the turbine speed.
    fn set_blower_speed(&mut self, speed: i32);

    /// Spin the turbine down to idle.
    fn stop_blower(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Alarm port (domain → alarm controller)
// ───────────────────────────────────────────────────────────────

/// The safeguard monitor reports through this port every tick, for every
/// code. Debouncing, prioritisation and buzzer/LED effects live on the
/// other side.
pub trait AlarmSink {
    /// The condition for `code` holds this tick.
    fn detected(&mut self, code: AlarmCode, cycle: u32);

    /// The condition for `code` does not hold this tick.
    fn not_detected(&mut self, code: AlarmCode);
}

// ───────────────────────────────────────────────────────────────
// Event sink (domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The driver emits structured [`ControlEvent`]s through this port.
/// Adapters decide where they go: serial telemetry, log file, UI.
pub trait EventSink {
    fn emit(&mut self, event: &ControlEvent);
}

// ───────────────────────────────────────────────────────────────
// Timing ports
// ───────────────────────────────────────────────────────────────

/// Monotonic time source. `dt` fed to the PID loops is derived from the
/// microsecond reading, so jitter in the poll loop reaches the control law
/// as a larger measured `dt`, not as an error.
pub trait Clock {
    /// Monotonic milliseconds since an arbitrary origin.
    fn now_millis(&mut self) -> u64;

    /// Monotonic microseconds since the same origin.
    fn now_micros(&mut self) -> u64;
}

/// Hardware watchdog. Must be reloaded once per control tick; a stalled
/// loop lets it expire and reset the machine into its safe state.
pub trait Watchdog {
    fn reload(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Activation switch
// ───────────────────────────────────────────────────────────────

/// The operator's run/stop switch. Polled once per cycle, between cycle
/// end and the next cycle start; switching off mid-cycle lets the current
/// breath complete.
pub trait ControlSwitch {
    fn is_running(&mut self) -> bool;
}
