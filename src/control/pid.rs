//! Integer PID controller for the pressure loops.
//!
//! Two instances run side by side: one commands the blower-side valve during
//! inspiration, one the patient-side valve during exhalation. Both share the
//! same algebra and differ only in gains and in how the caller maps the
//! command onto a valve aperture.
//!
//! All arithmetic is integer with explicit scales: `dt` is microseconds, the
//! derivative term is divided by 1000 at combination time, and the final
//! command is interpreted in thousandths by the aperture mapping. Wide
//! intermediates (`i64`) keep the products exact; the integral clamp and the
//! aperture clamp bound everything that leaves the controller.

use serde::{Deserialize, Serialize};

/// Sentinel meaning "no previous sample": the derivative term is forced to
/// zero on the first compute after a reset.
pub const INVALID_ERROR_MARKER: i32 = i32::MIN;

/// Gains and anti-windup bounds for one pressure loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PidSettings {
    /// Proportional gain.
    pub kp: i32,
    /// Integral gain (scaled by dt in µs / 1e6).
    pub ki: i32,
    /// Derivative gain (combined term divided by 1000).
    pub kd: i32,
    /// Anti-windup floor on the integral accumulator.
    pub integral_min: i32,
    /// Anti-windup ceiling on the integral accumulator.
    pub integral_max: i32,
}

/// One integer pressure loop.
#[derive(Debug, Clone)]
pub struct PressurePid {
    settings: PidSettings,
    integral: i32,
    last_error: i32,
}

impl PressurePid {
    pub fn new(settings: PidSettings) -> Self {
        Self {
            settings,
            integral: 0,
            last_error: INVALID_ERROR_MARKER,
        }
    }

    /// Clear accumulated state. Called at every cycle start.
    pub fn reset(&mut self) {
        self.integral = 0;
        self.last_error = INVALID_ERROR_MARKER;
    }

    /// Current integral accumulator (clamped).
    pub fn integral(&self) -> i32 {
        self.integral
    }

    /// Run one step of the loop and return the raw command (thousandths).
    ///
    /// `dt_us` is the measured microseconds since the previous step, not the
    /// nominal period; the loop tolerates scheduling jitter. A `dt_us` of
    /// zero yields a zero derivative rather than a division error, as does
    /// the first step after [`reset`](Self::reset).
    pub fn compute(&mut self, target: i32, measured: i32, dt_us: i32) -> i32 {
        let error = target - measured;

        let accumulated = i64::from(self.integral)
            + (i64::from(self.settings.ki) * i64::from(error) * i64::from(dt_us)) / 1_000_000;
        self.integral = accumulated.clamp(
            i64::from(self.settings.integral_min),
            i64::from(self.settings.integral_max),
        ) as i32;

        let derivative: i64 = if self.last_error == INVALID_ERROR_MARKER || dt_us == 0 {
            0
        } else {
            (1_000_000 * i64::from(error - self.last_error)) / i64::from(dt_us)
        };
        self.last_error = error;

        let command = i64::from(self.settings.kp) * i64::from(error)
            + i64::from(self.integral)
            + (i64::from(self.settings.kd) * derivative) / 1000;

        command.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }
}
