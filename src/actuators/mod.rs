//! Pneumatic actuators: the two servo-driven pressure valves and the
//! turbine. These are staged-state models: hardware is only touched when
//! the cycle controller flushes them through the actuator port.

pub mod blower;
pub mod valve;

pub use blower::Blower;
pub use valve::PressureValve;
