//! Unified error types for the ventilator core.
//!
//! The control loop itself never fails: anomalies surface as alarms, not
//! errors (see [`safety`](crate::safety)). Errors exist only at the edges:
//! configuration loading and adapter initialisation. All variants are `Copy`
//! so they can be passed around the boot path without allocation.

use core::fmt;

/// Every fallible operation outside the control loop funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
    /// An adapter failed to initialise.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
