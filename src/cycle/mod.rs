//! Breathing-cycle state: phases, the sliding pressure window, and the
//! cycle controller itself.
//!
//! A cycle is one breath: inhalation for the first third (time-wise), then
//! exhalation for the remaining two thirds. Each half has two sub-phases,
//! encoded as tagged variants so an inconsistent phase/sub-phase pair is
//! unrepresentable.

pub mod controller;
pub mod plateau;

pub use controller::CycleController;

/// Sub-phases of the inhalation half of a breath.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InhalationStep {
    /// Blower valve driven by the pressure loop, patient valve closed;
    /// airway pressure climbs toward the peak command.
    Inspiration,
    /// Both valves closed; pressure settles on the plateau.
    HoldInspiration,
}

/// Sub-phases of the exhalation half of a breath.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhalationStep {
    /// Patient valve driven by the pressure loop; pressure falls toward
    /// the PEEP command.
    Exhale,
    /// Both valves closed; reserved for expiratory pause manoeuvres.
    HoldExhale,
}

/// Where the controller is within the current breath.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Inhalation(InhalationStep),
    Exhalation(ExhalationStep),
}

impl Phase {
    pub fn is_inhalation(&self) -> bool {
        matches!(self, Phase::Inhalation(_))
    }

    pub fn is_exhalation(&self) -> bool {
        matches!(self, Phase::Exhalation(_))
    }

    /// Short label for logs and snapshots.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Inhalation(InhalationStep::Inspiration) => "inspiration",
            Phase::Inhalation(InhalationStep::HoldInspiration) => "hold-inspiration",
            Phase::Exhalation(ExhalationStep::Exhale) => "exhale",
            Phase::Exhalation(ExhalationStep::HoldExhale) => "hold-exhale",
        }
    }
}
