//! Inbound user intents.
//!
//! These represent keypad actions requested by the operator. The cycle
//! driver forwards them to the controller's adjusters, which clamp every
//! step; commands are applied to the *commanded* parameters immediately but
//! only latch into the running cycle at the next cycle start.

/// Operator adjustments from the keypad scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// One more breath per minute.
    CycleIncrease,
    /// One less breath per minute.
    CycleDecrease,
    /// Raise the PEEP target by 1 cmH₂O.
    PeepPressureIncrease,
    /// Lower the PEEP target by 1 cmH₂O.
    PeepPressureDecrease,
    /// Raise the plateau target by 1 cmH₂O (drags the peak ceiling along).
    PlateauPressureIncrease,
    /// Lower the plateau target by 1 cmH₂O (drags the peak ceiling along).
    PlateauPressureDecrease,
}
