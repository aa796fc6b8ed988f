//! Plateau pressure estimation from a sliding sample window.
//!
//! The plateau is the quasi-static pressure region just before the valves
//! release: clinically it is the number the operator steers toward. Rather
//! than trusting any single sample, the estimator watches the spread of the
//! last few samples: a narrow window means the curve has flattened,
//! independent of the absolute pressure level.

use heapless::Vec;

/// Hard capacity of the sample window; the configured length
/// (`max_pressure_samples`) must fit within it.
pub const WINDOW_CAPACITY: usize = 32;

/// Spread in mmH₂O below which the window counts as stable, and above
/// which a previously stable window counts as released.
const STABILITY_THRESHOLD: i32 = 10;

/// Fraction (percent) of the inhalation at which the hold is near its end
/// and a stable window may start the plateau average.
const HOLD_TAIL_PERCENT: u16 = 95;

/// Circular buffer over the most recent pressure samples.
#[derive(Debug, Clone)]
pub struct PressureWindow {
    samples: Vec<i32, WINDOW_CAPACITY>,
    head: usize,
}

/// Aggregates over one window scan.
#[derive(Debug, Clone, Copy)]
pub struct WindowStats {
    pub min: i32,
    pub max: i32,
    pub sum: i32,
}

impl PressureWindow {
    /// A zero-filled window of `len` samples (capped at capacity).
    pub fn new(len: usize) -> Self {
        let len = len.min(WINDOW_CAPACITY);
        let mut samples = Vec::new();
        for _ in 0..len {
            // Capacity checked above.
            let _ = samples.push(0);
        }
        Self { samples, head: 0 }
    }

    /// Overwrite the oldest sample with `pressure`.
    pub fn push(&mut self, pressure: i32) {
        self.samples[self.head] = pressure;
        self.head = (self.head + 1) % self.samples.len();
    }

    /// Zero every sample. Called at cycle start only; the window must
    /// survive the inhalation→exhalation transition so the first exhale
    /// ticks still see the hold-phase samples.
    pub fn reset(&mut self) {
        for s in self.samples.iter_mut() {
            *s = 0;
        }
        self.head = 0;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Min, max and sum over the whole window.
    pub fn stats(&self) -> WindowStats {
        let mut min = self.samples[0];
        let mut max = self.samples[0];
        let mut sum = 0i32;
        for &s in self.samples.iter() {
            min = min.min(s);
            max = max.max(s);
            sum += s;
        }
        WindowStats { min, max, sum }
    }
}

/// Detects the stable tail of the inspiratory hold and averages it.
#[derive(Debug, Clone, Default)]
pub struct PlateauEstimator {
    /// Averaging in progress.
    started: bool,
    /// Result frozen for the rest of the cycle.
    computed: bool,
}

impl PlateauEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything. Called at cycle start.
    pub fn reset(&mut self) {
        self.started = false;
        self.computed = false;
    }

    /// Evaluate one tick during exhale.
    ///
    /// Returns the running plateau average while the window is in its
    /// stable region, `None` otherwise. Once the window spread re-opens
    /// (pressure dropping through the released valve) the last returned
    /// value is final for this cycle.
    pub fn evaluate(
        &mut self,
        window: &PressureWindow,
        tick: u16,
        centi_sec_per_inhalation: u16,
    ) -> Option<i32> {
        let stats = window.stats();
        let spread = stats.max - stats.min;

        // Begin averaging once the window has flattened near the end of
        // the hold.
        if !self.computed
            && spread < STABILITY_THRESHOLD
            && tick >= centi_sec_per_inhalation * HOLD_TAIL_PERCENT / 100
        {
            self.started = true;
        }

        // Pressure is dropping again: freeze the result.
        if self.started && spread > STABILITY_THRESHOLD {
            self.started = false;
            self.computed = true;
        }

        if self.started {
            Some(stats.sum / window.len() as i32)
        } else {
            None
        }
    }

    /// Whether the estimate has been frozen for this cycle.
    pub fn is_computed(&self) -> bool {
        self.computed
    }
}
