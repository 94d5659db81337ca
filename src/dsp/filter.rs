//! # State-Variable Filter (Low Cut / High Cut)
//!
//! The feedback path runs through two filters per channel: a highpass
//! ("low cut") that stops bass from piling up over many repeats, and a
//! lowpass ("high cut") that darkens each repeat the way tape and
//! bucket-brigade delays do.
//!
//! Both are the same 2-pole (12 dB/octave) state-variable filter, just
//! tapping a different output.
//!
//! ## Why a TPT State-Variable Filter?
//!
//! The cutoff knobs are smoothed, which means the coefficients change on
//! every sample while a knob is moving. Direct-form biquads can click or
//! even blow up when their coefficients are swept like that. The
//! topology-preserving transform (TPT) version of the SVF keeps the state
//! in the same "shape" as the analog circuit it models, so it stays well
//! behaved under continuous modulation.
//!
//! ## The Equations
//!
//! ```text
//! g  = tan(π * cutoff / sample_rate)
//! k  = 1 / Q                       (√2 for a Butterworth response)
//!
//! v3 = x - ic2
//! v1 = (g * v3 + ic1) / (1 + g * (g + k))
//! v2 = ic2 + g * v1
//!
//! ic1 = 2 * v1 - ic1
//! ic2 = 2 * v2 - ic2
//!
//! lowpass  = v2
//! highpass = x - k * v1 - v2
//! ```
//!
//! `ic1` and `ic2` are the two integrator states; they're all the memory
//! the filter has.

use std::f32::consts::{PI, SQRT_2};

/// Which response the filter produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Passes everything below the cutoff. Used for the high-cut control.
    LowPass,
    /// Passes everything above the cutoff. Used for the low-cut control.
    HighPass,
}

/// A 2-pole TPT state-variable filter with a fixed Butterworth Q.
pub struct StateVariableFilter {
    mode: FilterMode,

    /// `tan(π * cutoff / sample_rate)`, the prewarped integrator gain.
    g: f32,

    /// Damping, `1 / Q`.
    k: f32,

    /// Integrator states.
    ic1: f32,
    ic2: f32,
}

impl StateVariableFilter {
    /// Create a filter in the given mode.
    ///
    /// The cutoff starts at 1 kHz for a 44.1 kHz sample rate; the signal
    /// path sets the real value in `prepare()` before any audio runs.
    pub fn new(mode: FilterMode) -> Self {
        let mut filter = Self {
            mode,
            g: 0.0,
            k: SQRT_2,
            ic1: 0.0,
            ic2: 0.0,
        };
        filter.set_cutoff(1000.0, 44100.0);
        filter
    }

    /// Recompute the coefficient for a new cutoff frequency.
    ///
    /// The cutoff is clamped to 20 Hz .. 49% of the sample rate. `tan()`
    /// heads to infinity at Nyquist, so we stay just below it.
    ///
    /// This costs a `tan()` call, which is a lot more than a sample of
    /// filtering. The signal path only calls it when the cutoff actually
    /// changed.
    pub fn set_cutoff(&mut self, cutoff_hz: f32, sample_rate: f32) {
        let safe_cutoff = cutoff_hz.max(20.0).min(sample_rate * 0.49);
        self.g = (PI * safe_cutoff / sample_rate).tan();
    }

    /// Filter one sample.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let v3 = input - self.ic2;
        let v1 = (self.g * v3 + self.ic1) / (1.0 + self.g * (self.g + self.k));
        let v2 = self.ic2 + self.g * v1;

        self.ic1 = 2.0 * v1 - self.ic1;
        self.ic2 = 2.0 * v2 - self.ic2;

        match self.mode {
            FilterMode::LowPass => v2,
            FilterMode::HighPass => input - self.k * v1 - v2,
        }
    }

    /// Clear the integrator states without touching the cutoff.
    pub fn reset(&mut self) {
        self.ic1 = 0.0;
        self.ic2 = 0.0;
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
