//! # Output Level Metering
//!
//! The audio thread measures the peak level of every block it produces
//! and publishes it for the editor (or anything else) to display. The two
//! sides never wait on each other:
//!
//! - [`PeakMeter`] lives on the audio thread and accumulates the running
//!   peak of the current block in plain `f32`s.
//! - [`MeterLevels`] is shared through an `Arc`. It holds one
//!   `AtomicF32` per channel, written once at the end of each block and
//!   readable from any thread at any time. Readers always see the most
//!   recent complete value; there's no history and no queue.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use atomic_float::AtomicF32;

/// Most recent per-block peak levels, linear amplitude.
#[derive(Debug, Default)]
pub struct MeterLevels {
    left: AtomicF32,
    right: AtomicF32,
}

impl MeterLevels {
    /// The latest `(left, right)` peaks. Safe to call from any thread.
    pub fn levels(&self) -> (f32, f32) {
        (
            self.left.load(Ordering::Relaxed),
            self.right.load(Ordering::Relaxed),
        )
    }

    fn publish(&self, left: f32, right: f32) {
        self.left.store(left, Ordering::Relaxed);
        self.right.store(right, Ordering::Relaxed);
    }
}

/// Audio-thread side of the meter.
pub struct PeakMeter {
    levels: Arc<MeterLevels>,
    peak_l: f32,
    peak_r: f32,
}

impl PeakMeter {
    pub fn new(levels: Arc<MeterLevels>) -> Self {
        Self {
            levels,
            peak_l: 0.0,
            peak_r: 0.0,
        }
    }

    /// Start a new block.
    #[inline]
    pub fn begin_block(&mut self) {
        self.peak_l = 0.0;
        self.peak_r = 0.0;
    }

    /// Account for one output frame.
    #[inline]
    pub fn accumulate(&mut self, left: f32, right: f32) {
        self.peak_l = self.peak_l.max(left.abs());
        self.peak_r = self.peak_r.max(right.abs());
    }

    /// Publish the block's peaks.
    #[inline]
    pub fn end_block(&mut self) {
        self.levels.publish(self.peak_l, self.peak_r);
    }

    /// Zero both the running peaks and the published levels.
    pub fn reset(&mut self) {
        self.begin_block();
        self.end_block();
    }
}
