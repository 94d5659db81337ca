//! # Delay Line (Ring Buffer)
//!
//! A delay line stores audio samples and lets you read them back after a
//! specified time delay. The stereo delay keeps two of these, one per
//! logical channel, and feeds each one from the other's feedback path.
//!
//! ## How the Ring Buffer Works
//!
//! Picture a circular tape loop with a write head and a read head. The
//! write head records every incoming sample and then moves one slot
//! forward; the read head sits some distance behind it. The distance
//! between the heads is the delay.
//!
//! `write_pos` always points at the slot that will be overwritten *next*,
//! which is also the oldest sample still stored. The most recent sample
//! therefore lives at `write_pos - 1`, and a read at delay `d` looks at
//! `write_pos - 1 - d` (wrapping around the end of the buffer).
//!
//! ## Linear Interpolation
//!
//! Delay times are rarely whole numbers of samples. For a fractional delay
//! we blend the two neighbouring slots:
//!
//! ```text
//! result = newer * (1 - frac) + older * frac
//! ```
//!
//! For delay 441.3: `newer` is 441 samples back (weight 0.7) and `older`
//! is 442 samples back (weight 0.3).

use std::num::NonZeroUsize;

/// A single-channel ring buffer with interpolated reads.
///
/// The buffer is sized once in [`configure()`](Self::configure), which runs
/// from `initialize()` when the sample rate is known. Nothing in
/// [`write()`](Self::write) or [`read()`](Self::read) allocates, so both
/// are safe to call from the audio thread.
pub struct DelayLine {
    /// The stored samples. Starts out (and resets to) silence.
    buffer: Vec<f32>,

    /// Slot the next written sample goes into. Always in `[0, buffer_len)`.
    write_pos: usize,

    /// Cached `buffer.len()`, kept separately to make the modular
    /// arithmetic in `read()` easier to follow.
    buffer_len: usize,
}

impl Default for DelayLine {
    fn default() -> Self {
        Self::new()
    }
}

impl DelayLine {
    /// Create an unconfigured delay line.
    ///
    /// It holds a single silent slot until [`configure()`](Self::configure)
    /// is called, so a read before configuration returns silence instead
    /// of panicking.
    pub fn new() -> Self {
        Self {
            buffer: vec![0.0; 1],
            write_pos: 0,
            buffer_len: 1,
        }
    }

    /// Size the buffer so that delays up to `max_delay_samples` can be read.
    ///
    /// The capacity is `max_delay_samples + 1`: a delay of `N` samples
    /// needs `N` older samples plus the one just written. `NonZeroUsize`
    /// rules out a zero-length maximum at the type level.
    ///
    /// This allocates (or reuses the existing allocation when large
    /// enough), so it must only be called outside of `process()`. The
    /// contents are cleared as part of reconfiguring.
    pub fn configure(&mut self, max_delay_samples: NonZeroUsize) {
        let capacity = max_delay_samples.get() + 1;

        self.buffer.clear();
        self.buffer.resize(capacity, 0.0);
        self.buffer_len = capacity;
        self.write_pos = 0;
    }

    /// Number of slots in the buffer. The largest valid read delay is
    /// `capacity() - 1`.
    pub fn capacity(&self) -> usize {
        self.buffer_len
    }

    /// Clear the buffer to silence and move the write head back to 0.
    ///
    /// Called when playback (re)starts so that old echoes don't leak into
    /// the new session. Keeps the allocation.
    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }

    /// Store `sample` at the write head and advance the head by one slot.
    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos += 1;
        if self.write_pos == self.buffer_len {
            self.write_pos = 0;
        }
    }

    /// Read the sample written `delay_samples` writes ago.
    ///
    /// A delay of `0.0` returns the most recently written sample. Fractional
    /// delays blend the two neighbouring slots linearly.
    ///
    /// The caller keeps `delay_samples` within `[0, capacity() - 1]`. Values
    /// outside that range are clamped here as a last line of defence, so an
    /// out-of-range request reads the nearest valid slot instead of
    /// indexing out of bounds.
    ///
    /// # Index math
    ///
    /// `usize` can't go negative, so we add `buffer_len` before subtracting
    /// and wrap with `%`:
    ///
    /// ```text
    /// newest  = write_pos + buffer_len - 1
    /// index_a = (newest - delay_int)     % buffer_len
    /// index_b = (newest - delay_int - 1) % buffer_len
    /// ```
    ///
    /// `index_b` gets one extra `buffer_len` added so that reading the
    /// oldest slot can't underflow.
    #[inline]
    pub fn read(&self, delay_samples: f32) -> f32 {
        let max_delay = (self.buffer_len - 1) as f32;
        let delay_clamped = delay_samples.clamp(0.0, max_delay);

        let delay_int = delay_clamped as usize;
        let delay_frac = delay_clamped - delay_int as f32;

        let newest = self.write_pos + self.buffer_len - 1;
        let index_a = (newest - delay_int) % self.buffer_len;
        let index_b = (newest + self.buffer_len - delay_int - 1) % self.buffer_len;

        let sample_a = self.buffer[index_a];
        let sample_b = self.buffer[index_b];

        sample_a + delay_frac * (sample_b - sample_a)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
