//! Small numeric helpers shared by the signal path.

use std::f32::consts::FRAC_PI_4;

/// Anything louder than this (+6 dBFS) is flagged as a likely runaway.
pub const LOUDNESS_LIMIT: f32 = 2.0;

/// Equal-power pan law.
///
/// Maps `panning` in `[-1, 1]` to a `(left, right)` gain pair on a quarter
/// circle, so `left² + right² == 1` everywhere and the perceived loudness
/// stays constant as the sound moves across the stereo field.
///
/// ```text
/// angle = π/4 * (panning + 1)
/// left  = cos(angle)
/// right = sin(angle)
/// ```
#[inline]
pub fn panning_equal_power(panning: f32) -> (f32, f32) {
    let angle = FRAC_PI_4 * (panning.clamp(-1.0, 1.0) + 1.0);
    let (sin, cos) = angle.sin_cos();
    (cos, sin)
}

/// Convert a time in milliseconds to a (fractional) number of samples.
///
/// At 44.1 kHz: 100 ms = 4410 samples, 500 ms = 22050 samples.
#[inline]
pub fn ms_to_samples(ms: f32, sample_rate: f32) -> f32 {
    ms * sample_rate / 1000.0
}

/// Something suspicious found in a processed block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputIssue {
    /// A NaN or infinite sample. Usually means the feedback loop diverged.
    NonFinite { channel: usize, index: usize },
    /// A sample above [`LOUDNESS_LIMIT`].
    TooLoud { channel: usize, index: usize, value: f32 },
}

/// Scan a block for non-finite or overly loud samples.
///
/// Only ever reports; the block is not modified. The first problem found
/// wins, and non-finite samples take priority within a channel scan.
pub fn inspect_block(channels: &[&mut [f32]]) -> Option<OutputIssue> {
    for (channel, samples) in channels.iter().enumerate() {
        for (index, &value) in samples.iter().enumerate() {
            if !value.is_finite() {
                return Some(OutputIssue::NonFinite { channel, index });
            }
            if value.abs() > LOUDNESS_LIMIT {
                return Some(OutputIssue::TooLoud {
                    channel,
                    index,
                    value,
                });
            }
        }
    }
    None
}
