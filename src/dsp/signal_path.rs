//! # The Stereo Delay Signal Path
//!
//! Everything that happens to a sample between the host handing it to us
//! and us handing it back. The plugin shell owns one [`SignalPath`], calls
//! [`prepare()`](SignalPath::prepare) when the audio configuration changes
//! and [`reset()`](SignalPath::reset) when playback restarts, and once per
//! block publishes new parameter targets and the host tempo before running
//! [`process_block()`](SignalPath::process_block).
//!
//! Parameter changes glide through nih-plug `Smoother`s owned by the signal
//! path. They are advanced in runs of up to 64 samples, all by the same
//! count, so they never drift apart.
//!
//! ## Signal Flow
//!
//! ```text
//!  in L ─┐                                                          ┌─► dry L ─┐
//!        ├─► mono ─┬─► × panL ─►(+)─► [Delay L] ─┬─► wet L ─► × mix ─►(+)─► × gain ─► out L
//!  in R ─┘         │             ▲               │
//!                  │             │               └─► × fb ─► LowCut ─► HighCut ─► feedback L ─┐
//!                  │             └──────────────────────────────────────── feedback R ◄──┐    │
//!                  │                                                                     │    │
//!                  └─► × panR ─►(+)─► [Delay R] ─┬─► wet R ─► × mix ─►(+)─► × gain ─► out R   │
//!                                ▲               └─► × fb ─► LowCut ─► HighCut ─► feedback R ─┘
//!                                └──────────────────────────────────────── feedback L ◄───────┘
//! ```
//!
//! The feedback is crossed: what comes out of the left line goes back into
//! the right one and vice versa, so with the stereo control turned to one
//! side the repeats bounce between the speakers.
//!
//! The feedback is attenuated *before* it is filtered, so each trip around
//! the loop loses both level and spectrum.

use std::num::NonZeroUsize;
use std::sync::Arc;

use nih_plug::prelude::{Smoother, SmoothingStyle};
use nih_plug::util;
use thiserror::Error;

use super::delay_line::DelayLine;
use super::filter::{FilterMode, StateVariableFilter};
use super::meter::{MeterLevels, PeakMeter};
use super::tempo::Tempo;
use super::util::{inspect_block, ms_to_samples, panning_equal_power, OutputIssue};

/// Shortest manual delay time.
pub const MIN_DELAY_MS: f32 = 5.0;

/// Longest delay time, manual or tempo-synced. Sizes the delay lines.
pub const MAX_DELAY_MS: f32 = 5000.0;

/// Lowest sample rate `prepare()` accepts. The feedback filters need room
/// between their 20 Hz floor and Nyquist.
pub const MIN_SAMPLE_RATE: f32 = 8000.0;

/// Highest sample rate `prepare()` accepts.
pub const MAX_SAMPLE_RATE: f32 = 768_000.0;

/// Upper bound for a custom maximum delay. One minute of stereo audio at
/// 192 kHz is already ~90 MB.
const LONGEST_SUPPORTED_DELAY_MS: f32 = 60_000.0;

/// Feedback is capped below unity so repeats always decay.
pub const MAX_FEEDBACK: f32 = 0.95;

pub const MIN_GAIN_DB: f32 = -12.0;
pub const MAX_GAIN_DB: f32 = 12.0;

pub const MIN_CUTOFF_HZ: f32 = 20.0;
pub const MAX_CUTOFF_HZ: f32 = 20000.0;

/// Index of the quarter note in the note-length table.
pub const QUARTER_NOTE: usize = 9;

/// Ramp time for gain, mix, feedback, stereo and the cutoffs.
const RAMP_MS: f32 = 20.0;

/// Glide time for manual delay time changes.
const DELAY_GLIDE_MS: f32 = 200.0;

/// Smoothed values are computed this many samples at a time.
const SMOOTHING_BLOCK: usize = 64;

/// Why [`SignalPath::prepare()`] refused a configuration.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum PrepareError {
    #[error("sample rate must be between 8000 and 768000 Hz, got {0}")]
    InvalidSampleRate(f32),
    #[error("maximum block size must be at least one sample")]
    InvalidBlockSize,
    #[error("maximum delay must be between 0 and 60000 ms, got {max_delay_ms} ms at {sample_rate} Hz")]
    InvalidMaxDelay { max_delay_ms: f32, sample_rate: f32 },
}

/// A snapshot of every parameter the signal path reads.
///
/// Produced once per block by the parameter store. The signal path clamps
/// it on the way in, so callers never have to worry about ranges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelaySettings {
    /// Output gain in decibels.
    pub gain_db: f32,
    /// How much wet signal is added to the dry signal, 0..1.
    pub mix: f32,
    /// Manual delay time in milliseconds.
    pub delay_ms: f32,
    /// Fraction of the wet signal fed back into the other delay line.
    pub feedback: f32,
    /// Where the delayed signal sits in the stereo field, -1 (left) ..
    /// 1 (right).
    pub stereo: f32,
    /// Highpass cutoff in the feedback path.
    pub low_cut_hz: f32,
    /// Lowpass cutoff in the feedback path.
    pub high_cut_hz: f32,
    /// Note length index used when `tempo_sync` is on.
    pub delay_note: usize,
    /// Use the note length at the host tempo instead of `delay_ms`.
    pub tempo_sync: bool,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            gain_db: 0.0,
            mix: 1.0,
            delay_ms: 100.0,
            feedback: 0.0,
            stereo: 0.0,
            low_cut_hz: MIN_CUTOFF_HZ,
            high_cut_hz: MAX_CUTOFF_HZ,
            delay_note: QUARTER_NOTE,
            tempo_sync: false,
        }
    }
}

impl DelaySettings {
    /// Force every value into its valid range. Non-finite values fall back
    /// to the default.
    pub fn clamped(&self) -> Self {
        let defaults = Self::default();
        Self {
            gain_db: clamp_finite(self.gain_db, MIN_GAIN_DB, MAX_GAIN_DB, defaults.gain_db),
            mix: clamp_finite(self.mix, 0.0, 1.0, defaults.mix),
            delay_ms: clamp_finite(self.delay_ms, MIN_DELAY_MS, MAX_DELAY_MS, defaults.delay_ms),
            feedback: clamp_finite(self.feedback, 0.0, MAX_FEEDBACK, defaults.feedback),
            stereo: clamp_finite(self.stereo, -1.0, 1.0, defaults.stereo),
            low_cut_hz: clamp_finite(
                self.low_cut_hz,
                MIN_CUTOFF_HZ,
                MAX_CUTOFF_HZ,
                defaults.low_cut_hz,
            ),
            high_cut_hz: clamp_finite(
                self.high_cut_hz,
                MIN_CUTOFF_HZ,
                MAX_CUTOFF_HZ,
                defaults.high_cut_hz,
            ),
            delay_note: self.delay_note.min(15),
            tempo_sync: self.tempo_sync,
        }
    }
}

fn clamp_finite(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

/// One smoother per continuous parameter. Tempo sync and the note index
/// switch instantly and live on [`SignalPath`] directly.
///
/// nih-plug's `Smoother::set_target()` restarts the ramp every time it is
/// called, so targets are only forwarded when they actually change.
struct Smoothers {
    sample_rate: f32,

    /// The values last handed to the smoothers, already clamped.
    targets: DelaySettings,

    /// Linear gain, not decibels.
    gain: Smoother<f32>,
    mix: Smoother<f32>,
    delay_time: Smoother<f32>,
    feedback: Smoother<f32>,
    stereo: Smoother<f32>,
    low_cut: Smoother<f32>,
    high_cut: Smoother<f32>,
}

/// Up to [`SMOOTHING_BLOCK`] consecutive values from every smoother.
struct SmoothedBlock {
    gain: [f32; SMOOTHING_BLOCK],
    mix: [f32; SMOOTHING_BLOCK],
    delay_time: [f32; SMOOTHING_BLOCK],
    feedback: [f32; SMOOTHING_BLOCK],
    stereo: [f32; SMOOTHING_BLOCK],
    low_cut: [f32; SMOOTHING_BLOCK],
    high_cut: [f32; SMOOTHING_BLOCK],
}

impl SmoothedBlock {
    fn new() -> Self {
        Self {
            gain: [0.0; SMOOTHING_BLOCK],
            mix: [0.0; SMOOTHING_BLOCK],
            delay_time: [0.0; SMOOTHING_BLOCK],
            feedback: [0.0; SMOOTHING_BLOCK],
            stereo: [0.0; SMOOTHING_BLOCK],
            low_cut: [0.0; SMOOTHING_BLOCK],
            high_cut: [0.0; SMOOTHING_BLOCK],
        }
    }
}

impl Smoothers {
    fn new(settings: &DelaySettings) -> Self {
        let smoothers = Self {
            sample_rate: 44100.0,
            targets: *settings,
            gain: Smoother::new(SmoothingStyle::Linear(RAMP_MS)),
            mix: Smoother::new(SmoothingStyle::Linear(RAMP_MS)),
            delay_time: Smoother::new(SmoothingStyle::Exponential(DELAY_GLIDE_MS)),
            feedback: Smoother::new(SmoothingStyle::Linear(RAMP_MS)),
            stereo: Smoother::new(SmoothingStyle::Linear(RAMP_MS)),
            low_cut: Smoother::new(SmoothingStyle::Linear(RAMP_MS)),
            high_cut: Smoother::new(SmoothingStyle::Linear(RAMP_MS)),
        };
        smoothers.snap_to_targets();
        smoothers
    }

    /// Ramp lengths are computed from the sample rate when a target is set,
    /// so any ramp in progress is finished off first.
    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.snap_to_targets();
    }

    fn set_targets(&mut self, settings: &DelaySettings) {
        let sample_rate = self.sample_rate;
        let old = self.targets;

        if settings.gain_db != old.gain_db {
            self.gain
                .set_target(sample_rate, util::db_to_gain(settings.gain_db));
        }
        if settings.mix != old.mix {
            self.mix.set_target(sample_rate, settings.mix);
        }
        if settings.delay_ms != old.delay_ms {
            self.delay_time.set_target(sample_rate, settings.delay_ms);
        }
        if settings.feedback != old.feedback {
            self.feedback.set_target(sample_rate, settings.feedback);
        }
        if settings.stereo != old.stereo {
            self.stereo.set_target(sample_rate, settings.stereo);
        }
        if settings.low_cut_hz != old.low_cut_hz {
            self.low_cut.set_target(sample_rate, settings.low_cut_hz);
        }
        if settings.high_cut_hz != old.high_cut_hz {
            self.high_cut.set_target(sample_rate, settings.high_cut_hz);
        }

        self.targets = *settings;
    }

    /// Advance every smoother by exactly `len` samples, writing the values
    /// into `block`.
    #[inline]
    fn next_block(&self, block: &mut SmoothedBlock, len: usize) {
        self.gain.next_block(&mut block.gain, len);
        self.mix.next_block(&mut block.mix, len);
        self.delay_time.next_block(&mut block.delay_time, len);
        self.feedback.next_block(&mut block.feedback, len);
        self.stereo.next_block(&mut block.stereo, len);
        self.low_cut.next_block(&mut block.low_cut, len);
        self.high_cut.next_block(&mut block.high_cut, len);
    }

    fn snap_to_targets(&self) {
        let targets = &self.targets;
        self.gain.reset(util::db_to_gain(targets.gain_db));
        self.mix.reset(targets.mix);
        self.delay_time.reset(targets.delay_ms);
        self.feedback.reset(targets.feedback);
        self.stereo.reset(targets.stereo);
        self.low_cut.reset(targets.low_cut_hz);
        self.high_cut.reset(targets.high_cut_hz);
    }
}

/// The complete per-sample delay algorithm and its state.
pub struct SignalPath {
    sample_rate: f32,

    /// Longest delay the lines are sized for, manual or synced.
    max_delay_ms: f32,

    /// False until a `prepare()` succeeds, and again after one fails.
    prepared: bool,

    delay_line_l: DelayLine,
    delay_line_r: DelayLine,

    /// Indexed by channel, 0 = left.
    low_cut_filters: [StateVariableFilter; 2],
    high_cut_filters: [StateVariableFilter; 2],

    /// Filtered, attenuated wet signal from the previous sample.
    feedback_l: f32,
    feedback_r: f32,

    /// Cutoffs the filters were last tuned to.
    last_low_cut: f32,
    last_high_cut: f32,

    smoothers: Smoothers,
    tempo_sync: bool,
    delay_note: usize,
    tempo: Tempo,

    meter: PeakMeter,
}

impl SignalPath {
    /// Create an unprepared signal path that publishes its output levels to
    /// `meter_levels`. Delays of up to [`MAX_DELAY_MS`] are supported.
    pub fn new(meter_levels: Arc<MeterLevels>) -> Self {
        Self::with_max_delay_ms(meter_levels, MAX_DELAY_MS)
    }

    /// Like [`new()`](Self::new), but with a shorter (or longer) maximum
    /// delay. The value is validated by [`prepare()`](Self::prepare).
    pub fn with_max_delay_ms(meter_levels: Arc<MeterLevels>, max_delay_ms: f32) -> Self {
        let settings = DelaySettings::default();
        Self {
            sample_rate: 44100.0,
            max_delay_ms,
            prepared: false,
            delay_line_l: DelayLine::new(),
            delay_line_r: DelayLine::new(),
            low_cut_filters: [
                StateVariableFilter::new(FilterMode::HighPass),
                StateVariableFilter::new(FilterMode::HighPass),
            ],
            high_cut_filters: [
                StateVariableFilter::new(FilterMode::LowPass),
                StateVariableFilter::new(FilterMode::LowPass),
            ],
            feedback_l: 0.0,
            feedback_r: 0.0,
            last_low_cut: settings.low_cut_hz,
            last_high_cut: settings.high_cut_hz,
            smoothers: Smoothers::new(&settings),
            tempo_sync: settings.tempo_sync,
            delay_note: settings.delay_note,
            tempo: Tempo::default(),
            meter: PeakMeter::new(meter_levels),
        }
    }

    /// Size the delay lines and timing for a new audio configuration.
    ///
    /// Allocates, so this must run outside of the audio callback. On error
    /// the signal path stays unprepared and outputs silence until a later
    /// call succeeds.
    pub fn prepare(&mut self, sample_rate: f32, max_block_size: usize) -> Result<(), PrepareError> {
        self.prepared = false;

        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(PrepareError::InvalidSampleRate(sample_rate));
        }
        if max_block_size == 0 {
            return Err(PrepareError::InvalidBlockSize);
        }

        // 5000 ms at 48 kHz = 240000 samples, just under 1 MB per line.
        let invalid_max_delay = PrepareError::InvalidMaxDelay {
            max_delay_ms: self.max_delay_ms,
            sample_rate,
        };
        if !(self.max_delay_ms > 0.0 && self.max_delay_ms <= LONGEST_SUPPORTED_DELAY_MS) {
            return Err(invalid_max_delay);
        }
        let max_delay_samples = ms_to_samples(self.max_delay_ms, sample_rate).ceil() as usize;
        let max_delay_samples = NonZeroUsize::new(max_delay_samples).ok_or(invalid_max_delay)?;

        self.sample_rate = sample_rate;
        self.delay_line_l.configure(max_delay_samples);
        self.delay_line_r.configure(max_delay_samples);
        self.smoothers.set_sample_rate(sample_rate);

        self.prepared = true;
        self.reset();
        Ok(())
    }

    /// Clear all audio state: delay buffers, feedback, filters, and meters.
    /// Smoothed parameters jump to their current targets. Nothing is
    /// deallocated.
    pub fn reset(&mut self) {
        self.delay_line_l.reset();
        self.delay_line_r.reset();
        self.feedback_l = 0.0;
        self.feedback_r = 0.0;

        self.smoothers.snap_to_targets();
        self.last_low_cut = self.smoothers.targets.low_cut_hz;
        self.last_high_cut = self.smoothers.targets.high_cut_hz;
        for filter in &mut self.low_cut_filters {
            filter.reset();
            filter.set_cutoff(self.last_low_cut, self.sample_rate);
        }
        for filter in &mut self.high_cut_filters {
            filter.reset();
            filter.set_cutoff(self.last_high_cut, self.sample_rate);
        }

        self.tempo.reset();
        self.meter.reset();
    }

    /// Publish new parameter targets. Call once per block, before
    /// [`process_block()`](Self::process_block).
    pub fn set_targets(&mut self, settings: &DelaySettings) {
        let mut settings = settings.clamped();
        settings.delay_ms = settings.delay_ms.min(self.max_delay_ms);
        self.smoothers.set_targets(&settings);
        self.tempo_sync = settings.tempo_sync;
        self.delay_note = settings.delay_note;
    }

    /// Refresh the tempo from the host transport. Call once per block.
    pub fn update_tempo(&mut self, host_bpm: Option<f64>) {
        self.tempo.update(host_bpm);
    }

    /// Run the delay over one block of audio, in place.
    ///
    /// `channels` holds the output channels, pre-filled with input. Only
    /// the first `num_input_channels` of them carry input; the rest are
    /// cleared before processing. One output channel gets the average of
    /// the two delay channels, two or more get left and right.
    ///
    /// In debug builds the finished block is inspected and the first
    /// suspicious sample is returned. The audio itself is never touched by
    /// that check. Release builds always return `None`.
    pub fn process_block(
        &mut self,
        channels: &mut [&mut [f32]],
        num_input_channels: usize,
    ) -> Option<OutputIssue> {
        for channel in channels.iter_mut().skip(num_input_channels) {
            channel.fill(0.0);
        }

        if !self.prepared || channels.is_empty() {
            for channel in channels.iter_mut() {
                channel.fill(0.0);
            }
            return None;
        }

        let num_samples = channels.iter().map(|c| c.len()).min().unwrap_or(0);
        let stereo_out = channels.len() >= 2;
        let stereo_in = stereo_out && num_input_channels >= 2;

        // Tempo and note index are fixed for the whole block.
        let synced_delay_ms = self.synced_delay_ms();
        let max_delay_samples = (self.delay_line_l.capacity() - 1) as f32;

        self.meter.begin_block();

        let mut block = SmoothedBlock::new();
        let mut block_start = 0;
        while block_start < num_samples {
            let block_len = (num_samples - block_start).min(SMOOTHING_BLOCK);

            // 1. Smoothers, advanced by the number of samples in this block
            self.smoothers.next_block(&mut block, block_len);

            for j in 0..block_len {
                let i = block_start + j;

                // 2. Delay time
                let delay_ms = if self.tempo_sync {
                    synced_delay_ms
                } else {
                    block.delay_time[j]
                };
                let delay_samples =
                    ms_to_samples(delay_ms, self.sample_rate).clamp(0.0, max_delay_samples);

                // 3. Filter cutoffs
                self.update_filter_cutoffs(block.low_cut[j], block.high_cut[j]);

                // 4. Input, folded to mono for the delay network
                let dry_l = channels[0][i];
                let (dry_r, mono) = if stereo_in {
                    let dry_r = channels[1][i];
                    (dry_r, (dry_l + dry_r) * 0.5)
                } else {
                    (dry_l, dry_l)
                };

                // 5. Write with crossed feedback
                let (pan_l, pan_r) = panning_equal_power(block.stereo[j]);
                self.delay_line_l.write(mono * pan_l + self.feedback_r);
                self.delay_line_r.write(mono * pan_r + self.feedback_l);

                // 6. Read
                let wet_l = self.delay_line_l.read(delay_samples);
                let wet_r = self.delay_line_r.read(delay_samples);

                // 7. Attenuate, then low cut, then high cut
                let feedback = block.feedback[j];
                self.feedback_l = self.high_cut_filters[0]
                    .process(self.low_cut_filters[0].process(wet_l * feedback));
                self.feedback_r = self.high_cut_filters[1]
                    .process(self.low_cut_filters[1].process(wet_r * feedback));

                // 8. Mix
                let mix = block.mix[j];
                let mix_l = dry_l + wet_l * mix;
                let mix_r = dry_r + wet_r * mix;

                // 9. Gain
                let gain = block.gain[j];
                let out_l = mix_l * gain;
                let out_r = mix_r * gain;

                // 10. Meters
                if stereo_out {
                    channels[0][i] = out_l;
                    channels[1][i] = out_r;
                    self.meter.accumulate(out_l, out_r);
                } else {
                    let out = (out_l + out_r) * 0.5;
                    channels[0][i] = out;
                    self.meter.accumulate(out, out);
                }
            }

            block_start += block_len;
        }

        self.meter.end_block();

        if cfg!(debug_assertions) {
            inspect_block(channels)
        } else {
            None
        }
    }

    /// How long the effect keeps ringing after the input goes silent.
    ///
    /// Each repeat is `feedback` times the previous one, so it takes
    /// `log(0.001) / log(feedback)` repeats to fall to -60 dB. Without
    /// feedback there's a single repeat.
    pub fn tail_samples(&self) -> u32 {
        let delay_ms = if self.tempo_sync {
            self.synced_delay_ms()
        } else {
            self.smoothers.targets.delay_ms
        };
        let delay_samples = ms_to_samples(delay_ms, self.sample_rate);
        let feedback = self.smoothers.targets.feedback;

        if feedback > 0.001 {
            let repeats = -3.0 / feedback.log10();
            (repeats * delay_samples) as u32
        } else {
            delay_samples as u32
        }
    }

    /// The tempo-synced delay time, capped at the maximum delay.
    fn synced_delay_ms(&self) -> f32 {
        (self.tempo.milliseconds_for_note_length(self.delay_note) as f32).min(self.max_delay_ms)
    }

    /// Retune the feedback filters, but only when a cutoff has moved.
    #[inline]
    fn update_filter_cutoffs(&mut self, low_cut: f32, high_cut: f32) {
        if low_cut != self.last_low_cut {
            self.last_low_cut = low_cut;
            for filter in &mut self.low_cut_filters {
                filter.set_cutoff(low_cut, self.sample_rate);
            }
        }

        if high_cut != self.last_high_cut {
            self.last_high_cut = high_cut;
            for filter in &mut self.high_cut_filters {
                filter.set_cutoff(high_cut, self.sample_rate);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_1_SQRT_2;

    const SAMPLE_RATE: f32 = 48000.0;
    const BLOCK_SIZE: usize = 512;

    fn prepared(settings: DelaySettings) -> (SignalPath, Arc<MeterLevels>) {
        let levels = Arc::new(MeterLevels::default());
        let mut path = SignalPath::new(levels.clone());
        path.prepare(SAMPLE_RATE, BLOCK_SIZE).unwrap();
        path.set_targets(&settings);
        path.reset();
        (path, levels)
    }

    /// Process two channels in host-sized blocks.
    fn run_stereo(path: &mut SignalPath, left: &mut [f32], right: &mut [f32], inputs: usize) {
        for (l, r) in left.chunks_mut(BLOCK_SIZE).zip(right.chunks_mut(BLOCK_SIZE)) {
            let mut channels = [l, r];
            path.process_block(&mut channels, inputs);
        }
    }

    fn impulse(len: usize) -> Vec<f32> {
        let mut signal = vec![0.0; len];
        signal[0] = 1.0;
        signal
    }

    /// With the mix at zero the output is the dry input times the gain,
    /// exactly, even while the delay lines are busy echoing.
    #[test]
    fn test_zero_mix_is_dry_times_gain() {
        let settings = DelaySettings {
            gain_db: -6.0,
            mix: 0.0,
            feedback: 0.5,
            delay_ms: 5.0,
            ..DelaySettings::default()
        };
        let (mut path, _) = prepared(settings);
        let gain = util::db_to_gain(-6.0);

        let input_l: Vec<f32> = (0..4096).map(|i| ((i as f32) * 0.01).sin() * 0.8).collect();
        let input_r: Vec<f32> = (0..4096).map(|i| ((i as f32) * 0.03).cos() * 0.5).collect();
        let mut left = input_l.clone();
        let mut right = input_r.clone();
        run_stereo(&mut path, &mut left, &mut right, 2);

        for i in 0..input_l.len() {
            assert_eq!(left[i], input_l[i] * gain, "left sample {i}");
            assert_eq!(right[i], input_r[i] * gain, "right sample {i}");
        }
    }

    #[test]
    fn test_impulse_passes_through_at_unity() {
        let settings = DelaySettings {
            mix: 0.0,
            ..DelaySettings::default()
        };
        let (mut path, _) = prepared(settings);

        let mut left = impulse(64);
        let mut right = impulse(64);
        run_stereo(&mut path, &mut left, &mut right, 2);

        assert_eq!(left[0], 1.0);
        assert_eq!(right[0], 1.0);
    }

    /// A mono input is copied to both sides. Whatever garbage was in the
    /// second output channel is discarded.
    #[test]
    fn test_mono_input_is_duplicated() {
        let settings = DelaySettings {
            mix: 0.0,
            ..DelaySettings::default()
        };
        let (mut path, _) = prepared(settings);

        let input: Vec<f32> = (0..1024).map(|i| ((i as f32) * 0.02).sin()).collect();
        let mut left = input.clone();
        let mut right = vec![123.0; input.len()];
        run_stereo(&mut path, &mut left, &mut right, 1);

        assert_eq!(left, input);
        assert_eq!(right, input);
    }

    /// With a centred pan, a mono input produces identical echoes on both
    /// sides too.
    #[test]
    fn test_mono_input_centred_echoes_match() {
        let settings = DelaySettings {
            delay_ms: 10.0,
            feedback: 0.5,
            ..DelaySettings::default()
        };
        let (mut path, _) = prepared(settings);

        let mut left = impulse(4800);
        let mut right = vec![0.0; 4800];
        run_stereo(&mut path, &mut left, &mut right, 1);

        for i in 0..left.len() {
            assert!((left[i] - right[i]).abs() < 1e-6, "sample {i}");
        }
    }

    /// The first echo arrives exactly `delay_ms` later, panned by the
    /// equal-power law, with nothing in between.
    #[test]
    fn test_manual_delay_time() {
        let settings = DelaySettings {
            delay_ms: 10.0,
            ..DelaySettings::default()
        };
        let (mut path, _) = prepared(settings);

        // 10 ms at 48 kHz
        let delay = 480;
        let mut left = impulse(2048);
        let mut right = impulse(2048);
        run_stereo(&mut path, &mut left, &mut right, 2);

        assert_eq!(left[0], 1.0);
        for i in 1..left.len() {
            if i == delay {
                assert!((left[i] - FRAC_1_SQRT_2).abs() < 1e-6, "echo was {}", left[i]);
                assert!((right[i] - FRAC_1_SQRT_2).abs() < 1e-6, "echo was {}", right[i]);
            } else {
                assert_eq!(left[i], 0.0, "left sample {i}");
                assert_eq!(right[i], 0.0, "right sample {i}");
            }
        }
    }

    /// With tempo sync on, the note length wins over the millisecond value.
    #[test]
    fn test_tempo_synced_delay_time() {
        let settings = DelaySettings {
            delay_ms: 100.0,
            tempo_sync: true,
            delay_note: QUARTER_NOTE,
            ..DelaySettings::default()
        };
        let (mut path, _) = prepared(settings);

        // Quarter note at 240 BPM = 250 ms = 12000 samples
        path.update_tempo(Some(240.0));
        let mut left = impulse(13000);
        let mut right = impulse(13000);
        run_stereo(&mut path, &mut left, &mut right, 2);

        let (peak_index, peak) = left[1..]
            .iter()
            .enumerate()
            .map(|(i, v)| (i + 1, v.abs()))
            .fold((0, 0.0), |best, item| if item.1 > best.1 { item } else { best });
        assert_eq!(peak_index, 12000);
        assert!((peak - FRAC_1_SQRT_2).abs() < 1e-6);
    }

    /// No host tempo means 120 BPM, so a quarter note is 500 ms.
    #[test]
    fn test_tempo_sync_without_host_tempo() {
        let settings = DelaySettings {
            tempo_sync: true,
            delay_note: QUARTER_NOTE,
            ..DelaySettings::default()
        };
        let (mut path, _) = prepared(settings);

        path.update_tempo(Some(90.0));
        path.update_tempo(None);
        assert_eq!(path.synced_delay_ms(), 500.0);
    }

    /// Synced times longer than the delay lines can hold are capped.
    #[test]
    fn test_tempo_synced_delay_is_capped() {
        let settings = DelaySettings {
            tempo_sync: true,
            delay_note: 15,
            ..DelaySettings::default()
        };
        let (mut path, _) = prepared(settings);

        // A whole note at 20 BPM would be 12 seconds.
        path.update_tempo(Some(20.0));
        assert_eq!(path.synced_delay_ms(), MAX_DELAY_MS);

        let mut left = impulse(BLOCK_SIZE);
        let mut right = impulse(BLOCK_SIZE);
        run_stereo(&mut path, &mut left, &mut right, 2);
        assert!(left.iter().all(|s| s.is_finite()));
    }

    /// Panned hard left, the first echo is on the left only. The crossed
    /// feedback then carries it to the right line, so the second echo
    /// comes out on the right.
    #[test]
    fn test_feedback_crosses_channels() {
        let settings = DelaySettings {
            delay_ms: 10.0,
            feedback: 0.5,
            stereo: -1.0,
            ..DelaySettings::default()
        };
        let (mut path, _) = prepared(settings);

        let delay = 480;
        let mut left = impulse(4096);
        let mut right = impulse(4096);
        run_stereo(&mut path, &mut left, &mut right, 2);

        assert!((left[delay] - 1.0).abs() < 1e-6);

        // The right line only receives the left line's feedback, which
        // starts one sample after the first echo.
        for (i, sample) in right.iter().enumerate().take(2 * delay + 1).skip(1) {
            assert_eq!(*sample, 0.0, "right sample {i}");
        }
        let second_echo: f32 = right[2 * delay + 1..2 * delay + 64]
            .iter()
            .map(|s| s.abs())
            .sum();
        assert!(second_echo > 0.1, "second echo energy {second_echo}");
    }

    /// High feedback with a constant input stays bounded.
    #[test]
    fn test_feedback_is_stable() {
        let settings = DelaySettings {
            delay_ms: MIN_DELAY_MS,
            feedback: MAX_FEEDBACK,
            ..DelaySettings::default()
        };
        let (mut path, _) = prepared(settings);

        let mut left = vec![1.0; 20000];
        let mut right = vec![1.0; 20000];
        run_stereo(&mut path, &mut left, &mut right, 2);

        for (i, sample) in left.iter().chain(right.iter()).enumerate() {
            assert!(sample.is_finite(), "sample {i} not finite");
            assert!(sample.abs() < 50.0, "sample {i} diverged to {sample}");
        }
        assert!(path.feedback_l.abs() < 50.0);
        assert!(path.feedback_r.abs() < 50.0);
    }

    /// Echoes die away once the input stops.
    #[test]
    fn test_feedback_decays() {
        let settings = DelaySettings {
            delay_ms: 10.0,
            feedback: 0.5,
            ..DelaySettings::default()
        };
        let (mut path, _) = prepared(settings);

        let mut left = impulse(48000);
        let mut right = impulse(48000);
        run_stereo(&mut path, &mut left, &mut right, 2);

        let tail_peak = left[40000..].iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(tail_peak < 1e-6, "tail still at {tail_peak}");
    }

    #[test]
    fn test_mono_output_averages_channels() {
        let settings = DelaySettings {
            mix: 0.0,
            gain_db: 6.0,
            ..DelaySettings::default()
        };
        let (mut path, _) = prepared(settings);
        let gain = util::db_to_gain(6.0);

        let input: Vec<f32> = (0..256).map(|i| ((i as f32) * 0.1).sin() * 0.3).collect();
        let mut mono = input.clone();
        {
            let mut channels = [&mut mono[..]];
            path.process_block(&mut channels, 1);
        }

        for i in 0..input.len() {
            assert_eq!(mono[i], input[i] * gain, "sample {i}");
        }
    }

    #[test]
    fn test_meter_reports_block_peaks() {
        let settings = DelaySettings {
            mix: 0.0,
            ..DelaySettings::default()
        };
        let (mut path, levels) = prepared(settings);

        let mut left = vec![0.1, -0.5, 0.2, 0.0];
        let mut right = vec![0.25, 0.0, -0.1, 0.0];
        {
            let mut channels = [&mut left[..], &mut right[..]];
            path.process_block(&mut channels, 2);
        }

        assert_eq!(levels.levels(), (0.5, 0.25));
    }

    /// Before a successful prepare, the output is silence.
    #[test]
    fn test_unprepared_outputs_silence() {
        let mut path = SignalPath::new(Arc::new(MeterLevels::default()));
        let mut left = vec![0.5; 64];
        let mut right = vec![0.5; 64];
        run_stereo(&mut path, &mut left, &mut right, 2);

        assert!(left.iter().chain(right.iter()).all(|s| *s == 0.0));
    }

    #[test]
    fn test_prepare_rejects_bad_configurations() {
        let mut path = SignalPath::new(Arc::new(MeterLevels::default()));

        assert_eq!(
            path.prepare(0.0, BLOCK_SIZE),
            Err(PrepareError::InvalidSampleRate(0.0))
        );
        for bad in [f32::NAN, f32::INFINITY, 1.0e12, -1.0, 30.0, MIN_SAMPLE_RATE - 1.0] {
            assert!(matches!(
                path.prepare(bad, BLOCK_SIZE),
                Err(PrepareError::InvalidSampleRate(_))
            ));
        }
        assert_eq!(
            path.prepare(SAMPLE_RATE, 0),
            Err(PrepareError::InvalidBlockSize)
        );
        assert_eq!(path.prepare(MIN_SAMPLE_RATE, BLOCK_SIZE), Ok(()));

        for max_delay_ms in [0.0, -10.0, f32::NAN, f32::INFINITY, 1.0e9] {
            let mut path = SignalPath::with_max_delay_ms(Arc::new(MeterLevels::default()), max_delay_ms);
            assert!(
                matches!(
                    path.prepare(SAMPLE_RATE, BLOCK_SIZE),
                    Err(PrepareError::InvalidMaxDelay { .. })
                ),
                "max delay {max_delay_ms} ms should be rejected"
            );
        }
    }

    /// A shorter maximum delay sizes the lines accordingly and caps both
    /// manual and synced delay times.
    #[test]
    fn test_custom_max_delay() {
        let levels = Arc::new(MeterLevels::default());
        let mut path = SignalPath::with_max_delay_ms(levels, 20.0);
        path.prepare(SAMPLE_RATE, BLOCK_SIZE).unwrap();
        assert_eq!(path.delay_line_l.capacity(), 961);

        path.set_targets(&DelaySettings {
            delay_ms: 1000.0,
            ..DelaySettings::default()
        });
        path.reset();

        // Capped at 20 ms = 960 samples.
        let mut left = impulse(1024);
        let mut right = impulse(1024);
        run_stereo(&mut path, &mut left, &mut right, 2);
        assert!((left[960] - FRAC_1_SQRT_2).abs() < 1e-6);

        path.set_targets(&DelaySettings {
            tempo_sync: true,
            ..DelaySettings::default()
        });
        assert_eq!(path.synced_delay_ms(), 20.0);
    }

    /// A failed prepare leaves the path unusable even if an earlier one
    /// succeeded.
    #[test]
    fn test_failed_prepare_disables_processing() {
        let (mut path, _) = prepared(DelaySettings::default());
        assert!(path.prepare(-1.0, BLOCK_SIZE).is_err());

        let mut left = vec![0.5; 64];
        let mut right = vec![0.5; 64];
        run_stereo(&mut path, &mut left, &mut right, 2);
        assert!(left.iter().chain(right.iter()).all(|s| *s == 0.0));

        path.prepare(SAMPLE_RATE, BLOCK_SIZE).unwrap();
        let mut left = vec![0.5; 64];
        let mut right = vec![0.5; 64];
        run_stereo(&mut path, &mut left, &mut right, 2);
        assert_eq!(left[0], 0.5);
    }

    /// Reset throws away pending echoes.
    #[test]
    fn test_reset_clears_echoes() {
        let settings = DelaySettings {
            delay_ms: 10.0,
            feedback: 0.8,
            ..DelaySettings::default()
        };
        let (mut path, _) = prepared(settings);

        let mut left = impulse(300);
        let mut right = impulse(300);
        run_stereo(&mut path, &mut left, &mut right, 2);

        path.reset();

        let mut left = vec![0.0; 4800];
        let mut right = vec![0.0; 4800];
        run_stereo(&mut path, &mut left, &mut right, 2);
        assert!(left.iter().chain(right.iter()).all(|s| *s == 0.0));
    }

    #[test]
    fn test_out_of_range_settings_are_clamped() {
        let wild = DelaySettings {
            gain_db: f32::NAN,
            mix: -3.0,
            delay_ms: 1.0e9,
            feedback: 10.0,
            stereo: 7.0,
            low_cut_hz: -100.0,
            high_cut_hz: f32::INFINITY,
            delay_note: 400,
            tempo_sync: false,
        };
        let clamped = wild.clamped();
        assert_eq!(clamped.gain_db, 0.0);
        assert_eq!(clamped.mix, 0.0);
        assert_eq!(clamped.delay_ms, MAX_DELAY_MS);
        assert_eq!(clamped.feedback, MAX_FEEDBACK);
        assert_eq!(clamped.stereo, 1.0);
        assert_eq!(clamped.low_cut_hz, MIN_CUTOFF_HZ);
        assert_eq!(clamped.high_cut_hz, MAX_CUTOFF_HZ);
        assert_eq!(clamped.delay_note, 15);

        let (mut path, _) = prepared(wild);
        let mut left = vec![0.5; 2048];
        let mut right = vec![0.5; 2048];
        run_stereo(&mut path, &mut left, &mut right, 2);
        assert!(left.iter().chain(right.iter()).all(|s| s.is_finite()));
    }

    /// Cutoff changes glide to the new value, and the filters end up tuned
    /// to exactly the target.
    #[test]
    fn test_cutoff_changes_are_tracked() {
        let (mut path, _) = prepared(DelaySettings::default());
        path.set_targets(&DelaySettings {
            low_cut_hz: 500.0,
            high_cut_hz: 3000.0,
            ..DelaySettings::default()
        });

        let mut left = vec![0.0; 64];
        let mut right = vec![0.0; 64];
        run_stereo(&mut path, &mut left, &mut right, 2);
        assert!(path.last_low_cut > MIN_CUTOFF_HZ && path.last_low_cut < 500.0);
        assert!(path.last_high_cut < MAX_CUTOFF_HZ && path.last_high_cut > 3000.0);

        // Well past the 20 ms ramp.
        let mut left = vec![0.0; 2048];
        let mut right = vec![0.0; 2048];
        run_stereo(&mut path, &mut left, &mut right, 2);
        assert_eq!(path.last_low_cut, 500.0);
        assert_eq!(path.last_high_cut, 3000.0);
    }

    /// Gain changes ramp instead of jumping.
    #[test]
    fn test_gain_change_is_smoothed() {
        let settings = DelaySettings {
            mix: 0.0,
            ..DelaySettings::default()
        };
        let (mut path, _) = prepared(settings);
        path.set_targets(&DelaySettings {
            mix: 0.0,
            gain_db: -12.0,
            ..DelaySettings::default()
        });

        let mut left = vec![1.0; 2048];
        let mut right = vec![1.0; 2048];
        run_stereo(&mut path, &mut left, &mut right, 2);

        let target = util::db_to_gain(-12.0);
        assert!(left[0] < 1.0 && left[0] > 0.99);
        for pair in left[..960].windows(2) {
            assert!(pair[1] <= pair[0]);
            assert!(pair[0] - pair[1] < 0.001);
        }
        assert_eq!(left[2047], target);
    }

    #[test]
    fn test_tail_length() {
        let (mut path, _) = prepared(DelaySettings {
            delay_ms: 10.0,
            ..DelaySettings::default()
        });
        assert_eq!(path.tail_samples(), 480);

        path.set_targets(&DelaySettings {
            delay_ms: 10.0,
            feedback: 0.5,
            ..DelaySettings::default()
        });
        // log(0.001) / log(0.5) ≈ 9.97 repeats
        let tail = path.tail_samples();
        assert!((4780..=4790).contains(&tail), "tail was {tail}");
    }

    /// Debug builds flag runaway output without altering it.
    #[test]
    fn test_loud_output_is_flagged_not_altered() {
        let settings = DelaySettings {
            mix: 0.0,
            gain_db: MAX_GAIN_DB,
            ..DelaySettings::default()
        };
        let (mut path, _) = prepared(settings);
        let gain = util::db_to_gain(MAX_GAIN_DB);

        let mut left = vec![0.0, 0.9, 0.0];
        let mut right = vec![0.0; 3];
        let issue = {
            let mut channels = [&mut left[..], &mut right[..]];
            path.process_block(&mut channels, 2)
        };

        assert_eq!(left[1], 0.9 * gain);
        if cfg!(debug_assertions) {
            assert_eq!(
                issue,
                Some(OutputIssue::TooLoud {
                    channel: 0,
                    index: 1,
                    value: 0.9 * gain
                })
            );
        } else {
            assert_eq!(issue, None);
        }
    }

    fn prepared_smoothers() -> Smoothers {
        let mut smoothers = Smoothers::new(&DelaySettings::default());
        smoothers.set_sample_rate(SAMPLE_RATE);
        smoothers
    }

    /// Pull `samples` values of one smoother out, `SMOOTHING_BLOCK` at a
    /// time, the way `process_block()` does.
    fn collect(
        smoothers: &Smoothers,
        samples: usize,
        pick: fn(&SmoothedBlock) -> &[f32; SMOOTHING_BLOCK],
    ) -> Vec<f32> {
        let mut block = SmoothedBlock::new();
        let mut values = Vec::with_capacity(samples);
        while values.len() < samples {
            let len = (samples - values.len()).min(SMOOTHING_BLOCK);
            smoothers.next_block(&mut block, len);
            values.extend_from_slice(&pick(&block)[..len]);
        }
        values
    }

    /// A linear ramp rises monotonically, never overshoots, and lands on
    /// the target after exactly 20 ms.
    #[test]
    fn test_linear_ramp_settles_on_target() {
        let mut smoothers = prepared_smoothers();
        smoothers.set_targets(&DelaySettings {
            feedback: 0.5,
            ..DelaySettings::default()
        });

        // 20 ms at 48 kHz
        let values = collect(&smoothers, 960, |b| &b.feedback);
        let mut previous = 0.0;
        for (i, value) in values.iter().enumerate() {
            assert!(*value >= previous, "sample {i}: {value} < {previous}");
            assert!(*value <= 0.5, "sample {i}: overshoot to {value}");
            assert!(value - previous < 0.5 / 960.0 + 1e-5);
            previous = *value;
        }
        assert_eq!(values[959], 0.5);
        assert_eq!(collect(&smoothers, 64, |b| &b.feedback), vec![0.5; 64]);
    }

    /// Manual delay changes glide exponentially: fast at first, monotonic,
    /// no overshoot, and settled once the glide time has passed.
    #[test]
    fn test_delay_time_glide() {
        let mut smoothers = prepared_smoothers();
        smoothers.set_targets(&DelaySettings {
            delay_ms: 1000.0,
            ..DelaySettings::default()
        });

        // 200 ms at 48 kHz
        let values = collect(&smoothers, 9600, |b| &b.delay_time);
        let mut previous = 100.0;
        for (i, value) in values.iter().enumerate() {
            assert!(*value >= previous, "sample {i}: {value} < {previous}");
            assert!(*value <= 1000.0, "sample {i}: overshoot to {value}");
            previous = *value;
        }
        assert!(values[4800] > 550.0, "halfway value {}", values[4800]);

        let settled = collect(&smoothers, 64, |b| &b.delay_time);
        assert!((settled[63] - 1000.0).abs() < 1e-3, "got {}", settled[63]);
    }

    /// Publishing the same targets every block must not restart a ramp
    /// that is already under way.
    #[test]
    fn test_unchanged_targets_keep_ramping() {
        let mut smoothers = prepared_smoothers();
        let settings = DelaySettings {
            mix: 0.0,
            ..DelaySettings::default()
        };

        let mut values = Vec::new();
        for _ in 0..15 {
            smoothers.set_targets(&settings);
            values.extend(collect(&smoothers, 64, |b| &b.mix));
        }

        // 15 blocks of 64 = 960 samples, the full ramp.
        assert!((values[479] - 0.5).abs() < 1e-3, "midway {}", values[479]);
        assert_eq!(values[959], 0.0);
    }

    /// Host blocks longer than the smoothing run still see every sample
    /// of the ramp, with no jump at the run boundaries.
    #[test]
    fn test_gain_ramp_is_continuous_across_runs() {
        let settings = DelaySettings {
            mix: 0.0,
            ..DelaySettings::default()
        };
        let (mut path, _) = prepared(settings);
        path.set_targets(&DelaySettings {
            mix: 0.0,
            gain_db: MIN_GAIN_DB,
            ..DelaySettings::default()
        });

        let mut left = vec![1.0; 200];
        let mut right = vec![1.0; 200];
        {
            let mut channels = [&mut left[..], &mut right[..]];
            path.process_block(&mut channels, 2);
        }

        let step = left[0] - left[1];
        assert!(step > 0.0);
        for (i, pair) in left.windows(2).enumerate() {
            assert!(((pair[0] - pair[1]) - step).abs() < 1e-5, "sample {i}");
        }
    }
}
