//! # Plugin Parameters
//!
//! Parameters are the knobs and switches the user sees in the DAW. Each
//! parameter has:
//!
//! - A **unique string ID** (`#[id = "..."]`) that the host uses to save
//!   and recall presets. Once published, never change these IDs or existing
//!   presets will break.
//! - A **human-readable name** shown in the DAW's UI.
//! - A **range** and a **default value**.
//!
//! ## Where's the smoothing?
//!
//! None of these parameters use nih-plug's built-in smoothers. The values
//! are read once per block by [`PluginParams::settings()`] and handed to
//! the signal path, which owns one nih-plug `Smoother` per parameter and
//! advances them all together.

use nih_plug::prelude::*;

use crate::dsp::signal_path::{
    DelaySettings, MAX_CUTOFF_HZ, MAX_DELAY_MS, MAX_FEEDBACK, MAX_GAIN_DB, MIN_CUTOFF_HZ,
    MIN_DELAY_MS, MIN_GAIN_DB,
};

/// Musical note lengths for tempo sync, shortest first.
///
/// The variant order must match `tempo::NOTE_LENGTH_MULTIPLIERS`; the
/// signal path looks the multiplier up by index.
#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteLength {
    #[id = "1_32"]
    #[name = "1/32"]
    ThirtySecond,
    #[id = "1_16_trip"]
    #[name = "1/16 triplet"]
    SixteenthTriplet,
    #[id = "1_32_dot"]
    #[name = "1/32 dotted"]
    ThirtySecondDotted,
    #[id = "1_16"]
    #[name = "1/16"]
    Sixteenth,
    #[id = "1_8_trip"]
    #[name = "1/8 triplet"]
    EighthTriplet,
    #[id = "1_16_dot"]
    #[name = "1/16 dotted"]
    SixteenthDotted,
    #[id = "1_8"]
    #[name = "1/8"]
    Eighth,
    #[id = "1_4_trip"]
    #[name = "1/4 triplet"]
    QuarterTriplet,
    #[id = "1_8_dot"]
    #[name = "1/8 dotted"]
    EighthDotted,
    #[id = "1_4"]
    #[name = "1/4"]
    Quarter,
    #[id = "1_2_trip"]
    #[name = "1/2 triplet"]
    HalfTriplet,
    #[id = "1_4_dot"]
    #[name = "1/4 dotted"]
    QuarterDotted,
    #[id = "1_2"]
    #[name = "1/2"]
    Half,
    #[id = "1_1_trip"]
    #[name = "1/1 triplet"]
    WholeTriplet,
    #[id = "1_2_dot"]
    #[name = "1/2 dotted"]
    HalfDotted,
    #[id = "1_1"]
    #[name = "1/1"]
    Whole,
}

/// All user-facing parameters for the Loveless Stereo Delay.
#[derive(Params)]
pub struct PluginParams {
    /// **Output Gain**, applied after the dry/wet mix. ±12 dB.
    #[id = "gain"]
    pub gain: FloatParam,

    /// **Delay Time** in milliseconds, used when tempo sync is off.
    ///
    /// The skewed range gives the short end of the knob more travel:
    /// 5→100 ms is a much bigger perceptual change than 4900→5000 ms.
    #[id = "delay"]
    pub delay_time: FloatParam,

    /// **Mix**: how much of the wet signal is added on top of the dry
    /// signal. The dry signal always passes at full level.
    #[id = "mix"]
    pub mix: FloatParam,

    /// **Feedback**: how much of each echo is sent back around. Capped at
    /// 95% so repeats always die out eventually.
    #[id = "fdbk"]
    pub feedback: FloatParam,

    /// **Stereo**: where the echoes sit in the stereo field. Far left or
    /// far right turns the crossed feedback into a ping-pong delay.
    #[id = "stereo"]
    pub stereo: FloatParam,

    /// **Low Cut**: highpass in the feedback path. Each repeat loses more
    /// bass.
    #[id = "lowcut"]
    pub low_cut: FloatParam,

    /// **High Cut**: lowpass in the feedback path. Each repeat gets darker.
    #[id = "highcut"]
    pub high_cut: FloatParam,

    /// **Tempo Sync**: take the delay time from the host tempo and
    /// `delay_note` instead of `delay_time`.
    #[id = "sync"]
    pub tempo_sync: BoolParam,

    /// **Delay Note**: note length used when tempo sync is on.
    #[id = "note"]
    pub delay_note: EnumParam<NoteLength>,
}

impl Default for PluginParams {
    fn default() -> Self {
        Self {
            gain: FloatParam::new(
                "Output Gain",
                0.0,
                FloatRange::Linear {
                    min: MIN_GAIN_DB,
                    max: MAX_GAIN_DB,
                },
            )
            .with_unit(" dB")
            .with_step_size(0.1),

            delay_time: FloatParam::new(
                "Delay Time",
                100.0,
                FloatRange::Skewed {
                    min: MIN_DELAY_MS,
                    max: MAX_DELAY_MS,
                    factor: FloatRange::skew_factor(-2.0),
                },
            )
            .with_unit(" ms")
            .with_step_size(0.1),

            mix: FloatParam::new("Mix", 1.0, FloatRange::Linear { min: 0.0, max: 1.0 })
                .with_unit("%")
                .with_value_to_string(formatters::v2s_f32_percentage(1))
                .with_string_to_value(formatters::s2v_f32_percentage()),

            feedback: FloatParam::new(
                "Feedback",
                0.0,
                FloatRange::Linear {
                    min: 0.0,
                    max: MAX_FEEDBACK,
                },
            )
            .with_unit("%")
            .with_value_to_string(formatters::v2s_f32_percentage(1))
            .with_string_to_value(formatters::s2v_f32_percentage()),

            stereo: FloatParam::new(
                "Stereo",
                0.0,
                FloatRange::Linear {
                    min: -1.0,
                    max: 1.0,
                },
            )
            .with_unit("%")
            .with_value_to_string(formatters::v2s_f32_percentage(0))
            .with_string_to_value(formatters::s2v_f32_percentage()),

            low_cut: FloatParam::new(
                "Low Cut",
                MIN_CUTOFF_HZ,
                FloatRange::Skewed {
                    min: MIN_CUTOFF_HZ,
                    max: MAX_CUTOFF_HZ,
                    factor: FloatRange::skew_factor(-2.0),
                },
            )
            .with_unit(" Hz")
            .with_step_size(1.0),

            high_cut: FloatParam::new(
                "High Cut",
                MAX_CUTOFF_HZ,
                FloatRange::Skewed {
                    min: MIN_CUTOFF_HZ,
                    max: MAX_CUTOFF_HZ,
                    factor: FloatRange::skew_factor(-2.0),
                },
            )
            .with_unit(" Hz")
            .with_step_size(1.0),

            tempo_sync: BoolParam::new("Tempo Sync", false),

            delay_note: EnumParam::new("Delay Note", NoteLength::Quarter),
        }
    }
}

impl PluginParams {
    /// Snapshot the current parameter values for the signal path.
    ///
    /// Reading a parameter is a single atomic load, so this is safe to call
    /// from the audio thread once per block.
    pub fn settings(&self) -> DelaySettings {
        DelaySettings {
            gain_db: self.gain.value(),
            mix: self.mix.value(),
            delay_ms: self.delay_time.value(),
            feedback: self.feedback.value(),
            stereo: self.stereo.value(),
            low_cut_hz: self.low_cut.value(),
            high_cut_hz: self.high_cut.value(),
            delay_note: self.delay_note.value().to_index(),
            tempo_sync: self.tempo_sync.value(),
        }
    }
}
