//! # Loveless Stereo Delay: An AU/VST3/CLAP Stereo Delay Plugin
//!
//! A tempo-aware stereo delay built with
//! [nih-plug](https://github.com/robbert-vdh/nih-plug). Outputs Audio Unit
//! (AUv2), VST3, and CLAP formats from a single codebase.
//!
//! The plugin is split in two:
//!
//! - This file is the **shell**. It talks to the host: it declares the
//!   supported channel layouts, hands the parameter values and the host
//!   tempo to the DSP once per block, and forwards the lifecycle calls
//!   (`initialize`, `reset`).
//! - [`dsp::signal_path`] is the **core**. It knows nothing about plugin
//!   formats and does all of the per-sample work: two delay lines with
//!   crossed, filtered feedback, equal-power panning of the echoes,
//!   dry/wet mixing, and output gain.
//!
//! ## Signal Flow
//!
//! ```text
//! Input ──┬──────────────────────────────────── dry ─────────────────┐
//!         │                                                          │
//!         └─► mono ──► pan ──►(+)──► [Delay L/R] ──┬──► × mix ──────►(+)──► × gain ──► Output
//!                              ▲                   │
//!                              │                   ▼
//!                              └── HighCut ◄── LowCut ◄── × feedback
//!                                   (left feeds right, right feeds left)
//! ```

pub mod dsp;
pub mod params;

use std::num::NonZeroU32;
use std::sync::Arc;

use dsp::meter::MeterLevels;
use dsp::signal_path::SignalPath;
use nih_plug::prelude::*;
use params::PluginParams;

/// The main plugin struct.
///
/// Parameters (`PluginParams`) are shared with the host via `Arc` and can
/// be read from any thread. The signal path is owned exclusively by the
/// audio thread and only touched in `initialize()`, `reset()`, and
/// `process()`, which the host never runs concurrently.
struct LovelessStereoDelay {
    params: Arc<PluginParams>,

    signal_path: SignalPath,

    /// Input channel count of the active layout. The host buffer always has
    /// the output channel count; any channels past this one hold no input.
    num_input_channels: usize,

    /// Set once an output problem has been logged, so a runaway feedback
    /// loop doesn't flood the log. Cleared on reset.
    issue_reported: bool,
}

impl Default for LovelessStereoDelay {
    fn default() -> Self {
        Self {
            params: Arc::new(PluginParams::default()),
            signal_path: SignalPath::new(Arc::new(MeterLevels::default())),
            // Replaced in initialize() once the host picks a layout.
            num_input_channels: 2,
            issue_reported: false,
        }
    }
}

impl Plugin for LovelessStereoDelay {
    const NAME: &'static str = "Loveless Stereo Delay";
    const VENDOR: &'static str = "Loveless Audio";
    const URL: &'static str = "";
    const EMAIL: &'static str = "steve.loveless@gmail.com";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // The host picks the first layout that matches the track. Stereo
    // tracks are the common case, so that comes first. A mono source on a
    // stereo bus still gets stereo echoes.
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;

    // Automation points split the buffer, so reading the parameters once
    // per `process()` call is still sample accurate.
    const SAMPLE_ACCURATE_AUTOMATION: bool = true;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    /// Called when the plugin is loaded or the audio configuration
    /// changes. Sizes the delay lines for the new sample rate.
    ///
    /// Returning `false` tells the host this configuration can't be used.
    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        self.num_input_channels = audio_io_layout
            .main_input_channels
            .map(|c| c.get() as usize)
            .unwrap_or(0);

        let sample_rate = buffer_config.sample_rate;
        let max_block_size = buffer_config.max_buffer_size as usize;

        match self.signal_path.prepare(sample_rate, max_block_size) {
            Ok(()) => {
                nih_log!(
                    "Prepared for {sample_rate} Hz, {max_block_size} samples per block, {} input channel(s)",
                    self.num_input_channels
                );
                true
            }
            Err(err) => {
                nih_error!("Rejected audio configuration: {err}");
                false
            }
        }
    }

    /// Called when playback stops or the plugin is bypassed.
    ///
    /// The current parameter values are published first so the smoothers
    /// restart from them instead of gliding in from stale values.
    fn reset(&mut self) {
        self.signal_path.set_targets(&self.params.settings());
        self.signal_path.reset();
        self.issue_reported = false;
    }

    /// Once per block: publish parameter targets, refresh the tempo, then
    /// let the signal path run the per-sample loop in place.
    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        self.signal_path.set_targets(&self.params.settings());
        self.signal_path.update_tempo(context.transport().tempo);

        let issue = self
            .signal_path
            .process_block(buffer.as_slice(), self.num_input_channels);

        // Only debug builds ever produce an issue. Formatting the message
        // allocates, which `assert_process_allocs` would otherwise trap.
        if let Some(issue) = issue {
            if !self.issue_reported {
                self.issue_reported = true;
                util::permit_alloc(|| nih_warn!("Unstable output detected: {issue:?}"));
            }
        }

        // Keep the host calling process() after the input stops so the
        // echoes can ring out.
        ProcessStatus::Tail(self.signal_path.tail_samples())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Plugin format trait implementations
// ─────────────────────────────────────────────────────────────────────

impl ClapPlugin for LovelessStereoDelay {
    const CLAP_ID: &'static str = "com.loveless-audio.loveless-stereo-delay";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("A tempo-synced stereo delay with crossed, filtered feedback");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Stereo,
        ClapFeature::Mono,
        ClapFeature::Delay,
    ];
}

impl Vst3Plugin for LovelessStereoDelay {
    // 16 ASCII bytes; unique among this vendor's plugins.
    const VST3_CLASS_ID: [u8; 16] = *b"LvlssStereoDly01";

    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] = &[
        Vst3SubCategory::Fx,
        Vst3SubCategory::Delay,
        Vst3SubCategory::Stereo,
    ];
}

// ─────────────────────────────────────────────────────────────────────
// Export macros
// ─────────────────────────────────────────────────────────────────────
//
// nih_export_clap! exports `clap_entry` for CLAP hosts, nih_export_vst3!
// exports `GetPluginFactory` for VST3 hosts, and clap_wrapper re-exports
// the CLAP entry point as an AUv2 component for Logic Pro.

nih_export_clap!(LovelessStereoDelay);
nih_export_vst3!(LovelessStereoDelay);

clap_wrapper::export_auv2!();
