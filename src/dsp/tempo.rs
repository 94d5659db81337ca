//! # Tempo Sync
//!
//! When tempo sync is on, the delay time comes from the host's tempo and a
//! musical note length instead of the millisecond knob. A quarter note at
//! 120 BPM lasts half a second, so a "1/4" delay at 120 BPM is 500 ms.
//!
//! ```text
//! ms = 60000 * beats / bpm
//! ```
//!
//! where `beats` is the note length expressed in quarter notes.

/// BPM used whenever the host doesn't tell us its tempo.
pub const DEFAULT_BPM: f64 = 120.0;

/// Note lengths in quarter-note beats, shortest first.
///
/// The order matches the `NoteLength` parameter, so a note index selects
/// directly into this table.
pub const NOTE_LENGTH_MULTIPLIERS: [f64; 16] = [
    0.125,       // 1/32
    0.5 / 3.0,   // 1/16 triplet
    0.1875,      // 1/32 dotted
    0.25,        // 1/16
    1.0 / 3.0,   // 1/8 triplet
    0.375,       // 1/16 dotted
    0.5,         // 1/8
    2.0 / 3.0,   // 1/4 triplet
    0.75,        // 1/8 dotted
    1.0,         // 1/4
    4.0 / 3.0,   // 1/2 triplet
    1.5,         // 1/4 dotted
    2.0,         // 1/2
    8.0 / 3.0,   // 1/1 triplet
    3.0,         // 1/2 dotted
    4.0,         // 1/1
];

/// Tracks the host tempo for one processing block at a time.
#[derive(Debug, Clone)]
pub struct Tempo {
    bpm: f64,
}

impl Default for Tempo {
    fn default() -> Self {
        Self { bpm: DEFAULT_BPM }
    }
}

impl Tempo {
    pub fn reset(&mut self) {
        self.bpm = DEFAULT_BPM;
    }

    /// Refresh the tempo from the host transport. Call once per block.
    ///
    /// The tempo falls back to 120 BPM first and is only overwritten when
    /// the host reports a usable value. A host that stops reporting its
    /// tempo therefore gets 120 BPM, not whatever the previous block saw.
    /// Zero, negative, and non-finite tempos count as "not reported".
    pub fn update(&mut self, host_bpm: Option<f64>) {
        self.reset();

        if let Some(bpm) = host_bpm.filter(|bpm| bpm.is_finite() && *bpm > 0.0) {
            self.bpm = bpm;
        }
    }


    /// Length of the note at `index` in milliseconds at the current tempo.
    ///
    /// Indices past the end of the table select the longest note. The
    /// result isn't bounded by the delay line's capacity; the caller clamps
    /// it to the maximum delay time.
    pub fn milliseconds_for_note_length(&self, index: usize) -> f64 {
        let index = index.min(NOTE_LENGTH_MULTIPLIERS.len() - 1);
        60000.0 * NOTE_LENGTH_MULTIPLIERS[index] / self.bpm
    }
}
