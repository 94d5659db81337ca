//! # DSP (Digital Signal Processing)
//!
//! Everything that runs on the audio thread. Only the signal path reaches
//! into nih-plug, for its smoothers and `db_to_gain`:
//!
//! - **`delay_line`**: the ring buffer that stores past samples and reads
//!   them back after a (fractional) delay.
//! - **`filter`**: the state-variable filter used for the low-cut and
//!   high-cut stages in the feedback path.
//! - **`tempo`**: host tempo tracking and note-length-to-milliseconds
//!   conversion for tempo sync.
//! - **`meter`**: lock-free peak level publishing for the editor.
//! - **`util`**: the pan law, unit conversions, and output diagnostics.
//! - **`signal_path`**: the per-sample algorithm tying all of the above
//!   together.

pub mod delay_line;
pub mod filter;
pub mod meter;
pub mod signal_path;
pub mod tempo;
pub mod util;
