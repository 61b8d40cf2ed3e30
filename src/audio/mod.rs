//! Audio output for the reading client.
//!
//! Chunk payloads are decoded with symphonia, resampled with rubato and played
//! through cpal.

mod decode;
mod playback;
mod resampler;
mod util;

pub use playback::Player;
