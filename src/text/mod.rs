//! Transcript handling.
//!
//! Splits transcripts into fixed-size, deterministically indexed word chunks.

mod segmenter;

pub use segmenter::{Chunk, Transcript, segment};
