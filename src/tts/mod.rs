//! Chunked speech synthesis.
//!
//! Drives an external synthesis process per chunk in ordered, bounded batches
//! and measures each artifact with an external duration probe.

mod pool;
mod probe;
mod worker;
mod workspace;

pub use pool::{AUDIO_MIME_TYPE, ResultSink, SynthesisResult, WorkerPool};
pub use probe::{DurationProbe, FfprobeProbe};
pub use workspace::SessionWorkspace;
