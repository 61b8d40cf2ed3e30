//! Error types shared by the synthesis pipeline and the playback client.

use std::path::PathBuf;

use thiserror::Error;

/// Failure while inspecting a synthesized artifact.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to run duration probe: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("duration probe exited with {status} for {}: {stderr}", path.display())]
    Exit { path: PathBuf, status: String, stderr: String },

    #[error("malformed duration for {}: {output:?}", path.display())]
    Malformed { path: PathBuf, output: String },
}

/// Failure of a single synthesis worker. Any of these aborts the session.
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("failed to spawn synthesis process for chunk {index}: {source}")]
    WorkerSpawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("synthesis process for chunk {index} exited with {status}")]
    WorkerExit { index: usize, status: String },

    #[error("duration probe failed for chunk {index}: {source}")]
    Probe {
        index: usize,
        #[source]
        source: ProbeError,
    },

    #[error("artifact I/O failed for chunk {index}: {source}")]
    Artifact {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("delivery failed: {0}")]
    Delivery(#[from] ChannelError),

    #[error("session cancelled")]
    Cancelled,
}

impl SynthesisError {
    /// Index of the chunk that failed, if the failure belongs to one.
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            SynthesisError::WorkerSpawn { index, .. }
            | SynthesisError::WorkerExit { index, .. }
            | SynthesisError::Probe { index, .. }
            | SynthesisError::Artifact { index, .. } => Some(*index),
            SynthesisError::Delivery(_) | SynthesisError::Cancelled => None,
        }
    }
}

/// The client side of a session went away.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("client disconnected")]
    Disconnected,
}

/// Client-side playback failure. Local to the client, forces a stop.
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("invalid audio payload: {0}")]
    Payload(#[from] base64::DecodeError),

    #[error("unsupported or corrupt audio: {0}")]
    Decode(String),

    #[error("audio output failed: {0}")]
    Output(String),
}

/// Upload / chapter extraction failures.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("unsupported file format: {0}")]
    Unsupported(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("chapter not found: {0}")]
    ChapterNotFound(String),

    #[error("invalid file id: {0}")]
    InvalidId(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_index() {
        let exit = SynthesisError::WorkerExit { index: 3, status: "exit status: 1".to_string() };
        assert_eq!(exit.chunk_index(), Some(3));
        assert_eq!(SynthesisError::Cancelled.chunk_index(), None);
    }

    #[test]
    fn test_disconnect_is_delivery_failure() {
        let error: SynthesisError = ChannelError::Disconnected.into();
        assert!(matches!(error, SynthesisError::Delivery(ChannelError::Disconnected)));
        assert_eq!(error.chunk_index(), None);
        assert_eq!(error.to_string(), "delivery failed: client disconnected");
    }
}
