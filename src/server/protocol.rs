//! Delivery channel wire format.
//!
//! Every websocket text frame is a JSON object `{"event": <name>, "data": <payload>}`.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

use crate::tts::SynthesisResult;

/// Server to client events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Coarse status, not tied 1:1 to chunks
    Progress { percent: u8, status: String },
    /// One synthesized chunk, emitted in ascending index order
    AudioChunk(AudioChunk),
    /// All chunks emitted without error
    Complete,
    /// First unrecoverable failure; nothing follows it
    Error { message: String },
}

impl ServerEvent {
    pub fn progress(percent: u8, status: impl Into<String>) -> Self {
        ServerEvent::Progress { percent: percent.min(100), status: status.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error { message: message.into() }
    }

    /// Whether no further events may follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerEvent::Complete | ServerEvent::Error { .. })
    }
}

/// Audio payload of a synthesized chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioChunk {
    pub index: usize,
    pub audio_content: String, // Base64 (standard alphabet)
    pub mime_type: String,
    pub duration_seconds: f64,
    pub word_count: usize,
}

impl AudioChunk {
    /// Decode the transported payload back into artifact bytes.
    pub fn audio_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.audio_content)
    }
}

impl From<SynthesisResult> for AudioChunk {
    fn from(result: SynthesisResult) -> Self {
        Self {
            index: result.chunk_index,
            audio_content: BASE64.encode(&result.audio),
            mime_type: result.mime_type.to_string(),
            duration_seconds: result.duration_seconds,
            word_count: result.word_count,
        }
    }
}

/// Client to server messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Start a session, superseding any running one on the same connection
    Convert {
        #[serde(default)]
        text: String,
    },
}
