//! Reader state machine: playback queue, chunk transitions and word highlighting.
//!
//! The reader is driven from a single loop: server events go through
//! [`Reader::handle_event`] and a periodic [`Reader::tick`] polls the audio
//! output for position and end of chunk. Only one chunk's timings exist at a time.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::queue::{PlaybackQueue, QueuedChunk};
use super::timing::{ChunkTimings, WordScorer};
use crate::error::PlaybackError;
use crate::server::protocol::{AudioChunk, ClientMessage, ServerEvent};
use crate::text::Transcript;

/// Playback device as seen by the reader.
pub trait AudioOutput {
    /// Replace whatever is playing with `audio` and start it.
    fn start(&mut self, audio: &[u8], mime_type: &str) -> Result<(), PlaybackError>;

    /// Seconds played of the current chunk.
    fn position(&self) -> f64;

    /// Whether the current chunk has played to its end.
    fn is_finished(&self) -> bool;

    /// Silence output immediately and drop buffered audio.
    fn stop(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReaderState {
    Idle,
    Requesting, // Convert sent, no chunk played yet
    Playing,
    Stopped,
    Error(String),
}

/// The chunk currently playing and its word timings.
struct CurrentChunk {
    index: usize,
    timings: ChunkTimings,
}

pub struct Reader<O: AudioOutput> {
    output: O,
    scorer: Box<dyn WordScorer>,
    chunk_words: usize,
    transition_delay: Duration,
    state: ReaderState,
    transcript: Transcript,
    queue: PlaybackQueue,
    current: Option<CurrentChunk>,
    next_start: Option<Instant>, // Deadline of a pending chunk transition
    highlighted: Option<usize>,  // Global word index
    server_complete: bool,
    status: Option<String>,
}

impl<O: AudioOutput> Reader<O> {
    pub fn new(output: O, scorer: Box<dyn WordScorer>, chunk_words: usize, transition_delay: Duration) -> Self {
        Self {
            output,
            scorer,
            chunk_words: chunk_words.max(1),
            transition_delay,
            state: ReaderState::Idle,
            transcript: Transcript::default(),
            queue: PlaybackQueue::new(),
            current: None,
            next_start: None,
            highlighted: None,
            server_complete: false,
            status: None,
        }
    }

    pub fn state(&self) -> &ReaderState {
        &self.state
    }

    pub fn highlighted(&self) -> Option<usize> {
        self.highlighted
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Last progress status reported by the server.
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Whether a read is requested or playing.
    pub fn is_active(&self) -> bool {
        matches!(self.state, ReaderState::Requesting | ReaderState::Playing)
    }

    /// Begin reading `text`, abandoning any read in progress.
    ///
    /// # Returns
    /// The `convert` message to send to the server.
    pub fn start(&mut self, text: &str) -> ClientMessage {
        self.reset();
        self.transcript = Transcript::new(text);
        self.server_complete = false;
        self.status = None;
        self.state = ReaderState::Requesting;

        info!("📖 Requesting speech for {} words", self.transcript.len());
        ClientMessage::Convert { text: self.transcript.text() }
    }

    /// User stop: silence output and drop everything queued.
    pub fn stop(&mut self) {
        self.reset();
        self.state = ReaderState::Stopped;
        info!("⏹️ Reading stopped");
    }

    /// The server connection dropped. A read that still expects chunks fails;
    /// one whose synthesis already completed plays out what it holds.
    pub fn connection_lost(&mut self) {
        if !self.is_active() || self.server_complete {
            return;
        }
        self.fail("Connection to server lost before synthesis completed".to_string());
    }

    pub fn handle_event(&mut self, event: ServerEvent) {
        if !self.is_active() {
            debug!("Ignoring event while {:?}", self.state);
            return;
        }

        match event {
            ServerEvent::Progress { percent, status } => {
                debug!("Progress {}%: {}", percent, status);
                self.status = Some(status);
            }
            ServerEvent::AudioChunk(chunk) => self.receive_chunk(chunk),
            ServerEvent::Complete => {
                debug!("Server finished synthesis");
                self.server_complete = true;
                if self.current.is_none() && self.next_start.is_none() && !self.queue.is_ready() {
                    self.finish();
                }
            }
            ServerEvent::Error { message } => {
                error!("❌ Server error: {}", message);
                self.fail(message);
            }
        }
    }

    /// Advance pending transitions, detect chunk ends and update the highlight.
    pub fn tick(&mut self, now: Instant) {
        if let Some(deadline) = self.next_start
            && now >= deadline
        {
            self.next_start = None;
            self.play_next();
        }

        let Some(current) = &self.current else {
            return;
        };

        if self.output.is_finished() {
            self.end_chunk(now);
            return;
        }

        if let Some(word) = current.timings.word_at(self.output.position()) {
            self.highlighted = Some(word);
        }
    }

    fn receive_chunk(&mut self, chunk: AudioChunk) {
        let audio = match chunk.audio_bytes() {
            Ok(audio) => audio,
            Err(e) => {
                self.fail(PlaybackError::from(e).to_string());
                return;
            }
        };

        let index = chunk.index;
        let queued = QueuedChunk {
            index,
            audio,
            mime_type: chunk.mime_type,
            duration_seconds: chunk.duration_seconds,
            word_count: chunk.word_count,
        };

        if !self.queue.push(queued) {
            warn!("Dropping duplicate or stale chunk {}", index);
            return;
        }
        debug!("Queued chunk {} ({} waiting)", index, self.queue.len());

        // Nothing playing and no transition pending: start right away
        if self.current.is_none() && self.next_start.is_none() {
            self.play_next();
        }
    }

    fn play_next(&mut self) {
        let Some(chunk) = self.queue.pop_ready() else {
            return;
        };

        let words = self.transcript.chunk_words(chunk.index, self.chunk_words);
        if words.len() != chunk.word_count {
            warn!("Chunk {} has {} words locally but {} on the server", chunk.index, words.len(), chunk.word_count);
        }
        let timings = ChunkTimings::compute(words, chunk.index * self.chunk_words, chunk.duration_seconds, self.scorer.as_ref());

        if let Err(e) = self.output.start(&chunk.audio, &chunk.mime_type) {
            error!("❌ Playback of chunk {} failed: {}", chunk.index, e);
            self.fail(e.to_string());
            return;
        }

        debug!("▶️ Playing chunk {} ({:.2}s)", chunk.index, chunk.duration_seconds);
        self.current = Some(CurrentChunk { index: chunk.index, timings });
        self.state = ReaderState::Playing;
    }

    fn end_chunk(&mut self, now: Instant) {
        if let Some(done) = self.current.take() {
            debug!("Chunk {} finished", done.index);
        }

        if self.queue.is_ready() {
            self.next_start = Some(now + self.transition_delay);
        } else if self.server_complete {
            self.finish();
        } else {
            // Next chunk still being synthesized
            debug!("Waiting for chunk {}", self.queue.next_index());
        }
    }

    fn finish(&mut self) {
        self.reset();
        self.state = ReaderState::Stopped;
        info!("✅ Finished reading");
    }

    fn fail(&mut self, message: String) {
        self.reset();
        self.state = ReaderState::Error(message);
    }

    fn reset(&mut self) {
        self.output.stop();
        self.queue.clear();
        self.current = None;
        self.next_start = None;
        self.highlighted = None;
    }
}
