//! Bounded, ordered synthesis worker pool.
//!
//! Chunk 0 is synthesized alone so the first audio reaches the client as early
//! as possible. The remaining chunks run in index-ordered batches of at most
//! `concurrency` workers; a batch starts only after the previous one finished
//! and its results are published in ascending chunk order.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::probe::DurationProbe;
use super::worker::run_synthesis;
use super::workspace::SessionWorkspace;
use crate::config::SynthesisCommand;
use crate::error::{ChannelError, SynthesisError};
use crate::text::Chunk;

/// MIME type of synthesized artifacts.
pub const AUDIO_MIME_TYPE: &str = "audio/mpeg";

/// Synthesized audio of one chunk, produced at most once per chunk.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub chunk_index: usize,      // Originating chunk
    pub audio: Vec<u8>,          // Artifact bytes (on-disk copy already removed)
    pub mime_type: &'static str, // Always AUDIO_MIME_TYPE
    pub duration_seconds: f64,   // Probed playback duration
    pub word_count: usize,       // Words in the chunk
}

/// Receives pool output in delivery order.
#[async_trait]
pub trait ResultSink: Send {
    /// A chunk is ready; called in strictly ascending index order.
    async fn chunk_ready(&mut self, result: SynthesisResult) -> Result<(), ChannelError>;

    /// A batch was fully published.
    async fn batch_finished(&mut self, delivered: usize, total: usize) -> Result<(), ChannelError>;
}

/// Synthesis driver shared by all sessions. Holds no per-run state.
#[derive(Clone)]
pub struct WorkerPool {
    command: Arc<SynthesisCommand>,
    probe: Arc<dyn DurationProbe>,
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(command: SynthesisCommand, probe: Arc<dyn DurationProbe>, concurrency: usize) -> Self {
        Self { command: Arc::new(command), probe, concurrency: concurrency.max(1) }
    }

    /// Synthesize every chunk and publish results to `sink`.
    ///
    /// Fails fast: the first worker failure terminates the rest of its batch and
    /// no later batch is dispatched. Nothing from a failed batch is published.
    ///
    /// # Errors
    /// The first worker error in chunk order, `Cancelled` if `cancel` fired, or
    /// `Delivery` if the sink went away.
    pub async fn run<S: ResultSink>(&self, chunks: &[Chunk], workspace: &SessionWorkspace, cancel: &CancellationToken, sink: &mut S) -> Result<(), SynthesisError> {
        let Some((first, rest)) = chunks.split_first() else {
            return Ok(());
        };

        let total = chunks.len();
        let batches = std::iter::once(std::slice::from_ref(first)).chain(rest.chunks(self.concurrency));
        let mut delivered = 0;

        for (number, batch) in batches.enumerate() {
            if cancel.is_cancelled() {
                return Err(SynthesisError::Cancelled);
            }

            debug!(batch = number, first_chunk = batch[0].index, size = batch.len(), "Dispatching batch");
            let results = self.run_batch(batch, workspace, cancel).await?;

            for result in results {
                sink.chunk_ready(result).await?;
                delivered += 1;
            }
            sink.batch_finished(delivered, total).await?;
        }

        info!("Synthesized {} chunks", total);
        Ok(())
    }

    /// Run one batch concurrently and return its results in chunk order.
    async fn run_batch(&self, batch: &[Chunk], workspace: &SessionWorkspace, cancel: &CancellationToken) -> Result<Vec<SynthesisResult>, SynthesisError> {
        let batch_cancel = cancel.child_token();

        let workers = batch.iter().map(|chunk| {
            let batch_cancel = &batch_cancel;
            async move {
                let result = self.synthesize(chunk, workspace, batch_cancel).await;
                if let Err(ref e) = result
                    && !matches!(e, SynthesisError::Cancelled)
                {
                    warn!(chunk = chunk.index, "Worker failed, terminating batch: {}", e);
                    batch_cancel.cancel();
                }
                result
            }
        });

        let mut results = Vec::with_capacity(batch.len());
        let mut cancelled = false;

        for outcome in join_all(workers).await {
            match outcome {
                Ok(result) => results.push(result),
                Err(SynthesisError::Cancelled) => cancelled = true,
                Err(e) => return Err(e),
            }
        }

        if cancelled {
            return Err(SynthesisError::Cancelled);
        }
        Ok(results)
    }

    /// Synthesize, probe, load and remove the artifact of one chunk.
    async fn synthesize(&self, chunk: &Chunk, workspace: &SessionWorkspace, cancel: &CancellationToken) -> Result<SynthesisResult, SynthesisError> {
        let index = chunk.index;
        let output = workspace.artifact_path(index);

        run_synthesis(&self.command, chunk, &output, cancel).await?;

        let duration_seconds = tokio::select! {
            duration = self.probe.duration(&output) => duration.map_err(|source| SynthesisError::Probe { index, source })?,
            _ = cancel.cancelled() => return Err(SynthesisError::Cancelled),
        };

        let audio = tokio::fs::read(&output).await.map_err(|source| SynthesisError::Artifact { index, source })?;
        tokio::fs::remove_file(&output).await.map_err(|source| SynthesisError::Artifact { index, source })?;

        debug!(chunk = index, bytes = audio.len(), duration_seconds, "Chunk synthesized");

        Ok(SynthesisResult { chunk_index: index, audio, mime_type: AUDIO_MIME_TYPE, duration_seconds, word_count: chunk.word_count() })
    }
}
