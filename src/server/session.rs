//! Synthesis sessions.
//!
//! A session is one convert run bound to one connection. It owns its scratch
//! directory and cancellation token; tearing it down kills in-flight synthesis
//! processes and removes the directory exactly once.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::protocol::{AudioChunk, ServerEvent};
use crate::error::{ChannelError, SynthesisError};
use crate::text::segment;
use crate::tts::{ResultSink, SessionWorkspace, SynthesisResult, WorkerPool};

/// Buffered events per session before synthesis waits on the socket.
const EVENT_BUFFER: usize = 16;

/// Creates sessions with shared, immutable settings.
#[derive(Clone)]
pub struct SessionLauncher {
    pool: WorkerPool,            // Stateless synthesis driver
    chunk_words: usize,          // Words per synthesis chunk
    temp_root: Arc<PathBuf>,     // Parent of per-session scratch directories
    shutdown: CancellationToken, // Server-wide; cancels every session
    tracker: TaskTracker,        // Running session tasks
}

impl SessionLauncher {
    pub fn new(pool: WorkerPool, chunk_words: usize, temp_root: PathBuf, shutdown: CancellationToken) -> Self {
        Self { pool, chunk_words, temp_root: Arc::new(temp_root), shutdown, tracker: TaskTracker::new() }
    }

    /// Wait until every session task has finished its teardown.
    ///
    /// Sessions still running are only waited on; cancel `shutdown` first to
    /// make them stop.
    pub async fn drain(&self) {
        self.tracker.close();
        if !self.tracker.is_empty() {
            info!(sessions = self.tracker.len(), "Waiting for sessions to finish");
        }
        self.tracker.wait().await;
    }

    /// Start a session for `text`.
    ///
    /// # Returns
    /// The session handle and the receiver of its events. The receiver closes
    /// once the session task is done.
    pub fn launch(&self, text: String) -> (SessionHandle, mpsc::Receiver<ServerEvent>) {
        let id = Uuid::new_v4();
        let cancel = self.shutdown.child_token();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let task = self.tracker.spawn(run_session(
            id,
            self.pool.clone(),
            self.chunk_words,
            self.temp_root.clone(),
            text,
            EventSink { tx, cancel: cancel.clone() },
        ));

        (SessionHandle { id, cancel, task }, rx)
    }
}

/// Owner-side handle of a running session.
pub struct SessionHandle {
    id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Signal termination and wait until processes are gone and the scratch
    /// directory is removed.
    pub async fn cancel(self) {
        self.cancel.cancel();
        self.join().await;
    }

    /// Wait for the session to finish on its own.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!(session = %self.id, "Session task failed: {}", e);
        }
    }
}

/// Forwards pool output to the connection as delivery channel events.
struct EventSink {
    tx: mpsc::Sender<ServerEvent>,
    cancel: CancellationToken,
}

impl EventSink {
    async fn send(&self, event: ServerEvent) -> Result<(), ChannelError> {
        tokio::select! {
            sent = self.tx.send(event) => sent.map_err(|_| ChannelError::Disconnected),
            _ = self.cancel.cancelled() => Err(ChannelError::Disconnected),
        }
    }
}

#[async_trait]
impl ResultSink for EventSink {
    async fn chunk_ready(&mut self, result: SynthesisResult) -> Result<(), ChannelError> {
        debug!(chunk = result.chunk_index, "Emitting audio chunk");
        self.send(ServerEvent::AudioChunk(AudioChunk::from(result))).await
    }

    async fn batch_finished(&mut self, delivered: usize, total: usize) -> Result<(), ChannelError> {
        let percent = (delivered * 100 / total.max(1)) as u8;
        self.send(ServerEvent::progress(percent, format!("Synthesized {} of {} chunks", delivered, total))).await
    }
}

async fn run_session(id: Uuid, pool: WorkerPool, chunk_words: usize, temp_root: Arc<PathBuf>, text: String, mut sink: EventSink) {
    let chunks = segment(&text, chunk_words);
    info!(session = %id, chunks = chunks.len(), "Session started");

    if sink.send(ServerEvent::progress(0, "Starting text-to-speech conversion...")).await.is_err() {
        info!(session = %id, "Client gone before synthesis started");
        return;
    }

    if chunks.is_empty() {
        let _ = sink.send(ServerEvent::Complete).await;
        info!(session = %id, "Nothing to synthesize");
        return;
    }

    let workspace = match SessionWorkspace::create(&temp_root, &id.to_string()) {
        Ok(workspace) => workspace,
        Err(e) => {
            error!(session = %id, "Failed to create session workspace: {}", e);
            let _ = sink.send(ServerEvent::error("Error preparing text-to-speech conversion")).await;
            return;
        }
    };

    let cancel = sink.cancel.clone();
    let outcome = pool.run(&chunks, &workspace, &cancel, &mut sink).await;

    if let Err(e) = workspace.close() {
        warn!(session = %id, "Failed to remove session workspace: {}", e);
    }

    match outcome {
        Ok(()) => {
            let _ = sink.send(ServerEvent::Complete).await;
            info!(session = %id, "Session complete");
        }
        Err(SynthesisError::Cancelled | SynthesisError::Delivery(_)) => {
            info!(session = %id, "Session cancelled");
        }
        Err(e) => {
            error!(session = %id, "Session failed: {}", e);
            let message = match e.chunk_index() {
                Some(index) => format!("Error processing chunk {}: {}", index, e),
                None => e.to_string(),
            };
            let _ = sink.send(ServerEvent::error(message)).await;
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::SynthesisCommand;
    use crate::error::ProbeError;
    use crate::tts::DurationProbe;
    use std::path::Path;
    use std::time::Duration;

    struct FixedProbe;

    #[async_trait]
    impl DurationProbe for FixedProbe {
        async fn duration(&self, _path: &Path) -> Result<f64, ProbeError> {
            Ok(4.0)
        }
    }

    fn launcher(script: &str, root: &Path) -> SessionLauncher {
        let command = SynthesisCommand {
            program: "sh".into(),
            args: vec!["-c".into(), script.into(), "sh".into(), "{text}".into(), "{output}".into()],
        };
        SessionLauncher::new(WorkerPool::new(command, Arc::new(FixedProbe), 5), 1, root.to_path_buf(), CancellationToken::new())
    }

    async fn collect(mut rx: mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn chunk_indices(events: &[ServerEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                ServerEvent::AudioChunk(chunk) => Some(chunk.index),
                _ => None,
            })
            .collect()
    }

    fn session_dirs(root: &Path) -> usize {
        std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_successful_session_event_sequence() {
        let root = tempfile::tempdir().unwrap();
        let launcher = launcher(r#"printf x > "$2""#, root.path());

        let (handle, rx) = launcher.launch("one two three four five six seven".into());
        let events = collect(rx).await;
        handle.join().await;

        assert_eq!(events.first(), Some(&ServerEvent::progress(0, "Starting text-to-speech conversion...")));
        assert_eq!(chunk_indices(&events), (0..7).collect::<Vec<_>>());
        assert_eq!(events.last(), Some(&ServerEvent::Complete));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert_eq!(session_dirs(root.path()), 0);
    }

    #[tokio::test]
    async fn test_empty_text_completes_immediately() {
        let root = tempfile::tempdir().unwrap();
        let launcher = launcher("exit 1", root.path());

        let (handle, rx) = launcher.launch("   ".into());
        let events = collect(rx).await;
        handle.join().await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[1], ServerEvent::Complete);
    }

    #[tokio::test]
    async fn test_failure_emits_single_error_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let launcher = launcher(r#"if [ "$1" = bad ]; then exit 2; fi; printf x > "$2""#, root.path());

        let (handle, rx) = launcher.launch("a a a bad a a a a".into());
        let events = collect(rx).await;
        handle.join().await;

        assert_eq!(chunk_indices(&events), vec![0]);
        let errors: Vec<_> = events.iter().filter(|e| matches!(e, ServerEvent::Error { .. })).collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(events.last(), Some(ServerEvent::Error { message }) if message.starts_with("Error processing chunk 3")));
        assert!(!events.contains(&ServerEvent::Complete));
        assert_eq!(session_dirs(root.path()), 0);
    }

    #[tokio::test]
    async fn test_cancel_removes_workspace_without_events() {
        let root = tempfile::tempdir().unwrap();
        let launcher = launcher(r#"if [ "$1" = slow ]; then exec sleep 30; fi; printf x > "$2""#, root.path());

        let (handle, mut rx) = launcher.launch("a slow slow slow".into());
        // progress, chunk 0, progress; then batch 1 hangs
        for _ in 0..3 {
            rx.recv().await.unwrap();
        }
        assert_eq!(session_dirs(root.path()), 1);

        tokio::time::timeout(Duration::from_secs(10), handle.cancel()).await.unwrap();
        assert_eq!(session_dirs(root.path()), 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_receiver_stops_session() {
        let root = tempfile::tempdir().unwrap();
        let launcher = launcher(r#"printf x > "$2""#, root.path());

        let (handle, rx) = launcher.launch((0..40).map(|_| "w").collect::<Vec<_>>().join(" "));
        drop(rx);

        tokio::time::timeout(Duration::from_secs(10), handle.join()).await.unwrap();
        assert_eq!(session_dirs(root.path()), 0);
    }

    #[tokio::test]
    async fn test_drain_waits_for_shutdown_teardown() {
        let root = tempfile::tempdir().unwrap();
        let launcher = launcher(r#"if [ "$1" = slow ]; then exec sleep 30; fi; printf x > "$2""#, root.path());

        let (_handle, mut rx) = launcher.launch("a slow slow slow".into());
        for _ in 0..3 {
            rx.recv().await.unwrap();
        }
        assert_eq!(session_dirs(root.path()), 1);

        launcher.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(10), launcher.drain()).await.unwrap();
        assert_eq!(session_dirs(root.path()), 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_drain_without_sessions_returns() {
        let root = tempfile::tempdir().unwrap();
        let launcher = launcher("exit 0", root.path());
        tokio::time::timeout(Duration::from_secs(1), launcher.drain()).await.unwrap();
    }
}
