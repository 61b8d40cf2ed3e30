//! One synthesis worker: an external process turning chunk text into an artifact.

use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SynthesisCommand;
use crate::error::SynthesisError;
use crate::text::Chunk;

/// Maximum stderr characters kept for error reporting.
const STDERR_LIMIT: usize = 512;

/// Run the synthesis process for `chunk`, writing its artifact to `output`.
///
/// The process is killed (and reaped) as soon as `cancel` fires.
///
/// # Errors
/// - `WorkerSpawn` if the process cannot be started
/// - `WorkerExit` if it exits unsuccessfully
/// - `Cancelled` if `cancel` fired first
pub async fn run_synthesis(command: &SynthesisCommand, chunk: &Chunk, output: &Path, cancel: &CancellationToken) -> Result<(), SynthesisError> {
    let index = chunk.index;
    if cancel.is_cancelled() {
        return Err(SynthesisError::Cancelled);
    }

    let args = command.render_args(&chunk.text, &output.to_string_lossy());
    let mut child = Command::new(&command.program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| SynthesisError::WorkerSpawn { index, source })?;

    debug!(chunk = index, pid = ?child.id(), "Synthesis process started");

    // Drain stderr concurrently so a chatty process never blocks on a full pipe
    let stderr_reader = child.stderr.take().map(|mut stderr| {
        tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        })
    });

    let status = tokio::select! {
        status = child.wait() => Some(status),
        _ = cancel.cancelled() => None,
    };

    let Some(status) = status else {
        if let Err(e) = child.kill().await {
            warn!(chunk = index, "Failed to kill synthesis process: {}", e);
        }
        debug!(chunk = index, "Synthesis process terminated on cancellation");
        return Err(SynthesisError::Cancelled);
    };

    let status = status.map_err(|source| SynthesisError::Artifact { index, source })?;
    if status.success() {
        return Ok(());
    }

    let stderr = match stderr_reader {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    };
    let stderr: String = stderr.trim().chars().take(STDERR_LIMIT).collect();
    if !stderr.is_empty() {
        warn!(chunk = index, "Synthesis stderr: {}", stderr);
    }

    Err(SynthesisError::WorkerExit { index, status: status.to_string() })
}
