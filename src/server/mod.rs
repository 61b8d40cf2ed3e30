//! Synthesis server: websocket delivery channel plus the document endpoints.

mod documents;
mod http;
pub mod protocol;
mod session;
mod state;
mod websocket;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ServeConfig;
use crate::tts::{FfprobeProbe, WorkerPool};
use documents::{DocumentStore, TextExtractor};
use session::SessionLauncher;
use state::AppState;

/// Longest wait for sessions to tear down after the listener stops.
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Serve until `shutdown` is cancelled.
///
/// Sessions hold child tokens of `shutdown` and are tracked by the launcher.
/// Once the listener stops, this waits for them, so in-flight synthesis
/// processes are killed and scratch directories removed before it returns.
pub async fn run(config: ServeConfig, shutdown: CancellationToken) -> Result<()> {
    let probe = Arc::new(FfprobeProbe::new(config.probe_program.clone()));
    let pool = WorkerPool::new(config.synthesis_command(), probe, config.concurrency);
    let sessions = SessionLauncher::new(pool, config.chunk_words, config.temp_dir.clone(), shutdown.clone());

    let extractor = TextExtractor::new().context("Failed to compile document patterns")?;
    let documents = DocumentStore::new(config.upload_dir.clone(), vec![Box::new(extractor)])
        .with_context(|| format!("Failed to open upload directory {}", config.upload_dir.display()))?;

    let origin: HeaderValue = config.allowed_origin.parse().with_context(|| format!("Invalid allowed origin: {}", config.allowed_origin))?;

    let state = AppState { sessions: sessions.clone(), documents: Arc::new(documents), stream_chunk_words: config.stream_chunk_words, shutdown: shutdown.clone() };
    let app = http::create_router(state, origin);

    let listener = tokio::net::TcpListener::bind(config.bind).await.with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("🚀 Listening on {}", config.bind);

    let served = axum::serve(listener, app).with_graceful_shutdown(shutdown.clone().cancelled_owned()).await.context("Server error");

    // Sessions are children of `shutdown`; make sure they stop even on a serve error
    shutdown.cancel();
    if tokio::time::timeout(SESSION_DRAIN_TIMEOUT, sessions.drain()).await.is_err() {
        warn!("Sessions still running after {:?}", SESSION_DRAIN_TIMEOUT);
    }
    served?;

    info!("Server stopped");
    Ok(())
}
