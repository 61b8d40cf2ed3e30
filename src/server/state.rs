//! Shared server state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::documents::DocumentStore;
use super::session::SessionLauncher;

/// Handed to every request handler; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionLauncher,     // Starts synthesis sessions
    pub documents: Arc<DocumentStore>, // Uploaded documents
    pub stream_chunk_words: usize,     // Words per chapter stream record
    pub shutdown: CancellationToken,   // Server-wide shutdown signal
}
