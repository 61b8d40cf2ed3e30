//! Websocket session with the synthesis server.

use std::io::Read;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::reader::{AudioOutput, Reader, ReaderState};
use super::timing::HeuristicScorer;
use crate::audio::Player;
use crate::config::ReadConfig;
use crate::server::protocol::ServerEvent;
use crate::text::Transcript;

/// Load the transcript from a file, or stdin for `-`.
///
/// # Errors
/// Returns an error if the source cannot be read or holds no words.
fn read_transcript(path: &Path) -> Result<String> {
    let text = if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text).context("Failed to read transcript from stdin")?;
        text
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read transcript {}", path.display()))?
    };

    if Transcript::new(&text).is_empty() {
        anyhow::bail!("Transcript {} has no words", path.display());
    }
    Ok(text)
}

/// Read the configured transcript aloud until done, failed or cancelled.
pub async fn run(config: ReadConfig, shutdown: CancellationToken) -> Result<()> {
    let text = read_transcript(&config.file)?;

    let output = Player::new().context("Failed to open audio output")?;
    let mut reader = Reader::new(output, Box::new(HeuristicScorer), config.chunk_words, config.transition_delay());

    let (socket, _) = connect_async(config.server.as_str()).await.with_context(|| format!("Failed to connect to {}", config.server))?;
    info!("🔗 Connected to {}", config.server);
    let (mut sender, mut receiver) = socket.split();

    let convert = reader.start(&text);
    sender.send(Message::Text(serde_json::to_string(&convert)?)).await.context("Failed to send convert request")?;

    let mut ticker = tokio::time::interval(config.position_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut connected = true;

    while reader.is_active() {
        tokio::select! {
            incoming = receiver.next(), if connected => match incoming {
                Some(Ok(Message::Text(frame))) => match serde_json::from_str::<ServerEvent>(&frame) {
                    Ok(event) => {
                        let before = (reader.highlighted(), reader.status().map(str::to_string));
                        reader.handle_event(event);
                        show_progress(&reader, before.1.as_deref());
                        show_highlight(&reader, before.0);
                    }
                    Err(e) => warn!("Ignoring malformed server event: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => {
                    warn!("Server closed the connection");
                    connected = false;
                    reader.connection_lost();
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("❌ Connection error: {}", e);
                    connected = false;
                    reader.connection_lost();
                }
            },

            _ = ticker.tick() => {
                let before = reader.highlighted();
                reader.tick(Instant::now());
                show_highlight(&reader, before);
            }

            _ = shutdown.cancelled() => reader.stop(),
        }
    }

    if connected {
        let _ = sender.send(Message::Close(None)).await;
    }

    match reader.state() {
        ReaderState::Error(message) => anyhow::bail!("Reading failed: {}", message),
        state => {
            debug!("Reader finished in state {:?}", state);
            Ok(())
        }
    }
}

fn show_progress<O: AudioOutput>(reader: &Reader<O>, before: Option<&str>) {
    if let Some(status) = reader.status()
        && Some(status) != before
    {
        info!("⏳ {}", status);
    }
}

/// Print the highlighted word when it changed.
fn show_highlight<O: AudioOutput>(reader: &Reader<O>, before: Option<usize>) {
    let Some(index) = reader.highlighted() else {
        return;
    };
    if Some(index) != before
        && let Some(word) = reader.transcript().word(index)
    {
        info!("🔊 [{}] {}", index, word);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_transcript_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("book.txt");
        std::fs::write(&path, "Call me Ishmael.\n").unwrap();
        assert_eq!(read_transcript(&path).unwrap(), "Call me Ishmael.\n");
    }

    #[test]
    fn test_blank_transcript_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blank.txt");
        std::fs::write(&path, " \n\t ").unwrap();
        let error = read_transcript(&path).unwrap_err();
        assert!(error.to_string().contains("has no words"));
    }

    #[test]
    fn test_missing_transcript_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(read_transcript(&dir.path().join("missing.txt")).is_err());
    }
}
