//! WebSocket delivery channel.
//!
//! One connection carries at most one session at a time. A new `convert`
//! supersedes the running session; disconnecting cancels it.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::protocol::{ClientMessage, ServerEvent};
use super::session::SessionHandle;
use super::state::AppState;

/// Handle WebSocket upgrade.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Session currently bound to the connection and its event stream.
struct ActiveSession {
    handle: SessionHandle,
    events: mpsc::Receiver<ServerEvent>,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection = Uuid::new_v4();
    info!(connection = %connection, "Client connected");

    let (mut sender, mut receiver) = socket.split();
    let mut active: Option<ActiveSession> = None;

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(connection = %connection, "WebSocket receive error: {}", e);
                        break;
                    }
                };

                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Convert { text }) => {
                        // Superseded sessions are torn down before the new one starts;
                        // their undelivered events are dropped with their receiver
                        if let Some(previous) = active.take() {
                            info!(connection = %connection, session = %previous.handle.id(), "Superseding running session");
                            previous.handle.cancel().await;
                        }

                        let (handle, events) = state.sessions.launch(text);
                        debug!(connection = %connection, session = %handle.id(), "Session bound to connection");
                        active = Some(ActiveSession { handle, events });
                    }
                    Err(e) => warn!(connection = %connection, "Ignoring malformed client message: {}", e),
                }
            }

            event = next_event(&mut active) => {
                let Some(event) = event else {
                    // Session finished on its own
                    if let Some(done) = active.take() {
                        done.handle.join().await;
                    }
                    continue;
                };

                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(connection = %connection, "Failed to encode event: {}", e);
                        continue;
                    }
                };

                if sender.send(Message::Text(json)).await.is_err() {
                    debug!(connection = %connection, "Send failed, treating as disconnect");
                    break;
                }
                if event.is_terminal() {
                    debug!(connection = %connection, "Session reached its final event");
                }
            }

            _ = state.shutdown.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    if let Some(session) = active.take() {
        info!(connection = %connection, session = %session.handle.id(), "Cancelling session on disconnect");
        session.handle.cancel().await;
    }

    info!(connection = %connection, "Client disconnected");
}

/// Next event of the bound session; pending forever when there is none.
async fn next_event(active: &mut Option<ActiveSession>) -> Option<ServerEvent> {
    match active.as_mut() {
        Some(session) => session.events.recv().await,
        None => std::future::pending().await,
    }
}
