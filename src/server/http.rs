//! HTTP endpoints: document upload, chapter streaming, cleanup and health.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Json, Multipart, Path, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use super::documents::{Chapter, stream_records};
use super::state::AppState;
use super::websocket::ws_handler;
use crate::error::DocumentError;

/// Largest accepted upload.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Create the application router.
pub fn create_router(state: AppState, allowed_origin: HeaderValue) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/upload", post(upload))
        .route("/chapter/:file_id/:chapter_id", get(chapter))
        .route("/cleanup/:file_id", post(cleanup))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(allowed_origin).allow_methods([Method::GET, Method::POST]).allow_headers(Any))
        .with_state(state)
}

/// Error body `{"error": message}` with a matching status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }
}

impl From<DocumentError> for ApiError {
    fn from(e: DocumentError) -> Self {
        let status = match e {
            DocumentError::Unsupported(_) | DocumentError::InvalidId(_) => StatusCode::BAD_REQUEST,
            DocumentError::NotFound(_) | DocumentError::ChapterNotFound(_) => StatusCode::NOT_FOUND,
            DocumentError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Document operation failed: {}", e);
        }
        Self { status, message: e.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Upload response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    file_id: String,
    title: String,
    text: String,
    chapters: Vec<Chapter>,
}

/// Accept a multipart upload (field `file`) and return its transcript and chapters.
async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::bad_request(e.body_text()))? {
        if field.name() != Some("file") {
            continue;
        }

        let name = field.file_name().unwrap_or("upload.txt").to_string();
        let bytes = field.bytes().await.map_err(|e| ApiError::bad_request(e.body_text()))?;

        let documents = state.documents.clone();
        let (file_id, document) = tokio::task::spawn_blocking(move || documents.save(&name, &bytes))
            .await
            .map_err(|e| DocumentError::Io(std::io::Error::other(e)))??;

        return Ok(Json(UploadResponse { file_id, title: document.title, text: document.text, chapters: document.chapters }));
    }

    Err(ApiError::bad_request("No file uploaded"))
}

/// Stream a chapter's text as newline-delimited JSON records.
async fn chapter(State(state): State<AppState>, Path((file_id, chapter_id)): Path<(String, String)>) -> Result<Response, ApiError> {
    let documents = state.documents.clone();
    let text = tokio::task::spawn_blocking(move || documents.load(&file_id)?.chapter_text(&chapter_id))
        .await
        .map_err(|e| DocumentError::Io(std::io::Error::other(e)))??;

    let lines = stream_records(&text, state.stream_chunk_words).into_iter().filter_map(|record| match serde_json::to_string(&record) {
        Ok(line) => Some(Ok::<_, Infallible>(line + "\n")),
        Err(e) => {
            warn!("Failed to encode stream record: {}", e);
            None
        }
    });

    Ok(([(header::CONTENT_TYPE, "application/x-ndjson")], Body::from_stream(futures::stream::iter(lines))).into_response())
}

/// Delete an uploaded file.
async fn cleanup(State(state): State<AppState>, Path(file_id): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    state.documents.remove(&file_id)?;
    Ok(Json(json!({ "success": true })))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
