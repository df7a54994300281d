//! Upload Routes
//!
//! HTTP endpoints for the chunked upload protocol.
//!
//! Endpoints:
//! - POST /upload/:key/:chunk_index - Upload a chunk (`key = 0` starts a new session)
//! - POST /finish/:key - Report the upload complete
//! - POST /abort/:key - Cancel the upload

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};

use crate::error::UploadError;
use crate::state::AppState;
use crate::upload::{
    DeclaredFile, SessionKey, SessionTarget, Transition, UploadQuery, UploadStatus,
};

// ============================================================================
// Status Reply
// ============================================================================

/// `{key, errorStatus}` envelope with the permissive CORS header
pub struct StatusReply {
    status: StatusCode,
    body: UploadStatus,
}

impl StatusReply {
    fn ok(key: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            body: UploadStatus::ok(key),
        }
    }

    fn failed(key: impl Into<String>, error: &UploadError) -> Self {
        let status = error.status_code();
        if status.is_server_error() {
            tracing::error!(error = %error, "Upload request failed");
        } else {
            tracing::warn!(error = %error, "Upload request rejected");
        }

        Self {
            status,
            body: UploadStatus::failed(key),
        }
    }
}

impl IntoResponse for StatusReply {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
            Json(self.body),
        )
            .into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create the upload router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload/:key/:chunk_index", post(upload_chunk))
        .route("/finish/:key", post(finish))
        .route("/abort/:key", post(abort))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /upload/:key/:chunk_index
///
/// Upload a single chunk. The chunk data is the raw request body; the file
/// attributes come from the query string and only matter for a new session.
/// Extractor rejections are answered with the status envelope too.
async fn upload_chunk(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
    query: Result<Query<UploadQuery>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> StatusReply {
    let Path((key, chunk_index)) = match path {
        Ok(path) => path,
        Err(rejection) => {
            return rejected(String::new(), rejection.status(), rejection.body_text())
        }
    };

    let target = SessionTarget::from_wire(&key);
    // Before allocation there is no key to report for a new session.
    let reported_key = match &target {
        SessionTarget::New => String::new(),
        SessionTarget::Existing(key) => key.to_string(),
    };

    let chunk_index: u32 = match chunk_index.parse() {
        Ok(index) => index,
        Err(_) => {
            return StatusReply::failed(reported_key, &UploadError::InvalidChunkIndex(chunk_index))
        }
    };

    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            return rejected(reported_key, rejection.status(), rejection.body_text())
        }
    };

    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            return rejected(reported_key, rejection.status(), rejection.body_text())
        }
    };

    let declared = DeclaredFile::from(query);

    match state
        .coordinator()
        .ingest_chunk(target, chunk_index, declared, body)
        .await
    {
        Ok(receipt) => {
            tracing::debug!(
                key = %receipt.key,
                chunk_index = receipt.chunk_index,
                bytes = receipt.bytes_written,
                created = receipt.created,
                "Chunk uploaded"
            );
            StatusReply::ok(receipt.key.into_string())
        }
        Err(e) => {
            let key = match &e {
                UploadError::ChunkWriteFailure { key, .. } => key.clone(),
                _ => reported_key,
            };
            StatusReply::failed(key, &e)
        }
    }
}

/// POST /finish/:key
async fn finish(State(state): State<AppState>, Path(key): Path<String>) -> StatusReply {
    let session_key = SessionKey::new(key.as_str());
    match state.lifecycle().finish(&session_key).await {
        Ok(transition) => acknowledge(key, transition),
        Err(e) => StatusReply::failed(key, &e),
    }
}

/// POST /abort/:key
async fn abort(State(state): State<AppState>, Path(key): Path<String>) -> StatusReply {
    let session_key = SessionKey::new(key.as_str());
    match state.lifecycle().abort(&session_key).await {
        Ok(transition) => acknowledge(key, transition),
        Err(e) => StatusReply::failed(key, &e),
    }
}

fn rejected(key: String, status: StatusCode, reason: String) -> StatusReply {
    StatusReply::failed(key, &UploadError::RejectedRequest { status, reason })
}

/// Every successful lifecycle outcome has the same wire shape
fn acknowledge(key: String, transition: Transition) -> StatusReply {
    tracing::debug!(key = %key, transition = ?transition, "Lifecycle acknowledged");
    StatusReply::ok(key)
}
