//! Download route
//!
//! Streams a reassembled upload back to the caller.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::error::UploadError;
use crate::state::AppState;
use crate::upload::{Download, SessionKey};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

// ============================================================================
// Error Response
// ============================================================================

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = match &self {
            // Unknown downloads are a bare 404
            UploadError::SessionNotFound(_) => return status.into_response(),
            UploadError::AllocationFailure(_) => "ALLOCATION_FAILURE",
            UploadError::EmptyBody => "EMPTY_BODY",
            UploadError::InvalidChunkIndex(_) => "INVALID_CHUNK_INDEX",
            UploadError::RejectedRequest { .. } => "REJECTED_REQUEST",
            UploadError::ChunkWriteFailure { .. } => "CHUNK_WRITE_FAILURE",
            UploadError::SessionClosed(_) => "SESSION_CLOSED",
            UploadError::ChunkMissingOnDownload { .. } => "CHUNK_MISSING",
            UploadError::IncompleteUpload { .. } => "INCOMPLETE_UPLOAD",
            UploadError::InvalidTransition { .. } => "INVALID_TRANSITION",
            UploadError::Metadata(_) => "METADATA_ERROR",
            UploadError::Storage(_) => "STORAGE_ERROR",
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Download failed");
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create the download router
pub fn router() -> Router<AppState> {
    Router::new().route("/download/:key", get(download))
}

/// GET /download/:key
///
/// Headers are sent before the first chunk; a chunk that cannot be read ends
/// the body early.
async fn download(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, UploadError> {
    let download = state
        .assembler()
        .stream_download(&SessionKey::new(key))
        .await?;

    Ok(into_streaming_response(download))
}

fn into_streaming_response(download: Download) -> Response {
    let file = &download.session.file;

    let content_type = HeaderValue::from_str(&file.mime_type)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| HeaderValue::from_static(FALLBACK_CONTENT_TYPE));

    let disposition = HeaderValue::from_str(&format!("attachment; filename={}", file.name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    let mut response = Response::new(Body::from_stream(download.body));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file.size));
    headers.insert(header::CONTENT_DISPOSITION, disposition);

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::{DeclaredFile, Session};
    use futures::stream::{self, StreamExt};

    fn download_for(file: DeclaredFile) -> Download {
        Download {
            session: Session::new(SessionKey::new("k"), file),
            body: stream::empty().boxed(),
        }
    }

    #[test]
    fn test_framing_headers() {
        let response = into_streaming_response(download_for(DeclaredFile {
            name: "report.pdf".to_string(),
            size: 20,
            mime_type: "application/pdf".to_string(),
            total_chunk: 1,
        }));

        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(headers[header::CONTENT_LENGTH], "20");
        assert_eq!(headers[header::CONTENT_DISPOSITION], "attachment; filename=report.pdf");
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    }

    #[test]
    fn test_unusable_mime_type_falls_back() {
        let response = into_streaming_response(download_for(DeclaredFile {
            name: "a.bin".to_string(),
            size: 1,
            mime_type: String::new(),
            total_chunk: 0,
        }));

        assert_eq!(response.headers()[header::CONTENT_TYPE], FALLBACK_CONTENT_TYPE);
    }

    #[test]
    fn test_session_not_found_has_no_body() {
        let response = UploadError::SessionNotFound("x".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }
}
