//! Upload Coordinator
//!
//! Entry point of the chunk upload protocol. The first chunk of a new upload
//! allocates the session; every chunk is written to the chunk store.

use std::sync::Arc;

use axum::body::Bytes;

use crate::db::SessionStore;
use crate::error::UploadError;
use super::chunk_store::ChunkStore;
use super::keygen;
use super::types::{
    ChunkAddress, DeclaredFile, Session, SessionKey, SessionTarget, UploadReceipt,
    SESSION_KEY_RANDOM_LEN,
};

/// Orchestrates session creation and chunk ingestion
#[derive(Clone)]
pub struct UploadCoordinator {
    sessions: Arc<dyn SessionStore>,
    chunks: ChunkStore,
}

impl UploadCoordinator {
    pub fn new(sessions: Arc<dyn SessionStore>, chunks: ChunkStore) -> Self {
        Self { sessions, chunks }
    }

    /// Ingest one chunk
    ///
    /// A session row created for `SessionTarget::New` is not rolled back if
    /// the chunk write fails afterwards.
    pub async fn ingest_chunk(
        &self,
        target: SessionTarget,
        chunk_index: u32,
        declared: DeclaredFile,
        body: Bytes,
    ) -> Result<UploadReceipt, UploadError> {
        if body.is_empty() {
            return Err(UploadError::EmptyBody);
        }

        let (key, created) = match target {
            SessionTarget::New => (self.allocate(declared).await?, true),
            SessionTarget::Existing(key) => {
                self.ensure_open(&key).await?;
                (key, false)
            }
        };

        let address = ChunkAddress::new(key, chunk_index);
        let bytes_written = self
            .chunks
            .write_chunk(&address, body)
            .await
            .map_err(|source| {
                tracing::error!(
                    key = %address.key,
                    chunk_index = chunk_index,
                    error = %source,
                    "Chunk write failed"
                );
                UploadError::ChunkWriteFailure {
                    key: address.key.to_string(),
                    index: chunk_index,
                    source,
                }
            })?;

        Ok(UploadReceipt {
            key: address.key,
            chunk_index,
            bytes_written,
            created,
        })
    }

    /// Create the session row for a new upload
    async fn allocate(&self, declared: DeclaredFile) -> Result<SessionKey, UploadError> {
        let key = SessionKey::new(format!(
            "{}{}",
            keygen::generate(SESSION_KEY_RANDOM_LEN),
            declared.name
        ));
        let session = Session::new(key.clone(), declared);

        self.sessions.insert(&session).await.map_err(|e| {
            tracing::error!(key = %key, error = %e, "Session allocation failed");
            UploadError::AllocationFailure(e)
        })?;

        tracing::info!(
            key = %key,
            file_name = %session.file.name,
            file_size = session.file.size,
            total_chunk = session.file.total_chunk,
            "Created upload session"
        );

        Ok(key)
    }

    /// Reject chunks for sessions that were finished or aborted
    ///
    /// Keys without a session row are accepted.
    async fn ensure_open(&self, key: &SessionKey) -> Result<(), UploadError> {
        let session = self
            .sessions
            .find_by_key(key)
            .await
            .map_err(UploadError::Metadata)?;

        match session {
            Some(session) if session.state.is_terminal() => {
                tracing::warn!(key = %key, state = %session.state, "Chunk for closed session");
                Err(UploadError::SessionClosed(key.to_string()))
            }
            _ => Ok(()),
        }
    }
}
