//! Download Assembler
//!
//! Streams a session's chunks back in index order, one chunk per body frame,
//! so peak memory stays at one chunk regardless of file size.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use futures::stream::{self, BoxStream, StreamExt};

use crate::db::SessionStore;
use crate::error::{StorageError, UploadError};
use super::chunk_store::ChunkStore;
use super::types::{ChunkAddress, Session, SessionKey};

/// A download ready to be sent: framing metadata plus the byte stream
pub struct Download {
    pub session: Session,
    pub body: BoxStream<'static, Result<Bytes, UploadError>>,
}

/// Reassembles uploaded sessions for download
#[derive(Clone)]
pub struct DownloadAssembler {
    sessions: Arc<dyn SessionStore>,
    chunks: ChunkStore,
    pacing: Duration,
}

impl DownloadAssembler {
    pub fn new(sessions: Arc<dyn SessionStore>, chunks: ChunkStore) -> Self {
        Self {
            sessions,
            chunks,
            pacing: Duration::ZERO,
        }
    }

    /// Delay between consecutive chunks of a download
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Look up a session and open its chunk stream
    pub async fn stream_download(&self, key: &SessionKey) -> Result<Download, UploadError> {
        let session = self
            .sessions
            .find_by_key(key)
            .await
            .map_err(UploadError::Metadata)?
            .ok_or_else(|| UploadError::SessionNotFound(key.to_string()))?;

        tracing::info!(
            key = %key,
            file_name = %session.file.name,
            total_chunk = session.file.total_chunk,
            "Starting download"
        );

        let body = self.chunk_stream(&session);
        Ok(Download { session, body })
    }

    /// Chunks `0..=total_chunk` in order
    ///
    /// The stream yields one error and ends at the first chunk that cannot be
    /// read; nothing after it is sent.
    fn chunk_stream(&self, session: &Session) -> BoxStream<'static, Result<Bytes, UploadError>> {
        let chunks = self.chunks.clone();
        let key = session.key.clone();
        let last = session.file.total_chunk;
        let pacing = self.pacing;

        stream::unfold(Some(0u32), move |next| {
            let chunks = chunks.clone();
            let key = key.clone();
            async move {
                let index = next?;
                if index > 0 && !pacing.is_zero() {
                    tokio::time::sleep(pacing).await;
                }

                let address = ChunkAddress::new(key, index);
                match chunks.read_chunk(&address).await {
                    Ok(data) => {
                        let following = (index < last).then(|| index + 1);
                        Some((Ok(data), following))
                    }
                    Err(e) => {
                        tracing::error!(
                            key = %address.key,
                            chunk_index = index,
                            error = %e,
                            "Aborting download"
                        );
                        let err = match e {
                            StorageError::ObjectNotFound(_) => UploadError::ChunkMissingOnDownload {
                                key: address.key.into_string(),
                                index,
                            },
                            other => UploadError::Storage(other),
                        };
                        Some((Err(err), None))
                    }
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, SqliteSessionStore};
    use crate::upload::types::DeclaredFile;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        sessions: Arc<SqliteSessionStore>,
        chunks: ChunkStore,
        assembler: DownloadAssembler,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:{}", dir.path().join("sessions.db").display());
        let pool = create_pool(&url, 1).await.unwrap();
        let sessions = Arc::new(SqliteSessionStore::new(pool));
        let chunks = ChunkStore::with_local_storage(dir.path().join("chunks"));
        let assembler = DownloadAssembler::new(sessions.clone(), chunks.clone());
        Fixture {
            _dir: dir,
            sessions,
            chunks,
            assembler,
        }
    }

    async fn seed(f: &Fixture, key: &str, parts: &[(u32, &'static [u8])], total_chunk: u32) -> SessionKey {
        let key = SessionKey::new(key);
        f.sessions
            .insert(&Session::new(
                key.clone(),
                DeclaredFile {
                    name: "data.bin".to_string(),
                    size: 0,
                    mime_type: "application/octet-stream".to_string(),
                    total_chunk,
                },
            ))
            .await
            .unwrap();
        for (index, data) in parts {
            f.chunks
                .write_chunk(&ChunkAddress::new(key.clone(), *index), Bytes::from_static(*data))
                .await
                .unwrap();
        }
        key
    }

    #[tokio::test]
    async fn test_chunks_stream_in_index_order() {
        let f = fixture().await;
        // Written out of order on purpose
        let key = seed(&f, "ordered", &[(2, &b"C"[..]), (0, &b"A"[..]), (1, &b"B"[..])], 2).await;

        let download = f.assembler.stream_download(&key).await.unwrap();
        let frames: Vec<Bytes> = download
            .body
            .map(|frame| frame.unwrap())
            .collect()
            .await;

        assert_eq!(frames, vec![Bytes::from("A"), Bytes::from("B"), Bytes::from("C")]);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let f = fixture().await;
        let result = f.assembler.stream_download(&SessionKey::new("ghost")).await;
        assert!(matches!(result, Err(UploadError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_chunk_ends_stream() {
        let f = fixture().await;
        let key = seed(&f, "gappy", &[(0, &b"A"[..]), (2, &b"C"[..])], 2).await;

        let download = f.assembler.stream_download(&key).await.unwrap();
        let frames: Vec<Result<Bytes, UploadError>> = download.body.collect().await;

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref().unwrap(), &Bytes::from("A"));
        assert!(matches!(
            frames[1],
            Err(UploadError::ChunkMissingOnDownload { index: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_pacing_does_not_change_payload() {
        let f = fixture().await;
        let key = seed(&f, "paced", &[(0, &b"HE"[..]), (1, &b"LLO"[..])], 1).await;
        let assembler = f.assembler.clone().with_pacing(Duration::from_millis(5));

        let body: Vec<u8> = assembler
            .stream_download(&key)
            .await
            .unwrap()
            .body
            .map(|frame| frame.unwrap().to_vec())
            .concat()
            .await;

        assert_eq!(body, b"HELLO");
    }
}
