//! Chunk Store
//!
//! Durable storage for uploaded chunks, addressed by session key and index.
//! Supports both local filesystem and S3 storage backends.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use sha2::{Digest, Sha256};

use crate::error::{Result, StorageError};
use crate::storage::S3Client;
use super::types::ChunkAddress;

// ============================================================================
// Chunk Store Trait
// ============================================================================

/// Trait for chunk storage backends
///
/// Writes to the same address replace the previous payload.
#[async_trait::async_trait]
pub trait ChunkStorage: Send + Sync {
    /// Store a chunk, returning the number of bytes written
    async fn write_chunk(&self, address: &ChunkAddress, data: Bytes) -> Result<usize>;

    /// Read a chunk back; a missing chunk is `StorageError::ObjectNotFound`
    async fn read_chunk(&self, address: &ChunkAddress) -> Result<Bytes>;

    /// Check if a chunk has been stored
    async fn chunk_exists(&self, address: &ChunkAddress) -> Result<bool>;
}

// ============================================================================
// Chunk Store (Main Implementation)
// ============================================================================

/// Main chunk store with pluggable backends
#[derive(Clone)]
pub struct ChunkStore {
    backend: Arc<dyn ChunkStorage>,
}

impl ChunkStore {
    /// Create with a custom backend
    pub fn new(backend: Arc<dyn ChunkStorage>) -> Self {
        Self { backend }
    }

    /// Create with local filesystem storage
    pub fn with_local_storage(base_path: PathBuf) -> Self {
        Self::new(Arc::new(LocalChunkStorage::new(base_path)))
    }

    /// Create with S3 storage
    pub fn with_s3_storage(s3_client: S3Client, prefix: String) -> Self {
        Self::new(Arc::new(S3ChunkStorage::new(s3_client, prefix)))
    }

    pub async fn write_chunk(&self, address: &ChunkAddress, data: Bytes) -> Result<usize> {
        let written = self.backend.write_chunk(address, data).await?;

        tracing::debug!(
            key = %address.key,
            chunk_index = address.index,
            bytes = written,
            "Chunk stored"
        );

        Ok(written)
    }

    pub async fn read_chunk(&self, address: &ChunkAddress) -> Result<Bytes> {
        self.backend.read_chunk(address).await
    }

    pub async fn chunk_exists(&self, address: &ChunkAddress) -> Result<bool> {
        self.backend.chunk_exists(address).await
    }

    /// Indices from `addresses` that have no stored chunk
    pub async fn missing_chunks<I>(&self, addresses: I) -> Result<Vec<u32>>
    where
        I: IntoIterator<Item = ChunkAddress>,
    {
        let mut missing = Vec::new();
        for address in addresses {
            if !self.chunk_exists(&address).await? {
                missing.push(address.index);
            }
        }
        Ok(missing)
    }
}

/// Directory name for a session's chunks
///
/// Keys embed untrusted file names of any length, so the directory is named
/// by the SHA-256 of the key: one fixed-length, path-safe component.
fn session_dir_name(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Relative object path for a chunk
fn chunk_object_path(address: &ChunkAddress) -> String {
    format!(
        "chunks/{}/{:08}.chunk",
        session_dir_name(address.key.as_str()),
        address.index
    )
}

// ============================================================================
// Local Filesystem Storage
// ============================================================================

/// Local filesystem chunk storage
pub struct LocalChunkStorage {
    base_path: PathBuf,
}

impl LocalChunkStorage {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn chunk_path(&self, address: &ChunkAddress) -> PathBuf {
        self.base_path.join(chunk_object_path(address))
    }
}

#[async_trait::async_trait]
impl ChunkStorage for LocalChunkStorage {
    async fn write_chunk(&self, address: &ChunkAddress, data: Bytes) -> Result<usize> {
        let path = self.chunk_path(address);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Readers must never observe a partially written chunk.
        let tmp_path = path.with_extension(format!("tmp.{}", crate::upload::keygen::generate(8)));
        tokio::fs::write(&tmp_path, &data).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        Ok(data.len())
    }

    async fn read_chunk(&self, address: &ChunkAddress) -> Result<Bytes> {
        let path = self.chunk_path(address);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::ObjectNotFound(address.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn chunk_exists(&self, address: &ChunkAddress) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.chunk_path(address)).await?)
    }
}

// ============================================================================
// S3 Storage
// ============================================================================

/// S3-based chunk storage
pub struct S3ChunkStorage {
    client: S3Client,
    prefix: String,
}

impl S3ChunkStorage {
    pub fn new(client: S3Client, prefix: String) -> Self {
        Self { client, prefix }
    }

    fn chunk_key(&self, address: &ChunkAddress) -> String {
        format!("{}/{}", self.prefix, chunk_object_path(address))
    }
}

#[async_trait::async_trait]
impl ChunkStorage for S3ChunkStorage {
    async fn write_chunk(&self, address: &ChunkAddress, data: Bytes) -> Result<usize> {
        let key = self.chunk_key(address);
        let len = data.len();

        self.client
            .put_object(&key, data, "application/octet-stream")
            .await?;

        Ok(len)
    }

    async fn read_chunk(&self, address: &ChunkAddress) -> Result<Bytes> {
        let key = self.chunk_key(address);
        self.client.get_object(&key).await
    }

    async fn chunk_exists(&self, address: &ChunkAddress) -> Result<bool> {
        let key = self.chunk_key(address);
        self.client.object_exists(&key).await
    }
}

// ============================================================================
// Tests
// ============================================================================
