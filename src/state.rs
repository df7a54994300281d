//! Application state management

use std::sync::Arc;
use std::time::Duration;

use crate::config::{ChunkConfig, Config};
use crate::db::{self, SessionStore, SqliteSessionStore};
use crate::error::StorageError;
use crate::storage::S3Client;
use crate::upload::{ChunkStore, DownloadAssembler, SessionLifecycle, UploadCoordinator};

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to initialize session store: {0}")]
    SessionStore(#[source] StorageError),

    #[error("Failed to initialize chunk store: {0}")]
    ChunkStore(#[source] StorageError),
}

/// Shared application state
///
/// Owns the stores for the lifetime of the server; every handler reaches
/// them through the components built here.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    coordinator: UploadCoordinator,
    lifecycle: SessionLifecycle,
    assembler: DownloadAssembler,
}

impl AppState {
    /// Wire the protocol components to already constructed stores
    pub fn new(config: Config, sessions: Arc<dyn SessionStore>, chunks: ChunkStore) -> Self {
        let pacing = Duration::from_millis(config.download.pacing_ms);

        Self {
            inner: Arc::new(AppStateInner {
                coordinator: UploadCoordinator::new(sessions.clone(), chunks.clone()),
                lifecycle: SessionLifecycle::new(sessions.clone(), chunks.clone()),
                assembler: DownloadAssembler::new(sessions, chunks).with_pacing(pacing),
                config,
            }),
        }
    }

    /// Open the configured stores and build the state
    pub async fn from_config(config: Config) -> Result<Self, StateError> {
        let pool = db::create_pool(&config.database.url, config.database.max_connections)
            .await
            .map_err(StateError::SessionStore)?;
        tracing::info!("Session store initialized at {}", config.database.url);

        let chunks = match &config.chunks {
            ChunkConfig::Local { base_path } => {
                tokio::fs::create_dir_all(base_path)
                    .await
                    .map_err(|e| StateError::ChunkStore(e.into()))?;
                tracing::info!("Chunk store: local directory {}", base_path.display());
                ChunkStore::with_local_storage(base_path.clone())
            }
            ChunkConfig::S3(s3) => {
                let client = S3Client::new(s3).await.map_err(StateError::ChunkStore)?;
                tracing::info!(
                    "Chunk store: S3 bucket {} at {} (prefix {})",
                    client.bucket(),
                    s3.endpoint,
                    s3.prefix
                );
                ChunkStore::with_s3_storage(client, s3.prefix.clone())
            }
        };

        let sessions: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(pool));
        Ok(Self::new(config, sessions, chunks))
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the upload coordinator
    pub fn coordinator(&self) -> &UploadCoordinator {
        &self.inner.coordinator
    }

    /// Get the session lifecycle controller
    pub fn lifecycle(&self) -> &SessionLifecycle {
        &self.inner.lifecycle
    }

    /// Get the download assembler
    pub fn assembler(&self) -> &DownloadAssembler {
        &self.inner.assembler
    }
}
