//! Session Lifecycle Controller
//!
//! `Active --finish--> Finished`, `Active --abort--> Aborted`. Both target
//! states are terminal.

use std::sync::Arc;

use crate::db::SessionStore;
use crate::error::UploadError;
use super::chunk_store::ChunkStore;
use super::types::{Session, SessionKey, SessionState};

/// Outcome of a lifecycle call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The session moved to the requested state
    Applied,
    /// The session was already in the requested state
    Unchanged,
    /// No session exists for the key; nothing was recorded
    UnknownSession,
}

/// Handles explicit finish and abort reports
#[derive(Clone)]
pub struct SessionLifecycle {
    sessions: Arc<dyn SessionStore>,
    chunks: ChunkStore,
}

impl SessionLifecycle {
    pub fn new(sessions: Arc<dyn SessionStore>, chunks: ChunkStore) -> Self {
        Self { sessions, chunks }
    }

    /// Mark a session finished once every declared chunk is stored
    pub async fn finish(&self, key: &SessionKey) -> Result<Transition, UploadError> {
        let Some(session) = self.lookup(key).await? else {
            tracing::warn!(key = %key, "Finish for unknown session");
            return Ok(Transition::UnknownSession);
        };

        if session.state == SessionState::Active {
            let missing = self
                .chunks
                .missing_chunks(session.chunk_addresses())
                .await
                .map_err(UploadError::Storage)?;

            if !missing.is_empty() {
                tracing::warn!(key = %key, missing = ?missing, "Finish with missing chunks");
                return Err(UploadError::IncompleteUpload { missing });
            }
        }

        self.transition(key, session.state, SessionState::Finished).await
    }

    /// Mark a session aborted; stored chunks and metadata are kept
    pub async fn abort(&self, key: &SessionKey) -> Result<Transition, UploadError> {
        let Some(session) = self.lookup(key).await? else {
            tracing::warn!(key = %key, "Abort for unknown session");
            return Ok(Transition::UnknownSession);
        };

        self.transition(key, session.state, SessionState::Aborted).await
    }

    async fn lookup(&self, key: &SessionKey) -> Result<Option<Session>, UploadError> {
        self.sessions
            .find_by_key(key)
            .await
            .map_err(UploadError::Metadata)
    }

    async fn transition(
        &self,
        key: &SessionKey,
        current: SessionState,
        target: SessionState,
    ) -> Result<Transition, UploadError> {
        if current == target {
            return Ok(Transition::Unchanged);
        }

        if current.is_terminal() {
            return Err(UploadError::InvalidTransition {
                key: key.to_string(),
                from: current.as_str(),
                to: target.as_str(),
            });
        }

        let applied = self
            .sessions
            .update_state(key, SessionState::Active, target)
            .await
            .map_err(UploadError::Metadata)?;

        if applied {
            tracing::info!(key = %key, state = %target, "Upload session closed");
            return Ok(Transition::Applied);
        }

        // Lost a race with a concurrent transition; report against the winner.
        match self.lookup(key).await? {
            Some(session) if session.state == target => Ok(Transition::Unchanged),
            Some(session) => Err(UploadError::InvalidTransition {
                key: key.to_string(),
                from: session.state.as_str(),
                to: target.as_str(),
            }),
            None => Ok(Transition::UnknownSession),
        }
    }
}
