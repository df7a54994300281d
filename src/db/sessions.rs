//! Session metadata database operations

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{Result, StorageError};
use crate::upload::types::{DeclaredFile, Session, SessionKey, SessionState};

/// Durable record of upload sessions
///
/// Declared file attributes are immutable once inserted; only the state moves.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new session; an existing key is an error
    async fn insert(&self, session: &Session) -> Result<()>;

    /// Look up a session by key
    async fn find_by_key(&self, key: &SessionKey) -> Result<Option<Session>>;

    /// Move a session from `from` to `to`
    ///
    /// Returns `false` when no session with that key is in state `from`.
    async fn update_state(
        &self,
        key: &SessionKey,
        from: SessionState,
        to: SessionState,
    ) -> Result<bool>;
}

/// Session row as stored
#[derive(Debug, Clone, sqlx::FromRow)]
struct SessionRow {
    session_key: String,
    name: String,
    size: i64,
    mime_type: String,
    total_chunk: i64,
    state: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SessionRow> for Session {
    type Error = StorageError;

    fn try_from(row: SessionRow) -> Result<Self> {
        let state = SessionState::parse(&row.state)
            .ok_or_else(|| decode_error(format!("unknown session state '{}'", row.state)))?;

        Ok(Session {
            key: SessionKey::new(row.session_key),
            file: DeclaredFile {
                name: row.name,
                size: u64::try_from(row.size).unwrap_or(0),
                mime_type: row.mime_type,
                total_chunk: u32::try_from(row.total_chunk).unwrap_or(0),
            },
            state,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| decode_error(format!("invalid timestamp '{}': {}", value, e)))
}

fn decode_error(message: String) -> StorageError {
    StorageError::Database(sqlx::Error::Decode(message.into()))
}

/// SQLite-backed session store
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SessionStore for SqliteSessionStore {
    async fn insert(&self, session: &Session) -> Result<()> {
        let size = i64::try_from(session.file.size).map_err(|_| {
            StorageError::Database(sqlx::Error::Encode(
                format!("declared size {} exceeds column range", session.file.size).into(),
            ))
        })?;

        sqlx::query(
            r#"
            INSERT INTO upload_sessions (session_key, name, size, mime_type, total_chunk, state, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session.key.as_str())
        .bind(&session.file.name)
        .bind(size)
        .bind(&session.file.mime_type)
        .bind(i64::from(session.file.total_chunk))
        .bind(session.state.as_str())
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_key(&self, key: &SessionKey) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT session_key, name, size, mime_type, total_chunk, state, created_at, updated_at
            FROM upload_sessions
            WHERE session_key = ?
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Session::try_from).transpose()
    }

    async fn update_state(
        &self,
        key: &SessionKey,
        from: SessionState,
        to: SessionState,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE upload_sessions
            SET state = ?, updated_at = ?
            WHERE session_key = ? AND state = ?
            "#,
        )
        .bind(to.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(key.as_str())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;
    use crate::upload::types::MAX_DECLARED_SIZE;
    use tempfile::TempDir;

    async fn test_store() -> (TempDir, SqliteSessionStore) {
        let temp_dir = TempDir::new().unwrap();
        let url = format!("sqlite:{}", temp_dir.path().join("sessions.db").display());
        let pool = create_pool(&url, 1).await.unwrap();
        (temp_dir, SqliteSessionStore::new(pool))
    }

    fn test_session(key: &str) -> Session {
        Session::new(
            SessionKey::new(key),
            DeclaredFile {
                name: "report.pdf".to_string(),
                size: 20,
                mime_type: "application/pdf".to_string(),
                total_chunk: 1,
            },
        )
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let (_dir, store) = test_store().await;
        let session = test_session("abcdefghijreport.pdf");

        store.insert(&session).await.unwrap();

        let found = store.find_by_key(&session.key).await.unwrap().unwrap();
        assert_eq!(found.key, session.key);
        assert_eq!(found.file, session.file);
        assert_eq!(found.state, SessionState::Active);
    }

    #[tokio::test]
    async fn test_largest_declared_size_round_trips() {
        let (_dir, store) = test_store().await;
        let mut session = test_session("huge");
        session.file.size = MAX_DECLARED_SIZE;

        store.insert(&session).await.unwrap();
        let found = store.find_by_key(&session.key).await.unwrap().unwrap();
        assert_eq!(found.file.size, MAX_DECLARED_SIZE);

        session.key = SessionKey::new("too-huge");
        session.file.size = MAX_DECLARED_SIZE + 1;
        assert!(store.insert(&session).await.is_err());
    }

    #[tokio::test]
    async fn test_find_unknown_key() {
        let (_dir, store) = test_store().await;
        let found = store.find_by_key(&SessionKey::new("missing")).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected() {
        let (_dir, store) = test_store().await;
        let session = test_session("dup");

        store.insert(&session).await.unwrap();
        assert!(store.insert(&session).await.is_err());
    }

    #[tokio::test]
    async fn test_update_state_is_conditional() {
        let (_dir, store) = test_store().await;
        let session = test_session("k");
        store.insert(&session).await.unwrap();

        let changed = store
            .update_state(&session.key, SessionState::Active, SessionState::Aborted)
            .await
            .unwrap();
        assert!(changed);

        // Already aborted, so the active -> finished move must not apply
        let changed = store
            .update_state(&session.key, SessionState::Active, SessionState::Finished)
            .await
            .unwrap();
        assert!(!changed);

        let found = store.find_by_key(&session.key).await.unwrap().unwrap();
        assert_eq!(found.state, SessionState::Aborted);
    }
}
