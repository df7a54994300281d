//! Upload types for the chunked session protocol

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Length of the random part of a generated session key
pub const SESSION_KEY_RANDOM_LEN: usize = 10;

/// Key value on the wire that requests a new session
pub const NEW_SESSION_SENTINEL: &str = "0";

/// Largest declared file size kept as-is; larger values are clamped
pub const MAX_DECLARED_SIZE: u64 = i64::MAX as u64;

/// `errorStatus` reported for any failed request
pub const ERROR_STATUS_FAILED: i32 = 900;

/// `errorStatus` reported on success
pub const ERROR_STATUS_OK: i32 = 0;

// ============================================================================
// Keys and Addresses
// ============================================================================

/// Opaque session key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which session a chunk belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTarget {
    /// Allocate a fresh session for this chunk
    New,
    /// Append to a session the caller already holds
    Existing(SessionKey),
}

impl SessionTarget {
    /// Interpret the key path segment of an upload request
    pub fn from_wire(key: &str) -> Self {
        if key == NEW_SESSION_SENTINEL {
            Self::New
        } else {
            Self::Existing(SessionKey::new(key))
        }
    }
}

/// Location of one chunk in the chunk store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkAddress {
    pub key: SessionKey,
    pub index: u32,
}

impl ChunkAddress {
    pub fn new(key: SessionKey, index: u32) -> Self {
        Self { key, index }
    }
}

impl fmt::Display for ChunkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.key, self.index)
    }
}

// ============================================================================
// Session Types
// ============================================================================

/// Declared attributes of the file being uploaded
///
/// All values are caller-supplied and untrusted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredFile {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    /// Index of the last chunk
    pub total_chunk: u32,
}

/// Query string of a chunk upload request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadQuery {
    pub filename: Option<String>,
    pub filesize: Option<String>,
    pub totalchunk: Option<String>,
    pub mimetype: Option<String>,
}

impl From<UploadQuery> for DeclaredFile {
    /// Unparsable numbers fall back to zero instead of failing the request
    fn from(query: UploadQuery) -> Self {
        Self {
            name: query.filename.unwrap_or_default(),
            size: query
                .filesize
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|size| size.min(MAX_DECLARED_SIZE))
                .unwrap_or(0),
            mime_type: query.mimetype.unwrap_or_default(),
            total_chunk: query
                .totalchunk
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0),
        }
    }
}

/// Upload session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Accepting chunks
    Active,
    /// Caller reported the upload complete
    Finished,
    /// Caller cancelled the upload
    Aborted,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Finished => "finished",
            Self::Aborted => "aborted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "finished" => Some(Self::Finished),
            "aborted" => Some(Self::Aborted),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One upload session row
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub key: SessionKey,
    pub file: DeclaredFile,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new active session
    pub fn new(key: SessionKey, file: DeclaredFile) -> Self {
        let now = Utc::now();
        Self {
            key,
            file,
            state: SessionState::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Addresses of every declared chunk, in download order
    pub fn chunk_addresses(&self) -> impl Iterator<Item = ChunkAddress> + '_ {
        (0..=self.file.total_chunk).map(move |i| ChunkAddress::new(self.key.clone(), i))
    }
}

// ============================================================================
// Wire Types
// ============================================================================

/// JSON envelope returned by upload, finish and abort
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatus {
    pub key: String,
    pub error_status: i32,
}

impl UploadStatus {
    pub fn ok(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            error_status: ERROR_STATUS_OK,
        }
    }

    pub fn failed(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            error_status: ERROR_STATUS_FAILED,
        }
    }
}

/// Result of a successful chunk ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub key: SessionKey,
    pub chunk_index: u32,
    pub bytes_written: usize,
    /// Whether this chunk allocated the session
    pub created: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_maps_to_new_session() {
        assert_eq!(SessionTarget::from_wire("0"), SessionTarget::New);
        assert_eq!(
            SessionTarget::from_wire("abc"),
            SessionTarget::Existing(SessionKey::new("abc"))
        );
    }

    #[test]
    fn test_declared_file_defaults_bad_numbers_to_zero() {
        let declared = DeclaredFile::from(UploadQuery {
            filename: Some("report.pdf".to_string()),
            filesize: Some("lots".to_string()),
            totalchunk: None,
            mimetype: Some("application/pdf".to_string()),
        });

        assert_eq!(declared.name, "report.pdf");
        assert_eq!(declared.size, 0);
        assert_eq!(declared.total_chunk, 0);
        assert_eq!(declared.mime_type, "application/pdf");
    }

    #[test]
    fn test_declared_size_is_clamped_to_storable_range() {
        let declared = DeclaredFile::from(UploadQuery {
            filesize: Some(u64::MAX.to_string()),
            ..Default::default()
        });
        assert_eq!(declared.size, MAX_DECLARED_SIZE);

        let declared = DeclaredFile::from(UploadQuery {
            filesize: Some(MAX_DECLARED_SIZE.to_string()),
            ..Default::default()
        });
        assert_eq!(declared.size, MAX_DECLARED_SIZE);
    }

    #[test]
    fn test_chunk_addresses_are_inclusive() {
        let session = Session::new(
            SessionKey::new("k"),
            DeclaredFile {
                total_chunk: 2,
                ..Default::default()
            },
        );
        let indices: Vec<u32> = session.chunk_addresses().map(|a| a.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let json = serde_json::to_string(&UploadStatus::ok("abc")).unwrap();
        assert_eq!(json, r#"{"key":"abc","errorStatus":0}"#);
    }
}
