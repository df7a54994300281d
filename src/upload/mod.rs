//! Chunked Upload Module
//!
//! Implements the chunked upload session protocol:
//! - Session key generation
//! - Per-chunk ingestion into a pluggable chunk store
//! - Explicit finish/abort transitions
//! - Ordered, streamed reassembly for download
//!
//! Protocol Flow:
//! 1. Client uploads chunk 0 with the sentinel key and the declared file attributes
//! 2. Server allocates a session and returns its key
//! 3. Client uploads the remaining chunks to that key, in any order
//! 4. Client reports finish (or abort)
//! 5. Anyone holding the key can download the reassembled file

pub mod chunk_store;
pub mod coordinator;
pub mod download;
pub mod keygen;
pub mod lifecycle;
pub mod types;

pub use chunk_store::{ChunkStorage, ChunkStore, LocalChunkStorage, S3ChunkStorage};
pub use coordinator::UploadCoordinator;
pub use download::{Download, DownloadAssembler};
pub use lifecycle::{SessionLifecycle, Transition};
pub use types::*;
