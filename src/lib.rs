//! Chunkstream Server Library
//!
//! Chunked upload sessions with streamed, ordered reassembly.
//!
//! # Modules
//!
//! - `upload`: Session protocol (key generation, chunk store, coordinator,
//!   lifecycle, download assembly)
//! - `db`: SQLite session metadata store
//! - `routes`: HTTP surface
//! - `storage`: S3-compatible object storage client

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;
pub mod storage;
pub mod upload;

pub use config::Config;
pub use routes::app;
pub use state::AppState;
