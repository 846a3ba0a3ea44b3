//! Persistence interfaces for chunk, session and worker-channel records.
//!
//! The node only talks to storage through these traits. [`memory::MemoryStore`] keeps
//! everything in process and [`sqlite::SqliteStore`] persists to an SQLite file.

use async_trait::async_trait;
use broker_core::data::{
    Chunk, ChunkChannel, ChunkError, ChunkStatus, PaymentStatus, SessionError, SortOrder,
    UploadSession,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod memory;
pub mod sqlite;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid chunk record: {0}")]
    InvalidChunk(#[from] ChunkError),

    #[error("Invalid session record: {0}")]
    InvalidSession(#[from] SessionError),

    #[error("Chunk {1} of {0} already exists")]
    DuplicateChunk(String, u64),

    #[error("Chunk {1} of {0} does not exist")]
    ChunkNotFound(String, u64),

    #[error("Session {0} does not exist")]
    SessionNotFound(String),

    #[error("Channel {0} does not exist")]
    ChannelNotFound(String),

    #[error("Storage lock was poisoned")]
    Poisoned,
}

/// Chunk record storage.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Creates new records. `(genesis_hash, chunk_idx)` must be unique.
    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), StorageError>;

    /// Writes back the mutable fields (status, message, trunk/branch, retries, node
    /// assignment) of existing records.
    async fn update_chunks(&self, chunks: &[Chunk]) -> Result<(), StorageError>;

    async fn get_chunk(
        &self,
        genesis_hash: &str,
        chunk_idx: u64,
    ) -> Result<Option<Chunk>, StorageError>;

    /// All chunks of a file in ascending index order.
    async fn get_chunks_by_genesis(&self, genesis_hash: &str) -> Result<Vec<Chunk>, StorageError>;

    async fn get_chunks_by_status(&self, status: ChunkStatus) -> Result<Vec<Chunk>, StorageError>;

    /// Chunks of one file that are `Unassigned` or `Error` and have been demoted fewer
    /// than `max_retries` times, in `order` of chunk index.
    async fn get_retryable_chunks(
        &self,
        genesis_hash: &str,
        order: SortOrder,
        max_retries: u32,
        limit: Option<usize>,
    ) -> Result<Vec<Chunk>, StorageError>;

    /// Distinct genesis hashes that have retryable chunks.
    async fn get_retryable_genesis_hashes(
        &self,
        max_retries: u32,
    ) -> Result<Vec<String>, StorageError>;
}

/// Upload session storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: &UploadSession) -> Result<(), StorageError>;

    async fn update_session(&self, session: &UploadSession) -> Result<(), StorageError>;

    async fn get_session(&self, genesis_hash: &str) -> Result<Option<UploadSession>, StorageError>;

    async fn get_sessions_by_payment_status(
        &self,
        status: PaymentStatus,
    ) -> Result<Vec<UploadSession>, StorageError>;
}

/// Worker channel storage.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    /// Inserts the channel or replaces an existing one with the same id.
    async fn upsert_channel(&self, channel: &ChunkChannel) -> Result<(), StorageError>;

    async fn get_channel(&self, channel_id: &str) -> Result<Option<ChunkChannel>, StorageError>;

    /// Adds `count` to the channel's processed counter in a single write.
    async fn add_chunks_processed(&self, channel_id: &str, count: u64) -> Result<(), StorageError>;

    /// Sets the channel's estimated ready time, leaving its counter untouched.
    async fn set_est_ready_time(
        &self,
        channel_id: &str,
        est_ready_time: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// All channels ordered by id.
    async fn list_channels(&self) -> Result<Vec<ChunkChannel>, StorageError>;
}

/// Everything the node persists.
pub trait Store: ChunkStore + SessionStore + ChannelStore {}

impl<T: ChunkStore + SessionStore + ChannelStore> Store for T {}
