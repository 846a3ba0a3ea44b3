//! Store doubles shared by the job and pool tests.

use async_trait::async_trait;
use broker_core::data::{Chunk, ChunkChannel, ChunkStatus, PaymentStatus, SortOrder, UploadSession};
use broker_storage::memory::MemoryStore;
use broker_storage::{ChannelStore, ChunkStore, SessionStore, StorageError};
use chrono::{DateTime, Utc};

/// Memory store that rejects the chunk updates `reject` matches.
pub struct RejectingStore {
    inner: MemoryStore,
    reject: Box<dyn Fn(&[Chunk]) -> bool + Send + Sync>,
}

impl RejectingStore {
    pub fn new(
        inner: MemoryStore,
        reject: impl Fn(&[Chunk]) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner,
            reject: Box::new(reject),
        }
    }
}

#[async_trait]
impl ChunkStore for RejectingStore {
    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), StorageError> {
        self.inner.insert_chunks(chunks).await
    }

    async fn update_chunks(&self, chunks: &[Chunk]) -> Result<(), StorageError> {
        if (self.reject)(chunks) {
            return Err(StorageError::Poisoned);
        }
        self.inner.update_chunks(chunks).await
    }

    async fn get_chunk(
        &self,
        genesis_hash: &str,
        chunk_idx: u64,
    ) -> Result<Option<Chunk>, StorageError> {
        self.inner.get_chunk(genesis_hash, chunk_idx).await
    }

    async fn get_chunks_by_genesis(
        &self,
        genesis_hash: &str,
    ) -> Result<Vec<Chunk>, StorageError> {
        self.inner.get_chunks_by_genesis(genesis_hash).await
    }

    async fn get_chunks_by_status(
        &self,
        status: ChunkStatus,
    ) -> Result<Vec<Chunk>, StorageError> {
        self.inner.get_chunks_by_status(status).await
    }

    async fn get_retryable_chunks(
        &self,
        genesis_hash: &str,
        order: SortOrder,
        max_retries: u32,
        limit: Option<usize>,
    ) -> Result<Vec<Chunk>, StorageError> {
        self.inner
            .get_retryable_chunks(genesis_hash, order, max_retries, limit)
            .await
    }

    async fn get_retryable_genesis_hashes(
        &self,
        max_retries: u32,
    ) -> Result<Vec<String>, StorageError> {
        self.inner.get_retryable_genesis_hashes(max_retries).await
    }
}

#[async_trait]
impl SessionStore for RejectingStore {
    async fn insert_session(&self, session: &UploadSession) -> Result<(), StorageError> {
        self.inner.insert_session(session).await
    }

    async fn update_session(&self, session: &UploadSession) -> Result<(), StorageError> {
        self.inner.update_session(session).await
    }

    async fn get_session(
        &self,
        genesis_hash: &str,
    ) -> Result<Option<UploadSession>, StorageError> {
        self.inner.get_session(genesis_hash).await
    }

    async fn get_sessions_by_payment_status(
        &self,
        status: PaymentStatus,
    ) -> Result<Vec<UploadSession>, StorageError> {
        self.inner.get_sessions_by_payment_status(status).await
    }
}

#[async_trait]
impl ChannelStore for RejectingStore {
    async fn upsert_channel(&self, channel: &ChunkChannel) -> Result<(), StorageError> {
        self.inner.upsert_channel(channel).await
    }

    async fn get_channel(
        &self,
        channel_id: &str,
    ) -> Result<Option<ChunkChannel>, StorageError> {
        self.inner.get_channel(channel_id).await
    }

    async fn add_chunks_processed(
        &self,
        channel_id: &str,
        count: u64,
    ) -> Result<(), StorageError> {
        self.inner.add_chunks_processed(channel_id, count).await
    }

    async fn set_est_ready_time(
        &self,
        channel_id: &str,
        est_ready_time: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.inner.set_est_ready_time(channel_id, est_ready_time).await
    }

    async fn list_channels(&self) -> Result<Vec<ChunkChannel>, StorageError> {
        self.inner.list_channels().await
    }
}
