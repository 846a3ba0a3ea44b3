//! In-memory store, mostly for testing purposes

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use broker_core::data::{
    Chunk, ChunkChannel, ChunkStatus, PaymentStatus, SortOrder, UploadSession,
};
use chrono::{DateTime, Utc};

use crate::{ChannelStore, ChunkStore, SessionStore, StorageError};

type ChunkKey = (String, u64);

#[derive(Default)]
struct Tables {
    chunks: BTreeMap<ChunkKey, Chunk>,
    sessions: HashMap<String, UploadSession>,
    channels: BTreeMap<String, ChunkChannel>,
}

/// In-memory implementation of every store trait.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StorageError> {
        self.tables.read().map_err(|_| StorageError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StorageError> {
        self.tables.write().map_err(|_| StorageError::Poisoned)
    }

    /// Number of chunk records held.
    pub fn chunk_count(&self) -> usize {
        self.read().map(|t| t.chunks.len()).unwrap_or_default()
    }
}

fn is_retryable(chunk: &Chunk, max_retries: u32) -> bool {
    chunk.status.is_retryable() && chunk.retries < max_retries
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        for chunk in chunks {
            let key = (chunk.genesis_hash.clone(), chunk.chunk_idx);
            if tables.chunks.contains_key(&key) {
                return Err(StorageError::DuplicateChunk(key.0, key.1));
            }
        }
        for chunk in chunks {
            tables
                .chunks
                .insert((chunk.genesis_hash.clone(), chunk.chunk_idx), chunk.clone());
        }
        Ok(())
    }

    async fn update_chunks(&self, chunks: &[Chunk]) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        for chunk in chunks {
            let key = (chunk.genesis_hash.clone(), chunk.chunk_idx);
            match tables.chunks.get_mut(&key) {
                Some(stored) => {
                    stored.status = chunk.status;
                    stored.message = chunk.message.clone();
                    stored.trunk_tx = chunk.trunk_tx.clone();
                    stored.branch_tx = chunk.branch_tx.clone();
                    stored.node_id = chunk.node_id.clone();
                    stored.node_type = chunk.node_type.clone();
                    stored.retries = chunk.retries;
                    stored.updated_at = chunk.updated_at;
                }
                None => return Err(StorageError::ChunkNotFound(key.0, key.1)),
            }
        }
        Ok(())
    }

    async fn get_chunk(
        &self,
        genesis_hash: &str,
        chunk_idx: u64,
    ) -> Result<Option<Chunk>, StorageError> {
        let tables = self.read()?;
        Ok(tables
            .chunks
            .get(&(genesis_hash.to_owned(), chunk_idx))
            .cloned())
    }

    async fn get_chunks_by_genesis(&self, genesis_hash: &str) -> Result<Vec<Chunk>, StorageError> {
        let tables = self.read()?;
        let start = (genesis_hash.to_owned(), 0);
        let end = (genesis_hash.to_owned(), u64::MAX);
        Ok(tables
            .chunks
            .range(start..=end)
            .map(|(_, chunk)| chunk.clone())
            .collect())
    }

    async fn get_chunks_by_status(&self, status: ChunkStatus) -> Result<Vec<Chunk>, StorageError> {
        let tables = self.read()?;
        Ok(tables
            .chunks
            .values()
            .filter(|chunk| chunk.status == status)
            .cloned()
            .collect())
    }

    async fn get_retryable_chunks(
        &self,
        genesis_hash: &str,
        order: SortOrder,
        max_retries: u32,
        limit: Option<usize>,
    ) -> Result<Vec<Chunk>, StorageError> {
        let mut chunks: Vec<Chunk> = self
            .get_chunks_by_genesis(genesis_hash)
            .await?
            .into_iter()
            .filter(|chunk| is_retryable(chunk, max_retries))
            .collect();
        if order == SortOrder::Descending {
            chunks.reverse();
        }
        if let Some(limit) = limit {
            chunks.truncate(limit);
        }
        Ok(chunks)
    }

    async fn get_retryable_genesis_hashes(
        &self,
        max_retries: u32,
    ) -> Result<Vec<String>, StorageError> {
        let tables = self.read()?;
        let hashes: BTreeSet<&String> = tables
            .chunks
            .values()
            .filter(|chunk| is_retryable(chunk, max_retries))
            .map(|chunk| &chunk.genesis_hash)
            .collect();
        Ok(hashes.into_iter().cloned().collect())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: &UploadSession) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        tables
            .sessions
            .insert(session.genesis_hash.clone(), session.clone());
        Ok(())
    }

    async fn update_session(&self, session: &UploadSession) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        match tables.sessions.get_mut(&session.genesis_hash) {
            Some(stored) => {
                *stored = session.clone();
                Ok(())
            }
            None => Err(StorageError::SessionNotFound(session.genesis_hash.clone())),
        }
    }

    async fn get_session(&self, genesis_hash: &str) -> Result<Option<UploadSession>, StorageError> {
        Ok(self.read()?.sessions.get(genesis_hash).cloned())
    }

    async fn get_sessions_by_payment_status(
        &self,
        status: PaymentStatus,
    ) -> Result<Vec<UploadSession>, StorageError> {
        let tables = self.read()?;
        let mut sessions: Vec<UploadSession> = tables
            .sessions
            .values()
            .filter(|session| session.payment_status == status)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.genesis_hash.cmp(&b.genesis_hash));
        Ok(sessions)
    }
}

#[async_trait]
impl ChannelStore for MemoryStore {
    async fn upsert_channel(&self, channel: &ChunkChannel) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        tables
            .channels
            .insert(channel.channel_id.clone(), channel.clone());
        Ok(())
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Option<ChunkChannel>, StorageError> {
        Ok(self.read()?.channels.get(channel_id).cloned())
    }

    async fn add_chunks_processed(
        &self,
        channel_id: &str,
        count: u64,
    ) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        let channel = tables
            .channels
            .get_mut(channel_id)
            .ok_or_else(|| StorageError::ChannelNotFound(channel_id.to_owned()))?;
        channel.chunks_processed += count;
        Ok(())
    }

    async fn set_est_ready_time(
        &self,
        channel_id: &str,
        est_ready_time: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        let channel = tables
            .channels
            .get_mut(channel_id)
            .ok_or_else(|| StorageError::ChannelNotFound(channel_id.to_owned()))?;
        channel.est_ready_time = est_ready_time;
        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<ChunkChannel>, StorageError> {
        Ok(self.read()?.channels.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use broker_core::build_chunks_with_count;
    use broker_core::data::SessionType;

    use super::*;

    #[tokio::test]
    async fn test_insert_and_get_chunks() {
        let store = MemoryStore::new();
        let chunks = build_chunks_with_count("G", 3).unwrap();
        store.insert_chunks(&chunks).await.unwrap();

        assert_eq!(store.chunk_count(), 3);
        assert_eq!(store.get_chunks_by_genesis("G").await.unwrap(), chunks);
        assert_eq!(
            store.get_chunk("G", 1).await.unwrap().unwrap().address,
            chunks[1].address
        );
        assert!(store.get_chunk("G", 9).await.unwrap().is_none());
        assert!(matches!(
            store.insert_chunks(&chunks[..1]).await,
            Err(StorageError::DuplicateChunk(_, 0))
        ));
    }

    #[tokio::test]
    async fn test_update_writes_mutable_fields() {
        let store = MemoryStore::new();
        let mut chunks = build_chunks_with_count("G", 2).unwrap();
        store.insert_chunks(&chunks).await.unwrap();

        chunks[0].status = ChunkStatus::Unverified;
        chunks[0].trunk_tx = "TRUNK".into();
        chunks[0].message = "MSG".into();
        store.update_chunks(&chunks[..1]).await.unwrap();

        let stored = store.get_chunk("G", 0).await.unwrap().unwrap();
        assert_eq!(stored.status, ChunkStatus::Unverified);
        assert_eq!(stored.trunk_tx, "TRUNK");
        assert_eq!(stored.message, "MSG");

        let missing = build_chunks_with_count("other", 1).unwrap();
        assert!(matches!(
            store.update_chunks(&missing).await,
            Err(StorageError::ChunkNotFound(_, 0))
        ));
    }

    #[tokio::test]
    async fn test_retryable_chunks_are_scoped_and_ordered() {
        let store = MemoryStore::new();
        let mut chunks = build_chunks_with_count("G", 5).unwrap();
        for chunk in chunks.iter_mut() {
            chunk.status = ChunkStatus::Unassigned;
        }
        chunks[2].status = ChunkStatus::Error;
        chunks[3].status = ChunkStatus::Complete;
        chunks[4].status = ChunkStatus::Error;
        chunks[4].retries = 5;
        store.insert_chunks(&chunks).await.unwrap();

        let mut other = build_chunks_with_count("H", 2).unwrap();
        other[0].status = ChunkStatus::Error;
        store.insert_chunks(&other).await.unwrap();

        let idx = |c: Vec<Chunk>| c.iter().map(|c| c.chunk_idx).collect::<Vec<_>>();
        let asc = store
            .get_retryable_chunks("G", SortOrder::Ascending, 5, None)
            .await
            .unwrap();
        assert_eq!(idx(asc), vec![0, 1, 2]);
        let desc = store
            .get_retryable_chunks("G", SortOrder::Descending, 5, Some(2))
            .await
            .unwrap();
        assert_eq!(idx(desc), vec![2, 1]);

        assert_eq!(
            store.get_retryable_genesis_hashes(5).await.unwrap(),
            vec!["G".to_string(), "H".to_string()]
        );
    }

    #[tokio::test]
    async fn test_sessions_and_channels() {
        let store = MemoryStore::new();
        let mut session = UploadSession::new("G", 100, SessionType::Beta);
        store.insert_session(&session).await.unwrap();
        assert!(store
            .get_sessions_by_payment_status(PaymentStatus::Paid)
            .await
            .unwrap()
            .is_empty());

        session.payment_status = PaymentStatus::Paid;
        store.update_session(&session).await.unwrap();
        assert_eq!(
            store
                .get_sessions_by_payment_status(PaymentStatus::Paid)
                .await
                .unwrap(),
            vec![session]
        );

        let mut channel = ChunkChannel::new("channel-0");
        store.upsert_channel(&channel).await.unwrap();
        channel.chunks_processed = 7;
        store.upsert_channel(&channel).await.unwrap();
        store
            .upsert_channel(&ChunkChannel::new("channel-1"))
            .await
            .unwrap();

        let channels = store.list_channels().await.unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].chunks_processed, 7);

        store.add_chunks_processed("channel-0", 3).await.unwrap();
        let ready_at = channel.est_ready_time + chrono::Duration::seconds(5);
        store
            .set_est_ready_time("channel-0", ready_at)
            .await
            .unwrap();
        let stored = store.get_channel("channel-0").await.unwrap().unwrap();
        assert_eq!(stored.chunks_processed, 10);
        assert_eq!(stored.est_ready_time, ready_at);
        assert!(matches!(
            store.add_chunks_processed("missing", 1).await,
            Err(StorageError::ChannelNotFound(_))
        ));
    }
}
