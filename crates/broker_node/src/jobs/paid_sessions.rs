use broker_core::create_treasure_payload;
use broker_core::data::{ChunkStatus, PaymentStatus, TreasureStatus, UploadSession};
use broker_storage::{ChunkStore, SessionStore, Store};
use tracing::{debug, info, warn};

use super::JobError;
use crate::config::BrokerConfig;

/// Buries treasure for paid sessions that still need it, then releases every
/// `Pending` chunk of a paid session for dispatch. Returns the number of released
/// chunks.
///
/// A session whose treasure cannot be buried keeps its chunks `Pending` so that no
/// treasure chunk is attached without its payload.
pub async fn process_paid_sessions(
    store: &dyn Store,
    config: &BrokerConfig,
) -> Result<usize, JobError> {
    let mut released = 0;
    for mut session in store
        .get_sessions_by_payment_status(PaymentStatus::Paid)
        .await?
    {
        if session.treasure_status != TreasureStatus::Buried {
            if let Err(err) = bury_treasure(store, &mut session, config.max_side_chain_length).await
            {
                warn!(
                    genesis_hash = %session.genesis_hash,
                    "Failed to bury treasure: {err}"
                );
                continue;
            }
        }
        released += release_pending_chunks(store, &session.genesis_hash).await?;
    }
    if released > 0 {
        info!("Released {released} chunks of paid sessions");
    }
    Ok(released)
}

/// Embeds a payload into every treasure chunk whose key is still set and clears the
/// key.
pub async fn bury_treasure(
    store: &dyn Store,
    session: &mut UploadSession,
    max_side_chain_length: u64,
) -> Result<(), JobError> {
    let mut treasure_map = session.treasure_map()?;
    for entry in treasure_map.iter_mut().filter(|e| !e.is_buried()) {
        let mut chunk = store
            .get_chunk(&session.genesis_hash, entry.idx)
            .await?
            .ok_or_else(|| JobError::MissingTreasureChunk(session.genesis_hash.clone(), entry.idx))?;

        chunk.message = create_treasure_payload(&entry.key, &chunk.hash, max_side_chain_length)?;
        store.update_chunks(std::slice::from_ref(&chunk)).await?;
        entry.key.clear();
        debug!(
            genesis_hash = %session.genesis_hash,
            "Buried treasure for sector {} in chunk {}", entry.sector, entry.idx
        );
    }

    session.set_treasure_map(&treasure_map)?;
    session.treasure_status = TreasureStatus::Buried;
    store.update_session(session).await?;
    Ok(())
}

async fn release_pending_chunks(store: &dyn Store, genesis_hash: &str) -> Result<usize, JobError> {
    let mut chunks: Vec<_> = store
        .get_chunks_by_genesis(genesis_hash)
        .await?
        .into_iter()
        .filter(|chunk| chunk.status == ChunkStatus::Pending)
        .collect();
    for chunk in chunks.iter_mut() {
        chunk.set_status(ChunkStatus::Unassigned)?;
    }
    store.update_chunks(&chunks).await?;
    Ok(chunks.len())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use broker_core::build_chunks;
    use broker_core::data::SessionType;
    use broker_core::treasure::verify_treasure_claim;
    use broker_storage::memory::MemoryStore;

    use super::*;

    const FILE_BYTES: u64 = 500_000;

    fn config() -> BrokerConfig {
        BrokerConfig {
            max_side_chain_length: 20,
            ..BrokerConfig::default()
        }
    }

    async fn start_session(store: &MemoryStore, session: &UploadSession) {
        store.insert_session(session).await.unwrap();
        let chunks = build_chunks(&session.genesis_hash, session.file_size_bytes).unwrap();
        store.insert_chunks(&chunks).await.unwrap();
    }

    fn paid_session(genesis: &str, treasure_status: TreasureStatus, map: &str) -> UploadSession {
        let mut session = UploadSession::new(genesis, FILE_BYTES, SessionType::Alpha);
        session.payment_status = PaymentStatus::Paid;
        session.treasure_status = treasure_status;
        session.treasure_idx_map = Some(map.to_string());
        session
    }

    #[tokio::test]
    async fn test_buries_treasure_and_releases_chunks() {
        let store = MemoryStore::new();
        let treasure_indexes: HashSet<u64> = [5, 78, 199].into_iter().collect();

        let unburied = paid_session(
            "genHash1",
            TreasureStatus::Unburied,
            r#"[{"sector": 1, "idx": 5, "key": "firstKeyFirstMap"},
                {"sector": 2, "idx": 78, "key": "secondKeyFirstMap"},
                {"sector": 3, "idx": 199, "key": "thirdKeyFirstMap"}]"#,
        );
        let buried = paid_session(
            "genHash2",
            TreasureStatus::Buried,
            r#"[{"sector": 1, "idx": 155, "key": "firstKeySecondMap"}]"#,
        );
        let mut unpaid = UploadSession::new("genHash3", FILE_BYTES, SessionType::Beta);
        unpaid.payment_status = PaymentStatus::Invoiced;
        for session in [&unburied, &buried, &unpaid] {
            start_session(&store, session).await;
        }

        let released = process_paid_sessions(&store, &config()).await.unwrap();
        assert_eq!(released, 2 * 230);

        for chunk in store.get_chunks_by_genesis("genHash1").await.unwrap() {
            assert_eq!(chunk.status, ChunkStatus::Unassigned);
            if treasure_indexes.contains(&chunk.chunk_idx) {
                assert!(!chunk.message.is_empty());
            } else {
                assert!(chunk.message.is_empty());
            }
        }
        let treasure_chunk = store.get_chunk("genHash1", 5).await.unwrap().unwrap();
        assert!(verify_treasure_claim(
            "firstKeyFirstMap",
            &treasure_chunk.hash,
            &treasure_chunk.message,
            20
        )
        .is_ok());

        for chunk in store.get_chunks_by_genesis("genHash2").await.unwrap() {
            assert_eq!(chunk.status, ChunkStatus::Unassigned);
            assert!(chunk.message.is_empty());
        }
        for chunk in store.get_chunks_by_genesis("genHash3").await.unwrap() {
            assert_eq!(chunk.status, ChunkStatus::Pending);
        }

        let session = store.get_session("genHash1").await.unwrap().unwrap();
        assert_eq!(session.treasure_status, TreasureStatus::Buried);
        let map = session.treasure_map().unwrap();
        assert_eq!(map.len(), 3);
        for entry in map {
            assert!(entry.is_buried());
            assert!(treasure_indexes.contains(&entry.idx));
        }

        // A second pass has nothing left to release.
        assert_eq!(process_paid_sessions(&store, &config()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_treasure_chunk_keeps_session_pending() {
        let store = MemoryStore::new();
        let session = paid_session(
            "genHash1",
            TreasureStatus::Unburied,
            r#"[{"sector": 1, "idx": 100000, "key": "key"}]"#,
        );
        start_session(&store, &session).await;

        assert_eq!(process_paid_sessions(&store, &config()).await.unwrap(), 0);
        let chunk = store.get_chunk("genHash1", 0).await.unwrap().unwrap();
        assert_eq!(chunk.status, ChunkStatus::Pending);
        let stored = store.get_session("genHash1").await.unwrap().unwrap();
        assert_eq!(stored.treasure_status, TreasureStatus::Unburied);
    }
}
