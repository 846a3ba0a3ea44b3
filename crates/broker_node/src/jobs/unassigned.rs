use broker_core::data::{Chunk, SortOrder};
use broker_storage::{ChunkStore, SessionStore, Store};
use chrono::Utc;
use tracing::{debug, info, warn};

use super::JobError;
use crate::config::BrokerConfig;
use crate::pool::WorkerPool;

/// Retryable chunks of one file in the order its session processes them.
pub async fn retry_queue(
    store: &dyn Store,
    genesis_hash: &str,
    max_retries: u32,
) -> Result<Vec<Chunk>, JobError> {
    let order = match store.get_session(genesis_hash).await? {
        Some(session) => session.session_type.sort_order(),
        None => SortOrder::Ascending,
    };
    Ok(store
        .get_retryable_chunks(genesis_hash, order, max_retries, None)
        .await?)
}

/// Splits `chunks` into batches of `batch_size` and pairs each batch with one of
/// `channels`. Batches beyond the number of channels are left for a later pass.
pub fn collect_dispatch_batches(
    chunks: Vec<Chunk>,
    batch_size: usize,
    channels: &[String],
) -> Vec<(String, Vec<Chunk>)> {
    let batch_size = batch_size.max(1);
    let mut remaining = chunks.into_iter();
    let mut batches = Vec::new();
    for channel in channels {
        let batch: Vec<Chunk> = remaining.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            break;
        }
        batches.push((channel.clone(), batch));
    }
    batches
}

/// Dispatches retryable chunks to every channel that is ready for more work.
/// Returns the number of chunks dispatched.
pub async fn process_unassigned_chunks(
    store: &dyn Store,
    pool: &WorkerPool,
    config: &BrokerConfig,
) -> Result<usize, JobError> {
    let mut ready = pool.ready_channels(Utc::now()).await?;
    if ready.is_empty() {
        debug!("No worker channel is ready");
        return Ok(0);
    }

    let mut dispatched = 0;
    for genesis_hash in store
        .get_retryable_genesis_hashes(config.max_retries)
        .await?
    {
        if ready.is_empty() {
            break;
        }
        let queue = match retry_queue(store, &genesis_hash, config.max_retries).await {
            Ok(queue) => queue,
            Err(err) => {
                warn!(genesis_hash = %genesis_hash, "Could not load retryable chunks: {err}");
                continue;
            }
        };
        for (channel_id, batch) in collect_dispatch_batches(queue, config.batch_size, &ready) {
            ready.retain(|id| id != &channel_id);
            let count = batch.len();
            match pool.dispatch(&channel_id, batch).await {
                Ok(_) => dispatched += count,
                Err(err) => {
                    warn!(
                        genesis_hash = %genesis_hash,
                        channel_id = %channel_id,
                        "Dispatch failed: {err}"
                    );
                }
            }
        }
    }
    if dispatched > 0 {
        info!("Dispatched {dispatched} chunks");
    }
    Ok(dispatched)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use broker_core::build_chunks_with_count;
    use broker_core::data::{ChunkStatus, SessionType, UploadSession};
    use broker_storage::memory::MemoryStore;
    use broker_tangle::mock::MockLedger;
    use broker_tangle::Blake3Pow;

    use super::*;
    use crate::config::PoolConfig;
    use crate::report::TracingReporter;
    use crate::testing::RejectingStore;

    fn indices(chunks: &[Chunk]) -> Vec<u64> {
        chunks.iter().map(|c| c.chunk_idx).collect()
    }

    async fn session_with_chunks(store: &MemoryStore, genesis: &str, session_type: SessionType) {
        store
            .insert_session(&UploadSession::new(genesis, 5 * 2187, session_type))
            .await
            .unwrap();
        let mut chunks = build_chunks_with_count(genesis, 5).unwrap();
        for chunk in chunks.iter_mut() {
            chunk.status = ChunkStatus::Unassigned;
        }
        store.insert_chunks(&chunks).await.unwrap();
    }

    #[tokio::test]
    async fn test_session_type_decides_dispatch_order() {
        let store = MemoryStore::new();
        session_with_chunks(&store, "alpha", SessionType::Alpha).await;
        session_with_chunks(&store, "beta", SessionType::Beta).await;

        let alpha = retry_queue(&store, "alpha", 5).await.unwrap();
        let beta = retry_queue(&store, "beta", 5).await.unwrap();
        assert_eq!(indices(&alpha), vec![0, 1, 2, 3, 4]);
        assert_eq!(indices(&beta), vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_batches_fill_ready_channels_in_order() {
        let chunks = build_chunks_with_count("G", 7).unwrap();
        let channels = vec!["channel-0".to_string(), "channel-1".to_string()];

        let batches = collect_dispatch_batches(chunks.clone(), 3, &channels);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].0, "channel-0");
        assert_eq!(indices(&batches[0].1), vec![0, 1, 2]);
        assert_eq!(indices(&batches[1].1), vec![3, 4, 5]);

        let batches = collect_dispatch_batches(chunks[..2].to_vec(), 3, &channels);
        assert_eq!(batches.len(), 1);
        assert!(collect_dispatch_batches(Vec::new(), 3, &channels).is_empty());
    }

    #[tokio::test]
    async fn test_dispatches_each_session_to_its_own_channel() {
        let store = MemoryStore::new();
        session_with_chunks(&store, "alpha", SessionType::Alpha).await;
        session_with_chunks(&store, "beta", SessionType::Beta).await;

        let pool = WorkerPool::start(
            PoolConfig {
                procs: Some(2),
                min_weight_magnitude: 3,
                ..PoolConfig::default()
            },
            Arc::new(store.clone()),
            Arc::new(MockLedger::new()),
            Arc::new(Blake3Pow::new()),
            Arc::new(TracingReporter),
        )
        .await
        .unwrap();
        let config = BrokerConfig {
            batch_size: 5,
            ..BrokerConfig::default()
        };

        let dispatched = process_unassigned_chunks(&store, &pool, &config)
            .await
            .unwrap();
        assert_eq!(dispatched, 10);
        assert!(store
            .get_retryable_genesis_hashes(5)
            .await
            .unwrap()
            .is_empty());

        // Both channels are busy now.
        assert_eq!(
            process_unassigned_chunks(&store, &pool, &config)
                .await
                .unwrap(),
            0
        );
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_dispatch_does_not_stop_other_sessions() {
        let store = MemoryStore::new();
        session_with_chunks(&store, "alpha", SessionType::Alpha).await;
        session_with_chunks(&store, "beta", SessionType::Alpha).await;
        let backend = Arc::new(RejectingStore::new(store.clone(), |chunks| {
            chunks.iter().any(|c| c.genesis_hash == "alpha")
        }));

        let pool = WorkerPool::start(
            PoolConfig {
                procs: Some(2),
                min_weight_magnitude: 3,
                ..PoolConfig::default()
            },
            backend.clone(),
            Arc::new(MockLedger::new()),
            Arc::new(Blake3Pow::new()),
            Arc::new(TracingReporter),
        )
        .await
        .unwrap();
        let config = BrokerConfig {
            batch_size: 5,
            ..BrokerConfig::default()
        };

        let dispatched = process_unassigned_chunks(backend.as_ref(), &pool, &config)
            .await
            .unwrap();
        assert_eq!(dispatched, 5);
        assert_eq!(
            store.get_retryable_genesis_hashes(5).await.unwrap(),
            vec!["alpha".to_string()]
        );
        pool.shutdown().await;

        for chunk in store.get_chunks_by_genesis("beta").await.unwrap() {
            assert_eq!(chunk.status, ChunkStatus::Unverified);
        }
    }
}
