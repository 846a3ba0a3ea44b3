use std::sync::Arc;

use broker_core::build_chunks;
use broker_core::data::{SessionType, UploadSession};
use broker_storage::{ChunkStore, SessionStore, Store};
use tracing::info;

use crate::config::BrokerConfig;
use crate::jobs::reconcile::ReconcileSummary;
use crate::jobs::{self, JobError, ReconcileGuard};
use crate::pool::WorkerPool;
use crate::verify::TangleVerifier;

/// Ties the store, worker pool and verifier together and runs the chunk lifecycle
/// jobs against them.
pub struct Broker {
    store: Arc<dyn Store>,
    pool: Arc<WorkerPool>,
    verifier: TangleVerifier,
    guard: ReconcileGuard,
    config: BrokerConfig,
}

impl Broker {
    pub fn new(
        store: Arc<dyn Store>,
        pool: Arc<WorkerPool>,
        verifier: TangleVerifier,
        config: BrokerConfig,
    ) -> Self {
        Self {
            store,
            pool,
            verifier,
            guard: ReconcileGuard::new(),
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Records a new upload and its `Pending` chunk records.
    pub async fn start_upload_session(
        &self,
        genesis_hash: &str,
        file_size_bytes: u64,
        session_type: SessionType,
    ) -> anyhow::Result<UploadSession> {
        let session = UploadSession::new(genesis_hash, file_size_bytes, session_type);
        let chunks = build_chunks(genesis_hash, file_size_bytes)?;
        self.store.insert_session(&session).await?;
        self.store.insert_chunks(&chunks).await?;
        info!(
            genesis_hash,
            "Started upload session with {} chunks",
            chunks.len()
        );
        Ok(session)
    }

    pub async fn process_paid_sessions(&self) -> Result<usize, JobError> {
        jobs::process_paid_sessions(self.store.as_ref(), &self.config).await
    }

    pub async fn process_unassigned_chunks(&self) -> Result<usize, JobError> {
        jobs::process_unassigned_chunks(self.store.as_ref(), &self.pool, &self.config).await
    }

    pub async fn verify_unverified_chunks(&self) -> Result<ReconcileSummary, JobError> {
        jobs::verify_unverified_chunks(
            self.store.as_ref(),
            &self.verifier,
            &self.guard,
            &self.config,
        )
        .await
    }

    pub async fn confirm_complete_chunks(&self) -> Result<ReconcileSummary, JobError> {
        jobs::confirm_complete_chunks(self.store.as_ref(), &self.verifier, &self.guard).await
    }
}
