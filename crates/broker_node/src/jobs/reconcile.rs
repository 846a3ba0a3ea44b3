//! Periodic reconciliation of attached chunks against the ledger.
//!
//! `verify_unverified_chunks` settles dispatched chunks: a chunk the ledger carries
//! becomes `Complete`, any other becomes `Error` and is picked up again by dispatch
//! until it runs out of retries. `confirm_complete_chunks` then checks the recorded
//! trunk and branch of `Complete` chunks and promotes the matching ones to
//! `Confirmed`.

use std::collections::BTreeMap;
use std::sync::Arc;

use broker_core::data::{Chunk, ChunkStatus};
use broker_storage::{ChunkStore, Store};
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use tracing::{debug, info, warn};

use super::JobError;
use crate::config::BrokerConfig;
use crate::verify::TangleVerifier;

/// Files currently being reconciled.
///
/// Two passes never reconcile the same file at the same time.
#[derive(Clone, Debug, Default)]
pub struct ReconcileGuard {
    active: Arc<DashSet<String>>,
}

/// Held while a file is being reconciled. Releases the file on drop.
#[derive(Debug)]
pub struct ReconcileTicket {
    active: Arc<DashSet<String>>,
    genesis_hash: String,
}

impl ReconcileGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `genesis_hash`, or returns `None` when another pass holds it.
    pub fn try_acquire(&self, genesis_hash: &str) -> Option<ReconcileTicket> {
        if !self.active.insert(genesis_hash.to_owned()) {
            return None;
        }
        Some(ReconcileTicket {
            active: Arc::clone(&self.active),
            genesis_hash: genesis_hash.to_owned(),
        })
    }

    pub fn is_active(&self, genesis_hash: &str) -> bool {
        self.active.contains(genesis_hash)
    }
}

impl Drop for ReconcileTicket {
    fn drop(&mut self) {
        self.active.remove(&self.genesis_hash);
    }
}

/// Counts of one reconciliation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Chunks promoted.
    pub matched: usize,
    /// Chunks demoted, or left in place for a later pass.
    pub unmatched: usize,
    /// Files skipped because they were busy or the ledger could not be reached.
    pub skipped_files: usize,
}

fn group_by_file(chunks: Vec<Chunk>) -> BTreeMap<String, Vec<Chunk>> {
    let mut files: BTreeMap<String, Vec<Chunk>> = BTreeMap::new();
    for chunk in chunks {
        files.entry(chunk.genesis_hash.clone()).or_default().push(chunk);
    }
    files
}

/// Settles `Unverified` chunks that were last touched at least `unverified_grace`
/// before `now`.
pub async fn verify_unverified_chunks_at(
    store: &dyn Store,
    verifier: &TangleVerifier,
    guard: &ReconcileGuard,
    config: &BrokerConfig,
    now: DateTime<Utc>,
) -> Result<ReconcileSummary, JobError> {
    let grace = chrono::Duration::from_std(config.unverified_grace).ok();
    let due: Vec<Chunk> = store
        .get_chunks_by_status(ChunkStatus::Unverified)
        .await?
        .into_iter()
        .filter(|chunk| {
            grace
                .and_then(|grace| chunk.updated_at.checked_add_signed(grace))
                .is_some_and(|due_at| due_at <= now)
        })
        .collect();

    let mut summary = ReconcileSummary::default();
    for (genesis_hash, chunks) in group_by_file(due) {
        let Some(_ticket) = guard.try_acquire(&genesis_hash) else {
            debug!(genesis_hash = %genesis_hash, "Already being reconciled");
            summary.skipped_files += 1;
            continue;
        };

        let filtered = match verifier.verify_chunk_messages_match_record(chunks).await {
            Ok(filtered) => filtered,
            Err(err) => {
                warn!(genesis_hash = %genesis_hash, "Could not verify chunks: {err}");
                summary.skipped_files += 1;
                continue;
            }
        };

        let mut updated = Vec::new();
        for mut chunk in filtered.matches_tangle {
            chunk.set_status(ChunkStatus::Complete)?;
            updated.push(chunk);
            summary.matched += 1;
        }
        for mut chunk in filtered
            .does_not_match_tangle
            .into_iter()
            .chain(filtered.not_attached)
        {
            chunk.set_status(ChunkStatus::Error)?;
            if chunk.retries >= config.max_retries {
                warn!(
                    genesis_hash = %genesis_hash,
                    "Giving up on chunk {} after {} attempts", chunk.chunk_idx, chunk.retries
                );
            }
            updated.push(chunk);
            summary.unmatched += 1;
        }
        store.update_chunks(&updated).await?;
    }

    if summary.matched + summary.unmatched > 0 {
        info!(
            "Verified unverified chunks: {} complete, {} failed",
            summary.matched, summary.unmatched
        );
    }
    Ok(summary)
}

pub async fn verify_unverified_chunks(
    store: &dyn Store,
    verifier: &TangleVerifier,
    guard: &ReconcileGuard,
    config: &BrokerConfig,
) -> Result<ReconcileSummary, JobError> {
    verify_unverified_chunks_at(store, verifier, guard, config, Utc::now()).await
}

/// Promotes `Complete` chunks whose trunk and branch match the ledger to
/// `Confirmed`. Chunks that do not match stay `Complete`.
pub async fn confirm_complete_chunks(
    store: &dyn Store,
    verifier: &TangleVerifier,
    guard: &ReconcileGuard,
) -> Result<ReconcileSummary, JobError> {
    let complete = store.get_chunks_by_status(ChunkStatus::Complete).await?;

    let mut summary = ReconcileSummary::default();
    for (genesis_hash, chunks) in group_by_file(complete) {
        let Some(_ticket) = guard.try_acquire(&genesis_hash) else {
            summary.skipped_files += 1;
            continue;
        };

        let filtered = match verifier.verify_chunks_match_record(chunks, true).await {
            Ok(filtered) => filtered,
            Err(err) => {
                warn!(genesis_hash = %genesis_hash, "Could not confirm chunks: {err}");
                summary.skipped_files += 1;
                continue;
            }
        };

        summary.unmatched += filtered.does_not_match_tangle.len() + filtered.not_attached.len();
        let mut confirmed = filtered.matches_tangle;
        for chunk in confirmed.iter_mut() {
            chunk.set_status(ChunkStatus::Confirmed)?;
        }
        summary.matched += confirmed.len();
        store.update_chunks(&confirmed).await?;
    }

    if summary.matched > 0 {
        info!("Confirmed {} chunks", summary.matched);
    }
    Ok(summary)
}
