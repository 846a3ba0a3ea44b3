//! Proof-of-work worker pool.
//!
//! The pool owns a fixed set of worker channels, created once at startup. Each channel
//! is a task reading jobs from its own unbounded queue and processing them one at a
//! time. Channels run concurrently, but the nonce search itself is serialised across
//! the whole pool by a single lock, so only ledger I/O overlaps between channels.
//!
//! A job attaches its chunks as one bundle: the last transaction approves the two
//! tips returned by the ledger and every earlier transaction uses the next one's hash
//! as its trunk. The finished bundle is broadcast from a detached task so that a slow
//! broadcast never holds up the channel's next job. A broadcast that fails is only
//! reported; the chunks stay `Unverified` and reconciliation later finds them missing.
//! The same holds for the trunk and branch write that follows the broadcast.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::available_parallelism;
use std::time::Instant;

use broker_core::data::{Chunk, ChunkChannel, ChunkError, ChunkStatus};
use broker_storage::{ChannelStore, ChunkStore, StorageError, Store};
use broker_tangle::transaction::MAX_TIMESTAMP_VALUE;
use broker_tangle::{
    prepare_transfers, Ledger, LedgerError, PowError, ProofOfWork, Transaction, TransactionError,
    TransactionsToApprove, Transfer,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;
use crate::report::ErrorReporter;
use crate::throughput::ThroughputWindow;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Proof of work error: {0}")]
    Pow(#[from] PowError),

    #[error("Chunk error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("Proof of work task failed: {0}")]
    PowTask(String),

    #[error("Unknown worker channel {0}")]
    UnknownChannel(String),

    #[error("Worker channel {0} is closed")]
    ChannelClosed(String),

    #[error("Job has no chunks")]
    EmptyJob,
}

/// A batch of chunks to attach as one bundle. Every job is broadcast to the pool's
/// ledger.
#[derive(Clone, Debug)]
pub struct PowJob {
    pub chunks: Vec<Chunk>,
}

impl PowJob {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }
}

/// Result of a processed job.
#[derive(Debug)]
pub struct BatchOutcome {
    /// The attached bundle, in index order.
    pub transactions: Vec<Transaction>,
    /// Detached broadcast of the bundle.
    pub broadcast: JoinHandle<()>,
}

struct PowChannel {
    sender: mpsc::UnboundedSender<PowJob>,
    throughput: Arc<Mutex<ThroughputWindow>>,
}

/// Number of worker channels: the configured count, or one less than the number of
/// CPUs. Never less than one.
pub fn pow_procs(configured: Option<usize>) -> usize {
    configured
        .unwrap_or_else(|| {
            available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .saturating_sub(1)
        })
        .max(1)
}

pub fn channel_id(index: usize) -> String {
    format!("channel-{index}")
}

/// Everything a worker needs to process a job.
struct WorkerContext {
    config: PoolConfig,
    store: Arc<dyn Store>,
    ledger: Arc<dyn Ledger>,
    pow: Arc<dyn ProofOfWork>,
    /// Held for the duration of every nonce search.
    pow_lock: Mutex<()>,
    reporter: Arc<dyn ErrorReporter>,
}

impl WorkerContext {
    fn reported(&self, context: &str, err: impl Into<PoolError>) -> PoolError {
        let err = err.into();
        self.reporter.capture(context, &err);
        err
    }

    async fn process_job(
        &self,
        channel_id: &str,
        throughput: &Mutex<ThroughputWindow>,
        job: PowJob,
    ) -> Result<BatchOutcome, PoolError> {
        let start = Instant::now();
        let mut chunks = job.chunks;
        if chunks.is_empty() {
            return Err(PoolError::EmptyJob);
        }
        debug!(channel_id, "Processing {} chunks", chunks.len());

        mark_unverified(&mut chunks)?;
        self.store
            .update_chunks(&chunks)
            .await
            .map_err(|e| self.reported("persist unverified chunks", e))?;

        let transfers: Vec<Transfer> = chunks
            .iter()
            .map(|chunk| Transfer {
                address: chunk.address.clone(),
                value: 0,
                message: chunk.message.clone(),
                tag: self.config.tag.clone(),
            })
            .collect();
        let mut transactions =
            prepare_transfers(&self.config.seed, &transfers, Utc::now().timestamp())
                .map_err(|e| self.reported("prepare transfers", e))?;

        let tips = self
            .ledger
            .get_transactions_to_approve(self.config.min_depth)
            .await
            .map_err(|e| self.reported("get transactions to approve", e))?;

        self.attach(&mut transactions, &tips).await?;

        let broadcast = self.spawn_broadcast(channel_id, transactions.clone());

        for (chunk, tx) in chunks.iter_mut().zip(&transactions) {
            chunk.trunk_tx = tx.trunk_transaction.clone();
            chunk.branch_tx = tx.branch_transaction.clone();
            chunk.updated_at = Utc::now();
        }
        if let Err(err) = self.store.update_chunks(&chunks).await {
            self.reporter.capture("persist trunk and branch", &err);
        }
        if let Err(err) = self
            .store
            .add_chunks_processed(channel_id, chunks.len() as u64)
            .await
        {
            self.reporter.capture("update channel counter", &err);
        }

        let elapsed = start.elapsed();
        throughput.lock().await.record(chunks.len(), elapsed);
        info!(
            channel_id,
            "Attached {} chunks in {:?}",
            chunks.len(),
            elapsed
        );

        Ok(BatchOutcome {
            transactions,
            broadcast,
        })
    }

    /// Links the bundle from last to first and computes every nonce.
    async fn attach(
        &self,
        transactions: &mut [Transaction],
        tips: &TransactionsToApprove,
    ) -> Result<(), PoolError> {
        let mut prev: Option<String> = None;
        for tx in transactions.iter_mut().rev() {
            match &prev {
                None => {
                    tx.trunk_transaction = tips.trunk_transaction.clone();
                    tx.branch_transaction = tips.branch_transaction.clone();
                }
                Some(hash) => {
                    tx.trunk_transaction = hash.clone();
                    tx.branch_transaction = tips.trunk_transaction.clone();
                }
            }
            tx.attachment_timestamp = Utc::now().timestamp_millis();
            tx.attachment_timestamp_lower_bound = 0;
            tx.attachment_timestamp_upper_bound = MAX_TIMESTAMP_VALUE;

            let trytes = tx.trytes()?;
            tx.nonce = self
                .search_nonce(trytes)
                .await
                .map_err(|e| self.reported("proof of work", e))?;
            prev = Some(tx.hash()?);
        }
        Ok(())
    }

    async fn search_nonce(&self, trytes: String) -> Result<String, PoolError> {
        let _guard = self.pow_lock.lock().await;
        let pow = Arc::clone(&self.pow);
        let min_weight_magnitude = self.config.min_weight_magnitude;
        let nonce = tokio::task::spawn_blocking(move || pow.search(&trytes, min_weight_magnitude))
            .await
            .map_err(|e| PoolError::PowTask(e.to_string()))??;
        Ok(nonce)
    }

    fn spawn_broadcast(&self, channel_id: &str, transactions: Vec<Transaction>) -> JoinHandle<()> {
        let ledger = Arc::clone(&self.ledger);
        let reporter = Arc::clone(&self.reporter);
        let channel_id = channel_id.to_owned();
        tokio::spawn(async move {
            match ledger.broadcast_transactions(&transactions).await {
                Ok(()) => info!(
                    channel_id = %channel_id,
                    "Broadcast {} transactions",
                    transactions.len()
                ),
                Err(err) => reporter.capture("broadcast transactions", &err),
            }
        })
    }
}

fn mark_unverified(chunks: &mut [Chunk]) -> Result<(), ChunkError> {
    for chunk in chunks.iter_mut() {
        chunk.set_status(ChunkStatus::Unverified)?;
    }
    Ok(())
}

async fn run_worker(
    ctx: Arc<WorkerContext>,
    channel_id: String,
    throughput: Arc<Mutex<ThroughputWindow>>,
    mut jobs: mpsc::UnboundedReceiver<PowJob>,
) {
    info!(channel_id = %channel_id, "PoW worker started with {}", ctx.pow.name());
    while let Some(job) = jobs.recv().await {
        if let Err(err) = ctx.process_job(&channel_id, &throughput, job).await {
            warn!(channel_id = %channel_id, "Batch failed: {err}");
        }
    }
    info!(channel_id = %channel_id, "PoW worker stopped");
}

/// Fixed set of worker channels sharing one proof-of-work resource.
pub struct WorkerPool {
    ctx: Arc<WorkerContext>,
    channels: RwLock<BTreeMap<String, PowChannel>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Creates the channels, persists their records and starts one worker per channel.
    pub async fn start(
        config: PoolConfig,
        store: Arc<dyn Store>,
        ledger: Arc<dyn Ledger>,
        pow: Arc<dyn ProofOfWork>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self, PoolError> {
        let count = pow_procs(config.procs);
        let ctx = Arc::new(WorkerContext {
            config,
            store,
            ledger,
            pow,
            pow_lock: Mutex::new(()),
            reporter,
        });

        let mut channels = BTreeMap::new();
        let mut workers = Vec::with_capacity(count);
        for i in 0..count {
            let id = channel_id(i);
            let record = ctx
                .store
                .get_channel(&id)
                .await?
                .unwrap_or_else(|| ChunkChannel::new(id.clone()));
            ctx.store.upsert_channel(&record).await?;

            let (sender, receiver) = mpsc::unbounded_channel();
            let throughput = Arc::new(Mutex::new(ThroughputWindow::new()));
            workers.push(tokio::spawn(run_worker(
                Arc::clone(&ctx),
                id.clone(),
                Arc::clone(&throughput),
                receiver,
            )));
            channels.insert(id, PowChannel { sender, throughput });
        }
        info!("Started {count} PoW worker channels");

        Ok(Self {
            ctx,
            channels: RwLock::new(channels),
            workers: Mutex::new(workers),
        })
    }

    pub async fn channel_ids(&self) -> Vec<String> {
        self.channels.read().await.keys().cloned().collect()
    }

    /// Channels whose estimated ready time has passed.
    pub async fn ready_channels(&self, now: DateTime<Utc>) -> Result<Vec<String>, PoolError> {
        let channels = self.channels.read().await;
        let records = self.ctx.store.list_channels().await?;
        Ok(records
            .into_iter()
            .filter(|record| channels.contains_key(&record.channel_id) && record.is_ready(now))
            .map(|record| record.channel_id)
            .collect())
    }

    /// Snapshot of a channel's throughput history.
    pub async fn throughput(&self, channel_id: &str) -> Option<ThroughputWindow> {
        let channels = self.channels.read().await;
        let channel = channels.get(channel_id)?;
        let window = channel.throughput.lock().await.clone();
        Some(window)
    }

    /// Marks `chunks` `Unverified`, pushes the channel's estimated ready time out by
    /// the expected processing time and queues the batch on the channel.
    ///
    /// Completion is only observable through the chunk records.
    pub async fn dispatch(
        &self,
        channel_id: &str,
        mut chunks: Vec<Chunk>,
    ) -> Result<DateTime<Utc>, PoolError> {
        if chunks.is_empty() {
            return Err(PoolError::EmptyJob);
        }
        let channels = self.channels.read().await;
        let channel = channels
            .get(channel_id)
            .ok_or_else(|| PoolError::UnknownChannel(channel_id.to_owned()))?;

        mark_unverified(&mut chunks)?;
        self.ctx.store.update_chunks(&chunks).await?;

        let est_ready_time = channel.throughput.lock().await.estimate(chunks.len());
        self.ctx
            .store
            .set_est_ready_time(channel_id, est_ready_time)
            .await?;

        debug!(channel_id, "Dispatching {} chunks", chunks.len());
        channel
            .sender
            .send(PowJob::new(chunks))
            .map_err(|_| PoolError::ChannelClosed(channel_id.to_owned()))?;
        Ok(est_ready_time)
    }

    /// Runs a job on the calling task, bypassing the channel queue.
    pub async fn process_job(
        &self,
        channel_id: &str,
        job: PowJob,
    ) -> Result<BatchOutcome, PoolError> {
        let throughput = {
            let channels = self.channels.read().await;
            let channel = channels
                .get(channel_id)
                .ok_or_else(|| PoolError::UnknownChannel(channel_id.to_owned()))?;
            Arc::clone(&channel.throughput)
        };
        self.ctx.process_job(channel_id, &throughput, job).await
    }

    /// Closes every channel queue and waits for the workers to finish queued jobs.
    pub async fn shutdown(&self) {
        self.channels.write().await.clear();
        let workers: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for result in join_all(workers).await {
            if let Err(err) = result {
                error!("PoW worker panicked: {err}");
            }
        }
        info!("PoW worker pool stopped");
    }
}
