use std::path::PathBuf;
use std::time::Duration;

use broker_core::constants::{
    BROKER_SEED, BROKER_TAG, DEFAULT_MAX_RETRIES, DEFAULT_MIN_DEPTH, DEFAULT_MIN_WEIGHT_MAGNITUDE,
    MAX_SIDE_CHAIN_LENGTH,
};

/// Ledger node connection.
#[derive(Clone, Debug)]
pub struct IriConfig {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl IriConfig {
    pub fn url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Worker pool sizing and proof-of-work difficulty.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Number of worker channels. `None` sizes the pool from the CPU count.
    pub procs: Option<usize>,
    pub min_weight_magnitude: usize,
    /// Depth passed to tip selection.
    pub min_depth: u64,
    pub seed: String,
    pub tag: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            procs: None,
            min_weight_magnitude: DEFAULT_MIN_WEIGHT_MAGNITUDE,
            min_depth: DEFAULT_MIN_DEPTH,
            seed: BROKER_SEED.to_string(),
            tag: BROKER_TAG.to_string(),
        }
    }
}

/// Chunk processing policy.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Chunks per job sent to a worker channel.
    pub batch_size: usize,
    pub max_side_chain_length: u64,
    /// Demotions to `Error` after which a chunk is no longer retried.
    pub max_retries: u32,
    /// How long an `Unverified` chunk is left alone before it is reconciled.
    pub unverified_grace: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_side_chain_length: MAX_SIDE_CHAIN_LENGTH,
            max_retries: DEFAULT_MAX_RETRIES,
            unverified_grace: Duration::from_secs(60),
        }
    }
}

/// Background job intervals.
#[derive(Clone, Debug)]
pub struct JobsConfig {
    pub process_paid_sessions: Duration,
    pub process_unassigned_chunks: Duration,
    pub verify_unverified_chunks: Duration,
    pub confirm_complete_chunks: Duration,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            process_paid_sessions: Duration::from_secs(30),
            process_unassigned_chunks: Duration::from_secs(5),
            verify_unverified_chunks: Duration::from_secs(60),
            confirm_complete_chunks: Duration::from_secs(300),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub db_file: PathBuf,
    pub iri: IriConfig,
    pub pool: PoolConfig,
    pub broker: BrokerConfig,
    pub jobs: JobsConfig,
}
