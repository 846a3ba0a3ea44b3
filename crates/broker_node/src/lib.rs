//! Broker node: attaches uploaded file chunks to the ledger and reconciles them.
//!
//! Chunks move `Pending -> Unassigned -> Unverified -> Complete -> Confirmed`, with
//! `Error` as the retry state. [`jobs`] drive those transitions, [`pool`] runs the
//! proof of work and broadcast, and [`verify`] classifies chunks against the ledger.

pub mod broker;
pub mod config;
pub mod jobs;
pub mod node;
pub mod pool;
pub mod report;
pub mod scheduler;
#[cfg(test)]
mod testing;
pub mod throughput;
pub mod verify;

pub use broker::Broker;
pub use config::{BrokerConfig, IriConfig, JobsConfig, NodeConfig, PoolConfig};
pub use node::{run, run_node};
pub use pool::{PoolError, PowJob, WorkerPool};
pub use report::{ErrorReporter, TracingReporter};
pub use throughput::ThroughputWindow;
pub use verify::{FilteredChunks, TangleVerifier, VerifyError};
