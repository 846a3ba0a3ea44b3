//! Background jobs that move chunks through their lifecycle.

use broker_core::data::{ChunkError, SessionError};
use broker_core::TreasureError;
use broker_storage::StorageError;
use thiserror::Error;

use crate::pool::PoolError;
use crate::verify::VerifyError;

pub mod paid_sessions;
pub mod reconcile;
pub mod unassigned;

pub use paid_sessions::process_paid_sessions;
pub use reconcile::{confirm_complete_chunks, verify_unverified_chunks, ReconcileGuard};
pub use unassigned::process_unassigned_chunks;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Verification error: {0}")]
    Verify(#[from] VerifyError),

    #[error("Treasure error: {0}")]
    Treasure(#[from] TreasureError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Chunk error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("Treasure chunk {1} of {0} does not exist")]
    MissingTreasureChunk(String, u64),
}
