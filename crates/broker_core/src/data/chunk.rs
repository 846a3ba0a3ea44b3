use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of a chunk record.
///
/// The persisted codes are kept stable: `Pending = 1` through `Confirmed = 5`, and
/// `Error = -1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkStatus {
    /// Not yet eligible for ledger work.
    Pending,
    /// Eligible and waiting to be dispatched to a worker channel.
    Unassigned,
    /// Dispatched, awaiting reconciliation against the ledger.
    Unverified,
    /// Reconciled: the ledger holds a transaction carrying the chunk's message.
    Complete,
    /// Reconciled including trunk and branch references.
    Confirmed,
    /// Failed reconciliation or ledger work, eligible for retry.
    Error,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("Invalid chunk status code {0}")]
    InvalidStatusCode(i64),

    #[error("Chunk {chunk_idx} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        chunk_idx: u64,
        from: ChunkStatus,
        to: ChunkStatus,
    },
}

impl ChunkStatus {
    pub fn code(self) -> i64 {
        match self {
            ChunkStatus::Pending => 1,
            ChunkStatus::Unassigned => 2,
            ChunkStatus::Unverified => 3,
            ChunkStatus::Complete => 4,
            ChunkStatus::Confirmed => 5,
            ChunkStatus::Error => -1,
        }
    }

    /// Statuses picked up by the dispatcher.
    pub fn is_retryable(self) -> bool {
        matches!(self, ChunkStatus::Unassigned | ChunkStatus::Error)
    }

    /// Whether a record may move from `self` to `next`.
    ///
    /// Statuses only move forward, with two exceptions: `Unverified -> Error` when
    /// reconciliation fails and `Error -> Unassigned` (or straight to `Unverified`
    /// when the retry is dispatched in the same step).
    pub fn can_transition_to(self, next: ChunkStatus) -> bool {
        use ChunkStatus::*;

        match (self, next) {
            (a, b) if a == b => true,
            (Unverified, Error) => true,
            (Error, Unassigned) | (Error, Unverified) => true,
            (Error, _) | (_, Error) => false,
            (a, b) => b.code() > a.code(),
        }
    }
}

impl TryFrom<i64> for ChunkStatus {
    type Error = ChunkError;

    fn try_from(value: i64) -> Result<Self, ChunkError> {
        match value {
            1 => Ok(ChunkStatus::Pending),
            2 => Ok(ChunkStatus::Unassigned),
            3 => Ok(ChunkStatus::Unverified),
            4 => Ok(ChunkStatus::Complete),
            5 => Ok(ChunkStatus::Confirmed),
            -1 => Ok(ChunkStatus::Error),
            _ => Err(ChunkError::InvalidStatusCode(value)),
        }
    }
}

/// One content-addressed slice of an uploaded file.
///
/// `(genesis_hash, chunk_idx)` identifies the record. `hash`, `obfuscated_hash` and
/// `address` are fixed when the record is created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: ChunkStatus,
    pub node_id: String,
    pub node_type: String,
    /// Tryte payload attached to the chunk's transaction, empty unless the chunk
    /// carries treasure or verification content.
    pub message: String,
    pub trunk_tx: String,
    pub branch_tx: String,
    pub genesis_hash: String,
    pub chunk_idx: u64,
    /// Plaintext hash at this position of the chain.
    pub hash: String,
    pub obfuscated_hash: String,
    /// Ledger address derived from `obfuscated_hash`.
    pub address: String,
    /// Number of times reconciliation demoted this chunk to `Error`.
    pub retries: u32,
}

impl Chunk {
    pub fn new(
        genesis_hash: &str,
        chunk_idx: u64,
        hash: String,
        obfuscated_hash: String,
        address: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            status: ChunkStatus::Pending,
            node_id: String::new(),
            node_type: String::new(),
            message: String::new(),
            trunk_tx: String::new(),
            branch_tx: String::new(),
            genesis_hash: genesis_hash.to_owned(),
            chunk_idx,
            hash,
            obfuscated_hash,
            address,
            retries: 0,
        }
    }

    /// Moves the chunk to `next`, rejecting transitions the lifecycle does not allow.
    pub fn set_status(&mut self, next: ChunkStatus) -> Result<(), ChunkError> {
        if !self.status.can_transition_to(next) {
            return Err(ChunkError::InvalidTransition {
                chunk_idx: self.chunk_idx,
                from: self.status,
                to: next,
            });
        }
        if next == ChunkStatus::Error && self.status != ChunkStatus::Error {
            self.retries += 1;
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn key(&self) -> (&str, u64) {
        (&self.genesis_hash, self.chunk_idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk() -> Chunk {
        Chunk::new("G", 0, "h".into(), "o".into(), "A".into())
    }

    #[test]
    fn test_status_codes_round_trip() {
        for status in [
            ChunkStatus::Pending,
            ChunkStatus::Unassigned,
            ChunkStatus::Unverified,
            ChunkStatus::Complete,
            ChunkStatus::Confirmed,
            ChunkStatus::Error,
        ] {
            assert_eq!(ChunkStatus::try_from(status.code()), Ok(status));
        }
        assert_eq!(
            ChunkStatus::try_from(0),
            Err(ChunkError::InvalidStatusCode(0))
        );
    }

    #[test]
    fn test_forward_transitions() {
        let mut c = chunk();
        c.set_status(ChunkStatus::Unassigned).unwrap();
        c.set_status(ChunkStatus::Unverified).unwrap();
        c.set_status(ChunkStatus::Complete).unwrap();
        c.set_status(ChunkStatus::Confirmed).unwrap();
        assert_eq!(c.retries, 0);
    }

    #[test]
    fn test_backward_transitions_are_rejected() {
        let mut c = chunk();
        c.set_status(ChunkStatus::Unassigned).unwrap();
        assert!(c.set_status(ChunkStatus::Pending).is_err());

        let mut c = chunk();
        c.status = ChunkStatus::Complete;
        assert!(c.set_status(ChunkStatus::Error).is_err());
        assert!(c.set_status(ChunkStatus::Unverified).is_err());
        assert_eq!(c.status, ChunkStatus::Complete);
    }

    #[test]
    fn test_error_retry_cycle_counts_demotions() {
        let mut c = chunk();
        c.status = ChunkStatus::Unverified;
        c.set_status(ChunkStatus::Error).unwrap();
        assert_eq!(c.retries, 1);

        // Re-applying Error does not count twice.
        c.set_status(ChunkStatus::Error).unwrap();
        assert_eq!(c.retries, 1);

        c.set_status(ChunkStatus::Unassigned).unwrap();
        c.set_status(ChunkStatus::Unverified).unwrap();
        c.set_status(ChunkStatus::Error).unwrap();
        assert_eq!(c.retries, 2);
        assert!(c.set_status(ChunkStatus::Complete).is_err());
    }
}
