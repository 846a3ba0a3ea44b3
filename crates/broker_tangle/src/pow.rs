//! Attachment proof of work.

use broker_core::trytes::{expect_trytes, int_to_trytes, TryteError};
use thiserror::Error;
use tracing::debug;

use crate::sponge::{trailing_zero_trits, Sponge};
use crate::transaction::{NONCE_LENGTH, TRANSACTION_LENGTH};

#[derive(Debug, Error)]
pub enum PowError {
    #[error("Invalid transaction trytes: {0}")]
    InvalidTrytes(#[from] TryteError),

    #[error("No nonce reached weight {min_weight_magnitude} within {iterations} attempts")]
    Exhausted {
        min_weight_magnitude: usize,
        iterations: u64,
    },

    #[error("Proof of work failed: {0}")]
    Failed(String),
}

/// A nonce search over serialised transaction trytes.
///
/// Implementations are CPU bound and are expected to be called from a blocking
/// context.
pub trait ProofOfWork: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns a 27-tryte nonce that gives `trytes` a hash ending in at least
    /// `min_weight_magnitude` zero trits. The nonce field of `trytes` is ignored.
    fn search(&self, trytes: &str, min_weight_magnitude: usize) -> Result<String, PowError>;
}

/// Sequential nonce search over the blake3 sponge.
#[derive(Clone, Debug)]
pub struct Blake3Pow {
    max_iterations: u64,
}

impl Blake3Pow {
    pub fn new() -> Self {
        Self {
            max_iterations: u64::MAX,
        }
    }

    /// Gives up after `max_iterations` candidate nonces.
    pub fn with_max_iterations(max_iterations: u64) -> Self {
        Self { max_iterations }
    }
}

impl Default for Blake3Pow {
    fn default() -> Self {
        Self::new()
    }
}

impl ProofOfWork for Blake3Pow {
    fn name(&self) -> &'static str {
        "blake3"
    }

    fn search(&self, trytes: &str, min_weight_magnitude: usize) -> Result<String, PowError> {
        expect_trytes(trytes, TRANSACTION_LENGTH)?;

        let mut prefix = Sponge::new();
        prefix.absorb(&trytes[..TRANSACTION_LENGTH - NONCE_LENGTH]);

        for counter in 0..self.max_iterations {
            let nonce = int_to_trytes(counter as i64, NONCE_LENGTH)?;
            let mut sponge = prefix.clone();
            sponge.absorb(&nonce);
            if trailing_zero_trits(&sponge.squeeze()) >= min_weight_magnitude {
                debug!("Found nonce after {} attempts", counter + 1);
                return Ok(nonce);
            }
        }

        Err(PowError::Exhausted {
            min_weight_magnitude,
            iterations: self.max_iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use broker_core::constants::BROKER_SEED;

    use super::*;
    use crate::transaction::{prepare_transfers, Transfer};

    fn unattached_trytes() -> (crate::transaction::Transaction, String) {
        let tx = prepare_transfers(
            BROKER_SEED,
            &[Transfer {
                address: "A".repeat(81),
                value: 0,
                message: "POW".to_string(),
                tag: "OYSTERBROKER".to_string(),
            }],
            1_500_000_000,
        )
        .unwrap()
        .remove(0);
        let trytes = tx.trytes().unwrap();
        (tx, trytes)
    }

    #[test]
    fn test_found_nonce_meets_min_weight() {
        let (mut tx, trytes) = unattached_trytes();
        let pow = Blake3Pow::new();
        let nonce = pow.search(&trytes, 6).unwrap();
        assert_eq!(nonce.len(), NONCE_LENGTH);

        tx.nonce = nonce;
        assert!(tx.has_min_weight(6).unwrap());
    }

    #[test]
    fn test_search_gives_up_after_max_iterations() {
        let (_, trytes) = unattached_trytes();
        let pow = Blake3Pow::with_max_iterations(1);
        assert!(matches!(
            pow.search(&trytes, 200),
            Err(PowError::Exhausted { iterations: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_malformed_trytes() {
        assert!(matches!(
            Blake3Pow::new().search("ABC", 1),
            Err(PowError::InvalidTrytes(_))
        ));
    }
}
