//! Reconciliation of chunk records against the ledger.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use broker_core::data::{Chunk, ChunkStatus};
use broker_tangle::{Ledger, LedgerError, Transaction};
use thiserror::Error;
use tracing::debug;

use crate::report::ErrorReporter;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Chunks split by what the ledger holds at their addresses.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilteredChunks {
    pub matches_tangle: Vec<Chunk>,
    pub does_not_match_tangle: Vec<Chunk>,
    pub not_attached: Vec<Chunk>,
}

/// Whether `tx` carries `chunk`.
///
/// The message is matched by containment since the signature fragment is padded past
/// the payload. Trunk and branch are compared the same way when requested.
pub fn chunks_match(tx: &Transaction, chunk: &Chunk, check_trunk_and_branch: bool) -> bool {
    if !tx.signature_message_fragment.contains(&chunk.message) {
        return false;
    }
    !check_trunk_and_branch
        || (tx.trunk_transaction.contains(&chunk.trunk_tx)
            && tx.branch_transaction.contains(&chunk.branch_tx))
}

pub struct TangleVerifier {
    ledger: Arc<dyn Ledger>,
    reporter: Arc<dyn ErrorReporter>,
}

impl TangleVerifier {
    pub fn new(ledger: Arc<dyn Ledger>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { ledger, reporter }
    }

    pub async fn verify_chunk_messages_match_record(
        &self,
        chunks: Vec<Chunk>,
    ) -> Result<FilteredChunks, VerifyError> {
        self.verify_chunks_match_record(chunks, false).await
    }

    /// Classifies `chunks` against the transactions found at their addresses.
    ///
    /// Chunks already in `Error` are not looked up and count as not attached. A failed
    /// ledger call is reported and returned; nothing is classified in that case.
    pub async fn verify_chunks_match_record(
        &self,
        chunks: Vec<Chunk>,
        check_trunk_and_branch: bool,
    ) -> Result<FilteredChunks, VerifyError> {
        let mut filtered = FilteredChunks::default();

        let (failed, pending): (Vec<Chunk>, Vec<Chunk>) = chunks
            .into_iter()
            .partition(|chunk| chunk.status == ChunkStatus::Error);
        filtered.not_attached.extend(failed);
        if pending.is_empty() {
            return Ok(filtered);
        }

        let addresses: Vec<String> = {
            let mut seen = HashSet::new();
            pending
                .iter()
                .filter(|chunk| seen.insert(chunk.address.as_str()))
                .map(|chunk| chunk.address.clone())
                .collect()
        };

        let hashes = self
            .ledger
            .find_transactions(&addresses)
            .await
            .map_err(|e| self.reported("find transactions", e))?;
        if hashes.is_empty() {
            debug!("No transactions found for {} addresses", addresses.len());
            filtered.not_attached.extend(pending);
            return Ok(filtered);
        }

        let transactions = self
            .ledger
            .get_trytes(&hashes)
            .await
            .map_err(|e| self.reported("get trytes", e))?;

        let mut by_address: HashMap<&str, Vec<&Transaction>> = HashMap::new();
        for tx in &transactions {
            by_address.entry(tx.address.as_str()).or_default().push(tx);
        }

        for chunk in pending {
            match by_address.get(chunk.address.as_str()) {
                None => filtered.not_attached.push(chunk),
                Some(txs) => {
                    if txs
                        .iter()
                        .any(|tx| chunks_match(tx, &chunk, check_trunk_and_branch))
                    {
                        filtered.matches_tangle.push(chunk);
                    } else {
                        filtered.does_not_match_tangle.push(chunk);
                    }
                }
            }
        }
        Ok(filtered)
    }

    fn reported(&self, context: &str, err: LedgerError) -> VerifyError {
        let err = VerifyError::from(err);
        self.reporter.capture(context, &err);
        err
    }
}

#[cfg(test)]
mod tests {
    use broker_core::build_chunks_with_count;
    use broker_core::constants::{BROKER_SEED, HASH_LENGTH};
    use broker_tangle::mock::MockLedger;
    use broker_tangle::{prepare_transfers, Transfer};

    use super::*;
    use crate::report::testing::RecordingReporter;

    fn attached(chunk: &Chunk, message: &str) -> Transaction {
        let mut tx = prepare_transfers(
            BROKER_SEED,
            &[Transfer {
                address: chunk.address.clone(),
                value: 0,
                message: message.to_string(),
                tag: "OYSTERBROKER".to_string(),
            }],
            1_500_000_000,
        )
        .unwrap()
        .remove(0);
        tx.trunk_transaction = "T".repeat(HASH_LENGTH);
        tx.branch_transaction = "B".repeat(HASH_LENGTH);
        tx
    }

    fn chunks(count: u64) -> Vec<Chunk> {
        let mut chunks = build_chunks_with_count("G", count).unwrap();
        for chunk in chunks.iter_mut() {
            chunk.status = ChunkStatus::Unverified;
            chunk.message = "TREASURE".to_string();
        }
        chunks
    }

    fn indices(chunks: &[Chunk]) -> Vec<u64> {
        chunks.iter().map(|c| c.chunk_idx).collect()
    }

    fn verifier(ledger: &MockLedger) -> (TangleVerifier, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::default());
        (
            TangleVerifier::new(Arc::new(ledger.clone()), reporter.clone()),
            reporter,
        )
    }

    #[tokio::test]
    async fn test_classifies_matched_mismatched_and_not_attached() {
        let ledger = MockLedger::new();
        let chunks = chunks(4);
        ledger.insert_transaction(attached(&chunks[0], "TREASURE")).unwrap();
        ledger.insert_transaction(attached(&chunks[1], "SOMETHINGELSE")).unwrap();
        // Padding around the payload still matches.
        ledger
            .insert_transaction(attached(&chunks[2], "99TREASURE99"))
            .unwrap();

        let (verifier, reporter) = verifier(&ledger);
        let filtered = verifier
            .verify_chunk_messages_match_record(chunks)
            .await
            .unwrap();

        assert_eq!(indices(&filtered.matches_tangle), vec![0, 2]);
        assert_eq!(indices(&filtered.does_not_match_tangle), vec![1]);
        assert_eq!(indices(&filtered.not_attached), vec![3]);
        assert!(reporter.contexts().is_empty());
    }

    #[tokio::test]
    async fn test_error_chunks_are_not_queried() {
        let ledger = MockLedger::new();
        let mut chunks = chunks(3);
        chunks[1].status = ChunkStatus::Error;
        for chunk in &chunks {
            ledger.insert_transaction(attached(chunk, "TREASURE")).unwrap();
        }

        let (verifier, _) = verifier(&ledger);
        let filtered = verifier
            .verify_chunk_messages_match_record(chunks.clone())
            .await
            .unwrap();

        assert_eq!(indices(&filtered.matches_tangle), vec![0, 2]);
        assert_eq!(indices(&filtered.not_attached), vec![1]);
        let queried = ledger.queried_addresses();
        assert_eq!(queried.len(), 2);
        assert!(!queried.contains(&chunks[1].address));
    }

    #[tokio::test]
    async fn test_empty_ledger_means_nothing_attached() {
        let ledger = MockLedger::new();
        let (verifier, _) = verifier(&ledger);
        let filtered = verifier
            .verify_chunk_messages_match_record(chunks(3))
            .await
            .unwrap();
        assert_eq!(indices(&filtered.not_attached), vec![0, 1, 2]);
        assert!(filtered.matches_tangle.is_empty());
    }

    #[tokio::test]
    async fn test_trunk_and_branch_checking() {
        let ledger = MockLedger::new();
        let mut chunks = chunks(2);
        for chunk in chunks.iter_mut() {
            ledger.insert_transaction(attached(chunk, "TREASURE")).unwrap();
            chunk.trunk_tx = "T".repeat(HASH_LENGTH);
            chunk.branch_tx = "B".repeat(HASH_LENGTH);
        }
        chunks[1].branch_tx = "C".repeat(HASH_LENGTH);

        let (verifier, _) = verifier(&ledger);
        let loose = verifier
            .verify_chunks_match_record(chunks.clone(), false)
            .await
            .unwrap();
        assert_eq!(indices(&loose.matches_tangle), vec![0, 1]);

        let strict = verifier
            .verify_chunks_match_record(chunks, true)
            .await
            .unwrap();
        assert_eq!(indices(&strict.matches_tangle), vec![0]);
        assert_eq!(indices(&strict.does_not_match_tangle), vec![1]);
    }

    #[tokio::test]
    async fn test_ledger_failure_is_reported_and_returned() {
        let ledger = MockLedger::new();
        ledger.fail_find(true);
        let (verifier, reporter) = verifier(&ledger);

        let result = verifier.verify_chunk_messages_match_record(chunks(2)).await;
        assert!(matches!(result, Err(VerifyError::Ledger(_))));
        assert_eq!(reporter.contexts(), vec!["find transactions"]);
    }
}
