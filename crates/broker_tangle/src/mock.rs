//! In-process ledger, mostly for testing purposes

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use broker_core::constants::HASH_LENGTH;

use crate::api::{Ledger, LedgerError, TransactionsToApprove};
use crate::transaction::Transaction;

#[derive(Default)]
struct State {
    /// Transactions by hash.
    transactions: BTreeMap<String, Transaction>,
    queried_addresses: Vec<String>,
    broadcasts: usize,
    fail_tips: bool,
    fail_find: bool,
    fail_broadcast: bool,
}

/// Ledger that keeps broadcast transactions in memory.
#[derive(Clone, Default)]
pub struct MockLedger {
    state: Arc<Mutex<State>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stores a transaction as if it had been attached by someone else.
    pub fn insert_transaction(&self, tx: Transaction) -> Result<String, LedgerError> {
        let hash = tx.hash()?;
        self.state().transactions.insert(hash.clone(), tx);
        Ok(hash)
    }

    /// Drops every transaction at `address`, as if it never reached the ledger.
    pub fn remove_address(&self, address: &str) {
        self.state()
            .transactions
            .retain(|_, tx| tx.address != address);
    }

    pub fn transactions_at(&self, address: &str) -> Vec<Transaction> {
        self.state()
            .transactions
            .values()
            .filter(|tx| tx.address == address)
            .cloned()
            .collect()
    }

    pub fn transaction_count(&self) -> usize {
        self.state().transactions.len()
    }

    /// Number of successful `broadcast_transactions` calls.
    pub fn broadcast_count(&self) -> usize {
        self.state().broadcasts
    }

    /// Every address passed to `find_transactions`, in call order.
    pub fn queried_addresses(&self) -> Vec<String> {
        self.state().queried_addresses.clone()
    }

    pub fn fail_tips(&self, fail: bool) {
        self.state().fail_tips = fail;
    }

    pub fn fail_find(&self, fail: bool) {
        self.state().fail_find = fail;
    }

    pub fn fail_broadcast(&self, fail: bool) {
        self.state().fail_broadcast = fail;
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn get_transactions_to_approve(
        &self,
        _depth: u64,
    ) -> Result<TransactionsToApprove, LedgerError> {
        if self.state().fail_tips {
            return Err(LedgerError::Unavailable("tip selection failed".into()));
        }
        Ok(TransactionsToApprove {
            trunk_transaction: "T".repeat(HASH_LENGTH),
            branch_transaction: "B".repeat(HASH_LENGTH),
        })
    }

    async fn find_transactions(&self, addresses: &[String]) -> Result<Vec<String>, LedgerError> {
        let mut state = self.state();
        if state.fail_find {
            return Err(LedgerError::Unavailable("findTransactions failed".into()));
        }
        state.queried_addresses.extend(addresses.iter().cloned());
        Ok(state
            .transactions
            .iter()
            .filter(|(_, tx)| addresses.contains(&tx.address))
            .map(|(hash, _)| hash.clone())
            .collect())
    }

    async fn get_trytes(&self, hashes: &[String]) -> Result<Vec<Transaction>, LedgerError> {
        let state = self.state();
        Ok(hashes
            .iter()
            .filter_map(|hash| state.transactions.get(hash).cloned())
            .collect())
    }

    async fn broadcast_transactions(
        &self,
        transactions: &[Transaction],
    ) -> Result<(), LedgerError> {
        let hashes = transactions
            .iter()
            .map(Transaction::hash)
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = self.state();
        if state.fail_broadcast {
            return Err(LedgerError::Unavailable("broadcast failed".into()));
        }
        for (hash, tx) in hashes.into_iter().zip(transactions) {
            state.transactions.insert(hash, tx.clone());
        }
        state.broadcasts += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use broker_core::constants::BROKER_SEED;

    use super::*;
    use crate::transaction::{prepare_transfers, Transfer};

    fn bundle() -> Vec<Transaction> {
        let transfers: Vec<Transfer> = ['A', 'B']
            .iter()
            .map(|c| Transfer {
                address: c.to_string().repeat(81),
                value: 0,
                message: "MSG".to_string(),
                tag: "OYSTERBROKER".to_string(),
            })
            .collect();
        prepare_transfers(BROKER_SEED, &transfers, 1_500_000_000).unwrap()
    }

    #[tokio::test]
    async fn test_broadcast_transactions_become_findable() {
        let ledger = MockLedger::new();
        ledger.broadcast_transactions(&bundle()).await.unwrap();
        assert_eq!(ledger.broadcast_count(), 1);

        let a = "A".repeat(81);
        let hashes = ledger.find_transactions(&[a.clone()]).await.unwrap();
        assert_eq!(hashes.len(), 1);
        let txs = ledger.get_trytes(&hashes).await.unwrap();
        assert_eq!(txs[0].address, a);
        assert_eq!(ledger.queried_addresses(), vec![a.clone()]);

        ledger.remove_address(&a);
        assert!(ledger.find_transactions(&[a]).await.unwrap().is_empty());
        assert_eq!(ledger.transaction_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_toggles() {
        let ledger = MockLedger::new();
        ledger.fail_tips(true);
        ledger.fail_find(true);
        ledger.fail_broadcast(true);
        assert!(ledger.get_transactions_to_approve(3).await.is_err());
        assert!(ledger.find_transactions(&[]).await.is_err());
        assert!(ledger.broadcast_transactions(&bundle()).await.is_err());
        assert_eq!(ledger.transaction_count(), 0);
    }
}
