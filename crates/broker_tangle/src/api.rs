use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transaction::{Transaction, TransactionError};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Ledger node returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Malformed ledger response: {0}")]
    InvalidResponse(String),

    #[error("Invalid transaction: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Tip references a new bundle should approve.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsToApprove {
    pub trunk_transaction: String,
    pub branch_transaction: String,
}

/// The ledger node calls the broker depends on.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Selects two tips by random walk starting `depth` milestones back.
    async fn get_transactions_to_approve(
        &self,
        depth: u64,
    ) -> Result<TransactionsToApprove, LedgerError>;

    /// Hashes of all transactions at any of `addresses`.
    async fn find_transactions(&self, addresses: &[String]) -> Result<Vec<String>, LedgerError>;

    async fn get_trytes(&self, hashes: &[String]) -> Result<Vec<Transaction>, LedgerError>;

    /// Sends attached transactions to the node's neighbours.
    async fn broadcast_transactions(&self, transactions: &[Transaction])
        -> Result<(), LedgerError>;
}
