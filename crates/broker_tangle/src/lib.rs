//! Ledger-facing pieces of the broker: the transaction model, proof of work and the
//! [`Ledger`] client seam.

pub mod api;
pub mod iri;
pub mod mock;
pub mod pow;
pub mod sponge;
pub mod transaction;

pub use api::{Ledger, LedgerError, TransactionsToApprove};
pub use pow::{Blake3Pow, PowError, ProofOfWork};
pub use transaction::{prepare_transfers, Transaction, TransactionError, Transfer};
