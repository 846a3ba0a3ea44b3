//! Core data model and derivations for the broker node.
//!
//! - [`address`] derives each chunk's hash, obfuscated hash and ledger address.
//! - [`treasure`] builds encrypted side-chain payloads that are buried in chunk messages.
//! - [`data`] holds the chunk, session and worker-channel records.
//! - [`trytes`] converts between bytes, integers and the ledger's tryte alphabet.

pub mod address;
pub mod constants;
pub mod data;
pub mod hashes;
pub mod treasure;
pub mod trytes;

pub use address::{build_chunks, build_chunks_with_count, total_chunk_count, ChainError};
pub use treasure::{create_treasure_payload, TreasureError};
