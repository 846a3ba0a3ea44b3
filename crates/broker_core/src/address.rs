//! Deterministic derivation of chunk hashes and ledger addresses.
//!
//! Chunk `i` of a file has plaintext hash `sha256^i(genesis_hash)`. Its obfuscated
//! hash is `sha384(hash)` and its ledger address is the tryte encoding of the
//! obfuscated digest, cut to [`ADDRESS_LENGTH`]. Every node that knows the genesis
//! hash derives the same address for the same chunk.

use sha2::{Digest, Sha384};
use thiserror::Error;
use tracing::debug;

use crate::constants::{ADDRESS_LENGTH, FILE_CHUNK_SIZE_BYTES, FILE_SECTOR_IN_CHUNKS};
use crate::data::Chunk;
use crate::hashes::{sha256_hex, HashError};
use crate::trytes::{bytes_to_trytes, pad_trytes};

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Genesis hash must not be empty")]
    EmptyGenesisHash,

    #[error("Invalid obfuscated hash: {0}")]
    InvalidHash(#[from] HashError),
}

/// Number of chunk records for a file, including one treasure chunk per sector.
pub fn total_chunk_count(file_size_bytes: u64) -> u64 {
    let file_chunks = file_size_bytes.div_ceil(FILE_CHUNK_SIZE_BYTES);
    file_chunks + file_chunks.div_ceil(FILE_SECTOR_IN_CHUNKS)
}

/// Derives the ledger address for a hex-encoded obfuscated hash.
pub fn make_address(obfuscated_hash: &str) -> Result<String, ChainError> {
    let bytes = hex::decode(obfuscated_hash).map_err(HashError::from)?;
    Ok(address_from_bytes(&bytes))
}

fn address_from_bytes(bytes: &[u8]) -> String {
    pad_trytes(&bytes_to_trytes(bytes), ADDRESS_LENGTH)
}

/// One position of a file's chunk chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainLink {
    pub chunk_idx: u64,
    pub hash: String,
    pub obfuscated_hash: String,
    pub address: String,
}

/// Iterator over the first `count` links of the chain rooted at a genesis hash.
pub struct AddressChain {
    current: String,
    next_idx: u64,
    count: u64,
}

impl AddressChain {
    pub fn new(genesis_hash: &str, count: u64) -> Result<Self, ChainError> {
        if genesis_hash.is_empty() {
            return Err(ChainError::EmptyGenesisHash);
        }
        Ok(Self {
            current: genesis_hash.to_owned(),
            next_idx: 0,
            count,
        })
    }
}

impl Iterator for AddressChain {
    type Item = ChainLink;

    fn next(&mut self) -> Option<ChainLink> {
        if self.next_idx >= self.count {
            return None;
        }

        let obfuscated = Sha384::digest(self.current.as_bytes());
        let link = ChainLink {
            chunk_idx: self.next_idx,
            hash: self.current.clone(),
            obfuscated_hash: hex::encode(obfuscated),
            address: address_from_bytes(&obfuscated),
        };

        self.current = sha256_hex(&self.current);
        self.next_idx += 1;
        Some(link)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.count - self.next_idx) as usize;
        (remaining, Some(remaining))
    }
}

/// Builds the `Pending` chunk records for a file of `file_size_bytes` bytes.
pub fn build_chunks(genesis_hash: &str, file_size_bytes: u64) -> Result<Vec<Chunk>, ChainError> {
    build_chunks_with_count(genesis_hash, total_chunk_count(file_size_bytes))
}

/// Builds exactly `count` `Pending` chunk records, indices `0..count`.
///
/// `count` must already include any chunks reserved for treasure.
pub fn build_chunks_with_count(genesis_hash: &str, count: u64) -> Result<Vec<Chunk>, ChainError> {
    debug!("Building {count} chunks for genesis hash {genesis_hash}");
    let chunks = AddressChain::new(genesis_hash, count)?
        .map(|link| {
            Chunk::new(
                genesis_hash,
                link.chunk_idx,
                link.hash,
                link.obfuscated_hash,
                link.address,
            )
        })
        .collect();
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ChunkStatus;
    use crate::hashes::sha384_hex;
    use crate::trytes::is_trytes;

    #[test]
    fn test_builds_exactly_count_pending_records() {
        let chunks = build_chunks_with_count("G", 25).unwrap();
        assert_eq!(chunks.len(), 25);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_idx, i as u64);
            assert_eq!(chunk.genesis_hash, "G");
            assert_eq!(chunk.status, ChunkStatus::Pending);
            assert!(chunk.message.is_empty());
            assert!(!chunk.obfuscated_hash.is_empty());
            assert_eq!(chunk.address.len(), ADDRESS_LENGTH);
            assert!(is_trytes(&chunk.address));
        }
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let first = build_chunks_with_count("genHash1", 10).unwrap();
        let second = build_chunks_with_count("genHash1", 10).unwrap();
        let addresses = |c: &[Chunk]| {
            c.iter()
                .map(|c| (c.hash.clone(), c.obfuscated_hash.clone(), c.address.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(addresses(&first), addresses(&second));

        let other = build_chunks_with_count("genHash2", 10).unwrap();
        assert_ne!(first[0].address, other[0].address);
    }

    #[test]
    fn test_hash_chain_property() {
        let chunks = build_chunks_with_count("G", 8).unwrap();
        assert_eq!(chunks[0].hash, "G");
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].hash, sha256_hex(&pair[0].hash));
        }
        for chunk in &chunks {
            assert_eq!(chunk.obfuscated_hash, sha384_hex(&chunk.hash));
            assert_eq!(make_address(&chunk.obfuscated_hash).unwrap(), chunk.address);
        }
    }

    #[test]
    fn test_prefix_of_longer_chain_is_identical() {
        let short = build_chunks_with_count("G", 3).unwrap();
        let long = build_chunks_with_count("G", 30).unwrap();
        assert_eq!(short[2].address, long[2].address);
    }

    #[test]
    fn test_total_chunk_count_reserves_treasure_chunks() {
        assert_eq!(total_chunk_count(0), 0);
        assert_eq!(total_chunk_count(1), 2);
        assert_eq!(total_chunk_count(FILE_CHUNK_SIZE_BYTES), 2);
        assert_eq!(total_chunk_count(FILE_CHUNK_SIZE_BYTES + 1), 3);
        // 500000 bytes -> 229 data chunks + 1 treasure chunk
        assert_eq!(total_chunk_count(500_000), 230);
        assert_eq!(build_chunks("G", 500_000).unwrap().len(), 230);
    }

    #[test]
    fn test_empty_genesis_hash_is_rejected() {
        assert!(matches!(
            build_chunks_with_count("", 3),
            Err(ChainError::EmptyGenesisHash)
        ));
        assert!(make_address("not hex").is_err());
    }
}
