//! Hex-string hashing helpers shared by the address chain and treasure side-chain.
//!
//! Every step hashes the UTF-8 text of the previous step's lowercase hex digest, so
//! independent nodes that start from the same genesis hash derive identical values.

use sha2::{Digest, Sha256, Sha384, Sha512};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("Invalid hash length, expected {expected} hex characters but got {actual}")]
    InvalidStringLength { expected: usize, actual: usize },

    #[error("Invalid hex string: {0}")]
    InvalidHexString(#[from] hex::FromHexError),
}

/// Hashes `input` with the digest `D` and returns the lowercase hex encoding.
pub fn hash_hex<D: Digest>(input: &str) -> String {
    hex::encode(D::digest(input.as_bytes()))
}

/// Link function of the plaintext chunk hash chain.
pub fn sha256_hex(input: &str) -> String {
    hash_hex::<Sha256>(input)
}

/// Obfuscation applied once to each plaintext chunk hash.
pub fn sha384_hex(input: &str) -> String {
    hash_hex::<Sha384>(input)
}

/// Link function of the treasure side-chain.
pub fn sha512_hex(input: &str) -> String {
    hash_hex::<Sha512>(input)
}

/// Applies `f` to `input` `times` times.
pub fn iterate(input: &str, times: usize, f: fn(&str) -> String) -> String {
    let mut current = input.to_owned();
    for _ in 0..times {
        current = f(&current);
    }
    current
}

/// Decodes a hex digest, checking its length against `expected_bytes`.
pub fn decode_hex_hash(hash: &str, expected_bytes: usize) -> Result<Vec<u8>, HashError> {
    if hash.len() != expected_bytes * 2 {
        return Err(HashError::InvalidStringLength {
            expected: expected_bytes * 2,
            actual: hash.len(),
        });
    }
    Ok(hex::decode(hash)?)
}
