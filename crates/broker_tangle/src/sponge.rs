//! Tryte-valued hashing used for transaction hashes, bundle hashes and proof of work.
//!
//! Input trytes are absorbed as ASCII into blake3 and the extendable output is
//! squeezed one byte per output tryte.

use broker_core::constants::HASH_LENGTH;
use broker_core::trytes::{trytes_to_trits, TRYTE_ALPHABET};

/// Incremental hasher over tryte strings.
#[derive(Clone, Default)]
pub struct Sponge {
    hasher: blake3::Hasher,
}

impl Sponge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, trytes: &str) {
        self.hasher.update(trytes.as_bytes());
    }

    /// Produces an 81-tryte digest of everything absorbed so far.
    pub fn squeeze(&self) -> String {
        let mut out = [0u8; HASH_LENGTH];
        self.hasher.finalize_xof().fill(&mut out);

        let alphabet = TRYTE_ALPHABET.as_bytes();
        out.iter()
            .map(|b| alphabet[(*b % 27) as usize] as char)
            .collect()
    }
}

/// One-shot digest of a tryte string.
pub fn hash_trytes(trytes: &str) -> String {
    let mut sponge = Sponge::new();
    sponge.absorb(trytes);
    sponge.squeeze()
}

/// Number of consecutive zero trits at the end of a hash.
pub fn trailing_zero_trits(hash: &str) -> usize {
    match trytes_to_trits(hash) {
        Ok(trits) => trits.iter().rev().take_while(|t| **t == 0).count(),
        Err(_) => 0,
    }
}
