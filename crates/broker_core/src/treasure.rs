//! Treasure payloads buried into chunk messages.
//!
//! A payload hides a point on the SHA-512 side-chain of a chunk's content hash at a
//! random depth `k` in `0..=max_depth`. The side-chain value is encrypted with a key
//! derived from the treasure seed and encoded as trytes so it fits into a
//! transaction message. Encryption is deterministic: the same seed, hash and depth
//! always produce the same payload, which lets a claim be validated by re-deriving it.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::constants::MAX_TREASURE_DEPTH;
use crate::hashes::{iterate, sha512_hex};
use crate::trytes::{bytes_to_trytes, trytes_to_bytes, TryteError};

const NONCE_LENGTH: usize = 12;

#[derive(Debug, Error)]
pub enum TreasureError {
    #[error("Treasure seed must not be empty")]
    EmptySeed,

    #[error("Content hash must not be empty")]
    EmptyContentHash,

    #[error("Failed to encrypt treasure payload")]
    Encryption,

    #[error("Failed to decrypt treasure payload")]
    Decryption,

    #[error("Treasure payload is not valid trytes: {0}")]
    InvalidPayload(#[from] TryteError),

    #[error("Treasure payload is too short ({0} bytes)")]
    TruncatedPayload(usize),

    #[error("Payload does not match any side-chain depth up to {0}")]
    DepthNotFound(u64),

    #[error("Side-chain depth {0} exceeds the limit of {max}", max = MAX_TREASURE_DEPTH)]
    DepthTooLarge(u64),
}

fn check_depth(depth: u64) -> Result<(), TreasureError> {
    if depth > MAX_TREASURE_DEPTH {
        return Err(TreasureError::DepthTooLarge(depth));
    }
    Ok(())
}

/// The side-chain value at `depth`: SHA-512 applied `depth + 1` times.
pub fn side_chain_hash(content_hash: &str, depth: u64) -> Result<String, TreasureError> {
    check_depth(depth)?;
    let rounds = usize::try_from(depth + 1).map_err(|_| TreasureError::DepthTooLarge(depth))?;
    Ok(iterate(content_hash, rounds, sha512_hex))
}

fn cipher_key(seed: &str) -> [u8; 32] {
    Sha256::digest(seed.as_bytes()).into()
}

fn derive_nonce(key: &[u8; 32], plaintext: &[u8]) -> [u8; NONCE_LENGTH] {
    let digest = Sha256::new()
        .chain_update(key)
        .chain_update(plaintext)
        .finalize();
    let mut nonce = [0u8; NONCE_LENGTH];
    nonce.copy_from_slice(&digest[..NONCE_LENGTH]);
    nonce
}

fn encrypt(seed: &str, plaintext: &str) -> Result<Vec<u8>, TreasureError> {
    let key = cipher_key(seed);
    let nonce = derive_nonce(&key, plaintext.as_bytes());
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|_| TreasureError::Encryption)?;

    let mut out = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn decrypt(seed: &str, sealed: &[u8]) -> Result<String, TreasureError> {
    if sealed.len() <= NONCE_LENGTH {
        return Err(TreasureError::TruncatedPayload(sealed.len()));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LENGTH);
    let key = cipher_key(seed);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| TreasureError::Decryption)?;
    String::from_utf8(plaintext).map_err(|_| TreasureError::Decryption)
}

/// Derives the encoded payload for a known side-chain `depth`.
pub fn derive_treasure_payload(
    seed: &str,
    content_hash: &str,
    depth: u64,
) -> Result<String, TreasureError> {
    if seed.is_empty() {
        return Err(TreasureError::EmptySeed);
    }
    if content_hash.is_empty() {
        return Err(TreasureError::EmptyContentHash);
    }

    let secret = side_chain_hash(content_hash, depth)?;
    Ok(bytes_to_trytes(&encrypt(seed, &secret)?))
}

/// Picks a depth uniformly from `0..=max_depth` with `rng` and returns it together
/// with the encoded payload.
pub fn create_treasure_payload_with_rng<R: Rng>(
    rng: &mut R,
    seed: &str,
    content_hash: &str,
    max_depth: u64,
) -> Result<(u64, String), TreasureError> {
    check_depth(max_depth)?;
    let depth = rng.gen_range(0..=max_depth);
    let payload = derive_treasure_payload(seed, content_hash, depth)?;
    Ok((depth, payload))
}

/// Builds a treasure payload at a random depth in `0..=max_depth`.
pub fn create_treasure_payload(
    seed: &str,
    content_hash: &str,
    max_depth: u64,
) -> Result<String, TreasureError> {
    let (_, payload) =
        create_treasure_payload_with_rng(&mut rand::thread_rng(), seed, content_hash, max_depth)?;
    Ok(payload)
}

/// Decrypts an encoded payload back into its side-chain value.
pub fn open_treasure_payload(seed: &str, payload: &str) -> Result<String, TreasureError> {
    let sealed = trytes_to_bytes(payload)?;
    decrypt(seed, &sealed)
}

/// Walks the side-chain to find the depth a payload was buried at.
pub fn verify_treasure_claim(
    seed: &str,
    content_hash: &str,
    payload: &str,
    max_depth: u64,
) -> Result<u64, TreasureError> {
    check_depth(max_depth)?;
    let secret = open_treasure_payload(seed, payload)?;
    let mut current = content_hash.to_owned();
    for depth in 0..=max_depth {
        current = sha512_hex(&current);
        if current == secret {
            return Ok(depth);
        }
    }
    Err(TreasureError::DepthNotFound(max_depth))
}
