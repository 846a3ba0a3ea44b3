//! Conversions between bytes, integers and the ledger's tryte alphabet.
//!
//! A tryte is a base-27 digit written with the characters `9A-Z`. `9` is zero,
//! `A`..`M` are 1..13 and `N`..`Z` are -13..-1 in balanced ternary.

use thiserror::Error;

pub const TRYTE_ALPHABET: &str = "9ABCDEFGHIJKLMNOPQRSTUVWXYZ";

const ALPHABET_BYTES: &[u8; 27] = b"9ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Number of trits in one tryte.
pub const TRITS_PER_TRYTE: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TryteError {
    #[error("Invalid tryte character {0:?}")]
    InvalidTryte(char),

    #[error("Odd number of trytes ({0}) cannot be decoded into bytes")]
    OddLength(usize),

    #[error("Tryte pair {0:?} does not encode a byte")]
    InvalidPair(String),

    #[error("Value {value} does not fit into {trytes} trytes")]
    Overflow { value: i64, trytes: usize },

    #[error("Expected {expected} trytes but got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Returns true if every character of `s` is a tryte.
pub fn is_trytes(s: &str) -> bool {
    s.bytes().all(|b| ALPHABET_BYTES.contains(&b))
}

/// Balanced value of a single tryte character.
pub fn tryte_value(c: char) -> Result<i8, TryteError> {
    let idx = TRYTE_ALPHABET
        .find(c)
        .ok_or(TryteError::InvalidTryte(c))? as i8;
    Ok(if idx <= 13 { idx } else { idx - 27 })
}

/// Tryte character for a balanced value in `-13..=13`.
pub fn value_tryte(value: i8) -> char {
    ALPHABET_BYTES[value.rem_euclid(27) as usize] as char
}

/// Encodes raw bytes as trytes, two trytes per byte (`b % 27`, then `b / 27`).
pub fn bytes_to_trytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(ALPHABET_BYTES[(b % 27) as usize] as char);
        out.push(ALPHABET_BYTES[(b / 27) as usize] as char);
    }
    out
}

/// Decodes trytes produced by [`bytes_to_trytes`].
pub fn trytes_to_bytes(trytes: &str) -> Result<Vec<u8>, TryteError> {
    if trytes.len() % 2 != 0 {
        return Err(TryteError::OddLength(trytes.len()));
    }

    let raw = trytes.as_bytes();
    let mut out = Vec::with_capacity(raw.len() / 2);
    for pair in raw.chunks(2) {
        let first = alphabet_index(pair[0])?;
        let second = alphabet_index(pair[1])?;
        let value = first + second * 27;
        if value > u8::MAX as usize {
            return Err(TryteError::InvalidPair(
                String::from_utf8_lossy(pair).into_owned(),
            ));
        }
        out.push(value as u8);
    }
    Ok(out)
}

fn alphabet_index(b: u8) -> Result<usize, TryteError> {
    ALPHABET_BYTES
        .iter()
        .position(|&c| c == b)
        .ok_or(TryteError::InvalidTryte(b as char))
}

/// Encodes a signed integer into `num_trytes` little-endian balanced trytes.
pub fn int_to_trytes(value: i64, num_trytes: usize) -> Result<String, TryteError> {
    let mut remaining = value as i128;
    let mut out = String::with_capacity(num_trytes);
    for _ in 0..num_trytes {
        let mut digit = remaining.rem_euclid(27);
        if digit > 13 {
            digit -= 27;
        }
        out.push(value_tryte(digit as i8));
        remaining = (remaining - digit) / 27;
    }

    if remaining != 0 {
        return Err(TryteError::Overflow {
            value,
            trytes: num_trytes,
        });
    }
    Ok(out)
}

/// Decodes little-endian balanced trytes into a signed integer.
pub fn trytes_to_int(trytes: &str) -> Result<i64, TryteError> {
    let mut acc: i128 = 0;
    for c in trytes.chars().rev() {
        acc = acc * 27 + tryte_value(c)? as i128;
        if acc.abs() > i64::MAX as i128 {
            return Err(TryteError::Overflow {
                value: i64::MAX,
                trytes: trytes.len(),
            });
        }
    }
    Ok(acc as i64)
}

/// Expands trytes into balanced trits (least significant first within each tryte).
pub fn trytes_to_trits(trytes: &str) -> Result<Vec<i8>, TryteError> {
    let mut trits = Vec::with_capacity(trytes.len() * TRITS_PER_TRYTE);
    for c in trytes.chars() {
        let mut v = tryte_value(c)? as i16;
        for _ in 0..TRITS_PER_TRYTE {
            let mut t = v.rem_euclid(3);
            if t == 2 {
                t = -1;
            }
            trits.push(t as i8);
            v = (v - t) / 3;
        }
    }
    Ok(trits)
}

/// Right-pads `trytes` with `9` up to `len`, or truncates if it is longer.
pub fn pad_trytes(trytes: &str, len: usize) -> String {
    let mut out: String = trytes.chars().take(len).collect();
    while out.len() < len {
        out.push('9');
    }
    out
}

/// Checks that `trytes` is valid and exactly `len` long.
pub fn expect_trytes(trytes: &str, len: usize) -> Result<(), TryteError> {
    if let Some(bad) = trytes.chars().find(|c| !TRYTE_ALPHABET.contains(*c)) {
        return Err(TryteError::InvalidTryte(bad));
    }
    if trytes.len() != len {
        return Err(TryteError::InvalidLength {
            expected: len,
            actual: trytes.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_encoding_matches_ledger_convention() {
        // 'H' = 72 = 18 + 2 * 27 -> "RB"
        assert_eq!(bytes_to_trytes(b"H"), "RB");
        assert_eq!(bytes_to_trytes(b"HI"), "RBSB");
        assert_eq!(trytes_to_bytes("RBSB").unwrap(), b"HI".to_vec());
    }

    #[test]
    fn test_full_byte_range_survives_encoding() {
        let bytes: Vec<u8> = (0..=255).collect();
        let trytes = bytes_to_trytes(&bytes);
        assert!(is_trytes(&trytes));
        assert_eq!(trytes_to_bytes(&trytes).unwrap(), bytes);
    }

    #[test]
    fn test_invalid_input_is_rejected() {
        assert_eq!(trytes_to_bytes("ABC"), Err(TryteError::OddLength(3)));
        assert_eq!(trytes_to_bytes("a9"), Err(TryteError::InvalidTryte('a')));
        // 26 + 26 * 27 > 255
        assert!(matches!(
            trytes_to_bytes("ZZ"),
            Err(TryteError::InvalidPair(_))
        ));
    }

    #[test]
    fn test_upper_bound_sentinel_value() {
        // Nine 'M' trytes are the largest value a 27-trit field can hold.
        assert_eq!(trytes_to_int("MMMMMMMMM").unwrap(), 3_812_798_742_493);
        assert_eq!(int_to_trytes(3_812_798_742_493, 9).unwrap(), "MMMMMMMMM");
        assert!(int_to_trytes(3_812_798_742_494, 9).is_err());
    }

    #[test]
    fn test_negative_and_zero_integers() {
        assert_eq!(int_to_trytes(0, 3).unwrap(), "999");
        assert_eq!(int_to_trytes(-1, 2).unwrap(), "Z9");
        assert_eq!(trytes_to_int("Z9").unwrap(), -1);
        assert_eq!(trytes_to_int(&int_to_trytes(-123_456, 9).unwrap()).unwrap(), -123_456);
    }

    #[test]
    fn test_trits_expansion() {
        assert_eq!(trytes_to_trits("9").unwrap(), vec![0, 0, 0]);
        assert_eq!(trytes_to_trits("A").unwrap(), vec![1, 0, 0]);
        assert_eq!(trytes_to_trits("Z").unwrap(), vec![-1, 0, 0]);
        assert_eq!(trytes_to_trits("M").unwrap(), vec![1, 1, 1]);
    }

    #[test]
    fn test_padding_and_length_checks() {
        assert_eq!(pad_trytes("ABC", 5), "ABC99");
        assert_eq!(pad_trytes("ABCDEF", 3), "ABC");
        assert!(expect_trytes("ABC", 3).is_ok());
        assert_eq!(
            expect_trytes("ABC", 4),
            Err(TryteError::InvalidLength {
                expected: 4,
                actual: 3
            })
        );
    }
}
