//! Ledger transactions and zero-value bundle preparation.

use broker_core::constants::{ADDRESS_LENGTH, HASH_LENGTH, MESSAGE_FRAGMENT_LENGTH, TAG_LENGTH};
use broker_core::trytes::{
    expect_trytes, int_to_trytes, is_trytes, pad_trytes, trytes_to_int, TryteError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sponge::{hash_trytes, trailing_zero_trits, Sponge};

/// Length of a serialised transaction.
pub const TRANSACTION_LENGTH: usize = 2673;
pub const VALUE_LENGTH: usize = 27;
pub const TIMESTAMP_LENGTH: usize = 9;
pub const INDEX_LENGTH: usize = 9;
pub const NONCE_LENGTH: usize = 27;

/// Largest value a 9-tryte timestamp can hold, `(27^9 - 1) / 2`.
pub const MAX_TIMESTAMP_VALUE: i64 = 3_812_798_742_493;

/// Field widths in serialisation order.
const LAYOUT: [usize; 15] = [
    MESSAGE_FRAGMENT_LENGTH,
    ADDRESS_LENGTH,
    VALUE_LENGTH,
    TAG_LENGTH,
    TIMESTAMP_LENGTH,
    INDEX_LENGTH,
    INDEX_LENGTH,
    HASH_LENGTH,
    HASH_LENGTH,
    HASH_LENGTH,
    TAG_LENGTH,
    TIMESTAMP_LENGTH,
    TIMESTAMP_LENGTH,
    TIMESTAMP_LENGTH,
    NONCE_LENGTH,
];

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Invalid trytes: {0}")]
    Trytes(#[from] TryteError),

    #[error("Message of {0} trytes does not fit into one fragment")]
    MessageTooLong(usize),

    #[error("Tag of {0} trytes is longer than {TAG_LENGTH}")]
    TagTooLong(usize),

    #[error("Invalid seed")]
    InvalidSeed,

    #[error("Bundle has no transfers")]
    EmptyBundle,
}

/// A single ledger transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub signature_message_fragment: String,
    pub address: String,
    pub value: i64,
    pub obsolete_tag: String,
    pub timestamp: i64,
    pub current_index: i64,
    pub last_index: i64,
    pub bundle: String,
    pub trunk_transaction: String,
    pub branch_transaction: String,
    pub tag: String,
    pub attachment_timestamp: i64,
    pub attachment_timestamp_lower_bound: i64,
    pub attachment_timestamp_upper_bound: i64,
    pub nonce: String,
}

impl Transaction {
    /// Serialises the transaction into its 2673-tryte form.
    pub fn trytes(&self) -> Result<String, TransactionError> {
        let mut out = String::with_capacity(TRANSACTION_LENGTH);
        out.push_str(&pad_trytes(
            &self.signature_message_fragment,
            MESSAGE_FRAGMENT_LENGTH,
        ));
        out.push_str(&pad_trytes(&self.address, ADDRESS_LENGTH));
        out.push_str(&int_to_trytes(self.value, VALUE_LENGTH)?);
        out.push_str(&pad_trytes(&self.obsolete_tag, TAG_LENGTH));
        out.push_str(&int_to_trytes(self.timestamp, TIMESTAMP_LENGTH)?);
        out.push_str(&int_to_trytes(self.current_index, INDEX_LENGTH)?);
        out.push_str(&int_to_trytes(self.last_index, INDEX_LENGTH)?);
        out.push_str(&pad_trytes(&self.bundle, HASH_LENGTH));
        out.push_str(&pad_trytes(&self.trunk_transaction, HASH_LENGTH));
        out.push_str(&pad_trytes(&self.branch_transaction, HASH_LENGTH));
        out.push_str(&pad_trytes(&self.tag, TAG_LENGTH));
        out.push_str(&int_to_trytes(self.attachment_timestamp, TIMESTAMP_LENGTH)?);
        out.push_str(&int_to_trytes(
            self.attachment_timestamp_lower_bound,
            TIMESTAMP_LENGTH,
        )?);
        out.push_str(&int_to_trytes(
            self.attachment_timestamp_upper_bound,
            TIMESTAMP_LENGTH,
        )?);
        out.push_str(&pad_trytes(&self.nonce, NONCE_LENGTH));

        expect_trytes(&out, TRANSACTION_LENGTH)?;
        Ok(out)
    }

    /// Parses a 2673-tryte transaction.
    pub fn from_trytes(trytes: &str) -> Result<Self, TransactionError> {
        expect_trytes(trytes, TRANSACTION_LENGTH)?;

        let mut fields = Vec::with_capacity(LAYOUT.len());
        let mut offset = 0;
        for width in LAYOUT {
            fields.push(&trytes[offset..offset + width]);
            offset += width;
        }

        Ok(Self {
            signature_message_fragment: fields[0].to_owned(),
            address: fields[1].to_owned(),
            value: trytes_to_int(fields[2])?,
            obsolete_tag: fields[3].to_owned(),
            timestamp: trytes_to_int(fields[4])?,
            current_index: trytes_to_int(fields[5])?,
            last_index: trytes_to_int(fields[6])?,
            bundle: fields[7].to_owned(),
            trunk_transaction: fields[8].to_owned(),
            branch_transaction: fields[9].to_owned(),
            tag: fields[10].to_owned(),
            attachment_timestamp: trytes_to_int(fields[11])?,
            attachment_timestamp_lower_bound: trytes_to_int(fields[12])?,
            attachment_timestamp_upper_bound: trytes_to_int(fields[13])?,
            nonce: fields[14].to_owned(),
        })
    }

    /// Transaction hash over the full serialised form, nonce included.
    pub fn hash(&self) -> Result<String, TransactionError> {
        Ok(hash_trytes(&self.trytes()?))
    }

    /// Whether the hash ends in at least `min_weight_magnitude` zero trits.
    pub fn has_min_weight(&self, min_weight_magnitude: usize) -> Result<bool, TransactionError> {
        Ok(trailing_zero_trits(&self.hash()?) >= min_weight_magnitude)
    }

    /// Fields that make up the bundle hash.
    fn essence(&self) -> Result<String, TransactionError> {
        let mut out = pad_trytes(&self.address, ADDRESS_LENGTH);
        out.push_str(&int_to_trytes(self.value, VALUE_LENGTH)?);
        out.push_str(&pad_trytes(&self.obsolete_tag, TAG_LENGTH));
        out.push_str(&int_to_trytes(self.timestamp, TIMESTAMP_LENGTH)?);
        out.push_str(&int_to_trytes(self.current_index, INDEX_LENGTH)?);
        out.push_str(&int_to_trytes(self.last_index, INDEX_LENGTH)?);
        Ok(out)
    }
}

/// A zero-value transfer carrying a message to an address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub address: String,
    pub value: i64,
    pub message: String,
    pub tag: String,
}

/// Builds an unattached bundle with one transaction per transfer.
///
/// Trunk, branch and nonce are left empty; they are filled in when the bundle is
/// attached. `timestamp` is in seconds.
pub fn prepare_transfers(
    seed: &str,
    transfers: &[Transfer],
    timestamp: i64,
) -> Result<Vec<Transaction>, TransactionError> {
    if seed.len() != ADDRESS_LENGTH || !is_trytes(seed) {
        return Err(TransactionError::InvalidSeed);
    }
    if transfers.is_empty() {
        return Err(TransactionError::EmptyBundle);
    }

    let last_index = transfers.len() as i64 - 1;
    let mut bundle = Vec::with_capacity(transfers.len());
    for (i, transfer) in transfers.iter().enumerate() {
        expect_trytes(&transfer.address, ADDRESS_LENGTH)?;
        if transfer.message.len() > MESSAGE_FRAGMENT_LENGTH {
            return Err(TransactionError::MessageTooLong(transfer.message.len()));
        }
        if transfer.tag.len() > TAG_LENGTH {
            return Err(TransactionError::TagTooLong(transfer.tag.len()));
        }
        let tag = pad_trytes(&transfer.tag, TAG_LENGTH);

        bundle.push(Transaction {
            signature_message_fragment: pad_trytes(&transfer.message, MESSAGE_FRAGMENT_LENGTH),
            address: transfer.address.clone(),
            value: transfer.value,
            obsolete_tag: tag.clone(),
            timestamp,
            current_index: i as i64,
            last_index,
            tag,
            ..Default::default()
        });
    }

    let mut sponge = Sponge::new();
    for tx in &bundle {
        sponge.absorb(&tx.essence()?);
    }
    let bundle_hash = sponge.squeeze();
    for tx in bundle.iter_mut() {
        tx.bundle = bundle_hash.clone();
    }
    Ok(bundle)
}
