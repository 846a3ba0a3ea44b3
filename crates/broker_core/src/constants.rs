use std::time::Duration;

/// Bytes of file content carried by one chunk.
pub const FILE_CHUNK_SIZE_BYTES: u64 = 2187;
/// Data chunks per sector. Each sector reserves one extra chunk for treasure.
pub const FILE_SECTOR_IN_CHUNKS: u64 = 1_000_000;

/// Upper bound for the randomized treasure side-chain depth.
pub const MAX_SIDE_CHAIN_LENGTH: u64 = 1000;
/// Deepest side-chain position a payload can be derived or searched at.
pub const MAX_TREASURE_DEPTH: u64 = 1_000_000;

/// Length of a ledger address in trytes.
pub const ADDRESS_LENGTH: usize = 81;
/// Length of a transaction hash in trytes.
pub const HASH_LENGTH: usize = 81;
/// Length of a transaction tag in trytes.
pub const TAG_LENGTH: usize = 27;
/// Length of one signature/message fragment in trytes.
pub const MESSAGE_FRAGMENT_LENGTH: usize = 2187;

/// Fixed seed used to author the broker's zero-value transactions.
pub const BROKER_SEED: &str =
    "OYSTERPRLOYSTERPRLOYSTERPRLOYSTERPRLOYSTERPRLOYSTERPRLOYSTERPRLOYSTERPRLOYSTERPRL";
/// Tag identifying this broker's traffic on the ledger.
pub const BROKER_TAG: &str = "OYSTERBROKER";

/// Minimum weight magnitude used for proof-of-work.
pub const DEFAULT_MIN_WEIGHT_MAGNITUDE: usize = 9;
/// Depth used when asking the ledger for tips to approve.
pub const DEFAULT_MIN_DEPTH: u64 = 3;

/// Number of samples kept per worker channel for throughput estimation.
pub const THROUGHPUT_WINDOW: usize = 10;
/// Estimated delay for a channel with no throughput history yet.
pub const DEFAULT_READY_DELAY: Duration = Duration::from_secs(10);

/// Demotions to `Error` after which a chunk is no longer re-dispatched.
pub const DEFAULT_MAX_RETRIES: u32 = 5;
