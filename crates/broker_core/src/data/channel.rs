use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted view of a proof-of-work worker channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkChannel {
    pub channel_id: String,
    /// Total chunks this channel has attached since it was created.
    pub chunks_processed: u64,
    /// When the channel is expected to be free for another batch.
    pub est_ready_time: DateTime<Utc>,
}

impl ChunkChannel {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            chunks_processed: 0,
            est_ready_time: Utc::now(),
        }
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.est_ready_time <= now
    }
}
