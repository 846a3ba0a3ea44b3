pub mod channel;
pub mod chunk;
pub mod session;

pub use channel::ChunkChannel;
pub use chunk::{Chunk, ChunkError, ChunkStatus};
pub use session::{
    PaymentStatus, SessionError, SessionType, SortOrder, TreasureEntry, TreasureStatus,
    UploadSession,
};
