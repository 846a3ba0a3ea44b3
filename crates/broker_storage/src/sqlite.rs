//! SQLite-backed store.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use broker_core::data::{
    Chunk, ChunkChannel, ChunkStatus, PaymentStatus, SessionType, SortOrder, TreasureStatus,
    UploadSession,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{ChannelStore, ChunkStore, SessionStore, StorageError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS data_maps (
    genesis_hash TEXT NOT NULL,
    chunk_idx INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    status INTEGER NOT NULL,
    node_id TEXT NOT NULL DEFAULT '',
    node_type TEXT NOT NULL DEFAULT '',
    message TEXT NOT NULL DEFAULT '',
    trunk_tx TEXT NOT NULL DEFAULT '',
    branch_tx TEXT NOT NULL DEFAULT '',
    hash TEXT NOT NULL,
    obfuscated_hash TEXT NOT NULL,
    address TEXT NOT NULL,
    retries INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (genesis_hash, chunk_idx)
);
CREATE INDEX IF NOT EXISTS data_maps_status ON data_maps (status);

CREATE TABLE IF NOT EXISTS upload_sessions (
    genesis_hash TEXT PRIMARY KEY,
    file_size_bytes INTEGER NOT NULL,
    session_type INTEGER NOT NULL,
    payment_status INTEGER NOT NULL,
    treasure_status INTEGER NOT NULL,
    treasure_idx_map TEXT
);

CREATE TABLE IF NOT EXISTS chunk_channels (
    channel_id TEXT PRIMARY KEY,
    chunks_processed INTEGER NOT NULL DEFAULT 0,
    est_ready_time TEXT NOT NULL
);
";

const CHUNK_COLUMNS: &str = "genesis_hash, chunk_idx, created_at, updated_at, status, node_id, \
     node_type, message, trunk_tx, branch_tx, hash, obfuscated_hash, address, retries";

/// Raw row, converted to a [`Chunk`] after the statement finishes so that status
/// decoding errors surface as [`StorageError`].
struct ChunkRow {
    genesis_hash: String,
    chunk_idx: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    status: i64,
    node_id: String,
    node_type: String,
    message: String,
    trunk_tx: String,
    branch_tx: String,
    hash: String,
    obfuscated_hash: String,
    address: String,
    retries: u32,
}

impl ChunkRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            genesis_hash: row.get(0)?,
            chunk_idx: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
            status: row.get(4)?,
            node_id: row.get(5)?,
            node_type: row.get(6)?,
            message: row.get(7)?,
            trunk_tx: row.get(8)?,
            branch_tx: row.get(9)?,
            hash: row.get(10)?,
            obfuscated_hash: row.get(11)?,
            address: row.get(12)?,
            retries: row.get(13)?,
        })
    }

    fn into_chunk(self) -> Result<Chunk, StorageError> {
        Ok(Chunk {
            created_at: self.created_at,
            updated_at: self.updated_at,
            status: ChunkStatus::try_from(self.status)?,
            node_id: self.node_id,
            node_type: self.node_type,
            message: self.message,
            trunk_tx: self.trunk_tx,
            branch_tx: self.branch_tx,
            genesis_hash: self.genesis_hash,
            chunk_idx: self.chunk_idx as u64,
            hash: self.hash,
            obfuscated_hash: self.obfuscated_hash,
            address: self.address,
            retries: self.retries,
        })
    }
}

struct SessionRow {
    genesis_hash: String,
    file_size_bytes: i64,
    session_type: i64,
    payment_status: i64,
    treasure_status: i64,
    treasure_idx_map: Option<String>,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            genesis_hash: row.get(0)?,
            file_size_bytes: row.get(1)?,
            session_type: row.get(2)?,
            payment_status: row.get(3)?,
            treasure_status: row.get(4)?,
            treasure_idx_map: row.get(5)?,
        })
    }

    fn into_session(self) -> Result<UploadSession, StorageError> {
        Ok(UploadSession {
            genesis_hash: self.genesis_hash,
            file_size_bytes: self.file_size_bytes as u64,
            session_type: SessionType::try_from(self.session_type)?,
            payment_status: PaymentStatus::try_from(self.payment_status)?,
            treasure_status: TreasureStatus::try_from(self.treasure_status)?,
            treasure_idx_map: self.treasure_idx_map,
        })
    }
}

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<ChunkChannel> {
    Ok(ChunkChannel {
        channel_id: row.get(0)?,
        chunks_processed: row.get::<_, i64>(1)? as u64,
        est_ready_time: row.get(2)?,
    })
}

fn collect_chunks(rows: Vec<ChunkRow>) -> Result<Vec<Chunk>, StorageError> {
    rows.into_iter().map(ChunkRow::into_chunk).collect()
}

/// Store backed by a single SQLite connection.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) the database file and ensures the schema exists.
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        info!("Opening broker database at {}", db_path.display());
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), StorageError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO data_maps ({CHUNK_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ))?;
            for chunk in chunks {
                let result = stmt.execute(params![
                    chunk.genesis_hash,
                    chunk.chunk_idx as i64,
                    chunk.created_at,
                    chunk.updated_at,
                    chunk.status.code(),
                    chunk.node_id,
                    chunk.node_type,
                    chunk.message,
                    chunk.trunk_tx,
                    chunk.branch_tx,
                    chunk.hash,
                    chunk.obfuscated_hash,
                    chunk.address,
                    chunk.retries,
                ]);
                match result {
                    Ok(_) => {}
                    Err(rusqlite::Error::SqliteFailure(err, _))
                        if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        return Err(StorageError::DuplicateChunk(
                            chunk.genesis_hash.clone(),
                            chunk.chunk_idx,
                        ));
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
        tx.commit()?;
        debug!("Inserted {} chunks", chunks.len());
        Ok(())
    }

    async fn update_chunks(&self, chunks: &[Chunk]) -> Result<(), StorageError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE data_maps
                 SET status = ?1, message = ?2, trunk_tx = ?3, branch_tx = ?4,
                     node_id = ?5, node_type = ?6, retries = ?7, updated_at = ?8
                 WHERE genesis_hash = ?9 AND chunk_idx = ?10",
            )?;
            for chunk in chunks {
                let updated = stmt.execute(params![
                    chunk.status.code(),
                    chunk.message,
                    chunk.trunk_tx,
                    chunk.branch_tx,
                    chunk.node_id,
                    chunk.node_type,
                    chunk.retries,
                    chunk.updated_at,
                    chunk.genesis_hash,
                    chunk.chunk_idx as i64,
                ])?;
                if updated == 0 {
                    return Err(StorageError::ChunkNotFound(
                        chunk.genesis_hash.clone(),
                        chunk.chunk_idx,
                    ));
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn get_chunk(
        &self,
        genesis_hash: &str,
        chunk_idx: u64,
    ) -> Result<Option<Chunk>, StorageError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {CHUNK_COLUMNS} FROM data_maps
                     WHERE genesis_hash = ?1 AND chunk_idx = ?2"
                ),
                params![genesis_hash, chunk_idx as i64],
                ChunkRow::from_row,
            )
            .optional()?;
        row.map(ChunkRow::into_chunk).transpose()
    }

    async fn get_chunks_by_genesis(&self, genesis_hash: &str) -> Result<Vec<Chunk>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CHUNK_COLUMNS} FROM data_maps
             WHERE genesis_hash = ?1 ORDER BY chunk_idx ASC"
        ))?;
        let rows = stmt
            .query_map(params![genesis_hash], ChunkRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        collect_chunks(rows)
    }

    async fn get_chunks_by_status(&self, status: ChunkStatus) -> Result<Vec<Chunk>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CHUNK_COLUMNS} FROM data_maps
             WHERE status = ?1 ORDER BY genesis_hash, chunk_idx"
        ))?;
        let rows = stmt
            .query_map(params![status.code()], ChunkRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        collect_chunks(rows)
    }

    async fn get_retryable_chunks(
        &self,
        genesis_hash: &str,
        order: SortOrder,
        max_retries: u32,
        limit: Option<usize>,
    ) -> Result<Vec<Chunk>, StorageError> {
        // A negative LIMIT means no limit in SQLite.
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CHUNK_COLUMNS} FROM data_maps
             WHERE genesis_hash = ?1
               AND (status = ?2 OR status = ?3)
               AND retries < ?4
             ORDER BY chunk_idx {}
             LIMIT ?5",
            order.as_sql()
        ))?;
        let rows = stmt
            .query_map(
                params![
                    genesis_hash,
                    ChunkStatus::Unassigned.code(),
                    ChunkStatus::Error.code(),
                    max_retries,
                    limit,
                ],
                ChunkRow::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        collect_chunks(rows)
    }

    async fn get_retryable_genesis_hashes(
        &self,
        max_retries: u32,
    ) -> Result<Vec<String>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT genesis_hash FROM data_maps
             WHERE (status = ?1 OR status = ?2) AND retries < ?3
             ORDER BY genesis_hash",
        )?;
        let hashes = stmt
            .query_map(
                params![
                    ChunkStatus::Unassigned.code(),
                    ChunkStatus::Error.code(),
                    max_retries,
                ],
                |row| row.get(0),
            )?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(hashes)
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn insert_session(&self, session: &UploadSession) -> Result<(), StorageError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO upload_sessions (
                genesis_hash, file_size_bytes, session_type, payment_status,
                treasure_status, treasure_idx_map
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.genesis_hash,
                session.file_size_bytes as i64,
                session.session_type.code(),
                session.payment_status.code(),
                session.treasure_status.code(),
                session.treasure_idx_map,
            ],
        )?;
        Ok(())
    }

    async fn update_session(&self, session: &UploadSession) -> Result<(), StorageError> {
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "UPDATE upload_sessions
             SET file_size_bytes = ?1, session_type = ?2, payment_status = ?3,
                 treasure_status = ?4, treasure_idx_map = ?5
             WHERE genesis_hash = ?6",
            params![
                session.file_size_bytes as i64,
                session.session_type.code(),
                session.payment_status.code(),
                session.treasure_status.code(),
                session.treasure_idx_map,
                session.genesis_hash,
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::SessionNotFound(session.genesis_hash.clone()));
        }
        Ok(())
    }

    async fn get_session(&self, genesis_hash: &str) -> Result<Option<UploadSession>, StorageError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT genesis_hash, file_size_bytes, session_type, payment_status,
                        treasure_status, treasure_idx_map
                 FROM upload_sessions WHERE genesis_hash = ?1",
                params![genesis_hash],
                SessionRow::from_row,
            )
            .optional()?;
        row.map(SessionRow::into_session).transpose()
    }

    async fn get_sessions_by_payment_status(
        &self,
        status: PaymentStatus,
    ) -> Result<Vec<UploadSession>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT genesis_hash, file_size_bytes, session_type, payment_status,
                    treasure_status, treasure_idx_map
             FROM upload_sessions WHERE payment_status = ?1 ORDER BY genesis_hash",
        )?;
        let rows = stmt
            .query_map(params![status.code()], SessionRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(SessionRow::into_session).collect()
    }
}

#[async_trait]
impl ChannelStore for SqliteStore {
    async fn upsert_channel(&self, channel: &ChunkChannel) -> Result<(), StorageError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO chunk_channels (channel_id, chunks_processed, est_ready_time)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(channel_id) DO UPDATE SET
                chunks_processed = excluded.chunks_processed,
                est_ready_time = excluded.est_ready_time",
            params![
                channel.channel_id,
                channel.chunks_processed as i64,
                channel.est_ready_time,
            ],
        )?;
        Ok(())
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Option<ChunkChannel>, StorageError> {
        let conn = self.conn.lock().await;
        let channel = conn
            .query_row(
                "SELECT channel_id, chunks_processed, est_ready_time
                 FROM chunk_channels WHERE channel_id = ?1",
                params![channel_id],
                channel_from_row,
            )
            .optional()?;
        Ok(channel)
    }

    async fn add_chunks_processed(
        &self,
        channel_id: &str,
        count: u64,
    ) -> Result<(), StorageError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE chunk_channels SET chunks_processed = chunks_processed + ?2
             WHERE channel_id = ?1",
            params![channel_id, count as i64],
        )?;
        if changed == 0 {
            return Err(StorageError::ChannelNotFound(channel_id.to_owned()));
        }
        Ok(())
    }

    async fn set_est_ready_time(
        &self,
        channel_id: &str,
        est_ready_time: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE chunk_channels SET est_ready_time = ?2 WHERE channel_id = ?1",
            params![channel_id, est_ready_time],
        )?;
        if changed == 0 {
            return Err(StorageError::ChannelNotFound(channel_id.to_owned()));
        }
        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<ChunkChannel>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT channel_id, chunks_processed, est_ready_time
             FROM chunk_channels ORDER BY channel_id",
        )?;
        let channels = stmt
            .query_map([], channel_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(channels)
    }
}
