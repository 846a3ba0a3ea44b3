use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid {kind} code {code}")]
    InvalidCode { kind: &'static str, code: i64 },

    #[error("Malformed treasure index map: {0}")]
    TreasureMap(#[from] serde_json::Error),
}

/// Order in which a session's chunks are dispatched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

/// The two upload session types process chunks from opposite ends of the file, so
/// that sessions competing for the same worker capacity do not starve the same
/// chunk positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionType {
    Alpha,
    Beta,
}

impl SessionType {
    pub fn sort_order(self) -> SortOrder {
        match self {
            SessionType::Alpha => SortOrder::Ascending,
            SessionType::Beta => SortOrder::Descending,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            SessionType::Alpha => 1,
            SessionType::Beta => 2,
        }
    }
}

impl TryFrom<i64> for SessionType {
    type Error = SessionError;

    fn try_from(code: i64) -> Result<Self, SessionError> {
        match code {
            1 => Ok(SessionType::Alpha),
            2 => Ok(SessionType::Beta),
            _ => Err(SessionError::InvalidCode {
                kind: "session type",
                code,
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Invoiced,
    Paid,
    Error,
}

impl PaymentStatus {
    pub fn code(self) -> i64 {
        match self {
            PaymentStatus::Pending => 1,
            PaymentStatus::Invoiced => 2,
            PaymentStatus::Paid => 3,
            PaymentStatus::Error => -1,
        }
    }
}

impl TryFrom<i64> for PaymentStatus {
    type Error = SessionError;

    fn try_from(code: i64) -> Result<Self, SessionError> {
        match code {
            1 => Ok(PaymentStatus::Pending),
            2 => Ok(PaymentStatus::Invoiced),
            3 => Ok(PaymentStatus::Paid),
            -1 => Ok(PaymentStatus::Error),
            _ => Err(SessionError::InvalidCode {
                kind: "payment status",
                code,
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreasureStatus {
    Pending,
    Unburied,
    Buried,
}

impl TreasureStatus {
    pub fn code(self) -> i64 {
        match self {
            TreasureStatus::Pending => 1,
            TreasureStatus::Unburied => 2,
            TreasureStatus::Buried => 3,
        }
    }
}

impl TryFrom<i64> for TreasureStatus {
    type Error = SessionError;

    fn try_from(code: i64) -> Result<Self, SessionError> {
        match code {
            1 => Ok(TreasureStatus::Pending),
            2 => Ok(TreasureStatus::Unburied),
            3 => Ok(TreasureStatus::Buried),
            _ => Err(SessionError::InvalidCode {
                kind: "treasure status",
                code,
            }),
        }
    }
}

/// One position of a file's treasure index map.
///
/// A non-empty `key` means the secret has not been buried yet. Once it is embedded
/// into the chunk at `idx` the key is cleared.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasureEntry {
    pub sector: u64,
    pub idx: u64,
    pub key: String,
}

impl TreasureEntry {
    pub fn is_buried(&self) -> bool {
        self.key.is_empty()
    }
}

/// The fields of an upload session this node reads and writes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    pub genesis_hash: String,
    pub file_size_bytes: u64,
    pub session_type: SessionType,
    pub payment_status: PaymentStatus,
    pub treasure_status: TreasureStatus,
    /// JSON array of [`TreasureEntry`].
    pub treasure_idx_map: Option<String>,
}

impl UploadSession {
    pub fn new(genesis_hash: &str, file_size_bytes: u64, session_type: SessionType) -> Self {
        Self {
            genesis_hash: genesis_hash.to_owned(),
            file_size_bytes,
            session_type,
            payment_status: PaymentStatus::Pending,
            treasure_status: TreasureStatus::Pending,
            treasure_idx_map: None,
        }
    }

    /// Parses the treasure index map. A session without one has no treasure.
    pub fn treasure_map(&self) -> Result<Vec<TreasureEntry>, SessionError> {
        match self.treasure_idx_map.as_deref() {
            None | Some("") => Ok(Vec::new()),
            Some(raw) => Ok(serde_json::from_str(raw)?),
        }
    }

    pub fn set_treasure_map(&mut self, entries: &[TreasureEntry]) -> Result<(), SessionError> {
        self.treasure_idx_map = Some(serde_json::to_string(entries)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_types_sort_in_opposite_directions() {
        assert_eq!(SessionType::Alpha.sort_order(), SortOrder::Ascending);
        assert_eq!(SessionType::Beta.sort_order(), SortOrder::Descending);
        assert_eq!(SortOrder::Descending.as_sql(), "DESC");
    }

    #[test]
    fn test_treasure_map_parsing() {
        let mut session = UploadSession::new("genHash1", 500_000, SessionType::Alpha);
        assert!(session.treasure_map().unwrap().is_empty());

        session.treasure_idx_map = Some(
            r#"[{"sector": 1, "idx": 5, "key": "firstKey"},
                {"sector": 2, "idx": 78, "key": ""}]"#
                .to_string(),
        );
        let map = session.treasure_map().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[0].idx, 5);
        assert!(!map[0].is_buried());
        assert!(map[1].is_buried());

        session.set_treasure_map(&map[..1]).unwrap();
        assert_eq!(session.treasure_map().unwrap(), vec![map[0].clone()]);
    }

    #[test]
    fn test_malformed_treasure_map() {
        let mut session = UploadSession::new("genHash1", 1, SessionType::Beta);
        session.treasure_idx_map = Some("not json".to_string());
        assert!(matches!(
            session.treasure_map(),
            Err(SessionError::TreasureMap(_))
        ));
    }

    #[test]
    fn test_invalid_codes() {
        assert!(SessionType::try_from(7).is_err());
        assert_eq!(PaymentStatus::try_from(3).unwrap(), PaymentStatus::Paid);
        assert_eq!(
            TreasureStatus::try_from(TreasureStatus::Buried.code()).unwrap(),
            TreasureStatus::Buried
        );
    }
}
