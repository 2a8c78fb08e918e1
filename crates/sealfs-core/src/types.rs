use serde::{Deserialize, Serialize};

/// Lifecycle of a nonce sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceStatus {
    /// Created, waiting for a nonce range
    New,
    /// Range assigned, nonces may be issued
    Active,
    /// Permanently disabled
    Revoked,
}

/// One device's slice of a drive's nonce space.
///
/// Keyed by `(drive_id, auth_id)`, both lowercase hex. `next_nonce` only moves
/// forward and never passes `max_nonce` (exclusive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceSequence {
    pub drive_id: String,
    pub auth_id: String,
    #[serde(default)]
    pub start_nonce: Option<u64>,
    #[serde(default)]
    pub next_nonce: Option<u64>,
    #[serde(default)]
    pub max_nonce: Option<u64>,
    pub status: SequenceStatus,
}

impl NonceSequence {
    pub fn new(drive_id: impl Into<String>, auth_id: impl Into<String>) -> Self {
        Self {
            drive_id: drive_id.into(),
            auth_id: auth_id.into(),
            start_nonce: None,
            next_nonce: None,
            max_nonce: None,
            status: SequenceStatus::New,
        }
    }

    /// Store key: `"{drive_id}:{auth_id}"`
    pub fn key(&self) -> String {
        sequence_key(&self.drive_id, &self.auth_id)
    }

    /// New or Active, i.e. not revoked
    pub fn is_live(&self) -> bool {
        matches!(self.status, SequenceStatus::New | SequenceStatus::Active)
    }

    /// Nonces left before the range is exhausted
    pub fn remaining(&self) -> Option<u64> {
        match (self.next_nonce, self.max_nonce) {
            (Some(next), Some(max)) => Some(max.saturating_sub(next)),
            _ => None,
        }
    }
}

pub fn sequence_key(drive_id: &str, auth_id: &str) -> String {
    format!("{drive_id}:{auth_id}")
}

/// Lowercase hex encoding for drive and auth ids
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decode lowercase or uppercase hex; `None` on odd length or bad digits.
pub fn from_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}
