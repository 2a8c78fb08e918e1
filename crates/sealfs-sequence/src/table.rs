//! Sequence records and their legal transitions

use std::collections::BTreeMap;

use sealfs_core::types::sequence_key;
use sealfs_core::{NonceSequence, SealError, SealResult, SequenceStatus};
use sealfs_crypto::increase_nonce;

/// All sequences known to one store, keyed `"{drive_id}:{auth_id}"`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceTable {
    entries: BTreeMap<String, NonceSequence>,
}

impl SequenceTable {
    pub fn from_sequences(sequences: impl IntoIterator<Item = NonceSequence>) -> Self {
        Self {
            entries: sequences.into_iter().map(|s| (s.key(), s)).collect(),
        }
    }

    pub fn sequences(&self) -> impl Iterator<Item = &NonceSequence> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, drive_id: &str, auth_id: &str) -> Option<&NonceSequence> {
        self.entries.get(&sequence_key(drive_id, auth_id))
    }

    /// The single New/Active sequence for `drive_id`.
    pub fn live(&self, drive_id: &str) -> Option<&NonceSequence> {
        self.entries
            .values()
            .find(|s| s.drive_id == drive_id && s.is_live())
    }

    fn live_mut(&mut self, drive_id: &str) -> Option<&mut NonceSequence> {
        self.entries
            .values_mut()
            .find(|s| s.drive_id == drive_id && s.is_live())
    }

    pub fn create(&mut self, drive_id: &str, auth_id: &str) -> SealResult<()> {
        if self.live(drive_id).is_some() {
            return Err(SealError::Sequence(format!(
                "drive {drive_id} already has a sequence"
            )));
        }
        let key = sequence_key(drive_id, auth_id);
        if self.entries.contains_key(&key) {
            return Err(SealError::Sequence(format!(
                "authorization {auth_id} was already used for drive {drive_id}"
            )));
        }
        self.entries.insert(key, NonceSequence::new(drive_id, auth_id));
        Ok(())
    }

    pub fn initialize(&mut self, drive_id: &str, auth_id: &str, start: u64, max: u64) -> SealResult<()> {
        if start >= max {
            return Err(SealError::Sequence(format!(
                "empty nonce range [{start}, {max})"
            )));
        }
        let seq = self
            .entries
            .get_mut(&sequence_key(drive_id, auth_id))
            .ok_or_else(|| SealError::Sequence(format!("no sequence for {drive_id}:{auth_id}")))?;
        if seq.status != SequenceStatus::New || seq.next_nonce.is_some() {
            return Err(SealError::Sequence(format!(
                "sequence {drive_id}:{auth_id} is already initialized"
            )));
        }
        seq.start_nonce = Some(start);
        seq.next_nonce = Some(start);
        seq.max_nonce = Some(max);
        seq.status = SequenceStatus::Active;
        Ok(())
    }

    pub fn set_max(&mut self, drive_id: &str, auth_id: &str, max: u64) -> SealResult<()> {
        let seq = self
            .entries
            .get_mut(&sequence_key(drive_id, auth_id))
            .ok_or_else(|| SealError::Sequence(format!("no sequence for {drive_id}:{auth_id}")))?;
        if seq.status == SequenceStatus::Revoked {
            return Err(SealError::Sequence("sequence is revoked".into()));
        }
        if let Some(current) = seq.max_nonce {
            if max > current {
                return Err(SealError::Sequence(format!(
                    "max nonce can only shrink ({current} -> {max})"
                )));
            }
        }
        if let Some(next) = seq.next_nonce {
            if max < next {
                return Err(SealError::Sequence(format!(
                    "max nonce {max} is below the next nonce {next}"
                )));
            }
        }
        seq.max_nonce = Some(max);
        Ok(())
    }

    /// Return the current nonce and advance the counter.
    pub fn issue(&mut self, drive_id: &str) -> SealResult<u64> {
        let seq = self
            .live_mut(drive_id)
            .ok_or_else(|| SealError::Auth("device not authorized: no sequence for drive".into()))?;
        let (Some(next), Some(max)) = (seq.next_nonce, seq.max_nonce) else {
            return Err(SealError::Auth("device not authorized".into()));
        };
        if seq.status != SequenceStatus::Active {
            return Err(SealError::Auth("device not authorized".into()));
        }
        if next >= max {
            return Err(SealError::RangeExceeded(format!(
                "sequence for drive {drive_id} is exhausted at {next}"
            )));
        }
        seq.next_nonce = Some(increase_nonce(next, max)?);
        Ok(next)
    }

    pub fn revoke(&mut self, drive_id: &str) -> SealResult<()> {
        let seq = self
            .live_mut(drive_id)
            .ok_or_else(|| SealError::Sequence(format!("no live sequence for drive {drive_id}")))?;
        seq.status = SequenceStatus::Revoked;
        Ok(())
    }
}
