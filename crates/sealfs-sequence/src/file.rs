//! File-backed sequencer
//!
//! The whole table is re-read before and rewritten after every mutation.
//! Writes are atomic (temp file, then rename) so a crash leaves either the
//! old or the new table, never a torn one. `next_nonce` returns only after
//! the advanced counter is on disk.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sealfs_core::{NonceSequence, SealError, SealResult};

use crate::serializer::{JsonSequenceSerializer, SequenceSerializer};
use crate::table::SequenceTable;
use crate::NonceSequencer;

pub struct FileSequencer {
    path: PathBuf,
    serializer: Box<dyn SequenceSerializer>,
    lock: Mutex<()>,
}

impl FileSequencer {
    /// JSON store at `path`; the file is created on first mutation.
    pub fn open(path: &Path) -> Self {
        Self::with_serializer(path, Box::new(JsonSequenceSerializer))
    }

    pub fn with_serializer(path: &Path, serializer: Box<dyn SequenceSerializer>) -> Self {
        Self {
            path: path.to_path_buf(),
            serializer,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> SealResult<SequenceTable> {
        if !self.path.exists() {
            return Ok(SequenceTable::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        self.serializer.deserialize(&content)
    }

    fn save(&self, table: &SequenceTable) -> SealResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = self.serializer.serialize(table)?;

        // Atomic write: write to temp file, then rename
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Load, apply `op`, and persist when it succeeds, all under the lock.
    fn update<T>(&self, op: impl FnOnce(&mut SequenceTable) -> SealResult<T>) -> SealResult<T> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| SealError::Sequence("sequence store lock poisoned".into()))?;
        let mut table = self.load()?;
        let result = op(&mut table)?;
        self.save(&table)?;
        Ok(result)
    }
}

impl NonceSequencer for FileSequencer {
    fn create_sequence(&self, drive_id: &str, auth_id: &str) -> SealResult<()> {
        self.update(|t| t.create(drive_id, auth_id))?;
        tracing::info!(drive_id, auth_id, "created nonce sequence");
        Ok(())
    }

    fn initialize_sequence(
        &self,
        drive_id: &str,
        auth_id: &str,
        start: u64,
        max: u64,
    ) -> SealResult<()> {
        self.update(|t| t.initialize(drive_id, auth_id, start, max))?;
        tracing::info!(drive_id, auth_id, start, max, "initialized nonce sequence");
        Ok(())
    }

    fn set_max_nonce(&self, drive_id: &str, auth_id: &str, max: u64) -> SealResult<()> {
        self.update(|t| t.set_max(drive_id, auth_id, max))?;
        tracing::debug!(drive_id, auth_id, max, "shrunk nonce range");
        Ok(())
    }

    fn next_nonce(&self, drive_id: &str) -> SealResult<u64> {
        self.update(|t| t.issue(drive_id))
    }

    fn revoke_sequence(&self, drive_id: &str) -> SealResult<()> {
        self.update(|t| t.revoke(drive_id))?;
        tracing::warn!(drive_id, "revoked nonce sequence");
        Ok(())
    }

    fn get_sequence(&self, drive_id: &str) -> SealResult<Option<NonceSequence>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| SealError::Sequence("sequence store lock poisoned".into()))?;
        Ok(self.load()?.live(drive_id).cloned())
    }
}

impl std::fmt::Debug for FileSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSequencer")
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seq.json");
        {
            let seq = FileSequencer::open(&path);
            seq.create_sequence("d", "a").unwrap();
            seq.initialize_sequence("d", "a", 1, 4).unwrap();
            assert_eq!(seq.next_nonce("d").unwrap(), 1);
        }
        let seq = FileSequencer::open(&path);
        assert_eq!(seq.next_nonce("d").unwrap(), 2);
        assert_eq!(seq.next_nonce("d").unwrap(), 3);
        assert!(seq.next_nonce("d").unwrap_err().is_range_exceeded());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_failed_op_does_not_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/seq.json");
        let seq = FileSequencer::open(&path);
        assert!(seq.next_nonce("d").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_concurrent_callers_get_unique_nonces() {
        let dir = tempfile::tempdir().unwrap();
        let seq = Arc::new(FileSequencer::open(&dir.path().join("seq.json")));
        seq.create_sequence("d", "a").unwrap();
        seq.initialize_sequence("d", "a", 0, 1000).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let seq = Arc::clone(&seq);
                std::thread::spawn(move || {
                    (0..25).map(|_| seq.next_nonce("d").unwrap()).collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 100);
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_get_sequence_reports_live_record() {
        let dir = tempfile::tempdir().unwrap();
        let seq = FileSequencer::open(&dir.path().join("seq.json"));
        assert!(seq.get_sequence("d").unwrap().is_none());
        seq.create_sequence("d", "a").unwrap();
        let record = seq.get_sequence("d").unwrap().unwrap();
        assert_eq!(record.auth_id, "a");
        seq.revoke_sequence("d").unwrap();
        assert!(seq.get_sequence("d").unwrap().is_none());
    }
}
