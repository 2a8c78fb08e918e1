//! Process-local sequencer
//!
//! Nothing is persisted: once the process exits its nonces are forgotten, so
//! only use it for drives that will not be written again afterwards.

use std::sync::Mutex;

use sealfs_core::{NonceSequence, SealError, SealResult};

use crate::table::SequenceTable;
use crate::NonceSequencer;

#[derive(Debug, Default)]
pub struct MemorySequencer {
    table: Mutex<SequenceTable>,
}

impl MemorySequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record, for inspection.
    pub fn snapshot(&self) -> SealResult<SequenceTable> {
        Ok(self.locked()?.clone())
    }

    fn locked(&self) -> SealResult<std::sync::MutexGuard<'_, SequenceTable>> {
        self.table
            .lock()
            .map_err(|_| SealError::Sequence("sequence table lock poisoned".into()))
    }
}

impl NonceSequencer for MemorySequencer {
    fn create_sequence(&self, drive_id: &str, auth_id: &str) -> SealResult<()> {
        self.locked()?.create(drive_id, auth_id)
    }

    fn initialize_sequence(
        &self,
        drive_id: &str,
        auth_id: &str,
        start: u64,
        max: u64,
    ) -> SealResult<()> {
        self.locked()?.initialize(drive_id, auth_id, start, max)
    }

    fn set_max_nonce(&self, drive_id: &str, auth_id: &str, max: u64) -> SealResult<()> {
        self.locked()?.set_max(drive_id, auth_id, max)
    }

    fn next_nonce(&self, drive_id: &str) -> SealResult<u64> {
        self.locked()?.issue(drive_id)
    }

    fn revoke_sequence(&self, drive_id: &str) -> SealResult<()> {
        self.locked()?.revoke(drive_id)
    }

    fn get_sequence(&self, drive_id: &str) -> SealResult<Option<NonceSequence>> {
        Ok(self.locked()?.live(drive_id).cloned())
    }
}
