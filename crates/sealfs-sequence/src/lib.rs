//! sealfs-sequence: nonce issuance for sealfs drives
//!
//! Every device writing to a drive owns one sequence, keyed by
//! `(drive_id, auth_id)`, holding a half-open nonce range `[next, max)`.
//! Ranges of different devices never overlap, so two writers sharing the
//! same drive key can never reuse a CTR nonce.
//!
//! Two stores are available:
//!   - **File** (default): JSON document rewritten atomically via temp+rename
//!     after every mutation, before the nonce is handed out.
//!   - **Memory**: process-local, for tests and throwaway drives.
//!
//! Both implement `NonceSequencer` and share the transitions in `table`.

pub mod file;
pub mod memory;
pub mod serializer;
pub mod table;

pub use file::FileSequencer;
pub use memory::MemorySequencer;
pub use serializer::{JsonSequenceSerializer, SequenceSerializer};
pub use table::SequenceTable;

use sealfs_core::{NonceSequence, SealResult};

/// Issues nonces for drives, one live sequence per drive on this device.
///
/// Implementations must make `next_nonce` atomic across threads and persist
/// the advanced counter before returning.
pub trait NonceSequencer: Send + Sync {
    /// Register a `New` sequence with no range yet.
    fn create_sequence(&self, drive_id: &str, auth_id: &str) -> SealResult<()>;

    /// Assign `[start, max)` to a `New` sequence and make it `Active`.
    fn initialize_sequence(&self, drive_id: &str, auth_id: &str, start: u64, max: u64)
        -> SealResult<()>;

    /// Shrink the upper bound of a sequence.
    fn set_max_nonce(&self, drive_id: &str, auth_id: &str, max: u64) -> SealResult<()>;

    /// Hand out the next nonce of the drive's active sequence.
    fn next_nonce(&self, drive_id: &str) -> SealResult<u64>;

    /// Permanently disable the drive's live sequence.
    fn revoke_sequence(&self, drive_id: &str) -> SealResult<()>;

    /// The drive's live (`New` or `Active`) sequence, if any.
    fn get_sequence(&self, drive_id: &str) -> SealResult<Option<NonceSequence>>;
}
