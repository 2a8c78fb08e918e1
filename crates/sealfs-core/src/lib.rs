pub mod config;
pub mod error;
pub mod types;

pub use error::{SealError, SealResult};
pub use types::{NonceSequence, SequenceStatus};

/// Length of a drive identifier in bytes
pub const DRIVE_ID_LENGTH: usize = 16;

/// Length of an authorization identifier in bytes
pub const AUTH_ID_LENGTH: usize = 16;

/// Length of a file nonce in bytes
pub const NONCE_LENGTH: usize = 8;

/// First nonce handed out by a freshly created drive
pub const DEFAULT_START_NONCE: u64 = 0;

/// Exclusive upper bound of a freshly created drive's nonce range
pub const DEFAULT_MAX_NONCE: u64 = i64::MAX as u64;
