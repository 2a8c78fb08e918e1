//! Nonce arithmetic shared by the sequencer and the authorization hand-off
//!
//! Nonces are 8 bytes on disk (big-endian) and `u64` everywhere else.

use sealfs_core::{SealError, SealResult, NONCE_LENGTH};

pub type Nonce = [u8; NONCE_LENGTH];

pub fn nonce_to_u64(nonce: &Nonce) -> u64 {
    u64::from_be_bytes(*nonce)
}

pub fn nonce_from_u64(value: u64) -> Nonce {
    value.to_be_bytes()
}

/// Parse a caller-supplied nonce, rejecting anything that is not exactly 8 bytes.
pub fn nonce_from_slice(bytes: &[u8]) -> SealResult<Nonce> {
    bytes.try_into().map_err(|_| {
        SealError::Security(format!(
            "nonce must be {NONCE_LENGTH} bytes, got {}",
            bytes.len()
        ))
    })
}

/// Advance `next` by one, refusing to reach or pass `max`.
pub fn increase_nonce(next: u64, max: u64) -> SealResult<u64> {
    let bumped = next
        .checked_add(1)
        .ok_or_else(|| SealError::RangeExceeded("nonce counter overflow".into()))?;
    if bumped > max {
        return Err(SealError::RangeExceeded(format!(
            "nonce {next} is the last one below max {max}"
        )));
    }
    Ok(bumped)
}

/// Pick the pivot that splits `[next, max)` between two devices.
///
/// Midpoint, rounded down. The lower device keeps `[next, pivot)` and the
/// other receives `[pivot, max)`; both halves hold at least one nonce.
pub fn split_nonce_range(next: u64, max: u64) -> SealResult<u64> {
    if max <= next || max - next < 2 {
        return Err(SealError::RangeExceeded(format!(
            "range [{next}, {max}) is too small to split"
        )));
    }
    Ok(next + (max - next) / 2)
}
