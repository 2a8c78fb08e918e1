//! Chunked HMAC-SHA256 integrity
//!
//! Each chunk of ciphertext is followed by a 32-byte tag:
//! ```text
//! tag_i = HMAC-SHA256(hash_key, header ‖ chunk_index (8 bytes, BE) ‖ ciphertext_i)
//! ```
//! The header binds every tag to this file's nonce and chunk size, the index
//! binds it to its position so chunks cannot be reordered.

use hmac::{Hmac, Mac};
use sealfs_core::config::{validate_chunk_size, MAX_CHUNK_SIZE};
use sealfs_core::{SealError, SealResult};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::header::FileHeader;
use crate::{HASH_SIZE, KEY_SIZE};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 over the concatenation of `parts`.
pub fn hmac_sha256(key: &[u8; KEY_SIZE], parts: &[&[u8]]) -> SealResult<[u8; HASH_SIZE]> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| SealError::Security(format!("invalid HMAC key: {e}")))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().into())
}

/// Constant-time comparison of two tags
pub fn tags_match(expected: &[u8], actual: &[u8]) -> bool {
    expected.len() == actual.len() && bool::from(expected.ct_eq(actual))
}

/// Integrity parameters for one stream.
///
/// `chunk_size == 0` means the file has no tags at all.
#[derive(Clone)]
pub struct Integrity {
    chunk_size: u32,
    hash_key: Option<Zeroizing<[u8; KEY_SIZE]>>,
}

impl Integrity {
    /// No tags written or checked.
    pub fn disabled() -> Self {
        Self {
            chunk_size: 0,
            hash_key: None,
        }
    }

    pub fn new(chunk_size: u32, hash_key: &[u8; KEY_SIZE]) -> SealResult<Self> {
        validate_chunk_size(chunk_size).map_err(|_| {
            SealError::Security(format!(
                "invalid chunk size {chunk_size}: must be a multiple of 16 up to {MAX_CHUNK_SIZE}"
            ))
        })?;
        if chunk_size == 0 {
            return Err(SealError::Security(
                "integrity requires a non-zero chunk size".into(),
            ));
        }
        Ok(Self {
            chunk_size,
            hash_key: Some(Zeroizing::new(*hash_key)),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.chunk_size > 0
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Tag for chunk `index` of the file described by `header`.
    pub fn chunk_tag(
        &self,
        header: &FileHeader,
        index: u64,
        ciphertext: &[u8],
    ) -> SealResult<[u8; HASH_SIZE]> {
        let key = self
            .hash_key
            .as_ref()
            .ok_or_else(|| SealError::Security("integrity enabled without a hash key".into()))?;
        hmac_sha256(key, &[&header.to_bytes(), &index.to_be_bytes(), ciphertext])
    }

    /// Recompute and compare the tag of chunk `index`.
    pub fn verify_chunk(
        &self,
        header: &FileHeader,
        index: u64,
        ciphertext: &[u8],
        stored: &[u8],
    ) -> SealResult<()> {
        let expected = self.chunk_tag(header, index, ciphertext)?;
        if !tags_match(&expected, stored) {
            return Err(SealError::Integrity(format!("chunk {index} failed verification")));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Integrity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Integrity")
            .field("chunk_size", &self.chunk_size)
            .field("hash_key", &self.hash_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Real (on-disk) length of a file holding `plain_len` bytes.
pub fn encrypted_len(plain_len: u64, chunk_size: u32) -> u64 {
    let header = FileHeader::SIZE as u64;
    if chunk_size == 0 || plain_len == 0 {
        return header + plain_len;
    }
    let chunks = plain_len.div_ceil(chunk_size as u64);
    header + plain_len + chunks * HASH_SIZE as u64
}

/// Plaintext length of a file whose real length is `real_len`.
///
/// A trailing fragment too short to hold a tag contributes nothing.
pub fn plaintext_len(real_len: u64, chunk_size: u32) -> u64 {
    let header = FileHeader::SIZE as u64;
    if real_len <= header {
        return 0;
    }
    let body = real_len - header;
    if chunk_size == 0 {
        return body;
    }
    let stride = chunk_size as u64 + HASH_SIZE as u64;
    let full = body / stride;
    let rem = body % stride;
    full * chunk_size as u64 + rem.saturating_sub(HASH_SIZE as u64)
}
