//! Seekable AES-256-CTR keystream
//!
//! Counter block = 8-byte nonce ‖ 64-bit big-endian block counter starting at
//! zero, so the keystream for byte `p` sits in block `p / 16` and any offset
//! can be reached without touching the bytes before it.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use sealfs_core::{SealError, SealResult};

use crate::nonce::Nonce;
use crate::{IV_SIZE, KEY_SIZE};

type Aes256Ctr = ctr::Ctr64BE<Aes256>;

pub struct CtrTransformer {
    cipher: Aes256Ctr,
}

impl CtrTransformer {
    /// Keystream for file contents: counter block is `nonce ‖ 0u64`.
    pub fn new(key: &[u8; KEY_SIZE], nonce: &Nonce) -> Self {
        let mut iv = [0u8; IV_SIZE];
        iv[..nonce.len()].copy_from_slice(nonce);
        Self::with_iv(key, &iv)
    }

    /// Keystream over a caller-chosen full counter block (drive config blob).
    pub fn with_iv(key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE]) -> Self {
        Self {
            cipher: Aes256Ctr::new(key.into(), iv.into()),
        }
    }

    /// Position the keystream at plaintext byte `position`.
    pub fn seek(&mut self, position: u64) -> SealResult<()> {
        self.cipher.try_seek(position).map_err(|_| {
            SealError::RangeExceeded(format!("CTR counter overflow at byte {position}"))
        })
    }

    /// XOR `data` with the keystream at the current position.
    pub fn apply(&mut self, data: &mut [u8]) -> SealResult<()> {
        self.cipher
            .try_apply_keystream(data)
            .map_err(|_| SealError::RangeExceeded("CTR keystream exhausted".into()))
    }

    /// Seek then apply, the common case for random access.
    pub fn apply_at(&mut self, position: u64, data: &mut [u8]) -> SealResult<()> {
        self.seek(position)?;
        self.apply(data)
    }
}
