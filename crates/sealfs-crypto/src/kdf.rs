//! Key derivation: PBKDF2-HMAC-SHA256 password → master key

use pbkdf2::pbkdf2_hmac;
use secrecy::{ExposeSecret, SecretString};
use sealfs_core::config::MAX_ITERATIONS;
use sealfs_core::{SealError, SealResult};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{KEY_SIZE, SALT_SIZE};

/// A 256-bit master key derived from a password via PBKDF2.
///
/// Only ever used to decrypt the drive config blob. Zeroized on drop.
#[derive(Clone)]
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive a 256-bit master key from a password and the drive salt.
///
/// The salt is stored in clear in the drive config; `iterations` comes from
/// the same record so older drives keep working after the default changes.
pub fn derive_master_key(
    password: &SecretString,
    salt: &[u8; SALT_SIZE],
    iterations: u32,
) -> SealResult<MasterKey> {
    if iterations == 0 || iterations > MAX_ITERATIONS {
        return Err(SealError::Security(format!(
            "PBKDF2 iterations must be between 1 and {MAX_ITERATIONS}"
        )));
    }
    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(
        password.expose_secret().as_bytes(),
        salt,
        iterations,
        &mut key,
    );
    Ok(MasterKey::from_bytes(key))
}
