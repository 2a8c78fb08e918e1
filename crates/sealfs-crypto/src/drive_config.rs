//! Drive config codec
//!
//! ```text
//! [4: magic][1: version][24: salt][4: iterations, BE u32][16: master key IV]
//! [80: AES-CTR(master, IV) over drive key ‖ hash key ‖ drive id][32: HMAC-SHA256(hash key, blob)]
//! ```
//!
//! The signature is keyed by the hash key found *inside* the blob, so it can
//! only be checked after decryption, and nothing from the blob is trusted
//! until it verifies.

use sealfs_core::config::MAX_ITERATIONS;
use sealfs_core::{SealError, SealResult, DRIVE_ID_LENGTH};
use zeroize::Zeroize;

use crate::integrity::{hmac_sha256, tags_match};
use crate::kdf::MasterKey;
use crate::keys::DriveKey;
use crate::transform::CtrTransformer;
use crate::{HASH_SIZE, IV_SIZE, KEY_SIZE, MAGIC, SALT_SIZE, VERSION};

const BLOB_SIZE: usize = 2 * KEY_SIZE + DRIVE_ID_LENGTH;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveConfig {
    pub version: u8,
    pub salt: [u8; SALT_SIZE],
    pub iterations: u32,
    pub iv: [u8; IV_SIZE],
    pub encrypted_blob: [u8; BLOB_SIZE],
    pub signature: [u8; HASH_SIZE],
}

impl DriveConfig {
    pub const SIZE: usize = 4 + 1 + SALT_SIZE + 4 + IV_SIZE + BLOB_SIZE + HASH_SIZE;

    /// Encrypt and sign the drive keys under a password-derived master key.
    pub fn seal(
        key: &DriveKey,
        drive_id: &[u8; DRIVE_ID_LENGTH],
        salt: [u8; SALT_SIZE],
        iv: [u8; IV_SIZE],
    ) -> SealResult<Self> {
        let mut blob = [0u8; BLOB_SIZE];
        blob[..KEY_SIZE].copy_from_slice(key.drive_key());
        blob[KEY_SIZE..2 * KEY_SIZE].copy_from_slice(key.hash_key());
        blob[2 * KEY_SIZE..].copy_from_slice(drive_id);
        CtrTransformer::with_iv(key.master_key(), &iv).apply(&mut blob)?;

        let signature = hmac_sha256(key.hash_key(), &[&blob])?;
        Ok(Self {
            version: VERSION,
            salt,
            iterations: key.iterations(),
            iv,
            encrypted_blob: blob,
            signature,
        })
    }

    /// Decrypt the blob with `master` and verify its signature.
    ///
    /// Any failure is an authentication error; a wrong password and a
    /// tampered file look the same from here.
    pub fn open(&self, master: &MasterKey) -> SealResult<(DriveKey, [u8; DRIVE_ID_LENGTH])> {
        let mut blob = self.encrypted_blob;
        CtrTransformer::with_iv(master.as_bytes(), &self.iv).apply(&mut blob)?;

        let mut drive_key = [0u8; KEY_SIZE];
        let mut hash_key = [0u8; KEY_SIZE];
        let mut drive_id = [0u8; DRIVE_ID_LENGTH];
        drive_key.copy_from_slice(&blob[..KEY_SIZE]);
        hash_key.copy_from_slice(&blob[KEY_SIZE..2 * KEY_SIZE]);
        drive_id.copy_from_slice(&blob[2 * KEY_SIZE..]);
        blob.zeroize();

        let key = DriveKey::new(master, drive_key, hash_key, self.iterations);
        drive_key.zeroize();
        hash_key.zeroize();

        let expected = hmac_sha256(key.hash_key(), &[&self.encrypted_blob])?;
        if !tags_match(&expected, &self.signature) {
            return Err(SealError::Auth("wrong password".into()));
        }
        Ok((key, drive_id))
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut at = 0;
        for part in [
            &MAGIC[..],
            &[self.version][..],
            &self.salt[..],
            &self.iterations.to_be_bytes()[..],
            &self.iv[..],
            &self.encrypted_blob[..],
            &self.signature[..],
        ] {
            out[at..at + part.len()].copy_from_slice(part);
            at += part.len();
        }
        out
    }

    pub fn parse(bytes: &[u8]) -> SealResult<Self> {
        if bytes.len() != Self::SIZE {
            return Err(SealError::Format(format!(
                "drive config is {} bytes (expected {})",
                bytes.len(),
                Self::SIZE
            )));
        }
        if bytes[..4] != MAGIC {
            return Err(SealError::Format("drive config has bad magic bytes".into()));
        }
        let version = bytes[4];
        if version != VERSION {
            return Err(SealError::Format(format!(
                "unsupported drive config version {version}"
            )));
        }

        let mut rest = &bytes[5..];
        let mut take = |n: usize| {
            let (head, tail) = rest.split_at(n);
            rest = tail;
            head
        };
        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(take(SALT_SIZE));
        let mut iterations = [0u8; 4];
        iterations.copy_from_slice(take(4));
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(take(IV_SIZE));
        let mut encrypted_blob = [0u8; BLOB_SIZE];
        encrypted_blob.copy_from_slice(take(BLOB_SIZE));
        let mut signature = [0u8; HASH_SIZE];
        signature.copy_from_slice(take(HASH_SIZE));

        let iterations = u32::from_be_bytes(iterations);
        // checked before any key derivation, since the field is not signed
        if iterations == 0 || iterations > MAX_ITERATIONS {
            return Err(SealError::Format(format!(
                "drive config iterations {iterations} outside 1..={MAX_ITERATIONS}"
            )));
        }
        Ok(Self {
            version,
            salt,
            iterations,
            iv,
            encrypted_blob,
            signature,
        })
    }
}
