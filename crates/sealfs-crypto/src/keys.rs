//! Drive key material and random identifier generation

use rand::RngCore;
use sealfs_core::{AUTH_ID_LENGTH, DRIVE_ID_LENGTH};
use zeroize::Zeroize;

use crate::kdf::MasterKey;
use crate::{IV_SIZE, KEY_SIZE, SALT_SIZE};

/// Key material held by an unlocked drive.
///
/// `drive_key` encrypts contents and filenames, `hash_key` keys every HMAC.
/// Cleared when the drive locks and zeroized on drop.
#[derive(Clone)]
pub struct DriveKey {
    master_key: [u8; KEY_SIZE],
    drive_key: [u8; KEY_SIZE],
    hash_key: [u8; KEY_SIZE],
    iterations: u32,
}

impl DriveKey {
    pub fn new(
        master: &MasterKey,
        drive_key: [u8; KEY_SIZE],
        hash_key: [u8; KEY_SIZE],
        iterations: u32,
    ) -> Self {
        Self {
            master_key: *master.as_bytes(),
            drive_key,
            hash_key,
            iterations,
        }
    }

    /// Split a freshly generated 512-bit combined key into drive and hash halves.
    pub fn from_combined(master: &MasterKey, combined: &[u8; 2 * KEY_SIZE], iterations: u32) -> Self {
        let mut drive_key = [0u8; KEY_SIZE];
        let mut hash_key = [0u8; KEY_SIZE];
        drive_key.copy_from_slice(&combined[..KEY_SIZE]);
        hash_key.copy_from_slice(&combined[KEY_SIZE..]);
        Self::new(master, drive_key, hash_key, iterations)
    }

    pub fn master_key(&self) -> &[u8; KEY_SIZE] {
        &self.master_key
    }

    pub fn drive_key(&self) -> &[u8; KEY_SIZE] {
        &self.drive_key
    }

    pub fn hash_key(&self) -> &[u8; KEY_SIZE] {
        &self.hash_key
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Replace the master key after a password change.
    pub fn set_master_key(&mut self, master: &MasterKey, iterations: u32) {
        self.master_key = *master.as_bytes();
        self.iterations = iterations;
    }

    /// Overwrite every key with zeros.
    pub fn clear(&mut self) {
        self.master_key.zeroize();
        self.drive_key.zeroize();
        self.hash_key.zeroize();
        self.iterations = 0;
    }
}

impl Drop for DriveKey {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for DriveKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveKey")
            .field("keys", &"[REDACTED]")
            .field("iterations", &self.iterations)
            .finish()
    }
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Random drive key ‖ hash key for a new drive.
pub fn generate_combined_key() -> [u8; 2 * KEY_SIZE] {
    random_bytes()
}

pub fn generate_drive_id() -> [u8; DRIVE_ID_LENGTH] {
    random_bytes()
}

pub fn generate_auth_id() -> [u8; AUTH_ID_LENGTH] {
    random_bytes()
}

pub fn generate_salt() -> [u8; SALT_SIZE] {
    random_bytes()
}

pub fn generate_master_key_iv() -> [u8; IV_SIZE] {
    random_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_key_split() {
        let master = MasterKey::from_bytes([9u8; KEY_SIZE]);
        let mut combined = [0u8; 2 * KEY_SIZE];
        combined[..KEY_SIZE].fill(1);
        combined[KEY_SIZE..].fill(2);

        let key = DriveKey::from_combined(&master, &combined, 100);
        assert_eq!(key.drive_key(), &[1u8; KEY_SIZE]);
        assert_eq!(key.hash_key(), &[2u8; KEY_SIZE]);
        assert_eq!(key.master_key(), &[9u8; KEY_SIZE]);
        assert_eq!(key.iterations(), 100);
    }

    #[test]
    fn test_clear_zeroes_everything() {
        let master = MasterKey::from_bytes([9u8; KEY_SIZE]);
        let mut key = DriveKey::new(&master, [1u8; KEY_SIZE], [2u8; KEY_SIZE], 100);
        key.clear();

        assert_eq!(key.master_key(), &[0u8; KEY_SIZE]);
        assert_eq!(key.drive_key(), &[0u8; KEY_SIZE]);
        assert_eq!(key.hash_key(), &[0u8; KEY_SIZE]);
        assert_eq!(key.iterations(), 0);
    }

    #[test]
    fn test_random_ids_differ() {
        assert_ne!(generate_drive_id(), generate_drive_id());
        assert_ne!(generate_auth_id(), generate_auth_id());
        assert_ne!(generate_combined_key(), generate_combined_key());
    }

    #[test]
    fn test_debug_redacted() {
        let master = MasterKey::from_bytes([0xAB; KEY_SIZE]);
        let key = DriveKey::new(&master, [0xCD; KEY_SIZE], [0xEF; KEY_SIZE], 5);
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("205"));
    }
}
