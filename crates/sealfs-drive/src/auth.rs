//! Authorization hand-off between devices
//!
//! Device B asks for write access by showing its auth id (`Drive::auth_id`).
//! Device A, already active, splits its remaining range at a pivot, keeps the
//! lower half and exports the upper half for that id in an auth file,
//! encrypted with the drive key. B imports the file and its sequence becomes
//! active on `[pivot, max)`. The payload is tagged with the drive hash key
//! so a modified auth file is refused before its range is applied.

use std::io::{Read, Write};

use sealfs_core::types::{from_hex, to_hex};
use sealfs_core::{SealError, SealResult, SequenceStatus, AUTH_ID_LENGTH, DRIVE_ID_LENGTH};
use sealfs_crypto::{generate_auth_id, split_nonce_range, AesStream, Integrity, StreamOptions};
use sealfs_storage::RealFileRef;

use crate::drive::Drive;

/// Integrity chunk size of auth files; the payload fits in one chunk.
const AUTH_CHUNK_SIZE: u32 = 64;

/// Decrypted payload of an auth file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthConfig {
    pub drive_id: [u8; DRIVE_ID_LENGTH],
    pub auth_id: [u8; AUTH_ID_LENGTH],
    pub start_nonce: u64,
    pub max_nonce: u64,
}

impl AuthConfig {
    pub const SIZE: usize = DRIVE_ID_LENGTH + AUTH_ID_LENGTH + 8 + 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..16].copy_from_slice(&self.drive_id);
        out[16..32].copy_from_slice(&self.auth_id);
        out[32..40].copy_from_slice(&self.start_nonce.to_be_bytes());
        out[40..48].copy_from_slice(&self.max_nonce.to_be_bytes());
        out
    }

    pub fn parse(bytes: &[u8]) -> SealResult<Self> {
        if bytes.len() != Self::SIZE {
            return Err(SealError::Format(format!(
                "auth config must be {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            )));
        }
        let mut drive_id = [0u8; DRIVE_ID_LENGTH];
        let mut auth_id = [0u8; AUTH_ID_LENGTH];
        let mut start = [0u8; 8];
        let mut max = [0u8; 8];
        drive_id.copy_from_slice(&bytes[..16]);
        auth_id.copy_from_slice(&bytes[16..32]);
        start.copy_from_slice(&bytes[32..40]);
        max.copy_from_slice(&bytes[40..48]);
        let config = Self {
            drive_id,
            auth_id,
            start_nonce: u64::from_be_bytes(start),
            max_nonce: u64::from_be_bytes(max),
        };
        if config.start_nonce >= config.max_nonce || config.max_nonce > i64::MAX as u64 {
            return Err(SealError::Format(format!(
                "auth config range [{}, {}) is empty or out of bounds",
                config.start_nonce, config.max_nonce
            )));
        }
        Ok(config)
    }
}

impl Drive {
    /// This device's auth id for the drive, requesting one if needed.
    ///
    /// A device with no sequence gets a `New` one under a random id; hand that
    /// id to an active device so it can export an auth file for it.
    pub fn auth_id(&self) -> SealResult<String> {
        let drive_id = self.drive_id_hex()?;
        if let Some(seq) = self.sequencer().get_sequence(&drive_id)? {
            return Ok(seq.auth_id);
        }
        let auth_id = to_hex(&generate_auth_id());
        self.sequencer().create_sequence(&drive_id, &auth_id)?;
        tracing::info!(drive_id = %drive_id, auth_id = %auth_id, "requested authorization");
        Ok(auth_id)
    }

    /// Permanently give up this device's write authorization.
    pub fn revoke_authorization(&self) -> SealResult<()> {
        let drive_id = self.drive_id_hex()?;
        self.sequencer().revoke_sequence(&drive_id)?;
        tracing::info!(drive_id = %drive_id, "revoked authorization");
        Ok(())
    }

    /// Default location of the auth file: `share/<auth_config_filename>`.
    pub fn auth_file(&self) -> SealResult<RealFileRef> {
        Ok(self
            .share_dir()?
            .child(&self.settings().auth_config_filename))
    }

    /// Give the upper half of this device's range to `target_auth_id`.
    ///
    /// Our own max shrinks to the pivot before anything is written, so a
    /// failure after that point loses nonces but never shares them.
    pub fn export_auth_file(&self, target_auth_id: &str, file: &RealFileRef) -> SealResult<AuthConfig> {
        let drive_hex = self.drive_id_hex()?;
        let drive_id = self
            .drive_id()
            .ok_or_else(|| SealError::Auth("drive is locked".into()))?;
        let seq = self
            .sequencer()
            .get_sequence(&drive_hex)?
            .filter(|s| s.status == SequenceStatus::Active)
            .ok_or_else(|| SealError::Auth("device not authorized".into()))?;
        let (Some(next), Some(max)) = (seq.next_nonce, seq.max_nonce) else {
            return Err(SealError::Auth("device has no nonce range".into()));
        };
        let target: [u8; AUTH_ID_LENGTH] = from_hex(target_auth_id)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| {
                SealError::Format(format!("invalid auth id {target_auth_id:?}"))
            })?;
        if to_hex(&target) == seq.auth_id {
            return Err(SealError::Auth("cannot authorize this device's own auth id".into()));
        }

        let pivot = split_nonce_range(next, max)?;
        self.sequencer().set_max_nonce(&drive_hex, &seq.auth_id, pivot)?;
        let config = AuthConfig {
            drive_id,
            auth_id: target,
            start_nonce: pivot,
            max_nonce: max,
        };

        let nonce = self.next_nonce()?;
        let keys = self.content_keys()?;
        if file.exists() {
            file.delete()?;
        }
        let parent = file
            .parent()
            .ok_or_else(|| SealError::not_found(format!("parent of {}", file.path())))?;
        let real = parent.create_file(&file.name())?;
        let mut out = AesStream::encrypt(
            &keys.drive_key,
            nonce,
            Integrity::new(AUTH_CHUNK_SIZE, &keys.hash_key)?,
            real.output_stream()?,
            StreamOptions::default(),
        )?;
        out.write_all(&config.to_bytes())?;
        out.flush()?;

        tracing::info!(
            drive_id = %drive_hex,
            auth_id = %target_auth_id,
            pivot,
            max,
            "exported authorization"
        );
        Ok(config)
    }

    /// Activate this device's requested sequence from an auth file.
    pub fn import_auth_file(&self, file: &RealFileRef) -> SealResult<()> {
        let drive_hex = self.drive_id_hex()?;
        let drive_id = self
            .drive_id()
            .ok_or_else(|| SealError::Auth("drive is locked".into()))?;
        let seq = match self.sequencer().get_sequence(&drive_hex)? {
            Some(seq) if seq.status == SequenceStatus::Active => {
                return Err(SealError::Auth("device is already authorized".into()))
            }
            Some(seq) => seq,
            None => return Err(SealError::Auth("no authorization was requested".into())),
        };
        if !file.is_file() {
            return Err(SealError::not_found(file.path()));
        }

        let keys = self.content_keys()?;
        let mut stream = AesStream::decrypt(
            &keys.drive_key,
            Some(&*keys.hash_key),
            file.input_stream()?,
            StreamOptions::default(),
        )?;
        let mut bytes = Vec::with_capacity(AuthConfig::SIZE);
        stream.read_to_end(&mut bytes)?;
        let config = AuthConfig::parse(&bytes)?;

        if config.drive_id != drive_id {
            return Err(SealError::Auth("auth file belongs to another drive".into()));
        }
        if to_hex(&config.auth_id) != seq.auth_id {
            return Err(SealError::Auth(
                "auth file was issued for another device".into(),
            ));
        }
        self.sequencer().initialize_sequence(
            &drive_hex,
            &seq.auth_id,
            config.start_nonce,
            config.max_nonce,
        )?;
        tracing::info!(
            drive_id = %drive_hex,
            auth_id = %seq.auth_id,
            start = config.start_nonce,
            max = config.max_nonce,
            "imported authorization"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealfs_core::config::DriveSettings;
    use sealfs_sequence::{MemorySequencer, NonceSequencer};
    use sealfs_storage::LocalFile;
    use secrecy::SecretString;
    use std::sync::Arc;

    fn settings() -> DriveSettings {
        DriveSettings {
            kdf_iterations: 16,
            ..Default::default()
        }
    }

    #[test]
    fn test_auth_config_layout() {
        let config = AuthConfig {
            drive_id: [1; 16],
            auth_id: [2; 16],
            start_nonce: 52,
            max_nonce: 100,
        };
        let bytes = config.to_bytes();
        assert_eq!(bytes.len(), 48);
        assert_eq!(&bytes[32..40], &52u64.to_be_bytes());
        assert_eq!(AuthConfig::parse(&bytes).unwrap(), config);
        assert!(matches!(
            AuthConfig::parse(&bytes[..47]),
            Err(SealError::Format(_))
        ));
    }

    #[test]
    fn test_auth_config_rejects_bad_range() {
        let config = |start_nonce, max_nonce| AuthConfig {
            drive_id: [1; 16],
            auth_id: [2; 16],
            start_nonce,
            max_nonce,
        };
        for (start, max) in [(100, 100), (100, 52), (0, u64::MAX)] {
            let bytes = config(start, max).to_bytes();
            assert!(
                matches!(AuthConfig::parse(&bytes), Err(SealError::Format(_))),
                "[{start}, {max})"
            );
        }
    }

    #[test]
    fn test_tampered_auth_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let password = SecretString::from("pw");
        let drive_a = Drive::create(
            LocalFile::shared(dir.path()),
            &password,
            Arc::new(MemorySequencer::new()),
            settings(),
        )
        .unwrap();
        let seq_b = Arc::new(MemorySequencer::new());
        let drive_b = Drive::open(LocalFile::shared(dir.path()), seq_b.clone(), settings()).unwrap();
        drive_b.unlock(&password).unwrap();
        let auth_b = drive_b.auth_id().unwrap();

        let file = drive_a.auth_file().unwrap();
        drive_a.export_auth_file(&auth_b, &file).unwrap();
        let path = std::path::PathBuf::from(file.path());
        let mut raw = std::fs::read(&path).unwrap();
        assert_eq!(raw.len(), 17 + AuthConfig::SIZE + 32);
        // last byte of max_nonce
        raw[17 + AuthConfig::SIZE - 1] ^= 0x01;
        std::fs::write(&path, raw).unwrap();

        assert!(drive_b.import_auth_file(&file).unwrap_err().is_integrity());
        let live = seq_b.get_sequence(&drive_b.drive_id_hex().unwrap()).unwrap().unwrap();
        assert_eq!(live.status, SequenceStatus::New);
        assert!(drive_b.next_nonce().unwrap_err().is_auth());
    }

    #[test]
    fn test_second_device_is_not_authorized_until_import() {
        let dir = tempfile::tempdir().unwrap();
        let password = SecretString::from("pw");
        let drive_a = Drive::create(
            LocalFile::shared(dir.path()),
            &password,
            Arc::new(MemorySequencer::new()),
            settings(),
        )
        .unwrap();

        let drive_b =
            Drive::open(LocalFile::shared(dir.path()), Arc::new(MemorySequencer::new()), settings())
                .unwrap();
        drive_b.unlock(&password).unwrap();
        assert!(drive_b.next_nonce().unwrap_err().is_auth());
        assert!(drive_b.root().create_file("x").unwrap_err().is_auth());

        let auth_b = drive_b.auth_id().unwrap();
        assert_eq!(auth_b.len(), 32);
        assert_eq!(drive_b.auth_id().unwrap(), auth_b, "auth id is stable");
        assert!(drive_b.next_nonce().unwrap_err().is_auth());

        let file = drive_a.auth_file().unwrap();
        drive_a.export_auth_file(&auth_b, &file).unwrap();
        drive_b.import_auth_file(&file).unwrap();
        assert!(drive_b.next_nonce().is_ok());
    }

    #[test]
    fn test_import_for_another_device_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let password = SecretString::from("pw");
        let drive_a = Drive::create(
            LocalFile::shared(dir.path()),
            &password,
            Arc::new(MemorySequencer::new()),
            settings(),
        )
        .unwrap();
        let drive_b =
            Drive::open(LocalFile::shared(dir.path()), Arc::new(MemorySequencer::new()), settings())
                .unwrap();
        drive_b.unlock(&password).unwrap();
        drive_b.auth_id().unwrap();

        let file = drive_a.auth_file().unwrap();
        drive_a
            .export_auth_file("00112233445566778899aabbccddeeff", &file)
            .unwrap();
        assert!(drive_b.import_auth_file(&file).unwrap_err().is_auth());
        assert!(drive_b.next_nonce().unwrap_err().is_auth());
    }

    #[test]
    fn test_export_requires_active_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let password = SecretString::from("pw");
        Drive::create(
            LocalFile::shared(dir.path()),
            &password,
            Arc::new(MemorySequencer::new()),
            settings(),
        )
        .unwrap();
        let drive_b =
            Drive::open(LocalFile::shared(dir.path()), Arc::new(MemorySequencer::new()), settings())
                .unwrap();
        drive_b.unlock(&password).unwrap();
        let file = drive_b.auth_file().unwrap();
        let err = drive_b
            .export_auth_file("00112233445566778899aabbccddeeff", &file)
            .unwrap_err();
        assert!(err.is_auth());
        assert!(!file.exists());
    }

    #[test]
    fn test_export_rejects_malformed_target() {
        let dir = tempfile::tempdir().unwrap();
        let seq = Arc::new(MemorySequencer::new());
        let drive = Drive::create(
            LocalFile::shared(dir.path()),
            &SecretString::from("pw"),
            seq.clone(),
            settings(),
        )
        .unwrap();
        let file = drive.auth_file().unwrap();
        let err = drive.export_auth_file("not-hex", &file).unwrap_err();
        assert!(matches!(err, SealError::Format(_)));

        // range untouched
        let live = seq.get_sequence(&drive.drive_id_hex().unwrap()).unwrap().unwrap();
        assert_eq!(live.max_nonce, Some(sealfs_core::DEFAULT_MAX_NONCE));
    }

    #[test]
    fn test_revoked_device_cannot_write() {
        let dir = tempfile::tempdir().unwrap();
        let drive = Drive::create(
            LocalFile::shared(dir.path()),
            &SecretString::from("pw"),
            Arc::new(MemorySequencer::new()),
            settings(),
        )
        .unwrap();
        drive.next_nonce().unwrap();
        drive.revoke_authorization().unwrap();
        assert!(drive.next_nonce().unwrap_err().is_auth());
    }
}
