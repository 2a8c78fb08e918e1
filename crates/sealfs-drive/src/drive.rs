//! Virtual drive: key lifecycle and config persistence
//!
//! A drive is rooted at a real directory holding the drive config and the
//! encrypted tree (`settings.virtual_root`). It is locked at rest; unlocking
//! derives the master key from the password, decrypts the drive and hash
//! keys from the config, and checks the config signature before trusting
//! them. Every nonce it hands out comes from its sequencer.

use std::io::{self, Read, Write};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use secrecy::SecretString;
use sealfs_core::config::{validate_chunk_size, DriveSettings};
use sealfs_core::types::to_hex;
use sealfs_core::{SealError, SealResult, DEFAULT_MAX_NONCE, DEFAULT_START_NONCE, DRIVE_ID_LENGTH};
use sealfs_crypto::keys::{generate_combined_key, generate_master_key_iv, generate_salt};
use sealfs_crypto::{
    derive_master_key, generate_auth_id, generate_drive_id, nonce_from_u64, DriveConfig, DriveKey,
    Nonce, KEY_SIZE,
};
use sealfs_sequence::NonceSequencer;
use sealfs_storage::RealFileRef;
use zeroize::{Zeroize, Zeroizing};

use crate::backend::{DefaultBackend, DriveBackend};
use crate::file::VirtualFile;

/// Copies of the content keys handed to a file operation
pub(crate) struct ContentKeys {
    pub drive_key: Zeroizing<[u8; KEY_SIZE]>,
    pub hash_key: Zeroizing<[u8; KEY_SIZE]>,
}

#[derive(Default)]
struct DriveState {
    key: Option<DriveKey>,
    drive_id: Option<[u8; DRIVE_ID_LENGTH]>,
}

pub struct Drive {
    settings: DriveSettings,
    real_root: RealFileRef,
    virtual_root: RealFileRef,
    sequencer: Arc<dyn NonceSequencer>,
    state: RwLock<DriveState>,
}

impl Drive {
    /// Create a new drive at `root` and leave it unlocked.
    ///
    /// The drive gets a fresh id and key pair, and this device a sequence
    /// covering the whole nonce space.
    pub fn create(
        root: RealFileRef,
        password: &SecretString,
        sequencer: Arc<dyn NonceSequencer>,
        settings: DriveSettings,
    ) -> SealResult<Arc<Self>> {
        Self::create_with(&DefaultBackend, root, password, sequencer, settings)
    }

    pub fn create_with(
        backend: &dyn DriveBackend,
        root: RealFileRef,
        password: &SecretString,
        sequencer: Arc<dyn NonceSequencer>,
        settings: DriveSettings,
    ) -> SealResult<Arc<Self>> {
        validate_chunk_size(settings.default_chunk_size)?;
        let real_root = backend.initialize_root(root, &settings, true)?;
        if real_root.child(&settings.config_filename).exists() {
            return Err(SealError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("a drive already exists at {}", real_root.path()),
            )));
        }
        let virtual_root = backend.create_virtual_root(&real_root, &settings)?;
        let drive = Self::new(settings, real_root, virtual_root, sequencer);

        let mut combined = generate_combined_key();
        let mut drive_key = [0u8; KEY_SIZE];
        let mut hash_key = [0u8; KEY_SIZE];
        drive_key.copy_from_slice(&combined[..KEY_SIZE]);
        hash_key.copy_from_slice(&combined[KEY_SIZE..]);
        combined.zeroize();
        let drive_id = generate_drive_id();

        let written = drive.write_config(password, drive_key, hash_key, &drive_id);
        drive_key.zeroize();
        hash_key.zeroize();
        let key = written?;

        let drive_hex = to_hex(&drive_id);
        let auth_hex = to_hex(&generate_auth_id());
        drive.sequencer.create_sequence(&drive_hex, &auth_hex)?;
        drive.sequencer.initialize_sequence(
            &drive_hex,
            &auth_hex,
            DEFAULT_START_NONCE,
            DEFAULT_MAX_NONCE,
        )?;

        {
            let mut state = drive.write_state()?;
            state.key = Some(key);
            state.drive_id = Some(drive_id);
        }
        tracing::info!(drive_id = %drive_hex, root = %drive.real_root.path(), "created drive");
        Ok(Arc::new(drive))
    }

    /// Locate an existing drive. It stays locked until [`Drive::unlock`].
    pub fn open(
        root: RealFileRef,
        sequencer: Arc<dyn NonceSequencer>,
        settings: DriveSettings,
    ) -> SealResult<Arc<Self>> {
        Self::open_with(&DefaultBackend, root, sequencer, settings)
    }

    pub fn open_with(
        backend: &dyn DriveBackend,
        root: RealFileRef,
        sequencer: Arc<dyn NonceSequencer>,
        settings: DriveSettings,
    ) -> SealResult<Arc<Self>> {
        validate_chunk_size(settings.default_chunk_size)?;
        let real_root = backend.initialize_root(root, &settings, false)?;
        if !real_root.child(&settings.config_filename).exists() {
            return Err(SealError::not_found(format!(
                "no drive config in {}",
                real_root.path()
            )));
        }
        let virtual_root = backend.create_virtual_root(&real_root, &settings)?;
        Ok(Arc::new(Self::new(settings, real_root, virtual_root, sequencer)))
    }

    fn new(
        settings: DriveSettings,
        real_root: RealFileRef,
        virtual_root: RealFileRef,
        sequencer: Arc<dyn NonceSequencer>,
    ) -> Self {
        Self {
            settings,
            real_root,
            virtual_root,
            sequencer,
            state: RwLock::new(DriveState::default()),
        }
    }

    /// Derive the master key and load the drive keys from the config.
    ///
    /// On any failure the drive is left locked with its keys cleared.
    pub fn unlock(&self, password: &SecretString) -> SealResult<()> {
        let mut state = self.write_state()?;
        state.key = None;
        state.drive_id = None;

        let config = self.read_config()?;
        let master = derive_master_key(password, &config.salt, config.iterations)?;
        let (key, drive_id) = match config.open(&master) {
            Ok(opened) => opened,
            Err(e) => {
                tracing::warn!(root = %self.real_root.path(), "unlock failed: {e}");
                return Err(e);
            }
        };
        state.key = Some(key);
        state.drive_id = Some(drive_id);
        tracing::info!(drive_id = %to_hex(&drive_id), "unlocked drive");
        Ok(())
    }

    /// Drop the keys; they are zeroized as they go.
    pub fn lock(&self) {
        match self.state.write() {
            Ok(mut state) => {
                state.key = None;
                state.drive_id = None;
            }
            Err(poisoned) => {
                let mut state = poisoned.into_inner();
                state.key = None;
                state.drive_id = None;
            }
        }
        tracing::info!(root = %self.real_root.path(), "locked drive");
    }

    pub fn is_locked(&self) -> bool {
        self.read_state().map(|s| s.key.is_none()).unwrap_or(true)
    }

    /// Re-encrypt the drive keys under a new password.
    ///
    /// Salt and master key IV are regenerated; drive key, hash key and id
    /// stay the same so existing files remain readable.
    pub fn set_password(&self, password: &SecretString) -> SealResult<()> {
        let mut state = self.write_state()?;
        let (Some(key), Some(drive_id)) = (state.key.as_ref(), state.drive_id) else {
            return Err(SealError::Auth("drive is locked".into()));
        };
        let new_key = self.write_config(password, *key.drive_key(), *key.hash_key(), &drive_id)?;
        state.key = Some(new_key);
        tracing::info!(drive_id = %to_hex(&drive_id), "changed drive password");
        Ok(())
    }

    /// Seal the keys under `password` and atomically replace the config.
    fn write_config(
        &self,
        password: &SecretString,
        drive_key: [u8; KEY_SIZE],
        hash_key: [u8; KEY_SIZE],
        drive_id: &[u8; DRIVE_ID_LENGTH],
    ) -> SealResult<DriveKey> {
        let salt = generate_salt();
        let iv = generate_master_key_iv();
        let iterations = self.settings.kdf_iterations;
        let master = derive_master_key(password, &salt, iterations)?;
        let key = DriveKey::new(&master, drive_key, hash_key, iterations);
        let config = DriveConfig::seal(&key, drive_id, salt, iv)?;

        let name = &self.settings.config_filename;
        let tmp_name = format!("{name}.tmp");
        let stale = self.real_root.child(&tmp_name);
        if stale.exists() {
            stale.delete()?;
        }
        let tmp = self.real_root.create_file(&tmp_name)?;
        {
            let mut out = tmp.output_stream()?;
            out.write_all(&config.to_bytes())?;
            out.flush()?;
        }
        let current = self.real_root.child(name);
        if current.exists() {
            current.delete()?;
        }
        tmp.rename_to(name)?;
        Ok(key)
    }

    fn read_config(&self) -> SealResult<DriveConfig> {
        let file = self.real_root.child(&self.settings.config_filename);
        if !file.exists() {
            return Err(SealError::not_found(format!(
                "no drive config in {}",
                self.real_root.path()
            )));
        }
        let mut bytes = Vec::with_capacity(DriveConfig::SIZE);
        file.input_stream()?.read_to_end(&mut bytes)?;
        DriveConfig::parse(&bytes)
    }

    /// Draw the next content or filename nonce for this device.
    pub fn next_nonce(&self) -> SealResult<Nonce> {
        let drive_id = self.drive_id_hex()?;
        let value = self.sequencer.next_nonce(&drive_id)?;
        Ok(nonce_from_u64(value))
    }

    pub(crate) fn content_keys(&self) -> SealResult<ContentKeys> {
        let state = self.read_state()?;
        let key = state
            .key
            .as_ref()
            .ok_or_else(|| SealError::Auth("drive is locked".into()))?;
        Ok(ContentKeys {
            drive_key: Zeroizing::new(*key.drive_key()),
            hash_key: Zeroizing::new(*key.hash_key()),
        })
    }

    pub fn drive_id(&self) -> Option<[u8; DRIVE_ID_LENGTH]> {
        self.read_state().ok().and_then(|s| s.drive_id)
    }

    /// Drive id as stored in the sequencer; requires the drive unlocked.
    pub fn drive_id_hex(&self) -> SealResult<String> {
        self.drive_id()
            .map(|id| to_hex(&id))
            .ok_or_else(|| SealError::Auth("drive is locked".into()))
    }

    /// The virtual root directory.
    pub fn root(self: &Arc<Self>) -> VirtualFile {
        VirtualFile::new(Arc::clone(&self.virtual_root), Arc::clone(self))
    }

    pub fn real_root(&self) -> &RealFileRef {
        &self.real_root
    }

    pub(crate) fn virtual_root_real(&self) -> &RealFileRef {
        &self.virtual_root
    }

    pub fn settings(&self) -> &DriveSettings {
        &self.settings
    }

    pub fn default_chunk_size(&self) -> u32 {
        self.settings.default_chunk_size
    }

    pub fn sequencer(&self) -> &Arc<dyn NonceSequencer> {
        &self.sequencer
    }

    /// Real directory for exported files, created on first use.
    pub fn export_dir(&self) -> SealResult<RealFileRef> {
        self.side_dir(&self.settings.export_dir)
    }

    /// Real directory for auth files, created on first use.
    pub fn share_dir(&self) -> SealResult<RealFileRef> {
        self.side_dir(&self.settings.share_dir)
    }

    fn side_dir(&self, name: &str) -> SealResult<RealFileRef> {
        let dir = self.real_root.child(name);
        if dir.exists() {
            return Ok(dir);
        }
        self.real_root.create_directory(name)
    }

    fn read_state(&self) -> SealResult<RwLockReadGuard<'_, DriveState>> {
        self.state
            .read()
            .map_err(|_| SealError::Security("drive state lock poisoned".into()))
    }

    fn write_state(&self) -> SealResult<RwLockWriteGuard<'_, DriveState>> {
        self.state
            .write()
            .map_err(|_| SealError::Security("drive state lock poisoned".into()))
    }
}

impl std::fmt::Debug for Drive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drive")
            .field("real_root", &self.real_root.path())
            .field("locked", &self.is_locked())
            .finish()
    }
}
