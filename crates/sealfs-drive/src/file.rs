//! Virtual files and directories
//!
//! A `VirtualFile` wraps one real entry. Its real name is the encrypted
//! virtual name; contents are an `AesStream` over the real bytes. Inside a
//! drive, keys and nonces come from the drive. A standalone file (no drive)
//! needs its key, and a nonce for every write, from the caller, and passing
//! either to a drive file is refused so nonces never have two sources.

use std::sync::{Arc, OnceLock};

use sealfs_core::config::{validate_chunk_size, DEFAULT_CHUNK_SIZE};
use sealfs_core::{SealError, SealResult};
use sealfs_crypto::{
    decrypt_name, encrypt_name, plaintext_len, AesStream, FileHeader, Integrity, Nonce,
    StreamOptions, BLOCK_SIZE, KEY_SIZE,
};
use sealfs_storage::{RealFileRef, RealStream, RecursiveOptions};
use zeroize::Zeroizing;

use crate::drive::Drive;

/// Decrypting or encrypting stream over a virtual file's real bytes
pub type FileStream = AesStream<Box<dyn RealStream>>;

type RealRename<'b> = Box<dyn Fn(&RealFileRef) -> SealResult<String> + 'b>;
type RealFailed<'b> = Box<dyn FnMut(&RealFileRef, &SealError) + 'b>;
type RealProgress<'b> = Box<dyn FnMut(&RealFileRef, u64, u64) + 'b>;

/// Conflict policy and callbacks for recursive copy/move/delete
#[derive(Default)]
pub struct TreeOptions<'a> {
    /// New virtual name for an entry whose name is taken; drive files only
    pub auto_rename: Option<Box<dyn Fn(&VirtualFile) -> SealResult<String> + 'a>>,
    pub auto_rename_folders: bool,
    pub on_failed: Option<Box<dyn FnMut(&VirtualFile, &SealError) + 'a>>,
    pub on_progress: Option<Box<dyn FnMut(&VirtualFile, u64, u64) + 'a>>,
}

#[derive(Clone)]
pub struct VirtualFile {
    real_file: RealFileRef,
    drive: Option<Arc<Drive>>,
    key: Option<Zeroizing<[u8; KEY_SIZE]>>,
    hash_key: Option<Zeroizing<[u8; KEY_SIZE]>>,
    requested_nonce: Option<Nonce>,
    integrity: bool,
    requested_chunk_size: u32,
    allow_overwrite: bool,
    name: OnceLock<String>,
    header: OnceLock<FileHeader>,
}

impl VirtualFile {
    /// Wrap a real entry belonging to `drive`.
    pub fn new(real_file: RealFileRef, drive: Arc<Drive>) -> Self {
        Self::build(real_file, Some(drive), None)
    }

    /// Wrap a real entry outside any drive, encrypted under `key`.
    pub fn standalone(real_file: RealFileRef, key: [u8; KEY_SIZE]) -> Self {
        Self::build(real_file, None, Some(Zeroizing::new(key)))
    }

    fn build(
        real_file: RealFileRef,
        drive: Option<Arc<Drive>>,
        key: Option<Zeroizing<[u8; KEY_SIZE]>>,
    ) -> Self {
        Self {
            real_file,
            drive,
            key,
            hash_key: None,
            requested_nonce: None,
            integrity: false,
            requested_chunk_size: 0,
            allow_overwrite: false,
            name: OnceLock::new(),
            header: OnceLock::new(),
        }
    }

    /// Sibling or child wrapper sharing this file's drive and key settings.
    fn wrap(&self, real_file: RealFileRef) -> Self {
        let mut file = Self::build(real_file, self.drive.clone(), self.key.clone());
        file.hash_key = self.hash_key.clone();
        file.integrity = self.integrity;
        file.requested_chunk_size = self.requested_chunk_size;
        file
    }

    pub fn real_file(&self) -> &RealFileRef {
        &self.real_file
    }

    pub fn drive(&self) -> Option<&Arc<Drive>> {
        self.drive.as_ref()
    }

    /// Write tags on new content and verify them on read.
    ///
    /// `chunk_size` of `None` uses the drive default when writing.
    pub fn set_integrity(&mut self, enabled: bool, chunk_size: Option<u32>) -> SealResult<()> {
        if let Some(chunk) = chunk_size {
            validate_chunk_size(chunk)?;
        }
        self.integrity = enabled;
        self.requested_chunk_size = chunk_size.unwrap_or(0);
        Ok(())
    }

    pub fn is_integrity_enabled(&self) -> bool {
        self.integrity
    }

    /// Hash key for a standalone file.
    pub fn set_hash_key(&mut self, hash_key: [u8; KEY_SIZE]) -> SealResult<()> {
        if self.drive.is_some() {
            return Err(SealError::Security("hash key is managed by the drive".into()));
        }
        self.hash_key = Some(Zeroizing::new(hash_key));
        Ok(())
    }

    /// Content nonce for the next write of a standalone file.
    pub fn set_requested_nonce(&mut self, nonce: Nonce) -> SealResult<()> {
        if self.drive.is_some() {
            return Err(SealError::Security("nonce is managed by the drive".into()));
        }
        self.requested_nonce = Some(nonce);
        Ok(())
    }

    /// Let `output_stream` reopen a file that already has a header.
    ///
    /// Only for new files written by several range writers at once.
    pub fn set_allow_overwrite(&mut self, allow: bool) {
        self.allow_overwrite = allow;
    }

    fn is_root(&self) -> bool {
        self.drive
            .as_ref()
            .is_some_and(|d| d.virtual_root_real().path() == self.real_file.path())
    }

    fn encryption_key(&self) -> SealResult<Zeroizing<[u8; KEY_SIZE]>> {
        if let Some(key) = &self.key {
            return Ok(key.clone());
        }
        match &self.drive {
            Some(drive) => Ok(drive.content_keys()?.drive_key),
            None => Err(SealError::Security("no encryption key for file".into())),
        }
    }

    fn integrity_key(&self) -> SealResult<Zeroizing<[u8; KEY_SIZE]>> {
        if let Some(key) = &self.hash_key {
            return Ok(key.clone());
        }
        match &self.drive {
            Some(drive) => Ok(drive.content_keys()?.hash_key),
            None => Err(SealError::Security("integrity requires a hash key".into())),
        }
    }

    /// Encrypt a virtual name for use as a real name.
    ///
    /// Drive files draw a fresh nonce; standalone files pass key and nonce.
    fn encrypted_name(
        &self,
        name: &str,
        explicit: Option<(&[u8; KEY_SIZE], Nonce)>,
    ) -> SealResult<String> {
        match (&self.drive, explicit) {
            (Some(_), Some(_)) => Err(SealError::Security(
                "filename key and nonce are managed by the drive".into(),
            )),
            (Some(drive), None) => {
                let keys = drive.content_keys()?;
                encrypt_name(&keys.drive_key, drive.next_nonce()?, name)
            }
            (None, Some((key, nonce))) => encrypt_name(key, nonce, name),
            (None, None) => Err(SealError::Security(
                "a standalone file needs an explicit key and nonce".into(),
            )),
        }
    }

    /// Decrypted base name, cached until the next rename.
    pub fn name(&self) -> SealResult<String> {
        if let Some(name) = self.name.get() {
            return Ok(name.clone());
        }
        if self.is_root() {
            return Ok(String::new());
        }
        let key = self.encryption_key()?;
        let name = decrypt_name(&key, &self.real_file.name())?;
        Ok(self.name.get_or_init(|| name).clone())
    }

    /// Virtual path from the drive root, `/`-separated.
    pub fn path(&self) -> SealResult<String> {
        let mut parts = Vec::new();
        let mut current = Some(self.clone());
        while let Some(file) = current {
            if file.is_root() {
                break;
            }
            parts.push(file.name()?);
            current = file.parent();
        }
        parts.reverse();
        Ok(format!("/{}", parts.join("/")))
    }

    pub fn exists(&self) -> bool {
        self.real_file.exists()
    }

    pub fn is_file(&self) -> bool {
        self.real_file.is_file()
    }

    pub fn is_directory(&self) -> bool {
        self.real_file.is_directory()
    }

    pub fn last_modified(&self) -> u64 {
        self.real_file.last_modified()
    }

    /// Header of an existing encrypted file, `None` when there is none yet.
    pub fn header(&self) -> SealResult<Option<FileHeader>> {
        if let Some(header) = self.header.get() {
            return Ok(Some(*header));
        }
        if !self.real_file.is_file() || self.real_file.length() < FileHeader::SIZE as u64 {
            return Ok(None);
        }
        let mut stream = self.real_file.input_stream()?;
        let header = FileHeader::read_from(&mut stream)?;
        Ok(Some(*self.header.get_or_init(|| header)))
    }

    /// Chunk size recorded in the header, 0 for untagged or empty files.
    pub fn chunk_size(&self) -> SealResult<u32> {
        Ok(self.header()?.map(|h| h.chunk_size).unwrap_or(0))
    }

    /// Plaintext length: real length minus header and tags.
    pub fn len(&self) -> SealResult<u64> {
        let real_len = self.real_file.length();
        if real_len == 0 {
            return Ok(0);
        }
        Ok(plaintext_len(real_len, self.chunk_size()?))
    }

    pub fn is_empty(&self) -> SealResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Smallest unit parallel writers may split this file into.
    pub fn minimum_part_size(&self) -> SealResult<u64> {
        let chunk = self.chunk_size()?;
        if chunk > 0 {
            return Ok(chunk as u64);
        }
        if self.integrity {
            return Ok(self.write_chunk_size() as u64);
        }
        Ok(BLOCK_SIZE as u64)
    }

    fn write_chunk_size(&self) -> u32 {
        if !self.integrity {
            0
        } else if self.requested_chunk_size > 0 {
            self.requested_chunk_size
        } else if let Some(drive) = &self.drive {
            drive.default_chunk_size()
        } else {
            DEFAULT_CHUNK_SIZE
        }
    }

    /// Decrypting stream; verifies tags when integrity is enabled.
    pub fn input_stream(&self) -> SealResult<FileStream> {
        if !self.real_file.is_file() {
            return Err(SealError::not_found(self.real_file.path()));
        }
        let key = self.encryption_key()?;
        let hash_key = if self.integrity {
            Some(self.integrity_key()?)
        } else {
            None
        };
        AesStream::decrypt(
            &key,
            hash_key.as_deref(),
            self.real_file.input_stream()?,
            StreamOptions::default(),
        )
    }

    /// Encrypting stream for a new file.
    ///
    /// A file that already carries a header is refused unless overwrite was
    /// allowed, in which case its nonce and chunk size are reused.
    pub fn output_stream(&self) -> SealResult<FileStream> {
        let existing = self.header()?;
        if existing.is_some() && !self.allow_overwrite {
            return Err(SealError::Security(
                "refusing to overwrite an existing encrypted file: delete it and create a new one"
                    .into(),
            ));
        }
        let key = self.encryption_key()?;
        let (nonce, chunk_size) = match existing {
            Some(header) => (header.nonce, header.chunk_size),
            None => {
                let nonce = match (self.requested_nonce, &self.drive) {
                    (Some(nonce), _) => nonce,
                    (None, Some(drive)) => drive.next_nonce()?,
                    (None, None) => {
                        return Err(SealError::Security("file requires a nonce".into()))
                    }
                };
                (nonce, self.write_chunk_size())
            }
        };
        let integrity = if chunk_size > 0 {
            Integrity::new(chunk_size, &*self.integrity_key()?)?
        } else {
            Integrity::disabled()
        };
        let stream = AesStream::encrypt(
            &key,
            nonce,
            integrity,
            self.real_file.output_stream()?,
            StreamOptions {
                allow_range_write: self.allow_overwrite,
            },
        )?;
        let written = *stream.header();
        // an overwrite reuses the cached header, so a mismatch means another writer got here first
        if *self.header.get_or_init(|| written) != written {
            return Err(SealError::Security("file header changed while opening for write".into()));
        }
        Ok(stream)
    }

    pub fn parent(&self) -> Option<VirtualFile> {
        if self.drive.is_none() || self.is_root() {
            return None;
        }
        self.real_file.parent().map(|p| self.wrap(p))
    }

    pub fn list_files(&self) -> SealResult<Vec<VirtualFile>> {
        Ok(self
            .real_file
            .list_files()?
            .into_iter()
            .map(|real| self.wrap(real))
            .collect())
    }

    /// Child with the given virtual name. Entries that do not decrypt are skipped.
    pub fn child(&self, name: &str) -> SealResult<Option<VirtualFile>> {
        Ok(self
            .list_files()?
            .into_iter()
            .find(|f| f.name().is_ok_and(|n| n == name)))
    }

    pub fn create_directory(&self, name: &str) -> SealResult<VirtualFile> {
        let real_name = self.encrypted_name(name, None)?;
        Ok(self.wrap(self.real_file.create_directory(&real_name)?))
    }

    /// Standalone variant with an explicit key and filename nonce.
    pub fn create_directory_with(
        &self,
        name: &str,
        key: &[u8; KEY_SIZE],
        name_nonce: Nonce,
    ) -> SealResult<VirtualFile> {
        let real_name = self.encrypted_name(name, Some((key, name_nonce)))?;
        let mut dir = self.wrap(self.real_file.create_directory(&real_name)?);
        dir.key = Some(Zeroizing::new(*key));
        Ok(dir)
    }

    /// Create an empty file; its content nonce is drawn on first write.
    pub fn create_file(&self, name: &str) -> SealResult<VirtualFile> {
        let real_name = self.encrypted_name(name, None)?;
        Ok(self.wrap(self.real_file.create_file(&real_name)?))
    }

    /// Standalone variant with explicit key, filename nonce and content nonce.
    pub fn create_file_with(
        &self,
        name: &str,
        key: &[u8; KEY_SIZE],
        name_nonce: Nonce,
        file_nonce: Nonce,
    ) -> SealResult<VirtualFile> {
        let real_name = self.encrypted_name(name, Some((key, name_nonce)))?;
        let mut file = self.wrap(self.real_file.create_file(&real_name)?);
        file.key = Some(Zeroizing::new(*key));
        file.requested_nonce = Some(file_nonce);
        Ok(file)
    }

    /// Re-encrypt the name with a fresh nonce and rename the real entry.
    pub fn rename(&mut self, new_name: &str) -> SealResult<()> {
        let real_name = self.encrypted_name(new_name, None)?;
        self.apply_rename(&real_name)
    }

    /// Standalone variant with an explicit filename nonce.
    pub fn rename_with(&mut self, new_name: &str, nonce: Nonce) -> SealResult<()> {
        let key = self.encryption_key()?;
        let real_name = self.encrypted_name(new_name, Some((&key, nonce)))?;
        self.apply_rename(&real_name)
    }

    fn apply_rename(&mut self, real_name: &str) -> SealResult<()> {
        self.real_file = self.real_file.rename_to(real_name)?;
        self.name = OnceLock::new();
        Ok(())
    }

    /// Delete this file or empty directory.
    pub fn delete(&self) -> SealResult<()> {
        self.real_file.delete()
    }

    pub fn copy_to(
        &self,
        dir: &VirtualFile,
        progress: Option<&mut dyn FnMut(u64, u64)>,
    ) -> SealResult<VirtualFile> {
        let copied = self
            .real_file
            .copy_to(dir.real_file.as_ref(), None, progress)?;
        Ok(self.wrap(copied))
    }

    pub fn move_to(
        &self,
        dir: &VirtualFile,
        progress: Option<&mut dyn FnMut(u64, u64)>,
    ) -> SealResult<VirtualFile> {
        let moved = self
            .real_file
            .move_to(dir.real_file.as_ref(), None, progress)?;
        Ok(self.wrap(moved))
    }

    /// Copy this file or tree into `dest`. Returns the number of failed entries.
    pub fn copy_recursively(
        &self,
        dest: &VirtualFile,
        options: &mut TreeOptions<'_>,
    ) -> SealResult<usize> {
        let mut real_options = self.real_options(options);
        sealfs_storage::copy_recursively(&self.real_file, &dest.real_file, &mut real_options)
    }

    pub fn move_recursively(
        &self,
        dest: &VirtualFile,
        options: &mut TreeOptions<'_>,
    ) -> SealResult<usize> {
        let mut real_options = self.real_options(options);
        sealfs_storage::move_recursively(&self.real_file, &dest.real_file, &mut real_options)
    }

    pub fn delete_recursively(&self, options: &mut TreeOptions<'_>) -> usize {
        let mut real_options = self.real_options(options);
        sealfs_storage::delete_recursively(&self.real_file, &mut real_options)
    }

    /// Translate virtual callbacks into real-file ones.
    ///
    /// Renamed entries get their new virtual name encrypted with a fresh
    /// nonce, so auto-rename only works inside a drive.
    fn real_options<'b>(&'b self, options: &'b mut TreeOptions<'_>) -> RecursiveOptions<'b> {
        let TreeOptions {
            auto_rename,
            auto_rename_folders,
            on_failed,
            on_progress,
        } = options;

        let auto_rename = match (auto_rename.as_ref(), &self.drive) {
            (Some(rename), Some(_)) => Some(Box::new(move |real: &RealFileRef| {
                let file = self.wrap(real.clone());
                let new_name = rename(&file)?;
                file.encrypted_name(&new_name, None)
            }) as RealRename<'b>),
            _ => None,
        };
        let on_failed = on_failed.as_mut().map(|report| {
            Box::new(move |real: &RealFileRef, err: &SealError| report(&self.wrap(real.clone()), err))
                as RealFailed<'b>
        });
        let on_progress = on_progress.as_mut().map(|report| {
            Box::new(move |real: &RealFileRef, done: u64, total: u64| {
                report(&self.wrap(real.clone()), done, total)
            }) as RealProgress<'b>
        });

        RecursiveOptions {
            auto_rename,
            auto_rename_folders: *auto_rename_folders,
            on_failed,
            on_progress,
        }
    }
}

/// Conflict renamer for [`TreeOptions::auto_rename`]: `"name (HHmmssSSS).ext"`.
pub fn auto_rename(file: &VirtualFile) -> SealResult<String> {
    Ok(sealfs_storage::auto_rename(&file.name()?))
}

impl std::fmt::Debug for VirtualFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualFile")
            .field("real_path", &self.real_file.path())
            .field("drive", &self.drive.is_some())
            .field("integrity", &self.integrity)
            .finish()
    }
}
