//! Drive backends: how a real root is located and prepared
//!
//! The drive itself only talks to `RealFile`; a backend decides which real
//! directory holds the config and where the encrypted tree lives under it.

use sealfs_core::config::DriveSettings;
use sealfs_core::{SealError, SealResult};
use sealfs_storage::RealFileRef;

pub trait DriveBackend: Send + Sync {
    /// Resolve the directory that holds (or will hold) the drive config.
    fn initialize_root(
        &self,
        root: RealFileRef,
        settings: &DriveSettings,
        create_if_missing: bool,
    ) -> SealResult<RealFileRef>;

    /// Return the directory holding the encrypted tree, creating it if needed.
    fn create_virtual_root(
        &self,
        real_root: &RealFileRef,
        settings: &DriveSettings,
    ) -> SealResult<RealFileRef>;
}

/// Backend for any provider with directories
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackend;

impl DriveBackend for DefaultBackend {
    fn initialize_root(
        &self,
        root: RealFileRef,
        settings: &DriveSettings,
        create_if_missing: bool,
    ) -> SealResult<RealFileRef> {
        if create_if_missing {
            if root.exists() {
                return Ok(root);
            }
            let parent = root
                .parent()
                .ok_or_else(|| SealError::not_found(format!("parent of {}", root.path())))?;
            return parent.create_directory(&root.name());
        }
        if !root.exists() {
            return Err(SealError::not_found(root.path()));
        }
        if root.child(&settings.config_filename).exists() {
            return Ok(root);
        }
        // opened at the virtual root folder itself: the config sits one level up
        match root.parent() {
            Some(parent) if parent.child(&settings.config_filename).exists() => {
                tracing::debug!("using parent {} as drive root", parent.path());
                Ok(parent)
            }
            _ => Ok(root),
        }
    }

    fn create_virtual_root(
        &self,
        real_root: &RealFileRef,
        settings: &DriveSettings,
    ) -> SealResult<RealFileRef> {
        let dir = real_root.child(&settings.virtual_root);
        if dir.exists() {
            return Ok(dir);
        }
        real_root.create_directory(&settings.virtual_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealfs_storage::LocalFile;

    #[test]
    fn test_parent_fallback_when_opened_at_virtual_root() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DriveSettings::default();
        std::fs::write(dir.path().join(&settings.config_filename), b"x").unwrap();
        std::fs::create_dir(dir.path().join(&settings.virtual_root)).unwrap();

        let inner = LocalFile::shared(dir.path().join(&settings.virtual_root));
        let root = DefaultBackend.initialize_root(inner, &settings, false).unwrap();
        assert_eq!(root.path(), LocalFile::shared(dir.path()).path());
    }

    #[test]
    fn test_create_makes_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DriveSettings::default();
        let target = LocalFile::shared(dir.path().join("vault"));

        let root = DefaultBackend.initialize_root(target, &settings, true).unwrap();
        assert!(root.is_directory());
        let fs_root = DefaultBackend.create_virtual_root(&root, &settings).unwrap();
        assert!(fs_root.is_directory());
        assert_eq!(fs_root.name(), settings.virtual_root);
    }

    #[test]
    fn test_open_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = LocalFile::shared(dir.path().join("nope"));
        assert!(DefaultBackend
            .initialize_root(missing, &DriveSettings::default(), false)
            .is_err());
    }
}
