//! Local disk backend

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use sealfs_core::SealResult;

use crate::real_file::{already_exists, RealFile, RealFileRef, RealStream};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    path: PathBuf,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn shared(path: impl Into<PathBuf>) -> RealFileRef {
        Arc::new(Self::new(path))
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }
}

impl RealFile for LocalFile {
    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn path(&self) -> String {
        self.path.display().to_string()
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn is_file(&self) -> bool {
        self.path.is_file()
    }

    fn is_directory(&self) -> bool {
        self.path.is_dir()
    }

    fn length(&self) -> u64 {
        match fs::metadata(&self.path) {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => 0,
        }
    }

    fn last_modified(&self) -> u64 {
        fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn parent(&self) -> Option<RealFileRef> {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(LocalFile::shared)
    }

    fn child(&self, name: &str) -> RealFileRef {
        LocalFile::shared(self.path.join(name))
    }

    fn list_files(&self) -> SealResult<Vec<RealFileRef>> {
        let mut paths = fs::read_dir(&self.path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        paths.sort();
        Ok(paths.into_iter().map(LocalFile::shared).collect())
    }

    fn create_directory(&self, name: &str) -> SealResult<RealFileRef> {
        let path = self.path.join(name);
        fs::create_dir(&path)?;
        Ok(LocalFile::shared(path))
    }

    fn create_file(&self, name: &str) -> SealResult<RealFileRef> {
        let path = self.path.join(name);
        OpenOptions::new().write(true).create_new(true).open(&path)?;
        Ok(LocalFile::shared(path))
    }

    fn delete(&self) -> SealResult<()> {
        if self.path.is_dir() {
            fs::remove_dir(&self.path)?;
        } else {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn rename_to(&self, new_name: &str) -> SealResult<RealFileRef> {
        let target = self
            .path
            .parent()
            .map(|p| p.join(new_name))
            .unwrap_or_else(|| PathBuf::from(new_name));
        if target.exists() {
            return Err(already_exists(&target.display().to_string()));
        }
        fs::rename(&self.path, &target)?;
        Ok(LocalFile::shared(target))
    }

    fn input_stream(&self) -> SealResult<Box<dyn RealStream>> {
        Ok(Box::new(File::open(&self.path)?))
    }

    fn output_stream(&self) -> SealResult<Box<dyn RealStream>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        Ok(Box::new(file))
    }

    fn move_to(
        &self,
        dest_dir: &dyn RealFile,
        new_name: Option<&str>,
        progress: Option<&mut dyn FnMut(u64, u64)>,
    ) -> SealResult<RealFileRef> {
        let name = new_name.map(str::to_owned).unwrap_or_else(|| self.name());
        let target = PathBuf::from(dest_dir.path()).join(&name);
        if target.exists() {
            return Err(already_exists(&target.display().to_string()));
        }
        match fs::rename(&self.path, &target) {
            Ok(()) => Ok(LocalFile::shared(target)),
            Err(e) if self.is_file() => {
                // different filesystems: fall back to copy + delete
                tracing::debug!("rename {} failed ({e}), copying instead", self.path.display());
                let moved = self.copy_to(dest_dir, Some(&name), progress)?;
                self.delete()?;
                Ok(moved)
            }
            Err(e) => Err(e.into()),
        }
    }
}
