//! Real file provider interface

use std::io::{self, Read, Seek, Write};
use std::sync::Arc;

use sealfs_core::{SealError, SealResult};

const COPY_BUFFER_SIZE: usize = 256 * 1024;

/// Seekable byte stream handed out by a provider
pub trait RealStream: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> RealStream for T {}

pub type RealFileRef = Arc<dyn RealFile>;

/// A file or directory in the real (encrypted-side) tree.
///
/// Handles are cheap and may point at entries that do not exist yet.
pub trait RealFile: Send + Sync + std::fmt::Debug {
    /// Base name
    fn name(&self) -> String;

    /// Display path, also used to detect nesting
    fn path(&self) -> String;

    fn exists(&self) -> bool;

    fn is_file(&self) -> bool;

    fn is_directory(&self) -> bool;

    /// Size in bytes, 0 for directories and missing files
    fn length(&self) -> u64;

    /// Milliseconds since the Unix epoch
    fn last_modified(&self) -> u64;

    fn parent(&self) -> Option<RealFileRef>;

    /// Handle for `name` inside this directory, whether or not it exists.
    fn child(&self, name: &str) -> RealFileRef;

    fn list_files(&self) -> SealResult<Vec<RealFileRef>>;

    fn create_directory(&self, name: &str) -> SealResult<RealFileRef>;

    /// Create an empty file; fails if it already exists.
    fn create_file(&self, name: &str) -> SealResult<RealFileRef>;

    /// Delete a file or an empty directory.
    fn delete(&self) -> SealResult<()>;

    /// Rename within the same parent; fails if the target exists.
    fn rename_to(&self, new_name: &str) -> SealResult<RealFileRef>;

    fn input_stream(&self) -> SealResult<Box<dyn RealStream>>;

    /// Open for writing without truncating.
    fn output_stream(&self) -> SealResult<Box<dyn RealStream>>;

    /// Copy this file into `dest_dir`, reporting `(copied, total)` bytes.
    fn copy_to(
        &self,
        dest_dir: &dyn RealFile,
        new_name: Option<&str>,
        mut progress: Option<&mut dyn FnMut(u64, u64)>,
    ) -> SealResult<RealFileRef> {
        if self.is_directory() {
            return Err(invalid_input("cannot copy a directory, use copy_recursively"));
        }
        let name = new_name.map(str::to_owned).unwrap_or_else(|| self.name());
        let target = dest_dir.create_file(&name)?;
        let total = self.length();

        let mut input = self.input_stream()?;
        let mut output = target.output_stream()?;
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut copied = 0u64;
        loop {
            let n = input.read(&mut buf)?;
            if n == 0 {
                break;
            }
            output.write_all(&buf[..n])?;
            copied += n as u64;
            if let Some(report) = progress.as_deref_mut() {
                report(copied, total);
            }
        }
        output.flush()?;
        Ok(target)
    }

    /// Move this file into `dest_dir`. The default copies then deletes.
    fn move_to(
        &self,
        dest_dir: &dyn RealFile,
        new_name: Option<&str>,
        progress: Option<&mut dyn FnMut(u64, u64)>,
    ) -> SealResult<RealFileRef> {
        let moved = self.copy_to(dest_dir, new_name, progress)?;
        self.delete()?;
        Ok(moved)
    }
}

/// True when `candidate` is `dir` itself or lies somewhere beneath it.
pub fn is_within(dir: &dyn RealFile, candidate: &dyn RealFile) -> bool {
    let dir_path = dir.path();
    let path = candidate.path();
    if path == dir_path {
        return true;
    }
    let prefix = dir_path.trim_end_matches(['/', '\\']);
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/') || rest.starts_with('\\'))
}

pub(crate) fn invalid_input(msg: &str) -> SealError {
    SealError::Io(io::Error::new(io::ErrorKind::InvalidInput, msg.to_string()))
}

pub(crate) fn already_exists(what: &str) -> SealError {
    SealError::Io(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("{what} already exists"),
    ))
}
