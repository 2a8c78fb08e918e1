//! Recursive copy/move/delete over real files
//!
//! One failing entry never aborts the walk: it is handed to `on_failed`
//! (or logged when no callback is set) and counted in the returned total.

use std::time::{SystemTime, UNIX_EPOCH};

use sealfs_core::{SealError, SealResult};

use crate::real_file::{invalid_input, is_within, RealFileRef};

/// Callbacks and conflict policy for the recursive helpers
#[derive(Default)]
pub struct RecursiveOptions<'a> {
    /// New name for an entry whose name is already taken in the target
    pub auto_rename: Option<Box<dyn Fn(&RealFileRef) -> SealResult<String> + 'a>>,
    /// Also rename clashing directories instead of merging into them
    pub auto_rename_folders: bool,
    pub on_failed: Option<Box<dyn FnMut(&RealFileRef, &SealError) + 'a>>,
    /// `(entry, bytes done, bytes total)`
    pub on_progress: Option<Box<dyn FnMut(&RealFileRef, u64, u64) + 'a>>,
}

impl RecursiveOptions<'_> {
    fn fail(&mut self, file: &RealFileRef, err: SealError) -> usize {
        match self.on_failed.as_mut() {
            Some(on_failed) => on_failed(file, &err),
            None => tracing::warn!("{}: {err}", file.path()),
        }
        1
    }

    fn progress(&mut self, file: &RealFileRef, done: u64, total: u64) {
        if let Some(on_progress) = self.on_progress.as_mut() {
            on_progress(file, done, total);
        }
    }

    fn rename(&self, file: &RealFileRef) -> Option<SealResult<String>> {
        self.auto_rename.as_ref().map(|rename| rename(file))
    }

    /// Name to use in the target directory, or the failure to report.
    fn target_name(&self, file: &RealFileRef, name: String, clash: bool) -> SealResult<String> {
        if !clash {
            return Ok(name);
        }
        self.rename(file).unwrap_or_else(|| Err(already_taken(&name)))
    }
}

/// Copy `src` (file or directory tree) into `dest_dir`.
///
/// Returns the number of entries that failed.
pub fn copy_recursively(
    src: &RealFileRef,
    dest_dir: &RealFileRef,
    options: &mut RecursiveOptions<'_>,
) -> SealResult<usize> {
    if src.is_directory() && is_within(src.as_ref(), dest_dir.as_ref()) {
        return Err(invalid_input("cannot copy a directory into itself"));
    }
    Ok(copy_entry(src, dest_dir, options))
}

fn copy_entry(src: &RealFileRef, dest_dir: &RealFileRef, options: &mut RecursiveOptions<'_>) -> usize {
    let name = src.name();
    let existing = dest_dir.child(&name);

    if src.is_file() {
        let new_name = match options.target_name(src, name, existing.exists()) {
            Ok(new_name) => new_name,
            Err(e) => return options.fail(src, e),
        };
        let result = {
            let mut report = |done: u64, total: u64| options.progress(src, done, total);
            src.copy_to(dest_dir.as_ref(), Some(&new_name), Some(&mut report))
        };
        return match result {
            Ok(_) => 0,
            Err(e) => options.fail(src, e),
        };
    }

    options.progress(src, 0, 1);
    let target = if existing.exists() && options.auto_rename_folders {
        match options.rename(src) {
            Some(renamed) => renamed.and_then(|renamed| dest_dir.create_directory(&renamed)),
            None => Ok(existing),
        }
    } else if existing.exists() {
        Ok(existing)
    } else {
        dest_dir.create_directory(&name)
    };
    let target = match target {
        Ok(target) => target,
        Err(e) => return options.fail(src, e),
    };
    options.progress(src, 1, 1);

    match src.list_files() {
        Ok(children) => children
            .iter()
            .map(|child| copy_entry(child, &target, options))
            .sum(),
        Err(e) => options.fail(src, e),
    }
}

/// Move `src` (file or directory tree) into `dest_dir`.
///
/// A directory that does not clash is moved in one step; a clashing one is
/// merged entry by entry and the emptied source removed.
pub fn move_recursively(
    src: &RealFileRef,
    dest_dir: &RealFileRef,
    options: &mut RecursiveOptions<'_>,
) -> SealResult<usize> {
    if src.is_directory() && is_within(src.as_ref(), dest_dir.as_ref()) {
        return Err(invalid_input("cannot move a directory into itself"));
    }
    Ok(move_entry(src, dest_dir, options))
}

fn move_entry(src: &RealFileRef, dest_dir: &RealFileRef, options: &mut RecursiveOptions<'_>) -> usize {
    let name = src.name();
    let existing = dest_dir.child(&name);

    if src.is_file() {
        let new_name = match options.target_name(src, name, existing.exists()) {
            Ok(new_name) => new_name,
            Err(e) => return options.fail(src, e),
        };
        let result = {
            let mut report = |done: u64, total: u64| options.progress(src, done, total);
            src.move_to(dest_dir.as_ref(), Some(&new_name), Some(&mut report))
        };
        return match result {
            Ok(_) => 0,
            Err(e) => options.fail(src, e),
        };
    }

    let clash = existing.exists();
    let renamed = if clash && options.auto_rename_folders {
        match options.rename(src).transpose() {
            Ok(renamed) => renamed,
            Err(e) => return options.fail(src, e),
        }
    } else {
        None
    };
    if !clash || renamed.is_some() {
        let new_name = renamed.unwrap_or(name);
        return match src.move_to(dest_dir.as_ref(), Some(&new_name), None) {
            Ok(_) => {
                options.progress(src, 1, 1);
                0
            }
            Err(e) => options.fail(src, e),
        };
    }

    options.progress(src, 0, 1);
    let mut failed = match src.list_files() {
        Ok(children) => children
            .iter()
            .map(|child| move_entry(child, &existing, options))
            .sum(),
        Err(e) => options.fail(src, e),
    };
    if failed == 0 {
        if let Err(e) = src.delete() {
            failed += options.fail(src, e);
        }
    }
    options.progress(src, 1, 1);
    failed
}

/// Delete `target` and, for directories, everything under it.
pub fn delete_recursively(target: &RealFileRef, options: &mut RecursiveOptions<'_>) -> usize {
    let mut failed = 0;
    if target.is_directory() {
        match target.list_files() {
            Ok(children) => {
                failed += children
                    .iter()
                    .map(|child| delete_recursively(child, options))
                    .sum::<usize>();
            }
            Err(e) => return options.fail(target, e),
        }
    }
    match target.delete() {
        Ok(()) => options.progress(target, 1, 1),
        Err(e) => failed += options.fail(target, e),
    }
    failed
}

/// `"name.ext"` becomes `"name (HHmmssSSS).ext"`, time of day in UTC.
pub fn auto_rename(filename: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() % 86_400_000)
        .unwrap_or(0);
    let stamp = format!(
        "{:02}{:02}{:02}{:03}",
        millis / 3_600_000,
        millis / 60_000 % 60,
        millis / 1000 % 60,
        millis % 1000
    );
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem} ({stamp}).{ext}"),
        _ => format!("{filename} ({stamp})"),
    }
}

fn already_taken(name: &str) -> SealError {
    SealError::Io(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("another file named {name} exists"),
    ))
}
