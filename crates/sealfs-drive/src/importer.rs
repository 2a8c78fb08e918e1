//! Import real files into a drive
//!
//! Large files can be split across threads: the importer writes the header
//! once, then every worker opens its own encrypting stream in range-write
//! mode and fills a disjoint, chunk-aligned part of the target.

use std::sync::atomic::{AtomicBool, AtomicU64};

use sealfs_core::config::TransferSettings;
use sealfs_core::{SealError, SealResult};
use sealfs_storage::RealFileRef;

use crate::file::VirtualFile;
use crate::transfer::{
    copy_range, plan_parts, run_parts, stopped_error, ProgressFn, Running, StopHandle,
};

#[derive(Default)]
pub struct ImportOptions<'a> {
    /// Virtual name of the new file, defaults to the source name
    pub filename: Option<String>,
    pub delete_source: bool,
    pub integrity: bool,
    pub on_progress: Option<ProgressFn<'a>>,
}

#[derive(Debug)]
pub struct FileImporter {
    buffer_size: usize,
    threads: usize,
    stop: StopHandle,
    running: AtomicBool,
}

impl FileImporter {
    pub fn new(buffer_size: usize, threads: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
            threads: threads.max(1),
            stop: StopHandle::default(),
            running: AtomicBool::new(false),
        }
    }

    pub fn from_settings(settings: &TransferSettings) -> Self {
        Self::new(settings.buffer_size, settings.threads)
    }

    /// Handle that stops the import in progress.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Encrypt `source` into a new file under `dir`.
    ///
    /// A stopped or failed import removes the partial target; the source is
    /// only deleted after a complete import.
    pub fn import_file(
        &self,
        source: &RealFileRef,
        dir: &VirtualFile,
        options: &ImportOptions<'_>,
    ) -> SealResult<VirtualFile> {
        let _running = Running::acquire(&self.running, "import")?;
        if source.is_directory() {
            return Err(SealError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "cannot import a directory with the file importer",
            )));
        }
        self.stop.clear();

        let name = options.filename.clone().unwrap_or_else(|| source.name());
        let size = source.length();
        let mut target = dir.create_file(&name)?;
        tracing::info!(source = %source.path(), name = %name, size, "importing file");

        match self.write_parts(source, &mut target, options) {
            Ok(()) if self.stop.is_stopped() => {
                discard(&target);
                Err(stopped_error())
            }
            Ok(()) => {
                target.set_allow_overwrite(false);
                if options.delete_source {
                    source.delete()?;
                }
                tracing::info!(name = %name, size, "imported file");
                Ok(target)
            }
            Err(e) => {
                discard(&target);
                Err(e)
            }
        }
    }

    fn write_parts(
        &self,
        source: &RealFileRef,
        target: &mut VirtualFile,
        options: &ImportOptions<'_>,
    ) -> SealResult<()> {
        target.set_integrity(options.integrity, None)?;
        let size = source.length();
        let parts = plan_parts(size, self.threads, target.minimum_part_size()?);

        let done = AtomicU64::new(0);
        if parts.len() == 1 {
            let mut out = target.output_stream()?;
            let align = out.align_size();
            let mut input = source.input_stream()?;
            return copy_range(
                &mut input,
                &mut out,
                0,
                size,
                self.buffer_size,
                align,
                &self.stop,
                &done,
                size,
                options.on_progress,
            );
        }

        // header first; workers then reopen the same file with its nonce
        target.set_allow_overwrite(true);
        let align = target.output_stream()?.align_size();
        let target = &*target;
        run_parts(&parts, self.threads, |start, len| {
            let mut out = target.output_stream()?;
            let mut input = source.input_stream()?;
            copy_range(
                &mut input,
                &mut out,
                start,
                len,
                self.buffer_size,
                align,
                &self.stop,
                &done,
                size,
                options.on_progress,
            )
        })
    }
}

fn discard(target: &VirtualFile) {
    if let Err(e) = target.delete() {
        tracing::warn!(path = %target.real_file().path(), "failed to remove partial import: {e}");
    }
}
