//! Export drive files back to plain real files

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use sealfs_core::config::TransferSettings;
use sealfs_core::{SealError, SealResult};
use sealfs_storage::RealFileRef;

use crate::file::VirtualFile;
use crate::transfer::{
    copy_range, plan_parts, run_parts, stopped_error, ProgressFn, Running, StopHandle,
};

#[derive(Default)]
pub struct ExportOptions<'a> {
    /// Real name of the exported file, defaults to the virtual name
    pub filename: Option<String>,
    pub delete_source: bool,
    /// Verify chunk tags while decrypting, when the file has them
    pub integrity: bool,
    pub on_progress: Option<ProgressFn<'a>>,
}

#[derive(Debug)]
pub struct FileExporter {
    buffer_size: usize,
    threads: usize,
    stop: StopHandle,
    running: AtomicBool,
}

impl FileExporter {
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

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Decrypt `file` into a new real file under `dir`.
    pub fn export_file(
        &self,
        file: &VirtualFile,
        dir: &RealFileRef,
        options: &ExportOptions<'_>,
    ) -> SealResult<RealFileRef> {
        let _running = Running::acquire(&self.running, "export")?;
        if file.is_directory() {
            return Err(SealError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "cannot export a directory with the file exporter",
            )));
        }
        self.stop.clear();

        let name = match &options.filename {
            Some(name) => name.clone(),
            None => file.name()?,
        };
        let mut source = file.clone();
        let verify = options.integrity && source.chunk_size()? > 0;
        source.set_integrity(verify, None)?;

        let target = dir.create_file(&name)?;
        tracing::info!(name = %name, target = %target.path(), verify, "exporting file");

        match self.write_parts(&source, &target, options) {
            Ok(()) if self.stop.is_stopped() => {
                discard(&target);
                Err(stopped_error())
            }
            Ok(()) => {
                if options.delete_source {
                    file.delete()?;
                }
                tracing::info!(name = %name, size = target.length(), "exported file");
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
        source: &VirtualFile,
        target: &RealFileRef,
        options: &ExportOptions<'_>,
    ) -> SealResult<()> {
        let size = source.len()?;
        let align = source.minimum_part_size()?;
        let parts = plan_parts(size, self.threads, align);
        let done = AtomicU64::new(0);
        run_parts(&parts, self.threads, |start, len| {
            let mut input = source.input_stream()?;
            let mut out = target.output_stream()?;
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

fn discard(target: &RealFileRef) {
    if let Err(e) = target.delete() {
        tracing::warn!(path = %target.path(), "failed to remove partial export: {e}");
    }
}
