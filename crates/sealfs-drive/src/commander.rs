//! Batch operations over many files and directories
//!
//! Each entry is handled on its own: a failure is reported through
//! `on_failed` (or logged) and the batch moves on. `stop` ends the batch
//! after the entry in progress.

use sealfs_core::config::TransferSettings;
use sealfs_core::SealError;
use sealfs_storage::{auto_rename, RealFileRef};

use crate::exporter::{ExportOptions, FileExporter};
use crate::file::{TreeOptions, VirtualFile};
use crate::importer::{FileImporter, ImportOptions};
use crate::transfer::StopHandle;

/// Per-file progress, `(name, bytes done, bytes total)`
pub type BatchProgressFn<'a> = &'a (dyn Fn(&str, u64, u64) + Sync);

#[derive(Default)]
pub struct BatchImportOptions<'a> {
    pub delete_source: bool,
    pub integrity: bool,
    /// Rename entries whose name is taken instead of failing them
    pub auto_rename: bool,
    pub on_failed: Option<Box<dyn FnMut(&RealFileRef, &SealError) + 'a>>,
    pub on_progress: Option<BatchProgressFn<'a>>,
}

#[derive(Default)]
pub struct BatchExportOptions<'a> {
    pub delete_source: bool,
    pub integrity: bool,
    pub auto_rename: bool,
    pub on_failed: Option<Box<dyn FnMut(&VirtualFile, &SealError) + 'a>>,
    pub on_progress: Option<BatchProgressFn<'a>>,
}

#[derive(Debug)]
pub struct FileCommander {
    importer: FileImporter,
    exporter: FileExporter,
    stop: StopHandle,
}

impl FileCommander {
    pub fn new(importer: FileImporter, exporter: FileExporter) -> Self {
        Self {
            importer,
            exporter,
            stop: StopHandle::default(),
        }
    }

    pub fn from_settings(settings: &TransferSettings) -> Self {
        Self::new(
            FileImporter::from_settings(settings),
            FileExporter::from_settings(settings),
        )
    }

    pub fn importer(&self) -> &FileImporter {
        &self.importer
    }

    pub fn exporter(&self) -> &FileExporter {
        &self.exporter
    }

    /// Stop the running batch and any transfer in progress.
    pub fn stop(&self) {
        self.stop.stop();
        self.importer.stop();
        self.exporter.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Import real files and directory trees into `dir`.
    pub fn import_files(
        &self,
        sources: &[RealFileRef],
        dir: &VirtualFile,
        options: &mut BatchImportOptions<'_>,
    ) -> Vec<VirtualFile> {
        self.stop.clear();
        let mut imported = Vec::new();
        for source in sources {
            if self.stop.is_stopped() {
                break;
            }
            self.import_entry(source, dir, options, &mut imported);
        }
        imported
    }

    fn import_entry(
        &self,
        source: &RealFileRef,
        dir: &VirtualFile,
        options: &mut BatchImportOptions<'_>,
        imported: &mut Vec<VirtualFile>,
    ) {
        let name = source.name();
        let existing = match dir.child(&name) {
            Ok(existing) => existing,
            Err(e) => return import_failed(options, source, e),
        };

        if source.is_directory() {
            let target = match existing {
                Some(found) if found.is_directory() => Ok(found),
                Some(_) if options.auto_rename => dir.create_directory(&auto_rename(&name)),
                Some(_) => Err(name_taken(&name)),
                None => dir.create_directory(&name),
            };
            let target = match target {
                Ok(target) => target,
                Err(e) => return import_failed(options, source, e),
            };
            let children = match source.list_files() {
                Ok(children) => children,
                Err(e) => return import_failed(options, source, e),
            };
            for child in &children {
                if self.stop.is_stopped() {
                    return;
                }
                self.import_entry(child, &target, options, imported);
            }
            if options.delete_source && !self.stop.is_stopped() {
                if let Ok(true) = source.list_files().map(|left| left.is_empty()) {
                    if let Err(e) = source.delete() {
                        import_failed(options, source, e);
                    }
                }
            }
            return;
        }

        let filename = match existing {
            Some(_) if options.auto_rename => auto_rename(&name),
            Some(_) => return import_failed(options, source, name_taken(&name)),
            None => name,
        };
        let progress = options.on_progress;
        let result = {
            let report = |done: u64, total: u64| {
                if let Some(progress) = progress {
                    progress(&filename, done, total);
                }
            };
            let import = ImportOptions {
                filename: Some(filename.clone()),
                delete_source: options.delete_source,
                integrity: options.integrity,
                on_progress: Some(&report),
            };
            self.importer.import_file(source, dir, &import)
        };
        match result {
            Ok(file) => imported.push(file),
            Err(_) if self.stop.is_stopped() => {}
            Err(e) => import_failed(options, source, e),
        }
    }

    /// Export virtual files and directory trees into the real `dir`.
    pub fn export_files(
        &self,
        files: &[VirtualFile],
        dir: &RealFileRef,
        options: &mut BatchExportOptions<'_>,
    ) -> Vec<RealFileRef> {
        self.stop.clear();
        let mut exported = Vec::new();
        for file in files {
            if self.stop.is_stopped() {
                break;
            }
            self.export_entry(file, dir, options, &mut exported);
        }
        exported
    }

    fn export_entry(
        &self,
        file: &VirtualFile,
        dir: &RealFileRef,
        options: &mut BatchExportOptions<'_>,
        exported: &mut Vec<RealFileRef>,
    ) {
        let name = match file.name() {
            Ok(name) => name,
            Err(e) => return export_failed(options, file, e),
        };
        let existing = dir.child(&name);

        if file.is_directory() {
            let target = if existing.is_directory() {
                Ok(existing)
            } else if existing.exists() && options.auto_rename {
                dir.create_directory(&auto_rename(&name))
            } else if existing.exists() {
                Err(name_taken(&name))
            } else {
                dir.create_directory(&name)
            };
            let target = match target {
                Ok(target) => target,
                Err(e) => return export_failed(options, file, e),
            };
            let children = match file.list_files() {
                Ok(children) => children,
                Err(e) => return export_failed(options, file, e),
            };
            for child in &children {
                if self.stop.is_stopped() {
                    return;
                }
                self.export_entry(child, &target, options, exported);
            }
            if options.delete_source && !self.stop.is_stopped() {
                if let Ok(true) = file.list_files().map(|left| left.is_empty()) {
                    if let Err(e) = file.delete() {
                        export_failed(options, file, e);
                    }
                }
            }
            return;
        }

        let filename = match existing.exists() {
            true if options.auto_rename => auto_rename(&name),
            true => return export_failed(options, file, name_taken(&name)),
            false => name,
        };
        let progress = options.on_progress;
        let result = {
            let report = |done: u64, total: u64| {
                if let Some(progress) = progress {
                    progress(&filename, done, total);
                }
            };
            let export = ExportOptions {
                filename: Some(filename.clone()),
                delete_source: options.delete_source,
                integrity: options.integrity,
                on_progress: Some(&report),
            };
            self.exporter.export_file(file, dir, &export)
        };
        match result {
            Ok(real) => exported.push(real),
            Err(_) if self.stop.is_stopped() => {}
            Err(e) => export_failed(options, file, e),
        }
    }

    /// Delete files and trees. Returns the number of entries that failed.
    pub fn delete_files(&self, files: &[VirtualFile], options: &mut TreeOptions<'_>) -> usize {
        self.stop.clear();
        files
            .iter()
            .take_while(|_| !self.stop.is_stopped())
            .map(|file| file.delete_recursively(options))
            .sum()
    }

    /// Copy files and trees into `dest`. Returns the number of entries that failed.
    pub fn copy_files(
        &self,
        files: &[VirtualFile],
        dest: &VirtualFile,
        options: &mut TreeOptions<'_>,
    ) -> usize {
        self.transfer_tree(files, dest, options, false)
    }

    /// Move files and trees into `dest`. Returns the number of entries that failed.
    pub fn move_files(
        &self,
        files: &[VirtualFile],
        dest: &VirtualFile,
        options: &mut TreeOptions<'_>,
    ) -> usize {
        self.transfer_tree(files, dest, options, true)
    }

    fn transfer_tree(
        &self,
        files: &[VirtualFile],
        dest: &VirtualFile,
        options: &mut TreeOptions<'_>,
        moving: bool,
    ) -> usize {
        self.stop.clear();
        let mut failed = 0;
        for file in files {
            if self.stop.is_stopped() {
                break;
            }
            let result = if moving {
                file.move_recursively(dest, options)
            } else {
                file.copy_recursively(dest, options)
            };
            failed += match result {
                Ok(count) => count,
                Err(e) => {
                    match options.on_failed.as_mut() {
                        Some(on_failed) => on_failed(file, &e),
                        None => tracing::warn!(path = %file.real_file().path(), "{e}"),
                    }
                    1
                }
            };
        }
        failed
    }
}

fn import_failed(options: &mut BatchImportOptions<'_>, source: &RealFileRef, err: SealError) {
    match options.on_failed.as_mut() {
        Some(on_failed) => on_failed(source, &err),
        None => tracing::warn!(source = %source.path(), "import failed: {err}"),
    }
}

fn export_failed(options: &mut BatchExportOptions<'_>, file: &VirtualFile, err: SealError) {
    match options.on_failed.as_mut() {
        Some(on_failed) => on_failed(file, &err),
        None => tracing::warn!(path = %file.real_file().path(), "export failed: {err}"),
    }
}

fn name_taken(name: &str) -> SealError {
    SealError::Io(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("another file named {name} exists"),
    ))
}
