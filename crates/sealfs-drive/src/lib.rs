//! sealfs-drive: encrypted virtual drives over a real file tree
//!
//! ```text
//! <root>/
//!   vault.slmn        drive config (salt, iterations, sealed keys, signature)
//!   fs/               encrypted tree: every real name is an encrypted virtual name
//!   export/           plain files written by the exporter
//!   share/auth.slma   authorization hand-off file
//! ```
//!
//! A [`Drive`] owns the key material and the nonce sequencer; a
//! [`VirtualFile`] maps one real entry to its decrypted name and contents.
//! On top sit the [`CachedReader`] for random access, and the importer,
//! exporter and commander for bulk transfers.

pub mod auth;
pub mod backend;
pub mod commander;
pub mod drive;
pub mod exporter;
pub mod file;
pub mod importer;
pub mod reader;
pub mod transfer;

pub use auth::AuthConfig;
pub use backend::{DefaultBackend, DriveBackend};
pub use commander::{BatchExportOptions, BatchImportOptions, FileCommander};
pub use drive::Drive;
pub use exporter::{ExportOptions, FileExporter};
pub use file::{auto_rename, FileStream, TreeOptions, VirtualFile};
pub use importer::{FileImporter, ImportOptions};
pub use reader::{CachedReader, CancelHandle};
pub use transfer::{ProgressFn, StopHandle};
