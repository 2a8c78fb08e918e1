//! sealfs-storage: the real file tree underneath a drive
//!
//! The drive never touches a filesystem directly; it goes through
//! `RealFile`, so any backend offering random-access streams can host one.

pub mod local;
pub mod real_file;
pub mod recursive;

pub use local::LocalFile;
pub use real_file::{is_within, RealFile, RealFileRef, RealStream};
pub use recursive::{
    auto_rename, copy_recursively, delete_recursively, move_recursively, RecursiveOptions,
};
