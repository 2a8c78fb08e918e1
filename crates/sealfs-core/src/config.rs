use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SealError, SealResult};

/// Largest integrity chunk a drive will accept (8 MiB)
pub const MAX_CHUNK_SIZE: u32 = 8 * 1024 * 1024;

/// Default integrity chunk size (256 KiB)
pub const DEFAULT_CHUNK_SIZE: u32 = 256 * 1024;

/// Default PBKDF2 work factor
pub const DEFAULT_ITERATIONS: u32 = 65536;

/// Highest PBKDF2 work factor a drive config may carry
pub const MAX_ITERATIONS: u32 = 10_000_000;

/// Maximum number of cache buffers in the parallel reader
pub const MAX_READER_BUFFERS: usize = 6;

/// Top-level configuration (loaded from sealfs.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SealConfig {
    pub drive: DriveSettings,
    pub reader: ReaderSettings,
    pub sequencer: SequencerSettings,
    pub transfer: TransferSettings,
    pub logging: LoggingSettings,
}

/// Per-drive constants, handed to the drive at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveSettings {
    /// Drive config file name inside the drive root
    pub config_filename: String,
    /// Default file name for exported auth configs
    pub auth_config_filename: String,
    /// Real directory holding the encrypted tree
    pub virtual_root: String,
    /// Directory for exported plaintext files
    pub export_dir: String,
    /// Directory for shared auth files
    pub share_dir: String,
    /// Integrity chunk size used when a file asks for integrity without one
    pub default_chunk_size: u32,
    /// PBKDF2 iterations for new drives and password changes
    pub kdf_iterations: u32,
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            config_filename: "vault.slmn".into(),
            auth_config_filename: "auth.slma".into(),
            virtual_root: "fs".into(),
            export_dir: "export".into(),
            share_dir: "share".into(),
            default_chunk_size: DEFAULT_CHUNK_SIZE,
            kdf_iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// Parallel cached reader tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSettings {
    /// Number of LRU cache buffers (1..=6)
    pub buffers: usize,
    /// Size of each cache buffer in bytes (back offset is added on top)
    pub buffer_size: usize,
    /// Workers filling a buffer
    pub threads: usize,
    /// Bytes to fetch behind the requested position on a miss
    pub back_offset: usize,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            buffers: 3,
            buffer_size: 512 * 1024,
            threads: 1,
            back_offset: 32768,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerSettings {
    /// JSON sequence store
    pub path: PathBuf,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        let base = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            path: base.join(".config/sealfs/sequences.json"),
        }
    }
}

/// Import/export defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    pub threads: usize,
    pub buffer_size: usize,
    /// Write integrity tags on imported files
    pub integrity: bool,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            threads: 1,
            buffer_size: 512 * 1024,
            integrity: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Reject chunk sizes the cipher stream cannot handle.
pub fn validate_chunk_size(chunk_size: u32) -> SealResult<()> {
    if chunk_size % 16 != 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(SealError::Config(format!(
            "invalid chunk size {chunk_size}: must be 0 or a multiple of 16 up to {MAX_CHUNK_SIZE}"
        )));
    }
    Ok(())
}

impl SealConfig {
    /// Load from a TOML file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> SealResult<Self> {
        if !path.exists() {
            tracing::warn!(
                "config file not found: {}  (using defaults)",
                path.display()
            );
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: SealConfig = toml::from_str(&content)
            .map_err(|e| SealError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SealResult<()> {
        validate_chunk_size(self.drive.default_chunk_size)?;
        if self.drive.kdf_iterations == 0 || self.drive.kdf_iterations > MAX_ITERATIONS {
            return Err(SealError::Config(format!(
                "kdf_iterations must be between 1 and {MAX_ITERATIONS}"
            )));
        }
        if self.reader.buffers == 0 || self.reader.buffers > MAX_READER_BUFFERS {
            return Err(SealError::Config(format!(
                "reader.buffers must be between 1 and {MAX_READER_BUFFERS}"
            )));
        }
        if self.reader.buffer_size == 0 || self.reader.threads == 0 {
            return Err(SealError::Config(
                "reader.buffer_size and reader.threads must be positive".into(),
            ));
        }
        Ok(())
    }
}
