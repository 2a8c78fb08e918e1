//! File header codec
//!
//! ```text
//! [4 bytes: magic][1 byte: version][4 bytes: chunk size, BE u32][8 bytes: nonce]
//! ```

use std::io::Read;

use sealfs_core::{SealError, SealResult, NONCE_LENGTH};

use crate::nonce::Nonce;
use crate::{MAGIC, VERSION};

/// Header at the start of every encrypted file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u8,
    /// Integrity chunk size, 0 when the file carries no tags
    pub chunk_size: u32,
    pub nonce: Nonce,
}

impl FileHeader {
    pub const SIZE: usize = 4 + 1 + 4 + NONCE_LENGTH;

    pub fn new(chunk_size: u32, nonce: Nonce) -> Self {
        Self {
            version: VERSION,
            chunk_size,
            nonce,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..4].copy_from_slice(&MAGIC);
        out[4] = self.version;
        out[5..9].copy_from_slice(&self.chunk_size.to_be_bytes());
        out[9..].copy_from_slice(&self.nonce);
        out
    }

    pub fn parse(bytes: &[u8]) -> SealResult<Self> {
        if bytes.len() < Self::SIZE {
            return Err(SealError::Format(format!(
                "header too short: {} bytes (expected {})",
                bytes.len(),
                Self::SIZE
            )));
        }
        if bytes[..4] != MAGIC {
            return Err(SealError::Format("bad magic bytes".into()));
        }
        let version = bytes[4];
        if version != VERSION {
            return Err(SealError::Format(format!("unsupported version {version}")));
        }
        let mut chunk = [0u8; 4];
        chunk.copy_from_slice(&bytes[5..9]);
        let mut nonce = [0u8; NONCE_LENGTH];
        nonce.copy_from_slice(&bytes[9..Self::SIZE]);
        Ok(Self {
            version,
            chunk_size: u32::from_be_bytes(chunk),
            nonce,
        })
    }

    /// Read and parse a header from the current position of `reader`.
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> SealResult<Self> {
        let mut bytes = [0u8; Self::SIZE];
        reader.read_exact(&mut bytes).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                SealError::Format("file too short for a header".into())
            } else {
                SealError::from(e)
            }
        })?;
        Self::parse(&bytes)
    }

    /// Best-effort "is this one of ours" check. Never fails.
    pub fn probe(bytes: &[u8]) -> Option<Self> {
        Self::parse(bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = FileHeader::new(64, [1, 2, 3, 4, 5, 6, 7, 8]);
        let bytes = header.to_bytes();

        assert_eq!(bytes.len(), 17);
        assert_eq!(&bytes[..4], b"SEAL");
        assert_eq!(bytes[4], VERSION);
        assert_eq!(&bytes[5..9], &[0, 0, 0, 64]);
        assert_eq!(&bytes[9..], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(FileHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_parse_rejects_bad_magic() {
        let mut bytes = FileHeader::new(0, [0; 8]).to_bytes();
        bytes[0] ^= 0xFF;
        assert!(matches!(FileHeader::parse(&bytes), Err(SealError::Format(_))));
    }

    #[test]
    fn test_parse_rejects_short_input() {
        assert!(matches!(FileHeader::parse(&[0u8; 5]), Err(SealError::Format(_))));
    }

    #[test]
    fn test_probe_returns_none_on_garbage() {
        assert!(FileHeader::probe(b"plain text file, not encrypted").is_none());
        assert!(FileHeader::probe(&[]).is_none());
    }

    #[test]
    fn test_read_from_short_stream_is_format_error() {
        let mut reader: &[u8] = b"SEA";
        assert!(matches!(
            FileHeader::read_from(&mut reader),
            Err(SealError::Format(_))
        ));
    }
}
