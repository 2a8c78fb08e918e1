use std::io;

use thiserror::Error;

pub type SealResult<T> = Result<T, SealError>;

#[derive(Debug, Error)]
pub enum SealError {
    /// Bad or missing key, nonce misuse, overwrite without permission
    #[error("security error: {0}")]
    Security(String),

    /// Wrong password, drive locked, device not authorized
    #[error("authentication error: {0}")]
    Auth(String),

    /// HMAC mismatch on a chunk
    #[error("integrity error: {0}")]
    Integrity(String),

    /// The sequencer ran out of nonces for this authorization
    #[error("nonce range exceeded: {0}")]
    RangeExceeded(String),

    /// Malformed header, drive config, or auth payload
    #[error("format error: {0}")]
    Format(String),

    /// Illegal sequence state transition
    #[error("sequence error: {0}")]
    Sequence(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(io::Error),
}

impl SealError {
    /// Wrap this error for a `std::io` trait boundary.
    ///
    /// Plain I/O errors pass through untouched; everything else travels as the
    /// inner error of an `io::Error` and is recovered by `From<io::Error>`.
    pub fn into_io(self) -> io::Error {
        match self {
            SealError::Io(err) => err,
            SealError::Integrity(_) | SealError::Format(_) => {
                io::Error::new(io::ErrorKind::InvalidData, self)
            }
            other => io::Error::other(other),
        }
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, SealError::Integrity(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, SealError::Auth(_))
    }

    pub fn is_security(&self) -> bool {
        matches!(self, SealError::Security(_))
    }

    pub fn is_range_exceeded(&self) -> bool {
        matches!(self, SealError::RangeExceeded(_))
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        SealError::Io(io::Error::new(io::ErrorKind::NotFound, what.into()))
    }
}

impl From<io::Error> for SealError {
    fn from(err: io::Error) -> Self {
        let wrapped = err
            .get_ref()
            .is_some_and(|inner| inner.is::<SealError>());
        if !wrapped {
            return SealError::Io(err);
        }
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<SealError>()) {
            Some(Ok(seal)) => *seal,
            _ => SealError::Io(io::Error::from(kind)),
        }
    }
}
