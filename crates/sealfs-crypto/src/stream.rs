//! Seekable encrypt/decrypt stream over a ciphertext byte stream
//!
//! `AesStream` exposes the plaintext view through `Read`, `Write` and `Seek`.
//! The wrapped stream carries the 17-byte header followed by the body; with a
//! non-zero chunk size every chunk of ciphertext is followed by its tag.
//!
//! Decryption verifies a whole chunk before any byte of it is copied out.
//! Encryption buffers the current chunk and writes it (ciphertext + tag) when
//! it fills up, on `flush`, and on drop.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use sealfs_core::{SealError, SealResult};
use zeroize::Zeroize;

use crate::header::FileHeader;
use crate::integrity::{plaintext_len, Integrity};
use crate::nonce::Nonce;
use crate::transform::CtrTransformer;
use crate::{HASH_SIZE, KEY_SIZE};

const HEADER_LEN: u64 = FileHeader::SIZE as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    Encrypt,
    Decrypt,
}

#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    /// Permit seeking an encrypt stream away from its write position.
    ///
    /// Only for brand-new files filled by several writers over disjoint,
    /// chunk-aligned ranges. Rewriting a region would reuse its keystream.
    pub allow_range_write: bool,
}

pub struct AesStream<S: Read + Write + Seek> {
    inner: S,
    mode: EncryptionMode,
    header: FileHeader,
    transformer: CtrTransformer,
    /// Layout chunk size from the header, 0 = untagged body
    chunk_size: u32,
    /// Tag computation/verification; disabled means tags are skipped on read
    integrity: Integrity,
    position: u64,
    plain_len: u64,
    options: StreamOptions,
    /// Encrypt mode: plaintext of the chunk starting at `pending_start`
    pending: Vec<u8>,
    pending_start: u64,
    dirty: bool,
    /// Decrypt mode: last verified chunk
    cached: Option<(u64, Vec<u8>)>,
}

impl<S: Read + Write + Seek> AesStream<S> {
    /// Start a new encrypted file at the beginning of `inner`.
    ///
    /// The header is written immediately. With integrity enabled, the header
    /// records its chunk size and every chunk gets a tag.
    pub fn encrypt(
        key: &[u8; KEY_SIZE],
        nonce: Nonce,
        integrity: Integrity,
        mut inner: S,
        options: StreamOptions,
    ) -> SealResult<Self> {
        let header = FileHeader::new(integrity.chunk_size(), nonce);
        inner.seek(SeekFrom::Start(0))?;
        inner.write_all(&header.to_bytes())?;

        Ok(Self {
            inner,
            mode: EncryptionMode::Encrypt,
            header,
            transformer: CtrTransformer::new(key, &nonce),
            chunk_size: integrity.chunk_size(),
            integrity,
            position: 0,
            plain_len: 0,
            options,
            pending: Vec::new(),
            pending_start: 0,
            dirty: false,
            cached: None,
        })
    }

    /// Open an existing encrypted file for reading.
    ///
    /// With `verify_key` set, every chunk is checked against its tag and a
    /// file without tags is refused. Without it, tags are skipped unchecked.
    pub fn decrypt(
        key: &[u8; KEY_SIZE],
        verify_key: Option<&[u8; KEY_SIZE]>,
        mut inner: S,
        options: StreamOptions,
    ) -> SealResult<Self> {
        inner.seek(SeekFrom::Start(0))?;
        let header = FileHeader::read_from(&mut inner)?;
        if header.chunk_size % 16 != 0 {
            return Err(SealError::Format(format!(
                "header chunk size {} is not block aligned",
                header.chunk_size
            )));
        }
        let integrity = match verify_key {
            Some(_) if header.chunk_size == 0 => {
                return Err(SealError::Integrity(
                    "integrity verification requested but the file carries no tags".into(),
                ))
            }
            Some(hash_key) => Integrity::new(header.chunk_size, hash_key)
                .map_err(|e| SealError::Format(e.to_string()))?,
            None => Integrity::disabled(),
        };
        let real_len = inner.seek(SeekFrom::End(0))?;

        Ok(Self {
            inner,
            mode: EncryptionMode::Decrypt,
            transformer: CtrTransformer::new(key, &header.nonce),
            chunk_size: header.chunk_size,
            header,
            integrity,
            position: 0,
            plain_len: plaintext_len(real_len, header.chunk_size),
            options,
            pending: Vec::new(),
            pending_start: 0,
            dirty: false,
            cached: None,
        })
    }

    pub fn mode(&self) -> EncryptionMode {
        self.mode
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Logical plaintext length
    pub fn len(&self) -> u64 {
        self.plain_len.max(self.position)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Alignment writers should respect: the chunk size, or one AES block.
    pub fn align_size(&self) -> u64 {
        if self.chunk_size > 0 {
            self.chunk_size as u64
        } else {
            crate::BLOCK_SIZE as u64
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    fn read_plain(&mut self, buf: &mut [u8]) -> SealResult<usize> {
        if self.mode != EncryptionMode::Decrypt {
            return Err(SealError::Security("stream is open for encryption".into()));
        }
        if buf.is_empty() || self.position >= self.plain_len {
            return Ok(0);
        }
        if self.chunk_size == 0 {
            self.read_untagged(buf)
        } else {
            self.read_chunked(buf)
        }
    }

    fn read_untagged(&mut self, buf: &mut [u8]) -> SealResult<usize> {
        let available = (self.plain_len - self.position).min(buf.len() as u64) as usize;
        let out = &mut buf[..available];
        self.inner.seek(SeekFrom::Start(HEADER_LEN + self.position))?;
        self.inner.read_exact(out)?;
        self.transformer.apply_at(self.position, out)?;
        self.position += available as u64;
        Ok(available)
    }

    fn read_chunked(&mut self, buf: &mut [u8]) -> SealResult<usize> {
        let chunk = self.chunk_size as u64;
        let mut copied = 0;
        while copied < buf.len() && self.position < self.plain_len {
            let index = self.position / chunk;
            let offset = (self.position % chunk) as usize;
            if let Err(e) = self.load_chunk(index) {
                // bytes already copied were verified; report the failure on the next call
                if copied > 0 {
                    break;
                }
                return Err(e);
            }
            let Some((_, data)) = self.cached.as_ref() else {
                break;
            };
            if offset >= data.len() {
                break;
            }
            let n = (buf.len() - copied).min(data.len() - offset);
            buf[copied..copied + n].copy_from_slice(&data[offset..offset + n]);
            copied += n;
            self.position += n as u64;
        }
        Ok(copied)
    }

    /// Read, verify and decrypt chunk `index` into the cache.
    fn load_chunk(&mut self, index: u64) -> SealResult<()> {
        if matches!(&self.cached, Some((cached, _)) if *cached == index) {
            return Ok(());
        }
        let chunk = self.chunk_size as u64;
        let plain_start = index * chunk;
        let plain_size = chunk.min(self.plain_len - plain_start) as usize;
        let real_start = HEADER_LEN + index * (chunk + HASH_SIZE as u64);

        let mut raw = vec![0u8; plain_size + HASH_SIZE];
        self.inner.seek(SeekFrom::Start(real_start))?;
        self.inner.read_exact(&mut raw).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                SealError::Integrity(format!("chunk {index} is truncated"))
            } else {
                SealError::from(e)
            }
        })?;

        let tag = raw.split_off(plain_size);
        if self.integrity.is_enabled() {
            self.integrity.verify_chunk(&self.header, index, &raw, &tag)?;
        }
        self.transformer.apply_at(plain_start, &mut raw)?;
        if let Some((_, mut old)) = self.cached.replace((index, raw)) {
            old.zeroize();
        }
        Ok(())
    }

    fn write_plain(&mut self, buf: &[u8]) -> SealResult<usize> {
        if self.mode != EncryptionMode::Encrypt {
            return Err(SealError::Security("stream is open for decryption".into()));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let written = if self.chunk_size == 0 {
            self.write_untagged(buf)?
        } else {
            self.write_chunked(buf)?
        };
        self.plain_len = self.plain_len.max(self.position);
        Ok(written)
    }

    fn write_untagged(&mut self, buf: &[u8]) -> SealResult<usize> {
        let mut data = buf.to_vec();
        self.transformer.apply_at(self.position, &mut data)?;
        self.inner.seek(SeekFrom::Start(HEADER_LEN + self.position))?;
        self.inner.write_all(&data)?;
        self.position += data.len() as u64;
        Ok(data.len())
    }

    fn write_chunked(&mut self, buf: &[u8]) -> SealResult<usize> {
        let chunk = self.chunk_size as usize;
        let mut consumed = 0;
        while consumed < buf.len() {
            let take = (chunk - self.pending.len()).min(buf.len() - consumed);
            self.pending.extend_from_slice(&buf[consumed..consumed + take]);
            self.dirty = true;
            consumed += take;
            self.position += take as u64;
            if self.pending.len() == chunk {
                self.write_pending()?;
                self.pending.zeroize();
                self.pending.clear();
                self.pending_start += chunk as u64;
            }
        }
        Ok(consumed)
    }

    /// Encrypt, tag and write the buffered chunk in place.
    ///
    /// A partial chunk stays buffered so later writes can extend it; it is
    /// rewritten at the same offset with the same keystream when it grows.
    fn write_pending(&mut self) -> SealResult<()> {
        if !self.dirty || self.pending.is_empty() {
            return Ok(());
        }
        let chunk = self.chunk_size as u64;
        let index = self.pending_start / chunk;
        let mut ciphertext = self.pending.clone();
        self.transformer.apply_at(self.pending_start, &mut ciphertext)?;
        let tag = self.integrity.chunk_tag(&self.header, index, &ciphertext)?;

        let real_start = HEADER_LEN + index * (chunk + HASH_SIZE as u64);
        self.inner.seek(SeekFrom::Start(real_start))?;
        self.inner.write_all(&ciphertext)?;
        self.inner.write_all(&tag)?;
        self.dirty = false;
        Ok(())
    }

    fn flush_plain(&mut self) -> SealResult<()> {
        if self.mode == EncryptionMode::Encrypt {
            self.write_pending()?;
        }
        self.inner.flush()?;
        Ok(())
    }

    fn seek_plain(&mut self, pos: SeekFrom) -> SealResult<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::Current(off) => self.position.checked_add_signed(off),
            SeekFrom::End(off) => self.len().checked_add_signed(off),
        }
        .ok_or_else(|| {
            SealError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of stream",
            ))
        })?;

        if self.mode == EncryptionMode::Decrypt || target == self.position {
            self.position = target;
            return Ok(target);
        }
        if !self.options.allow_range_write {
            return Err(SealError::Security(
                "range write is not allowed on an encrypt stream".into(),
            ));
        }
        if self.chunk_size > 0 && target % self.chunk_size as u64 != 0 {
            return Err(SealError::Security(format!(
                "range write position {target} is not aligned to chunk size {}",
                self.chunk_size
            )));
        }
        self.write_pending()?;
        self.pending.zeroize();
        self.pending.clear();
        self.pending_start = target;
        self.position = target;
        Ok(target)
    }
}

impl<S: Read + Write + Seek> Read for AesStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_plain(buf).map_err(SealError::into_io)
    }
}

impl<S: Read + Write + Seek> Write for AesStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_plain(buf).map_err(SealError::into_io)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_plain().map_err(SealError::into_io)
    }
}

impl<S: Read + Write + Seek> Seek for AesStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.seek_plain(pos).map_err(SealError::into_io)
    }
}

impl<S: Read + Write + Seek> Drop for AesStream<S> {
    fn drop(&mut self) {
        if self.mode == EncryptionMode::Encrypt && self.dirty {
            if let Err(e) = self.flush_plain() {
                tracing::warn!("failed to flush encrypt stream on drop: {e}");
            }
        }
        self.pending.zeroize();
        if let Some((_, data)) = self.cached.as_mut() {
            data.zeroize();
        }
    }
}

impl<S: Read + Write + Seek> std::fmt::Debug for AesStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesStream")
            .field("mode", &self.mode)
            .field("header", &self.header)
            .field("integrity", &self.integrity)
            .field("position", &self.position)
            .field("len", &self.len())
            .finish()
    }
}

/// Encrypt an in-memory buffer into header ‖ body.
pub fn encrypt_bytes(
    data: &[u8],
    key: &[u8; KEY_SIZE],
    nonce: Nonce,
    integrity: Integrity,
) -> SealResult<Vec<u8>> {
    let mut stream = AesStream::encrypt(
        key,
        nonce,
        integrity,
        Cursor::new(Vec::new()),
        StreamOptions::default(),
    )?;
    stream.write_all(data)?;
    stream.flush()?;
    Ok(std::mem::take(stream.get_mut().get_mut()))
}

/// Decrypt the output of [`encrypt_bytes`].
pub fn decrypt_bytes(
    data: &[u8],
    key: &[u8; KEY_SIZE],
    verify_key: Option<&[u8; KEY_SIZE]>,
) -> SealResult<Vec<u8>> {
    let mut stream = AesStream::decrypt(
        key,
        verify_key,
        Cursor::new(data.to_vec()),
        StreamOptions::default(),
    )?;
    let mut out = Vec::with_capacity(stream.len() as usize);
    stream.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::encrypted_len;
    use proptest::prelude::*;

    const KEY: [u8; KEY_SIZE] = [0x11; KEY_SIZE];
    const HASH_KEY: [u8; KEY_SIZE] = [0x22; KEY_SIZE];
    const NONCE: Nonce = [0, 0, 0, 0, 0, 0, 0, 7];

    fn tagged(chunk: u32) -> Integrity {
        Integrity::new(chunk, &HASH_KEY).unwrap()
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn test_roundtrip_without_integrity() {
        let data = sample(1000);
        let enc = encrypt_bytes(&data, &KEY, NONCE, Integrity::disabled()).unwrap();
        assert_eq!(enc.len() as u64, encrypted_len(1000, 0));
        assert_eq!(decrypt_bytes(&enc, &KEY, None).unwrap(), data);
    }

    #[test]
    fn test_hello_world_chunk_64() {
        let enc = encrypt_bytes(b"hello world", &KEY, NONCE, tagged(64)).unwrap();
        assert_eq!(enc.len(), FileHeader::SIZE + 11 + HASH_SIZE);
        assert_eq!(
            decrypt_bytes(&enc, &KEY, Some(&HASH_KEY)).unwrap(),
            b"hello world"
        );

        let mut tampered = enc.clone();
        tampered[FileHeader::SIZE + 5] ^= 0x01;
        let err = decrypt_bytes(&tampered, &KEY, Some(&HASH_KEY)).unwrap_err();
        assert!(err.is_integrity(), "got {err:?}");
    }

    #[test]
    fn test_tampered_tag_detected() {
        let data = sample(200);
        let mut enc = encrypt_bytes(&data, &KEY, NONCE, tagged(64)).unwrap();
        // tag of chunk 0 sits right after its 64 bytes of ciphertext
        enc[FileHeader::SIZE + 64 + 3] ^= 0x10;
        assert!(decrypt_bytes(&enc, &KEY, Some(&HASH_KEY))
            .unwrap_err()
            .is_integrity());
    }

    #[test]
    fn test_later_chunk_tamper_keeps_earlier_chunks_readable() {
        let data = sample(64 * 4);
        let mut enc = encrypt_bytes(&data, &KEY, NONCE, tagged(64)).unwrap();
        let chunk3 = FileHeader::SIZE + 3 * (64 + HASH_SIZE);
        enc[chunk3 + 10] ^= 0xFF;

        let mut stream =
            AesStream::decrypt(&KEY, Some(&HASH_KEY), Cursor::new(enc), StreamOptions::default())
                .unwrap();
        let mut first = vec![0u8; 64 * 3];
        stream.read_exact(&mut first).unwrap();
        assert_eq!(first, &data[..64 * 3]);

        let mut rest = vec![0u8; 64];
        let err = SealError::from(stream.read(&mut rest).unwrap_err());
        assert!(err.is_integrity());
    }

    #[test]
    fn test_read_spanning_bad_chunk_returns_verified_prefix() {
        let data = sample(64 * 2);
        let mut enc = encrypt_bytes(&data, &KEY, NONCE, tagged(64)).unwrap();
        enc[FileHeader::SIZE + 64 + HASH_SIZE + 1] ^= 0x01;

        let mut stream =
            AesStream::decrypt(&KEY, Some(&HASH_KEY), Cursor::new(enc), StreamOptions::default())
                .unwrap();
        let mut buf = vec![0u8; 128];
        let n = stream.read(&mut buf).unwrap();
        assert_eq!(n, 64);
        assert_eq!(&buf[..64], &data[..64]);
        assert!(stream.read(&mut buf).is_err());
    }

    #[test]
    fn test_swapped_chunks_detected() {
        let data = sample(128);
        let enc = encrypt_bytes(&data, &KEY, NONCE, tagged(64)).unwrap();
        let stride = 64 + HASH_SIZE;
        let body = &enc[FileHeader::SIZE..];
        let mut swapped = enc[..FileHeader::SIZE].to_vec();
        swapped.extend_from_slice(&body[stride..]);
        swapped.extend_from_slice(&body[..stride]);

        assert!(decrypt_bytes(&swapped, &KEY, Some(&HASH_KEY)).is_err());
    }

    #[test]
    fn test_tags_skipped_without_verify_key() {
        let data = sample(300);
        let enc = encrypt_bytes(&data, &KEY, NONCE, tagged(64)).unwrap();
        assert_eq!(decrypt_bytes(&enc, &KEY, None).unwrap(), data);
    }

    #[test]
    fn test_verify_refuses_untagged_file() {
        let enc = encrypt_bytes(b"abc", &KEY, NONCE, Integrity::disabled()).unwrap();
        assert!(decrypt_bytes(&enc, &KEY, Some(&HASH_KEY))
            .unwrap_err()
            .is_integrity());
    }

    #[test]
    fn test_bad_header_is_format_error() {
        let mut enc = encrypt_bytes(b"abc", &KEY, NONCE, Integrity::disabled()).unwrap();
        enc[1] = b'X';
        assert!(matches!(
            decrypt_bytes(&enc, &KEY, None),
            Err(SealError::Format(_))
        ));
    }

    #[test]
    fn test_seek_and_read_middle() {
        let data = sample(5000);
        let enc = encrypt_bytes(&data, &KEY, NONCE, tagged(256)).unwrap();
        let mut stream =
            AesStream::decrypt(&KEY, Some(&HASH_KEY), Cursor::new(enc), StreamOptions::default())
                .unwrap();
        assert_eq!(stream.len(), 5000);

        stream.seek(SeekFrom::Start(1234)).unwrap();
        let mut buf = vec![0u8; 700];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(buf, &data[1234..1934]);

        stream.seek(SeekFrom::End(-10)).unwrap();
        let mut tail = Vec::new();
        stream.read_to_end(&mut tail).unwrap();
        assert_eq!(tail, &data[4990..]);
    }

    #[test]
    fn test_small_writes_buffer_into_chunks() {
        let data = sample(1000);
        let mut stream = AesStream::encrypt(
            &KEY,
            NONCE,
            tagged(64),
            Cursor::new(Vec::new()),
            StreamOptions::default(),
        )
        .unwrap();
        for piece in data.chunks(7) {
            stream.write_all(piece).unwrap();
        }
        stream.flush().unwrap();
        let enc = stream.get_ref().get_ref().clone();
        drop(stream);

        assert_eq!(enc.len() as u64, encrypted_len(1000, 64));
        assert_eq!(decrypt_bytes(&enc, &KEY, Some(&HASH_KEY)).unwrap(), data);
    }

    #[test]
    fn test_drop_flushes_partial_chunk() {
        let mut buffer = Vec::new();
        {
            let mut stream = AesStream::encrypt(
                &KEY,
                NONCE,
                tagged(64),
                Cursor::new(&mut buffer),
                StreamOptions::default(),
            )
            .unwrap();
            stream.write_all(b"short").unwrap();
        }
        assert_eq!(decrypt_bytes(&buffer, &KEY, Some(&HASH_KEY)).unwrap(), b"short");
    }

    #[test]
    fn test_range_write_refused_by_default() {
        let mut stream = AesStream::encrypt(
            &KEY,
            NONCE,
            Integrity::disabled(),
            Cursor::new(Vec::new()),
            StreamOptions::default(),
        )
        .unwrap();
        stream.write_all(b"0123456789").unwrap();
        let err = SealError::from(stream.seek(SeekFrom::Start(0)).unwrap_err());
        assert!(err.is_security());
        // querying the position is still fine
        assert_eq!(stream.stream_position().unwrap(), 10);
    }

    #[test]
    fn test_parallel_style_range_writes() {
        let data = sample(64 * 5 + 9);
        let mut buffer = Vec::new();
        {
            let options = StreamOptions {
                allow_range_write: true,
            };
            let mut stream =
                AesStream::encrypt(&KEY, NONCE, tagged(64), Cursor::new(&mut buffer), options)
                    .unwrap();
            // second half first, then the first half
            stream.seek(SeekFrom::Start(128)).unwrap();
            stream.write_all(&data[128..]).unwrap();
            stream.seek(SeekFrom::Start(0)).unwrap();
            stream.write_all(&data[..128]).unwrap();
            stream.flush().unwrap();
        }
        assert_eq!(decrypt_bytes(&buffer, &KEY, Some(&HASH_KEY)).unwrap(), data);
    }

    #[test]
    fn test_unaligned_range_write_refused_with_integrity() {
        let options = StreamOptions {
            allow_range_write: true,
        };
        let mut stream =
            AesStream::encrypt(&KEY, NONCE, tagged(64), Cursor::new(Vec::new()), options).unwrap();
        assert!(stream.seek(SeekFrom::Start(10)).is_err());
    }

    #[test]
    fn test_wrong_direction_is_security_error() {
        let enc = encrypt_bytes(b"abc", &KEY, NONCE, Integrity::disabled()).unwrap();
        let mut stream =
            AesStream::decrypt(&KEY, None, Cursor::new(enc), StreamOptions::default()).unwrap();
        let err = SealError::from(stream.write(b"x").unwrap_err());
        assert!(err.is_security());
    }

    proptest! {
        #[test]
        fn prop_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..2048),
                          chunk in prop_oneof![Just(0u32), Just(16u32), Just(64u32), Just(1024u32)],
                          nonce in any::<[u8; 8]>()) {
            let integrity = if chunk == 0 { Integrity::disabled() } else { tagged(chunk) };
            let verify = if chunk == 0 { None } else { Some(&HASH_KEY) };
            let enc = encrypt_bytes(&data, &KEY, nonce, integrity).unwrap();
            prop_assert_eq!(enc.len() as u64, encrypted_len(data.len() as u64, chunk));
            prop_assert_eq!(decrypt_bytes(&enc, &KEY, verify).unwrap(), data);
        }
    }
}
