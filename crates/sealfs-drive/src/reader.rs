//! Parallel cached reader
//!
//! A seekable, decrypted view of one virtual file for consumers that read
//! small pieces at scattered offsets (media players, archive browsers). A
//! small LRU set of buffers holds recently decrypted ranges; a miss fills
//! one buffer starting `back_offset` bytes before the requested position,
//! either from a single stream or split across worker threads, each with its
//! own decrypting stream writing a disjoint slice of the buffer.
//!
//! Every fill decrypts into a freshly allocated buffer that is only
//! installed once all workers are done, so a cancelled fill never leaves a
//! half-written buffer behind.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};

use sealfs_core::config::{ReaderSettings, MAX_READER_BUFFERS};
use sealfs_core::{SealError, SealResult};

use crate::file::{FileStream, VirtualFile};

/// Workers re-check cancellation between reads of this size.
const WORKER_STEP: usize = 64 * 1024;

/// Cancels outstanding fills of a [`CachedReader`] from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    epoch: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Abort the fill in progress; later reads start new fills.
    pub fn cancel(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Slot {
    start: u64,
    data: Option<Vec<u8>>,
    last_used: u64,
}

impl Slot {
    fn covers(&self, position: u64) -> bool {
        self.data
            .as_ref()
            .is_some_and(|d| position >= self.start && position < self.start + d.len() as u64)
    }
}

pub struct CachedReader {
    file: VirtualFile,
    len: u64,
    position: u64,
    mark: u64,
    buffer_size: usize,
    back_offset: usize,
    /// Alignment of worker parts: the file's chunk size, or one AES block
    part_align: u64,
    slots: Vec<Slot>,
    tick: u64,
    /// One stream per worker, opened lazily
    streams: Vec<Option<FileStream>>,
    pool: Option<rayon::ThreadPool>,
    cancel: CancelHandle,
}

impl CachedReader {
    pub fn new(file: VirtualFile, settings: &ReaderSettings) -> SealResult<Self> {
        if settings.buffers == 0 || settings.buffers > MAX_READER_BUFFERS {
            return Err(SealError::Config(format!(
                "reader buffers must be between 1 and {MAX_READER_BUFFERS}"
            )));
        }
        if settings.buffer_size == 0 {
            return Err(SealError::Config("reader buffer size must be positive".into()));
        }
        let threads = settings.threads.max(1);
        let pool = if threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("sealfs-reader-{i}"))
                .build()
                .map_err(|e| SealError::Io(io::Error::other(e)))?;
            Some(pool)
        } else {
            None
        };
        let len = file.len()?;
        let part_align = file.minimum_part_size()?;

        Ok(Self {
            file,
            len,
            position: 0,
            mark: 0,
            buffer_size: settings.buffer_size,
            back_offset: settings.back_offset,
            part_align,
            slots: (0..settings.buffers).map(|_| Slot::default()).collect(),
            tick: 0,
            streams: (0..threads).map(|_| None).collect(),
            pool,
            cancel: CancelHandle::default(),
        })
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move the cursor forward without reading; returns the bytes skipped.
    pub fn skip(&mut self, count: u64) -> u64 {
        let skipped = count.min(self.len.saturating_sub(self.position));
        self.position += skipped;
        skipped
    }

    /// Remember the current position for [`CachedReader::reset`].
    pub fn mark(&mut self) {
        self.mark = self.position;
    }

    /// Return to the last mark (the start of the file if none was set).
    pub fn reset(&mut self) {
        self.position = self.mark;
    }

    /// Drop all buffers and streams. Further reads fail.
    pub fn close(&mut self) {
        self.cancel.closed.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        self.slots.iter_mut().for_each(|s| *s = Slot::default());
        self.streams.iter_mut().for_each(|s| *s = None);
    }

    fn read_plain(&mut self, buf: &mut [u8]) -> SealResult<usize> {
        if self.cancel.is_closed() {
            return Err(SealError::Io(io::Error::other("reader is closed")));
        }
        if buf.is_empty() || self.position >= self.len {
            return Ok(0);
        }
        let index = match self.slots.iter().position(|s| s.covers(self.position)) {
            Some(index) => index,
            None => self.fill(self.position)?,
        };
        self.tick += 1;
        let slot = &mut self.slots[index];
        slot.last_used = self.tick;
        let Some(data) = slot.data.as_ref() else {
            return Ok(0);
        };
        let offset = (self.position - slot.start) as usize;
        let count = buf.len().min(data.len() - offset);
        buf[..count].copy_from_slice(&data[offset..offset + count]);
        self.position += count as u64;
        Ok(count)
    }

    /// Decrypt the range around `position` into a free or least recently used slot.
    ///
    /// An integrity failure past `position` shrinks the buffer to the verified
    /// prefix; the error surfaces once a read reaches the failed chunk.
    fn fill(&mut self, position: u64) -> SealResult<usize> {
        let start = position.saturating_sub(self.back_offset as u64);
        let size = ((self.buffer_size + self.back_offset) as u64).min(self.len - start) as usize;
        let epoch = self.cancel.epoch();

        let (data, failure) = if self.pool.is_some() && size as u64 > self.part_align {
            self.fill_parallel(start, size, epoch)?
        } else {
            self.fill_single(start, size, epoch)?
        };
        if self.cancel.epoch() != epoch {
            return Err(cancelled());
        }
        if let Some(err) = failure {
            if start + data.len() as u64 <= position {
                return Err(err);
            }
            tracing::debug!(start, verified = data.len(), error = %err, "keeping verified prefix");
        }

        let index = self
            .slots
            .iter()
            .position(|s| s.data.is_none())
            .or_else(|| {
                self.slots
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, s)| s.last_used)
                    .map(|(i, _)| i)
            })
            .unwrap_or(0);
        tracing::debug!(start, size = data.len(), slot = index, "filled reader buffer");
        self.slots[index] = Slot {
            start,
            data: Some(data),
            last_used: self.tick,
        };
        Ok(index)
    }

    fn fill_single(&mut self, start: u64, size: usize, epoch: u64) -> SealResult<Filled> {
        let mut data = vec![0u8; size];
        let stream = open_stream(&self.file, &mut self.streams[0])?;
        let (read, result) = read_part(stream, start, &mut data, &self.cancel, epoch);
        settle(data, read, result)
    }

    fn fill_parallel(&mut self, start: u64, size: usize, epoch: u64) -> SealResult<Filled> {
        let mut data = vec![0u8; size];
        let workers = self.streams.len() as u64;
        let part = (size as u64).div_ceil(workers).div_ceil(self.part_align) * self.part_align;
        let part = part as usize;
        let (tx, rx) = mpsc::channel::<(usize, usize, SealResult<()>)>();

        let file = &self.file;
        let cancel = &self.cancel;
        let streams = &mut self.streams;
        if let Some(pool) = &self.pool {
            pool.scope(|scope| {
                for (index, (slice, stream)) in data.chunks_mut(part).zip(streams.iter_mut()).enumerate() {
                    let tx = tx.clone();
                    scope.spawn(move |_| {
                        let offset = start + (index * part) as u64;
                        let (read, result) = match open_stream(file, stream) {
                            Ok(s) => read_part(s, offset, slice, cancel, epoch),
                            Err(e) => (0, Err(e)),
                        };
                        let _ = tx.send((index, read, result));
                    });
                }
            });
        }
        drop(tx);

        // the first failed part, in file order, bounds the verified prefix
        let mut outcomes: Vec<_> = rx.into_iter().collect();
        outcomes.sort_by_key(|(index, _, _)| *index);
        match outcomes.into_iter().find(|(_, _, result)| result.is_err()) {
            Some((index, read, result)) => settle(data, index * part + read, result),
            None => Ok((data, None)),
        }
    }
}

/// Decrypted buffer plus the integrity error that cut it short, if any
type Filled = (Vec<u8>, Option<SealError>);

/// Keep the first `verified` bytes when `result` is an integrity failure.
fn settle(mut data: Vec<u8>, verified: usize, result: SealResult<()>) -> SealResult<Filled> {
    match result {
        Ok(()) => Ok((data, None)),
        Err(err) if err.is_integrity() => {
            data.truncate(verified);
            Ok((data, Some(err)))
        }
        Err(err) => Err(err),
    }
}

fn open_stream<'s>(file: &VirtualFile, slot: &'s mut Option<FileStream>) -> SealResult<&'s mut FileStream> {
    if slot.is_none() {
        *slot = Some(file.input_stream()?);
    }
    slot.as_mut()
        .ok_or_else(|| SealError::Io(io::Error::other("reader stream unavailable")))
}

/// Fill `out` from `offset`; returns how many bytes were read before any error.
fn read_part(
    stream: &mut FileStream,
    offset: u64,
    out: &mut [u8],
    cancel: &CancelHandle,
    epoch: u64,
) -> (usize, SealResult<()>) {
    if let Err(e) = stream.seek(SeekFrom::Start(offset)) {
        return (0, Err(e.into()));
    }
    let mut read = 0;
    while read < out.len() {
        if cancel.epoch() != epoch {
            return (read, Err(cancelled()));
        }
        let end = (read + WORKER_STEP).min(out.len());
        match stream.read(&mut out[read..end]) {
            Ok(0) => {
                let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "file ended inside reader buffer");
                return (read, Err(eof.into()));
            }
            Ok(n) => read += n,
            Err(e) => return (read, Err(e.into())),
        }
    }
    (read, Ok(()))
}

fn cancelled() -> SealError {
    SealError::Io(io::Error::new(io::ErrorKind::Interrupted, "read cancelled"))
}

impl Read for CachedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_plain(buf).map_err(SealError::into_io)
    }
}

impl Seek for CachedReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::Current(d) => self.position.checked_add_signed(d),
            SeekFrom::End(d) => self.len.checked_add_signed(d),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file")
        })?;
        self.position = target;
        Ok(target)
    }
}

impl std::fmt::Debug for CachedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedReader")
            .field("file", &self.file)
            .field("len", &self.len)
            .field("position", &self.position)
            .field("threads", &self.streams.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::Drive;
    use sealfs_core::config::DriveSettings;
    use sealfs_sequence::MemorySequencer;
    use sealfs_storage::LocalFile;
    use secrecy::SecretString;
    use std::io::Write;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn stored(dir: &std::path::Path, data: &[u8], integrity: bool) -> VirtualFile {
        let settings = DriveSettings {
            kdf_iterations: 16,
            default_chunk_size: 1024,
            ..Default::default()
        };
        let drive = Drive::create(
            LocalFile::shared(dir),
            &SecretString::from("pw"),
            Arc::new(MemorySequencer::new()),
            settings,
        )
        .unwrap();
        let mut file = drive.root().create_file("data.bin").unwrap();
        file.set_integrity(integrity, None).unwrap();
        let mut out = file.output_stream().unwrap();
        out.write_all(data).unwrap();
        out.flush().unwrap();
        drop(out);
        file
    }

    fn reader_settings(threads: usize) -> ReaderSettings {
        ReaderSettings {
            buffers: 2,
            buffer_size: 4096,
            threads,
            back_offset: 512,
        }
    }

    #[test]
    fn test_sequential_read_matches() {
        let dir = tempfile::tempdir().unwrap();
        let data = sample(20_000);
        let file = stored(dir.path(), &data, true);

        for threads in [1, 3] {
            let mut reader = CachedReader::new(file.clone(), &reader_settings(threads)).unwrap();
            let mut out = Vec::new();
            reader.read_to_end(&mut out).unwrap();
            assert_eq!(out, data, "threads = {threads}");
        }
    }

    #[test]
    fn test_random_access_with_back_offset() {
        let dir = tempfile::tempdir().unwrap();
        let data = sample(50_000);
        let file = stored(dir.path(), &data, false);
        let mut reader = CachedReader::new(file, &reader_settings(2)).unwrap();

        for pos in [30_000u64, 29_800, 100, 49_990, 30_010] {
            reader.seek(SeekFrom::Start(pos)).unwrap();
            let mut buf = [0u8; 8];
            let n = reader.read(&mut buf).unwrap();
            assert!(n > 0);
            assert_eq!(&buf[..n], &data[pos as usize..pos as usize + n]);
        }
    }

    #[test]
    fn test_skip_mark_reset() {
        let dir = tempfile::tempdir().unwrap();
        let data = sample(10_000);
        let file = stored(dir.path(), &data, false);
        let mut reader = CachedReader::new(file, &reader_settings(1)).unwrap();

        assert_eq!(reader.skip(100), 100);
        reader.mark();
        let mut a = [0u8; 16];
        reader.read_exact(&mut a).unwrap();
        reader.reset();
        let mut b = [0u8; 16];
        reader.read_exact(&mut b).unwrap();
        assert_eq!(a, b);
        assert_eq!(&a, &data[100..116]);

        assert_eq!(reader.skip(1_000_000), 10_000 - 116);
        assert_eq!(reader.read(&mut a).unwrap(), 0);
    }

    #[test]
    fn test_seek_before_start_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = stored(dir.path(), &sample(100), false);
        let mut reader = CachedReader::new(file, &reader_settings(1)).unwrap();
        assert!(reader.seek(SeekFrom::Current(-1)).is_err());
        assert_eq!(reader.seek(SeekFrom::End(-10)).unwrap(), 90);
    }

    #[test]
    fn test_closed_reader_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = stored(dir.path(), &sample(100), false);
        let mut reader = CachedReader::new(file, &reader_settings(1)).unwrap();
        let mut buf = [0u8; 10];
        reader.read_exact(&mut buf).unwrap();
        reader.close();
        assert!(reader.read(&mut buf).is_err());
    }

    /// Store `chunks` KiB of sample data and flip a byte inside chunk `bad`.
    fn tampered(dir: &std::path::Path, chunks: usize, bad: usize) -> (VirtualFile, Vec<u8>) {
        let data = sample(chunks * 1024);
        let file = stored(dir, &data, true);
        let path = std::path::PathBuf::from(file.real_file().path());
        let mut raw = std::fs::read(&path).unwrap();
        raw[17 + bad * (1024 + 32) + 10] ^= 0x01;
        std::fs::write(&path, raw).unwrap();
        (file, data)
    }

    #[test]
    fn test_tampered_chunk_stops_read() {
        let dir = tempfile::tempdir().unwrap();
        let (file, data) = tampered(dir.path(), 4, 2);
        let settings = ReaderSettings {
            buffers: 1,
            buffer_size: 1024,
            threads: 1,
            back_offset: 0,
        };
        let mut reader = CachedReader::new(file, &settings).unwrap();
        let mut first = vec![0u8; 1024];
        reader.read_exact(&mut first).unwrap();
        assert_eq!(first, data[..1024]);

        reader.seek(SeekFrom::Start(2048)).unwrap();
        let err = reader.read(&mut first).unwrap_err();
        assert!(SealError::from(err).is_integrity());
    }

    #[test]
    fn test_later_tampered_chunk_spares_earlier_ones() {
        let large = ReaderSettings {
            buffer_size: 4 * 1024 * 1024,
            ..ReaderSettings::default()
        };
        let cases = [
            ReaderSettings::default(),
            ReaderSettings { threads: 4, ..ReaderSettings::default() },
            large.clone(),
            ReaderSettings { threads: 4, ..large },
        ];
        for settings in cases {
            let dir = tempfile::tempdir().unwrap();
            let (file, data) = tampered(dir.path(), 8, 5);
            let mut reader = CachedReader::new(file, &settings).unwrap();

            let mut chunk = vec![0u8; 1024];
            for i in 0..5 {
                reader.read_exact(&mut chunk).unwrap();
                assert_eq!(chunk, data[i * 1024..(i + 1) * 1024], "{settings:?} chunk {i}");
            }
            let err = reader.read(&mut chunk).unwrap_err();
            assert!(SealError::from(err).is_integrity(), "{settings:?}");
            assert_eq!(reader.position(), 5 * 1024);

            // a read straddling the bad chunk stops at the last verified byte
            reader.seek(SeekFrom::Start(4 * 1024 + 512)).unwrap();
            let mut wide = vec![0u8; 2048];
            assert_eq!(reader.read(&mut wide).unwrap(), 512, "{settings:?}");
            assert_eq!(wide[..512], data[4 * 1024 + 512..5 * 1024]);
            assert!(reader.read(&mut wide).is_err());

            reader.seek(SeekFrom::Start(0)).unwrap();
            reader.read_exact(&mut chunk).unwrap();
            assert_eq!(chunk, data[..1024], "{settings:?}");
        }
    }

    #[test]
    fn test_tampered_chunk_after_cached_prefix_with_back_offset() {
        let dir = tempfile::tempdir().unwrap();
        let (file, data) = tampered(dir.path(), 16, 12);
        let settings = ReaderSettings {
            buffers: 2,
            buffer_size: 8 * 1024,
            threads: 2,
            back_offset: 2048,
        };
        let mut reader = CachedReader::new(file, &settings).unwrap();

        reader.seek(SeekFrom::Start(9 * 1024)).unwrap();
        let mut chunk = vec![0u8; 1024];
        for i in 9..12 {
            reader.read_exact(&mut chunk).unwrap();
            assert_eq!(chunk, data[i * 1024..(i + 1) * 1024]);
        }
        assert!(reader.read(&mut chunk).is_err());

        reader.seek(SeekFrom::Start(13 * 1024)).unwrap();
        let err = reader.read(&mut chunk).unwrap_err();
        assert!(SealError::from(err).is_integrity());
    }

    #[test]
    fn test_invalid_buffer_count_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = stored(dir.path(), &sample(10), false);
        let settings = ReaderSettings {
            buffers: 7,
            ..reader_settings(1)
        };
        assert!(CachedReader::new(file, &settings).is_err());
    }
}
