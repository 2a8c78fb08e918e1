//! Pieces shared by the importer and exporter: part planning, the worker
//! pool, and the buffered range copy each worker runs.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};

use sealfs_core::{SealError, SealResult};

/// Byte progress callback, `(done, total)`; called from worker threads.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, u64) + Sync);

/// Stop flag shared between a transfer and whoever wants to cancel it
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Guard marking a transfer as running; refuses a second concurrent one.
pub(crate) struct Running<'a>(&'a AtomicBool);

impl<'a> Running<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool, what: &str) -> SealResult<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            return Err(SealError::Io(io::Error::new(
                io::ErrorKind::ResourceBusy,
                format!("another {what} is running"),
            )));
        }
        Ok(Self(flag))
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Split `size` bytes into about `threads` parts aligned to `min_part`.
///
/// Every part but the last is a multiple of `min_part`; small files and a
/// single thread yield one part.
pub(crate) fn plan_parts(size: u64, threads: usize, min_part: u64) -> Vec<(u64, u64)> {
    let min_part = min_part.max(1);
    if threads <= 1 || size <= min_part {
        return vec![(0, size)];
    }
    let mut part = size.div_ceil(threads as u64);
    if part > min_part {
        part -= part % min_part;
    } else {
        part = min_part;
    }
    let count = (size / part).max(1);
    (0..count)
        .map(|i| {
            let start = i * part;
            let len = if i == count - 1 { size - start } else { part };
            (start, len)
        })
        .collect()
}

/// Run `job` for every part, in parallel when there is more than one.
///
/// All parts run to completion (or notice the stop flag); the first error
/// is returned.
pub(crate) fn run_parts<F>(parts: &[(u64, u64)], threads: usize, job: F) -> SealResult<()>
where
    F: Fn(u64, u64) -> SealResult<()> + Sync,
{
    if let [(start, len)] = parts {
        return job(*start, *len);
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.min(parts.len()).max(1))
        .build()
        .map_err(|e| SealError::Io(io::Error::other(e)))?;
    let (tx, rx) = mpsc::channel();
    pool.scope(|scope| {
        for &(start, len) in parts {
            let tx = tx.clone();
            let job = &job;
            scope.spawn(move |_| {
                let _ = tx.send(job(start, len));
            });
        }
    });
    drop(tx);
    rx.into_iter().collect::<SealResult<Vec<()>>>().map(|_| ())
}

/// Copy `len` bytes at `start` from `src` to `dst`.
///
/// The buffer is rounded down to `align` so encrypted writers only ever
/// see whole chunks until the end of the part.
#[allow(clippy::too_many_arguments)]
pub(crate) fn copy_range<R, W>(
    src: &mut R,
    dst: &mut W,
    start: u64,
    len: u64,
    buffer_size: usize,
    align: u64,
    stop: &StopHandle,
    done: &AtomicU64,
    total: u64,
    progress: Option<ProgressFn<'_>>,
) -> SealResult<()>
where
    R: Read + Seek + ?Sized,
    W: Write + Seek + ?Sized,
{
    src.seek(SeekFrom::Start(start))?;
    dst.seek(SeekFrom::Start(start))?;
    let align = align.max(1) as usize;
    let size = (buffer_size / align * align).max(align);
    let mut buf = vec![0u8; size];
    let mut copied = 0u64;
    while copied < len {
        if stop.is_stopped() {
            break;
        }
        let want = (len - copied).min(size as u64) as usize;
        let n = src.read(&mut buf[..want])?;
        if n == 0 {
            return Err(SealError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("source ended at {} of part {start}+{len}", start + copied),
            )));
        }
        dst.write_all(&buf[..n])?;
        copied += n as u64;
        let so_far = done.fetch_add(n as u64, Ordering::SeqCst) + n as u64;
        if let Some(report) = progress {
            report(so_far, total);
        }
    }
    dst.flush()?;
    Ok(())
}

pub(crate) fn stopped_error() -> SealError {
    SealError::Io(io::Error::new(io::ErrorKind::Interrupted, "transfer stopped"))
}
