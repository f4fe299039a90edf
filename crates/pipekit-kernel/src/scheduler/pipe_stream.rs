//! Bounded byte pipe with backpressure connecting adjacent stages.
//!
//! The writer blocks when the buffer is full, matching OS pipe semantics
//! with ~64KB kernel buffers.
//!
//! ```text
//!   PipeWriter ──▶ [VecDeque<u8> ring buffer] ──▶ PipeReader
//!                  ├── writer blocks when full (backpressure)
//!                  ├── reader blocks when empty
//!                  ├── close()  → reader drains, then EOF (returns 0)
//!                  ├── abort()  → reader drains, then PipeAborted error
//!                  ├── drop writer unclosed → same as abort
//!                  └── drop reader → broken pipe (writer returns error)
//! ```
//!
//! Implementation uses `std::sync::Mutex` (not tokio) since critical sections
//! are just VecDeque operations (microseconds). Closed flags are `AtomicBool`
//! so Drop is always synchronous. Wakers are stored under the lock to prevent
//! lost wakeups.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Default pipe buffer capacity (matches Linux kernel pipe default).
pub const PIPE_BUFFER_SIZE: usize = 64 * 1024;

/// Abnormal-close marker carried from a failed writer to its reader.
///
/// Delivered to the reader as an `io::Error` of kind `Other` wrapping this
/// value, after all buffered bytes have been read.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("stage '{stage}' aborted: {message}")]
pub struct PipeAborted {
    /// Stage that owned the write end.
    pub stage: String,
    /// Why it stopped.
    pub message: String,
}

impl PipeAborted {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Buffer occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeStats {
    /// Configured bound.
    pub capacity: usize,
    /// Bytes currently buffered.
    pub buffered: usize,
    /// Largest number of bytes ever buffered at once.
    pub high_water: usize,
}

/// Shared mutable state protected by std::sync::Mutex.
struct PipeBuffer {
    buffer: VecDeque<u8>,
    capacity: usize,
    high_water: usize,
    /// Set by `abort()` before `writer_closed`; checked once the buffer drains.
    aborted: Option<PipeAborted>,
    /// Waker for the reader task (set when reader finds empty buffer).
    reader_waker: Option<Waker>,
    /// Waker for the writer task (set when writer finds full buffer).
    writer_waker: Option<Waker>,
}

/// Shared state between PipeWriter and PipeReader.
struct PipeShared {
    buf: Mutex<PipeBuffer>,
    /// Writer has finished (normally or not).
    writer_closed: AtomicBool,
    /// Reader has been dropped (broken pipe).
    reader_closed: AtomicBool,
}

impl PipeShared {
    fn lock(&self) -> MutexGuard<'_, PipeBuffer> {
        self.buf.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stats(&self) -> PipeStats {
        let inner = self.lock();
        PipeStats {
            capacity: inner.capacity,
            buffered: inner.buffer.len(),
            high_water: inner.high_water,
        }
    }
}

/// Writing end of a pipe stream.
pub struct PipeWriter {
    shared: Arc<PipeShared>,
    /// Producer name, used when the writer is dropped without closing.
    label: String,
    finished: bool,
}

/// Reading end of a pipe stream.
pub struct PipeReader {
    shared: Arc<PipeShared>,
}

/// Create a bounded pipe stream pair with the given capacity.
///
/// A zero capacity is bumped to one byte so writers can always make progress.
pub fn pipe_stream(capacity: usize) -> (PipeWriter, PipeReader) {
    let capacity = capacity.max(1);
    let shared = Arc::new(PipeShared {
        buf: Mutex::new(PipeBuffer {
            buffer: VecDeque::with_capacity(capacity.min(8192)),
            capacity,
            high_water: 0,
            aborted: None,
            reader_waker: None,
            writer_waker: None,
        }),
        writer_closed: AtomicBool::new(false),
        reader_closed: AtomicBool::new(false),
    });

    (
        PipeWriter {
            shared: shared.clone(),
            label: String::from("upstream"),
            finished: false,
        },
        PipeReader { shared },
    )
}

/// Create a pipe stream pair with the default capacity (64KB).
pub fn pipe_stream_default() -> (PipeWriter, PipeReader) {
    pipe_stream(PIPE_BUFFER_SIZE)
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed")
}

impl PipeWriter {
    /// Name the producing stage for diagnostics.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Write data to the pipe, blocking if the buffer is full.
    ///
    /// Returns the number of bytes accepted, or a broken-pipe error if the
    /// reader has been dropped.
    pub async fn write_bytes(&self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        std::future::poll_fn(|cx| self.poll_write_impl(cx, data)).await
    }

    /// Write all of `data`, waiting for space as needed.
    pub async fn write_all_bytes(&self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            let n = self.write_bytes(data).await?;
            data = &data[n..];
        }
        Ok(())
    }

    /// Signal end-of-data. The reader drains what is buffered, then sees EOF.
    pub fn close(&mut self) {
        self.finish(None);
    }

    /// Signal abnormal termination. The reader drains what is buffered,
    /// then gets an error carrying `aborted`.
    pub fn abort(&mut self, aborted: PipeAborted) {
        self.finish(Some(aborted));
    }

    /// Whether the reading end has gone away.
    pub fn is_reader_closed(&self) -> bool {
        self.shared.reader_closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PipeStats {
        self.shared.stats()
    }

    fn finish(&mut self, aborted: Option<PipeAborted>) {
        if self.finished {
            return;
        }
        self.finished = true;
        let mut inner = self.shared.lock();
        if aborted.is_some() {
            inner.aborted = aborted;
        }
        self.shared.writer_closed.store(true, Ordering::Release);
        if let Some(waker) = inner.reader_waker.take() {
            waker.wake();
        }
        tracing::trace!(stage = %self.label, aborted = inner.aborted.is_some(), "pipe writer finished");
    }

    /// Shared poll implementation used by both AsyncWrite and write_bytes.
    fn poll_write_impl(&self, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        if self.finished {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::Other,
                "write after pipe close",
            )));
        }
        if self.shared.reader_closed.load(Ordering::Acquire) {
            return Poll::Ready(Err(broken_pipe()));
        }

        let mut inner = self.shared.lock();

        // Re-check reader_closed under lock (writer may have raced with reader drop)
        if self.shared.reader_closed.load(Ordering::Acquire) {
            return Poll::Ready(Err(broken_pipe()));
        }

        let available = inner.capacity.saturating_sub(inner.buffer.len());
        if available > 0 {
            let to_write = buf.len().min(available);
            inner.buffer.extend(&buf[..to_write]);
            inner.high_water = inner.high_water.max(inner.buffer.len());
            if let Some(waker) = inner.reader_waker.take() {
                waker.wake();
            }
            Poll::Ready(Ok(to_write))
        } else {
            // Buffer full; register waker so reader can wake us
            inner.writer_waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl AsyncWrite for PipeWriter {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.poll_write_impl(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.close();
        Poll::Ready(Ok(()))
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        // A writer that never said it was done did not finish cleanly
        // (panic, or a caller forgot). Never let that look like EOF.
        if !self.finished {
            let aborted = PipeAborted::new(self.label.clone(), "writer dropped without close");
            self.finish(Some(aborted));
        }
    }
}

impl PipeReader {
    pub fn stats(&self) -> PipeStats {
        self.shared.stats()
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let mut inner = self.shared.lock();

        if !inner.buffer.is_empty() {
            let to_read = buf.remaining().min(inner.buffer.len());
            let (front, back) = inner.buffer.as_slices();

            if to_read <= front.len() {
                buf.put_slice(&front[..to_read]);
            } else {
                buf.put_slice(front);
                let remaining = to_read - front.len();
                buf.put_slice(&back[..remaining]);
            }

            inner.buffer.drain(..to_read);
            if let Some(waker) = inner.writer_waker.take() {
                waker.wake();
            }
            Poll::Ready(Ok(()))
        } else if let Some(aborted) = &inner.aborted {
            Poll::Ready(Err(io::Error::other(aborted.clone())))
        } else if self.shared.writer_closed.load(Ordering::Acquire) {
            // EOF: writer is done and buffer is drained
            Poll::Ready(Ok(()))
        } else {
            inner.reader_waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.shared.reader_closed.store(true, Ordering::Release);
        let mut inner = self.shared.lock();
        inner.buffer.clear();
        if let Some(waker) = inner.writer_waker.take() {
            waker.wake();
        }
    }
}

impl std::fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeWriter").field("label", &self.label).finish()
    }
}

impl std::fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeReader").finish()
    }
}
