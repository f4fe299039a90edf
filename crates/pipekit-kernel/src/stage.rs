//! The Stage contract: what every command implements.
//!
//! A stage consumes a [`StageReader`], produces into a [`StageWriter`] and
//! reports diagnostics on a tagged [`StderrStream`]. Reads and writes check
//! the run's cancellation, so a stage that only does I/O through these
//! handles is cancellable without any extra code. CPU-bound loops should call
//! [`cancel::check`](crate::cancel::check) once per unit of work.
//!
//! The runner owns the close protocol: after `run` returns it closes the
//! stage's output normally on `Ok`, or abnormally on `Err`, and closes the
//! stage's input. Stages may close earlier themselves (e.g. `head` closing
//! its input once it has enough lines).

use std::future::Future;
use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::context::ExecContext;
use crate::error::{StageError, StageResult};
use crate::scheduler::{PipeAborted, PipeReader, PipeStats, PipeWriter, Pipeline, StderrStream};

type BoxRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// A composable unit of streaming work.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Name used in diagnostics and failure reports.
    fn name(&self) -> &str;

    /// Process `io.stdin` into `io.stdout` until end-of-data, failure or
    /// cancellation.
    ///
    /// Returning `Ok` with partial output already written is a valid
    /// success. Returning `Err` fails the stage; a fatal error (see
    /// [`StageError::is_fatal`]) fails the whole pipeline.
    async fn run(&self, ctx: &ExecContext, io: &mut StageIo) -> StageResult;

    /// Downcast hook so the runner can schedule a pipeline's members directly.
    fn as_pipeline(&self) -> Option<&Pipeline> {
        None
    }
}

/// Race an I/O future against cancellation.
///
/// `data_first` lets already-available data win over a pending cancel, so a
/// consumer still sees everything its producer committed before failing.
async fn guarded<T>(
    ctx: &ExecContext,
    data_first: bool,
    fut: impl Future<Output = io::Result<T>>,
) -> StageResult<T> {
    if data_first {
        tokio::select! {
            biased;
            r = fut => Ok(r?),
            _ = ctx.cancelled() => Err(StageError::Cancelled),
        }
    } else {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(StageError::Cancelled),
            r = fut => Ok(r?),
        }
    }
}

/// A stage's input stream.
///
/// End-of-data is `Ok(0)` / `Ok(None)`. An upstream stage that failed shows
/// up as `Err(StageError::UpstreamAborted { .. })` once its buffered output
/// has been read.
pub struct StageReader {
    inner: Option<BufReader<BoxRead>>,
    from_pipe: bool,
    ctx: ExecContext,
}

impl StageReader {
    /// Wrap an external byte source (file, process stdin, socket).
    pub fn new<R: AsyncRead + Send + Unpin + 'static>(reader: R) -> Self {
        Self {
            inner: Some(BufReader::new(Box::new(reader))),
            from_pipe: false,
            ctx: ExecContext::new(),
        }
    }

    /// Wrap the read end of a connector.
    pub fn from_pipe(reader: PipeReader) -> Self {
        Self {
            inner: Some(BufReader::new(Box::new(reader))),
            from_pipe: true,
            ctx: ExecContext::new(),
        }
    }

    /// An input that is already at end-of-data.
    pub fn empty() -> Self {
        Self {
            inner: None,
            from_pipe: false,
            ctx: ExecContext::new(),
        }
    }

    pub(crate) fn bind(&mut self, ctx: &ExecContext) {
        self.ctx = ctx.clone();
    }

    /// Stop consuming. The upstream writer's next write fails with a broken
    /// pipe instead of blocking. Later reads report end-of-data.
    pub fn close(&mut self) {
        self.inner = None;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Read up to `buf.len()` bytes. `Ok(0)` means end-of-data.
    pub async fn read(&mut self, buf: &mut [u8]) -> StageResult<usize> {
        let Some(reader) = self.inner.as_mut() else {
            return Ok(0);
        };
        guarded(&self.ctx, self.from_pipe, reader.read(buf)).await
    }

    /// Append one line, including its `\n`, to `line`. `Ok(0)` at end-of-data.
    pub async fn read_line(&mut self, line: &mut String) -> StageResult<usize> {
        let Some(reader) = self.inner.as_mut() else {
            return Ok(0);
        };
        guarded(&self.ctx, self.from_pipe, reader.read_line(line)).await
    }

    /// Next line without its trailing `\n`. `Ok(None)` at end-of-data.
    pub async fn next_line(&mut self) -> StageResult<Option<String>> {
        let mut line = String::new();
        if self.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
        }
        Ok(Some(line))
    }

    /// Read everything that is left.
    pub async fn read_to_end(&mut self, buf: &mut Vec<u8>) -> StageResult<usize> {
        let Some(reader) = self.inner.as_mut() else {
            return Ok(0);
        };
        guarded(&self.ctx, self.from_pipe, reader.read_to_end(buf)).await
    }

    /// Read everything that is left as UTF-8.
    pub async fn read_to_string(&mut self) -> StageResult<String> {
        let mut out = String::new();
        if let Some(reader) = self.inner.as_mut() {
            guarded(&self.ctx, self.from_pipe, reader.read_to_string(&mut out)).await?;
        }
        Ok(out)
    }
}

impl std::fmt::Debug for StageReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageReader")
            .field("closed", &self.inner.is_none())
            .field("from_pipe", &self.from_pipe)
            .finish()
    }
}

enum Sink {
    Pipe(PipeWriter),
    External(BoxWrite),
    /// Handed to a nested pipeline; the nested run closes the real sink.
    Detached,
    Closed,
}

/// A stage's output stream.
pub struct StageWriter {
    sink: Sink,
    ctx: ExecContext,
}

impl StageWriter {
    /// Wrap an external byte sink (file, process stdout, buffer).
    pub fn new<W: AsyncWrite + Send + Unpin + 'static>(writer: W) -> Self {
        Self {
            sink: Sink::External(Box::new(writer)),
            ctx: ExecContext::new(),
        }
    }

    /// Wrap the write end of a connector.
    pub fn from_pipe(writer: PipeWriter) -> Self {
        Self {
            sink: Sink::Pipe(writer),
            ctx: ExecContext::new(),
        }
    }

    /// An output that throws everything away.
    pub fn discard() -> Self {
        Self::new(tokio::io::sink())
    }

    pub(crate) fn detached() -> Self {
        Self {
            sink: Sink::Detached,
            ctx: ExecContext::new(),
        }
    }

    pub(crate) fn bind(&mut self, ctx: &ExecContext) {
        self.ctx = ctx.clone();
    }

    /// Write all of `data`, waiting for the consumer as needed.
    ///
    /// Fails with `Cancelled` once the run is cancelled, and with
    /// `BrokenPipe` once the consumer has gone away or the output is closed.
    pub async fn write_all(&mut self, data: &[u8]) -> StageResult {
        let ctx = &self.ctx;
        match &mut self.sink {
            Sink::Pipe(writer) => guarded(ctx, false, writer.write_all_bytes(data)).await,
            Sink::External(writer) => guarded(ctx, false, writer.write_all(data)).await,
            Sink::Detached | Sink::Closed => Err(StageError::BrokenPipe),
        }
    }

    /// Write `line` followed by `\n`.
    pub async fn write_line(&mut self, line: &str) -> StageResult {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        self.write_all(&buf).await
    }

    pub async fn flush(&mut self) -> StageResult {
        let ctx = &self.ctx;
        match &mut self.sink {
            Sink::External(writer) => guarded(ctx, false, writer.flush()).await,
            _ => Ok(()),
        }
    }

    /// Signal end-of-data downstream. Idempotent.
    pub async fn close(&mut self) -> StageResult {
        let result = match &mut self.sink {
            Sink::Pipe(writer) => {
                writer.close();
                Ok(())
            }
            Sink::External(writer) => writer.flush().await.map_err(StageError::from),
            Sink::Detached | Sink::Closed => Ok(()),
        };
        self.sink = Sink::Closed;
        result
    }

    /// Signal abnormal termination downstream.
    ///
    /// External sinks cannot carry the signal; they are flushed so partial
    /// output already written is kept.
    pub async fn abort(&mut self, stage: &str, message: &str) {
        match &mut self.sink {
            Sink::Pipe(writer) => writer.abort(PipeAborted::new(stage, message)),
            Sink::External(writer) => {
                let _ = writer.flush().await;
            }
            Sink::Detached | Sink::Closed => {}
        }
        self.sink = Sink::Closed;
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.sink, Sink::Closed)
    }

    /// Connector occupancy, when writing to a connector.
    pub fn stats(&self) -> Option<PipeStats> {
        match &self.sink {
            Sink::Pipe(writer) => Some(writer.stats()),
            _ => None,
        }
    }
}

impl std::fmt::Debug for StageWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.sink {
            Sink::Pipe(_) => "pipe",
            Sink::External(_) => "external",
            Sink::Detached => "detached",
            Sink::Closed => "closed",
        };
        f.debug_struct("StageWriter").field("sink", &kind).finish()
    }
}

/// The three streams bound to one stage invocation.
#[derive(Debug)]
pub struct StageIo {
    pub stdin: StageReader,
    pub stdout: StageWriter,
    pub stderr: StderrStream,
}

impl StageIo {
    pub fn new(stdin: StageReader, stdout: StageWriter, stderr: StderrStream) -> Self {
        Self { stdin, stdout, stderr }
    }

    pub(crate) fn bind(&mut self, ctx: &ExecContext) {
        self.stdin.bind(ctx);
        self.stdout.bind(ctx);
    }

    /// Take the boundary streams, leaving placeholders behind.
    ///
    /// Used by stages that hand their streams to an inner run (nested
    /// pipelines). The inner run becomes responsible for closing them.
    pub fn detach(&mut self) -> StageIo {
        StageIo {
            stdin: std::mem::replace(&mut self.stdin, StageReader::empty()),
            stdout: std::mem::replace(&mut self.stdout, StageWriter::detached()),
            stderr: self.stderr.clone(),
        }
    }
}
