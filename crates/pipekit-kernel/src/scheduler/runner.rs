//! Scheduler and failure propagation for one pipeline run.
//!
//! Nested pipelines are flattened into their members first, so grouping
//! never changes scheduling, connector bounds or failure order. Every stage
//! then runs as its own task in a [`JoinSet`], connected to its neighbours
//! by bounded [`pipe_stream`]s. The runner supervises the set:
//!
//! ```text
//!   stage task ends ──▶ Ok        → output closed (EOF downstream)
//!                  └──▶ Err(e)    → output aborted, e recorded
//!                                    e fatal and first? → cancel run ctx
//!   run ctx cancelled ──▶ grace period ──▶ abort stragglers
//!   all tasks joined ──▶ Outcome
//! ```
//!
//! Outcome resolution, in priority order: the first fatal error by completion
//! time, then cancellation observed while stages were still running, then a
//! stray transport error (an abort nobody explained). Broken pipes are
//! normal termination, as in a shell's `yes | head`.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::task::{self, JoinError, JoinSet};
use tracing::Instrument;

use crate::context::{CancelReason, ExecContext};
use crate::error::{ConfigError, PipelineError, StageError};
use crate::stage::{Stage, StageIo, StageReader, StageWriter};

use super::pipe_stream::{pipe_stream, PIPE_BUFFER_SIZE};
use super::stderr_stream::{stderr_stream, StderrStream};

/// Tuning for the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Bytes each connector buffers before its writer blocks.
    pub pipe_capacity: usize,
    /// How long cancelled stages get to unwind before their tasks are aborted.
    pub grace_period: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            pipe_capacity: PIPE_BUFFER_SIZE,
            grace_period: Duration::from_millis(250),
        }
    }
}

impl RunnerConfig {
    pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipe_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "pipe capacity must be at least 1 byte".to_string(),
            ));
        }
        Ok(())
    }
}

/// The stage a failed run is attributed to, and its error.
#[derive(Debug, Clone)]
pub struct StageFailure {
    pub stage: String,
    pub error: Arc<StageError>,
}

impl StageFailure {
    /// Attribute `error` to `stage`, unwrapping nested pipelines so the
    /// innermost failing stage is reported.
    pub fn new(stage: &str, error: StageError) -> Self {
        match error {
            StageError::Nested { stage, source } => Self::innermost(stage, source),
            error => Self {
                stage: stage.to_string(),
                error: Arc::new(error),
            },
        }
    }

    fn innermost(mut stage: String, mut error: Arc<StageError>) -> Self {
        while let StageError::Nested { stage: inner, source } = error.as_ref() {
            stage = inner.clone();
            let next = Arc::clone(source);
            error = next;
        }
        Self { stage, error }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.error)
    }
}

/// Final result of a pipeline run.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success,
    Failed(StageFailure),
    Cancelled(CancelReason),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled(_))
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        match self {
            Outcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Shell-style exit status: 0, 1 on failure, 130 when interrupted,
    /// 124 on timeout.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::Failed(_) => 1,
            Outcome::Cancelled(CancelReason::DeadlineExceeded) => 124,
            Outcome::Cancelled(CancelReason::Requested) => 130,
            Outcome::Cancelled(CancelReason::StageFailed { .. }) => 1,
        }
    }

    pub fn into_result(self) -> Result<(), PipelineError> {
        match self {
            Outcome::Success => Ok(()),
            Outcome::Failed(StageFailure { stage, error }) => {
                Err(PipelineError::StageFailed { stage, source: error })
            }
            Outcome::Cancelled(reason) => Err(PipelineError::Cancelled(reason)),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failed(failure) => write!(f, "failed: {}", failure),
            Outcome::Cancelled(reason) => write!(f, "cancelled: {}", reason),
        }
    }
}

/// Runs stages concurrently and decides the run's [`Outcome`].
#[derive(Debug, Clone, Default)]
pub struct Runner {
    config: RunnerConfig,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `stage` with `input` as its first stage's input, `output` receiving
    /// the last stage's output and `err_output` every stage's diagnostics.
    ///
    /// Returns once every stage task has finished and all diagnostics have
    /// been written.
    #[tracing::instrument(level = "debug", skip_all, fields(pipeline = %stage.name()))]
    pub async fn execute<R, W, E>(
        &self,
        stage: Arc<dyn Stage>,
        ctx: &ExecContext,
        input: R,
        output: W,
        err_output: E,
    ) -> Outcome
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
        E: AsyncWrite + Send + Unpin + 'static,
    {
        let (stderr, mut receiver) = stderr_stream();
        let drain = tokio::spawn(async move {
            let mut err_output = err_output;
            while let Some(msg) = receiver.recv().await {
                if err_output.write_all(msg.render().as_bytes()).await.is_err() {
                    break;
                }
            }
            let _ = err_output.flush().await;
        });

        let io = StageIo::new(StageReader::new(input), StageWriter::new(output), stderr);
        let outcome = self.run_stages(std::slice::from_ref(&stage), ctx, io).await;

        if let Err(err) = drain.await {
            tracing::warn!("stderr drain task failed: {}", err);
        }
        outcome
    }

    /// Run `stages` as one pipeline over `io`.
    ///
    /// The run gets its own child of `parent`, so a failing stage cancels its
    /// siblings without touching the caller's context.
    pub(crate) async fn run_stages(
        &self,
        stages: &[Arc<dyn Stage>],
        parent: &ExecContext,
        io: StageIo,
    ) -> Outcome {
        let mut flat = Vec::with_capacity(stages.len());
        flatten(stages, &mut flat);
        let stages = flat.as_slice();

        let StageIo { stdin, mut stdout, stderr } = io;
        if stages.is_empty() {
            let _ = stdout.close().await;
            return Outcome::Success;
        }

        let ctx = parent.child();
        let mut readers = Vec::with_capacity(stages.len());
        let mut writers = Vec::with_capacity(stages.len());
        readers.push(stdin);
        for stage in &stages[..stages.len() - 1] {
            let (writer, reader) = pipe_stream(self.config.pipe_capacity);
            writers.push(StageWriter::from_pipe(writer.with_label(stage.name())));
            readers.push(StageReader::from_pipe(reader));
        }
        writers.push(stdout);

        let state = Arc::new(RunState {
            ctx: ctx.clone(),
            first_failure: OnceLock::new(),
        });
        let mut tasks = JoinSet::new();
        let mut names: HashMap<task::Id, String> = HashMap::new();
        for ((stage, stdin), stdout) in stages.iter().zip(readers).zip(writers) {
            let name = stage.name().to_string();
            let mut io = StageIo::new(stdin, stdout, stderr.tagged(&name));
            io.bind(&ctx);
            let span = tracing::debug_span!("stage", name = %name);
            let handle = tasks.spawn(run_stage(Arc::clone(stage), Arc::clone(&state), io).instrument(span));
            names.insert(handle.id(), name);
        }
        tracing::debug!(stages = stages.len(), "pipeline started");

        let mut supervisor = Supervisor {
            state: &state,
            stderr: &stderr,
            names,
            stray: None,
        };

        let mut interrupted = false;
        loop {
            tokio::select! {
                biased;
                joined = tasks.join_next_with_id() => match joined {
                    Some(joined) => supervisor.record(joined),
                    None => break,
                },
                _ = ctx.cancelled() => {
                    interrupted = true;
                    break;
                }
            }
        }

        if interrupted {
            self.wind_down(&mut tasks, &mut supervisor).await;
        }

        let stray = supervisor.stray.take();
        // Stages may all unwind before the supervisor sees the signal itself.
        let cancelled = interrupted || (stray.is_some() && ctx.is_cancelled());
        let outcome = if let Some(failure) = state.first_failure.get() {
            Outcome::Failed(failure.clone())
        } else if cancelled {
            Outcome::Cancelled(ctx.cancel_reason().unwrap_or(CancelReason::Requested))
        } else if let Some(failure) = stray {
            // Nothing else wrote this one down.
            stderr.tagged(&failure.stage).write(&failure.error.to_string());
            Outcome::Failed(failure)
        } else {
            Outcome::Success
        };
        tracing::debug!(%outcome, "pipeline finished");
        outcome
    }

    /// Give cancelled stages the grace period to unwind, then abort the rest.
    async fn wind_down(&self, tasks: &mut JoinSet<StageExit>, supervisor: &mut Supervisor<'_>) {
        let deadline = tokio::time::Instant::now() + self.config.grace_period;
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next_with_id()).await {
                Ok(Some(joined)) => supervisor.record(joined),
                Ok(None) => return,
                Err(_) => break,
            }
        }

        tracing::warn!(
            stragglers = ?supervisor.running(),
            "stages ignored cancellation past the grace period; aborting"
        );
        tasks.abort_all();
        while let Some(joined) = tasks.join_next_with_id().await {
            supervisor.record(joined);
        }
    }
}

/// Replace every nested pipeline with its members, recursively.
fn flatten(stages: &[Arc<dyn Stage>], out: &mut Vec<Arc<dyn Stage>>) {
    for stage in stages {
        match stage.as_pipeline() {
            Some(pipeline) => flatten(pipeline.stages(), out),
            None => out.push(Arc::clone(stage)),
        }
    }
}

/// State shared by the supervisor and every stage task of one run.
struct RunState {
    ctx: ExecContext,
    first_failure: OnceLock<StageFailure>,
}

impl RunState {
    /// Record a fatal failure. The first one wins and cancels the run.
    fn fail(&self, failure: StageFailure) {
        let stage = failure.stage.clone();
        if self.first_failure.set(failure).is_ok() {
            tracing::debug!(%stage, "stage failed; cancelling pipeline");
            self.ctx.cancel_with(CancelReason::StageFailed { stage });
        }
    }
}

/// How a stage task ended.
enum StageExit {
    Finished,
    /// Fatal; already recorded in [`RunState`].
    Failed,
    /// Stopped by a transport error (cancellation, broken pipe, upstream abort).
    Interrupted(StageError),
}

struct Supervisor<'a> {
    state: &'a RunState,
    stderr: &'a StderrStream,
    names: HashMap<task::Id, String>,
    stray: Option<StageFailure>,
}

impl Supervisor<'_> {
    fn record(&mut self, joined: Result<(task::Id, StageExit), JoinError>) {
        let id = match &joined {
            Ok((id, _)) => *id,
            Err(err) => err.id(),
        };
        let stage = self.names.remove(&id).unwrap_or_default();

        match joined {
            Ok((_, StageExit::Finished | StageExit::Failed)) => {}
            Ok((_, StageExit::Interrupted(error))) => {
                if matches!(error, StageError::BrokenPipe) || self.stray.is_some() {
                    return;
                }
                tracing::trace!(%stage, %error, "transport error");
                self.stray = Some(StageFailure::new(&stage, error));
            }
            Err(err) if err.is_panic() => {
                let message = panic_message(err.into_panic());
                self.stderr.tagged(&stage).write(&format!("panicked: {}", message));
                self.state.fail(StageFailure::new(&stage, StageError::Panicked(message)));
            }
            // Aborted after the grace period; the run is already cancelled.
            Err(_) => {}
        }
    }

    /// Stages whose tasks have not been joined yet.
    fn running(&self) -> Vec<&str> {
        self.names.values().map(String::as_str).collect()
    }
}

/// Drive one stage and apply the close protocol to its streams.
///
/// On a fatal error the output is aborted before the run is cancelled, so
/// the consumer sees the abort rather than the cancellation. The input is
/// closed last, so the producer sees the cancellation rather than a broken
/// pipe.
async fn run_stage(stage: Arc<dyn Stage>, state: Arc<RunState>, mut io: StageIo) -> StageExit {
    tracing::debug!("stage started");
    let result = match stage.run(&state.ctx, &mut io).await {
        Ok(()) => io.stdout.close().await,
        Err(err) => Err(err),
    };

    let exit = match result {
        Ok(()) => StageExit::Finished,
        Err(err) => {
            let message = err.to_string();
            if err.is_fatal() && !matches!(err, StageError::Nested { .. }) {
                io.stderr.write(&message);
            }
            io.stdout.abort(stage.name(), &message).await;
            if err.is_fatal() {
                state.fail(StageFailure::new(stage.name(), err));
                StageExit::Failed
            } else {
                StageExit::Interrupted(err)
            }
        }
    };
    io.stdin.close();
    tracing::debug!(failed = matches!(exit, StageExit::Failed), "stage finished");
    exit
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageResult;
    use crate::scheduler::CaptureBuffer;
    use async_trait::async_trait;

    struct Emit(&'static str);

    #[async_trait]
    impl Stage for Emit {
        fn name(&self) -> &str {
            "emit"
        }

        async fn run(&self, _ctx: &ExecContext, io: &mut StageIo) -> StageResult {
            io.stdout.write_all(self.0.as_bytes()).await
        }
    }

    struct Boom;

    #[async_trait]
    impl Stage for Boom {
        fn name(&self) -> &str {
            "boom"
        }

        async fn run(&self, _ctx: &ExecContext, _io: &mut StageIo) -> StageResult {
            Err(StageError::failed("exploded"))
        }
    }

    struct Panics;

    #[async_trait]
    impl Stage for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        async fn run(&self, _ctx: &ExecContext, _io: &mut StageIo) -> StageResult {
            panic!("stage blew up");
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = RunnerConfig::default().with_pipe_capacity(0);
        assert!(matches!(Runner::new(config), Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Outcome::Success.exit_code(), 0);
        assert_eq!(Outcome::Cancelled(CancelReason::Requested).exit_code(), 130);
        assert_eq!(Outcome::Cancelled(CancelReason::DeadlineExceeded).exit_code(), 124);
        let failed = Outcome::Failed(StageFailure::new("x", StageError::failed("bad")));
        assert_eq!(failed.exit_code(), 1);
        assert_eq!(failed.to_string(), "failed: x: bad");
    }

    #[test]
    fn test_nested_failure_reports_innermost_stage() {
        let inner = StageError::Nested {
            stage: "grep".to_string(),
            source: Arc::new(StageError::failed("bad regex")),
        };
        let outer = StageError::Nested {
            stage: "inner".to_string(),
            source: Arc::new(inner),
        };
        let failure = StageFailure::new("outer", outer);
        assert_eq!(failure.stage, "grep");
        assert_eq!(failure.error.to_string(), "bad regex");
    }

    #[tokio::test]
    async fn test_single_stage_success() {
        let out = CaptureBuffer::new();
        let outcome = Runner::default()
            .execute(Arc::new(Emit("hi\n")), &ExecContext::new(), tokio::io::empty(), out.clone(), tokio::io::sink())
            .await;
        assert!(outcome.is_success());
        assert_eq!(out.text(), "hi\n");
    }

    #[tokio::test]
    async fn test_failure_message_reaches_error_output() {
        let err = CaptureBuffer::new();
        let outcome = Runner::default()
            .execute(Arc::new(Boom), &ExecContext::new(), tokio::io::empty(), tokio::io::sink(), err.clone())
            .await;
        assert_eq!(outcome.failure().map(|f| f.stage.as_str()), Some("boom"));
        assert_eq!(err.text(), "boom: exploded\n");
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let err = CaptureBuffer::new();
        let outcome = Runner::default()
            .execute(Arc::new(Panics), &ExecContext::new(), tokio::io::empty(), tokio::io::sink(), err.clone())
            .await;
        let failure = outcome.failure().expect("failed");
        assert_eq!(failure.stage, "panics");
        assert!(matches!(failure.error.as_ref(), StageError::Panicked(msg) if msg == "stage blew up"));
        assert!(err.text().starts_with("panics: panicked: stage blew up"));
    }
}
