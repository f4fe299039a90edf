//! Scheduler module for pipekit: connectors, pipelines and the runner.
//!
//! This module provides:
//! - **Connectors**: bounded byte pipes with backpressure between adjacent
//!   stages, plus the tagged error-output stream every stage shares.
//! - **Pipeline execution**: every stage on its own task, supervised until
//!   all have finished, with the first failure cancelling the rest.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Runner                              │
//! │  ┌─────────┐  pipe_stream ┌─────────┐  pipe_stream ┌──────┐ │
//! │  │ stage 1 │─────────────▶│ stage 2 │─────────────▶│ st 3 │ │
//! │  │ (task)  │   bounded    │ (task)  │   bounded    │(task)│ │
//! │  └────┬────┘              └────┬────┘              └──┬───┘ │
//! │       └──── tagged stderr ─────┴──────────────────────┘     │
//! │                  JoinSet supervision → Outcome              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod capture;
mod pipe_stream;
mod pipeline;
mod runner;
mod stderr_stream;

pub use capture::CaptureBuffer;
pub use pipe_stream::{
    pipe_stream, pipe_stream_default, PipeAborted, PipeReader, PipeStats, PipeWriter,
    PIPE_BUFFER_SIZE,
};
pub use pipeline::{compose, Pipeline};
pub use runner::{Outcome, Runner, RunnerConfig, StageFailure};
pub use stderr_stream::{stderr_stream, StderrMessage, StderrReceiver, StderrStream};
