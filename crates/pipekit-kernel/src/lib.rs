//! pipekit-kernel: an in-process, Unix-style pipeline engine.
//!
//! This crate provides:
//!
//! - **Context**: cancellation signal, deadline and first cancel reason
//! - **Stage**: the contract every command implements, with its streams
//! - **Scheduler**: bounded connectors, pipeline assembly, the runner that
//!   supervises stages and propagates failure
//! - **Tools**: schema-driven command configuration and the builtin library
//!
//! ```no_run
//! use pipekit_kernel::{execute, tools::ToolRegistry, ExecContext};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let registry = ToolRegistry::with_builtins();
//! let stage = registry.build_pipeline(&[
//!     vec!["seq".to_string(), "100".to_string()],
//!     vec!["grep".to_string(), "7".to_string()],
//! ])?;
//! let outcome = execute(&ExecContext::new(), stage, tokio::io::empty(), tokio::io::stdout(), tokio::io::stderr()).await;
//! outcome.into_result()?;
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod context;
pub mod error;
pub mod scheduler;
pub mod stage;
pub mod tools;

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

pub use context::{CancelReason, ExecContext};
pub use error::{ConfigError, PipelineError, StageError, StageResult};
pub use scheduler::{
    compose, CaptureBuffer, Outcome, Pipeline, Runner, RunnerConfig, StageFailure,
};
pub use stage::{Stage, StageIo, StageReader, StageWriter};

/// Run `stage` once with the default runner settings.
pub async fn execute<R, W, E>(
    ctx: &ExecContext,
    stage: Arc<dyn Stage>,
    input: R,
    output: W,
    err_output: E,
) -> Outcome
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
    E: AsyncWrite + Send + Unpin + 'static,
{
    Runner::default()
        .execute(stage, ctx, input, output, err_output)
        .await
}
