//! Error taxonomy for stages, configuration and whole pipeline runs.
//!
//! - [`ConfigError`]: bad parameters, caught before anything is scheduled.
//! - [`StageError`]: what a stage's `run` returns. Transport variants
//!   (cancellation, broken pipe, upstream abort) are consequences of some
//!   other event and never become the reported failure on their own when a
//!   better explanation exists.
//! - [`PipelineError`]: the caller-facing form of a run's outcome.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::context::CancelReason;
use crate::scheduler::PipeAborted;

/// Result alias for stage execution.
pub type StageResult<T = ()> = Result<T, StageError>;

/// Error returned from a stage's `run`.
#[derive(Debug, Error)]
pub enum StageError {
    /// The stage observed cancellation and unwound.
    #[error("cancelled")]
    Cancelled,

    /// The stage's downstream reader is gone.
    #[error("broken pipe")]
    BrokenPipe,

    /// The stage's input was closed abnormally by the stage feeding it.
    #[error("upstream stage '{stage}' aborted: {message}")]
    UpstreamAborted { stage: String, message: String },

    /// A stage inside a nested pipeline failed.
    #[error("{stage}: {source}")]
    Nested {
        stage: String,
        #[source]
        source: Arc<StageError>,
    },

    /// The stage's task panicked.
    #[error("panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Io(io::Error),

    /// A plain failure message from the stage itself.
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StageError {
    /// Build a [`StageError::Failed`] from a message.
    pub fn failed(message: impl Into<String>) -> Self {
        StageError::Failed(message.into())
    }

    /// Consequences of another stage's failure or of cancellation.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            StageError::Cancelled | StageError::BrokenPipe | StageError::UpstreamAborted { .. }
        )
    }

    /// Errors that fail the pipeline and cancel its siblings.
    pub fn is_fatal(&self) -> bool {
        !self.is_transport()
    }
}

impl From<io::Error> for StageError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return StageError::BrokenPipe;
        }
        if let Some(aborted) = err.get_ref().and_then(|e| e.downcast_ref::<PipeAborted>()) {
            return StageError::UpstreamAborted {
                stage: aborted.stage.clone(),
                message: aborted.message.clone(),
            };
        }
        StageError::Io(err)
    }
}

/// Invalid parameters or topology, reported before the pipeline starts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0}: command not found")]
    UnknownTool(String),

    #[error("{tool}: missing required parameter '{param}'")]
    MissingParam { tool: String, param: String },

    #[error("{tool}: unknown option '{flag}'")]
    UnknownFlag { tool: String, flag: String },

    #[error("{tool}: unknown parameter '{param}'")]
    UnknownParam { tool: String, param: String },

    #[error("{tool}: option '{param}' requires a value")]
    MissingValue { tool: String, param: String },

    #[error("{tool}: invalid value for '{param}': {message}")]
    InvalidValue {
        tool: String,
        param: String,
        message: String,
    },

    #[error("pipeline must contain at least one stage")]
    EmptyPipeline,

    #[error("empty command")]
    EmptyCommand,

    #[error("invalid runner configuration: {0}")]
    InvalidConfig(String),
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidValue`].
    pub fn invalid(tool: &str, param: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            tool: tool.to_string(),
            param: param.to_string(),
            message: message.into(),
        }
    }
}

/// Caller-facing error for a pipeline that did not succeed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{stage}: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: Arc<StageError>,
    },

    #[error("pipeline {0}")]
    Cancelled(CancelReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broken_pipe_maps_to_transport() {
        let err = StageError::from(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(matches!(err, StageError::BrokenPipe));
        assert!(err.is_transport());
    }

    #[test]
    fn test_pipe_aborted_payload_is_recovered() {
        let io_err = io::Error::other(PipeAborted::new("grep", "boom"));
        match StageError::from(io_err) {
            StageError::UpstreamAborted { stage, message } => {
                assert_eq!(stage, "grep");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_plain_io_error_is_fatal() {
        let err = StageError::from(io::Error::new(io::ErrorKind::InvalidData, "bad utf-8"));
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "bad utf-8");
    }

    #[test]
    fn test_anyhow_errors_are_fatal() {
        let err: StageError = anyhow::anyhow!("disk full").into();
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "disk full");
    }
}
