//! Pipeline assembly.
//!
//! A [`Pipeline`] is itself a [`Stage`], so pipelines nest: `(a | b) | c` and
//! `a | (b | c)` behave like `a | b | c`. The runner flattens nested
//! pipelines into one run, so every member shares the run's context,
//! connector bound and first-failure record regardless of grouping.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ExecContext;
use crate::error::{ConfigError, StageError, StageResult};
use crate::stage::{Stage, StageIo};

use super::runner::{Outcome, Runner, StageFailure};

/// An ordered, non-empty chain of stages.
pub struct Pipeline {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    /// Chain `stages` left to right. Fails on an empty list.
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Result<Self, ConfigError> {
        let name = stages
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join(" | ");
        Self::named(name, stages)
    }

    /// Like [`Pipeline::new`], reporting under `name` instead of the joined
    /// member names.
    pub fn named(name: impl Into<String>, stages: Vec<Arc<dyn Stage>>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::EmptyPipeline);
        }
        Ok(Self {
            name: name.into(),
            stages,
        })
    }

    pub fn stages(&self) -> &[Arc<dyn Stage>] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stages.len())
            .finish()
    }
}

#[async_trait]
impl Stage for Pipeline {
    fn name(&self) -> &str {
        &self.name
    }

    /// Only reached when something calls `run` by hand, outside a runner;
    /// runners schedule the members directly. Uses default runner settings.
    async fn run(&self, ctx: &ExecContext, io: &mut StageIo) -> StageResult {
        let inner = io.detach();
        match Runner::default().run_stages(&self.stages, ctx, inner).await {
            Outcome::Success => Ok(()),
            Outcome::Failed(StageFailure { stage, error }) => {
                if error.is_transport() {
                    // Nothing inside failed on its own; surface the transport
                    // error so the enclosing run classifies it the same way.
                    Err(match error.as_ref() {
                        StageError::BrokenPipe => StageError::BrokenPipe,
                        StageError::UpstreamAborted { stage, message } => StageError::UpstreamAborted {
                            stage: stage.clone(),
                            message: message.clone(),
                        },
                        _ => StageError::Cancelled,
                    })
                } else {
                    Err(StageError::Nested { stage, source: error })
                }
            }
            Outcome::Cancelled(_) => Err(StageError::Cancelled),
        }
    }

    fn as_pipeline(&self) -> Option<&Pipeline> {
        Some(self)
    }
}

/// Compose stages into one stage.
///
/// A single stage is returned as is; more than one becomes a [`Pipeline`].
pub fn compose(stages: Vec<Arc<dyn Stage>>) -> Result<Arc<dyn Stage>, ConfigError> {
    match stages.len() {
        0 => Err(ConfigError::EmptyPipeline),
        1 => Ok(stages.into_iter().next().ok_or(ConfigError::EmptyPipeline)?),
        _ => Ok(Arc::new(Pipeline::new(stages)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::StderrStream;
    use crate::stage::{StageReader, StageWriter};

    struct Named(&'static str);

    #[async_trait]
    impl Stage for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn run(&self, _ctx: &ExecContext, _io: &mut StageIo) -> StageResult {
            Ok(())
        }
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        assert_eq!(Pipeline::new(vec![]).err(), Some(ConfigError::EmptyPipeline));
        assert!(matches!(compose(vec![]), Err(ConfigError::EmptyPipeline)));
    }

    #[test]
    fn test_compose_single_stage_is_identity() {
        let stage: Arc<dyn Stage> = Arc::new(Named("only"));
        let composed = compose(vec![Arc::clone(&stage)]).unwrap();
        assert!(Arc::ptr_eq(&stage, &composed));
        assert!(composed.as_pipeline().is_none());
    }

    #[test]
    fn test_pipeline_name_lists_members() {
        let composed = compose(vec![Arc::new(Named("a")), Arc::new(Named("b"))]).unwrap();
        assert_eq!(composed.name(), "a | b");
        assert_eq!(composed.as_pipeline().map(Pipeline::len), Some(2));

        let named = Pipeline::named("filter", vec![Arc::new(Named("a"))]).unwrap();
        assert_eq!(named.name(), "filter");
    }

    struct Fails;

    #[async_trait]
    impl Stage for Fails {
        fn name(&self) -> &str {
            "fails"
        }

        async fn run(&self, _ctx: &ExecContext, _io: &mut StageIo) -> StageResult {
            Err(StageError::failed("nope"))
        }
    }

    #[tokio::test]
    async fn test_direct_run_reports_inner_failure() {
        let pipeline = Pipeline::new(vec![Arc::new(Named("a")), Arc::new(Fails)]).unwrap();
        let mut io = StageIo::new(StageReader::empty(), StageWriter::discard(), StderrStream::discard());
        match pipeline.run(&ExecContext::new(), &mut io).await {
            Err(StageError::Nested { stage, source }) => {
                assert_eq!(stage, "fails");
                assert_eq!(source.to_string(), "nope");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
