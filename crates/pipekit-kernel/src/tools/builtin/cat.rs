//! cat: Copy input to output unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use pipekit_types::{ToolArgs, ToolSchema};

use crate::context::ExecContext;
use crate::error::{ConfigError, StageResult};
use crate::stage::{Stage, StageIo};
use crate::tools::Tool;

use super::passthrough;

/// Cat tool: the identity stage.
pub struct Cat;

impl Tool for Cat {
    fn name(&self) -> &str {
        "cat"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("cat", "Copy input to output unchanged")
            .example("Pass data through", "seq 3 | cat")
    }

    fn configure(&self, args: &ToolArgs) -> Result<Arc<dyn Stage>, ConfigError> {
        if let Some(path) = args.positional.first() {
            return Err(ConfigError::invalid(
                "cat",
                "path",
                format!("cannot read '{}': cat only copies its input", path.as_text()),
            ));
        }
        Ok(Arc::new(CatStage))
    }
}

struct CatStage;

#[async_trait]
impl Stage for CatStage {
    fn name(&self) -> &str {
        "cat"
    }

    async fn run(&self, _ctx: &ExecContext, io: &mut StageIo) -> StageResult {
        passthrough(io).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{configure_err, output};
    use crate::error::ConfigError;

    #[tokio::test]
    async fn test_identity() {
        let input = "line one\nline two\nno trailing newline";
        assert_eq!(output(&["cat"], input).await, input);
    }

    #[tokio::test]
    async fn test_large_input_round_trips() {
        let input = "x".repeat(200_000);
        assert_eq!(output(&["cat"], &input).await, input);
    }

    #[test]
    fn test_rejects_paths() {
        assert!(matches!(configure_err(&["cat", "file.txt"]), ConfigError::InvalidValue { .. }));
    }
}
