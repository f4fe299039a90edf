//! echo: Write arguments to output.

use std::sync::Arc;

use async_trait::async_trait;
use pipekit_types::{ParamSchema, ToolArgs, ToolSchema, Value};

use crate::context::ExecContext;
use crate::error::{ConfigError, StageResult};
use crate::stage::{Stage, StageIo};
use crate::tools::Tool;

/// Echo tool: emit its arguments, ignoring input.
pub struct Echo;

impl Tool for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("echo", "Write arguments to output")
            .param(ParamSchema::optional(
                "no_newline",
                "bool",
                Value::Bool(false),
                "Do not print the trailing newline (-n)",
            ).with_aliases(["-n"]))
            .param(ParamSchema::optional(
                "lines",
                "bool",
                Value::Bool(false),
                "Print each argument on its own line (-l)",
            ).with_aliases(["-l"]))
            .example("Simple greeting", "echo hello world")
            .example("One record per line", "echo -l a b c")
    }

    fn configure(&self, args: &ToolArgs) -> Result<Arc<dyn Stage>, ConfigError> {
        Ok(Arc::new(EchoStage {
            words: args.positional.iter().map(Value::as_text).collect(),
            newline: !args.has_flag("no_newline"),
            one_per_line: args.has_flag("lines"),
        }))
    }
}

struct EchoStage {
    words: Vec<String>,
    newline: bool,
    one_per_line: bool,
}

#[async_trait]
impl Stage for EchoStage {
    fn name(&self) -> &str {
        "echo"
    }

    async fn run(&self, _ctx: &ExecContext, io: &mut StageIo) -> StageResult {
        // Input is never read; closing it lets an upstream writer stop early.
        io.stdin.close();
        if self.one_per_line {
            for word in &self.words {
                io.stdout.write_line(word).await?;
            }
            return Ok(());
        }
        let mut text = self.words.join(" ");
        if self.newline {
            text.push('\n');
        }
        io.stdout.write_all(text.as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::output;
    use rstest::rstest;

    #[rstest]
    #[case(&["echo", "hello", "world"], "hello world\n")]
    #[case(&["echo", "-n", "no", "newline"], "no newline")]
    #[case(&["echo", "-l", "a", "b", "c"], "a\nb\nc\n")]
    #[case(&["echo"], "\n")]
    #[tokio::test]
    async fn test_echo(#[case] argv: &[&str], #[case] expected: &str) {
        assert_eq!(output(argv, "ignored input").await, expected);
    }
}
