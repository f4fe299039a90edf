//! head: Output the first lines of input.

use std::sync::Arc;

use async_trait::async_trait;
use pipekit_types::{ParamSchema, ToolArgs, ToolSchema, Value};

use crate::context::ExecContext;
use crate::error::{ConfigError, StageResult};
use crate::stage::{Stage, StageIo};
use crate::tools::Tool;

use super::count_arg;

/// Head tool: output the first part of the input.
pub struct Head;

impl Tool for Head {
    fn name(&self) -> &str {
        "head"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("head", "Output the first lines of input")
            .param(ParamSchema::optional(
                "lines",
                "int",
                Value::Int(10),
                "Number of lines to output (-n)",
            ).with_aliases(["-n"]))
            .example("First 10 lines (default)", "seq 100 | head")
            .example("First 5 lines", "seq 100 | head -n 5")
    }

    fn configure(&self, args: &ToolArgs) -> Result<Arc<dyn Stage>, ConfigError> {
        // POSIX shorthand: head -3 → head -n 3
        let shorthand = args
            .positional
            .first()
            .and_then(Value::as_int)
            .filter(|n| *n < 0)
            .map(|n| n.unsigned_abs() as usize);

        let lines = match shorthand {
            Some(n) if args.get_named("lines").is_none() => n,
            _ => count_arg(args, "head", "lines", 10)?,
        };
        Ok(Arc::new(HeadStage { lines }))
    }
}

struct HeadStage {
    lines: usize,
}

#[async_trait]
impl Stage for HeadStage {
    fn name(&self) -> &str {
        "head"
    }

    async fn run(&self, _ctx: &ExecContext, io: &mut StageIo) -> StageResult {
        let mut line = String::new();
        for _ in 0..self.lines {
            line.clear();
            if io.stdin.read_line(&mut line).await? == 0 {
                break;
            }
            io.stdout.write_all(line.as_bytes()).await?;
        }
        // Stop consuming so the producer sees a broken pipe instead of
        // filling the connector forever.
        io.stdin.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{configure_err, output};
    use crate::error::ConfigError;
    use rstest::rstest;

    const INPUT: &str = "1\n2\n3\n4\n5\n6\n7\n8\n9\n10\n11\n12\n";

    #[rstest]
    #[case(&["head"], "1\n2\n3\n4\n5\n6\n7\n8\n9\n10\n")]
    #[case(&["head", "-n", "3"], "1\n2\n3\n")]
    #[case(&["head", "-n2"], "1\n2\n")]
    #[case(&["head", "-4"], "1\n2\n3\n4\n")]
    #[case(&["head", "lines=1"], "1\n")]
    #[case(&["head", "-n", "0"], "")]
    #[case(&["head", "-n", "50"], INPUT)]
    #[tokio::test]
    async fn test_head(#[case] argv: &[&str], #[case] expected: &str) {
        assert_eq!(output(argv, INPUT).await, expected);
    }

    #[test]
    fn test_negative_count_rejected() {
        assert!(matches!(configure_err(&["head", "lines=-1"]), ConfigError::InvalidValue { .. }));
    }
}
