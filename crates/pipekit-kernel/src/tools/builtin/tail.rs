//! tail: Output the last lines of input.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use pipekit_types::{ParamSchema, ToolArgs, ToolSchema, Value};

use crate::context::ExecContext;
use crate::error::{ConfigError, StageResult};
use crate::stage::{Stage, StageIo};
use crate::tools::Tool;

use super::count_arg;

/// Tail tool: output the last part of the input.
pub struct Tail;

impl Tool for Tail {
    fn name(&self) -> &str {
        "tail"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("tail", "Output the last lines of input")
            .param(ParamSchema::optional(
                "lines",
                "int",
                Value::Int(10),
                "Number of lines to output (-n)",
            ).with_aliases(["-n"]))
            .example("Last 3 lines", "seq 100 | tail -n 3")
    }

    fn configure(&self, args: &ToolArgs) -> Result<Arc<dyn Stage>, ConfigError> {
        Ok(Arc::new(TailStage {
            lines: count_arg(args, "tail", "lines", 10)?,
        }))
    }
}

struct TailStage {
    lines: usize,
}

#[async_trait]
impl Stage for TailStage {
    fn name(&self) -> &str {
        "tail"
    }

    async fn run(&self, _ctx: &ExecContext, io: &mut StageIo) -> StageResult {
        let mut window: VecDeque<String> = VecDeque::with_capacity(self.lines.min(1024));
        loop {
            let mut line = String::new();
            if io.stdin.read_line(&mut line).await? == 0 {
                break;
            }
            if self.lines == 0 {
                continue;
            }
            if window.len() == self.lines {
                window.pop_front();
            }
            window.push_back(line);
        }

        for line in &window {
            io.stdout.write_all(line.as_bytes()).await?;
        }
        Ok(())
    }
}
