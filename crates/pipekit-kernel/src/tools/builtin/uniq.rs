//! uniq: Collapse adjacent duplicate lines.

use std::sync::Arc;

use async_trait::async_trait;
use pipekit_types::{ParamSchema, ToolArgs, ToolSchema, Value};

use crate::context::ExecContext;
use crate::error::{ConfigError, StageResult};
use crate::stage::{Stage, StageIo, StageWriter};
use crate::tools::Tool;

/// Uniq tool: report or omit repeated lines.
pub struct Uniq;

impl Tool for Uniq {
    fn name(&self) -> &str {
        "uniq"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("uniq", "Collapse adjacent duplicate lines")
            .param(ParamSchema::optional(
                "count",
                "bool",
                Value::Bool(false),
                "Prefix lines with the number of occurrences (-c)",
            ).with_aliases(["-c"]))
            .example("Frequency table", "sort | uniq -c")
    }

    fn configure(&self, args: &ToolArgs) -> Result<Arc<dyn Stage>, ConfigError> {
        Ok(Arc::new(UniqStage {
            count: args.has_flag("count"),
        }))
    }
}

struct UniqStage {
    count: bool,
}

impl UniqStage {
    async fn emit(&self, out: &mut StageWriter, line: &str, seen: usize) -> StageResult {
        if self.count {
            out.write_line(&format!("{:>7} {}", seen, line)).await
        } else {
            out.write_line(line).await
        }
    }
}

#[async_trait]
impl Stage for UniqStage {
    fn name(&self) -> &str {
        "uniq"
    }

    async fn run(&self, _ctx: &ExecContext, io: &mut StageIo) -> StageResult {
        let mut current: Option<(String, usize)> = None;
        while let Some(line) = io.stdin.next_line().await? {
            if let Some((prev, seen)) = current.as_mut() {
                if *prev == line {
                    *seen += 1;
                    continue;
                }
            }
            if let Some((prev, seen)) = current.replace((line, 1)) {
                self.emit(&mut io.stdout, &prev, seen).await?;
            }
        }
        if let Some((prev, seen)) = current {
            self.emit(&mut io.stdout, &prev, seen).await?;
        }
        Ok(())
    }
}
