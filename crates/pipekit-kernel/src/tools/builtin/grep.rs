//! grep: Select lines matching a pattern.

use std::sync::Arc;

use async_trait::async_trait;
use pipekit_types::{ParamSchema, ToolArgs, ToolSchema, Value};
use regex::{Regex, RegexBuilder};

use crate::context::ExecContext;
use crate::error::{ConfigError, StageResult};
use crate::stage::{Stage, StageIo};
use crate::tools::Tool;

/// Grep tool: search for patterns in text.
pub struct Grep;

impl Tool for Grep {
    fn name(&self) -> &str {
        "grep"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("grep", "Select lines matching a regular expression")
            .param(ParamSchema::required(
                "pattern",
                "string",
                "Regular expression pattern to search for",
            ))
            .param(ParamSchema::optional(
                "ignore_case",
                "bool",
                Value::Bool(false),
                "Case-insensitive matching (-i)",
            ).with_aliases(["-i"]))
            .param(ParamSchema::optional(
                "line_number",
                "bool",
                Value::Bool(false),
                "Prefix output with line numbers (-n)",
            ).with_aliases(["-n"]))
            .param(ParamSchema::optional(
                "invert",
                "bool",
                Value::Bool(false),
                "Select non-matching lines (-v)",
            ).with_aliases(["-v"]))
            .param(ParamSchema::optional(
                "count",
                "bool",
                Value::Bool(false),
                "Only print count of matching lines (-c)",
            ).with_aliases(["-c"]))
            .example("Lines containing ERROR", "grep ERROR")
            .example("Case-insensitive, numbered", "grep -in warning")
    }

    fn configure(&self, args: &ToolArgs) -> Result<Arc<dyn Stage>, ConfigError> {
        let pattern = args.get_string("pattern", 0).ok_or_else(|| ConfigError::MissingParam {
            tool: "grep".to_string(),
            param: "pattern".to_string(),
        })?;

        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(args.has_flag("ignore_case"))
            .build()
            .map_err(|e| ConfigError::invalid("grep", "pattern", e.to_string()))?;

        Ok(Arc::new(GrepStage {
            regex,
            invert: args.has_flag("invert"),
            count_only: args.has_flag("count"),
            line_number: args.has_flag("line_number"),
        }))
    }
}

struct GrepStage {
    regex: Regex,
    invert: bool,
    count_only: bool,
    line_number: bool,
}

#[async_trait]
impl Stage for GrepStage {
    fn name(&self) -> &str {
        "grep"
    }

    async fn run(&self, _ctx: &ExecContext, io: &mut StageIo) -> StageResult {
        let mut matched = 0usize;
        let mut number = 0usize;
        while let Some(line) = io.stdin.next_line().await? {
            number += 1;
            if self.regex.is_match(&line) == self.invert {
                continue;
            }
            matched += 1;
            if self.count_only {
                continue;
            }
            if self.line_number {
                io.stdout.write_line(&format!("{}:{}", number, line)).await?;
            } else {
                io.stdout.write_line(&line).await?;
            }
        }

        if self.count_only {
            io.stdout.write_line(&matched.to_string()).await?;
        }
        // No match is still a successful run of the stage.
        Ok(())
    }
}
