//! sort: Sort lines of input.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use pipekit_types::{ParamSchema, ToolArgs, ToolSchema, Value};

use crate::cancel;
use crate::context::ExecContext;
use crate::error::{ConfigError, StageResult};
use crate::stage::{Stage, StageIo};
use crate::tools::Tool;

/// Sort tool: sort lines of text.
pub struct Sort;

impl Tool for Sort {
    fn name(&self) -> &str {
        "sort"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("sort", "Sort lines of input")
            .param(ParamSchema::optional(
                "reverse",
                "bool",
                Value::Bool(false),
                "Reverse the result (-r)",
            ).with_aliases(["-r"]))
            .param(ParamSchema::optional(
                "numeric",
                "bool",
                Value::Bool(false),
                "Compare by leading numeric value (-n)",
            ).with_aliases(["-n"]))
            .param(ParamSchema::optional(
                "unique",
                "bool",
                Value::Bool(false),
                "Output only the first of equal lines (-u)",
            ).with_aliases(["-u"]))
            .example("Alphabetical", "sort")
            .example("Largest numbers first", "sort -rn")
    }

    fn configure(&self, args: &ToolArgs) -> Result<Arc<dyn Stage>, ConfigError> {
        Ok(Arc::new(SortStage {
            reverse: args.has_flag("reverse"),
            numeric: args.has_flag("numeric"),
            unique: args.has_flag("unique"),
        }))
    }
}

struct SortStage {
    reverse: bool,
    numeric: bool,
    unique: bool,
}

impl SortStage {
    /// Ordering that decides which lines count as equal for `-u`.
    fn key_cmp(&self, a: &str, b: &str) -> Ordering {
        if self.numeric {
            numeric_key(a).total_cmp(&numeric_key(b))
        } else {
            a.cmp(b)
        }
    }
}

/// Leading number of a line; lines without one sort as zero.
fn numeric_key(line: &str) -> f64 {
    let trimmed = line.trim_start();
    let end = trimmed
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().unwrap_or(0.0)
}

#[async_trait]
impl Stage for SortStage {
    fn name(&self) -> &str {
        "sort"
    }

    async fn run(&self, ctx: &ExecContext, io: &mut StageIo) -> StageResult {
        let mut lines = Vec::new();
        while let Some(line) = io.stdin.next_line().await? {
            lines.push(line);
        }

        cancel::check(ctx)?;
        lines.sort_by(|a, b| self.key_cmp(a, b).then_with(|| a.cmp(b)));
        if self.unique {
            lines.dedup_by(|a, b| self.key_cmp(a, b) == Ordering::Equal);
        }
        if self.reverse {
            lines.reverse();
        }

        for line in &lines {
            io.stdout.write_line(line).await?;
        }
        Ok(())
    }
}
