//! seq: Print a sequence of integers.

use std::sync::Arc;

use async_trait::async_trait;
use pipekit_types::{ParamSchema, ToolArgs, ToolSchema, Value};

use crate::context::ExecContext;
use crate::error::{ConfigError, StageResult};
use crate::stage::{Stage, StageIo};
use crate::tools::Tool;

/// Seq tool: `seq LAST`, `seq FIRST LAST` or `seq FIRST INCREMENT LAST`.
pub struct Seq;

impl Tool for Seq {
    fn name(&self) -> &str {
        "seq"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("seq", "Print a sequence of integers")
            .param(ParamSchema::required(
                "last",
                "int",
                "Last number (first positional when given alone)",
            ))
            .param(ParamSchema::optional("first", "int", Value::Int(1), "First number"))
            .param(ParamSchema::optional("increment", "int", Value::Int(1), "Step between numbers"))
            .example("One to ten", "seq 10")
            .example("Countdown", "seq 10 -1 1")
    }

    fn configure(&self, args: &ToolArgs) -> Result<Arc<dyn Stage>, ConfigError> {
        let mut operands = Vec::with_capacity(args.positional.len());
        for value in &args.positional {
            let n = value.as_int().ok_or_else(|| {
                ConfigError::invalid("seq", "last", format!("invalid integer '{}'", value.as_text()))
            })?;
            operands.push(n);
        }

        let named = |name: &str, default: i64| args.get_named(name).and_then(Value::as_int).unwrap_or(default);
        let (first, increment, last) = match operands.as_slice() {
            [] => (
                named("first", 1),
                named("increment", 1),
                args.get_named("last").and_then(Value::as_int).ok_or_else(|| ConfigError::MissingParam {
                    tool: "seq".to_string(),
                    param: "last".to_string(),
                })?,
            ),
            [last] => (named("first", 1), named("increment", 1), *last),
            [first, last] => (*first, named("increment", 1), *last),
            [first, increment, last] => (*first, *increment, *last),
            _ => return Err(ConfigError::invalid("seq", "last", "at most three operands")),
        };

        if increment == 0 {
            return Err(ConfigError::invalid("seq", "increment", "must not be zero"));
        }
        Ok(Arc::new(SeqStage { first, increment, last }))
    }
}

struct SeqStage {
    first: i64,
    increment: i64,
    last: i64,
}

#[async_trait]
impl Stage for SeqStage {
    fn name(&self) -> &str {
        "seq"
    }

    async fn run(&self, _ctx: &ExecContext, io: &mut StageIo) -> StageResult {
        io.stdin.close();
        let mut n = self.first;
        loop {
            let in_range = if self.increment > 0 { n <= self.last } else { n >= self.last };
            if !in_range {
                return Ok(());
            }
            io.stdout.write_line(&n.to_string()).await?;
            match n.checked_add(self.increment) {
                Some(next) => n = next,
                None => return Ok(()),
            }
        }
    }
}
