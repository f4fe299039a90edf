//! sleep: Delay, then pass input through.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pipekit_types::{ParamSchema, ToolArgs, ToolSchema};

use crate::cancel;
use crate::context::ExecContext;
use crate::error::{ConfigError, StageResult};
use crate::stage::{Stage, StageIo};
use crate::tools::Tool;

use super::passthrough;

/// Sleep tool: pause, then copy input to output.
pub struct Sleep;

impl Tool for Sleep {
    fn name(&self) -> &str {
        "sleep"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("sleep", "Delay for a specified time, then pass input through")
            .param(ParamSchema::required(
                "seconds",
                "string",
                "Time to wait: a number with optional suffix s, m or h",
            ))
            .example("Sleep for 1 second", "sleep 1")
            .example("Delay a stream by half a second", "seq 3 | sleep 0.5 | cat")
    }

    fn configure(&self, args: &ToolArgs) -> Result<Arc<dyn Stage>, ConfigError> {
        let raw = args.get_string("seconds", 0).ok_or_else(|| ConfigError::MissingParam {
            tool: "sleep".to_string(),
            param: "seconds".to_string(),
        })?;
        let seconds = parse_duration(&raw).map_err(|msg| ConfigError::invalid("sleep", "seconds", msg))?;
        Ok(Arc::new(SleepStage {
            duration: Duration::from_secs_f64(seconds),
        }))
    }
}

/// Parse duration string with optional suffix (s, m, h).
fn parse_duration(s: &str) -> Result<f64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("missing operand".to_string());
    }

    let (num_str, multiplier) = if let Some(rest) = s.strip_suffix('s') {
        (rest, 1.0)
    } else if let Some(rest) = s.strip_suffix('m') {
        (rest, 60.0)
    } else if let Some(rest) = s.strip_suffix('h') {
        (rest, 3600.0)
    } else {
        (s, 1.0)
    };

    match num_str.parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 0.0 => Ok(n * multiplier),
        _ => Err(format!("invalid time interval '{}'", s)),
    }
}

struct SleepStage {
    duration: Duration,
}

#[async_trait]
impl Stage for SleepStage {
    fn name(&self) -> &str {
        "sleep"
    }

    async fn run(&self, ctx: &ExecContext, io: &mut StageIo) -> StageResult {
        cancel::sleep(ctx, self.duration).await?;
        passthrough(io).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{configure_err, output, run};
    use super::*;
    use crate::scheduler::Outcome;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1").unwrap(), 1.0);
        assert_eq!(parse_duration("1.5").unwrap(), 1.5);
        assert_eq!(parse_duration("2m").unwrap(), 120.0);
        assert_eq!(parse_duration("0.5h").unwrap(), 1800.0);
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("-1").is_err());
    }

    #[tokio::test]
    async fn test_short_sleep_passes_input_through() {
        assert_eq!(output(&["sleep", "0.01"], "kept\n").await, "kept\n");
    }

    #[tokio::test]
    async fn test_zero_sleep() {
        let (outcome, out, _) = run(&["sleep", "0"], "").await;
        assert!(matches!(outcome, Outcome::Success));
        assert!(out.is_empty());
    }

    #[test]
    fn test_invalid_interval() {
        assert!(matches!(configure_err(&["sleep", "soon"]), ConfigError::InvalidValue { .. }));
    }
}
