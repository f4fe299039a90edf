//! Built-in tools for pipekit.
//!
//! Every builtin streams line by line (or chunk by chunk) through its
//! [`StageIo`], so each works equally well in the middle of a pipeline.

mod cat;
mod cut;
mod echo;
mod grep;
mod head;
mod seq;
mod sleep;
mod sort;
mod tail;
mod tr;
mod uniq;
mod wc;

use pipekit_types::ToolArgs;

use crate::error::{ConfigError, StageResult};
use crate::stage::StageIo;

use super::ToolRegistry;

/// Register all built-in tools with the registry.
pub fn register_builtins(registry: &mut ToolRegistry) {
    registry.register(cat::Cat);
    registry.register(cut::Cut);
    registry.register(echo::Echo);
    registry.register(grep::Grep);
    registry.register(head::Head);
    registry.register(seq::Seq);
    registry.register(sleep::Sleep);
    registry.register(sort::Sort);
    registry.register(tail::Tail);
    registry.register(tr::Tr);
    registry.register(uniq::Uniq);
    registry.register(wc::Wc);
}

const CHUNK_SIZE: usize = 8 * 1024;

/// A non-negative count option such as `head -n`.
fn count_arg(args: &ToolArgs, tool: &str, name: &str, default: usize) -> Result<usize, ConfigError> {
    match args.get_named(name) {
        None => Ok(default),
        Some(value) => value
            .as_int()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| {
                ConfigError::invalid(
                    tool,
                    name,
                    format!("expected a non-negative integer, got '{}'", value.as_text()),
                )
            }),
    }
}

/// Copy input to output unchanged, chunk by chunk.
async fn passthrough(io: &mut StageIo) -> StageResult {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = io.stdin.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        io.stdout.write_all(&buf[..n]).await?;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io::Cursor;
    use std::time::Duration;

    use crate::context::ExecContext;
    use crate::error::ConfigError;
    use crate::scheduler::{CaptureBuffer, Outcome};
    use crate::tools::ToolRegistry;

    /// Configure `argv` as a single builtin and run it over `input`.
    pub async fn run(argv: &[&str], input: &str) -> (Outcome, String, String) {
        let stage = ToolRegistry::with_builtins().build(argv).expect("configure");
        let out = CaptureBuffer::new();
        let err = CaptureBuffer::new();
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            crate::execute(
                &ExecContext::new(),
                stage,
                Cursor::new(input.as_bytes().to_vec()),
                out.clone(),
                err.clone(),
            ),
        )
        .await
        .expect("stage timed out");
        (outcome, out.text(), err.text())
    }

    /// Run and return stdout, asserting success.
    pub async fn output(argv: &[&str], input: &str) -> String {
        let (outcome, out, err) = run(argv, input).await;
        assert!(outcome.is_success(), "{outcome} (stderr: {err})");
        out
    }

    pub fn configure_err(argv: &[&str]) -> ConfigError {
        match ToolRegistry::with_builtins().build(argv) {
            Ok(_) => panic!("{argv:?} configured unexpectedly"),
            Err(err) => err,
        }
    }
}
