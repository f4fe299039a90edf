//! wc: Count lines, words and bytes.

use std::sync::Arc;

use async_trait::async_trait;
use pipekit_types::{ParamSchema, ToolArgs, ToolSchema, Value};

use crate::context::ExecContext;
use crate::error::{ConfigError, StageResult};
use crate::stage::{Stage, StageIo};
use crate::tools::Tool;

use super::CHUNK_SIZE;

/// Wc tool: print newline, word and byte counts.
pub struct Wc;

impl Tool for Wc {
    fn name(&self) -> &str {
        "wc"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("wc", "Count lines, words and bytes")
            .param(ParamSchema::optional("lines", "bool", Value::Bool(false), "Count lines (-l)").with_aliases(["-l"]))
            .param(ParamSchema::optional("words", "bool", Value::Bool(false), "Count words (-w)").with_aliases(["-w"]))
            .param(ParamSchema::optional("bytes", "bool", Value::Bool(false), "Count bytes (-c)").with_aliases(["-c"]))
            .example("Number of lines", "seq 10 | wc -l")
    }

    fn configure(&self, args: &ToolArgs) -> Result<Arc<dyn Stage>, ConfigError> {
        let mut stage = WcStage {
            lines: args.has_flag("lines"),
            words: args.has_flag("words"),
            bytes: args.has_flag("bytes"),
        };
        if !(stage.lines || stage.words || stage.bytes) {
            stage = WcStage { lines: true, words: true, bytes: true };
        }
        Ok(Arc::new(stage))
    }
}

struct WcStage {
    lines: bool,
    words: bool,
    bytes: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Counts {
    lines: usize,
    words: usize,
    bytes: usize,
    in_word: bool,
}

impl Counts {
    fn feed(&mut self, chunk: &[u8]) {
        self.bytes += chunk.len();
        for &b in chunk {
            if b == b'\n' {
                self.lines += 1;
            }
            if b.is_ascii_whitespace() {
                self.in_word = false;
            } else if !self.in_word {
                self.in_word = true;
                self.words += 1;
            }
        }
    }
}

#[async_trait]
impl Stage for WcStage {
    fn name(&self) -> &str {
        "wc"
    }

    async fn run(&self, _ctx: &ExecContext, io: &mut StageIo) -> StageResult {
        let mut counts = Counts::default();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = io.stdin.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            counts.feed(&buf[..n]);
        }

        let mut fields = Vec::with_capacity(3);
        if self.lines {
            fields.push(counts.lines);
        }
        if self.words {
            fields.push(counts.words);
        }
        if self.bytes {
            fields.push(counts.bytes);
        }
        let line = match fields.as_slice() {
            [single] => single.to_string(),
            many => many
                .iter()
                .map(|n| format!("{:>7}", n))
                .collect::<Vec<_>>()
                .join(" "),
        };
        io.stdout.write_line(&line).await
    }
}
