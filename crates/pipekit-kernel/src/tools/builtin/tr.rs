//! tr: Translate or delete characters.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use pipekit_types::{ParamSchema, ToolArgs, ToolSchema, Value};

use crate::context::ExecContext;
use crate::error::{ConfigError, StageResult};
use crate::stage::{Stage, StageIo};
use crate::tools::Tool;

/// Tr tool: translate or delete characters.
pub struct Tr;

impl Tool for Tr {
    fn name(&self) -> &str {
        "tr"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("tr", "Translate or delete characters")
            .param(ParamSchema::required("set1", "string", "Characters to replace (ranges like a-z allowed)"))
            .param(ParamSchema::optional("set2", "string", Value::Null, "Replacement characters"))
            .param(ParamSchema::optional(
                "delete",
                "bool",
                Value::Bool(false),
                "Delete characters in set1 (-d)",
            ).with_aliases(["-d"]))
            .example("Uppercase", "tr a-z A-Z")
            .example("Strip digits", "tr -d 0-9")
    }

    fn configure(&self, args: &ToolArgs) -> Result<Arc<dyn Stage>, ConfigError> {
        let set1 = args.get_string("set1", 0).ok_or_else(|| ConfigError::MissingParam {
            tool: "tr".to_string(),
            param: "set1".to_string(),
        })?;
        let set1 = expand_set(&set1).map_err(|msg| ConfigError::invalid("tr", "set1", msg))?;
        let set2 = args.get_string("set2", 1);

        let mode = if args.has_flag("delete") {
            if set2.is_some() {
                return Err(ConfigError::invalid("tr", "set2", "only one set may be given with -d"));
            }
            TrMode::Delete(set1.into_iter().collect())
        } else {
            let set2 = set2.ok_or_else(|| ConfigError::MissingParam {
                tool: "tr".to_string(),
                param: "set2".to_string(),
            })?;
            let set2 = expand_set(&set2).map_err(|msg| ConfigError::invalid("tr", "set2", msg))?;
            let Some(&pad) = set2.last() else {
                return Err(ConfigError::invalid("tr", "set2", "must not be empty"));
            };
            // A short set2 is padded with its last character.
            let map = set1
                .into_iter()
                .enumerate()
                .map(|(i, from)| (from, set2.get(i).copied().unwrap_or(pad)))
                .collect();
            TrMode::Translate(map)
        };

        Ok(Arc::new(TrStage { mode }))
    }
}

/// Expand escapes (`\n`, `\t`, `\\`) and ranges (`a-z`) into characters.
fn expand_set(set: &str) -> Result<Vec<char>, String> {
    let mut chars = Vec::new();
    let mut iter = set.chars();
    while let Some(c) = iter.next() {
        let c = if c == '\\' {
            match iter.next() {
                Some('n') => '\n',
                Some('t') => '\t',
                Some('r') => '\r',
                Some(other) => other,
                None => '\\',
            }
        } else {
            c
        };
        chars.push(c);
    }

    let mut out = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        if i + 2 < chars.len() && chars[i + 1] == '-' {
            let (start, end) = (chars[i], chars[i + 2]);
            if end < start {
                return Err(format!("range '{}-{}' is in reverse order", start, end));
            }
            out.extend(start..=end);
            i += 3;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    Ok(out)
}

enum TrMode {
    Translate(HashMap<char, char>),
    Delete(HashSet<char>),
}

struct TrStage {
    mode: TrMode,
}

impl TrStage {
    fn apply(&self, line: &str) -> String {
        match &self.mode {
            TrMode::Translate(map) => line.chars().map(|c| map.get(&c).copied().unwrap_or(c)).collect(),
            TrMode::Delete(set) => line.chars().filter(|c| !set.contains(c)).collect(),
        }
    }
}

#[async_trait]
impl Stage for TrStage {
    fn name(&self) -> &str {
        "tr"
    }

    async fn run(&self, _ctx: &ExecContext, io: &mut StageIo) -> StageResult {
        let mut line = String::new();
        loop {
            line.clear();
            if io.stdin.read_line(&mut line).await? == 0 {
                return Ok(());
            }
            io.stdout.write_all(self.apply(&line).as_bytes()).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{configure_err, output};
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&["tr", "a-z", "A-Z"], "hello, world\n", "HELLO, WORLD\n")]
    #[case(&["tr", "-d", "0-9"], "a1b2c3\n", "abc\n")]
    #[case(&["tr", "abc", "x"], "aabbcc\n", "xxxxxx\n")]
    #[case(&["tr", "\\n", " "], "a\nb\n", "a b ")]
    #[case(&["tr", "-", "_"], "snake-case\n", "snake_case\n")]
    #[tokio::test]
    async fn test_tr(#[case] argv: &[&str], #[case] input: &str, #[case] expected: &str) {
        assert_eq!(output(argv, input).await, expected);
    }

    #[test]
    fn test_expand_set() {
        assert_eq!(expand_set("a-e").unwrap(), vec!['a', 'b', 'c', 'd', 'e']);
        assert_eq!(expand_set("x-").unwrap(), vec!['x', '-']);
        assert_eq!(expand_set("\\t").unwrap(), vec!['\t']);
        assert!(expand_set("z-a").is_err());
    }

    #[rstest]
    #[case(&["tr", "abc"])]
    #[case(&["tr"])]
    fn test_missing_sets(#[case] argv: &[&str]) {
        assert!(matches!(configure_err(argv), ConfigError::MissingParam { .. }));
    }

    #[test]
    fn test_delete_takes_one_set() {
        assert!(matches!(configure_err(&["tr", "-d", "a", "b"]), ConfigError::InvalidValue { .. }));
    }
}
