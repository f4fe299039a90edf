//! cut: Select fields from each line.

use std::sync::Arc;

use async_trait::async_trait;
use pipekit_types::{ParamSchema, ToolArgs, ToolSchema, Value};

use crate::context::ExecContext;
use crate::error::{ConfigError, StageResult};
use crate::stage::{Stage, StageIo};
use crate::tools::Tool;

/// Cut tool: remove sections from each line.
pub struct Cut;

impl Tool for Cut {
    fn name(&self) -> &str {
        "cut"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("cut", "Select delimited fields from each line")
            .param(ParamSchema::required(
                "fields",
                "string",
                "Fields to keep: N, N-M, N- or -M, comma separated (-f)",
            ).with_aliases(["-f"]))
            .param(ParamSchema::optional(
                "delimiter",
                "string",
                Value::String("\t".into()),
                "Field delimiter, a single character (-d)",
            ).with_aliases(["-d"]))
            .example("Second column of CSV", "cut -d , -f 2")
            .example("Everything from the third field on", "cut -f 3-")
    }

    fn configure(&self, args: &ToolArgs) -> Result<Arc<dyn Stage>, ConfigError> {
        let list = args.get_string("fields", 0).ok_or_else(|| ConfigError::MissingParam {
            tool: "cut".to_string(),
            param: "fields".to_string(),
        })?;
        let ranges = parse_fields(&list).map_err(|msg| ConfigError::invalid("cut", "fields", msg))?;

        let delimiter = args.get_string("delimiter", usize::MAX).unwrap_or_else(|| "\t".to_string());
        let mut chars = delimiter.chars();
        let delimiter = match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ => {
                return Err(ConfigError::invalid(
                    "cut",
                    "delimiter",
                    "the delimiter must be a single character",
                ))
            }
        };

        Ok(Arc::new(CutStage { ranges, delimiter }))
    }
}

/// Inclusive, 1-based field range; `end == None` runs to the last field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldRange {
    start: usize,
    end: Option<usize>,
}

impl FieldRange {
    fn contains(&self, field: usize) -> bool {
        field >= self.start && self.end.is_none_or(|end| field <= end)
    }
}

fn parse_fields(list: &str) -> Result<Vec<FieldRange>, String> {
    let position = |s: &str| -> Result<usize, String> {
        match s.trim().parse::<usize>() {
            Ok(0) => Err("fields are numbered from 1".to_string()),
            Ok(n) => Ok(n),
            Err(_) => Err(format!("invalid field '{}'", s)),
        }
    };

    let mut ranges = Vec::new();
    for part in list.split(',') {
        let range = match part.split_once('-') {
            None => {
                let n = position(part)?;
                FieldRange { start: n, end: Some(n) }
            }
            Some(("", "")) => return Err("invalid range '-'".to_string()),
            Some(("", end)) => FieldRange { start: 1, end: Some(position(end)?) },
            Some((start, "")) => FieldRange { start: position(start)?, end: None },
            Some((start, end)) => {
                let (start, end) = (position(start)?, position(end)?);
                if end < start {
                    return Err(format!("decreasing range '{}'", part));
                }
                FieldRange { start, end: Some(end) }
            }
        };
        ranges.push(range);
    }
    Ok(ranges)
}

struct CutStage {
    ranges: Vec<FieldRange>,
    delimiter: char,
}

impl CutStage {
    fn select(&self, line: &str) -> String {
        if !line.contains(self.delimiter) {
            return line.to_string();
        }
        let mut out = String::with_capacity(line.len());
        let mut first = true;
        for (i, field) in line.split(self.delimiter).enumerate() {
            if self.ranges.iter().any(|r| r.contains(i + 1)) {
                if !first {
                    out.push(self.delimiter);
                }
                out.push_str(field);
                first = false;
            }
        }
        out
    }
}

#[async_trait]
impl Stage for CutStage {
    fn name(&self) -> &str {
        "cut"
    }

    async fn run(&self, _ctx: &ExecContext, io: &mut StageIo) -> StageResult {
        while let Some(line) = io.stdin.next_line().await? {
            io.stdout.write_line(&self.select(&line)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{configure_err, output};
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&["cut", "-d", ",", "-f", "2"], "a,b,c\n1,2,3\n", "b\n2\n")]
    #[case(&["cut", "-d,", "-f1,3"], "a,b,c\n", "a,c\n")]
    #[case(&["cut", "-d", ":", "-f", "2-"], "a:b:c\n", "b:c\n")]
    #[case(&["cut", "-d", ":", "-f", "-2"], "a:b:c\n", "a:b\n")]
    #[case(&["cut", "-f", "2"], "x\ty\n", "y\n")]
    #[case(&["cut", "-d", ",", "-f", "2"], "no delimiter\n", "no delimiter\n")]
    #[case(&["cut", "-d", ",", "-f", "5"], "a,b\n", "\n")]
    #[tokio::test]
    async fn test_cut(#[case] argv: &[&str], #[case] input: &str, #[case] expected: &str) {
        assert_eq!(output(argv, input).await, expected);
    }

    #[test]
    fn test_parse_fields() {
        assert_eq!(
            parse_fields("1,3-4,6-").unwrap(),
            vec![
                FieldRange { start: 1, end: Some(1) },
                FieldRange { start: 3, end: Some(4) },
                FieldRange { start: 6, end: None },
            ]
        );
        assert!(parse_fields("0").is_err());
        assert!(parse_fields("3-1").is_err());
        assert!(parse_fields("x").is_err());
    }

    #[rstest]
    #[case(&["cut", "-f", "0"])]
    #[case(&["cut", "-d", "ab", "-f", "1"])]
    fn test_invalid_config(#[case] argv: &[&str]) {
        assert!(matches!(configure_err(argv), ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_fields_required() {
        assert!(matches!(configure_err(&["cut", "-d", ","]), ConfigError::MissingParam { .. }));
    }
}
