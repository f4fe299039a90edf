//! Core tool trait and schema validation.

use std::sync::Arc;

use pipekit_types::{ToolArgs, ToolSchema, Value};

use crate::error::ConfigError;
use crate::stage::Stage;

/// A command that can be configured into a [`Stage`].
///
/// All parameter resolution happens in `configure`, before anything is
/// scheduled, so a bad argument never leaves a half-started pipeline behind.
pub trait Tool: Send + Sync {
    /// The tool's name (used for lookup).
    fn name(&self) -> &str;

    /// Get the tool's schema.
    fn schema(&self) -> ToolSchema;

    /// Build a configured stage from already validated arguments.
    fn configure(&self, args: &ToolArgs) -> Result<Arc<dyn Stage>, ConfigError>;
}

/// Check parsed arguments against a schema.
///
/// Rejects unknown flags and named parameters, value options given without
/// a value, values of the wrong type and missing required parameters. The
/// k-th required parameter may also be supplied as the k-th positional
/// argument.
pub fn validate_against_schema(args: &ToolArgs, schema: &ToolSchema) -> Result<(), ConfigError> {
    let tool = schema.name.as_str();

    let mut flags: Vec<&String> = args.flags.iter().collect();
    flags.sort();
    for flag in flags {
        match schema.get_param(flag) {
            None => {
                return Err(ConfigError::UnknownFlag {
                    tool: tool.to_string(),
                    flag: flag_spelling(flag),
                })
            }
            Some(param) if param.takes_value() => {
                return Err(ConfigError::MissingValue {
                    tool: tool.to_string(),
                    param: param.name.clone(),
                })
            }
            Some(_) => {}
        }
    }

    let mut named: Vec<(&String, &Value)> = args.named.iter().collect();
    named.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in named {
        let Some(param) = schema.get_param(key) else {
            return Err(ConfigError::UnknownParam {
                tool: tool.to_string(),
                param: key.clone(),
            });
        };
        check_type(tool, &param.name, &param.param_type, value)?;
    }

    for (index, param) in schema.params.iter().filter(|p| p.required).enumerate() {
        if !args.named.contains_key(&param.name) && args.positional.len() <= index {
            return Err(ConfigError::MissingParam {
                tool: tool.to_string(),
                param: param.name.clone(),
            });
        }
    }

    Ok(())
}

fn check_type(tool: &str, name: &str, param_type: &str, value: &Value) -> Result<(), ConfigError> {
    let ok = match param_type {
        "int" => matches!(value, Value::Int(_)),
        "float" => value.as_float().is_some(),
        "bool" => matches!(value, Value::Bool(_)),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            tool,
            name,
            format!("expected {}, got '{}'", param_type, value.as_text()),
        ))
    }
}

fn flag_spelling(flag: &str) -> String {
    if flag.chars().count() == 1 {
        format!("-{}", flag)
    } else {
        format!("--{}", flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipekit_types::ParamSchema;
    use rstest::rstest;

    fn schema() -> ToolSchema {
        ToolSchema::new("grep", "search")
            .param(ParamSchema::required("pattern", "string", "Pattern"))
            .param(ParamSchema::optional("max", "int", Value::Null, "Stop after N").with_aliases(["-m"]))
            .param(ParamSchema::optional("invert", "bool", Value::Bool(false), "Invert").with_aliases(["-v"]))
    }

    fn check(argv: &[&str]) -> Result<(), ConfigError> {
        let schema = schema();
        validate_against_schema(&ToolArgs::parse(argv, &schema), &schema)
    }

    #[rstest]
    #[case(&["foo"])]
    #[case(&["pattern=foo"])]
    #[case(&["-v", "-m", "3", "foo"])]
    fn test_valid_args(#[case] argv: &[&str]) {
        assert_eq!(check(argv), Ok(()));
    }

    #[test]
    fn test_missing_required() {
        assert_eq!(
            check(&["-v"]),
            Err(ConfigError::MissingParam {
                tool: "grep".into(),
                param: "pattern".into()
            })
        );
    }

    #[test]
    fn test_unknown_flag() {
        assert_eq!(
            check(&["-z", "foo"]),
            Err(ConfigError::UnknownFlag {
                tool: "grep".into(),
                flag: "-z".into()
            })
        );
        assert!(matches!(check(&["--frobnicate", "foo"]), Err(ConfigError::UnknownFlag { flag, .. }) if flag == "--frobnicate"));
    }

    #[test]
    fn test_value_option_without_value() {
        assert!(matches!(check(&["foo", "-m"]), Err(ConfigError::MissingValue { param, .. }) if param == "max"));
    }

    #[test]
    fn test_wrong_type() {
        assert!(matches!(check(&["-m", "lots", "foo"]), Err(ConfigError::InvalidValue { param, .. }) if param == "max"));
    }

    #[test]
    fn test_unknown_named_param() {
        let schema = schema();
        let mut args = ToolArgs::parse(&["foo"], &schema);
        args.named.insert("colour".into(), Value::from("red"));
        assert!(matches!(
            validate_against_schema(&args, &schema),
            Err(ConfigError::UnknownParam { param, .. }) if param == "colour"
        ));
    }
}
