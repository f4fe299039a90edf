//! Tool schema and argument types.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::value::Value;

/// Schema for a tool parameter.
#[derive(Debug, Clone, Serialize)]
pub struct ParamSchema {
    /// Parameter name.
    pub name: String,
    /// Type hint (string, int, float, bool).
    pub param_type: String,
    /// Whether this parameter is required.
    pub required: bool,
    /// Default value if not required.
    pub default: Option<Value>,
    /// Description for help text.
    pub description: String,
    /// Alternative names/flags for this parameter (e.g., "-n" for "lines").
    pub aliases: Vec<String>,
}

impl ParamSchema {
    /// Create a required parameter.
    pub fn required(name: impl Into<String>, param_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            required: true,
            default: None,
            description: description.into(),
            aliases: Vec::new(),
        }
    }

    /// Create an optional parameter with a default value.
    pub fn optional(name: impl Into<String>, param_type: impl Into<String>, default: Value, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            required: false,
            default: Some(default),
            description: description.into(),
            aliases: Vec::new(),
        }
    }

    /// Add alternative names/flags for this parameter.
    pub fn with_aliases(mut self, aliases: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    /// Check if a flag spelling (`-n`, `--lines`) refers to this parameter.
    pub fn matches_flag(&self, flag: &str) -> bool {
        if flag.strip_prefix("--") == Some(self.name.as_str()) {
            return true;
        }
        self.aliases.iter().any(|a| a == flag)
    }

    /// Whether the parameter consumes a value (`-n 5`) rather than being a switch.
    pub fn takes_value(&self) -> bool {
        self.param_type != "bool"
    }
}

/// An example showing how to use a tool.
#[derive(Debug, Clone, Serialize)]
pub struct Example {
    /// Short description of what the example demonstrates.
    pub description: String,
    /// The example command line.
    pub code: String,
}

impl Example {
    /// Create a new example.
    pub fn new(description: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            code: code.into(),
        }
    }
}

/// Schema describing a tool's interface.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    /// Tool name.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Parameter definitions.
    pub params: Vec<ParamSchema>,
    /// Usage examples.
    pub examples: Vec<Example>,
}

impl ToolSchema {
    /// Create a new tool schema.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            examples: Vec::new(),
        }
    }

    /// Add a parameter to the schema.
    pub fn param(mut self, param: ParamSchema) -> Self {
        self.params.push(param);
        self
    }

    /// Add an example to the schema.
    pub fn example(mut self, description: impl Into<String>, code: impl Into<String>) -> Self {
        self.examples.push(Example::new(description, code));
        self
    }

    /// Look up a parameter by canonical name.
    pub fn get_param(&self, name: &str) -> Option<&ParamSchema> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Look up a parameter by flag spelling.
    pub fn find_flag(&self, flag: &str) -> Option<&ParamSchema> {
        self.params.iter().find(|p| p.matches_flag(flag))
    }
}

/// Parsed arguments ready for tool configuration.
#[derive(Debug, Clone, Default)]
pub struct ToolArgs {
    /// Positional arguments in order.
    pub positional: Vec<Value>,
    /// Named arguments by key.
    pub named: HashMap<String, Value>,
    /// Boolean flags (e.g., -l, --force).
    pub flags: HashSet<String>,
}

impl ToolArgs {
    /// Create empty args.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a command-line style argument vector against a schema.
    ///
    /// - `--` ends option processing
    /// - `--name=value`, `--name value` and `-n value` / `-n5` fill named
    ///   parameters whose type takes a value
    /// - `-abc` expands to single-character flags, mapped through aliases
    /// - `key=value` fills a named parameter when `key` is in the schema
    /// - negative numbers and everything else are positional
    ///
    /// Flags are stored under the canonical parameter name when the schema
    /// knows them, and verbatim otherwise so validation can reject them.
    pub fn parse<S: AsRef<str>>(argv: &[S], schema: &ToolSchema) -> Self {
        let mut args = ToolArgs::new();
        let mut tokens = argv.iter().map(AsRef::as_ref);
        let mut options_done = false;

        while let Some(token) = tokens.next() {
            if options_done {
                args.positional.push(Value::from(token));
                continue;
            }
            if token == "--" {
                options_done = true;
                continue;
            }

            if let Some(long) = token.strip_prefix("--") {
                let (name, inline) = match long.split_once('=') {
                    Some((name, value)) => (name, Some(value)),
                    None => (long, None),
                };
                match schema.find_flag(&format!("--{name}")) {
                    Some(param) if param.takes_value() => {
                        let raw = inline.or_else(|| tokens.next());
                        args.set_param(param, raw);
                    }
                    Some(param) => {
                        args.flags.insert(param.name.clone());
                    }
                    None => {
                        args.flags.insert(name.to_string());
                    }
                }
                continue;
            }

            if token.len() > 1 && token.starts_with('-') && token.parse::<f64>().is_err() {
                let body = &token[1..];
                if let Some(first) = body.chars().next() {
                    if let Some(param) = schema.find_flag(&format!("-{first}")).filter(|p| p.takes_value()) {
                        let rest = &body[first.len_utf8()..];
                        let raw = if rest.is_empty() { tokens.next() } else { Some(rest) };
                        args.set_param(param, raw);
                        continue;
                    }
                }
                for c in body.chars() {
                    match schema.find_flag(&format!("-{c}")) {
                        Some(param) => args.flags.insert(param.name.clone()),
                        None => args.flags.insert(c.to_string()),
                    };
                }
                continue;
            }

            if let Some((key, value)) = token.split_once('=') {
                if let Some(param) = schema.get_param(key) {
                    args.named.insert(param.name.clone(), Value::coerce(value, &param.param_type));
                    continue;
                }
            }

            args.positional.push(Value::from(token));
        }

        args
    }

    fn set_param(&mut self, param: &ParamSchema, raw: Option<&str>) {
        match raw {
            Some(raw) => {
                self.named.insert(param.name.clone(), Value::coerce(raw, &param.param_type));
            }
            // A value option with nothing after it; validation reports it.
            None => {
                self.flags.insert(param.name.clone());
            }
        }
    }

    /// Get a positional argument by index.
    pub fn get_positional(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Get a named argument by key.
    pub fn get_named(&self, key: &str) -> Option<&Value> {
        self.named.get(key)
    }

    /// Get a named argument or positional fallback.
    ///
    /// Useful for tools that accept both `grep foo` and `grep pattern=foo`.
    pub fn get(&self, name: &str, positional_index: usize) -> Option<&Value> {
        self.named.get(name).or_else(|| self.positional.get(positional_index))
    }

    /// Get a string value from args.
    pub fn get_string(&self, name: &str, positional_index: usize) -> Option<String> {
        self.get(name, positional_index).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    /// Get a boolean value from args.
    pub fn get_bool(&self, name: &str, positional_index: usize) -> Option<bool> {
        self.get(name, positional_index).and_then(|v| match v {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            Value::Int(i) => Some(*i != 0),
            _ => None,
        })
    }

    /// Check if a flag is set (in flags set, or named bool).
    pub fn has_flag(&self, name: &str) -> bool {
        if self.flags.contains(name) {
            return true;
        }
        self.named.get(name).is_some_and(|v| match v {
            Value::Bool(b) => *b,
            Value::String(s) => !s.is_empty() && s != "false" && s != "0",
            _ => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn head_schema() -> ToolSchema {
        ToolSchema::new("head", "first lines")
            .param(ParamSchema::optional("lines", "int", Value::Int(10), "Lines to keep").with_aliases(["-n"]))
            .param(ParamSchema::optional("quiet", "bool", Value::Bool(false), "No headers").with_aliases(["-q"]))
    }

    #[rstest]
    #[case(&["-n", "3"])]
    #[case(&["-n3"])]
    #[case(&["--lines", "3"])]
    #[case(&["--lines=3"])]
    #[case(&["lines=3"])]
    fn test_value_option_spellings(#[case] argv: &[&str]) {
        let args = ToolArgs::parse(argv, &head_schema());
        assert_eq!(args.get_named("lines"), Some(&Value::Int(3)));
        assert!(args.positional.is_empty());
    }

    #[test]
    fn test_short_flags_map_to_canonical_names() {
        let args = ToolArgs::parse(&["-q", "-x"], &head_schema());
        assert!(args.has_flag("quiet"));
        assert!(args.flags.contains("x"));
    }

    #[test]
    fn test_double_dash_ends_options() {
        let args = ToolArgs::parse(&["--", "-n", "5"], &head_schema());
        assert!(args.named.is_empty());
        assert_eq!(args.positional, vec![Value::from("-n"), Value::from("5")]);
    }

    #[test]
    fn test_negative_numbers_stay_positional() {
        let args = ToolArgs::parse(&["-3", "-1.5"], &head_schema());
        assert_eq!(args.positional.len(), 2);
        assert!(args.flags.is_empty());
    }

    #[test]
    fn test_unknown_key_value_is_positional() {
        let args = ToolArgs::parse(&["a=b"], &head_schema());
        assert_eq!(args.positional, vec![Value::from("a=b")]);
    }

    #[test]
    fn test_missing_option_value_becomes_flag() {
        let args = ToolArgs::parse(&["-n"], &head_schema());
        assert!(args.flags.contains("lines"));
        assert!(args.get_named("lines").is_none());
    }

    #[test]
    fn test_get_prefers_named_over_positional() {
        let mut args = ToolArgs::new();
        args.positional.push(Value::from("pos"));
        args.named.insert("pattern".into(), Value::from("named"));
        assert_eq!(args.get_string("pattern", 0).as_deref(), Some("named"));
    }
}
