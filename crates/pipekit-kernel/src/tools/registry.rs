//! Tool registry: name lookup and argv → stage configuration.

use std::collections::HashMap;
use std::sync::Arc;

use pipekit_types::{ToolArgs, ToolSchema};

use crate::error::ConfigError;
use crate::scheduler::compose;
use crate::stage::Stage;

use super::builtin::register_builtins;
use super::traits::{validate_against_schema, Tool};

/// Registry of available tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every builtin.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_builtins(&mut registry);
        registry
    }

    /// Register a tool. A later registration under the same name wins.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Schemas of every registered tool, sorted by name.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Configure one command from its argument vector (`["grep", "-i", "foo"]`).
    pub fn build<S: AsRef<str>>(&self, argv: &[S]) -> Result<Arc<dyn Stage>, ConfigError> {
        let (name, rest) = argv.split_first().ok_or(ConfigError::EmptyCommand)?;
        let name = name.as_ref();
        let tool = self
            .get(name)
            .ok_or_else(|| ConfigError::UnknownTool(name.to_string()))?;

        let schema = tool.schema();
        let args = ToolArgs::parse(rest, &schema);
        validate_against_schema(&args, &schema)?;
        let stage = tool.configure(&args)?;
        tracing::debug!(tool = name, "configured stage");
        Ok(stage)
    }

    /// Configure every command, then compose them left to right.
    ///
    /// Nothing is built unless every command configures cleanly.
    pub fn build_pipeline<S: AsRef<str>>(&self, commands: &[Vec<S>]) -> Result<Arc<dyn Stage>, ConfigError> {
        let stages = commands
            .iter()
            .map(|argv| self.build(argv.as_slice()))
            .collect::<Result<Vec<_>, _>>()?;
        compose(stages)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = ToolRegistry::with_builtins();
        for name in [
            "cat", "cut", "echo", "grep", "head", "seq", "sleep", "sort", "tail", "tr", "uniq", "wc",
        ] {
            assert!(registry.contains(name), "missing builtin {name}");
        }
        let names = registry.names();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_unknown_tool() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(
            registry.build(&["frobnicate"]).err(),
            Some(ConfigError::UnknownTool("frobnicate".into()))
        );
        assert_eq!(registry.build::<&str>(&[]).err(), Some(ConfigError::EmptyCommand));
    }

    #[test]
    fn test_build_pipeline_fails_before_scheduling() {
        let registry = ToolRegistry::with_builtins();
        let commands = vec![vec!["seq", "3"], vec!["grep"]];
        assert!(matches!(
            registry.build_pipeline(&commands),
            Err(ConfigError::MissingParam { tool, param }) if tool == "grep" && param == "pattern"
        ));
        assert!(matches!(
            registry.build_pipeline::<&str>(&[]),
            Err(ConfigError::EmptyPipeline)
        ));
    }

    #[test]
    fn test_build_pipeline_names_members() {
        let registry = ToolRegistry::with_builtins();
        let stage = registry
            .build_pipeline(&[vec!["seq", "3"], vec!["sort", "-r"]])
            .unwrap();
        assert_eq!(stage.name(), "seq | sort");
    }
}
