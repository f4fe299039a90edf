//! Tool system for pipekit.
//!
//! A tool turns an argument vector into a configured [`Stage`](crate::Stage).
//! Configuration runs before scheduling, so `grep` with a bad regex is a
//! [`ConfigError`](crate::ConfigError), not a failed run.
//!
//! # Architecture
//!
//! ```text
//! argv ──ToolArgs::parse──▶ ToolArgs ──validate_against_schema──▶ Tool::configure ──▶ Arc<dyn Stage>
//!
//! ToolRegistry
//! └── Builtins (echo, cat, grep, head, tail, sort, uniq, wc, cut, seq, tr, sleep)
//! ```

mod builtin;
mod registry;
mod traits;

pub use builtin::register_builtins;
pub use pipekit_types::{ParamSchema, ToolArgs, ToolSchema, Value};
pub use registry::ToolRegistry;
pub use traits::{validate_against_schema, Tool};
