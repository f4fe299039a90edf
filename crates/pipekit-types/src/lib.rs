//! Pure data types for pipekit: argument values and tool schemas.
//!
//! This crate is a leaf dependency with no async runtime and no I/O, so
//! command collaborators can describe their parameters without pulling in
//! the pipeline engine.

pub mod tool;
pub mod value;

pub use tool::*;
pub use value::*;
