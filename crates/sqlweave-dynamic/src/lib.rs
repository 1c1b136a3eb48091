//! Dynamic SQL rendering
//!
//! This crate is the template interpreter:
//! - `RenderContext`: per-build mutable state (SQL buffer + parameter map)
//! - `SqlNode`: the closed node tree a mapper statement compiles to
//! - `eval`: the small boolean condition language used by `<if>`/`<when>`
//!
//! Rendering never fails: missing parameters, unresolvable paths and
//! unparseable conditions all degrade to "this fragment contributes
//! nothing", so a structurally valid tree always produces a SQL string.

pub mod context;
pub mod eval;
pub mod node;

pub use context::RenderContext;
pub use eval::evaluate;
pub use node::{ForEachNode, SqlNode, TrimNode, WhenBranch};
