//! SqlWeave Core
//!
//! Shared domain types for the dynamic SQL renderer:
//! - The runtime parameter map and value classification helpers
//! - The `(sql, parameters)` output pair every statement build produces

pub mod bound;
pub mod value;

pub use bound::{BoundSql, CommandType};
pub use value::{display_string, is_empty_value, numeric_value, resolve_path, ParamMap};
