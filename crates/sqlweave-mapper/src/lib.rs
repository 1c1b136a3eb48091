//! Mapper statements
//!
//! The statement layer above the dynamic renderer:
//! - Loading mapper XML documents into `MappedStatement`s
//! - The registry that looks statements up by namespaced id
//! - `build_sql`, which turns a statement plus runtime parameters into a
//!   `BoundSql` ready for an execution layer to bind
//!
//! Loading may fail loudly (bad XML, missing attributes); building never
//! does.

pub mod loader;
pub mod registry;
pub mod statement;

pub use loader::{load_mapper_file, load_mapper_str, MapperError};
pub use registry::{MapperRegistry, UnknownStatement};
pub use statement::MappedStatement;
