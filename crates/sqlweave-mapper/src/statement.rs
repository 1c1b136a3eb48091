//! Mapped statements
//!
//! A statement pairs a stable id with either static SQL text or a compiled
//! node tree. Statements are built once at load time and are read-only
//! afterwards, so they can be shared across concurrent builds freely.

use sqlweave_core::{BoundSql, CommandType, ParamMap};
use sqlweave_dynamic::{RenderContext, SqlNode};
use tracing::trace;

/// A named SQL template, static or dynamic.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedStatement {
    /// Namespaced statement id, e.g. `user.findByIds`
    pub id: String,

    /// Command kind the statement was declared with
    pub command: CommandType,

    sql: String,
    root: Option<SqlNode>,
}

impl MappedStatement {
    /// A statement whose SQL is fixed text.
    pub fn new_static(id: impl Into<String>, command: CommandType, sql: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command,
            sql: sql.into(),
            root: None,
        }
    }

    /// A statement rendered from a node tree at build time.
    pub fn new_dynamic(id: impl Into<String>, command: CommandType, root: SqlNode) -> Self {
        Self {
            id: id.into(),
            command,
            sql: String::new(),
            root: Some(root),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.root.is_some()
    }

    /// Build the SQL for this statement against the given parameters.
    ///
    /// Static statements return their text and the input parameters
    /// unchanged. Dynamic statements walk the node tree in a fresh root
    /// context; the returned map carries any foreach-registered additions
    /// and is what must be bound against the SQL.
    pub fn build_sql(&self, params: &ParamMap) -> BoundSql {
        match &self.root {
            None => BoundSql::new(self.sql.clone(), params.clone()),
            Some(root) => {
                let mut ctx = RenderContext::new(params.clone());
                root.apply(&mut ctx);
                let sql = ctx.sql();
                trace!(id = %self.id, %sql, "built dynamic statement");
                BoundSql::new(sql, ctx.into_params())
            }
        }
    }
}
