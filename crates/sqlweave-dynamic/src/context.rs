//! Render context
//!
//! Per-build mutable state: an output SQL buffer and this context's own copy
//! of the parameter map. Contexts never share parameter storage: a fork gets
//! a value copy, so mutations inside a fork (foreach registering indexed
//! parameters) stay invisible to the parent unless the parent merges them
//! explicitly. No context outlives a single statement build.

use serde_json::Value;
use sqlweave_core::{resolve_path, ParamMap};

/// Mutable state for one render pass over a node tree.
#[derive(Debug)]
pub struct RenderContext {
    sql: String,
    params: ParamMap,
}

impl RenderContext {
    /// Create a root context seeded with the caller's parameters.
    pub fn new(params: ParamMap) -> Self {
        Self {
            sql: String::new(),
            params,
        }
    }

    /// Fork a child context: empty buffer, value copy of this context's
    /// parameters. Used to measure a sub-tree's output before deciding
    /// whether to splice it into the parent.
    pub fn fork(&self) -> Self {
        Self::new(self.params.clone())
    }

    /// Append text to the SQL buffer.
    pub fn append(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Snapshot of the accumulated SQL, trimmed.
    pub fn sql(&self) -> String {
        self.sql.trim().to_string()
    }

    /// Look up a parameter by plain or dotted name.
    ///
    /// `None` means absent; `Some(Value::Null)` means present-but-null.
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        resolve_path(&self.params, name)
    }

    /// Insert or overwrite a parameter in this context's own map.
    pub fn set_parameter(&mut self, name: impl Into<String>, value: Value) {
        self.params.insert(name.into(), value);
    }

    /// Borrow the current parameter map (for fork snapshots).
    pub fn params(&self) -> &ParamMap {
        &self.params
    }

    /// Merge a fork's parameter map back into this context. Called by nodes
    /// that commit a fork's output, so registrations made inside the fork
    /// (foreach indexed parameters) reach the caller's final map.
    pub fn merge_params(&mut self, params: ParamMap) {
        self.params.extend(params);
    }

    /// Consume the context, returning the final parameter map.
    pub fn into_params(self) -> ParamMap {
        self.params
    }
}
