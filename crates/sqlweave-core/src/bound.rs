//! Build output types
//!
//! `BoundSql` is the pair every statement build produces: the rendered SQL
//! text and the parameter map to bind against it. The map may contain more
//! entries than the caller supplied (foreach registers one per iteration).

use crate::value::ParamMap;
use serde::{Deserialize, Serialize};

/// Rendered SQL plus the parameters to bind against it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundSql {
    /// The final SQL text, with `@name` placeholders left in place
    pub sql: String,

    /// Parameters to bind, keyed by placeholder name
    pub params: ParamMap,
}

impl BoundSql {
    pub fn new(sql: impl Into<String>, params: ParamMap) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// The SQL command kind a mapped statement was declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Select,
    Insert,
    Update,
    Delete,
}

impl CommandType {
    /// Stable lowercase identifier, matching the mapper element names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Parse a mapper element name into a command type.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "select" => Some(Self::Select),
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
