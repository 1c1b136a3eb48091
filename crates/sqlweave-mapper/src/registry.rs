//! Statement registry
//!
//! Maps namespaced ids to loaded statements. Populated at load time, then
//! only read; statements are behind `Arc` so concurrent builds share them
//! without copying. Lookup of an unknown id is a named error, the one
//! failure this layer surfaces instead of degrading.

use crate::loader::{load_mapper_str, MapperError};
use crate::statement::MappedStatement;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Lookup failure for an id nothing was registered under.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("statement '{id}' is not registered")]
pub struct UnknownStatement {
    pub id: String,
}

/// Registry of mapped statements, keyed by namespaced id.
#[derive(Debug, Default)]
pub struct MapperRegistry {
    statements: HashMap<String, Arc<MappedStatement>>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one statement. Re-registering an id replaces the previous
    /// statement.
    pub fn register(&mut self, statement: MappedStatement) {
        let id = statement.id.clone();
        if self.statements.insert(id.clone(), Arc::new(statement)).is_some() {
            warn!(%id, "statement id registered twice, replacing previous definition");
        }
    }

    /// Register every statement from a mapper XML document.
    pub fn register_str(&mut self, xml: &str) -> Result<(), MapperError> {
        for statement in load_mapper_str(xml)? {
            self.register(statement);
        }
        Ok(())
    }

    /// Register every statement from a mapper XML file.
    pub fn register_file(&mut self, path: &Path) -> Result<(), MapperError> {
        let xml = std::fs::read_to_string(path)?;
        self.register_str(&xml)?;
        debug!(path = %path.display(), count = self.statements.len(), "mapper file loaded");
        Ok(())
    }

    /// Register every `*.xml` mapper file under a directory, recursively.
    /// A file that fails to load is skipped with a warning so the rest of
    /// the directory still registers. Returns the number of files loaded.
    pub fn register_dir(&mut self, dir: &Path) -> usize {
        let mut loaded = 0;
        for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "xml") {
                continue;
            }
            match self.register_file(path) {
                Ok(()) => loaded += 1,
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping mapper file that failed to load");
                }
            }
        }
        loaded
    }

    /// Look up a statement by its namespaced id.
    pub fn get(&self, id: &str) -> Result<Arc<MappedStatement>, UnknownStatement> {
        self.statements
            .get(id)
            .cloned()
            .ok_or_else(|| UnknownStatement { id: id.to_string() })
    }

    /// All registered ids, sorted for stable listings.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.statements.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlweave_core::CommandType;

    #[test]
    fn register_and_get() {
        let mut registry = MapperRegistry::new();
        registry.register(MappedStatement::new_static(
            "user.getAll",
            CommandType::Select,
            "SELECT * FROM users",
        ));

        let stmt = registry.get("user.getAll").unwrap();
        assert_eq!(stmt.id, "user.getAll");
        assert_eq!(registry.ids(), vec!["user.getAll"]);
    }

    #[test]
    fn unknown_id_is_a_named_error() {
        let registry = MapperRegistry::new();
        let err = registry.get("user.missing").unwrap_err();
        assert_eq!(err.id, "user.missing");
        assert_eq!(err.to_string(), "statement 'user.missing' is not registered");
    }

    #[test]
    fn register_dir_walks_recursively_and_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("mappers");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(
            nested.join("user.xml"),
            r#"<mapper namespace="user"><select id="getAll">SELECT * FROM users</select></mapper>"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("order.xml"),
            r#"<mapper namespace="order"><select id="getAll">SELECT * FROM orders</select></mapper>"#,
        )
        .unwrap();
        // missing id attribute: this file fails to load but must not abort
        std::fs::write(
            nested.join("broken.xml"),
            r#"<mapper namespace="bad"><select>SELECT 1</select></mapper>"#,
        )
        .unwrap();
        std::fs::write(nested.join("notes.txt"), "not a mapper").unwrap();

        let mut registry = MapperRegistry::new();
        let loaded = registry.register_dir(dir.path());

        assert_eq!(loaded, 2);
        assert_eq!(registry.ids(), vec!["order.getAll", "user.getAll"]);
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = MapperRegistry::new();
        registry.register(MappedStatement::new_static(
            "user.getAll",
            CommandType::Select,
            "SELECT 1",
        ));
        registry.register(MappedStatement::new_static(
            "user.getAll",
            CommandType::Select,
            "SELECT 2",
        ));

        assert_eq!(registry.len(), 1);
        let bound = registry.get("user.getAll").unwrap().build_sql(&Default::default());
        assert_eq!(bound.sql, "SELECT 2");
    }
}
