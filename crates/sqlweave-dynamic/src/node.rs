//! The dynamic SQL node tree
//!
//! A statement compiles once into an immutable `SqlNode` tree; every build
//! walks the tree against a fresh `RenderContext`. `apply` reports whether
//! the node contributed output, which is how `<where>`/`<set>`/`<trim>`
//! decide whether to emit their clause at all.
//!
//! Nodes are a closed sum type with exhaustive matching, so a new node kind
//! cannot be added without handling it here.

use crate::context::RenderContext;
use crate::eval::evaluate;
use regex::Regex;
use serde_json::Value;

/// One node of a dynamic SQL template.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlNode {
    /// Literal SQL text, appended verbatim. Always counts as applied, even
    /// when blank.
    Text(String),

    /// An ordered sequence of children applied against the same context.
    Mixed(Vec<SqlNode>),

    /// `<if test="...">`: child applies only when the condition holds.
    If { test: String, contents: Box<SqlNode> },

    /// `<where>`: renders the child into a fork, strips one leading
    /// `AND`/`OR` word, and prefixes ` WHERE ` if anything is left.
    Where(Box<SqlNode>),

    /// `<set>`: renders the child into a fork, strips one trailing comma,
    /// and prefixes ` SET ` if anything is left.
    Set(Box<SqlNode>),

    /// `<choose>`: first `<when>` whose condition holds is applied;
    /// `<otherwise>` if none match.
    Choose {
        whens: Vec<WhenBranch>,
        otherwise: Option<Box<SqlNode>>,
    },

    /// `<foreach>`: repeats the child per collection item with per-iteration
    /// parameter renaming.
    ForEach(ForEachNode),

    /// `<trim>`: generalized prefix/suffix rewriting.
    Trim(TrimNode),
}

/// A `<when test="...">` branch of a `<choose>`.
#[derive(Debug, Clone, PartialEq)]
pub struct WhenBranch {
    pub test: String,
    pub contents: SqlNode,
}

/// `<foreach collection="..." item="..." index="..." separator open close>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForEachNode {
    pub contents: Box<SqlNode>,
    pub collection: String,
    pub item: String,
    pub index: String,
    pub separator: String,
    pub open: String,
    pub close: String,
}

/// `<trim prefix suffix prefixOverrides suffixOverrides>`. Override lists
/// are checked in declared order and only the first match is removed.
/// Overrides match on their trimmed form, whole words only, so a fragment
/// reduced to a bare connector strips down to nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimNode {
    pub contents: Box<SqlNode>,
    pub prefix: String,
    pub suffix: String,
    pub prefix_overrides: Vec<String>,
    pub suffix_overrides: Vec<String>,
}

impl SqlNode {
    /// Convenience constructor for literal text.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Apply this node against the context. Returns true if the node
    /// contributed output. Never fails: missing inputs degrade to false.
    pub fn apply(&self, ctx: &mut RenderContext) -> bool {
        match self {
            Self::Text(text) => {
                ctx.append(text);
                true
            }

            Self::Mixed(children) => {
                let mut applied = false;
                for child in children {
                    applied = child.apply(ctx) || applied;
                }
                applied
            }

            Self::If { test, contents } => {
                if evaluate(test, ctx) {
                    contents.apply(ctx)
                } else {
                    false
                }
            }

            Self::Where(contents) => {
                let mut fork = ctx.fork();
                if !contents.apply(&mut fork) {
                    return false;
                }
                let sql = strip_leading_connector(&fork.sql());
                if sql.is_empty() {
                    return false;
                }
                ctx.merge_params(fork.into_params());
                ctx.append(" WHERE ");
                ctx.append(&sql);
                true
            }

            Self::Set(contents) => {
                let mut fork = ctx.fork();
                if !contents.apply(&mut fork) {
                    return false;
                }
                let sql = strip_trailing_comma(&fork.sql());
                if sql.is_empty() {
                    return false;
                }
                ctx.merge_params(fork.into_params());
                ctx.append(" SET ");
                ctx.append(&sql);
                true
            }

            Self::Choose { whens, otherwise } => {
                for when in whens {
                    if evaluate(&when.test, ctx) {
                        return when.contents.apply(ctx);
                    }
                }
                match otherwise {
                    Some(node) => node.apply(ctx),
                    None => false,
                }
            }

            Self::ForEach(node) => node.apply(ctx),

            Self::Trim(node) => node.apply(ctx),
        }
    }
}

impl ForEachNode {
    fn apply(&self, ctx: &mut RenderContext) -> bool {
        let items = match ctx.parameter(&self.collection) {
            None | Some(Value::Null) => return false,
            Some(Value::Array(items)) => items.clone(),
            // a scalar is a one-element sequence
            Some(scalar) => vec![scalar.clone()],
        };
        if items.is_empty() {
            return false;
        }

        // Whole-word rewrite of the item placeholder, so each iteration
        // binds its own parameter instead of colliding on a shared name.
        let placeholder = Regex::new(&format!(r"@{}\b", regex::escape(&self.item))).ok();

        ctx.append(&self.open);

        let last = items.len() - 1;
        for (i, item) in items.into_iter().enumerate() {
            let mut snapshot = ctx.params().clone();
            snapshot.insert(self.item.clone(), item.clone());
            snapshot.insert(self.index.clone(), Value::from(i as u64));

            let mut iteration = RenderContext::new(snapshot);
            self.contents.apply(&mut iteration);
            let rendered = iteration.sql();

            let indexed = format!("{}_{}", self.item, i);
            let rewritten = match &placeholder {
                Some(re) => re
                    .replace_all(&rendered, format!("@{indexed}").as_str())
                    .into_owned(),
                None => rendered,
            };

            // The indexed parameter lands in the parent map, which is what
            // the caller eventually binds.
            ctx.set_parameter(indexed, item);
            ctx.append(&rewritten);

            if i < last && !self.separator.is_empty() {
                ctx.append(&self.separator);
            }
        }

        ctx.append(&self.close);
        true
    }
}

impl TrimNode {
    fn apply(&self, ctx: &mut RenderContext) -> bool {
        let mut fork = ctx.fork();
        if !self.contents.apply(&mut fork) {
            return false;
        }

        let mut sql = fork.sql();

        for prefix in &self.prefix_overrides {
            let prefix = prefix.trim();
            if prefix.is_empty() {
                continue;
            }
            if let Some(stripped) = strip_prefix_override(&sql, prefix) {
                sql = stripped.trim().to_string();
                break;
            }
        }
        for suffix in &self.suffix_overrides {
            let suffix = suffix.trim();
            if suffix.is_empty() {
                continue;
            }
            if let Some(stripped) = strip_suffix_override(&sql, suffix) {
                sql = stripped.trim().to_string();
                break;
            }
        }

        if sql.is_empty() {
            return false;
        }
        ctx.merge_params(fork.into_params());

        if !self.prefix.is_empty() {
            ctx.append(&self.prefix);
            ctx.append(" ");
        }
        ctx.append(&sql);
        if !self.suffix.is_empty() {
            ctx.append(" ");
            ctx.append(&self.suffix);
        }
        true
    }
}

/// Strip a single leading `AND` / `OR` word (case-insensitive), then trim.
/// The fragment arrives pre-trimmed, so a connector that rendered with a
/// trailing space but nothing after it still matches and strips to empty.
fn strip_leading_connector(sql: &str) -> String {
    let sql = sql.trim();
    for connector in ["AND", "OR"] {
        if let Some(stripped) = strip_prefix_override(sql, connector) {
            return stripped.trim().to_string();
        }
    }
    sql.to_string()
}

/// Strip a single trailing comma (plus surrounding whitespace).
fn strip_trailing_comma(sql: &str) -> String {
    let sql = sql.trim();
    match sql.strip_suffix(',') {
        Some(stripped) => stripped.trim_end().to_string(),
        None => sql.to_string(),
    }
}

/// Strip `pattern` from the front, case-insensitively. A pattern ending in a
/// word character only matches on a word boundary, so `AND` never bites into
/// an identifier like `ANDROID`.
fn strip_prefix_override<'a>(s: &'a str, pattern: &str) -> Option<&'a str> {
    let stripped = strip_prefix_ignore_case(s, pattern)?;
    let boundary = !pattern.ends_with(is_word_char)
        || stripped.is_empty()
        || stripped.starts_with(char::is_whitespace);
    boundary.then_some(stripped)
}

/// Suffix counterpart of `strip_prefix_override`.
fn strip_suffix_override<'a>(s: &'a str, pattern: &str) -> Option<&'a str> {
    let stripped = strip_suffix_ignore_case(s, pattern)?;
    let boundary = !pattern.starts_with(is_word_char)
        || stripped.is_empty()
        || stripped.ends_with(char::is_whitespace);
    boundary.then_some(stripped)
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let at = s.len().checked_sub(suffix.len())?;
    let tail = s.get(at..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &s[..at])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use sqlweave_core::ParamMap;

    fn ctx(pairs: &[(&str, Value)]) -> RenderContext {
        let mut params = ParamMap::new();
        for (name, value) in pairs {
            params.insert((*name).to_string(), value.clone());
        }
        RenderContext::new(params)
    }

    fn where_node(children: Vec<SqlNode>) -> SqlNode {
        SqlNode::Where(Box::new(SqlNode::Mixed(children)))
    }

    #[test]
    fn text_appends_verbatim() {
        let node = SqlNode::text("SELECT * FROM users");
        let mut context = ctx(&[]);
        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "SELECT * FROM users");

        // applying again appends the same text again
        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "SELECT * FROM usersSELECT * FROM users");
    }

    #[test]
    fn blank_text_is_inert_but_applied() {
        let node = SqlNode::text("   ");
        let mut context = ctx(&[]);
        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "");
    }

    #[test]
    fn if_applies_when_condition_holds() {
        let node = SqlNode::If {
            test: "age != null".into(),
            contents: Box::new(SqlNode::text("AND age > 18")),
        };

        let mut context = ctx(&[("age", json!(25))]);
        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "AND age > 18");

        let mut context = ctx(&[]);
        assert!(!node.apply(&mut context));
        assert_eq!(context.sql(), "");
    }

    #[test]
    fn where_strips_one_leading_connector() {
        let node = where_node(vec![
            SqlNode::text("AND user_name = @name"),
            SqlNode::text(" AND email = @email"),
        ]);
        let mut context = ctx(&[]);
        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "WHERE user_name = @name AND email = @email");
    }

    #[test]
    fn where_does_not_strip_interior_connectors() {
        let node = where_node(vec![SqlNode::text("AND a = 1 AND b = 2")]);
        let mut context = ctx(&[]);
        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "WHERE a = 1 AND b = 2");
    }

    #[test]
    fn where_strips_leading_or_case_insensitively() {
        let node = where_node(vec![SqlNode::text("or a = 1")]);
        let mut context = ctx(&[]);
        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "WHERE a = 1");
    }

    #[test]
    fn where_omitted_when_nothing_applies() {
        let node = SqlNode::Where(Box::new(SqlNode::If {
            test: "age != null".into(),
            contents: Box::new(SqlNode::text("AND age > 18")),
        }));
        let mut context = ctx(&[]);
        assert!(!node.apply(&mut context));
        assert_eq!(context.sql(), "");
    }

    #[test]
    fn where_omitted_when_fragment_is_connector_only() {
        let node = where_node(vec![SqlNode::text("AND ")]);
        let mut context = ctx(&[]);
        assert!(!node.apply(&mut context));
        assert_eq!(context.sql(), "");
    }

    #[test]
    fn where_keeps_identifiers_that_start_with_a_connector() {
        let node = where_node(vec![SqlNode::text("ANDROID_VERSION = 1")]);
        let mut context = ctx(&[]);
        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "WHERE ANDROID_VERSION = 1");
    }

    #[test]
    fn set_strips_single_trailing_comma() {
        let node = SqlNode::Set(Box::new(SqlNode::Mixed(vec![
            SqlNode::text("user_name = @name,"),
            SqlNode::text(" email = @email,"),
        ])));
        let mut context = ctx(&[]);
        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "SET user_name = @name, email = @email");
    }

    #[test]
    fn set_omitted_when_empty() {
        let node = SqlNode::Set(Box::new(SqlNode::If {
            test: "name != null".into(),
            contents: Box::new(SqlNode::text("user_name = @name,")),
        }));
        let mut context = ctx(&[]);
        assert!(!node.apply(&mut context));
        assert_eq!(context.sql(), "");
    }

    #[test]
    fn choose_applies_first_matching_when() {
        let node = SqlNode::Choose {
            whens: vec![
                WhenBranch {
                    test: "type == 'admin'".into(),
                    contents: SqlNode::text("role = 'Admin'"),
                },
                WhenBranch {
                    test: "type == 'user'".into(),
                    contents: SqlNode::text("role = 'User'"),
                },
            ],
            otherwise: Some(Box::new(SqlNode::text("role = 'Guest'"))),
        };

        let mut context = ctx(&[("type", json!("user"))]);
        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "role = 'User'");
    }

    #[test]
    fn choose_short_circuits_on_first_true_condition() {
        // second and third conditions are both true; only the second branch
        // may contribute
        let node = SqlNode::Choose {
            whens: vec![
                WhenBranch {
                    test: "a".into(),
                    contents: SqlNode::text("first"),
                },
                WhenBranch {
                    test: "b".into(),
                    contents: SqlNode::text("second"),
                },
                WhenBranch {
                    test: "c".into(),
                    contents: SqlNode::text("third"),
                },
            ],
            otherwise: None,
        };
        let mut context = ctx(&[("b", json!(true)), ("c", json!(true))]);
        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "second");
    }

    #[test]
    fn choose_falls_back_to_otherwise() {
        let node = SqlNode::Choose {
            whens: vec![WhenBranch {
                test: "type == 'admin'".into(),
                contents: SqlNode::text("role = 'Admin'"),
            }],
            otherwise: Some(Box::new(SqlNode::text("role = 'Guest'"))),
        };
        let mut context = ctx(&[("type", json!("unknown"))]);
        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "role = 'Guest'");
    }

    #[test]
    fn choose_without_otherwise_is_not_applied() {
        let node = SqlNode::Choose {
            whens: vec![WhenBranch {
                test: "type == 'admin'".into(),
                contents: SqlNode::text("role = 'Admin'"),
            }],
            otherwise: None,
        };
        let mut context = ctx(&[]);
        assert!(!node.apply(&mut context));
        assert_eq!(context.sql(), "");
    }

    fn ids_foreach() -> SqlNode {
        SqlNode::ForEach(ForEachNode {
            contents: Box::new(SqlNode::text("@id")),
            collection: "ids".into(),
            item: "id".into(),
            index: "index".into(),
            separator: ",".into(),
            open: "(".into(),
            close: ")".into(),
        })
    }

    #[test]
    fn foreach_renders_items_and_registers_indexed_params() {
        let node = ids_foreach();
        let mut context = ctx(&[("ids", json!([1, 2, 3]))]);

        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "(@id_0,@id_1,@id_2)");

        let params = context.into_params();
        assert_eq!(params.get("id_0"), Some(&json!(1)));
        assert_eq!(params.get("id_1"), Some(&json!(2)));
        assert_eq!(params.get("id_2"), Some(&json!(3)));
        // the shared placeholder name itself is never registered
        assert_eq!(params.get("id"), None);
    }

    #[test]
    fn foreach_empty_collection_is_not_applied() {
        let node = ids_foreach();
        let mut context = ctx(&[("ids", json!([]))]);
        assert!(!node.apply(&mut context));
        assert_eq!(context.sql(), "");
    }

    #[test]
    fn foreach_missing_or_null_collection_is_not_applied() {
        let node = ids_foreach();

        let mut context = ctx(&[]);
        assert!(!node.apply(&mut context));

        let mut context = ctx(&[("ids", Value::Null)]);
        assert!(!node.apply(&mut context));
    }

    #[test]
    fn foreach_scalar_is_a_one_element_sequence() {
        let node = ids_foreach();
        let mut context = ctx(&[("ids", json!(42))]);
        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "(@id_0)");
        assert_eq!(context.into_params().get("id_0"), Some(&json!(42)));
    }

    #[test]
    fn foreach_rewrites_whole_words_only() {
        let node = SqlNode::ForEach(ForEachNode {
            contents: Box::new(SqlNode::text("@id = @identity")),
            collection: "ids".into(),
            item: "id".into(),
            index: "index".into(),
            separator: ", ".into(),
            open: "".into(),
            close: "".into(),
        });
        let mut context = ctx(&[("ids", json!([1]))]);
        assert!(node.apply(&mut context));
        // @identity must not be rewritten to @id_0entity
        assert_eq!(context.sql(), "@id_0 = @identity");
    }

    #[test]
    fn foreach_strings_with_choose_inside_where() {
        let foreach = SqlNode::ForEach(ForEachNode {
            contents: Box::new(SqlNode::text("@role")),
            collection: "roles".into(),
            item: "role".into(),
            index: "index".into(),
            separator: ",".into(),
            open: "AND role IN (".into(),
            close: ")".into(),
        });
        let node = SqlNode::Where(Box::new(foreach));
        let mut context = ctx(&[("roles", json!(["Admin", "Manager"]))]);

        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "WHERE role IN (@role_0,@role_1)");
        let params = context.into_params();
        assert_eq!(params.get("role_0"), Some(&json!("Admin")));
        assert_eq!(params.get("role_1"), Some(&json!("Manager")));
    }

    #[test]
    fn trim_strips_first_matching_prefix_override() {
        let node = SqlNode::Trim(TrimNode {
            contents: Box::new(SqlNode::text("AND x = 1")),
            prefix: "WHERE".into(),
            suffix: String::new(),
            prefix_overrides: vec!["AND ".into(), "OR ".into()],
            suffix_overrides: vec![],
        });
        let mut context = ctx(&[]);
        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "WHERE x = 1");
    }

    #[test]
    fn trim_strips_suffix_override_and_appends_suffix() {
        let node = SqlNode::Trim(TrimNode {
            contents: Box::new(SqlNode::text("user_name = @name,")),
            prefix: "SET".into(),
            suffix: String::new(),
            prefix_overrides: vec![],
            suffix_overrides: vec![",".into()],
        });
        let mut context = ctx(&[]);
        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "SET user_name = @name");
    }

    #[test]
    fn trim_with_blank_remainder_is_not_applied() {
        let node = SqlNode::Trim(TrimNode {
            contents: Box::new(SqlNode::text("AND ")),
            prefix: "WHERE".into(),
            suffix: String::new(),
            prefix_overrides: vec!["AND ".into()],
            suffix_overrides: vec![],
        });
        let mut context = ctx(&[]);
        assert!(!node.apply(&mut context));
        assert_eq!(context.sql(), "");
    }

    #[test]
    fn trim_override_matches_whole_words_only() {
        let node = SqlNode::Trim(TrimNode {
            contents: Box::new(SqlNode::text("ANDROID = 1")),
            prefix: "WHERE".into(),
            suffix: String::new(),
            prefix_overrides: vec!["AND ".into()],
            suffix_overrides: vec![],
        });
        let mut context = ctx(&[]);
        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "WHERE ANDROID = 1");
    }

    #[test]
    fn trim_without_prefix_or_suffix_emits_bare_fragment() {
        let node = SqlNode::Trim(TrimNode {
            contents: Box::new(SqlNode::text("OR x = 1")),
            prefix: String::new(),
            suffix: String::new(),
            prefix_overrides: vec!["AND ".into(), "OR ".into()],
            suffix_overrides: vec![],
        });
        let mut context = ctx(&[]);
        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "x = 1");
    }

    #[test]
    fn mixed_reports_applied_if_any_child_did() {
        let node = SqlNode::Mixed(vec![
            SqlNode::If {
                test: "missing".into(),
                contents: Box::new(SqlNode::text("never")),
            },
            SqlNode::text("SELECT 1"),
        ]);
        let mut context = ctx(&[]);
        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "SELECT 1");
    }

    #[test]
    fn mixed_of_failed_ifs_is_not_applied() {
        let node = SqlNode::Mixed(vec![
            SqlNode::If {
                test: "a".into(),
                contents: Box::new(SqlNode::text("one")),
            },
            SqlNode::If {
                test: "b".into(),
                contents: Box::new(SqlNode::text("two")),
            },
        ]);
        let mut context = ctx(&[]);
        assert!(!node.apply(&mut context));
    }

    #[test]
    fn where_merges_foreach_params_on_commit() {
        let foreach = SqlNode::ForEach(ForEachNode {
            contents: Box::new(SqlNode::text("@id")),
            collection: "ids".into(),
            item: "id".into(),
            index: "index".into(),
            separator: ",".into(),
            open: "AND id IN (".into(),
            close: ")".into(),
        });
        let node = SqlNode::Where(Box::new(foreach));
        let mut context = ctx(&[("ids", json!([7, 8]))]);

        assert!(node.apply(&mut context));
        assert_eq!(context.sql(), "WHERE id IN (@id_0,@id_1)");

        // registrations made inside the fork reach the root map
        let params = context.into_params();
        assert_eq!(params.get("id_0"), Some(&json!(7)));
        assert_eq!(params.get("id_1"), Some(&json!(8)));
    }

    #[test]
    fn dropped_fork_does_not_leak_params() {
        // foreach applies inside the where fork, but the fragment trims down
        // to nothing, so the fork is discarded wholesale
        let foreach = SqlNode::ForEach(ForEachNode {
            contents: Box::new(SqlNode::text(" ")),
            collection: "ids".into(),
            item: "id".into(),
            index: "index".into(),
            separator: "".into(),
            open: "".into(),
            close: "".into(),
        });
        let node = SqlNode::Where(Box::new(foreach));
        let mut context = ctx(&[("ids", json!([7]))]);

        assert!(!node.apply(&mut context));
        assert_eq!(context.sql(), "");
        assert_eq!(context.into_params().get("id_0"), None);
    }
}
