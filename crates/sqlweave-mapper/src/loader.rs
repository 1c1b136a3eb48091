//! Mapper XML loading
//!
//! Parses `<mapper namespace="...">` documents into `MappedStatement`s.
//! Statement bodies mix literal SQL text with the dynamic elements
//! (`<if>`, `<where>`, `<set>`, `<choose>`, `<foreach>`, `<trim>`), which
//! compile into the node tree. A body containing only text becomes a static
//! statement.
//!
//! This is the one place that fails loudly: malformed XML, a missing
//! required attribute or a misplaced element abort the load. Once a
//! statement is built, rendering it never errors.

use crate::statement::MappedStatement;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use sqlweave_core::CommandType;
use sqlweave_dynamic::{ForEachNode, SqlNode, TrimNode, WhenBranch};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading a mapper document.
#[derive(Debug, Error)]
pub enum MapperError {
    #[error("failed to read mapper file: {0}")]
    Io(#[from] std::io::Error),

    #[error("mapper XML parse error: {0}")]
    Parse(String),

    #[error("<{element}> is missing required attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: String },

    #[error("unexpected <{0}> element in mapper document")]
    UnexpectedElement(String),

    #[error("<choose> may only contain <when> and <otherwise> elements")]
    InvalidChooseContent,
}

/// Load every statement from a mapper XML file.
pub fn load_mapper_file(path: &Path) -> Result<Vec<MappedStatement>, MapperError> {
    let xml = std::fs::read_to_string(path)?;
    let statements = load_mapper_str(&xml)?;
    debug!(path = %path.display(), count = statements.len(), "loaded mapper file");
    Ok(statements)
}

/// Load every statement from a mapper XML string.
pub fn load_mapper_str(xml: &str) -> Result<Vec<MappedStatement>, MapperError> {
    let mut reader = Reader::from_str(xml);
    let mut namespace = String::new();
    let mut statements = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut current: Option<StatementFrame> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| MapperError::Parse(e.to_string()))?;
        match event {
            Event::Start(e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if tag == "mapper" {
                    namespace = attr_value(&e, "namespace")?.unwrap_or_default();
                } else if let Some(command) = CommandType::from_tag(&tag) {
                    if current.is_some() {
                        return Err(MapperError::UnexpectedElement(tag));
                    }
                    let id = require_attr(&e, &tag, "id")?;
                    let id = if namespace.is_empty() {
                        id
                    } else {
                        format!("{namespace}.{id}")
                    };
                    current = Some(StatementFrame {
                        id,
                        command,
                        children: Vec::new(),
                    });
                } else if current.is_some() {
                    stack.push(open_frame(&tag, &e)?);
                } else {
                    return Err(MapperError::UnexpectedElement(tag));
                }
            }

            Event::Empty(e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if current.is_none() {
                    return Err(MapperError::UnexpectedElement(tag));
                }
                let child = close_frame(open_frame(&tag, &e)?)?;
                push_child(&mut stack, &mut current, child);
            }

            Event::End(e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if tag == "mapper" {
                    continue;
                }
                if CommandType::from_tag(&tag).is_some() {
                    let frame = current
                        .take()
                        .ok_or_else(|| MapperError::Parse(format!("unexpected </{tag}>")))?;
                    statements.push(build_statement(frame)?);
                } else if let Some(frame) = stack.pop() {
                    let child = close_frame(frame)?;
                    push_child(&mut stack, &mut current, child);
                } else {
                    return Err(MapperError::Parse(format!("unexpected </{tag}>")));
                }
            }

            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|err| MapperError::Parse(err.to_string()))?
                    .into_owned();
                push_text(&mut stack, &mut current, text);
            }

            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                push_text(&mut stack, &mut current, text);
            }

            Event::Eof => {
                if current.is_some() || !stack.is_empty() {
                    return Err(MapperError::Parse(
                        "unexpected end of mapper document".to_string(),
                    ));
                }
                break;
            }

            // declarations, comments, processing instructions
            _ => {}
        }
    }

    Ok(statements)
}

/// An open `<select>`/`<insert>`/`<update>`/`<delete>` element.
struct StatementFrame {
    id: String,
    command: CommandType,
    children: Vec<Child>,
}

/// An open dynamic element inside a statement body.
struct Frame {
    kind: FrameKind,
    children: Vec<Child>,
}

enum FrameKind {
    If {
        test: String,
    },
    Where,
    Set,
    Choose,
    When {
        test: String,
    },
    Otherwise,
    ForEach {
        collection: String,
        item: String,
        index: String,
        separator: String,
        open: String,
        close: String,
    },
    Trim {
        prefix: String,
        suffix: String,
        prefix_overrides: Vec<String>,
        suffix_overrides: Vec<String>,
    },
}

/// A parsed piece of a statement body. `<when>`/`<otherwise>` are only
/// meaningful to an enclosing `<choose>`.
enum Child {
    Node(SqlNode),
    When(WhenBranch),
    Otherwise(SqlNode),
}

fn open_frame(tag: &str, e: &BytesStart<'_>) -> Result<Frame, MapperError> {
    let kind = match tag {
        "if" => FrameKind::If {
            test: require_attr(e, tag, "test")?,
        },
        "where" => FrameKind::Where,
        "set" => FrameKind::Set,
        "choose" => FrameKind::Choose,
        "when" => FrameKind::When {
            test: require_attr(e, tag, "test")?,
        },
        "otherwise" => FrameKind::Otherwise,
        "foreach" => FrameKind::ForEach {
            collection: require_attr(e, tag, "collection")?,
            item: attr_value(e, "item")?.unwrap_or_else(|| "item".to_string()),
            index: attr_value(e, "index")?.unwrap_or_else(|| "index".to_string()),
            separator: attr_value(e, "separator")?.unwrap_or_default(),
            open: attr_value(e, "open")?.unwrap_or_default(),
            close: attr_value(e, "close")?.unwrap_or_default(),
        },
        "trim" => FrameKind::Trim {
            prefix: attr_value(e, "prefix")?.unwrap_or_default(),
            suffix: attr_value(e, "suffix")?.unwrap_or_default(),
            prefix_overrides: parse_overrides(attr_value(e, "prefixOverrides")?),
            suffix_overrides: parse_overrides(attr_value(e, "suffixOverrides")?),
        },
        _ => return Err(MapperError::UnexpectedElement(tag.to_string())),
    };
    Ok(Frame {
        kind,
        children: Vec::new(),
    })
}

fn close_frame(frame: Frame) -> Result<Child, MapperError> {
    let child = match frame.kind {
        FrameKind::If { test } => Child::Node(SqlNode::If {
            test,
            contents: Box::new(mixed(frame.children)?),
        }),
        FrameKind::Where => Child::Node(SqlNode::Where(Box::new(mixed(frame.children)?))),
        FrameKind::Set => Child::Node(SqlNode::Set(Box::new(mixed(frame.children)?))),
        FrameKind::When { test } => Child::When(WhenBranch {
            test,
            contents: mixed(frame.children)?,
        }),
        FrameKind::Otherwise => Child::Otherwise(mixed(frame.children)?),
        FrameKind::Choose => {
            let mut whens = Vec::new();
            let mut otherwise = None;
            for child in frame.children {
                match child {
                    Child::When(branch) => whens.push(branch),
                    Child::Otherwise(node) => otherwise = Some(Box::new(node)),
                    // indentation between branches is fine, anything else is not
                    Child::Node(SqlNode::Text(t)) if t.trim().is_empty() => {}
                    Child::Node(_) => return Err(MapperError::InvalidChooseContent),
                }
            }
            Child::Node(SqlNode::Choose { whens, otherwise })
        }
        FrameKind::ForEach {
            collection,
            item,
            index,
            separator,
            open,
            close,
        } => Child::Node(SqlNode::ForEach(ForEachNode {
            contents: Box::new(mixed(frame.children)?),
            collection,
            item,
            index,
            separator,
            open,
            close,
        })),
        FrameKind::Trim {
            prefix,
            suffix,
            prefix_overrides,
            suffix_overrides,
        } => Child::Node(SqlNode::Trim(TrimNode {
            contents: Box::new(mixed(frame.children)?),
            prefix,
            suffix,
            prefix_overrides,
            suffix_overrides,
        })),
    };
    Ok(child)
}

/// Collapse body children into a single node, rejecting stray
/// `<when>`/`<otherwise>`.
fn mixed(children: Vec<Child>) -> Result<SqlNode, MapperError> {
    let mut nodes = Vec::with_capacity(children.len());
    for child in children {
        match child {
            Child::Node(node) => nodes.push(node),
            Child::When(_) => return Err(MapperError::UnexpectedElement("when".to_string())),
            Child::Otherwise(_) => {
                return Err(MapperError::UnexpectedElement("otherwise".to_string()))
            }
        }
    }
    match nodes.len() {
        1 => Ok(nodes.into_iter().next().unwrap_or(SqlNode::Text(String::new()))),
        _ => Ok(SqlNode::Mixed(nodes)),
    }
}

fn build_statement(frame: StatementFrame) -> Result<MappedStatement, MapperError> {
    let mut nodes = Vec::with_capacity(frame.children.len());
    let mut dynamic = false;
    for child in frame.children {
        match child {
            Child::Node(node) => {
                if !matches!(node, SqlNode::Text(_)) {
                    dynamic = true;
                }
                nodes.push(node);
            }
            Child::When(_) => return Err(MapperError::UnexpectedElement("when".to_string())),
            Child::Otherwise(_) => {
                return Err(MapperError::UnexpectedElement("otherwise".to_string()))
            }
        }
    }

    let statement = if dynamic {
        MappedStatement::new_dynamic(frame.id, frame.command, SqlNode::Mixed(nodes))
    } else {
        let sql: String = nodes
            .iter()
            .filter_map(|node| match node {
                SqlNode::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        MappedStatement::new_static(frame.id, frame.command, sql.trim())
    };
    Ok(statement)
}

fn push_child(stack: &mut [Frame], current: &mut Option<StatementFrame>, child: Child) {
    if let Some(top) = stack.last_mut() {
        top.children.push(child);
    } else if let Some(statement) = current.as_mut() {
        statement.children.push(child);
    }
}

fn push_text(stack: &mut [Frame], current: &mut Option<StatementFrame>, text: String) {
    // text outside any statement (indentation between statements) is noise
    if stack.is_empty() && current.is_none() {
        return;
    }
    push_child(stack, current, Child::Node(SqlNode::Text(text)));
}

/// Pipe-separated override list, e.g. `AND |OR `. Segments are trimmed and
/// blank segments dropped; matching against fragments is word-based, so the
/// spacing authors write in the attribute does not matter.
fn parse_overrides(value: Option<String>) -> Vec<String> {
    match value {
        None => Vec::new(),
        Some(raw) => raw
            .split('|')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

fn attr_value(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, MapperError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| MapperError::Parse(err.to_string()))?;
        if attr.key.as_ref() == name.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|err| MapperError::Parse(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn require_attr(e: &BytesStart<'_>, element: &str, name: &str) -> Result<String, MapperError> {
    attr_value(e, name)?.ok_or_else(|| MapperError::MissingAttribute {
        element: element.to_string(),
        attribute: name.to_string(),
    })
}
