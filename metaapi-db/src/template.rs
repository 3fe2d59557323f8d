//! Moustache-style query templates
//!
//! A template is compiled once and rendered against a JSON object context,
//! either as plain text or as a parameterized [`Statement`] in which every
//! value tag becomes a `?` bind placeholder.
//!
//! Supported tags:
//! - `{{name}}`, `{{a.b}}`, `{{.}}` - value (bound as a parameter in statements)
//! - `{{{name}}}`, `{{& name}}` - verbatim identifier, allow-listed characters only
//! - `{{#name}}...{{/name}}` - section (skipped when falsy, repeated for arrays)
//! - `{{^name}}...{{/name}}` - inverted section
//! - `{{! comment }}`
//!
//! Missing fields render as empty text and bind as SQL `NULL`.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Named substitution values for a template
pub type Context = Map<String, Value>;

/// Template compile and render errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unclosed tag at byte {offset}")]
    UnclosedTag { offset: usize },

    #[error("empty tag at byte {offset}")]
    EmptyTag { offset: usize },

    #[error("section '{name}' is never closed")]
    UnclosedSection { name: String },

    #[error("closing tag '{found}' does not match open section '{expected}'")]
    MismatchedSection { expected: String, found: String },

    #[error("closing tag '{found}' has no open section")]
    UnexpectedClose { found: String },

    #[error("value for '{name}' is not a safe identifier: '{value}'")]
    UnsafeIdentifier { name: String, value: String },

    #[error("template context must be a JSON object")]
    NotAnObject,
}

/// A rendered, parameterized query ready for execution
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Symbolic name or literal template the statement came from
    pub signature: String,
    pub sql: String,
    pub binds: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Value(String),
    Identifier(String),
    Section {
        name: String,
        inverted: bool,
        children: Vec<Node>,
    },
}

/// Compiled template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    nodes: Vec<Node>,
}

impl Template {
    /// Parse a template source string
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        // Open sections: (name, inverted, siblings collected before the section)
        let mut open: Vec<(String, bool, Vec<Node>)> = Vec::new();
        let mut current: Vec<Node> = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                current.push(Node::Text(rest[..start].to_string()));
            }
            let tag_offset = offset + start;
            let tag = &rest[start..];

            let (triple, inner, consumed) = if let Some(body) = tag.strip_prefix("{{{") {
                let end = body
                    .find("}}}")
                    .ok_or(TemplateError::UnclosedTag { offset: tag_offset })?;
                (true, &body[..end], end + 6)
            } else {
                let body = &tag[2..];
                let end = body
                    .find("}}")
                    .ok_or(TemplateError::UnclosedTag { offset: tag_offset })?;
                (false, &body[..end], end + 4)
            };

            let inner = inner.trim();
            if inner.is_empty() {
                return Err(TemplateError::EmptyTag { offset: tag_offset });
            }

            if triple {
                current.push(Node::Identifier(inner.to_string()));
            } else if inner.starts_with('!') {
                // comment
            } else if let Some(name) = inner.strip_prefix('&') {
                current.push(Node::Identifier(tag_name(name, tag_offset)?));
            } else if let Some(name) = inner.strip_prefix('#') {
                let name = tag_name(name, tag_offset)?;
                open.push((name, false, std::mem::take(&mut current)));
            } else if let Some(name) = inner.strip_prefix('^') {
                let name = tag_name(name, tag_offset)?;
                open.push((name, true, std::mem::take(&mut current)));
            } else if let Some(name) = inner.strip_prefix('/') {
                let found = name.trim();
                let (expected, inverted, parent) =
                    open.pop().ok_or_else(|| TemplateError::UnexpectedClose {
                        found: found.to_string(),
                    })?;
                if expected != found {
                    return Err(TemplateError::MismatchedSection {
                        expected,
                        found: found.to_string(),
                    });
                }
                let children = std::mem::replace(&mut current, parent);
                current.push(Node::Section {
                    name: expected,
                    inverted,
                    children,
                });
            } else {
                current.push(Node::Value(inner.to_string()));
            }

            offset = tag_offset + consumed;
            rest = &tag[consumed..];
        }

        if !rest.is_empty() {
            current.push(Node::Text(rest.to_string()));
        }
        if let Some((name, _, _)) = open.pop() {
            return Err(TemplateError::UnclosedSection { name });
        }

        Ok(Self {
            source: source.to_string(),
            nodes: current,
        })
    }

    /// Original template text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct field names referenced by the template, in first-use order
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        collect_names(&self.nodes, &mut names);
        names
    }

    /// Render with every value substituted as text
    pub fn render_text(&self, ctx: &Context) -> Result<String, TemplateError> {
        let mut out = Output::text();
        self.render_into(ctx, &mut out)?;
        Ok(out.sql)
    }

    /// Render with value tags replaced by `?` and their values collected as binds
    pub fn render_statement(
        &self,
        signature: &str,
        ctx: &Context,
    ) -> Result<Statement, TemplateError> {
        let mut out = Output::statement();
        self.render_into(ctx, &mut out)?;
        Ok(Statement {
            signature: signature.to_string(),
            sql: out.sql,
            binds: out.binds.unwrap_or_default(),
        })
    }

    fn render_into(&self, ctx: &Context, out: &mut Output) -> Result<(), TemplateError> {
        let root = Value::Object(ctx.clone());
        let mut stack = vec![&root];
        render_nodes(&self.nodes, &mut stack, out)
    }
}

/// Build a context from any serializable struct or map
pub fn context_from<T: Serialize>(value: &T) -> Result<Context, TemplateError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(TemplateError::NotAnObject),
    }
}

fn tag_name(raw: &str, offset: usize) -> Result<String, TemplateError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(TemplateError::EmptyTag { offset });
    }
    Ok(name.to_string())
}

fn collect_names<'a>(nodes: &'a [Node], names: &mut Vec<&'a str>) {
    for node in nodes {
        let name = match node {
            Node::Text(_) => continue,
            Node::Value(name) | Node::Identifier(name) => name,
            Node::Section { name, children, .. } => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
                collect_names(children, names);
                continue;
            }
        };
        if name != "." && !names.contains(&name.as_str()) {
            names.push(name);
        }
    }
}

struct Output {
    sql: String,
    /// `None` in text mode
    binds: Option<Vec<Value>>,
}

impl Output {
    fn text() -> Self {
        Self {
            sql: String::new(),
            binds: None,
        }
    }

    fn statement() -> Self {
        Self {
            sql: String::new(),
            binds: Some(Vec::new()),
        }
    }
}

fn render_nodes<'v>(
    nodes: &[Node],
    stack: &mut Vec<&'v Value>,
    out: &mut Output,
) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.sql.push_str(text),
            Node::Value(name) => {
                let value = lookup(stack, name);
                match out.binds.as_mut() {
                    Some(binds) => {
                        out.sql.push('?');
                        binds.push(value.cloned().unwrap_or(Value::Null));
                    }
                    None => out.sql.push_str(&value.map(text_of).unwrap_or_default()),
                }
            }
            Node::Identifier(name) => {
                if let Some(value) = lookup(stack, name) {
                    let text = text_of(value);
                    if !is_safe_identifier(&text) {
                        return Err(TemplateError::UnsafeIdentifier {
                            name: name.clone(),
                            value: text,
                        });
                    }
                    out.sql.push_str(&text);
                }
            }
            Node::Section {
                name,
                inverted,
                children,
            } => {
                let value = lookup(stack, name);
                let truthy = value.is_some_and(is_truthy);
                if *inverted {
                    if !truthy {
                        render_nodes(children, stack, out)?;
                    }
                    continue;
                }
                match value {
                    Some(Value::Array(items)) if truthy => {
                        for item in items {
                            stack.push(item);
                            render_nodes(children, stack, out)?;
                            stack.pop();
                        }
                    }
                    Some(object @ Value::Object(_)) => {
                        stack.push(object);
                        render_nodes(children, stack, out)?;
                        stack.pop();
                    }
                    Some(_) if truthy => render_nodes(children, stack, out)?,
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

fn lookup<'v>(stack: &[&'v Value], name: &str) -> Option<&'v Value> {
    if name == "." {
        return stack.last().copied();
    }
    let mut parts = name.split('.');
    let first = parts.next()?;
    let mut value = stack.iter().rev().find_map(|&frame| frame.get(first))?;
    for part in parts {
        value = value.get(part)?;
    }
    Some(value)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_safe_identifier(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.'))
}
