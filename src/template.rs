//! Server-side HTML templating for the site's pages.
//!
//! Templates are plain files in the configured template directory. A page
//! template may open with `{% extends "base.html" %}` and override the named
//! `{% block %}` sections of its base; `{{ value }}` interpolations,
//! `{% if %}`/`{% for %}` control tags and the `{% tailwind %}` CDN shortcut
//! make up the rest of the language. Rendering goes source text -> `Token`
//! stream -> `Node` tree -> HTML string.
//!
//! Interpolated values are HTML-escaped. Literal template text is trusted
//! and emitted untouched. Engine-internal logging is off unless enabled
//! through `set_display_logs`.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::router::Response;

static DISPLAY_LOGS: AtomicBool = AtomicBool::new(false);

/// Turns the engine's own debug logging on or off at runtime.
pub fn set_display_logs(enabled: bool) {
    DISPLAY_LOGS.store(enabled, Ordering::Relaxed);
}

// Logs through `debug!` only while DISPLAY_LOGS is set.
macro_rules! tdebug {
    ($($arg:tt)+) => {
        if DISPLAY_LOGS.load(Ordering::Relaxed) {
            debug!($($arg)+);
        }
    }
}

/// A value a template can interpolate or branch on.
#[derive(Clone)]
pub enum TemplateValue {
    String(String),
    Bool(bool),
    Number(f64),
    List(Vec<TemplateValue>),
    Object(HashMap<String, TemplateValue>),
}

impl TemplateValue {
    /// The text form used when the value is interpolated into a page.
    /// Lists and objects have no direct text form.
    pub fn as_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TemplateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateValue::String(s) => f.write_str(s),
            TemplateValue::Bool(b) => write!(f, "{}", b),
            TemplateValue::Number(n) => write!(f, "{}", n),
            TemplateValue::List(_) | TemplateValue::Object(_) => Ok(()),
        }
    }
}

/// One lexed piece of template source.
#[derive(Debug, Clone)]
pub enum Token {
    Text(String),     // literal markup between tags
    Variable(String), // interpolation, `{{ name }}`
    Tag(String),      // control tag, `{% ... %}`
}

/// One element of the parsed template tree.
#[derive(Debug, Clone)]
pub enum Node {
    Text(String),
    Variable(String),
    If {
        condition: String,
        then_body: Vec<Node>,
        else_body: Vec<Node>,
    },
    For {
        var_name: String,
        list_name: String,
        body: Vec<Node>,
    },
    Block {
        name: String,
        body: Vec<Node>,
    },
    Extends(String), // names the base template file
    Tailwind,        // expands to the Tailwind CDN script tag
}

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(\{\{.*?\}\}|\{%.*?%\})").unwrap());

/// Splits template source into literal text, `{{ }}` and `{% %}` tokens.
pub fn tokenize_template(content: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut cursor = 0;
    for found in TOKEN_RE.find_iter(content) {
        if found.start() > cursor {
            tokens.push(Token::Text(content[cursor..found.start()].to_string()));
        }
        let raw = found.as_str();
        if let Some(inner) = raw.strip_prefix("{{") {
            let name = inner.trim_end_matches("}}").trim().to_string();
            tdebug!("tokenize: variable `{}`", name);
            tokens.push(Token::Variable(name));
        } else {
            let tag = raw
                .trim_start_matches("{%")
                .trim_end_matches("%}")
                .trim()
                .to_string();
            tdebug!("tokenize: tag `{}`", tag);
            tokens.push(Token::Tag(tag));
        }
        cursor = found.end();
    }
    if cursor < content.len() {
        tokens.push(Token::Text(content[cursor..].to_string()));
    }
    tokens
}

/// Parses a full token stream into the template's node tree.
pub fn parse_tokens(tokens: &[Token]) -> Vec<Node> {
    parse_until(tokens, &mut 0, &[])
}

// Consumes tokens from `pos` until the stream ends or one of `stop_tags`
// appears; the stop tag itself is left for the caller to skip.
fn parse_until(tokens: &[Token], pos: &mut usize, stop_tags: &[&str]) -> Vec<Node> {
    let mut nodes = Vec::new();
    while let Some(token) = tokens.get(*pos) {
        match token {
            Token::Text(text) => {
                nodes.push(Node::Text(text.clone()));
                *pos += 1;
            }
            Token::Variable(name) => {
                nodes.push(Node::Variable(name.clone()));
                *pos += 1;
            }
            Token::Tag(tag) => {
                let tag = tag.trim();
                if stop_tags.contains(&tag) {
                    break;
                }
                *pos += 1;
                if let Some(node) = parse_tag(tag, tokens, pos) {
                    nodes.push(node);
                }
            }
        }
    }
    nodes
}

// Builds the node for one opening tag; `pos` already sits past it. Container
// tags consume their body up to and including the closing tag. A tag the
// engine does not know produces no node at all.
fn parse_tag(tag: &str, tokens: &[Token], pos: &mut usize) -> Option<Node> {
    if let Some(base) = tag.strip_prefix("extends ") {
        return Some(Node::Extends(base.trim_matches('"').to_string()));
    }

    if let Some(name) = tag.strip_prefix("block ") {
        let body = parse_until(tokens, pos, &["endblock"]);
        *pos += 1; // skip endblock
        return Some(Node::Block {
            name: name.to_string(),
            body,
        });
    }

    if let Some(condition) = tag.strip_prefix("if ") {
        let then_body = parse_until(tokens, pos, &["else", "endif"]);
        let mut else_body = Vec::new();
        if let Some(Token::Tag(next)) = tokens.get(*pos) {
            if next.trim() == "else" {
                *pos += 1;
                else_body = parse_until(tokens, pos, &["endif"]);
            }
        }
        *pos += 1; // skip endif
        return Some(Node::If {
            condition: condition.to_string(),
            then_body,
            else_body,
        });
    }

    if let Some(spec) = tag.strip_prefix("for ") {
        let parts: Vec<&str> = spec.split_whitespace().collect();
        if let [var_name, "in", list_name] = parts.as_slice() {
            let body = parse_until(tokens, pos, &["endfor"]);
            *pos += 1; // skip endfor
            return Some(Node::For {
                var_name: var_name.to_string(),
                list_name: list_name.to_string(),
                body,
            });
        }
        return None;
    }

    if tag == "tailwind" {
        return Some(Node::Tailwind);
    }

    None
}

// Walks a dotted path like `cafe.name` down through Object values.
fn lookup_path<'a>(
    path: &str,
    context: &'a HashMap<String, TemplateValue>,
) -> Option<&'a TemplateValue> {
    let mut parts = path.split('.');
    let mut value = context.get(parts.next()?)?;
    for key in parts {
        match value {
            TemplateValue::Object(fields) => value = fields.get(key)?,
            _ => return None,
        }
    }
    Some(value)
}

// Escapes a value for interpolation into HTML attribute or element context.
fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// Rebuilds a node tree with every block a child template overrides swapped
// for the child's version. Blocks the child leaves alone keep their own
// body, merged recursively so nested blocks are still reachable.
fn merge_child_blocks(
    nodes: &[Node],
    child_blocks: &HashMap<String, Vec<Node>>,
) -> Vec<Node> {
    let mut merged = Vec::with_capacity(nodes.len());
    for node in nodes {
        let replacement = match node {
            Node::Block { name, body } => Node::Block {
                name: name.clone(),
                body: match child_blocks.get(name) {
                    Some(override_body) => override_body.clone(),
                    None => merge_child_blocks(body, child_blocks),
                },
            },
            Node::If {
                condition,
                then_body,
                else_body,
            } => Node::If {
                condition: condition.clone(),
                then_body: merge_child_blocks(then_body, child_blocks),
                else_body: merge_child_blocks(else_body, child_blocks),
            },
            Node::For {
                var_name,
                list_name,
                body,
            } => Node::For {
                var_name: var_name.clone(),
                list_name: list_name.clone(),
                body: merge_child_blocks(body, child_blocks),
            },
            other => other.clone(),
        };
        merged.push(replacement);
    }
    merged
}

/// Renders a node tree against a context, producing the final HTML.
pub fn render_nodes(nodes: &[Node], context: &HashMap<String, TemplateValue>) -> String {
    let mut html = String::new();
    for node in nodes {
        render_node(node, context, &mut html);
    }
    html
}

fn render_node(node: &Node, context: &HashMap<String, TemplateValue>, html: &mut String) {
    match node {
        Node::Text(text) => html.push_str(text),
        Node::Variable(name) => {
            if let Some(value) = lookup_path(name, context) {
                html.push_str(&escape_html(&value.as_string()));
            }
        }
        Node::If {
            condition,
            then_body,
            else_body,
        } => {
            // Only an actual Bool(true) takes the then-branch.
            let taken = matches!(
                lookup_path(condition, context),
                Some(TemplateValue::Bool(true))
            );
            let body = if taken { then_body } else { else_body };
            html.push_str(&render_nodes(body, context));
        }
        Node::For {
            var_name,
            list_name,
            body,
        } => {
            // A missing or non-list value renders as nothing.
            let Some(TemplateValue::List(items)) = lookup_path(list_name, context) else {
                return;
            };
            let mut scope = context.clone();
            for item in items {
                scope.insert(var_name.clone(), item.clone());
                html.push_str(&render_nodes(body, &scope));
            }
        }
        Node::Block { body, .. } => html.push_str(&render_nodes(body, context)),
        Node::Extends(_) => {}
        Node::Tailwind => {
            tdebug!("tailwind tag: emitting the CDN script");
            html.push_str(r#"<script src="https://cdn.tailwindcss.com"></script>"#);
        }
    }
}

// Reads a template file from the directory, mapping a missing or unreadable
// file to the 500 response the caller hands straight back.
fn load_source(dir: &str, name: &str) -> Result<String, Response> {
    std::fs::read_to_string(format!("{}/{}", dir, name))
        .map_err(|_| Response::server_error(format!("Template '{}' not found", name)))
}

/// Loads `template_name` from `dir`, resolves its `extends` chain and
/// renders it with `context`. Missing template files are server errors.
pub fn render_template(
    dir: &str,
    template_name: &str,
    context: &HashMap<String, TemplateValue>,
) -> Response {
    let child = match load_source(dir, template_name) {
        Ok(source) => source,
        Err(resp) => return resp,
    };
    let child_nodes = parse_tokens(&tokenize_template(&child));
    tdebug!("parsed child AST: {:?}", child_nodes);

    // The child's own block bodies, plus the base file it extends, if any.
    let mut child_blocks = HashMap::new();
    let mut base_template: Option<String> = None;
    for node in &child_nodes {
        match node {
            Node::Extends(base) => base_template = Some(base.clone()),
            Node::Block { name, body } => {
                child_blocks.insert(name.clone(), body.clone());
            }
            _ => {}
        }
    }

    let html = match base_template {
        Some(base) => {
            let base_source = match load_source(dir, &base) {
                Ok(source) => source,
                Err(resp) => return resp,
            };
            let base_nodes = parse_tokens(&tokenize_template(&base_source));
            tdebug!("parsed base AST: {:?}", base_nodes);
            render_nodes(&merge_child_blocks(&base_nodes, &child_blocks), context)
        }
        None => render_nodes(&child_nodes, context),
    };

    let mut resp = Response::ok(html);
    resp.headers.insert(
        "Content-Type".to_string(),
        "text/html; charset=utf-8".to_string(),
    );
    resp
}
