//! XQuery interpreter
//!
//! Two query shapes are supported: a plain expression (evaluated by
//! the XPath engine, `for … return` included) and a direct element
//! constructor whose text and attribute content may carry enclosed
//! `{…}` expressions. A `declare namespace p = "uri";` prolog feeds
//! the static context alongside namespaces declared through the API.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::item::{sequence_string, Item, Sequence};
use crate::tree::{Document, NodeId, NodeKind};
use crate::xpath::{self, Environment, XPathProgram};

/// One part of enclosed-expression content.
#[derive(Debug, Clone)]
enum Part {
    Text(String),
    Expr(XPathProgram),
}

#[derive(Debug, Clone)]
enum QueryBody {
    Expr(XPathProgram),
    Constructor {
        template: Document,
        texts: HashMap<NodeId, Vec<Part>>,
        attrs: HashMap<(NodeId, String), Vec<Part>>,
    },
}

/// A compiled query.
#[derive(Debug, Clone)]
pub struct QueryProgram {
    body: QueryBody,
    /// Prolog namespace declarations.
    pub namespaces: HashMap<String, String>,
}

/// Result of executing a query.
#[derive(Debug)]
pub enum QueryOutcome {
    /// Result tree built by a direct constructor; the tree's document
    /// node holds the constructed content.
    Tree(Document),
    /// Items referencing the source document.
    Items(Sequence),
}

/// Compile a query: prolog, then either a constructor or an expression.
pub fn compile(query: &str) -> Result<QueryProgram> {
    let mut rest = query.trim();
    let mut namespaces = HashMap::new();
    while let Some(after) = rest.strip_prefix("declare namespace") {
        let end = after.find(';').ok_or_else(|| {
            Error::QueryCompile("namespace declaration not terminated by ';'".to_string())
        })?;
        let (prefix, uri) = parse_namespace_decl(&after[..end])?;
        namespaces.insert(prefix, uri);
        rest = after[end + 1..].trim_start();
    }
    if rest.is_empty() {
        return Err(Error::QueryCompile("empty query body".to_string()));
    }

    let body = if rest.starts_with('<') {
        let template =
            Document::parse(rest).map_err(|e| Error::QueryCompile(e.to_string()))?;
        let mut texts = HashMap::new();
        let mut attrs = HashMap::new();
        compile_enclosed(&template, template.root(), &mut texts, &mut attrs)?;
        QueryBody::Constructor {
            template,
            texts,
            attrs,
        }
    } else {
        QueryBody::Expr(xpath::compile(rest).map_err(|e| match e {
            Error::XPathSyntax(msg) => Error::QueryCompile(msg),
            other => other,
        })?)
    };

    Ok(QueryProgram { body, namespaces })
}

fn parse_namespace_decl(decl: &str) -> Result<(String, String)> {
    let (prefix, uri) = decl.split_once('=').ok_or_else(|| {
        Error::QueryCompile(format!("malformed namespace declaration '{decl}'"))
    })?;
    let prefix = prefix.trim();
    let uri = uri.trim();
    let uri = uri
        .strip_prefix('"')
        .and_then(|u| u.strip_suffix('"'))
        .or_else(|| uri.strip_prefix('\'').and_then(|u| u.strip_suffix('\'')))
        .ok_or_else(|| {
            Error::QueryCompile(format!("namespace uri must be quoted in '{decl}'"))
        })?;
    if prefix.is_empty() {
        return Err(Error::QueryCompile(format!(
            "empty namespace prefix in '{decl}'"
        )));
    }
    Ok((prefix.to_string(), uri.to_string()))
}

fn compile_enclosed(
    template: &Document,
    node: NodeId,
    texts: &mut HashMap<NodeId, Vec<Part>>,
    attrs: &mut HashMap<(NodeId, String), Vec<Part>>,
) -> Result<()> {
    for &child in template.children(node) {
        match template.kind(child) {
            NodeKind::Text => {
                let value = template.value(child);
                if value.contains('{') {
                    texts.insert(child, compile_parts(value)?);
                }
            }
            NodeKind::Element => {
                for (name, value) in template.attributes(child) {
                    if value.contains('{') {
                        attrs.insert((child, name.clone()), compile_parts(value)?);
                    }
                }
                compile_enclosed(template, child, texts, attrs)?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn compile_parts(value: &str) -> Result<Vec<Part>> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                text.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                text.push('}');
            }
            '{' => {
                if !text.is_empty() {
                    parts.push(Part::Text(std::mem::take(&mut text)));
                }
                let mut expr = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    expr.push(c);
                }
                if !closed {
                    return Err(Error::QueryCompile(format!(
                        "unterminated enclosed expression in '{value}'"
                    )));
                }
                parts.push(Part::Expr(xpath::compile(&expr).map_err(|e| {
                    Error::QueryCompile(e.to_string())
                })?));
            }
            c => text.push(c),
        }
    }
    if !text.is_empty() {
        parts.push(Part::Text(text));
    }
    Ok(parts)
}

impl QueryProgram {
    /// Execute against a source document, with an optional explicit
    /// context item and API-level bindings layered under the prolog
    /// namespaces.
    pub fn execute(
        &self,
        source: &Document,
        context: Option<Item>,
        env: &Environment,
    ) -> Result<QueryOutcome> {
        let mut env = env.clone();
        for (prefix, uri) in &self.namespaces {
            env.namespaces.insert(prefix.clone(), uri.clone());
        }
        match &self.body {
            QueryBody::Expr(program) => {
                let seq = program.evaluate(source, context, &env).map_err(|e| match e {
                    Error::XPathEval(msg) => Error::QueryEval(msg),
                    other => other,
                })?;
                Ok(QueryOutcome::Items(seq))
            }
            QueryBody::Constructor {
                template,
                texts,
                attrs,
            } => {
                let mut output = Document::new();
                let root = output.root();
                let mut builder = ConstructorRun {
                    template,
                    texts,
                    attrs,
                    source,
                    context,
                    env: &env,
                    output: &mut output,
                };
                builder.build(template.root(), root)?;
                Ok(QueryOutcome::Tree(output))
            }
        }
    }
}

struct ConstructorRun<'a> {
    template: &'a Document,
    texts: &'a HashMap<NodeId, Vec<Part>>,
    attrs: &'a HashMap<(NodeId, String), Vec<Part>>,
    source: &'a Document,
    context: Option<Item>,
    env: &'a Environment,
    output: &'a mut Document,
}

impl ConstructorRun<'_> {
    fn build(&mut self, template_node: NodeId, out_parent: NodeId) -> Result<()> {
        for &child in self.template.children(template_node) {
            match self.template.kind(child) {
                NodeKind::Text => match self.texts.get(&child) {
                    Some(parts) => self.emit_parts(parts, out_parent)?,
                    None => {
                        let text = self.template.value(child).to_string();
                        self.output.push_text(out_parent, &text);
                    }
                },
                NodeKind::Element => {
                    let name = self.template.name(child).to_string();
                    let element = self.output.push_element(out_parent, &name);
                    let attr_list: Vec<(String, String)> =
                        self.template.attributes(child).to_vec();
                    for (attr_name, attr_value) in attr_list {
                        let value = match self.attrs.get(&(child, attr_name.clone())) {
                            Some(parts) => self.eval_parts_to_string(parts)?,
                            None => attr_value,
                        };
                        self.output.set_attribute(element, &attr_name, &value);
                    }
                    self.build(child, element)?;
                }
                NodeKind::Comment => {
                    let text = self.template.value(child).to_string();
                    self.output.push_comment(out_parent, &text);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn emit_parts(&mut self, parts: &[Part], out_parent: NodeId) -> Result<()> {
        for part in parts {
            match part {
                Part::Text(text) => {
                    self.output.push_text(out_parent, text);
                }
                Part::Expr(program) => {
                    let seq = program
                        .evaluate(self.source, self.context.clone(), self.env)
                        .map_err(|e| match e {
                            Error::XPathEval(msg) => Error::QueryEval(msg),
                            other => other,
                        })?;
                    let mut first = true;
                    for item in seq {
                        match item {
                            Item::Node(id) => {
                                self.output.copy_subtree(out_parent, self.source, id);
                                first = true;
                            }
                            atomic => {
                                if !first {
                                    self.output.push_text(out_parent, " ");
                                }
                                let text = atomic.string_value(self.source);
                                self.output.push_text(out_parent, &text);
                                first = false;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn eval_parts_to_string(&mut self, parts: &[Part]) -> Result<String> {
        let mut out = String::new();
        for part in parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Expr(program) => {
                    let seq = program.evaluate(self.source, self.context.clone(), self.env)?;
                    out.push_str(&sequence_string(&seq, self.source));
                }
            }
        }
        Ok(out)
    }
}
