//! XSD validation
//!
//! Supports global element declarations with inline complex types
//! (`xs:sequence` of `xs:element` with occurrence bounds), lexical
//! checks for the common built-in simple types, and XSD 1.1
//! `xs:assert` tests evaluated with the validated element as context.
//! Failures accumulate as a batch; validation never stops at the
//! first error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::item::Item;
use crate::tree::{Document, NodeId, NodeKind};
use crate::xpath::{self, Environment, XPathProgram};

pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimpleType {
    AnyType,
    String,
    Integer,
    Decimal,
    Boolean,
}

impl SimpleType {
    fn parse(name: &str) -> Result<Self> {
        match name.rsplit(':').next().unwrap_or(name) {
            "anyType" => Ok(SimpleType::AnyType),
            "string" => Ok(SimpleType::String),
            "integer" | "int" | "long" | "nonNegativeInteger" => Ok(SimpleType::Integer),
            "decimal" | "double" | "float" => Ok(SimpleType::Decimal),
            "boolean" => Ok(SimpleType::Boolean),
            other => Err(Error::SchemaCompile(format!(
                "unsupported built-in type '{other}'"
            ))),
        }
    }

    fn accepts(&self, lexical: &str) -> bool {
        let lexical = lexical.trim();
        match self {
            SimpleType::AnyType | SimpleType::String => true,
            SimpleType::Integer => {
                let digits = lexical
                    .strip_prefix('+')
                    .or_else(|| lexical.strip_prefix('-'))
                    .unwrap_or(lexical);
                !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
            }
            SimpleType::Decimal => lexical.parse::<f64>().is_ok(),
            SimpleType::Boolean => matches!(lexical, "true" | "false" | "1" | "0"),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            SimpleType::AnyType => "xs:anyType",
            SimpleType::String => "xs:string",
            SimpleType::Integer => "xs:integer",
            SimpleType::Decimal => "xs:decimal",
            SimpleType::Boolean => "xs:boolean",
        }
    }
}

#[derive(Debug, Clone)]
enum TypeDef {
    Simple(SimpleType),
    Complex(ComplexType),
}

#[derive(Debug, Clone)]
struct ComplexType {
    particles: Vec<Particle>,
    asserts: Vec<XPathProgram>,
}

#[derive(Debug, Clone)]
struct Particle {
    decl: ElementDecl,
    min: u32,
    /// `None` means unbounded.
    max: Option<u32>,
}

#[derive(Debug, Clone)]
struct ElementDecl {
    name: String,
    type_def: TypeDef,
}

/// A set of registered schemas; registration is cumulative, later
/// global declarations replace earlier ones with the same name.
#[derive(Debug, Clone, Default)]
pub struct SchemaProgram {
    globals: HashMap<String, ElementDecl>,
}

/// One validation failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub message: String,
}

/// Result of validating one document.
#[derive(Debug)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    /// Structured report tree; produced only when validation failed.
    pub report: Option<Document>,
}

impl SchemaProgram {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when at least one global element declaration is registered.
    pub fn has_declarations(&self) -> bool {
        !self.globals.is_empty()
    }

    /// Register the declarations of one schema document.
    pub fn add_schema(&mut self, xsd: &str) -> Result<()> {
        let doc = Document::parse(xsd).map_err(|e| Error::SchemaCompile(e.to_string()))?;
        let root = doc
            .root_element()
            .ok_or_else(|| Error::SchemaCompile("schema has no document element".to_string()))?;
        if doc.namespace_uri(root) != Some(XSD_NS) || doc.local_name(root) != "schema" {
            return Err(Error::SchemaCompile(
                "document element is not xs:schema".to_string(),
            ));
        }
        for &child in doc.children(root) {
            if doc.kind(child) != NodeKind::Element {
                continue;
            }
            match doc.local_name(child) {
                "element" => {
                    let decl = compile_element(&doc, child)?;
                    self.globals.insert(decl.name.clone(), decl);
                }
                other => {
                    return Err(Error::SchemaCompile(format!(
                        "unsupported top-level schema component xs:{other}"
                    )))
                }
            }
        }
        Ok(())
    }

    /// Validate a document against the registered declarations.
    pub fn validate(&self, doc: &Document) -> ValidationOutcome {
        let mut errors = Vec::new();
        match doc.root_element() {
            None => errors.push(ValidationError {
                message: "document has no element to validate".to_string(),
            }),
            Some(root) => match self.globals.get(doc.local_name(root)) {
                None => errors.push(ValidationError {
                    message: format!(
                        "no declaration found for element '{}'",
                        doc.local_name(root)
                    ),
                }),
                Some(decl) => validate_element(doc, root, decl, &mut errors),
            },
        }
        let valid = errors.is_empty();
        let report = if valid { None } else { Some(build_report(&errors)) };
        ValidationOutcome {
            valid,
            errors,
            report,
        }
    }
}

fn compile_element(doc: &Document, node: NodeId) -> Result<ElementDecl> {
    let name = doc
        .attribute(node, "name")
        .ok_or_else(|| Error::SchemaCompile("xs:element without name attribute".to_string()))?
        .to_string();

    if let Some(type_name) = doc.attribute(node, "type") {
        return Ok(ElementDecl {
            name,
            type_def: TypeDef::Simple(SimpleType::parse(type_name)?),
        });
    }

    let inline = doc.children(node).iter().copied().find(|&c| {
        doc.kind(c) == NodeKind::Element && doc.local_name(c) == "complexType"
    });
    let type_def = match inline {
        None => TypeDef::Simple(SimpleType::AnyType),
        Some(complex) => {
            let mut particles = Vec::new();
            let mut asserts = Vec::new();
            for &child in doc.children(complex) {
                if doc.kind(child) != NodeKind::Element {
                    continue;
                }
                match doc.local_name(child) {
                    "sequence" => {
                        for &entry in doc.children(child) {
                            if doc.kind(entry) != NodeKind::Element {
                                continue;
                            }
                            if doc.local_name(entry) != "element" {
                                return Err(Error::SchemaCompile(format!(
                                    "unsupported particle xs:{}",
                                    doc.local_name(entry)
                                )));
                            }
                            particles.push(Particle {
                                decl: compile_element(doc, entry)?,
                                min: occurs(doc, entry, "minOccurs", 1)?,
                                max: match doc.attribute(entry, "maxOccurs") {
                                    Some("unbounded") => None,
                                    _ => Some(occurs(doc, entry, "maxOccurs", 1)?),
                                },
                            });
                        }
                    }
                    "assert" => {
                        let test = doc.attribute(child, "test").ok_or_else(|| {
                            Error::SchemaCompile(
                                "xs:assert without test attribute".to_string(),
                            )
                        })?;
                        asserts.push(
                            xpath::compile(test)
                                .map_err(|e| Error::SchemaCompile(e.to_string()))?,
                        );
                    }
                    other => {
                        return Err(Error::SchemaCompile(format!(
                            "unsupported complex type child xs:{other}"
                        )))
                    }
                }
            }
            TypeDef::Complex(ComplexType { particles, asserts })
        }
    };
    Ok(ElementDecl { name, type_def })
}

fn occurs(doc: &Document, node: NodeId, attr: &str, default: u32) -> Result<u32> {
    match doc.attribute(node, attr) {
        None => Ok(default),
        Some(text) => text.parse().map_err(|_| {
            Error::SchemaCompile(format!("bad {attr} value '{text}'"))
        }),
    }
}

fn validate_element(
    doc: &Document,
    node: NodeId,
    decl: &ElementDecl,
    errors: &mut Vec<ValidationError>,
) {
    match &decl.type_def {
        TypeDef::Simple(simple) => {
            let value = doc.string_value(node);
            if !simple.accepts(&value) {
                errors.push(ValidationError {
                    message: format!(
                        "element '{}': value '{}' is not a valid {}",
                        decl.name,
                        value,
                        simple.name()
                    ),
                });
            }
        }
        TypeDef::Complex(complex) => {
            validate_content_model(doc, node, decl, complex, errors);
            for assert in &complex.asserts {
                let env = Environment::default();
                match assert.effective_boolean_value(doc, Some(Item::Node(node)), &env) {
                    Ok(true) => {}
                    Ok(false) => errors.push(ValidationError {
                        message: format!(
                            "element '{}': assertion '{}' failed",
                            decl.name,
                            assert.source()
                        ),
                    }),
                    Err(e) => errors.push(ValidationError {
                        message: format!(
                            "element '{}': assertion '{}' raised {}",
                            decl.name,
                            assert.source(),
                            e
                        ),
                    }),
                }
            }
        }
    }
}

/// Match child elements against the sequence particles in order.
/// Comments and processing instructions are not part of the content
/// model; character content between elements is rejected.
fn validate_content_model(
    doc: &Document,
    node: NodeId,
    decl: &ElementDecl,
    complex: &ComplexType,
    errors: &mut Vec<ValidationError>,
) {
    let children: Vec<NodeId> = doc
        .children(node)
        .iter()
        .copied()
        .filter(|&c| match doc.kind(c) {
            NodeKind::Element => true,
            NodeKind::Text => {
                if !doc.value(c).trim().is_empty() {
                    errors.push(ValidationError {
                        message: format!(
                            "element '{}': character content not allowed in complex content",
                            decl.name
                        ),
                    });
                }
                false
            }
            _ => false,
        })
        .collect();

    let mut cursor = 0usize;
    for particle in &complex.particles {
        let mut seen = 0u32;
        while cursor < children.len()
            && doc.local_name(children[cursor]) == particle.decl.name
            && particle.max.map_or(true, |max| seen < max)
        {
            validate_element(doc, children[cursor], &particle.decl, errors);
            cursor += 1;
            seen += 1;
        }
        if seen < particle.min {
            errors.push(ValidationError {
                message: format!(
                    "element '{}': expected at least {} occurrence(s) of '{}', found {}",
                    decl.name, particle.min, particle.decl.name, seen
                ),
            });
        }
    }
    for &extra in &children[cursor.min(children.len())..] {
        errors.push(ValidationError {
            message: format!(
                "element '{}': unexpected child element '{}'",
                decl.name,
                doc.local_name(extra)
            ),
        });
    }
}

fn build_report(errors: &[ValidationError]) -> Document {
    let mut report = Document::new();
    let root = report.push_element(report.root(), "validation-report");
    for error in errors {
        let entry = report.push_element(root, "error");
        report.push_text(entry, &error.message);
    }
    report
}
