//! xml-engine-core: in-process XML engine
//!
//! One `Engine` instance bundles the tree model with XPath, XSLT,
//! XQuery and XSD interpreters behind a narrow call surface: parse,
//! compile a program, invoke it, serialize the result. Session and
//! lifetime management live one layer up; this crate has no global
//! state and no liveness rules of its own.
//!
//! # Quick start
//!
//! ```rust
//! use xml_engine_core::Engine;
//! use xml_engine_core::xpath::Environment;
//!
//! let engine = Engine::new(false);
//! let doc = engine.parse("<root><item>Hello</item></root>").unwrap();
//! let program = engine.compile_xpath("count(//item)").unwrap();
//! let result = engine
//!     .evaluate_xpath(&program, &doc, None, &Environment::default())
//!     .unwrap();
//! assert_eq!(result.len(), 1);
//! ```

pub mod error;
pub mod item;
pub mod tree;
pub mod xpath;
pub mod xquery;
pub mod xsd;
pub mod xslt;

use std::collections::HashMap;
use std::path::Path;

pub use error::{Error, Result};
pub use item::{format_double, Item, Sequence};
pub use tree::{Document, NodeId, NodeKind};

use xpath::{Environment, XPathProgram};
use xquery::{QueryOutcome, QueryProgram};
use xsd::{SchemaProgram, ValidationOutcome};
use xslt::StylesheetProgram;

/// Tunable engine behavior, set by the owning session.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    /// Drop whitespace-only text nodes while parsing.
    pub strip_whitespace: bool,
    /// Base URI resolved against for relative file references.
    pub base_uri: Option<String>,
}

/// One engine instance. Not safe for concurrent invocation; callers
/// serialize access.
#[derive(Debug)]
pub struct Engine {
    licensed: bool,
    settings: EngineSettings,
}

impl Engine {
    /// Create an engine. The licensed form unlocks schema validation.
    pub fn new(licensed: bool) -> Self {
        Self {
            licensed,
            settings: EngineSettings::default(),
        }
    }

    pub fn licensed(&self) -> bool {
        self.licensed
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut EngineSettings {
        &mut self.settings
    }

    // ==================== Parsing ====================

    pub fn parse(&self, xml: &str) -> Result<Document> {
        Document::parse_with_options(xml, self.settings.strip_whitespace)
    }

    pub fn parse_file(&self, path: &Path) -> Result<Document> {
        let content = std::fs::read_to_string(path)?;
        self.parse(&content)
    }

    // ==================== Compilation ====================

    pub fn compile_xpath(&self, expression: &str) -> Result<XPathProgram> {
        xpath::compile(expression)
    }

    pub fn compile_stylesheet(&self, stylesheet: &str) -> Result<StylesheetProgram> {
        xslt::compile(stylesheet)
    }

    pub fn compile_query(&self, query: &str) -> Result<QueryProgram> {
        xquery::compile(query)
    }

    /// Start an empty schema set; registrations accumulate on it.
    pub fn new_schema_set(&self) -> Result<SchemaProgram> {
        if !self.licensed {
            return Err(Error::Engine(
                "schema validation requires a licensed engine".to_string(),
            ));
        }
        Ok(SchemaProgram::new())
    }

    pub fn add_schema(&self, set: &mut SchemaProgram, xsd: &str) -> Result<()> {
        set.add_schema(xsd)
    }

    // ==================== Invocation ====================

    pub fn evaluate_xpath(
        &self,
        program: &XPathProgram,
        doc: &Document,
        context: Option<Item>,
        env: &Environment,
    ) -> Result<Sequence> {
        program.evaluate(doc, context, env)
    }

    pub fn transform(
        &self,
        program: &StylesheetProgram,
        source: &Document,
        params: &HashMap<String, Sequence>,
        initial_params: &HashMap<String, Sequence>,
    ) -> Result<Document> {
        program.transform(source, params, initial_params)
    }

    pub fn execute_query(
        &self,
        program: &QueryProgram,
        source: &Document,
        context: Option<Item>,
        env: &Environment,
    ) -> Result<QueryOutcome> {
        program.execute(source, context, env)
    }

    pub fn validate(&self, set: &SchemaProgram, doc: &Document) -> ValidationOutcome {
        set.validate(doc)
    }

    // ==================== Serialization ====================

    /// Serialize a sequence the way a query result prints: nodes as
    /// markup, atomics as space-separated lexical forms.
    pub fn serialize_sequence(&self, seq: &Sequence, doc: &Document) -> String {
        let mut parts = Vec::new();
        let mut pending_atomics: Vec<String> = Vec::new();
        for item in seq {
            match item {
                Item::Node(id) => {
                    if !pending_atomics.is_empty() {
                        parts.push(std::mem::take(&mut pending_atomics).join(" "));
                    }
                    parts.push(doc.serialize(*id));
                }
                atomic => pending_atomics.push(atomic.string_value(doc)),
            }
        }
        if !pending_atomics.is_empty() {
            parts.push(pending_atomics.join(" "));
        }
        parts.concat()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlicensed_engine_refuses_schemas() {
        let engine = Engine::new(false);
        assert!(matches!(engine.new_schema_set(), Err(Error::Engine(_))));
        assert!(Engine::new(true).new_schema_set().is_ok());
    }

    #[test]
    fn strip_whitespace_setting_applies_to_parse() {
        let mut engine = Engine::new(false);
        engine.settings_mut().strip_whitespace = true;
        let doc = engine.parse("<r>\n  <a/>\n</r>").unwrap();
        let root = doc.root_element().unwrap();
        assert_eq!(doc.children(root).len(), 1);
    }

    #[test]
    fn serialize_sequence_mixes_nodes_and_atomics() {
        let engine = Engine::new(false);
        let doc = engine.parse("<r><a/></r>").unwrap();
        let a = doc.children(doc.root_element().unwrap())[0];
        let seq = vec![Item::Integer(1), Item::Integer(2), Item::Node(a)];
        assert_eq!(engine.serialize_sequence(&seq, &doc), "1 2<a/>");
    }
}
