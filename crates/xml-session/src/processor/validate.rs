//! Schema validation processor

use std::path::Path;
use std::sync::Arc;

use xml_engine_core::xsd::SchemaProgram;

use crate::error::{Error, Result};
use crate::processor::{ProcessorCore, SourceBinding};
use crate::session::SessionInner;
use crate::value::Value;

/// Validates documents against an accumulated schema set. Only a
/// licensed session hands one of these out.
///
/// Validation failures are reported through the error batch and the
/// structured report, never as `Err`.
#[derive(Debug)]
pub struct SchemaValidator {
    core: ProcessorCore,
    source: SourceBinding,
    schemas: SchemaProgram,
    report: Option<Value>,
}

impl SchemaValidator {
    pub(crate) fn new(session: Arc<SessionInner>) -> Result<Self> {
        // The engine hands out schema sets only when licensed.
        let schemas = session
            .with_engine(|engine| engine.new_schema_set())
            .map_err(|_| {
                Error::License("schema validation requires a licensed session".to_string())
            })?;
        Ok(SchemaValidator {
            core: ProcessorCore::new(session),
            source: SourceBinding::Unbound,
            schemas,
            report: None,
        })
    }

    // ==================== Schema registration ====================

    /// Add a schema document to the set. Registrations accumulate;
    /// compile failures are batched and leave the set unchanged.
    pub fn register_schema(&mut self, xsd: &str) -> Result<()> {
        self.core.ensure_live()?;
        let added = self
            .core
            .session
            .with_engine(|engine| engine.add_schema(&mut self.schemas, xsd));
        if let Err(e) = added {
            self.core.record(e.to_string());
        }
        Ok(())
    }

    pub fn register_schema_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.core.ensure_live()?;
        let resolved = self.core.session.resolve(path.as_ref());
        match std::fs::read_to_string(&resolved) {
            Ok(text) => self.register_schema(&text),
            Err(e) => {
                self.core.record(format!("{}: {e}", resolved.display()));
                Ok(())
            }
        }
    }

    // ==================== Inputs ====================

    pub fn set_source_node(&mut self, value: &Value) -> Result<()> {
        self.source = self.core.bind_node(value)?;
        Ok(())
    }

    pub fn set_source_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.source = self.core.bind_file(path.as_ref())?;
        Ok(())
    }

    pub fn set_property(&mut self, key: &str, value: &str) -> Result<()> {
        self.core.set_property(key, value)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.core.property(key)
    }

    pub fn clear_properties(&mut self) {
        self.core.clear_properties();
    }

    // ==================== Invocation ====================

    /// Validate the bound source. Always returns `Ok` on a live
    /// session; failures show up in the batch and the report.
    pub fn validate(&mut self) -> Result<()> {
        self.run()?;
        Ok(())
    }

    /// Validate and hand back the source document when it is valid,
    /// `None` when it is not or when validation could not run.
    pub fn validate_to_node(&mut self) -> Result<Option<Value>> {
        let valid = self.run()?;
        if !valid {
            return Ok(None);
        }
        match &self.source {
            SourceBinding::Node(doc, node) => Ok(Some(Value::node(Arc::clone(doc), *node))),
            SourceBinding::File(path) => {
                let path = path.clone();
                let parsed = self.core.session.with_engine(|engine| engine.parse_file(&path));
                match parsed {
                    Ok(doc) => {
                        let doc = Arc::new(doc);
                        let root = doc.root();
                        Ok(Some(Value::node(doc, root)))
                    }
                    Err(_) => Ok(None),
                }
            }
            SourceBinding::Unbound => Ok(None),
        }
    }

    /// Structured report from the last validation; present only when
    /// that validation failed. Distinct from the error batch, which
    /// answers "did it fail", while the report says how.
    pub fn validation_report(&self) -> Option<Value> {
        self.report.clone()
    }

    fn run(&mut self) -> Result<bool> {
        self.core.ensure_live()?;
        self.core.diagnostics.clear();
        self.report = None;
        let Some((doc, _root)) = self.core.load_source(&self.source) else {
            return Ok(false);
        };
        let outcome = self
            .core
            .session
            .with_engine(|engine| engine.validate(&self.schemas, &doc));
        for error in &outcome.errors {
            self.core.record(error.message.clone());
        }
        if let Some(report) = outcome.report {
            let report = Arc::new(report);
            let root = report.root();
            self.report = Some(Value::node(report, root));
        }
        Ok(outcome.valid)
    }

    // ==================== Diagnostics ====================

    pub fn exception_occurred(&self) -> bool {
        self.core.exception_occurred()
    }

    pub fn exception_count(&self) -> usize {
        self.core.exception_count()
    }

    pub fn error_message(&self, index: usize) -> Option<&str> {
        self.core.error_message(index)
    }
}
