//! Query processor

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use xml_engine_core::xpath::Environment;
use xml_engine_core::xquery::{QueryOutcome, QueryProgram};

use crate::error::Result;
use crate::processor::{ProcessorCore, SourceBinding};
use crate::session::SessionInner;
use crate::value::Value;

/// Compiles a query eagerly when its text is set and runs it against
/// a context document. Compile failures go to the error batch; a
/// later run with no valid query yields `None`.
#[derive(Debug)]
pub struct QueryRunner {
    core: ProcessorCore,
    context: SourceBinding,
    program: Option<QueryProgram>,
    namespaces: HashMap<String, String>,
}

impl QueryRunner {
    pub(crate) fn new(session: Arc<SessionInner>) -> Self {
        QueryRunner {
            core: ProcessorCore::new(session),
            context: SourceBinding::Unbound,
            program: None,
            namespaces: HashMap::new(),
        }
    }

    // ==================== Inputs ====================

    /// Set and compile the query text. Compilation happens here so
    /// static errors are batched before any run.
    pub fn set_query_content(&mut self, query: &str) -> Result<()> {
        self.core.ensure_live()?;
        self.core.diagnostics.clear();
        let compiled = self
            .core
            .session
            .with_engine(|engine| engine.compile_query(query));
        match compiled {
            Ok(program) => self.program = Some(program),
            Err(e) => {
                self.program = None;
                self.core.record(e.to_string());
            }
        }
        Ok(())
    }

    pub fn set_query_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.core.ensure_live()?;
        let resolved = self.core.session.resolve(path.as_ref());
        match std::fs::read_to_string(&resolved) {
            Ok(text) => self.set_query_content(&text),
            Err(e) => {
                self.core.diagnostics.clear();
                self.program = None;
                self.core.record(format!("{}: {e}", resolved.display()));
                Ok(())
            }
        }
    }

    pub fn set_context_item(&mut self, value: &Value) -> Result<()> {
        self.context = self.core.bind_node(value)?;
        Ok(())
    }

    pub fn set_context_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.context = self.core.bind_file(path.as_ref())?;
        Ok(())
    }

    /// Bind a namespace prefix for use inside the query.
    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.core.ensure_live()?;
        self.namespaces.insert(prefix.to_string(), uri.to_string());
        Ok(())
    }

    pub fn set_parameter(&mut self, name: &str, value: &Value) -> Result<()> {
        self.core.set_parameter(name, value)
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

    pub fn clear_parameters(&mut self) {
        self.core.clear_parameters();
    }

    // ==================== Invocation ====================

    /// Run the query and serialize its result. `None` means the run
    /// failed; the error batch holds the reasons.
    pub fn run_query_to_string(&mut self) -> Result<Option<String>> {
        let Some((outcome, doc)) = self.run()? else {
            return Ok(None);
        };
        let serialized = match &outcome {
            QueryOutcome::Tree(tree) => tree.serialize_document(),
            QueryOutcome::Items(seq) => self
                .core
                .session
                .with_engine(|engine| engine.serialize_sequence(seq, &doc)),
        };
        Ok(Some(serialized))
    }

    /// Run the query and return its result as a value.
    pub fn run_query_to_value(&mut self) -> Result<Option<Value>> {
        let Some((outcome, doc)) = self.run()? else {
            return Ok(None);
        };
        let value = match outcome {
            QueryOutcome::Tree(tree) => {
                let tree = Arc::new(tree);
                let root = tree.root();
                Value::node(tree, root)
            }
            QueryOutcome::Items(seq) => Value::from_sequence(&doc, seq),
        };
        Ok(Some(value))
    }

    /// Run the query and write the serialized result to a file.
    /// Returns whether the write happened.
    pub fn run_query_to_file(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        let resolved = self.core.session.resolve(path.as_ref());
        match self.run_query_to_string()? {
            Some(output) => {
                std::fs::write(&resolved, output)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn run(&mut self) -> Result<Option<(QueryOutcome, Arc<xml_engine_core::Document>)>> {
        self.core.ensure_live()?;
        self.core.diagnostics.clear();
        let Some(program) = self.program.take() else {
            self.core.record("no query has been set");
            return Ok(None);
        };
        let Some((doc, root)) = self.core.load_source(&self.context) else {
            self.program = Some(program);
            return Ok(None);
        };
        let env = Environment {
            variables: self.core.parameters.clone(),
            namespaces: self.namespaces.clone(),
        };
        let outcome = self.core.session.with_engine(|engine| {
            engine.execute_query(
                &program,
                &doc,
                Some(xml_engine_core::Item::Node(root)),
                &env,
            )
        });
        self.program = Some(program);
        match outcome {
            Ok(result) => Ok(Some((result, doc))),
            Err(e) => {
                self.core.record(e.to_string());
                Ok(None)
            }
        }
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
