//! Stylesheet transformation processor

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use xml_engine_core::xslt::StylesheetProgram;
use xml_engine_core::Sequence;

use crate::error::Result;
use crate::processor::{ProcessorCore, SourceBinding};
use crate::session::SessionInner;
use crate::value::Value;

/// Compiles stylesheets and runs them over a bound source document.
///
/// Compilation failures are never raised; they land in the error
/// batch and leave the processor without a runnable stylesheet, so
/// the next transform yields `None` alongside the records.
#[derive(Debug)]
pub struct Transformer {
    core: ProcessorCore,
    source: SourceBinding,
    program: Option<StylesheetProgram>,
    initial_template_params: HashMap<String, Sequence>,
}

impl Transformer {
    pub(crate) fn new(session: Arc<SessionInner>) -> Self {
        Transformer {
            core: ProcessorCore::new(session),
            source: SourceBinding::Unbound,
            program: None,
            initial_template_params: HashMap::new(),
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

    /// Compile a stylesheet from markup. A compile failure clears the
    /// current program and is reported through the error batch.
    pub fn compile_stylesheet(&mut self, stylesheet: &str) -> Result<()> {
        self.core.ensure_live()?;
        self.core.diagnostics.clear();
        let compiled = self
            .core
            .session
            .with_engine(|engine| engine.compile_stylesheet(stylesheet));
        match compiled {
            Ok(program) => self.program = Some(program),
            Err(e) => {
                self.program = None;
                self.core.record(e.to_string());
            }
        }
        Ok(())
    }

    pub fn compile_stylesheet_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.core.ensure_live()?;
        let resolved = self.core.session.resolve(path.as_ref());
        match std::fs::read_to_string(&resolved) {
            Ok(text) => self.compile_stylesheet(&text),
            Err(e) => {
                self.core.diagnostics.clear();
                self.program = None;
                self.core.record(format!("{}: {e}", resolved.display()));
                Ok(())
            }
        }
    }

    /// Bind a global stylesheet parameter.
    pub fn set_parameter(&mut self, name: &str, value: &Value) -> Result<()> {
        self.core.set_parameter(name, value)
    }

    /// Bind parameters passed to the initial template. The `tunnel`
    /// form reaches nested templates as well; this engine applies both
    /// forms identically.
    pub fn set_initial_template_parameters(
        &mut self,
        params: &HashMap<String, Value>,
        _tunnel: bool,
    ) -> Result<()> {
        self.core.ensure_live()?;
        for (name, value) in params {
            self.initial_template_params
                .insert(name.clone(), value.to_sequence());
        }
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

    pub fn clear_parameters(&mut self) {
        self.core.parameters.clear();
        self.initial_template_params.clear();
    }

    // ==================== Invocation ====================

    /// Run the compiled stylesheet against the bound source and
    /// serialize the result. `None` means the transform failed; the
    /// error batch holds the reasons.
    pub fn transform_to_string(&mut self) -> Result<Option<String>> {
        Ok(self
            .run()?
            .map(|doc| doc.serialize_document()))
    }

    /// Like [`transform_to_string`](Self::transform_to_string) but
    /// returns the result tree as a node value.
    pub fn transform_to_value(&mut self) -> Result<Option<Value>> {
        Ok(self.run()?.map(|doc| {
            let doc = Arc::new(doc);
            let root = doc.root();
            Value::node(doc, root)
        }))
    }

    /// Run the transform and write the serialized result to a file.
    /// Returns whether the write happened.
    pub fn transform_to_file(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        let resolved = self.core.session.resolve(path.as_ref());
        match self.run()? {
            Some(doc) => {
                std::fs::write(&resolved, doc.serialize_document())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn run(&mut self) -> Result<Option<xml_engine_core::Document>> {
        self.core.ensure_live()?;
        self.core.diagnostics.clear();
        let Some(program) = self.program.take() else {
            self.core.record("no stylesheet has been compiled");
            return Ok(None);
        };
        let Some((doc, _root)) = self.core.load_source(&self.source) else {
            self.program = Some(program);
            return Ok(None);
        };
        let outcome = self.core.session.with_engine(|engine| {
            engine.transform(
                &program,
                &doc,
                &self.core.parameters,
                &self.initial_template_params,
            )
        });
        self.program = Some(program);
        match outcome {
            Ok(result) => Ok(Some(result)),
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
