//! Path expression evaluator

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use xml_engine_core::xpath::Environment;
use xml_engine_core::Item;

use crate::error::{Error, Result};
use crate::processor::{ProcessorCore, SourceBinding};
use crate::session::SessionInner;
use crate::value::Value;

/// Evaluates path expressions against a bound context node.
///
/// Unlike the other processors this one fails loudly, but only for
/// syntax errors in the expression itself; dynamic evaluation
/// failures still go to the error batch.
#[derive(Debug)]
pub struct PathEvaluator {
    core: ProcessorCore,
    context: SourceBinding,
    namespaces: HashMap<String, String>,
}

impl PathEvaluator {
    pub(crate) fn new(session: Arc<SessionInner>) -> Self {
        PathEvaluator {
            core: ProcessorCore::new(session),
            context: SourceBinding::Unbound,
            namespaces: HashMap::new(),
        }
    }

    // ==================== Inputs ====================

    pub fn set_context_node(&mut self, value: &Value) -> Result<()> {
        self.context = self.core.bind_node(value)?;
        Ok(())
    }

    pub fn set_context_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.context = self.core.bind_file(path.as_ref())?;
        Ok(())
    }

    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.core.ensure_live()?;
        self.namespaces.insert(prefix.to_string(), uri.to_string());
        Ok(())
    }

    /// Bind a variable visible to evaluated expressions.
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

    /// Evaluate an expression. A malformed expression is an
    /// [`Error::Syntax`]; an empty result or a dynamic failure is
    /// `None`, the latter with records in the batch.
    pub fn evaluate(&mut self, expression: &str) -> Result<Option<Value>> {
        self.run(expression).map(|seq| {
            seq.filter(|v: &Value| !v.is_empty())
        })
    }

    /// Evaluate an expression and keep only the first item.
    pub fn evaluate_single(&mut self, expression: &str) -> Result<Option<Value>> {
        Ok(self.evaluate(expression)?.and_then(|value| {
            value
                .head()
                .cloned()
                .map(|item| Value::from_items(vec![item]))
        }))
    }

    /// Effective boolean value of the expression's result. A failed
    /// evaluation is reported as `false` with records in the batch.
    pub fn effective_boolean_value(&mut self, expression: &str) -> Result<bool> {
        self.core.ensure_live()?;
        self.core.diagnostics.clear();
        let program = self.compile(expression)?;
        let Some((doc, root)) = self.core.load_source(&self.context) else {
            return Ok(false);
        };
        let env = self.environment();
        let outcome = self
            .core
            .session
            .with_engine(|_| program.effective_boolean_value(&doc, Some(Item::Node(root)), &env));
        match outcome {
            Ok(b) => Ok(b),
            Err(e) => {
                self.core.record(e.to_string());
                Ok(false)
            }
        }
    }

    fn run(&mut self, expression: &str) -> Result<Option<Value>> {
        self.core.ensure_live()?;
        self.core.diagnostics.clear();
        let program = self.compile(expression)?;
        let Some((doc, root)) = self.core.load_source(&self.context) else {
            return Ok(None);
        };
        let env = self.environment();
        let outcome = self.core.session.with_engine(|engine| {
            engine.evaluate_xpath(&program, &doc, Some(Item::Node(root)), &env)
        });
        match outcome {
            Ok(seq) => Ok(Some(Value::from_sequence(&doc, seq))),
            Err(e) => {
                self.core.record(e.to_string());
                Ok(None)
            }
        }
    }

    fn compile(&mut self, expression: &str) -> Result<xml_engine_core::xpath::XPathProgram> {
        self.core
            .session
            .with_engine(|engine| engine.compile_xpath(expression))
            .map_err(|e| Error::Syntax(e.to_string()))
    }

    fn environment(&self) -> Environment {
        Environment {
            variables: self.core.parameters.clone(),
            namespaces: self.namespaces.clone(),
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
