//! Child processors
//!
//! Each processor is created from a live session and borrows its
//! liveness: once the session is released, every operation on the
//! processor fails with `Error::Released`. Processors never hold the
//! engine between calls; each invocation locks it for its duration.

mod path;
mod query;
mod transform;
mod validate;

pub use path::PathEvaluator;
pub use query::QueryRunner;
pub use transform::Transformer;
pub use validate::SchemaValidator;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use xml_engine_core::{Document, NodeId, Sequence};

use crate::config::ConfigKey;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::session::SessionInner;
use crate::value::{Value, ValueItem};

/// Where a processor reads its input document from.
#[derive(Debug, Clone, Default)]
pub(crate) enum SourceBinding {
    #[default]
    Unbound,
    Node(Arc<Document>, NodeId),
    File(PathBuf),
}

/// State shared by every processor kind: the session handle, the
/// per-processor error batch, properties with their session-inherited
/// defaults, and parameters.
#[derive(Debug)]
pub(crate) struct ProcessorCore {
    pub(crate) session: Arc<SessionInner>,
    pub(crate) diagnostics: Diagnostics,
    properties: BTreeMap<String, String>,
    default_properties: BTreeMap<String, String>,
    pub(crate) parameters: HashMap<String, Sequence>,
}

impl ProcessorCore {
    pub(crate) fn new(session: Arc<SessionInner>) -> Self {
        let defaults = session.property_snapshot();
        ProcessorCore {
            session,
            diagnostics: Diagnostics::new(),
            properties: defaults.clone(),
            default_properties: defaults,
            parameters: HashMap::new(),
        }
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        self.session.ensure_live()
    }

    pub(crate) fn record(&mut self, message: impl Into<String>) {
        self.diagnostics.record(message);
    }

    pub(crate) fn set_property(&mut self, key: &str, value: &str) -> Result<()> {
        self.ensure_live()?;
        let parsed = ConfigKey::parse(key)?;
        parsed.check_value(value)?;
        self.properties.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub(crate) fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Reset properties to the values inherited from the session at
    /// creation time, not to an empty map.
    pub(crate) fn clear_properties(&mut self) {
        self.properties = self.default_properties.clone();
    }

    pub(crate) fn set_parameter(&mut self, name: &str, value: &Value) -> Result<()> {
        self.ensure_live()?;
        self.parameters.insert(name.to_string(), value.to_sequence());
        Ok(())
    }

    pub(crate) fn clear_parameters(&mut self) {
        self.parameters.clear();
    }

    /// Bind a node value as a source. Rejects atomic-only values.
    pub(crate) fn bind_node(&mut self, value: &Value) -> Result<SourceBinding> {
        self.ensure_live()?;
        match value.head() {
            Some(ValueItem::Node(node)) => Ok(SourceBinding::Node(
                Arc::clone(node.document()),
                node.node_id(),
            )),
            _ => Err(Error::Value(
                "a node value is required as the source".to_string(),
            )),
        }
    }

    pub(crate) fn bind_file(&mut self, path: &Path) -> Result<SourceBinding> {
        self.ensure_live()?;
        Ok(SourceBinding::File(self.session.resolve(path)))
    }

    /// Materialize the bound source. Load failures are recorded and
    /// yield `None` so the invocation can report through the batch.
    pub(crate) fn load_source(
        &mut self,
        binding: &SourceBinding,
    ) -> Option<(Arc<Document>, NodeId)> {
        match binding {
            SourceBinding::Unbound => {
                self.record("no source document supplied");
                None
            }
            SourceBinding::Node(doc, node) => Some((Arc::clone(doc), *node)),
            SourceBinding::File(path) => {
                let parsed = self.session.with_engine(|engine| engine.parse_file(path));
                match parsed {
                    Ok(doc) => {
                        let doc = Arc::new(doc);
                        let root = doc.root();
                        Some((doc, root))
                    }
                    Err(e) => {
                        self.record(format!("{}: {e}", path.display()));
                        None
                    }
                }
            }
        }
    }

    // Diagnostics pass-throughs shared by all processor kinds.

    pub(crate) fn exception_occurred(&self) -> bool {
        self.diagnostics.exception_occurred()
    }

    pub(crate) fn exception_count(&self) -> usize {
        self.diagnostics.exception_count()
    }

    pub(crate) fn error_message(&self, index: usize) -> Option<&str> {
        self.diagnostics.error_message(index)
    }
}
