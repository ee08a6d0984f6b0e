//! Session acquisition and teardown
//!
//! The engine admits at most one live session per registry. A
//! [`SessionRegistry`] owns the slot; [`Session::acquire`] claims it
//! and [`Session::release`] frees it. Release is idempotent and also
//! runs on drop, so the slot cannot leak. Child processors keep a
//! shared handle to the session's internals and observe its liveness,
//! never extend it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use xml_engine_core::{Engine, Error as EngineError};

use crate::config::{ConfigKey, SessionConfig};
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::processor::{PathEvaluator, QueryRunner, SchemaValidator, Transformer};
use crate::value::{AtomicKind, Value};

/// Owner of the single engine slot.
///
/// Tests create their own registry so they can exercise the
/// acquisition rules without contending on process-wide state;
/// production code normally goes through [`SessionRegistry::global`].
#[derive(Debug, Default)]
pub struct SessionRegistry {
    occupied: Mutex<bool>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The process-wide registry.
    pub fn global() -> &'static Arc<SessionRegistry> {
        static GLOBAL: OnceLock<Arc<SessionRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(SessionRegistry::new)
    }

    fn claim(&self) -> Result<()> {
        let mut occupied = self
            .occupied
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *occupied {
            return Err(Error::License(
                "a live session already holds the engine".to_string(),
            ));
        }
        *occupied = true;
        Ok(())
    }

    fn vacate(&self) {
        let mut occupied = self
            .occupied
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *occupied = false;
    }

    /// True while a session holds the slot.
    pub fn is_occupied(&self) -> bool {
        *self
            .occupied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared state behind a session and its child processors.
#[derive(Debug)]
pub(crate) struct SessionInner {
    registry: Arc<SessionRegistry>,
    live: AtomicBool,
    engine: Mutex<Engine>,
    diagnostics: Mutex<Diagnostics>,
    working_dir: Mutex<Option<PathBuf>>,
    properties: Mutex<BTreeMap<String, String>>,
}

impl SessionInner {
    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.live.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Released)
        }
    }

    /// Run `f` with exclusive engine access.
    pub(crate) fn with_engine<T>(&self, f: impl FnOnce(&Engine) -> T) -> T {
        let engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        f(&engine)
    }

    /// Resolve a path against the working directory when relative.
    pub(crate) fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        let dir = self
            .working_dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match dir.as_ref() {
            Some(base) => base.join(path),
            None => path.to_path_buf(),
        }
    }

    /// Current property map, inherited by new processors.
    pub(crate) fn property_snapshot(&self) -> BTreeMap<String, String> {
        self.properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, message: impl Into<String>) {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(message);
    }
}

/// A live hold on the engine.
///
/// All parsing, value construction and processor creation flows
/// through a session. Releasing invalidates every child created from
/// it; their operations fail with [`Error::Released`] afterwards.
#[derive(Debug)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Claim the registry slot and start an engine with the given
    /// configuration. Fails with [`Error::License`] while another
    /// session is live on the same registry.
    pub fn acquire(registry: &Arc<SessionRegistry>, config: SessionConfig) -> Result<Session> {
        registry.claim()?;
        let mut engine = Engine::new(config.licensed);
        if let Some(v) = config.get(ConfigKey::StripWhitespace) {
            engine.settings_mut().strip_whitespace = v == "true";
        }
        if let Some(v) = config.get(ConfigKey::BaseUri) {
            engine.settings_mut().base_uri = Some(v.to_string());
        }
        let properties = config.property_map();
        Ok(Session {
            inner: Arc::new(SessionInner {
                registry: Arc::clone(registry),
                live: AtomicBool::new(true),
                engine: Mutex::new(engine),
                diagnostics: Mutex::new(Diagnostics::new()),
                working_dir: Mutex::new(config.working_dir),
                properties: Mutex::new(properties),
            }),
        })
    }

    /// Acquire, run `f`, and release on every exit path.
    pub fn scoped<T>(
        registry: &Arc<SessionRegistry>,
        config: SessionConfig,
        f: impl FnOnce(&Session) -> Result<T>,
    ) -> Result<T> {
        let session = Session::acquire(registry, config)?;
        let outcome = f(&session);
        session.release();
        outcome
    }

    /// Free the engine slot. Safe to call more than once; only the
    /// first call has an effect.
    pub fn release(&self) {
        if self.inner.live.swap(false, Ordering::SeqCst) {
            self.inner.registry.vacate();
        }
    }

    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::SeqCst)
    }

    // ==================== Configuration ====================

    /// Set a configuration property on the live session. The change
    /// applies to subsequent operations and to processors created
    /// after it.
    pub fn set_configuration_property(&self, key: &str, value: &str) -> Result<()> {
        self.inner.ensure_live()?;
        let parsed = ConfigKey::parse(key)?;
        parsed.check_value(value)?;
        {
            let mut engine = self
                .inner
                .engine
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match parsed {
                ConfigKey::StripWhitespace => {
                    engine.settings_mut().strip_whitespace = value == "true";
                }
                ConfigKey::BaseUri => {
                    engine.settings_mut().base_uri = Some(value.to_string());
                }
                ConfigKey::XsdVersion => {}
            }
        }
        self.inner
            .properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn set_working_directory(&self, dir: impl Into<PathBuf>) -> Result<()> {
        self.inner.ensure_live()?;
        *self
            .inner
            .working_dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(dir.into());
        Ok(())
    }

    pub fn working_directory(&self) -> Option<PathBuf> {
        self.inner
            .working_dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ==================== Values ====================

    /// Parse markup into a document node value. Parse failures are
    /// both recorded on the session and returned.
    pub fn parse_xml(&self, xml: &str) -> Result<Value> {
        self.inner.ensure_live()?;
        let parsed = self.inner.with_engine(|engine| engine.parse(xml));
        match parsed {
            Ok(doc) => {
                let doc = Arc::new(doc);
                let root = doc.root();
                Ok(Value::node(doc, root))
            }
            Err(e) => {
                self.inner.record(e.to_string());
                Err(Error::Parse(e.to_string()))
            }
        }
    }

    pub fn parse_xml_file(&self, path: impl AsRef<Path>) -> Result<Value> {
        self.inner.ensure_live()?;
        let resolved = self.inner.resolve(path.as_ref());
        let parsed = self.inner.with_engine(|engine| engine.parse_file(&resolved));
        match parsed {
            Ok(doc) => {
                let doc = Arc::new(doc);
                let root = doc.root();
                Ok(Value::node(doc, root))
            }
            Err(e @ EngineError::Io(_)) => {
                self.inner.record(e.to_string());
                Err(Error::Parse(format!("{}: {e}", resolved.display())))
            }
            Err(e) => {
                self.inner.record(e.to_string());
                Err(Error::Parse(e.to_string()))
            }
        }
    }

    /// Build a single-item atomic value, validating the lexical form.
    pub fn make_atomic(&self, kind: AtomicKind, lexical: &str) -> Result<Value> {
        self.inner.ensure_live()?;
        Value::atomic(kind, lexical)
    }

    // ==================== Diagnostics ====================

    pub fn exception_occurred(&self) -> bool {
        self.inner
            .diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .exception_occurred()
    }

    pub fn exception_count(&self) -> usize {
        self.inner
            .diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .exception_count()
    }

    pub fn error_message(&self, index: usize) -> Option<String> {
        self.inner
            .diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .error_message(index)
            .map(str::to_string)
    }

    pub fn clear_diagnostics(&self) {
        self.inner
            .diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    // ==================== Child processors ====================

    pub fn new_transformer(&self) -> Result<Transformer> {
        self.inner.ensure_live()?;
        Ok(Transformer::new(Arc::clone(&self.inner)))
    }

    pub fn new_query_runner(&self) -> Result<QueryRunner> {
        self.inner.ensure_live()?;
        Ok(QueryRunner::new(Arc::clone(&self.inner)))
    }

    pub fn new_path_evaluator(&self) -> Result<PathEvaluator> {
        self.inner.ensure_live()?;
        Ok(PathEvaluator::new(Arc::clone(&self.inner)))
    }

    /// Schema validation is a licensed feature; an unlicensed session
    /// refuses to create a validator.
    pub fn new_schema_validator(&self) -> Result<SchemaValidator> {
        self.inner.ensure_live()?;
        SchemaValidator::new(Arc::clone(&self.inner))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}
