//! xml-session: session and object-lifetime layer over the XML engine
//!
//! The engine admits one live session per process (per registry, for
//! tests). A [`Session`] is acquired with a [`SessionConfig`], hands
//! out child processors and immutable [`Value`]s, and invalidates all
//! of them when released. Engine failures during compilation and
//! invocation are not raised; each processor batches them as
//! [`ErrorRecord`]s queried after the fact.
//!
//! ```rust
//! use xml_session::{Session, SessionConfig, SessionRegistry};
//!
//! let registry = SessionRegistry::new();
//! let output = Session::scoped(&registry, SessionConfig::new(), |session| {
//!     let doc = session.parse_xml("<r><v>7</v></r>")?;
//!     let mut xpath = session.new_path_evaluator()?;
//!     xpath.set_context_node(&doc)?;
//!     Ok(xpath.evaluate("/r/v")?.map(|v| v.string_value()))
//! })
//! .unwrap();
//! assert_eq!(output.as_deref(), Some("7"));
//! ```

mod config;
mod diagnostics;
mod error;
mod processor;
mod session;
mod value;

pub use config::{ConfigKey, SessionConfig};
pub use diagnostics::{Diagnostics, ErrorRecord};
pub use error::{Error, Result};
pub use processor::{PathEvaluator, QueryRunner, SchemaValidator, Transformer};
pub use session::{Session, SessionRegistry};
pub use value::{AtomicKind, AtomicValue, NodeValue, Value, ValueItem};
