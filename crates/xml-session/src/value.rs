//! Immutable value model
//!
//! Values returned from evaluation are sealed sequences of items.
//! Atomic items keep the lexical form they were built from; node items
//! keep a shared handle to their owning document so they stay valid as
//! long as any value refers to it.

use std::fmt;
use std::sync::Arc;

use xml_engine_core::{format_double, Document, Item, NodeId, NodeKind, Sequence};

use crate::error::{Error, Result};

/// Kind tag for atomic items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicKind {
    String,
    Integer,
    Decimal,
    Double,
    Boolean,
}

impl AtomicKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AtomicKind::String => "string",
            AtomicKind::Integer => "integer",
            AtomicKind::Decimal => "decimal",
            AtomicKind::Double => "double",
            AtomicKind::Boolean => "boolean",
        }
    }
}

/// A single typed atomic item with its lexical form.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomicValue {
    kind: AtomicKind,
    lexical: String,
}

impl AtomicValue {
    /// Build an atomic value, checking the lexical form against the kind.
    pub fn new(kind: AtomicKind, lexical: &str) -> Result<Self> {
        let ok = match kind {
            AtomicKind::String => true,
            AtomicKind::Integer => lexical.parse::<i64>().is_ok(),
            AtomicKind::Decimal | AtomicKind::Double => lexical.parse::<f64>().is_ok(),
            AtomicKind::Boolean => matches!(lexical, "true" | "false" | "1" | "0"),
        };
        if !ok {
            return Err(Error::Value(format!(
                "'{}' is not a valid {}",
                lexical,
                kind.as_str()
            )));
        }
        Ok(AtomicValue {
            kind,
            lexical: lexical.to_string(),
        })
    }

    pub fn kind(&self) -> AtomicKind {
        self.kind
    }

    pub fn lexical(&self) -> &str {
        &self.lexical
    }

    pub(crate) fn to_item(&self) -> Item {
        match self.kind {
            AtomicKind::String => Item::String(self.lexical.clone()),
            AtomicKind::Integer => Item::Integer(self.lexical.parse().unwrap_or(0)),
            AtomicKind::Decimal | AtomicKind::Double => {
                Item::Double(self.lexical.parse().unwrap_or(0.0))
            }
            AtomicKind::Boolean => Item::Boolean(matches!(self.lexical.as_str(), "true" | "1")),
        }
    }
}

impl fmt::Display for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AtomicKind::Boolean => {
                f.write_str(if matches!(self.lexical.as_str(), "true" | "1") {
                    "true"
                } else {
                    "false"
                })
            }
            _ => f.write_str(&self.lexical),
        }
    }
}

/// A node item bound to its owning document.
#[derive(Debug, Clone)]
pub struct NodeValue {
    doc: Arc<Document>,
    node: NodeId,
}

impl NodeValue {
    pub(crate) fn new(doc: Arc<Document>, node: NodeId) -> Self {
        NodeValue { doc, node }
    }

    pub fn name(&self) -> &str {
        self.doc.name(self.node)
    }

    pub fn kind(&self) -> NodeKind {
        self.doc.kind(self.node)
    }

    pub fn string_value(&self) -> String {
        self.doc.string_value(self.node)
    }

    /// Child nodes, each sharing this node's document handle.
    pub fn children(&self) -> Vec<NodeValue> {
        self.doc
            .children(self.node)
            .iter()
            .map(|&child| NodeValue::new(Arc::clone(&self.doc), child))
            .collect()
    }

    /// Attribute name/value pairs in document order.
    pub fn attributes(&self) -> &[(String, String)] {
        self.doc.attributes(self.node)
    }

    /// Serialized markup for this node.
    pub fn to_xml(&self) -> String {
        self.doc.serialize(self.node)
    }

    pub(crate) fn document(&self) -> &Arc<Document> {
        &self.doc
    }

    pub(crate) fn node_id(&self) -> NodeId {
        self.node
    }
}

/// One item of a value sequence.
#[derive(Debug, Clone)]
pub enum ValueItem {
    Atomic(AtomicValue),
    Node(NodeValue),
}

impl ValueItem {
    pub fn string_value(&self) -> String {
        match self {
            ValueItem::Atomic(a) => a.to_string(),
            ValueItem::Node(n) => n.string_value(),
        }
    }
}

/// An immutable, possibly empty sequence of items.
#[derive(Debug, Clone, Default)]
pub struct Value {
    items: Vec<ValueItem>,
}

impl Value {
    pub(crate) fn from_items(items: Vec<ValueItem>) -> Self {
        Value { items }
    }

    /// Wrap a single atomic item.
    pub fn atomic(kind: AtomicKind, lexical: &str) -> Result<Self> {
        Ok(Value {
            items: vec![ValueItem::Atomic(AtomicValue::new(kind, lexical)?)],
        })
    }

    pub(crate) fn node(doc: Arc<Document>, node: NodeId) -> Self {
        Value {
            items: vec![ValueItem::Node(NodeValue::new(doc, node))],
        }
    }

    /// Convert an evaluation result, binding node items to `doc`.
    pub(crate) fn from_sequence(doc: &Arc<Document>, seq: Sequence) -> Self {
        let items = seq
            .into_iter()
            .map(|item| match item {
                Item::Node(id) => ValueItem::Node(NodeValue::new(Arc::clone(doc), id)),
                Item::Boolean(b) => ValueItem::Atomic(AtomicValue {
                    kind: AtomicKind::Boolean,
                    lexical: b.to_string(),
                }),
                Item::Integer(i) => ValueItem::Atomic(AtomicValue {
                    kind: AtomicKind::Integer,
                    lexical: i.to_string(),
                }),
                Item::Double(d) => ValueItem::Atomic(AtomicValue {
                    kind: AtomicKind::Double,
                    lexical: format_double(d),
                }),
                Item::String(s) => ValueItem::Atomic(AtomicValue {
                    kind: AtomicKind::String,
                    lexical: s,
                }),
            })
            .collect();
        Value { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[ValueItem] {
        &self.items
    }

    /// First item, if any.
    pub fn head(&self) -> Option<&ValueItem> {
        self.items.first()
    }

    /// Space-joined string values of all items.
    pub fn string_value(&self) -> String {
        self.items
            .iter()
            .map(ValueItem::string_value)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Engine items for passing back as parameters.
    pub(crate) fn to_sequence(&self) -> Sequence {
        self.items
            .iter()
            .map(|item| match item {
                ValueItem::Atomic(a) => a.to_item(),
                // Nodes from another document pass by string value.
                ValueItem::Node(n) => Item::String(n.string_value()),
            })
            .collect()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_validation() {
        assert!(AtomicValue::new(AtomicKind::Integer, "42").is_ok());
        assert!(AtomicValue::new(AtomicKind::Integer, "4.2").is_err());
        assert!(AtomicValue::new(AtomicKind::Boolean, "maybe").is_err());
        assert!(AtomicValue::new(AtomicKind::Double, "1.5e3").is_ok());
    }

    #[test]
    fn boolean_display_normalizes() {
        let v = AtomicValue::new(AtomicKind::Boolean, "1").unwrap();
        assert_eq!(v.to_string(), "true");
    }

    #[test]
    fn sequence_string_value() {
        let value = Value::from_items(vec![
            ValueItem::Atomic(AtomicValue::new(AtomicKind::Integer, "2").unwrap()),
            ValueItem::Atomic(AtomicValue::new(AtomicKind::Integer, "3").unwrap()),
        ]);
        assert_eq!(value.string_value(), "2 3");
        assert_eq!(value.len(), 2);
    }
}
