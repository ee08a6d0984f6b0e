//! Items and sequences produced by evaluation

use crate::tree::{Document, NodeId};

/// A single item in an evaluation result.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Node(NodeId),
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
}

/// An evaluation result: zero or more items in order.
pub type Sequence = Vec<Item>;

impl Item {
    /// String value of the item; nodes take their XPath string value
    /// from the document they live in.
    pub fn string_value(&self, doc: &Document) -> String {
        match self {
            Item::Node(id) => doc.string_value(*id),
            Item::Boolean(b) => b.to_string(),
            Item::Integer(i) => i.to_string(),
            Item::Double(d) => format_double(*d),
            Item::String(s) => s.clone(),
        }
    }

    /// Numeric value, NaN when the item does not look like a number.
    pub fn number_value(&self, doc: &Document) -> f64 {
        match self {
            Item::Integer(i) => *i as f64,
            Item::Double(d) => *d,
            Item::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Item::String(s) => parse_number(s),
            Item::Node(id) => parse_number(&doc.string_value(*id)),
        }
    }
}

/// Serialize a double the XPath way: integral values drop the decimal
/// point, so `6.0` prints as `6`.
pub fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 { "INF".to_string() } else { "-INF".to_string() }
    } else if d.fract() == 0.0 && d.abs() < 1e15 {
        format!("{}", d as i64)
    } else {
        format!("{}", d)
    }
}

fn parse_number(s: &str) -> f64 {
    s.trim().parse().unwrap_or(f64::NAN)
}

/// Effective boolean value of a sequence (XPath rules: empty is false,
/// a leading node is true, singleton atomics coerce by type).
pub fn effective_boolean_value(seq: &[Item], _doc: &Document) -> bool {
    match seq.first() {
        None => false,
        Some(Item::Node(_)) => true,
        Some(first) if seq.len() == 1 => match first {
            Item::Boolean(b) => *b,
            Item::Integer(i) => *i != 0,
            Item::Double(d) => *d != 0.0 && !d.is_nan(),
            Item::String(s) => !s.is_empty(),
            Item::Node(_) => unreachable!(),
        },
        // Multi-item sequence not starting with a node has no EBV; the
        // engine treats it as true rather than raising a type error.
        Some(_) => true,
    }
}

/// String value of a whole sequence: items joined with single spaces.
pub fn sequence_string(seq: &[Item], doc: &Document) -> String {
    seq.iter()
        .map(|i| i.string_value(doc))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_doubles_print_without_point() {
        assert_eq!(format_double(6.0), "6");
        assert_eq!(format_double(2.5), "2.5");
        assert_eq!(format_double(-3.0), "-3");
    }

    #[test]
    fn ebv_rules() {
        let doc = Document::new();
        assert!(!effective_boolean_value(&[], &doc));
        assert!(effective_boolean_value(&[Item::Node(doc.root())], &doc));
        assert!(!effective_boolean_value(&[Item::Double(f64::NAN)], &doc));
        assert!(!effective_boolean_value(&[Item::String(String::new())], &doc));
        assert!(effective_boolean_value(&[Item::Integer(2)], &doc));
    }
}
