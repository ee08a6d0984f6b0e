//! XPath compilation and evaluation
//!
//! The subset covers the path language, general comparisons,
//! arithmetic, sequences, variables, `for` expressions and the core
//! function library. Compilation and evaluation are split so that a
//! compiled expression can be invoked repeatedly against different
//! context items.

mod eval;
mod lexer;
mod parser;

pub use eval::{Environment, Focus};

use crate::error::Result;
use crate::item::{effective_boolean_value, Item, Sequence};
use crate::tree::Document;

/// A compiled XPath expression.
#[derive(Debug, Clone)]
pub struct XPathProgram {
    expr: parser::Expr,
    source: String,
}

/// Compile an XPath expression.
pub fn compile(expression: &str) -> Result<XPathProgram> {
    let expr = parser::parse(expression)?;
    Ok(XPathProgram {
        expr,
        source: expression.to_string(),
    })
}

impl XPathProgram {
    /// The expression text this program was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against a context item (the document node when absent).
    pub fn evaluate(
        &self,
        doc: &Document,
        context: Option<Item>,
        env: &Environment,
    ) -> Result<Sequence> {
        let focus = Focus::item(context.unwrap_or(Item::Node(doc.root())));
        eval::Evaluator::new(doc, env).eval(&self.expr, &focus)
    }

    /// Effective boolean value of the evaluation result.
    pub fn effective_boolean_value(
        &self,
        doc: &Document,
        context: Option<Item>,
        env: &Environment,
    ) -> Result<bool> {
        let seq = self.evaluate(doc, context, env)?;
        Ok(effective_boolean_value(&seq, doc))
    }
}

/// One-shot convenience: compile and evaluate in a single call.
pub fn evaluate(
    expression: &str,
    doc: &Document,
    context: Option<Item>,
    env: &Environment,
) -> Result<Sequence> {
    compile(expression)?.evaluate(doc, context, env)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person_doc() -> Document {
        Document::parse(
            "<out><person>text1</person><person>text2</person><person>text3</person></out>",
        )
        .unwrap()
    }

    #[test]
    fn count_persons() {
        let doc = person_doc();
        let env = Environment::default();
        let result = evaluate("count(//person)", &doc, None, &env).unwrap();
        assert_eq!(result, vec![Item::Integer(3)]);
    }

    #[test]
    fn count_comparison_is_true() {
        let doc = person_doc();
        let env = Environment::default();
        let program = compile("count(//person) = 3").unwrap();
        assert!(program.effective_boolean_value(&doc, None, &env).unwrap());
    }

    #[test]
    fn text_comparison_is_false() {
        let doc = person_doc();
        let env = Environment::default();
        let program = compile("/out/person/text() = 'text'").unwrap();
        assert!(!program.effective_boolean_value(&doc, None, &env).unwrap());
    }

    #[test]
    fn positional_predicate_selects_first() {
        let doc = person_doc();
        let env = Environment::default();
        let result = evaluate("/out/person[1]/text()", &doc, None, &env).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].string_value(&doc), "text1");
    }

    #[test]
    fn variable_sequence_arithmetic() {
        let doc = person_doc();
        let mut env = Environment::default();
        env.variables.insert(
            "values".to_string(),
            vec![Item::Integer(2), Item::Integer(3), Item::Integer(4)],
        );
        let result = evaluate("for $v in $values return $v * 3", &doc, None, &env).unwrap();
        assert_eq!(
            result,
            vec![Item::Integer(6), Item::Integer(9), Item::Integer(12)]
        );
    }

    #[test]
    fn context_item_arithmetic() {
        let doc = person_doc();
        let env = Environment::default();
        let result = evaluate(". * 3", &doc, Some(Item::Integer(2)), &env).unwrap();
        assert_eq!(result, vec![Item::Integer(6)]);
    }

    #[test]
    fn descendant_nodes_in_document_order() {
        let doc = person_doc();
        let env = Environment::default();
        let result = evaluate("//person", &doc, None, &env).unwrap();
        let texts: Vec<_> = result.iter().map(|i| i.string_value(&doc)).collect();
        assert_eq!(texts, ["text1", "text2", "text3"]);
    }

    #[test]
    fn attribute_step_returns_values() {
        let doc = Document::parse(r#"<r><i id="1"/><i id="2"/></r>"#).unwrap();
        let env = Environment::default();
        let result = evaluate("for $i in //i return $i/@id", &doc, None, &env).unwrap();
        assert_eq!(
            result,
            vec![Item::String("1".into()), Item::String("2".into())]
        );
    }

    #[test]
    fn child_node_count_includes_comments() {
        let doc = Document::parse("<Family><!--a--><!--b--><Pet>x</Pet></Family>").unwrap();
        let env = Environment::default();
        let root = doc.root_element().unwrap();
        let result = evaluate(
            "count(child::node())",
            &doc,
            Some(Item::Node(root)),
            &env,
        )
        .unwrap();
        assert_eq!(result, vec![Item::Integer(3)]);
    }

    #[test]
    fn union_merges_in_document_order() {
        let doc = Document::parse("<r><a/><b/><c/></r>").unwrap();
        let env = Environment::default();
        let result = evaluate("//c | //a", &doc, None, &env).unwrap();
        let names: Vec<_> = result
            .iter()
            .map(|i| match i {
                Item::Node(id) => doc.name(*id).to_string(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(names, ["a", "c"]);
    }

    #[test]
    fn empty_sequence_arithmetic_is_empty() {
        let doc = person_doc();
        let env = Environment::default();
        let result = evaluate("/out/missing * 3", &doc, None, &env).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn integer_overflow_widens_to_double() {
        let doc = person_doc();
        let mut env = Environment::default();
        env.variables
            .insert("big".to_string(), vec![Item::Integer(i64::MAX)]);
        let result = evaluate("$big + 1", &doc, None, &env).unwrap();
        assert_eq!(result, vec![Item::Double(i64::MAX as f64 + 1.0)]);
        let result = evaluate("$big * 2", &doc, None, &env).unwrap();
        assert_eq!(result, vec![Item::Double(i64::MAX as f64 * 2.0)]);
    }

    #[test]
    fn negating_the_minimum_integer_widens_to_double() {
        let doc = person_doc();
        let mut env = Environment::default();
        env.variables
            .insert("min".to_string(), vec![Item::Integer(i64::MIN)]);
        let result = evaluate("-$min", &doc, None, &env).unwrap();
        assert_eq!(result, vec![Item::Double(-(i64::MIN as f64))]);
    }

    #[test]
    fn syntax_error_reported_at_compile() {
        assert!(compile("//[invalid").is_err());
    }

    #[test]
    fn undeclared_variable_fails_at_eval() {
        let doc = person_doc();
        let env = Environment::default();
        assert!(evaluate("$missing", &doc, None, &env).is_err());
    }
}
