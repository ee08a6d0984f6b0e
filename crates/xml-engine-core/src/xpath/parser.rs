//! XPath expression parser
//!
//! Recursive descent over the token stream, producing the AST the
//! evaluator walks. Covers the path language, general comparisons,
//! arithmetic, sequences, variables, `for` expressions and the core
//! function library.

use crate::error::{Error, Result};
use crate::xpath::lexer::{tokenize, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Attribute,
}

impl Axis {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "child" => Some(Axis::Child),
            "descendant" => Some(Axis::Descendant),
            "descendant-or-self" => Some(Axis::DescendantOrSelf),
            "self" => Some(Axis::SelfAxis),
            "parent" => Some(Axis::Parent),
            "attribute" => Some(Axis::Attribute),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    /// Name test, with an optional namespace prefix.
    Name(Option<String>, String),
    AnyName,
    Text,
    AnyNode,
    Comment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CompOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    /// Comma sequence: `(2, 3, 4)`.
    Sequence(Vec<Expr>),
    StringLit(String),
    IntegerLit(i64),
    DoubleLit(f64),
    Var(String),
    ContextItem,
    /// `start` is None for relative paths, Some(expr) for a filter
    /// start (`$v/x`, `(...)/x`); absolute paths use `Root`.
    Path {
        start: PathStart,
        steps: Vec<Step>,
    },
    Call(String, Vec<Expr>),
    For {
        var: String,
        source: Box<Expr>,
        body: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathStart {
    /// Starts at the document node (`/a/b`).
    Root,
    /// Starts at the context item (`a/b`).
    Context,
    /// Starts at the result of a primary expression (`$v/x`).
    Expr(Box<Expr>),
}

pub fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        input,
    };
    let expr = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(Error::XPathSyntax(format!(
            "trailing tokens after expression in '{input}'"
        )));
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    input: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {expected:?}")))
        }
    }

    fn unexpected(&self, what: &str) -> Error {
        Error::XPathSyntax(format!(
            "{} at token {:?} in '{}'",
            what,
            self.peek(),
            self.input
        ))
    }

    // Expr := ExprSingle ("," ExprSingle)*
    fn parse_expr(&mut self) -> Result<Expr> {
        let first = self.parse_expr_single()?;
        if self.peek() != Some(&Token::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            items.push(self.parse_expr_single()?);
        }
        Ok(Expr::Sequence(items))
    }

    fn parse_expr_single(&mut self) -> Result<Expr> {
        if let Some(Token::Name(name)) = self.peek() {
            if name == "for" && matches!(self.peek_at(1), Some(Token::Variable(_))) {
                return self.parse_for();
            }
        }
        self.parse_or()
    }

    fn parse_for(&mut self) -> Result<Expr> {
        self.bump(); // "for"
        let var = match self.bump() {
            Some(Token::Variable(name)) => name,
            _ => return Err(self.unexpected("expected variable in 'for'")),
        };
        match self.bump() {
            Some(Token::Name(kw)) if kw == "in" => {}
            _ => return Err(self.unexpected("expected 'in' in 'for'")),
        }
        let source = self.parse_expr_single()?;
        match self.bump() {
            Some(Token::Name(kw)) if kw == "return" => {}
            _ => return Err(self.unexpected("expected 'return' in 'for'")),
        }
        let body = self.parse_expr_single()?;
        Ok(Expr::For {
            var,
            source: Box::new(source),
            body: Box::new(body),
        })
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Operator("or")) {
            self.bump();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_comparison()?;
        while self.peek() == Some(&Token::Operator("and")) {
            self.bump();
            let right = self.parse_comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::Eq) => CompOp::Eq,
            Some(Token::NotEq) => CompOp::NotEq,
            Some(Token::Lt) => CompOp::Lt,
            Some(Token::LtEq) => CompOp::LtEq,
            Some(Token::Gt) => CompOp::Gt,
            Some(Token::GtEq) => CompOp::GtEq,
            _ => return Ok(left),
        };
        self.bump();
        let right = self.parse_additive()?;
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => break,
            };
            self.bump();
            let right = self.parse_multiplicative()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Operator("*")) => ArithOp::Mul,
                Some(Token::Operator("div")) => ArithOp::Div,
                Some(Token::Operator("mod")) => ArithOp::Mod,
                _ => break,
            };
            self.bump();
            let right = self.parse_unary()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(operand)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> Result<Expr> {
        let mut left = self.parse_path()?;
        while self.eat(&Token::Pipe) {
            let right = self.parse_path()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_path(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Slash) => {
                self.bump();
                if self.starts_step() {
                    let steps = self.parse_steps()?;
                    Ok(Expr::Path {
                        start: PathStart::Root,
                        steps,
                    })
                } else {
                    Ok(Expr::Path {
                        start: PathStart::Root,
                        steps: Vec::new(),
                    })
                }
            }
            Some(Token::DoubleSlash) => {
                self.bump();
                let mut steps = vec![descendant_or_self_step()];
                steps.extend(self.parse_steps()?);
                Ok(Expr::Path {
                    start: PathStart::Root,
                    steps,
                })
            }
            _ => {
                let primary = self.parse_primary_or_step()?;
                match self.peek() {
                    Some(Token::Slash) | Some(Token::DoubleSlash) => {
                        let mut steps = Vec::new();
                        let start = match primary {
                            Primary::Step(step) => {
                                steps.push(step);
                                PathStart::Context
                            }
                            Primary::Expr(expr) => PathStart::Expr(Box::new(expr)),
                        };
                        loop {
                            match self.peek() {
                                Some(Token::Slash) => {
                                    self.bump();
                                    steps.push(self.parse_step()?);
                                }
                                Some(Token::DoubleSlash) => {
                                    self.bump();
                                    steps.push(descendant_or_self_step());
                                    steps.push(self.parse_step()?);
                                }
                                _ => break,
                            }
                        }
                        Ok(Expr::Path { start, steps })
                    }
                    _ => Ok(match primary {
                        Primary::Step(step) => Expr::Path {
                            start: PathStart::Context,
                            steps: vec![step],
                        },
                        Primary::Expr(expr) => expr,
                    }),
                }
            }
        }
    }

    fn parse_steps(&mut self) -> Result<Vec<Step>> {
        let mut steps = vec![self.parse_step()?];
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.bump();
                    steps.push(self.parse_step()?);
                }
                Some(Token::DoubleSlash) => {
                    self.bump();
                    steps.push(descendant_or_self_step());
                    steps.push(self.parse_step()?);
                }
                _ => break,
            }
        }
        Ok(steps)
    }

    /// Is the upcoming token a legal start of an axis step?
    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Name(_) | Token::Star | Token::At | Token::Dot | Token::DotDot)
        )
    }

    fn parse_step(&mut self) -> Result<Step> {
        match self.peek() {
            Some(Token::Dot) => {
                self.bump();
                Ok(Step {
                    axis: Axis::SelfAxis,
                    test: NodeTest::AnyNode,
                    predicates: self.parse_predicates()?,
                })
            }
            Some(Token::DotDot) => {
                self.bump();
                Ok(Step {
                    axis: Axis::Parent,
                    test: NodeTest::AnyNode,
                    predicates: self.parse_predicates()?,
                })
            }
            Some(Token::At) => {
                self.bump();
                let test = self.parse_node_test()?;
                Ok(Step {
                    axis: Axis::Attribute,
                    test,
                    predicates: self.parse_predicates()?,
                })
            }
            Some(Token::Name(name)) if self.peek_at(1) == Some(&Token::DoubleColon) => {
                let axis = Axis::parse(name)
                    .ok_or_else(|| Error::XPathSyntax(format!("unknown axis '{name}'")))?;
                self.bump();
                self.bump();
                let test = self.parse_node_test()?;
                Ok(Step {
                    axis,
                    test,
                    predicates: self.parse_predicates()?,
                })
            }
            _ => {
                let test = self.parse_node_test()?;
                Ok(Step {
                    axis: Axis::Child,
                    test,
                    predicates: self.parse_predicates()?,
                })
            }
        }
    }

    fn parse_node_test(&mut self) -> Result<NodeTest> {
        match self.bump() {
            Some(Token::Star) => Ok(NodeTest::AnyName),
            Some(Token::Name(name)) => {
                // Node-kind tests look like zero-argument calls.
                if self.peek() == Some(&Token::LParen) {
                    let kind = match name.as_str() {
                        "text" => Some(NodeTest::Text),
                        "node" => Some(NodeTest::AnyNode),
                        "comment" => Some(NodeTest::Comment),
                        _ => None,
                    };
                    if let Some(kind) = kind {
                        self.bump();
                        self.expect(&Token::RParen)?;
                        return Ok(kind);
                    }
                    return Err(self.unexpected(&format!("unknown node test '{name}()'")));
                }
                match name.split_once(':') {
                    Some((prefix, local)) => Ok(NodeTest::Name(
                        Some(prefix.to_string()),
                        local.to_string(),
                    )),
                    None => Ok(NodeTest::Name(None, name)),
                }
            }
            _ => Err(self.unexpected("expected node test")),
        }
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.parse_expr()?);
            self.expect(&Token::RBracket)?;
        }
        Ok(predicates)
    }

    fn parse_primary_or_step(&mut self) -> Result<Primary> {
        match self.peek() {
            // A lone `.` is the context item, which may be atomic; it
            // only acts as an axis step when a path or predicate
            // follows.
            Some(Token::Dot)
                if !matches!(
                    self.peek_at(1),
                    Some(Token::Slash | Token::DoubleSlash | Token::LBracket)
                ) =>
            {
                self.bump();
                Ok(Primary::Expr(Expr::ContextItem))
            }
            Some(Token::Integer(i)) => {
                let i = *i;
                self.bump();
                Ok(Primary::Expr(Expr::IntegerLit(i)))
            }
            Some(Token::Number(d)) => {
                let d = *d;
                self.bump();
                Ok(Primary::Expr(Expr::DoubleLit(d)))
            }
            Some(Token::Literal(s)) => {
                let s = s.clone();
                self.bump();
                Ok(Primary::Expr(Expr::StringLit(s)))
            }
            Some(Token::Variable(name)) => {
                let name = name.clone();
                self.bump();
                Ok(Primary::Expr(Expr::Var(name)))
            }
            Some(Token::LParen) => {
                self.bump();
                if self.eat(&Token::RParen) {
                    return Ok(Primary::Expr(Expr::Sequence(Vec::new())));
                }
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(Primary::Expr(inner))
            }
            Some(Token::Name(name)) if self.is_function_call(name) => {
                let name = name.clone();
                self.bump();
                self.expect(&Token::LParen)?;
                let mut args = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    args.push(self.parse_expr_single()?);
                    while self.eat(&Token::Comma) {
                        args.push(self.parse_expr_single()?);
                    }
                }
                self.expect(&Token::RParen)?;
                Ok(Primary::Expr(Expr::Call(name, args)))
            }
            _ => Ok(Primary::Step(self.parse_step()?)),
        }
    }

    /// A name followed by `(` is a function call unless it is a
    /// node-kind test.
    fn is_function_call(&self, name: &str) -> bool {
        self.peek_at(1) == Some(&Token::LParen)
            && !matches!(name, "text" | "node" | "comment")
    }
}

enum Primary {
    Step(Step),
    Expr(Expr),
}

fn descendant_or_self_step() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::AnyNode,
        predicates: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_absolute_path() {
        let expr = parse("/out/person").unwrap();
        match expr {
            Expr::Path { start, steps } => {
                assert_eq!(start, PathStart::Root);
                assert_eq!(steps.len(), 2);
            }
            other => panic!("unexpected AST: {other:?}"),
        }
    }

    #[test]
    fn parses_descendant_shorthand() {
        let expr = parse("//person").unwrap();
        match expr {
            Expr::Path { steps, .. } => {
                assert_eq!(steps.len(), 2);
                assert_eq!(steps[0].axis, Axis::DescendantOrSelf);
            }
            other => panic!("unexpected AST: {other:?}"),
        }
    }

    #[test]
    fn parses_comparison_over_count() {
        let expr = parse("count(//person) = 3").unwrap();
        assert!(matches!(expr, Expr::Compare(CompOp::Eq, _, _)));
    }

    #[test]
    fn parses_sequence_literal() {
        let expr = parse("(2, 3, 4)").unwrap();
        match expr {
            Expr::Sequence(items) => assert_eq!(items.len(), 3),
            other => panic!("unexpected AST: {other:?}"),
        }
    }

    #[test]
    fn parses_context_arithmetic() {
        let expr = parse(". * 3").unwrap();
        assert!(matches!(expr, Expr::Arith(ArithOp::Mul, _, _)));
    }

    #[test]
    fn parses_for_expression() {
        let expr = parse("for $i in //item return $i/@id").unwrap();
        assert!(matches!(expr, Expr::For { .. }));
    }

    #[test]
    fn parses_predicate_position() {
        let expr = parse("/out/person[1]/text()").unwrap();
        match expr {
            Expr::Path { steps, .. } => {
                assert_eq!(steps[1].predicates.len(), 1);
                assert_eq!(steps[2].test, NodeTest::Text);
            }
            other => panic!("unexpected AST: {other:?}"),
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("//[invalid").is_err());
        assert!(parse("count(").is_err());
        assert!(parse("a b").is_err());
    }
}
