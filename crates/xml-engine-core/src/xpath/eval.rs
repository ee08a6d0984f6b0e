//! XPath evaluator
//!
//! Walks the parsed AST against an arena document. Sequences keep
//! document order; node results of a step are sorted and deduplicated
//! by node id, which is document order by construction of the arena.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::item::{effective_boolean_value, Item, Sequence};
use crate::tree::{Document, NodeId, NodeKind};
use crate::xpath::parser::{ArithOp, Axis, CompOp, Expr, NodeTest, PathStart, Step};

/// Static bindings available during evaluation: variables and
/// namespace declarations.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub variables: HashMap<String, Sequence>,
    pub namespaces: HashMap<String, String>,
}

pub struct Evaluator<'a> {
    doc: &'a Document,
    env: &'a Environment,
    /// `for` bindings layered over the environment variables.
    locals: HashMap<String, Sequence>,
}

/// Focus of the evaluation: context item plus position and size.
#[derive(Debug, Clone)]
pub struct Focus {
    pub item: Item,
    pub position: usize,
    pub size: usize,
}

impl Focus {
    pub fn node(id: NodeId) -> Self {
        Self {
            item: Item::Node(id),
            position: 1,
            size: 1,
        }
    }

    pub fn item(item: Item) -> Self {
        Self {
            item,
            position: 1,
            size: 1,
        }
    }
}

impl<'a> Evaluator<'a> {
    pub fn new(doc: &'a Document, env: &'a Environment) -> Self {
        Self {
            doc,
            env,
            locals: HashMap::new(),
        }
    }

    pub fn eval(&mut self, expr: &Expr, focus: &Focus) -> Result<Sequence> {
        match expr {
            Expr::StringLit(s) => Ok(vec![Item::String(s.clone())]),
            Expr::IntegerLit(i) => Ok(vec![Item::Integer(*i)]),
            Expr::DoubleLit(d) => Ok(vec![Item::Double(*d)]),
            Expr::ContextItem => Ok(vec![focus.item.clone()]),
            Expr::Var(name) => self
                .locals
                .get(name)
                .or_else(|| self.env.variables.get(name))
                .cloned()
                .ok_or_else(|| Error::XPathEval(format!("undeclared variable ${name}"))),
            Expr::Sequence(items) => {
                let mut out = Vec::new();
                for item in items {
                    out.extend(self.eval(item, focus)?);
                }
                Ok(out)
            }
            Expr::Or(left, right) => {
                let value = self.ebv(left, focus)? || self.ebv(right, focus)?;
                Ok(vec![Item::Boolean(value)])
            }
            Expr::And(left, right) => {
                let value = self.ebv(left, focus)? && self.ebv(right, focus)?;
                Ok(vec![Item::Boolean(value)])
            }
            Expr::Compare(op, left, right) => {
                let left = self.eval(left, focus)?;
                let right = self.eval(right, focus)?;
                Ok(vec![Item::Boolean(self.general_compare(*op, &left, &right))])
            }
            Expr::Arith(op, left, right) => {
                let left = self.eval(left, focus)?;
                let right = self.eval(right, focus)?;
                self.arith(*op, &left, &right)
            }
            Expr::Neg(operand) => {
                let seq = self.eval(operand, focus)?;
                match seq.as_slice() {
                    [] => Ok(vec![]),
                    [Item::Integer(i)] => Ok(vec![match i.checked_neg() {
                        Some(n) => Item::Integer(n),
                        None => Item::Double(-(*i as f64)),
                    }]),
                    [item] => Ok(vec![Item::Double(-item.number_value(self.doc))]),
                    _ => Err(Error::XPathEval(
                        "unary minus over a multi-item sequence".to_string(),
                    )),
                }
            }
            Expr::Union(left, right) => {
                let mut nodes = self.node_sequence(left, focus)?;
                nodes.extend(self.node_sequence(right, focus)?);
                nodes.sort();
                nodes.dedup();
                Ok(nodes.into_iter().map(Item::Node).collect())
            }
            Expr::Path { start, steps } => self.eval_path(start, steps, focus),
            Expr::Call(name, args) => self.call(name, args, focus),
            Expr::For { var, source, body } => {
                let source = self.eval(source, focus)?;
                let shadowed = self.locals.remove(var);
                let mut out = Vec::new();
                for item in source {
                    self.locals.insert(var.clone(), vec![item]);
                    out.extend(self.eval(body, focus)?);
                }
                match shadowed {
                    Some(seq) => {
                        self.locals.insert(var.clone(), seq);
                    }
                    None => {
                        self.locals.remove(var);
                    }
                }
                Ok(out)
            }
        }
    }

    pub fn ebv(&mut self, expr: &Expr, focus: &Focus) -> Result<bool> {
        let seq = self.eval(expr, focus)?;
        Ok(effective_boolean_value(&seq, self.doc))
    }

    fn node_sequence(&mut self, expr: &Expr, focus: &Focus) -> Result<Vec<NodeId>> {
        self.eval(expr, focus)?
            .into_iter()
            .map(|item| match item {
                Item::Node(id) => Ok(id),
                other => Err(Error::XPathEval(format!(
                    "expected nodes in union, found {other:?}"
                ))),
            })
            .collect()
    }

    // ==================== Paths ====================

    fn eval_path(&mut self, start: &PathStart, steps: &[Step], focus: &Focus) -> Result<Sequence> {
        let mut current: Sequence = match start {
            PathStart::Root => vec![Item::Node(self.doc.root())],
            PathStart::Context => vec![focus.item.clone()],
            PathStart::Expr(expr) => self.eval(expr, focus)?,
        };
        for step in steps {
            current = self.eval_step(step, &current)?;
        }
        Ok(current)
    }

    fn eval_step(&mut self, step: &Step, input: &[Item]) -> Result<Sequence> {
        let mut out: Sequence = Vec::new();
        for item in input {
            let node = match item {
                Item::Node(id) => *id,
                other => {
                    return Err(Error::XPathEval(format!(
                        "path step applied to atomic value {other:?}"
                    )))
                }
            };
            let mut candidates = self.axis_candidates(step, node);
            for predicate in &step.predicates {
                candidates = self.filter_predicate(predicate, candidates)?;
            }
            out.extend(candidates);
        }
        // Node-only results are reordered to document order.
        if out.iter().all(|i| matches!(i, Item::Node(_))) {
            let mut ids: Vec<NodeId> = out
                .iter()
                .map(|i| match i {
                    Item::Node(id) => *id,
                    _ => unreachable!(),
                })
                .collect();
            ids.sort();
            ids.dedup();
            out = ids.into_iter().map(Item::Node).collect();
        }
        Ok(out)
    }

    fn axis_candidates(&self, step: &Step, node: NodeId) -> Sequence {
        if step.axis == Axis::Attribute {
            return self
                .doc
                .attributes(node)
                .iter()
                .filter(|(name, _)| match &step.test {
                    NodeTest::AnyName | NodeTest::AnyNode => true,
                    NodeTest::Name(_, local) => {
                        name == local || name.rsplit(':').next() == Some(local)
                    }
                    _ => false,
                })
                .map(|(_, value)| Item::String(value.clone()))
                .collect();
        }

        let nodes: Vec<NodeId> = match step.axis {
            Axis::Child => self.doc.children(node).to_vec(),
            Axis::Descendant => self.doc.descendants(node),
            Axis::DescendantOrSelf => {
                let mut all = vec![node];
                all.extend(self.doc.descendants(node));
                all
            }
            Axis::SelfAxis => vec![node],
            Axis::Parent => self.doc.parent(node).into_iter().collect(),
            Axis::Attribute => unreachable!(),
        };

        nodes
            .into_iter()
            .filter(|&n| self.matches_test(&step.test, n))
            .map(Item::Node)
            .collect()
    }

    fn matches_test(&self, test: &NodeTest, node: NodeId) -> bool {
        match test {
            NodeTest::AnyNode => true,
            NodeTest::Text => self.doc.kind(node) == NodeKind::Text,
            NodeTest::Comment => self.doc.kind(node) == NodeKind::Comment,
            NodeTest::AnyName => self.doc.kind(node) == NodeKind::Element,
            NodeTest::Name(prefix, local) => {
                if self.doc.kind(node) != NodeKind::Element
                    || self.doc.local_name(node) != local
                {
                    return false;
                }
                match prefix {
                    // Unprefixed tests match on local name alone.
                    None => true,
                    Some(prefix) => match self.env.namespaces.get(prefix) {
                        Some(uri) => self.doc.namespace_uri(node) == Some(uri.as_str()),
                        None => false,
                    },
                }
            }
        }
    }

    fn filter_predicate(&mut self, predicate: &Expr, candidates: Sequence) -> Result<Sequence> {
        let size = candidates.len();
        let mut kept = Vec::new();
        for (index, item) in candidates.into_iter().enumerate() {
            let focus = Focus {
                item: item.clone(),
                position: index + 1,
                size,
            };
            let result = self.eval(predicate, &focus)?;
            let keep = match result.as_slice() {
                [Item::Integer(i)] => *i == (index + 1) as i64,
                [Item::Double(d)] => *d == (index + 1) as f64,
                other => effective_boolean_value(other, self.doc),
            };
            if keep {
                kept.push(item);
            }
        }
        Ok(kept)
    }

    // ==================== Comparisons and arithmetic ====================

    fn general_compare(&self, op: CompOp, left: &[Item], right: &[Item]) -> bool {
        for a in left {
            for b in right {
                if self.compare_pair(op, a, b) {
                    return true;
                }
            }
        }
        false
    }

    fn compare_pair(&self, op: CompOp, a: &Item, b: &Item) -> bool {
        use CompOp::*;
        let numeric = |a: f64, b: f64| match op {
            Eq => a == b,
            NotEq => a != b,
            Lt => a < b,
            LtEq => a <= b,
            Gt => a > b,
            GtEq => a >= b,
        };
        match op {
            Lt | LtEq | Gt | GtEq => {
                numeric(a.number_value(self.doc), b.number_value(self.doc))
            }
            Eq | NotEq => {
                let bool_side = matches!(a, Item::Boolean(_)) || matches!(b, Item::Boolean(_));
                let num_side = matches!(a, Item::Integer(_) | Item::Double(_))
                    || matches!(b, Item::Integer(_) | Item::Double(_));
                if bool_side {
                    let left = item_boolean(a, self.doc);
                    let right = item_boolean(b, self.doc);
                    (left == right) == (op == Eq)
                } else if num_side {
                    numeric(a.number_value(self.doc), b.number_value(self.doc))
                } else {
                    let eq = a.string_value(self.doc) == b.string_value(self.doc);
                    eq == (op == Eq)
                }
            }
        }
    }

    fn arith(&self, op: ArithOp, left: &[Item], right: &[Item]) -> Result<Sequence> {
        // Arithmetic over the empty sequence yields the empty sequence.
        if left.is_empty() || right.is_empty() {
            return Ok(vec![]);
        }
        let (a, b) = match (left, right) {
            ([a], [b]) => (a, b),
            _ => {
                return Err(Error::XPathEval(
                    "arithmetic over a multi-item sequence".to_string(),
                ))
            }
        };
        if let (Item::Integer(x), Item::Integer(y)) = (a, b) {
            // Overflow falls through to the double path below.
            let value = match op {
                ArithOp::Add => x.checked_add(*y),
                ArithOp::Sub => x.checked_sub(*y),
                ArithOp::Mul => x.checked_mul(*y),
                ArithOp::Mod if *y != 0 => x.checked_rem(*y),
                ArithOp::Mod => {
                    return Err(Error::XPathEval("integer modulo by zero".to_string()))
                }
                ArithOp::Div => None,
            };
            if let Some(value) = value {
                return Ok(vec![Item::Integer(value)]);
            }
        }
        let x = a.number_value(self.doc);
        let y = b.number_value(self.doc);
        let value = match op {
            ArithOp::Add => x + y,
            ArithOp::Sub => x - y,
            ArithOp::Mul => x * y,
            ArithOp::Div => x / y,
            ArithOp::Mod => x % y,
        };
        Ok(vec![Item::Double(value)])
    }

    // ==================== Function library ====================

    fn call(&mut self, name: &str, args: &[Expr], focus: &Focus) -> Result<Sequence> {
        let arity = args.len();
        match (name, arity) {
            ("count", 1) => {
                let seq = self.eval(&args[0], focus)?;
                Ok(vec![Item::Integer(seq.len() as i64)])
            }
            ("position", 0) => Ok(vec![Item::Integer(focus.position as i64)]),
            ("last", 0) => Ok(vec![Item::Integer(focus.size as i64)]),
            ("not", 1) => {
                let value = self.ebv(&args[0], focus)?;
                Ok(vec![Item::Boolean(!value)])
            }
            ("true", 0) => Ok(vec![Item::Boolean(true)]),
            ("false", 0) => Ok(vec![Item::Boolean(false)]),
            ("boolean", 1) => {
                let value = self.ebv(&args[0], focus)?;
                Ok(vec![Item::Boolean(value)])
            }
            ("string", 0 | 1) => {
                let s = self.arg_string(args.first(), focus)?;
                Ok(vec![Item::String(s)])
            }
            ("number", 0 | 1) => {
                let s = self.arg_string(args.first(), focus)?;
                Ok(vec![Item::Double(Item::String(s).number_value(self.doc))])
            }
            ("string-length", 0 | 1) => {
                let s = self.arg_string(args.first(), focus)?;
                Ok(vec![Item::Integer(s.chars().count() as i64)])
            }
            ("concat", n) if n >= 2 => {
                let mut out = String::new();
                for arg in args {
                    out.push_str(&self.arg_string(Some(arg), focus)?);
                }
                Ok(vec![Item::String(out)])
            }
            ("contains", 2) => {
                let haystack = self.arg_string(Some(&args[0]), focus)?;
                let needle = self.arg_string(Some(&args[1]), focus)?;
                Ok(vec![Item::Boolean(haystack.contains(&needle))])
            }
            ("name" | "local-name", 0 | 1) => {
                let seq = match args.first() {
                    Some(arg) => self.eval(arg, focus)?,
                    None => vec![focus.item.clone()],
                };
                let value = match seq.first() {
                    Some(Item::Node(id)) if self.doc.kind(*id) == NodeKind::Element => {
                        if name == "name" {
                            self.doc.name(*id).to_string()
                        } else {
                            self.doc.local_name(*id).to_string()
                        }
                    }
                    _ => String::new(),
                };
                Ok(vec![Item::String(value)])
            }
            _ => Err(Error::XPathEval(format!(
                "unknown function {name}() with {arity} argument(s)"
            ))),
        }
    }

    /// String value of an optional argument, defaulting to the first
    /// item of the context; the empty sequence stringifies to "".
    fn arg_string(&mut self, arg: Option<&Expr>, focus: &Focus) -> Result<String> {
        let seq = match arg {
            Some(expr) => self.eval(expr, focus)?,
            None => vec![focus.item.clone()],
        };
        Ok(seq
            .first()
            .map(|i| i.string_value(self.doc))
            .unwrap_or_default())
    }
}

fn item_boolean(item: &Item, doc: &Document) -> bool {
    effective_boolean_value(std::slice::from_ref(item), doc)
}
