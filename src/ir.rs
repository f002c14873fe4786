//! `ir` defines the relational operator tree, the intermediate representation (IR) of a query plan.
//!
//! The planning oracle answers a query with a tree of operators. Each node names its output with a
//! [`Binding`] so that the pipeline statements lowered from later operators can refer to it.
//! For this query against a `Person` table:
//!
//! ```sql
//! select name from Person where age > 30
//! ```
//! the oracle might return:
//! ```text
//! Projection r2 [name]
//!   Selection r1 (age > 30)
//!     Scan person_rows Person
//! ```
//!
//! Bindings are assigned bottom-up while the tree is built, so every operand is already bound when a
//! consumer is visited. Scans bind to the rows marshalled from the method parameter of that table.

use std::collections::HashSet;
use std::fmt::Write;

use enum_as_inner::EnumAsInner;

pub use crate::ast::{AggFunc, CmpOp};
use crate::sql_value::SqlValue;

/// The name a pipeline statement binds its result to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Binding(String);

impl Binding {
    pub fn new(name: impl Into<String>) -> Binding {
        Binding(name.into())
    }

    /// the rows marshalled from the parameter named `ident`.
    pub fn rows_of(ident: &str) -> Binding {
        Binding(format!("{ident}_rows"))
    }

    /// the method's return value.
    pub fn output() -> Binding {
        Binding(String::from("output"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// hands out `r1`, `r2`, ... in the order nodes are constructed.
#[derive(Debug, Default)]
pub struct BindingGen {
    next: usize,
}

impl BindingGen {
    pub fn new() -> Self {
        BindingGen { next: 0 }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Binding {
        self.next += 1;
        Binding(format!("r{}", self.next))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Scan,
    Selection,
    Projection,
    Join,
    Aggregation,
}

impl OperatorKind {
    /// number of operands a node of this kind must have.
    pub fn arity(&self) -> usize {
        match self {
            OperatorKind::Scan => 0,
            OperatorKind::Selection | OperatorKind::Projection | OperatorKind::Aggregation => 1,
            OperatorKind::Join => 2,
        }
    }
}

impl std::fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperatorKind::Scan => "Scan",
            OperatorKind::Selection => "Selection",
            OperatorKind::Projection => "Projection",
            OperatorKind::Join => "Join",
            OperatorKind::Aggregation => "Aggregation",
        };
        s.fmt(f)
    }
}

/// `Operator` is any node of the plan tree.
#[derive(Debug, Clone, PartialEq, EnumAsInner)]
pub enum Operator {
    Scan(Scan),
    Selection(Selection),
    Projection(Projection),
    Join(Join),
    Aggregation(Aggregation),
}

/// `Scan` reads every row of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
    pub table: String,
    pub binding: Binding,
}

/// `Selection` keeps the rows matching a predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub predicate: Predicate,
    pub source: Box<Operator>,
    pub binding: Binding,
}

/// `Projection` keeps the listed attributes, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub attributes: Vec<String>,
    pub source: Box<Operator>,
    pub binding: Binding,
}

/// `Join` pairs the rows of two inputs whose key columns are equal.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub left: Box<Operator>,
    pub right: Box<Operator>,
    pub left_key: String,
    pub right_key: String,
    pub binding: Binding,
}

/// `Aggregation` groups rows by `group_by` and computes `aggregates` per group.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub group_by: Vec<String>,
    pub aggregates: Vec<Aggregate>,
    pub source: Box<Operator>,
    pub binding: Binding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub func: AggFunc,
    /// `None` only for `count(*)`.
    pub column: Option<String>,
    pub output: String,
}

impl std::fmt::Display for Aggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.column {
            Some(c) => write!(f, "{}({}) as {}", self.func, c, self.output),
            None => write!(f, "{}(*) as {}", self.func, self.output),
        }
    }
}

/// A boolean condition over the attributes of one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: String,
        op: CmpOp,
        value: SqlValue,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::Compare { column, op, value } => match value {
                SqlValue::Text(s) => write!(f, "{} {} '{}'", column, op, s),
                v => write!(f, "{} {} {}", column, op, v),
            },
            Predicate::And(l, r) => write!(f, "({} and {})", l, r),
            Predicate::Or(l, r) => write!(f, "({} or {})", l, r),
        }
    }
}

impl Operator {
    pub fn binding(&self) -> &Binding {
        match self {
            Operator::Scan(s) => &s.binding,
            Operator::Selection(s) => &s.binding,
            Operator::Projection(p) => &p.binding,
            Operator::Join(j) => &j.binding,
            Operator::Aggregation(a) => &a.binding,
        }
    }

    pub fn kind(&self) -> OperatorKind {
        match self {
            Operator::Scan(_) => OperatorKind::Scan,
            Operator::Selection(_) => OperatorKind::Selection,
            Operator::Projection(_) => OperatorKind::Projection,
            Operator::Join(_) => OperatorKind::Join,
            Operator::Aggregation(_) => OperatorKind::Aggregation,
        }
    }

    /// the operator's sources, left to right.
    pub fn operands(&self) -> Vec<&Operator> {
        match self {
            Operator::Scan(_) => vec![],
            Operator::Selection(s) => vec![s.source.as_ref()],
            Operator::Projection(p) => vec![p.source.as_ref()],
            Operator::Join(j) => vec![j.left.as_ref(), j.right.as_ref()],
            Operator::Aggregation(a) => vec![a.source.as_ref()],
        }
    }

    /// visits operands before the operator itself.
    pub fn post_order(&self) -> Vec<&Operator> {
        let mut out = vec![];
        fn walk<'a>(op: &'a Operator, out: &mut Vec<&'a Operator>) {
            for o in op.operands() {
                walk(o, out);
            }
            out.push(op);
        }
        walk(self, &mut out);
        out
    }

    /// Checks that no two nodes bind the same name.
    /// Scans of the same table may share their input binding, since they read the same rows.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen: HashSet<&Binding> = HashSet::new();
        let mut scanned: HashSet<&Binding> = HashSet::new();
        for op in self.post_order() {
            if op.operands().len() != op.kind().arity() {
                return Err(format!(
                    "{} {} has {} operands",
                    op.kind(),
                    op.binding(),
                    op.operands().len()
                ));
            }
            let b = op.binding();
            if let Operator::Scan(_) = op {
                if seen.contains(b) && !scanned.contains(b) {
                    return Err(format!("binding {} is defined twice", b));
                }
                scanned.insert(b);
                seen.insert(b);
                continue;
            }
            if !seen.insert(b) {
                return Err(format!("binding {} is defined twice", b));
            }
        }
        Ok(())
    }

    fn describe(&self, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        let _ = match self {
            Operator::Scan(s) => writeln!(out, "{indent}Scan {} {}", s.binding, s.table),
            Operator::Selection(s) => {
                writeln!(out, "{indent}Selection {} {}", s.binding, s.predicate)
            }
            Operator::Projection(p) => {
                writeln!(out, "{indent}Projection {} {:?}", p.binding, p.attributes)
            }
            Operator::Join(j) => writeln!(
                out,
                "{indent}Join {} {} = {}",
                j.binding, j.left_key, j.right_key
            ),
            Operator::Aggregation(a) => {
                use itertools::Itertools;
                writeln!(
                    out,
                    "{indent}Aggregation {} by {:?} [{}]",
                    a.binding,
                    a.group_by,
                    a.aggregates.iter().join(", ")
                )
            }
        };
        for o in self.operands() {
            o.describe(depth + 1, out);
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = String::new();
        self.describe(0, &mut s);
        f.write_str(s.trim_end())
    }
}

#[cfg(test)]
pub fn scan(table: &str) -> Operator {
    Operator::Scan(Scan {
        table: table.to_string(),
        binding: Binding::rows_of(&table.to_lowercase()),
    })
}

#[cfg(test)]
pub fn project(source: Operator, attributes: &[&str], binding: &str) -> Operator {
    Operator::Projection(Projection {
        attributes: attributes.iter().map(|a| a.to_string()).collect(),
        source: Box::new(source),
        binding: Binding::new(binding),
    })
}

#[test]
fn test_display_plan() {
    let plan = project(
        Operator::Selection(Selection {
            predicate: Predicate::Compare {
                column: "age".to_string(),
                op: CmpOp::Gt,
                value: SqlValue::Int(30),
            },
            source: Box::new(scan("Person")),
            binding: Binding::new("r1"),
        }),
        &["name"],
        "r2",
    );
    let expected = "Projection r2 [\"name\"]\n  Selection r1 age > 30\n    Scan person_rows Person";
    assert_eq!(format!("{}", plan), expected);
    assert_eq!(plan.kind(), OperatorKind::Projection);
    assert_eq!(plan.as_projection().unwrap().attributes, vec!["name"]);
}

#[test]
fn test_post_order_visits_operands_first() {
    let plan = Operator::Join(Join {
        left: Box::new(project(scan("A"), &["x"], "r1")),
        right: Box::new(scan("B")),
        left_key: "x".to_string(),
        right_key: "y".to_string(),
        binding: Binding::new("r2"),
    });
    let order: Vec<String> = plan
        .post_order()
        .iter()
        .map(|o| o.binding().to_string())
        .collect();
    assert_eq!(order, vec!["a_rows", "r1", "b_rows", "r2"]);
}

#[test]
fn test_validate_rejects_duplicate_bindings() {
    let plan = project(project(scan("A"), &["x"], "r1"), &["x"], "r1");
    assert!(plan.validate().is_err());
    let plan = project(project(scan("A"), &["x"], "r1"), &["x"], "r2");
    assert!(plan.validate().is_ok());
}

#[test]
fn test_binding_gen_is_deterministic() {
    let mut a = BindingGen::new();
    let mut b = BindingGen::new();
    let xs: Vec<Binding> = (0..3).map(|_| a.next()).collect();
    let ys: Vec<Binding> = (0..3).map(|_| b.next()).collect();
    assert_eq!(xs, ys);
    assert_eq!(xs[2].as_str(), "r3");
}
