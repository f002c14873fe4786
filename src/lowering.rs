//! lowering rules: how each kind of plan operator becomes pipeline statements.
//!
//! Rules are looked up in a [`LoweringRules`] table keyed by operator kind. A rule sees the node and
//! the bindings of its operands, which are already assigned, and returns the node's statements in
//! execution order.

use std::collections::HashMap;

use crate::ir::{Operator, OperatorKind};
use crate::pipeline::{Operation, Statement};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("No lowering rule is registered for {0} operators.")]
    UnsupportedOperator(OperatorKind),
    #[error("Malformed plan: {0}")]
    MalformedPlan(String),
}

pub type LoweringFn = fn(&Operator) -> Result<Vec<Statement>, Error>;

pub struct LoweringRules {
    rules: HashMap<OperatorKind, LoweringFn>,
}

impl LoweringRules {
    /// a table with no rules at all.
    pub fn empty() -> Self {
        LoweringRules {
            rules: HashMap::new(),
        }
    }

    /// rules for every operator the planner produces.
    pub fn standard() -> Self {
        let mut r = Self::empty();
        r.register(OperatorKind::Scan, lower_scan)
            .register(OperatorKind::Projection, lower_projection)
            .register(OperatorKind::Selection, lower_selection)
            .register(OperatorKind::Join, lower_join)
            .register(OperatorKind::Aggregation, lower_aggregation);
        r
    }

    pub fn register(&mut self, kind: OperatorKind, rule: LoweringFn) -> &mut Self {
        self.rules.insert(kind, rule);
        self
    }

    pub fn unregister(&mut self, kind: OperatorKind) -> &mut Self {
        self.rules.remove(&kind);
        self
    }

    pub fn lower(&self, op: &Operator) -> Result<Vec<Statement>, Error> {
        match self.rules.get(&op.kind()) {
            Some(rule) => rule(op),
            None => Err(Error::UnsupportedOperator(op.kind())),
        }
    }
}

impl Default for LoweringRules {
    fn default() -> Self {
        Self::standard()
    }
}

fn mismatch(op: &Operator, expected: OperatorKind) -> Error {
    Error::MalformedPlan(format!(
        "{} rule applied to {} {}",
        expected,
        op.kind(),
        op.binding()
    ))
}

/// A scan's rows are the marshalled method parameter; nothing to emit.
pub fn lower_scan(op: &Operator) -> Result<Vec<Statement>, Error> {
    op.as_scan()
        .map(|_| vec![])
        .ok_or_else(|| mismatch(op, OperatorKind::Scan))
}

pub fn lower_projection(op: &Operator) -> Result<Vec<Statement>, Error> {
    let p = op
        .as_projection()
        .ok_or_else(|| mismatch(op, OperatorKind::Projection))?;
    Ok(vec![Statement::new(
        p.binding.clone(),
        Operation::Project {
            attributes: p.attributes.clone(),
        },
        vec![p.source.binding().clone()],
    )])
}

pub fn lower_selection(op: &Operator) -> Result<Vec<Statement>, Error> {
    let s = op
        .as_selection()
        .ok_or_else(|| mismatch(op, OperatorKind::Selection))?;
    Ok(vec![Statement::new(
        s.binding.clone(),
        Operation::Filter {
            predicate: s.predicate.clone(),
        },
        vec![s.source.binding().clone()],
    )])
}

pub fn lower_join(op: &Operator) -> Result<Vec<Statement>, Error> {
    let j = op
        .as_join()
        .ok_or_else(|| mismatch(op, OperatorKind::Join))?;
    Ok(vec![Statement::new(
        j.binding.clone(),
        Operation::Join {
            left_key: j.left_key.clone(),
            right_key: j.right_key.clone(),
        },
        vec![j.left.binding().clone(), j.right.binding().clone()],
    )])
}

pub fn lower_aggregation(op: &Operator) -> Result<Vec<Statement>, Error> {
    let a = op
        .as_aggregation()
        .ok_or_else(|| mismatch(op, OperatorKind::Aggregation))?;
    Ok(vec![Statement::new(
        a.binding.clone(),
        Operation::Aggregate {
            group_by: a.group_by.clone(),
            aggregates: a.aggregates.clone(),
        },
        vec![a.source.binding().clone()],
    )])
}

#[test]
fn test_lower_projection() {
    use crate::ir::{project, scan};
    let op = project(scan("Person"), &["name", "age"], "r1");
    let stmts = LoweringRules::standard().lower(&op).unwrap();
    assert_eq!(stmts.len(), 1);
    assert_eq!(format!("{}", stmts[0]), "r1 = project[name, age](person_rows)");
}

#[test]
fn test_lower_scan_emits_nothing() {
    use crate::ir::scan;
    assert_eq!(LoweringRules::standard().lower(&scan("Person")), Ok(vec![]));
}

#[test]
fn test_missing_rule_is_unsupported() {
    use crate::ir::{project, scan};
    let mut rules = LoweringRules::standard();
    rules.unregister(OperatorKind::Projection);
    let op = project(scan("Person"), &["name"], "r1");
    assert_eq!(
        rules.lower(&op),
        Err(Error::UnsupportedOperator(OperatorKind::Projection))
    );
    assert_eq!(
        format!("{}", Error::UnsupportedOperator(OperatorKind::Projection)),
        "No lowering rule is registered for Projection operators."
    );
}

#[test]
fn test_rule_applied_to_wrong_kind() {
    use crate::ir::scan;
    let mut rules = LoweringRules::empty();
    rules.register(OperatorKind::Scan, lower_projection);
    assert!(matches!(
        rules.lower(&scan("Person")),
        Err(Error::MalformedPlan(_))
    ));
}
