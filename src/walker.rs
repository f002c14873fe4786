//! walks a plan and lowers it into a method body's ordered statements.
//!
//! The walk starts at the root and records each node's statements before descending into its
//! operands, which yields consumers before producers. Reversing the recorded groups then gives
//! execution order: every statement comes after the statements binding its inputs. A node's own
//! statements keep their relative order, since only whole groups are reversed.

use std::collections::HashSet;

use tracing::trace;

use crate::ir::{Binding, Operator};
use crate::lowering::{Error, LoweringRules};
use crate::pipeline::Statement;

fn emit(op: &Operator, rules: &LoweringRules, groups: &mut Vec<Vec<Statement>>) -> Result<(), Error> {
    let stmts = rules.lower(op)?;
    trace!("Lowered {} {} into {} statements", op.kind(), op.binding(), stmts.len());
    groups.push(stmts);
    for operand in op.operands() {
        emit(operand, rules, groups)?;
    }
    Ok(())
}

/// Lowers `plan` into statements, closing with the conversion of the root's rows into `return_type`.
pub fn lower_plan(
    plan: &Operator,
    rules: &LoweringRules,
    return_type: &str,
) -> Result<Vec<Statement>, Error> {
    plan.validate().map_err(Error::MalformedPlan)?;
    let mut groups = vec![];
    emit(plan, rules, &mut groups)?;
    groups.reverse();
    let mut stmts: Vec<Statement> = groups.into_iter().flatten().collect();
    stmts.push(Statement::from_sequence(plan.binding().clone(), return_type));
    Ok(stmts)
}

/// Checks that each statement only reads bindings from `available` or from earlier statements,
/// and that no binding is assigned twice. Returns the first offending binding.
pub fn check_topological(statements: &[Statement], available: &[Binding]) -> Result<(), Binding> {
    let mut bound: HashSet<&Binding> = available.iter().collect();
    for s in statements {
        if let Some(missing) = s.inputs.iter().find(|i| !bound.contains(i)) {
            return Err(missing.clone());
        }
        if !bound.insert(&s.result) {
            return Err(s.result.clone());
        }
    }
    Ok(())
}

#[cfg(test)]
use crate::ir::{project, scan, Join, OperatorKind};

#[test]
fn test_lower_single_projection() {
    let plan = project(scan("Person"), &["name"], "r1");
    let stmts = lower_plan(&plan, &LoweringRules::standard(), "model.Person").unwrap();
    let text: Vec<String> = stmts.iter().map(|s| s.to_string()).collect();
    assert_eq!(
        text,
        vec![
            "r1 = project[name](person_rows)",
            "output = from_sequence[model.Person](r1)",
        ]
    );
}

#[test]
fn test_lone_scan_only_marshals() {
    let stmts = lower_plan(&scan("Person"), &LoweringRules::standard(), "model.Person").unwrap();
    assert_eq!(stmts.len(), 1);
    assert_eq!(stmts[0].to_string(), "output = from_sequence[model.Person](person_rows)");
}

#[test]
fn test_lower_chain_is_leaf_first() {
    let plan = project(project(project(scan("A"), &["x", "y"], "r1"), &["x"], "r2"), &["x"], "r3");
    let stmts = lower_plan(&plan, &LoweringRules::standard(), "A").unwrap();
    let results: Vec<&str> = stmts.iter().map(|s| s.result.as_str()).collect();
    assert_eq!(results, vec!["r1", "r2", "r3", "output"]);
    assert_eq!(check_topological(&stmts, &[crate::ir::Binding::rows_of("a")]), Ok(()));
}

#[test]
fn test_lower_join_orders_both_sides_first() {
    let plan = Operator::Join(Join {
        left: Box::new(project(scan("A"), &["x"], "r1")),
        right: Box::new(project(scan("B"), &["y"], "r2")),
        left_key: "x".to_string(),
        right_key: "y".to_string(),
        binding: Binding::new("r3"),
    });
    let stmts = lower_plan(&plan, &LoweringRules::standard(), "A").unwrap();
    assert_eq!(stmts.len(), 4);
    assert_eq!(stmts[2].to_string(), "r3 = join[x = y](r1, r2)");
    let available = vec![Binding::rows_of("a"), Binding::rows_of("b")];
    assert_eq!(check_topological(&stmts, &available), Ok(()));
    // Without the input rows in scope, the first read is reported.
    assert!(check_topological(&stmts, &[]).is_err());
}

#[test]
fn test_unsupported_operator_fails_lowering() {
    let mut rules = LoweringRules::standard();
    rules.unregister(OperatorKind::Projection);
    let plan = project(scan("A"), &["x"], "r1");
    assert_eq!(
        lower_plan(&plan, &rules, "A"),
        Err(Error::UnsupportedOperator(OperatorKind::Projection))
    );
}

#[test]
fn test_malformed_plan_fails_lowering() {
    let plan = project(project(scan("A"), &["x"], "r1"), &["x"], "r1");
    assert!(matches!(
        lower_plan(&plan, &LoweringRules::standard(), "A"),
        Err(Error::MalformedPlan(_))
    ));
}

#[test]
fn test_rule_statement_groups_keep_their_order() {
    // A rule that emits two statements, the second reading the first.
    fn two_step(op: &Operator) -> Result<Vec<Statement>, Error> {
        let p = op.as_projection().unwrap();
        let tmp = Binding::new(format!("{}_tmp", p.binding));
        Ok(vec![
            Statement::new(
                tmp.clone(),
                crate::pipeline::Operation::Project { attributes: p.attributes.clone() },
                vec![p.source.binding().clone()],
            ),
            Statement::new(
                p.binding.clone(),
                crate::pipeline::Operation::Project { attributes: p.attributes.clone() },
                vec![tmp],
            ),
        ])
    }
    let mut rules = LoweringRules::standard();
    rules.register(OperatorKind::Projection, two_step);
    let plan = project(project(scan("A"), &["x"], "r1"), &["x"], "r2");
    let stmts = lower_plan(&plan, &rules, "A").unwrap();
    let results: Vec<&str> = stmts.iter().map(|s| s.result.as_str()).collect();
    assert_eq!(results, vec!["r1_tmp", "r1", "r2_tmp", "r2", "output"]);
    assert_eq!(check_topological(&stmts, &[Binding::rows_of("a")]), Ok(()));
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::ir::{Aggregation, BindingGen, Predicate, Projection, Scan, Selection};
    use crate::sql_value::SqlValue;
    use proptest::prelude::*;

    /// the shape of a plan, before bindings are assigned.
    #[derive(Debug, Clone)]
    enum Shape {
        Scan(u8),
        Project(Box<Shape>),
        Select(Box<Shape>),
        Aggregate(Box<Shape>),
        Join(Box<Shape>, Box<Shape>),
    }

    fn arb_shape() -> impl Strategy<Value = Shape> {
        let leaf = (0u8..3).prop_map(Shape::Scan);
        leaf.prop_recursive(5, 32, 2, |inner| {
            prop_oneof![
                inner.clone().prop_map(|s| Shape::Project(Box::new(s))),
                inner.clone().prop_map(|s| Shape::Select(Box::new(s))),
                inner.clone().prop_map(|s| Shape::Aggregate(Box::new(s))),
                (inner.clone(), inner).prop_map(|(l, r)| Shape::Join(Box::new(l), Box::new(r))),
            ]
        })
    }

    /// assigns bindings bottom-up, the way the planner does.
    fn build(shape: &Shape, gen: &mut BindingGen) -> Operator {
        match shape {
            Shape::Scan(t) => Operator::Scan(Scan {
                table: format!("T{t}"),
                binding: Binding::rows_of(&format!("t{t}")),
            }),
            Shape::Project(s) => {
                let source = Box::new(build(s, gen));
                Operator::Projection(Projection {
                    attributes: vec!["a".to_string()],
                    source,
                    binding: gen.next(),
                })
            }
            Shape::Select(s) => {
                let source = Box::new(build(s, gen));
                Operator::Selection(Selection {
                    predicate: Predicate::Compare {
                        column: "a".to_string(),
                        op: crate::ir::CmpOp::Eq,
                        value: SqlValue::Int(1),
                    },
                    source,
                    binding: gen.next(),
                })
            }
            Shape::Aggregate(s) => {
                let source = Box::new(build(s, gen));
                Operator::Aggregation(Aggregation {
                    group_by: vec!["a".to_string()],
                    aggregates: vec![],
                    source,
                    binding: gen.next(),
                })
            }
            Shape::Join(l, r) => {
                let left = Box::new(build(l, gen));
                let right = Box::new(build(r, gen));
                Operator::Join(Join {
                    left,
                    right,
                    left_key: "a".to_string(),
                    right_key: "a".to_string(),
                    binding: gen.next(),
                })
            }
        }
    }

    proptest! {
        #[test]
        fn lowered_statements_are_topologically_ordered(shape in arb_shape()) {
            let plan = build(&shape, &mut BindingGen::new());
            let stmts = lower_plan(&plan, &LoweringRules::standard(), "T").unwrap();
            let available: Vec<Binding> = (0..3).map(|t| Binding::rows_of(&format!("t{t}"))).collect();
            prop_assert_eq!(check_topological(&stmts, &available), Ok(()));
            let last = stmts.last().unwrap();
            prop_assert!(last.is_output());
            prop_assert_eq!(&last.inputs, &vec![plan.binding().clone()]);
            // One statement per non-scan node, plus the output.
            let non_scans = plan.post_order().iter().filter(|o| o.as_scan().is_none()).count();
            prop_assert_eq!(stmts.len(), non_scans + 1);
        }

        #[test]
        fn lowering_is_deterministic(shape in arb_shape()) {
            let a = lower_plan(&build(&shape, &mut BindingGen::new()), &LoweringRules::standard(), "T");
            let b = lower_plan(&build(&shape, &mut BindingGen::new()), &LoweringRules::standard(), "T");
            prop_assert_eq!(a, b);
        }
    }
}
