//! executes pipeline statements over in-memory rows.
//!
//! Each binding is a lazy sequence: a function that builds a fresh iterator every time it is called,
//! so a sequence can be consumed any number of times and nothing is computed until the output is
//! collected. The per-row kernels here are also what rendered method bodies call at run time.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::codegen::MethodUnit;
use crate::ir::{AggFunc, Aggregate, Binding, CmpOp, Predicate};
use crate::marshal::{Entity, Marshaler};
use crate::pipeline::{Operation, Statement};
use crate::row::Row;
use crate::sql_value::SqlValue;

pub type RowSeq = Box<dyn Iterator<Item = Option<Row>>>;

/// A restartable sequence of rows; `None` items are absent rows.
pub type SeqFn = Rc<dyn Fn() -> RowSeq>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Binding {0} is read before it is assigned.")]
    UnboundInput(Binding),
    #[error("Statement {0} expects {1} inputs.")]
    WrongInputCount(String, usize),
    #[error("Method {method} takes {expected} arguments but was given {actual}.")]
    WrongArgumentCount {
        method: String,
        expected: usize,
        actual: usize,
    },
    #[error("Method {method} returns {declared}, not {requested}.")]
    ReturnTypeMismatch {
        method: String,
        declared: String,
        requested: String,
    },
    #[error("Statement list has no output statement.")]
    NoOutput,
}

/// Builds the row `{a: row[a], ...}` for `attributes`, in order. A repeated attribute keeps its
/// first position. A row missing any attribute becomes absent.
pub fn project_row<S: AsRef<str>>(row: Option<Row>, attributes: &[S]) -> Option<Row> {
    let row = row?;
    let mut out = Row::new();
    for a in attributes {
        let a = a.as_ref();
        match row.get(a) {
            Some(v) => out.insert(a, v.clone()),
            None => {
                warn!("Cannot project attribute {} from row {}", a, row);
                return None;
            }
        }
    }
    Some(out)
}

/// `row[column] <op> value`. False when the column is missing, either side is null, or the values
/// are not comparable.
pub fn compare(row: &Row, column: &str, op: CmpOp, value: &SqlValue) -> bool {
    let ord = match row.get(column) {
        Some(v) => v.sql_cmp(value),
        None => None,
    };
    match ord {
        None => false,
        Some(o) => match op {
            CmpOp::Eq => o == Ordering::Equal,
            CmpOp::NotEq => o != Ordering::Equal,
            CmpOp::Lt => o == Ordering::Less,
            CmpOp::LtEq => o != Ordering::Greater,
            CmpOp::Gt => o == Ordering::Greater,
            CmpOp::GtEq => o != Ordering::Less,
        },
    }
}

pub fn eval_predicate(row: &Row, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Compare { column, op, value } => compare(row, column, *op, value),
        Predicate::And(l, r) => eval_predicate(row, l) && eval_predicate(row, r),
        Predicate::Or(l, r) => eval_predicate(row, l) || eval_predicate(row, r),
    }
}

/// Whether a filter keeps `row`. Absent rows are kept, and stay absent.
pub fn keep_row(row: &Option<Row>, test: impl Fn(&Row) -> bool) -> bool {
    match row {
        Some(r) => test(r),
        None => true,
    }
}

fn keys_match(l: &Row, left_key: &str, r: &Row, right_key: &str) -> bool {
    match (l.get(left_key), r.get(right_key)) {
        (Some(a), Some(b)) => a.sql_cmp(b) == Some(Ordering::Equal),
        _ => false,
    }
}

/// Nested-loop equi-join. Output rows carry the left columns, then the right ones; a right column
/// with the same name replaces the left value.
pub fn join_rows<L>(
    left: L,
    right: Vec<Option<Row>>,
    left_key: &str,
    right_key: &str,
) -> impl Iterator<Item = Option<Row>>
where
    L: Iterator<Item = Option<Row>>,
{
    let right: Rc<Vec<Row>> = Rc::new(right.into_iter().flatten().collect());
    let lk = String::from(left_key);
    let rk = String::from(right_key);
    left.flatten().flat_map(move |l| {
        let matches: Vec<Option<Row>> = right
            .iter()
            .filter(|r| keys_match(&l, &lk, r, &rk))
            .map(|r| {
                let mut out = l.clone();
                out.extend(r);
                Some(out)
            })
            .collect();
        matches.into_iter()
    })
}

/// Running state of one aggregate over one group.
#[derive(Debug, Clone)]
enum Accumulator {
    Count(i64),
    Sum(Option<SqlValue>),
    Extreme(Option<SqlValue>),
    Avg { total: f64, n: i64 },
}

impl Accumulator {
    fn new(func: AggFunc) -> Accumulator {
        match func {
            AggFunc::Count => Accumulator::Count(0),
            AggFunc::Sum => Accumulator::Sum(None),
            AggFunc::Min | AggFunc::Max => Accumulator::Extreme(None),
            AggFunc::Avg => Accumulator::Avg { total: 0.0, n: 0 },
        }
    }

    fn update(&mut self, agg: &Aggregate, row: &Row) {
        let value = match &agg.column {
            None => {
                if let Accumulator::Count(n) = self {
                    *n += 1;
                }
                return;
            }
            Some(c) => match row.get(c) {
                Some(v) if !v.is_null() => v,
                _ => return,
            },
        };
        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::Sum(acc) => {
                let next = match (acc.take(), value) {
                    (None, v) => v.clone(),
                    (Some(SqlValue::Int(a)), SqlValue::Int(b)) => match a.checked_add(*b) {
                        Some(s) => SqlValue::Int(s),
                        None => SqlValue::Real(a as f64 + *b as f64),
                    },
                    (Some(a), b) => match (a.as_f64(), b.as_f64()) {
                        (Some(x), Some(y)) => SqlValue::Real(x + y),
                        _ => {
                            warn!("Cannot sum {} and {}", a, b);
                            a
                        }
                    },
                };
                *acc = Some(next);
            }
            Accumulator::Extreme(acc) => {
                let wanted = match agg.func {
                    AggFunc::Min => Ordering::Less,
                    _ => Ordering::Greater,
                };
                let replace = match acc {
                    None => true,
                    Some(cur) => value.sql_cmp(cur) == Some(wanted),
                };
                if replace {
                    *acc = Some(value.clone());
                }
            }
            Accumulator::Avg { total, n } => {
                if let Some(x) = value.as_f64() {
                    *total += x;
                    *n += 1;
                }
            }
        }
    }

    fn finish(self) -> SqlValue {
        match self {
            Accumulator::Count(n) => SqlValue::Int(n),
            Accumulator::Sum(v) | Accumulator::Extreme(v) => v.unwrap_or(SqlValue::Null()),
            Accumulator::Avg { n: 0, .. } => SqlValue::Null(),
            Accumulator::Avg { total, n } => SqlValue::Real(total / n as f64),
        }
    }
}

/// Groups rows by `group_by` in first-seen order and computes `aggregates` per group. Nulls group
/// together, and a missing group column counts as null. Absent rows are skipped.
pub fn aggregate_rows<I, S>(rows: I, group_by: &[S], aggregates: &[Aggregate]) -> Vec<Option<Row>>
where
    I: Iterator<Item = Option<Row>>,
    S: AsRef<str>,
{
    let mut groups: Vec<(Vec<SqlValue>, Vec<Accumulator>)> = vec![];
    for row in rows.flatten() {
        let key: Vec<SqlValue> = group_by
            .iter()
            .map(|g| row.get(g.as_ref()).cloned().unwrap_or(SqlValue::Null()))
            .collect();
        let idx = match groups.iter().position(|(k, _)| *k == key) {
            Some(i) => i,
            None => {
                groups.push((key, aggregates.iter().map(|a| Accumulator::new(a.func)).collect()));
                groups.len() - 1
            }
        };
        for (acc, agg) in groups[idx].1.iter_mut().zip(aggregates) {
            acc.update(agg, &row);
        }
    }
    if groups.is_empty() && group_by.is_empty() {
        groups.push((vec![], aggregates.iter().map(|a| Accumulator::new(a.func)).collect()));
    }
    groups
        .into_iter()
        .map(|(key, accs)| {
            let mut out = Row::new();
            for (g, v) in group_by.iter().zip(key) {
                out.insert(g.as_ref(), v);
            }
            for (agg, acc) in aggregates.iter().zip(accs) {
                out.insert(agg.output.as_str(), acc.finish());
            }
            Some(out)
        })
        .collect()
}

/// a sequence over a fixed set of rows.
pub fn rows_seq(rows: Vec<Row>) -> SeqFn {
    let rows = Rc::new(rows);
    Rc::new(move || -> RowSeq {
        let rows = rows.clone();
        Box::new((0..rows.len()).map(move |i| Some(rows[i].clone())))
    })
}

/// Binds sequences to names and defines new ones from statements.
#[derive(Default)]
pub struct Interpreter {
    bindings: HashMap<Binding, SeqFn>,
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter {
            bindings: HashMap::new(),
        }
    }

    pub fn bind(&mut self, binding: Binding, seq: SeqFn) -> &mut Self {
        self.bindings.insert(binding, seq);
        self
    }

    pub fn sequence(&self, binding: &Binding) -> Result<SeqFn, Error> {
        self.bindings
            .get(binding)
            .cloned()
            .ok_or_else(|| Error::UnboundInput(binding.clone()))
    }

    fn input(&self, stmt: &Statement, i: usize) -> Result<SeqFn, Error> {
        if stmt.inputs.len() != stmt.operation.arity() {
            return Err(Error::WrongInputCount(
                stmt.to_string(),
                stmt.operation.arity(),
            ));
        }
        self.sequence(&stmt.inputs[i])
    }

    /// Defines the statement's result. No rows are read.
    pub fn define(&mut self, stmt: &Statement) -> Result<(), Error> {
        let seq: SeqFn = match &stmt.operation {
            Operation::Project { attributes } => {
                let src = self.input(stmt, 0)?;
                let attributes = Rc::new(attributes.clone());
                Rc::new(move || -> RowSeq {
                    let attributes = attributes.clone();
                    Box::new(src().map(move |r| project_row(r, attributes.as_slice())))
                })
            }
            Operation::Filter { predicate } => {
                let src = self.input(stmt, 0)?;
                let predicate = Rc::new(predicate.clone());
                Rc::new(move || -> RowSeq {
                    let predicate = predicate.clone();
                    Box::new(src().filter(move |r| keep_row(r, |row| eval_predicate(row, &predicate))))
                })
            }
            Operation::Join {
                left_key,
                right_key,
            } => {
                let left = self.input(stmt, 0)?;
                let right = self.input(stmt, 1)?;
                let (lk, rk) = (left_key.clone(), right_key.clone());
                Rc::new(move || -> RowSeq {
                    Box::new(join_rows(left(), right().collect(), &lk, &rk))
                })
            }
            Operation::Aggregate {
                group_by,
                aggregates,
            } => {
                let src = self.input(stmt, 0)?;
                let (group_by, aggregates) = (group_by.clone(), aggregates.clone());
                Rc::new(move || -> RowSeq {
                    Box::new(aggregate_rows(src(), group_by.as_slice(), &aggregates).into_iter())
                })
            }
            // The output stays a row sequence here; marshalling into objects is the caller's.
            Operation::FromSequence { .. } => self.input(stmt, 0)?,
        };
        self.bindings.insert(stmt.result.clone(), seq);
        Ok(())
    }

    pub fn define_all(&mut self, statements: &[Statement]) -> Result<(), Error> {
        statements.iter().try_for_each(|s| self.define(s))
    }
}

/// Runs a method body against one row set per parameter, in parameter order, and returns the
/// rows handed to the final conversion.
pub fn run_method(unit: &MethodUnit, args: Vec<Vec<Row>>) -> Result<Vec<Option<Row>>, Error> {
    if args.len() != unit.parameters.len() {
        return Err(Error::WrongArgumentCount {
            method: unit.name.clone(),
            expected: unit.parameters.len(),
            actual: args.len(),
        });
    }
    let output = unit.output().ok_or(Error::NoOutput)?;
    let mut interp = Interpreter::new();
    for (p, rows) in unit.parameters.iter().zip(args) {
        interp.bind(p.rows.clone(), rows_seq(rows));
    }
    interp.define_all(&unit.statements)?;
    let seq = interp.sequence(&output.result)?;
    let rows: Vec<Option<Row>> = seq().collect();
    debug!("{} produced {} rows", unit.name, rows.len());
    Ok(rows)
}

/// Like [`run_method`], then marshals the rows into `T`, which must be the declared return type.
pub fn execute<T: Entity>(unit: &MethodUnit, args: Vec<Vec<Row>>) -> Result<Vec<T>, Error> {
    if T::type_name() != unit.return_type {
        return Err(Error::ReturnTypeMismatch {
            method: unit.name.clone(),
            declared: unit.return_type.clone(),
            requested: String::from(T::type_name()),
        });
    }
    let rows = run_method(unit, args)?;
    Ok(Marshaler::<T>::new().from_sequence(rows))
}

#[cfg(test)]
fn row(items: &[(&str, SqlValue)]) -> Row {
    items.iter().cloned().collect()
}

#[test]
fn test_project_row() {
    let r = row(&[("name", SqlValue::Text("Ann".into())), ("age", SqlValue::Int(30))]);
    assert_eq!(
        project_row(Some(r.clone()), &["age"]),
        Some(row(&[("age", SqlValue::Int(30))]))
    );
    // Duplicates collapse into the first position.
    let p = project_row(Some(r.clone()), &["age", "name", "age"]).unwrap();
    assert_eq!(p.column_names(), vec!["age", "name"]);
    assert_eq!(project_row(Some(r), &["shoe_size"]), None);
    assert_eq!(project_row(None, &["age"]), None);
}

#[test]
fn test_compare() {
    struct Case {
        op: CmpOp,
        value: SqlValue,
        expected: bool,
    }
    let r = row(&[("age", SqlValue::Int(30)), ("nothing", SqlValue::Null())]);
    let cases = vec![
        Case { op: CmpOp::Eq, value: SqlValue::Int(30), expected: true },
        Case { op: CmpOp::NotEq, value: SqlValue::Int(30), expected: false },
        Case { op: CmpOp::Lt, value: SqlValue::Real(30.5), expected: true },
        Case { op: CmpOp::LtEq, value: SqlValue::Int(30), expected: true },
        Case { op: CmpOp::Gt, value: SqlValue::Int(30), expected: false },
        Case { op: CmpOp::GtEq, value: SqlValue::Int(29), expected: true },
        Case { op: CmpOp::Eq, value: SqlValue::Text("30".into()), expected: false },
        Case { op: CmpOp::Eq, value: SqlValue::Null(), expected: false },
    ];
    for c in cases {
        assert_eq!(compare(&r, "age", c.op, &c.value), c.expected, "age {} {}", c.op, c.value);
    }
    assert!(!compare(&r, "nothing", CmpOp::Eq, &SqlValue::Null()));
    assert!(!compare(&r, "missing", CmpOp::NotEq, &SqlValue::Int(1)));
}

#[test]
fn test_join_rows() {
    let left = vec![
        Some(row(&[("name", SqlValue::Text("Ann".into())), ("id", SqlValue::Int(1))])),
        None,
        Some(row(&[("name", SqlValue::Text("Bob".into())), ("id", SqlValue::Null())])),
        Some(row(&[("name", SqlValue::Text("Cy".into())), ("id", SqlValue::Int(2))])),
    ];
    let right = vec![
        Some(row(&[("owner", SqlValue::Int(2)), ("name", SqlValue::Text("Rex".into()))])),
        Some(row(&[("owner", SqlValue::Null()), ("name", SqlValue::Text("Tom".into()))])),
        Some(row(&[("owner", SqlValue::Int(1)), ("name", SqlValue::Text("Fly".into()))])),
        Some(row(&[("owner", SqlValue::Int(2)), ("name", SqlValue::Text("Max".into()))])),
    ];
    let out: Vec<String> = join_rows(left.into_iter(), right, "id", "owner")
        .map(|r| r.unwrap().to_string())
        .collect();
    assert_eq!(
        out,
        vec![
            "{name: Fly, id: 1, owner: 1}",
            "{name: Rex, id: 2, owner: 2}",
            "{name: Max, id: 2, owner: 2}",
        ]
    );
}

#[test]
fn test_aggregate_rows() {
    let rows = vec![
        Some(row(&[("dept", SqlValue::Text("a".into())), ("pay", SqlValue::Int(10))])),
        Some(row(&[("dept", SqlValue::Text("b".into())), ("pay", SqlValue::Int(5))])),
        None,
        Some(row(&[("dept", SqlValue::Text("a".into())), ("pay", SqlValue::Null())])),
        Some(row(&[("dept", SqlValue::Text("a".into())), ("pay", SqlValue::Int(20))])),
    ];
    let aggs = vec![
        Aggregate { func: AggFunc::Count, column: None, output: "n".into() },
        Aggregate { func: AggFunc::Count, column: Some("pay".into()), output: "paid".into() },
        Aggregate { func: AggFunc::Sum, column: Some("pay".into()), output: "total".into() },
        Aggregate { func: AggFunc::Min, column: Some("pay".into()), output: "low".into() },
        Aggregate { func: AggFunc::Max, column: Some("pay".into()), output: "high".into() },
        Aggregate { func: AggFunc::Avg, column: Some("pay".into()), output: "mean".into() },
    ];
    let out: Vec<String> = aggregate_rows(rows.into_iter(), &["dept"], &aggs)
        .into_iter()
        .map(|r| r.unwrap().to_string())
        .collect();
    assert_eq!(
        out,
        vec![
            "{dept: a, n: 3, paid: 2, total: 30, low: 10, high: 20, mean: 15}",
            "{dept: b, n: 1, paid: 1, total: 5, low: 5, high: 5, mean: 5}",
        ]
    );
}

#[test]
fn test_aggregate_empty_input() {
    let aggs = vec![
        Aggregate { func: AggFunc::Count, column: None, output: "n".into() },
        Aggregate { func: AggFunc::Sum, column: Some("pay".into()), output: "total".into() },
    ];
    let out = aggregate_rows(std::iter::empty(), &[] as &[&str], &aggs);
    assert_eq!(
        out,
        vec![Some(row(&[("n", SqlValue::Int(0)), ("total", SqlValue::Null())]))]
    );
    assert!(aggregate_rows(std::iter::empty(), &["dept"], &aggs).is_empty());
}

#[test]
fn test_sequences_restart() {
    let mut interp = Interpreter::new();
    interp.bind(
        Binding::rows_of("person"),
        rows_seq(vec![row(&[("age", SqlValue::Int(1))]), row(&[("age", SqlValue::Int(2))])]),
    );
    interp
        .define(&Statement::new(
            Binding::new("r1"),
            Operation::Project { attributes: vec!["age".into()] },
            vec![Binding::rows_of("person")],
        ))
        .unwrap();
    let seq = interp.sequence(&Binding::new("r1")).unwrap();
    let first: Vec<Option<Row>> = seq().collect();
    let second: Vec<Option<Row>> = seq().collect();
    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
}

#[test]
fn test_define_reports_unbound_input() {
    let mut interp = Interpreter::new();
    let stmt = Statement::new(
        Binding::new("r1"),
        Operation::Project { attributes: vec!["age".into()] },
        vec![Binding::rows_of("person")],
    );
    assert_eq!(
        interp.define(&stmt).err(),
        Some(Error::UnboundInput(Binding::rows_of("person")))
    );
}

#[test]
fn test_execute_filter_then_project() {
    use crate::codegen::Parameter;
    use crate::marshal::fixtures::{person, Person};
    let unit = MethodUnit {
        name: "getAdults".into(),
        parameters: vec![Parameter {
            ident: "person".into(),
            type_name: "model.Person".into(),
            rows: Binding::rows_of("person"),
        }],
        statements: vec![
            Statement::new(
                Binding::new("r1"),
                Operation::Filter {
                    predicate: Predicate::Compare {
                        column: "age".into(),
                        op: CmpOp::GtEq,
                        value: SqlValue::Int(18),
                    },
                },
                vec![Binding::rows_of("person")],
            ),
            Statement::new(
                Binding::new("r2"),
                Operation::Project { attributes: vec!["name".into()] },
                vec![Binding::new("r1")],
            ),
            Statement::from_sequence(Binding::new("r2"), "model.Person"),
        ],
        return_type: "model.Person".into(),
    };
    let m = Marshaler::<Person>::new();
    let people = vec![person("Ann", 30, 1.6), person("Kid", 9, 1.1), person("Bo", 18, 1.8)];
    let out: Vec<Person> = execute(&unit, vec![m.to_rows(&people)]).unwrap();
    assert_eq!(out, vec![person("Ann", 0, 0.0), person("Bo", 0, 0.0)]);
    assert!(matches!(
        run_method(&unit, vec![]),
        Err(Error::WrongArgumentCount { expected: 1, actual: 0, .. })
    ));
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    const NAMES: [&str; 4] = ["a", "b", "c", "d"];

    fn arb_rows() -> impl Strategy<Value = Vec<Row>> {
        prop::collection::vec(
            prop::collection::vec(any::<i64>(), NAMES.len()).prop_map(|vals| {
                NAMES
                    .iter()
                    .zip(vals)
                    .map(|(n, v)| (*n, SqlValue::Int(v)))
                    .collect::<Row>()
            }),
            0..8,
        )
    }

    fn arb_attributes() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(prop::sample::select(NAMES.to_vec()), 0..6)
            .prop_map(|v| v.into_iter().map(String::from).collect())
    }

    proptest! {
        #[test]
        fn projected_keys_equal_attribute_list(rows in arb_rows(), attributes in arb_attributes()) {
            let n = rows.len();
            let mut interp = Interpreter::new();
            interp.bind(Binding::rows_of("t"), rows_seq(rows));
            interp.define(&Statement::new(
                Binding::new("r1"),
                Operation::Project { attributes: attributes.clone() },
                vec![Binding::rows_of("t")],
            )).unwrap();
            let seq = interp.sequence(&Binding::new("r1")).unwrap();
            let out: Vec<Option<Row>> = seq().collect();
            prop_assert_eq!(out.len(), n);
            let mut expected: Vec<String> = vec![];
            for a in &attributes {
                if !expected.contains(a) {
                    expected.push(a.clone());
                }
            }
            for r in out {
                prop_assert_eq!(r.unwrap().column_names(), expected.clone());
            }
        }
    }
}
