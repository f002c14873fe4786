//! `ast_to_ir` converts a select statement AST into a plan (IR), checking it against the schema.
//!
//! The plan is always built in the same shape:
//! `Scan` of the FROM table, `Join` with a `Scan` of the JOIN table, `Selection` for WHERE,
//! `Aggregation` for aggregates and GROUP BY, and a final `Projection` for the select list.
//! Blocks that would not change anything are left out.
//! Bindings are handed out while the tree grows upward, so the numbering only depends on the query.

use anyhow::{bail, Result};

use crate::ast;
use crate::ir::{self, BindingGen, Operator};
use crate::schema::{Column, Schema, TableSchema};
use crate::sql_value;

/// resolves column references against the tables in scope.
struct Scope<'a> {
    tables: Vec<&'a TableSchema>,
    /// the ON columns of a join, when both sides use the same name.
    shared_key: Option<String>,
}

impl<'a> Scope<'a> {
    fn table(&self, name: &str) -> Option<&'a TableSchema> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .copied()
    }

    /// names present in more than one table. After a join only one value survives under such a name.
    fn clashes(&self, name: &str) -> bool {
        self.tables.iter().filter(|t| t.column(name).is_some()).count() > 1
    }

    fn resolve(&self, c: &ast::ColName) -> Result<(&'a TableSchema, &'a Column)> {
        let found: Vec<(&TableSchema, &Column)> = match &c.table {
            Some(t) => {
                let Some(table) = self.table(t) else {
                    bail!("Unknown table {} in column reference {}", t, c)
                };
                table.column(&c.name).map(|col| (table, col)).into_iter().collect()
            }
            None => self
                .tables
                .iter()
                .filter_map(|t| t.column(&c.name).map(|col| (*t, col)))
                .collect(),
        };
        match found.as_slice() {
            [] => bail!("Unknown column {}", c),
            [(t, col)] => {
                if self.clashes(&col.name)
                    && self.shared_key.as_deref() != Some(col.name.as_str())
                {
                    bail!("Column {} is ambiguous after the join", c);
                }
                Ok((*t, *col))
            }
            _ => {
                if self.shared_key.as_deref().is_some_and(|k| k.eq_ignore_ascii_case(&c.name)) {
                    Ok(found[0])
                } else {
                    bail!("Column {} is ambiguous", c)
                }
            }
        }
    }

    fn all_columns(&self) -> Vec<String> {
        let mut out: Vec<String> = vec![];
        for t in &self.tables {
            for c in &t.columns {
                if !out.iter().any(|o| o.eq_ignore_ascii_case(&c.name)) {
                    out.push(c.name.clone());
                }
            }
        }
        out
    }
}

fn lookup_table<'a>(schema: &'a Schema, name: &str) -> Result<&'a TableSchema> {
    match schema.table(name) {
        Some(t) => Ok(t),
        None => bail!("Unknown table {}", name),
    }
}

fn scan(table: &TableSchema) -> Operator {
    Operator::Scan(ir::Scan {
        table: table.name.clone(),
        binding: table.source.clone(),
    })
}

fn expr_to_predicate(e: &ast::Expr, scope: &Scope) -> Result<ir::Predicate> {
    Ok(match e {
        ast::Expr::Compare { col, op, value } => {
            let (_, column) = scope.resolve(col)?;
            let value = sql_value::from_ast_constant(value);
            if let Some(t) = value.sql_type() {
                if !column.sql_type.comparable_with(t) {
                    bail!(
                        "Cannot compare {} ({}) with {} ({})",
                        col,
                        column.sql_type,
                        value,
                        t
                    );
                }
            }
            ir::Predicate::Compare {
                column: column.name.clone(),
                op: *op,
                value,
            }
        }
        ast::Expr::And(l, r) => ir::Predicate::And(
            Box::new(expr_to_predicate(l, scope)?),
            Box::new(expr_to_predicate(r, scope)?),
        ),
        ast::Expr::Or(l, r) => ir::Predicate::Or(
            Box::new(expr_to_predicate(l, scope)?),
            Box::new(expr_to_predicate(r, scope)?),
        ),
    })
}

fn aggregate_call_to_ir(call: &ast::AggCall, scope: &Scope) -> Result<ir::Aggregate> {
    let column = match &call.arg {
        Some(c) => {
            let (_, col) = scope.resolve(c)?;
            if matches!(call.func, ast::AggFunc::Sum | ast::AggFunc::Avg)
                && !col.sql_type.is_numeric()
            {
                bail!("Cannot apply {} to {} column {}", call.func, col.sql_type, c);
            }
            Some(col.name.clone())
        }
        None => None,
    };
    let output = match (&call.alias, &column) {
        (Some(a), _) => a.clone(),
        (None, Some(c)) => format!("{}_{}", call.func, c),
        (None, None) => format!("{}", call.func),
    };
    Ok(ir::Aggregate {
        func: call.func,
        column,
        output,
    })
}

pub fn ast_select_statement_to_ir(ss: &ast::SelectStatement, schema: &Schema) -> Result<Operator> {
    let mut bindings = BindingGen::new();
    let from = lookup_table(schema, &ss.from.tablename)?;
    let mut scope = Scope {
        tables: vec![from],
        shared_key: None,
    };
    let mut plan = scan(from);

    if let Some(j) = &ss.join {
        let right = lookup_table(schema, &j.tablename)?;
        if right.name == from.name {
            bail!("Joining {} with itself is not supported", from.name);
        }
        scope.tables.push(right);
        let (lt, lc) = join_side(&j.lhs, &scope, from, right)?;
        let (rt, rc) = join_side(&j.rhs, &scope, from, right)?;
        let (left_key, right_key) = if lt.name == from.name && rt.name == right.name {
            (lc, rc)
        } else if lt.name == right.name && rt.name == from.name {
            (rc, lc)
        } else {
            bail!("ON clause must compare a column of {} with a column of {}", from.name, right.name)
        };
        if !left_key.sql_type.comparable_with(right_key.sql_type) {
            bail!(
                "Cannot join {} ({}) with {} ({})",
                left_key.name,
                left_key.sql_type,
                right_key.name,
                right_key.sql_type
            );
        }
        if left_key.name.eq_ignore_ascii_case(&right_key.name) {
            scope.shared_key = Some(left_key.name.clone());
        }
        plan = Operator::Join(ir::Join {
            left: Box::new(plan),
            right: Box::new(scan(right)),
            left_key: left_key.name.clone(),
            right_key: right_key.name.clone(),
            binding: bindings.next(),
        });
    }

    if let Some(w) = &ss.r#where {
        plan = Operator::Selection(ir::Selection {
            predicate: expr_to_predicate(w, &scope)?,
            source: Box::new(plan),
            binding: bindings.next(),
        });
    }

    let items = &ss.select.items;
    let has_aggregates = items.iter().any(|i| matches!(i, ast::SelItem::Aggregate(_)));
    let attributes: Vec<String>;
    if has_aggregates || !ss.group_by.is_empty() {
        if items.iter().any(|i| i.is_star()) {
            bail!("Cannot select * together with aggregates or GROUP BY");
        }
        let mut group_by = vec![];
        for c in &ss.group_by {
            group_by.push(scope.resolve(c)?.1.name.clone());
        }
        let mut aggregates = vec![];
        let mut names = vec![];
        for item in items {
            match item {
                ast::SelItem::Aggregate(call) => {
                    let agg = aggregate_call_to_ir(call, &scope)?;
                    names.push(agg.output.clone());
                    aggregates.push(agg);
                }
                ast::SelItem::ColName(c) => {
                    let name = scope.resolve(c)?.1.name.clone();
                    if !group_by.contains(&name) {
                        bail!(
                            "Column {} must appear in GROUP BY or be used in an aggregate",
                            c
                        );
                    }
                    names.push(name);
                }
                ast::SelItem::Star => unreachable!(),
            }
        }
        let produced: Vec<String> = group_by
            .iter()
            .cloned()
            .chain(aggregates.iter().map(|a| a.output.clone()))
            .collect();
        plan = Operator::Aggregation(ir::Aggregation {
            group_by,
            aggregates,
            source: Box::new(plan),
            binding: bindings.next(),
        });
        if names == produced {
            // The aggregation already yields exactly the select list.
            return Ok(plan);
        }
        attributes = names;
    } else {
        if items.len() == 1 && items[0].is_star() {
            // No projection needed if all columns selected.
            return Ok(plan);
        }
        let mut names = vec![];
        for item in items {
            match item {
                ast::SelItem::Star => names.extend(scope.all_columns()),
                ast::SelItem::ColName(c) => names.push(scope.resolve(c)?.1.name.clone()),
                ast::SelItem::Aggregate(_) => unreachable!(),
            }
        }
        attributes = names;
    }
    Ok(Operator::Projection(ir::Projection {
        attributes,
        source: Box::new(plan),
        binding: bindings.next(),
    }))
}

/// Resolves one column of an ON clause. The clash check of `Scope::resolve` cannot apply yet,
/// because it depends on the join keys.
fn join_side<'a>(
    c: &ast::ColName,
    scope: &Scope<'a>,
    from: &'a TableSchema,
    right: &'a TableSchema,
) -> Result<(&'a TableSchema, &'a Column)> {
    if c.table.is_some() {
        return scope.resolve_unchecked(c);
    }
    match (from.column(&c.name), right.column(&c.name)) {
        (Some(l), None) => Ok((from, l)),
        (None, Some(r)) => Ok((right, r)),
        (Some(_), Some(_)) => bail!("Column {} is ambiguous in ON clause", c),
        (None, None) => bail!("Unknown column {}", c),
    }
}

impl<'a> Scope<'a> {
    /// like `resolve`, but without rejecting names that clash across joined tables.
    fn resolve_unchecked(&self, c: &ast::ColName) -> Result<(&'a TableSchema, &'a Column)> {
        let Some(t) = c.table.as_deref() else {
            bail!("Column {} needs a table qualifier", c)
        };
        let Some(table) = self.table(t) else {
            bail!("Unknown table {} in column reference {}", t, c)
        };
        match table.column(&c.name) {
            Some(col) => Ok((table, col)),
            None => bail!("Unknown column {}", c),
        }
    }
}

#[cfg(test)]
fn test_schema() -> Schema {
    use crate::ir::Binding;
    use crate::schema::person_table;
    use crate::sql_type::SqlType;
    let mut s = Schema::new();
    s.add_table(person_table()).unwrap();
    s.add_table(TableSchema {
        name: "Pet".to_string(),
        source: Binding::rows_of("pet"),
        columns: vec![
            Column::new("owner", SqlType::Text),
            Column::new("name", SqlType::Text),
            Column::new("legs", SqlType::Int),
        ],
    })
    .unwrap();
    s
}

#[cfg(test)]
fn plan(query: &str) -> Result<Operator> {
    let ss = crate::pt_to_ast::pt_select_statement_to_ast(query)?;
    ast_select_statement_to_ir(&ss, &test_schema())
}

#[test]
fn test_ast_select_statement_to_ir() {
    struct Case {
        desc: &'static str,
        expected: Result<&'static str, ()>,
    }
    let cases: Vec<Case> = vec![
        Case {
            desc: "select * from person",
            expected: Ok("Scan person_rows Person"),
        },
        Case {
            desc: "select NAME from Person",
            expected: Ok("Projection r1 [\"name\"]\n  Scan person_rows Person"),
        },
        Case {
            desc: "select name, age, name from Person where age >= 18 and name <> 'x'",
            expected: Ok("Projection r2 [\"name\", \"age\", \"name\"]\n  Selection r1 (age >= 18 and name <> 'x')\n    Scan person_rows Person"),
        },
        Case {
            desc: "select age, count(*) as n, max(age) from Person group by age",
            expected: Ok("Aggregation r1 by [\"age\"] [count(*) as n, max(age) as max_age]\n  Scan person_rows Person"),
        },
        Case {
            desc: "select count(*) as n, age from Person group by age",
            expected: Ok("Projection r2 [\"n\", \"age\"]\n  Aggregation r1 by [\"age\"] [count(*) as n]\n    Scan person_rows Person"),
        },
        Case {
            desc: "select age, legs from Person join Pet on Pet.owner = Person.name where legs > 2",
            expected: Ok("Projection r3 [\"age\", \"legs\"]\n  Selection r2 legs > 2\n    Join r1 name = owner\n      Scan person_rows Person\n      Scan pet_rows Pet"),
        },
        Case {
            desc: "select * , age from Person",
            expected: Ok("Projection r1 [\"name\", \"age\", \"age\"]\n  Scan person_rows Person"),
        },
        Case { desc: "select salary from Person", expected: Err(()) },
        Case { desc: "select name from Car", expected: Err(()) },
        Case { desc: "select name, count(*) from Person", expected: Err(()) },
        Case { desc: "select *, count(*) from Person", expected: Err(()) },
        Case { desc: "select sum(name) from Person", expected: Err(()) },
        Case { desc: "select age from Person where name = 3", expected: Err(()) },
        Case { desc: "select name from Person join Pet on owner = name", expected: Err(()) },
        Case { desc: "select age from Person join Pet on owner = Person.name", expected: Ok("Projection r2 [\"age\"]\n  Join r1 name = owner\n    Scan person_rows Person\n    Scan pet_rows Pet") },
        Case { desc: "select age from Person join Person on age = age", expected: Err(()) },
        Case { desc: "select Pet.name from Person join Pet on owner = Person.name", expected: Err(()) },
        Case { desc: "select age from Person join Pet on legs = Person.name", expected: Err(()) },
    ];
    for case in cases {
        println!("Running case: {}", case.desc);
        let actual = plan(case.desc);
        match (actual, case.expected) {
            (Ok(p), Ok(e)) => assert_eq!(format!("{}", p), e),
            (Err(e), Err(())) => println!("Actual's error: {}", e),
            (a, e) => panic!("case {}: got {:?}, expected {:?}", case.desc, a.map(|p| p.to_string()), e),
        }
    }
}

#[test]
fn test_plans_are_well_formed() {
    let p = plan("select age, legs from Person join Pet on Pet.owner = Person.name where legs > 2 or age < 3")
        .unwrap();
    assert!(p.validate().is_ok());
    for op in p.post_order() {
        assert_eq!(op.operands().len(), op.kind().arity());
    }
}
