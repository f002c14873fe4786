//! `pt_to_ast` has routines for converting parse trees to ASTs for SQL.
//! A Pest parse tree has one enum for all possible terminals and non-terminals.
//! Our AST has enums for groups of terminals that are used in the same production.
//! The AST also discards some lexical detail like keyword case and position in the input.

use anyhow::{anyhow, bail, Context, Result};
use pest::iterators::Pair;

use crate::ast;
use crate::parser::Rule;
use crate::parser::SQLParser;
use crate::pest::Parser;

fn parse_column_name(pair: Pair<Rule>) -> ast::ColName {
    let mut table = None;
    let mut name = String::new();
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::table_qualifier => table = Some(String::from(p.as_str())),
            Rule::column => name = String::from(p.as_str()),
            _ => unreachable!(),
        }
    }
    ast::ColName { table, name }
}

pub fn parse_literal_from_rule(pair: Pair<Rule>) -> Result<ast::Constant> {
    Ok(match pair.as_rule() {
        Rule::null_literal => ast::Constant::Null(),
        Rule::true_literal => ast::Constant::Bool(true),
        Rule::false_literal => ast::Constant::Bool(false),
        Rule::integer_literal => ast::Constant::Int(
            str::parse::<i64>(pair.as_str())
                .with_context(|| format!("Integer literal out of range: {}", pair.as_str()))?,
        ),
        Rule::decimal_literal => {
            // Danger: floating point conversion.
            ast::Constant::Real(str::parse::<f64>(pair.as_str())?)
        }
        Rule::single_quoted_string => {
            let inner = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            ast::Constant::String(String::from(inner))
        }
        Rule::double_quoted_string => {
            bail!("Double quoted strings are not valid string literals in SQL.")
        }
        r => bail!("parse_literal_from_rule does not handle {:?}", r),
    })
}

pub fn parse_comparison(pair: Pair<Rule>) -> Result<ast::Expr> {
    let mut inner = pair.into_inner();
    let col = parse_column_name(inner.next().ok_or_else(|| anyhow!("Missing column"))?);
    let op = match inner.next().map(|p| p.as_str()) {
        Some("=") => ast::CmpOp::Eq,
        Some("<>") | Some("!=") => ast::CmpOp::NotEq,
        Some("<") => ast::CmpOp::Lt,
        Some("<=") => ast::CmpOp::LtEq,
        Some(">") => ast::CmpOp::Gt,
        Some(">=") => ast::CmpOp::GtEq,
        x => bail!("Unexpected comparison operator: {:?}", x),
    };
    let value = parse_literal_from_rule(inner.next().ok_or_else(|| anyhow!("Missing literal"))?)?;
    Ok(ast::Expr::Compare { col, op, value })
}

fn parse_aggregate(pair: Pair<Rule>) -> Result<ast::AggCall> {
    let mut func = None;
    let mut arg = None;
    let mut alias = None;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::agg_func => {
                func = Some(match p.as_str().to_lowercase().as_str() {
                    "count" => ast::AggFunc::Count,
                    "sum" => ast::AggFunc::Sum,
                    "min" => ast::AggFunc::Min,
                    "max" => ast::AggFunc::Max,
                    "avg" => ast::AggFunc::Avg,
                    x => bail!("Unknown aggregate function {}", x),
                })
            }
            Rule::star => arg = None,
            Rule::column_name => arg = Some(parse_column_name(p)),
            Rule::alias => alias = Some(String::from(p.as_str())),
            _ => unreachable!(),
        }
    }
    let func = func.ok_or_else(|| anyhow!("Aggregate without a function name"))?;
    if arg.is_none() && func != ast::AggFunc::Count {
        bail!("Only count accepts *, found {}(*)", func);
    }
    Ok(ast::AggCall { func, arg, alias })
}

pub fn pt_select_statement_to_ast(query: &str) -> Result<ast::SelectStatement> {
    let select_stmt = SQLParser::parse(Rule::select_stmt, query)
        .map_err(|e| anyhow!("unsuccessful parse: {}", e))?
        .next()
        .ok_or_else(|| anyhow!("empty parse"))?;

    let mut items = vec![];
    let mut from = None;
    let mut join = None;
    let mut r#where = None;
    let mut group_by = vec![];

    for s in select_stmt.into_inner() {
        match s.as_rule() {
            Rule::select_items => {
                for t in s.into_inner() {
                    items.push(match t.as_rule() {
                        Rule::star => ast::SelItem::Star,
                        Rule::select_item => {
                            let u = t.into_inner().next().ok_or_else(|| anyhow!("empty item"))?;
                            match u.as_rule() {
                                Rule::column_name => ast::SelItem::ColName(parse_column_name(u)),
                                Rule::aggregate => ast::SelItem::Aggregate(parse_aggregate(u)?),
                                _ => bail!("Parse error in select item {}", u.as_str()),
                            }
                        }
                        _ => bail!("Parse error in select item {}", t.as_str()),
                    });
                }
            }
            Rule::table_identifier => {
                from = Some(ast::FromClause {
                    tablename: String::from(s.as_str()),
                });
            }
            Rule::join_clause => {
                let mut inner = s.into_inner();
                let tablename = inner.next().map(|p| String::from(p.as_str())).unwrap_or_default();
                let (lhs, rhs) = match (inner.next(), inner.next()) {
                    (Some(l), Some(r)) => (parse_column_name(l), parse_column_name(r)),
                    _ => bail!("JOIN needs two columns in its ON clause"),
                };
                join = Some(ast::JoinClause {
                    tablename,
                    lhs,
                    rhs,
                });
            }
            Rule::where_clause => {
                let predicate = s.into_inner().next().ok_or_else(|| anyhow!("empty WHERE"))?;
                r#where = Some(crate::parser::parse_predicate(predicate.into_inner())?);
            }
            Rule::group_by_clause => {
                group_by = s.into_inner().map(parse_column_name).collect();
            }
            Rule::EOI => (),
            _ => bail!("Unable to parse clause:  {} ", s.as_str()),
        }
    }
    Ok(ast::SelectStatement {
        select: ast::SelectClause { items },
        from: from.ok_or_else(|| anyhow!("Missing FROM clause"))?,
        join,
        r#where,
        group_by,
    })
}

#[cfg(test)]
fn ast_select_statement_to_tuple(ss: &ast::SelectStatement) -> (Vec<String>, Vec<String>) {
    let mut tables = vec![ss.from.tablename.clone()];
    if let Some(j) = &ss.join {
        tables.push(j.tablename.clone());
    }
    (tables, ss.select.items.iter().map(|i| format!("{}", i)).collect())
}

#[test]
fn test_parse_select_statement() {
    let cases = vec![
        ("SELECT * FROM tbl", (vec!["tbl"], vec!["*"])),
        ("select a,b,c fRoM tbl", (vec!["tbl"], vec!["a", "b", "c"])),
        ("select t.x, y from t", (vec!["t"], vec!["t.x", "y"])),
        (
            "select count(*), SUM(b) as total from tbl",
            (vec!["tbl"], vec!["count(*)", "sum(b) AS total"]),
        ),
        (
            "select a from t join u on t.id = u.id",
            (vec!["t", "u"], vec!["a"]),
        ),
    ];

    for case in cases {
        let input = case.0;
        println!("Input: {}", input);
        let actual = ast_select_statement_to_tuple(&pt_select_statement_to_ast(input).unwrap());
        let expected: (Vec<String>, Vec<String>) = (
            case.1 .0.iter().map(|x| String::from(*x)).collect(),
            case.1 .1.iter().map(|x| String::from(*x)).collect(),
        );
        assert_eq!(actual, expected);
    }
}

#[test]
fn test_parse_where_precedence() {
    let ss = pt_select_statement_to_ast("select a from t where a = 1 or b = 2 and c = 'x'").unwrap();
    // AND binds tighter than OR.
    assert_eq!(
        format!("{}", ss.r#where.unwrap()),
        "(a = 1 OR (b = 2 AND c = 'x'))"
    );
    let ss = pt_select_statement_to_ast("select a from t where (a = 1 or b = 2) and c <> NULL").unwrap();
    assert_eq!(
        format!("{}", ss.r#where.unwrap()),
        "((a = 1 OR b = 2) AND c <> NULL)"
    );
}

#[test]
fn test_parse_group_by_and_join() {
    let ss = pt_select_statement_to_ast(
        "select p.dept, count(*) as n from Person p_unused_alias_not_supported",
    );
    assert!(ss.is_err());
    let ss = pt_select_statement_to_ast(
        "select dept, max(age) from Person join Dept on Person.dept = Dept.name group by dept",
    )
    .unwrap();
    let j = ss.join.unwrap();
    assert_eq!(j.tablename, "Dept");
    assert_eq!(j.lhs, ast::ColName { table: Some("Person".to_string()), name: "dept".to_string() });
    assert_eq!(ss.group_by, vec![ast::ColName::bare("dept")]);
}

#[test]
fn test_parse_errors_are_reported_not_panicked() {
    let cases = vec![
        "select a from t where a = \"x\"",
        "select sum(*) from t",
        "select a from t where a = 99999999999999999999",
        "this is not sql",
    ];
    for case in cases {
        assert!(pt_select_statement_to_ast(case).is_err(), "case: {}", case);
    }
}
