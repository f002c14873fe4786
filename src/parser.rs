//! `parser` contains generated parsing routines for SQL and tests on them.

use pest::iterators::Pairs;
use pest::pratt_parser::PrattParser;

use crate::ast;

#[allow(unused_imports)]
use pest::Parser; // This needs to be in scope for the next statements to work.
#[derive(Parser)]
#[grammar = "sql.pest"]
pub struct SQLParser;

// From: https://pest.rs/book/examples/calculator.html, MIT,Apache2.0 licenses.
lazy_static::lazy_static! {
    pub static ref PRATT_PARSER: PrattParser<Rule> = {
        use pest::pratt_parser::{Assoc::*, Op};
        use Rule::*;

        // Precedence is defined lowest to highest
        PrattParser::new()
            .op(Op::infix(or_op, Left))
            .op(Op::infix(and_op, Left))
    };
}

/// builds a boolean expression from the inner pairs of a `predicate` rule.
pub fn parse_predicate(pairs: Pairs<Rule>) -> anyhow::Result<ast::Expr> {
    PRATT_PARSER
        .map_primary(|primary| match primary.as_rule() {
            Rule::comparison => crate::pt_to_ast::parse_comparison(primary),
            Rule::predicate => parse_predicate(primary.into_inner()),
            rule => unreachable!("parse_predicate expected comparison, found {:?}", rule),
        })
        .map_infix(|lhs, op, rhs| {
            let (lhs, rhs) = (Box::new(lhs?), Box::new(rhs?));
            Ok(match op.as_rule() {
                Rule::and_op => ast::Expr::And(lhs, rhs),
                Rule::or_op => ast::Expr::Or(lhs, rhs),
                rule => unreachable!("parse_predicate expected infix operation, found {:?}", rule),
            })
        })
        .parse(pairs)
}

#[test]
fn test_parse_literals() {
    let cases = vec![
        ("1"),
        ("1000000000000"),
        ("-1000000000000"),
        ("1.01"),
        ("123456789.987654321"),
        ("'hi'"),
        ("''"),
        ("true"),
        ("tRuE"),
        ("FALSE"),
        ("null"),
        ("NULL"),
    ];
    for case in cases {
        let expr = format!("a = {}", case);
        assert!(
            SQLParser::parse(Rule::comparison, &expr).is_ok(),
            "case: {}",
            case
        );
    }
}

#[test]
fn test_not_parse_invalid_literals() {
    let cases = vec![("a = A"), ("a = the quick brown fox"), ("a = NIL"), ("a =")];
    for case in cases {
        let parsed = SQLParser::parse(Rule::comparison, case);
        // A partial match is still a failure to parse the whole comparison.
        let whole = parsed.map(|mut p| p.next().unwrap().as_str().len() == case.len());
        assert!(!matches!(whole, Ok(true)), "case: {}", case);
    }
}

#[test]
fn test_parse_select_statement() {
    let cases = vec![
        ("SELECT * FROM tbl"),
        ("select a,b,c fRoM tbl"),
        ("select t.a from t"),
        ("select name from Person;"),
        ("select count(*) from t"),
        ("select dept, count(*) as n, avg(salary) from emp group by dept"),
        ("select a from t where a = 1"),
        ("select a from t where a = 1 and b <> 'x' or c >= 2.5"),
        ("select a from t where (a = 1 or a = 2) and b = true"),
        ("select a from t join u on t.id = u.t_id"),
        ("select a from t inner join u on id = t_id where u.x < 3"),
        ("select orders from t where origin = 'x'"), // keyword prefixes are identifiers.
    ];

    for case in cases {
        match SQLParser::parse(Rule::select_stmt, case) {
            Ok(_) => continue,
            Err(e) => panic!("Error parsing [{}] : {}", case, e),
        }
    }
}

#[test]
fn test_not_parse_invalid_select_statement() {
    let cases = vec![
        ("CREATE * FROM tbl"),
        ("FROM blahblah"),
        ("select 1"),
        ("select a"),
        ("select a from"),
        ("select from t"),
        ("select a from t where"),
        ("select a from t group by"),
        ("select a from t join u"),
        ("select a, from t"),
        ("project name from Person"),
    ];

    for case in cases {
        assert!(
            SQLParser::parse(Rule::select_stmt, case).is_err(),
            "case: {}",
            case
        );
    }
}
