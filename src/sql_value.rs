//! Defines an enum of all the possible values that a row field can hold.

use std::cmp::Ordering;

use proc_macro2::{Literal, TokenStream};
use quote::{quote, ToTokens};

use crate::sql_type::SqlType;

#[derive(Debug, Clone, PartialEq)]
/// can hold any value that can be stored in a row.
/// Values are any of the types of a `sql_type::SqlType`, or `NULL`.
pub enum SqlValue {
    Int(i64),
    Text(String),
    Real(f64),
    Bool(bool),
    Null(),
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Int(x) => x.fmt(f),
            SqlValue::Text(x) => x.fmt(f),
            SqlValue::Real(x) => x.fmt(f),
            SqlValue::Bool(x) => x.fmt(f),
            SqlValue::Null() => "NULL".fmt(f),
        }
    }
}

impl SqlValue {
    /// the type of a non-null value.
    pub fn sql_type(&self) -> Option<SqlType> {
        match self {
            SqlValue::Int(_) => Some(SqlType::Int),
            SqlValue::Text(_) => Some(SqlType::Text),
            SqlValue::Real(_) => Some(SqlType::Real),
            SqlValue::Bool(_) => Some(SqlType::Bool),
            SqlValue::Null() => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null())
    }

    /// Compares two values the way a SQL comparison would.
    /// Integers widen to reals. `NULL` and mismatched types are incomparable.
    pub fn sql_cmp(&self, other: &SqlValue) -> Option<Ordering> {
        use SqlValue::*;
        match (self, other) {
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Real(a), Real(b)) => a.partial_cmp(b),
            (Int(a), Real(b)) => (*a as f64).partial_cmp(b),
            (Real(a), Int(b)) => a.partial_cmp(&(*b as f64)),
            (Text(a), Text(b)) => Some(a.cmp(b)),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Numeric view of the value, used by `sum` and `avg`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Int(i) => Some(*i as f64),
            SqlValue::Real(f) => Some(*f),
            _ => None,
        }
    }

}

/// the expression that rebuilds this value in generated code.
impl ToTokens for SqlValue {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        tokens.extend(match self {
            SqlValue::Int(i) => {
                let i = Literal::i64_unsuffixed(*i);
                quote!(SqlValue::Int(#i))
            }
            SqlValue::Text(s) => quote!(SqlValue::Text(#s.to_string())),
            SqlValue::Real(f) if f.is_nan() => quote!(SqlValue::Real(f64::NAN)),
            SqlValue::Real(f) if *f == f64::INFINITY => quote!(SqlValue::Real(f64::INFINITY)),
            SqlValue::Real(f) if *f == f64::NEG_INFINITY => quote!(SqlValue::Real(f64::NEG_INFINITY)),
            SqlValue::Real(f) => {
                let f = Literal::f64_unsuffixed(*f);
                quote!(SqlValue::Real(#f))
            }
            SqlValue::Bool(b) => quote!(SqlValue::Bool(#b)),
            SqlValue::Null() => quote!(SqlValue::Null()),
        });
    }
}

use crate::ast;
pub fn from_ast_constant(c: &ast::Constant) -> SqlValue {
    match c {
        ast::Constant::Int(i) => SqlValue::Int(*i),
        ast::Constant::String(s) => SqlValue::Text(s.clone()),
        ast::Constant::Real(f) => SqlValue::Real(*f),
        ast::Constant::Bool(b) => SqlValue::Bool(*b),
        ast::Constant::Null() => SqlValue::Null(),
    }
}

#[test]
fn test_sql_cmp() {
    use SqlValue::*;
    assert_eq!(Int(1).sql_cmp(&Int(2)), Some(Ordering::Less));
    assert_eq!(Int(2).sql_cmp(&Real(1.5)), Some(Ordering::Greater));
    assert_eq!(Text("a".to_string()).sql_cmp(&Text("a".to_string())), Some(Ordering::Equal));
    assert_eq!(Null().sql_cmp(&Null()), None);
    assert_eq!(Text("1".to_string()).sql_cmp(&Int(1)), None);
}

#[test]
fn test_value_tokens() {
    let cases = vec![
        (SqlValue::Int(7), "SqlValue::Int(7)"),
        (SqlValue::Text("Ann".to_string()), "SqlValue::Text(\"Ann\".to_string())"),
        (SqlValue::Real(1.0), "SqlValue::Real(1.0)"),
        (SqlValue::Real(f64::INFINITY), "SqlValue::Real(f64::INFINITY)"),
        (SqlValue::Real(f64::NEG_INFINITY), "SqlValue::Real(f64::NEG_INFINITY)"),
        (SqlValue::Real(f64::NAN), "SqlValue::Real(f64::NAN)"),
        (SqlValue::Bool(true), "SqlValue::Bool(true)"),
        (SqlValue::Null(), "SqlValue::Null()"),
    ];
    for (value, expected) in cases {
        let expected: TokenStream = expected.parse().unwrap();
        assert_eq!(value.to_token_stream().to_string(), expected.to_string());
    }
}
