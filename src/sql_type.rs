//! Defines an enum of the basic column types an attribute can have, and routines for conversion to and from string.
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// These are the column types the planning oracle understands.
/// Notes:
///   - Type name aliases like `varchar` for `text` are accepted when parsing, but `Display` always
///     prints the canonical DDL name.
pub enum SqlType {
    Int,
    Text,
    Real,
    Bool,
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlType::Int => "integer".fmt(f),
            SqlType::Text => "text".fmt(f),
            SqlType::Real => "real".fmt(f),
            SqlType::Bool => "boolean".fmt(f),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Unable to parse SqlType from type name: {0}.")]
    ParseSqlTypeError(String),
}

impl FromStr for SqlType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "int" | "integer" | "bigint" | "long" => Ok(SqlType::Int),
            "text" | "string" | "varchar" => Ok(SqlType::Text),
            "real" | "double" | "float" => Ok(SqlType::Real),
            "bool" | "boolean" => Ok(SqlType::Bool),
            x => Err(Error::ParseSqlTypeError(String::from(x))),
        }
    }
}

impl SqlType {
    /// true when values of both types can be compared with `<`, `=`, etc.
    pub fn comparable_with(&self, other: SqlType) -> bool {
        use SqlType::*;
        matches!(
            (self, other),
            (Int, Int) | (Int, Real) | (Real, Int) | (Real, Real) | (Text, Text) | (Bool, Bool)
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, SqlType::Int | SqlType::Real)
    }
}

#[test]
fn test_sql_type_from_str() {
    let cases = vec![
        ("int", Ok(SqlType::Int)),
        ("INTEGER", Ok(SqlType::Int)),
        (" text ", Ok(SqlType::Text)),
        ("varchar", Ok(SqlType::Text)),
        ("Real", Ok(SqlType::Real)),
        ("boolean", Ok(SqlType::Bool)),
        ("blob", Err(Error::ParseSqlTypeError("blob".to_string()))),
    ];
    for (input, expected) in cases {
        assert_eq!(SqlType::from_str(input), expected, "input: {}", input);
    }
}

#[test]
fn test_sql_type_display_is_canonical() {
    assert_eq!(format!("{}", SqlType::from_str("long").unwrap()), "integer");
    assert_eq!(format!("{}", SqlType::Bool), "boolean");
}
