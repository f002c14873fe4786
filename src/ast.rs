//! This module defines abstract syntax tree (AST) types for the SQL subset the bundled oracle plans.

use enum_as_inner::EnumAsInner;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectClause {
    pub items: Vec<SelItem>,
}

/// A column reference, optionally qualified by its table: `t.a` or `a`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColName {
    pub table: Option<String>,
    pub name: String,
}

impl ColName {
    pub fn bare(name: &str) -> ColName {
        ColName {
            table: None,
            name: String::from(name),
        }
    }
}

impl std::fmt::Display for ColName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.table {
            Some(t) => write!(f, "{}.{}", t, self.name),
            None => self.name.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl std::fmt::Display for AggFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use AggFunc::*;
        match self {
            Count => "count".fmt(f),
            Sum => "sum".fmt(f),
            Min => "min".fmt(f),
            Max => "max".fmt(f),
            Avg => "avg".fmt(f),
        }
    }
}

/// `count(*)` has no column argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggCall {
    pub func: AggFunc,
    pub arg: Option<ColName>,
    pub alias: Option<String>,
}

impl std::fmt::Display for AggCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.arg {
            Some(c) => write!(f, "{}({})", self.func, c)?,
            None => write!(f, "{}(*)", self.func)?,
        }
        if let Some(a) = &self.alias {
            write!(f, " AS {}", a)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, EnumAsInner)]
pub enum SelItem {
    ColName(ColName),
    Aggregate(AggCall),
    Star,
}

impl std::fmt::Display for SelItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelItem::ColName(x) => x.fmt(f),
            SelItem::Aggregate(x) => x.fmt(f),
            SelItem::Star => "*".fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromClause {
    pub tablename: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    pub tablename: String,
    pub lhs: ColName,
    pub rhs: ColName,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub select: SelectClause,
    pub from: FromClause,
    pub join: Option<JoinClause>,
    pub r#where: Option<Expr>,
    pub group_by: Vec<ColName>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    String(String),
    Real(f64),
    Bool(bool),
    Null(),
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Int(x) => x.fmt(f),
            Constant::String(x) => write!(f, "'{}'", x),
            Constant::Real(x) => x.fmt(f),
            Constant::Bool(x) => match x {
                true => "TRUE".fmt(f),
                false => "FALSE".fmt(f),
            },
            Constant::Null() => "NULL".fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl std::fmt::Display for CmpOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use CmpOp::*;
        match self {
            Eq => "=".fmt(f),
            NotEq => "<>".fmt(f),
            Lt => "<".fmt(f),
            LtEq => "<=".fmt(f),
            Gt => ">".fmt(f),
            GtEq => ">=".fmt(f),
        }
    }
}

/// A boolean WHERE expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Compare {
        col: ColName,
        op: CmpOp,
        value: Constant,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Compare { col, op, value } => write!(f, "{} {} {}", col, op, value),
            Expr::And(l, r) => write!(f, "({} AND {})", l, r),
            Expr::Or(l, r) => write!(f, "({} OR {})", l, r),
        }
    }
}
