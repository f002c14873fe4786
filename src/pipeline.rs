//! Pipeline statements: the ordered, target-independent instructions a method body is made of.
//!
//! A statement reads "bind `result` to the value of `operation` applied to `inputs`". Every binding
//! except the last names a lazy sequence of rows: a function that produces the sequence each time it
//! is called. The last statement of a method binds [`Binding::output`] by marshalling the final
//! sequence into the declared return type.

use itertools::Itertools;

use crate::ir::{Aggregate, Binding, Predicate};

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// keep `attributes`, in order, from every row.
    Project { attributes: Vec<String> },
    /// keep the rows satisfying `predicate`.
    Filter { predicate: Predicate },
    /// pair rows of the two inputs whose keys are equal.
    Join { left_key: String, right_key: String },
    Aggregate {
        group_by: Vec<String>,
        aggregates: Vec<Aggregate>,
    },
    /// marshal rows into a collection of `type_name`.
    FromSequence { type_name: String },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Project { .. } => "project",
            Operation::Filter { .. } => "filter",
            Operation::Join { .. } => "join",
            Operation::Aggregate { .. } => "aggregate",
            Operation::FromSequence { .. } => "from_sequence",
        }
    }

    /// how many inputs a statement with this operation takes.
    pub fn arity(&self) -> usize {
        match self {
            Operation::Join { .. } => 2,
            _ => 1,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Project { attributes } => write!(f, "project[{}]", attributes.join(", ")),
            Operation::Filter { predicate } => write!(f, "filter[{}]", predicate),
            Operation::Join {
                left_key,
                right_key,
            } => write!(f, "join[{} = {}]", left_key, right_key),
            Operation::Aggregate {
                group_by,
                aggregates,
            } => write!(
                f,
                "aggregate[by {}; {}]",
                group_by.join(", "),
                aggregates.iter().join(", ")
            ),
            Operation::FromSequence { type_name } => write!(f, "from_sequence[{}]", type_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub result: Binding,
    pub operation: Operation,
    pub inputs: Vec<Binding>,
}

impl Statement {
    pub fn new(result: Binding, operation: Operation, inputs: Vec<Binding>) -> Statement {
        Statement {
            result,
            operation,
            inputs,
        }
    }

    /// the closing statement of every method body.
    pub fn from_sequence(input: Binding, type_name: &str) -> Statement {
        Statement {
            result: Binding::output(),
            operation: Operation::FromSequence {
                type_name: String::from(type_name.trim()),
            },
            inputs: vec![input],
        }
    }

    pub fn is_output(&self) -> bool {
        self.result == Binding::output()
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} = {}({})",
            self.result,
            self.operation,
            self.inputs.iter().join(", ")
        )
    }
}

#[test]
fn test_statement_display() {
    let s = Statement::new(
        Binding::new("r1"),
        Operation::Project {
            attributes: vec!["name".to_string()],
        },
        vec![Binding::rows_of("person")],
    );
    assert_eq!(format!("{}", s), "r1 = project[name](person_rows)");
    let out = Statement::from_sequence(Binding::new("r1"), " model.Person");
    assert_eq!(format!("{}", out), "output = from_sequence[model.Person](r1)");
    assert!(out.is_output());
    assert_eq!(out.operation.name(), "from_sequence");
}
