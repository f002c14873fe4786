//! converts between user types and rows.
//!
//! Each user type declares an [`AccessorTable`]: for every attribute, its column type and a pair of
//! typed get/set functions. The table is built once, when the type's [`Marshaler`] is created, and
//! attributes are then read and written by name through it.
//!
//! Accessor failures are per field. A field that cannot be read or written is logged and left out;
//! the rest of the row or object is still produced.

use indexmap::IndexMap;
use tracing::warn;

use crate::row::Row;
use crate::schema::Column;
use crate::sql_type::SqlType;
use crate::sql_value::SqlValue;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("{type_name} has no attribute named {attribute}.")]
    UnknownAttribute { type_name: String, attribute: String },
    #[error("Cannot assign {value} to {type_name}.{attribute}, which is {expected}.")]
    TypeMismatch {
        type_name: String,
        attribute: String,
        expected: SqlType,
        value: SqlValue,
    },
}

pub type Getter<T> = fn(&T) -> SqlValue;
pub type Setter<T> = fn(&mut T, SqlValue) -> Result<(), SqlValue>;

/// a typed get/set pair for one attribute.
pub struct Accessor<T> {
    pub sql_type: SqlType,
    pub get: Getter<T>,
    /// hands the value back when it does not fit the attribute.
    pub set: Setter<T>,
}

impl<T> Clone for Accessor<T> {
    fn clone(&self) -> Self {
        Accessor {
            sql_type: self.sql_type,
            get: self.get,
            set: self.set,
        }
    }
}

/// maps attribute names of `T` to their accessors, in declaration order.
pub struct AccessorTable<T> {
    type_name: String,
    entries: IndexMap<String, Accessor<T>>,
}

impl<T> AccessorTable<T> {
    pub fn new(type_name: &str) -> Self {
        AccessorTable {
            type_name: String::from(type_name),
            entries: IndexMap::new(),
        }
    }

    /// registers an attribute. Registering a name again replaces the earlier accessor.
    pub fn with(mut self, name: &str, sql_type: SqlType, get: Getter<T>, set: Setter<T>) -> Self {
        self.entries
            .insert(String::from(name), Accessor { sql_type, get, set });
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn columns(&self) -> Vec<Column> {
        self.entries
            .iter()
            .map(|(name, a)| Column::new(name, a.sql_type))
            .collect()
    }

    pub fn get(&self, obj: &T, attribute: &str) -> Result<SqlValue, Error> {
        let accessor = self.lookup(attribute)?;
        Ok((accessor.get)(obj))
    }

    pub fn set(&self, obj: &mut T, attribute: &str, value: SqlValue) -> Result<(), Error> {
        let accessor = self.lookup(attribute)?;
        (accessor.set)(obj, value).map_err(|value| Error::TypeMismatch {
            type_name: self.type_name.clone(),
            attribute: String::from(attribute),
            expected: accessor.sql_type,
            value,
        })
    }

    fn lookup(&self, attribute: &str) -> Result<&Accessor<T>, Error> {
        self.entries
            .get(attribute)
            .ok_or_else(|| Error::UnknownAttribute {
                type_name: self.type_name.clone(),
                attribute: String::from(attribute),
            })
    }
}

/// A user type that generated methods accept and return.
/// `Default` is the zero-argument constructor used when rebuilding objects from rows.
pub trait Entity: Default + 'static {
    /// the type name as written in method descriptors, e.g. `model.Person`.
    fn type_name() -> &'static str;
    fn accessors() -> AccessorTable<Self>;
}

/// converts values of `T` to rows and back.
pub struct Marshaler<T> {
    table: AccessorTable<T>,
}

impl<T: Entity> Default for Marshaler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Marshaler<T> {
    pub fn new() -> Self {
        Marshaler {
            table: T::accessors(),
        }
    }

    /// one field per declared attribute.
    pub fn to_row(&self, obj: &T) -> Row {
        self.table
            .entries
            .iter()
            .map(|(name, a)| (name.clone(), (a.get)(obj)))
            .collect()
    }

    pub fn to_rows(&self, objs: &[T]) -> Vec<Row> {
        objs.iter().map(|o| self.to_row(o)).collect()
    }

    /// Builds a `T` from the fields of `row` that name declared attributes.
    /// Fields that are unknown or hold a value of the wrong type are logged and skipped.
    pub fn from_row(&self, row: &Row) -> T {
        let mut obj = T::default();
        for (name, value) in row.items.iter() {
            if let Err(e) = self.table.set(&mut obj, name, value.clone()) {
                warn!("{}", e);
            }
        }
        obj
    }

    /// collects a sequence of rows into objects. Absent rows are skipped.
    pub fn from_sequence<I>(&self, rows: I) -> Vec<T>
    where
        I: IntoIterator<Item = Option<Row>>,
    {
        rows.into_iter()
            .filter_map(|r| match r {
                Some(row) => Some(self.from_row(&row)),
                None => {
                    warn!("Skipping absent row while building {}", self.table.type_name);
                    None
                }
            })
            .collect()
    }
}

/// Setter helpers for the common attribute types. Integers widen into real attributes;
/// `NULL` resets the attribute to its default.
pub fn set_text(slot: &mut String, v: SqlValue) -> Result<(), SqlValue> {
    match v {
        SqlValue::Text(s) => *slot = s,
        SqlValue::Null() => slot.clear(),
        v => return Err(v),
    }
    Ok(())
}

pub fn set_int(slot: &mut i64, v: SqlValue) -> Result<(), SqlValue> {
    match v {
        SqlValue::Int(i) => *slot = i,
        SqlValue::Null() => *slot = 0,
        v => return Err(v),
    }
    Ok(())
}

pub fn set_real(slot: &mut f64, v: SqlValue) -> Result<(), SqlValue> {
    match v {
        SqlValue::Real(f) => *slot = f,
        SqlValue::Int(i) => *slot = i as f64,
        SqlValue::Null() => *slot = 0.0,
        v => return Err(v),
    }
    Ok(())
}

pub fn set_bool(slot: &mut bool, v: SqlValue) -> Result<(), SqlValue> {
    match v {
        SqlValue::Bool(b) => *slot = b,
        SqlValue::Null() => *slot = false,
        v => return Err(v),
    }
    Ok(())
}

#[cfg(test)]
pub mod fixtures {
    //! user types shared by tests across the crate.
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Person {
        pub name: String,
        pub age: i64,
        pub height: f64,
    }

    impl Entity for Person {
        fn type_name() -> &'static str {
            "model.Person"
        }
        fn accessors() -> AccessorTable<Self> {
            AccessorTable::<Self>::new(Self::type_name())
                .with(
                    "name",
                    SqlType::Text,
                    |p| SqlValue::Text(p.name.clone()),
                    |p, v| set_text(&mut p.name, v),
                )
                .with(
                    "age",
                    SqlType::Int,
                    |p| SqlValue::Int(p.age),
                    |p, v| set_int(&mut p.age, v),
                )
                .with(
                    "height",
                    SqlType::Real,
                    |p| SqlValue::Real(p.height),
                    |p, v| set_real(&mut p.height, v),
                )
        }
    }

    pub fn person(name: &str, age: i64, height: f64) -> Person {
        Person {
            name: name.to_string(),
            age,
            height,
        }
    }
}

#[test]
fn test_to_row_follows_declaration_order() {
    use fixtures::*;
    let m = Marshaler::<Person>::new();
    let row = m.to_row(&person("ann", 31, 1.7));
    assert_eq!(row.column_names(), vec!["name", "age", "height"]);
    assert_eq!(row.get("age"), Some(&SqlValue::Int(31)));
}

#[test]
fn test_from_row_skips_bad_fields() {
    use fixtures::*;
    let m = Marshaler::<Person>::new();
    let row: Row = vec![
        ("name", SqlValue::Text("bob".to_string())),
        ("age", SqlValue::Text("old".to_string())),
        ("shoe_size", SqlValue::Int(44)),
        ("height", SqlValue::Int(2)),
    ]
    .into_iter()
    .collect();
    let p = m.from_row(&row);
    assert_eq!(p, person("bob", 0, 2.0));
}

#[test]
fn test_accessor_errors() {
    use fixtures::*;
    let t = Person::accessors();
    let mut p = Person::default();
    assert_eq!(
        t.get(&p, "weight"),
        Err(Error::UnknownAttribute {
            type_name: "model.Person".to_string(),
            attribute: "weight".to_string()
        })
    );
    assert!(matches!(
        t.set(&mut p, "age", SqlValue::Bool(true)),
        Err(Error::TypeMismatch { expected: SqlType::Int, .. })
    ));
    assert!(t.set(&mut p, "age", SqlValue::Int(5)).is_ok());
    assert_eq!(p.age, 5);
}

#[test]
fn test_from_sequence_skips_absent_rows() {
    use fixtures::*;
    let m = Marshaler::<Person>::new();
    let rows = vec![Some(m.to_row(&person("a", 1, 1.0))), None, Some(m.to_row(&person("b", 2, 2.0)))];
    let people = m.from_sequence(rows);
    assert_eq!(people, vec![person("a", 1, 1.0), person("b", 2, 2.0)]);
}

#[cfg(test)]
mod proptests {
    use super::fixtures::*;
    use super::*;
    use proptest::prelude::*;

    fn arb_person() -> impl Strategy<Value = Person> {
        ("[a-z]{0,8}", any::<i64>(), -1.0e6f64..1.0e6f64).prop_map(|(name, age, height)| Person {
            name,
            age,
            height,
        })
    }

    proptest! {
        #[test]
        fn round_trip_preserves_declared_attributes(people in prop::collection::vec(arb_person(), 0..8)) {
            let m = Marshaler::<Person>::new();
            let rows = m.to_rows(&people).into_iter().map(Some);
            prop_assert_eq!(m.from_sequence(rows), people);
        }
    }
}
