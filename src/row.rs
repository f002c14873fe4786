//! provides the row-shaped representation that flows between pipeline stages.
//! A row maps attribute names to values. Insertion order is kept, and inserting an existing
//! name overwrites its value in place.
use indexmap::IndexMap;

use crate::sql_value::SqlValue;

/// can hold a sequence of named values of any of the SQL types.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub items: IndexMap<String, SqlValue>,
}

impl Row {
    pub fn new() -> Self {
        Row {
            items: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: SqlValue) {
        self.items.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.items.get(name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// appends all of `other`'s fields, overwriting fields with the same name.
    pub fn extend(&mut self, other: &Row) {
        for (k, v) in other.items.iter() {
            self.items.insert(k.clone(), v.clone());
        }
    }
}

impl<S: Into<String>> FromIterator<(S, SqlValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (S, SqlValue)>>(iter: I) -> Self {
        Row {
            items: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl std::fmt::Display for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use itertools::Itertools;
        write!(
            f,
            "{{{}}}",
            self.items.iter().map(|(k, v)| format!("{k}: {v}")).join(", ")
        )
    }
}

#[test]
fn test_row_insert_overwrites_in_place() {
    use SqlValue::*;
    let mut r = Row::new();
    r.insert("a", Int(1));
    r.insert("b", Int(2));
    r.insert("a", Int(3));
    assert_eq!(r.column_names(), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(r.get("a"), Some(&Int(3)));
    assert_eq!(format!("{}", r), "{a: 3, b: 2}");
}

#[test]
fn test_row_extend() {
    use SqlValue::*;
    let mut left: Row = vec![("id", Int(1)), ("name", Text("x".to_string()))]
        .into_iter()
        .collect();
    let right: Row = vec![("id", Int(1)), ("city", Text("y".to_string()))]
        .into_iter()
        .collect();
    left.extend(&right);
    assert_eq!(left.column_names(), vec!["id", "name", "city"]);
}
