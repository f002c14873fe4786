//! Defines the `Schema` handed to the planning oracle: one table per method parameter type.
//!
//! Tables and columns are looked up ignoring ASCII case, the way unquoted SQL identifiers are
//! resolved. The declared spelling is the one that ends up in the plan.

use indexmap::IndexMap;

use crate::ir::Binding;
use crate::sql_type::SqlType;

/// A named, typed attribute of a user type, and the column it becomes in the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
}

impl Column {
    pub fn new(name: &str, sql_type: SqlType) -> Column {
        Column {
            name: String::from(name),
            sql_type,
        }
    }
}

/// Traits common to anything that describes a table.
pub trait TableMeta {
    fn table_name(&self) -> String;
    fn column_names(&self) -> Vec<String>;
    fn column_types(&self) -> Vec<SqlType>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    /// the binding that holds this table's rows in the generated method.
    pub source: Binding,
    pub columns: Vec<Column>,
}

impl TableMeta for TableSchema {
    fn table_name(&self) -> String {
        self.name.clone()
    }
    fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
    fn column_types(&self) -> Vec<SqlType> {
        self.columns.iter().map(|c| c.sql_type).collect()
    }
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn creation_sql(&self) -> String {
        use itertools::Itertools;
        format!(
            "CREATE TABLE {} ({})",
            self.name,
            self.columns
                .iter()
                .map(|c| format!("{} {}", c.name, c.sql_type))
                .join(", ")
        )
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Table {0} is defined more than once.")]
    DuplicateTable(String),
    #[error("Table {0} has no columns.")]
    NoColumns(String),
    #[error("Table {table} defines column {column} more than once.")]
    DuplicateColumn { table: String, column: String },
}

/// An ordered collection of tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    // Keyed by lowercased table name.
    tables: IndexMap<String, TableSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Schema {
            tables: IndexMap::new(),
        }
    }

    pub fn add_table(&mut self, table: TableSchema) -> Result<(), Error> {
        if table.columns.is_empty() {
            return Err(Error::NoColumns(table.name));
        }
        for (i, c) in table.columns.iter().enumerate() {
            if table.columns[..i]
                .iter()
                .any(|d| d.name.eq_ignore_ascii_case(&c.name))
            {
                return Err(Error::DuplicateColumn {
                    table: table.name.clone(),
                    column: c.name.clone(),
                });
            }
        }
        let key = table.name.to_lowercase();
        if self.tables.contains_key(&key) {
            return Err(Error::DuplicateTable(table.name));
        }
        self.tables.insert(key, table);
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(&name.to_lowercase())
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// DDL for every table, one statement per line.
    pub fn creation_sql(&self) -> String {
        let mut result = String::new();
        for t in self.tables.values() {
            result.push_str(&t.creation_sql());
            result.push_str(";\n");
        }
        result
    }
}

#[cfg(test)]
pub fn person_table() -> TableSchema {
    TableSchema {
        name: "Person".to_string(),
        source: Binding::rows_of("person"),
        columns: vec![
            Column::new("name", SqlType::Text),
            Column::new("age", SqlType::Int),
        ],
    }
}

#[test]
fn test_schema_lookup_ignores_case() {
    let mut s = Schema::new();
    s.add_table(person_table()).unwrap();
    let t = s.table("PERSON").unwrap();
    assert_eq!(t.table_name(), "Person");
    assert_eq!(t.column("NAME").unwrap().name, "name");
    assert!(t.column("salary").is_none());
    assert_eq!(t.column_types(), vec![SqlType::Text, SqlType::Int]);
}

#[test]
fn test_schema_rejects_bad_tables() {
    let mut s = Schema::new();
    s.add_table(person_table()).unwrap();
    assert_eq!(
        s.add_table(person_table()),
        Err(Error::DuplicateTable("Person".to_string()))
    );
    let mut empty = person_table();
    empty.name = "Empty".to_string();
    empty.columns.clear();
    assert_eq!(s.add_table(empty), Err(Error::NoColumns("Empty".to_string())));
    let mut dup = person_table();
    dup.name = "Dup".to_string();
    dup.columns.push(Column::new("Name", SqlType::Text));
    assert!(matches!(s.add_table(dup), Err(Error::DuplicateColumn { .. })));
}

#[test]
fn test_creation_sql() {
    let mut s = Schema::new();
    s.add_table(person_table()).unwrap();
    assert_eq!(
        s.creation_sql(),
        "CREATE TABLE Person (name text, age integer);\n"
    );
}
