//! method descriptors: what to compile.
//!
//! A class descriptor names the class to generate and lists its methods. Each method has a name,
//! its parameter types, a return type and a query. Descriptors can be written by hand or loaded
//! from a TOML file of parallel lists:
//!
//! ```toml
//! class = "dao.PersonDao"
//! method = ["getNames"]
//! params = ["Person"]
//! returnType = ["Person"]
//! query = ["SELECT name FROM Person"]
//!
//! [types.Person]
//! name = "text"
//! age = "int"
//! ```
//!
//! Any validation failure is fatal for the whole class.

use std::collections::HashSet;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::registry::{package_name, simple_name, TypeRegistry};
use crate::schema::Column;
use crate::sql_type::SqlType;

/// The return type name that means "returns nothing". Methods may not use it.
pub const VOID_TYPE: &str = "void";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Cannot read descriptor: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot parse descriptor: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Descriptor's {0} list is missing or empty.")]
    MissingList(&'static str),
    #[error("Descriptor lists {methods} methods, {params} parameter lists, {return_types} return types and {queries} queries.")]
    CountMismatch {
        methods: usize,
        params: usize,
        return_types: usize,
        queries: usize,
    },
    #[error("Descriptor has an empty class name.")]
    EmptyClassName,
    #[error("Method {0} returns void.")]
    VoidReturn(String),
    #[error("Method {method} takes more than one parameter of type {type_name}.")]
    DuplicateParameterType { method: String, type_name: String },
    #[error("Method {method} uses type {type_name}, which is not registered.")]
    UnknownType { method: String, type_name: String },
    #[error("Type {type_name} declares column {column} with an unknown type: {source}")]
    BadColumnType {
        type_name: String,
        column: String,
        source: crate::sql_type::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub method_name: String,
    pub input_params: Vec<String>,
    pub output_param: String,
    pub query: String,
}

impl MethodDescriptor {
    /// every type name this method mentions, parameters first.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.input_params
            .iter()
            .chain(std::iter::once(&self.output_param))
            .map(|t| t.trim())
    }

    fn validate(&self) -> Result<(), Error> {
        if self.output_param.trim() == VOID_TYPE {
            return Err(Error::VoidReturn(self.method_name.clone()));
        }
        let mut seen = HashSet::new();
        for p in &self.input_params {
            if !seen.insert(p.trim()) {
                return Err(Error::DuplicateParameterType {
                    method: self.method_name.clone(),
                    type_name: String::from(p.trim()),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDescriptor {
    pub absolute_name: String,
    pub methods: Vec<MethodDescriptor>,
}

impl ClassDescriptor {
    /// Builds a class descriptor from parallel per-method lists. Parameter lists are
    /// comma-separated type names.
    pub fn from_lists(
        absolute_name: &str,
        methods: Vec<String>,
        params: Vec<String>,
        return_types: Vec<String>,
        queries: Vec<String>,
    ) -> Result<ClassDescriptor, Error> {
        for (name, list) in [
            ("method", &methods),
            ("params", &params),
            ("returnType", &return_types),
            ("query", &queries),
        ] {
            if list.is_empty() {
                return Err(Error::MissingList(name));
            }
        }
        let n = methods.len();
        if params.len() != n || return_types.len() != n || queries.len() != n {
            return Err(Error::CountMismatch {
                methods: n,
                params: params.len(),
                return_types: return_types.len(),
                queries: queries.len(),
            });
        }
        let methods = methods
            .into_iter()
            .zip(params)
            .zip(return_types.into_iter().zip(queries))
            .map(|((name, params), (ret, query))| MethodDescriptor {
                method_name: String::from(name.trim()),
                input_params: split_params(&params),
                output_param: String::from(ret.trim()),
                query,
            })
            .collect();
        let class = ClassDescriptor {
            absolute_name: String::from(absolute_name.trim()),
            methods,
        };
        class.check_shape()?;
        Ok(class)
    }

    pub fn package(&self) -> &str {
        package_name(&self.absolute_name)
    }

    pub fn simple_name(&self) -> &str {
        simple_name(&self.absolute_name)
    }

    fn check_shape(&self) -> Result<(), Error> {
        if self.simple_name().is_empty() {
            return Err(Error::EmptyClassName);
        }
        if self.methods.is_empty() {
            return Err(Error::MissingList("method"));
        }
        self.methods.iter().try_for_each(|m| m.validate())
    }

    /// Checks the descriptor is well formed and every type it mentions is registered.
    pub fn validate(&self, registry: &TypeRegistry) -> Result<(), Error> {
        self.check_shape()?;
        for m in &self.methods {
            if let Some(t) = m.type_names().find(|t| !registry.contains(t)) {
                return Err(Error::UnknownType {
                    method: m.method_name.clone(),
                    type_name: String::from(t),
                });
            }
        }
        Ok(())
    }
}

fn split_params(params: &str) -> Vec<String> {
    params
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// the descriptor file as written.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDescriptor {
    class: String,
    method: Option<Vec<String>>,
    params: Option<Vec<String>>,
    #[serde(rename = "returnType")]
    return_type: Option<Vec<String>>,
    query: Option<Vec<String>>,
    #[serde(default)]
    types: IndexMap<String, IndexMap<String, String>>,
}

/// A loaded descriptor file: the class to compile, and the attribute shapes of the types it
/// declares.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub class: ClassDescriptor,
    pub types: IndexMap<String, Vec<Column>>,
}

impl Descriptor {
    pub fn parse(text: &str) -> Result<Descriptor, Error> {
        let raw: RawDescriptor = toml::from_str(text)?;
        let class = ClassDescriptor::from_lists(
            &raw.class,
            raw.method.ok_or(Error::MissingList("method"))?,
            raw.params.ok_or(Error::MissingList("params"))?,
            raw.return_type.ok_or(Error::MissingList("returnType"))?,
            raw.query.ok_or(Error::MissingList("query"))?,
        )?;
        let mut types = IndexMap::new();
        for (type_name, cols) in raw.types {
            let mut columns = vec![];
            for (column, t) in cols {
                let sql_type: SqlType = t.parse().map_err(|source| Error::BadColumnType {
                    type_name: type_name.clone(),
                    column: column.clone(),
                    source,
                })?;
                columns.push(Column::new(&column, sql_type));
            }
            types.insert(type_name, columns);
        }
        debug!(
            "Parsed descriptor for {} with {} methods and {} types",
            class.absolute_name,
            class.methods.len(),
            types.len()
        );
        Ok(Descriptor { class, types })
    }

    pub fn load(path: &Path) -> Result<Descriptor, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// makes every declared type constructible by name.
    pub fn register_types(&self, registry: &mut TypeRegistry) {
        for (type_name, columns) in &self.types {
            registry.register_dynamic(type_name, columns.clone());
        }
    }
}

#[cfg(test)]
const PERSON_DAO: &str = r#"
class = "dao.PersonDao"
method = ["getNames", "getAdults"]
params = ["Person", "Person"]
returnType = ["Person", "Person"]
query = ["SELECT name FROM Person", "SELECT * FROM Person WHERE age >= 18"]

[types.Person]
name = "text"
age = "int"
"#;

#[test]
fn test_parse_descriptor() {
    let d = Descriptor::parse(PERSON_DAO).unwrap();
    assert_eq!(d.class.package(), "dao");
    assert_eq!(d.class.simple_name(), "PersonDao");
    assert_eq!(d.class.methods.len(), 2);
    assert_eq!(d.class.methods[1].method_name, "getAdults");
    assert_eq!(d.class.methods[1].input_params, vec!["Person"]);
    assert_eq!(
        d.types["Person"],
        vec![Column::new("name", SqlType::Text), Column::new("age", SqlType::Int)]
    );
    let mut registry = TypeRegistry::new();
    d.register_types(&mut registry);
    assert!(d.class.validate(&registry).is_ok());
}

#[test]
fn test_count_mismatch() {
    let text = PERSON_DAO.replace(
        r#"returnType = ["Person", "Person"]"#,
        r#"returnType = ["Person"]"#,
    );
    assert!(matches!(
        Descriptor::parse(&text),
        Err(Error::CountMismatch {
            methods: 2,
            params: 2,
            return_types: 1,
            queries: 2
        })
    ));
}

#[test]
fn test_missing_list() {
    let text = PERSON_DAO.replace(r#"query = ["SELECT name FROM Person", "SELECT * FROM Person WHERE age >= 18"]"#, "");
    assert!(matches!(Descriptor::parse(&text), Err(Error::MissingList("query"))));
}

#[test]
fn test_empty_list() {
    let text = PERSON_DAO.replace(
        r#"returnType = ["Person", "Person"]"#,
        r#"returnType = []"#,
    );
    assert!(matches!(
        Descriptor::parse(&text),
        Err(Error::MissingList("returnType"))
    ));
}

#[test]
fn test_bad_column_type() {
    let text = PERSON_DAO.replace(r#"age = "int""#, r#"age = "blob""#);
    assert!(matches!(
        Descriptor::parse(&text),
        Err(Error::BadColumnType { .. })
    ));
}

#[test]
fn test_method_checks() {
    struct Case {
        params: &'static str,
        ret: &'static str,
        ok: bool,
    }
    let cases = vec![
        Case { params: "A, B", ret: "A", ok: true },
        Case { params: "", ret: "A", ok: true },
        Case { params: "A", ret: "void", ok: false },
        Case { params: "A, B , A", ret: "A", ok: false },
    ];
    for c in cases {
        let r = ClassDescriptor::from_lists(
            "C",
            vec!["m".into()],
            vec![c.params.into()],
            vec![c.ret.into()],
            vec!["q".into()],
        );
        assert_eq!(r.is_ok(), c.ok, "params {:?} returning {:?}", c.params, c.ret);
    }
}

#[test]
fn test_unknown_type() {
    let d = Descriptor::parse(PERSON_DAO).unwrap();
    let registry = TypeRegistry::new();
    match d.class.validate(&registry) {
        Err(Error::UnknownType { method, type_name }) => {
            assert_eq!(method, "getNames");
            assert_eq!(type_name, "Person");
        }
        other => panic!("unexpected {:?}", other),
    }
}
