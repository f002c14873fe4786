//! assembles lowered statements into method units, and method units into a class unit.
//!
//! A class unit is everything a renderer needs: the methods in declaration order, and the
//! marshalling helpers they share. Helpers are generated once per distinct parameter type
//! (object to rows) and once per distinct return type (rows to object).

use indexmap::IndexSet;
use tracing::debug;

use crate::descriptor::{ClassDescriptor, MethodDescriptor};
use crate::ir::Binding;
use crate::pipeline::Statement;
use crate::registry::{package_name, simple_name, UserDto};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub ident: String,
    pub type_name: String,
    /// where the method body finds this parameter's rows.
    pub rows: Binding,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodUnit {
    pub name: String,
    pub parameters: Vec<Parameter>,
    /// the body, in execution order. The last statement binds the output.
    pub statements: Vec<Statement>,
    pub return_type: String,
}

impl MethodUnit {
    /// the statement producing the method's return value.
    pub fn output(&self) -> Option<&Statement> {
        self.statements.last().filter(|s| s.is_output())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HelperUnit {
    /// converts a slice of `type_name` objects into rows.
    ToRows { type_name: String },
    /// converts a sequence of rows into `type_name` objects.
    FromRows { type_name: String },
}

impl HelperUnit {
    pub fn type_name(&self) -> &str {
        match self {
            HelperUnit::ToRows { type_name } | HelperUnit::FromRows { type_name } => type_name,
        }
    }

    /// the helper's function name, e.g. `person_to_rows` or `rows_to_person`.
    pub fn name(&self) -> String {
        let ident = simple_name(self.type_name()).to_lowercase();
        match self {
            HelperUnit::ToRows { .. } => format!("{ident}_to_rows"),
            HelperUnit::FromRows { .. } => format!("rows_to_{ident}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassUnit {
    pub package: String,
    pub name: String,
    pub methods: Vec<MethodUnit>,
    pub helpers: Vec<HelperUnit>,
}

impl ClassUnit {
    pub fn qualified_name(&self) -> String {
        if self.package.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.package, self.name)
        }
    }

    pub fn method(&self, name: &str) -> Option<&MethodUnit> {
        self.methods.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Default)]
pub struct Assembler {}

impl Assembler {
    pub fn new() -> Self {
        Assembler {}
    }

    pub fn create_method(
        &self,
        method: &MethodDescriptor,
        dtos: &[UserDto],
        statements: Vec<Statement>,
    ) -> MethodUnit {
        let parameters = dtos
            .iter()
            .map(|d| Parameter {
                ident: d.ident.clone(),
                type_name: d.type_name.clone(),
                rows: d.rows_binding(),
            })
            .collect();
        debug!(
            "Assembled {} with {} statements",
            method.method_name,
            statements.len()
        );
        MethodUnit {
            name: method.method_name.clone(),
            parameters,
            statements,
            return_type: String::from(method.output_param.trim()),
        }
    }

    /// Builds the class unit. Helpers cover every type the class descriptor mentions, including
    /// those of methods that did not compile, so the helper set only depends on the descriptor.
    pub fn create_class(&self, class: &ClassDescriptor, methods: Vec<MethodUnit>) -> ClassUnit {
        let mut helpers: IndexSet<HelperUnit> = IndexSet::new();
        for m in &class.methods {
            for p in &m.input_params {
                helpers.insert(HelperUnit::ToRows {
                    type_name: String::from(p.trim()),
                });
            }
        }
        for m in &class.methods {
            helpers.insert(HelperUnit::FromRows {
                type_name: String::from(m.output_param.trim()),
            });
        }
        ClassUnit {
            package: String::from(package_name(&class.absolute_name)),
            name: String::from(simple_name(&class.absolute_name)),
            methods,
            helpers: helpers.into_iter().collect(),
        }
    }
}

#[cfg(test)]
pub fn method_descriptor(name: &str, params: &[&str], output: &str, query: &str) -> MethodDescriptor {
    MethodDescriptor {
        method_name: name.to_string(),
        input_params: params.iter().map(|p| p.to_string()).collect(),
        output_param: output.to_string(),
        query: query.to_string(),
    }
}

#[test]
fn test_create_class_deduplicates_helpers() {
    let class = ClassDescriptor {
        absolute_name: "dao.PersonDao".to_string(),
        methods: vec![
            method_descriptor("a", &["model.Person", " model.Pet"], "model.Person", "q1"),
            method_descriptor("b", &["model.Pet"], "model.Person", "q2"),
            method_descriptor("c", &["model.Person"], "model.Pet", "q3"),
        ],
    };
    let unit = Assembler::new().create_class(&class, vec![]);
    assert_eq!(unit.package, "dao");
    assert_eq!(unit.name, "PersonDao");
    assert_eq!(unit.qualified_name(), "dao.PersonDao");
    let names: Vec<String> = unit.helpers.iter().map(|h| h.name()).collect();
    assert_eq!(
        names,
        vec!["person_to_rows", "pet_to_rows", "rows_to_person", "rows_to_pet"]
    );
    assert!(unit.methods.is_empty());
}

#[test]
fn test_create_method() {
    use crate::marshal::fixtures::Person;
    use crate::registry::TypeRegistry;
    let mut r = TypeRegistry::new();
    r.register::<Person>();
    let dtos = vec![UserDto::new("model.Person", &r).unwrap()];
    let desc = method_descriptor("getNames", &["model.Person"], "model.Person ", "q");
    let stmts = vec![Statement::from_sequence(Binding::rows_of("person"), "model.Person")];
    let unit = Assembler::new().create_method(&desc, &dtos, stmts);
    assert_eq!(unit.name, "getNames");
    assert_eq!(unit.return_type, "model.Person");
    assert_eq!(
        unit.parameters,
        vec![Parameter {
            ident: "person".to_string(),
            type_name: "model.Person".to_string(),
            rows: Binding::rows_of("person"),
        }]
    );
    assert!(unit.output().is_some());
}
