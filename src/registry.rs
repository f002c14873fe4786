//! maps type names from method descriptors to constructors of those types.
//!
//! Every parameter and return type a descriptor mentions must be registered before compilation
//! starts. A registered type can be instantiated by name, and the instance reports its attribute
//! shape, which is what the planning oracle's schema is built from.

use indexmap::IndexMap;

use crate::ir::Binding;
use crate::marshal::Entity;
use crate::schema::Column;

/// anything that can describe its attributes.
pub trait Shaped {
    fn type_name(&self) -> &str;
    fn shape(&self) -> Vec<Column>;
}

impl<T: Entity> Shaped for T {
    fn type_name(&self) -> &str {
        T::type_name()
    }
    fn shape(&self) -> Vec<Column> {
        T::accessors().columns()
    }
}

/// A user type known only by its declared attributes, e.g. one described in a descriptor file.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicEntity {
    pub type_name: String,
    pub columns: Vec<Column>,
}

impl Shaped for DynamicEntity {
    fn type_name(&self) -> &str {
        &self.type_name
    }
    fn shape(&self) -> Vec<Column> {
        self.columns.clone()
    }
}

type Constructor = Box<dyn Fn() -> Box<dyn Shaped>>;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Type {0} is not registered.")]
    UnregisteredType(String),
}

#[derive(Default)]
pub struct TypeRegistry {
    constructors: IndexMap<String, Constructor>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry {
            constructors: IndexMap::new(),
        }
    }

    pub fn register<T: Entity>(&mut self) -> &mut Self {
        self.constructors.insert(
            String::from(T::type_name()),
            Box::new(|| Box::new(T::default()) as Box<dyn Shaped>),
        );
        self
    }

    pub fn register_dynamic(&mut self, type_name: &str, columns: Vec<Column>) -> &mut Self {
        let entity = DynamicEntity {
            type_name: String::from(type_name),
            columns,
        };
        self.constructors.insert(
            String::from(type_name),
            Box::new(move || Box::new(entity.clone()) as Box<dyn Shaped>),
        );
        self
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name.trim())
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(|k| k.as_str())
    }

    /// constructs a default instance of `type_name`.
    pub fn instantiate(&self, type_name: &str) -> Result<Box<dyn Shaped>, Error> {
        let type_name = type_name.trim();
        self.constructors
            .get(type_name)
            .map(|c| c())
            .ok_or_else(|| Error::UnregisteredType(String::from(type_name)))
    }
}

/// The simple name of a possibly package-qualified type: `Person` for `model.Person`.
pub fn simple_name(type_name: &str) -> &str {
    let t = type_name.trim();
    match t.rfind('.') {
        Some(i) => &t[i + 1..],
        None => t,
    }
}

/// The package of a qualified name: `model` for `model.Person`, empty when unqualified.
pub fn package_name(type_name: &str) -> &str {
    let t = type_name.trim();
    match t.rfind('.') {
        Some(i) => &t[..i],
        None => "",
    }
}

/// A method parameter: its identifier, bound to an instance of its declared type.
pub struct UserDto {
    pub ident: String,
    pub type_name: String,
    pub instance: Box<dyn Shaped>,
}

impl UserDto {
    pub fn new(type_name: &str, registry: &TypeRegistry) -> Result<UserDto, Error> {
        let instance = registry.instantiate(type_name)?;
        Ok(UserDto {
            ident: simple_name(type_name).to_lowercase(),
            type_name: String::from(type_name.trim()),
            instance,
        })
    }

    /// the binding holding this parameter's marshalled rows.
    pub fn rows_binding(&self) -> Binding {
        Binding::rows_of(&self.ident)
    }

    pub fn table_name(&self) -> &str {
        simple_name(&self.type_name)
    }
}

impl std::fmt::Debug for UserDto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDto")
            .field("ident", &self.ident)
            .field("type_name", &self.type_name)
            .field("shape", &self.instance.shape())
            .finish()
    }
}

#[test]
fn test_names() {
    assert_eq!(simple_name("a.b.Person"), "Person");
    assert_eq!(simple_name(" Person "), "Person");
    assert_eq!(package_name("a.b.Person"), "a.b");
    assert_eq!(package_name("Person"), "");
}

#[test]
fn test_registry_instantiates_registered_types() {
    use crate::marshal::fixtures::Person;
    use crate::sql_type::SqlType;
    let mut r = TypeRegistry::new();
    r.register::<Person>()
        .register_dynamic("model.Dept", vec![Column::new("title", SqlType::Text)]);
    assert!(r.contains(" model.Person"));

    let dto = UserDto::new("model.Person", &r).unwrap();
    assert_eq!(dto.ident, "person");
    assert_eq!(dto.table_name(), "Person");
    assert_eq!(dto.rows_binding().as_str(), "person_rows");
    assert_eq!(dto.instance.type_name(), "model.Person");
    assert_eq!(
        dto.instance.shape(),
        vec![
            Column::new("name", SqlType::Text),
            Column::new("age", SqlType::Int),
            Column::new("height", SqlType::Real),
        ]
    );

    let dept = UserDto::new("model.Dept", &r).unwrap();
    assert_eq!(dept.instance.shape(), vec![Column::new("title", SqlType::Text)]);

    assert_eq!(
        UserDto::new("model.Car", &r).unwrap_err(),
        Error::UnregisteredType("model.Car".to_string())
    );
}
