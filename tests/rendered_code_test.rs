//! Builds a rendered class against user types and checks it agrees with the interpreter.

use std::env;
use std::path::PathBuf;

use streamgen::marshal::{set_int, set_text, AccessorTable, Entity, Marshaler};
use streamgen::pipeline_interpreter::run_method;
use streamgen::sql_type::SqlType;
use streamgen::sql_value::SqlValue;
use streamgen::{CompilerOptions, RustRenderer, Translation, TypeRegistry};

mod dao {
    include!("../resources/test/pet_dao.rs");
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Person {
    pub name: String,
    pub age: i64,
}

impl Entity for Person {
    fn type_name() -> &'static str {
        "Person"
    }
    fn accessors() -> AccessorTable<Self> {
        AccessorTable::<Self>::new(Self::type_name())
            .with("name", SqlType::Text, |p| SqlValue::Text(p.name.clone()), |p, v| set_text(&mut p.name, v))
            .with("age", SqlType::Int, |p| SqlValue::Int(p.age), |p, v| set_int(&mut p.age, v))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pet {
    pub owner: String,
    pub name: String,
    pub legs: i64,
}

impl Entity for Pet {
    fn type_name() -> &'static str {
        "Pet"
    }
    fn accessors() -> AccessorTable<Self> {
        AccessorTable::<Self>::new(Self::type_name())
            .with("owner", SqlType::Text, |p| SqlValue::Text(p.owner.clone()), |p, v| set_text(&mut p.owner, v))
            .with("name", SqlType::Text, |p| SqlValue::Text(p.name.clone()), |p, v| set_text(&mut p.name, v))
            .with("legs", SqlType::Int, |p| SqlValue::Int(p.legs), |p, v| set_int(&mut p.legs, v))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgeLegs {
    pub age: i64,
    pub legs: i64,
}

impl Entity for AgeLegs {
    fn type_name() -> &'static str {
        "AgeLegs"
    }
    fn accessors() -> AccessorTable<Self> {
        AccessorTable::<Self>::new(Self::type_name())
            .with("age", SqlType::Int, |p| SqlValue::Int(p.age), |p, v| set_int(&mut p.age, v))
            .with("legs", SqlType::Int, |p| SqlValue::Int(p.legs), |p, v| set_int(&mut p.legs, v))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegTotal {
    pub owner: String,
    pub total: i64,
}

impl Entity for LegTotal {
    fn type_name() -> &'static str {
        "LegTotal"
    }
    fn accessors() -> AccessorTable<Self> {
        AccessorTable::<Self>::new(Self::type_name())
            .with("owner", SqlType::Text, |p| SqlValue::Text(p.owner.clone()), |p, v| set_text(&mut p.owner, v))
            .with("total", SqlType::Int, |p| SqlValue::Int(p.total), |p, v| set_int(&mut p.total, v))
    }
}

fn path_to_testdata(filename: &str) -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set"))
        .join("resources/test")
        .join(filename)
}

fn canonical(src: &str) -> String {
    src.parse::<proc_macro2::TokenStream>().unwrap().to_string()
}

fn compile_pet_dao() -> (Translation, String) {
    streamgen::logging::init_for_tests();
    let mut text = String::new();
    let t = streamgen::compile_file(
        &path_to_testdata("pet_dao.toml"),
        TypeRegistry::new(),
        CompilerOptions::default(),
        &RustRenderer::new(),
        |_, rendered| {
            text = rendered.to_string();
            Ok(())
        },
    )
    .unwrap();
    (t, text)
}

fn people() -> Vec<Person> {
    vec![
        Person { name: "Ann".to_string(), age: 30 },
        Person { name: "Bob".to_string(), age: 40 },
    ]
}

fn pets() -> Vec<Pet> {
    [("Ann", "Rex", 4), ("Ann", "Tweety", 2), ("Bob", "Spider", 8), ("Cy", "Nemo", 0)]
        .into_iter()
        .map(|(owner, name, legs)| Pet {
            owner: owner.to_string(),
            name: name.to_string(),
            legs,
        })
        .collect()
}

#[test]
fn test_checked_in_render_is_current() {
    let (_, text) = compile_pet_dao();
    let checked_in = include_str!("../resources/test/pet_dao.rs");
    assert_eq!(canonical(&text), canonical(checked_in));
}

#[test]
fn test_rendered_join_matches_interpreter() {
    let (t, _) = compile_pet_dao();
    let rendered = dao::PetDao::owners_of_quadrupeds(&people(), &pets());
    assert_eq!(
        rendered,
        vec![AgeLegs { age: 30, legs: 4 }, AgeLegs { age: 40, legs: 8 }]
    );

    let unit = t.class_unit.method("ownersOfQuadrupeds").unwrap();
    let args = vec![
        Marshaler::<Person>::new().to_rows(&people()),
        Marshaler::<Pet>::new().to_rows(&pets()),
    ];
    let interpreted = Marshaler::<AgeLegs>::new().from_sequence(run_method(unit, args).unwrap());
    assert_eq!(rendered, interpreted);
}

#[test]
fn test_rendered_aggregation_matches_interpreter() {
    let (t, _) = compile_pet_dao();
    let rendered = dao::PetDao::legs_by_owner(&pets());
    let totals: Vec<(&str, i64)> = rendered.iter().map(|l| (l.owner.as_str(), l.total)).collect();
    assert_eq!(totals, vec![("Ann", 6), ("Bob", 8), ("Cy", 0)]);

    let unit = t.class_unit.method("legsByOwner").unwrap();
    let args = vec![Marshaler::<Pet>::new().to_rows(&pets())];
    let interpreted = Marshaler::<LegTotal>::new().from_sequence(run_method(unit, args).unwrap());
    assert_eq!(rendered, interpreted);

    // Sequences are restartable, so calling twice gives the same answer.
    assert_eq!(dao::PetDao::legs_by_owner(&pets()), rendered);
}

#[test]
fn test_rendered_methods_accept_empty_input() {
    assert_eq!(dao::PetDao::owners_of_quadrupeds(&[], &pets()), vec![]);
    assert_eq!(dao::PetDao::legs_by_owner(&[]), vec![]);
}
