use std::env;
use std::path::PathBuf;

use streamgen::pipeline_interpreter::run_method;
use streamgen::row::Row;
use streamgen::sql_value::SqlValue;
use streamgen::translator::{self, FailureKind};
use streamgen::{render, CompilerOptions, Descriptor, RustRenderer, TypeRegistry};

fn path_to_testdata(filename: &str) -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set"))
        .join("resources/test")
        .join(filename)
}

fn text(s: &str) -> SqlValue {
    SqlValue::Text(s.to_string())
}

fn person(name: &str, age: i64) -> Row {
    vec![("name", text(name)), ("age", SqlValue::Int(age))]
        .into_iter()
        .collect()
}

fn pet(owner: &str, name: &str, legs: i64) -> Row {
    vec![
        ("owner", text(owner)),
        ("name", text(name)),
        ("legs", SqlValue::Int(legs)),
    ]
    .into_iter()
    .collect()
}

/// `src` as printed by the token printer, so that layout does not matter in comparisons.
fn canonical(src: &str) -> String {
    src.parse::<proc_macro2::TokenStream>().unwrap().to_string()
}

fn compile(filename: &str) -> Result<(translator::Translation, String, String), translator::Error> {
    streamgen::logging::init_for_tests();
    let mut out = (String::new(), String::new());
    let t = streamgen::compile_file(
        &path_to_testdata(filename),
        TypeRegistry::new(),
        CompilerOptions::default(),
        &RustRenderer::new(),
        |name, text| {
            out = (name.to_string(), text.to_string());
            Ok(())
        },
    )?;
    Ok((t, out.0, out.1))
}

#[test]
fn test_compile_person_dao() {
    let (t, file_name, text) = compile("person_dao.toml").unwrap();
    assert!(t.failures.is_empty());
    assert_eq!(file_name, "person_dao.rs");
    let tokens = canonical(&text);
    assert!(tokens.contains(&canonical("pub struct PersonDao;")));
    assert!(tokens.contains(&canonical("pub fn get_names(person: &[Person]) -> Vec<Person>")));
    assert!(tokens.contains(&canonical("use crate::Person;")));

    let unit = t.class_unit.method("getNames").unwrap();
    let rows = run_method(unit, vec![vec![person("Ann", 30), person("Bob", 41)]]).unwrap();
    let names: Vec<String> = rows.into_iter().map(|r| r.unwrap().to_string()).collect();
    assert_eq!(names, vec!["{name: Ann}", "{name: Bob}"]);
    // An empty input is an empty output, not an error.
    assert_eq!(run_method(unit, vec![vec![]]).unwrap(), vec![]);
}

#[test]
fn test_compile_pet_dao() {
    let (t, _, text) = compile("pet_dao.toml").unwrap();
    let names: Vec<&str> = t.class_unit.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["ownersOfQuadrupeds", "legsByOwner"]);
    assert_eq!(t.failures.len(), 1);
    assert_eq!(t.failures[0].method, "wingedPets");
    assert_eq!(t.failures[0].kind, FailureKind::PlanUnavailable);
    // The dropped method's types still get their helpers.
    let helpers: Vec<String> = t.class_unit.helpers.iter().map(|h| h.name()).collect();
    assert_eq!(
        helpers,
        vec![
            "person_to_rows",
            "pet_to_rows",
            "rows_to_agelegs",
            "rows_to_legtotal",
            "rows_to_pet",
        ]
    );
    assert!(canonical(&text).contains(&canonical(
        "pub fn owners_of_quadrupeds(person: &[Person], pet: &[Pet]) -> Vec<AgeLegs>"
    )));
    assert!(!text.contains("winged_pets"));

    let people = vec![person("Ann", 30), person("Bob", 40)];
    let pets = vec![
        pet("Ann", "Rex", 4),
        pet("Ann", "Tweety", 2),
        pet("Bob", "Spider", 8),
        pet("Cy", "Nemo", 0),
    ];

    let join = t.class_unit.method("ownersOfQuadrupeds").unwrap();
    let stmts: Vec<String> = join.statements.iter().map(|s| s.to_string()).collect();
    assert_eq!(
        stmts,
        vec![
            "r1 = join[name = owner](person_rows, pet_rows)",
            "r2 = filter[legs > 2](r1)",
            "r3 = project[age, legs](r2)",
            "output = from_sequence[AgeLegs](r3)",
        ]
    );
    let rows = run_method(join, vec![people, pets.clone()]).unwrap();
    let rows: Vec<String> = rows.into_iter().map(|r| r.unwrap().to_string()).collect();
    assert_eq!(rows, vec!["{age: 30, legs: 4}", "{age: 40, legs: 8}"]);

    let agg = t.class_unit.method("legsByOwner").unwrap();
    let rows = run_method(agg, vec![pets]).unwrap();
    let rows: Vec<String> = rows.into_iter().map(|r| r.unwrap().to_string()).collect();
    assert_eq!(
        rows,
        vec!["{owner: Ann, total: 6}", "{owner: Bob, total: 8}", "{owner: Cy, total: 0}"]
    );
}

#[test]
fn test_mismatched_lists_compile_nothing() {
    let r = compile("mismatched.toml");
    assert!(matches!(
        r,
        Err(translator::Error::ConfigValidation(
            streamgen::descriptor::Error::CountMismatch { .. }
        ))
    ));
}

/// Compiles a descriptor written to a temporary directory. Nothing reaches the sink on failure.
fn compile_source(source: &str) -> Result<translator::Translation, translator::Error> {
    streamgen::logging::init_for_tests();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dao.toml");
    std::fs::write(&path, source).unwrap();
    streamgen::compile_file(
        &path,
        TypeRegistry::new(),
        CompilerOptions::default(),
        &RustRenderer::new(),
        |name, _| panic!("{} should not have been written", name),
    )
}

#[test]
fn test_keyword_type_is_not_rendered() {
    let r = compile_source(
        r#"
class = "dao.MatchDao"
method = ["getAll"]
params = ["model.Match"]
returnType = ["model.Match"]
query = ["SELECT home FROM Match"]

[types."model.Match"]
home = "text"
"#,
    );
    match r {
        Err(translator::Error::Render(render::Error::InvalidIdentifier(name))) => {
            assert_eq!(name, "match")
        }
        other => panic!("expected an invalid identifier, got {:?}", other.map(|t| t.failures)),
    }
}

#[test]
fn test_colliding_method_names_are_not_rendered() {
    let r = compile_source(
        r#"
class = "dao.PersonDao"
method = ["getAll", "get_all"]
params = ["Person", "Person"]
returnType = ["Person", "Person"]
query = ["SELECT * FROM Person", "SELECT * FROM Person"]

[types.Person]
name = "text"
"#,
    );
    assert!(matches!(
        r,
        Err(translator::Error::Render(render::Error::DuplicateMethod { .. }))
    ));
}

#[test]
fn test_descriptor_and_persist() {
    let d = Descriptor::load(&path_to_testdata("pet_dao.toml")).unwrap();
    assert_eq!(d.class.simple_name(), "PetDao");
    assert_eq!(d.types.len(), 4);

    let dir = tempfile::tempdir().unwrap();
    let (_, file_name, text) = compile("pet_dao.toml").unwrap();
    let path = dir.path().join(&file_name);
    render::persist(&path, &text).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), text);
}
