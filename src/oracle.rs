//! The planning oracle: something that, given a schema and a query, answers with an execution plan.
//!
//! The compiler never asks the oracle for data, only for plans. An oracle that cannot plan a query
//! says so with [`PlanOutcome::Unavailable`]; that is an expected answer, not an error, and it is
//! never retried.

use tracing::debug;

use crate::ir::Operator;
use crate::registry::UserDto;
use crate::schema::{Schema, TableSchema};

#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    Plan(Operator),
    /// the oracle could not produce or expose a plan; carries the reason.
    Unavailable(String),
}

pub trait PlanOracle {
    /// Builds the schema a method's query is planned against: one table per parameter,
    /// named after the parameter's type, with one column per attribute.
    fn create_schema(&mut self, dtos: &[UserDto]) -> Result<Schema, crate::schema::Error> {
        let mut schema = Schema::new();
        for dto in dtos {
            schema.add_table(TableSchema {
                name: String::from(dto.table_name()),
                source: dto.rows_binding(),
                columns: dto.instance.shape(),
            })?;
        }
        debug!("Created schema:\n{}", schema.creation_sql());
        Ok(schema)
    }

    fn get_plan(&mut self, query: &str, schema: &Schema) -> PlanOutcome;
}

/// The bundled oracle. Parses a small SQL dialect and plans it directly against the schema.
#[derive(Debug, Default)]
pub struct SqlOracle {}

impl SqlOracle {
    pub fn new() -> Self {
        SqlOracle {}
    }
}

impl PlanOracle for SqlOracle {
    fn get_plan(&mut self, query: &str, schema: &Schema) -> PlanOutcome {
        let plan = crate::pt_to_ast::pt_select_statement_to_ast(query)
            .and_then(|ss| crate::ast_to_ir::ast_select_statement_to_ir(&ss, schema));
        match plan {
            Ok(op) => {
                debug!("Plan for {}:\n{}", query, op);
                PlanOutcome::Plan(op)
            }
            Err(e) => PlanOutcome::Unavailable(format!("{:#}", e)),
        }
    }
}

#[test]
fn test_create_schema_from_dtos() {
    use crate::marshal::fixtures::Person;
    use crate::registry::TypeRegistry;
    use crate::schema::TableMeta;
    let mut r = TypeRegistry::new();
    r.register::<Person>();
    let dtos = vec![UserDto::new("model.Person", &r).unwrap()];
    let schema = SqlOracle::new().create_schema(&dtos).unwrap();
    let t = schema.table("person").unwrap();
    assert_eq!(t.table_name(), "Person");
    assert_eq!(t.column_names(), vec!["name", "age", "height"]);
    assert_eq!(t.source.as_str(), "person_rows");
}

#[test]
fn test_get_plan_unavailable_for_bad_query() {
    let mut schema = Schema::new();
    schema.add_table(crate::schema::person_table()).unwrap();
    let mut oracle = SqlOracle::new();
    match oracle.get_plan("project name from Person", &schema) {
        PlanOutcome::Unavailable(reason) => assert!(reason.contains("parse"), "{}", reason),
        p => panic!("expected no plan, got {:?}", p),
    }
    match oracle.get_plan("select salary from Person", &schema) {
        PlanOutcome::Unavailable(reason) => assert!(reason.contains("salary"), "{}", reason),
        p => panic!("expected no plan, got {:?}", p),
    }
    assert!(matches!(
        oracle.get_plan("select name from Person", &schema),
        PlanOutcome::Plan(_)
    ));
}
