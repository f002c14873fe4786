// Generated by streamgen from dao.PetDao. Do not edit.

use streamgen::ir::{AggFunc, Aggregate, CmpOp};
use streamgen::marshal::Marshaler;
use streamgen::pipeline_interpreter as rt;
use streamgen::row::Row;
use streamgen::sql_value::SqlValue;
use crate::Person;
use crate::Pet;
use crate::AgeLegs;
use crate::LegTotal;

pub struct PetDao;

impl PetDao {
    pub fn owners_of_quadrupeds(person: &[Person], pet: &[Pet]) -> Vec<AgeLegs> {
        let person_rows = person_to_rows(person);
        let pet_rows = pet_to_rows(pet);
        let r1 = || rt::join_rows(person_rows.iter().cloned().map(Some), pet_rows.iter().cloned().map(Some).collect(), "name", "owner");
        let r2 = || r1().filter(|r| rt::keep_row(r, |row| rt::compare(row, "legs", CmpOp::Gt, &SqlValue::Int(2))));
        let r3 = || r2().map(|r| rt::project_row(r, &["age", "legs"]));
        rows_to_agelegs(r3())
    }

    pub fn legs_by_owner(pet: &[Pet]) -> Vec<LegTotal> {
        let pet_rows = pet_to_rows(pet);
        let r1 = || rt::aggregate_rows(pet_rows.iter().cloned().map(Some), &["owner"], &[Aggregate { func: AggFunc::Sum, column: Some("legs".to_string()), output: "total".to_string() }]).into_iter();
        rows_to_legtotal(r1())
    }
}

#[allow(dead_code)]
fn person_to_rows(objs: &[Person]) -> Vec<Row> {
    Marshaler::<Person>::new().to_rows(objs)
}

#[allow(dead_code)]
fn pet_to_rows(objs: &[Pet]) -> Vec<Row> {
    Marshaler::<Pet>::new().to_rows(objs)
}

#[allow(dead_code)]
fn rows_to_agelegs(rows: impl Iterator<Item = Option<Row>>) -> Vec<AgeLegs> {
    Marshaler::<AgeLegs>::new().from_sequence(rows)
}

#[allow(dead_code)]
fn rows_to_legtotal(rows: impl Iterator<Item = Option<Row>>) -> Vec<LegTotal> {
    Marshaler::<LegTotal>::new().from_sequence(rows)
}

#[allow(dead_code)]
fn rows_to_pet(rows: impl Iterator<Item = Option<Row>>) -> Vec<Pet> {
    Marshaler::<Pet>::new().from_sequence(rows)
}
