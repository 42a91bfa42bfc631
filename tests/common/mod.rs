#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Result, anyhow};
use objquery::common::types::DbTypeCode;
use objquery::query::executor::{EnumeratorBase, ExecutionEnumerator, RowTypeBinding};
use objquery::query::expression::{Member, Path, Value, ValueExpression, VariableArray};
use objquery::storage::{MemoryStore, ObjectRef, PropertyBinding, TypeBinding};

// Person properties
pub const NAME: usize = 0;
pub const AGE: usize = 1;
pub const DEPT: usize = 2;

// Pet properties
pub const PET_NAME: usize = 0;
pub const OWNER_ID: usize = 1;
pub const OWNER_NAME: usize = 2;
pub const OWNER: usize = 3;

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub person: Arc<TypeBinding>,
    pub pet: Arc<TypeBinding>,
    pub people: Vec<ObjectRef>,
}

// Six people (identities 1 to 6) and four pets (identities 7 to 10).
// Dave has no age, Erin's pet Pip has no owner.
pub fn fixture() -> Result<Fixture> {
    let store = Arc::new(MemoryStore::new());
    let person = store.register_type(TypeBinding::new(
        "Person",
        vec![
            PropertyBinding::stored("Name", DbTypeCode::String),
            PropertyBinding::stored("Age", DbTypeCode::Integer),
            PropertyBinding::stored("Dept", DbTypeCode::String),
        ],
    ));
    let pet = store.register_type(TypeBinding::new(
        "Pet",
        vec![
            PropertyBinding::stored("Name", DbTypeCode::String),
            PropertyBinding::stored("OwnerId", DbTypeCode::UInteger),
            PropertyBinding::stored("OwnerName", DbTypeCode::String),
            PropertyBinding::stored("Owner", DbTypeCode::Object),
        ],
    ));
    store.create_index("PersonByAge", "Person", "Age")?;
    store.create_index("PetByOwnerName", "Pet", "OwnerName")?;

    let rows: [(&str, Option<i64>, &str); 6] = [
        ("Alice", Some(30), "Eng"),
        ("Bob", Some(25), "Ops"),
        ("Carol", Some(35), "Eng"),
        ("Dave", None, "Ops"),
        ("Erin", Some(28), "Eng"),
        ("Frank", Some(41), "Hr"),
    ];
    let mut people = Vec::new();
    for (name, age, dept) in rows {
        people.push(store.insert(
            "Person",
            vec![Some(Value::from(name)), age.map(Value::Integer), Some(Value::from(dept))],
        )?);
    }

    let pets: [(&str, Option<usize>); 4] = [("Rex", Some(0)), ("Tom", Some(2)), ("Kit", Some(2)), ("Pip", None)];
    for (name, owner) in pets {
        let owner = owner.map(|i| people[i].clone());
        store.insert(
            "Pet",
            vec![
                Some(Value::from(name)),
                owner.as_ref().map(|o| Value::UInteger(o.identity())),
                owner.as_ref().map(|o| Value::from(field_string(o, NAME))),
                owner.map(Value::Object),
            ],
        )?;
    }
    Ok(Fixture {
        store,
        person,
        pet,
        people,
    })
}

fn field_string(object: &ObjectRef, index: usize) -> String {
    match object.field(index) {
        Ok(Some(Value::String(s))) => s.clone(),
        _ => String::new(),
    }
}

pub fn person_path(extent: usize, index: usize) -> ValueExpression {
    let (name, type_code) = match index {
        NAME => ("Name", DbTypeCode::String),
        AGE => ("Age", DbTypeCode::Integer),
        _ => ("Dept", DbTypeCode::String),
    };
    ValueExpression::path(Path::property(extent, index, name, type_code))
}

pub fn pet_path(extent: usize, index: usize) -> ValueExpression {
    let (name, type_code) = match index {
        PET_NAME => ("Name", DbTypeCode::String),
        OWNER_ID => ("OwnerId", DbTypeCode::UInteger),
        OWNER_NAME => ("OwnerName", DbTypeCode::String),
        _ => ("Owner", DbTypeCode::Object),
    };
    ValueExpression::path(Path::property(extent, index, name, type_code))
}

// Pet.Owner.Name
pub fn owner_name_path(extent: usize) -> Result<ValueExpression> {
    let path = Path::new(
        extent,
        vec![Member::property(OWNER, "Owner", DbTypeCode::Object)],
        Member::property(NAME, "Name", DbTypeCode::String),
    )?;
    Ok(ValueExpression::path(path))
}

// Row type with one Person extent projecting its name
pub fn person_row_type(fixture: &Fixture) -> Arc<RowTypeBinding> {
    let mut rtb = RowTypeBinding::new();
    let extent = rtb.add_extent("p", fixture.person.clone());
    rtb.add_projection("Name", person_path(extent, NAME));
    Arc::new(rtb)
}

pub fn base(rtb: &Arc<RowTypeBinding>, variables: &VariableArray) -> EnumeratorBase {
    EnumeratorBase::new(rtb.clone(), variables)
}

// Every projected row of an enumerator
pub fn collect_rows(enumerator: &mut dyn ExecutionEnumerator) -> Result<Vec<Vec<Option<Value>>>> {
    let mut rows = Vec::new();
    while enumerator.move_next()? {
        rows.push(
            enumerator
                .current_values()?
                .ok_or_else(|| anyhow!("positioned enumerator without a row"))?,
        );
    }
    Ok(rows)
}

// First projection of every row rendered as text, "NULL" for nulls
pub fn collect_names(enumerator: &mut dyn ExecutionEnumerator) -> Result<Vec<String>> {
    Ok(collect_rows(enumerator)?
        .into_iter()
        .map(|row| render(row.into_iter().next().flatten()))
        .collect())
}

pub fn render(value: Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => "NULL".to_string(),
    }
}
