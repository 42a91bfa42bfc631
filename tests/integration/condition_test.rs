use std::sync::Arc;

use anyhow::Result;
use objquery::common::types::{DbTypeCode, ExtentSet, QueryFlags};
use objquery::query::condition::{
    Comparison, ComparisonOperator, LogicalExpression, LogicalOperator, TruthValue,
};
use objquery::query::executor::operators::{FullTableScan, IndexScan};
use objquery::query::executor::{ExecutionEnumerator, Row};
use objquery::query::expression::{Value, ValueExpression, VariableArray};
use objquery::query::ranges::DynamicRange;
use objquery::storage::{MemoryStore, PropertyBinding, TypeBinding};

#[path = "../common/mod.rs"]
mod common;

use common::*;

fn compare(op: ComparisonOperator, left: ValueExpression, right: ValueExpression) -> Result<LogicalExpression> {
    Ok(LogicalExpression::comparison(Comparison::new(op, left, right)?))
}

fn person_row(fixture: &Fixture, index: usize) -> Row {
    let mut row = Row::new(1);
    row.attach_object(0, fixture.people[index].clone());
    row
}

fn scan_people(fixture: &Fixture, condition: LogicalExpression, variables: &VariableArray) -> FullTableScan {
    let rtb = person_row_type(fixture);
    FullTableScan::new(base(&rtb, variables), fixture.store.clone(), "Person", 0, Some(condition))
}

#[test]
fn test_unknown_for_null_operands() -> Result<()> {
    let fixture = fixture()?;
    let older = compare(ComparisonOperator::GreaterThan, person_path(0, AGE), ValueExpression::literal(26i64))?;
    let dave = person_row(&fixture, 3);
    let alice = person_row(&fixture, 0);

    assert_eq!(older.evaluate(&dave)?, TruthValue::Unknown);
    assert_eq!(LogicalExpression::negate(older.clone()).evaluate(&dave)?, TruthValue::Unknown);
    assert!(!older.filtrate(&dave)?);
    assert!(!LogicalExpression::negate(older.clone()).filtrate(&dave)?);

    // (Age > 26) IS UNKNOWN
    let is_unknown = LogicalExpression::binary(
        LogicalOperator::Is,
        older.clone(),
        LogicalExpression::Literal(TruthValue::Unknown),
    )?;
    assert!(is_unknown.filtrate(&dave)?);
    assert!(!is_unknown.filtrate(&alice)?);

    // UNKNOWN OR TRUE is TRUE, UNKNOWN AND FALSE is FALSE
    let or_true = LogicalExpression::or(older.clone(), LogicalExpression::Literal(TruthValue::True));
    assert_eq!(or_true.evaluate(&dave)?, TruthValue::True);
    let and_false = LogicalExpression::and(older, LogicalExpression::Literal(TruthValue::False));
    assert_eq!(and_false.evaluate(&dave)?, TruthValue::False);
    Ok(())
}

#[test]
fn test_is_and_is_not_null() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(0);
    let null_age = compare(ComparisonOperator::Is, person_path(0, AGE), ValueExpression::null(DbTypeCode::Integer))?;
    let mut scan = scan_people(&fixture, null_age, &variables);
    assert_eq!(collect_names(&mut scan)?, vec!["Dave"]);

    let has_age = compare(ComparisonOperator::IsNot, person_path(0, AGE), ValueExpression::null(DbTypeCode::Integer))?;
    let mut scan = scan_people(&fixture, has_age, &variables);
    assert_eq!(collect_names(&mut scan)?.len(), 5);
    Ok(())
}

#[test]
fn test_equality_or_null_keeps_only_matching_rows() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let binding = store.register_type(TypeBinding::new(
        "Tag",
        vec![PropertyBinding::stored("Name", DbTypeCode::String)],
    ));
    store.insert("Tag", vec![Some(Value::from("a"))])?;
    store.insert("Tag", vec![Some(Value::from("b"))])?;

    let mut rtb = objquery::query::executor::RowTypeBinding::new();
    let extent = rtb.add_extent("t", binding);
    rtb.add_projection("Id", ValueExpression::path(objquery::query::expression::Path::this(extent)));
    let rtb = Arc::new(rtb);
    let name = person_path(0, NAME);
    let condition = LogicalExpression::or(
        compare(ComparisonOperator::Equal, name.clone(), ValueExpression::literal("a"))?,
        compare(ComparisonOperator::Is, name, ValueExpression::null(DbTypeCode::String))?,
    );

    let variables = VariableArray::new(0);
    let mut scan = FullTableScan::new(base(&rtb, &variables), store.clone(), "Tag", 0, Some(condition.clone()));
    let rows = collect_rows(&mut scan)?;
    assert_eq!(rows.len(), 1);
    match &rows[0][0] {
        Some(Value::Object(object)) => assert_eq!(object.identity(), 1),
        other => panic!("expected an object, got {:?}", other),
    }

    let second = objquery::storage::ObjectStore::lookup(store.as_ref(), 2)?.ok_or_else(|| anyhow::anyhow!("missing"))?;
    let mut row = Row::new(1);
    row.attach_object(0, second);
    assert!(!condition.filtrate(&row)?);
    Ok(())
}

#[test]
fn test_like_patterns() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(1);

    // Case-insensitive whole-string match
    let starts_with_c = LogicalExpression::comparison(Comparison::like(
        person_path(0, NAME),
        ValueExpression::literal("c%"),
        None,
    )?);
    let mut scan = scan_people(&fixture, starts_with_c, &variables);
    assert_eq!(collect_names(&mut scan)?, vec!["Carol"]);

    // `_` matches exactly one character
    let four_letters = LogicalExpression::comparison(Comparison::like(
        person_path(0, NAME),
        ValueExpression::literal("____"),
        None,
    )?);
    let mut scan = scan_people(&fixture, four_letters, &variables);
    assert_eq!(collect_names(&mut scan)?, vec!["Dave", "Erin"]);

    // Pattern from a variable
    let pattern = ValueExpression::variable(0, DbTypeCode::String, &variables)?;
    let by_variable = LogicalExpression::comparison(Comparison::like(person_path(0, NAME), pattern, None)?);
    let mut flags = QueryFlags::empty();
    by_variable.populate_query_flags(&mut flags);
    assert!(flags.contains(QueryFlags::INCLUDES_LIKE_VARIABLE));

    let mut scan = scan_people(&fixture, by_variable, &variables);
    scan.set_variable_value(0, Value::from("%R%"))?;
    assert_eq!(collect_names(&mut scan)?, vec!["Carol", "Erin", "Frank"]);
    scan.set_variable_to_null(0)?;
    scan.reset(None)?;
    assert!(collect_names(&mut scan)?.is_empty());
    Ok(())
}

#[test]
fn test_like_escape_character() -> Result<()> {
    let row = Row::empty();
    let literal_percent = Comparison::like(ValueExpression::literal("100%"), ValueExpression::literal("100!%"), Some('!'))?;
    assert_eq!(literal_percent.evaluate(&row)?, TruthValue::True);
    let not_a_wildcard = Comparison::like(ValueExpression::literal("1000"), ValueExpression::literal("100!%"), Some('!'))?;
    assert_eq!(not_a_wildcard.evaluate(&row)?, TruthValue::False);
    let null_text = Comparison::like(ValueExpression::null(DbTypeCode::String), ValueExpression::literal("%"), None)?;
    assert_eq!(null_text.evaluate(&row)?, TruthValue::Unknown);
    Ok(())
}

#[test]
fn test_conjunction_filters_scan() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(0);
    let condition = LogicalExpression::and(
        compare(ComparisonOperator::Equal, person_path(0, DEPT), ValueExpression::literal("Eng"))?,
        LogicalExpression::or(
            compare(ComparisonOperator::LessThan, person_path(0, AGE), ValueExpression::literal(30i64))?,
            compare(ComparisonOperator::Is, person_path(0, AGE), ValueExpression::null(DbTypeCode::Integer))?,
        ),
    );
    let mut scan = scan_people(&fixture, condition, &variables);
    assert_eq!(collect_names(&mut scan)?, vec!["Erin"]);
    Ok(())
}

#[test]
fn test_range_points_drive_index_scan() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(0);
    let condition = LogicalExpression::and(
        LogicalExpression::and(
            compare(ComparisonOperator::GreaterThanOrEqual, person_path(0, AGE), ValueExpression::literal(28i64))?,
            // reversed: 35 > Age
            compare(ComparisonOperator::GreaterThan, ValueExpression::literal(35i64), person_path(0, AGE))?,
        ),
        LogicalExpression::comparison(Comparison::like(person_path(0, NAME), ValueExpression::literal("%"), None)?),
    );
    let points = condition.range_points(0, "Age");
    assert_eq!(points.len(), 2);
    assert_eq!(points[1].operator(), ComparisonOperator::LessThan);

    let rtb = person_row_type(&fixture);
    let range = DynamicRange::new(DbTypeCode::Integer, points)?;
    let mut scan = IndexScan::new(
        base(&rtb, &variables),
        fixture.store.clone(),
        "PersonByAge",
        0,
        range,
        Some(condition),
        false,
    )?;
    assert_eq!(collect_names(&mut scan)?, vec!["Erin", "Alice"]);
    Ok(())
}

#[test]
fn test_instantiate_folds_bound_extents() -> Result<()> {
    let fixture = fixture()?;
    // Pet.OwnerName = Person.Name with the person at extent 0 bound
    let condition = compare(ComparisonOperator::Equal, pet_path(1, OWNER_NAME), person_path(0, NAME))?;
    let mut context = Row::new(2);
    context.attach_object(0, fixture.people[2].clone());
    let instantiated = condition.instantiate(&context)?;
    assert_eq!(instantiated.to_string().contains("'Carol'"), true);

    let mut extents = ExtentSet::new();
    instantiated.collect_extents(&mut extents);
    assert_eq!(extents.into_iter().collect::<Vec<_>>(), vec![1]);

    // Both sides bound folds into a truth literal
    let mut full = context.clone();
    full.attach_null(1);
    assert!(matches!(condition.instantiate(&full)?, LogicalExpression::Literal(TruthValue::Unknown)));
    Ok(())
}

#[test]
fn test_outside_join_extents() -> Result<()> {
    let post = Comparison::new(
        ComparisonOperator::Is,
        pet_path(1, PET_NAME),
        ValueExpression::null(DbTypeCode::String),
    )?
    .with_outside_join([1].into_iter().collect());
    let condition = LogicalExpression::and(
        LogicalExpression::comparison(post),
        compare(ComparisonOperator::Equal, person_path(0, DEPT), ValueExpression::literal("Ops"))?,
    );
    assert_eq!(condition.get_outside_join_extent_set().into_iter().collect::<Vec<_>>(), vec![1]);
    Ok(())
}
