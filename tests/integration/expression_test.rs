use anyhow::Result;
use objquery::common::types::{DbTypeCode, QueryFlags};
use objquery::query::executor::{QueryError, Row};
use objquery::query::expression::{Operation, Operator, Value, ValueExpression, VariableArray, encode_parameters};
use rust_decimal::Decimal;
use std::str::FromStr;

#[path = "../common/mod.rs"]
mod common;

use common::*;

// Row holding one pet object at extent 0
fn pet_row(fixture: &Fixture, identity: u64) -> Result<Row> {
    let object = objquery::storage::ObjectStore::lookup(fixture.store.as_ref(), identity)?
        .ok_or_else(|| anyhow::anyhow!("no object {}", identity))?;
    let mut row = Row::new(1);
    row.attach_object(0, object);
    Ok(row)
}

#[test]
fn test_mixed_arithmetic_over_rows() -> Result<()> {
    let fixture = fixture()?;
    let mut row = Row::new(1);
    row.attach_object(0, fixture.people[0].clone());

    // Age * 2 stays integral
    let doubled = Operation::binary(Operator::Multiplication, person_path(0, AGE), ValueExpression::literal(2i64))?;
    assert_eq!(doubled.type_code(), DbTypeCode::Integer);
    assert_eq!(ValueExpression::operation(doubled).evaluate(&row)?, Some(Value::Integer(60)));

    // Age / 4 widens to decimal
    let quarter = ValueExpression::operation(Operation::binary(
        Operator::Division,
        person_path(0, AGE),
        ValueExpression::literal(4i64),
    )?);
    assert_eq!(quarter.type_code(), DbTypeCode::Decimal);
    assert_eq!(quarter.evaluate_to_decimal(&row)?, Some(Decimal::from_str("7.5")?));
    assert_eq!(quarter.evaluate_to_integer_floor(&row)?, Some(7));
    assert_eq!(quarter.evaluate_to_integer_ceiling(&row)?, Some(8));

    // Age + 0.5 is a double
    let plus_half = ValueExpression::operation(Operation::binary(
        Operator::Addition,
        person_path(0, AGE),
        ValueExpression::literal(0.5f64),
    )?);
    assert_eq!(plus_half.evaluate_to_double(&row)?, Some(30.5));

    // Name || '!'
    let shout = ValueExpression::operation(Operation::binary(
        Operator::Concatenation,
        person_path(0, NAME),
        ValueExpression::literal("!"),
    )?);
    assert_eq!(shout.evaluate_to_string(&row)?, Some("Alice!".to_string()));
    Ok(())
}

#[test]
fn test_null_propagation_through_operations() -> Result<()> {
    let fixture = fixture()?;
    let mut row = Row::new(1);
    // Dave has no age
    row.attach_object(0, fixture.people[3].clone());
    let next_year = ValueExpression::operation(Operation::binary(
        Operator::Addition,
        person_path(0, AGE),
        ValueExpression::literal(1i64),
    )?);
    assert!(next_year.evaluates_to_null(&row)?);
    let negated = ValueExpression::operation(Operation::unary(Operator::Minus, next_year)?);
    assert_eq!(negated.evaluate(&row)?, None);
    Ok(())
}

#[test]
fn test_type_errors_at_construction() {
    let mismatched = Operation::binary(
        Operator::Addition,
        ValueExpression::literal("x"),
        ValueExpression::literal(1i64),
    );
    assert!(matches!(mismatched, Err(QueryError::TypeError(_))));
    let negated_string = Operation::unary(Operator::Minus, ValueExpression::literal("x"));
    assert!(matches!(negated_string, Err(QueryError::TypeError(_))));
}

#[test]
fn test_overflow_and_division_by_zero() -> Result<()> {
    let overflow = ValueExpression::operation(Operation::binary(
        Operator::Addition,
        ValueExpression::literal(i64::MAX),
        ValueExpression::literal(1i64),
    )?);
    assert!(matches!(overflow.evaluate(&Row::empty()), Err(QueryError::NumericOverflow)));

    let by_zero = ValueExpression::operation(Operation::binary(
        Operator::Division,
        ValueExpression::literal(1i64),
        ValueExpression::literal(0i64),
    )?);
    assert!(matches!(by_zero.evaluate(&Row::empty()), Err(QueryError::DivisionByZero)));
    Ok(())
}

#[test]
fn test_reference_chain_short_circuits_on_null() -> Result<()> {
    let fixture = fixture()?;
    let owner_name = owner_name_path(0)?;

    // Rex belongs to Alice
    assert_eq!(owner_name.evaluate_to_string(&pet_row(&fixture, 7)?)?, Some("Alice".to_string()));
    // Pip has no owner
    assert_eq!(owner_name.evaluate(&pet_row(&fixture, 10)?)?, None);

    // A null placeholder row yields null as well
    let mut placeholder = Row::new(1);
    placeholder.attach_null(0);
    assert_eq!(owner_name.evaluate(&placeholder)?, None);

    // An unbound extent is a contract violation
    assert!(matches!(owner_name.evaluate(&Row::new(1)), Err(QueryError::Internal(_))));
    Ok(())
}

#[test]
fn test_variables_bind_convert_and_rebind() -> Result<()> {
    let variables = VariableArray::new(2);
    let limit = ValueExpression::variable(0, DbTypeCode::Integer, &variables)?;
    let label = ValueExpression::variable(1, DbTypeCode::String, &variables)?;

    assert!(matches!(limit.evaluate(&Row::empty()), Err(QueryError::UnsetVariable(0))));
    variables.set(0, 7u8)?;
    assert_eq!(limit.evaluate(&Row::empty())?, Some(Value::Integer(7)));
    variables.set_null(0)?;
    assert_eq!(limit.evaluate(&Row::empty())?, None);

    // A clone bound to an empty array of the same shape sees its own values
    let other = variables.clone_empty();
    let rebound = limit.clone_with(&other)?;
    other.set(0, 3i32)?;
    assert_eq!(rebound.evaluate(&Row::empty())?, Some(Value::Integer(3)));
    assert_eq!(limit.evaluate(&Row::empty())?, None);

    // Bulk binding from a parameter buffer
    let buffer = encode_parameters(&[Some(Value::Integer(11)), Some(Value::from("x"))])?;
    variables.init_from_buffer(&buffer)?;
    assert_eq!(limit.evaluate_to_integer(&Row::empty())?, Some(11));
    assert_eq!(label.evaluate_to_string(&Row::empty())?, Some("x".to_string()));

    // Values carry over to another array
    let copy = variables.clone_empty();
    variables.prolong_values(&copy)?;
    assert_eq!(copy.get(0)?, Some(Value::Integer(11)));
    Ok(())
}

#[test]
fn test_literal_sets_query_flag() -> Result<()> {
    let variables = VariableArray::new(1);
    let mut flags = QueryFlags::empty();
    ValueExpression::variable(0, DbTypeCode::Integer, &variables)?.populate_query_flags(&mut flags);
    assert!(!flags.contains(QueryFlags::INCLUDES_LITERAL));
    ValueExpression::literal(1i64).populate_query_flags(&mut flags);
    assert!(flags.contains(QueryFlags::INCLUDES_LITERAL));
    Ok(())
}
