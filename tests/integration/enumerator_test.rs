use std::sync::Arc;

use anyhow::Result;
use objquery::common::types::{DbTypeCode, QueryFlags};
use objquery::query::condition::{Comparison, ComparisonOperator, LogicalExpression};
use objquery::query::executor::info::{FETCH_NUMBER, FETCH_OFFSET};
use objquery::query::executor::operators::{FullTableScan, Join, ObjectIdentityLookup};
use objquery::query::executor::{
    EnumeratorCache, ExecutionConfig, ExecutionEnumerator, FetchClause, InfoType, JoinType, QueryError,
    RowTypeBinding, attach_to_cache,
};
use objquery::query::expression::{Value, ValueExpression, VariableArray};

#[path = "../common/mod.rs"]
mod common;

use common::*;

fn eng_condition() -> Result<LogicalExpression> {
    Ok(LogicalExpression::comparison(Comparison::new(
        ComparisonOperator::Equal,
        person_path(0, DEPT),
        ValueExpression::literal("Eng"),
    )?))
}

fn person_scan(fixture: &Fixture, fetch: FetchClause, variables: &VariableArray) -> FullTableScan {
    let rtb = person_row_type(fixture);
    FullTableScan::new(
        base(&rtb, variables).with_fetch(fetch),
        fixture.store.clone(),
        "Person",
        0,
        None,
    )
}

#[test]
fn test_full_table_scan_in_identity_order() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(0);
    let mut scan = person_scan(&fixture, FetchClause::new(), &variables);
    assert_eq!(collect_names(&mut scan)?, vec!["Alice", "Bob", "Carol", "Dave", "Erin", "Frank"]);
    assert!(!scan.move_next()?);
    assert!(scan.current_row().is_none());

    // Reset starts over
    scan.reset(None)?;
    assert!(scan.move_next()?);
    assert_eq!(scan.current()?, Some(Value::from("Alice")));
    Ok(())
}

#[test]
fn test_fetch_number_and_offset() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(0);
    let fetch = FetchClause::new()
        .with_number(ValueExpression::literal(2i64))
        .with_offset(ValueExpression::literal(1i64));
    let mut scan = person_scan(&fixture, fetch, &variables);
    assert_eq!(collect_names(&mut scan)?, vec!["Bob", "Carol"]);

    // An offset past the end yields nothing
    let fetch = FetchClause::new().with_offset(ValueExpression::literal(10i64));
    let mut scan = person_scan(&fixture, fetch, &variables);
    assert!(collect_names(&mut scan)?.is_empty());

    // A null or negative number means no rows
    for number in [ValueExpression::null(DbTypeCode::Integer), ValueExpression::literal(-3i64)] {
        let mut scan = person_scan(&fixture, FetchClause::new().with_number(number), &variables);
        assert!(collect_names(&mut scan)?.is_empty());
    }
    Ok(())
}

#[test]
fn test_fetch_number_from_variable() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(1);
    let number = ValueExpression::variable(0, DbTypeCode::Integer, &variables)?;
    let mut scan = person_scan(&fixture, FetchClause::new().with_number(number), &variables);

    scan.set_variable_value(0, Value::Integer(3))?;
    assert_eq!(collect_names(&mut scan)?.len(), 3);

    // The limit is read again on every execution
    scan.set_variable_value(0, Value::Integer(1))?;
    scan.reset(None)?;
    assert_eq!(collect_names(&mut scan)?, vec!["Alice"]);
    Ok(())
}

#[test]
fn test_first_only_flag() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(0);
    let mut scan = person_scan(&fixture, FetchClause::new(), &variables);
    scan.set_first_only_flag(true);
    assert_eq!(collect_names(&mut scan)?, vec!["Alice"]);

    scan.set_first_only_flag(false);
    scan.reset(None)?;
    assert_eq!(collect_names(&mut scan)?.len(), 6);
    Ok(())
}

#[test]
fn test_current_requires_singleton_projection() -> Result<()> {
    let fixture = fixture()?;
    let mut rtb = RowTypeBinding::new();
    let extent = rtb.add_extent("p", fixture.person.clone());
    rtb.add_projection("Name", person_path(extent, NAME));
    rtb.add_projection("Age", person_path(extent, AGE));
    let rtb = Arc::new(rtb);
    let variables = VariableArray::new(0);
    let mut scan = FullTableScan::new(base(&rtb, &variables), fixture.store.clone(), "Person", 0, None);

    assert!(scan.move_next()?);
    assert!(matches!(scan.current(), Err(QueryError::InvalidOperation(_))));
    assert_eq!(
        scan.current_values()?,
        Some(vec![Some(Value::from("Alice")), Some(Value::Integer(30))])
    );
    assert!(!scan.query_flags().contains(QueryFlags::SINGLETON_PROJECTION));
    Ok(())
}

#[test]
fn test_identity_lookup() -> Result<()> {
    let fixture = fixture()?;
    let rtb = person_row_type(&fixture);
    let variables = VariableArray::new(1);
    let identity = ValueExpression::variable(0, DbTypeCode::UInteger, &variables)?;
    let mut lookup = ObjectIdentityLookup::new(
        base(&rtb, &variables),
        fixture.store.clone(),
        "Person",
        0,
        identity,
        Some(eng_condition()?),
    )?;

    lookup.set_variable_value(0, Value::UInteger(3))?;
    assert_eq!(collect_names(&mut lookup)?, vec!["Carol"]);

    // Bob is not in Eng
    lookup.set_variable_value(0, Value::UInteger(2))?;
    lookup.reset(None)?;
    assert!(collect_names(&mut lookup)?.is_empty());

    // Identity 7 is a pet
    lookup.set_variable_value(0, Value::UInteger(7))?;
    lookup.reset(None)?;
    assert!(collect_names(&mut lookup)?.is_empty());

    // Unknown identity
    lookup.set_variable_to_null(0)?;
    lookup.reset(None)?;
    assert!(collect_names(&mut lookup)?.is_empty());

    let by_name = ObjectIdentityLookup::new(
        base(&rtb, &variables),
        fixture.store.clone(),
        "Person",
        0,
        ValueExpression::literal("Carol"),
        None,
    );
    assert!(matches!(by_name, Err(QueryError::TypeError(_))));
    Ok(())
}

#[test]
fn test_clone_cached_gets_own_variables() -> Result<()> {
    let fixture = fixture()?;
    let rtb = person_row_type(&fixture);
    let variables = VariableArray::new(1);
    let cache = Arc::new(EnumeratorCache::with_limits(4, 2));
    let condition = LogicalExpression::comparison(Comparison::new(
        ComparisonOperator::GreaterThan,
        person_path(0, AGE),
        ValueExpression::variable(0, DbTypeCode::Integer, &variables)?,
    )?);
    let mut original = FullTableScan::new(
        base(&rtb, &variables).with_query("SELECT p.Name FROM Person p WHERE p.Age > ?").with_cache(cache.clone()),
        fixture.store.clone(),
        "Person",
        0,
        Some(condition),
    );
    original.set_variable_value(0, Value::Integer(33))?;

    let mut clone = original.clone_cached()?;
    assert_eq!(clone.unique_query_id(), original.unique_query_id());
    assert_eq!(clone.query_string(), original.query_string());
    assert!(!clone.variables().ptr_eq(original.variables()));
    clone.set_variable_value(0, Value::Integer(29))?;

    assert_eq!(collect_names(&mut original)?, vec!["Carol", "Frank"]);
    assert_eq!(collect_names(clone.as_mut())?, vec!["Alice", "Carol", "Frank"]);

    // Returned instances are reset, cleared and reused
    attach_to_cache(clone)?;
    assert_eq!(cache.len(), 1);
    let mut pooled = original.clone_cached()?;
    assert!(cache.is_empty());
    assert!(!pooled.variables().is_set(0));
    pooled.set_variable_value(0, Value::Integer(40))?;
    assert_eq!(collect_names(pooled.as_mut())?, vec!["Frank"]);
    Ok(())
}

#[test]
fn test_cache_limits() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(0);
    let cache = Arc::new(EnumeratorCache::with_limits(1, 1));
    let rtb = person_row_type(&fixture);
    let make = || {
        FullTableScan::new(
            base(&rtb, &variables).with_cache(cache.clone()),
            fixture.store.clone(),
            "Person",
            0,
            None,
        )
    };

    let first = make();
    let a = first.clone_cached()?;
    let b = first.clone_cached()?;
    attach_to_cache(a)?;
    attach_to_cache(b)?;
    // One instance per shape
    assert_eq!(cache.len(), 1);

    // A new shape evicts the old one
    let second = make();
    attach_to_cache(second.clone_cached()?)?;
    assert_eq!(cache.shape_count(), 1);
    assert!(cache.checkout(first.unique_query_id()).is_none());
    assert!(cache.checkout(second.unique_query_id()).is_some());

    // Without a cache attaching is a no-op
    let uncached = FullTableScan::new(base(&rtb, &variables), fixture.store.clone(), "Person", 0, None);
    attach_to_cache(Box::new(uncached))?;
    Ok(())
}

#[test]
fn test_get_info() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(2);
    let fetch = FetchClause::new()
        .with_number(ValueExpression::variable(1, DbTypeCode::Integer, &variables)?)
        .with_offset(ValueExpression::literal(5i64))
        .with_offset_key(ValueExpression::variable(0, DbTypeCode::Binary, &variables)?);
    let scan = person_scan(&fixture, fetch, &variables);
    let mut buffer = [0u8; 16];

    let written = scan.get_info(InfoType::FetchVariable, FETCH_NUMBER, &mut buffer)?;
    assert_eq!(&buffer[..written], &1u32.to_le_bytes());
    let written = scan.get_info(InfoType::RecreationKeyVariable, 0, &mut buffer)?;
    assert_eq!(&buffer[..written], &0u32.to_le_bytes());
    let written = scan.get_info(InfoType::FetchLiteral, FETCH_OFFSET, &mut buffer)?;
    assert_eq!(&buffer[..written], &5i64.to_le_bytes());

    assert!(matches!(
        scan.get_info(InfoType::FetchLiteral, FETCH_NUMBER, &mut buffer),
        Err(QueryError::InvalidOperation(_))
    ));
    assert!(matches!(
        scan.get_info(InfoType::FetchVariable, 9, &mut buffer),
        Err(QueryError::InvalidOperation(_))
    ));

    let mut short = [0xEEu8; 2];
    assert!(matches!(
        scan.get_info(InfoType::FetchVariable, FETCH_NUMBER, &mut short),
        Err(QueryError::BufferTooSmall { required: 4 })
    ));
    assert_eq!(short, [0xEE, 0xEE]);
    Ok(())
}

#[test]
fn test_recreation_key_layout_of_join() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(0);
    let mut rtb = RowTypeBinding::new();
    let people = rtb.add_extent("p", fixture.person.clone());
    let pets = rtb.add_extent("pet", fixture.pet.clone());
    rtb.add_projection("Name", person_path(people, NAME));
    let rtb = Arc::new(rtb);

    let left = FullTableScan::new(base(&rtb, &variables), fixture.store.clone(), "Person", people, None);
    let right = FullTableScan::new(base(&rtb, &variables), fixture.store.clone(), "Pet", pets, None);
    let join = Join::new(base(&rtb, &variables), Box::new(left), Box::new(right), JoinType::Inner, None)?;

    let mut buffer = [0u8; 8];
    let written = join.get_info(InfoType::RecreationKeyLayout, 0, &mut buffer)?;
    assert_eq!(&buffer[..written], &[3, 0, 1, 1, 1, 2, 4]);
    assert_eq!(join.node_id(), 2);
    assert_eq!(join.depth(), 2);
    assert_eq!(join.right().get_unique_name(0), "FullTableScan_1_0");
    Ok(())
}

#[test]
fn test_query_flags() -> Result<()> {
    let fixture = fixture()?;
    let rtb = person_row_type(&fixture);
    let variables = VariableArray::new(2);
    let fetch = FetchClause::new()
        .with_number(ValueExpression::variable(1, DbTypeCode::Integer, &variables)?)
        .with_offset_key(ValueExpression::variable(0, DbTypeCode::Binary, &variables)?);
    let scan = FullTableScan::new(
        base(&rtb, &variables).with_fetch(fetch),
        fixture.store.clone(),
        "Person",
        0,
        Some(eng_condition()?),
    );
    let flags = scan.query_flags();
    assert!(flags.contains(QueryFlags::INCLUDES_LITERAL));
    assert!(flags.contains(QueryFlags::INCLUDES_FETCH_VARIABLE));
    assert!(flags.contains(QueryFlags::INCLUDES_OFFSET_KEY_VARIABLE));
    assert!(flags.contains(QueryFlags::SINGLETON_PROJECTION));
    assert!(!flags.contains(QueryFlags::INCLUDES_FETCH_LITERAL));
    assert!(!flags.contains(QueryFlags::INCLUDES_SORTING));
    assert!(!flags.contains(QueryFlags::INCLUDES_AGGREGATION));
    Ok(())
}

#[test]
fn test_plan_string() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(0);
    let rtb = person_row_type(&fixture);
    let scan = FullTableScan::new(base(&rtb, &variables), fixture.store.clone(), "Person", 0, Some(eng_condition()?));
    let plan = scan.plan_string();
    let lines: Vec<&str> = plan.lines().collect();
    assert_eq!(lines[0], "FullTableScan(node 0, Person AS extent 0)");
    assert!(lines[1].starts_with("\tWHERE "));
    assert!(lines[1].contains("'Eng'"));
    Ok(())
}

#[test]
fn test_compiled_filter_matches_interpreter() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(1);
    let rtb = person_row_type(&fixture);
    let condition = LogicalExpression::and(
        eng_condition()?,
        LogicalExpression::or(
            LogicalExpression::comparison(Comparison::new(
                ComparisonOperator::LessThan,
                person_path(0, AGE),
                ValueExpression::variable(0, DbTypeCode::Integer, &variables)?,
            )?),
            LogicalExpression::comparison(Comparison::new(
                ComparisonOperator::Is,
                person_path(0, AGE),
                ValueExpression::null(DbTypeCode::Integer),
            )?),
        ),
    );

    let interpreted_config = Arc::new(ExecutionConfig {
        enable_codegen: false,
        ..ExecutionConfig::default()
    });
    let mut compiled = FullTableScan::new(
        base(&rtb, &variables),
        fixture.store.clone(),
        "Person",
        0,
        Some(condition.clone()),
    );
    let mut interpreted = FullTableScan::new(
        base(&rtb, &variables).with_config(interpreted_config),
        fixture.store.clone(),
        "Person",
        0,
        Some(condition),
    );
    assert!(compiled.has_code_generation());
    assert!(!interpreted.has_code_generation());

    let mut code = String::new();
    compiled.generate_compilable_code(&mut code)?;
    assert!(code.starts_with("FullTableScan_0_0:\n"));
    let mut none = String::new();
    interpreted.generate_compilable_code(&mut none)?;
    assert!(none.is_empty());

    for limit in [0i64, 29, 31, 100] {
        compiled.set_variable_value(0, Value::Integer(limit))?;
        compiled.reset(None)?;
        interpreted.reset(None)?;
        assert_eq!(collect_names(&mut compiled)?, collect_names(&mut interpreted)?);
    }
    Ok(())
}

#[test]
fn test_transaction_id_is_shared_with_variables() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(0);
    let scan = person_scan(&fixture, FetchClause::new(), &variables);
    scan.set_transaction_id(42);
    assert_eq!(scan.transaction_id(), 42);
    assert_eq!(variables.transaction_id(), 42);
    Ok(())
}
