use std::sync::Arc;

use anyhow::Result;
use objquery::common::types::{DbTypeCode, QueryFlags};
use objquery::query::comparer::{MultiComparer, SingleComparer};
use objquery::query::condition::{Comparison, ComparisonOperator, LogicalExpression, TruthValue};
use objquery::query::executor::operators::{FullTableScan, IndexScan, Join, ObjectIdentityLookup, Sort};
use objquery::query::executor::{EnumeratorBase, ExecutionEnumerator, FetchClause, JoinType, QueryError, RowTypeBinding};
use objquery::query::expression::{Value, ValueExpression, VariableArray};
use objquery::query::ranges::{DynamicRange, RangePoint};

#[path = "../common/mod.rs"]
mod common;

use common::*;

// Offset key in variable 0, page size 2
fn paged(rtb: &Arc<RowTypeBinding>, variables: &VariableArray, page_size: i64) -> Result<EnumeratorBase> {
    let fetch = FetchClause::new()
        .with_number(ValueExpression::literal(page_size))
        .with_offset_key(ValueExpression::variable(0, DbTypeCode::Binary, variables)?);
    Ok(base(rtb, variables).with_fetch(fetch))
}

// Rows of one execution and the offset key of its last row
fn page(enumerator: &mut dyn ExecutionEnumerator, key: Option<Vec<u8>>) -> Result<(Vec<String>, Option<Vec<u8>>)> {
    match key {
        Some(key) => enumerator.set_variable_value(0, Value::Binary(key))?,
        None => enumerator.set_variable_to_null(0)?,
    }
    enumerator.reset(None)?;
    let mut names = Vec::new();
    let mut last_key = None;
    while enumerator.move_next()? {
        let values = enumerator.current_values()?.unwrap_or_default();
        names.push(
            values
                .into_iter()
                .map(render)
                .collect::<Vec<_>>()
                .join("/"),
        );
        last_key = enumerator.get_offset_key()?;
    }
    Ok((names, last_key))
}

fn person_scan(fixture: &Fixture, variables: &VariableArray, page_size: i64) -> Result<FullTableScan> {
    let rtb = person_row_type(fixture);
    Ok(FullTableScan::new(
        paged(&rtb, variables, page_size)?,
        fixture.store.clone(),
        "Person",
        0,
        None,
    ))
}

#[test]
fn test_scan_pages_through_offset_keys() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(1);
    let mut scan = person_scan(&fixture, &variables, 2)?;
    assert!(scan.query_flags().contains(QueryFlags::INCLUDES_OFFSET_KEY_VARIABLE));

    let (rows, key) = page(&mut scan, None)?;
    assert_eq!(rows, vec!["Alice", "Bob"]);
    let (rows, key) = page(&mut scan, key)?;
    assert_eq!(rows, vec!["Carol", "Dave"]);
    let (rows, key) = page(&mut scan, key)?;
    assert_eq!(rows, vec!["Erin", "Frank"]);
    let (rows, key) = page(&mut scan, key)?;
    assert!(rows.is_empty());
    assert!(key.is_none());
    assert!(!variables.failed_to_recreate_object());
    Ok(())
}

#[test]
fn test_key_is_taken_on_a_positioned_enumerator_only() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(1);
    let mut scan = person_scan(&fixture, &variables, 2)?;
    scan.set_variable_to_null(0)?;
    assert!(scan.get_offset_key()?.is_none());
    assert!(scan.move_next()?);
    let key = scan.get_offset_key()?.ok_or_else(|| anyhow::anyhow!("no key"))?;
    // version, query id, one section
    assert_eq!(key[0], 1);
    assert_eq!(&key[1..9], &scan.unique_query_id().to_be_bytes());
    assert_eq!(key[9], 1);
    Ok(())
}

#[test]
fn test_stay_at_offset_key_returns_the_saved_row() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(1);
    let mut scan = person_scan(&fixture, &variables, 2)?;
    let (_, key) = page(&mut scan, None)?;

    scan.set_stay_at_offset_key(true);
    scan.set_variable_value(0, Value::Binary(key.ok_or_else(|| anyhow::anyhow!("no key"))?))?;
    scan.reset(None)?;
    assert!(scan.move_next()?);
    assert_eq!(scan.current()?, Some(Value::from("Bob")));
    assert!(scan.is_at_recreated_key());
    assert!(scan.move_next()?);
    assert_eq!(scan.current()?, Some(Value::from("Carol")));
    assert!(!scan.is_at_recreated_key());
    assert!(!scan.move_next()?);
    Ok(())
}

#[test]
fn test_use_offset_key_switch() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(1);
    let mut scan = person_scan(&fixture, &variables, 2)?;
    let (_, key) = page(&mut scan, None)?;
    scan.set_use_offset_key(false);
    let (rows, _) = page(&mut scan, key)?;
    assert_eq!(rows, vec!["Alice", "Bob"]);
    Ok(())
}

#[test]
fn test_empty_key_starts_from_the_beginning() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(0);
    let rtb = person_row_type(&fixture);
    let fetch = FetchClause::new()
        .with_number(ValueExpression::literal(1i64))
        .with_offset_key(ValueExpression::literal(Vec::<u8>::new()));
    let mut scan = FullTableScan::new(base(&rtb, &variables).with_fetch(fetch), fixture.store.clone(), "Person", 0, None);
    assert!(scan.query_flags().contains(QueryFlags::INCLUDES_OFFSET_KEY_LITERAL));
    assert_eq!(collect_names(&mut scan)?, vec!["Alice"]);
    Ok(())
}

#[test]
fn test_invalid_keys_are_retriable_errors() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(1);
    let mut scan = person_scan(&fixture, &variables, 2)?;
    let (_, key) = page(&mut scan, None)?;
    let key = key.ok_or_else(|| anyhow::anyhow!("no key"))?;

    let garbage = vec![0xFFu8; 5];
    let truncated = key[..key.len() - 1].to_vec();
    for bad in [garbage, truncated] {
        let error = page(&mut scan, Some(bad)).err().ok_or_else(|| anyhow::anyhow!("bad key accepted"))?;
        let error = error.downcast::<QueryError>()?;
        assert!(matches!(error, QueryError::InvalidOffsetKey(_)));
        assert!(error.is_retriable());
    }

    // A tree of another shape rejects the key
    let sort_variables = VariableArray::new(1);
    let mut sort = age_sort(&fixture, &sort_variables)?;
    let error = page(&mut sort, Some(key)).err().ok_or_else(|| anyhow::anyhow!("key of another shape accepted"))?;
    let error = error.downcast::<QueryError>()?;
    assert!(matches!(error, QueryError::InvalidOffsetKey(_)));
    assert!(error.is_retriable());
    Ok(())
}

#[test]
fn test_key_resumes_in_a_rebuilt_enumerator() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(1);
    let mut scan = person_scan(&fixture, &variables, 2)?;
    let (rows, key) = page(&mut scan, None)?;
    assert_eq!(rows, vec!["Alice", "Bob"]);

    // Same plan built again, as after a cache eviction
    let rebuilt_variables = VariableArray::new(1);
    let mut rebuilt = person_scan(&fixture, &rebuilt_variables, 2)?;
    assert_ne!(rebuilt.unique_query_id(), scan.unique_query_id());
    let (rows, key) = page(&mut rebuilt, key)?;
    assert_eq!(rows, vec!["Carol", "Dave"]);
    assert!(!rebuilt_variables.failed_to_recreate_object());

    // And the rebuilt enumerator's key pages the original one
    let (rows, _) = page(&mut scan, key)?;
    assert_eq!(rows, vec!["Erin", "Frank"]);
    Ok(())
}

#[test]
fn test_deleted_key_object_resumes_at_next() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(1);
    let mut scan = person_scan(&fixture, &variables, 2)?;
    let (_, key) = page(&mut scan, None)?;

    // Bob is gone before the next page is requested
    assert!(fixture.store.delete(fixture.people[1].identity())?);
    let (rows, _) = page(&mut scan, key)?;
    assert_eq!(rows, vec!["Carol", "Dave"]);
    assert!(variables.failed_to_recreate_object());
    Ok(())
}

#[test]
fn test_filtered_out_key_object_is_not_lost() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(1);
    let mut scan = person_scan(&fixture, &variables, 2)?;
    let (_, key) = page(&mut scan, None)?;

    // Same shape, but no row can pass the filter any more
    let rtb = person_row_type(&fixture);
    let closed_variables = VariableArray::new(1);
    let mut closed = FullTableScan::new(
        paged(&rtb, &closed_variables, 2)?,
        fixture.store.clone(),
        "Person",
        0,
        Some(LogicalExpression::Literal(TruthValue::False)),
    );
    let (rows, _) = page(&mut closed, key)?;
    assert!(rows.is_empty());
    assert!(!closed_variables.failed_to_recreate_object());
    Ok(())
}

#[test]
fn test_index_key_outside_new_range_is_not_lost() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(1);
    let rtb = person_row_type(&fixture);
    let make = |variables: &VariableArray, lowest: i64| -> Result<IndexScan> {
        let range = DynamicRange::new(
            DbTypeCode::Integer,
            vec![RangePoint::new(ComparisonOperator::GreaterThanOrEqual, ValueExpression::literal(lowest))],
        )?;
        Ok(IndexScan::new(
            paged(&rtb, variables, 2)?,
            fixture.store.clone(),
            "PersonByAge",
            0,
            range,
            None,
            false,
        )?)
    };
    let (rows, key) = page(&mut make(&variables, 0)?, None)?;
    assert_eq!(rows, vec!["Bob", "Erin"]);

    // Erin still exists, she just lies below the new range
    let narrow_variables = VariableArray::new(1);
    let (rows, _) = page(&mut make(&narrow_variables, 100)?, key)?;
    assert!(rows.is_empty());
    assert!(!narrow_variables.failed_to_recreate_object());
    Ok(())
}

#[test]
fn test_index_scan_pages_in_key_order() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(1);
    let rtb = person_row_type(&fixture);
    let make = |descending: bool| -> Result<IndexScan> {
        let range = DynamicRange::new(
            DbTypeCode::Integer,
            vec![RangePoint::new(ComparisonOperator::GreaterThanOrEqual, ValueExpression::literal(0i64))],
        )?;
        Ok(IndexScan::new(
            paged(&rtb, &variables, 2)?,
            fixture.store.clone(),
            "PersonByAge",
            0,
            range,
            None,
            descending,
        )?)
    };

    let mut ascending = make(false)?;
    let (rows, key) = page(&mut ascending, None)?;
    assert_eq!(rows, vec!["Bob", "Erin"]);
    let (rows, key) = page(&mut ascending, key)?;
    assert_eq!(rows, vec!["Alice", "Carol"]);
    let (rows, _) = page(&mut ascending, key)?;
    assert_eq!(rows, vec!["Frank"]);

    let mut descending = make(true)?;
    let (rows, key) = page(&mut descending, None)?;
    assert_eq!(rows, vec!["Frank", "Carol"]);
    let (rows, _) = page(&mut descending, key)?;
    assert_eq!(rows, vec!["Alice", "Erin"]);
    Ok(())
}

#[test]
fn test_identity_lookup_key() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(1);
    let rtb = person_row_type(&fixture);
    let mut lookup = ObjectIdentityLookup::new(
        paged(&rtb, &variables, 2)?,
        fixture.store.clone(),
        "Person",
        0,
        ValueExpression::literal(5u64),
        None,
    )?;
    let (rows, key) = page(&mut lookup, None)?;
    assert_eq!(rows, vec!["Erin"]);
    let (rows, _) = page(&mut lookup, key.clone())?;
    assert!(rows.is_empty());

    lookup.set_stay_at_offset_key(true);
    let (rows, _) = page(&mut lookup, key)?;
    assert_eq!(rows, vec!["Erin"]);
    Ok(())
}

fn owner_join(fixture: &Fixture, variables: &VariableArray, page_size: i64) -> Result<Join> {
    let mut rtb = RowTypeBinding::new();
    rtb.add_extent("p", fixture.person.clone());
    rtb.add_extent("pet", fixture.pet.clone());
    rtb.add_projection("Owner", person_path(0, NAME));
    rtb.add_projection("Pet", pet_path(1, PET_NAME));
    let rtb = Arc::new(rtb);
    let owned = LogicalExpression::comparison(Comparison::new(
        ComparisonOperator::Equal,
        pet_path(1, OWNER_NAME),
        person_path(0, NAME),
    )?);
    let left = FullTableScan::new(base(&rtb, variables), fixture.store.clone(), "Person", 0, None);
    let right = FullTableScan::new(base(&rtb, variables), fixture.store.clone(), "Pet", 1, Some(owned));
    Ok(Join::new(
        paged(&rtb, variables, page_size)?,
        Box::new(left),
        Box::new(right),
        JoinType::LeftOuter,
        None,
    )?)
}

#[test]
fn test_join_pages_resume_inside_the_right_input() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(1);
    let mut join = owner_join(&fixture, &variables, 3)?;

    let (rows, key) = page(&mut join, None)?;
    assert_eq!(rows, vec!["Alice/Rex", "Bob/NULL", "Carol/Tom"]);
    let (rows, key) = page(&mut join, key)?;
    assert_eq!(rows, vec!["Carol/Kit", "Dave/NULL", "Erin/NULL"]);
    let (rows, _) = page(&mut join, key)?;
    assert_eq!(rows, vec!["Frank/NULL"]);
    Ok(())
}

#[test]
fn test_join_key_on_a_placeholder_row() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(1);
    let mut join = owner_join(&fixture, &variables, 2)?;

    let (rows, placeholder_key) = page(&mut join, None)?;
    assert_eq!(rows, vec!["Alice/Rex", "Bob/NULL"]);
    // The placeholder is not emitted again
    let (rows, key) = page(&mut join, placeholder_key.clone())?;
    assert_eq!(rows, vec!["Carol/Tom", "Carol/Kit"]);

    // ... unless the enumerator stays at the key
    join.set_stay_at_offset_key(true);
    let (rows, _) = page(&mut join, placeholder_key)?;
    assert_eq!(rows, vec!["Bob/NULL", "Carol/Tom"]);

    join.set_stay_at_offset_key(false);
    let (rows, _) = page(&mut join, key)?;
    assert_eq!(rows, vec!["Dave/NULL", "Erin/NULL"]);
    Ok(())
}

#[test]
fn test_join_left_row_gone_restarts_right_input() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(1);
    let mut join = owner_join(&fixture, &variables, 4)?;
    let (rows, key) = page(&mut join, None)?;
    assert_eq!(rows.last().map(String::as_str), Some("Carol/Kit"));

    assert!(fixture.store.delete(fixture.people[2].identity())?);
    let (rows, _) = page(&mut join, key)?;
    assert_eq!(rows, vec!["Dave/NULL", "Erin/NULL", "Frank/NULL"]);
    assert!(variables.failed_to_recreate_object());
    Ok(())
}

fn age_sort(fixture: &Fixture, variables: &VariableArray) -> Result<Sort> {
    let rtb = person_row_type(fixture);
    let child = FullTableScan::new(base(&rtb, variables), fixture.store.clone(), "Person", 0, None);
    let comparer = MultiComparer::new(vec![
        SingleComparer::ascending(person_path(0, AGE)),
        SingleComparer::descending(person_path(0, NAME)),
    ]);
    Ok(Sort::new(paged(&rtb, variables, 2)?, Box::new(child), comparer)?)
}

#[test]
fn test_sort_pages_by_emitted_count() -> Result<()> {
    let fixture = fixture()?;
    let variables = VariableArray::new(1);
    let mut sort = age_sort(&fixture, &variables)?;
    assert!(sort.query_flags().contains(QueryFlags::INCLUDES_SORTING));

    // Nulls sort first
    let (rows, key) = page(&mut sort, None)?;
    assert_eq!(rows, vec!["Dave", "Bob"]);
    let (rows, key) = page(&mut sort, key)?;
    assert_eq!(rows, vec!["Erin", "Alice"]);

    sort.set_stay_at_offset_key(true);
    let (rows, _) = page(&mut sort, key.clone())?;
    assert_eq!(rows, vec!["Alice", "Carol"]);

    sort.set_stay_at_offset_key(false);
    let (rows, key) = page(&mut sort, key)?;
    assert_eq!(rows, vec!["Carol", "Frank"]);
    let (rows, _) = page(&mut sort, key)?;
    assert!(rows.is_empty());
    Ok(())
}
