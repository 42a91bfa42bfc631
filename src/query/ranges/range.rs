// Dynamic Ranges
//
// A dynamic range is the set of range points an index scan was planned with.
// The point values may depend on variables or on outer extents, so the key
// range is only computed when the scan is reset.

use std::cmp::Ordering;
use std::ops::Bound;

use crate::common::types::{DbTypeCode, QueryFlags};
use crate::query::condition::ComparisonOperator;
use crate::query::executor::result::{QueryError, QueryResult, Row};
use crate::query::expression::{Value, ValueExpression, VariableArray};
use crate::query::ranges::key_builder::filter_key;
use crate::storage::KeyRange;

/// Suffix that sorts after every identity appended to a value key
const MAX_IDENTITY: [u8; 8] = [0xFF; 8];

/// Smallest key of a defined (non-null) value
const FIRST_VALUE_KEY: [u8; 1] = [0x01];

/// One bound contributed by a comparison: `column <operator> value`
#[derive(Debug, Clone)]
pub struct RangePoint {
    operator: ComparisonOperator,
    value: ValueExpression,
}

impl RangePoint {
    pub fn new(operator: ComparisonOperator, value: ValueExpression) -> Self {
        RangePoint { operator, value }
    }

    pub fn operator(&self) -> ComparisonOperator {
        self.operator
    }

    pub fn value(&self) -> &ValueExpression {
        &self.value
    }
}

enum PointBounds {
    Lower(Bound<Vec<u8>>),
    Upper(Bound<Vec<u8>>),
    Exact(Vec<u8>),
    Empty,
}

/// Range over one indexed column built from range points
#[derive(Debug, Clone)]
pub struct DynamicRange {
    type_code: DbTypeCode,
    points: Vec<RangePoint>,
}

impl DynamicRange {
    pub fn new(type_code: DbTypeCode, points: Vec<RangePoint>) -> QueryResult<Self> {
        if let Some(point) = points.iter().find(|point| !point.operator.is_range_operator()) {
            return Err(QueryError::Internal(format!("{} cannot bound a range", point.operator)));
        }
        Ok(DynamicRange { type_code, points })
    }

    pub fn type_code(&self) -> DbTypeCode {
        self.type_code
    }

    pub fn points(&self) -> &[RangePoint] {
        &self.points
    }

    pub fn clone_with(&self, variables: &VariableArray) -> QueryResult<DynamicRange> {
        self.map_values(|value| value.clone_with(variables))
    }

    pub fn instantiate(&self, row: &Row) -> QueryResult<DynamicRange> {
        self.map_values(|value| value.instantiate(row))
    }

    fn map_values(&self, f: impl Fn(&ValueExpression) -> QueryResult<ValueExpression>) -> QueryResult<DynamicRange> {
        let points = self
            .points
            .iter()
            .map(|point| Ok(RangePoint::new(point.operator, f(&point.value)?)))
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(DynamicRange {
            type_code: self.type_code,
            points,
        })
    }

    pub fn populate_query_flags(&self, flags: &mut QueryFlags) {
        for point in &self.points {
            point.value.populate_query_flags(flags);
        }
    }

    /// Key range over full index entry keys, or `None` when nothing can match
    pub fn evaluate(&self, row: &Row) -> QueryResult<Option<KeyRange>> {
        if self.points.is_empty() {
            return Ok(Some(KeyRange::full()));
        }
        let mut lower = Bound::Included(FIRST_VALUE_KEY.to_vec());
        let mut upper = Bound::Unbounded;
        for point in &self.points {
            match self.point_bounds(point, row)? {
                PointBounds::Empty => return Ok(None),
                PointBounds::Lower(bound) => lower = tighter_lower(lower, bound),
                PointBounds::Upper(bound) => upper = tighter_upper(upper, bound),
                PointBounds::Exact(key) => {
                    lower = tighter_lower(lower, Bound::Included(key.clone()));
                    upper = tighter_upper(upper, Bound::Included(key));
                }
            }
        }
        let range = KeyRange::from_value_bounds(lower, upper);
        Ok(if range.is_empty() { None } else { Some(range) })
    }

    fn point_bounds(&self, point: &RangePoint, row: &Row) -> QueryResult<PointBounds> {
        let Some(value) = point.value.evaluate(row)? else {
            return Ok(PointBounds::Empty);
        };
        match self.type_code {
            DbTypeCode::Integer => integral_bounds(
                point.operator,
                value.to_integer_floor()?.map(Value::Integer),
                value.to_integer_ceiling()?.map(Value::Integer),
            ),
            DbTypeCode::UInteger => integral_bounds(
                point.operator,
                value.to_uinteger_floor()?.map(Value::UInteger),
                value.to_uinteger_ceiling()?.map(Value::UInteger),
            ),
            DbTypeCode::Decimal => match value.to_decimal()? {
                Some(decimal) => exact_bounds(point.operator, &Value::Decimal(decimal)),
                None => Ok(PointBounds::Empty),
            },
            DbTypeCode::Double => match value.to_double()? {
                Some(double) => exact_bounds(point.operator, &Value::Double(double)),
                None => Ok(PointBounds::Empty),
            },
            code if value.type_code() == code => exact_bounds(point.operator, &value),
            code => Err(QueryError::TypeError(format!(
                "Range over {} column bounded by {} value",
                code,
                value.type_code()
            ))),
        }
    }
}

/// Bounds for an integer column. A non-integral value bounds an upper limit by its
/// floor and a lower limit by its ceiling; equality with it matches nothing.
fn integral_bounds(operator: ComparisonOperator, floor: Option<Value>, ceiling: Option<Value>) -> QueryResult<PointBounds> {
    let exact = matches!((&floor, &ceiling), (Some(f), Some(c)) if f == c);
    let key = |value: &Value| filter_key(Some(value));
    Ok(match operator {
        ComparisonOperator::LessThan => match floor {
            Some(f) if exact => PointBounds::Upper(Bound::Excluded(key(&f)?)),
            Some(f) => PointBounds::Upper(Bound::Included(key(&f)?)),
            None => PointBounds::Empty,
        },
        ComparisonOperator::LessThanOrEqual => match floor {
            Some(f) => PointBounds::Upper(Bound::Included(key(&f)?)),
            None => PointBounds::Empty,
        },
        ComparisonOperator::GreaterThan => match ceiling {
            Some(c) if exact => PointBounds::Lower(Bound::Excluded(key(&c)?)),
            Some(c) => PointBounds::Lower(Bound::Included(key(&c)?)),
            None => PointBounds::Empty,
        },
        ComparisonOperator::GreaterThanOrEqual => match ceiling {
            Some(c) => PointBounds::Lower(Bound::Included(key(&c)?)),
            None => PointBounds::Empty,
        },
        ComparisonOperator::Equal => match floor {
            Some(f) if exact => PointBounds::Exact(key(&f)?),
            _ => PointBounds::Empty,
        },
        other => return Err(QueryError::Internal(format!("{} cannot bound a range", other))),
    })
}

fn exact_bounds(operator: ComparisonOperator, value: &Value) -> QueryResult<PointBounds> {
    let key = filter_key(Some(value))?;
    Ok(match operator {
        ComparisonOperator::LessThan => PointBounds::Upper(Bound::Excluded(key)),
        ComparisonOperator::LessThanOrEqual => PointBounds::Upper(Bound::Included(key)),
        ComparisonOperator::GreaterThan => PointBounds::Lower(Bound::Excluded(key)),
        ComparisonOperator::GreaterThanOrEqual => PointBounds::Lower(Bound::Included(key)),
        ComparisonOperator::Equal => PointBounds::Exact(key),
        other => return Err(QueryError::Internal(format!("{} cannot bound a range", other))),
    })
}

fn bound_key(bound: &Bound<Vec<u8>>) -> Option<&Vec<u8>> {
    match bound {
        Bound::Included(key) | Bound::Excluded(key) => Some(key),
        Bound::Unbounded => None,
    }
}

fn tighter_lower(current: Bound<Vec<u8>>, candidate: Bound<Vec<u8>>) -> Bound<Vec<u8>> {
    match (bound_key(&current), bound_key(&candidate)) {
        (_, None) => current,
        (None, _) => candidate,
        (Some(a), Some(b)) => match a.cmp(b) {
            Ordering::Greater => current,
            Ordering::Less => candidate,
            Ordering::Equal if matches!(current, Bound::Excluded(_)) => current,
            Ordering::Equal => candidate,
        },
    }
}

fn tighter_upper(current: Bound<Vec<u8>>, candidate: Bound<Vec<u8>>) -> Bound<Vec<u8>> {
    match (bound_key(&current), bound_key(&candidate)) {
        (_, None) => current,
        (None, _) => candidate,
        (Some(a), Some(b)) => match a.cmp(b) {
            Ordering::Less => current,
            Ordering::Greater => candidate,
            Ordering::Equal if matches!(current, Bound::Excluded(_)) => current,
            Ordering::Equal => candidate,
        },
    }
}

impl KeyRange {
    /// Convert bounds over value keys into bounds over full entry keys
    pub fn from_value_bounds(lower: Bound<Vec<u8>>, upper: Bound<Vec<u8>>) -> KeyRange {
        let lower = match lower {
            Bound::Excluded(mut key) => {
                key.extend_from_slice(&MAX_IDENTITY);
                Bound::Excluded(key)
            }
            other => other,
        };
        let upper = match upper {
            Bound::Included(mut key) => {
                key.extend_from_slice(&MAX_IDENTITY);
                Bound::Included(key)
            }
            other => other,
        };
        KeyRange { lower, upper }
    }

    /// The part of this range at or after `entry_key` in scan direction
    pub fn resume_at(&self, entry_key: &[u8], descending: bool) -> KeyRange {
        let at = Bound::Included(entry_key.to_vec());
        if descending {
            KeyRange {
                lower: self.lower.clone(),
                upper: tighter_upper(self.upper.clone(), at),
            }
        } else {
            KeyRange {
                lower: tighter_lower(self.lower.clone(), at),
                upper: self.upper.clone(),
            }
        }
    }
}
