use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use crate::common::types::DbTypeCode;
use crate::query::executor::result::{QueryError, QueryResult};
use crate::query::expression::numeric::Numeric;
use crate::storage::ObjectRef;

/// A non-null value of one of the engine datatypes
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Binary(Vec<u8>),
    Boolean(bool),
    DateTime(NaiveDateTime),
    Decimal(Decimal),
    Double(f64),
    Integer(i64),
    UInteger(u64),
    String(String),
    Object(ObjectRef),
}

/// Apply a generic numeric function to a numeric value, failing for other types
macro_rules! numeric_apply {
    ($value:expr, $n:ident => $body:expr) => {
        match $value {
            Value::Integer(v) => {
                let $n = *v;
                Ok($body)
            }
            Value::UInteger(v) => {
                let $n = *v;
                Ok($body)
            }
            Value::Double(v) => {
                let $n = *v;
                Ok($body)
            }
            Value::Decimal(v) => {
                let $n = *v;
                Ok($body)
            }
            other => Err(QueryError::TypeError(format!(
                "{} value cannot be used as a number",
                other.type_code()
            ))),
        }
    };
}

impl Value {
    pub fn type_code(&self) -> DbTypeCode {
        match self {
            Value::Binary(_) => DbTypeCode::Binary,
            Value::Boolean(_) => DbTypeCode::Boolean,
            Value::DateTime(_) => DbTypeCode::DateTime,
            Value::Decimal(_) => DbTypeCode::Decimal,
            Value::Double(_) => DbTypeCode::Double,
            Value::Integer(_) => DbTypeCode::Integer,
            Value::UInteger(_) => DbTypeCode::UInteger,
            Value::String(_) => DbTypeCode::String,
            Value::Object(_) => DbTypeCode::Object,
        }
    }

    pub fn to_integer(&self) -> QueryResult<Option<i64>> {
        numeric_apply!(self, n => n.to_integer())
    }

    pub fn to_integer_ceiling(&self) -> QueryResult<Option<i64>> {
        numeric_apply!(self, n => n.to_integer_ceiling())
    }

    pub fn to_integer_floor(&self) -> QueryResult<Option<i64>> {
        numeric_apply!(self, n => n.to_integer_floor())
    }

    pub fn to_uinteger(&self) -> QueryResult<Option<u64>> {
        numeric_apply!(self, n => n.to_uinteger())
    }

    pub fn to_uinteger_ceiling(&self) -> QueryResult<Option<u64>> {
        numeric_apply!(self, n => n.to_uinteger_ceiling())
    }

    pub fn to_uinteger_floor(&self) -> QueryResult<Option<u64>> {
        numeric_apply!(self, n => n.to_uinteger_floor())
    }

    pub fn to_decimal(&self) -> QueryResult<Option<Decimal>> {
        numeric_apply!(self, n => n.to_decimal())
    }

    pub fn to_double(&self) -> QueryResult<Option<f64>> {
        numeric_apply!(self, n => n.to_double())
    }

    /// Exact conversion used when binding a value to a typed slot
    pub fn coerce_to(self, target: DbTypeCode) -> QueryResult<Value> {
        if self.type_code() == target {
            return Ok(self);
        }
        let inexact = |value: &Value| {
            QueryError::TypeError(format!("Cannot convert {} exactly to {}", value, target))
        };
        let converted = match target {
            DbTypeCode::Integer => match (self.to_integer_floor()?, self.to_integer_ceiling()?) {
                (Some(floor), Some(ceiling)) if floor == ceiling => Some(Value::Integer(floor)),
                _ => None,
            },
            DbTypeCode::UInteger => match (self.to_uinteger_floor()?, self.to_uinteger_ceiling()?) {
                (Some(floor), Some(ceiling)) if floor == ceiling => Some(Value::UInteger(floor)),
                _ => None,
            },
            DbTypeCode::Decimal => self.to_decimal()?.map(Value::Decimal),
            DbTypeCode::Double => self.to_double()?.map(Value::Double),
            _ => {
                return Err(QueryError::TypeError(format!(
                    "Cannot bind {} value to {}",
                    self.type_code(),
                    target
                )));
            }
        };
        converted.ok_or_else(|| inexact(&self))
    }
}

/// Three-way comparison of two non-null values.
///
/// Numeric values of different types compare by value; other types only compare with themselves.
pub fn compare_values(left: &Value, right: &Value) -> QueryResult<Ordering> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Ok(a.cmp(b)),
        (Value::UInteger(a), Value::UInteger(b)) => Ok(a.cmp(b)),
        (Value::Decimal(a), Value::Decimal(b)) => Ok(a.cmp(b)),
        (Value::Double(a), Value::Double(b)) => Ok(a.total_cmp(b)),
        (Value::Integer(a), Value::UInteger(b)) => Ok((*a as i128).cmp(&(*b as i128))),
        (Value::UInteger(a), Value::Integer(b)) => Ok((*a as i128).cmp(&(*b as i128))),
        (Value::Double(_), _) | (_, Value::Double(_)) if left.type_code().is_numeric() && right.type_code().is_numeric() => {
            match (left.to_double()?, right.to_double()?) {
                (Some(a), Some(b)) => Ok(a.total_cmp(&b)),
                _ => Err(QueryError::Internal("Numeric value without double form".into())),
            }
        }
        (Value::Decimal(_), _) | (_, Value::Decimal(_)) if left.type_code().is_numeric() && right.type_code().is_numeric() => {
            match (left.to_decimal()?, right.to_decimal()?) {
                (Some(a), Some(b)) => Ok(a.cmp(&b)),
                _ => Err(QueryError::Internal("Numeric value without decimal form".into())),
            }
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (Value::Binary(a), Value::Binary(b)) => Ok(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Ok(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Ok(a.cmp(b)),
        (Value::Object(a), Value::Object(b)) => Ok(a.identity().cmp(&b.identity())),
        (a, b) => Err(QueryError::TypeError(format!(
            "Cannot compare {} with {}",
            a.type_code(),
            b.type_code()
        ))),
    }
}

/// Compare nullable values with nulls first
pub fn compare_nullable(left: Option<&Value>, right: Option<&Value>) -> QueryResult<Ordering> {
    match (left, right) {
        (None, None) => Ok(Ordering::Equal),
        (None, Some(_)) => Ok(Ordering::Less),
        (Some(_), None) => Ok(Ordering::Greater),
        (Some(a), Some(b)) => compare_values(a, b),
    }
}

/// Extraction of a concrete Rust type from a value
pub trait FromValue: Sized {
    fn from_value(value: Value) -> QueryResult<Self>;
}

macro_rules! impl_from_value {
    ($target:ty, $variant:ident) => {
        impl FromValue for $target {
            fn from_value(value: Value) -> QueryResult<Self> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(QueryError::TypeError(format!(
                        "Expected {}, got {}",
                        DbTypeCode::$variant,
                        other.type_code()
                    ))),
                }
            }
        }
    };
}

impl_from_value!(Vec<u8>, Binary);
impl_from_value!(bool, Boolean);
impl_from_value!(NaiveDateTime, DateTime);
impl_from_value!(String, String);
impl_from_value!(ObjectRef, Object);

macro_rules! impl_into_value {
    ($source:ty, $variant:ident, $cast:ty) => {
        impl From<$source> for Value {
            fn from(v: $source) -> Self {
                Value::$variant(v as $cast)
            }
        }
    };
}

impl_into_value!(i64, Integer, i64);
impl_into_value!(i32, Integer, i64);
impl_into_value!(i16, Integer, i64);
impl_into_value!(i8, Integer, i64);
impl_into_value!(u64, UInteger, u64);
impl_into_value!(u32, UInteger, u64);
impl_into_value!(u16, UInteger, u64);
impl_into_value!(u8, UInteger, u64);
impl_into_value!(f64, Double, f64);
impl_into_value!(f32, Double, f64);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Binary(v.to_vec())
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Value::Object(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Binary(b) => write!(f, "BINARY '{}'", hex::encode(b)),
            Value::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::DateTime(d) => write!(f, "TIMESTAMP '{}'", d.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Double(d) => write!(f, "{:e}", d),
            Value::Integer(i) => write!(f, "{}", i),
            Value::UInteger(u) => write!(f, "{}", u),
            Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Object(o) => write!(f, "OBJECT {}", o.identity()),
        }
    }
}
