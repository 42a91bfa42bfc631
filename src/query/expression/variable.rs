// Variable Binding
//
// The parameter-substitution context of a compiled query. All variables of one
// enumerator tree share a `VariableArray`; clones of the tree get a new array.

use std::sync::Arc;

use chrono::DateTime;
use log::debug;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::types::{DbTypeCode, QueryFlags};
use crate::query::executor::result::{QueryError, QueryResult};
use crate::query::expression::Value;

#[derive(Debug, Clone, PartialEq)]
enum VariableState {
    Unset,
    Null,
    Bound(Value),
}

#[derive(Debug, Clone)]
struct VariableSlot {
    type_code: Option<DbTypeCode>,
    state: VariableState,
}

#[derive(Debug)]
struct ArrayInner {
    slots: Vec<VariableSlot>,
    query_flags: QueryFlags,
    transaction_id: u64,
    failed_to_recreate_object: bool,
}

/// Shared array of query variables
#[derive(Debug, Clone)]
pub struct VariableArray {
    inner: Arc<RwLock<ArrayInner>>,
}

impl VariableArray {
    pub fn new(len: usize) -> Self {
        VariableArray {
            inner: Arc::new(RwLock::new(ArrayInner {
                slots: vec![
                    VariableSlot {
                        type_code: None,
                        state: VariableState::Unset,
                    };
                    len
                ],
                query_flags: QueryFlags::empty(),
                transaction_id: 0,
                failed_to_recreate_object: false,
            })),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when both handles refer to the same array
    pub fn ptr_eq(&self, other: &VariableArray) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Declare the datatype of a slot; called when a variable node is built
    pub(crate) fn register(&self, index: usize, type_code: DbTypeCode) -> QueryResult<()> {
        let mut inner = self.inner.write();
        let slot = inner.slots.get_mut(index).ok_or_else(|| {
            QueryError::Internal(format!("Variable number {} outside variable array", index))
        })?;
        match slot.type_code {
            Some(existing) if existing != type_code => Err(QueryError::Internal(format!(
                "Variable {} declared as both {} and {}",
                index, existing, type_code
            ))),
            _ => {
                slot.type_code = Some(type_code);
                Ok(())
            }
        }
    }

    pub fn type_code(&self, index: usize) -> Option<DbTypeCode> {
        self.inner.read().slots.get(index).and_then(|slot| slot.type_code)
    }

    /// Bind a value, converting it to the datatype of the slot
    pub fn set<V: Into<Value>>(&self, index: usize, value: V) -> QueryResult<()> {
        self.set_value(index, value.into())
    }

    pub fn set_value(&self, index: usize, value: Value) -> QueryResult<()> {
        let mut inner = self.inner.write();
        let slot = inner.slots.get_mut(index).ok_or_else(|| {
            QueryError::InvalidOperation(format!("Variable number {} does not exist", index))
        })?;
        let value = match slot.type_code {
            Some(type_code) => value.coerce_to(type_code)?,
            None => value,
        };
        slot.state = VariableState::Bound(value);
        Ok(())
    }

    /// Bind SQL NULL, which is distinct from leaving the variable unset
    pub fn set_null(&self, index: usize) -> QueryResult<()> {
        let mut inner = self.inner.write();
        let slot = inner.slots.get_mut(index).ok_or_else(|| {
            QueryError::InvalidOperation(format!("Variable number {} does not exist", index))
        })?;
        slot.state = VariableState::Null;
        Ok(())
    }

    /// Bind every variable at once; on error no variable changes
    pub fn set_all(&self, values: Vec<Option<Value>>) -> QueryResult<()> {
        let mut inner = self.inner.write();
        if values.len() != inner.slots.len() {
            return Err(QueryError::InvalidOperation(format!(
                "Expected {} variable values, got {}",
                inner.slots.len(),
                values.len()
            )));
        }
        let states = inner
            .slots
            .iter()
            .zip(values)
            .map(|(slot, value)| match (value, slot.type_code) {
                (None, _) => Ok(VariableState::Null),
                (Some(value), Some(type_code)) => Ok(VariableState::Bound(value.coerce_to(type_code)?)),
                (Some(value), None) => Ok(VariableState::Bound(value)),
            })
            .collect::<QueryResult<Vec<_>>>()?;
        for (slot, state) in inner.slots.iter_mut().zip(states) {
            slot.state = state;
        }
        Ok(())
    }

    /// Current value; reading an unset variable is an error
    pub fn get(&self, index: usize) -> QueryResult<Option<Value>> {
        let inner = self.inner.read();
        let slot = inner.slots.get(index).ok_or_else(|| {
            QueryError::Internal(format!("Variable number {} outside variable array", index))
        })?;
        match &slot.state {
            VariableState::Unset => Err(QueryError::UnsetVariable(index)),
            VariableState::Null => Ok(None),
            VariableState::Bound(value) => Ok(Some(value.clone())),
        }
    }

    pub fn is_set(&self, index: usize) -> bool {
        self.inner
            .read()
            .slots
            .get(index)
            .is_some_and(|slot| slot.state != VariableState::Unset)
    }

    /// Forget every bound value
    pub fn clear(&self) {
        for slot in self.inner.write().slots.iter_mut() {
            slot.state = VariableState::Unset;
        }
    }

    /// Copy one bound value into the same slot of another array
    pub fn prolong_value(&self, index: usize, destination: &VariableArray) -> QueryResult<()> {
        if self.ptr_eq(destination) {
            return Ok(());
        }
        let state = {
            let inner = self.inner.read();
            inner
                .slots
                .get(index)
                .map(|slot| slot.state.clone())
                .ok_or_else(|| QueryError::Internal(format!("Variable number {} outside variable array", index)))?
        };
        let mut dest = destination.inner.write();
        let slot = dest.slots.get_mut(index).ok_or_else(|| {
            QueryError::Internal(format!("Variable number {} outside destination array", index))
        })?;
        slot.state = state;
        Ok(())
    }

    /// Copy every bound value into another array of the same length
    pub fn prolong_values(&self, destination: &VariableArray) -> QueryResult<()> {
        if self.len() != destination.len() {
            return Err(QueryError::Internal(format!(
                "Cannot prolong {} variables into an array of {}",
                self.len(),
                destination.len()
            )));
        }
        for index in 0..self.len() {
            self.prolong_value(index, destination)?;
        }
        Ok(())
    }

    /// A new array with the same shape and flags but nothing bound
    pub fn clone_empty(&self) -> VariableArray {
        let inner = self.inner.read();
        VariableArray {
            inner: Arc::new(RwLock::new(ArrayInner {
                slots: inner
                    .slots
                    .iter()
                    .map(|slot| VariableSlot {
                        type_code: slot.type_code,
                        state: VariableState::Unset,
                    })
                    .collect(),
                query_flags: inner.query_flags,
                transaction_id: 0,
                failed_to_recreate_object: false,
            })),
        }
    }

    pub fn query_flags(&self) -> QueryFlags {
        self.inner.read().query_flags
    }

    pub fn set_query_flags(&self, flags: QueryFlags) {
        self.inner.write().query_flags = flags;
    }

    pub fn transaction_id(&self) -> u64 {
        self.inner.read().transaction_id
    }

    pub fn set_transaction_id(&self, transaction_id: u64) {
        self.inner.write().transaction_id = transaction_id;
    }

    /// Set when the object an offset key pointed at no longer exists
    pub fn failed_to_recreate_object(&self) -> bool {
        self.inner.read().failed_to_recreate_object
    }

    pub fn set_failed_to_recreate_object(&self, failed: bool) {
        self.inner.write().failed_to_recreate_object = failed;
    }

    /// Bind every variable from a parameter buffer produced by `encode_parameters`
    pub fn init_from_buffer(&self, buffer: &[u8]) -> QueryResult<()> {
        let parameters: Vec<ParameterValue> = bincode::deserialize(buffer)?;
        debug!("Binding {} variables from a {} byte buffer", parameters.len(), buffer.len());
        let values = parameters
            .into_iter()
            .map(ParameterValue::into_value)
            .collect::<QueryResult<Vec<_>>>()?;
        self.set_all(values)
    }
}

/// Wire form of one parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Null,
    Binary(Vec<u8>),
    Boolean(bool),
    /// Microseconds since the Unix epoch
    DateTime(i64),
    Decimal { mantissa: i128, scale: u32 },
    Double(f64),
    Integer(i64),
    UInteger(u64),
    String(String),
}

impl ParameterValue {
    pub fn from_value(value: Option<&Value>) -> QueryResult<Self> {
        Ok(match value {
            None => ParameterValue::Null,
            Some(Value::Binary(b)) => ParameterValue::Binary(b.clone()),
            Some(Value::Boolean(b)) => ParameterValue::Boolean(*b),
            Some(Value::DateTime(d)) => ParameterValue::DateTime(d.and_utc().timestamp_micros()),
            Some(Value::Decimal(d)) => ParameterValue::Decimal {
                mantissa: d.mantissa(),
                scale: d.scale(),
            },
            Some(Value::Double(d)) => ParameterValue::Double(*d),
            Some(Value::Integer(i)) => ParameterValue::Integer(*i),
            Some(Value::UInteger(u)) => ParameterValue::UInteger(*u),
            Some(Value::String(s)) => ParameterValue::String(s.clone()),
            Some(Value::Object(_)) => {
                return Err(QueryError::InvalidOperation(
                    "Object references cannot be sent in a parameter buffer".into(),
                ));
            }
        })
    }

    pub fn into_value(self) -> QueryResult<Option<Value>> {
        Ok(match self {
            ParameterValue::Null => None,
            ParameterValue::Binary(b) => Some(Value::Binary(b)),
            ParameterValue::Boolean(b) => Some(Value::Boolean(b)),
            ParameterValue::DateTime(micros) => {
                let timestamp = DateTime::from_timestamp_micros(micros).ok_or_else(|| {
                    QueryError::InvalidOperation(format!("Timestamp {} out of range", micros))
                })?;
                Some(Value::DateTime(timestamp.naive_utc()))
            }
            ParameterValue::Decimal { mantissa, scale } => Some(Value::Decimal(
                Decimal::try_from_i128_with_scale(mantissa, scale)
                    .map_err(|e| QueryError::InvalidOperation(format!("Invalid decimal parameter: {}", e)))?,
            )),
            ParameterValue::Double(d) => Some(Value::Double(d)),
            ParameterValue::Integer(i) => Some(Value::Integer(i)),
            ParameterValue::UInteger(u) => Some(Value::UInteger(u)),
            ParameterValue::String(s) => Some(Value::String(s)),
        })
    }
}

/// Serialize parameter values into a buffer accepted by `VariableArray::init_from_buffer`
pub fn encode_parameters(values: &[Option<Value>]) -> QueryResult<Vec<u8>> {
    let parameters = values
        .iter()
        .map(|value| ParameterValue::from_value(value.as_ref()))
        .collect::<QueryResult<Vec<_>>>()?;
    Ok(bincode::serialize(&parameters)?)
}

/// A reference to one slot of a variable array
#[derive(Debug, Clone)]
pub struct Variable {
    number: usize,
    type_code: DbTypeCode,
    array: VariableArray,
}

impl Variable {
    pub fn new(number: usize, type_code: DbTypeCode, array: &VariableArray) -> QueryResult<Self> {
        array.register(number, type_code)?;
        Ok(Variable {
            number,
            type_code,
            array: array.clone(),
        })
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn type_code(&self) -> DbTypeCode {
        self.type_code
    }

    pub fn array(&self) -> &VariableArray {
        &self.array
    }

    pub fn evaluate(&self) -> QueryResult<Option<Value>> {
        self.array.get(self.number)
    }

    pub fn set_value<V: Into<Value>>(&self, value: V) -> QueryResult<()> {
        self.array.set(self.number, value)
    }

    pub fn set_null(&self) -> QueryResult<()> {
        self.array.set_null(self.number)
    }

    /// Copy the bound value into the equivalent slot of another array
    pub fn prolong_value(&self, destination: &VariableArray) -> QueryResult<()> {
        self.array.prolong_value(self.number, destination)
    }

    /// The same variable bound to a different array
    pub fn rebind(&self, array: &VariableArray) -> QueryResult<Variable> {
        Variable::new(self.number, self.type_code, array)
    }
}
