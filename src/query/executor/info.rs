// GetInfo Protocol
//
// Tagged binary queries for enumerator metadata. Responses are little endian
// and written into a caller buffer; a short buffer reports the required size
// and leaves the buffer untouched.

use byteorder::{ByteOrder, LittleEndian};

use crate::query::executor::enumerator::ExecutionEnumerator;
use crate::query::executor::result::{QueryError, QueryResult, Row};
use crate::query::expression::ValueExpression;

/// Fetch clause member selected by the `param` of fetch info requests
pub const FETCH_NUMBER: u32 = 0;
pub const FETCH_OFFSET: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum InfoType {
    /// Variable number of the fetch number or offset, u32
    FetchVariable = 1,
    /// Variable number of the offset key, u32
    RecreationKeyVariable = 2,
    /// Literal fetch number or offset, i64
    FetchLiteral = 3,
    /// Node count u8 followed by `(node_id, node_type)` byte pairs
    RecreationKeyLayout = 4,
}

impl InfoType {
    pub fn from_u32(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(InfoType::FetchVariable),
            2 => Some(InfoType::RecreationKeyVariable),
            3 => Some(InfoType::FetchLiteral),
            4 => Some(InfoType::RecreationKeyLayout),
            _ => None,
        }
    }
}

fn fetch_member<'a, E: ExecutionEnumerator + ?Sized>(
    enumerator: &'a E,
    param: u32,
) -> QueryResult<Option<&'a ValueExpression>> {
    let fetch = &enumerator.base().fetch;
    match param {
        FETCH_NUMBER => Ok(fetch.number.as_ref()),
        FETCH_OFFSET => Ok(fetch.offset.as_ref()),
        other => Err(QueryError::InvalidOperation(format!("Unknown fetch member {}", other))),
    }
}

fn variable_number(expression: Option<&ValueExpression>, what: &str) -> QueryResult<u32> {
    let variable = expression
        .and_then(ValueExpression::as_variable)
        .ok_or_else(|| QueryError::InvalidOperation(format!("{} is not a variable", what)))?;
    u32::try_from(variable.number()).map_err(|_| QueryError::Internal(format!("Variable number {}", variable.number())))
}

fn write_response(response: &[u8], buffer: &mut [u8]) -> QueryResult<usize> {
    if buffer.len() < response.len() {
        return Err(QueryError::BufferTooSmall {
            required: response.len(),
        });
    }
    buffer[..response.len()].copy_from_slice(response);
    Ok(response.len())
}

/// Answer one GetInfo request
pub fn write_info<E: ExecutionEnumerator + ?Sized>(
    enumerator: &E,
    info_type: InfoType,
    param: u32,
    buffer: &mut [u8],
) -> QueryResult<usize> {
    let mut response = Vec::new();
    match info_type {
        InfoType::FetchVariable => {
            let number = variable_number(fetch_member(enumerator, param)?, "Fetch member")?;
            response.resize(4, 0);
            LittleEndian::write_u32(&mut response, number);
        }
        InfoType::RecreationKeyVariable => {
            let number = variable_number(enumerator.base().fetch.offset_key.as_ref(), "Offset key")?;
            response.resize(4, 0);
            LittleEndian::write_u32(&mut response, number);
        }
        InfoType::FetchLiteral => {
            let value = match fetch_member(enumerator, param)? {
                Some(expression @ ValueExpression::Literal(_)) => expression.evaluate_to_integer(&Row::empty())?,
                _ => None,
            };
            let value = value.ok_or_else(|| QueryError::InvalidOperation("Fetch member is not a literal".into()))?;
            response.resize(8, 0);
            LittleEndian::write_i64(&mut response, value);
        }
        InfoType::RecreationKeyLayout => {
            let mut layout = Vec::new();
            enumerator.collect_layout(&mut layout);
            let count = u8::try_from(layout.len())
                .map_err(|_| QueryError::Internal(format!("{} enumerator nodes", layout.len())))?;
            response.push(count);
            for (node_id, node_type) in layout {
                response.push(node_id);
                response.push(node_type as u8);
            }
        }
    }
    write_response(&response, buffer)
}
