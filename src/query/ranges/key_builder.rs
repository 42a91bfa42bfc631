// Filter Key Builder
//
// Order-preserving binary keys: for two values of the same datatype, the byte
// order of their keys equals the value order. Nulls sort before every value.

use byteorder::{BigEndian, ByteOrder};
use rust_decimal::Decimal;

use crate::common::types::ObjectId;
use crate::query::executor::result::QueryResult;
use crate::query::expression::Value;

const NULL_MARKER: u8 = 0x00;
const VALUE_MARKER: u8 = 0x01;
const SIGN_BIT: u64 = 0x8000_0000_0000_0000;

/// Accumulates encoded values into a key
#[derive(Debug, Clone, Default)]
pub struct FilterKeyBuilder {
    buffer: Vec<u8>,
}

impl FilterKeyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_null(&mut self) -> &mut Self {
        self.buffer.push(NULL_MARKER);
        self
    }

    pub fn append_value(&mut self, value: Option<&Value>) -> QueryResult<&mut Self> {
        let Some(value) = value else {
            return Ok(self.append_null());
        };
        self.buffer.push(VALUE_MARKER);
        match value {
            Value::Integer(v) => self.put_u64((*v as u64) ^ SIGN_BIT),
            Value::UInteger(v) => self.put_u64(*v),
            Value::Double(v) => self.put_u64(double_order_bits(*v)),
            Value::Decimal(v) => self.put_decimal(*v),
            Value::Boolean(v) => self.buffer.push(u8::from(*v)),
            Value::DateTime(v) => self.put_u64((v.and_utc().timestamp_micros() as u64) ^ SIGN_BIT),
            Value::String(v) => self.put_escaped(v.as_bytes()),
            Value::Binary(v) => self.put_escaped(v),
            Value::Object(v) => self.put_u64(v.identity()),
        }
        Ok(self)
    }

    /// Identity suffix that makes an index entry key unique
    pub fn append_identity(&mut self, identity: ObjectId) -> &mut Self {
        self.put_u64(identity);
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }

    fn put_u64(&mut self, value: u64) {
        let mut bytes = [0u8; 8];
        BigEndian::write_u64(&mut bytes, value);
        self.buffer.extend_from_slice(&bytes);
    }

    fn put_escaped(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.buffer.push(b);
            if b == 0x00 {
                self.buffer.push(0xFF);
            }
        }
        self.buffer.extend_from_slice(&[0x00, 0x00]);
    }

    /// Sign class, then a decimal exponent and the significant digits.
    /// Negative values have exponent and digits complemented.
    fn put_decimal(&mut self, value: Decimal) {
        let value = value.normalize();
        if value.is_zero() {
            self.buffer.push(1);
            return;
        }
        let negative = value.is_sign_negative();
        let digits = value.mantissa().unsigned_abs().to_string();
        let exponent = digits.len() as i32 - value.scale() as i32;
        let exponent_byte = (exponent + 128) as u8;
        if negative {
            self.buffer.push(0);
            self.buffer.push(!exponent_byte);
            self.buffer.extend(digits.bytes().map(|d| !d));
            self.buffer.push(0xFF);
        } else {
            self.buffer.push(2);
            self.buffer.push(exponent_byte);
            self.buffer.extend(digits.bytes());
            self.buffer.push(0x00);
        }
    }
}

fn double_order_bits(value: f64) -> u64 {
    // -0.0 and 0.0 compare equal
    let value = if value == 0.0 { 0.0 } else { value };
    let bits = value.to_bits();
    if bits & SIGN_BIT != 0 { !bits } else { bits ^ SIGN_BIT }
}

/// Key of a single value
pub fn filter_key(value: Option<&Value>) -> QueryResult<Vec<u8>> {
    let mut builder = FilterKeyBuilder::new();
    builder.append_value(value)?;
    Ok(builder.finish())
}

/// Full index entry key: the value key followed by the object identity
pub fn index_entry_key(value: Option<&Value>, identity: ObjectId) -> QueryResult<Vec<u8>> {
    let mut builder = FilterKeyBuilder::new();
    builder.append_value(value)?.append_identity(identity);
    Ok(builder.finish())
}
