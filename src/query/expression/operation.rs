use std::fmt;

use rust_decimal::Decimal;

use crate::common::types::DbTypeCode;
use crate::query::executor::result::{QueryError, QueryResult, Row};
use crate::query::expression::{Value, ValueExpression};

/// Arithmetic and string operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    /// Unary minus
    Minus,
    /// Unary plus
    Plus,
    Concatenation,
}

impl Operator {
    pub fn is_unary(self) -> bool {
        matches!(self, Operator::Minus | Operator::Plus)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Operator::Addition => "ADD",
            Operator::Subtraction => "SUB",
            Operator::Multiplication => "MUL",
            Operator::Division => "DIV",
            Operator::Minus => "NEG",
            Operator::Plus => "POS",
            Operator::Concatenation => "CAT",
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Operator::Addition | Operator::Plus => "+",
            Operator::Subtraction | Operator::Minus => "-",
            Operator::Multiplication => "*",
            Operator::Division => "/",
            Operator::Concatenation => "||",
        }
    }
}

/// An arithmetic or string operation over one or two operands
#[derive(Debug, Clone)]
pub struct Operation {
    operator: Operator,
    left: ValueExpression,
    right: Option<ValueExpression>,
    type_code: DbTypeCode,
}

impl Operation {
    pub fn binary(operator: Operator, left: ValueExpression, right: ValueExpression) -> QueryResult<Self> {
        if operator.is_unary() {
            return Err(QueryError::Internal(format!("{:?} is not a binary operator", operator)));
        }
        let type_code = binary_result_type(operator, left.type_code(), right.type_code())?;
        Ok(Operation {
            operator,
            left,
            right: Some(right),
            type_code,
        })
    }

    pub fn unary(operator: Operator, operand: ValueExpression) -> QueryResult<Self> {
        if !operator.is_unary() {
            return Err(QueryError::Internal(format!("{:?} is not a unary operator", operator)));
        }
        let type_code = match (operator, operand.type_code()) {
            (Operator::Minus, DbTypeCode::UInteger) => DbTypeCode::Integer,
            (_, code) if code.is_numeric() => code,
            (_, code) => {
                return Err(QueryError::TypeError(format!("Cannot apply {} to {}", operator.symbol(), code)));
            }
        };
        Ok(Operation {
            operator,
            left: operand,
            right: None,
            type_code,
        })
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn left(&self) -> &ValueExpression {
        &self.left
    }

    pub fn right(&self) -> Option<&ValueExpression> {
        self.right.as_ref()
    }

    pub fn type_code(&self) -> DbTypeCode {
        self.type_code
    }

    pub fn evaluate(&self, row: &Row) -> QueryResult<Option<Value>> {
        let left = self.left.evaluate(row)?;
        let right = match &self.right {
            Some(right) => right.evaluate(row)?,
            None => None,
        };
        apply_operator(self.operator, self.type_code, left, right)
    }

    pub(crate) fn with_operands(&self, left: ValueExpression, right: Option<ValueExpression>) -> Operation {
        Operation {
            operator: self.operator,
            left,
            right,
            type_code: self.type_code,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.right {
            Some(right) => write!(f, "({} {} {})", self.left, self.operator.symbol(), right),
            None => write!(f, "{}({})", self.operator.symbol(), self.left),
        }
    }
}

fn binary_result_type(operator: Operator, left: DbTypeCode, right: DbTypeCode) -> QueryResult<DbTypeCode> {
    if operator == Operator::Concatenation {
        return match (left, right) {
            (DbTypeCode::String, DbTypeCode::String) => Ok(DbTypeCode::String),
            _ => Err(QueryError::TypeError(format!("Cannot concatenate {} and {}", left, right))),
        };
    }
    if !left.is_numeric() || !right.is_numeric() {
        return Err(QueryError::TypeError(format!(
            "Cannot apply {} to {} and {}",
            operator.symbol(),
            left,
            right
        )));
    }
    Ok(match (left, right) {
        (DbTypeCode::Double, _) | (_, DbTypeCode::Double) => DbTypeCode::Double,
        _ if operator == Operator::Division => DbTypeCode::Decimal,
        (DbTypeCode::Integer, DbTypeCode::Integer) => DbTypeCode::Integer,
        (DbTypeCode::UInteger, DbTypeCode::UInteger) => DbTypeCode::UInteger,
        _ => DbTypeCode::Decimal,
    })
}

/// Apply an operator to already evaluated operands. Shared with the compiled filter VM.
pub(crate) fn apply_operator(
    operator: Operator,
    type_code: DbTypeCode,
    left: Option<Value>,
    right: Option<Value>,
) -> QueryResult<Option<Value>> {
    let Some(left) = left else {
        return Ok(None);
    };
    if operator.is_unary() {
        return apply_unary(operator, type_code, left);
    }
    let Some(right) = right else {
        return Ok(None);
    };
    match type_code {
        DbTypeCode::String => match (left, right) {
            (Value::String(mut a), Value::String(b)) => {
                a.push_str(&b);
                Ok(Some(Value::String(a)))
            }
            _ => Err(QueryError::Internal("Concatenation of non-string operands".into())),
        },
        DbTypeCode::Integer => match (left.to_integer()?, right.to_integer()?) {
            (Some(a), Some(b)) => integer_arithmetic(operator, a, b).map(|v| Some(Value::Integer(v))),
            _ => Ok(None),
        },
        DbTypeCode::UInteger => match (left.to_uinteger()?, right.to_uinteger()?) {
            (Some(a), Some(b)) => unsigned_arithmetic(operator, a, b).map(|v| Some(Value::UInteger(v))),
            _ => Ok(None),
        },
        DbTypeCode::Decimal => match (left.to_decimal()?, right.to_decimal()?) {
            (Some(a), Some(b)) => decimal_arithmetic(operator, a, b).map(|v| Some(Value::Decimal(v))),
            _ => Ok(None),
        },
        DbTypeCode::Double => match (left.to_double()?, right.to_double()?) {
            (Some(a), Some(b)) => Ok(Some(Value::Double(double_arithmetic(operator, a, b)))),
            _ => Ok(None),
        },
        other => Err(QueryError::Internal(format!("No arithmetic for {}", other))),
    }
}

fn apply_unary(operator: Operator, type_code: DbTypeCode, operand: Value) -> QueryResult<Option<Value>> {
    if operator == Operator::Plus {
        return Ok(Some(operand));
    }
    let negated = match operand {
        Value::Integer(v) => Value::Integer(v.checked_neg().ok_or(QueryError::NumericOverflow)?),
        Value::UInteger(v) => {
            let widened = -(v as i128);
            Value::Integer(i64::try_from(widened).map_err(|_| QueryError::NumericOverflow)?)
        }
        Value::Decimal(v) => Value::Decimal(-v),
        Value::Double(v) => Value::Double(-v),
        other => {
            return Err(QueryError::Internal(format!("Cannot negate {}", other.type_code())));
        }
    };
    if negated.type_code() != type_code {
        return Err(QueryError::Internal(format!(
            "Negation produced {} for a {} operation",
            negated.type_code(),
            type_code
        )));
    }
    Ok(Some(negated))
}

fn integer_arithmetic(operator: Operator, a: i64, b: i64) -> QueryResult<i64> {
    let result = match operator {
        Operator::Addition => a.checked_add(b),
        Operator::Subtraction => a.checked_sub(b),
        Operator::Multiplication => a.checked_mul(b),
        _ => return Err(QueryError::Internal(format!("{:?} on integers", operator))),
    };
    result.ok_or(QueryError::NumericOverflow)
}

fn unsigned_arithmetic(operator: Operator, a: u64, b: u64) -> QueryResult<u64> {
    let result = match operator {
        Operator::Addition => a.checked_add(b),
        Operator::Subtraction => a.checked_sub(b),
        Operator::Multiplication => a.checked_mul(b),
        _ => return Err(QueryError::Internal(format!("{:?} on unsigned integers", operator))),
    };
    result.ok_or(QueryError::NumericOverflow)
}

fn decimal_arithmetic(operator: Operator, a: Decimal, b: Decimal) -> QueryResult<Decimal> {
    let result = match operator {
        Operator::Addition => a.checked_add(b),
        Operator::Subtraction => a.checked_sub(b),
        Operator::Multiplication => a.checked_mul(b),
        Operator::Division => {
            if b.is_zero() {
                return Err(QueryError::DivisionByZero);
            }
            a.checked_div(b)
        }
        _ => return Err(QueryError::Internal(format!("{:?} on decimals", operator))),
    };
    result.ok_or(QueryError::NumericOverflow)
}

fn double_arithmetic(operator: Operator, a: f64, b: f64) -> f64 {
    match operator {
        Operator::Addition => a + b,
        Operator::Subtraction => a - b,
        Operator::Multiplication => a * b,
        _ => a / b,
    }
}
