// Set Functions
//
// Running aggregates folded one row at a time. Null inputs are ignored except
// by COUNT(*).

use std::cmp::Ordering;
use std::fmt;

use rust_decimal::Decimal;

use crate::common::types::DbTypeCode;
use crate::query::executor::result::{QueryError, QueryResult, Row};
use crate::query::expression::operation::{Operator, apply_operator};
use crate::query::expression::{Literal, Value, ValueExpression, VariableArray, compare_values};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetFunctionKind {
    Avg,
    Count,
    Max,
    Min,
    Sum,
}

impl SetFunctionKind {
    fn name(self) -> &'static str {
        match self {
            SetFunctionKind::Avg => "AVG",
            SetFunctionKind::Count => "COUNT",
            SetFunctionKind::Max => "MAX",
            SetFunctionKind::Min => "MIN",
            SetFunctionKind::Sum => "SUM",
        }
    }
}

/// An aggregate with its running state
#[derive(Debug, Clone)]
pub struct SetFunction {
    kind: SetFunctionKind,
    /// `None` only for COUNT(*)
    expression: Option<ValueExpression>,
    type_code: DbTypeCode,
    running: Option<Value>,
    count: i64,
}

impl SetFunction {
    pub fn new(kind: SetFunctionKind, expression: ValueExpression) -> QueryResult<Self> {
        let input = expression.type_code();
        let type_code = match kind {
            SetFunctionKind::Count => DbTypeCode::Integer,
            SetFunctionKind::Max | SetFunctionKind::Min => input,
            SetFunctionKind::Sum if input.is_numeric() => input,
            SetFunctionKind::Avg if input == DbTypeCode::Double => DbTypeCode::Double,
            SetFunctionKind::Avg if input.is_numeric() => DbTypeCode::Decimal,
            _ => {
                return Err(QueryError::TypeError(format!("{} over {} values", kind.name(), input)));
            }
        };
        let mut function = SetFunction {
            kind,
            expression: Some(expression),
            type_code,
            running: None,
            count: 0,
        };
        function.reset_result();
        Ok(function)
    }

    /// COUNT(*)
    pub fn count_all() -> Self {
        SetFunction {
            kind: SetFunctionKind::Count,
            expression: None,
            type_code: DbTypeCode::Integer,
            running: None,
            count: 0,
        }
    }

    pub fn kind(&self) -> SetFunctionKind {
        self.kind
    }

    pub fn type_code(&self) -> DbTypeCode {
        self.type_code
    }

    pub fn expression(&self) -> Option<&ValueExpression> {
        self.expression.as_ref()
    }

    /// Return to the identity of the aggregate
    pub fn reset_result(&mut self) {
        self.count = 0;
        self.running = match self.kind {
            SetFunctionKind::Sum => Some(zero(self.type_code)),
            SetFunctionKind::Avg => Some(zero(self.type_code)),
            _ => None,
        };
    }

    /// Fold one row into the running state
    pub fn update_result(&mut self, row: &Row) -> QueryResult<()> {
        let value = match &self.expression {
            Some(expression) => match expression.evaluate(row)? {
                Some(value) => value,
                None => return Ok(()),
            },
            None => {
                self.count += 1;
                return Ok(());
            }
        };
        self.count += 1;
        match self.kind {
            SetFunctionKind::Count => {}
            SetFunctionKind::Sum | SetFunctionKind::Avg => {
                self.running = apply_operator(Operator::Addition, self.type_code, self.running.take(), Some(value))?;
            }
            SetFunctionKind::Max | SetFunctionKind::Min => {
                let wanted = if self.kind == SetFunctionKind::Max {
                    Ordering::Greater
                } else {
                    Ordering::Less
                };
                let replace = match &self.running {
                    Some(current) => compare_values(&value, current)? == wanted,
                    None => true,
                };
                if replace {
                    self.running = Some(value);
                }
            }
        }
        Ok(())
    }

    /// Snapshot of the current result
    pub fn get_result(&self) -> QueryResult<Literal> {
        let value = match self.kind {
            SetFunctionKind::Count => Some(Value::Integer(self.count)),
            SetFunctionKind::Avg if self.count == 0 => None,
            SetFunctionKind::Avg => apply_operator(
                Operator::Division,
                self.type_code,
                self.running.clone(),
                Some(Value::Integer(self.count)),
            )?,
            _ => self.running.clone(),
        };
        Ok(Literal::typed(value, self.type_code))
    }

    pub fn clone_with(&self, variables: &VariableArray) -> QueryResult<SetFunction> {
        let mut function = SetFunction {
            kind: self.kind,
            expression: self.expression.as_ref().map(|e| e.clone_with(variables)).transpose()?,
            type_code: self.type_code,
            running: None,
            count: 0,
        };
        function.reset_result();
        Ok(function)
    }
}

fn zero(type_code: DbTypeCode) -> Value {
    match type_code {
        DbTypeCode::UInteger => Value::UInteger(0),
        DbTypeCode::Decimal => Value::Decimal(Decimal::ZERO),
        DbTypeCode::Double => Value::Double(0.0),
        _ => Value::Integer(0),
    }
}

impl fmt::Display for SetFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expression {
            Some(expression) => write!(f, "{}({})", self.kind.name(), expression),
            None => write!(f, "{}(*)", self.kind.name()),
        }
    }
}
