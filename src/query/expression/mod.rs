// Value Expression Module
//
// Typed value expressions: literals, variables, paths and operations. Every
// node carries a datatype code; typed evaluators coerce numeric results using
// the rules in `numeric`.

pub mod numeric;
pub mod operation;
pub mod path;
pub mod transform;
pub mod value;
pub mod variable;

use std::fmt;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use crate::common::types::{DbTypeCode, ExtentNumber, ExtentSet, QueryFlags};
use crate::query::executor::result::{QueryResult, Row};
use crate::storage::ObjectRef;

pub use self::operation::{Operation, Operator};
pub use self::path::{Member, ObjectMethod, Path};
pub use self::transform::{Instantiate, Rebind, TreeTransform};
pub use self::value::{FromValue, Value, compare_nullable, compare_values};
pub use self::variable::{ParameterValue, Variable, VariableArray, encode_parameters};

/// A closed value of a fixed datatype, possibly null
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    value: Option<Value>,
    type_code: DbTypeCode,
}

impl Literal {
    pub fn new(value: Value) -> Self {
        let type_code = value.type_code();
        Literal {
            value: Some(value),
            type_code,
        }
    }

    pub fn null(type_code: DbTypeCode) -> Self {
        Literal { value: None, type_code }
    }

    pub fn typed(value: Option<Value>, type_code: DbTypeCode) -> Self {
        Literal { value, type_code }
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<Value> {
        self.value
    }

    pub fn type_code(&self) -> DbTypeCode {
        self.type_code
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}", value),
            None => write!(f, "NULL"),
        }
    }
}

/// A typed value expression node
#[derive(Debug, Clone)]
pub enum ValueExpression {
    Literal(Literal),
    Variable(Variable),
    Path(Box<Path>),
    Operation(Box<Operation>),
}

impl ValueExpression {
    pub fn literal<V: Into<Value>>(value: V) -> Self {
        ValueExpression::Literal(Literal::new(value.into()))
    }

    pub fn null(type_code: DbTypeCode) -> Self {
        ValueExpression::Literal(Literal::null(type_code))
    }

    pub fn variable(number: usize, type_code: DbTypeCode, variables: &VariableArray) -> QueryResult<Self> {
        Ok(ValueExpression::Variable(Variable::new(number, type_code, variables)?))
    }

    pub fn path(path: Path) -> Self {
        ValueExpression::Path(Box::new(path))
    }

    pub fn operation(operation: Operation) -> Self {
        ValueExpression::Operation(Box::new(operation))
    }

    pub fn type_code(&self) -> DbTypeCode {
        match self {
            ValueExpression::Literal(literal) => literal.type_code(),
            ValueExpression::Variable(variable) => variable.type_code(),
            ValueExpression::Path(path) => path.type_code(),
            ValueExpression::Operation(operation) => operation.type_code(),
        }
    }

    pub fn evaluate(&self, row: &Row) -> QueryResult<Option<Value>> {
        match self {
            ValueExpression::Literal(literal) => Ok(literal.value().cloned()),
            ValueExpression::Variable(variable) => variable.evaluate(),
            ValueExpression::Path(path) => path.evaluate(row),
            ValueExpression::Operation(operation) => operation.evaluate(row),
        }
    }

    pub fn evaluates_to_null(&self, row: &Row) -> QueryResult<bool> {
        Ok(self.evaluate(row)?.is_none())
    }

    pub fn evaluate_to_integer(&self, row: &Row) -> QueryResult<Option<i64>> {
        self.evaluate_numeric(row, Value::to_integer)
    }

    pub fn evaluate_to_integer_ceiling(&self, row: &Row) -> QueryResult<Option<i64>> {
        self.evaluate_numeric(row, Value::to_integer_ceiling)
    }

    pub fn evaluate_to_integer_floor(&self, row: &Row) -> QueryResult<Option<i64>> {
        self.evaluate_numeric(row, Value::to_integer_floor)
    }

    pub fn evaluate_to_uinteger(&self, row: &Row) -> QueryResult<Option<u64>> {
        self.evaluate_numeric(row, Value::to_uinteger)
    }

    pub fn evaluate_to_uinteger_ceiling(&self, row: &Row) -> QueryResult<Option<u64>> {
        self.evaluate_numeric(row, Value::to_uinteger_ceiling)
    }

    pub fn evaluate_to_uinteger_floor(&self, row: &Row) -> QueryResult<Option<u64>> {
        self.evaluate_numeric(row, Value::to_uinteger_floor)
    }

    pub fn evaluate_to_decimal(&self, row: &Row) -> QueryResult<Option<Decimal>> {
        self.evaluate_numeric(row, Value::to_decimal)
    }

    pub fn evaluate_to_double(&self, row: &Row) -> QueryResult<Option<f64>> {
        self.evaluate_numeric(row, Value::to_double)
    }

    pub fn evaluate_to_string(&self, row: &Row) -> QueryResult<Option<String>> {
        self.evaluate_as(row)
    }

    pub fn evaluate_to_binary(&self, row: &Row) -> QueryResult<Option<Vec<u8>>> {
        self.evaluate_as(row)
    }

    pub fn evaluate_to_boolean(&self, row: &Row) -> QueryResult<Option<bool>> {
        self.evaluate_as(row)
    }

    pub fn evaluate_to_datetime(&self, row: &Row) -> QueryResult<Option<NaiveDateTime>> {
        self.evaluate_as(row)
    }

    pub fn evaluate_to_object(&self, row: &Row) -> QueryResult<Option<ObjectRef>> {
        self.evaluate_as(row)
    }

    fn evaluate_numeric<T>(&self, row: &Row, convert: fn(&Value) -> QueryResult<Option<T>>) -> QueryResult<Option<T>> {
        match self.evaluate(row)? {
            Some(value) => convert(&value),
            None => Ok(None),
        }
    }

    fn evaluate_as<T: FromValue>(&self, row: &Row) -> QueryResult<Option<T>> {
        self.evaluate(row)?.map(T::from_value).transpose()
    }

    /// True if any node runs application code when evaluated
    pub fn involves_code_execution(&self) -> bool {
        match self {
            ValueExpression::Literal(_) | ValueExpression::Variable(_) => false,
            ValueExpression::Path(path) => path.involves_code_execution(),
            ValueExpression::Operation(operation) => {
                operation.left().involves_code_execution()
                    || operation.right().is_some_and(ValueExpression::involves_code_execution)
            }
        }
    }

    pub fn collect_extents(&self, extents: &mut ExtentSet) {
        match self {
            ValueExpression::Literal(_) | ValueExpression::Variable(_) => {}
            ValueExpression::Path(path) => path.collect_extents(extents),
            ValueExpression::Operation(operation) => {
                operation.left().collect_extents(extents);
                if let Some(right) = operation.right() {
                    right.collect_extents(extents);
                }
            }
        }
    }

    pub fn depends_on(&self, extent: ExtentNumber) -> bool {
        let mut extents = ExtentSet::new();
        self.collect_extents(&mut extents);
        extents.contains(&extent)
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            ValueExpression::Path(path) => Some(path),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            ValueExpression::Variable(variable) => Some(variable),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            ValueExpression::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    /// Adds INCLUDES_LITERAL when a literal appears anywhere in the tree
    pub fn populate_query_flags(&self, flags: &mut QueryFlags) {
        match self {
            ValueExpression::Literal(_) => flags.insert(QueryFlags::INCLUDES_LITERAL),
            ValueExpression::Variable(_) => {}
            ValueExpression::Path(path) => {
                for member in path.steps().iter().chain(std::iter::once(path.member())) {
                    if let Member::Method { arguments, .. } = member {
                        for argument in arguments {
                            argument.populate_query_flags(flags);
                        }
                    }
                }
            }
            ValueExpression::Operation(operation) => {
                operation.left().populate_query_flags(flags);
                if let Some(right) = operation.right() {
                    right.populate_query_flags(flags);
                }
            }
        }
    }

    /// Rebuild the tree, substituting leaves through `transform`
    pub fn transform(&self, transform: &dyn TreeTransform) -> QueryResult<ValueExpression> {
        match self {
            ValueExpression::Literal(literal) => Ok(ValueExpression::Literal(literal.clone())),
            ValueExpression::Variable(variable) => transform.variable(variable),
            ValueExpression::Path(path) => {
                let rebuilt = path.transform_members(transform)?;
                transform.path(path, rebuilt)
            }
            ValueExpression::Operation(operation) => {
                let left = operation.left().transform(transform)?;
                let right = operation.right().map(|right| right.transform(transform)).transpose()?;
                transform.operation(operation.with_operands(left, right))
            }
        }
    }

    /// Structurally identical copy bound to `variables`
    pub fn clone_with(&self, variables: &VariableArray) -> QueryResult<ValueExpression> {
        self.transform(&Rebind::new(variables))
    }

    /// Partially evaluated copy; paths over extents bound in `row` become literals
    pub fn instantiate(&self, row: &Row) -> QueryResult<ValueExpression> {
        self.transform(&Instantiate::new(row))
    }
}

impl fmt::Display for ValueExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueExpression::Literal(literal) => write!(f, "{}", literal),
            ValueExpression::Variable(variable) => write!(f, "?{}", variable.number()),
            ValueExpression::Path(path) => write!(f, "{}", path),
            ValueExpression::Operation(operation) => write!(f, "{}", operation),
        }
    }
}
