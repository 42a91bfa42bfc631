// Condition Module
//
// Logical expressions over the three-valued truth domain. Conditions filter
// candidate rows in the scan enumerators and in the join loop.

pub mod comparison;
pub mod like;

use std::fmt;

use crate::common::types::{ExtentNumber, ExtentSet, QueryFlags};
use crate::query::executor::result::{QueryError, QueryResult, Row};
use crate::query::expression::transform::{Instantiate, Rebind, TreeTransform};
use crate::query::expression::{Path, VariableArray};
use crate::query::ranges::RangePoint;

pub use self::comparison::{Comparison, ComparisonOperator};
pub use self::like::LikePattern;

/// SQL truth value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TruthValue {
    True,
    False,
    Unknown,
}

impl TruthValue {
    pub fn from_bool(value: bool) -> Self {
        if value { TruthValue::True } else { TruthValue::False }
    }

    pub fn is_true(self) -> bool {
        self == TruthValue::True
    }

    pub fn and(self, other: TruthValue) -> TruthValue {
        match (self, other) {
            (TruthValue::False, _) | (_, TruthValue::False) => TruthValue::False,
            (TruthValue::True, TruthValue::True) => TruthValue::True,
            _ => TruthValue::Unknown,
        }
    }

    pub fn or(self, other: TruthValue) -> TruthValue {
        match (self, other) {
            (TruthValue::True, _) | (_, TruthValue::True) => TruthValue::True,
            (TruthValue::False, TruthValue::False) => TruthValue::False,
            _ => TruthValue::Unknown,
        }
    }

    pub fn not(self) -> TruthValue {
        match self {
            TruthValue::True => TruthValue::False,
            TruthValue::False => TruthValue::True,
            TruthValue::Unknown => TruthValue::Unknown,
        }
    }

    /// `a IS b` over truth values never yields UNKNOWN
    pub fn is(self, other: TruthValue) -> TruthValue {
        TruthValue::from_bool(self == other)
    }

    pub fn xor(self, other: TruthValue) -> TruthValue {
        match (self, other) {
            (TruthValue::Unknown, _) | (_, TruthValue::Unknown) => TruthValue::Unknown,
            (a, b) => TruthValue::from_bool(a != b),
        }
    }
}

impl fmt::Display for TruthValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TruthValue::True => write!(f, "TRUE"),
            TruthValue::False => write!(f, "FALSE"),
            TruthValue::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Logical connectives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
    Not,
    Is,
    Xor,
}

impl LogicalOperator {
    pub fn is_unary(self) -> bool {
        self == LogicalOperator::Not
    }

    pub fn apply(self, left: TruthValue, right: TruthValue) -> TruthValue {
        match self {
            LogicalOperator::And => left.and(right),
            LogicalOperator::Or => left.or(right),
            LogicalOperator::Not => left.not(),
            LogicalOperator::Is => left.is(right),
            LogicalOperator::Xor => left.xor(right),
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
            LogicalOperator::Not => "NOT",
            LogicalOperator::Is => "IS",
            LogicalOperator::Xor => "XOR",
        }
    }
}

/// A connective applied to one or two logical operands
#[derive(Debug, Clone)]
pub struct LogicalOperation {
    operator: LogicalOperator,
    left: LogicalExpression,
    right: Option<LogicalExpression>,
}

impl LogicalOperation {
    pub fn operator(&self) -> LogicalOperator {
        self.operator
    }

    pub fn left(&self) -> &LogicalExpression {
        &self.left
    }

    pub fn right(&self) -> Option<&LogicalExpression> {
        self.right.as_ref()
    }
}

/// A node of a condition tree
#[derive(Debug, Clone)]
pub enum LogicalExpression {
    Literal(TruthValue),
    Operation(Box<LogicalOperation>),
    Comparison(Box<Comparison>),
}

impl LogicalExpression {
    pub fn comparison(comparison: Comparison) -> Self {
        LogicalExpression::Comparison(Box::new(comparison))
    }

    pub fn binary(operator: LogicalOperator, left: LogicalExpression, right: LogicalExpression) -> QueryResult<Self> {
        if operator.is_unary() {
            return Err(QueryError::Internal(format!("{} is not a binary connective", operator.mnemonic())));
        }
        Ok(LogicalExpression::Operation(Box::new(LogicalOperation {
            operator,
            left,
            right: Some(right),
        })))
    }

    pub fn and(left: LogicalExpression, right: LogicalExpression) -> Self {
        LogicalExpression::Operation(Box::new(LogicalOperation {
            operator: LogicalOperator::And,
            left,
            right: Some(right),
        }))
    }

    pub fn or(left: LogicalExpression, right: LogicalExpression) -> Self {
        LogicalExpression::Operation(Box::new(LogicalOperation {
            operator: LogicalOperator::Or,
            left,
            right: Some(right),
        }))
    }

    pub fn negate(operand: LogicalExpression) -> Self {
        LogicalExpression::Operation(Box::new(LogicalOperation {
            operator: LogicalOperator::Not,
            left: operand,
            right: None,
        }))
    }

    /// Evaluate both operands of every connective and combine them
    pub fn evaluate(&self, row: &Row) -> QueryResult<TruthValue> {
        match self {
            LogicalExpression::Literal(value) => Ok(*value),
            LogicalExpression::Comparison(comparison) => comparison.evaluate(row),
            LogicalExpression::Operation(operation) => {
                let left = operation.left.evaluate(row)?;
                let right = match &operation.right {
                    Some(right) => right.evaluate(row)?,
                    None => TruthValue::Unknown,
                };
                Ok(operation.operator.apply(left, right))
            }
        }
    }

    /// True when the row passes the filter; UNKNOWN rejects
    pub fn filtrate(&self, row: &Row) -> QueryResult<bool> {
        Ok(self.evaluate(row)?.is_true())
    }

    pub fn involves_code_execution(&self) -> bool {
        match self {
            LogicalExpression::Literal(_) => false,
            LogicalExpression::Comparison(comparison) => comparison.involves_code_execution(),
            LogicalExpression::Operation(operation) => {
                operation.left.involves_code_execution()
                    || operation.right.as_ref().is_some_and(LogicalExpression::involves_code_execution)
            }
        }
    }

    pub fn collect_extents(&self, extents: &mut ExtentSet) {
        match self {
            LogicalExpression::Literal(_) => {}
            LogicalExpression::Comparison(comparison) => comparison.collect_extents(extents),
            LogicalExpression::Operation(operation) => {
                operation.left.collect_extents(extents);
                if let Some(right) = &operation.right {
                    right.collect_extents(extents);
                }
            }
        }
    }

    /// Extents whose join loop this condition must be evaluated outside of
    pub fn get_outside_join_extent_set(&self) -> ExtentSet {
        match self {
            LogicalExpression::Literal(_) => ExtentSet::new(),
            LogicalExpression::Comparison(comparison) => comparison.outside_join_extents().cloned().unwrap_or_default(),
            LogicalExpression::Operation(operation) => {
                let mut extents = operation.left.get_outside_join_extent_set();
                if let Some(right) = &operation.right {
                    extents.extend(right.get_outside_join_extent_set());
                }
                extents
            }
        }
    }

    /// Path of `extent` a top-level comparison restricts
    pub fn get_path_to(&self, extent: ExtentNumber) -> Option<&Path> {
        match self {
            LogicalExpression::Comparison(comparison) => comparison.get_path_to(extent),
            _ => None,
        }
    }

    pub fn create_range_point(&self, extent: ExtentNumber, column_name: &str) -> Option<RangePoint> {
        match self {
            LogicalExpression::Comparison(comparison) => comparison.create_range_point(extent, column_name),
            _ => None,
        }
    }

    /// Range points from every comparison of a conjunction
    pub fn range_points(&self, extent: ExtentNumber, column_name: &str) -> Vec<RangePoint> {
        let mut points = Vec::new();
        self.collect_range_points(extent, column_name, &mut points);
        points
    }

    fn collect_range_points(&self, extent: ExtentNumber, column_name: &str, points: &mut Vec<RangePoint>) {
        match self {
            LogicalExpression::Operation(operation) if operation.operator == LogicalOperator::And => {
                operation.left.collect_range_points(extent, column_name, points);
                if let Some(right) = &operation.right {
                    right.collect_range_points(extent, column_name, points);
                }
            }
            other => points.extend(other.create_range_point(extent, column_name)),
        }
    }

    pub fn populate_query_flags(&self, flags: &mut QueryFlags) {
        match self {
            LogicalExpression::Literal(_) => {}
            LogicalExpression::Comparison(comparison) => comparison.populate_query_flags(flags),
            LogicalExpression::Operation(operation) => {
                operation.left.populate_query_flags(flags);
                if let Some(right) = &operation.right {
                    right.populate_query_flags(flags);
                }
            }
        }
    }

    pub fn transform(&self, transform: &dyn TreeTransform) -> QueryResult<LogicalExpression> {
        match self {
            LogicalExpression::Literal(value) => Ok(LogicalExpression::Literal(*value)),
            LogicalExpression::Comparison(comparison) => comparison.transform(transform),
            LogicalExpression::Operation(operation) => {
                let left = operation.left.transform(transform)?;
                let right = operation.right.as_ref().map(|r| r.transform(transform)).transpose()?;
                if transform.fold_row().is_some() {
                    if let Some(folded) = fold_literals(operation.operator, &left, right.as_ref()) {
                        return Ok(LogicalExpression::Literal(folded));
                    }
                }
                Ok(LogicalExpression::Operation(Box::new(LogicalOperation {
                    operator: operation.operator,
                    left,
                    right,
                })))
            }
        }
    }

    pub fn clone_with(&self, variables: &VariableArray) -> QueryResult<LogicalExpression> {
        self.transform(&Rebind::new(variables))
    }

    pub fn instantiate(&self, row: &Row) -> QueryResult<LogicalExpression> {
        self.transform(&Instantiate::new(row))
    }
}

fn fold_literals(operator: LogicalOperator, left: &LogicalExpression, right: Option<&LogicalExpression>) -> Option<TruthValue> {
    let LogicalExpression::Literal(left) = left else {
        return None;
    };
    let right = match right {
        Some(LogicalExpression::Literal(value)) => *value,
        Some(_) => return None,
        None => TruthValue::Unknown,
    };
    Some(operator.apply(*left, right))
}

impl fmt::Display for LogicalExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalExpression::Literal(value) => write!(f, "{}", value),
            LogicalExpression::Comparison(comparison) => write!(f, "{}", comparison),
            LogicalExpression::Operation(operation) => match &operation.right {
                Some(right) => write!(f, "({} {} {})", operation.left, operation.operator.mnemonic(), right),
                None => write!(f, "{}({})", operation.operator.mnemonic(), operation.left),
            },
        }
    }
}
