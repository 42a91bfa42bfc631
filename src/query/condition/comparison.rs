// Comparison Predicates
//
// Binary comparisons between two value expressions. Nulls make every ordering
// comparison UNKNOWN; IS and IS NOT treat null as a comparable value.

use std::cmp::Ordering;
use std::fmt;

use crate::common::types::{DbTypeCode, ExtentNumber, ExtentSet, QueryFlags};
use crate::query::condition::like::LikePattern;
use crate::query::condition::{LogicalExpression, TruthValue};
use crate::query::executor::result::{QueryError, QueryResult, Row};
use crate::query::expression::transform::TreeTransform;
use crate::query::expression::{Path, Value, ValueExpression, VariableArray, compare_values};
use crate::query::ranges::RangePoint;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Is,
    IsNot,
    Like,
}

impl ComparisonOperator {
    /// Operators an index range can be built from
    pub fn is_range_operator(self) -> bool {
        matches!(
            self,
            ComparisonOperator::Equal
                | ComparisonOperator::LessThan
                | ComparisonOperator::LessThanOrEqual
                | ComparisonOperator::GreaterThan
                | ComparisonOperator::GreaterThanOrEqual
        )
    }

    /// The operator with its operands swapped
    pub fn reverse(self) -> Self {
        match self {
            ComparisonOperator::LessThan => ComparisonOperator::GreaterThan,
            ComparisonOperator::LessThanOrEqual => ComparisonOperator::GreaterThanOrEqual,
            ComparisonOperator::GreaterThan => ComparisonOperator::LessThan,
            ComparisonOperator::GreaterThanOrEqual => ComparisonOperator::LessThanOrEqual,
            other => other,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            ComparisonOperator::Equal => "EQ",
            ComparisonOperator::NotEqual => "NE",
            ComparisonOperator::LessThan => "LS",
            ComparisonOperator::LessThanOrEqual => "LE",
            ComparisonOperator::GreaterThan => "GR",
            ComparisonOperator::GreaterThanOrEqual => "GE",
            ComparisonOperator::Is => "IS",
            ComparisonOperator::IsNot => "ISNOT",
            ComparisonOperator::Like => "LIKE",
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            ComparisonOperator::Equal => "=",
            ComparisonOperator::NotEqual => "<>",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::LessThanOrEqual => "<=",
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::GreaterThanOrEqual => ">=",
            ComparisonOperator::Is => "IS",
            ComparisonOperator::IsNot => "IS NOT",
            ComparisonOperator::Like => "LIKE",
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Type code the comparison is performed in
pub(crate) fn comparison_type(left: DbTypeCode, right: DbTypeCode) -> QueryResult<DbTypeCode> {
    if left == right {
        return Ok(left);
    }
    if left.is_numeric() && right.is_numeric() {
        return Ok(match (left, right) {
            (DbTypeCode::Double, _) | (_, DbTypeCode::Double) => DbTypeCode::Double,
            _ => DbTypeCode::Decimal,
        });
    }
    Err(QueryError::TypeError(format!("Cannot compare {} with {}", left, right)))
}

/// Apply a comparison operator to evaluated operands. Shared with the compiled filter VM.
pub(crate) fn apply(
    operator: ComparisonOperator,
    left: Option<&Value>,
    right: Option<&Value>,
    like: Option<&LikePattern>,
) -> QueryResult<TruthValue> {
    match operator {
        ComparisonOperator::Is => return Ok(TruthValue::from_bool(is_same(left, right)?)),
        ComparisonOperator::IsNot => return Ok(TruthValue::from_bool(!is_same(left, right)?)),
        _ => {}
    }
    let (Some(left), Some(right)) = (left, right) else {
        return Ok(TruthValue::Unknown);
    };
    if operator == ComparisonOperator::Like {
        let (Value::String(text), Value::String(pattern)) = (left, right) else {
            return Err(QueryError::Internal("LIKE applied to non-string operands".into()));
        };
        let like = like.ok_or_else(|| QueryError::Internal("LIKE comparison without a pattern".into()))?;
        return Ok(TruthValue::from_bool(like.matches(text, pattern)?));
    }
    let ordering = compare_values(left, right)?;
    let holds = match operator {
        ComparisonOperator::Equal => ordering == Ordering::Equal,
        ComparisonOperator::NotEqual => ordering != Ordering::Equal,
        ComparisonOperator::LessThan => ordering == Ordering::Less,
        ComparisonOperator::LessThanOrEqual => ordering != Ordering::Greater,
        ComparisonOperator::GreaterThan => ordering == Ordering::Greater,
        ComparisonOperator::GreaterThanOrEqual => ordering != Ordering::Less,
        other => return Err(QueryError::Internal(format!("{} handled before ordering", other))),
    };
    Ok(TruthValue::from_bool(holds))
}

fn is_same(left: Option<&Value>, right: Option<&Value>) -> QueryResult<bool> {
    match (left, right) {
        (None, None) => Ok(true),
        (Some(a), Some(b)) => Ok(compare_values(a, b)? == Ordering::Equal),
        _ => Ok(false),
    }
}

/// A comparison between two value expressions
#[derive(Debug, Clone)]
pub struct Comparison {
    operator: ComparisonOperator,
    left: ValueExpression,
    right: ValueExpression,
    type_code: DbTypeCode,
    escape: Option<char>,
    like: Option<LikePattern>,
    outside_join: Option<ExtentSet>,
}

impl Comparison {
    pub fn new(operator: ComparisonOperator, left: ValueExpression, right: ValueExpression) -> QueryResult<Self> {
        if operator == ComparisonOperator::Like {
            return Self::like(left, right, None);
        }
        let type_code = comparison_type(left.type_code(), right.type_code())?;
        Ok(Comparison {
            operator,
            left,
            right,
            type_code,
            escape: None,
            like: None,
            outside_join: None,
        })
    }

    /// `left LIKE right [ESCAPE escape]`
    pub fn like(left: ValueExpression, right: ValueExpression, escape: Option<char>) -> QueryResult<Self> {
        if left.type_code() != DbTypeCode::String || right.type_code() != DbTypeCode::String {
            return Err(QueryError::TypeError(format!(
                "LIKE requires strings, got {} and {}",
                left.type_code(),
                right.type_code()
            )));
        }
        let like = Some(build_pattern(&right, escape)?);
        Ok(Comparison {
            operator: ComparisonOperator::Like,
            left,
            right,
            type_code: DbTypeCode::String,
            escape,
            like,
            outside_join: None,
        })
    }

    /// Mark the extents this comparison must be evaluated outside of
    pub fn with_outside_join(mut self, extents: ExtentSet) -> Self {
        self.outside_join = Some(extents);
        self
    }

    pub fn operator(&self) -> ComparisonOperator {
        self.operator
    }

    pub fn left(&self) -> &ValueExpression {
        &self.left
    }

    pub fn right(&self) -> &ValueExpression {
        &self.right
    }

    /// Type both operands are compared in
    pub fn type_code(&self) -> DbTypeCode {
        self.type_code
    }

    pub(crate) fn like_pattern(&self) -> Option<&LikePattern> {
        self.like.as_ref()
    }

    pub fn outside_join_extents(&self) -> Option<&ExtentSet> {
        self.outside_join.as_ref()
    }

    pub fn evaluate(&self, row: &Row) -> QueryResult<TruthValue> {
        let left = self.left.evaluate(row)?;
        let right = self.right.evaluate(row)?;
        apply(self.operator, left.as_ref(), right.as_ref(), self.like.as_ref())
    }

    pub fn involves_code_execution(&self) -> bool {
        self.left.involves_code_execution() || self.right.involves_code_execution()
    }

    pub fn collect_extents(&self, extents: &mut ExtentSet) {
        self.left.collect_extents(extents);
        self.right.collect_extents(extents);
    }

    /// Path of `extent` this comparison restricts, when usable for a range
    pub fn get_path_to(&self, extent: ExtentNumber) -> Option<&Path> {
        if !self.operator.is_range_operator() {
            return None;
        }
        match (self.left.as_path(), self.right.as_path()) {
            (Some(path), _) if is_direct_path(path, extent) && !self.right.depends_on(extent) => Some(path),
            (_, Some(path)) if is_direct_path(path, extent) && !self.left.depends_on(extent) => Some(path),
            _ => None,
        }
    }

    /// Range point over `column_name` of `extent`, with the operator reversed when the path is on the right
    pub fn create_range_point(&self, extent: ExtentNumber, column_name: &str) -> Option<RangePoint> {
        let path = self.get_path_to(extent)?;
        if path.column_name() != Some(column_name) {
            return None;
        }
        let on_left = self.left.as_path().is_some_and(|left| std::ptr::eq(left, path));
        if on_left {
            Some(RangePoint::new(self.operator, self.right.clone()))
        } else {
            Some(RangePoint::new(self.operator.reverse(), self.left.clone()))
        }
    }

    pub fn populate_query_flags(&self, flags: &mut QueryFlags) {
        self.left.populate_query_flags(flags);
        self.right.populate_query_flags(flags);
        if self.operator == ComparisonOperator::Like && self.right.as_literal().is_none() {
            flags.insert(QueryFlags::INCLUDES_LIKE_VARIABLE);
        }
    }

    /// Rebuild through `transform`; folds into a truth literal when both sides became literals
    pub fn transform(&self, transform: &dyn TreeTransform) -> QueryResult<LogicalExpression> {
        let left = self.left.transform(transform)?;
        let right = self.right.transform(transform)?;
        let like = match (&self.like, right.as_literal()) {
            (Some(pattern), Some(_)) if pattern.is_dynamic() => Some(build_pattern(&right, self.escape)?),
            (like, _) => like.clone(),
        };
        let rebuilt = Comparison {
            operator: self.operator,
            left,
            right,
            type_code: self.type_code,
            escape: self.escape,
            like,
            outside_join: self.outside_join.clone(),
        };
        if let Some(row) = transform.fold_row() {
            if rebuilt.left.as_literal().is_some() && rebuilt.right.as_literal().is_some() {
                return Ok(LogicalExpression::Literal(rebuilt.evaluate(row)?));
            }
        }
        Ok(LogicalExpression::Comparison(Box::new(rebuilt)))
    }

    pub fn clone_with(&self, variables: &VariableArray) -> QueryResult<LogicalExpression> {
        self.transform(&crate::query::expression::Rebind::new(variables))
    }
}

fn is_direct_path(path: &Path, extent: ExtentNumber) -> bool {
    path.extent_number() == extent && path.steps().is_empty() && !path.involves_code_execution()
}

fn build_pattern(right: &ValueExpression, escape: Option<char>) -> QueryResult<LikePattern> {
    match right.as_literal().and_then(|literal| literal.value()) {
        Some(Value::String(pattern)) => LikePattern::fixed(pattern, escape),
        _ => Ok(LikePattern::dynamic(escape)),
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.operator, self.right)?;
        if let Some(escape) = self.escape {
            write!(f, " ESCAPE '{}'", escape)?;
        }
        Ok(())
    }
}
