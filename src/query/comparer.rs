// Row Comparers
//
// Comparers order rows by the value of an expression. Nulls sort first in
// ascending order and therefore last in descending order.

use std::cmp::Ordering;
use std::fmt;

use crate::common::types::{DbTypeCode, QueryFlags, SortOrdering};
use crate::query::executor::result::{QueryResult, Row};
use crate::query::expression::{Literal, Value, ValueExpression, VariableArray, compare_nullable};

/// Orders rows by one expression
#[derive(Debug, Clone)]
pub struct SingleComparer {
    expression: ValueExpression,
    ordering: SortOrdering,
}

impl SingleComparer {
    pub fn new(expression: ValueExpression, ordering: SortOrdering) -> Self {
        SingleComparer { expression, ordering }
    }

    pub fn ascending(expression: ValueExpression) -> Self {
        Self::new(expression, SortOrdering::Ascending)
    }

    pub fn descending(expression: ValueExpression) -> Self {
        Self::new(expression, SortOrdering::Descending)
    }

    pub fn expression(&self) -> &ValueExpression {
        &self.expression
    }

    pub fn ordering(&self) -> SortOrdering {
        self.ordering
    }

    pub fn type_code(&self) -> DbTypeCode {
        self.expression.type_code()
    }

    /// Key literal of a row
    pub fn evaluate(&self, row: &Row) -> QueryResult<Literal> {
        Ok(Literal::typed(self.expression.evaluate(row)?, self.type_code()))
    }

    /// Order of `key` relative to the value of `row`
    pub fn compare(&self, key: &Literal, row: &Row) -> QueryResult<Ordering> {
        let value = self.expression.evaluate(row)?;
        self.compare_values(key.value(), value.as_ref())
    }

    /// Order of two nullable values in this comparer's direction
    pub fn compare_values(&self, left: Option<&Value>, right: Option<&Value>) -> QueryResult<Ordering> {
        let ordering = compare_nullable(left, right)?;
        Ok(match self.ordering {
            SortOrdering::Ascending => ordering,
            SortOrdering::Descending => ordering.reverse(),
        })
    }

    pub fn clone_with(&self, variables: &VariableArray) -> QueryResult<SingleComparer> {
        Ok(SingleComparer {
            expression: self.expression.clone_with(variables)?,
            ordering: self.ordering,
        })
    }
}

impl fmt::Display for SingleComparer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ordering {
            SortOrdering::Ascending => write!(f, "{} ASC", self.expression),
            SortOrdering::Descending => write!(f, "{} DESC", self.expression),
        }
    }
}

/// Lexicographic order over several comparers
#[derive(Debug, Clone, Default)]
pub struct MultiComparer {
    comparers: Vec<SingleComparer>,
}

impl MultiComparer {
    pub fn new(comparers: Vec<SingleComparer>) -> Self {
        MultiComparer { comparers }
    }

    pub fn comparers(&self) -> &[SingleComparer] {
        &self.comparers
    }

    pub fn is_empty(&self) -> bool {
        self.comparers.is_empty()
    }

    pub fn evaluate_keys(&self, row: &Row) -> QueryResult<Vec<Literal>> {
        self.comparers.iter().map(|comparer| comparer.evaluate(row)).collect()
    }

    pub fn compare_keys(&self, left: &[Literal], right: &[Literal]) -> QueryResult<Ordering> {
        for ((comparer, l), r) in self.comparers.iter().zip(left).zip(right) {
            let ordering = comparer.compare_values(l.value(), r.value())?;
            if ordering != Ordering::Equal {
                return Ok(ordering);
            }
        }
        Ok(Ordering::Equal)
    }

    pub fn compare_rows(&self, left: &Row, right: &Row) -> QueryResult<Ordering> {
        for comparer in &self.comparers {
            let key = comparer.evaluate(left)?;
            let ordering = comparer.compare(&key, right)?;
            if ordering != Ordering::Equal {
                return Ok(ordering);
            }
        }
        Ok(Ordering::Equal)
    }

    pub fn populate_query_flags(&self, flags: &mut QueryFlags) {
        for comparer in &self.comparers {
            comparer.expression.populate_query_flags(flags);
        }
    }

    pub fn clone_with(&self, variables: &VariableArray) -> QueryResult<MultiComparer> {
        Ok(MultiComparer {
            comparers: self
                .comparers
                .iter()
                .map(|comparer| comparer.clone_with(variables))
                .collect::<QueryResult<Vec<_>>>()?,
        })
    }
}

impl fmt::Display for MultiComparer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, comparer) in self.comparers.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", comparer)?;
        }
        Ok(())
    }
}
