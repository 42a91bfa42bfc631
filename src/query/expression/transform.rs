// Tree Transforms
//
// Clone-with-rebound-variables and instantiate-on-a-row are the same recursive
// rebuild of an expression tree with a different substitution at the leaves.
// The walk lives on the tree types; the substitutions are implemented here.

use crate::query::executor::result::{QueryResult, Row};
use crate::query::expression::operation::Operation;
use crate::query::expression::path::Path;
use crate::query::expression::variable::{Variable, VariableArray};
use crate::query::expression::{Literal, ValueExpression};

/// Substitution applied at the leaves of a tree rebuild
pub trait TreeTransform {
    fn variable(&self, variable: &Variable) -> QueryResult<ValueExpression>;

    /// `rebuilt` is `original` with its member arguments already transformed
    fn path(&self, original: &Path, rebuilt: Path) -> QueryResult<ValueExpression>;

    /// Called with the operands already transformed
    fn operation(&self, rebuilt: Operation) -> QueryResult<ValueExpression> {
        Ok(ValueExpression::Operation(Box::new(rebuilt)))
    }

    /// Row used to fold fully literal sub-trees, if the transform folds at all
    fn fold_row(&self) -> Option<&Row> {
        None
    }
}

/// Rebinds every variable to another array, keeping the tree shape
pub struct Rebind<'a> {
    variables: &'a VariableArray,
}

impl<'a> Rebind<'a> {
    pub fn new(variables: &'a VariableArray) -> Self {
        Rebind { variables }
    }
}

impl TreeTransform for Rebind<'_> {
    fn variable(&self, variable: &Variable) -> QueryResult<ValueExpression> {
        Ok(ValueExpression::Variable(variable.rebind(self.variables)?))
    }

    fn path(&self, _original: &Path, rebuilt: Path) -> QueryResult<ValueExpression> {
        Ok(ValueExpression::Path(Box::new(rebuilt)))
    }
}

/// Partially evaluates a tree against a row whose extents are partly bound
pub struct Instantiate<'a> {
    row: &'a Row,
}

impl<'a> Instantiate<'a> {
    pub fn new(row: &'a Row) -> Self {
        Instantiate { row }
    }
}

impl TreeTransform for Instantiate<'_> {
    fn variable(&self, variable: &Variable) -> QueryResult<ValueExpression> {
        Ok(ValueExpression::Variable(variable.clone()))
    }

    fn path(&self, original: &Path, rebuilt: Path) -> QueryResult<ValueExpression> {
        if self.row.is_bound(original.extent_number()) {
            let value = rebuilt.evaluate(self.row)?;
            return Ok(ValueExpression::Literal(Literal::typed(value, rebuilt.type_code())));
        }
        Ok(ValueExpression::Path(Box::new(rebuilt)))
    }

    fn operation(&self, rebuilt: Operation) -> QueryResult<ValueExpression> {
        let literal_operands = matches!(rebuilt.left(), ValueExpression::Literal(_))
            && rebuilt.right().is_none_or(|right| matches!(right, ValueExpression::Literal(_)));
        if literal_operands {
            let value = rebuilt.evaluate(self.row)?;
            return Ok(ValueExpression::Literal(Literal::typed(value, rebuilt.type_code())));
        }
        Ok(ValueExpression::Operation(Box::new(rebuilt)))
    }

    fn fold_row(&self) -> Option<&Row> {
        Some(self.row)
    }
}
