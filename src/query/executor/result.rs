// Query Result Module
//
// This module defines the composite rows produced by enumerators, the row type binding
// that describes them, and the error type shared by the whole execution core.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::common::types::ExtentNumber;
use crate::query::expression::transform::TreeTransform;
use crate::query::expression::{Value, ValueExpression};
use crate::storage::{ObjectRef, TypeBinding};

/// State of one extent slot in a composite row
#[derive(Debug, Clone, PartialEq)]
pub enum RowSlot {
    /// The extent has not been visited yet
    Unbound,
    /// Placeholder produced by an outer join without a match
    Null,
    /// A candidate object
    Object(ObjectRef),
}

/// A composite row holding one object slot per extent
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    slots: Vec<RowSlot>,
}

impl Row {
    /// Create a row with every extent unbound
    pub fn new(extent_count: usize) -> Self {
        Row {
            slots: vec![RowSlot::Unbound; extent_count],
        }
    }

    /// A row without extents, used where expressions must not touch any object
    pub fn empty() -> Self {
        Row { slots: Vec::new() }
    }

    /// Start a row from an optional context row produced by an outer enumerator
    pub fn with_context(context: Option<&Row>, extent_count: usize) -> Self {
        let mut row = match context {
            Some(ctx) => ctx.clone(),
            None => Row::new(extent_count),
        };
        if row.slots.len() < extent_count {
            row.slots.resize(extent_count, RowSlot::Unbound);
        }
        row
    }

    pub fn extent_count(&self) -> usize {
        self.slots.len()
    }

    pub fn attach_object(&mut self, extent: ExtentNumber, object: ObjectRef) {
        self.ensure_slot(extent);
        self.slots[extent] = RowSlot::Object(object);
    }

    pub fn attach_null(&mut self, extent: ExtentNumber) {
        self.ensure_slot(extent);
        self.slots[extent] = RowSlot::Null;
    }

    fn ensure_slot(&mut self, extent: ExtentNumber) {
        if extent >= self.slots.len() {
            self.slots.resize(extent + 1, RowSlot::Unbound);
        }
    }

    pub fn slot(&self, extent: ExtentNumber) -> &RowSlot {
        self.slots.get(extent).unwrap_or(&RowSlot::Unbound)
    }

    /// True when the extent holds an object or a null placeholder
    pub fn is_bound(&self, extent: ExtentNumber) -> bool {
        !matches!(self.slot(extent), RowSlot::Unbound)
    }

    /// The object bound at `extent`, `None` for a null placeholder.
    ///
    /// Reading an unbound extent is a contract violation.
    pub fn object_at(&self, extent: ExtentNumber) -> QueryResult<Option<&ObjectRef>> {
        match self.slot(extent) {
            RowSlot::Object(object) => Ok(Some(object)),
            RowSlot::Null => Ok(None),
            RowSlot::Unbound => Err(QueryError::Internal(format!(
                "Extent {} is not bound in the current row",
                extent
            ))),
        }
    }

    /// Convenience accessor that treats unbound and null slots alike
    pub fn access_object(&self, extent: ExtentNumber) -> Option<&ObjectRef> {
        match self.slot(extent) {
            RowSlot::Object(object) => Some(object),
            _ => None,
        }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, slot) in self.slots.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match slot {
                RowSlot::Unbound => write!(f, "-")?,
                RowSlot::Null => write!(f, "NULL")?,
                RowSlot::Object(object) => write!(f, "{}#{}", object.type_binding().name(), object.identity())?,
            }
        }
        write!(f, ")")
    }
}

/// Type of one extent in a row type binding
#[derive(Debug, Clone)]
pub struct ExtentBinding {
    pub name: String,
    pub type_binding: Arc<TypeBinding>,
}

/// A named projection of the result row
#[derive(Debug, Clone)]
pub struct PropertyMapping {
    pub name: String,
    pub expression: ValueExpression,
}

/// Describes the extents of a composite row and the projected values
#[derive(Debug, Clone, Default)]
pub struct RowTypeBinding {
    extents: Vec<ExtentBinding>,
    projections: Vec<PropertyMapping>,
}

impl RowTypeBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extent and return its number
    pub fn add_extent(&mut self, name: &str, type_binding: Arc<TypeBinding>) -> ExtentNumber {
        self.extents.push(ExtentBinding {
            name: name.to_string(),
            type_binding,
        });
        self.extents.len() - 1
    }

    pub fn add_projection(&mut self, name: &str, expression: ValueExpression) {
        self.projections.push(PropertyMapping {
            name: name.to_string(),
            expression,
        });
    }

    pub fn extent_count(&self) -> usize {
        self.extents.len()
    }

    pub fn extent(&self, extent: ExtentNumber) -> QueryResult<&ExtentBinding> {
        self.extents
            .get(extent)
            .ok_or_else(|| QueryError::Internal(format!("Unknown extent number {}", extent)))
    }

    pub fn projections(&self) -> &[PropertyMapping] {
        &self.projections
    }

    pub fn is_singleton(&self) -> bool {
        self.projections.len() == 1
    }

    /// Evaluate every projection against a row
    pub fn project(&self, row: &Row) -> QueryResult<Vec<Option<Value>>> {
        self.projections
            .iter()
            .map(|mapping| mapping.expression.evaluate(row))
            .collect()
    }

    /// Rebuild the projections through a tree transform
    pub fn transform(&self, transform: &dyn TreeTransform) -> QueryResult<RowTypeBinding> {
        let projections = self
            .projections
            .iter()
            .map(|mapping| {
                Ok(PropertyMapping {
                    name: mapping.name.clone(),
                    expression: mapping.expression.transform(transform)?,
                })
            })
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(RowTypeBinding {
            extents: self.extents.clone(),
            projections,
        })
    }
}

/// Error type for query execution
#[derive(Error, Debug)]
pub enum QueryError {
    /// Contract violation inside the engine
    #[error("Internal query engine error: {0}")]
    Internal(String),
    /// Operand types that cannot be combined
    #[error("Type error: {0}")]
    TypeError(String),
    /// Numeric overflow
    #[error("Numeric overflow")]
    NumericOverflow,
    /// Division by zero
    #[error("Division by zero")]
    DivisionByZero,
    /// A variable was read before being set
    #[error("Variable {0} has not been set")]
    UnsetVariable(usize),
    /// A continuation token that does not fit the enumerator tree
    #[error("Invalid offset key: {0}")]
    InvalidOffsetKey(String),
    /// Caller buffer too small for a GetInfo response
    #[error("Buffer too small: {required} bytes required")]
    BufferTooSmall { required: usize },
    /// Operation not supported by this enumerator or expression
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    /// LIKE pattern that could not be compiled
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    /// Malformed parameter buffer
    #[error("Parameter decoding error: {0}")]
    ParameterDecoding(#[from] bincode::Error),
    /// Error reported by the object store
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl QueryError {
    /// Errors a client may recover from by restarting without its continuation token
    pub fn is_retriable(&self) -> bool {
        matches!(self, QueryError::InvalidOffsetKey(_))
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
