// Path Navigation
//
// A path walks from the object bound to an extent through a chain of object
// references to a terminal typed member ("e.Manager.Department.Name"). A null
// reference anywhere in the chain makes the whole path null.

use std::fmt;
use std::sync::Arc;

use crate::common::types::{DbTypeCode, ExtentNumber, ExtentSet};
use crate::query::executor::result::{QueryError, QueryResult, Row};
use crate::query::expression::transform::TreeTransform;
use crate::query::expression::{Value, ValueExpression};
use crate::storage::ObjectRef;

/// Computed member backed by application code rather than storage
pub trait ObjectMethod: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn result_type(&self) -> DbTypeCode;

    fn invoke(&self, target: &ObjectRef, arguments: &[Option<Value>]) -> QueryResult<Option<Value>>;
}

/// One navigation step or the terminal member of a path
#[derive(Debug, Clone)]
pub enum Member {
    /// The object itself
    This,
    /// A stored property
    Property {
        index: usize,
        name: String,
        type_code: DbTypeCode,
        column_name: Option<String>,
    },
    /// A computed member
    Method {
        method: Arc<dyn ObjectMethod>,
        arguments: Vec<ValueExpression>,
    },
}

impl Member {
    pub fn property(index: usize, name: &str, type_code: DbTypeCode) -> Self {
        Member::Property {
            index,
            name: name.to_string(),
            type_code,
            column_name: Some(name.to_string()),
        }
    }

    pub fn method(method: Arc<dyn ObjectMethod>, arguments: Vec<ValueExpression>) -> Self {
        Member::Method { method, arguments }
    }

    pub fn type_code(&self) -> DbTypeCode {
        match self {
            Member::This => DbTypeCode::Object,
            Member::Property { type_code, .. } => *type_code,
            Member::Method { method, .. } => method.result_type(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Member::This => "this",
            Member::Property { name, .. } => name,
            Member::Method { method, .. } => method.name(),
        }
    }

    pub fn column_name(&self) -> Option<&str> {
        match self {
            Member::Property { column_name, .. } => column_name.as_deref(),
            _ => None,
        }
    }

    pub fn involves_code_execution(&self) -> bool {
        matches!(self, Member::Method { .. })
    }

    /// Evaluate on `target`; method arguments are evaluated against the start row
    pub fn evaluate(&self, target: &ObjectRef, row: &Row) -> QueryResult<Option<Value>> {
        match self {
            Member::This => Ok(Some(Value::Object(target.clone()))),
            Member::Property { index, .. } => Ok(target.field(*index)?.cloned()),
            Member::Method { method, arguments } => {
                let values = arguments
                    .iter()
                    .map(|argument| argument.evaluate(row))
                    .collect::<QueryResult<Vec<_>>>()?;
                let result = method.invoke(target, &values)?;
                match &result {
                    Some(value) if value.type_code() != method.result_type() => Err(QueryError::Internal(format!(
                        "Method {} returned {} instead of {}",
                        method.name(),
                        value.type_code(),
                        method.result_type()
                    ))),
                    _ => Ok(result),
                }
            }
        }
    }

    fn collect_extents(&self, extents: &mut ExtentSet) {
        if let Member::Method { arguments, .. } = self {
            for argument in arguments {
                argument.collect_extents(extents);
            }
        }
    }

    fn transform(&self, transform: &dyn TreeTransform) -> QueryResult<Member> {
        match self {
            Member::Method { method, arguments } => Ok(Member::Method {
                method: method.clone(),
                arguments: arguments
                    .iter()
                    .map(|argument| argument.transform(transform))
                    .collect::<QueryResult<Vec<_>>>()?,
            }),
            other => Ok(other.clone()),
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Method { method, arguments } => {
                write!(f, "{}(", method.name())?;
                for (i, argument) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", argument)?;
                }
                write!(f, ")")
            }
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Navigation from an extent through reference steps to a terminal member
#[derive(Debug, Clone)]
pub struct Path {
    extent: ExtentNumber,
    steps: Vec<Member>,
    member: Member,
}

impl Path {
    /// Every intermediate step must produce an object reference
    pub fn new(extent: ExtentNumber, steps: Vec<Member>, member: Member) -> QueryResult<Self> {
        if let Some(step) = steps.iter().find(|step| step.type_code() != DbTypeCode::Object) {
            return Err(QueryError::Internal(format!(
                "Path step {} yields {}, expected an object reference",
                step.name(),
                step.type_code()
            )));
        }
        Ok(Path { extent, steps, member })
    }

    /// Path to a stored property of the extent object
    pub fn property(extent: ExtentNumber, index: usize, name: &str, type_code: DbTypeCode) -> Self {
        Path {
            extent,
            steps: Vec::new(),
            member: Member::property(index, name, type_code),
        }
    }

    /// The extent object itself
    pub fn this(extent: ExtentNumber) -> Self {
        Path {
            extent,
            steps: Vec::new(),
            member: Member::This,
        }
    }

    pub fn extent_number(&self) -> ExtentNumber {
        self.extent
    }

    pub fn steps(&self) -> &[Member] {
        &self.steps
    }

    pub fn member(&self) -> &Member {
        &self.member
    }

    pub fn type_code(&self) -> DbTypeCode {
        self.member.type_code()
    }

    pub fn name(&self) -> &str {
        self.member.name()
    }

    /// Dot-joined names of the steps and the terminal member
    pub fn full_name(&self) -> String {
        self.steps
            .iter()
            .chain(std::iter::once(&self.member))
            .map(Member::name)
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn column_name(&self) -> Option<&str> {
        self.member.column_name()
    }

    pub fn involves_code_execution(&self) -> bool {
        self.member.involves_code_execution() || self.steps.iter().any(Member::involves_code_execution)
    }

    pub(crate) fn collect_extents(&self, extents: &mut ExtentSet) {
        extents.insert(self.extent);
        for step in &self.steps {
            step.collect_extents(extents);
        }
        self.member.collect_extents(extents);
    }

    /// Evaluate against the object bound to the path's extent; a null placeholder gives null
    pub fn evaluate(&self, row: &Row) -> QueryResult<Option<Value>> {
        match row.object_at(self.extent)? {
            Some(root) => self.evaluate_from(Some(root), row),
            None => Ok(None),
        }
    }

    /// Navigate from an explicit root object. A missing root is a contract violation.
    pub fn evaluate_from(&self, root: Option<&ObjectRef>, row: &Row) -> QueryResult<Option<Value>> {
        let root = root.ok_or_else(|| {
            QueryError::Internal(format!("Path {} evaluated on a null root object", self.full_name()))
        })?;
        let mut cursor = Some(root.clone());
        for step in &self.steps {
            let Some(current) = cursor.take() else {
                break;
            };
            cursor = match step.evaluate(&current, row)? {
                Some(Value::Object(next)) => Some(next),
                None => None,
                Some(other) => {
                    return Err(QueryError::Internal(format!(
                        "Path step {} yielded {}",
                        step.name(),
                        other.type_code()
                    )));
                }
            };
        }
        match cursor {
            Some(target) => self.member.evaluate(&target, row),
            None => Ok(None),
        }
    }

    /// Rebuild the path with every member argument transformed
    pub(crate) fn transform_members(&self, transform: &dyn TreeTransform) -> QueryResult<Path> {
        Ok(Path {
            extent: self.extent,
            steps: self
                .steps
                .iter()
                .map(|step| step.transform(transform))
                .collect::<QueryResult<Vec<_>>>()?,
            member: self.member.transform(transform)?,
        })
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extent)?;
        for step in &self.steps {
            write!(f, ".{}", step)?;
        }
        write!(f, ".{}", self.member)
    }
}
