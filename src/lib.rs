// objquery Execution Core

pub mod common;
pub mod query;
pub mod storage;

// Re-export key items for convenient access
pub use query::executor::{ExecutionConfig, ExecutionEnumerator, FetchClause, QueryError, QueryResult, Row};
pub use query::expression::{Value, ValueExpression, VariableArray};
pub use storage::{MemoryStore, ObjectStore};
