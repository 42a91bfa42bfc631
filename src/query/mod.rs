// Query Processing Module
//
// Expression and condition trees, comparers, set functions, index ranges,
// the compiled filter path and the enumerators that execute query plans.

pub mod codegen;
pub mod comparer;
pub mod condition;
pub mod executor;
pub mod expression;
pub mod ranges;
pub mod set_function;

pub use condition::{LogicalExpression, TruthValue};
pub use executor::result::QueryResult;
pub use expression::{Value, ValueExpression};
