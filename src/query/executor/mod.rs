// Query Executor Module
//
// Enumerator trees that produce query results row by row, together with
// their shared configuration, offset keys and the enumerator cache.

pub mod cache;
pub mod config;
pub mod enumerator;
pub mod info;
pub mod offset_key;
pub mod operators;
pub mod result;

pub use self::cache::EnumeratorCache;
pub use self::config::ExecutionConfig;
pub use self::enumerator::{EnumeratorBase, ExecutionEnumerator, FetchClause, attach_to_cache};
pub use self::info::InfoType;
pub use self::operators::{EnumeratorNodeType, JoinType};
pub use self::result::{QueryError, QueryResult, Row, RowTypeBinding};
