// Common Definitions
//
// Identifier aliases, type codes and flag words shared by every layer of the engine.

pub mod types;

pub use self::types::{DbTypeCode, ExtentNumber, ExtentSet, NodeId, ObjectId, QueryFlags, SortOrdering, UniqueQueryId};
