// Ranges Module
//
// Order-preserving filter keys and the index key ranges built from them.

pub mod key_builder;
pub mod range;

pub use self::key_builder::{FilterKeyBuilder, filter_key, index_entry_key};
pub use self::range::{DynamicRange, RangePoint};
