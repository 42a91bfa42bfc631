// Object Storage Interface
//
// This module defines the object model the engine evaluates against and the
// store contract the scan enumerators wrap. The physical store lives outside
// this crate; `MemoryStore` is an in-process implementation of the contract.

pub mod memory;

use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use crate::common::types::{DbTypeCode, ObjectId};
use crate::query::executor::result::{QueryError, QueryResult};
use crate::query::expression::Value;

pub use self::memory::MemoryStore;

/// Shared handle to a stored object
pub type ObjectRef = Arc<DbObject>;

/// Metadata of one property of a type
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyBinding {
    pub name: String,
    pub type_code: DbTypeCode,
    /// Storage column backing the property, `None` for derived values
    pub column_name: Option<String>,
}

impl PropertyBinding {
    /// A property backed by a storage column of the same name
    pub fn stored(name: &str, type_code: DbTypeCode) -> Self {
        PropertyBinding {
            name: name.to_string(),
            type_code,
            column_name: Some(name.to_string()),
        }
    }

    /// A property without a storage column, e.g. the values of a temporary object
    pub fn derived(name: &str, type_code: DbTypeCode) -> Self {
        PropertyBinding {
            name: name.to_string(),
            type_code,
            column_name: None,
        }
    }
}

/// Type metadata shared by all objects of a type
#[derive(Debug, Clone, PartialEq)]
pub struct TypeBinding {
    name: String,
    properties: Vec<PropertyBinding>,
}

impl TypeBinding {
    pub fn new(name: &str, properties: Vec<PropertyBinding>) -> Self {
        TypeBinding {
            name: name.to_string(),
            properties,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[PropertyBinding] {
        &self.properties
    }

    pub fn property(&self, index: usize) -> QueryResult<&PropertyBinding> {
        self.properties.get(index).ok_or_else(|| {
            QueryError::Internal(format!("Type {} has no property at index {}", self.name, index))
        })
    }

    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }
}

/// A stored object: identity, type and one nullable value per property
#[derive(Debug)]
pub struct DbObject {
    identity: ObjectId,
    type_binding: Arc<TypeBinding>,
    fields: Vec<Option<Value>>,
}

impl DbObject {
    /// Create an object, checking the field values against the type binding
    pub fn new(identity: ObjectId, type_binding: Arc<TypeBinding>, fields: Vec<Option<Value>>) -> QueryResult<Self> {
        if fields.len() != type_binding.properties().len() {
            return Err(QueryError::TypeError(format!(
                "Type {} expects {} fields, got {}",
                type_binding.name(),
                type_binding.properties().len(),
                fields.len()
            )));
        }
        for (property, field) in type_binding.properties().iter().zip(&fields) {
            if let Some(value) = field {
                if value.type_code() != property.type_code {
                    return Err(QueryError::TypeError(format!(
                        "Property {}.{} expects {}, got {}",
                        type_binding.name(),
                        property.name,
                        property.type_code,
                        value.type_code()
                    )));
                }
            }
        }
        Ok(DbObject {
            identity,
            type_binding,
            fields,
        })
    }

    pub fn identity(&self) -> ObjectId {
        self.identity
    }

    pub fn type_binding(&self) -> &Arc<TypeBinding> {
        &self.type_binding
    }

    pub fn field(&self, index: usize) -> QueryResult<Option<&Value>> {
        self.fields.get(index).map(Option::as_ref).ok_or_else(|| {
            QueryError::Internal(format!(
                "Object of type {} has no field at index {}",
                self.type_binding.name(),
                index
            ))
        })
    }
}

impl PartialEq for DbObject {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

/// Description of a single-column secondary index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub name: String,
    pub type_name: String,
    /// Property index of the indexed column
    pub column: usize,
    pub type_code: DbTypeCode,
}

/// Range over full index entry keys
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRange {
    pub lower: Bound<Vec<u8>>,
    pub upper: Bound<Vec<u8>>,
}

impl KeyRange {
    pub fn full() -> Self {
        KeyRange {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// True when no key can satisfy both bounds
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(u)) => l > u,
            (Bound::Included(l), Bound::Excluded(u))
            | (Bound::Excluded(l), Bound::Included(u))
            | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
            _ => false,
        }
    }
}

/// One index entry: the full entry key and the object it points to
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub key: Vec<u8>,
    pub object: ObjectRef,
}

/// Store collaborator wrapped by the scan enumerators
pub trait ObjectStore: Send + Sync + fmt::Debug {
    /// All objects of a type in identity order, starting at `from` when given
    fn scan(&self, type_name: &str, from: Option<ObjectId>) -> QueryResult<Vec<ObjectRef>>;

    /// Index metadata by name
    fn index(&self, name: &str) -> QueryResult<IndexInfo>;

    /// Entries of an index inside `range`, in ascending key order
    fn index_range(&self, index_name: &str, range: &KeyRange) -> QueryResult<Vec<IndexEntry>>;

    /// Object by identity
    fn lookup(&self, identity: ObjectId) -> QueryResult<Option<ObjectRef>>;
}
