// In-Memory Object Store
//
// A sorted-map implementation of the store contract. Objects are kept in identity
// order and every secondary index maps full entry keys to objects.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::common::types::ObjectId;
use crate::query::executor::result::{QueryError, QueryResult};
use crate::query::expression::Value;
use crate::query::ranges::index_entry_key;
use crate::storage::{DbObject, IndexEntry, IndexInfo, KeyRange, ObjectRef, ObjectStore, TypeBinding};

#[derive(Debug)]
struct MemoryIndex {
    info: IndexInfo,
    entries: BTreeMap<Vec<u8>, ObjectRef>,
}

#[derive(Debug, Default)]
struct StoreInner {
    types: HashMap<String, Arc<TypeBinding>>,
    objects: BTreeMap<ObjectId, ObjectRef>,
    indexes: HashMap<String, MemoryIndex>,
    next_identity: ObjectId,
}

/// Object store kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type and return its shared binding
    pub fn register_type(&self, binding: TypeBinding) -> Arc<TypeBinding> {
        let binding = Arc::new(binding);
        self.inner
            .write()
            .types
            .insert(binding.name().to_string(), binding.clone());
        binding
    }

    pub fn type_binding(&self, type_name: &str) -> QueryResult<Arc<TypeBinding>> {
        self.inner
            .read()
            .types
            .get(type_name)
            .cloned()
            .ok_or_else(|| QueryError::StorageError(format!("Unknown type {}", type_name)))
    }

    /// Create a single-column index over the objects of a type
    pub fn create_index(&self, name: &str, type_name: &str, property: &str) -> QueryResult<IndexInfo> {
        let mut inner = self.inner.write();
        let binding = inner
            .types
            .get(type_name)
            .cloned()
            .ok_or_else(|| QueryError::StorageError(format!("Unknown type {}", type_name)))?;
        let column = binding.property_index(property).ok_or_else(|| {
            QueryError::StorageError(format!("Type {} has no property {}", type_name, property))
        })?;
        let info = IndexInfo {
            name: name.to_string(),
            type_name: type_name.to_string(),
            column,
            type_code: binding.property(column)?.type_code,
        };

        let mut entries = BTreeMap::new();
        for object in inner.objects.values() {
            if object.type_binding().name() == type_name {
                let key = index_entry_key(object.field(column)?, object.identity())?;
                entries.insert(key, object.clone());
            }
        }
        debug!("Created index {} on {}.{} with {} entries", name, type_name, property, entries.len());
        inner.indexes.insert(
            name.to_string(),
            MemoryIndex {
                info: info.clone(),
                entries,
            },
        );
        Ok(info)
    }

    /// Insert a new object and return it; identities start at 1
    pub fn insert(&self, type_name: &str, fields: Vec<Option<Value>>) -> QueryResult<ObjectRef> {
        let mut inner = self.inner.write();
        let binding = inner
            .types
            .get(type_name)
            .cloned()
            .ok_or_else(|| QueryError::StorageError(format!("Unknown type {}", type_name)))?;
        inner.next_identity += 1;
        let identity = inner.next_identity;
        let object = Arc::new(DbObject::new(identity, binding, fields)?);

        for index in inner.indexes.values_mut() {
            if index.info.type_name == type_name {
                let key = index_entry_key(object.field(index.info.column)?, identity)?;
                index.entries.insert(key, object.clone());
            }
        }
        inner.objects.insert(identity, object.clone());
        Ok(object)
    }

    /// Remove an object and its index entries
    pub fn delete(&self, identity: ObjectId) -> QueryResult<bool> {
        let mut inner = self.inner.write();
        let Some(object) = inner.objects.remove(&identity) else {
            return Ok(false);
        };
        for index in inner.indexes.values_mut() {
            if index.info.type_name == object.type_binding().name() {
                let key = index_entry_key(object.field(index.info.column)?, identity)?;
                index.entries.remove(&key);
            }
        }
        Ok(true)
    }

    pub fn object_count(&self) -> usize {
        self.inner.read().objects.len()
    }
}

impl ObjectStore for MemoryStore {
    fn scan(&self, type_name: &str, from: Option<ObjectId>) -> QueryResult<Vec<ObjectRef>> {
        let inner = self.inner.read();
        if !inner.types.contains_key(type_name) {
            return Err(QueryError::StorageError(format!("Unknown type {}", type_name)));
        }
        let start = from.map_or(Bound::Unbounded, Bound::Included);
        Ok(inner
            .objects
            .range((start, Bound::Unbounded))
            .map(|(_, object)| object)
            .filter(|object| object.type_binding().name() == type_name)
            .cloned()
            .collect())
    }

    fn index(&self, name: &str) -> QueryResult<IndexInfo> {
        self.inner
            .read()
            .indexes
            .get(name)
            .map(|index| index.info.clone())
            .ok_or_else(|| QueryError::StorageError(format!("Unknown index {}", name)))
    }

    fn index_range(&self, index_name: &str, range: &KeyRange) -> QueryResult<Vec<IndexEntry>> {
        let inner = self.inner.read();
        let index = inner
            .indexes
            .get(index_name)
            .ok_or_else(|| QueryError::StorageError(format!("Unknown index {}", index_name)))?;
        // BTreeMap::range panics on inverted bounds
        if range.is_empty() {
            return Ok(Vec::new());
        }
        Ok(index
            .entries
            .range((range.lower.clone(), range.upper.clone()))
            .map(|(key, object)| IndexEntry {
                key: key.clone(),
                object: object.clone(),
            })
            .collect())
    }

    fn lookup(&self, identity: ObjectId) -> QueryResult<Option<ObjectRef>> {
        Ok(self.inner.read().objects.get(&identity).cloned())
    }
}
