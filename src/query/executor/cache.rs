// Enumerator Cache
//
// Pools idle enumerator trees per query shape (unique query id). Shapes are
// kept in least-recently-used order; when the cache is full the oldest
// shape is dropped together with its pooled instances.

use linked_hash_map::LinkedHashMap;
use log::debug;
use parking_lot::Mutex;

use crate::common::types::UniqueQueryId;
use crate::query::executor::config::ExecutionConfig;
use crate::query::executor::enumerator::ExecutionEnumerator;

type Pool = Vec<Box<dyn ExecutionEnumerator>>;

#[derive(Debug)]
pub struct EnumeratorCache {
    max_shapes: usize,
    max_per_shape: usize,
    pools: Mutex<LinkedHashMap<UniqueQueryId, Pool>>,
}

impl EnumeratorCache {
    pub fn new(config: &ExecutionConfig) -> Self {
        Self::with_limits(config.cache_max_shapes, config.cache_max_per_shape)
    }

    pub fn with_limits(max_shapes: usize, max_per_shape: usize) -> Self {
        EnumeratorCache {
            max_shapes,
            max_per_shape,
            pools: Mutex::new(LinkedHashMap::new()),
        }
    }

    /// Take an idle instance of the shape, if any
    pub fn checkout(&self, unique_query_id: UniqueQueryId) -> Option<Box<dyn ExecutionEnumerator>> {
        let mut pools = self.pools.lock();
        let enumerator = pools.get_refresh(&unique_query_id)?.pop();
        if enumerator.is_some() {
            debug!("Reusing cached enumerator for query {}", unique_query_id);
        }
        enumerator
    }

    /// Return an idle instance; dropped when its pool is full
    pub fn checkin(&self, enumerator: Box<dyn ExecutionEnumerator>) {
        let unique_query_id = enumerator.unique_query_id();
        let mut pools = self.pools.lock();
        if !pools.contains_key(&unique_query_id) {
            if self.max_shapes == 0 {
                return;
            }
            while pools.len() >= self.max_shapes {
                if let Some((evicted, pool)) = pools.pop_front() {
                    debug!("Evicting {} cached enumerators of query {}", pool.len(), evicted);
                }
            }
            pools.insert(unique_query_id, Vec::new());
        }
        if let Some(pool) = pools.get_refresh(&unique_query_id) {
            if pool.len() < self.max_per_shape {
                pool.push(enumerator);
                debug!("Cached enumerator for query {} ({} idle)", unique_query_id, pool.len());
            }
        }
    }

    /// Idle instances across all shapes
    pub fn len(&self) -> usize {
        self.pools.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape_count(&self) -> usize {
        self.pools.lock().len()
    }

    pub fn clear(&self) {
        self.pools.lock().clear();
    }
}
