// Execution Configuration

use std::sync::Arc;

use once_cell::sync::Lazy;

/// Configuration shared by every enumerator of a query
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Compile scan filters into programs when possible
    pub enable_codegen: bool,

    /// Maximum number of query shapes kept in an enumerator cache
    pub cache_max_shapes: usize,

    /// Maximum number of idle enumerators kept per shape
    pub cache_max_per_shape: usize,

    /// Return the row an offset key points at instead of the row after it
    pub stay_at_offset_key: bool,

    /// Replay offset keys at all
    pub use_offset_key: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            enable_codegen: true,
            cache_max_shapes: 64,
            cache_max_per_shape: 8,
            stay_at_offset_key: false,
            use_offset_key: true,
        }
    }
}

static DEFAULT_CONFIG: Lazy<Arc<ExecutionConfig>> = Lazy::new(|| Arc::new(ExecutionConfig::default()));

impl ExecutionConfig {
    /// Shared handle to the default configuration
    pub fn shared_default() -> Arc<ExecutionConfig> {
        DEFAULT_CONFIG.clone()
    }
}
