//! Configuration for index building and dataset access.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use storage::HandleCacheConfig;

/// Configuration for the feature index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory where persisted indexes are written.
    pub working_dir: PathBuf,

    /// Maximum number of dataset handles kept open.
    pub handle_cache_size: usize,

    /// Maximum number of children per R-tree node.
    pub node_capacity: usize,

    /// Scan files in parallel while rebuilding an index.
    pub parallel_scan: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("./index"),
            handle_cache_size: 10,
            node_capacity: 16,
            parallel_scan: true,
        }
    }
}

impl IndexConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FEATURE_INDEX_DIR") {
            config.working_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("FEATURE_HANDLE_CACHE_SIZE") {
            if let Ok(size) = val.parse() {
                config.handle_cache_size = size;
            }
        }

        if let Ok(val) = std::env::var("FEATURE_INDEX_NODE_CAPACITY") {
            if let Ok(capacity) = val.parse() {
                config.node_capacity = capacity;
            }
        }

        if let Ok(val) = std::env::var("FEATURE_INDEX_PARALLEL_SCAN") {
            config.parallel_scan = val.to_lowercase() == "true" || val == "1";
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.working_dir.as_os_str().is_empty() {
            return Err("working_dir must not be empty".to_string());
        }

        if self.node_capacity < 2 {
            return Err("node_capacity must be >= 2".to_string());
        }

        self.handle_cache_config().validate()
    }

    pub fn handle_cache_config(&self) -> HandleCacheConfig {
        HandleCacheConfig {
            capacity: self.handle_cache_size,
        }
    }
}
