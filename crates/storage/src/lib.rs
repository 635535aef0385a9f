//! Storage-side plumbing for feature datasets.
//!
//! Provides:
//! - A bounded LRU cache of open dataset handles
//! - Expansion of location strings (paths, glob patterns, remote URLs)
//!   into canonical file lists
//! - Stable file-id routing tables and the `fileId:record` feature id codec

pub mod handle_cache;
pub mod identity;
pub mod location;

pub use handle_cache::{CachedHandle, HandleCache, HandleCacheConfig, HandleCacheStats, HandleLease};
pub use identity::{DatasetId, FeatureId, FileIdentity};
pub use location::{expand, is_remote, same_file_set};
