//! Spatio-temporal indexing and retrieval of discrete features.
//!
//! This crate indexes irregularly distributed point features (vertical
//! profiles, point time series) by their bounds and answers
//! "nearest in time" queries over them. It provides:
//!
//! - **Spatial index**: a bulk-loaded R-tree over longitude, latitude,
//!   vertical and time
//! - **Persistence**: a checksummed block format that lets an index be
//!   reused until the dataset's file set changes
//! - **Query resolution**: batched per-file reads through a shared handle
//!   cache, with duplicate platforms collapsed to the nearest in time
//!
//! # Architecture
//!
//! ```text
//! create_dataset(id, location)
//!      │
//!      ├─► expand(location) ──► sorted file list
//!      │
//!      ├─► IndexStore::load ──► Fresh: reuse
//!      │                    └─► Missing/Stale/Corrupt: scan files, build, save
//!      ▼
//! PointDataset::query_nearest(window, target)
//!      │
//!      ├─► SpatialIndex::query ──► candidate ids
//!      │
//!      ├─► group ids by file ──► HandleCache::acquire ──► DatasetReader::read_features
//!      │
//!      └─► one feature per platform, nearest to target
//! ```

pub mod config;
pub mod dataset;
pub mod factory;
pub mod profile_archive;
pub mod query;
pub mod reader;
pub mod resolver;
pub mod rtree;
pub mod store;

// Re-export commonly used types at crate root
pub use config::IndexConfig;
pub use dataset::PointDataset;
pub use factory::PointDatasetFactory;
pub use profile_archive::{ProfileArchiveHandle, ProfileArchiveReader, ProfileRecord};
pub use query::QueryWindow;
pub use reader::DatasetReader;
pub use resolver::deduplicate_nearest;
pub use rtree::SpatialIndex;
pub use store::{IndexStore, LoadOutcome, PersistedIndex, FORMAT_VERSION};
