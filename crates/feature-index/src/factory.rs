//! Factory for creating indexed datasets with a shared handle cache.
//!
//! The `PointDatasetFactory` manages:
//! - A shared `HandleCache` across all datasets it creates
//! - The directory of persisted indexes
//! - One build lock per dataset id, so concurrent requests for the same
//!   dataset never rebuild its index twice
//!
//! # Example
//!
//! ```rust,ignore
//! use feature_index::{IndexConfig, PointDatasetFactory, ProfileArchiveReader};
//!
//! let factory = PointDatasetFactory::new(IndexConfig::from_env(), ProfileArchiveReader)?;
//! let dataset = factory.create_dataset("en4", "/data/en4/*.jsonl", false)?;
//! let features = dataset.query_nearest(&window, target)?;
//! ```

use feature_common::{DatasetExtents, FeatureBounds, FeatureError, FeatureResult};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use storage::{expand, DatasetId, FileIdentity, HandleCache, HandleCacheStats};
use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::dataset::PointDataset;
use crate::reader::DatasetReader;
use crate::rtree::SpatialIndex;
use crate::store::{IndexStore, LoadOutcome, PersistedIndex};

/// Creates [`PointDataset`]s, reusing persisted indexes when still valid.
pub struct PointDatasetFactory<R: DatasetReader> {
    config: IndexConfig,
    reader: Arc<R>,
    handles: Arc<HandleCache<R::Handle>>,
    store: IndexStore,
    build_locks: Mutex<HashMap<DatasetId, Arc<Mutex<()>>>>,
}

impl<R: DatasetReader> PointDatasetFactory<R> {
    /// Create a factory with its own handle cache.
    pub fn new(config: IndexConfig, reader: R) -> FeatureResult<Self> {
        config.validate().map_err(FeatureError::Config)?;
        let handles = Arc::new(HandleCache::from_config(&config.handle_cache_config())?);
        Self::with_handle_cache(config, reader, handles)
    }

    /// Create a factory sharing an existing handle cache.
    pub fn with_handle_cache(
        config: IndexConfig,
        reader: R,
        handles: Arc<HandleCache<R::Handle>>,
    ) -> FeatureResult<Self> {
        config.validate().map_err(FeatureError::Config)?;
        let store = IndexStore::new(config.working_dir.clone());
        Ok(Self {
            config,
            reader: Arc::new(reader),
            handles,
            store,
            build_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn handle_cache(&self) -> &Arc<HandleCache<R::Handle>> {
        &self.handles
    }

    /// Get cache statistics for monitoring.
    pub fn cache_stats(&self) -> HandleCacheStats {
        self.handles.stats()
    }

    /// Open the dataset at `location`, loading or building its index.
    ///
    /// The persisted index is reused if it was built from exactly the files
    /// `location` currently expands to and `force_refresh` is false.
    /// Otherwise every file is rescanned and the new index is persisted on a
    /// best-effort basis. An index missing files that failed to scan is
    /// served but not persisted, so the next call scans them again.
    pub fn create_dataset(
        &self,
        id: &str,
        location: &str,
        force_refresh: bool,
    ) -> FeatureResult<PointDataset<R>> {
        let id = DatasetId::new(id)?;
        let lock = self.build_lock(&id);
        let _guard = lock.lock();

        let files = expand(location)?;
        if files.is_empty() {
            return Err(FeatureError::NoFiles(location.to_string()));
        }

        let persisted = match self.store.load(&id, &files, force_refresh) {
            LoadOutcome::Fresh(persisted) => *persisted,
            outcome => {
                debug!(dataset = %id, ?outcome, "Rebuilding index");
                let (persisted, failed) = self.build_index(&id, files, force_refresh)?;
                if failed == 0 {
                    self.store.save(&id, &persisted);
                } else {
                    warn!(dataset = %id, failed_files = failed, "Not persisting incomplete index");
                }
                persisted
            }
        };

        Ok(PointDataset::new(
            id,
            persisted.index,
            persisted.extents,
            persisted.identity,
            self.reader.clone(),
            self.handles.clone(),
        ))
    }

    fn build_lock(&self, id: &DatasetId) -> Arc<Mutex<()>> {
        self.build_locks
            .lock()
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Scan every file and build a fresh index, returning it with the number
    /// of files that could not be scanned.
    fn build_index(
        &self,
        id: &DatasetId,
        files: Vec<PathBuf>,
        force_refresh: bool,
    ) -> FeatureResult<(PersistedIndex, usize)> {
        let start = Instant::now();
        let identity = FileIdentity::from_files(&files);
        let targets: Vec<(u32, String)> = identity
            .iter()
            .map(|(file_id, path)| (file_id, path.to_string_lossy().into_owned()))
            .collect();

        let scan = |(file_id, location): &(u32, String)| {
            let result = self
                .handles
                .acquire(location, force_refresh, |loc| self.reader.open_handle(loc))
                .and_then(|lease| self.reader.scan_bounds(&lease, *file_id));
            (*file_id, result)
        };
        let scans: Vec<(u32, FeatureResult<Vec<FeatureBounds>>)> = if self.config.parallel_scan {
            targets.par_iter().map(scan).collect()
        } else {
            targets.iter().map(scan).collect()
        };

        let mut bounds = Vec::new();
        let mut failed = 0usize;
        let mut last_error = None;
        for ((_, location), (_, result)) in targets.iter().zip(scans) {
            match result {
                Ok(file_bounds) => {
                    debug!(location = %location, count = file_bounds.len(), "Scanned file");
                    bounds.extend(file_bounds);
                }
                Err(e) => {
                    warn!(location = %location, error = %e, "Skipping file that could not be scanned");
                    failed += 1;
                    last_error = Some(e);
                }
            }
        }

        if failed == targets.len() {
            let cause = last_error
                .unwrap_or_else(|| FeatureError::data_reading_msg("no files were scanned"));
            return Err(FeatureError::data_reading(
                format!("None of the {} files of {} could be read", failed, id),
                cause,
            ));
        }

        let extents = DatasetExtents::from_bounds(&bounds);
        let mut index = SpatialIndex::new(self.config.node_capacity);
        index.add_features(bounds)?;

        info!(
            dataset = %id,
            reader = self.reader.format_name(),
            files = targets.len(),
            failed_files = failed,
            features = index.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Built index"
        );

        let persisted = PersistedIndex {
            files,
            extents,
            identity,
            index,
        };
        Ok((persisted, failed))
    }
}
