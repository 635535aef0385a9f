//! A queryable dataset of discrete point features.

use chrono::{DateTime, Utc};
use feature_common::{DatasetExtents, Feature, FeatureError, FeatureResult};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use storage::{DatasetId, FeatureId, FileIdentity, HandleCache};
use tracing::{debug, warn};

use crate::query::QueryWindow;
use crate::reader::DatasetReader;
use crate::resolver::{deduplicate_nearest, group_by_file};
use crate::rtree::SpatialIndex;

/// An indexed dataset backed by one or more files.
///
/// Cheap to clone; clones share the index, reader and handle cache. All
/// methods take `&self` and may be called from many threads at once.
pub struct PointDataset<R: DatasetReader> {
    id: DatasetId,
    index: Arc<SpatialIndex>,
    extents: Option<DatasetExtents>,
    identity: Arc<FileIdentity>,
    reader: Arc<R>,
    handles: Arc<HandleCache<R::Handle>>,
}

impl<R: DatasetReader> Clone for PointDataset<R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            index: self.index.clone(),
            extents: self.extents.clone(),
            identity: self.identity.clone(),
            reader: self.reader.clone(),
            handles: self.handles.clone(),
        }
    }
}

impl<R: DatasetReader> PointDataset<R> {
    pub fn new(
        id: DatasetId,
        index: SpatialIndex,
        extents: Option<DatasetExtents>,
        identity: FileIdentity,
        reader: Arc<R>,
        handles: Arc<HandleCache<R::Handle>>,
    ) -> Self {
        Self {
            id,
            index: Arc::new(index),
            extents,
            identity: Arc::new(identity),
            reader,
            handles,
        }
    }

    pub fn id(&self) -> &DatasetId {
        &self.id
    }

    /// Union of all feature bounds; `None` if the dataset has no features.
    pub fn extents(&self) -> Option<&DatasetExtents> {
        self.extents.as_ref()
    }

    pub fn variable_ids(&self) -> BTreeSet<String> {
        self.index.variable_ids()
    }

    pub fn feature_count(&self) -> usize {
        self.index.len()
    }

    pub fn feature_ids(&self) -> Vec<String> {
        self.index.all_feature_ids()
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn identity(&self) -> &FileIdentity {
        &self.identity
    }

    /// File a feature id is stored in.
    pub fn file_for(&self, feature_id: &str) -> FeatureResult<&Path> {
        let id: FeatureId = feature_id.parse()?;
        self.identity.resolve(&id)
    }

    /// Ids of all features intersecting the window.
    pub fn query(&self, window: &QueryWindow) -> FeatureResult<Vec<String>> {
        window.validate()?;
        if let Some(extents) = &self.extents {
            if !extents.intersects(window.bbox.as_ref(), window.vertical.as_ref(), window.time.as_ref()) {
                debug!(dataset = %self.id, "Window lies outside the dataset extents");
                return Ok(Vec::new());
            }
        }
        self.index.query(window)
    }

    /// Distinct features in the window, one per platform, each the nearest
    /// in time to `target`.
    pub fn query_nearest(
        &self,
        window: &QueryWindow,
        target: DateTime<Utc>,
    ) -> FeatureResult<Vec<Feature>> {
        let ids = self.query(window)?;
        let features = self.read_features(&ids, &window.variables)?;
        let total = features.len();
        let nearest = deduplicate_nearest(features, target);
        debug!(
            dataset = %self.id,
            candidates = ids.len(),
            read = total,
            returned = nearest.len(),
            "Resolved nearest features"
        );
        Ok(nearest)
    }

    /// Materialise features, reading each file's features in one batch.
    ///
    /// Features that fail to read are logged and dropped, and skipped records
    /// are left out silently. The call fails only when every id failed.
    /// Results keep the order of `ids`.
    pub fn read_features(
        &self,
        ids: &[String],
        variables: &BTreeSet<String>,
    ) -> FeatureResult<Vec<Feature>> {
        let mut failures = 0usize;
        let mut first_failure: Option<FeatureError> = None;
        let mut record_failure = |id: &str, e: FeatureError| {
            warn!(dataset = %self.id, feature = %id, error = %e, "Dropping feature that could not be read");
            failures += 1;
            first_failure.get_or_insert(e);
        };

        let mut parsed = Vec::with_capacity(ids.len());
        for id in ids {
            match id.parse::<FeatureId>() {
                Ok(fid) => parsed.push(fid),
                Err(e) => record_failure(id, e),
            }
        }

        let mut slots: Vec<Option<Feature>> = vec![None; parsed.len()];
        let mut skipped = 0usize;

        for (file_id, group) in group_by_file(&parsed) {
            let lease = self
                .identity
                .path(file_id)
                .ok_or_else(|| {
                    FeatureError::InvalidFeatureId(format!("unknown file id {}", file_id))
                })
                .and_then(|path| {
                    let location = path.to_string_lossy();
                    self.handles
                        .acquire(&location, false, |loc| self.reader.open_handle(loc))
                });
            let lease = match lease {
                Ok(lease) => lease,
                Err(e) => {
                    let message = e.to_string();
                    for (_, fid) in &group {
                        record_failure(
                            &fid.to_string(),
                            FeatureError::data_reading_msg(message.clone()),
                        );
                    }
                    continue;
                }
            };

            let batch: Vec<FeatureId> = group.iter().map(|(_, fid)| *fid).collect();
            let results = self.reader.read_features(&lease, &batch, variables);
            drop(lease);

            for ((slot, _), (fid, result)) in group.iter().zip(results) {
                match result {
                    Ok(Ok(feature)) => slots[*slot] = Some(feature),
                    Ok(Err(reason)) => {
                        debug!(dataset = %self.id, feature = %fid, %reason, "Skipping feature");
                        skipped += 1;
                    }
                    Err(e) => record_failure(&fid.to_string(), e),
                }
            }
        }

        if !ids.is_empty() && failures == ids.len() {
            let cause = first_failure
                .unwrap_or_else(|| FeatureError::data_reading_msg("no features could be read"));
            return Err(FeatureError::data_reading(
                format!(
                    "All {} candidate features of {} failed to read",
                    failures, self.id
                ),
                cause,
            ));
        }

        if failures > 0 || skipped > 0 {
            debug!(dataset = %self.id, failures, skipped, "Partial feature read");
        }
        Ok(slots.into_iter().flatten().collect())
    }
}
