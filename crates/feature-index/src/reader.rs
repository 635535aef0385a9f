//! The capability a dataset format must provide to be indexed and queried.

use feature_common::{FeatureBounds, FeatureRead, FeatureResult};
use std::collections::BTreeSet;
use storage::{CachedHandle, FeatureId};

/// Format-specific access to a dataset's files.
///
/// Each concrete format implements this once; the index, cache and query
/// logic never look inside a file themselves. Implementations must allow
/// concurrent calls on the same handle, typically by guarding the handle's
/// internal state with a mutex.
pub trait DatasetReader: Send + Sync + 'static {
    type Handle: CachedHandle;

    /// Short name of the format, used in logs.
    fn format_name(&self) -> &'static str;

    /// Open a handle on one file or remote location. May be slow.
    fn open_handle(&self, location: &str) -> FeatureResult<Self::Handle>;

    /// Bounds of every indexable feature in the handle's file.
    ///
    /// `file_id` must be used as the prefix of each bounds id
    /// (`fileId:record`). Records that cannot be indexed are left out.
    fn scan_bounds(&self, handle: &Self::Handle, file_id: u32) -> FeatureResult<Vec<FeatureBounds>>;

    /// Materialise one feature restricted to `variables` (all when empty).
    ///
    /// `Ok(Err(reason))` reports a record that was deliberately skipped;
    /// `Err` is a real read failure.
    fn read_feature(
        &self,
        handle: &Self::Handle,
        id: &FeatureId,
        variables: &BTreeSet<String>,
    ) -> FeatureResult<FeatureRead>;

    /// Materialise several features from the same handle, in order.
    fn read_features(
        &self,
        handle: &Self::Handle,
        ids: &[FeatureId],
        variables: &BTreeSet<String>,
    ) -> Vec<(FeatureId, FeatureResult<FeatureRead>)> {
        ids.iter()
            .map(|id| (*id, self.read_feature(handle, id, variables)))
            .collect()
    }
}
