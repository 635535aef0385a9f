//! Aggregate extents of a whole dataset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::extent::Extent;
use crate::feature::FeatureBounds;

/// Union of every feature's bounds in a dataset.
///
/// Computed once while the index is built and immutable afterwards. Used to
/// answer "does this dataset intersect X" without touching the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetExtents {
    /// Longitudes constrained to (-180, 180]
    pub bbox: BoundingBox,
    /// `None` when no feature has a vertical extent
    pub vertical: Option<Extent<f64>>,
    /// Some features have no vertical extent and match any vertical range
    #[serde(default)]
    pub vertical_unbounded: bool,
    pub time: Extent<DateTime<Utc>>,
    pub feature_count: usize,
}

impl DatasetExtents {
    /// Compute the extents of a set of bounds. Returns `None` if empty.
    pub fn from_bounds<'a>(bounds: impl IntoIterator<Item = &'a FeatureBounds>) -> Option<Self> {
        let mut extents: Option<DatasetExtents> = None;
        for b in bounds {
            let pos = b.horizontal_position.constrained();
            match extents.as_mut() {
                None => {
                    extents = Some(DatasetExtents {
                        bbox: BoundingBox::new(pos.x, pos.y, pos.x, pos.y),
                        vertical: b.vertical_extent,
                        vertical_unbounded: b.vertical_extent.is_none(),
                        time: b.time_extent,
                        feature_count: 1,
                    });
                }
                Some(e) => {
                    e.bbox.include(&pos);
                    e.vertical = match (e.vertical, b.vertical_extent) {
                        (Some(a), Some(z)) => Some(a.union(&z)),
                        (a, z) => a.or(z),
                    };
                    e.vertical_unbounded |= b.vertical_extent.is_none();
                    e.time = e.time.union(&b.time_extent);
                    e.feature_count += 1;
                }
            }
        }
        extents
    }

    /// Whether any part of the dataset could fall inside the given window.
    ///
    /// `None` constraints are unbounded. A dataset holding any feature without
    /// a vertical extent matches every vertical constraint.
    pub fn intersects(
        &self,
        bbox: Option<&BoundingBox>,
        vertical: Option<&Extent<f64>>,
        time: Option<&Extent<DateTime<Utc>>>,
    ) -> bool {
        let h = bbox.map_or(true, |b| {
            let b = b.shifted_to_primary();
            self.bbox.intersects(&b)
                || (b.max_x > 180.0
                    && self
                        .bbox
                        .intersects(&BoundingBox::new(-180.0, b.min_y, b.max_x - 360.0, b.max_y)))
        });
        let z = self.vertical_unbounded
            || match (vertical, &self.vertical) {
                (Some(q), Some(own)) => q.intersects(own),
                _ => true,
            };
        let t = time.map_or(true, |q| q.intersects(&self.time));
        h && z && t
    }
}
