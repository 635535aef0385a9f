//! Spatio-temporal query windows.

use chrono::{DateTime, Utc};
use feature_common::{Axis, BoundingBox, Extent, FeatureResult};
use std::collections::BTreeSet;

/// A range query over the horizontal, vertical and temporal axes.
///
/// `None` on any axis means unbounded. A non-empty `variables` set restricts
/// results to features measuring every listed variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryWindow {
    pub bbox: Option<BoundingBox>,
    pub vertical: Option<Extent<f64>>,
    pub time: Option<Extent<DateTime<Utc>>>,
    pub variables: BTreeSet<String>,
}

impl QueryWindow {
    /// A window matching every feature.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_bbox(mut self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> FeatureResult<Self> {
        self.bbox = Some(BoundingBox::try_new(min_x, min_y, max_x, max_y)?);
        Ok(self)
    }

    pub fn with_vertical(mut self, low: f64, high: f64) -> FeatureResult<Self> {
        self.vertical = Some(Extent::new(Axis::Vertical, low, high)?);
        Ok(self)
    }

    pub fn with_time(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> FeatureResult<Self> {
        self.time = Some(Extent::new(Axis::Time, start, end)?);
        Ok(self)
    }

    pub fn with_variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = variables.into_iter().map(Into::into).collect();
        self
    }

    /// Check the horizontal box, which may have been assigned directly.
    pub fn validate(&self) -> FeatureResult<()> {
        if let Some(b) = &self.bbox {
            BoundingBox::try_new(b.min_x, b.min_y, b.max_x, b.max_y)?;
        }
        Ok(())
    }

    /// Longitude ranges to search, each within [-180, 180].
    ///
    /// The box is shifted so that `min_x` lies in (-180, 180]. A box crossing
    /// the antimeridian becomes two ranges; a box a full turn wide or more
    /// covers everything.
    pub(crate) fn longitude_ranges(&self) -> Vec<(f64, f64)> {
        let Some(bbox) = &self.bbox else {
            return vec![(f64::NEG_INFINITY, f64::INFINITY)];
        };
        if bbox.width() >= 360.0 {
            return vec![(-180.0, 180.0)];
        }
        let b = bbox.shifted_to_primary();
        if b.max_x > 180.0 {
            vec![(b.min_x, 180.0), (-180.0, b.max_x - 360.0)]
        } else {
            vec![(b.min_x, b.max_x)]
        }
    }
}
