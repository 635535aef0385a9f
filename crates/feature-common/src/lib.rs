//! Common types shared by the feature indexing crates and services.

pub mod bbox;
pub mod domain;
pub mod error;
pub mod extent;
pub mod feature;
pub mod time;

pub use bbox::{BboxParseError, BoundingBox, HorizontalPosition};
pub use domain::DatasetExtents;
pub use error::{FeatureError, FeatureResult};
pub use extent::{Axis, Extent};
pub use feature::{Feature, FeatureBounds, FeatureDomain, FeatureRead, SkipReason};
pub use time::{parse_iso8601, parse_time_extent, TimeParseError};
