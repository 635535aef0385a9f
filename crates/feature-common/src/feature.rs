//! Discrete features and their indexable bounds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::bbox::HorizontalPosition;
use crate::error::{FeatureError, FeatureResult};
use crate::extent::{Axis, Extent};

/// Lightweight spatio-temporal summary of one discrete feature.
///
/// Produced once per file scan and never mutated; the spatial index is built
/// from these before any feature is fully read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBounds {
    pub id: String,
    pub horizontal_position: HorizontalPosition,
    /// `None` for surface-only features
    pub vertical_extent: Option<Extent<f64>>,
    pub time_extent: Extent<DateTime<Utc>>,
    pub variable_ids: BTreeSet<String>,
}

impl FeatureBounds {
    /// Create feature bounds. An id and a finite horizontal position are required.
    pub fn new(
        id: impl Into<String>,
        horizontal_position: HorizontalPosition,
        vertical_extent: Option<Extent<f64>>,
        time_extent: Extent<DateTime<Utc>>,
        variable_ids: BTreeSet<String>,
    ) -> FeatureResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(FeatureError::InvalidFeatureId(
                "feature id must not be empty".to_string(),
            ));
        }
        if !horizontal_position.is_valid() {
            return Err(FeatureError::InvalidFeatureId(format!(
                "{} has no valid horizontal position",
                id
            )));
        }
        Ok(Self {
            id,
            horizontal_position,
            vertical_extent,
            time_extent,
            variable_ids,
        })
    }

    /// Bounds of an already materialised feature.
    pub fn from_feature(feature: &Feature) -> FeatureResult<Self> {
        let vertical_extent = match &feature.domain {
            FeatureDomain::Profile { depths, .. } => {
                depths.iter().fold(None::<Extent<f64>>, |acc, &z| {
                    Some(match acc {
                        None => Extent::point(z),
                        Some(mut e) => {
                            e.include(z);
                            e
                        }
                    })
                })
            }
            FeatureDomain::PointSeries { elevation, .. } => elevation.map(Extent::point),
        };
        let time_extent = feature.time_extent().ok_or_else(|| {
            FeatureError::InvalidFeatureId(format!("{} has no time values", feature.id))
        })?;
        Self::new(
            feature.id.clone(),
            feature.position,
            vertical_extent,
            time_extent,
            feature.values.keys().cloned().collect(),
        )
    }
}

/// The domain a feature's values are measured on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureDomain {
    /// A vertical profile sampled at a single instant.
    Profile {
        time: DateTime<Utc>,
        depths: Vec<f64>,
    },
    /// A time series at a fixed point.
    PointSeries {
        times: Vec<DateTime<Utc>>,
        elevation: Option<f64>,
    },
}

/// A fully materialised discrete observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Index id (`fileId:record`)
    pub id: String,
    /// Display identity of the physical platform (e.g. a float number)
    pub name: String,
    pub position: HorizontalPosition,
    pub domain: FeatureDomain,
    /// Values per variable id, aligned with the domain; `None` marks missing data
    pub values: BTreeMap<String, Vec<Option<f64>>>,
}

impl Feature {
    /// Temporal extent covered by this feature.
    pub fn time_extent(&self) -> Option<Extent<DateTime<Utc>>> {
        match &self.domain {
            FeatureDomain::Profile { time, .. } => Some(Extent::point(*time)),
            FeatureDomain::PointSeries { times, .. } => {
                let low = times.iter().min()?;
                let high = times.iter().max()?;
                Extent::new(Axis::Time, *low, *high).ok()
            }
        }
    }

    /// Smallest absolute distance, in milliseconds, between any of this
    /// feature's times and `target`.
    ///
    /// Returns `i64::MAX` for a series with no times so that it never wins
    /// a nearest-time comparison.
    pub fn time_offset_millis(&self, target: DateTime<Utc>) -> i64 {
        let offset = |t: &DateTime<Utc>| (*t - target).num_milliseconds().saturating_abs();
        match &self.domain {
            FeatureDomain::Profile { time, .. } => offset(time),
            FeatureDomain::PointSeries { times, .. } => {
                times.iter().map(offset).min().unwrap_or(i64::MAX)
            }
        }
    }

    pub fn variable_ids(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Why a record was deliberately not turned into a feature.
///
/// A skip is not a failure: it never counts towards the "every candidate
/// failed" condition when resolving a query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("vertical axis is not strictly monotonic")]
    NonMonotonicVertical,

    #[error("record has no valid horizontal position")]
    MissingPosition,

    #[error("record has no valid time")]
    MissingTime,

    #[error("record has no levels")]
    NoLevels,

    #[error("record has none of the requested variables")]
    NoRequestedVariables,
}

/// Outcome of materialising a single record.
pub type FeatureRead = Result<Feature, SkipReason>;
