//! Closed one-dimensional ranges.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FeatureError, FeatureResult};

/// The axes a query or feature envelope is constrained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    Longitude,
    Latitude,
    Vertical,
    Time,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::Longitude => "longitude",
            Axis::Latitude => "latitude",
            Axis::Vertical => "vertical",
            Axis::Time => "time",
        };
        f.write_str(name)
    }
}

/// A closed interval `[low, high]`.
///
/// An extent with `low == high` is a single value. Construction through
/// [`Extent::new`] rejects inverted ranges, so every extent in circulation
/// satisfies `low <= high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent<T> {
    low: T,
    high: T,
}

impl<T: PartialOrd + Copy + fmt::Debug> Extent<T> {
    /// Create an extent, failing with `InvalidQueryRange` if `low > high`.
    ///
    /// Incomparable values (NaN) are rejected the same way.
    pub fn new(axis: Axis, low: T, high: T) -> FeatureResult<Self> {
        match low.partial_cmp(&high) {
            Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal) => {
                Ok(Self { low, high })
            }
            _ => Err(FeatureError::invalid_range(
                axis,
                format!("{:?}", low),
                format!("{:?}", high),
            )),
        }
    }

    /// An extent covering a single value.
    pub fn point(value: T) -> Self {
        Self {
            low: value,
            high: value,
        }
    }

    pub fn low(&self) -> T {
        self.low
    }

    pub fn high(&self) -> T {
        self.high
    }

    /// Closed-interval intersection test.
    pub fn intersects(&self, other: &Extent<T>) -> bool {
        self.low <= other.high && other.low <= self.high
    }

    pub fn contains(&self, value: T) -> bool {
        value >= self.low && value <= self.high
    }

    /// Smallest extent covering both `self` and `other`.
    pub fn union(&self, other: &Extent<T>) -> Extent<T> {
        let low = if other.low < self.low { other.low } else { self.low };
        let high = if other.high > self.high { other.high } else { self.high };
        Extent { low, high }
    }

    /// Extend this extent to include `value`.
    pub fn include(&mut self, value: T) {
        if value < self.low {
            self.low = value;
        }
        if value > self.high {
            self.high = value;
        }
    }
}
