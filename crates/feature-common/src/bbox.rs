//! Bounding box and horizontal position types.

use serde::{Deserialize, Serialize};

use crate::error::{FeatureError, FeatureResult};
use crate::extent::Axis;

/// A WGS84 longitude/latitude point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizontalPosition {
    /// Longitude in degrees
    pub x: f64,
    /// Latitude in degrees
    pub y: f64,
}

impl HorizontalPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// True if both coordinates are finite numbers.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// The same position with its longitude constrained to (-180, 180].
    pub fn constrained(&self) -> Self {
        Self {
            x: constrain_longitude_180(self.x),
            y: self.y,
        }
    }
}

/// Constrain a longitude to the range (-180, 180].
pub fn constrain_longitude_180(lon: f64) -> f64 {
    if !lon.is_finite() {
        return lon;
    }
    let mut value = lon % 360.0;
    if value > 180.0 {
        value -= 360.0;
    } else if value <= -180.0 {
        value += 360.0;
    }
    value
}

/// A geographic bounding box in WGS84 degrees.
///
/// `max_x` may exceed 180 for boxes that cross the antimeridian
/// (e.g. `170,-10,190,10`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates without validation.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Create a bounding box, rejecting inverted or non-finite ranges.
    pub fn try_new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> FeatureResult<Self> {
        for v in [min_x, min_y, max_x, max_y] {
            if !v.is_finite() {
                return Err(FeatureError::InvalidBbox(format!(
                    "non-finite coordinate {}",
                    v
                )));
            }
        }
        if min_x > max_x {
            return Err(FeatureError::invalid_range(Axis::Longitude, min_x, max_x));
        }
        if min_y > max_y {
            return Err(FeatureError::invalid_range(Axis::Latitude, min_y, max_y));
        }
        Ok(Self::new(min_x, min_y, max_x, max_y))
    }

    /// Global coverage.
    pub fn global() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }

    /// Parse a bbox query parameter: "minx,miny,maxx,maxy"
    pub fn from_query_string(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let mut values = [0.0f64; 4];
        for (value, part) in values.iter_mut().zip(&parts) {
            *value = part
                .parse()
                .map_err(|_| BboxParseError::InvalidNumber(part.to_string()))?;
        }

        Self::try_new(values[0], values[1], values[2], values[3])
            .map_err(|e| BboxParseError::Invalid(e.to_string()))
    }

    /// Width of the bounding box in degrees.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in degrees.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Closed-interval intersection test: boxes sharing an edge intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Check if a point is contained within this bbox (edges inclusive).
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Grow this box to include the given position.
    pub fn include(&mut self, pos: &HorizontalPosition) {
        self.min_x = self.min_x.min(pos.x);
        self.min_y = self.min_y.min(pos.y);
        self.max_x = self.max_x.max(pos.x);
        self.max_y = self.max_y.max(pos.y);
    }

    /// Shift the box by whole turns so that `min_x` lies in (-180, 180].
    ///
    /// Both sides move by the same amount, so the width is preserved and
    /// `max_x` may end up above 180.
    pub fn shifted_to_primary(&self) -> Self {
        let mut min_x = self.min_x;
        let mut max_x = self.max_x;
        while min_x > 180.0 {
            min_x -= 360.0;
            max_x -= 360.0;
        }
        while min_x <= -180.0 {
            min_x += 360.0;
            max_x += 360.0;
        }
        Self::new(min_x, self.min_y, max_x, self.max_y)
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::global()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid BBOX format: {0}. Expected 'minx,miny,maxx,maxy'")]
    InvalidFormat(String),

    #[error("Invalid number in BBOX: {0}")]
    InvalidNumber(String),

    #[error("Invalid BBOX: {0}")]
    Invalid(String),
}

impl From<BboxParseError> for FeatureError {
    fn from(err: BboxParseError) -> Self {
        FeatureError::InvalidBbox(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox() {
        let bbox = BoundingBox::from_query_string("-125.0,24.0,-66.0,50.0").unwrap();
        assert_eq!(bbox.min_x, -125.0);
        assert_eq!(bbox.min_y, 24.0);
        assert_eq!(bbox.max_x, -66.0);
        assert_eq!(bbox.max_y, 50.0);
    }

    #[test]
    fn test_intersects_shared_edge() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(10.0, 10.0, 15.0, 15.0);
        let c = BoundingBox::new(20.0, 20.0, 30.0, 30.0);

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_constrain_longitude() {
        assert_eq!(constrain_longitude_180(190.0), -170.0);
        assert_eq!(constrain_longitude_180(-180.0), 180.0);
        assert_eq!(constrain_longitude_180(180.0), 180.0);
        assert_eq!(constrain_longitude_180(540.0), 180.0);
        assert_eq!(constrain_longitude_180(-190.0), 170.0);
        assert_eq!(constrain_longitude_180(12.5), 12.5);
    }

    #[test]
    fn test_shifted_to_primary() {
        let bbox = BoundingBox::new(390.0, 70.0, 392.0, 72.0).shifted_to_primary();
        assert_eq!(bbox.min_x, 30.0);
        assert_eq!(bbox.max_x, 32.0);

        let bbox = BoundingBox::new(-190.0, 0.0, -170.0, 1.0).shifted_to_primary();
        assert_eq!(bbox.min_x, 170.0);
        assert_eq!(bbox.max_x, 190.0);
    }
}
