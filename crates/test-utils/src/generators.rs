//! Test data generators for feature bounds and profile archives.
//!
//! These generators create predictable, verifiable test data patterns
//! that can be used across the test suite.

use chrono::{DateTime, Duration, Utc};
use feature_common::{Axis, Extent, FeatureBounds, HorizontalPosition};
use serde_json::json;
use std::collections::BTreeSet;

use crate::fixtures::{time::t0, variables};

/// Creates feature bounds on a regular longitude/latitude grid.
///
/// Feature `i` sits at column `i % nx`, row `i / nx`, with id `0:i`. Every
/// feature covers depths 0..100 at `time` and measures temperature.
///
/// # Example
///
/// ```
/// use test_utils::create_bounds_grid;
///
/// let grid = create_bounds_grid(10, 5, 1.0, test_utils::time::t0());
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[11].horizontal_position.x, 1.0);
/// assert_eq!(grid[11].horizontal_position.y, 1.0);
/// ```
pub fn create_bounds_grid(nx: usize, ny: usize, spacing: f64, time: DateTime<Utc>) -> Vec<FeatureBounds> {
    (0..nx * ny)
        .map(|i| {
            let x = (i % nx) as f64 * spacing;
            let y = (i / nx) as f64 * spacing;
            FeatureBounds::new(
                format!("0:{}", i),
                HorizontalPosition::new(x, y),
                Extent::new(Axis::Vertical, 0.0, 100.0).ok(),
                Extent::point(time),
                BTreeSet::from([variables::TEMP.to_string()]),
            )
            .expect("grid bounds are valid")
        })
        .collect()
}

/// Creates reproducible pseudo-random feature bounds.
///
/// Positions cover the whole globe, times span ten days either side of
/// the reference time, one feature in five has no vertical extent and
/// every third feature also measures salinity. Ids are `file:record` with
/// four files.
pub fn create_scattered_bounds(count: usize, seed: u32) -> Vec<FeatureBounds> {
    (0..count)
        .map(|i| {
            let h = |k: u32| simple_hash(i as u32, k, seed);
            let x = (h(0) % 36_000) as f64 / 100.0 - 180.0;
            let y = (h(1) % 18_000) as f64 / 100.0 - 90.0;
            let vertical = if h(2) % 5 == 0 {
                None
            } else {
                let low = (h(3) % 2000) as f64;
                let high = low + (h(4) % 500) as f64;
                Extent::new(Axis::Vertical, low, high).ok()
            };
            let start = t0() + Duration::minutes((h(5) % 28_800) as i64 - 14_400);
            let end = start + Duration::minutes((h(6) % 180) as i64);
            let time = Extent::new(Axis::Time, start, end).expect("end follows start");

            let mut vars = BTreeSet::from([variables::TEMP.to_string()]);
            if i % 3 == 0 {
                vars.insert(variables::PSAL.to_string());
            }

            FeatureBounds::new(
                format!("{}:{}", i % 4, i / 4),
                HorizontalPosition::new(x, y),
                vertical,
                time,
                vars,
            )
            .expect("scattered bounds are valid")
        })
        .collect()
}

/// Simple deterministic hash for reproducible test data.
fn simple_hash(x: u32, y: u32, seed: u32) -> u32 {
    let mut h = seed;
    h = h.wrapping_mul(31).wrapping_add(x);
    h = h.wrapping_mul(31).wrapping_add(y);
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;
    h
}

/// One profile to be written to a JSON-lines archive.
#[derive(Debug, Clone)]
pub struct ProfileFixture {
    pub platform: String,
    pub lon: Option<f64>,
    pub lat: Option<f64>,
    pub time: Option<DateTime<Utc>>,
    pub depths: Vec<f64>,
}

impl ProfileFixture {
    /// A profile at four standard depths.
    pub fn new(platform: &str, lon: f64, lat: f64, time: DateTime<Utc>) -> Self {
        Self {
            platform: platform.to_string(),
            lon: Some(lon),
            lat: Some(lat),
            time: Some(time),
            depths: vec![5.0, 10.0, 20.0, 50.0],
        }
    }

    pub fn with_depths(mut self, depths: &[f64]) -> Self {
        self.depths = depths.to_vec();
        self
    }

    pub fn without_position(mut self) -> Self {
        self.lon = None;
        self.lat = None;
        self
    }

    /// Serialise as one archive line.
    ///
    /// Temperature falls and salinity rises with depth so values can be
    /// checked after a read.
    pub fn to_json_line(&self) -> String {
        let temp: Vec<f64> = self.depths.iter().map(|d| 20.0 - d / 10.0).collect();
        let psal: Vec<f64> = self.depths.iter().map(|d| 35.0 + d / 1000.0).collect();
        let mut values = serde_json::Map::new();
        values.insert(variables::TEMP.to_string(), json!(temp));
        values.insert(variables::PSAL.to_string(), json!(psal));
        json!({
            "platform": self.platform,
            "lon": self.lon,
            "lat": self.lat,
            "time": self.time.map(|t| t.to_rfc3339()),
            "depths": self.depths,
            "values": values,
        })
        .to_string()
    }
}

/// Creates the contents of a profile archive file.
pub fn create_profile_archive(profiles: &[ProfileFixture]) -> String {
    let mut out = String::new();
    for p in profiles {
        out.push_str(&p.to_json_line());
        out.push('\n');
    }
    out
}
