//! Common test fixtures for feature indexing tests.
//!
//! This module provides pre-defined test data that represents common
//! scenarios when indexing point observations.

/// Common bounding box definitions for testing.
pub mod bbox {
    /// Global bounding box (-180 to 180, -90 to 90)
    pub const GLOBAL: (f64, f64, f64, f64) = (-180.0, -90.0, 180.0, 90.0);

    /// North Atlantic, where most of the scenario profiles live
    pub const NORTH_ATLANTIC: (f64, f64, f64, f64) = (-60.0, 20.0, 0.0, 65.0);

    /// Crosses the antimeridian, written with max_x > 180
    pub const PACIFIC: (f64, f64, f64, f64) = (160.0, -50.0, 220.0, 50.0);

    /// Invalid bbox (min > max)
    pub const INVALID: (f64, f64, f64, f64) = (10.0, 10.0, 5.0, 5.0);
}

/// Common time values for testing.
pub mod time {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    /// A fixed reference time for tests (2019-01-15T12:00:00Z)
    pub const REFERENCE_TIME: &str = "2019-01-15T12:00:00Z";

    /// The reference time as a `DateTime`.
    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 1, 15, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// `t0()` shifted by a number of hours.
    pub fn hours(h: i64) -> DateTime<Utc> {
        t0() + Duration::hours(h)
    }

    /// `t0()` shifted by a number of minutes.
    pub fn minutes(m: i64) -> DateTime<Utc> {
        t0() + Duration::minutes(m)
    }
}

/// Common variable identifiers for testing.
pub mod variables {
    /// Sea water potential temperature
    pub const TEMP: &str = "POTM_CORRECTED";

    /// Sea water practical salinity
    pub const PSAL: &str = "PSAL_CORRECTED";

    /// Dissolved oxygen (absent from generated archives)
    pub const DOXY: &str = "DOXY";
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_reference_time() {
        assert_eq!(time::t0().hour(), 12);
        assert_eq!(time::t0().to_rfc3339(), "2019-01-15T12:00:00+00:00");
        assert_eq!((time::hours(2) - time::t0()).num_minutes(), 120);
    }

    #[test]
    fn test_invalid_bbox_is_inverted() {
        let (min_x, _, max_x, _) = bbox::INVALID;
        assert!(min_x > max_x);
    }
}
