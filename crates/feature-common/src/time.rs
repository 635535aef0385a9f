//! Time parsing utilities.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::error::{FeatureError, FeatureResult};
use crate::extent::{Axis, Extent};

/// Parse an ISO 8601 timestamp.
///
/// Accepts RFC 3339 with an offset, a naive `YYYY-MM-DDTHH:MM:SS` (taken as
/// UTC), or a bare date.
pub fn parse_iso8601(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let s = s.trim();

    // Try full datetime with timezone
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try without timezone (assume UTC)
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    // Try date only
    if let Ok(ndt) =
        NaiveDateTime::parse_from_str(&format!("{}T00:00:00", s), "%Y-%m-%dT%H:%M:%S")
    {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(TimeParseError::InvalidFormat(s.to_string()))
}

/// Parse a time constraint: a single instant or a `start/end` range.
pub fn parse_time_extent(s: &str) -> FeatureResult<Extent<DateTime<Utc>>> {
    if let Some((start, end)) = s.split_once('/') {
        let start = parse_iso8601(start)?;
        let end = parse_iso8601(end)?;
        return Extent::new(Axis::Time, start, end);
    }
    Ok(Extent::point(parse_iso8601(s)?))
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),
}

impl From<TimeParseError> for FeatureError {
    fn from(err: TimeParseError) -> Self {
        FeatureError::InvalidTime(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_iso8601() {
        let dt = parse_iso8601("2024-01-15T12:00:00Z").unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), 1);
        assert_eq!(dt.day(), 15);
        assert_eq!(dt.hour(), 12);

        let naive = parse_iso8601("2024-01-15T12:00:00").unwrap();
        assert_eq!(naive, dt);

        let date = parse_iso8601("2024-01-15").unwrap();
        assert_eq!(date.hour(), 0);
    }

    #[test]
    fn test_parse_time_extent() {
        let range = parse_time_extent("2024-01-15T00:00:00Z/2024-01-16T00:00:00Z").unwrap();
        assert!(range.low() < range.high());

        let single = parse_time_extent("2024-01-15T00:00:00Z").unwrap();
        assert_eq!(single.low(), single.high());
    }

    #[test]
    fn test_inverted_time_extent() {
        let result = parse_time_extent("2024-01-16T00:00:00Z/2024-01-15T00:00:00Z");
        assert!(matches!(
            result,
            Err(FeatureError::InvalidQueryRange { axis: Axis::Time, .. })
        ));
    }

    #[test]
    fn test_bad_time() {
        assert!(matches!(
            parse_time_extent("yesterday"),
            Err(FeatureError::InvalidTime(_))
        ));
    }
}
