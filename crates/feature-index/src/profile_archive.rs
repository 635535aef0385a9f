//! Reader for JSON-lines profile archives.
//!
//! Each non-empty line of an archive file is one vertical profile:
//!
//! ```json
//! {"platform":"float-42","lon":10.0,"lat":20.0,"time":"2019-01-01T00:00:00Z",
//!  "depths":[5.0,10.0,null],"values":{"TEMP":[12.1,11.8,null]}}
//! ```
//!
//! The depth axis ends at the first missing or fill (`99999`) value, and
//! values beyond it are ignored. Profiles with no position, no time, no
//! levels or a depth axis that is not strictly increasing are not indexed;
//! reading one explicitly yields the matching [`SkipReason`].

use chrono::{DateTime, Utc};
use feature_common::{
    Axis, Extent, Feature, FeatureBounds, FeatureDomain, FeatureError, FeatureRead, FeatureResult,
    HorizontalPosition, SkipReason,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::SystemTime;
use storage::{is_remote, CachedHandle, FeatureId};
use tracing::debug;

use crate::reader::DatasetReader;

/// Depth value marking the end of a profile's levels.
const DEPTH_FILL_VALUE: f64 = 99999.0;

/// One line of a profile archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub platform: String,
    pub lon: Option<f64>,
    pub lat: Option<f64>,
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub depths: Vec<Option<f64>>,
    #[serde(default)]
    pub values: BTreeMap<String, Vec<Option<f64>>>,
}

impl ProfileRecord {
    /// Depths up to the first missing or fill value.
    fn levels(&self) -> Vec<f64> {
        self.depths
            .iter()
            .map_while(|d| d.filter(|d| d.is_finite() && *d != DEPTH_FILL_VALUE))
            .collect()
    }

    /// Position, time and levels of an indexable record.
    fn check(&self) -> Result<(HorizontalPosition, DateTime<Utc>, Vec<f64>), SkipReason> {
        let position = match (self.lon, self.lat) {
            (Some(lon), Some(lat)) => HorizontalPosition::new(lon, lat),
            _ => return Err(SkipReason::MissingPosition),
        };
        if !position.is_valid() {
            return Err(SkipReason::MissingPosition);
        }
        let time = self.time.ok_or(SkipReason::MissingTime)?;
        let levels = self.levels();
        if levels.is_empty() {
            return Err(SkipReason::NoLevels);
        }
        if levels.windows(2).any(|w| w[1] <= w[0]) {
            return Err(SkipReason::NonMonotonicVertical);
        }
        Ok((position, time, levels))
    }
}

/// An open profile archive file.
pub struct ProfileArchiveHandle {
    location: String,
    modified: Option<SystemTime>,
    /// `None` once closed
    records: Mutex<Option<Vec<ProfileRecord>>>,
}

impl ProfileArchiveHandle {
    /// Read and parse every record of an archive file.
    pub fn open(path: &Path) -> FeatureResult<Self> {
        let file = File::open(path).map_err(|e| {
            FeatureError::data_reading(format!("Cannot open {}", path.display()), e)
        })?;
        let modified = file.metadata().and_then(|m| m.modified()).ok();

        let mut records = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ProfileRecord = serde_json::from_str(&line).map_err(|e| {
                FeatureError::data_reading(
                    format!("Malformed record at {}:{}", path.display(), n + 1),
                    e,
                )
            })?;
            records.push(record);
        }

        Ok(Self {
            location: path.display().to_string(),
            modified,
            records: Mutex::new(Some(records)),
        })
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().as_ref().map_or(0, Vec::len)
    }

    pub fn is_closed(&self) -> bool {
        self.records.lock().is_none()
    }

    fn closed_error(&self) -> FeatureError {
        FeatureError::data_reading_msg(format!("Handle for {} has been closed", self.location))
    }
}

impl CachedHandle for ProfileArchiveHandle {
    fn location(&self) -> &str {
        &self.location
    }

    fn close(&self) -> FeatureResult<()> {
        self.records.lock().take();
        debug!(location = %self.location, "Closed profile archive");
        Ok(())
    }

    /// The file has been modified or removed since it was opened.
    fn is_stale(&self) -> bool {
        let current = fs::metadata(&self.location).and_then(|m| m.modified()).ok();
        current.is_none() || current != self.modified
    }
}

/// [`DatasetReader`] for JSON-lines profile archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileArchiveReader;

impl ProfileArchiveReader {
    pub fn new() -> Self {
        Self
    }

    fn materialise(
        id: &FeatureId,
        record: &ProfileRecord,
        variables: &BTreeSet<String>,
    ) -> FeatureResult<FeatureRead> {
        let (position, time, levels) = match record.check() {
            Ok(parts) => parts,
            Err(reason) => return Ok(Err(reason)),
        };

        let mut values = BTreeMap::new();
        for (var, data) in &record.values {
            if !variables.is_empty() && !variables.contains(var) {
                continue;
            }
            if data.len() < levels.len() {
                return Err(FeatureError::data_reading_msg(format!(
                    "Profile {} has {} values of {} for {} levels",
                    id,
                    data.len(),
                    var,
                    levels.len()
                )));
            }
            let data: Vec<Option<f64>> = data[..levels.len()]
                .iter()
                .map(|v| v.filter(|v| v.is_finite()))
                .collect();
            values.insert(var.clone(), data);
        }
        if values.is_empty() && !variables.is_empty() {
            return Ok(Err(SkipReason::NoRequestedVariables));
        }

        Ok(Ok(Feature {
            id: id.to_string(),
            name: record.platform.trim().to_string(),
            position,
            domain: FeatureDomain::Profile {
                time,
                depths: levels,
            },
            values,
        }))
    }
}

impl DatasetReader for ProfileArchiveReader {
    type Handle = ProfileArchiveHandle;

    fn format_name(&self) -> &'static str {
        "profile-archive"
    }

    fn open_handle(&self, location: &str) -> FeatureResult<ProfileArchiveHandle> {
        if is_remote(location) {
            return Err(FeatureError::InvalidLocation(format!(
                "{} is remote; profile archives must be local files",
                location
            )));
        }
        ProfileArchiveHandle::open(Path::new(location))
    }

    fn scan_bounds(
        &self,
        handle: &ProfileArchiveHandle,
        file_id: u32,
    ) -> FeatureResult<Vec<FeatureBounds>> {
        let guard = handle.records.lock();
        let records = guard.as_ref().ok_or_else(|| handle.closed_error())?;

        let mut bounds = Vec::with_capacity(records.len());
        let mut skipped = 0usize;
        for (n, record) in records.iter().enumerate() {
            let (position, time, levels) = match record.check() {
                Ok(parts) => parts,
                Err(reason) => {
                    debug!(location = %handle.location, record = n, %reason, "Not indexing profile");
                    skipped += 1;
                    continue;
                }
            };
            // Levels are strictly increasing
            let vertical = Extent::new(Axis::Vertical, levels[0], levels[levels.len() - 1])?;
            bounds.push(FeatureBounds::new(
                FeatureId::new(file_id, n).to_string(),
                position,
                Some(vertical),
                Extent::point(time),
                record.values.keys().cloned().collect(),
            )?);
        }

        debug!(
            location = %handle.location,
            indexed = bounds.len(),
            skipped,
            "Scanned profile archive"
        );
        Ok(bounds)
    }

    fn read_feature(
        &self,
        handle: &ProfileArchiveHandle,
        id: &FeatureId,
        variables: &BTreeSet<String>,
    ) -> FeatureResult<FeatureRead> {
        let guard = handle.records.lock();
        let records = guard.as_ref().ok_or_else(|| handle.closed_error())?;
        let record = records.get(id.record).ok_or_else(|| {
            FeatureError::InvalidFeatureId(format!("{} is past the end of {}", id, handle.location))
        })?;
        Self::materialise(id, record, variables)
    }

    /// Reads the whole batch under one lock acquisition.
    fn read_features(
        &self,
        handle: &ProfileArchiveHandle,
        ids: &[FeatureId],
        variables: &BTreeSet<String>,
    ) -> Vec<(FeatureId, FeatureResult<FeatureRead>)> {
        let guard = handle.records.lock();
        ids.iter()
            .map(|id| {
                let result = match guard.as_ref() {
                    None => Err(handle.closed_error()),
                    Some(records) => match records.get(id.record) {
                        Some(record) => Self::materialise(id, record, variables),
                        None => Err(FeatureError::InvalidFeatureId(format!(
                            "{} is past the end of {}",
                            id, handle.location
                        ))),
                    },
                };
                (*id, result)
            })
            .collect()
    }
}
