//! Stable identities for files, features and datasets.
//!
//! Feature ids have the form `fileId:record`, where `fileId` is the position
//! of the file in the sorted file list the index was built from. The mapping
//! from file id back to a path is persisted with the index so that reads are
//! routed to the same file on every run.

use feature_common::{FeatureError, FeatureResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Routing table from numeric file id to file location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIdentity {
    files: BTreeMap<u32, PathBuf>,
}

impl FileIdentity {
    /// Assign ids `0..n` to files in sorted order.
    pub fn from_files(files: &[PathBuf]) -> Self {
        let mut sorted: Vec<&PathBuf> = files.iter().collect();
        sorted.sort();
        sorted.dedup();
        let files = sorted
            .into_iter()
            .enumerate()
            .map(|(i, p)| (i as u32, p.clone()))
            .collect();
        Self { files }
    }

    pub fn path(&self, file_id: u32) -> Option<&Path> {
        self.files.get(&file_id).map(PathBuf::as_path)
    }

    /// Location a feature id routes to.
    pub fn resolve(&self, id: &FeatureId) -> FeatureResult<&Path> {
        self.path(id.file_id).ok_or_else(|| {
            FeatureError::InvalidFeatureId(format!("{} refers to unknown file {}", id, id.file_id))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Path)> {
        self.files.iter().map(|(id, p)| (*id, p.as_path()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A feature id: a file id plus a record number within that file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureId {
    pub file_id: u32,
    pub record: usize,
}

impl FeatureId {
    pub fn new(file_id: u32, record: usize) -> Self {
        Self { file_id, record }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_id, self.record)
    }
}

impl FromStr for FeatureId {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FeatureError::InvalidFeatureId(format!("{} is not of the form file:record", s));
        let (file, record) = s.split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            file_id: file.parse().map_err(|_| invalid())?,
            record: record.parse().map_err(|_| invalid())?,
        })
    }
}

/// Validated dataset identifier.
///
/// Ids name the persisted index file, so they are restricted to ASCII
/// alphanumerics plus `-`, `_` and `.`, and may not start with a dot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn new(id: impl Into<String>) -> FeatureResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(FeatureError::InvalidDatasetId(
                "dataset id must not be empty".to_string(),
            ));
        }
        if id.starts_with('.') {
            return Err(FeatureError::InvalidDatasetId(format!(
                "{} must not start with '.'",
                id
            )));
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(FeatureError::InvalidDatasetId(format!(
                "{} contains invalid character {:?}",
                id, c
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the persisted index file for this dataset.
    pub fn index_file_name(&self) -> String {
        format!("{}.index", self.0)
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DatasetId {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
