//! Shared helpers for feature-index integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use feature_common::{
    Feature, FeatureBounds, FeatureDomain, FeatureError, FeatureRead, FeatureResult,
    HorizontalPosition, SkipReason,
};
use feature_index::DatasetReader;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use storage::{CachedHandle, FeatureId};

/// How a scripted record behaves when it is read.
#[derive(Debug, Clone)]
pub enum Scripted {
    Ok(Feature),
    Skip(Feature, SkipReason),
    Fail(Feature),
}

impl Scripted {
    fn feature(&self) -> &Feature {
        match self {
            Scripted::Ok(f) | Scripted::Skip(f, _) | Scripted::Fail(f) => f,
        }
    }
}

/// Counters shared between a reader and the handles it opens.
#[derive(Debug, Default)]
pub struct ReaderStats {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub scans: AtomicUsize,
    pub reads: AtomicUsize,
}

impl ReaderStats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

pub struct ScriptedHandle {
    location: String,
    closed: AtomicBool,
    fail_close: bool,
    stats: Arc<ReaderStats>,
}

impl ScriptedHandle {
    pub fn new(location: &str, stats: Arc<ReaderStats>) -> Self {
        Self {
            location: location.to_string(),
            closed: AtomicBool::new(false),
            fail_close: false,
            stats,
        }
    }

    pub fn failing_close(location: &str, stats: Arc<ReaderStats>) -> Self {
        Self {
            fail_close: true,
            ..Self::new(location, stats)
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl CachedHandle for ScriptedHandle {
    fn location(&self) -> &str {
        &self.location
    }

    fn close(&self) -> FeatureResult<()> {
        if self.fail_close {
            return Err(FeatureError::Storage(format!("cannot close {}", self.location)));
        }
        self.closed.store(true, Ordering::SeqCst);
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// An in-memory reader whose records are scripted per location.
///
/// Every scripted record is indexed; its behaviour only shows when it is
/// read. Locations in `unreadable` fail to open.
#[derive(Clone, Default)]
pub struct ScriptedReader {
    records: HashMap<String, Vec<Scripted>>,
    unreadable: HashSet<String>,
    pub stats: Arc<ReaderStats>,
}

impl ScriptedReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, location: impl Into<String>, records: Vec<Scripted>) -> Self {
        self.records.insert(location.into(), records);
        self
    }

    pub fn with_unreadable(mut self, location: impl Into<String>) -> Self {
        self.unreadable.insert(location.into());
        self
    }
}

impl DatasetReader for ScriptedReader {
    type Handle = ScriptedHandle;

    fn format_name(&self) -> &'static str {
        "scripted"
    }

    fn open_handle(&self, location: &str) -> FeatureResult<ScriptedHandle> {
        if self.unreadable.contains(location) {
            return Err(FeatureError::data_reading_msg(format!("cannot open {}", location)));
        }
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedHandle::new(location, self.stats.clone()))
    }

    fn scan_bounds(&self, handle: &ScriptedHandle, file_id: u32) -> FeatureResult<Vec<FeatureBounds>> {
        self.stats.scans.fetch_add(1, Ordering::SeqCst);
        let records = self.records.get(&handle.location).map(Vec::as_slice).unwrap_or(&[]);
        records
            .iter()
            .enumerate()
            .map(|(n, r)| {
                FeatureBounds::from_feature(&Feature {
                    id: FeatureId::new(file_id, n).to_string(),
                    ..r.feature().clone()
                })
            })
            .collect()
    }

    fn read_feature(
        &self,
        handle: &ScriptedHandle,
        id: &FeatureId,
        _variables: &BTreeSet<String>,
    ) -> FeatureResult<FeatureRead> {
        self.stats.reads.fetch_add(1, Ordering::SeqCst);
        if handle.is_closed() {
            return Err(FeatureError::data_reading_msg("handle is closed"));
        }
        let record = self
            .records
            .get(&handle.location)
            .and_then(|r| r.get(id.record))
            .ok_or_else(|| FeatureError::InvalidFeatureId(id.to_string()))?;
        match record {
            Scripted::Ok(f) => Ok(Ok(Feature {
                id: id.to_string(),
                ..f.clone()
            })),
            Scripted::Skip(_, reason) => Ok(Err(reason.clone())),
            Scripted::Fail(_) => Err(FeatureError::data_reading_msg(format!(
                "malformed record {}",
                id
            ))),
        }
    }
}

/// A single-level profile feature.
pub fn profile(name: &str, lon: f64, lat: f64, time: DateTime<Utc>) -> Feature {
    let mut values = BTreeMap::new();
    values.insert("TEMP".to_string(), vec![Some(10.0)]);
    Feature {
        id: String::new(),
        name: name.to_string(),
        position: HorizontalPosition::new(lon, lat),
        domain: FeatureDomain::Profile {
            time,
            depths: vec![5.0],
        },
        values,
    }
}
