//! On-disk persistence of a dataset's index.
//!
//! ## File layout
//!
//! ```text
//! "FIDX"            4-byte magic
//! version           u16, little-endian
//! block * 4         [u32 length][u32 crc32][bincode payload]
//! ```
//!
//! Blocks are written and read strictly in this order:
//!
//! 1. file list the index was built from
//! 2. dataset extents
//! 3. file identity table
//! 4. spatial index
//!
//! Staleness is decided after the first block, so a changed file set never
//! pays for deserializing the index. Any read error, checksum mismatch or
//! version mismatch is treated as corruption. Stale and corrupt files are
//! deleted; the caller then rebuilds from scratch.

use feature_common::{DatasetExtents, FeatureError, FeatureResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use storage::{same_file_set, DatasetId, FileIdentity};
use tracing::{debug, info, warn};

use crate::rtree::SpatialIndex;

const MAGIC: &[u8; 4] = b"FIDX";

/// Current on-disk format version.
pub const FORMAT_VERSION: u16 = 2;

/// Everything persisted for one dataset, saved and invalidated as a unit.
#[derive(Debug, Clone)]
pub struct PersistedIndex {
    pub files: Vec<PathBuf>,
    /// `None` when the files contained no indexable features
    pub extents: Option<DatasetExtents>,
    pub identity: FileIdentity,
    pub index: SpatialIndex,
}

/// Result of trying to load a persisted index.
#[derive(Debug)]
pub enum LoadOutcome {
    /// The persisted index matches the current file set.
    Fresh(Box<PersistedIndex>),
    /// No index has been persisted for this dataset.
    Missing,
    /// The index was built from a different file set.
    Stale,
    /// The index could not be read.
    Corrupt(String),
    /// A rebuild was requested; the old index was discarded unread.
    Discarded,
}

impl LoadOutcome {
    pub fn is_fresh(&self) -> bool {
        matches!(self, LoadOutcome::Fresh(_))
    }
}

/// Directory of persisted dataset indexes, one file per dataset id.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &DatasetId) -> PathBuf {
        self.dir.join(id.index_file_name())
    }

    /// Load the index for `id` if it was built from exactly `files`.
    pub fn load(&self, id: &DatasetId, files: &[PathBuf], force_refresh: bool) -> LoadOutcome {
        let path = self.path_for(id);
        if !path.exists() {
            debug!(dataset = %id, path = %path.display(), "No persisted index");
            return LoadOutcome::Missing;
        }

        if force_refresh {
            info!(dataset = %id, "Discarding persisted index on forced refresh");
            self.discard(&path);
            return LoadOutcome::Discarded;
        }

        match read_index(&path, files) {
            Ok(Some(persisted)) => {
                debug!(
                    dataset = %id,
                    features = persisted.index.len(),
                    files = persisted.files.len(),
                    "Loaded persisted index"
                );
                LoadOutcome::Fresh(Box::new(persisted))
            }
            Ok(None) => {
                info!(dataset = %id, "Persisted index is stale; file set has changed");
                self.discard(&path);
                LoadOutcome::Stale
            }
            Err(e) => {
                warn!(dataset = %id, error = %e, "Persisted index is unreadable");
                self.discard(&path);
                LoadOutcome::Corrupt(e.to_string())
            }
        }
    }

    /// Persist an index, logging rather than returning any failure.
    ///
    /// The in-memory index stays valid whether or not this succeeds.
    pub fn save(&self, id: &DatasetId, persisted: &PersistedIndex) {
        match self.try_save(id, persisted) {
            Ok(path) => info!(
                dataset = %id,
                path = %path.display(),
                features = persisted.index.len(),
                "Persisted index"
            ),
            Err(e) => warn!(dataset = %id, error = %e, "Failed to persist index"),
        }
    }

    /// Persist an index, replacing any previous file atomically.
    pub fn try_save(&self, id: &DatasetId, persisted: &PersistedIndex) -> FeatureResult<PathBuf> {
        let storage_err = |what: &str, e: std::io::Error| {
            FeatureError::Storage(format!("{} {}: {}", what, self.dir.display(), e))
        };

        fs::create_dir_all(&self.dir).map_err(|e| storage_err("cannot create", e))?;

        let path = self.path_for(id);
        let tmp = path.with_extension("index.tmp");
        let result = (|| {
            let file = File::create(&tmp).map_err(|e| storage_err("cannot write to", e))?;
            let mut writer = BufWriter::new(file);
            write_index(&mut writer, persisted)?;
            writer
                .flush()
                .map_err(|e| storage_err("cannot write to", e))?;
            fs::rename(&tmp, &path).map_err(|e| storage_err("cannot rename in", e))
        })();

        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result.map(|_| path)
    }

    /// Delete the persisted index for `id`, if any.
    pub fn remove(&self, id: &DatasetId) -> FeatureResult<()> {
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FeatureError::Storage(e.to_string())),
        }
    }

    fn discard(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "Failed to delete old index");
        }
    }
}

/// Read a persisted index. Returns `Ok(None)` if the file set differs.
fn read_index(path: &Path, files: &[PathBuf]) -> FeatureResult<Option<PersistedIndex>> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(FeatureError::IndexFormat("bad magic bytes".to_string()));
    }

    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;
    let version = u16::from_le_bytes(version);
    if version != FORMAT_VERSION {
        return Err(FeatureError::IndexFormat(format!(
            "unsupported format version {} (expected {})",
            version, FORMAT_VERSION
        )));
    }

    let persisted_files: Vec<PathBuf> = read_block(&mut reader)?;
    if !same_file_set(&persisted_files, files) {
        return Ok(None);
    }

    let extents: Option<DatasetExtents> = read_block(&mut reader)?;
    let identity: FileIdentity = read_block(&mut reader)?;
    let index: SpatialIndex = read_block(&mut reader)?;
    index.check_integrity()?;

    Ok(Some(PersistedIndex {
        files: persisted_files,
        extents,
        identity,
        index,
    }))
}

fn write_index<W: Write>(writer: &mut W, persisted: &PersistedIndex) -> FeatureResult<()> {
    let io_err = |e: std::io::Error| FeatureError::Storage(e.to_string());

    writer.write_all(MAGIC).map_err(io_err)?;
    writer
        .write_all(&FORMAT_VERSION.to_le_bytes())
        .map_err(io_err)?;
    write_block(writer, &persisted.files)?;
    write_block(writer, &persisted.extents)?;
    write_block(writer, &persisted.identity)?;
    write_block(writer, &persisted.index)
}

fn write_block<W: Write, T: Serialize>(writer: &mut W, value: &T) -> FeatureResult<()> {
    let payload = bincode::serialize(value)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| FeatureError::IndexFormat("block larger than 4 GiB".to_string()))?;
    let crc = crc32fast::hash(&payload);

    let io_err = |e: std::io::Error| FeatureError::Storage(e.to_string());
    writer.write_all(&len.to_le_bytes()).map_err(io_err)?;
    writer.write_all(&crc.to_le_bytes()).map_err(io_err)?;
    writer.write_all(&payload).map_err(io_err)
}

fn read_block<R: Read, T: DeserializeOwned>(reader: &mut R) -> FeatureResult<T> {
    let mut header = [0u8; 8];
    reader.read_exact(&mut header)?;
    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

    let mut payload = Vec::new();
    reader.take(len as u64).read_to_end(&mut payload)?;
    if payload.len() != len {
        return Err(FeatureError::IndexFormat("truncated block".to_string()));
    }
    if crc32fast::hash(&payload) != crc {
        return Err(FeatureError::IndexFormat("block checksum mismatch".to_string()));
    }
    Ok(bincode::deserialize(&payload)?)
}
