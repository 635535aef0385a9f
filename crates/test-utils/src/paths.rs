//! Temporary workspaces for tests that touch the filesystem.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary directory with separate areas for data files and indexes.
///
/// Everything is removed when the workspace is dropped.
pub struct TempWorkspace {
    dir: TempDir,
}

impl TempWorkspace {
    pub fn new() -> Self {
        Self {
            dir: temp_test_dir_with_prefix("feature_index_"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Directory holding dataset files.
    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    /// Directory where indexes are persisted.
    pub fn index_dir(&self) -> PathBuf {
        self.dir.path().join("index")
    }

    /// Absolute glob pattern under the data directory.
    pub fn pattern(&self, glob: &str) -> String {
        format!("{}/{}", self.data_dir().display(), glob)
    }

    /// Write a file under the data directory, creating parents as needed.
    pub fn write_data_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.data_dir().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create data directory");
        }
        let mut file = fs::File::create(&path).expect("Failed to create data file");
        file.write_all(contents.as_bytes())
            .expect("Failed to write data file");
        path
    }
}

impl Default for TempWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates a temporary directory for test output.
///
/// The directory is automatically cleaned up when the returned `TempDir` is dropped.
pub fn temp_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// Creates a temporary directory with a specific prefix.
pub fn temp_test_dir_with_prefix(prefix: &str) -> TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("Failed to create temporary test directory")
}
