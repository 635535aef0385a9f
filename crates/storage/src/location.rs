//! Expansion of dataset location strings into canonical file lists.
//!
//! A location is either a remote URL (passed through untouched), an absolute
//! path, or an absolute path whose components contain glob wildcards:
//!
//! - `*` matches any run of characters
//! - `?` matches one character
//! - `[abc]`, `[a-z]`, `[!abc]` match one character from (or not from) a set
//!
//! Each component is matched with [`glob::Pattern`]; a malformed pattern is
//! an `InvalidLocation` error.
//!
//! Expanded lists are sorted so that comparisons between runs are
//! deterministic.

use feature_common::{FeatureError, FeatureResult};
use glob::Pattern;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const REMOTE_PREFIXES: &[&str] = &["http://", "https://", "dods://"];

/// Whether a location refers to a remote service rather than local files.
pub fn is_remote(location: &str) -> bool {
    REMOTE_PREFIXES.iter().any(|p| location.starts_with(p))
}

/// Expand a location into a sorted list of files.
///
/// Remote URLs are returned unchanged as a single entry. Local locations must
/// be absolute; only regular files are returned. A pattern that matches
/// nothing yields an empty list.
pub fn expand(location: &str) -> FeatureResult<Vec<PathBuf>> {
    if is_remote(location) {
        return Ok(vec![PathBuf::from(location)]);
    }

    let path = Path::new(location);
    if !path.is_absolute() {
        return Err(FeatureError::InvalidLocation(format!(
            "{} must be an absolute path",
            location
        )));
    }

    let mut search_paths: Vec<PathBuf> = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                if search_paths.is_empty() {
                    search_paths.push(PathBuf::new());
                }
                for p in search_paths.iter_mut() {
                    p.push(component.as_os_str());
                }
            }
            Component::CurDir => {}
            Component::ParentDir => {
                for p in search_paths.iter_mut() {
                    p.push("..");
                }
            }
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                search_paths = if has_wildcard(&name) {
                    let pattern = Pattern::new(&name).map_err(|e| {
                        FeatureError::InvalidLocation(format!("{}: {}", location, e))
                    })?;
                    search_paths
                        .iter()
                        .filter(|dir| dir.is_dir())
                        .flat_map(|dir| matching_children(dir, &pattern))
                        .collect()
                } else {
                    search_paths.into_iter().map(|p| p.join(&*name)).collect()
                };
            }
        }
        if search_paths.is_empty() {
            break;
        }
    }

    let files: BTreeSet<PathBuf> = search_paths.into_iter().filter(|p| p.is_file()).collect();
    debug!(location = %location, count = files.len(), "Expanded location");
    Ok(files.into_iter().collect())
}

/// Whether two file lists contain the same files, ignoring order.
pub fn same_file_set(a: &[PathBuf], b: &[PathBuf]) -> bool {
    let a: BTreeSet<&PathBuf> = a.iter().collect();
    let b: BTreeSet<&PathBuf> = b.iter().collect();
    a == b
}

fn matching_children(dir: &Path, pattern: &Pattern) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| pattern.matches(&e.file_name().to_string_lossy()))
        .map(|e| e.into_path())
        .collect()
}

fn has_wildcard(s: &str) -> bool {
    s.contains(['*', '?', '['])
}
