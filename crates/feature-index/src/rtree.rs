//! Bulk-loaded R-tree over feature bounds.
//!
//! Features are packed once with the Sort-Tile-Recursive (STR) algorithm:
//! envelopes are sorted into vertical slices by longitude, each slice is
//! sorted by latitude and cut into full nodes, and the same packing is
//! repeated on the node envelopes until a single root remains. Packing
//! produces a balanced tree with nearly full nodes, which keeps range
//! queries close to `O(log n + k)`.
//!
//! Nodes live in a flat arena addressed by `u32`, so the whole tree can be
//! serialized with `bincode` and shared read-only between threads.
//!
//! Envelopes cover four axes: longitude, latitude, vertical and time (full
//! `DateTime` precision). A feature with no vertical extent is stored with an
//! unbounded vertical range, so it matches every vertical constraint.

use chrono::{DateTime, Utc};
use feature_common::bbox::constrain_longitude_180;
use feature_common::{FeatureBounds, FeatureError, FeatureResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::query::QueryWindow;

const X: usize = 0;
const Y: usize = 1;
const Z: usize = 2;

/// Minimum bounding region on the four indexed axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Envelope {
    /// Longitude, latitude, vertical
    min: [f64; 3],
    max: [f64; 3],
    t_min: DateTime<Utc>,
    t_max: DateTime<Utc>,
}

impl Envelope {
    fn from_bounds(bounds: &FeatureBounds) -> Self {
        let x = constrain_longitude_180(bounds.horizontal_position.x);
        let y = bounds.horizontal_position.y;
        let (z_min, z_max) = bounds
            .vertical_extent
            .map_or((f64::NEG_INFINITY, f64::INFINITY), |z| (z.low(), z.high()));
        Self {
            min: [x, y, z_min],
            max: [x, y, z_max],
            t_min: bounds.time_extent.low(),
            t_max: bounds.time_extent.high(),
        }
    }

    fn union(&self, other: &Envelope) -> Envelope {
        let mut out = *self;
        for axis in [X, Y, Z] {
            out.min[axis] = out.min[axis].min(other.min[axis]);
            out.max[axis] = out.max[axis].max(other.max[axis]);
        }
        out.t_min = out.t_min.min(other.t_min);
        out.t_max = out.t_max.max(other.t_max);
        out
    }

    fn center(&self, axis: usize) -> f64 {
        (self.min[axis] + self.max[axis]) / 2.0
    }

    /// Closed-interval intersection on every axis.
    fn intersects(&self, other: &Envelope) -> bool {
        [X, Y, Z]
            .iter()
            .all(|&a| self.min[a] <= other.max[a] && other.min[a] <= self.max[a])
            && self.t_min <= other.t_max
            && other.t_min <= self.t_max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    id: String,
    envelope: Envelope,
    /// Sorted indexes into `SpatialIndex::variables`
    variables: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum NodeKind {
    /// Indexes into `entries`
    Leaf(Vec<u32>),
    /// Indexes into `nodes`
    Branch(Vec<u32>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    envelope: Envelope,
    kind: NodeKind,
}

/// Read-only spatial index over feature bounds.
///
/// Built once with [`SpatialIndex::add_features`]; afterwards it can be
/// queried concurrently from any number of threads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialIndex {
    node_capacity: usize,
    entries: Vec<Entry>,
    /// Interned variable ids
    variables: Vec<String>,
    nodes: Vec<Node>,
    root: Option<u32>,
    sealed: bool,
}

impl SpatialIndex {
    /// Create an empty index with the given node fanout (at least 2).
    pub fn new(node_capacity: usize) -> Self {
        Self {
            node_capacity: node_capacity.max(2),
            entries: Vec::new(),
            variables: Vec::new(),
            nodes: Vec::new(),
            root: None,
            sealed: false,
        }
    }

    /// Bulk-load the index. May only be called once.
    pub fn add_features(&mut self, bounds: Vec<FeatureBounds>) -> FeatureResult<()> {
        if self.sealed {
            return Err(FeatureError::IndexSealed);
        }
        self.sealed = true;

        let mut interned: HashMap<String, u32> = HashMap::new();
        for b in bounds {
            let mut variables: Vec<u32> = b
                .variable_ids
                .iter()
                .map(|v| match interned.get(v) {
                    Some(&i) => i,
                    None => {
                        let i = self.variables.len() as u32;
                        self.variables.push(v.clone());
                        interned.insert(v.clone(), i);
                        i
                    }
                })
                .collect();
            variables.sort_unstable();
            self.entries.push(Entry {
                envelope: Envelope::from_bounds(&b),
                id: b.id,
                variables,
            });
        }

        self.build();
        debug!(
            features = self.entries.len(),
            nodes = self.nodes.len(),
            height = self.height(),
            "Built spatial index"
        );
        Ok(())
    }

    fn build(&mut self) {
        if self.entries.is_empty() {
            return;
        }

        let mut level: Vec<(u32, Envelope)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i as u32, e.envelope))
            .collect();
        let mut leaf = true;

        loop {
            let mut parents = Vec::new();
            for group in str_groups(level, self.node_capacity) {
                let envelope = group
                    .iter()
                    .skip(1)
                    .fold(group[0].1, |acc, (_, e)| acc.union(e));
                let children = group.iter().map(|(i, _)| *i).collect();
                let kind = if leaf {
                    NodeKind::Leaf(children)
                } else {
                    NodeKind::Branch(children)
                };
                self.nodes.push(Node { envelope, kind });
                parents.push(((self.nodes.len() - 1) as u32, envelope));
            }
            leaf = false;

            if parents.len() == 1 {
                self.root = Some(parents[0].0);
                return;
            }
            level = parents;
        }
    }

    /// Ids of every feature whose bounds intersect the window, in insertion
    /// order.
    ///
    /// Fails with `InvalidQueryRange` if the window's horizontal box is
    /// inverted.
    pub fn query(&self, window: &QueryWindow) -> FeatureResult<Vec<String>> {
        window.validate()?;

        let Some(root) = self.root else {
            return Ok(Vec::new());
        };
        let Some(required) = self.resolve_variables(&window.variables) else {
            return Ok(Vec::new());
        };

        let (y_min, y_max) = window
            .bbox
            .map_or((f64::NEG_INFINITY, f64::INFINITY), |b| (b.min_y, b.max_y));
        let (z_min, z_max) = window
            .vertical
            .map_or((f64::NEG_INFINITY, f64::INFINITY), |z| (z.low(), z.high()));
        let (t_min, t_max) = window
            .time
            .map_or((DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC), |t| {
                (t.low(), t.high())
            });

        let mut hits: Vec<u32> = Vec::new();
        for (x_min, x_max) in window.longitude_ranges() {
            let search = Envelope {
                min: [x_min, y_min, z_min],
                max: [x_max, y_max, z_max],
                t_min,
                t_max,
            };
            self.search(root, &search, &required, &mut hits);
        }

        // Split searches can both hit features on the antimeridian
        hits.sort_unstable();
        hits.dedup();

        Ok(hits
            .into_iter()
            .map(|i| self.entries[i as usize].id.clone())
            .collect())
    }

    fn search(&self, root: u32, search: &Envelope, required: &[u32], hits: &mut Vec<u32>) {
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            let node = &self.nodes[n as usize];
            if !node.envelope.intersects(search) {
                continue;
            }
            match &node.kind {
                NodeKind::Branch(children) => stack.extend(children.iter().copied()),
                NodeKind::Leaf(entries) => {
                    for &e in entries {
                        let entry = &self.entries[e as usize];
                        if entry.envelope.intersects(search)
                            && required
                                .iter()
                                .all(|v| entry.variables.binary_search(v).is_ok())
                        {
                            hits.push(e);
                        }
                    }
                }
            }
        }
    }

    /// Interned indexes for the requested variables, or `None` if any of
    /// them is unknown to this index (so nothing can match).
    fn resolve_variables(&self, requested: &BTreeSet<String>) -> Option<Vec<u32>> {
        requested
            .iter()
            .map(|name| {
                self.variables
                    .iter()
                    .position(|v| v == name)
                    .map(|i| i as u32)
            })
            .collect()
    }

    /// Every feature id in the index, in insertion order.
    pub fn all_feature_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    /// Every variable measured by at least one feature.
    pub fn variable_ids(&self) -> BTreeSet<String> {
        self.variables.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn node_capacity(&self) -> usize {
        self.node_capacity
    }

    /// Number of levels from the root to the leaves (0 when empty).
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut node = self.root;
        while let Some(n) = node {
            height += 1;
            node = match self.nodes.get(n as usize).map(|node| &node.kind) {
                Some(NodeKind::Branch(children)) => children.first().copied(),
                _ => None,
            };
        }
        height
    }

    /// Check that every node reference is in range.
    ///
    /// Run after deserialization so that a damaged tree is rejected instead
    /// of panicking on the first query.
    pub fn check_integrity(&self) -> FeatureResult<()> {
        let bad = |what: &str| FeatureError::IndexFormat(format!("dangling {} reference", what));

        if let Some(root) = self.root {
            if root as usize >= self.nodes.len() {
                return Err(bad("root"));
            }
        } else if !self.entries.is_empty() {
            return Err(FeatureError::IndexFormat("index has entries but no root".to_string()));
        }

        for node in &self.nodes {
            match &node.kind {
                NodeKind::Leaf(entries) => {
                    if entries.iter().any(|&e| e as usize >= self.entries.len()) {
                        return Err(bad("entry"));
                    }
                }
                NodeKind::Branch(children) => {
                    if children.iter().any(|&c| c as usize >= self.nodes.len()) {
                        return Err(bad("node"));
                    }
                }
            }
        }

        let var_count = self.variables.len();
        if self
            .entries
            .iter()
            .any(|e| e.variables.iter().any(|&v| v as usize >= var_count))
        {
            return Err(bad("variable"));
        }
        Ok(())
    }
}

/// Partition items into groups of at most `capacity` using STR tiling.
fn str_groups(mut items: Vec<(u32, Envelope)>, capacity: usize) -> Vec<Vec<(u32, Envelope)>> {
    let node_count = items.len().div_ceil(capacity);
    let slice_count = (node_count as f64).sqrt().ceil() as usize;
    let slice_size = capacity * slice_count.max(1);

    items.sort_by(|a, b| a.1.center(X).total_cmp(&b.1.center(X)));

    let mut groups = Vec::with_capacity(node_count);
    for slice in items.chunks_mut(slice_size) {
        slice.sort_by(|a, b| a.1.center(Y).total_cmp(&b.1.center(Y)));
        groups.extend(slice.chunks(capacity).map(<[_]>::to_vec));
    }
    groups
}
