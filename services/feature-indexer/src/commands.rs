//! Subcommand implementations.

use anyhow::{anyhow, Context, Result};
use clap::Args;
use feature_common::{parse_iso8601, parse_time_extent, Axis, BoundingBox, Extent};
use feature_index::{DatasetReader, PointDatasetFactory, QueryWindow};
use serde_json::{json, Value};
use tracing::info;

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Dataset id; names the persisted index file
    #[arg(long)]
    pub id: String,

    /// Absolute path or glob pattern of the dataset's files
    #[arg(long)]
    pub location: String,

    /// Rebuild the index even if a valid one is persisted
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Dataset id; names the persisted index file
    #[arg(long)]
    pub id: String,

    /// Absolute path or glob pattern of the dataset's files
    #[arg(long)]
    pub location: String,

    /// Horizontal box as minx,miny,maxx,maxy (maxx may exceed 180)
    #[arg(long)]
    pub bbox: Option<String>,

    /// Vertical range as low,high
    #[arg(long)]
    pub elevation: Option<String>,

    /// Time instant or start/end range (ISO 8601)
    #[arg(long)]
    pub time: Option<String>,

    /// Time the returned features should be nearest to (ISO 8601)
    #[arg(long)]
    pub target: String,

    /// Comma-separated variables every returned feature must measure
    #[arg(long, value_delimiter = ',')]
    pub vars: Vec<String>,
}

impl QueryArgs {
    /// Translate the command line constraints into a query window.
    pub fn window(&self) -> Result<QueryWindow> {
        let mut window = QueryWindow::unbounded().with_variables(self.vars.iter().cloned());

        if let Some(bbox) = &self.bbox {
            window.bbox = Some(
                BoundingBox::from_query_string(bbox).with_context(|| format!("--bbox {}", bbox))?,
            );
        }
        if let Some(elevation) = &self.elevation {
            let (low, high) = parse_pair(elevation)?;
            window.vertical = Some(Extent::new(Axis::Vertical, low, high)?);
        }
        if let Some(time) = &self.time {
            window.time = Some(parse_time_extent(time)?);
        }
        Ok(window)
    }
}

fn parse_pair(s: &str) -> Result<(f64, f64)> {
    let (low, high) = s
        .split_once(',')
        .ok_or_else(|| anyhow!("expected low,high but got {}", s))?;
    let low: f64 = low.trim().parse().with_context(|| format!("invalid number {}", low))?;
    let high: f64 = high.trim().parse().with_context(|| format!("invalid number {}", high))?;
    Ok((low, high))
}

/// Build or reuse the index and describe the dataset.
pub fn build<R: DatasetReader>(factory: &PointDatasetFactory<R>, args: &BuildArgs) -> Result<Value> {
    let dataset = factory.create_dataset(&args.id, &args.location, args.force)?;
    info!(dataset = %dataset.id(), features = dataset.feature_count(), "Dataset ready");

    Ok(json!({
        "dataset": dataset.id().as_str(),
        "files": dataset.identity().len(),
        "features": dataset.feature_count(),
        "variables": dataset.variable_ids(),
        "extents": dataset.extents(),
    }))
}

/// Answer a nearest-in-time query.
pub fn query<R: DatasetReader>(factory: &PointDatasetFactory<R>, args: &QueryArgs) -> Result<Value> {
    let window = args.window()?;
    let target = parse_iso8601(&args.target).with_context(|| format!("--target {}", args.target))?;

    let dataset = factory.create_dataset(&args.id, &args.location, false)?;
    let features = dataset.query_nearest(&window, target)?;
    info!(dataset = %dataset.id(), count = features.len(), "Query complete");

    Ok(json!({
        "dataset": dataset.id().as_str(),
        "target": target.to_rfc3339(),
        "count": features.len(),
        "features": features,
    }))
}
