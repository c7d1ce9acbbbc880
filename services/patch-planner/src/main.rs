//! Patch planner.
//!
//! Plans window groups for a set of rasters and points, optionally reads
//! them, and prints a JSON summary of the work.

mod points;

use anyhow::{Context, Result};
use clap::Parser;
use patch_extractor::{
    parse_gdal_env, ExtractionStats, ExtractorConfig, PatchExtractor, PlanSummary,
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "patch-planner")]
#[command(about = "Plan grouped raster reads for reprojected image patches")]
struct Args {
    /// Raster to read from (repeatable)
    #[arg(long = "raster", required = true)]
    rasters: Vec<String>,

    /// CSV of points: id,longitude,latitude or longitude,latitude
    #[arg(long)]
    points: PathBuf,

    /// Output patch edge length in pixels
    #[arg(long, env = "PATCH_SIZE")]
    patch_size: Option<usize>,

    /// Output resolution in meters per pixel
    #[arg(long, env = "PATCH_RESOLUTION")]
    resolution: Option<f64>,

    /// Largest merged read edge in source pixels
    #[arg(long, env = "MAX_PATCH_SIZE")]
    max_patch_size: Option<i64>,

    /// Raster backend option as KEY=VALUE (repeatable)
    #[arg(long = "gdal-env")]
    gdal_env: Vec<String>,

    /// Read every group as well as planning it
    #[arg(long)]
    read: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Serialize)]
struct Report {
    config: ExtractorConfig,
    points: usize,
    plan: PlanSummary,
    savings_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    patches: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<ExtractionStats>,
    elapsed_ms: u64,
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args)?;

    let config = build_config(&args)?;
    let points = points::load_points(&args.points)?;
    info!(
        rasters = args.rasters.len(),
        points = points.len(),
        patch_size = config.patch_size,
        resolution = config.resolution,
        "Starting patch planner"
    );

    let start = Instant::now();
    let extractor = PatchExtractor::with_geotiff(config.clone())?;
    let planned = extractor.plan(args.rasters.as_slice(), &points);
    let plan = PlanSummary::from_groups(&planned);
    info!(
        groups = plan.groups,
        windows = plan.windows,
        bytes_to_read = plan.bytes_to_read,
        "Plan complete"
    );

    let (patches, stats) = if args.read {
        let patches = extractor
            .extract_parallel(&planned)
            .context("reading window groups")?;
        info!(patches = patches.len(), "Read complete");
        (Some(patches.len()), Some(extractor.stats()))
    } else {
        (None, None)
    };
    extractor.close();

    let report = Report {
        config,
        points: points.len(),
        savings_ratio: plan.savings_ratio(),
        plan,
        patches,
        stats,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn init_tracing(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so stdout stays valid JSON
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr);
    if args.json_logs {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Environment defaults, overridden by flags.
fn build_config(args: &Args) -> Result<ExtractorConfig> {
    let mut config = ExtractorConfig::from_env();
    if let Some(size) = args.patch_size {
        config.patch_size = size;
    }
    if let Some(resolution) = args.resolution {
        config.resolution = resolution;
    }
    if let Some(max) = args.max_patch_size {
        config.max_patch_size = max;
    }
    config.gdal_env.extend(parse_gdal_env(args.gdal_env.as_slice())?);
    config.validate()?;
    Ok(config)
}
