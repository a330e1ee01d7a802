//! GeoBlock CLI - block model grade estimation and resource reporting

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use geoblock_algorithms::classification::{classify, ClassificationSummary};
use geoblock_algorithms::interpolation::{
    interpolate_section, SectionMethod, SectionParams, VariogramModel,
};
use geoblock_algorithms::resource::{aggregate, AggregationParams, ResourceEstimate};
use geoblock_algorithms::run::{EstimationRun, RunReport};
use geoblock_core::block::{BlockQuery, GridDescriptor};
use geoblock_core::store::{available_elements, MemoryStore, SampleSource};
use geoblock_core::{
    BlockGrid, BlockSize, BoundingBox, Element, Point3, ResourceCategory, ResourceConfig, Sample,
    SampleSet,
};
use geoblock_parallel::ProcessingMode;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "geoblock")]
#[command(author, version, about = "Block model grade estimation and resource reporting", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Worker threads (default: all cores)
    #[arg(short = 'j', long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute block grid dimensions without estimating
    Grid {
        /// Bounding box: x_min,y_min,z_min,x_max,y_max,z_max
        #[arg(long, allow_hyphen_values = true)]
        bbox: String,
        /// Block size: bx,by,bz
        #[arg(long)]
        block_size: String,
    },
    /// List elements with samples in a project
    Elements {
        /// Sample file (JSON array of assay records)
        samples: PathBuf,
        /// Project identifier
        #[arg(short, long)]
        project: String,
    },
    /// Build a block model, estimate grades, classify and report resources
    Estimate {
        /// Sample file (JSON array of assay records)
        samples: PathBuf,
        /// Project identifier
        #[arg(short, long)]
        project: String,
        /// Bounding box: x_min,y_min,z_min,x_max,y_max,z_max
        #[arg(long, allow_hyphen_values = true)]
        bbox: String,
        /// Block size: bx,by,bz
        #[arg(long)]
        block_size: String,
        /// Elements to estimate (default: every element with samples)
        #[arg(short, long, value_delimiter = ',')]
        elements: Vec<String>,
        /// Configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Search radius (overrides config)
        #[arg(long)]
        search_radius: Option<f64>,
        /// Minimum samples per block (overrides config)
        #[arg(long)]
        min_samples: Option<usize>,
        /// Maximum samples per block (overrides config)
        #[arg(long)]
        max_samples: Option<usize>,
        /// Blocks per committed batch (overrides config)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Cutoff grade for classification and reporting
        #[arg(long, default_value = "0.0")]
        cutoff: f64,
        /// Bulk density in t/m³ (overrides config)
        #[arg(long)]
        density: Option<f64>,
        /// Include up to this many estimated blocks in the output
        #[arg(long, default_value = "0")]
        blocks: usize,
        /// Output file (JSON); stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Interpolate a plan-view grade section
    Section {
        /// Sample file (JSON array of assay records)
        samples: PathBuf,
        /// Project identifier
        #[arg(short, long)]
        project: String,
        /// Element identifier (au_ppm, ag_ppm, cu_ppm, pb_ppm, zn_ppm)
        #[arg(short, long)]
        element: String,
        /// Lattice nodes per axis
        #[arg(short, long, default_value = "50")]
        resolution: usize,
        /// Method: kriging, linear
        #[arg(short, long, default_value = "kriging")]
        method: String,
        /// Variogram model: spherical, exponential, gaussian
        #[arg(long, default_value = "spherical")]
        variogram: String,
        /// Output file (JSON); stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ─── Input ──────────────────────────────────────────────────────────────

/// One assay interval as read from the sample file.
#[derive(Debug, Deserialize)]
struct SampleRecord {
    project: String,
    easting: f64,
    northing: f64,
    /// Collar elevation
    elevation: f64,
    /// Depth down the hole from the collar
    #[serde(default)]
    depth: f64,
    element: String,
    grade: Option<f64>,
}

fn load_samples(path: &Path) -> Result<MemoryStore> {
    let pb = spinner("Reading samples...");
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sample file {}", path.display()))?;
    let records: Vec<SampleRecord> =
        serde_json::from_str(&content).context("Failed to parse sample file")?;
    pb.finish_and_clear();

    let mut store = MemoryStore::new();
    let mut skipped = 0usize;
    for record in &records {
        let element: Element = record
            .element
            .parse()
            .with_context(|| format!("Invalid sample record for project {}", record.project))?;
        let Some(grade) = record.grade else {
            skipped += 1;
            continue;
        };
        let sample = Sample::from_collar(
            record.easting,
            record.northing,
            record.elevation,
            record.depth,
            grade,
            element,
        );
        store.add_samples(&record.project, [sample]);
    }
    if skipped > 0 {
        warn!("{} records without a grade ignored", skipped);
    }
    info!("Loaded {} assay records from {}", records.len(), path.display());
    Ok(store)
}

fn load_config(path: Option<&Path>) -> Result<ResourceConfig> {
    match path {
        Some(p) => ResourceConfig::load(p).context("Failed to load configuration"),
        None => Ok(ResourceConfig::default()),
    }
}

// ─── Output ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct EstimateReport<'a> {
    project: &'a str,
    grid: &'a GridDescriptor,
    cutoff_grade: f64,
    run: &'a RunReport,
    classification: Vec<ClassificationSummary>,
    resources: Vec<ResourceEstimate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    blocks: Vec<serde_json::Value>,
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    match output {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => println!("{}", text),
    }
    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set default subscriber")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn done(name: &str, output: Option<&Path>, elapsed: std::time::Duration) {
    if let Some(path) = output {
        eprintln!("{} saved to: {}", name, path.display());
    }
    eprintln!("  Processing time: {:.2?}", elapsed);
}

fn parse_values<const N: usize>(s: &str, what: &str) -> Result<[f64; N]> {
    let values: Vec<f64> = s
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("Invalid {}: {}", what, s))?;
    values
        .try_into()
        .map_err(|v: Vec<f64>| anyhow::anyhow!("{} needs {} values, got {}", what, N, v.len()))
}

fn parse_bbox(s: &str) -> Result<BoundingBox> {
    let [x0, y0, z0, x1, y1, z1] = parse_values::<6>(s, "bounding box")?;
    Ok(BoundingBox::new(Point3::new(x0, y0, z0), Point3::new(x1, y1, z1)))
}

fn parse_block_size(s: &str) -> Result<BlockSize> {
    let [bx, by, bz] = parse_values::<3>(s, "block size")?;
    Ok(BlockSize::new(bx, by, bz))
}

fn resolve_elements(names: &[String], store: &MemoryStore, project: &str) -> Result<Vec<Element>> {
    if names.is_empty() {
        let available = available_elements(store, project).context("Failed to list elements")?;
        if available.is_empty() {
            anyhow::bail!("Project '{}' has no usable samples", project);
        }
        return Ok(available.into_iter().map(|a| a.element).collect());
    }
    names
        .iter()
        .map(|n| n.trim().parse::<Element>().map_err(anyhow::Error::from))
        .collect()
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    let mode = match cli.threads {
        Some(n) => {
            geoblock_parallel::strategy::set_num_threads(n);
            ProcessingMode::Parallel
        }
        None => ProcessingMode::Parallel,
    };

    match cli.command {
        // ── Grid ─────────────────────────────────────────────────────
        Commands::Grid { bbox, block_size } => {
            let descriptor = GridDescriptor::new(parse_bbox(&bbox)?, parse_block_size(&block_size)?)
                .context("Invalid block model")?;
            let (nx, ny, nz) = descriptor.dims();
            println!("Dimensions: {} x {} x {} ({} blocks)", nx, ny, nz, descriptor.total_blocks());
            println!("Block volume: {}", descriptor.block_volume());
        }

        // ── Elements ─────────────────────────────────────────────────
        Commands::Elements { samples, project } => {
            let store = load_samples(&samples)?;
            let available = available_elements(&store, &project).context("Failed to list elements")?;
            if available.is_empty() {
                println!("No usable samples in project '{}'", project);
            }
            for a in &available {
                println!("{:<8} {:<12} {:>4}  {} samples", a.element, a.name, a.unit, a.sample_count);
            }
        }

        // ── Estimate ─────────────────────────────────────────────────
        Commands::Estimate {
            samples,
            project,
            bbox,
            block_size,
            elements,
            config,
            search_radius,
            min_samples,
            max_samples,
            batch_size,
            cutoff,
            density,
            blocks,
            output,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            if let Some(r) = search_radius {
                cfg.estimation.search_radius = r;
            }
            if let Some(n) = min_samples {
                cfg.estimation.min_samples = n;
            }
            if let Some(n) = max_samples {
                cfg.estimation.max_samples = n;
            }
            if let Some(n) = batch_size {
                cfg.estimation.batch_size = n;
            }
            if density.is_some() {
                cfg.reporting.density = density;
            }
            cfg.validate().context("Invalid configuration")?;
            let aggregation = AggregationParams::from_reporting(cutoff, &cfg.reporting)
                .context("Resource reporting needs a bulk density (--density or [reporting] density)")?;
            aggregation.validate().context("Invalid reporting parameters")?;

            let store = load_samples(&samples)?;
            let elements = resolve_elements(&elements, &store, &project)?;

            let mut grid = BlockGrid::new(parse_bbox(&bbox)?, parse_block_size(&block_size)?)
                .context("Failed to build block model")?;
            let (nx, ny, nz) = grid.dims();
            info!("Block model: {} x {} x {} ({} blocks)", nx, ny, nz, grid.len());

            let start = Instant::now();
            let pb = spinner("Estimating grades...");
            let report = EstimationRun::new(&store, &store, project.as_str(), "cli")
                .with_config(&cfg.estimation)
                .with_mode(mode)
                .run(&mut grid, &elements, None)
                .context("Estimation failed")?;
            pb.finish_and_clear();

            let mut classification = Vec::new();
            let mut resources = Vec::new();
            for element in report.estimated_elements() {
                classification.push(
                    classify(&mut grid, element, cutoff, &cfg.classification)
                        .with_context(|| format!("Failed to classify {}", element))?,
                );
                let estimate = aggregate(&grid, element, &aggregation)
                    .with_context(|| format!("Failed to aggregate {}", element))?;
                info!(
                    "{}: {:.0} t, {:.2} oz ({} measured, {} indicated, {} inferred blocks)",
                    element,
                    estimate.total_tonnage(),
                    estimate.total_metal(),
                    estimate.category(ResourceCategory::Measured).block_count,
                    estimate.category(ResourceCategory::Indicated).block_count,
                    estimate.category(ResourceCategory::Inferred).block_count,
                );
                resources.push(estimate);
            }

            let mut block_rows = Vec::new();
            if blocks > 0 {
                for element in report.estimated_elements() {
                    let mut query = BlockQuery::new(element);
                    query.limit = blocks;
                    for cell in grid.query(&query) {
                        block_rows.push(json!({
                            "element": element,
                            "index": cell.index(),
                            "centroid": cell.centroid(),
                            "estimate": cell.estimate(element),
                            "category": cell.category(element),
                        }));
                    }
                }
            }

            write_json(
                &EstimateReport {
                    project: &project,
                    grid: grid.descriptor(),
                    cutoff_grade: cutoff,
                    run: &report,
                    classification,
                    resources,
                    blocks: block_rows,
                },
                output.as_deref(),
            )?;
            done("Resource estimate", output.as_deref(), start.elapsed());
        }

        // ── Section ──────────────────────────────────────────────────
        Commands::Section {
            samples,
            project,
            element,
            resolution,
            method,
            variogram,
            output,
        } => {
            let element: Element = element.parse().context("Invalid element")?;
            let params = SectionParams {
                resolution,
                method: method.parse::<SectionMethod>().context("Invalid method")?,
                variogram_model: variogram.parse::<VariogramModel>().context("Invalid variogram model")?,
                ..Default::default()
            };

            let store = load_samples(&samples)?;
            let set = SampleSet::new(
                element,
                store
                    .fetch_samples(&project, element)
                    .context("Failed to fetch samples")?,
            );

            let start = Instant::now();
            let pb = spinner("Interpolating section...");
            let section = interpolate_section(&set, &params).context("Section interpolation failed")?;
            pb.finish_and_clear();
            if let Some(reason) = &section.fallback_reason {
                warn!("Kriging unavailable ({}); used linear interpolation", reason);
            }

            let value = json!({
                "element": section.element,
                "requested_method": section.requested,
                "method": section.method,
                "fallback_reason": section.fallback_reason,
                "bounds": section.bounds,
                "resolution": section.resolution,
                "grid_values": section.value_rows(),
                "variance": section.variance_rows(),
                "variogram": section.variogram,
                "statistics": section.statistics,
                "sample_locations": section.sample_locations,
            });
            write_json(&value, output.as_deref())?;
            done("Section", output.as_deref(), start.elapsed());
        }
    }

    Ok(())
}
