//! Block grade estimation
//!
//! Inverse-distance weighting of the samples found within a search radius of
//! each block centroid:
//!
//! 1. candidates are the samples with centroid distance ≤ `search_radius`
//! 2. blocks with fewer than `min_samples` candidates stay unestimated
//! 3. the `max_samples` nearest are kept, ties broken by input order
//! 4. weights are `1 / (d² + 1e-10)`, normalised to sum to one
//!
//! Blocks are independent, so the grid is processed with the requested
//! [`ProcessingMode`] or a reusable [`Executor`]. A k-d tree answers the
//! radius queries.

pub mod idw;
pub mod kdtree;

use geoblock_core::config::EstimationConfig;
use geoblock_core::{BlockCell, BlockGrid, CellEstimate, Element, Error, Point3, Result, SampleSet};
use geoblock_parallel::{Executor, ParallelStrategy, ProcessingMode};
use serde::Serialize;
use tracing::info;

pub use idw::{Contribution, DISTANCE_EPSILON};
pub use kdtree::KdTree;

/// Minimum number of samples an element needs before any block is estimated.
pub const MIN_ESTIMATION_SAMPLES: usize = 3;

/// Sample search parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimationParams {
    /// Maximum centroid-to-sample distance (> 0)
    pub search_radius: f64,
    /// Fewest in-range samples needed to estimate a block (≥ 1)
    pub min_samples: usize,
    /// Most samples used per block (≥ `min_samples`)
    pub max_samples: usize,
}

impl Default for EstimationParams {
    fn default() -> Self {
        Self::from(&EstimationConfig::default())
    }
}

impl From<&EstimationConfig> for EstimationParams {
    fn from(config: &EstimationConfig) -> Self {
        Self {
            search_radius: config.search_radius,
            min_samples: config.min_samples,
            max_samples: config.max_samples,
        }
    }
}

impl EstimationParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.search_radius.is_finite() && self.search_radius > 0.0) {
            return Err(Error::InvalidParameter {
                name: "search_radius",
                value: self.search_radius.to_string(),
                reason: "must be positive".into(),
            });
        }
        if self.min_samples < 1 {
            return Err(Error::InvalidParameter {
                name: "min_samples",
                value: self.min_samples.to_string(),
                reason: "must be at least 1".into(),
            });
        }
        if self.max_samples < self.min_samples {
            return Err(Error::InvalidParameter {
                name: "max_samples",
                value: self.max_samples.to_string(),
                reason: format!("must be >= min_samples ({})", self.min_samples),
            });
        }
        Ok(())
    }
}

/// Estimator for one element, built once per sample set and shared
/// read-only across worker threads.
#[derive(Debug)]
pub struct GradeEstimator<'a> {
    samples: &'a SampleSet,
    tree: KdTree,
    params: EstimationParams,
}

impl<'a> GradeEstimator<'a> {
    /// Validate the parameters and index the samples.
    ///
    /// # Errors
    /// `InvalidParameter` for bad search parameters, `InsufficientSamples`
    /// when the set holds fewer than [`MIN_ESTIMATION_SAMPLES`].
    pub fn new(samples: &'a SampleSet, params: EstimationParams) -> Result<Self> {
        params.validate()?;
        samples.require(MIN_ESTIMATION_SAMPLES)?;
        let positions: Vec<Point3> = samples.iter().map(|s| s.position).collect();
        Ok(Self {
            samples,
            tree: KdTree::build(&positions),
            params,
        })
    }

    pub fn element(&self) -> Element {
        self.samples.element()
    }

    pub fn params(&self) -> &EstimationParams {
        &self.params
    }

    /// Samples within the search radius of `centroid`, nearest first.
    pub fn candidates(&self, centroid: &Point3) -> Vec<Contribution> {
        let radius = self.params.search_radius;
        // Pruning bound only; membership is decided on the exact distance.
        let prune_sq = radius * radius * (1.0 + 1e-9);
        let mut found: Vec<Contribution> = self
            .tree
            .within_radius_sq(centroid, prune_sq)
            .into_iter()
            .map(|n| Contribution {
                index: n.index,
                distance: n.distance_sq.sqrt(),
            })
            .filter(|c| c.distance <= radius)
            .collect();
        found.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.index.cmp(&b.index)));
        found
    }

    /// Samples contributing to the block at `centroid`, or `None` when fewer
    /// than `min_samples` are in range.
    pub fn select(&self, centroid: &Point3) -> Option<Vec<Contribution>> {
        idw::select_nearest(
            self.candidates(centroid),
            self.params.min_samples,
            self.params.max_samples,
        )
    }

    /// Estimate for a block centroid, or `None` when the block is skipped.
    pub fn estimate_at(&self, centroid: &Point3) -> Option<CellEstimate> {
        let selected = self.select(centroid)?;
        let samples = self.samples.samples();
        idw::weighted_estimate(&selected, |i| samples[i].grade)
    }

    /// Write the estimate into `cell`. A skipped block has any previous
    /// estimate for this element removed. Returns whether it was estimated.
    pub fn estimate_cell(&self, cell: &mut BlockCell) -> bool {
        let element = self.element();
        match self.estimate_at(&cell.centroid()) {
            Some(estimate) => {
                cell.set_estimate(element, estimate);
                true
            }
            None => {
                cell.clear_estimate(element);
                false
            }
        }
    }

    /// Estimate a run of cells. Each cell is written by exactly one worker.
    pub fn estimate_cells<S: ParallelStrategy>(&self, cells: &mut [BlockCell], strategy: &S) {
        strategy.for_each_mut(cells, |cell| {
            self.estimate_cell(cell);
        });
    }
}

/// Outcome of estimating one element into a grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimationSummary {
    pub element: Element,
    pub total_blocks: usize,
    pub estimated_blocks: usize,
    /// Mean estimated grade, `None` when no block was estimated
    pub mean_grade: Option<f64>,
    pub min_grade: Option<f64>,
    pub max_grade: Option<f64>,
}

impl EstimationSummary {
    /// Summarise the current estimates of `element` in `grid`.
    pub fn from_grid(grid: &BlockGrid, element: Element) -> Self {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for grade in grid.cells().filter_map(|c| c.grade(element)) {
            count += 1;
            sum += grade;
            min = min.min(grade);
            max = max.max(grade);
        }
        let (mean_grade, min_grade, max_grade) = if count > 0 {
            (Some(sum / count as f64), Some(min), Some(max))
        } else {
            (None, None, None)
        };
        Self {
            element,
            total_blocks: grid.len(),
            estimated_blocks: count,
            mean_grade,
            min_grade,
            max_grade,
        }
    }
}

/// Estimate `samples.element()` into every block of `grid`.
///
/// The grid is marked estimated when at least one block received a grade.
/// Nothing is written when the parameters are invalid or the element has
/// too few samples. Multi-element runs leave the status to [`crate::run`].
pub fn estimate(
    grid: &mut BlockGrid,
    samples: &SampleSet,
    params: &EstimationParams,
    mode: ProcessingMode,
) -> Result<EstimationSummary> {
    let estimator = GradeEstimator::new(samples, *params)?;
    estimator.estimate_cells(grid.as_slice_mut()?, &Executor::new(mode));

    let summary = EstimationSummary::from_grid(grid, samples.element());
    if summary.estimated_blocks > 0 {
        grid.mark_estimated();
    }
    info!(
        element = %summary.element,
        estimated = summary.estimated_blocks,
        total = summary.total_blocks,
        "block estimation complete"
    );
    Ok(summary)
}
