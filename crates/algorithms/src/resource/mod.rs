//! Resource aggregation
//!
//! Sums classified blocks into tonnage, grade and metal content per
//! confidence category:
//!
//! ```text
//! tonnage = block volume × density
//! metal   = tonnage × grade × metal factor
//! ```
//!
//! Only blocks with grade ≥ cutoff count. Unclassified blocks are reported
//! as a remainder and contribute to none of the totals. The grid is never
//! modified, so the same classified grid can be aggregated at any number of
//! cutoffs.

use geoblock_core::config::{ReportingConfig, RESOURCE_METAL_FACTOR};
use geoblock_core::{BlockGrid, Element, Error, ResourceCategory, Result};
use serde::Serialize;
use tracing::debug;

/// Aggregation inputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationParams {
    /// Minimum block grade counted
    pub cutoff_grade: f64,
    /// Bulk density in t/m³
    pub density: f64,
    /// Factor converting tonnes × grade into metal content
    pub metal_factor: f64,
}

impl AggregationParams {
    /// Parameters with the default resource metal factor.
    pub fn new(cutoff_grade: f64, density: f64) -> Self {
        Self {
            cutoff_grade,
            density,
            metal_factor: RESOURCE_METAL_FACTOR,
        }
    }

    /// Parameters from the reporting configuration. Fails when the
    /// configuration carries no density.
    pub fn from_reporting(cutoff_grade: f64, reporting: &ReportingConfig) -> Result<Self> {
        let density = reporting.density.ok_or_else(|| Error::InvalidParameter {
            name: "density",
            value: "unset".into(),
            reason: "a bulk density is required to compute tonnage".into(),
        })?;
        Ok(Self {
            cutoff_grade,
            density,
            metal_factor: reporting.metal_factor,
        })
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value, allow_zero) in [
            ("cutoff_grade", self.cutoff_grade, true),
            ("density", self.density, false),
            ("metal_factor", self.metal_factor, false),
        ] {
            let ok = value.is_finite() && (value > 0.0 || (allow_zero && value == 0.0));
            if !ok {
                let reason = if allow_zero { "must be non-negative" } else { "must be positive" };
                return Err(Error::InvalidParameter {
                    name,
                    value: value.to_string(),
                    reason: reason.into(),
                });
            }
        }
        Ok(())
    }
}

/// Totals for one category.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CategoryTotals {
    pub block_count: usize,
    /// Summed tonnage
    pub tonnage: f64,
    /// Mean block grade, 0 when the category is empty
    pub average_grade: f64,
    /// Summed metal content
    pub metal_content: f64,
}

/// Accumulates one category
#[derive(Default)]
struct Accumulator {
    count: usize,
    tonnage: f64,
    grade_sum: f64,
    metal: f64,
}

impl Accumulator {
    fn add(&mut self, tonnage: f64, grade: f64, metal_factor: f64) {
        self.count += 1;
        self.tonnage += tonnage;
        self.grade_sum += grade;
        self.metal += tonnage * grade * metal_factor;
    }

    fn finish(self) -> CategoryTotals {
        CategoryTotals {
            block_count: self.count,
            tonnage: self.tonnage,
            average_grade: if self.count > 0 {
                self.grade_sum / self.count as f64
            } else {
                0.0
            },
            metal_content: self.metal,
        }
    }
}

/// Reportable estimate for (grid, element, cutoff).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceEstimate {
    pub element: Element,
    pub cutoff_grade: f64,
    pub density: f64,
    pub metal_factor: f64,
    pub measured: CategoryTotals,
    pub indicated: CategoryTotals,
    pub inferred: CategoryTotals,
    /// Above-cutoff blocks that met no category rule; excluded from totals
    pub unclassified: CategoryTotals,
}

impl ResourceEstimate {
    pub fn category(&self, category: ResourceCategory) -> &CategoryTotals {
        match category {
            ResourceCategory::Measured => &self.measured,
            ResourceCategory::Indicated => &self.indicated,
            ResourceCategory::Inferred => &self.inferred,
            ResourceCategory::Unclassified => &self.unclassified,
        }
    }

    fn reported(&self) -> impl Iterator<Item = &CategoryTotals> {
        ResourceCategory::REPORTED.into_iter().map(|c| self.category(c))
    }

    /// Blocks in measured, indicated and inferred
    pub fn total_blocks(&self) -> usize {
        self.reported().map(|t| t.block_count).sum()
    }

    /// Tonnage of measured, indicated and inferred
    pub fn total_tonnage(&self) -> f64 {
        self.reported().map(|t| t.tonnage).sum()
    }

    /// Metal content of measured, indicated and inferred
    pub fn total_metal(&self) -> f64 {
        self.reported().map(|t| t.metal_content).sum()
    }
}

/// Aggregate the classified blocks of `element` at `params.cutoff_grade`.
///
/// Blocks take the category assigned by the last classification pass; run
/// classification at a cutoff no higher than this one first.
pub fn aggregate(grid: &BlockGrid, element: Element, params: &AggregationParams) -> Result<ResourceEstimate> {
    params.validate()?;
    let tonnage = grid.block_volume() * params.density;

    let mut acc: [Accumulator; 4] = Default::default();
    for cell in grid.cells() {
        let (Some(grade), Some(category)) = (cell.grade(element), cell.category(element)) else {
            continue;
        };
        if grade < params.cutoff_grade {
            continue;
        }
        let slot = match category {
            ResourceCategory::Measured => 0,
            ResourceCategory::Indicated => 1,
            ResourceCategory::Inferred => 2,
            ResourceCategory::Unclassified => 3,
        };
        acc[slot].add(tonnage, grade, params.metal_factor);
    }

    let [measured, indicated, inferred, unclassified] = acc.map(Accumulator::finish);
    let estimate = ResourceEstimate {
        element,
        cutoff_grade: params.cutoff_grade,
        density: params.density,
        metal_factor: params.metal_factor,
        measured,
        indicated,
        inferred,
        unclassified,
    };
    debug!(
        %element,
        cutoff = params.cutoff_grade,
        tonnage = estimate.total_tonnage(),
        metal = estimate.total_metal(),
        "resource aggregated"
    );
    Ok(estimate)
}
