//! Resource confidence classification
//!
//! Labels estimated blocks at or above a cutoff grade from the estimator's
//! sample count and search distance. Rules are tried in the order measured,
//! indicated, inferred; the first that accepts the block wins and blocks
//! matching none are unclassified.
//!
//! Blocks below the cutoff or without an estimate carry no category, so a
//! re-run with a different cutoff leaves no stale labels behind.

use crate::maybe_rayon::*;
use geoblock_core::config::ClassificationConfig;
use geoblock_core::{BlockGrid, CellEstimate, Element, Error, ResourceCategory, Result};
use serde::Serialize;
use tracing::info;

/// Category for a single estimate, ignoring the cutoff.
pub fn classify_block(estimate: &CellEstimate, rules: &ClassificationConfig) -> ResourceCategory {
    let (distance, count) = (estimate.search_distance, estimate.sample_count);
    if rules.measured.accepts(distance, count) {
        ResourceCategory::Measured
    } else if rules.indicated.accepts(distance, count) {
        ResourceCategory::Indicated
    } else if rules.inferred.accepts(distance, count) {
        ResourceCategory::Inferred
    } else {
        ResourceCategory::Unclassified
    }
}

/// Block counts produced by one classification pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationSummary {
    pub element: Element,
    pub cutoff_grade: f64,
    pub measured: usize,
    pub indicated: usize,
    pub inferred: usize,
    pub unclassified: usize,
    /// Estimated blocks below the cutoff
    pub below_cutoff: usize,
    /// Blocks with no estimate for the element
    pub unestimated: usize,
}

impl ClassificationSummary {
    pub fn count(&self, category: ResourceCategory) -> usize {
        match category {
            ResourceCategory::Measured => self.measured,
            ResourceCategory::Indicated => self.indicated,
            ResourceCategory::Inferred => self.inferred,
            ResourceCategory::Unclassified => self.unclassified,
        }
    }

    /// Blocks in a reported category
    pub fn classified(&self) -> usize {
        self.measured + self.indicated + self.inferred
    }
}

/// Assign categories for `element` to every block of `grid`.
///
/// # Errors
/// `InvalidParameter` when the cutoff is negative or not finite.
pub fn classify(
    grid: &mut BlockGrid,
    element: Element,
    cutoff_grade: f64,
    rules: &ClassificationConfig,
) -> Result<ClassificationSummary> {
    if !(cutoff_grade.is_finite() && cutoff_grade >= 0.0) {
        return Err(Error::InvalidParameter {
            name: "cutoff_grade",
            value: cutoff_grade.to_string(),
            reason: "must be a non-negative number".into(),
        });
    }

    grid.as_slice_mut()?.par_iter_mut().for_each(|cell| {
        let category = match cell.estimate(element) {
            Some(est) if est.grade >= cutoff_grade => Some(classify_block(est, rules)),
            _ => None,
        };
        cell.set_category(element, category);
    });

    let mut summary = ClassificationSummary {
        element,
        cutoff_grade,
        measured: 0,
        indicated: 0,
        inferred: 0,
        unclassified: 0,
        below_cutoff: 0,
        unestimated: 0,
    };
    for cell in grid.cells() {
        match (cell.category(element), cell.is_estimated(element)) {
            (Some(ResourceCategory::Measured), _) => summary.measured += 1,
            (Some(ResourceCategory::Indicated), _) => summary.indicated += 1,
            (Some(ResourceCategory::Inferred), _) => summary.inferred += 1,
            (Some(ResourceCategory::Unclassified), _) => summary.unclassified += 1,
            (None, true) => summary.below_cutoff += 1,
            (None, false) => summary.unestimated += 1,
        }
    }

    info!(
        %element,
        cutoff_grade,
        measured = summary.measured,
        indicated = summary.indicated,
        inferred = summary.inferred,
        unclassified = summary.unclassified,
        "blocks classified"
    );
    Ok(summary)
}
