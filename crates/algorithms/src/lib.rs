//! # GeoBlock Algorithms
//!
//! Resource estimation algorithms operating on `geoblock-core` block models.
//!
//! ## Available Algorithm Categories
//!
//! - **estimation**: inverse-distance grade estimation into block grids
//! - **classification**: measured / indicated / inferred confidence labels
//! - **resource**: tonnage, grade and metal totals per category
//! - **interpolation**: 2D grade sections (ordinary kriging, linear TIN)
//! - **run**: batched, cancellable, resumable estimation against a block store

pub mod classification;
pub mod estimation;
pub mod interpolation;
pub(crate) mod maybe_rayon;
pub mod resource;
pub mod run;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classification::{classify, classify_block, ClassificationSummary};
    pub use crate::estimation::{estimate, EstimationParams, EstimationSummary, GradeEstimator};
    pub use crate::interpolation::{
        interpolate_section, GradeStatistics, SamplePoint, SectionGrid, SectionMethod,
        SectionParams,
    };
    pub use crate::resource::{aggregate, AggregationParams, CategoryTotals, ResourceEstimate};
    pub use crate::run::{load_estimates, ElementOutcome, EstimationRun, RunReport};
    pub use geoblock_core::prelude::*;
    pub use geoblock_parallel::{CancellationToken, ProcessingMode};
}
