//! # GeoBlock Core
//!
//! Core types for the GeoBlock resource estimation library.
//!
//! This crate provides:
//! - `Sample` / `SampleSet`: assay observations for one element
//! - `Element`: the closed set of assay grade channels
//! - `BlockGrid`: regular 3D block model with per-block estimation state
//! - `ResourceConfig`: estimation, classification and reporting settings
//! - `SampleSource` / `BlockStore`: injected data store collaborators

pub mod block;
pub mod config;
pub mod element;
pub mod error;
pub mod geometry;
pub mod sample;
pub mod store;

pub use block::{BlockCell, BlockGrid, CellEstimate, CellIndex, GridDescriptor, ResourceCategory};
pub use config::ResourceConfig;
pub use element::Element;
pub use error::{Error, Result};
pub use geometry::{BlockSize, BoundingBox, Point3};
pub use sample::{Sample, SampleSet};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::block::{
        BlockCell, BlockGrid, BlockQuery, CellEstimate, CellIndex, GridDescriptor, GridStatus,
        ResourceCategory,
    };
    pub use crate::config::{CategoryRule, ClassificationConfig, EstimationConfig, ResourceConfig};
    pub use crate::element::Element;
    pub use crate::error::{Error, Result};
    pub use crate::geometry::{BlockSize, BoundingBox, Point3};
    pub use crate::sample::{Sample, SampleSet};
    pub use crate::store::{BlockStore, CellUpdate, MemoryStore, RunCursor, SampleSource};
}
