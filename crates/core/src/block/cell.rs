//! Block cells and their per-element estimation state

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::element::{Element, ElementSlots};
use crate::error::{Error, Result};
use crate::geometry::Point3;

/// Integer address of a block within its grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellIndex {
    pub i: usize,
    pub j: usize,
    pub k: usize,
}

impl CellIndex {
    pub const fn new(i: usize, j: usize, k: usize) -> Self {
        Self { i, j, k }
    }
}

impl fmt::Display for CellIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.i, self.j, self.k)
    }
}

/// Grade estimate written into a block for one element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellEstimate {
    /// Estimated grade
    pub grade: f64,
    /// Dispersion proxy of the contributing samples. Inverse-distance
    /// estimation stores the variance of the selected grades here; a kriging
    /// estimator would store its estimation variance.
    pub variance: f64,
    /// Number of samples that contributed to the estimate
    pub sample_count: usize,
    /// Distance to the farthest contributing sample
    pub search_distance: f64,
}

/// Confidence category for resource reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceCategory {
    Measured,
    Indicated,
    Inferred,
    Unclassified,
}

impl ResourceCategory {
    /// The categories that contribute to a reported estimate, in reporting order.
    pub const REPORTED: [ResourceCategory; 3] = [
        ResourceCategory::Measured,
        ResourceCategory::Indicated,
        ResourceCategory::Inferred,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceCategory::Measured => "measured",
            ResourceCategory::Indicated => "indicated",
            ResourceCategory::Inferred => "inferred",
            ResourceCategory::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "measured" => Ok(ResourceCategory::Measured),
            "indicated" => Ok(ResourceCategory::Indicated),
            "inferred" => Ok(ResourceCategory::Inferred),
            "unclassified" => Ok(ResourceCategory::Unclassified),
            _ => Err(Error::InvalidParameter {
                name: "category",
                value: s.to_string(),
                reason: "expected measured, indicated, inferred or unclassified".into(),
            }),
        }
    }
}

/// One voxel of a block grid.
///
/// Geometry is fixed at construction. Estimates are written once per element
/// by the estimator and categories by the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockCell {
    index: CellIndex,
    centroid: Point3,
    estimates: ElementSlots<CellEstimate>,
    categories: ElementSlots<ResourceCategory>,
}

impl BlockCell {
    pub(crate) fn new(index: CellIndex, centroid: Point3) -> Self {
        Self {
            index,
            centroid,
            estimates: ElementSlots::default(),
            categories: ElementSlots::default(),
        }
    }

    pub fn index(&self) -> CellIndex {
        self.index
    }

    pub fn centroid(&self) -> Point3 {
        self.centroid
    }

    pub fn estimate(&self, element: Element) -> Option<&CellEstimate> {
        self.estimates.get(element)
    }

    /// Estimated grade for `element`, if the block has been estimated.
    pub fn grade(&self, element: Element) -> Option<f64> {
        self.estimates.get(element).map(|e| e.grade)
    }

    pub fn is_estimated(&self, element: Element) -> bool {
        self.estimates.is_set(element)
    }

    /// Whether any element has been estimated into this block.
    pub fn has_any_estimate(&self) -> bool {
        self.estimates.iter().next().is_some()
    }

    pub fn set_estimate(&mut self, element: Element, estimate: CellEstimate) {
        self.estimates.set(element, Some(estimate));
    }

    pub fn clear_estimate(&mut self, element: Element) {
        self.estimates.set(element, None);
        self.categories.set(element, None);
    }

    pub fn category(&self, element: Element) -> Option<ResourceCategory> {
        self.categories.get(element).copied()
    }

    pub fn set_category(&mut self, element: Element, category: Option<ResourceCategory>) {
        self.categories.set(element, category);
    }
}
