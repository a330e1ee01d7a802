//! Assay samples and per-element sample sets

use serde::{Deserialize, Serialize};

use crate::element::Element;
use crate::error::{Error, Result};
use crate::geometry::Point3;

/// A single assay grade measurement at a 3D location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub position: Point3,
    /// Grade in the element's unit (ppm or g/t)
    pub grade: f64,
    pub element: Element,
}

impl Sample {
    pub fn new(x: f64, y: f64, z: f64, grade: f64, element: Element) -> Self {
        Self {
            position: Point3::new(x, y, z),
            grade,
            element,
        }
    }

    /// Locate a sample down a vertical hole: z is the collar elevation minus
    /// the sample's depth along the hole.
    pub fn from_collar(
        easting: f64,
        northing: f64,
        collar_elevation: f64,
        depth: f64,
        grade: f64,
        element: Element,
    ) -> Self {
        Self::new(easting, northing, collar_elevation - depth, grade, element)
    }

    /// Positive, finite grade at a finite location.
    pub fn is_valid(&self) -> bool {
        self.grade.is_finite()
            && self.grade > 0.0
            && self.position.x.is_finite()
            && self.position.y.is_finite()
            && self.position.z.is_finite()
    }
}

/// Transient collection of samples for one element.
///
/// Input order is preserved; it is the tie-break order for equidistant
/// samples during estimation.
#[derive(Debug, Clone)]
pub struct SampleSet {
    element: Element,
    samples: Vec<Sample>,
}

impl SampleSet {
    /// Build a sample set, keeping only samples of `element` with a usable grade.
    pub fn new(element: Element, samples: impl IntoIterator<Item = Sample>) -> Self {
        let samples = samples
            .into_iter()
            .filter(|s| s.element == element && s.is_valid())
            .collect();
        Self { element, samples }
    }

    pub fn element(&self) -> Element {
        self.element
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn grades(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.grade)
    }

    /// Fail with `InsufficientSamples` unless at least `required` samples exist.
    pub fn require(&self, required: usize) -> Result<()> {
        if self.samples.len() < required {
            return Err(Error::InsufficientSamples {
                element: self.element,
                found: self.samples.len(),
                required,
            });
        }
        Ok(())
    }

    /// Bounding box of the sample positions as (min, max), or `None` when empty.
    pub fn bounds(&self) -> Option<(Point3, Point3)> {
        let first = self.samples.first()?.position;
        let (min, max) = self.samples.iter().fold((first, first), |(lo, hi), s| {
            let p = s.position;
            (
                Point3::new(lo.x.min(p.x), lo.y.min(p.y), lo.z.min(p.z)),
                Point3::new(hi.x.max(p.x), hi.y.max(p.y), hi.z.max(p.z)),
            )
        });
        Some((min, max))
    }
}

impl<'a> IntoIterator for &'a SampleSet {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
