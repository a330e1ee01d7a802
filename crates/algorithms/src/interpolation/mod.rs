//! 2D grade sections
//!
//! Interpolates sample grades onto a regular plan-view lattice for display:
//! - Ordinary kriging with a fitted variogram (estimate + variance)
//! - Linear interpolation over a Delaunay triangulation
//!
//! Kriging that cannot proceed (collinear samples, failed variogram fit,
//! singular system) falls back to linear interpolation.

mod kriging;
mod linear;
mod section;
pub mod variogram;

pub use kriging::{ordinary_kriging, KrigingSurface};
pub use linear::linear_interpolation;
pub use section::{
    interpolate_section, GradeStatistics, LatticeBounds, SectionGrid, SectionMethod, SectionParams,
    MAX_SECTION_RESOLUTION, MIN_SECTION_SAMPLES,
};
pub use variogram::{
    empirical_variogram, fit_variogram, fittable_variogram, EmpiricalVariogram, FittedVariogram,
    VariogramModel, VariogramParams,
};

use serde::Serialize;

/// A sample point with x, y coordinates and a value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplePoint {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "grade")]
    pub value: f64,
}

impl SamplePoint {
    pub fn new(x: f64, y: f64, value: f64) -> Self {
        Self { x, y, value }
    }

    /// Squared Euclidean distance to another point
    #[inline]
    pub fn dist_sq(&self, other_x: f64, other_y: f64) -> f64 {
        let dx = self.x - other_x;
        let dy = self.y - other_y;
        dx * dx + dy * dy
    }

    /// Euclidean distance to another point
    #[inline]
    pub fn dist(&self, other_x: f64, other_y: f64) -> f64 {
        self.dist_sq(other_x, other_y).sqrt()
    }
}

/// `n` evenly spaced values from `min` to `max` inclusive. A single value
/// is `min`.
pub fn linspace(min: f64, max: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![min],
        _ => {
            let step = (max - min) / (n - 1) as f64;
            let mut out: Vec<f64> = (0..n).map(|i| min + i as f64 * step).collect();
            out[n - 1] = max;
            out
        }
    }
}

/// Collapse points sharing the same (x, y) into one point carrying their
/// mean value. Samples down a vertical hole all project onto its collar.
pub fn merge_coincident(points: &[SamplePoint]) -> Vec<SamplePoint> {
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));

    let mut merged: Vec<SamplePoint> = Vec::with_capacity(sorted.len());
    let mut count = 0usize;
    for p in sorted {
        match merged.last_mut() {
            Some(last) if last.x == p.x && last.y == p.y => {
                count += 1;
                last.value += (p.value - last.value) / count as f64;
            }
            _ => {
                merged.push(p);
                count = 1;
            }
        }
    }
    merged
}

/// Centroid and coordinate covariance (sxx, syy, sxy) of the points.
pub(crate) fn coordinate_moments(points: &[SamplePoint]) -> ((f64, f64), (f64, f64, f64)) {
    let n = points.len().max(1) as f64;
    let mx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let my = points.iter().map(|p| p.y).sum::<f64>() / n;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for p in points {
        let (dx, dy) = (p.x - mx, p.y - my);
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    ((mx, my), (sxx, syy, sxy))
}

/// Whether the points span no 2D area (all on one line, or all coincident).
pub fn is_collinear(points: &[SamplePoint]) -> bool {
    if points.len() < 3 {
        return true;
    }
    let (_, (sxx, syy, sxy)) = coordinate_moments(points);
    let trace = sxx + syy;
    let det = sxx * syy - sxy * sxy;
    trace <= 0.0 || det <= 1e-10 * trace * trace
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linspace() {
        assert_eq!(linspace(0.0, 10.0, 5), vec![0.0, 2.5, 5.0, 7.5, 10.0]);
        assert_eq!(linspace(3.0, 9.0, 1), vec![3.0]);
        assert_eq!(linspace(2.0, 2.0, 3), vec![2.0, 2.0, 2.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_merge_coincident() {
        let pts = vec![
            SamplePoint::new(1.0, 1.0, 2.0),
            SamplePoint::new(0.0, 0.0, 5.0),
            SamplePoint::new(1.0, 1.0, 4.0),
            SamplePoint::new(1.0, 1.0, 6.0),
        ];
        let merged = merge_coincident(&pts);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], SamplePoint::new(0.0, 0.0, 5.0));
        assert!((merged[1].value - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_collinear_detection() {
        let line = vec![
            SamplePoint::new(0.0, 0.0, 1.0),
            SamplePoint::new(5.0, 0.0, 2.0),
            SamplePoint::new(10.0, 0.0, 3.0),
        ];
        assert!(is_collinear(&line));

        let diagonal: Vec<_> = (0..5).map(|i| SamplePoint::new(i as f64 * 3.0, i as f64 * 7.0, 1.0)).collect();
        assert!(is_collinear(&diagonal));

        let triangle = vec![
            SamplePoint::new(0.0, 0.0, 1.0),
            SamplePoint::new(10.0, 0.0, 2.0),
            SamplePoint::new(0.0, 10.0, 3.0),
        ];
        assert!(!is_collinear(&triangle));
        assert!(is_collinear(&triangle[..2]));
    }
}
