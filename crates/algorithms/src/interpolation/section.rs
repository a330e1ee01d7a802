//! Plan-view grade sections
//!
//! Builds a `resolution × resolution` lattice over the bounding box of the
//! sample collars (end points included) and fills it by ordinary kriging or
//! linear interpolation. Lattice nodes that cannot be interpolated are 0.

use std::fmt;
use std::str::FromStr;

use geoblock_core::{Element, Error, Result, SampleSet};
use ndarray::Array2;
use serde::Serialize;
use tracing::{debug, warn};

use super::kriging::ordinary_kriging;
use super::linear::linear_interpolation;
use super::variogram::{fit_variogram, fittable_variogram, FittedVariogram, VariogramModel, VariogramParams};
use super::{is_collinear, linspace, merge_coincident, SamplePoint};

/// Fewest samples a section is built from.
pub const MIN_SECTION_SAMPLES: usize = 3;

/// Largest lattice resolution accepted.
pub const MAX_SECTION_RESOLUTION: usize = 1000;

/// Section interpolation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SectionMethod {
    /// Ordinary kriging with a fitted variogram
    #[default]
    #[serde(rename = "kriging")]
    Geostatistical,
    /// Linear interpolation over a Delaunay triangulation
    #[serde(rename = "linear")]
    DistanceWeighted,
}

impl SectionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            SectionMethod::Geostatistical => "kriging",
            SectionMethod::DistanceWeighted => "linear",
        }
    }
}

impl fmt::Display for SectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "kriging" | "geostatistical" | "ordinary_kriging" => Ok(SectionMethod::Geostatistical),
            "linear" | "idw" | "distance_weighted" => Ok(SectionMethod::DistanceWeighted),
            _ => Err(Error::InvalidParameter {
                name: "method",
                value: s.to_string(),
                reason: "expected kriging or linear".into(),
            }),
        }
    }
}

/// Section parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionParams {
    /// Lattice nodes per axis (1..=[`MAX_SECTION_RESOLUTION`])
    pub resolution: usize,
    pub method: SectionMethod,
    /// Variogram model fitted for kriging
    pub variogram_model: VariogramModel,
    /// Lag bins of the empirical variogram
    pub n_lags: usize,
}

impl Default for SectionParams {
    fn default() -> Self {
        Self {
            resolution: 50,
            method: SectionMethod::Geostatistical,
            variogram_model: VariogramModel::Spherical,
            n_lags: VariogramParams::default().n_lags,
        }
    }
}

impl SectionParams {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_SECTION_RESOLUTION).contains(&self.resolution) {
            return Err(Error::InvalidParameter {
                name: "resolution",
                value: self.resolution.to_string(),
                reason: format!("must be between 1 and {}", MAX_SECTION_RESOLUTION),
            });
        }
        if self.n_lags < 1 {
            return Err(Error::InvalidParameter {
                name: "n_lags",
                value: self.n_lags.to_string(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Extent of the lattice
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatticeBounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

/// Summary of the raw sample grades
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GradeStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation
    pub std_dev: f64,
    pub data_points: usize,
}

impl GradeStatistics {
    /// Statistics of `grades`, `None` when empty.
    pub fn from_grades(grades: &[f64]) -> Option<Self> {
        if grades.is_empty() {
            return None;
        }
        let n = grades.len();
        let mut sorted = grades.to_vec();
        sorted.sort_by(f64::total_cmp);

        let mean = sorted.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        let variance = sorted.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / n as f64;

        Some(Self {
            min: sorted[0],
            max: sorted[n - 1],
            mean,
            median,
            std_dev: variance.sqrt(),
            data_points: n,
        })
    }
}

/// An interpolated section.
#[derive(Debug, Clone)]
pub struct SectionGrid {
    pub element: Element,
    /// Method asked for
    pub requested: SectionMethod,
    /// Method that produced `values`
    pub method: SectionMethod,
    /// Why kriging was abandoned, when it was
    pub fallback_reason: Option<String>,
    pub bounds: LatticeBounds,
    pub resolution: usize,
    /// Interpolated grades, rows along y and columns along x
    pub values: Array2<f64>,
    /// Kriging variance on the same lattice
    pub variance: Option<Array2<f64>>,
    /// Variogram used by kriging
    pub variogram: Option<FittedVariogram>,
    pub statistics: GradeStatistics,
    pub sample_locations: Vec<SamplePoint>,
}

impl SectionGrid {
    pub fn fell_back(&self) -> bool {
        self.fallback_reason.is_some()
    }

    /// Lattice x coordinates (columns)
    pub fn xs(&self) -> Vec<f64> {
        linspace(self.bounds.x_min, self.bounds.x_max, self.resolution)
    }

    /// Lattice y coordinates (rows)
    pub fn ys(&self) -> Vec<f64> {
        linspace(self.bounds.y_min, self.bounds.y_max, self.resolution)
    }

    /// Values as nested rows, for serialisation
    pub fn value_rows(&self) -> Vec<Vec<f64>> {
        self.values.rows().into_iter().map(|r| r.to_vec()).collect()
    }

    /// Variance as nested rows, for serialisation
    pub fn variance_rows(&self) -> Option<Vec<Vec<f64>>> {
        self.variance
            .as_ref()
            .map(|v| v.rows().into_iter().map(|r| r.to_vec()).collect())
    }
}

/// Interpolate the grades of `samples` onto a plan-view lattice.
///
/// # Errors
/// `InvalidParameter` for a bad resolution, `InsufficientSamples` below
/// [`MIN_SECTION_SAMPLES`]. Kriging failures are not errors: the section
/// falls back to linear interpolation and records the reason.
pub fn interpolate_section(samples: &SampleSet, params: &SectionParams) -> Result<SectionGrid> {
    params.validate()?;
    samples.require(MIN_SECTION_SAMPLES)?;

    let raw: Vec<SamplePoint> = samples
        .iter()
        .map(|s| SamplePoint::new(s.position.x, s.position.y, s.grade))
        .collect();
    let grades: Vec<f64> = raw.iter().map(|p| p.value).collect();
    let statistics = GradeStatistics::from_grades(&grades).ok_or_else(|| Error::InsufficientSamples {
        element: samples.element(),
        found: 0,
        required: MIN_SECTION_SAMPLES,
    })?;

    let bounds = raw.iter().fold(
        LatticeBounds {
            x_min: f64::INFINITY,
            x_max: f64::NEG_INFINITY,
            y_min: f64::INFINITY,
            y_max: f64::NEG_INFINITY,
        },
        |b, p| LatticeBounds {
            x_min: b.x_min.min(p.x),
            x_max: b.x_max.max(p.x),
            y_min: b.y_min.min(p.y),
            y_max: b.y_max.max(p.y),
        },
    );
    let xs = linspace(bounds.x_min, bounds.x_max, params.resolution);
    let ys = linspace(bounds.y_min, bounds.y_max, params.resolution);

    let points = merge_coincident(&raw);
    debug!(
        element = %samples.element(),
        samples = raw.len(),
        locations = points.len(),
        resolution = params.resolution,
        method = %params.method,
        "interpolating section"
    );

    let mut fallback_reason = None;
    let mut variance = None;
    let mut variogram = None;
    let mut method = params.method;

    let mut values = match params.method {
        SectionMethod::Geostatistical => match krige(&points, params, &xs, &ys) {
            Ok((surface, fitted)) => {
                variance = Some(surface.variance);
                variogram = Some(fitted);
                surface.estimate
            }
            Err(e) => {
                warn!(element = %samples.element(), error = %e, "kriging failed, falling back to linear interpolation");
                fallback_reason = Some(e.to_string());
                method = SectionMethod::DistanceWeighted;
                linear_interpolation(&points, &xs, &ys)?
            }
        },
        SectionMethod::DistanceWeighted => linear_interpolation(&points, &xs, &ys)?,
    };
    values.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
    if let Some(var) = variance.as_mut() {
        var.mapv_inplace(|v: f64| if v.is_finite() { v } else { 0.0 });
    }

    Ok(SectionGrid {
        element: samples.element(),
        requested: params.method,
        method,
        fallback_reason,
        bounds,
        resolution: params.resolution,
        values,
        variance,
        variogram,
        statistics,
        sample_locations: raw,
    })
}

fn krige(
    points: &[SamplePoint],
    params: &SectionParams,
    xs: &[f64],
    ys: &[f64],
) -> Result<(super::KrigingSurface, FittedVariogram)> {
    if points.len() < MIN_SECTION_SAMPLES || is_collinear(points) {
        return Err(Error::Algorithm(
            "sample locations are collinear or coincident; no 2D covariance structure".into(),
        ));
    }
    let empirical = fittable_variogram(
        points,
        &VariogramParams {
            n_lags: params.n_lags,
            max_lag: None,
        },
    )?;
    let fitted = fit_variogram(&empirical, params.variogram_model)?;
    let surface = ordinary_kriging(points, &fitted, xs, ys)?;
    Ok((surface, fitted))
}
