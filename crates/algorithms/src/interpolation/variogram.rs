//! Variogram computation and model fitting
//!
//! The semivariance γ(h) measures grade dissimilarity as a function of
//! separation distance h:
//! ```text
//! γ(h) = (1/2N(h)) Σ [z(xᵢ) - z(xⱼ)]²   for all pairs with |xᵢ-xⱼ| in the lag bin of h
//! ```
//!
//! Reference:
//! Matheron, G. (1963). Principles of geostatistics. Economic Geology.
//! Cressie, N. (1993). Statistics for Spatial Data. Wiley.

use std::fmt;
use std::str::FromStr;

use geoblock_core::{Error, Result};
use serde::Serialize;

use super::SamplePoint;

/// Fewest populated lag bins a model is fitted to.
pub const MIN_FIT_BINS: usize = 3;

/// Empirical variogram: semivariance values at discrete lag distances.
#[derive(Debug, Clone)]
pub struct EmpiricalVariogram {
    /// Lag distances (bin centers)
    pub lags: Vec<f64>,
    /// Semivariance γ(h) per bin, NaN for empty bins
    pub semivariance: Vec<f64>,
    /// Number of point pairs contributing to each bin
    pub pair_counts: Vec<usize>,
}

impl EmpiricalVariogram {
    /// Lag bins holding at least one pair
    pub fn populated_bins(&self) -> usize {
        self.pair_counts.iter().filter(|&&c| c > 0).count()
    }
}

/// Theoretical variogram model type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VariogramModel {
    /// γ(h) = c₀ + c·[1.5(h/a) - 0.5(h/a)³] for h ≤ a; c₀+c for h > a
    #[default]
    Spherical,
    /// γ(h) = c₀ + c·[1 - exp(-3h/a)]
    Exponential,
    /// γ(h) = c₀ + c·[1 - exp(-3h²/a²)]
    Gaussian,
}

impl fmt::Display for VariogramModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VariogramModel::Spherical => "spherical",
            VariogramModel::Exponential => "exponential",
            VariogramModel::Gaussian => "gaussian",
        })
    }
}

impl FromStr for VariogramModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "spherical" => Ok(VariogramModel::Spherical),
            "exponential" => Ok(VariogramModel::Exponential),
            "gaussian" => Ok(VariogramModel::Gaussian),
            _ => Err(Error::InvalidParameter {
                name: "variogram_model",
                value: s.to_string(),
                reason: "expected spherical, exponential or gaussian".into(),
            }),
        }
    }
}

/// Fitted variogram model parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FittedVariogram {
    pub model: VariogramModel,
    /// Nugget (c₀): semivariance as h → 0
    pub nugget: f64,
    /// Sill (c₀ + c): semivariance at which the model levels off
    pub sill: f64,
    /// Range (a)
    pub range: f64,
    /// Weighted residual sum of squares of the fit
    pub rss: f64,
}

impl FittedVariogram {
    /// Partial sill (c = sill - nugget)
    pub fn partial_sill(&self) -> f64 {
        self.sill - self.nugget
    }

    /// Evaluate the model at distance h. γ(0) = 0 by convention.
    pub fn evaluate(&self, h: f64) -> f64 {
        if h < 1e-15 {
            return 0.0;
        }

        let c0 = self.nugget;
        let c = self.partial_sill();
        let a = self.range;

        match self.model {
            VariogramModel::Spherical => {
                if h >= a {
                    c0 + c
                } else {
                    let hr = h / a;
                    c0 + c * (1.5 * hr - 0.5 * hr * hr * hr)
                }
            }
            VariogramModel::Exponential => c0 + c * (1.0 - (-3.0 * h / a).exp()),
            VariogramModel::Gaussian => c0 + c * (1.0 - (-3.0 * h * h / (a * a)).exp()),
        }
    }
}

/// Parameters for empirical variogram computation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariogramParams {
    /// Number of lag bins
    pub n_lags: usize,
    /// Maximum lag distance. `None` uses half the largest pairwise distance.
    pub max_lag: Option<f64>,
}

impl Default for VariogramParams {
    fn default() -> Self {
        Self {
            n_lags: 6,
            max_lag: None,
        }
    }
}

/// Compute the empirical variogram of the points.
///
/// Pairs at zero separation carry no lag information and are skipped.
pub fn empirical_variogram(points: &[SamplePoint], params: &VariogramParams) -> Result<EmpiricalVariogram> {
    let n = points.len();
    if n < 2 {
        return Err(Error::Algorithm("variogram needs at least 2 points".into()));
    }
    if params.n_lags == 0 {
        return Err(Error::InvalidParameter {
            name: "n_lags",
            value: "0".into(),
            reason: "must be at least 1".into(),
        });
    }

    let max_lag = params.max_lag.unwrap_or_else(|| max_pair_distance(points) / 2.0);
    if !(max_lag.is_finite() && max_lag > 0.0) {
        return Err(Error::Algorithm("variogram max lag must be positive".into()));
    }

    let n_lags = params.n_lags;
    let bin_width = max_lag / n_lags as f64;
    let lags: Vec<f64> = (0..n_lags).map(|k| (k as f64 + 0.5) * bin_width).collect();
    let mut sums = vec![0.0_f64; n_lags];
    let mut pair_counts = vec![0_usize; n_lags];

    for i in 0..n {
        for j in (i + 1)..n {
            let d = points[i].dist(points[j].x, points[j].y);
            if d <= 0.0 || d > max_lag {
                continue;
            }
            let bin = ((d / bin_width) as usize).min(n_lags - 1);
            let dz = points[i].value - points[j].value;
            sums[bin] += dz * dz;
            pair_counts[bin] += 1;
        }
    }

    let semivariance = sums
        .iter()
        .zip(&pair_counts)
        .map(|(&s, &c)| if c > 0 { s / (2.0 * c as f64) } else { f64::NAN })
        .collect();

    Ok(EmpiricalVariogram {
        lags,
        semivariance,
        pair_counts,
    })
}

/// Largest separation between any two points.
pub fn max_pair_distance(points: &[SamplePoint]) -> f64 {
    let mut max_dist = 0.0_f64;
    for (i, p) in points.iter().enumerate() {
        for q in &points[i + 1..] {
            max_dist = max_dist.max(p.dist(q.x, q.y));
        }
    }
    max_dist
}

/// Empirical variogram with enough populated bins to fit a model.
///
/// Starts from `params`. A handful of locations often leaves fewer than
/// [`MIN_FIT_BINS`] bins populated within the default half-extent lag; in
/// that case every pair is binned instead and the lag count is the smallest,
/// from [`MIN_FIT_BINS`] up to the number of pairs, that populates enough
/// bins. When no count does, the first variogram is returned unchanged.
pub fn fittable_variogram(points: &[SamplePoint], params: &VariogramParams) -> Result<EmpiricalVariogram> {
    let first = empirical_variogram(points, params)?;
    if first.populated_bins() >= MIN_FIT_BINS {
        return Ok(first);
    }

    let max_lag = max_pair_distance(points);
    let pairs = points.len() * (points.len() - 1) / 2;
    for n_lags in MIN_FIT_BINS..=pairs.min(MAX_ADAPTIVE_LAGS) {
        let candidate = empirical_variogram(
            points,
            &VariogramParams {
                n_lags,
                max_lag: Some(max_lag),
            },
        )?;
        if candidate.populated_bins() >= MIN_FIT_BINS {
            return Ok(candidate);
        }
    }
    Ok(first)
}

const MAX_ADAPTIVE_LAGS: usize = 64;

/// Fit a theoretical model to an empirical variogram.
///
/// Grid search over (nugget, sill, range), minimising the residual sum of
/// squares weighted by pair count.
///
/// # Errors
/// Fewer than 3 populated lag bins, or no spatial variation at all.
pub fn fit_variogram(empirical: &EmpiricalVariogram, model: VariogramModel) -> Result<FittedVariogram> {
    let valid: Vec<(f64, f64, usize)> = empirical
        .lags
        .iter()
        .zip(&empirical.semivariance)
        .zip(&empirical.pair_counts)
        .filter(|((_, sv), cnt)| sv.is_finite() && **cnt > 0)
        .map(|((&lag, &sv), &cnt)| (lag, sv, cnt))
        .collect();

    if valid.len() < MIN_FIT_BINS {
        return Err(Error::Algorithm(format!(
            "variogram fit needs {} populated lag bins, found {}",
            MIN_FIT_BINS,
            valid.len()
        )));
    }

    let max_lag = valid.iter().map(|(l, _, _)| *l).fold(0.0_f64, f64::max);
    let max_sv = valid.iter().map(|(_, sv, _)| *sv).fold(0.0_f64, f64::max);
    if max_sv <= 0.0 {
        return Err(Error::Algorithm("grades show no spatial variation".into()));
    }

    const N_NUGGET: usize = 10;
    const N_SILL: usize = 10;
    const N_RANGE: usize = 20;

    let mut best: Option<FittedVariogram> = None;
    for in_ in 0..=N_NUGGET {
        let nugget = max_sv * in_ as f64 / (2.0 * N_NUGGET as f64);
        for is in 1..=N_SILL {
            let sill = max_sv * is as f64 / N_SILL as f64;
            if sill <= nugget {
                continue;
            }
            for ir in 1..=N_RANGE {
                let range = max_lag * 2.0 * ir as f64 / N_RANGE as f64;
                let mut trial = FittedVariogram { model, nugget, sill, range, rss: 0.0 };
                trial.rss = valid
                    .iter()
                    .map(|&(lag, sv, cnt)| {
                        let r = sv - trial.evaluate(lag);
                        cnt as f64 * r * r
                    })
                    .sum();
                if best.is_none_or(|b| trial.rss < b.rss) {
                    best = Some(trial);
                }
            }
        }
    }

    best.ok_or_else(|| Error::Algorithm("variogram grid search found no candidate".into()))
}
