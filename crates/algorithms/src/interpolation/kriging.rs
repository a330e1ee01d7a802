//! Ordinary kriging onto a lattice
//!
//! Best Linear Unbiased Estimator using all samples. The kriging system for
//! n sample points:
//! ```text
//! [γ(x₁,x₁) ... γ(x₁,xₙ) 1] [w₁]   [γ(x₁,x₀)]
//! [   ...     ...    ...    .]  [. ] = [   ...    ]
//! [γ(xₙ,x₁) ... γ(xₙ,xₙ) 1] [wₙ]   [γ(xₙ,x₀)]
//! [  1       ...    1       0] [μ ]   [    1     ]
//! ```
//! The left-hand side does not depend on the target x₀, so it is factored
//! once and reused for every lattice point.
//!
//! Reference:
//! Matheron, G. (1963). Principles of geostatistics. Economic Geology.
//! Cressie, N. (1993). Statistics for Spatial Data. Wiley.

use crate::maybe_rayon::*;
use geoblock_core::{Error, Result};
use ndarray::Array2;

use super::variogram::FittedVariogram;
use super::SamplePoint;

/// Kriged estimate and estimation variance, rows along y and columns along x.
#[derive(Debug, Clone)]
pub struct KrigingSurface {
    pub estimate: Array2<f64>,
    pub variance: Array2<f64>,
}

/// Krige `points` at every lattice node (xs[col], ys[row]).
///
/// # Errors
/// - fewer than 2 points
/// - a singular kriging system (coincident or degenerate samples)
pub fn ordinary_kriging(
    points: &[SamplePoint],
    variogram: &FittedVariogram,
    xs: &[f64],
    ys: &[f64],
) -> Result<KrigingSurface> {
    let n = points.len();
    if n < 2 {
        return Err(Error::Algorithm("kriging requires at least 2 sample points".into()));
    }

    let m = n + 1;
    let mut mat = vec![0.0_f64; m * m];
    for i in 0..n {
        for j in 0..n {
            if i != j {
                mat[i * m + j] = variogram.evaluate(points[i].dist(points[j].x, points[j].y));
            }
        }
        mat[i * m + n] = 1.0;
        mat[n * m + i] = 1.0;
    }
    let system = LuFactors::decompose(m, mat)?;

    let rows: Vec<Vec<(f64, f64)>> = (0..ys.len())
        .into_par_iter()
        .map(|row| {
            let y0 = ys[row];
            let mut rhs = vec![0.0_f64; m];
            xs.iter()
                .map(|&x0| {
                    let mut nearest = (f64::INFINITY, 0usize);
                    for (i, p) in points.iter().enumerate() {
                        let h = p.dist(x0, y0);
                        if h < nearest.0 {
                            nearest = (h, i);
                        }
                        rhs[i] = variogram.evaluate(h);
                    }
                    if nearest.0 < 1e-12 {
                        return (points[nearest.1].value, 0.0);
                    }
                    rhs[n] = 1.0;

                    let w = system.solve(&rhs);
                    let estimate: f64 = (0..n).map(|i| w[i] * points[i].value).sum();
                    // σ² = Σ wᵢ·γ(xᵢ,x₀) + μ
                    let variance: f64 = (0..n).map(|i| w[i] * rhs[i]).sum::<f64>() + w[n];
                    (estimate, variance.max(0.0))
                })
                .collect()
        })
        .collect();

    let shape = (ys.len(), xs.len());
    let (estimate, variance): (Vec<f64>, Vec<f64>) = rows.into_iter().flatten().unzip();
    Ok(KrigingSurface {
        estimate: Array2::from_shape_vec(shape, estimate).map_err(|e| Error::Algorithm(e.to_string()))?,
        variance: Array2::from_shape_vec(shape, variance).map_err(|e| Error::Algorithm(e.to_string()))?,
    })
}

/// LU factorisation with partial pivoting of a dense row-major matrix.
#[derive(Debug)]
struct LuFactors {
    n: usize,
    lu: Vec<f64>,
    perm: Vec<usize>,
}

impl LuFactors {
    fn decompose(n: usize, mut a: Vec<f64>) -> Result<Self> {
        let scale = a.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let tol = scale * 1e-12;
        let mut perm: Vec<usize> = (0..n).collect();

        for col in 0..n {
            let mut max_val = a[col * n + col].abs();
            let mut max_row = col;
            for row in (col + 1)..n {
                let val = a[row * n + col].abs();
                if val > max_val {
                    max_val = val;
                    max_row = row;
                }
            }

            if !(max_val > tol) {
                return Err(Error::Algorithm("kriging system is singular".into()));
            }

            if max_row != col {
                for j in 0..n {
                    a.swap(col * n + j, max_row * n + j);
                }
                perm.swap(col, max_row);
            }

            let pivot = a[col * n + col];
            for row in (col + 1)..n {
                let factor = a[row * n + col] / pivot;
                a[row * n + col] = factor;
                for j in (col + 1)..n {
                    a[row * n + j] -= factor * a[col * n + j];
                }
            }
        }

        Ok(Self { n, lu: a, perm })
    }

    fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.n;
        let mut x: Vec<f64> = self.perm.iter().map(|&p| b[p]).collect();
        for i in 0..n {
            for j in 0..i {
                x[i] -= self.lu[i * n + j] * x[j];
            }
        }
        for i in (0..n).rev() {
            for j in (i + 1)..n {
                x[i] -= self.lu[i * n + j] * x[j];
            }
            x[i] /= self.lu[i * n + i];
        }
        x
    }
}
