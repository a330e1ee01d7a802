//! Linear interpolation over a Delaunay triangulation
//!
//! Lattice nodes inside a triangle take the barycentric blend of its three
//! vertex values. Nodes outside the convex hull are NaN.
//!
//! Samples lying on one line, including a single pair, have no triangles;
//! nodes on that line are interpolated along it and everything else is NaN.
//! A single location only fills the nodes that coincide with it.
//!
//! Triangulation uses the incremental Bowyer-Watson algorithm.

use crate::maybe_rayon::*;
use geoblock_core::{Error, Result};
use ndarray::Array2;

use super::{coordinate_moments, is_collinear, SamplePoint};

/// A triangle defined by three vertex indices
#[derive(Debug, Clone, Copy)]
struct Triangle {
    v0: usize,
    v1: usize,
    v2: usize,
}

#[derive(Debug, Clone, Copy)]
struct Circumcircle {
    cx: f64,
    cy: f64,
    radius_sq: f64,
}

fn circumcircle(p0: &SamplePoint, p1: &SamplePoint, p2: &SamplePoint) -> Option<Circumcircle> {
    let (ax, ay) = (p0.x, p0.y);
    let (bx, by) = (p1.x, p1.y);
    let (cx, cy) = (p2.x, p2.y);

    let d = 2.0 * (ax * (by - cy) + bx * (cy - ay) + cx * (ay - by));
    if d.abs() < 1e-12 {
        return None;
    }

    let a2 = ax * ax + ay * ay;
    let b2 = bx * bx + by * by;
    let c2 = cx * cx + cy * cy;
    let ux = (a2 * (by - cy) + b2 * (cy - ay) + c2 * (ay - by)) / d;
    let uy = (a2 * (cx - bx) + b2 * (ax - cx) + c2 * (bx - ax)) / d;

    Some(Circumcircle {
        cx: ux,
        cy: uy,
        radius_sq: p0.dist_sq(ux, uy),
    })
}

/// Barycentric coordinates (u, v, w) of (px, py) in triangle (p0, p1, p2).
fn barycentric(px: f64, py: f64, p0: &SamplePoint, p1: &SamplePoint, p2: &SamplePoint) -> (f64, f64, f64) {
    let v0x = p1.x - p0.x;
    let v0y = p1.y - p0.y;
    let v1x = p2.x - p0.x;
    let v1y = p2.y - p0.y;
    let v2x = px - p0.x;
    let v2y = py - p0.y;

    let dot00 = v0x * v0x + v0y * v0y;
    let dot01 = v0x * v1x + v0y * v1y;
    let dot02 = v0x * v2x + v0y * v2y;
    let dot11 = v1x * v1x + v1y * v1y;
    let dot12 = v1x * v2x + v1y * v2y;

    let inv_denom = 1.0 / (dot00 * dot11 - dot01 * dot01);
    let v = (dot11 * dot02 - dot01 * dot12) * inv_denom;
    let w = (dot00 * dot12 - dot01 * dot02) * inv_denom;
    (1.0 - v - w, v, w)
}

/// Delaunay triangulation of `points`. Empty when the points span no area.
fn delaunay(points: &[SamplePoint]) -> Vec<Triangle> {
    if points.len() < 3 {
        return Vec::new();
    }

    let (mut min_x, mut min_y) = (f64::MAX, f64::MAX);
    let (mut max_x, mut max_y) = (f64::MIN, f64::MIN);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    let dx = max_x - min_x;
    let dy = max_y - min_y;
    let delta = dx.max(dy).max(1.0) * 100.0;

    // Super-triangle vertices occupy indices 0..3
    let mut vertices: Vec<SamplePoint> = vec![
        SamplePoint::new(min_x - 10.0 * delta, min_y - delta, 0.0),
        SamplePoint::new(min_x + 0.5 * dx, max_y + 10.0 * delta, 0.0),
        SamplePoint::new(max_x + 10.0 * delta, min_y - delta, 0.0),
    ];
    let mut triangles = vec![Triangle { v0: 0, v1: 1, v2: 2 }];

    for point in points {
        let vi = vertices.len();
        vertices.push(*point);

        let mut bad: Vec<usize> = triangles
            .iter()
            .enumerate()
            .filter(|(_, t)| {
                circumcircle(&vertices[t.v0], &vertices[t.v1], &vertices[t.v2])
                    .is_some_and(|cc| point.dist_sq(cc.cx, cc.cy) <= cc.radius_sq)
            })
            .map(|(i, _)| i)
            .collect();

        // Boundary of the cavity: edges not shared by two bad triangles
        let mut boundary: Vec<(usize, usize)> = Vec::new();
        for &bi in &bad {
            let t = triangles[bi];
            for (ea, eb) in [(t.v0, t.v1), (t.v1, t.v2), (t.v2, t.v0)] {
                let shared = bad.iter().any(|&oi| {
                    oi != bi && {
                        let o = triangles[oi];
                        [(o.v0, o.v1), (o.v1, o.v2), (o.v2, o.v0)]
                            .iter()
                            .any(|&(oa, ob)| (oa == ea && ob == eb) || (oa == eb && ob == ea))
                    }
                });
                if !shared {
                    boundary.push((ea, eb));
                }
            }
        }

        bad.sort_unstable_by(|a, b| b.cmp(a));
        for bi in bad {
            triangles.swap_remove(bi);
        }
        triangles.extend(boundary.into_iter().map(|(ea, eb)| Triangle { v0: ea, v1: eb, v2: vi }));
    }

    triangles
        .into_iter()
        .filter(|t| t.v0 >= 3 && t.v1 >= 3 && t.v2 >= 3)
        .filter(|t| circumcircle(&vertices[t.v0], &vertices[t.v1], &vertices[t.v2]).is_some())
        .map(|t| Triangle {
            v0: t.v0 - 3,
            v1: t.v1 - 3,
            v2: t.v2 - 3,
        })
        .collect()
}

/// Samples ordered along their common line.
struct LineProfile {
    origin: (f64, f64),
    direction: (f64, f64),
    /// (position along the line, value), sorted by position
    stations: Vec<(f64, f64)>,
    tolerance: f64,
}

impl LineProfile {
    fn new(points: &[SamplePoint]) -> Self {
        let ((mx, my), (sxx, syy, sxy)) = coordinate_moments(points);
        // Principal axis of the coordinate covariance
        let half_diff = (sxx - syy) / 2.0;
        let lambda = (sxx + syy) / 2.0 + (half_diff * half_diff + sxy * sxy).sqrt();
        let (ux, uy) = if sxy != 0.0 {
            (lambda - syy, sxy)
        } else if sxx >= syy {
            (1.0, 0.0)
        } else {
            (0.0, 1.0)
        };
        let norm = (ux * ux + uy * uy).sqrt();
        let direction = (ux / norm, uy / norm);

        let mut stations: Vec<(f64, f64)> = points
            .iter()
            .map(|p| ((p.x - mx) * direction.0 + (p.y - my) * direction.1, p.value))
            .collect();
        stations.sort_by(|a, b| a.0.total_cmp(&b.0));

        let span = match (stations.first(), stations.last()) {
            (Some(a), Some(b)) => b.0 - a.0,
            _ => 0.0,
        };
        Self {
            origin: (mx, my),
            direction,
            stations,
            tolerance: 1e-9 * span.max(1.0),
        }
    }

    fn value_at(&self, x: f64, y: f64) -> f64 {
        let (dx, dy) = (x - self.origin.0, y - self.origin.1);
        let along = dx * self.direction.0 + dy * self.direction.1;
        let across = dx * self.direction.1 - dy * self.direction.0;
        if across.abs() > self.tolerance {
            return f64::NAN;
        }

        let (Some(first), Some(last)) = (self.stations.first(), self.stations.last()) else {
            return f64::NAN;
        };
        if along < first.0 - self.tolerance || along > last.0 + self.tolerance {
            return f64::NAN;
        }
        let t = along.clamp(first.0, last.0);
        let idx = self.stations.partition_point(|s| s.0 < t);
        let Some(&(t1, v1)) = self.stations.get(idx) else {
            return last.1;
        };
        if idx == 0 || t1 == t {
            return v1;
        }
        let (t0, v0) = self.stations[idx - 1];
        v0 + (v1 - v0) * (t - t0) / (t1 - t0)
    }
}

/// Linearly interpolate `points` at every lattice node (xs[col], ys[row]).
///
/// Points should be free of coincident duplicates. Nodes that cannot be
/// interpolated are NaN.
///
/// # Errors
/// No points at all.
pub fn linear_interpolation(points: &[SamplePoint], xs: &[f64], ys: &[f64]) -> Result<Array2<f64>> {
    if points.is_empty() {
        return Err(Error::Algorithm("linear interpolation requires at least 1 point".into()));
    }

    // Work relative to the lower-left sample; project coordinates are large.
    let (ox, oy) = points
        .iter()
        .fold((f64::INFINITY, f64::INFINITY), |(x, y), p| (x.min(p.x), y.min(p.y)));
    let local: Vec<SamplePoint> = points
        .iter()
        .map(|p| SamplePoint::new(p.x - ox, p.y - oy, p.value))
        .collect();

    let triangles = delaunay(&local);
    let line = (triangles.is_empty() || is_collinear(&local)).then(|| LineProfile::new(&local));

    let data: Vec<f64> = (0..ys.len())
        .into_par_iter()
        .flat_map(|row| {
            let py = ys[row] - oy;
            xs.iter()
                .map(|&x| {
                    let px = x - ox;
                    if let Some(line) = &line {
                        return line.value_at(px, py);
                    }
                    for tri in &triangles {
                        let (p0, p1, p2) = (&local[tri.v0], &local[tri.v1], &local[tri.v2]);
                        let (u, v, w) = barycentric(px, py, p0, p1, p2);
                        const EPS: f64 = -1e-10;
                        if u >= EPS && v >= EPS && w >= EPS {
                            return u * p0.value + v * p1.value + w * p2.value;
                        }
                    }
                    f64::NAN
                })
                .collect::<Vec<f64>>()
        })
        .collect();

    Array2::from_shape_vec((ys.len(), xs.len()), data).map_err(|e| Error::Algorithm(e.to_string()))
}
