//! Inverse-distance weighting of selected samples
//!
//! Weights are `1 / (d² + ε)` normalised to sum to one. The ε term keeps a
//! sample sitting exactly on a block centroid finite; it then dominates the
//! estimate without producing a division by zero.

use geoblock_core::CellEstimate;

/// Added to squared distances before inversion.
pub const DISTANCE_EPSILON: f64 = 1e-10;

/// A sample selected to contribute to one block estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contribution {
    /// Position of the sample in its sample set
    pub index: usize,
    /// Centroid-to-sample distance
    pub distance: f64,
}

/// Order candidates nearest first (ties by input order) and keep at most
/// `max_samples`. Returns `None` when fewer than `min_samples` are available.
pub fn select_nearest(
    mut candidates: Vec<Contribution>,
    min_samples: usize,
    max_samples: usize,
) -> Option<Vec<Contribution>> {
    if candidates.len() < min_samples || candidates.is_empty() {
        return None;
    }
    candidates.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.index.cmp(&b.index))
    });
    candidates.truncate(max_samples);
    Some(candidates)
}

/// Normalised inverse-square-distance weights, one per contribution.
pub fn inverse_distance_weights(selected: &[Contribution]) -> Vec<f64> {
    let raw: Vec<f64> = selected
        .iter()
        .map(|c| 1.0 / (c.distance * c.distance + DISTANCE_EPSILON))
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

/// Combine selected samples into a block estimate.
///
/// `grade_of` maps a contribution's sample index to its grade. The variance
/// is the population variance of the contributing grades.
pub fn weighted_estimate(selected: &[Contribution], grade_of: impl Fn(usize) -> f64) -> Option<CellEstimate> {
    if selected.is_empty() {
        return None;
    }
    let weights = inverse_distance_weights(selected);
    let grades: Vec<f64> = selected.iter().map(|c| grade_of(c.index)).collect();

    let grade: f64 = weights.iter().zip(&grades).map(|(w, g)| w * g).sum();

    let n = grades.len() as f64;
    let mean = grades.iter().sum::<f64>() / n;
    let variance = grades.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / n;

    let search_distance = selected
        .iter()
        .map(|c| c.distance)
        .fold(0.0_f64, f64::max);

    Some(CellEstimate {
        grade,
        variance,
        sample_count: selected.len(),
        search_distance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(index: usize, distance: f64) -> Contribution {
        Contribution { index, distance }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let sel = vec![c(0, 1.0), c(1, 2.0), c(2, 7.5), c(3, 30.0)];
        let w = inverse_distance_weights(&sel);
        let total: f64 = w.iter().sum();
        assert!((total - 1.0).abs() < 1e-9, "sum = {}", total);
        assert!(w.windows(2).all(|p| p[0] > p[1]), "closer samples weigh more");
    }

    #[test]
    fn test_coincident_sample_dominates() {
        let sel = vec![c(0, 0.0), c(1, 10.0), c(2, 10.0)];
        let est = weighted_estimate(&sel, |i| [5.0, 1.0, 1.0][i]).unwrap();
        assert!((est.grade - 5.0).abs() < 1e-6, "grade = {}", est.grade);
        assert!(est.grade.is_finite());
    }

    #[test]
    fn test_selection_order_and_truncation() {
        let cands = vec![c(4, 3.0), c(1, 3.0), c(2, 1.0), c(0, 9.0)];
        let sel = select_nearest(cands, 2, 3).unwrap();
        assert_eq!(sel, vec![c(2, 1.0), c(1, 3.0), c(4, 3.0)]);
        assert!(select_nearest(vec![c(0, 1.0)], 2, 5).is_none());
        assert!(select_nearest(Vec::new(), 0, 5).is_none());
    }

    #[test]
    fn test_estimate_statistics() {
        let sel = vec![c(0, 2.0), c(1, 2.0), c(2, 4.0)];
        let est = weighted_estimate(&sel, |i| [1.0, 3.0, 2.0][i]).unwrap();
        // weights 4:4:1 over grades 1, 3, 2
        assert!((est.grade - 18.0 / 9.0).abs() < 1e-9);
        assert!((est.variance - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(est.sample_count, 3);
        assert_eq!(est.search_distance, 4.0);
    }
}
