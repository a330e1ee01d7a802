//! 3D k-d tree over sample positions
//!
//! Radius queries replace the O(blocks × samples) scan of a naive search.
//! Results carry the sample's position in the input slice so callers can
//! break distance ties by input order.
//!
//! Reference:
//! Bentley, J.L. (1975). Multidimensional binary search trees used
//! for associative searching. CACM, 18(9).

use geoblock_core::Point3;

/// A 3D k-d tree over a fixed set of points.
#[derive(Debug)]
pub struct KdTree {
    nodes: Vec<KdNode>,
    points: Vec<Point3>,
}

#[derive(Debug)]
struct KdNode {
    /// Index into `points` (input order)
    point_idx: usize,
    /// Split axis: 0 = x, 1 = y, 2 = z
    axis: u8,
    left: Option<usize>,
    right: Option<usize>,
}

/// A point found by a radius query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position of the point in the slice the tree was built from
    pub index: usize,
    pub distance_sq: f64,
}

impl KdTree {
    /// Build a tree from points. O(n log n) using median selection.
    pub fn build(points: &[Point3]) -> Self {
        let points = points.to_vec();
        let mut nodes = Vec::with_capacity(points.len());
        if !points.is_empty() {
            let mut indices: Vec<usize> = (0..points.len()).collect();
            build_recursive(&points, &mut indices, 0, &mut nodes);
        }
        Self { nodes, points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// All points with squared distance to `query` no greater than
    /// `radius_sq`, in no particular order.
    pub fn within_radius_sq(&self, query: &Point3, radius_sq: f64) -> Vec<Neighbor> {
        let mut results = Vec::new();
        if self.nodes.is_empty() || radius_sq.is_nan() || radius_sq < 0.0 {
            return results;
        }
        self.radius_recursive(0, query, radius_sq, &mut results);
        results
    }

    fn radius_recursive(&self, node_idx: usize, q: &Point3, radius_sq: f64, out: &mut Vec<Neighbor>) {
        let node = &self.nodes[node_idx];
        let p = &self.points[node.point_idx];

        let distance_sq = q.dist_sq(p);
        if distance_sq <= radius_sq {
            out.push(Neighbor { index: node.point_idx, distance_sq });
        }

        let diff = q.axis(node.axis as usize) - p.axis(node.axis as usize);
        let crosses = diff * diff <= radius_sq;

        if let Some(left) = node.left
            && (diff <= 0.0 || crosses)
        {
            self.radius_recursive(left, q, radius_sq, out);
        }
        if let Some(right) = node.right
            && (diff >= 0.0 || crosses)
        {
            self.radius_recursive(right, q, radius_sq, out);
        }
    }
}

fn build_recursive(points: &[Point3], indices: &mut [usize], depth: usize, nodes: &mut Vec<KdNode>) -> usize {
    let axis = (depth % 3) as u8;
    let median = indices.len() / 2;
    indices.select_nth_unstable_by(median, |&a, &b| {
        points[a]
            .axis(axis as usize)
            .total_cmp(&points[b].axis(axis as usize))
    });

    let node_idx = nodes.len();
    nodes.push(KdNode {
        point_idx: indices[median],
        axis,
        left: None,
        right: None,
    });

    let (lower, rest) = indices.split_at_mut(median);
    let upper = &mut rest[1..];

    if !lower.is_empty() {
        let left = build_recursive(points, lower, depth + 1, nodes);
        nodes[node_idx].left = Some(left);
    }
    if !upper.is_empty() {
        let right = build_recursive(points, upper, depth + 1, nodes);
        nodes[node_idx].right = Some(right);
    }

    node_idx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scattered(n: usize, seed: u64) -> Vec<Point3> {
        let mut rng = seed;
        let mut next = || {
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (rng >> 33) as f64 / (1u64 << 31) as f64 * 100.0
        };
        (0..n).map(|_| Point3::new(next(), next(), next())).collect()
    }

    #[test]
    fn test_empty_tree() {
        let tree = KdTree::build(&[]);
        assert!(tree.is_empty());
        assert!(tree.within_radius_sq(&Point3::new(0.0, 0.0, 0.0), 100.0).is_empty());
    }

    #[test]
    fn test_radius_matches_brute_force() {
        let pts = scattered(300, 7);
        let tree = KdTree::build(&pts);
        assert_eq!(tree.len(), 300);

        for q in scattered(40, 99) {
            for radius in [5.0_f64, 20.0, 60.0] {
                let r2 = radius * radius;
                let mut found: Vec<usize> = tree.within_radius_sq(&q, r2).iter().map(|n| n.index).collect();
                found.sort_unstable();
                let expected: Vec<usize> = pts
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| q.dist_sq(p) <= r2)
                    .map(|(i, _)| i)
                    .collect();
                assert_eq!(found, expected, "query {:?} radius {}", q, radius);
            }
        }
    }

    #[test]
    fn test_duplicate_points_all_returned() {
        let pts = vec![Point3::new(1.0, 1.0, 1.0); 5];
        let tree = KdTree::build(&pts);
        let found = tree.within_radius_sq(&Point3::new(1.0, 1.0, 1.0), 0.0);
        assert_eq!(found.len(), 5);
        assert!(found.iter().all(|n| n.distance_sq == 0.0));
    }
}
