//! End-to-end tests of the estimation → classification → aggregation
//! pipeline and of batched, resumable estimation runs against a block store.

use std::sync::atomic::{AtomicUsize, Ordering};

use approx::assert_relative_eq;
use geoblock_algorithms::estimation::idw::inverse_distance_weights;
use geoblock_algorithms::prelude::*;
use geoblock_parallel::Cancellable;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Deterministic pseudo-random samples scattered through `extent`.
fn scattered(element: Element, n: usize, extent: (f64, f64, f64), seed: u64) -> Vec<Sample> {
    let mut rng = seed;
    let mut next = || {
        rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (rng >> 33) as f64 / (1u64 << 31) as f64
    };
    (0..n)
        .map(|_| {
            let x = next() * extent.0;
            let y = next() * extent.1;
            let z = next() * extent.2;
            let grade = 0.1 + next() * 4.0;
            Sample::new(x, y, z, grade, element)
        })
        .collect()
}

fn deposit_grid() -> BlockGrid {
    BlockGrid::new(
        BoundingBox::new(Point3::new(0.0, 0.0, 0.0), Point3::new(200.0, 200.0, 40.0)),
        BlockSize::new(10.0, 10.0, 10.0),
    )
    .unwrap()
}

fn deposit_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.add_samples("north-pit", scattered(Element::Gold, 80, (200.0, 200.0, 40.0), 7));
    store.add_samples("north-pit", scattered(Element::Copper, 60, (200.0, 200.0, 40.0), 11));
    store
}

fn gold_set() -> SampleSet {
    SampleSet::new(Element::Gold, scattered(Element::Gold, 80, (200.0, 200.0, 40.0), 7))
}

fn estimated_grid(radius: f64) -> BlockGrid {
    let mut grid = deposit_grid();
    let params = EstimationParams {
        search_radius: radius,
        ..Default::default()
    };
    estimate(&mut grid, &gold_set(), &params, ProcessingMode::Sequential).unwrap();
    grid
}

fn assert_same_estimates(a: &BlockGrid, b: &BlockGrid, elements: &[Element]) {
    for element in elements {
        for (ca, cb) in a.cells().zip(b.cells()) {
            assert_eq!(
                ca.estimate(*element),
                cb.estimate(*element),
                "{} differs at {}",
                element,
                ca.index()
            );
        }
    }
}

/// Block store that delegates to a [`MemoryStore`] and misbehaves on one
/// write: it either fails it, or commits it and then requests cancellation.
struct FlakyStore<'a> {
    inner: &'a MemoryStore,
    writes: AtomicUsize,
    trigger: usize,
    cancel: Option<CancellationToken>,
}

impl<'a> FlakyStore<'a> {
    fn failing_on(inner: &'a MemoryStore, trigger: usize) -> Self {
        Self { inner, writes: AtomicUsize::new(0), trigger, cancel: None }
    }

    fn cancelling_after(inner: &'a MemoryStore, trigger: usize, token: CancellationToken) -> Self {
        Self { inner, writes: AtomicUsize::new(0), trigger, cancel: Some(token) }
    }
}

impl BlockStore for FlakyStore<'_> {
    fn write_estimates(&self, grid_id: &str, element: Element, updates: &[CellUpdate]) -> Result<()> {
        let n = self.writes.fetch_add(1, Ordering::SeqCst);
        if n == self.trigger {
            match &self.cancel {
                Some(token) => {
                    self.inner.write_estimates(grid_id, element, updates)?;
                    token.cancel();
                    return Ok(());
                }
                None => return Err(Error::Store("connection reset by peer".into())),
            }
        }
        self.inner.write_estimates(grid_id, element, updates)
    }

    fn read_estimates(&self, grid_id: &str, element: Element) -> Result<Vec<CellUpdate>> {
        self.inner.read_estimates(grid_id, element)
    }

    fn clear_estimates(&self, grid_id: &str, element: Element) -> Result<()> {
        self.inner.clear_estimates(grid_id, element)
    }
}

// ---------------------------------------------------------------------------
// Worked examples
// ---------------------------------------------------------------------------

#[test]
fn grid_dimensions_follow_block_size() {
    let grid = BlockGrid::new(
        BoundingBox::new(Point3::new(0.0, 0.0, 0.0), Point3::new(100.0, 100.0, 50.0)),
        BlockSize::new(10.0, 10.0, 5.0),
    )
    .unwrap();
    assert_eq!(grid.dims(), (10, 10, 10));
    assert_eq!(grid.len(), 1000);
    assert_eq!(grid.status(), GridStatus::Created);
}

#[test]
fn clustered_samples_all_contribute() {
    let mut grid = BlockGrid::new(
        BoundingBox::new(Point3::new(0.0, 0.0, 0.0), Point3::new(100.0, 100.0, 50.0)),
        BlockSize::new(10.0, 10.0, 5.0),
    )
    .unwrap();
    let centroid = grid.get(4, 4, 4).unwrap().centroid();
    assert_eq!(centroid, Point3::new(45.0, 45.0, 22.5));

    let offsets = [
        (3.0, 0.0, 0.0, 1.2),
        (0.0, 4.0, 0.0, 0.8),
        (0.0, 0.0, 5.0, 2.5),
        (-6.0, 0.0, 0.0, 1.0),
        (0.0, -2.0, -7.0, 3.1),
    ];
    let samples = SampleSet::new(
        Element::Gold,
        offsets
            .iter()
            .map(|&(dx, dy, dz, g)| Sample::new(centroid.x + dx, centroid.y + dy, centroid.z + dz, g, Element::Gold)),
    );
    let params = EstimationParams { search_radius: 50.0, min_samples: 3, max_samples: 12 };
    estimate(&mut grid, &samples, &params, ProcessingMode::Parallel).unwrap();

    let est = *grid.get(4, 4, 4).unwrap().estimate(Element::Gold).unwrap();
    assert_eq!(est.sample_count, 5);

    let weights: Vec<f64> = offsets
        .iter()
        .map(|&(dx, dy, dz, _)| 1.0 / (dx * dx + dy * dy + dz * dz + 1e-10))
        .collect();
    let total: f64 = weights.iter().sum();
    let expected: f64 = weights.iter().zip(&offsets).map(|(w, o)| w / total * o.3).sum();
    assert_relative_eq!(est.grade, expected, epsilon = 1e-12);
    assert_relative_eq!(est.search_distance, (4.0_f64 + 49.0).sqrt(), epsilon = 1e-12);
}

#[test]
fn distance_thirty_with_three_samples_is_indicated() {
    let est = CellEstimate { grade: 1.0, variance: 0.0, sample_count: 3, search_distance: 30.0 };
    assert_eq!(
        classify_block(&est, &ClassificationConfig::default()),
        ResourceCategory::Indicated
    );
}

#[test]
fn collinear_section_falls_back_to_linear() {
    let samples = SampleSet::new(
        Element::Copper,
        vec![
            Sample::new(0.0, 0.0, 100.0, 1.0, Element::Copper),
            Sample::new(5.0, 0.0, 90.0, 2.0, Element::Copper),
            Sample::new(10.0, 0.0, 80.0, 3.0, Element::Copper),
        ],
    );
    let params = SectionParams { resolution: 5, ..Default::default() };
    let section = interpolate_section(&samples, &params).unwrap();

    assert!(section.fell_back());
    assert_eq!(section.method, SectionMethod::DistanceWeighted);
    assert_eq!(section.values.dim(), (5, 5));
    assert!(section.values.iter().all(|v| v.is_finite()));
    assert!(section.values.iter().any(|&v| v > 0.0));
    assert_relative_eq!(section.values[[2, 2]], 2.0, epsilon = 1e-9);
    assert_eq!(section.statistics.data_points, 3);
    assert_relative_eq!(section.statistics.median, 2.0);
}

#[test]
fn drill_hole_intervals_make_a_section() {
    // Two intervals down one hole, one down a second hole
    let samples = SampleSet::new(
        Element::Gold,
        vec![
            Sample::from_collar(0.0, 0.0, 100.0, 0.0, 1.0, Element::Gold),
            Sample::from_collar(0.0, 0.0, 100.0, 10.0, 3.0, Element::Gold),
            Sample::from_collar(10.0, 5.0, 95.0, 0.0, 4.0, Element::Gold),
        ],
    );
    for method in [SectionMethod::Geostatistical, SectionMethod::DistanceWeighted] {
        let params = SectionParams { resolution: 5, method, ..Default::default() };
        let section = interpolate_section(&samples, &params).unwrap();
        assert_eq!(section.values.dim(), (5, 5));
        assert!(section.values.iter().all(|v| v.is_finite()));
        assert_relative_eq!(section.values[[0, 0]], 2.0, epsilon = 1e-9);
        assert_relative_eq!(section.values[[4, 4]], 4.0, epsilon = 1e-9);
        assert_eq!(section.sample_locations.len(), 3);
    }

    let one_hole = SampleSet::new(
        Element::Gold,
        (0..3).map(|k| Sample::from_collar(7.0, 7.0, 50.0, k as f64 * 5.0, 1.0 + k as f64, Element::Gold)),
    );
    let section = interpolate_section(&one_hole, &SectionParams::default()).unwrap();
    assert!(section.fell_back());
    assert!(section.values.iter().all(|&v| (v - 2.0).abs() < 1e-12));
}

#[test]
fn scattered_samples_are_kriged() {
    let samples = SampleSet::new(Element::Copper, scattered(Element::Copper, 60, (200.0, 200.0, 40.0), 11));
    let params = SectionParams { resolution: 25, ..Default::default() };
    let section = interpolate_section(&samples, &params).unwrap();

    assert!(!section.fell_back(), "{:?}", section.fallback_reason);
    assert_eq!(section.method, SectionMethod::Geostatistical);
    assert!(section.variogram.is_some());
    let variance = section.variance.as_ref().unwrap();
    assert_eq!(variance.dim(), (25, 25));
    assert!(variance.iter().all(|v| v.is_finite() && *v >= 0.0));
    assert!(section.values.iter().all(|v| v.is_finite()));
    assert_eq!(section.statistics.data_points, 60);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn weights_sum_to_one() {
    let samples = gold_set();
    let estimator = GradeEstimator::new(&samples, EstimationParams::default()).unwrap();
    let grid = deposit_grid();
    let mut checked = 0;
    for cell in grid.cells().step_by(37) {
        if let Some(selected) = estimator.select(&cell.centroid()) {
            let w = inverse_distance_weights(&selected);
            assert!(selected.len() >= 3 && selected.len() <= 12);
            assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
            checked += 1;
        }
    }
    assert!(checked > 0);
}

#[test]
fn larger_radius_never_loses_blocks() {
    let radii = [15.0, 25.0, 40.0, 60.0];
    let grids: Vec<BlockGrid> = radii.iter().map(|&r| estimated_grid(r)).collect();
    for pair in grids.windows(2) {
        for (small, large) in pair[0].cells().zip(pair[1].cells()) {
            if small.is_estimated(Element::Gold) {
                assert!(large.is_estimated(Element::Gold), "block {} lost", small.index());
            }
        }
        assert!(pair[0].estimated_count(Element::Gold) <= pair[1].estimated_count(Element::Gold));
    }
}

#[test]
fn measured_takes_priority() {
    let mut grid = estimated_grid(50.0);
    let rules = ClassificationConfig::default();
    classify(&mut grid, Element::Gold, 0.0, &rules).unwrap();
    for cell in grid.cells() {
        let Some(est) = cell.estimate(Element::Gold) else {
            assert_eq!(cell.category(Element::Gold), None);
            continue;
        };
        if rules.measured.accepts(est.search_distance, est.sample_count) {
            assert_eq!(cell.category(Element::Gold), Some(ResourceCategory::Measured));
        }
    }
}

#[test]
fn classify_and_aggregate_are_idempotent() {
    let mut grid = estimated_grid(50.0);
    let rules = ClassificationConfig::default();
    let params = AggregationParams::new(1.0, 2.7);

    let first = classify(&mut grid, Element::Gold, 1.0, &rules).unwrap();
    let labels: Vec<_> = grid.cells().map(|c| c.category(Element::Gold)).collect();
    let totals = aggregate(&grid, Element::Gold, &params).unwrap();

    let second = classify(&mut grid, Element::Gold, 1.0, &rules).unwrap();
    let again: Vec<_> = grid.cells().map(|c| c.category(Element::Gold)).collect();
    assert_eq!(first, second);
    assert_eq!(labels, again);
    assert_eq!(totals, aggregate(&grid, Element::Gold, &params).unwrap());
}

#[test]
fn raising_cutoff_never_adds_tonnage() {
    let mut grid = estimated_grid(50.0);
    let rules = ClassificationConfig::default();
    let mut previous: Option<ResourceEstimate> = None;
    for cutoff in [0.0, 0.5, 1.0, 2.0, 3.0, 5.0] {
        classify(&mut grid, Element::Gold, cutoff, &rules).unwrap();
        let current = aggregate(&grid, Element::Gold, &AggregationParams::new(cutoff, 2.7)).unwrap();
        if let Some(prev) = &previous {
            for category in ResourceCategory::REPORTED {
                assert!(
                    current.category(category).tonnage <= prev.category(category).tonnage,
                    "{} tonnage grew at cutoff {}",
                    category,
                    cutoff
                );
            }
            assert!(current.total_tonnage() <= prev.total_tonnage());
        }
        previous = Some(current);
    }
}

#[test]
fn sequential_and_parallel_agree() {
    let samples = gold_set();
    let params = EstimationParams::default();
    let mut seq = deposit_grid();
    let mut par = deposit_grid();
    estimate(&mut seq, &samples, &params, ProcessingMode::Sequential).unwrap();
    estimate(&mut par, &samples, &params, ProcessingMode::ParallelWith(3)).unwrap();
    assert_same_estimates(&seq, &par, &[Element::Gold]);
}

// ---------------------------------------------------------------------------
// Estimation runs
// ---------------------------------------------------------------------------

#[test]
fn batch_size_does_not_change_results() {
    let elements = [Element::Gold, Element::Copper];
    let source = deposit_store();

    let mut baseline = deposit_grid();
    let store = MemoryStore::new();
    EstimationRun::new(&source, &store, "north-pit", "bm-1")
        .with_batch_size(100_000)
        .run(&mut baseline, &elements, None)
        .unwrap();

    for batch_size in [1, 7, 250, 1599] {
        let mut grid = deposit_grid();
        let other = MemoryStore::new();
        let report = EstimationRun::new(&source, &other, "north-pit", "bm-1")
            .with_batch_size(batch_size)
            .with_mode(ProcessingMode::Sequential)
            .run(&mut grid, &elements, None)
            .unwrap();
        assert_eq!(report.batches_committed, 2 * grid.len().div_ceil(batch_size));
        assert_same_estimates(&baseline, &grid, &elements);
        for element in elements {
            assert_eq!(
                store.read_estimates("bm-1", element).unwrap(),
                other.read_estimates("bm-1", element).unwrap()
            );
        }
    }
}

#[test]
fn rerun_replaces_previous_estimates() {
    let source = deposit_store();
    let store = MemoryStore::new();
    let mut grid = deposit_grid();

    let wide = EstimationParams { search_radius: 80.0, ..Default::default() };
    EstimationRun::new(&source, &store, "north-pit", "bm-1")
        .with_params(wide)
        .run(&mut grid, &[Element::Gold], None)
        .unwrap();
    let wide_count = store.estimate_count("bm-1", Element::Gold).unwrap();

    let narrow = EstimationParams { search_radius: 15.0, ..Default::default() };
    EstimationRun::new(&source, &store, "north-pit", "bm-1")
        .with_params(narrow)
        .run(&mut grid, &[Element::Gold], None)
        .unwrap();
    let narrow_count = store.estimate_count("bm-1", Element::Gold).unwrap();

    assert!(narrow_count < wide_count);
    assert_eq!(narrow_count, grid.estimated_count(Element::Gold));
}

#[test]
fn cancelled_run_resumes_to_same_result() {
    let elements = [Element::Gold, Element::Copper];
    let source = deposit_store();

    let mut baseline = deposit_grid();
    let clean = MemoryStore::new();
    let expected = EstimationRun::new(&source, &clean, "north-pit", "bm-1")
        .run(&mut baseline, &elements, None)
        .unwrap();

    let backing = MemoryStore::new();
    let token = CancellationToken::new();
    let flaky = FlakyStore::cancelling_after(&backing, 2, token.clone());
    let mut grid = deposit_grid();
    let err = EstimationRun::new(&source, &flaky, "north-pit", "bm-1")
        .with_batch_size(250)
        .with_cancellation(token.clone())
        .run(&mut grid, &elements, None)
        .unwrap_err();

    let cursor = match err {
        Error::Cancelled { cursor } => cursor,
        other => panic!("expected Cancelled, got {:?}", other),
    };
    assert!(token.is_cancelled());
    assert_eq!(cursor, RunCursor { element: Element::Gold, next_cell: 750 });
    assert_ne!(grid.status(), GridStatus::Estimated);

    let mut resumed = deposit_grid();
    let report = EstimationRun::new(&source, &backing, "north-pit", "bm-1")
        .with_batch_size(250)
        .run(&mut resumed, &elements, Some(cursor))
        .unwrap();

    assert_eq!(report.outcomes, expected.outcomes);
    assert_eq!(resumed.status(), GridStatus::Estimated);
    assert_same_estimates(&baseline, &resumed, &elements);
}

#[test]
fn store_failure_reports_cursor_and_resumes() {
    let elements = [Element::Gold, Element::Copper];
    let source = deposit_store();

    let mut baseline = deposit_grid();
    let clean = MemoryStore::new();
    EstimationRun::new(&source, &clean, "north-pit", "bm-1")
        .run(&mut baseline, &elements, None)
        .unwrap();

    // 1600 blocks in batches of 250: writes 0..=6 are gold, 7.. copper.
    let backing = MemoryStore::new();
    let flaky = FlakyStore::failing_on(&backing, 9);
    let mut grid = deposit_grid();
    let err = EstimationRun::new(&source, &flaky, "north-pit", "bm-1")
        .with_batch_size(250)
        .run(&mut grid, &elements, None)
        .unwrap_err();

    let cursor = match &err {
        Error::StoreInterrupted { cursor, message } => {
            assert!(message.contains("connection reset"));
            *cursor
        }
        other => panic!("expected StoreInterrupted, got {:?}", other),
    };
    assert_eq!(cursor, RunCursor { element: Element::Copper, next_cell: 500 });
    assert_eq!(
        backing.estimate_count("bm-1", Element::Gold).unwrap(),
        baseline.estimated_count(Element::Gold)
    );

    let mut resumed = deposit_grid();
    let report = EstimationRun::new(&source, &backing, "north-pit", "bm-1")
        .with_batch_size(250)
        .run(&mut resumed, &elements, err.cursor())
        .unwrap();
    assert_eq!(report.batches_committed, 5);
    assert_same_estimates(&baseline, &resumed, &elements);
    for element in elements {
        assert_eq!(
            backing.read_estimates("bm-1", element).unwrap(),
            clean.read_estimates("bm-1", element).unwrap()
        );
    }
}

#[test]
fn hydrated_grid_aggregates_like_the_original() {
    let source = deposit_store();
    let store = MemoryStore::new();
    let mut grid = deposit_grid();
    EstimationRun::new(&source, &store, "north-pit", "bm-1")
        .run(&mut grid, &[Element::Gold], None)
        .unwrap();

    let mut reloaded = deposit_grid();
    let loaded = load_estimates(&mut reloaded, &store, "bm-1", &[Element::Gold]).unwrap();
    assert_eq!(loaded, grid.estimated_count(Element::Gold));

    let rules = ClassificationConfig::default();
    let params = AggregationParams::new(0.5, 2.7);
    classify(&mut grid, Element::Gold, 0.5, &rules).unwrap();
    classify(&mut reloaded, Element::Gold, 0.5, &rules).unwrap();
    assert_eq!(
        aggregate(&grid, Element::Gold, &params).unwrap(),
        aggregate(&reloaded, Element::Gold, &params).unwrap()
    );
}
