//! Estimation run orchestration
//!
//! Estimates several elements into one grid, committing each bounded batch
//! of blocks to the [`BlockStore`] before starting the next. Cancellation is
//! checked between batches. An interrupted run reports a [`RunCursor`] and
//! can be resumed from it; batches already committed are not recomputed.

use geoblock_core::config::EstimationConfig;
use geoblock_core::store::{BlockStore, CellUpdate, RunCursor, SampleSource};
use geoblock_core::{BlockGrid, Element, Error, Result, SampleSet};
use geoblock_parallel::{BatchIterator, Cancellable, CancellationToken, Executor, ProcessingMode};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::estimation::{EstimationParams, EstimationSummary, GradeEstimator, MIN_ESTIMATION_SAMPLES};

/// Result of one element within a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ElementOutcome {
    Estimated(EstimationSummary),
    /// Too few usable samples; the grid and store were left untouched
    Skipped { element: Element, found: usize },
}

impl ElementOutcome {
    pub fn element(&self) -> Element {
        match self {
            ElementOutcome::Estimated(summary) => summary.element,
            ElementOutcome::Skipped { element, .. } => *element,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub grid_id: String,
    pub outcomes: Vec<ElementOutcome>,
    /// Batches committed by this invocation
    pub batches_committed: usize,
}

impl RunReport {
    pub fn estimated_elements(&self) -> Vec<Element> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ElementOutcome::Estimated(_)))
            .map(ElementOutcome::element)
            .collect()
    }
}

/// Batched estimation of several elements into one grid.
pub struct EstimationRun<'a> {
    source: &'a dyn SampleSource,
    store: &'a dyn BlockStore,
    project: String,
    grid_id: String,
    params: EstimationParams,
    batch_size: usize,
    mode: ProcessingMode,
    cancel: Option<CancellationToken>,
}

impl<'a> EstimationRun<'a> {
    pub fn new(
        source: &'a dyn SampleSource,
        store: &'a dyn BlockStore,
        project: impl Into<String>,
        grid_id: impl Into<String>,
    ) -> Self {
        let config = EstimationConfig::default();
        Self {
            source,
            store,
            project: project.into(),
            grid_id: grid_id.into(),
            params: EstimationParams::from(&config),
            batch_size: config.batch_size,
            mode: ProcessingMode::default(),
            cancel: None,
        }
    }

    /// Search parameters and batch size from configuration.
    pub fn with_config(mut self, config: &EstimationConfig) -> Self {
        self.params = EstimationParams::from(config);
        self.batch_size = config.batch_size;
        self
    }

    pub fn with_params(mut self, params: EstimationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Estimate `elements` in order.
    ///
    /// Without a cursor every element starts fresh: its persisted estimates
    /// are cleared first. With a cursor, elements before the cursor element
    /// are taken as complete and hydrated from the store, and the cursor
    /// element continues at `next_cell`.
    ///
    /// # Errors
    /// `Cancelled` or `StoreInterrupted` carry the cursor to resume from.
    pub fn run(
        &self,
        grid: &mut BlockGrid,
        elements: &[Element],
        resume: Option<RunCursor>,
    ) -> Result<RunReport> {
        self.params.validate()?;
        if self.batch_size < 1 {
            return Err(Error::InvalidParameter {
                name: "batch_size",
                value: self.batch_size.to_string(),
                reason: "must be at least 1".into(),
            });
        }

        let first = match resume {
            Some(cursor) => elements
                .iter()
                .position(|&e| e == cursor.element)
                .ok_or_else(|| Error::InvalidParameter {
                    name: "resume",
                    value: cursor.to_string(),
                    reason: "cursor element is not part of this run".into(),
                })?,
            None => 0,
        };

        let executor = Executor::new(self.mode);
        info!(
            grid_id = %self.grid_id,
            project = %self.project,
            elements = elements.len(),
            blocks = grid.len(),
            threads = executor.threads(),
            resumed = resume.is_some(),
            "starting estimation run"
        );

        let mut outcomes = Vec::with_capacity(elements.len());
        for &element in &elements[..first] {
            let found = self.samples(element)?.len();
            if found < MIN_ESTIMATION_SAMPLES {
                outcomes.push(ElementOutcome::Skipped { element, found });
                continue;
            }
            load_estimates(grid, self.store, &self.grid_id, &[element])?;
            outcomes.push(ElementOutcome::Estimated(EstimationSummary::from_grid(grid, element)));
        }

        let mut committed = 0;
        for (position, &element) in elements.iter().enumerate().skip(first) {
            let start = match resume {
                Some(cursor) if position == first => cursor.next_cell,
                _ => 0,
            };
            let outcome = self.run_element(grid, element, start, &executor, &mut committed)?;
            outcomes.push(outcome);
        }

        let report = RunReport {
            grid_id: self.grid_id.clone(),
            outcomes,
            batches_committed: committed,
        };
        if !report.estimated_elements().is_empty() {
            grid.mark_estimated();
        }
        info!(
            grid_id = %self.grid_id,
            estimated = report.estimated_elements().len(),
            batches = committed,
            "estimation run complete"
        );
        Ok(report)
    }

    fn samples(&self, element: Element) -> Result<SampleSet> {
        Ok(SampleSet::new(element, self.source.fetch_samples(&self.project, element)?))
    }

    fn run_element(
        &self,
        grid: &mut BlockGrid,
        element: Element,
        start: usize,
        executor: &Executor,
        committed: &mut usize,
    ) -> Result<ElementOutcome> {
        let samples = self.samples(element)?;
        if samples.len() < MIN_ESTIMATION_SAMPLES {
            warn!(%element, found = samples.len(), required = MIN_ESTIMATION_SAMPLES, "too few samples, element skipped");
            return Ok(ElementOutcome::Skipped {
                element,
                found: samples.len(),
            });
        }
        let estimator = GradeEstimator::new(&samples, self.params)?;

        if start == 0 {
            self.store.clear_estimates(&self.grid_id, element)?;
        } else {
            for cell in grid.as_slice_mut()?.iter_mut().take(start) {
                cell.clear_estimate(element);
            }
            load_estimates(grid, self.store, &self.grid_id, &[element])?;
        }

        let cells = grid.as_slice_mut()?;
        for batch in BatchIterator::starting_at(cells.len(), self.batch_size, start) {
            let cursor = RunCursor {
                element,
                next_cell: batch.start,
            };
            if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                info!(%cursor, "estimation run cancelled");
                return Err(Error::Cancelled { cursor });
            }

            let slice = &mut cells[batch.range()];
            estimator.estimate_cells(slice, executor);
            let updates: Vec<CellUpdate> = slice
                .iter()
                .filter_map(|cell| {
                    cell.estimate(element).map(|&estimate| CellUpdate {
                        index: cell.index(),
                        estimate,
                    })
                })
                .collect();

            if let Err(e) = self.store.write_estimates(&self.grid_id, element, &updates) {
                warn!(%cursor, error = %e, "block store write failed");
                return Err(Error::StoreInterrupted {
                    cursor,
                    message: e.to_string(),
                });
            }
            *committed += 1;
            debug!(
                %element,
                batch = batch.number,
                start = batch.start,
                end = batch.end,
                written = updates.len(),
                "committed batch"
            );
        }

        Ok(ElementOutcome::Estimated(EstimationSummary::from_grid(grid, element)))
    }
}

/// Copy persisted estimates of `elements` into `grid`. Returns the number
/// of cells hydrated.
pub fn load_estimates(
    grid: &mut BlockGrid,
    store: &dyn BlockStore,
    grid_id: &str,
    elements: &[Element],
) -> Result<usize> {
    let mut loaded = 0;
    for &element in elements {
        for update in store.read_estimates(grid_id, element)? {
            let idx = update.index;
            grid.get_mut(idx.i, idx.j, idx.k)?.set_estimate(element, update.estimate);
            loaded += 1;
        }
    }
    debug!(grid_id, loaded, "loaded persisted estimates");
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoblock_core::block::GridStatus;
    use geoblock_core::store::MemoryStore;
    use geoblock_core::{BlockSize, BoundingBox, Point3, Sample};

    fn grid() -> BlockGrid {
        BlockGrid::new(
            BoundingBox::new(Point3::new(0.0, 0.0, 0.0), Point3::new(40.0, 40.0, 20.0)),
            BlockSize::new(10.0, 10.0, 10.0),
        )
        .unwrap()
    }

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.add_samples(
            "p1",
            vec![
                Sample::new(5.0, 5.0, 5.0, 1.0, Element::Gold),
                Sample::new(25.0, 15.0, 5.0, 2.0, Element::Gold),
                Sample::new(35.0, 35.0, 15.0, 3.0, Element::Gold),
                Sample::new(15.0, 30.0, 10.0, 1.5, Element::Gold),
                Sample::new(5.0, 5.0, 5.0, 200.0, Element::Copper),
            ],
        );
        store
    }

    #[test]
    fn test_fresh_run() {
        let store = store();
        let mut g = grid();
        let report = EstimationRun::new(&store, &store, "p1", "g1")
            .with_batch_size(7)
            .run(&mut g, &[Element::Gold, Element::Copper], None)
            .unwrap();

        assert_eq!(report.estimated_elements(), vec![Element::Gold]);
        assert_eq!(report.batches_committed, 32usize.div_ceil(7));
        assert_eq!(
            report.outcomes[1],
            ElementOutcome::Skipped { element: Element::Copper, found: 1 }
        );
        assert_eq!(g.status(), GridStatus::Estimated);
        assert_eq!(
            store.estimate_count("g1", Element::Gold).unwrap(),
            g.estimated_count(Element::Gold)
        );
        assert_eq!(g.estimated_count(Element::Gold), 32);
    }

    #[test]
    fn test_skipped_only_leaves_status() {
        let store = store();
        let mut g = grid();
        let report = EstimationRun::new(&store, &store, "p1", "g1")
            .run(&mut g, &[Element::Zinc], None)
            .unwrap();
        assert!(report.estimated_elements().is_empty());
        assert_eq!(g.status(), GridStatus::Created);
    }

    #[test]
    fn test_cancel_before_first_batch() {
        let store = store();
        let token = CancellationToken::new();
        token.cancel();
        let mut g = grid();
        let err = EstimationRun::new(&store, &store, "p1", "g1")
            .with_cancellation(token)
            .run(&mut g, &[Element::Gold], None)
            .unwrap_err();
        assert_eq!(
            err.cursor(),
            Some(RunCursor { element: Element::Gold, next_cell: 0 })
        );
        assert_eq!(g.estimated_count(Element::Gold), 0);
    }

    #[test]
    fn test_resume_cursor_must_match() {
        let store = store();
        let mut g = grid();
        let cursor = RunCursor { element: Element::Silver, next_cell: 10 };
        let result = EstimationRun::new(&store, &store, "p1", "g1").run(&mut g, &[Element::Gold], Some(cursor));
        assert!(matches!(result, Err(Error::InvalidParameter { name: "resume", .. })));
    }

    #[test]
    fn test_resume_keeps_skipped_elements() {
        let store = store();
        let elements = [Element::Copper, Element::Gold];
        let mut g = grid();
        let fresh = EstimationRun::new(&store, &store, "p1", "g1")
            .with_batch_size(5)
            .run(&mut g, &elements, None)
            .unwrap();

        let mut resumed_grid = grid();
        let cursor = RunCursor { element: Element::Gold, next_cell: 15 };
        let resumed = EstimationRun::new(&store, &store, "p1", "g1")
            .with_batch_size(5)
            .run(&mut resumed_grid, &elements, Some(cursor))
            .unwrap();

        assert_eq!(resumed.outcomes[0], ElementOutcome::Skipped { element: Element::Copper, found: 1 });
        assert_eq!(resumed.outcomes, fresh.outcomes);
        assert_eq!(resumed.estimated_elements(), vec![Element::Gold]);
        assert_eq!(resumed.batches_committed, 4);
    }

    #[test]
    fn test_dedicated_pool_matches_sequential() {
        let (seq_store, pool_store) = (store(), store());
        let (mut seq, mut pooled) = (grid(), grid());
        EstimationRun::new(&seq_store, &seq_store, "p1", "g1")
            .with_batch_size(3)
            .with_mode(ProcessingMode::Sequential)
            .run(&mut seq, &[Element::Gold], None)
            .unwrap();
        let report = EstimationRun::new(&pool_store, &pool_store, "p1", "g1")
            .with_batch_size(3)
            .with_mode(ProcessingMode::ParallelWith(2))
            .run(&mut pooled, &[Element::Gold], None)
            .unwrap();
        assert_eq!(report.batches_committed, 11);
        assert!(seq.cells().zip(pooled.cells()).all(|(a, b)| a == b));
    }

    #[test]
    fn test_load_estimates() {
        let store = store();
        let mut g = grid();
        EstimationRun::new(&store, &store, "p1", "g1")
            .run(&mut g, &[Element::Gold], None)
            .unwrap();

        let mut fresh = grid();
        let loaded = load_estimates(&mut fresh, &store, "g1", &[Element::Gold]).unwrap();
        assert_eq!(loaded, 32);
        for (a, b) in g.cells().zip(fresh.cells()) {
            assert_eq!(a.estimate(Element::Gold), b.estimate(Element::Gold));
        }
    }
}
