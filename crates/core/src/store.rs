//! Data store collaborators
//!
//! Estimation reads samples through [`SampleSource`] and persists block
//! estimates through [`BlockStore`]. Both are injected by the caller; the
//! crate never opens connections itself. [`MemoryStore`] implements both and
//! backs the CLI and tests.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::block::{CellEstimate, CellIndex};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::sample::Sample;

/// Source of assay samples.
pub trait SampleSource {
    /// Samples of `element` in `project`, with positive grades and resolved
    /// 3D positions. Order must be stable between calls.
    fn fetch_samples(&self, project: &str, element: Element) -> Result<Vec<Sample>>;
}

/// Persistence for block estimates.
///
/// Writes are keyed by cell index and overwrite earlier values, so replaying
/// a batch after a failure is safe.
pub trait BlockStore {
    fn write_estimates(&self, grid_id: &str, element: Element, updates: &[CellUpdate]) -> Result<()>;

    fn read_estimates(&self, grid_id: &str, element: Element) -> Result<Vec<CellUpdate>>;

    /// Drop every persisted estimate of `element` before a fresh run.
    fn clear_estimates(&self, grid_id: &str, element: Element) -> Result<()>;
}

/// One estimated block to persist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellUpdate {
    pub index: CellIndex,
    pub estimate: CellEstimate,
}

/// Position from which an interrupted estimation run can resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCursor {
    /// Element being estimated when the run stopped
    pub element: Element,
    /// First cell (storage order) whose batch was not committed
    pub next_cell: usize,
}

impl fmt::Display for RunCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cell {}", self.element, self.next_cell)
    }
}

/// Number of usable samples for an element in a project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementAvailability {
    pub element: Element,
    pub name: &'static str,
    pub unit: &'static str,
    pub sample_count: usize,
}

/// List the elements of `project` that have at least one usable sample.
pub fn available_elements<S: SampleSource + ?Sized>(
    source: &S,
    project: &str,
) -> Result<Vec<ElementAvailability>> {
    let mut out = Vec::new();
    for element in Element::ALL {
        let count = source
            .fetch_samples(project, element)?
            .iter()
            .filter(|s| s.element == element && s.is_valid())
            .count();
        if count > 0 {
            out.push(ElementAvailability {
                element,
                name: element.name(),
                unit: element.unit(),
                sample_count: count,
            });
        }
    }
    Ok(out)
}

type EstimateTable = BTreeMap<CellIndex, CellEstimate>;

/// In-memory implementation of both store traits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    samples: HashMap<String, Vec<Sample>>,
    estimates: Mutex<HashMap<(String, Element), EstimateTable>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register samples for a project. Samples are appended in order.
    pub fn add_samples(&mut self, project: &str, samples: impl IntoIterator<Item = Sample>) {
        self.samples
            .entry(project.to_string())
            .or_default()
            .extend(samples);
    }

    /// Number of persisted estimates for (grid, element).
    pub fn estimate_count(&self, grid_id: &str, element: Element) -> Result<usize> {
        let guard = self.lock()?;
        Ok(guard
            .get(&(grid_id.to_string(), element))
            .map_or(0, |t| t.len()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<(String, Element), EstimateTable>>> {
        self.estimates
            .lock()
            .map_err(|_| Error::Store("estimate table lock poisoned".into()))
    }
}

impl SampleSource for MemoryStore {
    fn fetch_samples(&self, project: &str, element: Element) -> Result<Vec<Sample>> {
        Ok(self
            .samples
            .get(project)
            .map(|all| {
                all.iter()
                    .filter(|s| s.element == element && s.is_valid())
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl BlockStore for MemoryStore {
    fn write_estimates(&self, grid_id: &str, element: Element, updates: &[CellUpdate]) -> Result<()> {
        let mut guard = self.lock()?;
        let table = guard.entry((grid_id.to_string(), element)).or_default();
        for u in updates {
            table.insert(u.index, u.estimate);
        }
        debug!(grid_id, %element, count = updates.len(), "persisted block estimates");
        Ok(())
    }

    fn read_estimates(&self, grid_id: &str, element: Element) -> Result<Vec<CellUpdate>> {
        let guard = self.lock()?;
        Ok(guard
            .get(&(grid_id.to_string(), element))
            .map(|t| {
                t.iter()
                    .map(|(&index, &estimate)| CellUpdate { index, estimate })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn clear_estimates(&self, grid_id: &str, element: Element) -> Result<()> {
        let mut guard = self.lock()?;
        guard.remove(&(grid_id.to_string(), element));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        let mut s = MemoryStore::new();
        s.add_samples(
            "alpha",
            vec![
                Sample::new(0.0, 0.0, 0.0, 1.0, Element::Gold),
                Sample::new(1.0, 0.0, 0.0, 2.0, Element::Gold),
                Sample::new(2.0, 0.0, 0.0, 0.0, Element::Copper),
                Sample::new(3.0, 0.0, 0.0, 4.0, Element::Zinc),
            ],
        );
        s
    }

    #[test]
    fn test_fetch_filters_element() {
        let s = store();
        assert_eq!(s.fetch_samples("alpha", Element::Gold).unwrap().len(), 2);
        assert!(s.fetch_samples("alpha", Element::Copper).unwrap().is_empty());
        assert!(s.fetch_samples("beta", Element::Gold).unwrap().is_empty());
    }

    #[test]
    fn test_available_elements() {
        let s = store();
        let avail = available_elements(&s, "alpha").unwrap();
        let ids: Vec<_> = avail.iter().map(|a| (a.element, a.sample_count)).collect();
        assert_eq!(ids, vec![(Element::Gold, 2), (Element::Zinc, 1)]);
        assert_eq!(avail[0].name, "Gold (Au)");
    }

    #[test]
    fn test_writes_are_idempotent() {
        let s = MemoryStore::new();
        let update = CellUpdate {
            index: CellIndex::new(0, 1, 2),
            estimate: CellEstimate { grade: 1.5, variance: 0.2, sample_count: 3, search_distance: 9.0 },
        };
        s.write_estimates("g1", Element::Gold, &[update]).unwrap();
        s.write_estimates("g1", Element::Gold, &[update]).unwrap();
        assert_eq!(s.estimate_count("g1", Element::Gold).unwrap(), 1);
        assert_eq!(s.read_estimates("g1", Element::Gold).unwrap(), vec![update]);
        assert_eq!(s.estimate_count("g1", Element::Silver).unwrap(), 0);

        s.clear_estimates("g1", Element::Gold).unwrap();
        assert_eq!(s.estimate_count("g1", Element::Gold).unwrap(), 0);
    }

    #[test]
    fn test_cursor_display() {
        let c = RunCursor { element: Element::Copper, next_cell: 1500 };
        assert_eq!(c.to_string(), "cu_ppm cell 1500");
    }
}
