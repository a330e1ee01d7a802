//! Main BlockGrid type

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::block::{BlockCell, CellIndex, ResourceCategory};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::geometry::{BlockSize, BoundingBox, Point3};

/// Hard cap on the number of blocks in a single grid.
pub const MAX_BLOCKS: usize = 1_000_000;

/// Default cap on the number of cells returned by [`BlockGrid::query`].
pub const DEFAULT_QUERY_LIMIT: usize = 100_000;

/// Immutable identity of a block grid: extents, block size and dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridDescriptor {
    pub bbox: BoundingBox,
    pub block_size: BlockSize,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl GridDescriptor {
    /// Validate the inputs and compute grid dimensions without allocating cells.
    ///
    /// Each dimension is `ceil(extent / size)`. Grids with more than
    /// [`MAX_BLOCKS`] cells are rejected with [`Error::GridTooLarge`].
    pub fn new(bbox: BoundingBox, block_size: BlockSize) -> Result<Self> {
        bbox.validate()?;
        block_size.validate()?;

        let extent = bbox.extent();
        let size = block_size.as_array();
        // `as` saturates, so absurd extents still land on the capacity check
        let dims: [u128; 3] = std::array::from_fn(|a| (extent[a] / size[a]).ceil() as u128);
        let total = dims[0]
            .saturating_mul(dims[1])
            .saturating_mul(dims[2]);

        if total > MAX_BLOCKS as u128 {
            return Err(Error::GridTooLarge {
                nx: dims[0] as usize,
                ny: dims[1] as usize,
                nz: dims[2] as usize,
                total,
                max: MAX_BLOCKS,
            });
        }

        Ok(Self {
            bbox,
            block_size,
            nx: dims[0] as usize,
            ny: dims[1] as usize,
            nz: dims[2] as usize,
        })
    }

    /// Dimensions as (nx, ny, nz)
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    /// Total number of blocks
    pub fn total_blocks(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Volume of every block
    pub fn block_volume(&self) -> f64 {
        self.block_size.volume()
    }

    /// Centroid of block (i, j, k): `min + (index + 0.5) * size` per axis.
    pub fn centroid(&self, index: CellIndex) -> Point3 {
        let b = &self.bbox;
        let s = &self.block_size;
        Point3::new(
            b.x_min + (index.i as f64 + 0.5) * s.x,
            b.y_min + (index.j as f64 + 0.5) * s.y,
            b.z_min + (index.k as f64 + 0.5) * s.z,
        )
    }

    /// Row-major linear offset of (i, j, k), matching the cell storage order.
    pub fn linear_index(&self, index: CellIndex) -> usize {
        (index.i * self.ny + index.j) * self.nz + index.k
    }

    /// Inverse of [`linear_index`](Self::linear_index).
    pub fn cell_index(&self, linear: usize) -> CellIndex {
        let k = linear % self.nz;
        let rest = linear / self.nz;
        CellIndex::new(rest / self.ny, rest % self.ny, k)
    }
}

/// Lifecycle status of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridStatus {
    #[default]
    Created,
    /// At least one element run has completed over the whole grid
    Estimated,
}

/// Filter for [`BlockGrid::query`].
#[derive(Debug, Clone)]
pub struct BlockQuery {
    /// Element whose grade and category are filtered on
    pub element: Element,
    /// Only cells carrying this category
    pub category: Option<ResourceCategory>,
    /// Only estimated cells with grade >= this value
    pub min_grade: Option<f64>,
    /// Maximum number of cells returned
    pub limit: usize,
}

impl BlockQuery {
    pub fn new(element: Element) -> Self {
        Self {
            element,
            category: None,
            min_grade: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

/// A regular 3D block model.
///
/// Cells are materialized once at construction in (i, j, k) row-major order
/// and stored in an `Array3` of shape (nx, ny, nz).
#[derive(Debug, Clone)]
pub struct BlockGrid {
    descriptor: GridDescriptor,
    cells: Array3<BlockCell>,
    status: GridStatus,
}

impl BlockGrid {
    /// Build a grid over `bbox` with blocks of `block_size`.
    pub fn new(bbox: BoundingBox, block_size: BlockSize) -> Result<Self> {
        let descriptor = GridDescriptor::new(bbox, block_size)?;
        Self::from_descriptor(descriptor)
    }

    /// Materialize the cells described by `descriptor`.
    pub fn from_descriptor(descriptor: GridDescriptor) -> Result<Self> {
        if descriptor.total_blocks() > MAX_BLOCKS {
            return Err(Error::GridTooLarge {
                nx: descriptor.nx,
                ny: descriptor.ny,
                nz: descriptor.nz,
                total: descriptor.total_blocks() as u128,
                max: MAX_BLOCKS,
            });
        }

        let cells = Array3::from_shape_fn(descriptor.dims(), |(i, j, k)| {
            let index = CellIndex::new(i, j, k);
            BlockCell::new(index, descriptor.centroid(index))
        });

        debug!(
            nx = descriptor.nx,
            ny = descriptor.ny,
            nz = descriptor.nz,
            "materialized block grid"
        );

        Ok(Self {
            descriptor,
            cells,
            status: GridStatus::Created,
        })
    }

    pub fn descriptor(&self) -> &GridDescriptor {
        &self.descriptor
    }

    // Dimensions

    /// Dimensions as (nx, ny, nz)
    pub fn dims(&self) -> (usize, usize, usize) {
        self.descriptor.dims()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the grid has no cells
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Volume of every block
    pub fn block_volume(&self) -> f64 {
        self.descriptor.block_volume()
    }

    // Data access

    /// Get the cell at (i, j, k)
    pub fn get(&self, i: usize, j: usize, k: usize) -> Result<&BlockCell> {
        self.cells.get((i, j, k)).ok_or_else(|| self.out_of_bounds(i, j, k))
    }

    /// Get the cell at (i, j, k) mutably
    pub fn get_mut(&mut self, i: usize, j: usize, k: usize) -> Result<&mut BlockCell> {
        let err = self.out_of_bounds(i, j, k);
        self.cells.get_mut((i, j, k)).ok_or(err)
    }

    fn out_of_bounds(&self, i: usize, j: usize, k: usize) -> Error {
        let (nx, ny, nz) = self.dims();
        Error::IndexOutOfBounds { i, j, k, nx, ny, nz }
    }

    /// All cells in storage order
    pub fn cells(&self) -> impl Iterator<Item = &BlockCell> {
        self.cells.iter()
    }

    /// Contiguous view of the cells in storage order.
    pub fn as_slice(&self) -> Result<&[BlockCell]> {
        self.cells
            .as_slice()
            .ok_or_else(|| Error::Other("block storage is not contiguous".into()))
    }

    /// Contiguous mutable view of the cells in storage order.
    pub fn as_slice_mut(&mut self) -> Result<&mut [BlockCell]> {
        self.cells
            .as_slice_mut()
            .ok_or_else(|| Error::Other("block storage is not contiguous".into()))
    }

    // Status

    pub fn status(&self) -> GridStatus {
        self.status
    }

    /// Flag the grid as estimated. Called once by the run orchestrator after
    /// every element of a run has completed.
    pub fn mark_estimated(&mut self) {
        self.status = GridStatus::Estimated;
    }

    /// Count of cells estimated for `element`
    pub fn estimated_count(&self, element: Element) -> usize {
        self.cells.iter().filter(|c| c.is_estimated(element)).count()
    }

    /// Select cells for display, ordered top bench first (k descending), then j, i.
    pub fn query(&self, query: &BlockQuery) -> Vec<&BlockCell> {
        let (nx, ny, nz) = self.dims();
        let mut out = Vec::new();
        for k in (0..nz).rev() {
            for j in 0..ny {
                for i in 0..nx {
                    if out.len() >= query.limit {
                        return out;
                    }
                    let cell = &self.cells[(i, j, k)];
                    if let Some(category) = query.category
                        && cell.category(query.element) != Some(category)
                    {
                        continue;
                    }
                    if let Some(min_grade) = query.min_grade {
                        match cell.grade(query.element) {
                            Some(g) if g >= min_grade => {}
                            _ => continue,
                        }
                    }
                    out.push(cell);
                }
            }
        }
        out
    }
}
