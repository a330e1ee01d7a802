//! Block model data structures

mod cell;
mod grid;

pub use cell::{BlockCell, CellEstimate, CellIndex, ResourceCategory};
pub use grid::{BlockGrid, BlockQuery, GridDescriptor, GridStatus, DEFAULT_QUERY_LIMIT, MAX_BLOCKS};
