//! Error types for GeoBlock

use thiserror::Error;

use crate::element::Element;
use crate::store::RunCursor;

/// Main error type for GeoBlock operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unknown element '{0}'. Must be one of: au_ppm, ag_ppm, cu_ppm, pb_ppm, zn_ppm")]
    UnknownElement(String),

    #[error("Block model too large: {nx}x{ny}x{nz} = {total} blocks (maximum is {max}). Increase block size or reduce extents")]
    GridTooLarge {
        nx: usize,
        ny: usize,
        nz: usize,
        total: u128,
        max: usize,
    },

    #[error("Not enough samples for {element}: found {found}, need at least {required}")]
    InsufficientSamples {
        element: Element,
        found: usize,
        required: usize,
    },

    #[error("Index out of bounds: ({i}, {j}, {k}) in grid of size ({nx}, {ny}, {nz})")]
    IndexOutOfBounds {
        i: usize,
        j: usize,
        k: usize,
        nx: usize,
        ny: usize,
        nz: usize,
    },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Store failed during estimation at {cursor}: {message}")]
    StoreInterrupted { cursor: RunCursor, message: String },

    #[error("Estimation cancelled at {cursor}")]
    Cancelled { cursor: RunCursor },

    #[error("Configuration error in {path}: {message}")]
    Config { path: String, message: String },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Resumption point carried by interrupted runs, if any.
    pub fn cursor(&self) -> Option<RunCursor> {
        match self {
            Error::StoreInterrupted { cursor, .. } | Error::Cancelled { cursor } => Some(*cursor),
            _ => None,
        }
    }
}

/// Result type alias for GeoBlock operations
pub type Result<T> = std::result::Result<T, Error>;
