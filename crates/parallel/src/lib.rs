//! # GeoBlock Parallel
//!
//! Execution strategies for block estimation.
//!
//! This crate provides:
//! - Bounded batches over a block range
//! - Sequential or Rayon-backed processing of a batch
//! - Cooperative cancellation checked between batches

pub mod batch;
pub mod cancel;
pub mod strategy;

pub use batch::{Batch, BatchIterator};
pub use cancel::{Cancellable, CancellationToken};
pub use strategy::{Executor, ParallelStrategy, ProcessingMode};
