//! Parallel processing strategies

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Processing mode for per-block work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Single-threaded processing
    Sequential,
    /// Parallel processing using all available cores
    #[default]
    Parallel,
    /// Parallel with specified number of threads
    ParallelWith(usize),
}

/// Strategy for executing independent work items
pub trait ParallelStrategy {
    /// Apply `f` to every item of `items`. Items are disjoint, so `f` needs
    /// no synchronization; the call returns once every item is done.
    fn for_each_mut<T, F>(&self, items: &mut [T], f: F)
    where
        T: Send,
        F: Fn(&mut T) + Sync + Send;
}

impl ParallelStrategy for ProcessingMode {
    #[cfg(feature = "parallel")]
    fn for_each_mut<T, F>(&self, items: &mut [T], f: F)
    where
        T: Send,
        F: Fn(&mut T) + Sync + Send,
    {
        match self {
            ProcessingMode::Sequential => items.iter_mut().for_each(f),
            ProcessingMode::Parallel => items.par_iter_mut().for_each(f),
            ProcessingMode::ParallelWith(threads) => match build_pool(*threads) {
                Some(pool) => pool.install(|| items.par_iter_mut().for_each(f)),
                None => items.par_iter_mut().for_each(f),
            },
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn for_each_mut<T, F>(&self, items: &mut [T], f: F)
    where
        T: Send,
        F: Fn(&mut T) + Sync + Send,
    {
        items.iter_mut().for_each(f)
    }
}

/// A processing mode bound to its thread pool.
///
/// `ProcessingMode::ParallelWith` alone builds a pool per call. An executor
/// builds it once, so batched callers reuse the same workers.
#[derive(Debug)]
pub struct Executor {
    mode: ProcessingMode,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl Executor {
    pub fn new(mode: ProcessingMode) -> Self {
        Self {
            mode,
            #[cfg(feature = "parallel")]
            pool: match mode {
                ProcessingMode::ParallelWith(threads) => build_pool(threads),
                _ => None,
            },
        }
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    /// Worker threads available to `for_each_mut`
    pub fn threads(&self) -> usize {
        match self.mode {
            ProcessingMode::Sequential => 1,
            #[cfg(feature = "parallel")]
            _ => match &self.pool {
                Some(pool) => pool.current_num_threads(),
                None => rayon::current_num_threads(),
            },
            #[cfg(not(feature = "parallel"))]
            _ => 1,
        }
    }
}

impl From<ProcessingMode> for Executor {
    fn from(mode: ProcessingMode) -> Self {
        Self::new(mode)
    }
}

impl ParallelStrategy for Executor {
    #[cfg(feature = "parallel")]
    fn for_each_mut<T, F>(&self, items: &mut [T], f: F)
    where
        T: Send,
        F: Fn(&mut T) + Sync + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(|| items.par_iter_mut().for_each(f)),
            None => self.mode.for_each_mut(items, f),
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn for_each_mut<T, F>(&self, items: &mut [T], f: F)
    where
        T: Send,
        F: Fn(&mut T) + Sync + Send,
    {
        self.mode.for_each_mut(items, f)
    }
}

/// Dedicated pool for `ParallelWith`; `None` falls back to the global pool.
#[cfg(feature = "parallel")]
fn build_pool(threads: usize) -> Option<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .ok()
}

/// Configure the global thread pool
#[cfg(feature = "parallel")]
pub fn set_num_threads(threads: usize) {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok(); // Ignore if already initialized
}
