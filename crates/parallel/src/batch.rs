//! Bounded batches over a linear block range

use std::ops::Range;

/// A contiguous run of blocks processed and committed together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    /// Position of this batch in the sequence
    pub number: usize,
    /// First block (inclusive)
    pub start: usize,
    /// Last block (exclusive)
    pub end: usize,
}

impl Batch {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Iterator over batches covering `start..total`
#[derive(Debug, Clone)]
pub struct BatchIterator {
    total: usize,
    batch_size: usize,
    current: usize,
    number: usize,
}

impl BatchIterator {
    /// Batches of at most `batch_size` blocks covering `0..total`.
    /// A batch size of zero is treated as one.
    pub fn new(total: usize, batch_size: usize) -> Self {
        Self::starting_at(total, batch_size, 0)
    }

    /// Batches covering `start..total`, used to resume an interrupted run.
    pub fn starting_at(total: usize, batch_size: usize, start: usize) -> Self {
        Self {
            total,
            batch_size: batch_size.max(1),
            current: start.min(total),
            number: 0,
        }
    }

    /// Number of batches remaining
    pub fn remaining(&self) -> usize {
        (self.total - self.current).div_ceil(self.batch_size)
    }
}

impl Iterator for BatchIterator {
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.total {
            return None;
        }
        let start = self.current;
        let end = (start + self.batch_size).min(self.total);
        let batch = Batch {
            number: self.number,
            start,
            end,
        };
        self.current = end;
        self.number += 1;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl ExactSizeIterator for BatchIterator {}
