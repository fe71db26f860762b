//! Confirmed-block cursor
//!
//! Tracks the last block the worker finished with and plans the next range
//! to process. Only blocks at least `confirmation_lag` below the reported
//! head are ever planned, and a range never exceeds `chunk_size` blocks.

use std::ops::RangeInclusive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainCursor {
    last_processed: u64,
}

impl ChainCursor {
    pub fn new(last_processed: u64) -> Self {
        Self { last_processed }
    }

    /// Cursor for a fresh start: rescan the last `lookback` blocks below the head.
    pub fn starting_at(head: u64, lookback: u64) -> Self {
        Self::new(head.saturating_sub(lookback))
    }

    pub fn last_processed(&self) -> u64 {
        self.last_processed
    }

    /// Next inclusive range of confirmed blocks, or `None` if there is nothing safe to do.
    pub fn next_range(&self, head: u64, lag: u64, chunk: u64) -> Option<RangeInclusive<u64>> {
        let safe = head.checked_sub(lag)?;
        if safe <= self.last_processed || chunk == 0 {
            return None;
        }
        let start = self.last_processed + 1;
        let end = safe.min(self.last_processed.saturating_add(chunk));
        Some(start..=end)
    }

    /// Record `height` as done. The cursor never moves backwards.
    pub fn advance_to(&mut self, height: u64) {
        if height > self.last_processed {
            self.last_processed = height;
        }
    }
}
