use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ulid::Ulid;

use crate::error::{Error, Result};

/// BlockWindow is the half-open time range `[min_time, max_time)` covered by one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWindow {
    /// Position of the block in the run, from 0.
    pub index: u64,
    pub min_time: i64,
    pub max_time: i64,
}

impl BlockWindow {
    pub fn len(&self) -> i64 {
        self.max_time - self.min_time
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0
    }
}

/// BlockPlanner yields consecutive windows of `block_length` from the start time for as long as
/// a window starts before the end time. The last window is not cut at the end time.
#[derive(Debug, Clone)]
pub struct BlockPlanner {
    next: i64,
    end_time: i64,
    block_length: i64,
    index: u64,
}

impl BlockPlanner {
    pub fn new(start_time: i64, end_time: i64, block_length: i64) -> Result<Self> {
        if start_time >= end_time {
            return Err(Error::Config(format!(
                "start time {} must come before end time {}",
                start_time, end_time
            )));
        }
        if block_length <= 0 {
            return Err(Error::Config(format!(
                "block length must be positive, got {}",
                block_length
            )));
        }

        Ok(Self {
            next: start_time,
            end_time,
            block_length,
            index: 0,
        })
    }
}

impl Iterator for BlockPlanner {
    type Item = BlockWindow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end_time {
            return None;
        }

        let window = BlockWindow {
            index: self.index,
            min_time: self.next,
            max_time: self.next.saturating_add(self.block_length),
        };

        self.index += 1;
        // a saturated window ends the plan
        self.next = if window.max_time > window.min_time {
            window.max_time
        } else {
            self.end_time
        };

        Some(window)
    }
}

/// BlockIdGenerator derives block ULIDs. The time part is the block's end time; the random part
/// comes from a generator seeded with `seed + block index`, so a fixed seed reproduces the ids.
#[derive(Debug, Clone, Copy)]
pub struct BlockIdGenerator {
    seed: u64,
}

impl BlockIdGenerator {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn id(&self, window: &BlockWindow) -> Ulid {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(window.index));
        Ulid::from_parts(window.max_time.max(0) as u64, rng.gen::<u128>())
    }
}
