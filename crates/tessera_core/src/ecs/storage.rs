//! # Trait Storage
//!
//! Per-type stacks of parked trait instances, indexed by bit.

use super::component::Trait;
use super::types::TraitFactory;
use crate::bit::BitCode;

/// Pool of detached trait instances, one stack per bit index.
///
/// Tracks how many instances are attached somewhere (`live_count`) so that
/// leaks show up as a non-zero count once every entity is gone.
pub struct TraitPool {
    /// Parked instances by bit index.
    stacks: Vec<Vec<Box<dyn Trait>>>,
    /// Maximum parked instances per type (`0` = unbounded).
    limit: usize,
    /// Instances handed out and not yet returned.
    live: usize,
}

impl TraitPool {
    /// Creates an empty pool keeping at most `limit` instances per type.
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self {
            stacks: Vec::new(),
            limit,
            live: 0,
        }
    }

    /// Takes a parked instance of `code`'s type, or builds one with `make`.
    pub fn pick(&mut self, code: BitCode, make: TraitFactory) -> Box<dyn Trait> {
        self.live += 1;
        self.stacks
            .get_mut(code.index() as usize)
            .and_then(Vec::pop)
            .unwrap_or_else(make)
    }

    /// Resets `instance` and parks it under `code`.
    pub fn park(&mut self, code: BitCode, mut instance: Box<dyn Trait>) {
        instance.on_reset();
        self.live = self.live.saturating_sub(1);

        let index = code.index() as usize;
        if self.stacks.len() <= index {
            self.stacks.resize_with(index + 1, Vec::new);
        }
        let stack = &mut self.stacks[index];
        if self.limit == 0 || stack.len() < self.limit {
            stack.push(instance);
        }
    }

    /// Instances currently attached to entities.
    #[inline]
    #[must_use]
    pub const fn live_count(&self) -> usize {
        self.live
    }

    /// Parked instances across all types.
    #[must_use]
    pub fn pooled_count(&self) -> usize {
        self.stacks.iter().map(Vec::len).sum()
    }

    #[cfg(test)]
    fn pooled_for(&self, code: BitCode) -> usize {
        self.stacks.get(code.index() as usize).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for TraitPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraitPool")
            .field("live", &self.live)
            .field("pooled", &self.pooled_count())
            .field("limit", &self.limit)
            .finish()
    }
}
