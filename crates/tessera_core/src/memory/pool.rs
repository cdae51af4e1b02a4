//! # Slot Pool
//!
//! Growable slot allocator whose freed objects are kept for reuse.

/// A pool of reusable objects addressed by handle.
///
/// Unlike a plain free list of values, a freed slot keeps its object: the
/// next `allocate` hands the same object back so the caller can reset and
/// reuse it, together with any heap capacity it already owns.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Use one pool per world.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool: SlotPool<Vec<u8>> = SlotPool::new();
///
/// let handle = pool.allocate(Vec::new);
/// pool.get_mut(handle).unwrap().push(1);
/// pool.free(handle);
///
/// // Same slot, same object (and buffer) back.
/// let again = pool.allocate(Vec::new);
/// assert_eq!(handle, again);
/// ```
#[derive(Debug)]
pub struct SlotPool<T> {
    /// Every object ever constructed, live or parked.
    storage: Vec<T>,
    /// Liveness per slot.
    live: Vec<bool>,
    /// Free list - indices of parked slots.
    free_list: Vec<usize>,
    /// Number of live slots.
    allocated_count: usize,
}

/// Handle to a slot in a `SlotPool`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    index: usize,
}

impl PoolHandle {
    /// Slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }
}

impl<T> SlotPool<T> {
    /// Creates an empty pool.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            storage: Vec::new(),
            live: Vec::new(),
            free_list: Vec::new(),
            allocated_count: 0,
        }
    }

    /// Creates an empty pool with room for `capacity` slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: Vec::with_capacity(capacity),
            live: Vec::with_capacity(capacity),
            free_list: Vec::with_capacity(capacity),
            allocated_count: 0,
        }
    }

    #[cfg(test)]
    fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of live slots.
    #[inline]
    #[must_use]
    pub const fn allocated_count(&self) -> usize {
        self.allocated_count
    }

    /// Number of parked objects waiting for reuse.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Takes a parked slot, or constructs a new object with `make`.
    ///
    /// A reused object is returned as it was parked; resetting it is the
    /// caller's job.
    pub fn allocate(&mut self, make: impl FnOnce() -> T) -> PoolHandle {
        let index = match self.free_list.pop() {
            Some(index) => index,
            None => {
                self.storage.push(make());
                self.live.push(false);
                self.storage.len() - 1
            }
        };
        self.live[index] = true;
        self.allocated_count += 1;
        PoolHandle { index }
    }

    /// Parks a live slot for reuse.
    ///
    /// Returns `false` if the handle was not live.
    pub fn free(&mut self, handle: PoolHandle) -> bool {
        match self.live.get_mut(handle.index) {
            Some(live) if *live => {
                *live = false;
                self.free_list.push(handle.index);
                self.allocated_count -= 1;
                true
            }
            _ => false,
        }
    }

    /// Gets a live object.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        if *self.live.get(handle.index)? {
            self.storage.get(handle.index)
        } else {
            None
        }
    }

    /// Gets a live object mutably.
    #[inline]
    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        if *self.live.get(handle.index)? {
            self.storage.get_mut(handle.index)
        } else {
            None
        }
    }

    #[cfg(test)]
    fn iter(&self) -> impl Iterator<Item = (PoolHandle, &T)> {
        self.storage
            .iter()
            .zip(&self.live)
            .enumerate()
            .filter_map(|(index, (value, live))| live.then_some((PoolHandle { index }, value)))
    }
}

impl<T> Default for SlotPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_allocate_free() {
        let mut pool: SlotPool<u32> = SlotPool::new();

        let h1 = pool.allocate(|| 42);
        assert_eq!(*pool.get(h1).unwrap(), 42);
        assert_eq!(pool.allocated_count(), 1);

        assert!(pool.free(h1));
        assert!(!pool.free(h1));
        assert!(pool.get(h1).is_none());
        assert_eq!(pool.allocated_count(), 0);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_pool_reuse_keeps_object() {
        let mut pool: SlotPool<Vec<u8>> = SlotPool::new();

        let h1 = pool.allocate(Vec::new);
        pool.get_mut(h1).unwrap().push(7);
        pool.free(h1);

        let h2 = pool.allocate(|| unreachable!("slot should be reused"));
        assert_eq!(h1, h2);
        assert_eq!(pool.get(h2).unwrap(), &vec![7]);
        assert_eq!(pool.capacity(), 1);
    }

    #[test]
    fn test_pool_iter_skips_parked() {
        let mut pool: SlotPool<u32> = SlotPool::with_capacity(4);
        let a = pool.allocate(|| 1);
        let _b = pool.allocate(|| 2);
        pool.free(a);

        let values: Vec<_> = pool.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![2]);
    }
}
