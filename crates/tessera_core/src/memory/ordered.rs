//! Insertion-ordered id set with O(1) membership and removal.

use std::collections::HashMap;

use tessera_shared::EntityId;

/// Holes tolerated before a compaction is considered.
const MIN_HOLES_BEFORE_COMPACT: usize = 32;

/// Set of entity ids that iterates in insertion order.
///
/// Removal leaves a hole instead of shifting; holes are squeezed out once
/// they outnumber live entries, which keeps removal amortized O(1).
#[derive(Clone, Debug, Default)]
pub struct OrderedIdSet {
    entries: Vec<Option<EntityId>>,
    positions: HashMap<EntityId, usize>,
    /// Compaction is held back while a positional walk is running.
    pinned: bool,
}

impl OrderedIdSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ids.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true if the set is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Returns true if `id` is present.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Appends `id`. Returns `false` if it was already present.
    pub fn insert(&mut self, id: EntityId) -> bool {
        if self.positions.contains_key(&id) {
            return false;
        }
        self.positions.insert(id, self.entries.len());
        self.entries.push(Some(id));
        true
    }

    /// Removes `id`. Returns `false` if it was absent.
    pub fn remove(&mut self, id: EntityId) -> bool {
        let Some(position) = self.positions.remove(&id) else {
            return false;
        };
        self.entries[position] = None;

        self.maybe_compact();
        true
    }

    /// Keeps every position stable until `unpin`, removals included.
    pub fn pin(&mut self) {
        self.pinned = true;
    }

    /// Releases `pin` and squeezes out the holes it held back.
    pub fn unpin(&mut self) {
        self.pinned = false;
        self.maybe_compact();
    }

    /// Removes every id.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
    }

    /// Oldest id still present.
    #[must_use]
    pub fn first(&self) -> Option<EntityId> {
        self.iter().next()
    }

    /// Iterates ids in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entries.iter().filter_map(|entry| *entry)
    }

    /// Number of positions, holes included.
    ///
    /// Positions are stable while nothing is removed, so `0..span()` can be
    /// walked with `at` while ids are appended.
    #[inline]
    #[must_use]
    pub fn span(&self) -> usize {
        self.entries.len()
    }

    /// Id at `position`, if that position is not a hole.
    #[inline]
    #[must_use]
    pub fn at(&self, position: usize) -> Option<EntityId> {
        self.entries.get(position).copied().flatten()
    }

    /// Copies the ids out in insertion order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<EntityId> {
        self.iter().collect()
    }

    fn maybe_compact(&mut self) {
        let holes = self.entries.len() - self.positions.len();
        if !self.pinned && holes >= MIN_HOLES_BEFORE_COMPACT && holes > self.positions.len() {
            self.compact();
        }
    }

    fn compact(&mut self) {
        self.entries.retain(Option::is_some);
        for (position, entry) in self.entries.iter().enumerate() {
            if let Some(id) = entry {
                self.positions.insert(*id, position);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(set: &OrderedIdSet) -> Vec<u64> {
        set.iter().map(EntityId::raw).collect()
    }

    #[test]
    fn test_insertion_order() {
        let mut set = OrderedIdSet::new();
        assert!(set.insert(EntityId(3)));
        assert!(set.insert(EntityId(1)));
        assert!(!set.insert(EntityId(3)));
        assert_eq!(ids(&set), vec![3, 1]);
        assert_eq!(set.first(), Some(EntityId(3)));
    }

    #[test]
    fn test_remove_and_reinsert_moves_to_back() {
        let mut set = OrderedIdSet::new();
        for i in 0..4 {
            set.insert(EntityId(i));
        }
        assert!(set.remove(EntityId(1)));
        assert!(!set.remove(EntityId(1)));
        set.insert(EntityId(1));
        assert_eq!(ids(&set), vec![0, 2, 3, 1]);
    }

    #[test]
    fn test_compaction_preserves_order() {
        let mut set = OrderedIdSet::new();
        for i in 0..200 {
            set.insert(EntityId(i));
        }
        for i in 0..150 {
            set.remove(EntityId(i));
        }
        assert_eq!(set.len(), 50);
        assert_eq!(ids(&set), (150..200).collect::<Vec<_>>());
        assert!(set.contains(EntityId(199)));
        assert!(set.remove(EntityId(199)));
        assert_eq!(set.first(), Some(EntityId(150)));
    }

    #[test]
    fn test_positional_walk_sees_appends() {
        let mut set = OrderedIdSet::new();
        set.insert(EntityId(10));
        set.insert(EntityId(11));
        set.remove(EntityId(10));

        let mut seen = Vec::new();
        let mut position = 0;
        while position < set.span() {
            if let Some(id) = set.at(position) {
                seen.push(id.raw());
                if id == EntityId(11) {
                    set.insert(EntityId(12));
                }
            }
            position += 1;
        }
        assert_eq!(seen, vec![11, 12]);
        assert_eq!(set.at(99), None);
    }

    #[test]
    fn test_pin_holds_positions_across_removals() {
        let mut set = OrderedIdSet::new();
        for i in 0..100 {
            set.insert(EntityId(i));
        }
        set.pin();
        for i in 0..90 {
            set.remove(EntityId(i));
        }
        assert_eq!(set.span(), 100);
        assert_eq!(set.at(95), Some(EntityId(95)));

        set.unpin();
        assert_eq!(set.span(), 10);
        assert_eq!(set.first(), Some(EntityId(90)));
    }
}
