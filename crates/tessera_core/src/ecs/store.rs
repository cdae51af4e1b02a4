//! # Entity Store
//!
//! Pooled entity slots addressed by `EntityId`.
//!
//! ```text
//! index: EntityId ──► PoolHandle ──► SlotPool<Entity>
//! order: creation order of live ids (update loop, snapshots)
//! ```
//!
//! Slots are reused, ids never are: a released slot comes back with a
//! freshly minted id on the next spawn.

use std::collections::HashMap;

use tessera_shared::{EntityId, OwnerId};

use super::entity::Entity;
use super::filter::LiveSetSource;
use crate::bit::CompositeBitSet;
use crate::memory::{OrderedIdSet, PoolHandle, SlotPool};

/// Live entities plus the parked slots waiting for reuse.
#[derive(Debug, Default)]
pub struct EntityStore {
    pool: SlotPool<Entity>,
    index: HashMap<EntityId, PoolHandle>,
    order: OrderedIdSet,
}

impl EntityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with room for `capacity` entities.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pool: SlotPool::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            order: OrderedIdSet::new(),
        }
    }

    /// Activates a slot for `id`, reusing a parked one when available.
    pub(crate) fn spawn(
        &mut self,
        id: EntityId,
        owner: OwnerId,
        template: Option<String>,
        replicated: bool,
    ) -> PoolHandle {
        let handle = self.pool.allocate(Entity::new);
        if let Some(entity) = self.pool.get_mut(handle) {
            entity.activate(id, owner, template, replicated);
        }
        self.index.insert(id, handle);
        self.order.insert(id);
        handle
    }

    /// Parks the slot of `id`. The entity must already be stripped.
    pub(crate) fn release(&mut self, id: EntityId) -> bool {
        let Some(handle) = self.index.remove(&id) else {
            return false;
        };
        self.order.remove(id);
        if let Some(entity) = self.pool.get_mut(handle) {
            entity.deactivate();
        }
        self.pool.free(handle)
    }

    /// Returns true if `id` is live.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.index.contains_key(&id)
    }

    /// Live entity `id`.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.pool.get(*self.index.get(&id)?)
    }

    pub(crate) fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.pool.get_mut(*self.index.get(&id)?)
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if no entity is live.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Parked slots.
    #[inline]
    #[must_use]
    pub fn pooled_count(&self) -> usize {
        self.pool.free_count()
    }

    /// Live ids in creation order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.order.iter()
    }

    /// Live entities in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.order.iter().filter_map(|id| self.get(id))
    }

    /// See `OrderedIdSet::span`.
    pub(crate) fn span(&self) -> usize {
        self.order.span()
    }

    /// See `OrderedIdSet::at`.
    pub(crate) fn id_at(&self, position: usize) -> Option<EntityId> {
        self.order.at(position)
    }

    /// See `OrderedIdSet::pin`.
    pub(crate) fn pin_order(&mut self) {
        self.order.pin();
    }

    /// See `OrderedIdSet::unpin`.
    pub(crate) fn unpin_order(&mut self) {
        self.order.unpin();
    }
}

impl LiveSetSource for EntityStore {
    fn live_set(&self, id: EntityId) -> Option<&CompositeBitSet> {
        self.get(id)
            .filter(|entity| entity.is_active())
            .map(Entity::live_set)
    }
}
