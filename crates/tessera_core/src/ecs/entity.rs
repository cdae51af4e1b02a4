//! # Entities
//!
//! An entity is a pooled container: a dense, bit-indexed array of trait
//! instances, a tag map, the live bit-set that mirrors both, its controls
//! and its own filter registry.
//!
//! The container only keeps its own fields consistent. Pools, event
//! dispatch to world filters and journaling are driven by `World`.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use tessera_shared::{ConsumerId, EntityId, OwnerId, SnapshotRecord, TupleKind};

use super::component::{AsAny, Trait};
use super::filter::{Event, FilterRef, FilterScope, SingleLive};
use super::logic::Control;
use super::matcher::Matcher;
use super::registry::FilterRegistry;
use crate::bit::{BitCode, CompositeBitSet};

/// A control attached to an entity.
pub(crate) struct ControlSlot {
    pub(crate) consumer: ConsumerId,
    pub(crate) type_id: TypeId,
    /// `None` while the control is running.
    pub(crate) control: Option<Box<dyn Control>>,
}

/// An entity and everything attached to it.
pub struct Entity {
    id: EntityId,
    owner: OwnerId,
    template: Option<String>,
    replicated: bool,
    active: bool,
    disposed: bool,
    traits: Vec<Option<Box<dyn Trait>>>,
    tags: HashMap<u32, String>,
    live: CompositeBitSet,
    controls: Vec<ControlSlot>,
    filters: FilterRegistry,
}

impl Entity {
    /// Creates an inactive slot.
    pub(crate) fn new() -> Self {
        Self {
            id: EntityId(0),
            owner: OwnerId::default(),
            template: None,
            replicated: false,
            active: false,
            disposed: false,
            traits: Vec::new(),
            tags: HashMap::new(),
            live: CompositeBitSet::new(),
            controls: Vec::new(),
            filters: FilterRegistry::new(),
        }
    }

    /// Resets the slot for a new entity.
    pub(crate) fn activate(
        &mut self,
        id: EntityId,
        owner: OwnerId,
        template: Option<String>,
        replicated: bool,
    ) {
        self.id = id;
        self.owner = owner;
        self.template = template;
        self.replicated = replicated;
        self.active = true;
        self.disposed = false;
        self.tags.clear();
        self.live.clear();
        self.controls.clear();
        self.filters.reset();
        for slot in &mut self.traits {
            *slot = None;
        }
    }

    /// Marks the slot unused. Traits, tags and controls must already be
    /// stripped.
    pub(crate) fn deactivate(&mut self) {
        self.active = false;
        self.filters.reset();
    }

    /// Entity id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Creator.
    #[inline]
    #[must_use]
    pub const fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Template the entity was created with.
    #[must_use]
    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    /// Returns true if the entity is part of replicated state.
    #[inline]
    #[must_use]
    pub const fn is_replicated(&self) -> bool {
        self.replicated
    }

    /// Returns true while the slot holds a live entity.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Returns true once destruction is scheduled for the end of the frame.
    #[inline]
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub(crate) fn mark_disposed(&mut self) {
        self.disposed = true;
    }

    /// Union of the bits of every attached trait and tag.
    #[inline]
    #[must_use]
    pub const fn live_set(&self) -> &CompositeBitSet {
        &self.live
    }

    /// Returns true if the bit of `code` is set.
    #[inline]
    #[must_use]
    pub const fn has_code(&self, code: BitCode) -> bool {
        self.live.contains_code(code)
    }

    /// Trait attached under `code`.
    #[must_use]
    pub fn trait_at(&self, code: BitCode) -> Option<&(dyn Trait + 'static)> {
        self.traits.get(code.index() as usize)?.as_deref()
    }

    pub(crate) fn trait_at_mut(&mut self, code: BitCode) -> Option<&mut (dyn Trait + 'static)> {
        self.traits.get_mut(code.index() as usize)?.as_deref_mut()
    }

    /// Trait attached under `code`, downcast to `T`.
    #[must_use]
    pub fn get<T: Trait>(&self, code: BitCode) -> Option<&T> {
        self.trait_at(code)?.as_any().downcast_ref::<T>()
    }

    pub(crate) fn get_mut<T: Trait>(&mut self, code: BitCode) -> Option<&mut T> {
        self.trait_at_mut(code)?.as_any_mut().downcast_mut::<T>()
    }

    /// Iterates attached traits with their bits, in bit order.
    pub fn traits(&self) -> impl Iterator<Item = (BitCode, &(dyn Trait + 'static))> {
        self.live
            .codes()
            .filter_map(|code| self.trait_at(code).map(|t| (code, t)))
    }

    /// Number of attached traits.
    #[must_use]
    pub fn trait_count(&self) -> usize {
        self.traits.iter().filter(|slot| slot.is_some()).count()
    }

    /// Iterates attached tags.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.values().map(String::as_str)
    }

    /// Number of attached tags.
    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Returns true if `code` is a tag of this entity.
    #[must_use]
    pub fn has_tag_code(&self, code: BitCode) -> bool {
        self.tags.contains_key(&code.index())
    }

    pub(crate) fn attach_trait(&mut self, code: BitCode, instance: Box<dyn Trait>) {
        let index = code.index() as usize;
        if self.traits.len() <= index {
            self.traits.resize_with(index + 1, || None);
        }
        self.traits[index] = Some(instance);
        self.live.add(code);
    }

    pub(crate) fn detach_trait(&mut self, code: BitCode) -> Option<Box<dyn Trait>> {
        let instance = self.traits.get_mut(code.index() as usize)?.take()?;
        self.live.subtract(code);
        Some(instance)
    }

    /// Returns `false` if the bit is already set (by a tag or a trait).
    pub(crate) fn attach_tag(&mut self, code: BitCode, tag: &str) -> bool {
        if !self.live.add(code) {
            return false;
        }
        self.tags.insert(code.index(), tag.to_owned());
        true
    }

    pub(crate) fn detach_tag(&mut self, code: BitCode) -> bool {
        if self.tags.remove(&code.index()).is_none() {
            return false;
        }
        self.live.subtract(code);
        true
    }

    // =========================================================================
    // Controls
    // =========================================================================

    pub(crate) fn find_control(&self, type_id: TypeId) -> Option<usize> {
        self.controls.iter().position(|slot| slot.type_id == type_id)
    }

    pub(crate) fn push_control(&mut self, slot: ControlSlot) {
        self.controls.push(slot);
    }

    pub(crate) fn control_count(&self) -> usize {
        self.controls.len()
    }

    pub(crate) fn control_slot(&self, index: usize) -> Option<&ControlSlot> {
        self.controls.get(index)
    }

    pub(crate) fn control_slot_mut(&mut self, index: usize) -> Option<&mut ControlSlot> {
        self.controls.get_mut(index)
    }

    pub(crate) fn take_controls(&mut self) -> Vec<ControlSlot> {
        std::mem::take(&mut self.controls)
    }

    // =========================================================================
    // Filters
    // =========================================================================

    /// Filters owned by this entity.
    #[must_use]
    pub const fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    pub(crate) fn filter(
        &mut self,
        consumer: ConsumerId,
        kind: TupleKind,
        matcher: &Matcher,
    ) -> FilterRef {
        let source = SingleLive {
            id: self.id,
            live: &self.live,
        };
        self.filters.get_or_add(
            consumer,
            kind,
            matcher,
            FilterScope::Single,
            [self.id],
            &source,
        )
    }

    pub(crate) fn dispatch(&self, event: Event) {
        let source = SingleLive {
            id: self.id,
            live: &self.live,
        };
        self.filters.dispatch(event, &source);
    }

    pub(crate) fn pre_handling(&self, consumer: ConsumerId) {
        self.filters.on_pre_handling(consumer);
    }

    pub(crate) fn post_handling(&self, consumer: ConsumerId) {
        let source = SingleLive {
            id: self.id,
            live: &self.live,
        };
        self.filters.on_post_handling(consumer, &source);
    }

    // =========================================================================
    // Snapshot
    // =========================================================================

    /// Records describing this entity: itself, its traits, then its tags.
    #[must_use]
    pub fn snapshot_records(&self) -> Vec<SnapshotRecord> {
        let mut records = Vec::with_capacity(1 + self.live.len());
        records.push(SnapshotRecord::Entity {
            id: self.id,
            owner: self.owner,
            template: self.template.clone(),
        });
        for (_, instance) in self.traits() {
            records.push(SnapshotRecord::Trait {
                entity: self.id,
                name: instance.type_name().to_owned(),
                state: instance.snapshot(),
            });
        }
        for code in self.live.codes() {
            if let Some(tag) = self.tags.get(&code.index()) {
                records.push(SnapshotRecord::Tag {
                    entity: self.id,
                    tag: tag.clone(),
                });
            }
        }
        records
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("active", &self.active)
            .field("disposed", &self.disposed)
            .field("live", &self.live)
            .field("controls", &self.controls.len())
            .field("filters", &self.filters.filter_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Marker(u8);
    impl Trait for Marker {}

    fn code(index: u32) -> BitCode {
        BitCode::new(index).unwrap()
    }

    fn active() -> Entity {
        let mut entity = Entity::new();
        entity.activate(EntityId(1), OwnerId(9), None, true);
        entity
    }

    #[test]
    fn test_traits_and_tags_share_live_set() {
        let mut entity = active();
        entity.attach_trait(code(2), Box::new(Marker(4)));
        assert!(entity.attach_tag(code(70), "boss"));
        assert!(!entity.attach_tag(code(70), "boss"));
        assert!(!entity.attach_tag(code(2), "clash"));

        assert_eq!(entity.live_set().indices().collect::<Vec<_>>(), vec![2, 70]);
        assert_eq!(entity.get::<Marker>(code(2)).map(|m| m.0), Some(4));
        assert!(entity.get::<Marker>(code(70)).is_none());
        assert_eq!(entity.tags().collect::<Vec<_>>(), vec!["boss"]);
    }

    #[test]
    fn test_detach() {
        let mut entity = active();
        entity.attach_trait(code(1), Box::new(Marker(0)));
        entity.attach_tag(code(3), "x");

        assert!(entity.detach_trait(code(1)).is_some());
        assert!(entity.detach_trait(code(1)).is_none());
        assert!(entity.detach_tag(code(3)));
        assert!(!entity.detach_tag(code(3)));
        assert!(entity.live_set().is_empty());
        assert_eq!(entity.trait_count(), 0);
    }

    #[test]
    fn test_activate_resets_slot() {
        let mut entity = active();
        entity.attach_tag(code(0), "x");
        entity.mark_disposed();

        entity.activate(EntityId(2), OwnerId(9), Some("orc".into()), false);
        assert_eq!(entity.id(), EntityId(2));
        assert!(!entity.is_disposed());
        assert!(entity.live_set().is_empty());
        assert_eq!(entity.tag_count(), 0);
        assert_eq!(entity.template(), Some("orc"));
    }

    #[test]
    fn test_entity_filter_initialized_with_self() {
        let mut entity = active();
        entity.attach_tag(code(5), "t");

        let mut matcher = Matcher::new();
        matcher.require(code(5));
        let filter = entity.filter(ConsumerId(1), TupleKind::Job, &matcher);
        assert_eq!(filter.target(), Some(EntityId(1)));

        entity.detach_tag(code(5));
        entity.dispatch(Event::Removed(EntityId(1), code(5)));
        assert!(!filter.is_matched());
    }

    #[test]
    fn test_snapshot_records_order() {
        let mut entity = active();
        entity.attach_tag(code(0), "first-tag");
        entity.attach_trait(code(1), Box::new(Marker(0)));

        let records = entity.snapshot_records();
        assert_eq!(records.len(), 3);
        assert!(matches!(records[0], SnapshotRecord::Entity { id: EntityId(1), .. }));
        assert!(matches!(&records[1], SnapshotRecord::Trait { name, .. } if name.ends_with("Marker")));
        assert!(matches!(&records[2], SnapshotRecord::Tag { tag, .. } if tag == "first-tag"));
    }
}
