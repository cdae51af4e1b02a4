//! # World
//!
//! Owns every entity, the world filter registry, systems, pools and the
//! boundary queues, and drives the frame.
//!
//! ## Frame
//!
//! ```text
//! update(dt)
//!   begin_frame                      frame counter
//!   for entity in creation order     (entities created this pass included)
//!     for control in entity          pre-handling ► on_update ► post-handling
//!   for system in world              pre-handling ► on_update ► post-handling
//!   end_frame                        release disposed entities
//!                                    run deferred actions queued so far
//! ```
//!
//! ## Events
//!
//! Every trait or tag mutation is turned into an `Event` and dispatched to
//! the entity's own filters and to the world filters touching that bit.
//! Filters of the consumer that is currently running are locked and queue
//! the event until its post-handling.

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

use tessera_shared::{
    ConsumerId, EntityId, Mutation, OwnerId, SnapshotRecord, SyncRecord, Target, TupleKind,
    WorldMode,
};

use super::component::{AsAny, Trait};
use super::entity::{ControlSlot, Entity};
use super::filter::{Event, FilterRef, FilterScope};
use super::ids::IdAllocator;
use super::logic::{Control, ControlContext, System, SystemContext};
use super::matcher::{Matcher, MatcherBuilder};
use super::registry::FilterRegistry;
use super::storage::TraitPool;
use super::store::EntityStore;
use super::template::{Decorator, Templates};
use super::types::{ControlDescriptor, SystemDescriptor, TraitDescriptor, TypeRegistry};
use crate::bit::{BitCode, BitRegistry};
use crate::config::WorldConfig;
use crate::error::{CoreError, CoreResult};
use crate::sync::{DeferredQueue, DeferredSender};

/// Where a mutation came from. Only local mutations are journaled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    Local,
    Remote,
}

/// A system registered with the world.
struct SystemSlot {
    consumer: ConsumerId,
    type_id: TypeId,
    /// `None` while the system is running.
    system: Option<Box<dyn System>>,
}

/// The ECS world.
///
/// # Example
///
/// ```rust,ignore
/// let mut world = World::new(WorldConfig::default())?;
///
/// let id = world.create_entity(true, None)?;
/// world.add_trait::<Position>(id)?;
/// world.add_tag(id, "player")?;
///
/// let matcher = world.matcher().has_trait::<Position>().build()?;
/// let consumer = world.register_consumer();
/// let players = world.filter(consumer, TupleKind::Job, &matcher);
/// assert!(players.contains(id));
/// ```
pub struct World {
    config: WorldConfig,
    bits: Arc<BitRegistry>,
    types: TypeRegistry,
    ids: IdAllocator,
    default_owner: OwnerId,
    entities: EntityStore,
    filters: FilterRegistry,
    systems: Vec<SystemSlot>,
    traits: TraitPool,
    templates: Templates,
    /// Entities disposed this frame, released in `end_frame`.
    disposal: Vec<EntityId>,
    deferred: DeferredQueue,
    outbox: Vec<SyncRecord>,
    next_consumer: u64,
    frame: u64,
}

impl World {
    /// Creates a world with its own bit registry.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `config` fails validation.
    pub fn new(config: WorldConfig) -> CoreResult<Self> {
        Self::with_bits(config, Arc::new(BitRegistry::new()))
    }

    /// Creates a world sharing `bits` with other worlds of the process.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `config` fails validation.
    pub fn with_bits(config: WorldConfig, bits: Arc<BitRegistry>) -> CoreResult<Self> {
        config.validate()?;
        tracing::info!(
            "Creating {:?} world (capacity {})",
            config.mode,
            config.entity_capacity
        );
        Ok(Self::build(config, bits))
    }

    fn build(config: WorldConfig, bits: Arc<BitRegistry>) -> Self {
        let mut ids = IdAllocator::new(config.mode);
        let default_owner = ids.next_owner();
        Self {
            entities: EntityStore::with_capacity(config.entity_capacity),
            traits: TraitPool::new(config.trait_pool_limit),
            config,
            bits,
            types: TypeRegistry::new(),
            ids,
            default_owner,
            filters: FilterRegistry::new(),
            systems: Vec::new(),
            templates: Templates::new(),
            disposal: Vec::new(),
            deferred: DeferredQueue::new(),
            outbox: Vec::new(),
            next_consumer: 0,
            frame: 0,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Configuration the world was built with.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Standalone, client or server.
    #[inline]
    #[must_use]
    pub const fn mode(&self) -> WorldMode {
        self.config.mode
    }

    /// Bit registry.
    #[inline]
    #[must_use]
    pub const fn bits(&self) -> &Arc<BitRegistry> {
        &self.bits
    }

    /// Type registry.
    #[inline]
    #[must_use]
    pub const fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Type registry, for registering types remote peers refer to by name.
    #[inline]
    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    /// Owner of entities created with `create_entity`.
    #[inline]
    #[must_use]
    pub const fn default_owner(&self) -> OwnerId {
        self.default_owner
    }

    /// Frames completed.
    #[inline]
    #[must_use]
    pub const fn frame_count(&self) -> u64 {
        self.frame
    }

    /// World-level filter registry.
    #[inline]
    #[must_use]
    pub const fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    /// Starts a matcher resolved against this world's registries.
    pub fn matcher(&self) -> MatcherBuilder<'_> {
        MatcherBuilder::new(&self.bits, &self.types)
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Creates an entity owned by the world's default owner.
    ///
    /// # Arguments
    ///
    /// * `replicated` - Whether the entity is part of replicated state
    /// * `template` - Template decorator to run on the new entity
    ///
    /// # Errors
    ///
    /// `UnknownToken` if `template` is not registered (nothing is created),
    /// or any error returned by the decorator (the entity is released
    /// before returning).
    pub fn create_entity(&mut self, replicated: bool, template: Option<&str>) -> CoreResult<EntityId> {
        let owner = self.default_owner;
        self.create_entity_for(owner, replicated, template)
    }

    /// Creates an entity on behalf of `owner`.
    ///
    /// # Errors
    ///
    /// As `create_entity`.
    pub fn create_entity_for(
        &mut self,
        owner: OwnerId,
        replicated: bool,
        template: Option<&str>,
    ) -> CoreResult<EntityId> {
        let decorator = self.resolve_template(template)?;
        let id = self.ids.next_entity();
        self.spawn(id, owner, replicated, template, decorator, Origin::Local)?;
        Ok(id)
    }

    fn resolve_template(&self, template: Option<&str>) -> CoreResult<Option<Decorator>> {
        template
            .map(|name| {
                self.templates
                    .get(name)
                    .ok_or_else(|| CoreError::UnknownToken(name.to_owned()))
            })
            .transpose()
    }

    fn spawn(
        &mut self,
        id: EntityId,
        owner: OwnerId,
        replicated: bool,
        template: Option<&str>,
        decorator: Option<Decorator>,
        origin: Origin,
    ) -> CoreResult<()> {
        self.entities
            .spawn(id, owner, template.map(str::to_owned), replicated);
        self.filters.dispatch_all(Event::Init(id), &self.entities);
        tracing::debug!("Created {} for {} ({:?})", id, owner, origin);

        self.journal(
            origin,
            id,
            Mutation::Create {
                entity: id,
                owner,
                template: template.map(str::to_owned),
            },
        );

        let Some(decorate) = decorator else {
            return Ok(());
        };
        decorate(self, id).map_err(|error| {
            tracing::warn!("Template decorator failed on {}: {}", id, error);
            self.abort_spawn(id, origin);
            error
        })
    }

    /// Tears down an entity whose template failed, without waiting for the
    /// end of the frame.
    fn abort_spawn(&mut self, id: EntityId, origin: Origin) {
        if !self.dispose(id, origin) && !self.contains_entity(id) {
            return;
        }
        self.disposal.retain(|&queued| queued != id);
        self.release_entity(id);
    }

    /// Schedules `id` for release at the end of the frame.
    ///
    /// The entity stays queryable until then. Returns `false` if it is not
    /// live or already disposed.
    pub fn dispose_entity(&mut self, id: EntityId) -> bool {
        self.dispose(id, Origin::Local)
    }

    fn dispose(&mut self, id: EntityId, origin: Origin) -> bool {
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        if entity.is_disposed() {
            return false;
        }
        entity.mark_disposed();
        self.disposal.push(id);
        self.journal(origin, id, Mutation::Destroy { entity: id });
        true
    }

    /// Tears `id` down and parks its slot.
    fn release_entity(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get_mut(id) else {
            return;
        };
        for slot in entity.take_controls() {
            if let Some(mut control) = slot.control {
                control.on_dispose();
            }
        }

        let codes: Vec<BitCode> = entity.live_set().codes().collect();
        for code in codes {
            let Some(entity) = self.entities.get_mut(id) else {
                break;
            };
            if let Some(instance) = entity.detach_trait(code) {
                self.notify(id, Event::Removed(id, code));
                self.traits.park(code, instance);
            } else if entity.detach_tag(code) {
                self.notify(id, Event::Removed(id, code));
            }
        }

        self.filters.dispatch_all(Event::Dropped(id), &self.entities);
        self.entities.release(id);
        tracing::debug!("Released {}", id);
    }

    /// Live entity `id`.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Returns true if `id` is live (disposed entities count until the end
    /// of the frame).
    #[must_use]
    pub fn contains_entity(&self, id: EntityId) -> bool {
        self.entities.contains(id)
    }

    /// Live ids in creation order.
    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.ids()
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if no entity is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Trait instances attached to entities.
    #[must_use]
    pub const fn live_trait_count(&self) -> usize {
        self.traits.live_count()
    }

    /// Trait instances parked for reuse.
    #[must_use]
    pub fn pooled_trait_count(&self) -> usize {
        self.traits.pooled_count()
    }

    /// Entity slots parked for reuse.
    #[must_use]
    pub fn pooled_entity_count(&self) -> usize {
        self.entities.pooled_count()
    }

    // =========================================================================
    // Traits
    // =========================================================================

    /// Attaches a `T` to `id`, or returns the one already attached.
    ///
    /// A new instance is taken from the pool (or built), initialized, and
    /// announced with an `Added` event.
    ///
    /// # Errors
    ///
    /// `UnknownEntity` if `id` is not live, `IndexOutOfRange` if no bit is
    /// left for `T`.
    pub fn add_trait<T: Trait + Default>(&mut self, id: EntityId) -> CoreResult<&mut T> {
        let descriptor = self.types.register_trait::<T>();
        let code = self.bits.code_of::<T>()?;
        self.attach_trait(id, code, descriptor, Origin::Local)?;
        self.entities
            .get_mut(id)
            .and_then(|entity| entity.get_mut::<T>(code))
            .ok_or(CoreError::UnknownEntity(id))
    }

    /// Attaches the trait registered under `name`.
    ///
    /// Returns `false` if it was already attached.
    ///
    /// # Errors
    ///
    /// `UnknownToken` / `TypeMismatch` if `name` does not resolve to a
    /// trait, `UnknownEntity` if `id` is not live.
    pub fn add_trait_named(&mut self, id: EntityId, name: &str) -> CoreResult<bool> {
        let descriptor = self.types.trait_descriptor(name)?;
        let code = self.bits.get_or_assign(descriptor.name)?;
        self.attach_trait(id, code, descriptor, Origin::Local)
    }

    fn attach_trait(
        &mut self,
        id: EntityId,
        code: BitCode,
        descriptor: TraitDescriptor,
        origin: Origin,
    ) -> CoreResult<bool> {
        let entity = self.entities.get(id).ok_or(CoreError::UnknownEntity(id))?;
        if entity.trait_at(code).is_some() {
            return Ok(false);
        }
        if entity.has_code(code) {
            return Err(CoreError::TypeMismatch {
                expected: "trait",
                found: "tag",
            });
        }

        let mut instance = self.traits.pick(code, descriptor.make);
        instance.on_init();
        if let Some(entity) = self.entities.get_mut(id) {
            entity.attach_trait(code, instance);
        }
        self.notify(id, Event::Added(id, code));
        self.journal(
            origin,
            id,
            Mutation::Attach {
                entity: id,
                target: Target::Trait(descriptor.name.to_owned()),
            },
        );
        Ok(true)
    }

    /// Detaches `T` from `id`, resetting and pooling the instance.
    ///
    /// Returns `false` if `id` is not live or has no `T`.
    pub fn remove_trait<T: Trait>(&mut self, id: EntityId) -> bool {
        match self.bits.lookup(type_name::<T>()) {
            Some(code) => self.detach_trait(id, code, Origin::Local),
            None => false,
        }
    }

    /// Detaches the trait registered under `name`.
    ///
    /// # Errors
    ///
    /// `UnknownToken` / `TypeMismatch` if `name` does not resolve to a
    /// trait.
    pub fn remove_trait_named(&mut self, id: EntityId, name: &str) -> CoreResult<bool> {
        let descriptor = self.types.trait_descriptor(name)?;
        Ok(self
            .bits
            .lookup(descriptor.name)
            .is_some_and(|code| self.detach_trait(id, code, Origin::Local)))
    }

    fn detach_trait(&mut self, id: EntityId, code: BitCode, origin: Origin) -> bool {
        let Some(instance) = self
            .entities
            .get_mut(id)
            .and_then(|entity| entity.detach_trait(code))
        else {
            return false;
        };
        let name = (*instance).type_name();

        self.notify(id, Event::Removed(id, code));
        self.traits.park(code, instance);
        self.journal(
            origin,
            id,
            Mutation::Detach {
                entity: id,
                target: Target::Trait(name.to_owned()),
            },
        );
        true
    }

    /// Replaces trait `A` with trait `B`.
    ///
    /// # Errors
    ///
    /// As `add_trait`.
    pub fn replace_trait<A: Trait, B: Trait + Default>(&mut self, id: EntityId) -> CoreResult<&mut B> {
        self.remove_trait::<A>(id);
        self.add_trait::<B>(id)
    }

    /// Replaces the trait named `old` with the trait named `new`.
    ///
    /// # Errors
    ///
    /// As `remove_trait_named` and `add_trait_named`.
    pub fn replace_trait_named(&mut self, id: EntityId, old: &str, new: &str) -> CoreResult<bool> {
        self.remove_trait_named(id, old)?;
        self.add_trait_named(id, new)
    }

    /// `T` attached to `id`.
    #[must_use]
    pub fn get_trait<T: Trait>(&self, id: EntityId) -> Option<&T> {
        let code = self.bits.lookup(type_name::<T>())?;
        self.entities.get(id)?.get::<T>(code)
    }

    /// `T` attached to `id`, mutably. No change is signalled; use
    /// `change_trait` for that.
    pub fn get_trait_mut<T: Trait>(&mut self, id: EntityId) -> Option<&mut T> {
        let code = self.bits.lookup(type_name::<T>())?;
        self.entities.get_mut(id)?.get_mut::<T>(code)
    }

    /// Trait registered under `name` attached to `id`.
    #[must_use]
    pub fn get_trait_named(&self, id: EntityId, name: &str) -> Option<&(dyn Trait + 'static)> {
        let code = self.named_code(name)?;
        self.entities.get(id)?.trait_at(code)
    }

    /// Returns true if `id` has a `T`.
    #[must_use]
    pub fn has_trait<T: Trait>(&self, id: EntityId) -> bool {
        self.get_trait::<T>(id).is_some()
    }

    /// Returns true if `id` has the trait registered under `name`.
    #[must_use]
    pub fn has_trait_named(&self, id: EntityId, name: &str) -> bool {
        self.get_trait_named(id, name).is_some()
    }

    fn named_code(&self, name: &str) -> Option<BitCode> {
        let descriptor = self.types.trait_descriptor(name).ok()?;
        self.bits.lookup(descriptor.name)
    }

    /// Mutates `T` on `id` through `f` and signals the change.
    ///
    /// Returns `None` if `id` has no `T`.
    pub fn change_trait<T: Trait, R>(&mut self, id: EntityId, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let code = self.bits.lookup(type_name::<T>())?;
        let instance = self.entities.get_mut(id)?.get_mut::<T>(code)?;
        let result = f(instance);
        self.notify(id, Event::Changed(id, code));
        Some(result)
    }

    /// Signals a change of `T` on `id` without touching it.
    pub fn notify_changed<T: Trait>(&mut self, id: EntityId) -> bool {
        let Some(code) = self.bits.lookup(type_name::<T>()) else {
            return false;
        };
        let attached = self
            .entities
            .get(id)
            .is_some_and(|entity| entity.trait_at(code).is_some());
        if attached {
            self.notify(id, Event::Changed(id, code));
        }
        attached
    }

    // =========================================================================
    // Tags
    // =========================================================================

    /// Adds `tag` to `id`.
    ///
    /// Returns `false` if `id` is not live or already carries the tag.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` if no bit is left for a new tag.
    pub fn add_tag(&mut self, id: EntityId, tag: &str) -> CoreResult<bool> {
        self.attach_tag(id, tag, Origin::Local)
    }

    fn attach_tag(&mut self, id: EntityId, tag: &str, origin: Origin) -> CoreResult<bool> {
        if !self.entities.contains(id) {
            return Ok(false);
        }
        let code = self.bits.get_or_assign(tag)?;
        let attached = self
            .entities
            .get_mut(id)
            .is_some_and(|entity| entity.attach_tag(code, tag));
        if attached {
            self.notify(id, Event::Added(id, code));
            self.journal(
                origin,
                id,
                Mutation::Attach {
                    entity: id,
                    target: Target::Tag(tag.to_owned()),
                },
            );
        }
        Ok(attached)
    }

    /// Removes `tag` from `id`. Returns `false` if it was not there.
    pub fn remove_tag(&mut self, id: EntityId, tag: &str) -> bool {
        self.detach_tag(id, tag, Origin::Local)
    }

    fn detach_tag(&mut self, id: EntityId, tag: &str, origin: Origin) -> bool {
        let Some(code) = self.bits.lookup(tag) else {
            return false;
        };
        let detached = self
            .entities
            .get_mut(id)
            .is_some_and(|entity| entity.detach_tag(code));
        if detached {
            self.notify(id, Event::Removed(id, code));
            self.journal(
                origin,
                id,
                Mutation::Detach {
                    entity: id,
                    target: Target::Tag(tag.to_owned()),
                },
            );
        }
        detached
    }

    /// Returns true if `id` carries `tag`.
    #[must_use]
    pub fn has_tag(&self, id: EntityId, tag: &str) -> bool {
        self.bits
            .lookup(tag)
            .zip(self.entities.get(id))
            .is_some_and(|(code, entity)| entity.has_tag_code(code))
    }

    /// Swaps tag `old` for `new`. Returns whether `new` was added.
    ///
    /// # Errors
    ///
    /// As `add_tag`.
    pub fn replace_tag(&mut self, id: EntityId, old: &str, new: &str) -> CoreResult<bool> {
        self.remove_tag(id, old);
        self.add_tag(id, new)
    }

    // =========================================================================
    // Events and journal
    // =========================================================================

    /// Dispatches `event` to the entity's filters and the world filters.
    fn notify(&self, id: EntityId, event: Event) {
        if let Some(entity) = self.entities.get(id) {
            entity.dispatch(event);
        }
        self.filters.dispatch(event, &self.entities);
    }

    /// Records a local mutation of a replicated entity (server only).
    fn journal(&mut self, origin: Origin, id: EntityId, mutation: Mutation) {
        if origin == Origin::Remote || self.config.mode != WorldMode::Server {
            return;
        }
        let Some(entity) = self.entities.get(id) else {
            return;
        };
        if entity.is_replicated() {
            self.outbox.push(SyncRecord {
                owner: entity.owner(),
                mutation,
            });
        }
    }

    /// Takes the journaled mutations, oldest first.
    pub fn drain_outbox(&mut self) -> Vec<SyncRecord> {
        std::mem::take(&mut self.outbox)
    }

    /// Journaled mutations not yet drained.
    #[must_use]
    pub fn outbox_len(&self) -> usize {
        self.outbox.len()
    }

    // =========================================================================
    // Filters and consumers
    // =========================================================================

    /// Allocates a consumer id for code that reads filters outside of a
    /// control or system.
    pub fn register_consumer(&mut self) -> ConsumerId {
        self.next_consumer += 1;
        ConsumerId(self.next_consumer)
    }

    /// Gets or creates a world filter for `consumer`.
    ///
    /// A new filter is initialized with every live entity in creation
    /// order. Identical job matchers share one filter across consumers.
    pub fn filter(&mut self, consumer: ConsumerId, kind: TupleKind, matcher: &Matcher) -> FilterRef {
        self.filters.get_or_add(
            consumer,
            kind,
            matcher,
            FilterScope::Group,
            self.entities.ids(),
            &self.entities,
        )
    }

    /// Gets or creates a filter over the single entity `id`.
    ///
    /// # Errors
    ///
    /// `UnknownEntity` if `id` is not live.
    pub fn entity_filter(
        &mut self,
        id: EntityId,
        consumer: ConsumerId,
        kind: TupleKind,
        matcher: &Matcher,
    ) -> CoreResult<FilterRef> {
        self.entities
            .get_mut(id)
            .map(|entity| entity.filter(consumer, kind, matcher))
            .ok_or(CoreError::UnknownEntity(id))
    }

    /// Locks the world filters of `consumer`.
    pub fn begin_handling(&self, consumer: ConsumerId) {
        self.filters.on_pre_handling(consumer);
    }

    /// Unlocks the world filters of `consumer`, replaying queued events.
    pub fn end_handling(&self, consumer: ConsumerId) {
        self.filters.on_post_handling(consumer, &self.entities);
    }

    // =========================================================================
    // Controls
    // =========================================================================

    /// Attaches control `C` to `id`, or returns the one already attached.
    ///
    /// Returns `Ok(None)` if `C` does not run in this world's mode.
    ///
    /// # Errors
    ///
    /// `UnknownEntity` if `id` is not live.
    pub fn add_control<C: Control + Default>(&mut self, id: EntityId) -> CoreResult<Option<&mut C>> {
        let descriptor = self.types.register_control::<C>();
        if self.attach_control(id, descriptor)?.is_none() {
            return Ok(None);
        }
        Ok(self.control_mut::<C>(id))
    }

    /// Attaches the control registered under `name`.
    ///
    /// Returns the control's consumer id, or `None` if it does not run in
    /// this world's mode.
    ///
    /// # Errors
    ///
    /// `UnknownToken` / `TypeMismatch` if `name` does not resolve to a
    /// control, `UnknownEntity` if `id` is not live.
    pub fn add_control_named(&mut self, id: EntityId, name: &str) -> CoreResult<Option<ConsumerId>> {
        let descriptor = self.types.control_descriptor(name)?;
        self.attach_control(id, descriptor)
    }

    fn attach_control(
        &mut self,
        id: EntityId,
        descriptor: ControlDescriptor,
    ) -> CoreResult<Option<ConsumerId>> {
        let entity = self.entities.get(id).ok_or(CoreError::UnknownEntity(id))?;
        if let Some(index) = entity.find_control(descriptor.type_id) {
            return Ok(entity.control_slot(index).map(|slot| slot.consumer));
        }

        let mut control = (descriptor.make)();
        if !control.domain().is_applied(self.config.mode) {
            tracing::debug!("Skipping control {} in {:?} mode", descriptor.name, self.config.mode);
            return Ok(None);
        }

        let consumer = self.register_consumer();
        if let Some(entity) = self.entities.get_mut(id) {
            entity.push_control(ControlSlot {
                consumer,
                type_id: descriptor.type_id,
                control: None,
            });
        }
        control.on_init(&mut ControlContext::new(self, id, consumer));
        self.restore_control(id, consumer, control);
        Ok(Some(consumer))
    }

    fn restore_control(&mut self, id: EntityId, consumer: ConsumerId, mut control: Box<dyn Control>) {
        let slot = self.entities.get_mut(id).and_then(|entity| {
            let index = (0..entity.control_count())
                .find(|&i| entity.control_slot(i).is_some_and(|s| s.consumer == consumer))?;
            entity.control_slot_mut(index)
        });
        match slot {
            Some(slot) => slot.control = Some(control),
            // Entity released while the control ran.
            None => control.on_dispose(),
        }
    }

    /// Control `C` of `id`. `None` while it is running.
    #[must_use]
    pub fn control<C: Control>(&self, id: EntityId) -> Option<&C> {
        let entity = self.entities.get(id)?;
        let slot = entity.control_slot(entity.find_control(TypeId::of::<C>())?)?;
        slot.control.as_deref()?.as_any().downcast_ref::<C>()
    }

    /// Control `C` of `id`, mutably.
    pub fn control_mut<C: Control>(&mut self, id: EntityId) -> Option<&mut C> {
        let entity = self.entities.get_mut(id)?;
        let index = entity.find_control(TypeId::of::<C>())?;
        let slot = entity.control_slot_mut(index)?;
        slot.control.as_deref_mut()?.as_any_mut().downcast_mut::<C>()
    }

    // =========================================================================
    // Systems
    // =========================================================================

    /// Adds system `S`, or returns the one already added.
    ///
    /// Returns `None` if `S` does not run in this world's mode.
    pub fn add_system<S: System + Default>(&mut self) -> Option<&mut S> {
        let descriptor = self.types.register_system::<S>();
        self.attach_system(descriptor)?;
        self.system_mut::<S>()
    }

    /// Adds the system registered under `name`.
    ///
    /// # Errors
    ///
    /// `UnknownToken` / `TypeMismatch` if `name` does not resolve to a
    /// system.
    pub fn add_system_named(&mut self, name: &str) -> CoreResult<Option<ConsumerId>> {
        let descriptor = self.types.system_descriptor(name)?;
        Ok(self.attach_system(descriptor))
    }

    fn attach_system(&mut self, descriptor: SystemDescriptor) -> Option<ConsumerId> {
        if let Some(slot) = self.systems.iter().find(|s| s.type_id == descriptor.type_id) {
            return Some(slot.consumer);
        }

        let mut system = (descriptor.make)();
        if !system.domain().is_applied(self.config.mode) {
            tracing::debug!("Skipping system {} in {:?} mode", descriptor.name, self.config.mode);
            return None;
        }

        let consumer = self.register_consumer();
        self.systems.push(SystemSlot {
            consumer,
            type_id: descriptor.type_id,
            system: None,
        });
        system.on_init(&mut SystemContext::new(self, consumer));
        self.restore_system(consumer, system);
        tracing::debug!("Added system {} as consumer {}", descriptor.name, consumer.0);
        Some(consumer)
    }

    fn restore_system(&mut self, consumer: ConsumerId, mut system: Box<dyn System>) {
        match self.systems.iter_mut().find(|s| s.consumer == consumer) {
            Some(slot) => slot.system = Some(system),
            // Removed while it ran.
            None => {
                system.on_dispose(self);
                self.filters.remove_consumer(consumer);
            }
        }
    }

    /// Removes system `S`, running its `on_dispose`.
    ///
    /// Returns `false` if it was not added. A system removing itself is
    /// disposed once its update returns.
    pub fn remove_system<S: System>(&mut self) -> bool {
        let type_id = TypeId::of::<S>();
        let Some(index) = self.systems.iter().position(|s| s.type_id == type_id) else {
            return false;
        };
        let slot = self.systems.remove(index);
        if let Some(mut system) = slot.system {
            system.on_dispose(self);
        }
        self.filters.remove_consumer(slot.consumer);
        true
    }

    /// System `S`. `None` while it is running.
    #[must_use]
    pub fn system<S: System>(&self) -> Option<&S> {
        let type_id = TypeId::of::<S>();
        let slot = self.systems.iter().find(|s| s.type_id == type_id)?;
        slot.system.as_deref()?.as_any().downcast_ref::<S>()
    }

    /// System `S`, mutably.
    pub fn system_mut<S: System>(&mut self) -> Option<&mut S> {
        let type_id = TypeId::of::<S>();
        let slot = self.systems.iter_mut().find(|s| s.type_id == type_id)?;
        slot.system.as_deref_mut()?.as_any_mut().downcast_mut::<S>()
    }

    /// Number of systems.
    #[must_use]
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    // =========================================================================
    // Templates
    // =========================================================================

    /// Registers a template decorator.
    ///
    /// # Errors
    ///
    /// `DuplicateTemplate` if `name` is already registered.
    pub fn try_set_template<F>(&mut self, name: &str, decorator: F) -> CoreResult<()>
    where
        F: Fn(&mut World, EntityId) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.templates.try_set(name, Arc::new(decorator))
    }

    /// Returns true if a template named `name` is registered.
    #[must_use]
    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains(name)
    }

    // =========================================================================
    // Frame
    // =========================================================================

    /// Runs one frame.
    pub fn update(&mut self, dt: f32) {
        self.begin_frame();
        self.update_controls(dt);
        self.update_systems(dt);
        self.end_frame();
    }

    fn begin_frame(&mut self) {
        tracing::trace!(
            "Frame {} begin: {} entities, {} systems",
            self.frame,
            self.entities.len(),
            self.systems.len()
        );
    }

    fn update_controls(&mut self, dt: f32) {
        // Positions only grow during the pass, so new entities are reached.
        self.entities.pin_order();
        let mut position = 0;
        while position < self.entities.span() {
            if let Some(id) = self.entities.id_at(position) {
                self.update_entity(id, dt);
            }
            position += 1;
        }
        self.entities.unpin_order();
    }

    fn update_entity(&mut self, id: EntityId, dt: f32) {
        let mut index = 0;
        loop {
            let Some(entity) = self.entities.get_mut(id) else {
                return;
            };
            if entity.is_disposed() {
                return;
            }
            let Some(slot) = entity.control_slot_mut(index) else {
                return;
            };
            index += 1;
            let consumer = slot.consumer;
            let Some(mut control) = slot.control.take() else {
                continue;
            };

            entity.pre_handling(consumer);
            control.on_update(&mut ControlContext::new(self, id, consumer), dt);
            if let Some(entity) = self.entities.get(id) {
                entity.post_handling(consumer);
            }
            self.restore_control(id, consumer, control);
        }
    }

    fn update_systems(&mut self, dt: f32) {
        let consumers: Vec<ConsumerId> = self.systems.iter().map(|s| s.consumer).collect();
        for consumer in consumers {
            let Some(mut system) = self
                .systems
                .iter_mut()
                .find(|s| s.consumer == consumer)
                .and_then(|s| s.system.take())
            else {
                continue;
            };

            self.filters.on_pre_handling(consumer);
            system.on_update(&mut SystemContext::new(self, consumer), dt);
            self.filters.on_post_handling(consumer, &self.entities);
            self.restore_system(consumer, system);
        }
    }

    fn end_frame(&mut self) {
        let disposed = std::mem::take(&mut self.disposal);
        for id in disposed {
            self.release_entity(id);
        }

        let actions = self.deferred.drain_batch(self.config.deferred_batch_limit);
        if !actions.is_empty() {
            tracing::trace!("Running {} deferred actions", actions.len());
        }
        for action in actions {
            action(self);
        }
        self.frame += 1;
    }

    // =========================================================================
    // Boundary
    // =========================================================================

    /// Queues `action` to run at the end of the next frame.
    pub fn schedule_deferred(&self, action: impl FnOnce(&mut World) + Send + 'static) {
        // The queue owns a receiver, so sending cannot fail.
        self.deferred.sender().schedule(action);
    }

    /// Handle for scheduling deferred actions from other threads.
    #[must_use]
    pub fn deferred_sender(&self) -> DeferredSender {
        self.deferred.sender()
    }

    /// Deferred actions waiting for the end of a frame.
    #[must_use]
    pub fn deferred_pending(&self) -> usize {
        self.deferred.pending()
    }

    /// Current replicated state.
    ///
    /// For each replicated entity in creation order: its entity record,
    /// one record per trait, then one per tag. Disposed entities are left
    /// out.
    pub fn snapshot(&self) -> impl Iterator<Item = SnapshotRecord> + '_ {
        self.entities
            .iter()
            .filter(|entity| entity.is_replicated() && !entity.is_disposed())
            .flat_map(Entity::snapshot_records)
    }

    /// Applies a mutation received from a remote peer.
    ///
    /// Remote mutations are never journaled. Destroying an entity disposes
    /// it; its slot is released at the end of the frame.
    ///
    /// # Errors
    ///
    /// * `UnknownEntity` - the target entity is not live
    /// * `UnknownToken` - a template, trait or property name does not
    ///   resolve
    /// * `TypeMismatch` - a name resolves to a control or system
    pub fn apply_remote(&mut self, mutation: Mutation) -> CoreResult<()> {
        match mutation {
            Mutation::Create {
                entity,
                owner,
                template,
            } => {
                if self.entities.contains(entity) {
                    return Ok(());
                }
                let decorator = self.resolve_template(template.as_deref())?;
                self.spawn(entity, owner, true, template.as_deref(), decorator, Origin::Remote)
            }
            Mutation::Destroy { entity } => {
                self.require(entity)?;
                self.dispose(entity, Origin::Remote);
                Ok(())
            }
            Mutation::Attach {
                entity,
                target: Target::Trait(name),
            } => {
                let descriptor = self.types.trait_descriptor(&name)?;
                let code = self.bits.get_or_assign(descriptor.name)?;
                self.attach_trait(entity, code, descriptor, Origin::Remote)
                    .map(drop)
            }
            Mutation::Attach {
                entity,
                target: Target::Tag(tag),
            } => {
                self.require(entity)?;
                self.attach_tag(entity, &tag, Origin::Remote).map(drop)
            }
            Mutation::Detach {
                entity,
                target: Target::Trait(name),
            } => {
                let descriptor = self.types.trait_descriptor(&name)?;
                self.require(entity)?;
                if let Some(code) = self.bits.lookup(descriptor.name) {
                    self.detach_trait(entity, code, Origin::Remote);
                }
                Ok(())
            }
            Mutation::Detach {
                entity,
                target: Target::Tag(tag),
            } => {
                self.require(entity)?;
                self.detach_tag(entity, &tag, Origin::Remote);
                Ok(())
            }
            Mutation::SetProperty {
                entity,
                trait_name,
                property,
                value,
            } => {
                let descriptor = self.types.trait_descriptor(&trait_name)?;
                self.require(entity)?;
                let code = self
                    .bits
                    .lookup(descriptor.name)
                    .ok_or_else(|| CoreError::UnknownToken(trait_name.clone()))?;
                let instance = self
                    .entities
                    .get_mut(entity)
                    .and_then(|e| e.trait_at_mut(code))
                    .ok_or(CoreError::UnknownToken(trait_name))?;
                if !instance.apply_remote(&property, &value) {
                    return Err(CoreError::UnknownToken(property));
                }
                self.notify(entity, Event::Changed(entity, code));
                Ok(())
            }
        }
    }

    fn require(&self, id: EntityId) -> CoreResult<()> {
        if self.entities.contains(id) {
            Ok(())
        } else {
            Err(CoreError::UnknownEntity(id))
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::build(WorldConfig::default(), Arc::new(BitRegistry::new()))
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("mode", &self.config.mode)
            .field("entities", &self.entities.len())
            .field("systems", &self.systems.len())
            .field("filters", &self.filters.filter_count())
            .field("templates", &self.templates.len())
            .field("minted", &self.ids.minted())
            .field("traits", &self.traits)
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}
