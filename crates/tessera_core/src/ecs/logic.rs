//! # Controls and Systems
//!
//! Consumers of filter results. A control belongs to one entity and sees
//! that entity's filters; a system belongs to the world and sees world
//! filters. Both run once per `World::update`, each bracketed by pre/post
//! handling so their filters stay stable while they iterate.

use std::ops::{Deref, DerefMut};

use tessera_shared::{ApplyDomain, ConsumerId, EntityId, TupleKind};

use super::component::AsAny;
use super::filter::FilterRef;
use super::matcher::Matcher;
use super::world::World;
use crate::error::CoreResult;

/// Per-entity logic.
pub trait Control: AsAny + Send {
    /// Worlds this control runs in. Controls not applied to the world's
    /// mode are never attached.
    fn domain(&self) -> ApplyDomain {
        ApplyDomain::NetMultiple
    }

    /// Called once when the control is attached.
    fn on_init(&mut self, _ctx: &mut ControlContext<'_>) {}

    /// Called once per frame.
    fn on_update(&mut self, ctx: &mut ControlContext<'_>, dt: f32);

    /// Called when the owning entity is deactivated.
    fn on_dispose(&mut self) {}
}

/// World-wide logic.
pub trait System: AsAny + Send {
    /// Worlds this system runs in.
    fn domain(&self) -> ApplyDomain {
        ApplyDomain::NetMultiple
    }

    /// Called once when the system is added.
    fn on_init(&mut self, _ctx: &mut SystemContext<'_>) {}

    /// Called once per frame, after every entity's controls.
    fn on_update(&mut self, ctx: &mut SystemContext<'_>, dt: f32);

    /// Called when the system is removed from the world.
    fn on_dispose(&mut self, _world: &mut World) {}
}

/// View of the world handed to a running control.
///
/// Dereferences to `World`, so every world operation is available.
pub struct ControlContext<'w> {
    world: &'w mut World,
    entity: EntityId,
    consumer: ConsumerId,
}

impl<'w> ControlContext<'w> {
    pub(crate) fn new(world: &'w mut World, entity: EntityId, consumer: ConsumerId) -> Self {
        Self {
            world,
            entity,
            consumer,
        }
    }

    /// Entity the control belongs to.
    #[inline]
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    /// Consumer id of the control.
    #[inline]
    #[must_use]
    pub const fn consumer(&self) -> ConsumerId {
        self.consumer
    }

    /// Gets or creates a filter over the control's entity.
    ///
    /// # Errors
    ///
    /// `UnknownEntity` if the entity has already been released.
    pub fn filter(&mut self, kind: TupleKind, matcher: &Matcher) -> CoreResult<FilterRef> {
        self.world
            .entity_filter(self.entity, self.consumer, kind, matcher)
    }
}

impl Deref for ControlContext<'_> {
    type Target = World;

    fn deref(&self) -> &World {
        self.world
    }
}

impl DerefMut for ControlContext<'_> {
    fn deref_mut(&mut self) -> &mut World {
        self.world
    }
}

/// View of the world handed to a running system.
pub struct SystemContext<'w> {
    world: &'w mut World,
    consumer: ConsumerId,
}

impl<'w> SystemContext<'w> {
    pub(crate) fn new(world: &'w mut World, consumer: ConsumerId) -> Self {
        Self { world, consumer }
    }

    /// Consumer id of the system.
    #[inline]
    #[must_use]
    pub const fn consumer(&self) -> ConsumerId {
        self.consumer
    }

    /// Gets or creates a world filter for this system.
    ///
    /// Identical job matchers share one filter across systems.
    pub fn filter(&mut self, kind: TupleKind, matcher: &Matcher) -> FilterRef {
        self.world.filter(self.consumer, kind, matcher)
    }
}

impl Deref for SystemContext<'_> {
    type Target = World;

    fn deref(&self) -> &World {
        self.world
    }
}

impl DerefMut for SystemContext<'_> {
    fn deref_mut(&mut self) -> &mut World {
        self.world
    }
}
