//! # TESSERA Core
//!
//! Incremental matching core of an entity component system:
//! - Entities carry traits (components) and tags that change every frame
//! - Consumers register predicates once and read always-current results
//! - Membership changes never disturb a consumer mid-iteration
//!
//! ## Architecture Rules
//!
//! 1. **Bits, not names** - every trait type and tag owns one bit of a
//!    1024-bit set; predicates are word-wise set operations
//! 2. **Events, not scans** - filters update from add/remove/change events,
//!    fanned out only to filters that mention the bit
//! 3. **Lock while reading** - a running consumer's filters queue events
//!    and replay them in order afterwards
//! 4. **Reuse** - entity slots and trait instances are pooled
//!
//! ## Example
//!
//! ```rust,ignore
//! use tessera_core::{TupleKind, World, WorldConfig};
//!
//! let mut world = World::new(WorldConfig::default())?;
//! let id = world.create_entity(true, None)?;
//! world.add_tag(id, "enemy")?;
//!
//! let matcher = world.matcher().has_tag("enemy").build()?;
//! let consumer = world.register_consumer();
//! let enemies = world.filter(consumer, TupleKind::Job, &matcher);
//! assert_eq!(enemies.entities(), vec![id]);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod bit;
pub mod config;
pub mod ecs;
pub mod error;
pub mod memory;
pub mod sync;

pub use bit::{BitCode, BitRegistry, CompositeBitSet};
pub use config::WorldConfig;
pub use ecs::{
    AsAny, Control, ControlContext, Entity, Event, Filter, FilterRef, FilterRegistry,
    FilterScope, Matcher, MatcherBuilder, System, SystemContext, Trait, TypeRegistry, World,
};
pub use error::{CoreError, CoreResult};
pub use sync::{DeferredSender, SharedWorld};
pub use tessera_shared::{
    ApplyDomain, ConsumerId, EntityId, Mutation, OwnerId, PropValue, SnapshotRecord, SyncRecord,
    Target, TraitState, TupleKind, WorldMode,
};
