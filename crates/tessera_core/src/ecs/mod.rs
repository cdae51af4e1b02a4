//! # Entity Component System
//!
//! Entities, traits, tags and the incremental query machinery on top of
//! them.
//!
//! ## Design Philosophy
//!
//! - Queries are registered once and kept up to date by events, never
//!   re-evaluated by scanning
//! - Identical job queries share one filter across consumers
//! - A consumer's filters are frozen while it runs; mutations it causes
//!   are replayed after it returns
//! - Entity slots and trait instances are pooled and reused

mod component;
mod entity;
mod filter;
mod ids;
mod logic;
mod matcher;
mod registry;
mod storage;
mod store;
mod template;
mod types;
mod world;

pub use component::{AsAny, Trait};
pub use entity::Entity;
pub use filter::{Event, Filter, FilterRef, FilterScope, FilterView, LiveSetSource, SingleLive};
pub use ids::IdAllocator;
pub use logic::{Control, ControlContext, System, SystemContext};
pub use matcher::{Matcher, MatcherBuilder};
pub use registry::FilterRegistry;
pub use storage::TraitPool;
pub use store::EntityStore;
pub use template::{Decorator, Templates};
pub use types::{
    ControlDescriptor, ControlFactory, Descriptor, SystemDescriptor, SystemFactory,
    TraitDescriptor, TraitFactory, TypeRegistry,
};
pub use world::World;
