//! # Memory Management
//!
//! Reuse-oriented containers for the entity lifecycle.
//!
//! ## Design Philosophy
//!
//! Entities and trait instances churn every frame. Instead of dropping
//! them:
//! - Entity objects park in a slot pool and are reset on reuse
//! - Trait instances park in per-type stacks (see `ecs::TraitPool`)
//! - Filter results use an ordered set with O(1) removal

mod ordered;
mod pool;

pub use ordered::OrderedIdSet;
pub use pool::{PoolHandle, SlotPool};
