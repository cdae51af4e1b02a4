//! # Cross-thread Access
//!
//! The world is mutated from one simulation thread at a time. Other
//! threads reach it two ways:
//!
//! - `SharedWorld`: a mutex around the world for remote mutations,
//!   snapshots and outbox draining
//! - `DeferredSender`: a lock-free queue of callbacks run at the end of
//!   the next frame

mod deferred;
mod shared;

pub use deferred::{DeferredAction, DeferredQueue, DeferredSender};
pub use shared::SharedWorld;
