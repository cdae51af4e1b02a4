//! # Shared World
//!
//! Process-wide handle funnelling every cross-thread access to a `World`
//! through one mutex.
//!
//! ```text
//!  simulation thread ──update()──────┐
//!  network thread ────apply_batch()──┼──► Mutex<World>
//!  replication ───────drain_outbox()─┘
//!  any thread ────────schedule_deferred() ──► channel (no lock)
//! ```

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tessera_shared::{Mutation, SnapshotRecord, SyncRecord};

use super::deferred::DeferredSender;
use crate::ecs::World;
use crate::error::CoreResult;

/// Cloneable, thread-safe handle to a world.
#[derive(Clone, Debug)]
pub struct SharedWorld {
    world: Arc<Mutex<World>>,
    deferred: DeferredSender,
}

impl SharedWorld {
    /// Wraps `world`.
    #[must_use]
    pub fn new(world: World) -> Self {
        let deferred = world.deferred_sender();
        Self {
            world: Arc::new(Mutex::new(world)),
            deferred,
        }
    }

    /// Runs one frame under the lock.
    pub fn update(&self, dt: f32) {
        self.world.lock().update(dt);
    }

    /// Applies one remote mutation.
    ///
    /// # Errors
    ///
    /// As `World::apply_remote`; the rejection is also logged.
    pub fn apply_remote(&self, mutation: Mutation) -> CoreResult<()> {
        let result = self.world.lock().apply_remote(mutation);
        if let Err(error) = &result {
            tracing::warn!("Rejected remote mutation: {}", error);
        }
        result
    }

    /// Applies `mutations` in order under a single lock.
    ///
    /// Rejected mutations are logged and skipped. Returns how many were
    /// applied.
    pub fn apply_batch(&self, mutations: impl IntoIterator<Item = Mutation>) -> usize {
        let mut world = self.world.lock();
        let mut applied = 0;
        for mutation in mutations {
            let entity = mutation.entity();
            match world.apply_remote(mutation) {
                Ok(()) => applied += 1,
                Err(error) => tracing::warn!("Rejected remote mutation on {}: {}", entity, error),
            }
        }
        applied
    }

    /// Copies the current replicated state.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SnapshotRecord> {
        self.world.lock().snapshot().collect()
    }

    /// Takes the journaled local mutations.
    #[must_use]
    pub fn drain_outbox(&self) -> Vec<SyncRecord> {
        self.world.lock().drain_outbox()
    }

    /// Queues `action` for the end of the next frame without locking.
    ///
    /// Returns `false` if the world has been dropped.
    pub fn schedule_deferred(&self, action: impl FnOnce(&mut World) + Send + 'static) -> bool {
        self.deferred.schedule(action)
    }

    /// Runs `f` with exclusive access to the world.
    pub fn with_world<R>(&self, f: impl FnOnce(&mut World) -> R) -> R {
        f(&mut self.world.lock())
    }

    /// Locks the world.
    pub fn lock(&self) -> MutexGuard<'_, World> {
        self.world.lock()
    }
}
