//! # Deferred Actions
//!
//! Callbacks scheduled from any thread and run on the simulation thread at
//! the end of a frame, with full access to the world.
//!
//! The queue is a crossbeam channel, so scheduling never takes the world
//! lock. Only actions already queued when a drain starts run in that
//! drain; anything they schedule waits for the next frame.

use std::fmt;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::ecs::World;

/// A callback run against the world at end of frame.
pub type DeferredAction = Box<dyn FnOnce(&mut World) + Send>;

/// Cloneable handle for scheduling deferred actions from other threads.
#[derive(Clone)]
pub struct DeferredSender {
    sender: Sender<DeferredAction>,
}

impl DeferredSender {
    /// Queues `action`.
    ///
    /// Returns `false` if the world has been dropped.
    pub fn schedule(&self, action: impl FnOnce(&mut World) + Send + 'static) -> bool {
        self.sender.send(Box::new(action)).is_ok()
    }

    /// Actions queued and not yet run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.sender.len()
    }
}

impl fmt::Debug for DeferredSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredSender")
            .field("pending", &self.sender.len())
            .finish()
    }
}

/// Receiving end, owned by the world.
pub struct DeferredQueue {
    sender: Sender<DeferredAction>,
    receiver: Receiver<DeferredAction>,
}

impl DeferredQueue {
    /// Creates an empty unbounded queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// New handle for scheduling into this queue.
    #[must_use]
    pub fn sender(&self) -> DeferredSender {
        DeferredSender {
            sender: self.sender.clone(),
        }
    }

    /// Actions queued and not yet run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Takes the actions queued right now, oldest first.
    ///
    /// At most `limit` actions are taken (`0` = no limit). Actions queued
    /// after this call are left for the next drain.
    pub fn drain_batch(&self, limit: usize) -> Vec<DeferredAction> {
        let mut count = self.receiver.len();
        if limit > 0 {
            count = count.min(limit);
        }
        self.receiver.try_iter().take(count).collect()
    }
}

impl Default for DeferredQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DeferredQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredQueue")
            .field("pending", &self.receiver.len())
            .finish()
    }
}
