//! Entity and owner id minting.

use tessera_shared::{EntityId, OwnerId, WorldMode, SERVER_ID_FLAG};

/// Mints ids that are never reused within one world.
///
/// Authoritative worlds set `SERVER_ID_FLAG` on every id, so ids minted by
/// a server and by its clients never collide.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    flag: u64,
    counter: u64,
}

impl IdAllocator {
    /// Creates an allocator for a world running in `mode`.
    #[must_use]
    pub const fn new(mode: WorldMode) -> Self {
        Self {
            flag: if mode.is_authoritative() { SERVER_ID_FLAG } else { 0 },
            counter: 0,
        }
    }

    fn next(&mut self) -> u64 {
        self.counter += 1;
        self.flag | self.counter
    }

    /// Next entity id.
    pub fn next_entity(&mut self) -> EntityId {
        EntityId(self.next())
    }

    /// Next owner id.
    pub fn next_owner(&mut self) -> OwnerId {
        OwnerId(self.next())
    }

    /// Ids minted so far.
    #[inline]
    #[must_use]
    pub(crate) const fn minted(&self) -> u64 {
        self.counter
    }
}
