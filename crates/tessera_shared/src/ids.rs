//! # Identifiers
//!
//! Entity and owner ids are opaque 64-bit values. Unlike slot indices they
//! are never reused: a pooled entity slot receives a fresh id every time it
//! is activated.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::SERVER_ID_FLAG;

/// Unique identifier for an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns true if the id was minted by an authoritative world.
    #[inline]
    #[must_use]
    pub const fn is_authoritative(self) -> bool {
        self.0 & SERVER_ID_FLAG != 0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{:x}", self.0)
    }
}

/// Identifier of the peer (or local world) that created an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct OwnerId(pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{:x}", self.0)
    }
}

/// Identifier of a registered consumer (control or system).
///
/// Filters are grouped per consumer so that pre/post handling brackets
/// lock exactly the filters that consumer iterates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ConsumerId(pub u64);
