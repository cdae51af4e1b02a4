//! World roles and filter flavours.

use serde::{Deserialize, Serialize};

/// Role of a world in a (possibly networked) session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldMode {
    /// Single process, no replication.
    #[default]
    Standalone,
    /// Receives authoritative state from a server.
    Client,
    /// Authoritative; journals replicated mutations.
    Server,
}

impl WorldMode {
    /// Returns true if ids minted here carry the server flag.
    #[inline]
    #[must_use]
    pub const fn is_authoritative(self) -> bool {
        matches!(self, Self::Standalone | Self::Server)
    }
}

/// Where a control or system runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyDomain {
    /// Client worlds only.
    Client,
    /// Server worlds only.
    Server,
    /// Every world.
    #[default]
    NetMultiple,
}

impl ApplyDomain {
    /// Returns true if logic with this domain runs in a world of `mode`.
    ///
    /// Standalone worlds run everything.
    #[must_use]
    pub const fn is_applied(self, mode: WorldMode) -> bool {
        match (mode, self) {
            (WorldMode::Standalone, _)
            | (_, Self::NetMultiple)
            | (WorldMode::Client, Self::Client)
            | (WorldMode::Server, Self::Server) => true,
            (WorldMode::Client, Self::Server) | (WorldMode::Server, Self::Client) => false,
        }
    }
}

/// Filter flavour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TupleKind {
    /// Durable membership; shareable between consumers.
    Job,
    /// One-frame pulse of changed matches; private to its consumer.
    Reactive,
}

impl TupleKind {
    /// Both kinds, in registry slot order.
    pub const ALL: [Self; 2] = [Self::Job, Self::Reactive];

    /// Slot of this kind in per-kind tables.
    #[inline]
    #[must_use]
    pub const fn slot(self) -> usize {
        match self {
            Self::Job => 0,
            Self::Reactive => 1,
        }
    }
}
