//! # TESSERA Shared
//!
//! Types that live on the boundary of the matching core.
//!
//! Both the core and any replication layer built on top of it agree on
//! these definitions:
//! - Identifiers (`EntityId`, `OwnerId`, `ConsumerId`)
//! - World roles (`WorldMode`, `ApplyDomain`) and filter flavours (`TupleKind`)
//! - Snapshot and mutation records exchanged with remote peers
//!
//! ## CRITICAL RULE
//!
//! Bit indices never appear here. They are process-local; only names
//! cross the boundary.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod ids;
pub mod modes;
pub mod protocol;

pub use constants::{BIT_CAPACITY, SERVER_ID_FLAG, WORD_BITS, WORD_COUNT};
pub use ids::{ConsumerId, EntityId, OwnerId};
pub use modes::{ApplyDomain, TupleKind, WorldMode};
pub use protocol::{Mutation, PropValue, SnapshotRecord, SyncRecord, Target, TraitState};
