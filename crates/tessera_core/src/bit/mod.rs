//! # Bit Identity
//!
//! Every trait type and every tag string is identified by one bit in a
//! fixed 1024-bit set. An entity's live set is the union of its bits, and
//! predicates reduce to word-wise `contains` / `intersects` checks.

mod code;
mod registry;

pub use code::{BitCode, CompositeBitSet};
pub use registry::BitRegistry;
