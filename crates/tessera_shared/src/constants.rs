//! # Engine Constants
//!
//! Capacities baked into every bit-set. Changing them changes the memory
//! layout of `CompositeBitSet` and the id ranges handed out by a world.

// =============================================================================
// BIT IDENTITY
// =============================================================================

/// Number of bits in one storage word.
pub const WORD_BITS: u32 = 64;

/// Number of words in a composite bit-set.
pub const WORD_COUNT: usize = 16;

/// Maximum number of distinct trait types plus tag strings per process.
#[allow(clippy::cast_possible_truncation)]
pub const BIT_CAPACITY: u32 = WORD_BITS * WORD_COUNT as u32;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// High bit set on every id minted by an authoritative (standalone or
/// server) world. Client-minted ids never carry it, so the ranges are
/// disjoint.
pub const SERVER_ID_FLAG: u64 = 1 << 63;
