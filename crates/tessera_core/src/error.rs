//! # Core Error Types
//!
//! Everything that can fail in the matching core. Filters and matching
//! themselves have no error paths; failures come from running out of bit
//! capacity, unresolvable names and bad configuration.

use thiserror::Error;

use tessera_shared::EntityId;

/// Errors that can occur in the matching core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// More distinct trait types and tags than a bit-set can hold.
    #[error("bit index {index} out of range: capacity is {capacity}")]
    IndexOutOfRange {
        /// The index that was requested.
        index: u32,
        /// The fixed capacity.
        capacity: u32,
    },

    /// A name did not resolve to a registered type.
    #[error("unknown token: {0}")]
    UnknownToken(String),

    /// A template with this name is already registered.
    #[error("duplicate template: {0}")]
    DuplicateTemplate(String),

    /// The entity is not live in this world.
    #[error("unknown entity: {0}")]
    UnknownEntity(EntityId),

    /// A name resolved, but to a different kind of type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Kind the caller asked for.
        expected: &'static str,
        /// Kind the name is registered as.
        found: &'static str,
    },

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
