//! Replication records shared between the core and a replication layer.
//!
//! These types describe state by NAME (trait type names, tag strings).
//! The transport that moves them is out of scope; serde derives make
//! them encodable by whichever format the transport picks.

use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, OwnerId};

/// A single replicated property value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PropValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point number.
    Float(f64),
    /// Text.
    Str(String),
    /// Ordered list of values.
    List(Vec<PropValue>),
}

impl PropValue {
    /// Returns the value as `i64` if it is an integer that fits.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Self::Int(v) => Some(v),
            Self::UInt(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Returns the value as `f64` for any numeric variant.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match *self {
            Self::Float(v) => Some(v),
            Self::Int(v) => Some(v as f64),
            Self::UInt(v) => Some(v as f64),
            _ => None,
        }
    }

    /// Returns the value as `bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the value as a string slice.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }
}

/// Named property values describing one trait instance.
///
/// Property order is insertion order; setting an existing name overwrites
/// in place.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TraitState {
    properties: Vec<(String, PropValue)>,
}

impl TraitState {
    /// Creates an empty state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            properties: Vec::new(),
        }
    }

    /// Sets a property, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: PropValue) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a property.
    pub fn set(&mut self, name: impl Into<String>, value: PropValue) {
        let name = name.into();
        match self.properties.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = value,
            None => self.properties.push((name, value)),
        }
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.properties
            .iter()
            .find_map(|(key, value)| (key == name).then_some(value))
    }

    /// Number of properties.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns true if no property is set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Iterates properties in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.properties.iter().map(|(key, value)| (key.as_str(), value))
    }
}

/// What a structural mutation attaches or detaches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// A trait, by type name (full or unambiguous short name).
    Trait(String),
    /// A tag string.
    Tag(String),
}

/// A mutation of world state, either received from a remote peer or
/// journaled locally for one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    /// Create an entity with a known id.
    Create {
        /// Id of the new entity.
        entity: EntityId,
        /// Creator of the entity.
        owner: OwnerId,
        /// Template applied after creation, if any.
        template: Option<String>,
    },
    /// Destroy an entity at the end of the current frame.
    Destroy {
        /// Entity to destroy.
        entity: EntityId,
    },
    /// Attach a trait or tag.
    Attach {
        /// Target entity.
        entity: EntityId,
        /// What to attach.
        target: Target,
    },
    /// Detach a trait or tag.
    Detach {
        /// Target entity.
        entity: EntityId,
        /// What to detach.
        target: Target,
    },
    /// Apply a property value to an attached trait.
    SetProperty {
        /// Target entity.
        entity: EntityId,
        /// Trait type name.
        trait_name: String,
        /// Property name.
        property: String,
        /// New value.
        value: PropValue,
    },
}

impl Mutation {
    /// Entity the mutation applies to.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        match self {
            Self::Create { entity, .. }
            | Self::Destroy { entity }
            | Self::Attach { entity, .. }
            | Self::Detach { entity, .. }
            | Self::SetProperty { entity, .. } => *entity,
        }
    }
}

/// A journaled mutation together with the owner of the entity it touched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Owner of the mutated entity.
    pub owner: OwnerId,
    /// The mutation.
    pub mutation: Mutation,
}

/// One record of a world snapshot.
///
/// A snapshot lists, per replicated entity, an `Entity` record followed by
/// its `Trait` records and then its `Tag` records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SnapshotRecord {
    /// A replicated entity.
    Entity {
        /// Entity id.
        id: EntityId,
        /// Creator.
        owner: OwnerId,
        /// Template the entity was created with.
        template: Option<String>,
    },
    /// A trait attached to an entity.
    Trait {
        /// Owning entity.
        entity: EntityId,
        /// Trait type name.
        name: String,
        /// Replicated state of the trait.
        state: TraitState,
    },
    /// A tag attached to an entity.
    Tag {
        /// Owning entity.
        entity: EntityId,
        /// Tag string.
        tag: String,
    },
}

impl SnapshotRecord {
    /// Converts the record into the mutation that recreates it remotely.
    ///
    /// Trait state is not carried by the mutation; apply it separately with
    /// `SetProperty` mutations.
    #[must_use]
    pub fn to_mutation(&self) -> Mutation {
        match self {
            Self::Entity { id, owner, template } => Mutation::Create {
                entity: *id,
                owner: *owner,
                template: template.clone(),
            },
            Self::Trait { entity, name, .. } => Mutation::Attach {
                entity: *entity,
                target: Target::Trait(name.clone()),
            },
            Self::Tag { entity, tag } => Mutation::Attach {
                entity: *entity,
                target: Target::Tag(tag.clone()),
            },
        }
    }
}
