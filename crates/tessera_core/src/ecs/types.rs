//! # Type Registry
//!
//! Name to constructor map for traits, controls and systems.
//!
//! Remote peers and templates refer to types by name. Each registered type
//! is reachable by its fully qualified name and, when no other registered
//! type shares it, by its last path segment.

use std::any::{type_name, TypeId};
use std::collections::HashMap;

use super::component::Trait;
use super::logic::{Control, System};
use crate::error::{CoreError, CoreResult};

/// Constructor of a boxed trait instance.
pub type TraitFactory = fn() -> Box<dyn Trait>;
/// Constructor of a boxed control.
pub type ControlFactory = fn() -> Box<dyn Control>;
/// Constructor of a boxed system.
pub type SystemFactory = fn() -> Box<dyn System>;

/// A registered type and its constructor.
#[derive(Clone, Copy, Debug)]
pub struct Descriptor<F> {
    /// Fully qualified type name.
    pub name: &'static str,
    /// Rust type id.
    pub type_id: TypeId,
    /// Constructor.
    pub make: F,
}

/// Descriptor of a trait type.
pub type TraitDescriptor = Descriptor<TraitFactory>;
/// Descriptor of a control type.
pub type ControlDescriptor = Descriptor<ControlFactory>;
/// Descriptor of a system type.
pub type SystemDescriptor = Descriptor<SystemFactory>;

#[derive(Clone, Copy, Debug)]
enum Entry {
    Trait(TraitDescriptor),
    Control(ControlDescriptor),
    System(SystemDescriptor),
}

impl Entry {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Trait(_) => "trait",
            Self::Control(_) => "control",
            Self::System(_) => "system",
        }
    }
}

fn make_trait<T: Trait + Default>() -> Box<dyn Trait> {
    Box::new(T::default())
}

fn make_control<C: Control + Default>() -> Box<dyn Control> {
    Box::new(C::default())
}

fn make_system<S: System + Default>() -> Box<dyn System> {
    Box::new(S::default())
}

/// Last path segment of a type name, ignoring generic arguments.
fn short_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    let start = base.rfind("::").map_or(0, |i| i + 2);
    &full[start..]
}

/// Registry of constructible types.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    entries: HashMap<&'static str, Entry>,
    /// Short name to full name; `None` once two types share the short name.
    aliases: HashMap<&'static str, Option<&'static str>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers trait type `T`. Idempotent.
    pub fn register_trait<T: Trait + Default>(&mut self) -> TraitDescriptor {
        if let Some(Entry::Trait(known)) = self.entries.get(type_name::<T>()) {
            return *known;
        }
        let descriptor = Descriptor {
            name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            make: make_trait::<T> as TraitFactory,
        };
        self.insert(Entry::Trait(descriptor));
        descriptor
    }

    /// Registers control type `C`. Idempotent.
    pub fn register_control<C: Control + Default>(&mut self) -> ControlDescriptor {
        let descriptor = Descriptor {
            name: type_name::<C>(),
            type_id: TypeId::of::<C>(),
            make: make_control::<C> as ControlFactory,
        };
        self.insert(Entry::Control(descriptor));
        descriptor
    }

    /// Registers system type `S`. Idempotent.
    pub fn register_system<S: System + Default>(&mut self) -> SystemDescriptor {
        let descriptor = Descriptor {
            name: type_name::<S>(),
            type_id: TypeId::of::<S>(),
            make: make_system::<S> as SystemFactory,
        };
        self.insert(Entry::System(descriptor));
        descriptor
    }

    /// Resolves a trait type by full or short name.
    ///
    /// # Errors
    ///
    /// `UnknownToken` if the name is not registered (or ambiguous),
    /// `TypeMismatch` if it names a control or system.
    pub fn trait_descriptor(&self, name: &str) -> CoreResult<TraitDescriptor> {
        match self.resolve(name)? {
            Entry::Trait(descriptor) => Ok(descriptor),
            other => Err(CoreError::TypeMismatch {
                expected: "trait",
                found: other.kind(),
            }),
        }
    }

    /// Resolves a control type by full or short name.
    ///
    /// # Errors
    ///
    /// `UnknownToken` or `TypeMismatch`, as for `trait_descriptor`.
    pub fn control_descriptor(&self, name: &str) -> CoreResult<ControlDescriptor> {
        match self.resolve(name)? {
            Entry::Control(descriptor) => Ok(descriptor),
            other => Err(CoreError::TypeMismatch {
                expected: "control",
                found: other.kind(),
            }),
        }
    }

    /// Resolves a system type by full or short name.
    ///
    /// # Errors
    ///
    /// `UnknownToken` or `TypeMismatch`, as for `trait_descriptor`.
    pub fn system_descriptor(&self, name: &str) -> CoreResult<SystemDescriptor> {
        match self.resolve(name)? {
            Entry::System(descriptor) => Ok(descriptor),
            other => Err(CoreError::TypeMismatch {
                expected: "system",
                found: other.kind(),
            }),
        }
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds `entry` unless its name is taken. Returns `false` for a repeat.
    fn insert(&mut self, entry: Entry) -> bool {
        let name = match entry {
            Entry::Trait(d) => d.name,
            Entry::Control(d) => d.name,
            Entry::System(d) => d.name,
        };
        if self.entries.contains_key(name) {
            return false;
        }
        self.entries.insert(name, entry);

        let short = short_name(name);
        if short != name {
            self.aliases
                .entry(short)
                .and_modify(|full| *full = None)
                .or_insert(Some(name));
        }
        tracing::trace!("Registered {} {}", entry.kind(), name);
        true
    }

    fn resolve(&self, name: &str) -> CoreResult<Entry> {
        if let Some(entry) = self.entries.get(name) {
            return Ok(*entry);
        }
        self.aliases
            .get(name)
            .copied()
            .flatten()
            .and_then(|full| self.entries.get(full))
            .copied()
            .ok_or_else(|| CoreError::UnknownToken(name.to_owned()))
    }
}
