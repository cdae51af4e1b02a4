//! # Trait Components
//!
//! A trait is a component instance attached to at most one entity at a
//! time. Instances are reused: detaching resets the instance and parks it
//! in a per-type pool, and the next attach of the same type takes it back.

use std::any::{type_name, Any};

use tessera_shared::{PropValue, TraitState};

/// Type erasure helpers shared by traits, controls and systems.
///
/// Implemented for every `'static` type; never implement it by hand.
pub trait AsAny: Any {
    /// Upcasts to `&dyn Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
    /// Upcasts to `&mut dyn Any` for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Fully qualified name of the concrete type.
    fn type_name(&self) -> &'static str;
}

impl<T: Any> AsAny for T {
    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    #[inline]
    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

/// A component attachable to entities.
///
/// Every hook has a default, so plain data types only need
/// `impl Trait for MyData {}` plus `Default`.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct Health {
///     current: i64,
/// }
///
/// impl Trait for Health {
///     fn on_reset(&mut self) {
///         self.current = 0;
///     }
///
///     fn snapshot(&self) -> TraitState {
///         TraitState::new().with("current", PropValue::Int(self.current))
///     }
///
///     fn apply_remote(&mut self, property: &str, value: &PropValue) -> bool {
///         match (property, value.as_int()) {
///             ("current", Some(v)) => { self.current = v; true }
///             _ => false,
///         }
///     }
/// }
/// ```
pub trait Trait: AsAny + Send {
    /// Called each time the instance is attached to an entity.
    fn on_init(&mut self) {}

    /// Called when the instance is detached, before it is pooled.
    ///
    /// Must return the instance to a state indistinguishable from a fresh
    /// `Default`.
    fn on_reset(&mut self) {}

    /// Replicated state of the instance.
    fn snapshot(&self) -> TraitState {
        TraitState::new()
    }

    /// Applies one remotely received property value.
    ///
    /// Returns `true` if the property was recognized and applied; the
    /// entity then signals a change for this trait.
    fn apply_remote(&mut self, _property: &str, _value: &PropValue) -> bool {
        false
    }
}
