//! # Templates
//!
//! A template is a named decorator run on every entity created with that
//! name, typically attaching a fixed set of traits, tags and controls.
//!
//! ```rust,ignore
//! world.try_set_template("orc", |world: &mut World, id| {
//!     world.add_trait::<Health>(id)?;
//!     world.add_tag(id, "enemy")?;
//!     Ok(())
//! })?;
//! let orc = world.create_entity(true, Some("orc"))?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tessera_shared::EntityId;

use super::world::World;
use crate::error::{CoreError, CoreResult};

/// Decorator applied to a freshly created entity.
pub type Decorator = Arc<dyn Fn(&mut World, EntityId) -> CoreResult<()> + Send + Sync>;

/// Templates by name.
#[derive(Default)]
pub struct Templates {
    decorators: HashMap<String, Decorator>,
}

impl Templates {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `decorator` under `name`.
    ///
    /// # Errors
    ///
    /// `DuplicateTemplate` if the name is taken; the existing decorator is
    /// kept.
    pub fn try_set(&mut self, name: &str, decorator: Decorator) -> CoreResult<()> {
        if self.decorators.contains_key(name) {
            return Err(CoreError::DuplicateTemplate(name.to_owned()));
        }
        self.decorators.insert(name.to_owned(), decorator);
        Ok(())
    }

    /// Decorator registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Decorator> {
        self.decorators.get(name).cloned()
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.decorators.contains_key(name)
    }

    /// Number of templates.
    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.decorators.len()
    }
}

impl fmt::Debug for Templates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.decorators.keys()).finish()
    }
}
