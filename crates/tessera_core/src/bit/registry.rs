//! Token to bit-index assignment.

use std::any::type_name;
use std::collections::HashMap;

use parking_lot::RwLock;

use super::code::BitCode;
use crate::error::CoreResult;

/// Assigns every distinct token a permanent `BitCode`.
///
/// Tokens are tag strings or fully qualified type names, so looking up a
/// type and looking up its name yield the same code. Indices are handed
/// out in first-use order and never reclaimed.
///
/// # Thread Safety
///
/// Lookups take a read lock; only the first use of a token takes the write
/// lock. Share one registry per world through an `Arc`.
#[derive(Debug, Default)]
pub struct BitRegistry {
    inner: RwLock<Assignments>,
}

#[derive(Debug, Default)]
struct Assignments {
    codes: HashMap<String, BitCode>,
    tokens: Vec<String>,
}

impl BitRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the code of `token`, assigning the next free index on first
    /// use.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` once every index is taken. The registry is
    /// left unchanged in that case.
    pub fn get_or_assign(&self, token: &str) -> CoreResult<BitCode> {
        let cached = self.inner.read().codes.get(token).copied();
        if let Some(code) = cached {
            return Ok(code);
        }

        let mut inner = self.inner.write();
        if let Some(code) = inner.codes.get(token) {
            return Ok(*code);
        }
        let index = u32::try_from(inner.tokens.len()).unwrap_or(u32::MAX);
        let code = BitCode::new(index)?;
        inner.tokens.push(token.to_owned());
        inner.codes.insert(token.to_owned(), code);
        tracing::trace!("Assigned {} to {}", code, token);
        Ok(code)
    }

    /// Returns the code of type `T`, keyed by its fully qualified name.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` once every index is taken.
    pub fn code_of<T: ?Sized + 'static>(&self) -> CoreResult<BitCode> {
        self.get_or_assign(type_name::<T>())
    }

    /// Returns the code of `token` without assigning one.
    #[must_use]
    pub fn lookup(&self, token: &str) -> Option<BitCode> {
        self.inner.read().codes.get(token).copied()
    }

    /// Returns the token that owns `index`.
    #[must_use]
    pub fn token_of(&self, index: u32) -> Option<String> {
        self.inner.read().tokens.get(index as usize).cloned()
    }

    /// Number of assigned indices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().tokens.len()
    }

    /// Returns true if nothing has been assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every assignment.
    ///
    /// Codes handed out before the reset must not be used afterwards.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.codes.clear();
        inner.tokens.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use tessera_shared::BIT_CAPACITY;

    struct Health;
    struct Armor;

    #[test]
    fn test_first_use_order() {
        let registry = BitRegistry::new();
        let health = registry.code_of::<Health>().unwrap();
        let armor = registry.code_of::<Armor>().unwrap();

        assert_eq!(health.index(), 0);
        assert_eq!(armor.index(), 1);
        assert_eq!(registry.code_of::<Health>().unwrap(), health);
    }

    #[test]
    fn test_type_and_name_share_code() {
        let registry = BitRegistry::new();
        let by_name = registry.get_or_assign(type_name::<Health>()).unwrap();
        let by_type = registry.code_of::<Health>().unwrap();

        assert_eq!(by_name, by_type);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.token_of(0).as_deref(), Some(type_name::<Health>()));
    }

    #[test]
    fn test_capacity_exhausted() {
        let registry = BitRegistry::new();
        for i in 0..BIT_CAPACITY {
            registry.get_or_assign(&format!("tag-{i}")).unwrap();
        }

        let err = registry.get_or_assign("one-too-many").unwrap_err();
        assert!(matches!(err, CoreError::IndexOutOfRange { index: 1024, .. }));
        assert_eq!(registry.len(), BIT_CAPACITY as usize);
        assert!(registry.lookup("one-too-many").is_none());
        // Existing tokens still resolve.
        assert_eq!(registry.get_or_assign("tag-5").unwrap().index(), 5);
    }

    #[test]
    fn test_reset() {
        let registry = BitRegistry::new();
        registry.get_or_assign("a").unwrap();
        registry.reset();
        assert!(registry.is_empty());
        assert_eq!(registry.get_or_assign("b").unwrap().index(), 0);
    }
}
