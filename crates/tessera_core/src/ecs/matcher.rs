//! # Matchers
//!
//! A matcher is a compiled predicate over an entity's live set:
//!
//! ```text
//! matches(live) = live ⊇ required  AND  live ∩ excluded = ∅
//! ```
//!
//! Two matchers with the same `required` and `excluded` sets are
//! interchangeable; the filter registry relies on this to share filters.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use super::component::Trait;
use super::types::TypeRegistry;
use crate::bit::{BitCode, BitRegistry, CompositeBitSet};
use crate::error::{CoreError, CoreResult};

/// Compiled `has` / `except` predicate.
#[derive(Clone, Debug, Default)]
pub struct Matcher {
    required: CompositeBitSet,
    excluded: CompositeBitSet,
    /// Every index named by the predicate, in either set.
    touched: BTreeSet<u32>,
}

impl Matcher {
    /// Creates a matcher that accepts every entity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `code`.
    ///
    /// The first mention of an index wins: if `code` was already excluded
    /// this is a no-op and returns `false`.
    pub fn require(&mut self, code: BitCode) -> bool {
        if !self.touched.insert(code.index()) {
            return false;
        }
        self.required.add(code);
        true
    }

    /// Excludes `code`. First mention wins, as for `require`.
    pub fn exclude(&mut self, code: BitCode) -> bool {
        if !self.touched.insert(code.index()) {
            return false;
        }
        self.excluded.add(code);
        true
    }

    /// Bits an entity must carry.
    #[inline]
    #[must_use]
    pub const fn required(&self) -> &CompositeBitSet {
        &self.required
    }

    /// Bits an entity must not carry.
    #[inline]
    #[must_use]
    pub const fn excluded(&self) -> &CompositeBitSet {
        &self.excluded
    }

    /// Indices mentioned by the predicate, ascending.
    pub fn touched(&self) -> impl Iterator<Item = u32> + '_ {
        self.touched.iter().copied()
    }

    /// Returns true if `live` satisfies the predicate.
    #[inline]
    #[must_use]
    pub fn matches(&self, live: &CompositeBitSet) -> bool {
        live.contains(&self.required) && !live.intersects(&self.excluded)
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        self.required == other.required && self.excluded == other.excluded
    }
}

impl Eq for Matcher {}

impl Hash for Matcher {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.required.hash(state);
        self.excluded.hash(state);
    }
}

/// Fluent builder for `Matcher`.
///
/// Obtained from `World::matcher`. Errors (unknown names, exhausted bit
/// capacity) are held until `build`, which reports the first one.
///
/// # Example
///
/// ```rust,ignore
/// let matcher = world
///     .matcher()
///     .has_trait::<Position>()
///     .has_tag("enemy")
///     .except_trait::<Dead>()
///     .build()?;
/// ```
#[must_use]
pub struct MatcherBuilder<'a> {
    bits: &'a BitRegistry,
    types: &'a TypeRegistry,
    matcher: Matcher,
    error: Option<CoreError>,
}

impl<'a> MatcherBuilder<'a> {
    /// Creates a builder resolving names through `bits` and `types`.
    pub fn new(bits: &'a BitRegistry, types: &'a TypeRegistry) -> Self {
        Self {
            bits,
            types,
            matcher: Matcher::new(),
            error: None,
        }
    }

    /// Requires trait `T`.
    pub fn has_trait<T: Trait>(self) -> Self {
        let code = self.bits.code_of::<T>();
        self.with(code, Matcher::require)
    }

    /// Requires the trait registered under `name`.
    pub fn has_trait_named(self, name: &str) -> Self {
        let code = self.named(name);
        self.with(code, Matcher::require)
    }

    /// Requires tag `tag`.
    pub fn has_tag(self, tag: &str) -> Self {
        let code = self.bits.get_or_assign(tag);
        self.with(code, Matcher::require)
    }

    /// Excludes trait `T`.
    pub fn except_trait<T: Trait>(self) -> Self {
        let code = self.bits.code_of::<T>();
        self.with(code, Matcher::exclude)
    }

    /// Excludes the trait registered under `name`.
    pub fn except_trait_named(self, name: &str) -> Self {
        let code = self.named(name);
        self.with(code, Matcher::exclude)
    }

    /// Excludes tag `tag`.
    pub fn except_tag(self, tag: &str) -> Self {
        let code = self.bits.get_or_assign(tag);
        self.with(code, Matcher::exclude)
    }

    /// Finishes the matcher.
    ///
    /// # Errors
    ///
    /// The first `IndexOutOfRange`, `UnknownToken` or `TypeMismatch` met
    /// while building.
    pub fn build(self) -> CoreResult<Matcher> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.matcher),
        }
    }

    fn named(&self, name: &str) -> CoreResult<BitCode> {
        let descriptor = self.types.trait_descriptor(name)?;
        self.bits.get_or_assign(descriptor.name)
    }

    fn with(mut self, code: CoreResult<BitCode>, apply: fn(&mut Matcher, BitCode) -> bool) -> Self {
        if self.error.is_none() {
            match code {
                Ok(code) => {
                    apply(&mut self.matcher, code);
                }
                Err(error) => self.error = Some(error),
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct A;
    impl Trait for A {}
    #[derive(Default)]
    struct B;
    impl Trait for B {}
    #[derive(Default)]
    struct C;
    impl Trait for C {}
    #[derive(Default)]
    struct D;
    impl Trait for D {}

    fn live(bits: &BitRegistry, tokens: &[&str]) -> CompositeBitSet {
        tokens
            .iter()
            .map(|t| bits.get_or_assign(t).unwrap())
            .collect()
    }

    #[test]
    fn test_has_except() {
        let bits = BitRegistry::new();
        let types = TypeRegistry::new();
        let matcher = MatcherBuilder::new(&bits, &types)
            .has_trait::<A>()
            .has_trait::<B>()
            .has_tag("E")
            .except_trait::<C>()
            .except_tag("F")
            .build()
            .unwrap();

        let a = std::any::type_name::<A>();
        let b = std::any::type_name::<B>();
        let c = std::any::type_name::<C>();
        let d = std::any::type_name::<D>();

        assert!(matcher.matches(&live(&bits, &[a, b, "E"])));
        assert!(matcher.matches(&live(&bits, &[a, b, d, "E"])));
        assert!(!matcher.matches(&live(&bits, &[a, b])));
        assert!(!matcher.matches(&live(&bits, &[a, b, c, "E"])));
        assert!(!matcher.matches(&live(&bits, &[a, b, "E", "F"])));
        assert_eq!(matcher.touched().count(), 5);
    }

    #[test]
    fn test_first_use_wins() {
        let bits = BitRegistry::new();
        let types = TypeRegistry::new();
        let matcher = MatcherBuilder::new(&bits, &types)
            .has_tag("x")
            .except_tag("x")
            .build()
            .unwrap();

        let x = bits.lookup("x").unwrap();
        assert!(matcher.required().contains_code(x));
        assert!(!matcher.excluded().contains_code(x));
    }

    #[test]
    fn test_structural_equality() {
        let bits = BitRegistry::new();
        let types = TypeRegistry::new();
        let one = MatcherBuilder::new(&bits, &types)
            .has_tag("a")
            .except_tag("b")
            .build()
            .unwrap();
        let two = MatcherBuilder::new(&bits, &types)
            .except_tag("b")
            .has_tag("a")
            .build()
            .unwrap();
        let three = MatcherBuilder::new(&bits, &types)
            .has_tag("a")
            .build()
            .unwrap();

        assert_eq!(one, two);
        assert_ne!(one, three);
    }

    #[test]
    fn test_unknown_name_reported_at_build() {
        let bits = BitRegistry::new();
        let types = TypeRegistry::new();
        let result = MatcherBuilder::new(&bits, &types)
            .has_trait_named("Missing")
            .has_tag("ok")
            .build();

        assert_eq!(result, Err(CoreError::UnknownToken("Missing".into())));
    }

    #[test]
    fn test_named_trait_matches_typed_trait() {
        let bits = BitRegistry::new();
        let mut types = TypeRegistry::new();
        types.register_trait::<A>();

        let by_name = MatcherBuilder::new(&bits, &types)
            .has_trait_named("A")
            .build()
            .unwrap();
        let by_type = MatcherBuilder::new(&bits, &types)
            .has_trait::<A>()
            .build()
            .unwrap();
        assert_eq!(by_name, by_type);
    }

    #[test]
    fn test_empty_matcher_accepts_everything() {
        let matcher = Matcher::new();
        assert!(matcher.matches(&CompositeBitSet::new()));
    }
}
