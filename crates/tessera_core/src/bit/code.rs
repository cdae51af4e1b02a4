//! Bit codes and fixed-capacity composite bit-sets.

use std::fmt;
use std::hash::{Hash, Hasher};

use tessera_shared::{BIT_CAPACITY, WORD_BITS, WORD_COUNT};

use crate::error::{CoreError, CoreResult};

/// Handle to a single bit in a `CompositeBitSet`.
///
/// Every trait type and every tag string owns exactly one code for the
/// lifetime of its `BitRegistry`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitCode {
    index: u32,
}

impl BitCode {
    /// Creates a code for `index`.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` if `index >= BIT_CAPACITY`.
    pub fn new(index: u32) -> CoreResult<Self> {
        if index >= BIT_CAPACITY {
            return Err(CoreError::IndexOutOfRange {
                index,
                capacity: BIT_CAPACITY,
            });
        }
        Ok(Self { index })
    }

    /// Bit index in `0..BIT_CAPACITY`.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Word holding this bit.
    #[inline]
    #[must_use]
    pub const fn word(self) -> usize {
        (self.index / WORD_BITS) as usize
    }

    /// Mask of this bit within its word.
    #[inline]
    #[must_use]
    pub const fn mask(self) -> u64 {
        1 << (self.index % WORD_BITS)
    }
}

impl fmt::Display for BitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bit#{}", self.index)
    }
}

/// A 1024-bit set of `BitCode`s.
///
/// `bound` is the highest word index ever written. Scans stop there, so
/// sets touching only low indices stay cheap to compare. Removing bits never
/// lowers the bound.
#[derive(Clone)]
pub struct CompositeBitSet {
    words: [u64; WORD_COUNT],
    bound: u8,
}

impl CompositeBitSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            words: [0; WORD_COUNT],
            bound: 0,
        }
    }

    /// Highest word index ever written.
    #[inline]
    #[must_use]
    pub const fn bound(&self) -> usize {
        self.bound as usize
    }

    /// Sets the bit of `code`.
    ///
    /// Returns `false` if it was already set.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub fn add(&mut self, code: BitCode) -> bool {
        let word = code.word();
        if self.words[word] & code.mask() != 0 {
            return false;
        }
        self.words[word] |= code.mask();
        if word > self.bound() {
            self.bound = word as u8;
        }
        true
    }

    /// Clears the bit of `code`.
    ///
    /// Returns `false` if it was not set.
    #[inline]
    pub fn subtract(&mut self, code: BitCode) -> bool {
        let word = code.word();
        if self.words[word] & code.mask() == 0 {
            return false;
        }
        self.words[word] &= !code.mask();
        true
    }

    /// Adds every bit of `other`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_set(&mut self, other: &Self) {
        for (mine, theirs) in self.words.iter_mut().zip(&other.words[..=other.bound()]) {
            *mine |= *theirs;
        }
        if other.bound > self.bound {
            self.bound = other.bound;
        }
    }

    /// Clears every bit of `other`.
    pub fn subtract_set(&mut self, other: &Self) {
        let end = self.bound().min(other.bound());
        for (mine, theirs) in self.words[..=end].iter_mut().zip(&other.words) {
            *mine &= !*theirs;
        }
    }

    /// Returns true if the bit of `code` is set.
    #[inline]
    #[must_use]
    pub const fn contains_code(&self, code: BitCode) -> bool {
        self.words[code.word()] & code.mask() != 0
    }

    /// Returns true if every bit of `other` is set here.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        let end = self.bound().min(other.bound());
        if other.words[end + 1..=other.bound()].iter().any(|&w| w != 0) {
            return false;
        }
        self.words[..=end]
            .iter()
            .zip(&other.words)
            .all(|(mine, theirs)| mine & theirs == *theirs)
    }

    /// Returns true if any bit of `other` is also set here.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        let end = self.bound().min(other.bound());
        self.words[..=end]
            .iter()
            .zip(&other.words)
            .any(|(mine, theirs)| mine & theirs != 0)
    }

    /// Returns true if no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words[..=self.bound()].iter().all(|&w| w == 0)
    }

    /// Number of set bits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words[..=self.bound()]
            .iter()
            .map(|w| w.count_ones() as usize)
            .sum()
    }

    /// Clears every bit and resets the bound.
    pub fn clear(&mut self) {
        self.words = [0; WORD_COUNT];
        self.bound = 0;
    }

    /// Iterates set bits as codes, in ascending order.
    pub fn codes(&self) -> impl Iterator<Item = BitCode> + '_ {
        self.indices().map(|index| BitCode { index })
    }

    /// Iterates set bit indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.words[..=self.bound()]
            .iter()
            .zip((0..).step_by(WORD_BITS as usize))
            .flat_map(|(&word, base)| SetBits { word, base })
    }
}

impl Default for CompositeBitSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CompositeBitSet {
    fn eq(&self, other: &Self) -> bool {
        self.words == other.words
    }
}

impl Eq for CompositeBitSet {}

impl Hash for CompositeBitSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.words.hash(state);
    }
}

impl fmt::Debug for CompositeBitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.indices()).finish()
    }
}

impl FromIterator<BitCode> for CompositeBitSet {
    fn from_iter<I: IntoIterator<Item = BitCode>>(iter: I) -> Self {
        let mut set = Self::new();
        for code in iter {
            set.add(code);
        }
        set
    }
}

/// Iterator over the set bits of one word.
struct SetBits {
    word: u64,
    base: u32,
}

impl Iterator for SetBits {
    type Item = u32;

    #[inline]
    fn next(&mut self) -> Option<u32> {
        if self.word == 0 {
            return None;
        }
        let bit = self.word.trailing_zeros();
        self.word &= self.word - 1;
        Some(self.base + bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(index: u32) -> BitCode {
        BitCode::new(index).unwrap()
    }

    fn set(indices: &[u32]) -> CompositeBitSet {
        indices.iter().map(|&i| code(i)).collect()
    }

    #[test]
    fn test_code_layout() {
        let c = code(70);
        assert_eq!(c.word(), 1);
        assert_eq!(c.mask(), 1 << 6);
    }

    #[test]
    fn test_code_capacity() {
        assert!(BitCode::new(1023).is_ok());
        assert_eq!(
            BitCode::new(1024),
            Err(CoreError::IndexOutOfRange {
                index: 1024,
                capacity: 1024
            })
        );
    }

    #[test]
    fn test_add_subtract_idempotent() {
        let mut s = CompositeBitSet::new();
        assert!(s.add(code(3)));
        assert!(!s.add(code(3)));
        assert_eq!(s.len(), 1);
        assert!(s.subtract(code(3)));
        assert!(!s.subtract(code(3)));
        assert!(s.is_empty());
    }

    #[test]
    fn test_bound_tracks_highest_word() {
        let mut s = set(&[1]);
        assert_eq!(s.bound(), 0);
        s.add(code(700));
        assert_eq!(s.bound(), 10);
        s.subtract(code(700));
        assert_eq!(s.bound(), 10);
    }

    #[test]
    fn test_contains_across_bounds() {
        let small = set(&[1, 2]);
        let wide = set(&[1, 2, 900]);

        assert!(wide.contains(&small));
        assert!(!small.contains(&wide));
        assert!(wide.contains_code(code(900)));
        assert!(small.contains(&CompositeBitSet::new()));
    }

    #[test]
    fn test_intersects() {
        let a = set(&[1, 500]);
        assert!(a.intersects(&set(&[500])));
        assert!(!a.intersects(&set(&[2, 900])));
        assert!(!a.intersects(&CompositeBitSet::new()));
    }

    #[test]
    fn test_equality_ignores_stale_bound() {
        let mut a = set(&[4, 700]);
        a.subtract(code(700));
        assert_eq!(a, set(&[4]));
        assert_ne!(set(&[4]), set(&[4, 700]));
    }

    #[test]
    fn test_indices_ascending() {
        let s = set(&[900, 0, 64, 63]);
        assert_eq!(s.indices().collect::<Vec<_>>(), vec![0, 63, 64, 900]);
    }

    #[test]
    fn test_set_operations() {
        let mut a = set(&[1, 2]);
        a.add_set(&set(&[3, 800]));
        assert_eq!(a, set(&[1, 2, 3, 800]));
        a.subtract_set(&set(&[2, 800]));
        assert_eq!(a, set(&[1, 3]));
    }
}
