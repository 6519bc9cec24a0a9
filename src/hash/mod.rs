//! Fixed-width 128-bit identifiers and ranges over them
//!
//! Cooperating nodes split the hash space into contiguous `HashRange` slices so
//! that each host (and therefore each link) is owned by exactly one node.

use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A comparable 128-bit hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash128(u128);

impl Hash128 {
    pub const MIN: Hash128 = Hash128(0);
    pub const MAX: Hash128 = Hash128(u128::MAX);

    /// Wraps a raw value
    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    /// Hashes arbitrary bytes, keeping the first 16 bytes of a SHA-256 digest
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut head = [0u8; 16];
        head.copy_from_slice(&digest[..16]);
        Self(u128::from_be_bytes(head))
    }

    /// Hashes a string
    ///
    /// ```
    /// use crawlgate::Hash128;
    ///
    /// assert_eq!(Hash128::of_str("example.com"), Hash128::of_str("example.com"));
    /// assert_ne!(Hash128::of_str("example.com"), Hash128::of_str("example.org"));
    /// ```
    pub fn of_str(value: &str) -> Self {
        Self::of_bytes(value.as_bytes())
    }

    /// Returns the raw value
    pub const fn value(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for Hash128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0.to_be_bytes()))
    }
}

impl FromStr for Hash128 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(u128::from_be_bytes(bytes)))
    }
}

/// An inclusive range of hashes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashRange {
    pub start: Hash128,
    pub end: Hash128,
}

impl HashRange {
    /// Creates a range, swapping the bounds if they are reversed
    pub fn new(start: Hash128, end: Hash128) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// The range covering every hash
    pub fn full() -> Self {
        Self {
            start: Hash128::MIN,
            end: Hash128::MAX,
        }
    }

    /// Returns true if the hash falls inside the range
    pub fn contains(&self, hash: Hash128) -> bool {
        self.start <= hash && hash <= self.end
    }

    /// Splits the range into `parts` contiguous slices that cover it exactly
    ///
    /// The last slice absorbs the remainder. Asking for zero parts yields an
    /// empty vector; asking for more parts than there are hashes yields one
    /// slice per hash.
    pub fn split(&self, parts: u32) -> Vec<HashRange> {
        if parts == 0 {
            return Vec::new();
        }

        let span = self.end.0 - self.start.0;
        let parts = u128::from(parts).min(span.saturating_add(1)).max(1);
        // span + 1 may overflow for the full range, so divide first
        let width = span / parts + u128::from(span % parts == parts - 1);

        let mut out = Vec::with_capacity(parts as usize);
        let mut lower = self.start.0;
        for index in 0..parts {
            let upper = if index == parts - 1 {
                self.end.0
            } else {
                lower + width - 1
            };
            out.push(HashRange {
                start: Hash128(lower),
                end: Hash128(upper),
            });
            lower = upper.wrapping_add(1);
        }
        out
    }

    /// Returns the slice owned by node `index` out of `count` nodes
    pub fn partition(index: u32, count: u32) -> Option<HashRange> {
        Self::full().split(count).get(index as usize).copied()
    }
}

impl Default for HashRange {
    fn default() -> Self {
        Self::full()
    }
}

impl fmt::Display for HashRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(Hash128::of_str("a"), Hash128::of_str("a"));
        assert_ne!(Hash128::of_str("a"), Hash128::of_str("b"));
    }

    #[test]
    fn test_hash_hex_display_and_parse() {
        let hash = Hash128::of_str("example.com");
        let text = hash.to_string();
        assert_eq!(text.len(), 32);
        assert_eq!(text.parse::<Hash128>().unwrap(), hash);
    }

    #[test]
    fn test_full_range_contains_extremes() {
        let range = HashRange::full();
        assert!(range.contains(Hash128::MIN));
        assert!(range.contains(Hash128::MAX));
    }

    #[test]
    fn test_new_swaps_reversed_bounds() {
        let range = HashRange::new(Hash128::new(10), Hash128::new(2));
        assert_eq!(range.start, Hash128::new(2));
        assert_eq!(range.end, Hash128::new(10));
    }

    #[test]
    fn test_split_small_range_covers_exactly() {
        let range = HashRange::new(Hash128::new(0), Hash128::new(9));
        let parts = range.split(3);

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].start, Hash128::new(0));
        assert_eq!(parts[2].end, Hash128::new(9));
        for pair in parts.windows(2) {
            assert_eq!(pair[0].end.value() + 1, pair[1].start.value());
        }
    }

    #[test]
    fn test_split_full_range_is_contiguous() {
        let parts = HashRange::full().split(4);

        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0].start, Hash128::MIN);
        assert_eq!(parts[3].end, Hash128::MAX);
        for pair in parts.windows(2) {
            assert_eq!(pair[0].end.value() + 1, pair[1].start.value());
        }
    }

    #[test]
    fn test_split_more_parts_than_hashes() {
        let range = HashRange::new(Hash128::new(5), Hash128::new(6));
        let parts = range.split(10);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], HashRange::new(Hash128::new(5), Hash128::new(5)));
        assert_eq!(parts[1], HashRange::new(Hash128::new(6), Hash128::new(6)));
    }

    #[test]
    fn test_partition_assigns_every_hash_once() {
        let ranges: Vec<_> = (0..3).map(|i| HashRange::partition(i, 3).unwrap()).collect();
        for host in ["a.com", "b.org", "c.net", "d.io", "e.dev"] {
            let hash = Hash128::of_str(host);
            assert_eq!(ranges.iter().filter(|r| r.contains(hash)).count(), 1);
        }
        assert!(HashRange::partition(3, 3).is_none());
    }
}
