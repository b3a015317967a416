//! Monoid algebra used to aggregate values up a tree.

/// A value type with an associative `combine` and an identity element.
///
/// Implementations must satisfy, for all `a`, `b`, `c`:
/// - `identity().combine(&a) == a == a.combine(&identity())`
/// - `a.combine(&b).combine(&c) == a.combine(&b.combine(&c))`
pub trait Monoid: Clone {
    /// The identity element.
    fn identity() -> Self;

    /// Combines `self` (on the left) with `other` (on the right).
    fn combine(&self, other: &Self) -> Self;
}

/// A monoid whose aggregated values can be compared against a lookup key.
///
/// Both comparisons must be monotonic with respect to [`Monoid::combine`]: if a prefix value is
/// greater than a key, every longer prefix is too. This is what lets a tree binary-search by the
/// aggregated prefix value instead of by index.
pub trait OrderedMonoid: Monoid {
    /// Lookup key type.
    type Key;

    /// `self > key`.
    fn greater_than_key(&self, key: &Self::Key) -> bool;

    /// `self >= key`.
    fn greater_or_equal_than_key(&self, key: &Self::Key) -> bool;
}
