//! Anchors: offsets with an alignment bit.
//!
//! An [`Anchor`] is `offset + align`, where `align` is either `0` ([`Align::Left`]) or `0.5`
//! ([`Align::Right`]). Left-aligned anchors stay put when text is inserted exactly at their
//! offset, right-aligned anchors sort after every left-aligned anchor at the same offset and
//! are used by queries that must include content inserted exactly at `offset`.
//!
//! Anchors are totally ordered by `(offset, align)`, so `Anchor::right(5)` sits strictly between
//! `Anchor::left(5)` and `Anchor::left(6)`.

use std::fmt;

/// Alignment half of an [`Anchor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Align {
    /// `offset + 0`.
    #[default]
    Left,
    /// `offset + 0.5`.
    Right,
}

/// A position between characters, see the module documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Anchor {
    /// Character offset.
    pub offset: usize,
    /// Alignment bit.
    pub align: Align,
}

impl Anchor {
    /// The smallest anchor.
    pub const MIN: Anchor = Anchor::left(0);
    /// The largest anchor. Only meaningful as an open query bound.
    pub const MAX: Anchor = Anchor::right(usize::MAX);

    /// Left-aligned anchor at `offset`.
    pub const fn left(offset: usize) -> Self {
        Self {
            offset,
            align: Align::Left,
        }
    }

    /// Right-aligned anchor at `offset` (that is, `offset + 0.5`).
    pub const fn right(offset: usize) -> Self {
        Self {
            offset,
            align: Align::Right,
        }
    }

    /// Whether this anchor is right-aligned.
    pub fn is_right(&self) -> bool {
        self.align == Align::Right
    }

    /// The anchor `0.5` after this one.
    pub fn next(&self) -> Self {
        match self.align {
            Align::Left => Self::right(self.offset),
            Align::Right => Self::left(self.offset.saturating_add(1)),
        }
    }

    /// Moves the offset by `delta`, keeping the alignment.
    pub fn shifted(&self, delta: isize) -> Self {
        Self {
            offset: self.offset.saturating_add_signed(delta),
            align: self.align,
        }
    }
}

impl From<usize> for Anchor {
    fn from(offset: usize) -> Self {
        Anchor::left(offset)
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.align {
            Align::Left => write!(f, "{}", self.offset),
            Align::Right => write!(f, "{}.5", self.offset),
        }
    }
}

/// A `[from, to)` pair of anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AnchorRange {
    /// Start anchor.
    pub from: Anchor,
    /// End anchor.
    pub to: Anchor,
}

impl AnchorRange {
    /// Create a range from anything convertible to anchors.
    pub fn new(from: impl Into<Anchor>, to: impl Into<Anchor>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// A plain `[from, to)` character range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OffsetRange {
    /// Start offset (inclusive).
    pub from: usize,
    /// End offset (exclusive).
    pub to: usize,
}

impl OffsetRange {
    /// Create a new range.
    pub const fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    /// Number of characters covered.
    pub fn len(&self) -> usize {
        self.to.saturating_sub(self.from)
    }

    /// Whether the range is collapsed.
    pub fn is_empty(&self) -> bool {
        self.to <= self.from
    }

    /// Whether the two ranges share at least one character.
    pub fn intersects(&self, other: &OffsetRange) -> bool {
        self.from < other.to && other.from < self.to
    }
}
