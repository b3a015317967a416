//! Error types of the range tree, the measurers and the layout index.

use crate::anchor::Anchor;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Precondition violations reported by [`RangeTree`](crate::RangeTree).
pub enum RangeTreeError {
    #[error("reversed range {from}..{to}")]
    /// `add` was called with `from > to`.
    Reversed {
        /// Start anchor.
        from: Anchor,
        /// End anchor.
        to: Anchor,
    },

    #[error("reversed edit {from}..{to}")]
    /// `replace` was called with `from > to`.
    ReversedEdit {
        /// Edit start.
        from: usize,
        /// Edit end.
        to: usize,
    },

    #[error("handle belongs to range tree #{handle_tree}, not #{tree}")]
    /// A handle from another tree was used.
    ForeignHandle {
        /// Tree that issued the handle.
        handle_tree: u64,
        /// Tree the handle was used with.
        tree: u64,
    },

    #[error("sparse visitor returned {next}, which is before the visited range start {from}")]
    /// A sparse visitor tried to move backwards.
    SparseVisitBackwards {
        /// Start of the visited entry.
        from: Anchor,
        /// Anchor returned by the visitor.
        next: Anchor,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Invariant failures while measuring or locating text.
pub enum MeasureError {
    #[error("cannot measure across a line break")]
    /// A single-line operation received text containing `'\n'`.
    LineBreak,

    #[error("inconsistent metrics: {0}")]
    /// The caller passed metrics or a position that contradict the text.
    Inconsistent(&'static str),
}

#[derive(Debug, Clone, PartialEq, Error)]
/// Errors reported by [`LayoutIndex`](crate::LayoutIndex).
pub enum LayoutError {
    #[error("wrapping limit {0} is too small (must be at least 2 default widths)")]
    /// Wrapping limit below two default-width characters.
    WrappingLimitTooSmall(f64),

    #[error("hidden ranges cannot intersect")]
    /// A hidden range touches an existing one.
    HiddenRangesIntersect,

    #[error(transparent)]
    /// Range bookkeeping failed.
    Range(#[from] RangeTreeError),

    #[error(transparent)]
    /// Measuring failed.
    Measure(#[from] MeasureError),
}
