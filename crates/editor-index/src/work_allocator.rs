//! Dirty-region bookkeeping for chunked background work.

use crate::anchor::{Anchor, OffsetRange};
use crate::error::RangeTreeError;
use crate::range_tree::RangeTree;
use std::ops::{Bound, RangeBounds};

/// Tracks which parts of `[0, len)` still need work.
///
/// Not-done parts are stored as maximal runs in a [`RangeTree`], so they are rebased by edits
/// like any other anchored range. All range arguments are clamped to `[0, len]`; a range that is
/// empty or reversed after clamping is a no-op.
pub struct WorkAllocator {
    len: usize,
    work: RangeTree<()>,
}

impl WorkAllocator {
    /// Creates an allocator where everything in `[0, len)` needs work.
    pub fn new(len: usize) -> Self {
        let mut allocator = Self {
            len,
            work: RangeTree::new(),
        };
        allocator.add_work(0, len);
        allocator
    }

    /// Length of the tracked domain.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tracked domain is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Marks `range` as done.
    pub fn done(&mut self, range: impl RangeBounds<usize>) {
        let Some((from, to)) = self.clamp(range).filter(|(from, to)| from < to) else {
            return;
        };
        // Right-aligned end merges with a run starting exactly at `to`.
        let runs = self.work.list_touching(from, Anchor::right(to));
        self.work.clear_touching(from, Anchor::right(to));
        for run in runs {
            if run.from.offset < from {
                self.add_work(run.from.offset, from);
            }
            if to < run.to.offset {
                self.add_work(to, run.to.offset);
            }
        }
    }

    /// Marks `range` as needing work.
    pub fn undone(&mut self, range: impl RangeBounds<usize>) {
        let Some((mut from, mut to)) = self.clamp(range) else {
            return;
        };
        let runs = self.work.list_touching(from, Anchor::right(to));
        self.work.clear_touching(from, Anchor::right(to));
        for run in runs {
            from = from.min(run.from.offset);
            to = to.max(run.to.offset);
        }
        self.add_work(from, to);
    }

    /// First not-done run intersecting `range`, clipped to it.
    pub fn work_range(&self, range: impl RangeBounds<usize>) -> Option<OffsetRange> {
        let (from, to) = self.clamp(range)?;
        // Right-aligned start skips a run that ends exactly at `from`.
        let run = self.work.first_touching(Anchor::right(from), to)?;
        Some(OffsetRange::new(
            from.max(run.from.offset),
            to.min(run.to.offset),
        ))
    }

    /// Whether anything still needs work.
    pub fn has_work(&self) -> bool {
        !self.work.is_empty()
    }

    /// Rebases the runs on top of an edit replacing `[from, to)` with `inserted` characters.
    ///
    /// The inserted text inherits nothing; callers mark it with [`undone`](Self::undone).
    pub fn replace(&mut self, from: usize, to: usize, inserted: usize) -> Result<(), RangeTreeError> {
        self.work.replace(from, to, inserted)?;
        self.len = (self.len + inserted).saturating_sub(to - from);

        // Runs cut by the edit may be empty now, or touch a neighbour across the deleted text.
        let (window_from, window_to) = (Anchor::left(from), Anchor::right(from + inserted));
        let runs = self.work.list_touching(window_from, window_to);
        self.work.clear_touching(window_from, window_to);
        let mut pending: Option<(usize, usize)> = None;
        for run in runs {
            let (run_from, run_to) = (run.from.offset, run.to.offset);
            pending = match pending {
                Some((start, end)) if run_from <= end => Some((start, end.max(run_to))),
                Some((start, end)) => {
                    self.add_work(start, end);
                    Some((run_from, run_to))
                }
                None => Some((run_from, run_to)),
            };
        }
        if let Some((start, end)) = pending {
            self.add_work(start, end);
        }
        Ok(())
    }

    /// Changes the domain length. Growing adds not-done space at the end, shrinking drops
    /// everything past the new end.
    pub fn resize(&mut self, len: usize) {
        if len > self.len {
            let old = self.len;
            self.len = len;
            self.undone(old..len);
        } else if len < self.len {
            let runs = self.work.list_touching(Anchor::right(len), Anchor::MAX);
            self.work.clear_touching(Anchor::right(len), Anchor::MAX);
            self.len = len;
            for run in runs {
                self.add_work(run.from.offset, run.to.offset.min(len));
            }
        }
    }

    fn add_work(&mut self, from: usize, to: usize) {
        if from < to {
            // Cannot fail: the range is not reversed.
            let _ = self.work.add(from, to, ());
        }
    }

    fn clamp(&self, range: impl RangeBounds<usize>) -> Option<(usize, usize)> {
        let from = match range.start_bound() {
            Bound::Included(&x) => x,
            Bound::Excluded(&x) => x.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let to = match range.end_bound() {
            Bound::Included(&x) => x.saturating_add(1),
            Bound::Excluded(&x) => x,
            Bound::Unbounded => self.len,
        };
        let (from, to) = (from.min(self.len), to.min(self.len));
        (from <= to).then_some((from, to))
    }
}
