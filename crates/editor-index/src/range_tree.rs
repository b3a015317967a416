//! Range tree: a mutable set of `[from, to)` anchor ranges with attached data.
//!
//! Ranges are efficiently rebased on top of replacement-like edits (see [`RangeTree::replace`]),
//! which makes the tree suitable for tracking decorations, hidden regions, dirty regions and
//! syntax tokens in a constantly changing text.
//!
//! The tree is a treap stored in an arena, ordered by `from` (ranges with equal `from` keep
//! insertion order). Ranges may overlap. Each subtree caches its size and the minimum and
//! maximum `to`, which keeps "ending" and "touching" queries pruned, and carries a lazy shift
//! that is pushed down on demand, which keeps [`replace`](RangeTree::replace) at
//! `O(log n + k)` for `k` ranges crossing the edit.
//!
//! Every range gets a [`Handle`]: a generation-checked index that stays valid across edits and
//! rebalancing until the range is removed.

use crate::anchor::Anchor;
use crate::error::RangeTreeError;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

const RANGE_TREE_SEED: u64 = 25;

/// Opaque reference to a range in a [`RangeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    tree: u64,
    index: usize,
    generation: u32,
}

/// A range together with its data and handle.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeEntry<T> {
    /// Start anchor.
    pub from: Anchor,
    /// End anchor.
    pub to: Anchor,
    /// Attached data.
    pub data: T,
    /// Handle of the range.
    pub handle: Handle,
}

impl<T: Clone> RangeEntry<&T> {
    /// Clones the attached data.
    pub fn cloned(&self) -> RangeEntry<T> {
        RangeEntry {
            from: self.from,
            to: self.to,
            data: self.data.clone(),
            handle: self.handle,
        }
    }
}

struct Node<T> {
    from: Anchor,
    to: Anchor,
    /// `None` for free slots.
    data: Option<T>,
    generation: u32,
    priority: u32,
    left: Option<usize>,
    right: Option<usize>,
    parent: Option<usize>,
    size: usize,
    min_to: Anchor,
    max_to: Anchor,
    /// Pending shift for the children. The node's own anchors and aggregates include it.
    add: isize,
}

#[derive(Debug, Clone, Copy)]
enum Window {
    All,
    Starting(Anchor, Anchor),
    Ending(Anchor, Anchor),
    Touching(Anchor, Anchor),
}

impl Window {
    fn matches(&self, from: Anchor, to: Anchor) -> bool {
        match *self {
            Window::All => true,
            Window::Starting(a, b) => from >= a && from < b,
            Window::Ending(a, b) => to >= a && to < b,
            Window::Touching(a, b) => to >= a && from < b,
        }
    }

    fn may_contain(&self, min_to: Anchor, max_to: Anchor) -> bool {
        match *self {
            Window::Ending(a, b) => max_to >= a && min_to < b,
            Window::Touching(a, _) => max_to >= a,
            _ => true,
        }
    }

    /// Whether ranges starting at or before `from` may match.
    fn explores_before(&self, from: Anchor) -> bool {
        match *self {
            Window::Starting(a, _) => from >= a,
            _ => true,
        }
    }

    /// Whether ranges starting at or after `from` may match.
    fn explores_after(&self, from: Anchor) -> bool {
        match *self {
            Window::Starting(_, b) | Window::Touching(_, b) => from < b,
            _ => true,
        }
    }
}

/// See the module documentation.
pub struct RangeTree<T> {
    id: u64,
    nodes: Vec<Node<T>>,
    free: Vec<usize>,
    root: Option<usize>,
    rng: StdRng,
}

impl<T> Default for RangeTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RangeTree<T> {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            id: NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            rng: StdRng::seed_from_u64(RANGE_TREE_SEED),
        }
    }

    /// Adds a range. Ranges with equal `from` keep insertion order.
    pub fn add(
        &mut self,
        from: impl Into<Anchor>,
        to: impl Into<Anchor>,
        data: T,
    ) -> Result<Handle, RangeTreeError> {
        let (from, to) = (from.into(), to.into());
        if from > to {
            return Err(RangeTreeError::Reversed { from, to });
        }
        let idx = self.alloc(from, to, data);
        let (left, right) = self.split(self.root, &|n: &Node<T>| n.from <= from);
        let left = self.merge(left, Some(idx));
        let root = self.merge(left, right);
        self.set_root(root);
        Ok(self.handle_of(idx))
    }

    /// Removes a range, returning it. A stale handle yields `Ok(None)`.
    pub fn remove(&mut self, handle: Handle) -> Result<Option<RangeEntry<T>>, RangeTreeError> {
        let Some(idx) = self.live_index(handle)? else {
            return Ok(None);
        };

        let mut path = Vec::new();
        let mut cur = Some(idx);
        while let Some(c) = cur {
            path.push(c);
            cur = self.nodes[c].parent;
        }
        for &p in path.iter().rev() {
            self.push(p);
        }

        let (left, right, parent) = {
            let n = &self.nodes[idx];
            (n.left, n.right, n.parent)
        };
        let merged = self.merge(left, right);
        match parent {
            None => self.set_root(merged),
            Some(p) => {
                if self.nodes[p].left == Some(idx) {
                    self.nodes[p].left = merged;
                } else {
                    self.nodes[p].right = merged;
                }
                if let Some(m) = merged {
                    self.nodes[m].parent = Some(p);
                }
                let mut cur = Some(p);
                while let Some(c) = cur {
                    self.update(c);
                    cur = self.nodes[c].parent;
                }
            }
        }
        Ok(self.release(idx))
    }

    /// Current bounds and data of a range. A stale handle yields `Ok(None)`.
    pub fn resolve(&self, handle: Handle) -> Result<Option<RangeEntry<&T>>, RangeTreeError> {
        let Some(idx) = self.live_index(handle)? else {
            return Ok(None);
        };
        let mut shift = 0;
        let mut cur = self.nodes[idx].parent;
        while let Some(p) = cur {
            shift += self.nodes[p].add;
            cur = self.nodes[p].parent;
        }
        let n = &self.nodes[idx];
        Ok(n.data.as_ref().map(|data| RangeEntry {
            from: n.from.shifted(shift),
            to: n.to.shifted(shift),
            data,
            handle,
        }))
    }

    /// Rebases every range on top of an edit replacing `[from, to)` with `inserted` characters.
    ///
    /// With `delta = inserted - (to - from)`, a range `[a, b)`:
    /// - is removed when `from < a && to >= b`;
    /// - otherwise becomes `[map_left(a), map_right(b)]`, where both maps keep positions at or
    ///   before `from`, shift positions after `to` by `delta`, and send interior positions to
    ///   `from + inserted` (left) or `from` (right). `map_left` also shifts a position equal
    ///   to `to`.
    ///
    /// Returns handles of the removed ranges.
    pub fn replace(
        &mut self,
        from: usize,
        to: usize,
        inserted: usize,
    ) -> Result<Vec<Handle>, RangeTreeError> {
        if from > to {
            return Err(RangeTreeError::ReversedEdit { from, to });
        }
        let delta = inserted as isize - (to - from) as isize;
        let edit_from = Anchor::left(from);
        let edit_to = Anchor::left(to);

        let (before, rest) = self.split(self.root, &|n: &Node<T>| n.from <= edit_from);
        let (crossing, after) = self.split(rest, &|n: &Node<T>| n.from <= edit_to);

        if let Some(before) = before {
            self.crop_ends(before, edit_from, edit_to, delta);
        }

        let mut crossing_nodes = Vec::new();
        self.drain_in_order(crossing, &mut crossing_nodes);
        let mut removed = Vec::new();
        let mut kept = None;
        let moved_from = Anchor::left(from + inserted);
        for idx in crossing_nodes {
            if self.nodes[idx].to <= edit_to {
                let handle = self.handle_of(idx);
                self.release(idx);
                removed.push(handle);
                continue;
            }
            {
                let n = &mut self.nodes[idx];
                n.from = moved_from;
                n.to = n.to.shifted(delta);
                n.left = None;
                n.right = None;
                n.parent = None;
                n.add = 0;
            }
            self.update(idx);
            kept = self.merge(kept, Some(idx));
        }

        if let Some(after) = after {
            self.shift_subtree(after, delta);
        }

        let left = self.merge(before, kept);
        let root = self.merge(left, after);
        self.set_root(root);

        if !removed.is_empty() {
            tracing::trace!(from, to, inserted, removed = removed.len(), "range tree edit removed ranges");
        }
        Ok(removed)
    }

    /// Number of ranges.
    pub fn count_all(&self) -> usize {
        self.root.map_or(0, |r| self.nodes[r].size)
    }

    /// Whether the tree holds no ranges.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of ranges with `from <= range.from < to`. `O(log n)`.
    pub fn count_starting(&self, from: impl Into<Anchor>, to: impl Into<Anchor>) -> usize {
        let (from, to) = (from.into(), to.into());
        self.count_starting_before(to)
            .saturating_sub(self.count_starting_before(from))
    }

    /// Number of ranges with `from <= range.to < to`.
    pub fn count_ending(&self, from: impl Into<Anchor>, to: impl Into<Anchor>) -> usize {
        self.count_in(Window::Ending(from.into(), to.into()))
    }

    /// Number of ranges with `range.to >= from && range.from < to`.
    pub fn count_touching(&self, from: impl Into<Anchor>, to: impl Into<Anchor>) -> usize {
        self.count_in(Window::Touching(from.into(), to.into()))
    }

    /// Visits every range in order.
    pub fn visit_all<'a>(&'a self, mut visitor: impl FnMut(RangeEntry<&'a T>)) {
        self.visit_in(Window::All, false, |e| {
            visitor(e);
            ControlFlow::Continue(())
        });
    }

    /// Visits ranges with `from <= range.from < to`.
    pub fn visit_starting<'a>(
        &'a self,
        from: impl Into<Anchor>,
        to: impl Into<Anchor>,
        mut visitor: impl FnMut(RangeEntry<&'a T>),
    ) {
        self.visit_in(Window::Starting(from.into(), to.into()), false, |e| {
            visitor(e);
            ControlFlow::Continue(())
        });
    }

    /// Visits ranges with `from <= range.to < to`.
    pub fn visit_ending<'a>(
        &'a self,
        from: impl Into<Anchor>,
        to: impl Into<Anchor>,
        mut visitor: impl FnMut(RangeEntry<&'a T>),
    ) {
        self.visit_in(Window::Ending(from.into(), to.into()), false, |e| {
            visitor(e);
            ControlFlow::Continue(())
        });
    }

    /// Visits ranges with `range.to >= from && range.from < to`.
    pub fn visit_touching<'a>(
        &'a self,
        from: impl Into<Anchor>,
        to: impl Into<Anchor>,
        mut visitor: impl FnMut(RangeEntry<&'a T>),
    ) {
        self.visit_in(Window::Touching(from.into(), to.into()), false, |e| {
            visitor(e);
            ControlFlow::Continue(())
        });
    }

    /// First range in order.
    pub fn first_all(&self) -> Option<RangeEntry<&T>> {
        self.first_in(Window::All, false)
    }

    /// First range with `from <= range.from < to`.
    pub fn first_starting(
        &self,
        from: impl Into<Anchor>,
        to: impl Into<Anchor>,
    ) -> Option<RangeEntry<&T>> {
        self.first_in(Window::Starting(from.into(), to.into()), false)
    }

    /// First range with `from <= range.to < to`.
    pub fn first_ending(
        &self,
        from: impl Into<Anchor>,
        to: impl Into<Anchor>,
    ) -> Option<RangeEntry<&T>> {
        self.first_in(Window::Ending(from.into(), to.into()), false)
    }

    /// First range with `range.to >= from && range.from < to`.
    pub fn first_touching(
        &self,
        from: impl Into<Anchor>,
        to: impl Into<Anchor>,
    ) -> Option<RangeEntry<&T>> {
        self.first_in(Window::Touching(from.into(), to.into()), false)
    }

    /// Last range in order.
    pub fn last_all(&self) -> Option<RangeEntry<&T>> {
        self.first_in(Window::All, true)
    }

    /// Last range with `from <= range.from < to`.
    pub fn last_starting(
        &self,
        from: impl Into<Anchor>,
        to: impl Into<Anchor>,
    ) -> Option<RangeEntry<&T>> {
        self.first_in(Window::Starting(from.into(), to.into()), true)
    }

    /// Last range with `from <= range.to < to`.
    pub fn last_ending(
        &self,
        from: impl Into<Anchor>,
        to: impl Into<Anchor>,
    ) -> Option<RangeEntry<&T>> {
        self.first_in(Window::Ending(from.into(), to.into()), true)
    }

    /// Last range with `range.to >= from && range.from < to`.
    pub fn last_touching(
        &self,
        from: impl Into<Anchor>,
        to: impl Into<Anchor>,
    ) -> Option<RangeEntry<&T>> {
        self.first_in(Window::Touching(from.into(), to.into()), true)
    }

    /// Removes every range. Returns how many were removed.
    pub fn clear_all(&mut self) -> usize {
        let count = self.count_all();
        for idx in 0..self.nodes.len() {
            if self.nodes[idx].data.is_some() {
                self.release(idx);
            }
        }
        self.root = None;
        count
    }

    /// Removes ranges with `from <= range.from < to`.
    pub fn clear_starting(&mut self, from: impl Into<Anchor>, to: impl Into<Anchor>) -> usize {
        self.clear_in(Window::Starting(from.into(), to.into()))
    }

    /// Removes ranges with `from <= range.to < to`.
    pub fn clear_ending(&mut self, from: impl Into<Anchor>, to: impl Into<Anchor>) -> usize {
        self.clear_in(Window::Ending(from.into(), to.into()))
    }

    /// Removes ranges with `range.to >= from && range.from < to`.
    pub fn clear_touching(&mut self, from: impl Into<Anchor>, to: impl Into<Anchor>) -> usize {
        self.clear_in(Window::Touching(from.into(), to.into()))
    }

    /// Visits ranges sparsely: after visiting a range, continues with the first range starting
    /// at or after the maximum of its `from` plus `0.5`, its `to` and the anchor returned by the
    /// visitor.
    ///
    /// This lets a visitor skip over everything that maps to the same output (for example the
    /// same scrollbar pixel) without enumerating it.
    pub fn sparse_visit_all<'a>(
        &'a self,
        mut visitor: impl FnMut(RangeEntry<&'a T>) -> Anchor,
    ) -> Result<(), RangeTreeError> {
        let mut position = Anchor::MIN;
        while let Some(entry) = self.first_starting(position, Anchor::MAX) {
            let (from, to) = (entry.from, entry.to);
            let next = visitor(entry);
            if next < from {
                return Err(RangeTreeError::SparseVisitBackwards { from, next });
            }
            position = from.next().max(to).max(next);
        }
        Ok(())
    }

    fn handle_of(&self, idx: usize) -> Handle {
        Handle {
            tree: self.id,
            index: idx,
            generation: self.nodes[idx].generation,
        }
    }

    fn live_index(&self, handle: Handle) -> Result<Option<usize>, RangeTreeError> {
        if handle.tree != self.id {
            return Err(RangeTreeError::ForeignHandle {
                handle_tree: handle.tree,
                tree: self.id,
            });
        }
        Ok(self
            .nodes
            .get(handle.index)
            .filter(|n| n.generation == handle.generation && n.data.is_some())
            .map(|_| handle.index))
    }

    fn alloc(&mut self, from: Anchor, to: Anchor, data: T) -> usize {
        let priority = self.rng.next_u32();
        if let Some(idx) = self.free.pop() {
            let n = &mut self.nodes[idx];
            n.from = from;
            n.to = to;
            n.data = Some(data);
            n.priority = priority;
            n.left = None;
            n.right = None;
            n.parent = None;
            n.size = 1;
            n.min_to = to;
            n.max_to = to;
            n.add = 0;
            return idx;
        }
        self.nodes.push(Node {
            from,
            to,
            data: Some(data),
            generation: 0,
            priority,
            left: None,
            right: None,
            parent: None,
            size: 1,
            min_to: to,
            max_to: to,
            add: 0,
        });
        self.nodes.len() - 1
    }

    /// Frees a slot, invalidating its handle.
    fn release(&mut self, idx: usize) -> Option<RangeEntry<T>> {
        let handle = self.handle_of(idx);
        let n = &mut self.nodes[idx];
        let data = n.data.take()?;
        n.generation = n.generation.wrapping_add(1);
        n.left = None;
        n.right = None;
        n.parent = None;
        let entry = RangeEntry {
            from: n.from,
            to: n.to,
            data,
            handle,
        };
        self.free.push(idx);
        Some(entry)
    }

    fn set_root(&mut self, root: Option<usize>) {
        self.root = root;
        if let Some(r) = root {
            self.nodes[r].parent = None;
        }
    }

    fn shift_subtree(&mut self, idx: usize, delta: isize) {
        let n = &mut self.nodes[idx];
        n.from = n.from.shifted(delta);
        n.to = n.to.shifted(delta);
        n.min_to = n.min_to.shifted(delta);
        n.max_to = n.max_to.shifted(delta);
        n.add += delta;
    }

    fn push(&mut self, idx: usize) {
        let add = self.nodes[idx].add;
        if add == 0 {
            return;
        }
        self.nodes[idx].add = 0;
        if let Some(l) = self.nodes[idx].left {
            self.shift_subtree(l, add);
        }
        if let Some(r) = self.nodes[idx].right {
            self.shift_subtree(r, add);
        }
    }

    /// Recomputes aggregates and child back-links. The node must have no pending shift.
    fn update(&mut self, idx: usize) {
        let (left, right) = (self.nodes[idx].left, self.nodes[idx].right);
        let mut size = 1;
        let mut min_to = self.nodes[idx].to;
        let mut max_to = min_to;
        for child in [left, right].into_iter().flatten() {
            let c = &mut self.nodes[child];
            c.parent = Some(idx);
            size += c.size;
            min_to = min_to.min(c.min_to);
            max_to = max_to.max(c.max_to);
        }
        let n = &mut self.nodes[idx];
        n.size = size;
        n.min_to = min_to;
        n.max_to = max_to;
    }

    fn attach(&mut self, idx: usize, left: Option<usize>, right: Option<usize>) {
        self.nodes[idx].left = left;
        self.nodes[idx].right = right;
        self.update(idx);
    }

    fn merge(&mut self, left: Option<usize>, right: Option<usize>) -> Option<usize> {
        let (l, r) = match (left, right) {
            (None, right) => return right,
            (left, None) => return left,
            (Some(l), Some(r)) => (l, r),
        };
        self.push(l);
        self.push(r);
        if self.nodes[l].priority > self.nodes[r].priority {
            let (l_left, l_right) = (self.nodes[l].left, self.nodes[l].right);
            let merged = self.merge(l_right, Some(r));
            self.attach(l, l_left, merged);
            Some(l)
        } else {
            let (r_left, r_right) = (self.nodes[r].left, self.nodes[r].right);
            let merged = self.merge(Some(l), r_left);
            self.attach(r, merged, r_right);
            Some(r)
        }
    }

    /// Splits into the longest prefix of nodes satisfying `goes_left` and the rest.
    /// `goes_left` must be monotonic in `from` order.
    fn split<F>(&mut self, node: Option<usize>, goes_left: &F) -> (Option<usize>, Option<usize>)
    where
        F: Fn(&Node<T>) -> bool,
    {
        let Some(idx) = node else {
            return (None, None);
        };
        self.push(idx);
        let (left, right) = (self.nodes[idx].left, self.nodes[idx].right);
        if goes_left(&self.nodes[idx]) {
            let (l, r) = self.split(right, goes_left);
            self.attach(idx, left, l);
            if let Some(r) = r {
                self.nodes[r].parent = None;
            }
            (Some(idx), r)
        } else {
            let (l, r) = self.split(left, goes_left);
            self.attach(idx, r, right);
            if let Some(l) = l {
                self.nodes[l].parent = None;
            }
            (l, Some(idx))
        }
    }

    /// Moves `to` anchors of ranges starting at or before the edit.
    fn crop_ends(&mut self, idx: usize, edit_from: Anchor, edit_to: Anchor, delta: isize) {
        if self.nodes[idx].max_to <= edit_from {
            return;
        }
        self.push(idx);
        {
            let n = &mut self.nodes[idx];
            if n.to > edit_to {
                n.to = n.to.shifted(delta);
            } else if n.to > edit_from {
                n.to = edit_from;
            }
        }
        let (left, right) = (self.nodes[idx].left, self.nodes[idx].right);
        for child in [left, right].into_iter().flatten() {
            self.crop_ends(child, edit_from, edit_to, delta);
        }
        self.update(idx);
    }

    fn drain_in_order(&mut self, node: Option<usize>, out: &mut Vec<usize>) {
        let Some(idx) = node else {
            return;
        };
        self.push(idx);
        let (left, right) = (self.nodes[idx].left, self.nodes[idx].right);
        self.drain_in_order(left, out);
        out.push(idx);
        self.drain_in_order(right, out);
    }

    fn count_starting_before(&self, key: Anchor) -> usize {
        let mut count = 0;
        let mut shift = 0;
        let mut node = self.root;
        while let Some(idx) = node {
            let n = &self.nodes[idx];
            if n.from.shifted(shift) < key {
                count += 1 + n.left.map_or(0, |l| self.nodes[l].size);
                node = n.right;
            } else {
                node = n.left;
            }
            shift += n.add;
        }
        count
    }

    fn walk<'a, F>(
        &'a self,
        node: Option<usize>,
        shift: isize,
        window: &Window,
        reverse: bool,
        visitor: &mut F,
    ) -> ControlFlow<()>
    where
        F: FnMut(RangeEntry<&'a T>) -> ControlFlow<()>,
    {
        let Some(idx) = node else {
            return ControlFlow::Continue(());
        };
        let n = &self.nodes[idx];
        if !window.may_contain(n.min_to.shifted(shift), n.max_to.shifted(shift)) {
            return ControlFlow::Continue(());
        }
        let from = n.from.shifted(shift);
        let to = n.to.shifted(shift);
        let child_shift = shift + n.add;
        let (first, first_ok, second, second_ok) = if reverse {
            (n.right, window.explores_after(from), n.left, window.explores_before(from))
        } else {
            (n.left, window.explores_before(from), n.right, window.explores_after(from))
        };

        if first_ok {
            self.walk(first, child_shift, window, reverse, visitor)?;
        }
        if window.matches(from, to) {
            if let Some(data) = n.data.as_ref() {
                visitor(RangeEntry {
                    from,
                    to,
                    data,
                    handle: self.handle_of(idx),
                })?;
            }
        }
        if second_ok {
            self.walk(second, child_shift, window, reverse, visitor)?;
        }
        ControlFlow::Continue(())
    }

    fn visit_in<'a, F>(&'a self, window: Window, reverse: bool, mut visitor: F)
    where
        F: FnMut(RangeEntry<&'a T>) -> ControlFlow<()>,
    {
        let _ = self.walk(self.root, 0, &window, reverse, &mut visitor);
    }

    fn first_in(&self, window: Window, reverse: bool) -> Option<RangeEntry<&T>> {
        let mut found = None;
        self.visit_in(window, reverse, |entry| {
            found = Some(entry);
            ControlFlow::Break(())
        });
        found
    }

    fn count_in(&self, window: Window) -> usize {
        let mut count = 0;
        self.visit_in(window, false, |_| {
            count += 1;
            ControlFlow::Continue(())
        });
        count
    }

    fn clear_in(&mut self, window: Window) -> usize {
        let mut handles = Vec::new();
        self.visit_in(window, false, |entry| {
            handles.push(entry.handle);
            ControlFlow::Continue(())
        });
        let mut removed = 0;
        for handle in handles {
            if let Ok(Some(_)) = self.remove(handle) {
                removed += 1;
            }
        }
        removed
    }
}

impl<T: Clone> RangeTree<T> {
    /// Every range, in order.
    pub fn list_all(&self) -> Vec<RangeEntry<T>> {
        self.list_in(Window::All)
    }

    /// Ranges with `from <= range.from < to`.
    pub fn list_starting(
        &self,
        from: impl Into<Anchor>,
        to: impl Into<Anchor>,
    ) -> Vec<RangeEntry<T>> {
        self.list_in(Window::Starting(from.into(), to.into()))
    }

    /// Ranges with `from <= range.to < to`.
    pub fn list_ending(&self, from: impl Into<Anchor>, to: impl Into<Anchor>) -> Vec<RangeEntry<T>> {
        self.list_in(Window::Ending(from.into(), to.into()))
    }

    /// Ranges with `range.to >= from && range.from < to`.
    pub fn list_touching(
        &self,
        from: impl Into<Anchor>,
        to: impl Into<Anchor>,
    ) -> Vec<RangeEntry<T>> {
        self.list_in(Window::Touching(from.into(), to.into()))
    }

    fn list_in(&self, window: Window) -> Vec<RangeEntry<T>> {
        let mut out = Vec::new();
        self.visit_in(window, false, |entry| {
            out.push(entry.cloned());
            ControlFlow::Continue(())
        });
        out
    }
}
