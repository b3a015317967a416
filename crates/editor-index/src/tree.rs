//! Ordered-monoid tree.
//!
//! A persistent treap over a sequence of opaque chunks. Every node carries some data `D` and a
//! monoid value `V`; each subtree caches the combined value of its nodes, so prefix values (and
//! therefore lookups by an [`OrderedMonoid`] key) are answered in `O(log n)`.
//!
//! Trees are immutable: [`Tree::split`], [`Tree::split_by`] and [`Tree::merge`] return new trees
//! that share untouched nodes with their inputs, and never invalidate the inputs.
//!
//! Balancing uses random priorities drawn from a seeded PRNG owned by a [`TreeFactory`], so the
//! shape of a tree is reproducible for a given sequence of operations.

use crate::monoid::{Monoid, OrderedMonoid};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::rc::Rc;

/// Seed used by [`TreeFactory::new`].
pub const DEFAULT_TREE_SEED: u64 = 42;

type Link<D, V> = Option<Rc<Node<D, V>>>;

struct Node<D, V> {
    data: D,
    own: V,
    total: V,
    priority: u32,
    size: usize,
    left: Link<D, V>,
    right: Link<D, V>,
}

impl<D: Clone, V: Monoid> Node<D, V> {
    fn with_children(
        data: D,
        own: V,
        priority: u32,
        left: Link<D, V>,
        right: Link<D, V>,
    ) -> Rc<Self> {
        let mut total = own.clone();
        let mut size = 1;
        if let Some(left) = &left {
            total = left.total.combine(&total);
            size += left.size;
        }
        if let Some(right) = &right {
            total = total.combine(&right.total);
            size += right.size;
        }
        Rc::new(Node {
            data,
            own,
            total,
            priority,
            size,
            left,
            right,
        })
    }

    fn rebuild(&self, left: Link<D, V>, right: Link<D, V>) -> Rc<Self> {
        Self::with_children(
            self.data.clone(),
            self.own.clone(),
            self.priority,
            left,
            right,
        )
    }
}

/// Builds trees, owning the PRNG used for node priorities.
pub struct TreeFactory {
    rng: StdRng,
}

impl TreeFactory {
    /// Factory seeded with [`DEFAULT_TREE_SEED`].
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_TREE_SEED)
    }

    /// Factory with an explicit seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Builds a balanced tree from `(data, value)` pairs in `O(n)`.
    pub fn build<D, V, I>(&mut self, items: I) -> Tree<D, V>
    where
        D: Clone,
        V: Monoid,
        I: IntoIterator<Item = (D, V)>,
    {
        let nodes = items
            .into_iter()
            .map(|(data, value)| (data, value, self.rng.next_u32()))
            .collect();
        build_with_priorities(nodes)
    }
}

impl Default for TreeFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Cartesian-tree construction over nodes with explicit priorities.
fn build_with_priorities<D: Clone, V: Monoid>(nodes: Vec<(D, V, u32)>) -> Tree<D, V> {
    let n = nodes.len();
    if n == 0 {
        return Tree::new();
    }

    let mut left: Vec<Option<usize>> = vec![None; n];
    let mut right: Vec<Option<usize>> = vec![None; n];
    let mut spine: Vec<usize> = Vec::with_capacity(n);
    for i in 0..n {
        let mut last = None;
        while let Some(&top) = spine.last() {
            if nodes[top].2 < nodes[i].2 {
                last = spine.pop();
            } else {
                break;
            }
        }
        left[i] = last;
        if let Some(&top) = spine.last() {
            right[top] = Some(i);
        }
        spine.push(i);
    }

    let root = spine[0];
    let mut slots: Vec<Option<(D, V, u32)>> = nodes.into_iter().map(Some).collect();
    Tree {
        root: fill(root, &left, &right, &mut slots),
    }
}

fn fill<D: Clone, V: Monoid>(
    i: usize,
    left: &[Option<usize>],
    right: &[Option<usize>],
    slots: &mut [Option<(D, V, u32)>],
) -> Link<D, V> {
    let l = left[i].and_then(|j| fill(j, left, right, slots));
    let r = right[i].and_then(|j| fill(j, left, right, slots));
    let (data, value, priority) = slots[i].take()?;
    Some(Node::with_children(data, value, priority, l, r))
}

/// Result of [`Tree::split`].
pub struct Split<D, V> {
    /// Nodes entirely before `from`.
    pub left: Tree<D, V>,
    /// Nodes containing `from`, `to`, and everything in between.
    pub middle: Tree<D, V>,
    /// Nodes entirely after `to`.
    pub right: Tree<D, V>,
}

/// An immutable ordered-monoid tree. Cloning is `O(1)`.
pub struct Tree<D, V> {
    root: Link<D, V>,
}

impl<D, V> Clone for Tree<D, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
        }
    }
}

impl<D, V> Default for Tree<D, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, V> Tree<D, V> {
    /// The empty tree.
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Whether the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.root.as_ref().map_or(0, |root| root.size)
    }

    /// Data and value of the first node.
    pub fn first(&self) -> Option<(&D, &V)> {
        let mut node = self.root.as_ref()?;
        while let Some(left) = &node.left {
            node = left;
        }
        Some((&node.data, &node.own))
    }

    /// Data and value of the last node.
    pub fn last(&self) -> Option<(&D, &V)> {
        let mut node = self.root.as_ref()?;
        while let Some(right) = &node.right {
            node = right;
        }
        Some((&node.data, &node.own))
    }
}

impl<D: Clone, V: Monoid> Tree<D, V> {
    /// Combined value of the whole tree.
    pub fn value(&self) -> V {
        self.root
            .as_ref()
            .map_or_else(V::identity, |root| root.total.clone())
    }

    /// Concatenates two trees, `left` first.
    pub fn merge(left: &Tree<D, V>, right: &Tree<D, V>) -> Tree<D, V> {
        Tree {
            root: merge_nodes(&left.root, &right.root),
        }
    }

    /// Splits off the first node.
    pub fn split_first(&self) -> (Option<(D, V)>, Tree<D, V>) {
        match &self.root {
            None => (None, Tree::new()),
            Some(root) => {
                let (first, rest) = split_first_node(root);
                (Some(first), Tree { root: rest })
            }
        }
    }

    /// Splits off the last node.
    pub fn split_last(&self) -> (Option<(D, V)>, Tree<D, V>) {
        match &self.root {
            None => (None, Tree::new()),
            Some(root) => {
                let (last, rest) = split_last_node(root);
                (Some(last), Tree { root: rest })
            }
        }
    }

    /// Every node's data and value, in order.
    pub fn collect(&self) -> Vec<(D, V)> {
        let mut out = Vec::with_capacity(self.len());
        let mut stack: Vec<&Rc<Node<D, V>>> = Vec::new();
        let mut node = self.root.as_ref();
        loop {
            while let Some(n) = node {
                stack.push(n);
                node = n.left.as_ref();
            }
            let Some(n) = stack.pop() else {
                break;
            };
            out.push((n.data.clone(), n.own.clone()));
            node = n.right.as_ref();
        }
        out
    }

    /// A cursor over this tree. It starts unpositioned; call [`Cursor::locate`] first.
    pub fn cursor(&self) -> Cursor<D, V> {
        Cursor {
            root: self.root.clone(),
            stack: Vec::new(),
            before: None,
            after: None,
            on_node: false,
        }
    }
}

impl<D: Clone, V: OrderedMonoid> Tree<D, V> {
    /// Splits by two keys, putting the nodes containing `from` and `to` into the middle part.
    pub fn split(&self, from: &V::Key, to: &V::Key) -> Split<D, V> {
        let identity = V::identity();
        let (rest, right) = split_nodes(&self.root, to, true, &identity);
        let (left, middle) = split_nodes(&rest, from, false, &identity);
        Split {
            left: Tree { root: left },
            middle: Tree { root: middle },
            right: Tree { root: right },
        }
    }

    /// Splits at the first chunk boundary where the running value reaches `key`.
    ///
    /// With `strict`, the left part keeps every node whose running value after it is not greater
    /// than `key`. Otherwise the left part keeps every node whose running value before it is
    /// less than `key`, so a node straddling `key` lands on the left.
    pub fn split_by(&self, key: &V::Key, strict: bool) -> (Tree<D, V>, Tree<D, V>) {
        let (left, right) = split_nodes(&self.root, key, !strict, &V::identity());
        (Tree { root: left }, Tree { root: right })
    }
}

fn split_nodes<D: Clone, V: OrderedMonoid>(
    node: &Link<D, V>,
    key: &V::Key,
    intersection_to_left: bool,
    current: &V,
) -> (Link<D, V>, Link<D, V>) {
    let Some(node) = node else {
        return (None, None);
    };
    let before = match &node.left {
        Some(left) => current.combine(&left.total),
        None => current.clone(),
    };
    let after = before.combine(&node.own);
    let to_left = if before.greater_or_equal_than_key(key) {
        false
    } else if after.greater_than_key(key) {
        intersection_to_left
    } else {
        true
    };

    if to_left {
        let (l, r) = split_nodes(&node.right, key, intersection_to_left, &after);
        (Some(node.rebuild(node.left.clone(), l)), r)
    } else {
        let (l, r) = split_nodes(&node.left, key, intersection_to_left, current);
        (l, Some(node.rebuild(r, node.right.clone())))
    }
}

fn merge_nodes<D: Clone, V: Monoid>(left: &Link<D, V>, right: &Link<D, V>) -> Link<D, V> {
    match (left, right) {
        (None, right) => right.clone(),
        (left, None) => left.clone(),
        (Some(l), Some(r)) => {
            if l.priority > r.priority {
                Some(l.rebuild(l.left.clone(), merge_nodes(&l.right, right)))
            } else {
                Some(r.rebuild(merge_nodes(left, &r.left), r.right.clone()))
            }
        }
    }
}

fn split_first_node<D: Clone, V: Monoid>(node: &Rc<Node<D, V>>) -> ((D, V), Link<D, V>) {
    match &node.left {
        Some(left) => {
            let (first, rest) = split_first_node(left);
            (first, Some(node.rebuild(rest, node.right.clone())))
        }
        None => ((node.data.clone(), node.own.clone()), node.right.clone()),
    }
}

fn split_last_node<D: Clone, V: Monoid>(node: &Rc<Node<D, V>>) -> ((D, V), Link<D, V>) {
    match &node.right {
        Some(right) => {
            let (last, rest) = split_last_node(right);
            (last, Some(node.rebuild(node.left.clone(), rest)))
        }
        None => ((node.data.clone(), node.own.clone()), node.left.clone()),
    }
}

/// Points to a node, to the position before the first node, or to the position after the last
/// node.
///
/// On a node, [`before`](Cursor::before), [`value`](Cursor::value), [`data`](Cursor::data) and
/// [`after`](Cursor::after) are all set. Before the first node only `after` is set (to the
/// identity); after the last node only `before` is set (to the total value).
pub struct Cursor<D, V> {
    root: Link<D, V>,
    /// Path from the root to the current node, with the prefix value before each subtree.
    stack: Vec<(Rc<Node<D, V>>, V)>,
    before: Option<V>,
    after: Option<V>,
    on_node: bool,
}

impl<D, V: Monoid> Cursor<D, V> {
    /// Combined value of every node before the current position.
    pub fn before(&self) -> Option<&V> {
        self.before.as_ref()
    }

    /// Combined value up to and including the current node.
    pub fn after(&self) -> Option<&V> {
        self.after.as_ref()
    }

    /// Value of the current node.
    pub fn value(&self) -> Option<&V> {
        self.current().map(|node| &node.own)
    }

    /// Data of the current node.
    pub fn data(&self) -> Option<&D> {
        self.current().map(|node| &node.data)
    }

    fn current(&self) -> Option<&Rc<Node<D, V>>> {
        if self.on_node {
            self.stack.last().map(|(node, _)| node)
        } else {
            None
        }
    }

    fn settle_on_top(&mut self) {
        if let Some((node, prefix)) = self.stack.last() {
            let before = match &node.left {
                Some(left) => prefix.combine(&left.total),
                None => prefix.clone(),
            };
            self.after = Some(before.combine(&node.own));
            self.before = Some(before);
            self.on_node = true;
        }
    }

    /// Moves to the next node, or past the last one. Returns whether the cursor is on a node.
    pub fn next(&mut self) -> bool {
        let Some(after) = self.after.clone() else {
            return false;
        };
        let Some((top, _)) = self.stack.last() else {
            return false;
        };

        if !self.on_node {
            // Before the first node: the top of the stack is the first node.
        } else if let Some(right) = top.right.clone() {
            let mut node = right;
            loop {
                let left = node.left.clone();
                self.stack.push((node, after.clone()));
                match left {
                    Some(left) => node = left,
                    None => break,
                }
            }
        } else {
            let mut len = self.stack.len();
            while len > 1 && is_right_child(&self.stack[len - 2].0, &self.stack[len - 1].0) {
                len -= 1;
            }
            if len == 1 {
                self.before = Some(after);
                self.after = None;
                self.on_node = false;
                return false;
            }
            self.stack.truncate(len - 1);
        }

        self.settle_on_top();
        true
    }

    /// Moves to the previous node, or before the first one. Returns whether the cursor is on a
    /// node.
    pub fn prev(&mut self) -> bool {
        let Some(before) = self.before.clone() else {
            return false;
        };
        let Some((top, prefix)) = self.stack.last() else {
            return false;
        };

        if !self.on_node {
            // After the last node: the top of the stack is the last node.
        } else if let Some(left) = top.left.clone() {
            let mut prefix = prefix.clone();
            let mut node = left;
            loop {
                let right = node.right.clone();
                let next_prefix = match &node.left {
                    Some(l) => prefix.combine(&l.total).combine(&node.own),
                    None => prefix.combine(&node.own),
                };
                self.stack.push((node, prefix));
                match right {
                    Some(right) => {
                        prefix = next_prefix;
                        node = right;
                    }
                    None => break,
                }
            }
        } else {
            let mut len = self.stack.len();
            while len > 1 && is_left_child(&self.stack[len - 2].0, &self.stack[len - 1].0) {
                len -= 1;
            }
            if len == 1 {
                self.after = Some(before);
                self.before = None;
                self.on_node = false;
                return false;
            }
            self.stack.truncate(len - 1);
        }

        self.settle_on_top();
        true
    }
}

impl<D, V: OrderedMonoid> Cursor<D, V> {
    /// Moves to the first node whose running value reaches `key`, or past the last node if the
    /// whole tree is below `key`. A node that ends exactly at `key` is skipped in favour of the
    /// next one.
    pub fn locate(&mut self, key: &V::Key) {
        self.stack.clear();
        self.on_node = false;
        let Some(mut node) = self.root.clone() else {
            self.before = Some(V::identity());
            self.after = None;
            return;
        };

        let mut value = V::identity();
        loop {
            self.stack.push((node.clone(), value.clone()));
            if let Some(left) = &node.left {
                let next = value.combine(&left.total);
                if next.greater_or_equal_than_key(key) {
                    node = left.clone();
                    continue;
                }
                value = next;
            }
            let next = value.combine(&node.own);
            if next.greater_or_equal_than_key(key) {
                self.before = Some(value);
                self.after = Some(next);
                self.on_node = true;
                break;
            }
            match &node.right {
                Some(right) => {
                    value = next;
                    node = right.clone();
                }
                None => {
                    self.before = Some(next);
                    self.after = None;
                    break;
                }
            }
        }

        let ends_at_key = match (&self.before, &self.after) {
            (Some(before), Some(after)) => {
                !before.greater_or_equal_than_key(key) && !after.greater_than_key(key)
            }
            _ => false,
        };
        if self.on_node && ends_at_key {
            self.next();
        }
    }
}

fn is_right_child<D, V>(parent: &Rc<Node<D, V>>, child: &Rc<Node<D, V>>) -> bool {
    parent
        .right
        .as_ref()
        .is_some_and(|right| Rc::ptr_eq(right, child))
}

fn is_left_child<D, V>(parent: &Rc<Node<D, V>>, child: &Rc<Node<D, V>>) -> bool {
    parent
        .left
        .as_ref()
        .is_some_and(|left| Rc::ptr_eq(left, child))
}
