// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod compress;
mod encode;
mod merge;
mod node;

pub use compress::COMPRESSION_SLACK;

use crate::util::log2_ceil;
use node::{Arena, Node, NodeId, Side};

/// A non-empty interval of the universe together with its attributed count.
///
/// Yielded by [`QDigest::buckets`] in pre-order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Bucket {
    /// Inclusive lower bound of the interval
    pub lo: u64,

    /// Inclusive upper bound of the interval
    pub hi: u64,

    /// Number of stream elements attributed to the interval
    pub count: u64,
}

/// A Q-Digest: a bounded-memory summary of an integer multiset.
///
/// The digest is a sparse binary tree of intervals over the universe
/// `[0, universe_hi]`; each node carries a count of elements attributed to
/// its interval. The compression parameter `K` bounds memory at the price of
/// rank accuracy: a quantile query is answered within an additive rank error
/// of `len / K`.
///
/// The universe always spans `[0, 2ᵐ - 1]` and grows on demand when a key
/// beyond it is inserted.
#[derive(Clone, Debug)]
pub struct QDigest {
    nodes: Arena,
    root: NodeId,
    n_total: u64,
    k: u64,
}

impl QDigest {
    /// Creates an empty digest with compression parameter `k` over the
    /// universe `[0, universe_hi]`.
    ///
    /// # Panics
    ///
    /// Panics if `k` is zero or `universe_hi + 1` is not a power of two.
    #[must_use]
    pub fn new(k: u64, universe_hi: u64) -> Self {
        assert!(k > 0, "compression parameter must be positive");
        assert!(
            universe_hi
                .checked_add(1)
                .is_some_and(u64::is_power_of_two),
            "universe size must be a power of two",
        );

        let mut nodes = Arena::default();
        let root = nodes.alloc(Node::new(0, universe_hi));

        Self {
            nodes,
            root,
            n_total: 0,
            k,
        }
    }

    /// Total number of elements inserted so far.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.n_total
    }

    /// Returns `true` if nothing has been inserted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The compression parameter.
    #[must_use]
    pub fn k(&self) -> u64 {
        self.k
    }

    /// Inclusive upper bound of the universe.
    #[must_use]
    pub fn universe_hi(&self) -> u64 {
        self.node(self.root).hi
    }

    /// Number of live tree nodes, including zero-count structural nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes per element; the smaller, the better the sketch compresses.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compression_ratio(&self) -> f64 {
        self.node_count() as f64 / self.n_total as f64
    }

    /// Attributes `count` occurrences of `key` to the digest.
    ///
    /// If `key` lies beyond the universe, the universe is expanded first.
    /// With `try_compress`, an insert that pushed the node count past
    /// `K *` [`COMPRESSION_SLACK`] triggers a compression pass; passing
    /// `false` defers that work to a later insert or merge.
    ///
    /// # Panics
    ///
    /// May panic (in debug builds) if `key >= 2^63`, the largest universe a
    /// digest can expand to.
    pub fn insert(&mut self, key: u64, count: u64, try_compress: bool) {
        debug_assert!(count > 0, "insert of a zero count is meaningless");
        debug_assert!(key < 1 << 63, "key exceeds the largest possible universe");

        if key > self.universe_hi() {
            let mut target = 1u64 << log2_ceil(key + 1);

            // do not bother with a degenerate one-step expansion
            if target == self.universe_hi() + 1 {
                target *= 2;
            }

            self.expand(target);
        }

        let mut cur = self.root;
        let (mut lo, mut hi) = (0, self.universe_hi());

        while lo != hi {
            let mid = lo + (hi - lo) / 2;

            cur = if key <= mid {
                hi = mid;
                self.child_or_create(cur, Side::Left, lo, hi)
            } else {
                lo = mid + 1;
                self.child_or_create(cur, Side::Right, lo, hi)
            };
        }

        self.node_mut(cur).count += count;
        self.n_total += count;

        if try_compress {
            self.compress_if_needed();
        }
    }

    /// Returns the approximate 100p'th percentile element, i.e. passing in
    /// 0.7 returns the value below-or-at which roughly 70% of the inserted
    /// elements lie.
    ///
    /// The answer is the upper bound of the node at which a post-order walk
    /// first covers the requested rank, so it is biased upwards by at most
    /// `len / K`. Post-order visits upper bounds in ascending order, which
    /// makes the answers monotonic in `p`.
    ///
    /// # Examples
    ///
    /// ```
    /// use q_digest::QDigest;
    ///
    /// let mut digest = QDigest::new(5, 1);
    /// digest.insert(1, 1, true);
    /// digest.insert(2, 1, true);
    /// digest.insert(3, 1, true);
    ///
    /// assert_eq!(1, digest.percentile(0.5));
    /// assert_eq!(3, digest.percentile(1.0));
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the digest is empty or `p` is outside `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
    pub fn percentile(&self, p: f64) -> u64 {
        assert!(!self.is_empty(), "percentile of an empty digest");
        assert!((0.0..=1.0).contains(&p), "percentile needs p in [0, 1]");

        let req_rank = (p * self.n_total as f64).floor() as u64;
        let mut curr_rank = 0;

        self.rank_scan(Some(self.root), req_rank, &mut curr_rank)
    }

    /// Post-order walk accumulating counts; the upper bound of the node at
    /// which the running rank first covers `req_rank` travels back up
    /// through the early returns.
    fn rank_scan(&self, id: Option<NodeId>, req_rank: u64, curr_rank: &mut u64) -> u64 {
        let Some(id) = id else {
            return 0;
        };

        let node = self.node(id);

        let val = self.rank_scan(node.left, req_rank, curr_rank);
        if *curr_rank >= req_rank {
            return val;
        }

        let val = self.rank_scan(node.right, req_rank, curr_rank);
        if *curr_rank >= req_rank {
            return val;
        }

        *curr_rank += node.count;

        node.hi
    }

    /// Iterates over all non-zero-count buckets in pre-order.
    pub fn buckets(&self) -> impl Iterator<Item = Bucket> + '_ {
        Buckets {
            digest: self,
            stack: vec![self.root],
        }
    }

    /// Grows the universe to `[0, new_universe - 1]`.
    ///
    /// The tree keeps its shape: the old root is grafted, unmodified, onto a
    /// freshly built left spine below the new root. Interval arithmetic is
    /// position-invariant, so all counts and paths below the graft point
    /// stay valid.
    fn expand(&mut self, new_universe: u64) {
        debug_assert!(new_universe.is_power_of_two());
        debug_assert!(new_universe - 1 > self.universe_hi());

        if self.is_empty() {
            // nothing to graft
            *self = Self::new(self.k, new_universe - 1);
            return;
        }

        let old_root = self.root;
        let old_hi = self.node(old_root).hi;

        let new_root = self.nodes.alloc(Node::new(0, new_universe - 1));
        self.root = new_root;

        let mut cur = new_root;

        loop {
            // nodes on the left spine all have lo == 0
            let mid = self.node(cur).hi / 2;

            if mid == old_hi {
                self.node_mut(cur).left = Some(old_root);
                self.node_mut(old_root).parent = Some(cur);
                return;
            }

            let spine = self.nodes.alloc(Node::new(0, mid));
            self.node_mut(spine).parent = Some(cur);
            self.node_mut(cur).left = Some(spine);
            cur = spine;
        }
    }

    fn child_or_create(&mut self, parent: NodeId, side: Side, lo: u64, hi: u64) -> NodeId {
        if let Some(child) = self.node(parent).child(side) {
            return child;
        }

        let child = self.nodes.alloc(Node::new(lo, hi));
        self.node_mut(child).parent = Some(parent);

        match side {
            Side::Left => self.node_mut(parent).left = Some(child),
            Side::Right => self.node_mut(parent).right = Some(child),
        }

        child
    }

    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        self.nodes.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes.get_mut(id)
    }

    pub(crate) fn bump_total(&mut self, count: u64) {
        self.n_total += count;
    }

    pub(crate) fn remove_node(&mut self, id: NodeId) {
        self.nodes.remove(id);
    }
}

struct Buckets<'a> {
    digest: &'a QDigest,
    stack: Vec<NodeId>,
}

impl Iterator for Buckets<'_> {
    type Item = Bucket;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            let node = self.digest.node(id);

            // pre-order: children pushed right-first so left pops first
            if let Some(right) = node.right {
                self.stack.push(right);
            }
            if let Some(left) = node.left {
                self.stack.push(left);
            }

            if node.count > 0 {
                return Some(Bucket {
                    lo: node.lo,
                    hi: node.hi,
                    count: node.count,
                });
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn insert_into_fixed_universe() {
        let mut digest = QDigest::new(5, 7);

        digest.insert(3, 2, true);
        digest.insert(3, 1, true);
        digest.insert(6, 4, true);

        assert_eq!(7, digest.len());
        assert_eq!(7, digest.universe_hi());

        let leaf: Vec<_> = digest.buckets().filter(|b| b.lo == b.hi).collect();
        assert!(leaf.contains(&Bucket { lo: 3, hi: 3, count: 3 }));
        assert!(leaf.contains(&Bucket { lo: 6, hi: 6, count: 4 }));
    }

    #[test]
    fn insert_grows_universe() {
        let mut digest = QDigest::new(5, 0);

        digest.insert(7, 1, true);

        assert_eq!(7, digest.universe_hi());
        assert_eq!(1, digest.len());
        assert_eq!(7, digest.percentile(1.0));
    }

    #[test]
    fn expansion_skips_degenerate_step() {
        let mut digest = QDigest::new(5, 1);
        digest.insert(0, 1, true);

        // a one-step universe growth is skipped in favor of doubling
        digest.insert(2, 1, true);
        assert_eq!(3, digest.universe_hi());

        digest.insert(4, 1, true);
        assert_eq!(7, digest.universe_hi());
    }

    #[test]
    fn expansion_keeps_counts() {
        let mut digest = QDigest::new(100, 1);

        digest.insert(0, 5, true);
        digest.insert(1, 7, true);
        digest.insert(100, 1, true);

        assert_eq!(13, digest.len());
        assert_eq!(127, digest.universe_hi());

        assert_eq!(0, digest.percentile(0.1));
        assert_eq!(1, digest.percentile(0.9));
        assert_eq!(100, digest.percentile(1.0));
    }

    #[test]
    fn expansion_of_empty_digest_is_plain_swap() {
        let mut digest = QDigest::new(5, 0);
        assert_eq!(1, digest.node_count());

        digest.insert(12, 1, true);

        assert_eq!(15, digest.universe_hi());
        assert_eq!(1, digest.len());
    }

    #[test]
    fn node_count_tracks_descent_paths() {
        let mut digest = QDigest::new(100, 7);
        assert_eq!(1, digest.node_count());

        // path root -> [0,3] -> [0,1] -> [0,0]
        digest.insert(0, 1, true);
        assert_eq!(4, digest.node_count());

        // shares the whole path
        digest.insert(0, 1, true);
        assert_eq!(4, digest.node_count());

        // branches off at [0,1]
        digest.insert(1, 1, true);
        assert_eq!(5, digest.node_count());
    }

    #[test]
    fn percentile_monotonicity() {
        let mut digest = QDigest::new(8, 1);

        for key in 0..200u64 {
            digest.insert(key * 7 % 256, 1, true);
        }

        let mut prev = 0;

        for i in 0..=100u64 {
            #[allow(clippy::cast_precision_loss)]
            let v = digest.percentile(i as f64 / 100.0);
            assert!(v >= prev, "percentile must be monotonic");
            prev = v;
        }
    }

    #[test]
    #[should_panic(expected = "empty")]
    fn percentile_of_empty_digest_panics() {
        let digest = QDigest::new(5, 7);
        let _ = digest.percentile(0.5);
    }
}
