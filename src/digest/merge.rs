// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::node::Side;
use super::QDigest;
use std::collections::VecDeque;

impl QDigest {
    /// Folds `other` into this digest; `other` is left untouched.
    ///
    /// The result spans the larger universe of the two inputs and keeps the
    /// larger compression parameter, so the stronger accuracy guarantee of
    /// either input carries over. Merging is commutative and associative up
    /// to the documented rank error.
    ///
    /// # Examples
    ///
    /// ```
    /// use q_digest::QDigest;
    ///
    /// let mut a = QDigest::new(5, 1);
    /// a.insert(1, 1, true);
    /// a.insert(3, 1, true);
    ///
    /// let mut b = QDigest::new(5, 1);
    /// b.insert(2, 1, true);
    /// b.insert(4, 1, true);
    ///
    /// a.merge(&b);
    ///
    /// assert_eq!(4, a.len());
    /// assert_eq!(2, a.percentile(0.5));
    /// assert_eq!(4, a.percentile(1.0));
    /// ```
    pub fn merge(&mut self, other: &Self) {
        let k = self.k().max(other.k());
        let universe_hi = self.universe_hi().max(other.universe_hi());

        log::trace!(
            "merging {} + {} elements over universe [0, {universe_hi}]",
            self.len(),
            other.len(),
        );

        let mut tmp = Self::new(k, universe_hi);

        // breadth-first over both sources; zero-count structural nodes
        // contribute nothing and are skipped
        let mut queue = VecDeque::new();
        queue.push_back((&*self, self.root()));
        queue.push_back((other, other.root()));

        while let Some((src, id)) = queue.pop_front() {
            let node = src.node(id);

            if let Some(left) = node.left {
                queue.push_back((src, left));
            }
            if let Some(right) = node.right {
                queue.push_back((src, right));
            }

            if node.count > 0 {
                tmp.insert_node(node.lo, node.hi, node.count);
            }
        }

        tmp.compress_if_needed();

        *self = tmp;
    }

    /// Adds `count` to the node covering exactly `[lo, hi]`, creating it and
    /// any missing ancestors along the way.
    ///
    /// No compression is attempted; callers batch their insertions and
    /// compress once at the end. The interval must be a valid sub-interval
    /// of the universe: no expansion is performed here.
    pub(crate) fn insert_node(&mut self, lo: u64, hi: u64, count: u64) {
        debug_assert!(
            self.is_valid_interval(lo, hi),
            "[{lo}, {hi}] is not a sub-interval of the universe",
        );

        let mut cur = self.root();

        loop {
            let node = self.node(cur);

            if node.lo == lo && node.hi == hi {
                break;
            }

            let mid = node.mid();
            let (node_lo, node_hi) = (node.lo, node.hi);

            cur = if hi <= mid {
                self.child_or_create(cur, Side::Left, node_lo, mid)
            } else {
                self.child_or_create(cur, Side::Right, mid + 1, node_hi)
            };
        }

        self.node_mut(cur).count += count;
        self.bump_total(count);
    }

    /// Whether `[lo, hi]` is an aligned power-of-two-length sub-interval of
    /// the universe (the only intervals tree nodes can cover).
    pub(crate) fn is_valid_interval(&self, lo: u64, hi: u64) -> bool {
        if lo > hi || hi > self.universe_hi() {
            return false;
        }

        let len = hi - lo + 1;

        len.is_power_of_two() && lo % len == 0
    }
}
