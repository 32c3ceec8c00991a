// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::node::{NodeId, Side};
use super::QDigest;

/// Amortization factor of the compression trigger.
///
/// A compression pass only runs once the tree holds at least
/// `K * COMPRESSION_SLACK` nodes, so the cost of the pass is spread over the
/// inserts that grew the tree.
pub const COMPRESSION_SLACK: usize = 6;

impl QDigest {
    /// Runs a compression pass if the tree has outgrown its slack.
    pub(crate) fn compress_if_needed(&mut self) {
        #[allow(clippy::cast_possible_truncation)]
        let watermark = (self.k() as usize).saturating_mul(COMPRESSION_SLACK);

        if self.node_count() >= watermark {
            let threshold = self.len() / self.k();

            log::trace!(
                "compressing digest: node_count={} threshold={threshold}",
                self.node_count(),
            );

            self.compress_children(self.root(), threshold);
        }
    }

    /// Compresses the subtrees below `parent`, then weighs each child
    /// against `parent` itself.
    ///
    /// A child's subtree is fully compressed before the child is evaluated,
    /// so internal nodes behave as leaves of their level: empty leaves are
    /// dropped, and a child whose parent trio is too light is folded into
    /// the parent. The root itself is never evaluated.
    fn compress_children(&mut self, parent: NodeId, threshold: u64) {
        for side in [Side::Left, Side::Right] {
            let Some(child) = self.node(parent).child(side) else {
                continue;
            };

            self.compress_children(child, threshold);

            if self.remove_if_empty_leaf(child) {
                continue;
            }

            if self.trio_count(parent) < threshold {
                self.promote(parent);
            }
        }
    }

    /// Total count of a node and its (up to two) children.
    pub(crate) fn trio_count(&self, id: NodeId) -> u64 {
        let node = self.node(id);
        let mut total = node.count;

        if let Some(left) = node.left {
            total += self.node(left).count;
        }
        if let Some(right) = node.right {
            total += self.node(right).count;
        }

        total
    }

    /// Folds both children's counts into `parent`, then drops any child that
    /// became an empty leaf.
    fn promote(&mut self, parent: NodeId) {
        self.node_mut(parent).count = self.trio_count(parent);

        for side in [Side::Left, Side::Right] {
            if let Some(child) = self.node(parent).child(side) {
                self.node_mut(child).count = 0;
                self.remove_if_empty_leaf(child);
            }
        }
    }

    /// Detaches and frees `id` if it is a childless zero-count node.
    fn remove_if_empty_leaf(&mut self, id: NodeId) -> bool {
        let node = self.node(id);

        if node.count > 0 || !node.is_leaf() {
            return false;
        }

        // the root is never passed in here
        let Some(parent) = node.parent else {
            return false;
        };

        if self.node(parent).left == Some(id) {
            self.node_mut(parent).left = None;
        } else {
            self.node_mut(parent).right = None;
        }

        self.remove_node(id);

        true
    }
}
