//! Dirty propagation set.
//!
//! Holds the nodes whose pending transform recompute has not propagated
//! yet. Only the *topmost* dirty node of each touched subtree is kept:
//! inserting a node whose ancestor is already dirty is a no-op (the
//! ancestor's clean covers it), and inserting an ancestor evicts any set
//! members inside its subtree. The frame pump therefore does
//! O(touched-subtrees) clean passes per frame, not O(touched-nodes).
//!
//! Insertion order is preserved so a frame's clean passes run in the order
//! the mutations happened.

use rustc_hash::FxHashSet;
use slotmap::SlotMap;

use crate::scene::NodeHandle;
use crate::scene::node::Node;

#[derive(Default)]
pub struct DirtySet {
    order: Vec<NodeHandle>,
    members: FxHashSet<NodeHandle>,
}

impl DirtySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `handle` as a topmost-dirty candidate.
    ///
    /// The caller has already set the node's dirty flag; this only decides
    /// set membership. Ancestry is resolved against `nodes`.
    pub(crate) fn insert(&mut self, nodes: &SlotMap<NodeHandle, Node>, handle: NodeHandle) {
        if self.members.contains(&handle) {
            return;
        }

        // Covered by an already-dirty ancestor: its clean pass will visit us.
        let mut ancestor = nodes.get(handle).and_then(Node::parent);
        while let Some(current) = ancestor {
            let Some(node) = nodes.get(current) else {
                break;
            };
            if node.dirty {
                return;
            }
            ancestor = node.parent;
        }

        // Supersede any member inside our subtree.
        if !self.members.is_empty() {
            let members = &mut self.members;
            self.order.retain(|&member| {
                if is_ancestor_of(nodes, handle, member) {
                    members.remove(&member);
                    false
                } else {
                    true
                }
            });
        }

        self.members.insert(handle);
        self.order.push(handle);
    }

    /// Removes a single member (e.g. when its subtree was deactivated).
    pub(crate) fn remove(&mut self, handle: NodeHandle) {
        if self.members.remove(&handle) {
            self.order.retain(|&member| member != handle);
        }
    }

    #[must_use]
    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.members.contains(&handle)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Takes the whole set in insertion order, leaving it empty.
    pub(crate) fn take(&mut self) -> Vec<NodeHandle> {
        self.members.clear();
        std::mem::take(&mut self.order)
    }
}

/// Walks `descendant`'s parent chain looking for `ancestor`.
fn is_ancestor_of(
    nodes: &SlotMap<NodeHandle, Node>,
    ancestor: NodeHandle,
    descendant: NodeHandle,
) -> bool {
    let mut current = nodes.get(descendant).and_then(Node::parent);
    while let Some(handle) = current {
        if handle == ancestor {
            return true;
        }
        current = nodes.get(handle).and_then(Node::parent);
    }
    false
}
