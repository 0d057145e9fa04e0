//! Scene graph container.
//!
//! Owns the node arena, the tree root, and the dirty propagation set. The
//! scene is a pure data layer: lifecycle transitions that touch external
//! resources (mount/unmount/commit) live in
//! [`lifecycle`](crate::scene::lifecycle) and are driven by the world pump,
//! which supplies the physics and render collaborators the scene itself
//! does not hold.

use glam::Vec3;
use slotmap::SlotMap;

use rustc_hash::FxHashMap;

use crate::scene::NodeHandle;
use crate::scene::dirty::DirtySet;
use crate::scene::node::{Node, NodeKind};

pub struct Scene {
    pub(crate) nodes: SlotMap<NodeHandle, Node>,
    root: NodeHandle,
    pub(crate) dirty: DirtySet,
}

impl Scene {
    /// Creates a scene whose root is a mounted, active group node. The root
    /// mounts nothing external, so it can be live from the start.
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert({
            let mut node = Node::group().with_name("root");
            node.mounted = true;
            node.transform.update_local_matrix();
            node
        });
        Self {
            nodes,
            root,
            dirty: DirtySet::new(),
        }
    }

    /// The tree root. Always mounted, never has a parent.
    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeHandle {
        self.root
    }

    // ========================================================================
    // Arena access
    // ========================================================================

    /// Inserts a node detached: no parent, not reachable from the root.
    /// Attach it with [`World::add_child`](crate::world::World::add_child).
    pub fn insert(&mut self, node: Node) -> NodeHandle {
        self.nodes.insert(node)
    }

    #[must_use]
    pub fn get_node(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle)
    }

    /// Chainable mutation wrapper; all operations no-op on a stale handle.
    pub fn node_mut(&mut self, handle: NodeHandle) -> crate::scene::access::NodeMut<'_> {
        crate::scene::access::NodeMut::new(self, handle)
    }

    pub fn get_node_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        self.nodes.get_mut(handle)
    }

    #[must_use]
    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.nodes.contains_key(handle)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ========================================================================
    // Tree structure
    // ========================================================================

    /// Links `child` under `parent`, detaching it from its old parent first
    /// so a node can never be a member of two children lists. Pure tree
    /// mutation — activation is the caller's concern.
    pub(crate) fn attach(&mut self, parent: NodeHandle, child: NodeHandle) {
        if parent == child {
            log::warn!("cannot attach node to itself");
            return;
        }
        if !self.nodes.contains_key(parent) || !self.nodes.contains_key(child) {
            log::error!("attach with stale handle");
            return;
        }
        if is_ancestor(&self.nodes, child, parent) {
            log::warn!("cannot attach a node below its own descendant");
            return;
        }

        self.detach(child);

        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.nodes.get_mut(child) {
            c.parent = Some(parent);
            c.transform.mark_changed();
        }
    }

    /// Unlinks `child` from its parent, if any. The node and its subtree
    /// stay valid for re-insertion elsewhere.
    pub(crate) fn detach(&mut self, child: NodeHandle) {
        let Some(parent) = self.nodes.get(child).and_then(Node::parent) else {
            return;
        };
        if let Some(p) = self.nodes.get_mut(parent)
            && let Some(pos) = p.children.iter().position(|&c| c == child)
        {
            p.children.remove(pos);
        }
        if let Some(c) = self.nodes.get_mut(child) {
            c.parent = None;
        }
    }

    /// Removes a detached subtree from the arena entirely. Assumes external
    /// resources were already released by deactivation.
    pub(crate) fn remove_subtree(&mut self, handle: NodeHandle) {
        for member in self.collect_subtree(handle) {
            self.dirty.remove(member);
            self.nodes.remove(member);
        }
    }

    /// Pre-order listing of `handle`'s subtree (including `handle`).
    #[must_use]
    pub(crate) fn collect_subtree(&self, handle: NodeHandle) -> Vec<NodeHandle> {
        let mut out = Vec::new();
        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            out.push(current);
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Pre-order visit of `handle`'s subtree.
    pub fn traverse<F>(&self, handle: NodeHandle, mut visitor: F)
    where
        F: FnMut(NodeHandle, &Node),
    {
        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            visitor(current, node);
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
        }
    }

    /// True when `ancestor` lies on `descendant`'s parent chain.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: NodeHandle, descendant: NodeHandle) -> bool {
        is_ancestor(&self.nodes, ancestor, descendant)
    }

    /// Nearest ancestor (excluding `handle` itself) satisfying `pred`.
    pub(crate) fn find_ancestor<F>(&self, handle: NodeHandle, mut pred: F) -> Option<NodeHandle>
    where
        F: FnMut(&Node) -> bool,
    {
        let mut current = self.nodes.get(handle).and_then(Node::parent);
        while let Some(h) = current {
            let node = self.nodes.get(h)?;
            if pred(node) {
                return Some(h);
            }
            current = node.parent;
        }
        None
    }

    // ========================================================================
    // Dirty propagation
    // ========================================================================

    /// Marks a node for the next clean pass. No-op when the node is not
    /// mounted (activation recomputes its transform anyway) or already
    /// dirty.
    pub fn set_dirty(&mut self, handle: NodeHandle) {
        let Some(node) = self.nodes.get_mut(handle) else {
            return;
        };
        if !node.mounted || node.dirty {
            return;
        }
        node.dirty = true;
        self.dirty.insert(&self.nodes, handle);
    }

    /// Nodes currently awaiting a clean pass.
    #[must_use]
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    // ========================================================================
    // Cloning
    // ========================================================================

    /// Deep-copies `handle`'s configuration into fresh, detached nodes.
    ///
    /// The clone starts desynchronized from the live tree: not mounted, no
    /// external resources, invisible to the frame pump until re-added with
    /// [`World::add_child`](crate::world::World::add_child). With
    /// `recursive`, the whole subtree is cloned and joint references
    /// between cloned nodes are remapped to their clones; references to
    /// nodes outside the subtree are kept as-is.
    pub fn clone_subtree(&mut self, handle: NodeHandle, recursive: bool) -> Option<NodeHandle> {
        if !self.nodes.contains_key(handle) {
            return None;
        }

        let originals = if recursive {
            self.collect_subtree(handle)
        } else {
            vec![handle]
        };

        let mut mapping: FxHashMap<NodeHandle, NodeHandle> = FxHashMap::default();
        for &original in &originals {
            let clone = self.nodes[original].clone_config();
            let clone_handle = self.nodes.insert(clone);
            mapping.insert(original, clone_handle);
        }

        // Rebuild tree links among the clones.
        for &original in &originals {
            let parent_clone = self.nodes[original]
                .parent
                .and_then(|p| mapping.get(&p).copied());
            let clone_handle = mapping[&original];
            if let Some(parent) = parent_clone {
                self.nodes[clone_handle].parent = Some(parent);
                self.nodes[parent].children.push(clone_handle);
            }
        }

        // Joint references into the cloned subtree follow the clones.
        for &clone_handle in mapping.values() {
            if let NodeKind::Joint(joint) = &mut self.nodes[clone_handle].kind {
                if let Some(a) = joint.config.body_a
                    && let Some(&mapped) = mapping.get(&a)
                {
                    joint.config.body_a = Some(mapped);
                }
                if let Some(b) = joint.config.body_b
                    && let Some(&mapped) = mapping.get(&b)
                {
                    joint.config.body_b = Some(mapped);
                }
            }
        }

        Some(mapping[&handle])
    }

    // ========================================================================
    // Spatial queries
    // ========================================================================

    /// World-space position from the cached world matrix. Does not force a
    /// clean pass.
    #[must_use]
    pub fn world_position(&self, handle: NodeHandle) -> Option<Vec3> {
        self.nodes
            .get(handle)
            .map(|node| node.transform.world_position())
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

fn is_ancestor(
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
