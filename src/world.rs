//! World Core Module
//!
//! [`World`] is the central coordinator: it owns the scene graph, the
//! physics subsystem and the render backend boundary, and drives the frame
//! in the fixed order everything else relies on:
//!
//! 1. **Fixed-step phase** — per pending step: apply structural physics
//!    changes (scheduled rebuilds) outside the step, `simulate`, the
//!    blocking `fetch_results` with event capture, then replay the captured
//!    user callbacks.
//! 2. **Variable-step phase** — blend simulation-authoritative poses into
//!    node transforms at the current interpolation factor, drain the dirty
//!    set (transform recompute + per-node commit), release retired cooked
//!    meshes.
//!
//! There is one logical simulation thread per world: nothing here is
//! mutated concurrently, and the native engine's own workers are only
//! observed at the `simulate`/`fetch_results` boundaries.

use glam::Affine3A;

use crate::physics::Physics;
use crate::physics::events::drain_queued_events;
use crate::physics::native::{NativeEngine, Pose, SceneDesc};
use crate::render::{NullRenderer, RenderBackend};
use crate::scene::lifecycle::{self, LifecycleCtx};
use crate::scene::node::{ColliderShape, GeometrySource, Node, NodeKind};
use crate::scene::{NodeHandle, NodeMut, Scene};
use crate::utils::FixedTimestep;

/// Default simulation tick rate: 50 Hz.
pub const DEFAULT_FIXED_DT: f32 = 1.0 / 50.0;

pub struct World {
    pub(crate) scene: Scene,
    pub(crate) physics: Physics,
    renderer: Box<dyn RenderBackend>,
    timestep: FixedTimestep,
    /// Mesh colliders whose geometry load is still in flight.
    pending_geometry: Vec<NodeHandle>,
}

impl World {
    /// Creates a world backed by a native physics engine and a render
    /// backend. Engine initialization failure degrades to physics disabled
    /// (logged) rather than failing construction.
    #[must_use]
    pub fn new(engine: Box<dyn NativeEngine>, renderer: Box<dyn RenderBackend>) -> Self {
        Self::with_settings(engine, renderer, &SceneDesc::default(), DEFAULT_FIXED_DT)
    }

    #[must_use]
    pub fn with_settings(
        engine: Box<dyn NativeEngine>,
        renderer: Box<dyn RenderBackend>,
        desc: &SceneDesc,
        fixed_dt: f32,
    ) -> Self {
        Self {
            scene: Scene::new(),
            physics: Physics::new(engine, desc),
            renderer,
            timestep: FixedTimestep::new(fixed_dt),
            pending_geometry: Vec::new(),
        }
    }

    /// Scene graph only: no physics engine, no renderer.
    #[must_use]
    pub fn headless() -> Self {
        Self {
            scene: Scene::new(),
            physics: Physics::disabled(),
            renderer: Box::new(NullRenderer),
            timestep: FixedTimestep::new(DEFAULT_FIXED_DT),
            pending_geometry: Vec::new(),
        }
    }

    // ========================================================================
    // Access
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    #[inline]
    #[must_use]
    pub fn physics(&self) -> &Physics {
        &self.physics
    }

    /// The always-mounted tree root.
    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeHandle {
        self.scene.root()
    }

    #[must_use]
    pub fn node(&self, handle: NodeHandle) -> Option<&Node> {
        self.scene.get_node(handle)
    }

    /// Chainable property access for one node.
    pub fn node_mut(&mut self, handle: NodeHandle) -> NodeMut<'_> {
        self.scene.node_mut(handle)
    }

    fn ctx(&mut self) -> LifecycleCtx<'_> {
        LifecycleCtx {
            scene: &mut self.scene,
            physics: &mut self.physics,
            renderer: self.renderer.as_mut(),
        }
    }

    // ========================================================================
    // Tree mutation
    // ========================================================================

    /// Inserts a node detached from the tree. Attach it with
    /// [`add_child`](Self::add_child) (or use [`add`](Self::add)).
    pub fn spawn(&mut self, node: Node) -> NodeHandle {
        let handle = self.scene.insert(node);
        self.track_pending_geometry(handle);
        handle
    }

    /// Spawns a node directly under the root and activates it.
    pub fn add(&mut self, node: Node) -> NodeHandle {
        let handle = self.spawn(node);
        self.add_child(self.scene.root(), handle);
        handle
    }

    /// Links `child` under `parent`. Reparenting removes from the old
    /// parent first (releasing resources if the child was mounted); the
    /// child then activates immediately when the new parent is mounted.
    pub fn add_child(&mut self, parent: NodeHandle, child: NodeHandle) {
        if parent == child
            || !self.scene.contains(parent)
            || !self.scene.contains(child)
            || self.scene.is_ancestor(child, parent)
        {
            log::warn!("refusing add_child: invalid parent/child pair");
            return;
        }
        {
            let mut ctx = self.ctx();
            lifecycle::deactivate(&mut ctx, child);
        }
        self.scene.attach(parent, child);
        let parent_mounted = self.scene.get_node(parent).is_some_and(Node::is_mounted);
        if parent_mounted {
            let mut ctx = self.ctx();
            lifecycle::activate(&mut ctx, child);
        }
    }

    /// Deactivates `child` (releasing its subtree's resources) and unlinks
    /// it from its parent. The subtree stays valid for re-insertion.
    pub fn remove_child(&mut self, child: NodeHandle) {
        {
            let mut ctx = self.ctx();
            lifecycle::deactivate(&mut ctx, child);
        }
        self.scene.detach(child);
    }

    /// Deactivates and deletes `handle`'s whole subtree.
    pub fn despawn(&mut self, handle: NodeHandle) {
        if handle == self.scene.root() {
            log::warn!("cannot despawn the scene root");
            return;
        }
        {
            let mut ctx = self.ctx();
            lifecycle::deactivate(&mut ctx, handle);
        }
        self.scene.detach(handle);
        self.scene.remove_subtree(handle);
        self.pending_geometry
            .retain(|&pending| self.scene.contains(pending));
    }

    /// Flips a node's active flag, cascading mounts or unmounts. An
    /// activation only mounts when the whole ancestor chain is mounted.
    pub fn set_active(&mut self, handle: NodeHandle, active: bool) {
        let Some(node) = self.scene.get_node_mut(handle) else {
            return;
        };
        if node.active == active {
            return;
        }
        node.active = active;

        if active {
            let parent_mounted = match self.scene.get_node(handle).and_then(Node::parent) {
                Some(parent) => self.scene.get_node(parent).is_some_and(Node::is_mounted),
                None => handle == self.scene.root(),
            };
            if parent_mounted {
                let mut ctx = self.ctx();
                lifecycle::activate(&mut ctx, handle);
            }
        } else {
            let mut ctx = self.ctx();
            lifecycle::deactivate(&mut ctx, handle);
        }
    }

    /// Config-only deep copy, desynchronized from the live tree until
    /// re-added.
    pub fn clone_node(&mut self, handle: NodeHandle, recursive: bool) -> Option<NodeHandle> {
        self.scene.clone_subtree(handle, recursive)
    }

    // ========================================================================
    // Frame pump
    // ========================================================================

    /// Advances the world by `dt` seconds of frame time.
    pub fn update(&mut self, dt: f32) {
        self.poll_pending_geometry();

        let steps = self.timestep.advance(dt);
        for _ in 0..steps {
            // Structural physics changes (rebuilds, spawns from callbacks)
            // must land between steps, never while one is in flight.
            {
                let mut ctx = self.ctx();
                lifecycle::drain_dirty(&mut ctx);
            }
            let fixed_dt = self.timestep.fixed_dt();
            self.physics.step(fixed_dt);
            drain_queued_events(self);
        }

        let alpha = self.timestep.alpha();
        self.apply_pose_feedback(alpha);

        {
            let mut ctx = self.ctx();
            lifecycle::drain_dirty(&mut ctx);
        }

        self.physics.flush_released_meshes();
    }

    /// Forces the pending clean passes to run now, outside the frame pump.
    /// Useful for callers that need guaranteed-fresh world matrices.
    pub fn flush(&mut self) {
        let mut ctx = self.ctx();
        lifecycle::drain_dirty(&mut ctx);
    }

    // ========================================================================
    // Pose feedback
    // ========================================================================

    /// Writes the blended simulation poses for the active actors back into
    /// their nodes and feeds the visual instances below them.
    ///
    /// This is not the user mutation path: the write goes through the
    /// transform's guarded pose write and propagates cached matrices
    /// directly, so nothing here re-enqueues into the dirty set — a
    /// physics-driven object would otherwise perpetually reschedule itself.
    fn apply_pose_feedback(&mut self, alpha: f32) {
        if !self.physics.is_enabled() {
            return;
        }
        let targets = self.physics.interpolation_targets(alpha);
        for (handle, pose) in targets {
            self.write_simulated_pose(handle, pose);
        }
    }

    fn write_simulated_pose(&mut self, handle: NodeHandle, pose: Pose) {
        let parent_world = {
            let Some(node) = self.scene.nodes.get(handle) else {
                return;
            };
            if !node.mounted {
                return;
            }
            node.parent
                .and_then(|p| self.scene.nodes.get(p))
                .map_or(Affine3A::IDENTITY, |p| p.transform.world_matrix)
        };

        let (world, children) = {
            let Some(node) = self.scene.nodes.get_mut(handle) else {
                return;
            };
            node.transform
                .write_simulated_pose(pose.position, pose.rotation);
            let world = parent_world * *node.transform.local_matrix();
            node.transform.set_world_matrix(world);
            (world, node.children.clone())
        };

        // Propagate cached matrices through the subtree and move the
        // mounted renderables. Pending user edits on descendants stay
        // pending for the next clean pass.
        let mut stack: Vec<(NodeHandle, Affine3A)> =
            children.iter().rev().map(|&c| (c, world)).collect();
        while let Some((current, parent_world)) = stack.pop() {
            let Some(node) = self.scene.nodes.get_mut(current) else {
                continue;
            };
            let world = parent_world * *node.transform.local_matrix();
            node.transform.set_world_matrix(world);

            if node.mounted
                && let NodeKind::Mesh(mesh) = &mut node.kind
                && let Some(instance) = mesh.instance.as_mut()
            {
                instance.set_matrix(world.into());
            }

            for &child in node.children.iter().rev() {
                stack.push((child, world));
            }
        }
    }

    // ========================================================================
    // Async geometry
    // ========================================================================

    fn track_pending_geometry(&mut self, handle: NodeHandle) {
        let is_pending = self.scene.get_node(handle).is_some_and(|node| {
            matches!(
                &node.kind,
                NodeKind::Collider(collider)
                    if matches!(
                        &collider.config.shape,
                        ColliderShape::Mesh { source: GeometrySource::Pending(_), .. }
                    )
            )
        });
        if is_pending {
            self.pending_geometry.push(handle);
        }
    }

    /// Checks in-flight geometry loads. A resolved load schedules a
    /// rebuild on its (mounted) collider; cancelled or stale entries drop
    /// out of the list without ever mounting.
    fn poll_pending_geometry(&mut self) {
        if self.pending_geometry.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending_geometry);
        for handle in pending {
            let mut resolved_while_mounted = false;
            let mut still_pending = false;

            if let Some(node) = self.scene.nodes.get_mut(handle)
                && let NodeKind::Collider(collider) = &mut node.kind
                && let ColliderShape::Mesh { source, .. } = &mut collider.config.shape
                && let GeometrySource::Pending(ticket) = source
            {
                if ticket.is_cancelled() {
                    *source = GeometrySource::Unavailable;
                } else if let Some(geometry) = ticket.poll() {
                    *source = GeometrySource::Ready(std::sync::Arc::new(geometry));
                    collider.needs_rebuild = true;
                    resolved_while_mounted = node.mounted;
                } else {
                    still_pending = true;
                }
            }

            if resolved_while_mounted {
                self.scene.set_dirty(handle);
            }
            if still_pending {
                self.pending_geometry.push(handle);
            }
        }
    }
}
