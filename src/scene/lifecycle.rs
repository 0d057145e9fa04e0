//! Node lifecycle.
//!
//! Mount/unmount cascades, per-kind resource hooks, and the clean pass that
//! drains the dirty set. Decoupled from [`Scene`] as free functions over a
//! split-borrow context so the scene, the physics subsystem and the render
//! backend can be borrowed side by side without a god object.
//!
//! State machine per node: `unmounted → mounted → unmounted`. A node mounts
//! only when every ancestor up to the root is mounted and active;
//! deactivation releases descendants' resources before the parent's, since
//! children may reference parent-owned resources (collider shapes attached
//! to an ancestor's actor).
//!
//! Hook failures are caught and logged per node kind right here — a broken
//! resource acquisition leaves that node inert and never aborts the rest of
//! the cascade or clean pass.

use glam::Affine3A;

use crate::errors::{Result, VeldError};
use crate::physics::Physics;
use crate::physics::native::{ActorDesc, ActorMotion, JointDesc, Pose, ShapeDesc, ShapeGeometry};
use crate::physics::registry::ActorFields;
use crate::render::RenderBackend;
use crate::scene::NodeHandle;
use crate::scene::node::{ColliderShape, GeometrySource, Node, NodeKind};
use crate::scene::scene::Scene;

/// Split mutable view over everything a lifecycle transition may touch.
pub(crate) struct LifecycleCtx<'a> {
    pub scene: &'a mut Scene,
    pub physics: &'a mut Physics,
    pub renderer: &'a mut dyn RenderBackend,
}

// ============================================================================
// Activation cascade
// ============================================================================

/// Mounts `handle` and its active descendants, parents first.
///
/// No-op for inactive or already-mounted nodes. Each node's transform is
/// recomputed immediately before its mount hook runs, so the first mount
/// always sees a correct world matrix. Caller guarantees the parent of
/// `handle` is mounted.
pub(crate) fn activate(ctx: &mut LifecycleCtx<'_>, handle: NodeHandle) {
    let mut stack = vec![handle];
    while let Some(current) = stack.pop() {
        let Some(node) = ctx.scene.nodes.get(current) else {
            continue;
        };
        if !node.active || node.mounted {
            continue;
        }

        let parent_world = node
            .parent
            .and_then(|p| ctx.scene.nodes.get(p))
            .map_or(Affine3A::IDENTITY, |p| p.transform.world_matrix);

        let children = {
            let Some(node) = ctx.scene.nodes.get_mut(current) else {
                continue;
            };
            node.transform.update_local_matrix();
            let world = parent_world * *node.transform.local_matrix();
            node.transform.set_world_matrix(world);
            node.mounted = true;
            node.children.clone()
        };

        mount_node(ctx, current);

        for &child in children.iter().rev() {
            stack.push(child);
        }
    }
}

/// Unmounts `handle`'s subtree, children first, releasing every external
/// resource. The nodes stay in the arena, valid for re-activation.
pub(crate) fn deactivate(ctx: &mut LifecycleCtx<'_>, handle: NodeHandle) {
    let mounted = ctx.scene.nodes.get(handle).is_some_and(|n| n.mounted);
    if !mounted {
        return;
    }

    // Reversed pre-order puts every descendant before its ancestor.
    let subtree = ctx.scene.collect_subtree(handle);
    for &current in subtree.iter().rev() {
        let is_mounted = ctx.scene.nodes.get(current).is_some_and(|n| n.mounted);
        if !is_mounted {
            continue;
        }
        unmount_node(ctx, current);
        if let Some(node) = ctx.scene.nodes.get_mut(current) {
            node.mounted = false;
            node.dirty = false;
        }
        ctx.scene.dirty.remove(current);
    }
}

// ============================================================================
// Mount hooks
// ============================================================================

pub(crate) fn mount_node(ctx: &mut LifecycleCtx<'_>, handle: NodeHandle) {
    let Some(node) = ctx.scene.nodes.get(handle) else {
        return;
    };
    let (id, kind_name) = (node.id, node.kind.kind_name());
    let result = match &node.kind {
        NodeKind::Group => Ok(()),
        NodeKind::Mesh(_) => {
            mount_mesh(ctx, handle);
            Ok(())
        }
        NodeKind::RigidBody(_) => mount_rigid_body(ctx, handle),
        NodeKind::Collider(_) => mount_collider(ctx, handle),
        NodeKind::Joint(_) => mount_joint(ctx, handle),
        NodeKind::Controller(_) => mount_controller(ctx, handle),
    };
    if let Err(err) = result {
        log::error!("{kind_name} mount failed on node {id}: {err}");
    }
}

pub(crate) fn unmount_node(ctx: &mut LifecycleCtx<'_>, handle: NodeHandle) {
    let Some(node) = ctx.scene.nodes.get_mut(handle) else {
        return;
    };
    match &mut node.kind {
        NodeKind::Group => {}
        NodeKind::Mesh(mesh) => {
            if let Some(mut instance) = mesh.instance.take() {
                instance.destroy();
            }
        }
        NodeKind::RigidBody(body) => {
            let actor = body.actor.take();
            destroy_registered_actor(ctx.physics, actor);
        }
        NodeKind::Collider(collider) => {
            // A node destroyed mid-load invalidates its token so the late
            // result is discarded rather than mounting onto a dead node.
            if let ColliderShape::Mesh { source, .. } = &mut collider.config.shape
                && let GeometrySource::Pending(ticket) = source
            {
                ticket.token().cancel();
                *source = GeometrySource::Unavailable;
            }
            let shape = collider.shape.take();
            let own_actor = collider.own_actor.take();
            let mesh_ref = collider.mesh_ref.take();
            if let Some(shape) = shape
                && let Some(native) = ctx.physics.native_mut()
            {
                native.detach_shape(shape);
            }
            destroy_registered_actor(ctx.physics, own_actor);
            drop(mesh_ref);
        }
        NodeKind::Joint(joint) => {
            if let Some(id) = joint.joint.take()
                && let Some(native) = ctx.physics.native_mut()
            {
                native.destroy_joint(id);
            }
        }
        NodeKind::Controller(controller) => {
            let shape = controller.shape.take();
            let actor = controller.actor.take();
            if let Some(shape) = shape
                && let Some(native) = ctx.physics.native_mut()
            {
                native.detach_shape(shape);
            }
            destroy_registered_actor(ctx.physics, actor);
        }
    }
}

/// Unregisters the handle and releases the native actor. Registry
/// destruction is idempotent; whichever side gets here first wins.
fn destroy_registered_actor(physics: &mut Physics, key: Option<crate::physics::ActorKey>) {
    let Some(key) = key else {
        return;
    };
    let native = physics.registry.get(key).map(crate::physics::ActorHandle::native);
    physics.registry.destroy(key);
    if let Some(native) = native
        && let Some(scene) = physics.native_mut()
    {
        scene.destroy_actor(native);
    }
}

fn mount_mesh(ctx: &mut LifecycleCtx<'_>, handle: NodeHandle) {
    let Some(node) = ctx.scene.nodes.get(handle) else {
        return;
    };
    let NodeKind::Mesh(mesh) = &node.kind else {
        return;
    };
    let desc = mesh.desc;
    let matrix = node.transform.world_matrix_as_mat4();
    let instance = ctx.renderer.insert(&desc, matrix);
    if let Some(node) = ctx.scene.nodes.get_mut(handle)
        && let NodeKind::Mesh(mesh) = &mut node.kind
    {
        mesh.instance = Some(instance);
    }
}

fn mount_rigid_body(ctx: &mut LifecycleCtx<'_>, handle: NodeHandle) -> Result<()> {
    if !ctx.physics.is_enabled() {
        return Ok(());
    }
    let Some(node) = ctx.scene.nodes.get(handle) else {
        return Ok(());
    };
    let NodeKind::RigidBody(body) = &node.kind else {
        return Ok(());
    };
    let config = body.config.clone();
    let pose = node.world_pose();

    let Some(parts) = ctx.physics.parts() else {
        return Ok(());
    };
    let native = parts.scene.create_actor(&ActorDesc {
        motion: config.motion,
        pose,
        mass: config.mass,
        layer: config.layer,
    })?;
    let key = parts.registry.add_actor(
        native,
        ActorFields {
            node: Some(handle),
            tag: config.tag,
            player_id: config.player_id,
            on_contact_start: config.on_contact_start,
            on_contact_end: config.on_contact_end,
            on_trigger_enter: config.on_trigger_enter,
            on_trigger_leave: config.on_trigger_leave,
        },
    );

    if let Some(node) = ctx.scene.nodes.get_mut(handle)
        && let NodeKind::RigidBody(body) = &mut node.kind
    {
        body.actor = Some(key);
    }
    Ok(())
}

fn mount_collider(ctx: &mut LifecycleCtx<'_>, handle: NodeHandle) -> Result<()> {
    if !ctx.physics.is_enabled() {
        return Ok(());
    }

    // Resolve an in-flight geometry load first. Not ready yet: stay inert,
    // the frame pump re-checks the ticket and schedules a rebuild.
    let ready = {
        let Some(node) = ctx.scene.nodes.get_mut(handle) else {
            return Ok(());
        };
        let NodeKind::Collider(collider) = &mut node.kind else {
            return Ok(());
        };
        if let ColliderShape::Mesh { source, .. } = &mut collider.config.shape {
            match source {
                GeometrySource::Ready(_) => true,
                GeometrySource::Pending(ticket) => {
                    if let Some(geometry) = ticket.poll() {
                        *source = GeometrySource::Ready(std::sync::Arc::new(geometry));
                        true
                    } else if ticket.is_cancelled() {
                        *source = GeometrySource::Unavailable;
                        false
                    } else {
                        false
                    }
                }
                GeometrySource::Unavailable => false,
            }
        } else {
            true
        }
    };
    if !ready {
        return Ok(());
    }

    let Some(node) = ctx.scene.nodes.get(handle) else {
        return Ok(());
    };
    let NodeKind::Collider(collider) = &node.kind else {
        return Ok(());
    };
    let (world_scale, _, _) = node.transform.world_decomposed();
    let world = *node.transform.world_matrix();
    let world_pose = node.world_pose();
    let trigger = collider.config.trigger;
    let friction = collider.config.friction;
    let restitution = collider.config.restitution;
    let layer = collider.config.layer;
    let tag = collider.config.tag.clone();
    let player_id = collider.config.player_id;
    let on_trigger_enter = collider.config.on_trigger_enter.clone();
    let on_trigger_leave = collider.config.on_trigger_leave.clone();

    validate_collider_shape(&collider.config.shape)?;

    // Native geometry, sized by the node's world scale.
    let scale = world_scale.abs();
    let (geometry, mesh_ref) = match &collider.config.shape {
        ColliderShape::Box { half_extents } => (
            ShapeGeometry::Box {
                half_extents: *half_extents * scale,
            },
            None,
        ),
        ColliderShape::Sphere { radius } => (
            ShapeGeometry::Sphere {
                radius: radius * scale.max_element(),
            },
            None,
        ),
        ColliderShape::Capsule {
            radius,
            half_height,
        } => (
            ShapeGeometry::Capsule {
                radius: radius * scale.x.max(scale.z),
                half_height: half_height * scale.y,
            },
            None,
        ),
        ColliderShape::Mesh { source, convex } => {
            let GeometrySource::Ready(data) = source else {
                return Ok(());
            };
            let mesh_ref = ctx.physics.cook(data)?;
            let geometry = if *convex {
                ShapeGeometry::Convex {
                    mesh: mesh_ref.mesh(),
                }
            } else {
                ShapeGeometry::TriMesh {
                    mesh: mesh_ref.mesh(),
                }
            };
            (geometry, Some(mesh_ref))
        }
    };

    // Attach to the nearest mounted rigid body ancestor, or stand alone as
    // a static actor.
    let ancestor_actor = ctx
        .scene
        .find_ancestor(handle, |n| {
            n.mounted && n.as_rigid_body().is_some_and(|b| b.actor.is_some())
        })
        .and_then(|body| {
            let node = ctx.scene.nodes.get(body)?;
            let body_actor = node.as_rigid_body()?.actor?;
            Some((body_actor, *node.transform.world_matrix()))
        });

    let Some(parts) = ctx.physics.parts() else {
        return Ok(());
    };

    let (actor_native, own_actor, local_pose) = match ancestor_actor {
        Some((body_key, body_world)) => {
            let Some(body_handle) = parts.registry.get(body_key) else {
                return Ok(());
            };
            (
                body_handle.native(),
                None,
                relative_pose(&body_world, &world),
            )
        }
        None => {
            let native = parts.scene.create_actor(&ActorDesc {
                motion: ActorMotion::Static,
                pose: world_pose,
                mass: 0.0,
                layer,
            })?;
            let key = parts.registry.add_actor(
                native,
                ActorFields {
                    node: Some(handle),
                    tag,
                    player_id,
                    on_trigger_enter,
                    on_trigger_leave,
                    ..ActorFields::default()
                },
            );
            (native, Some(key), Pose::IDENTITY)
        }
    };

    let shape = parts.scene.attach_shape(
        actor_native,
        &ShapeDesc {
            geometry,
            trigger,
            friction,
            restitution,
            local_pose,
            layer,
        },
    );
    let shape = match shape {
        Ok(shape) => shape,
        Err(err) => {
            // No partial resource may stay attached: tear down the actor we
            // just created for this collider before bailing.
            if let Some(key) = own_actor {
                let native = parts.registry.get(key).map(crate::physics::ActorHandle::native);
                parts.registry.destroy(key);
                if let Some(native) = native {
                    parts.scene.destroy_actor(native);
                }
            }
            return Err(err);
        }
    };

    if let Some(node) = ctx.scene.nodes.get_mut(handle)
        && let NodeKind::Collider(collider) = &mut node.kind
    {
        collider.shape = Some(shape);
        collider.own_actor = own_actor;
        collider.mesh_ref = mesh_ref;
    }
    Ok(())
}

fn mount_joint(ctx: &mut LifecycleCtx<'_>, handle: NodeHandle) -> Result<()> {
    if !ctx.physics.is_enabled() {
        return Ok(());
    }
    let Some(node) = ctx.scene.nodes.get(handle) else {
        return Ok(());
    };
    let NodeKind::Joint(joint) = &node.kind else {
        return Ok(());
    };
    let config = joint.config.clone();

    let resolve = |handle: Option<NodeHandle>| -> Option<crate::physics::ActorKey> {
        ctx.scene
            .nodes
            .get(handle?)
            .and_then(Node::as_rigid_body)
            .and_then(|b| b.actor)
    };
    let (Some(key_a), Some(key_b)) = (resolve(config.body_a), resolve(config.body_b)) else {
        log::debug!("joint {} inert: bodies not mounted", node.id);
        return Ok(());
    };
    if key_a == key_b {
        return Err(VeldError::invalid_config("joint connects a body to itself"));
    }

    let Some(parts) = ctx.physics.parts() else {
        return Ok(());
    };
    let (Some(a), Some(b)) = (parts.registry.get(key_a), parts.registry.get(key_b)) else {
        return Ok(());
    };
    let id = parts.scene.create_joint(&JointDesc {
        body_a: a.native(),
        body_b: b.native(),
        anchor_a: config.anchor_a,
        anchor_b: config.anchor_b,
        limit: config.limit,
    })?;

    if let Some(node) = ctx.scene.nodes.get_mut(handle)
        && let NodeKind::Joint(joint) = &mut node.kind
    {
        joint.joint = Some(id);
    }
    Ok(())
}

fn mount_controller(ctx: &mut LifecycleCtx<'_>, handle: NodeHandle) -> Result<()> {
    if !ctx.physics.is_enabled() {
        return Ok(());
    }
    let Some(node) = ctx.scene.nodes.get(handle) else {
        return Ok(());
    };
    let NodeKind::Controller(controller) = &node.kind else {
        return Ok(());
    };
    let config = controller.config.clone();
    let pose = node.world_pose();

    if config.radius <= 0.0 || config.height <= 0.0 {
        return Err(VeldError::invalid_config(format!(
            "controller capsule radius {} / height {} must be positive",
            config.radius, config.height
        )));
    }

    let Some(parts) = ctx.physics.parts() else {
        return Ok(());
    };
    let native = parts.scene.create_actor(&ActorDesc {
        motion: ActorMotion::Kinematic,
        pose,
        mass: 0.0,
        layer: config.layer,
    })?;
    let shape = parts.scene.attach_shape(
        native,
        &ShapeDesc {
            geometry: ShapeGeometry::Capsule {
                radius: config.radius,
                half_height: (config.height * 0.5).max(0.0),
            },
            trigger: false,
            friction: 0.0,
            restitution: 0.0,
            local_pose: Pose::IDENTITY,
            layer: config.layer,
        },
    );
    let shape = match shape {
        Ok(shape) => shape,
        Err(err) => {
            parts.scene.destroy_actor(native);
            return Err(err);
        }
    };
    let key = parts.registry.add_actor(
        native,
        ActorFields {
            node: Some(handle),
            tag: config.tag,
            player_id: config.player_id,
            on_contact_start: config.on_contact_start,
            on_contact_end: config.on_contact_end,
            on_trigger_enter: config.on_trigger_enter,
            on_trigger_leave: config.on_trigger_leave,
        },
    );

    if let Some(node) = ctx.scene.nodes.get_mut(handle)
        && let NodeKind::Controller(controller) = &mut node.kind
    {
        controller.actor = Some(key);
        controller.shape = Some(shape);
    }
    Ok(())
}

/// Rejects configurations that can never produce a valid native shape.
pub(crate) fn validate_collider_shape(shape: &ColliderShape) -> Result<()> {
    match shape {
        ColliderShape::Box { half_extents } => {
            if half_extents.min_element() <= 0.0 {
                return Err(VeldError::invalid_config(format!(
                    "box half extents {half_extents} must be positive"
                )));
            }
        }
        ColliderShape::Sphere { radius } => {
            if *radius <= 0.0 {
                return Err(VeldError::invalid_config(format!(
                    "sphere radius {radius} must be positive"
                )));
            }
        }
        ColliderShape::Capsule {
            radius,
            half_height,
        } => {
            if *radius <= 0.0 || *half_height < 0.0 {
                return Err(VeldError::invalid_config(format!(
                    "capsule radius {radius} / half height {half_height} out of range"
                )));
            }
        }
        ColliderShape::Mesh { source, .. } => {
            if let GeometrySource::Ready(data) = source
                && data.is_empty()
            {
                return Err(VeldError::invalid_config("mesh collider with empty geometry"));
            }
        }
    }
    Ok(())
}

// ============================================================================
// Commit
// ============================================================================

/// Applies a clean-pass result to the node's external resource. Runs a
/// pending rebuild (full unmount + mount) first when one is scheduled.
pub(crate) fn commit_node(ctx: &mut LifecycleCtx<'_>, handle: NodeHandle, did_move: bool) {
    if take_needs_rebuild(ctx.scene, handle) {
        unmount_node(ctx, handle);
        mount_node(ctx, handle);
        let is_body = ctx
            .scene
            .nodes
            .get(handle)
            .is_some_and(|n| matches!(n.kind, NodeKind::RigidBody(_)));
        if is_body {
            // The old actor died with its attached shapes and joints; every
            // dependent node must rebuild against the new one.
            schedule_dependent_rebuilds(ctx.scene, handle);
        }
        // Freshly mounted at the current world pose; nothing left to move.
        return;
    }

    if !did_move {
        return;
    }

    let Some(node) = ctx.scene.nodes.get(handle) else {
        return;
    };
    match &node.kind {
        NodeKind::Group | NodeKind::Joint(_) => {}
        NodeKind::Mesh(_) => {
            let matrix = node.transform.world_matrix_as_mat4();
            if let Some(node) = ctx.scene.nodes.get_mut(handle)
                && let NodeKind::Mesh(mesh) = &mut node.kind
                && let Some(instance) = mesh.instance.as_mut()
            {
                instance.set_matrix(matrix);
            }
        }
        NodeKind::RigidBody(body) => {
            let Some(key) = body.actor else {
                return;
            };
            let motion = body.config.motion;
            let pose = node.world_pose();
            let Some(native) = ctx.physics.registry.get(key).map(crate::physics::ActorHandle::native)
            else {
                return;
            };
            let Some(scene) = ctx.physics.native_mut() else {
                return;
            };
            match motion {
                ActorMotion::Kinematic => scene.set_kinematic_target(native, pose),
                ActorMotion::Static | ActorMotion::Dynamic => scene.set_pose(native, pose),
            }
        }
        NodeKind::Collider(collider) => {
            let Some(shape) = collider.shape else {
                return;
            };
            let world = *node.transform.world_matrix();
            let world_pose = node.world_pose();
            match collider.own_actor {
                Some(key) => {
                    let Some(native) =
                        ctx.physics.registry.get(key).map(crate::physics::ActorHandle::native)
                    else {
                        return;
                    };
                    if let Some(scene) = ctx.physics.native_mut() {
                        scene.set_pose(native, world_pose);
                    }
                }
                None => {
                    // Follow the ancestor body: refresh the shape's local pose.
                    let body_world = ctx
                        .scene
                        .find_ancestor(handle, |n| {
                            n.mounted && n.as_rigid_body().is_some_and(|b| b.actor.is_some())
                        })
                        .and_then(|b| ctx.scene.nodes.get(b))
                        .map(|n| *n.transform.world_matrix());
                    let Some(body_world) = body_world else {
                        return;
                    };
                    if let Some(scene) = ctx.physics.native_mut() {
                        scene.set_shape_pose(shape, relative_pose(&body_world, &world));
                    }
                }
            }
        }
        NodeKind::Controller(controller) => {
            let Some(key) = controller.actor else {
                return;
            };
            let pose = node.world_pose();
            let Some(native) = ctx.physics.registry.get(key).map(crate::physics::ActorHandle::native)
            else {
                return;
            };
            if let Some(scene) = ctx.physics.native_mut() {
                scene.set_kinematic_target(native, pose);
            }
        }
    }
}

/// Reads and clears a node's pending-rebuild flag.
fn take_needs_rebuild(scene: &mut Scene, handle: NodeHandle) -> bool {
    let Some(node) = scene.nodes.get_mut(handle) else {
        return false;
    };
    let flag = match &mut node.kind {
        NodeKind::Group | NodeKind::Mesh(_) => return false,
        NodeKind::RigidBody(body) => &mut body.needs_rebuild,
        NodeKind::Collider(collider) => &mut collider.needs_rebuild,
        NodeKind::Joint(joint) => &mut joint.needs_rebuild,
        NodeKind::Controller(controller) => &mut controller.needs_rebuild,
    };
    std::mem::take(flag)
}

/// After a rigid body was rebuilt: flag the mounted colliders in its
/// subtree whose nearest body is this one, and every mounted joint
/// anywhere referencing it.
fn schedule_dependent_rebuilds(scene: &mut Scene, body: NodeHandle) {
    let subtree = scene.collect_subtree(body);
    for &member in subtree.iter().skip(1) {
        let nearest = scene.find_ancestor(member, |n| matches!(n.kind, NodeKind::RigidBody(_)));
        if nearest != Some(body) {
            continue;
        }
        if let Some(node) = scene.nodes.get_mut(member)
            && node.mounted
            && let NodeKind::Collider(collider) = &mut node.kind
        {
            collider.needs_rebuild = true;
        }
    }

    let joints: Vec<NodeHandle> = scene
        .nodes
        .iter()
        .filter_map(|(handle, node)| {
            if !node.mounted {
                return None;
            }
            let NodeKind::Joint(joint) = &node.kind else {
                return None;
            };
            (joint.config.body_a == Some(body) || joint.config.body_b == Some(body))
                .then_some(handle)
        })
        .collect();
    for handle in joints {
        if let Some(node) = scene.nodes.get_mut(handle)
            && let NodeKind::Joint(joint) = &mut node.kind
        {
            joint.needs_rebuild = true;
        }
        scene.set_dirty(handle);
    }
}

// ============================================================================
// Clean pass
// ============================================================================

/// Recomputes transforms and commits one touched subtree.
///
/// Walks up to the highest dirty ancestor first, then traverses that
/// subtree once: a "did any ancestor move" flag propagates downward, every
/// visited node's matrices refresh when needed, every *mounted* visited
/// node gets its commit hook, and dirty flags clear along the way.
pub(crate) fn clean(ctx: &mut LifecycleCtx<'_>, handle: NodeHandle) {
    let dirty = ctx.scene.nodes.get(handle).is_some_and(|n| n.dirty);
    if !dirty {
        return;
    }

    let mut top = handle;
    while let Some(parent) = ctx.scene.nodes.get(top).and_then(Node::parent) {
        if ctx.scene.nodes.get(parent).is_some_and(|n| n.dirty) {
            top = parent;
        } else {
            break;
        }
    }

    let top_parent_world = ctx
        .scene
        .nodes
        .get(top)
        .and_then(Node::parent)
        .and_then(|p| ctx.scene.nodes.get(p))
        .map_or(Affine3A::IDENTITY, |p| p.transform.world_matrix);

    let mut stack: Vec<(NodeHandle, Affine3A, bool)> = vec![(top, top_parent_world, false)];
    while let Some((current, parent_world, ancestor_moved)) = stack.pop() {
        let Some(node) = ctx.scene.nodes.get_mut(current) else {
            continue;
        };

        let local_changed = node.transform.update_local_matrix();
        let moved = local_changed || ancestor_moved;
        if moved {
            let world = parent_world * *node.transform.local_matrix();
            node.transform.set_world_matrix(world);
        }
        node.dirty = false;

        let world = node.transform.world_matrix;
        let mounted = node.mounted;
        let children = node.children.clone();

        if mounted {
            commit_node(ctx, current, moved);
        }

        for &child in children.iter().rev() {
            stack.push((child, world, moved));
        }
    }
}

/// Drains the dirty set until no new dirt appears (rebuild cascades may
/// flag further nodes mid-drain).
pub(crate) fn drain_dirty(ctx: &mut LifecycleCtx<'_>) {
    loop {
        let batch = ctx.scene.dirty.take();
        if batch.is_empty() {
            break;
        }
        for handle in batch {
            clean(ctx, handle);
        }
    }
}

/// Pose of `child_world` expressed in `parent_world`'s frame.
fn relative_pose(parent_world: &Affine3A, child_world: &Affine3A) -> Pose {
    let relative = parent_world.inverse() * *child_world;
    let (_, rotation, position) = relative.to_scale_rotation_translation();
    Pose { position, rotation }
}
