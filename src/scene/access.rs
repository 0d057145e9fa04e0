//! Chainable node mutation wrapper.
//!
//! [`NodeMut`] borrows a [`Scene`] mutably and provides the per-kind
//! property surface without `get_node_mut().unwrap()` at every call site.
//! Transform setters mark the node dirty so the next clean pass picks the
//! change up; physics configuration setters additionally schedule a
//! rebuild — the next commit destroys and recreates the native resource.
//!
//! Transform methods silently no-op when the handle is stale, so users
//! never panic on dangling handles. Validating setters return an error
//! *before* any native state is touched, leaving the previous resource
//! intact.
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::must_use_candidate)]

use std::sync::Arc;

use glam::{Quat, Vec3};

use crate::errors::{Result, VeldError};
use crate::physics::events::{ContactCallback, ContactEvent, TriggerCallback, TriggerEvent};
use crate::physics::native::{ActorMotion, CollisionLayer};
use crate::scene::NodeHandle;
use crate::scene::lifecycle::validate_collider_shape;
use crate::scene::node::{ColliderShape, NodeKind};
use crate::scene::scene::Scene;
use crate::world::World;

/// Temporary mutable borrow of a scene node for chainable operations.
pub struct NodeMut<'a> {
    scene: &'a mut Scene,
    handle: NodeHandle,
}

impl<'a> NodeMut<'a> {
    #[inline]
    pub(crate) fn new(scene: &'a mut Scene, handle: NodeHandle) -> Self {
        Self { scene, handle }
    }

    /// Returns the underlying handle.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> NodeHandle {
        self.handle
    }

    // ========================================================================
    // Transform setters (chainable)
    // ========================================================================

    /// Sets the node's local position.
    pub fn set_position(self, position: Vec3) -> Self {
        if let Some(node) = self.scene.get_node_mut(self.handle) {
            node.transform.set_position(position);
        }
        self.scene.set_dirty(self.handle);
        self
    }

    /// Sets rotation from a quaternion; the Euler view follows.
    pub fn set_rotation(self, rotation: Quat) -> Self {
        if let Some(node) = self.scene.get_node_mut(self.handle) {
            node.transform.set_rotation(rotation);
        }
        self.scene.set_dirty(self.handle);
        self
    }

    /// Sets rotation from XYZ Euler angles (radians); the quaternion follows.
    pub fn set_euler(self, euler: Vec3) -> Self {
        if let Some(node) = self.scene.get_node_mut(self.handle) {
            node.transform.set_euler(euler);
        }
        self.scene.set_dirty(self.handle);
        self
    }

    /// Sets non-uniform scale.
    pub fn set_scale(self, scale: Vec3) -> Self {
        if let Some(node) = self.scene.get_node_mut(self.handle) {
            node.transform.set_scale(scale);
        }
        self.scene.set_dirty(self.handle);
        self
    }

    // ========================================================================
    // Rigid body configuration (rebuilding)
    // ========================================================================

    /// Changes how the actor is integrated. Rebuilds the native actor.
    pub fn set_motion(self, motion: ActorMotion) -> Result<Self> {
        self.reconfigure(|kind| match kind {
            NodeKind::RigidBody(body) => {
                body.config.motion = motion;
                body.needs_rebuild = true;
                Ok(())
            }
            _ => Err(not_a("RigidBody", kind)),
        })
    }

    pub fn set_mass(self, mass: f32) -> Result<Self> {
        if mass < 0.0 || !mass.is_finite() {
            return Err(VeldError::invalid_config(format!(
                "mass {mass} must be finite and non-negative"
            )));
        }
        self.reconfigure(|kind| match kind {
            NodeKind::RigidBody(body) => {
                body.config.mass = mass;
                body.needs_rebuild = true;
                Ok(())
            }
            _ => Err(not_a("RigidBody", kind)),
        })
    }

    /// Moves the node to a different collision layer. Rebuilds.
    pub fn set_layer(self, layer: CollisionLayer) -> Result<Self> {
        self.reconfigure(|kind| match kind {
            NodeKind::RigidBody(body) => {
                body.config.layer = layer;
                body.needs_rebuild = true;
                Ok(())
            }
            NodeKind::Collider(collider) => {
                collider.config.layer = layer;
                collider.needs_rebuild = true;
                Ok(())
            }
            NodeKind::Controller(controller) => {
                controller.config.layer = layer;
                controller.needs_rebuild = true;
                Ok(())
            }
            _ => Err(not_a("physics node", kind)),
        })
    }

    /// Sets the identification carried into the other side's event payloads.
    pub fn set_tag(self, tag: Option<String>) -> Result<Self> {
        self.reconfigure(|kind| match kind {
            NodeKind::RigidBody(body) => {
                body.config.tag = tag;
                body.needs_rebuild = true;
                Ok(())
            }
            NodeKind::Collider(collider) => {
                collider.config.tag = tag;
                collider.needs_rebuild = true;
                Ok(())
            }
            NodeKind::Controller(controller) => {
                controller.config.tag = tag;
                controller.needs_rebuild = true;
                Ok(())
            }
            _ => Err(not_a("physics node", kind)),
        })
    }

    /// Installs the contact-start callback. Re-registers the actor.
    pub fn on_contact_start<F>(self, callback: F) -> Result<Self>
    where
        F: Fn(&mut World, &ContactEvent) + Send + Sync + 'static,
    {
        let callback: Arc<ContactCallback> = Arc::new(callback);
        self.reconfigure(move |kind| match kind {
            NodeKind::RigidBody(body) => {
                body.config.on_contact_start = Some(callback);
                body.needs_rebuild = true;
                Ok(())
            }
            NodeKind::Controller(controller) => {
                controller.config.on_contact_start = Some(callback);
                controller.needs_rebuild = true;
                Ok(())
            }
            _ => Err(not_a("RigidBody or Controller", kind)),
        })
    }

    /// Installs the contact-end callback. Re-registers the actor.
    pub fn on_contact_end<F>(self, callback: F) -> Result<Self>
    where
        F: Fn(&mut World, &ContactEvent) + Send + Sync + 'static,
    {
        let callback: Arc<ContactCallback> = Arc::new(callback);
        self.reconfigure(move |kind| match kind {
            NodeKind::RigidBody(body) => {
                body.config.on_contact_end = Some(callback);
                body.needs_rebuild = true;
                Ok(())
            }
            NodeKind::Controller(controller) => {
                controller.config.on_contact_end = Some(callback);
                controller.needs_rebuild = true;
                Ok(())
            }
            _ => Err(not_a("RigidBody or Controller", kind)),
        })
    }

    /// Installs the trigger-enter callback. Re-registers the actor.
    pub fn on_trigger_enter<F>(self, callback: F) -> Result<Self>
    where
        F: Fn(&mut World, &TriggerEvent) + Send + Sync + 'static,
    {
        let callback: Arc<TriggerCallback> = Arc::new(callback);
        self.reconfigure(move |kind| match kind {
            NodeKind::RigidBody(body) => {
                body.config.on_trigger_enter = Some(callback);
                body.needs_rebuild = true;
                Ok(())
            }
            NodeKind::Collider(collider) => {
                collider.config.on_trigger_enter = Some(callback);
                collider.needs_rebuild = true;
                Ok(())
            }
            NodeKind::Controller(controller) => {
                controller.config.on_trigger_enter = Some(callback);
                controller.needs_rebuild = true;
                Ok(())
            }
            _ => Err(not_a("physics node", kind)),
        })
    }

    /// Installs the trigger-leave callback. Re-registers the actor.
    pub fn on_trigger_leave<F>(self, callback: F) -> Result<Self>
    where
        F: Fn(&mut World, &TriggerEvent) + Send + Sync + 'static,
    {
        let callback: Arc<TriggerCallback> = Arc::new(callback);
        self.reconfigure(move |kind| match kind {
            NodeKind::RigidBody(body) => {
                body.config.on_trigger_leave = Some(callback);
                body.needs_rebuild = true;
                Ok(())
            }
            NodeKind::Collider(collider) => {
                collider.config.on_trigger_leave = Some(callback);
                collider.needs_rebuild = true;
                Ok(())
            }
            NodeKind::Controller(controller) => {
                controller.config.on_trigger_leave = Some(callback);
                controller.needs_rebuild = true;
                Ok(())
            }
            _ => Err(not_a("physics node", kind)),
        })
    }

    // ========================================================================
    // Collider configuration (rebuilding)
    // ========================================================================

    /// Resizes a sphere or capsule collider. Rebuilds the native shape.
    pub fn set_radius(self, radius: f32) -> Result<Self> {
        if radius <= 0.0 || !radius.is_finite() {
            return Err(VeldError::invalid_config(format!(
                "radius {radius} must be finite and positive"
            )));
        }
        self.reconfigure(|kind| match kind {
            NodeKind::Collider(collider) => {
                match &mut collider.config.shape {
                    ColliderShape::Sphere { radius: r } => *r = radius,
                    ColliderShape::Capsule { radius: r, .. } => *r = radius,
                    other => {
                        return Err(VeldError::invalid_config(format!(
                            "cannot set radius on {other:?} collider"
                        )));
                    }
                }
                collider.needs_rebuild = true;
                Ok(())
            }
            NodeKind::Controller(controller) => {
                controller.config.radius = radius;
                controller.needs_rebuild = true;
                Ok(())
            }
            _ => Err(not_a("Collider or Controller", kind)),
        })
    }

    /// Resizes a box collider. Rebuilds the native shape.
    pub fn set_half_extents(self, half_extents: Vec3) -> Result<Self> {
        if half_extents.min_element() <= 0.0 {
            return Err(VeldError::invalid_config(format!(
                "box half extents {half_extents} must be positive"
            )));
        }
        self.reconfigure(|kind| match kind {
            NodeKind::Collider(collider) => {
                let ColliderShape::Box { half_extents: he } = &mut collider.config.shape else {
                    return Err(VeldError::invalid_config("not a box collider"));
                };
                *he = half_extents;
                collider.needs_rebuild = true;
                Ok(())
            }
            _ => Err(not_a("Collider", kind)),
        })
    }

    /// Replaces the collider shape wholesale. Rebuilds.
    pub fn set_shape(self, shape: ColliderShape) -> Result<Self> {
        validate_collider_shape(&shape)?;
        self.reconfigure(move |kind| match kind {
            NodeKind::Collider(collider) => {
                collider.config.shape = shape;
                collider.needs_rebuild = true;
                Ok(())
            }
            _ => Err(not_a("Collider", kind)),
        })
    }

    /// Toggles sensor behavior. Rebuilds.
    pub fn set_trigger(self, trigger: bool) -> Result<Self> {
        self.reconfigure(|kind| match kind {
            NodeKind::Collider(collider) => {
                collider.config.trigger = trigger;
                collider.needs_rebuild = true;
                Ok(())
            }
            _ => Err(not_a("Collider", kind)),
        })
    }

    pub fn set_friction(self, friction: f32) -> Result<Self> {
        if friction < 0.0 || !friction.is_finite() {
            return Err(VeldError::invalid_config(format!(
                "friction {friction} must be finite and non-negative"
            )));
        }
        self.reconfigure(|kind| match kind {
            NodeKind::Collider(collider) => {
                collider.config.friction = friction;
                collider.needs_rebuild = true;
                Ok(())
            }
            _ => Err(not_a("Collider", kind)),
        })
    }

    pub fn set_restitution(self, restitution: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&restitution) {
            return Err(VeldError::invalid_config(format!(
                "restitution {restitution} must be within 0..=1"
            )));
        }
        self.reconfigure(|kind| match kind {
            NodeKind::Collider(collider) => {
                collider.config.restitution = restitution;
                collider.needs_rebuild = true;
                Ok(())
            }
            _ => Err(not_a("Collider", kind)),
        })
    }

    // ========================================================================
    // Joint configuration (rebuilding)
    // ========================================================================

    /// Sets or clears the joint's swing limit. Rebuilds the native joint.
    pub fn set_limit(self, limit: Option<(f32, f32)>) -> Result<Self> {
        if let Some((lower, upper)) = limit
            && lower > upper
        {
            return Err(VeldError::invalid_config(format!(
                "joint limit lower {lower} exceeds upper {upper}"
            )));
        }
        self.reconfigure(|kind| match kind {
            NodeKind::Joint(joint) => {
                joint.config.limit = limit;
                joint.needs_rebuild = true;
                Ok(())
            }
            _ => Err(not_a("Joint", kind)),
        })
    }

    /// Reconnects the joint to different rigid body nodes. Rebuilds.
    pub fn set_bodies(self, body_a: Option<NodeHandle>, body_b: Option<NodeHandle>) -> Result<Self> {
        if body_a.is_some() && body_a == body_b {
            return Err(VeldError::invalid_config("joint connects a body to itself"));
        }
        self.reconfigure(|kind| match kind {
            NodeKind::Joint(joint) => {
                joint.config.body_a = body_a;
                joint.config.body_b = body_b;
                joint.needs_rebuild = true;
                Ok(())
            }
            _ => Err(not_a("Joint", kind)),
        })
    }

    // ========================================================================
    // Controller configuration (rebuilding)
    // ========================================================================

    /// Resizes the controller capsule. Rebuilds the kinematic actor.
    pub fn set_capsule(self, radius: f32, height: f32) -> Result<Self> {
        if radius <= 0.0 || height <= 0.0 {
            return Err(VeldError::invalid_config(format!(
                "controller capsule radius {radius} / height {height} must be positive"
            )));
        }
        self.reconfigure(|kind| match kind {
            NodeKind::Controller(controller) => {
                controller.config.radius = radius;
                controller.config.height = height;
                controller.needs_rebuild = true;
                Ok(())
            }
            _ => Err(not_a("Controller", kind)),
        })
    }

    // ========================================================================
    // Shared plumbing
    // ========================================================================

    /// Applies a validated configuration edit, then schedules the clean
    /// pass that performs the rebuild. A stale handle is a quiet no-op.
    fn reconfigure<F>(self, edit: F) -> Result<Self>
    where
        F: FnOnce(&mut NodeKind) -> Result<()>,
    {
        if let Some(node) = self.scene.get_node_mut(self.handle) {
            edit(&mut node.kind)?;
        }
        self.scene.set_dirty(self.handle);
        Ok(self)
    }
}

fn not_a(expected: &str, kind: &NodeKind) -> VeldError {
    VeldError::invalid_config(format!(
        "operation requires a {expected} node, found {}",
        kind.kind_name()
    ))
}
