//! Scene node.
//!
//! A node carries the hot data traversed every frame — hierarchy links and
//! the [`Transform`] — plus a [`NodeKind`] describing the external resource
//! it owns while mounted (renderable, physics actor, collision shape,
//! joint, character controller).
//!
//! Each kind exposes an explicit, compile-time-checked configuration struct
//! rather than a dynamic property surface: the intended getters/setters per
//! node type are fixed at construction.
//!
//! # Lifecycle flags
//!
//! - `active`: the user's intent. An inactive node (and its subtree) holds
//!   no external resources.
//! - `mounted`: actually live. True only while every ancestor up to the
//!   root is mounted and active.
//! - `dirty`: awaiting a transform/commit pass.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Quat, Vec3};

use crate::physics::cooking::{CookedGeometry, CookedMeshRef, GeometryTicket};
use crate::physics::events::{ContactCallback, TriggerCallback};
use crate::physics::native::{ActorMotion, CollisionLayer, NativeJointId, NativeShapeId, Pose};
use crate::physics::registry::ActorKey;
use crate::render::{MeshDesc, RenderInstance};
use crate::scene::NodeHandle;
use crate::scene::transform::Transform;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Mesh
// ============================================================================

pub struct MeshNode {
    pub desc: MeshDesc,
    /// Live renderable while mounted.
    pub(crate) instance: Option<Box<dyn RenderInstance>>,
}

impl MeshNode {
    #[must_use]
    pub fn new(desc: MeshDesc) -> Self {
        Self {
            desc,
            instance: None,
        }
    }

    fn clone_config(&self) -> Self {
        Self::new(self.desc)
    }
}

// ============================================================================
// Rigid body
// ============================================================================

#[derive(Default, Clone)]
pub struct RigidBodyConfig {
    pub motion: ActorMotion,
    pub mass: f32,
    pub layer: CollisionLayer,
    /// User identification carried into the other side's event payloads.
    pub tag: Option<String>,
    pub player_id: Option<u32>,
    pub on_contact_start: Option<Arc<ContactCallback>>,
    pub on_contact_end: Option<Arc<ContactCallback>>,
    pub on_trigger_enter: Option<Arc<TriggerCallback>>,
    pub on_trigger_leave: Option<Arc<TriggerCallback>>,
}

impl RigidBodyConfig {
    #[must_use]
    pub fn new(motion: ActorMotion) -> Self {
        Self {
            motion,
            mass: 1.0,
            ..Self::default()
        }
    }
}

pub struct RigidBodyNode {
    pub config: RigidBodyConfig,
    pub(crate) actor: Option<ActorKey>,
    pub(crate) needs_rebuild: bool,
}

impl RigidBodyNode {
    #[must_use]
    pub fn new(config: RigidBodyConfig) -> Self {
        Self {
            config,
            actor: None,
            needs_rebuild: false,
        }
    }

    /// The registered actor key while mounted.
    #[must_use]
    pub fn actor(&self) -> Option<ActorKey> {
        self.actor
    }

    fn clone_config(&self) -> Self {
        Self::new(self.config.clone())
    }
}

// ============================================================================
// Collider
// ============================================================================

/// Where a mesh collider's triangle data comes from.
pub enum GeometrySource {
    /// Geometry is in memory, ready for cooking.
    Ready(Arc<CookedGeometry>),
    /// Still loading; the collider mounts inert and re-checks on commit.
    Pending(GeometryTicket),
    /// Load cancelled or failed; the collider stays inert.
    Unavailable,
}

impl GeometrySource {
    fn clone_config(&self) -> Self {
        match self {
            Self::Ready(geometry) => Self::Ready(Arc::clone(geometry)),
            // A pending ticket has a single consumer; clones must arrange
            // their own load.
            Self::Pending(_) | Self::Unavailable => Self::Unavailable,
        }
    }
}

impl std::fmt::Debug for GeometrySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(_) => f.write_str("Ready"),
            Self::Pending(_) => f.write_str("Pending"),
            Self::Unavailable => f.write_str("Unavailable"),
        }
    }
}

#[derive(Debug)]
pub enum ColliderShape {
    Box { half_extents: Vec3 },
    Sphere { radius: f32 },
    Capsule { radius: f32, half_height: f32 },
    Mesh { source: GeometrySource, convex: bool },
}

impl ColliderShape {
    fn clone_config(&self) -> Self {
        match self {
            Self::Box { half_extents } => Self::Box {
                half_extents: *half_extents,
            },
            Self::Sphere { radius } => Self::Sphere { radius: *radius },
            Self::Capsule {
                radius,
                half_height,
            } => Self::Capsule {
                radius: *radius,
                half_height: *half_height,
            },
            Self::Mesh { source, convex } => Self::Mesh {
                source: source.clone_config(),
                convex: *convex,
            },
        }
    }
}

pub struct ColliderConfig {
    pub shape: ColliderShape,
    /// Sensor: reports overlaps instead of colliding.
    pub trigger: bool,
    pub friction: f32,
    pub restitution: f32,
    pub layer: CollisionLayer,
    /// Identification and callbacks used when the collider has no rigid
    /// body ancestor and registers its own static actor.
    pub tag: Option<String>,
    pub player_id: Option<u32>,
    pub on_trigger_enter: Option<Arc<TriggerCallback>>,
    pub on_trigger_leave: Option<Arc<TriggerCallback>>,
}

impl ColliderConfig {
    #[must_use]
    pub fn new(shape: ColliderShape) -> Self {
        Self {
            shape,
            trigger: false,
            friction: 0.6,
            restitution: 0.0,
            layer: CollisionLayer::default(),
            tag: None,
            player_id: None,
            on_trigger_enter: None,
            on_trigger_leave: None,
        }
    }
}

pub struct ColliderNode {
    pub config: ColliderConfig,
    pub(crate) shape: Option<NativeShapeId>,
    /// Present when the collider created its own static actor.
    pub(crate) own_actor: Option<ActorKey>,
    /// Keeps the cooked mesh alive while the shape references it.
    pub(crate) mesh_ref: Option<CookedMeshRef>,
    pub(crate) needs_rebuild: bool,
}

impl ColliderNode {
    #[must_use]
    pub fn new(config: ColliderConfig) -> Self {
        Self {
            config,
            shape: None,
            own_actor: None,
            mesh_ref: None,
            needs_rebuild: false,
        }
    }

    #[must_use]
    pub fn shape_id(&self) -> Option<NativeShapeId> {
        self.shape
    }

    /// The static actor this collider registered for itself, when it has
    /// no rigid body ancestor.
    #[must_use]
    pub fn actor(&self) -> Option<ActorKey> {
        self.own_actor
    }

    fn clone_config(&self) -> Self {
        Self::new(ColliderConfig {
            shape: self.config.shape.clone_config(),
            trigger: self.config.trigger,
            friction: self.config.friction,
            restitution: self.config.restitution,
            layer: self.config.layer,
            tag: self.config.tag.clone(),
            player_id: self.config.player_id,
            on_trigger_enter: self.config.on_trigger_enter.clone(),
            on_trigger_leave: self.config.on_trigger_leave.clone(),
        })
    }
}

// ============================================================================
// Joint
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct JointConfig {
    /// Rigid body nodes the joint connects. A missing or unmounted side
    /// leaves the joint inert until rebuilt.
    pub body_a: Option<NodeHandle>,
    pub body_b: Option<NodeHandle>,
    pub anchor_a: Pose,
    pub anchor_b: Pose,
    /// Lower/upper limit in radians, when constrained.
    pub limit: Option<(f32, f32)>,
}

pub struct JointNode {
    pub config: JointConfig,
    pub(crate) joint: Option<NativeJointId>,
    pub(crate) needs_rebuild: bool,
}

impl JointNode {
    #[must_use]
    pub fn new(config: JointConfig) -> Self {
        Self {
            config,
            joint: None,
            needs_rebuild: false,
        }
    }

    fn clone_config(&self) -> Self {
        Self::new(self.config.clone())
    }
}

// ============================================================================
// Character controller
// ============================================================================

#[derive(Clone)]
pub struct ControllerConfig {
    pub radius: f32,
    pub height: f32,
    pub layer: CollisionLayer,
    pub tag: Option<String>,
    pub player_id: Option<u32>,
    pub on_contact_start: Option<Arc<ContactCallback>>,
    pub on_contact_end: Option<Arc<ContactCallback>>,
    pub on_trigger_enter: Option<Arc<TriggerCallback>>,
    pub on_trigger_leave: Option<Arc<TriggerCallback>>,
}

impl ControllerConfig {
    #[must_use]
    pub fn new(radius: f32, height: f32) -> Self {
        Self {
            radius,
            height,
            layer: CollisionLayer::PLAYER,
            tag: None,
            player_id: None,
            on_contact_start: None,
            on_contact_end: None,
            on_trigger_enter: None,
            on_trigger_leave: None,
        }
    }
}

pub struct ControllerNode {
    pub config: ControllerConfig,
    pub(crate) actor: Option<ActorKey>,
    pub(crate) shape: Option<NativeShapeId>,
    pub(crate) needs_rebuild: bool,
}

impl ControllerNode {
    #[must_use]
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            actor: None,
            shape: None,
            needs_rebuild: false,
        }
    }

    #[must_use]
    pub fn actor(&self) -> Option<ActorKey> {
        self.actor
    }

    fn clone_config(&self) -> Self {
        Self::new(self.config.clone())
    }
}

// ============================================================================
// Node
// ============================================================================

/// Type-specific payload of a node.
pub enum NodeKind {
    /// Pure transform carrier.
    Group,
    Mesh(MeshNode),
    RigidBody(RigidBodyNode),
    Collider(ColliderNode),
    Joint(JointNode),
    Controller(ControllerNode),
}

impl NodeKind {
    fn clone_config(&self) -> Self {
        match self {
            Self::Group => Self::Group,
            Self::Mesh(mesh) => Self::Mesh(mesh.clone_config()),
            Self::RigidBody(body) => Self::RigidBody(body.clone_config()),
            Self::Collider(collider) => Self::Collider(collider.clone_config()),
            Self::Joint(joint) => Self::Joint(joint.clone_config()),
            Self::Controller(controller) => Self::Controller(controller.clone_config()),
        }
    }

    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Group => "Group",
            Self::Mesh(_) => "Mesh",
            Self::RigidBody(_) => "RigidBody",
            Self::Collider(_) => "Collider",
            Self::Joint(_) => "Joint",
            Self::Controller(_) => "Controller",
        }
    }
}

pub struct Node {
    pub(crate) id: u64,
    pub(crate) name: Option<String>,

    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,

    pub transform: Transform,

    pub(crate) active: bool,
    pub(crate) mounted: bool,
    pub(crate) dirty: bool,

    pub(crate) kind: NodeKind,
}

impl Node {
    #[must_use]
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            name: None,
            parent: None,
            children: Vec::new(),
            transform: Transform::new(),
            active: true,
            mounted: false,
            dirty: false,
            kind,
        }
    }

    #[must_use]
    pub fn group() -> Self {
        Self::new(NodeKind::Group)
    }

    #[must_use]
    pub fn mesh(desc: MeshDesc) -> Self {
        Self::new(NodeKind::Mesh(MeshNode::new(desc)))
    }

    #[must_use]
    pub fn rigid_body(config: RigidBodyConfig) -> Self {
        Self::new(NodeKind::RigidBody(RigidBodyNode::new(config)))
    }

    #[must_use]
    pub fn collider(config: ColliderConfig) -> Self {
        Self::new(NodeKind::Collider(ColliderNode::new(config)))
    }

    #[must_use]
    pub fn joint(config: JointConfig) -> Self {
        Self::new(NodeKind::Joint(JointNode::new(config)))
    }

    #[must_use]
    pub fn controller(config: ControllerConfig) -> Self {
        Self::new(NodeKind::Controller(ControllerNode::new(config)))
    }

    // -- Builder-style construction helpers --

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.transform.set_position(position);
        self
    }

    #[must_use]
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.transform.set_rotation(rotation);
        self
    }

    #[must_use]
    pub fn with_euler(mut self, euler: Vec3) -> Self {
        self.transform.set_euler(euler);
        self
    }

    #[must_use]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.transform.set_scale(scale);
        self
    }

    /// Construct inactive; activation is deferred until
    /// [`set_active`](crate::world::World::set_active).
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    // -- Accessors --

    /// Process-unique identity, stable for the node's lifetime.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[inline]
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[must_use]
    pub fn as_rigid_body(&self) -> Option<&RigidBodyNode> {
        match &self.kind {
            NodeKind::RigidBody(body) => Some(body),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_collider(&self) -> Option<&ColliderNode> {
        match &self.kind {
            NodeKind::Collider(collider) => Some(collider),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_controller(&self) -> Option<&ControllerNode> {
        match &self.kind {
            NodeKind::Controller(controller) => Some(controller),
            _ => None,
        }
    }

    /// Config-only deep copy of this single node: fresh identity, no tree
    /// links, no live resources, not mounted. Used by
    /// [`Scene::clone_subtree`](crate::scene::Scene::clone_subtree).
    #[must_use]
    pub(crate) fn clone_config(&self) -> Self {
        let mut transform = self.transform.clone();
        transform.mark_changed();
        Self {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            name: self.name.clone(),
            parent: None,
            children: Vec::new(),
            transform,
            active: self.active,
            mounted: false,
            dirty: false,
            kind: self.kind.clone_config(),
        }
    }

    /// World pose decomposed from the cached world matrix.
    #[must_use]
    pub fn world_pose(&self) -> Pose {
        let (_, rotation, position) = self.transform.world_decomposed();
        Pose { position, rotation }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind.kind_name())
            .field("active", &self.active)
            .field("mounted", &self.mounted)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}
