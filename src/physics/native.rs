//! Native physics engine boundary.
//!
//! The simulation itself runs in a separate, non-reentrant native engine.
//! This module defines the narrow interface the core consumes: scene
//! creation, actor/shape/joint lifetime, the blocking step calls, and the
//! event entry points the engine invokes synchronously *during*
//! [`NativeScene::fetch_results`].
//!
//! Nothing native is released by a garbage collector — every id handed out
//! here is owned by exactly one node (or by the cooked-mesh cache) and must
//! be destroyed explicitly.

use bitflags::bitflags;
use glam::{Quat, Vec3};

use crate::errors::Result;

// ============================================================================
// Identities
// ============================================================================

/// Identity of one native rigid-body actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeActorId(pub u64);

/// Identity of one native collision shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeShapeId(pub u64);

/// Identity of one native joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeJointId(pub u64);

/// Identity of one cooked collision mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeMeshId(pub u64);

// ============================================================================
// Descriptions
// ============================================================================

/// A rigid transform, the unit the engine speaks in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    #[must_use]
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

bitflags! {
    /// Broad-phase collision filter groups.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct CollisionLayer: u32 {
        const ENVIRONMENT = 1 << 0;
        const OBJECT      = 1 << 1;
        const PLAYER      = 1 << 2;
        const TOOL        = 1 << 3;
    }
}

impl Default for CollisionLayer {
    fn default() -> Self {
        CollisionLayer::OBJECT
    }
}

/// How the engine integrates an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActorMotion {
    /// Never moves.
    Static,
    /// Moved by the application via kinematic targets.
    Kinematic,
    /// Fully simulated.
    #[default]
    Dynamic,
}

#[derive(Debug, Clone, Copy)]
pub struct SceneDesc {
    pub gravity: Vec3,
}

impl Default for SceneDesc {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ActorDesc {
    pub motion: ActorMotion,
    pub pose: Pose,
    pub mass: f32,
    pub layer: CollisionLayer,
}

/// Shape geometry, already in native terms (cooked meshes referenced by id).
#[derive(Debug, Clone, Copy)]
pub enum ShapeGeometry {
    Box { half_extents: Vec3 },
    Sphere { radius: f32 },
    Capsule { radius: f32, half_height: f32 },
    TriMesh { mesh: NativeMeshId },
    Convex { mesh: NativeMeshId },
}

#[derive(Debug, Clone, Copy)]
pub struct ShapeDesc {
    pub geometry: ShapeGeometry,
    /// Sensor shape: reports overlaps, never collides.
    pub trigger: bool,
    pub friction: f32,
    pub restitution: f32,
    /// Pose relative to the owning actor.
    pub local_pose: Pose,
    pub layer: CollisionLayer,
}

#[derive(Debug, Clone, Copy)]
pub struct JointDesc {
    pub body_a: NativeActorId,
    pub body_b: NativeActorId,
    pub anchor_a: Pose,
    pub anchor_b: Pose,
    /// Lower/upper swing limit in radians, when constrained.
    pub limit: Option<(f32, f32)>,
}

// ============================================================================
// Event entry points
// ============================================================================

/// Whether a pair transition began or ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactPhase {
    Found,
    Lost,
}

/// Sink for pair transitions reported by the engine.
///
/// The engine calls these synchronously from inside
/// [`NativeScene::fetch_results`], on its own call stack. Implementations
/// must only record — invoking user code from here could mutate engine
/// state the step is still finalizing.
pub trait SimulationEvents {
    /// A contact pair started or stopped touching. `points` carries the
    /// accumulated contact positions for `Found` transitions and is empty
    /// for `Lost`.
    fn on_contact(
        &mut self,
        first: NativeActorId,
        second: NativeActorId,
        phase: ContactPhase,
        points: &[Vec3],
    );

    /// A shape entered or left a trigger volume. `trigger` is the actor
    /// owning the sensor shape.
    fn on_trigger(&mut self, trigger: NativeActorId, other: NativeActorId, phase: ContactPhase);
}

// ============================================================================
// Engine & scene
// ============================================================================

/// The native engine module: scene factory plus mesh cooking.
pub trait NativeEngine {
    fn create_scene(&mut self, desc: &SceneDesc) -> Result<Box<dyn NativeScene>>;

    /// Cooks triangle geometry into a reusable native mesh.
    fn cook_mesh(&mut self, positions: &[Vec3], indices: &[u32]) -> Result<NativeMeshId>;

    /// Releases a cooked mesh. Must only be called once no shape references it.
    fn release_mesh(&mut self, mesh: NativeMeshId);

    /// Total count of live native resources (actors + shapes + joints +
    /// meshes). Exposed for leak assertions in tests.
    fn resource_count(&self) -> usize;
}

/// One simulated scene.
///
/// `simulate` and `fetch_results` are blocking from the caller's
/// perspective; the engine's internal worker threads are opaque and only
/// observed at these two boundaries. Destroying an actor also releases the
/// shapes still attached to it, so a later `detach_shape` on one of those
/// ids is a no-op.
pub trait NativeScene {
    fn create_actor(&mut self, desc: &ActorDesc) -> Result<NativeActorId>;
    fn destroy_actor(&mut self, actor: NativeActorId);

    fn attach_shape(&mut self, actor: NativeActorId, desc: &ShapeDesc) -> Result<NativeShapeId>;
    fn detach_shape(&mut self, shape: NativeShapeId);
    fn set_shape_pose(&mut self, shape: NativeShapeId, pose: Pose);

    fn create_joint(&mut self, desc: &JointDesc) -> Result<NativeJointId>;
    fn destroy_joint(&mut self, joint: NativeJointId);

    /// Teleports an actor, overriding the simulation state.
    fn set_pose(&mut self, actor: NativeActorId, pose: Pose);
    /// Sets the target pose a kinematic actor sweeps to over the next step.
    fn set_kinematic_target(&mut self, actor: NativeActorId, pose: Pose);
    fn pose(&self, actor: NativeActorId) -> Option<Pose>;

    /// Advances the simulation by one fixed step.
    fn simulate(&mut self, dt: f32);

    /// Blocks until the step finalizes, reporting pair transitions into
    /// `sink` along the way.
    fn fetch_results(&mut self, sink: &mut dyn SimulationEvents);

    /// Fills `out` with the actors the engine moved during the last step.
    /// Bounded by engine activity, not by total actor count.
    fn active_actors(&self, out: &mut Vec<NativeActorId>);
}
