//! Shared test doubles: a scripted native physics engine and a counting
//! render backend.
//!
//! The engine double is deliberately dumb — no collision detection, no
//! integration beyond straight-line velocities — but it is faithful about
//! the contract that matters: resources are created/destroyed explicitly
//! and counted, destroying an actor releases its attached shapes, events
//! fire synchronously from inside `fetch_results`, and only actors the
//! "simulation" moved show up in the active set.

#![allow(dead_code)]

use std::sync::Arc;

use glam::{Mat4, Vec3};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use veld::errors::{Result, VeldError};
use veld::physics::native::{
    ActorDesc, ActorMotion, ContactPhase, JointDesc, NativeActorId, NativeEngine, NativeJointId,
    NativeMeshId, NativeScene, NativeShapeId, Pose, SceneDesc, ShapeDesc, SimulationEvents,
};
use veld::render::{MeshDesc, RenderBackend, RenderInstance};

// ============================================================================
// Scripted native engine
// ============================================================================

struct ActorState {
    motion: ActorMotion,
    pose: Pose,
    velocity: Vec3,
    kinematic_target: Option<Pose>,
}

struct ShapeState {
    actor: u64,
    trigger: bool,
}

#[derive(Default)]
struct EngineState {
    next_id: u64,
    actors: FxHashMap<u64, ActorState>,
    shapes: FxHashMap<u64, ShapeState>,
    joints: FxHashMap<u64, (u64, u64)>,
    meshes: FxHashMap<u64, usize>,

    queued_contacts: Vec<(u64, u64, ContactPhase)>,
    queued_triggers: Vec<(u64, u64, ContactPhase)>,
    active_last_step: Vec<u64>,

    /// True from `simulate` until `fetch_results` returns. User callbacks
    /// observing this as true would prove an illegal reentrant invocation.
    inside_step: bool,
    step_count: u64,

    fail_next_actor: bool,
    fail_next_shape: bool,
    fail_scene_create: bool,
}

impl EngineState {
    fn fresh_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn resource_count(&self) -> usize {
        self.actors.len() + self.shapes.len() + self.joints.len() + self.meshes.len()
    }
}

/// Shared inspection/scripting handle kept by the test after the engine
/// box moved into the world.
#[derive(Clone)]
pub struct EngineProbe(Arc<Mutex<EngineState>>);

impl EngineProbe {
    pub fn queue_contact(&self, a: NativeActorId, b: NativeActorId, phase: ContactPhase) {
        self.0.lock().queued_contacts.push((a.0, b.0, phase));
    }

    pub fn queue_trigger(&self, trigger: NativeActorId, other: NativeActorId, phase: ContactPhase) {
        self.0.lock().queued_triggers.push((trigger.0, other.0, phase));
    }

    /// Gives a dynamic actor a straight-line velocity; it will move each
    /// step and appear in the active set.
    pub fn set_velocity(&self, actor: NativeActorId, velocity: Vec3) {
        if let Some(state) = self.0.lock().actors.get_mut(&actor.0) {
            state.velocity = velocity;
        }
    }

    pub fn actor_pose(&self, actor: NativeActorId) -> Option<Pose> {
        self.0.lock().actors.get(&actor.0).map(|a| a.pose)
    }

    pub fn resource_count(&self) -> usize {
        self.0.lock().resource_count()
    }

    pub fn actor_count(&self) -> usize {
        self.0.lock().actors.len()
    }

    pub fn shape_count(&self) -> usize {
        self.0.lock().shapes.len()
    }

    pub fn mesh_count(&self) -> usize {
        self.0.lock().meshes.len()
    }

    pub fn joint_count(&self) -> usize {
        self.0.lock().joints.len()
    }

    pub fn step_count(&self) -> u64 {
        self.0.lock().step_count
    }

    /// True while the native step is still finalizing.
    pub fn inside_step(&self) -> bool {
        self.0.lock().inside_step
    }

    pub fn fail_next_actor(&self) {
        self.0.lock().fail_next_actor = true;
    }

    pub fn fail_next_shape(&self) {
        self.0.lock().fail_next_shape = true;
    }

    pub fn fail_scene_create(&self) {
        self.0.lock().fail_scene_create = true;
    }
}

pub struct TestEngine {
    state: Arc<Mutex<EngineState>>,
}

impl TestEngine {
    pub fn new() -> (Box<Self>, EngineProbe) {
        let state = Arc::new(Mutex::new(EngineState::default()));
        (
            Box::new(Self {
                state: Arc::clone(&state),
            }),
            EngineProbe(state),
        )
    }
}

impl NativeEngine for TestEngine {
    fn create_scene(&mut self, _desc: &SceneDesc) -> Result<Box<dyn NativeScene>> {
        if self.state.lock().fail_scene_create {
            return Err(VeldError::EngineInit("scripted scene failure".into()));
        }
        Ok(Box::new(TestScene {
            state: Arc::clone(&self.state),
        }))
    }

    fn cook_mesh(&mut self, positions: &[Vec3], indices: &[u32]) -> Result<NativeMeshId> {
        if positions.is_empty() || indices.is_empty() {
            return Err(VeldError::GeometryCooking("empty geometry".into()));
        }
        let mut state = self.state.lock();
        let id = state.fresh_id();
        state.meshes.insert(id, positions.len());
        Ok(NativeMeshId(id))
    }

    fn release_mesh(&mut self, mesh: NativeMeshId) {
        self.state.lock().meshes.remove(&mesh.0);
    }

    fn resource_count(&self) -> usize {
        self.state.lock().resource_count()
    }
}

struct TestScene {
    state: Arc<Mutex<EngineState>>,
}

impl NativeScene for TestScene {
    fn create_actor(&mut self, desc: &ActorDesc) -> Result<NativeActorId> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_actor) {
            return Err(VeldError::ResourceCreation("scripted actor failure".into()));
        }
        let id = state.fresh_id();
        state.actors.insert(
            id,
            ActorState {
                motion: desc.motion,
                pose: desc.pose,
                velocity: Vec3::ZERO,
                kinematic_target: None,
            },
        );
        Ok(NativeActorId(id))
    }

    fn destroy_actor(&mut self, actor: NativeActorId) {
        let mut state = self.state.lock();
        state.actors.remove(&actor.0);
        state.shapes.retain(|_, shape| shape.actor != actor.0);
    }

    fn attach_shape(&mut self, actor: NativeActorId, desc: &ShapeDesc) -> Result<NativeShapeId> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_shape) {
            return Err(VeldError::ResourceCreation("scripted shape failure".into()));
        }
        if !state.actors.contains_key(&actor.0) {
            return Err(VeldError::ResourceCreation(format!(
                "attach to missing actor {actor:?}"
            )));
        }
        let id = state.fresh_id();
        state.shapes.insert(
            id,
            ShapeState {
                actor: actor.0,
                trigger: desc.trigger,
            },
        );
        Ok(NativeShapeId(id))
    }

    fn detach_shape(&mut self, shape: NativeShapeId) {
        self.state.lock().shapes.remove(&shape.0);
    }

    fn set_shape_pose(&mut self, _shape: NativeShapeId, _pose: Pose) {}

    fn create_joint(&mut self, desc: &JointDesc) -> Result<NativeJointId> {
        let mut state = self.state.lock();
        if !state.actors.contains_key(&desc.body_a.0) || !state.actors.contains_key(&desc.body_b.0)
        {
            return Err(VeldError::ResourceCreation("joint body missing".into()));
        }
        let id = state.fresh_id();
        state.joints.insert(id, (desc.body_a.0, desc.body_b.0));
        Ok(NativeJointId(id))
    }

    fn destroy_joint(&mut self, joint: NativeJointId) {
        self.state.lock().joints.remove(&joint.0);
    }

    fn set_pose(&mut self, actor: NativeActorId, pose: Pose) {
        if let Some(state) = self.state.lock().actors.get_mut(&actor.0) {
            state.pose = pose;
        }
    }

    fn set_kinematic_target(&mut self, actor: NativeActorId, pose: Pose) {
        if let Some(state) = self.state.lock().actors.get_mut(&actor.0) {
            state.kinematic_target = Some(pose);
        }
    }

    fn pose(&self, actor: NativeActorId) -> Option<Pose> {
        self.state.lock().actors.get(&actor.0).map(|a| a.pose)
    }

    fn simulate(&mut self, dt: f32) {
        let mut state = self.state.lock();
        state.inside_step = true;
        state.step_count += 1;
        state.active_last_step.clear();

        let mut moved = Vec::new();
        for (&id, actor) in &mut state.actors {
            match actor.motion {
                ActorMotion::Dynamic => {
                    if actor.velocity != Vec3::ZERO {
                        actor.pose.position += actor.velocity * dt;
                        moved.push(id);
                    }
                }
                ActorMotion::Kinematic => {
                    if let Some(target) = actor.kinematic_target.take() {
                        actor.pose = target;
                        moved.push(id);
                    }
                }
                ActorMotion::Static => {}
            }
        }
        moved.sort_unstable();
        state.active_last_step = moved;
    }

    fn fetch_results(&mut self, sink: &mut dyn SimulationEvents) {
        let (contacts, triggers) = {
            let mut state = self.state.lock();
            (
                std::mem::take(&mut state.queued_contacts),
                std::mem::take(&mut state.queued_triggers),
            )
        };
        // Events fire on the engine's call stack, inside the step.
        for (a, b, phase) in contacts {
            let points = match phase {
                ContactPhase::Found => vec![Vec3::ZERO],
                ContactPhase::Lost => Vec::new(),
            };
            sink.on_contact(NativeActorId(a), NativeActorId(b), phase, &points);
        }
        for (trigger, other, phase) in triggers {
            sink.on_trigger(NativeActorId(trigger), NativeActorId(other), phase);
        }
        self.state.lock().inside_step = false;
    }

    fn active_actors(&self, out: &mut Vec<NativeActorId>) {
        let state = self.state.lock();
        out.extend(state.active_last_step.iter().map(|&id| NativeActorId(id)));
    }
}

// ============================================================================
// Counting render backend
// ============================================================================

#[derive(Default)]
struct RenderState {
    next_id: u64,
    inserts: u64,
    destroys: u64,
    moves: FxHashMap<u64, u64>,
    matrices: FxHashMap<u64, Mat4>,
}

#[derive(Clone, Default)]
pub struct RenderProbe(Arc<Mutex<RenderState>>);

impl RenderProbe {
    pub fn insert_count(&self) -> u64 {
        self.0.lock().inserts
    }

    pub fn destroy_count(&self) -> u64 {
        self.0.lock().destroys
    }

    pub fn live_instances(&self) -> u64 {
        let state = self.0.lock();
        state.inserts - state.destroys
    }

    /// Total `set_matrix` calls across all live and dead instances.
    pub fn total_moves(&self) -> u64 {
        self.0.lock().moves.values().sum()
    }

    /// Latest matrix of the `n`th inserted instance (1-based id order).
    pub fn matrix_of(&self, instance: u64) -> Option<Mat4> {
        self.0.lock().matrices.get(&instance).copied()
    }
}

pub struct TestRenderer {
    state: Arc<Mutex<RenderState>>,
}

impl TestRenderer {
    pub fn new() -> (Box<Self>, RenderProbe) {
        let probe = RenderProbe::default();
        (
            Box::new(Self {
                state: Arc::clone(&probe.0),
            }),
            probe,
        )
    }
}

struct TestInstance {
    id: u64,
    state: Arc<Mutex<RenderState>>,
}

impl RenderInstance for TestInstance {
    fn set_matrix(&mut self, matrix: Mat4) {
        let mut state = self.state.lock();
        *state.moves.entry(self.id).or_default() += 1;
        state.matrices.insert(self.id, matrix);
    }

    fn destroy(&mut self) {
        self.state.lock().destroys += 1;
    }
}

impl RenderBackend for TestRenderer {
    fn insert(&mut self, _desc: &MeshDesc, matrix: Mat4) -> Box<dyn RenderInstance> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.inserts += 1;
        state.matrices.insert(id, matrix);
        Box::new(TestInstance {
            id,
            state: Arc::clone(&self.state),
        })
    }
}

// ============================================================================
// World construction helpers
// ============================================================================

/// Resolves a physics-bearing node to its native actor identity.
pub fn native_of(world: &veld::World, handle: veld::NodeHandle) -> NativeActorId {
    let node = world.node(handle).expect("node exists");
    let key = node
        .as_rigid_body()
        .and_then(|b| b.actor())
        .or_else(|| node.as_collider().and_then(|c| c.actor()))
        .or_else(|| node.as_controller().and_then(|c| c.actor()))
        .expect("node has a registered actor");
    world
        .physics()
        .registry()
        .get(key)
        .expect("actor registered")
        .native()
}

pub fn physics_world() -> (veld::World, EngineProbe) {
    let (engine, probe) = TestEngine::new();
    let world = veld::World::new(engine, Box::new(veld::NullRenderer));
    (world, probe)
}

pub fn full_world() -> (veld::World, EngineProbe, RenderProbe) {
    let (engine, engine_probe) = TestEngine::new();
    let (renderer, render_probe) = TestRenderer::new();
    let world = veld::World::new(engine, renderer);
    (world, engine_probe, render_probe)
}

pub fn render_world() -> (veld::World, RenderProbe) {
    let (engine, _) = TestEngine::new();
    let (renderer, probe) = TestRenderer::new();
    let world = veld::World::new(engine, renderer);
    (world, probe)
}
