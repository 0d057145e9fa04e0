//! Physics synchronization subsystem.
//!
//! Owns the native simulation scene and everything that keeps the scene
//! graph consistent with it:
//!
//! - [`registry`]: native actor identity → logical ownership records
//! - [`events`]: deferred contact/trigger callbacks captured during a step
//! - [`cooking`]: refcounted collision mesh cache and async geometry loads
//! - [`native`]: the consumed engine interface
//!
//! A failed engine initialization is fatal to this subsystem only: the
//! world degrades to physics disabled — physics-bearing nodes mount inert —
//! instead of crashing the process.

pub mod cooking;
pub mod events;
pub mod native;
pub mod registry;

pub use cooking::{
    CookedGeometry, CookedMeshRef, GeometrySender, GeometryTicket, LoadToken, MeshCache,
};
pub use events::{ContactCallback, ContactEvent, TriggerCallback, TriggerEvent};
pub use native::{
    ActorDesc, ActorMotion, CollisionLayer, ContactPhase, JointDesc, NativeActorId, NativeEngine,
    NativeJointId, NativeMeshId, NativeScene, NativeShapeId, Pose, SceneDesc, ShapeDesc,
    ShapeGeometry, SimulationEvents,
};
pub use registry::{ActorFields, ActorHandle, ActorKey, ActorRegistry, PoseSamples};

use crate::errors::{Result, VeldError};
use crate::physics::events::{CaptureSink, SimulationEventQueue};
use crate::scene::NodeHandle;

/// Split mutable view over the pieces a mount/unmount needs at once.
pub(crate) struct PhysicsParts<'a> {
    pub scene: &'a mut dyn NativeScene,
    pub registry: &'a mut ActorRegistry,
}

pub struct Physics {
    engine: Option<Box<dyn NativeEngine>>,
    scene: Option<Box<dyn NativeScene>>,
    pub(crate) registry: ActorRegistry,
    pub(crate) events: SimulationEventQueue,
    cache: MeshCache,

    /// Actors the engine reported active after the last fixed step, in
    /// report order. Only these are interpolated between steps.
    interpolating: Vec<ActorKey>,
    scratch_active: Vec<NativeActorId>,
}

impl Physics {
    /// Initializes the subsystem against a native engine. An engine that
    /// cannot create a scene degrades to [`Physics::disabled`] with an
    /// error log, rather than failing the world.
    #[must_use]
    pub fn new(mut engine: Box<dyn NativeEngine>, desc: &SceneDesc) -> Self {
        match engine.create_scene(desc) {
            Ok(scene) => Self {
                engine: Some(engine),
                scene: Some(scene),
                registry: ActorRegistry::new(),
                events: SimulationEventQueue::new(),
                cache: MeshCache::new(),
                interpolating: Vec::new(),
                scratch_active: Vec::new(),
            },
            Err(err) => {
                log::error!("physics disabled: {err}");
                Self::disabled()
            }
        }
    }

    /// A subsystem with no native engine. Physics-bearing nodes mount
    /// inert; stepping and interpolation are no-ops.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            engine: None,
            scene: None,
            registry: ActorRegistry::new(),
            events: SimulationEventQueue::new(),
            cache: MeshCache::new(),
            interpolating: Vec::new(),
            scratch_active: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.scene.is_some()
    }

    /// Read access to the logical actor records.
    #[must_use]
    pub fn registry(&self) -> &ActorRegistry {
        &self.registry
    }

    /// Live native resource count, for leak checks. Zero when disabled.
    #[must_use]
    pub fn native_resource_count(&self) -> usize {
        self.engine.as_ref().map_or(0, |e| e.resource_count())
    }

    /// Distinct cooked collision meshes currently cached.
    #[must_use]
    pub fn cooked_mesh_count(&self) -> usize {
        self.cache.len()
    }

    pub(crate) fn parts(&mut self) -> Option<PhysicsParts<'_>> {
        let scene = self.scene.as_deref_mut()?;
        Some(PhysicsParts {
            scene,
            registry: &mut self.registry,
        })
    }

    pub(crate) fn native_mut(&mut self) -> Option<&mut (dyn NativeScene + 'static)> {
        self.scene.as_deref_mut()
    }

    /// Cooks (or re-uses) the native mesh for `geometry`.
    pub(crate) fn cook(&mut self, geometry: &CookedGeometry) -> Result<CookedMeshRef> {
        let engine = self
            .engine
            .as_deref_mut()
            .ok_or_else(|| VeldError::EngineInit("physics disabled".into()))?;
        self.cache.acquire(engine, geometry)
    }

    // ========================================================================
    // Stepping
    // ========================================================================

    /// Runs one fixed simulation step: `simulate`, then the blocking
    /// `fetch_results` with event capture, then the authoritative pose
    /// snapshot for the engine's active-actor set.
    ///
    /// User callbacks do *not* run here — the caller drains the event
    /// queue afterwards, once the step has fully finalized.
    pub(crate) fn step(&mut self, dt: f32) {
        let Self {
            scene,
            registry,
            events,
            interpolating,
            scratch_active,
            ..
        } = self;
        let Some(scene) = scene.as_deref_mut() else {
            return;
        };

        scene.simulate(dt);

        events.begin_capture();
        {
            let mut sink = CaptureSink {
                registry: &mut *registry,
                queue: &mut *events,
            };
            scene.fetch_results(&mut sink);
        }
        events.end_capture();

        // Read back authoritative poses, bounded by the active-actor set.
        scratch_active.clear();
        scene.active_actors(scratch_active);
        interpolating.clear();
        for &native in scratch_active.iter() {
            let Some(key) = registry.resolve(native) else {
                continue;
            };
            let Some(pose) = scene.pose(native) else {
                continue;
            };
            if let Some(handle) = registry.get_mut(key) {
                match &mut handle.samples {
                    Some(samples) => samples.push(pose),
                    None => handle.samples = Some(PoseSamples::at_rest(pose)),
                }
                interpolating.push(key);
            }
        }
    }

    /// Blended visual poses for the actors moved by the last step, at
    /// `alpha` (0..1) of the way into the next fixed step. Actors at rest
    /// never appear here.
    pub(crate) fn interpolation_targets(&self, alpha: f32) -> Vec<(NodeHandle, Pose)> {
        let alpha = alpha.clamp(0.0, 1.0);
        self.interpolating
            .iter()
            .filter_map(|&key| {
                let handle = self.registry.get(key)?;
                let node = handle.node?;
                let samples = handle.samples.as_ref()?;
                Some((node, samples.blend(alpha)))
            })
            .collect()
    }

    /// Frees cooked meshes whose last reference dropped since the previous
    /// flush. Called at the frame boundary, never mid-step.
    pub(crate) fn flush_released_meshes(&mut self) {
        if let Some(engine) = self.engine.as_deref_mut() {
            self.cache.flush_released(engine);
        }
    }
}
