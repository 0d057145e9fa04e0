#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod errors;
pub mod physics;
pub mod render;
pub mod scene;
pub mod utils;
pub mod world;

pub use errors::{Result, VeldError};
pub use physics::{
    ActorKey, ActorMotion, CollisionLayer, ContactEvent, CookedGeometry, GeometrySender,
    GeometryTicket, LoadToken, NativeEngine, NativeScene, Physics, Pose, SceneDesc, TriggerEvent,
};
pub use render::{GeometryId, MaterialId, MeshDesc, NullRenderer, RenderBackend, RenderInstance, ShadowFlags};
pub use scene::{
    ColliderConfig, ColliderShape, ControllerConfig, GeometrySource, JointConfig, Node, NodeHandle,
    NodeKind, NodeMut, RigidBodyConfig, Scene, Transform,
};
pub use utils::{FixedTimestep, Timer};
pub use world::World;
