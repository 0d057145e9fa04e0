//! Scene graph module.
//!
//! Manages the node hierarchy and its lifecycle:
//! - Node: scene node (hierarchy links, transform, per-kind resource)
//! - Transform: TRS component with matrix caches and change detection
//! - Scene: the tree container owning the dirty propagation set
//! - lifecycle: mount/unmount cascades and the clean pass

pub mod access;
pub mod dirty;
pub(crate) mod lifecycle;
pub mod node;
pub mod scene;
pub mod transform;

pub use access::NodeMut;
pub use node::{
    ColliderConfig, ColliderNode, ColliderShape, ControllerConfig, ControllerNode, GeometrySource,
    JointConfig, JointNode, MeshNode, Node, NodeKind, RigidBodyConfig, RigidBodyNode,
};
pub use scene::Scene;
pub use transform::Transform;

use slotmap::new_key_type;

new_key_type! {
    /// Stable key for one scene node.
    pub struct NodeHandle;
}
