//! Renderer Boundary
//!
//! The engine core does not render anything itself. Mesh nodes hand their
//! world matrices to a [`RenderBackend`] through this narrow interface and
//! keep the returned [`RenderInstance`] alive for as long as they are
//! mounted.
//!
//! Geometry and material contents are opaque to the core — they are plain
//! ids resolved by whichever backend is plugged in.

use glam::Mat4;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Opaque handle to geometry data owned by the render backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryId(pub u64);

impl GeometryId {
    /// Allocates a fresh process-unique geometry id.
    #[must_use]
    pub fn next() -> Self {
        Self(next_id())
    }
}

/// Opaque handle to a material owned by the render backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u64);

impl MaterialId {
    /// Allocates a fresh process-unique material id.
    #[must_use]
    pub fn next() -> Self {
        Self(next_id())
    }
}

bitflags! {
    /// Shadow participation flags passed through to the backend.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ShadowFlags: u32 {
        const CAST    = 1 << 0;
        const RECEIVE = 1 << 1;
    }
}

impl Default for ShadowFlags {
    fn default() -> Self {
        ShadowFlags::CAST | ShadowFlags::RECEIVE
    }
}

/// Everything the backend needs to insert one renderable.
#[derive(Debug, Clone, Copy)]
pub struct MeshDesc {
    pub geometry: GeometryId,
    pub material: MaterialId,
    pub shadows: ShadowFlags,
}

/// A live renderable owned by a mounted mesh node.
///
/// `set_matrix` is called from the clean pass whenever the node's world
/// matrix changed; `destroy` is called exactly once, on unmount, before the
/// instance is dropped.
pub trait RenderInstance {
    fn set_matrix(&mut self, matrix: Mat4);
    fn destroy(&mut self);
}

/// The consumed rendering interface.
pub trait RenderBackend {
    /// Inserts a renderable at the given world matrix and returns the live
    /// instance. The core never inspects the instance beyond the trait.
    fn insert(&mut self, desc: &MeshDesc, matrix: Mat4) -> Box<dyn RenderInstance>;
}

// ============================================================================
// Null backend
// ============================================================================

/// Backend that discards everything. Used for headless worlds and tests
/// that only exercise the scene graph.
#[derive(Debug, Default)]
pub struct NullRenderer;

struct NullInstance;

impl RenderInstance for NullInstance {
    fn set_matrix(&mut self, _matrix: Mat4) {}
    fn destroy(&mut self) {}
}

impl RenderBackend for NullRenderer {
    fn insert(&mut self, _desc: &MeshDesc, _matrix: Mat4) -> Box<dyn RenderInstance> {
        Box::new(NullInstance)
    }
}
