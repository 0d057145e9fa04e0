//! Collision geometry cooking.
//!
//! Cooked triangle meshes are expensive native resources that many collider
//! nodes may share (e.g. every instance of the same model). The cache keys
//! cooked meshes by a content hash of the source geometry and hands out
//! refcounted [`CookedMeshRef`] guards; the native mesh is queued for
//! release when the last guard drops and actually freed by
//! [`MeshCache::flush_released`] at the frame boundary, where the engine is
//! safe to mutate.
//!
//! Geometry that feeds a collider may arrive asynchronously (model loads).
//! [`GeometryTicket`] carries the delivery channel plus a cancellation
//! token; a node destroyed mid-load cancels its token so the late result is
//! discarded instead of mounting onto a dead node.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::Vec3;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::Xxh3;

use crate::errors::Result;
use crate::physics::native::{NativeEngine, NativeMeshId};

// ============================================================================
// Source geometry
// ============================================================================

/// Triangle geometry ready for cooking.
#[derive(Debug, Clone, Default)]
pub struct CookedGeometry {
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl CookedGeometry {
    #[must_use]
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self { positions, indices }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.indices.is_empty()
    }

    /// Content hash used as the cache key.
    #[must_use]
    pub fn content_hash(&self) -> u64 {
        let mut hasher = Xxh3::new();
        hasher.update(bytemuck::cast_slice(&self.positions));
        hasher.update(bytemuck::cast_slice(&self.indices));
        hasher.digest()
    }
}

// ============================================================================
// Async delivery
// ============================================================================

/// Cancellation token shared between a pending load and its owning node.
#[derive(Debug, Clone, Default)]
pub struct LoadToken(Arc<AtomicBool>);

impl LoadToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Receiving half of an in-flight geometry load.
#[derive(Debug)]
pub struct GeometryTicket {
    receiver: flume::Receiver<CookedGeometry>,
    token: LoadToken,
}

impl GeometryTicket {
    /// Non-blocking poll. Returns the geometry once it arrived, or `None`
    /// while still in flight. A cancelled ticket swallows the result.
    pub fn poll(&self) -> Option<CookedGeometry> {
        match self.receiver.try_recv() {
            Ok(geometry) if !self.token.is_cancelled() => Some(geometry),
            Ok(_) => {
                log::debug!("discarding geometry load result for cancelled ticket");
                None
            }
            Err(_) => None,
        }
    }

    #[must_use]
    pub fn token(&self) -> &LoadToken {
        &self.token
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Sending half handed to whatever loads the model data.
#[derive(Debug, Clone)]
pub struct GeometrySender {
    sender: flume::Sender<CookedGeometry>,
}

impl GeometrySender {
    /// Delivers the loaded geometry. Errors (receiver gone) are ignored —
    /// the owning node was destroyed and nobody is listening.
    pub fn send(&self, geometry: CookedGeometry) {
        let _ = self.sender.send(geometry);
    }
}

/// Creates the channel pair for one asynchronous geometry load.
#[must_use]
pub fn geometry_channel() -> (GeometrySender, GeometryTicket) {
    let (sender, receiver) = flume::bounded(1);
    (
        GeometrySender { sender },
        GeometryTicket {
            receiver,
            token: LoadToken::new(),
        },
    )
}

// ============================================================================
// Refcounted mesh cache
// ============================================================================

struct CacheEntry {
    mesh: NativeMeshId,
    refs: u32,
}

#[derive(Default)]
struct CacheInner {
    entries: FxHashMap<u64, CacheEntry>,
    /// Meshes whose refcount hit zero, awaiting engine release.
    released: Vec<NativeMeshId>,
}

/// Content-addressed cache of cooked collision meshes.
#[derive(Clone, Default)]
pub struct MeshCache {
    inner: Arc<Mutex<CacheInner>>,
}

impl MeshCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a guard for the cooked mesh of `geometry`, cooking through
    /// `engine` only on a cache miss.
    pub fn acquire(
        &self,
        engine: &mut dyn NativeEngine,
        geometry: &CookedGeometry,
    ) -> Result<CookedMeshRef> {
        let hash = geometry.content_hash();
        let mut inner = self.inner.lock();

        if let Some(entry) = inner.entries.get_mut(&hash) {
            entry.refs += 1;
            return Ok(CookedMeshRef {
                hash,
                mesh: entry.mesh,
                cache: Arc::clone(&self.inner),
            });
        }

        let mesh = engine.cook_mesh(&geometry.positions, &geometry.indices)?;
        inner.entries.insert(hash, CacheEntry { mesh, refs: 1 });
        log::debug!("cooked collision mesh {mesh:?} (hash {hash:#018x})");

        Ok(CookedMeshRef {
            hash,
            mesh,
            cache: Arc::clone(&self.inner),
        })
    }

    /// Frees every mesh whose last guard dropped since the previous flush.
    pub fn flush_released(&self, engine: &mut dyn NativeEngine) {
        let released: Vec<NativeMeshId> = {
            let mut inner = self.inner.lock();
            inner.released.drain(..).collect()
        };
        for mesh in released {
            log::debug!("releasing cooked collision mesh {mesh:?}");
            engine.release_mesh(mesh);
        }
    }

    /// Number of distinct cooked meshes currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

/// Refcount guard for one cooked mesh. Dropping the last guard queues the
/// native mesh for release at the next cache flush.
pub struct CookedMeshRef {
    hash: u64,
    mesh: NativeMeshId,
    cache: Arc<Mutex<CacheInner>>,
}

impl CookedMeshRef {
    #[inline]
    #[must_use]
    pub fn mesh(&self) -> NativeMeshId {
        self.mesh
    }
}

impl Clone for CookedMeshRef {
    fn clone(&self) -> Self {
        let mut inner = self.cache.lock();
        if let Some(entry) = inner.entries.get_mut(&self.hash) {
            entry.refs += 1;
        }
        Self {
            hash: self.hash,
            mesh: self.mesh,
            cache: Arc::clone(&self.cache),
        }
    }
}

impl Drop for CookedMeshRef {
    fn drop(&mut self) {
        let mut inner = self.cache.lock();
        let Some(entry) = inner.entries.get_mut(&self.hash) else {
            return;
        };
        entry.refs -= 1;
        if entry.refs == 0 {
            let mesh = entry.mesh;
            inner.entries.remove(&self.hash);
            inner.released.push(mesh);
        }
    }
}

impl std::fmt::Debug for CookedMeshRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookedMeshRef")
            .field("hash", &self.hash)
            .field("mesh", &self.mesh)
            .finish_non_exhaustive()
    }
}
