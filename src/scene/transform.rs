//! Transform component.
//!
//! Wraps a node's position, rotation and scale (TRS) together with the
//! cached local and world matrices and the change-detection logic.
//!
//! # Change detection
//!
//! Instead of a hand-managed staleness flag, the component keeps a shadow
//! copy of the last TRS that produced `local_matrix`.
//! [`Transform::update_local_matrix`] compares against the shadow state and
//! only rebuilds the matrix when something actually changed, reporting
//! whether it did so the caller can decide whether the world matrix (and the
//! whole subtree below it) needs recomputing.
//!
//! # Rotation representations
//!
//! Rotation is stored both as a quaternion and as XYZ Euler angles. Writing
//! either recomputes the other, so downstream consumers always read a
//! consistent pair without knowing which one was last written.

use glam::{Affine3A, EulerRot, Mat4, Quat, Vec3};

/// Smallest representable scale component. Zero scale would make the local
/// matrix non-invertible, which breaks physics and billboard math that
/// inverts world matrices downstream.
pub const MIN_SCALE: f32 = 1e-6;

#[derive(Debug, Clone)]
pub struct Transform {
    // === TRS (written through setters so euler/quat stay in sync) ===
    pub(crate) position: Vec3,
    pub(crate) rotation: Quat,
    pub(crate) euler: Vec3,
    pub(crate) scale: Vec3,

    // === Matrix caches ===
    pub(crate) local_matrix: Affine3A,
    pub(crate) world_matrix: Affine3A,

    // === Shadow state for change detection ===
    last_position: Vec3,
    last_rotation: Quat,
    last_scale: Vec3,
    force_update: bool,
}

impl Transform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            euler: Vec3::ZERO,
            scale: Vec3::ONE,

            local_matrix: Affine3A::IDENTITY,
            world_matrix: Affine3A::IDENTITY,

            last_position: Vec3::ZERO,
            last_rotation: Quat::IDENTITY,
            last_scale: Vec3::ONE,
            force_update: true,
        }
    }

    // ========================================================================
    // Core logic: shadow-state update
    // ========================================================================

    /// Checks the shadow state and rebuilds the local matrix if needed.
    ///
    /// Returns `true` when the matrix was recomputed.
    pub fn update_local_matrix(&mut self) -> bool {
        let changed = self.position != self.last_position
            || self.rotation != self.last_rotation
            || self.scale != self.last_scale
            || self.force_update;

        if changed {
            self.local_matrix = Affine3A::from_scale_rotation_translation(
                clamp_scale(self.scale),
                self.rotation,
                self.position,
            );

            self.last_position = self.position;
            self.last_rotation = self.rotation;
            self.last_scale = self.scale;
            self.force_update = false;
        }

        changed
    }

    /// Manually forces the next [`update_local_matrix`](Self::update_local_matrix)
    /// to rebuild, e.g. after reparenting.
    pub fn mark_changed(&mut self) {
        self.force_update = true;
    }

    // ========================================================================
    // TRS accessors
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    pub(crate) fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    #[inline]
    #[must_use]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Sets the quaternion rotation and resynchronizes the Euler angles.
    pub(crate) fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        let (x, y, z) = rotation.to_euler(EulerRot::XYZ);
        self.euler = Vec3::new(x, y, z);
    }

    /// XYZ Euler angles in radians, consistent with [`rotation`](Self::rotation).
    #[inline]
    #[must_use]
    pub fn euler(&self) -> Vec3 {
        self.euler
    }

    /// Sets the Euler angles (XYZ order, radians) and resynchronizes the
    /// quaternion.
    pub(crate) fn set_euler(&mut self, euler: Vec3) {
        self.euler = euler;
        self.rotation = Quat::from_euler(EulerRot::XYZ, euler.x, euler.y, euler.z);
    }

    #[inline]
    #[must_use]
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    #[inline]
    pub(crate) fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
    }

    // ========================================================================
    // Matrix accessors
    // ========================================================================

    /// The cached local matrix. Valid after the last
    /// [`update_local_matrix`](Self::update_local_matrix).
    #[inline]
    #[must_use]
    pub fn local_matrix(&self) -> &Affine3A {
        &self.local_matrix
    }

    /// The cached world matrix. Reading does not force a clean pass; callers
    /// needing guaranteed freshness must run one first.
    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.world_matrix
    }

    /// World matrix as `Mat4`, for handing to the render backend.
    #[inline]
    #[must_use]
    pub fn world_matrix_as_mat4(&self) -> Mat4 {
        Mat4::from(self.world_matrix)
    }

    /// World-space position, copied out of the cached world matrix.
    #[inline]
    #[must_use]
    pub fn world_position(&self) -> Vec3 {
        self.world_matrix.translation.into()
    }

    /// Decomposes the cached world matrix into `(scale, rotation, position)`.
    #[must_use]
    pub fn world_decomposed(&self) -> (Vec3, Quat, Vec3) {
        self.world_matrix.to_scale_rotation_translation()
    }

    /// Written by the clean pass after the parent chain resolved.
    pub(crate) fn set_world_matrix(&mut self, mat: Affine3A) {
        self.world_matrix = mat;
    }

    // ========================================================================
    // Simulation write-back
    // ========================================================================

    /// Applies a simulation-authoritative pose without going through the
    /// user mutation path.
    ///
    /// The shadow state is synchronized to the written values, so the next
    /// [`update_local_matrix`](Self::update_local_matrix) reports no change
    /// and nothing re-enters the dirty propagation machinery. The local
    /// matrix is rebuilt immediately so the caller can propagate world
    /// matrices right away.
    pub(crate) fn write_simulated_pose(&mut self, position: Vec3, rotation: Quat) {
        self.position = position;
        self.set_rotation(rotation);

        self.local_matrix = Affine3A::from_scale_rotation_translation(
            clamp_scale(self.scale),
            self.rotation,
            self.position,
        );

        self.last_position = self.position;
        self.last_rotation = self.rotation;
        self.last_scale = self.scale;
        self.force_update = false;
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

/// Clamps near-zero scale components to [`MIN_SCALE`], preserving sign.
fn clamp_scale(scale: Vec3) -> Vec3 {
    Vec3::new(
        clamp_component(scale.x),
        clamp_component(scale.y),
        clamp_component(scale.z),
    )
}

#[inline]
fn clamp_component(v: f32) -> f32 {
    if v.abs() < MIN_SCALE {
        if v.is_sign_negative() { -MIN_SCALE } else { MIN_SCALE }
    } else {
        v
    }
}
