//! Transform matrix export for renderers
//!
//! Converts body poses (world position + rotation) into column major 4x4
//! matrices that can be copied straight into a GPU buffer.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};

use crate::body::BodyId;
use crate::simulation::PhysicsSystem;
use crate::types::{to_f32, RVec3};

/// Pose of one body as a column major matrix.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct BodyTransform {
    pub matrix: [[f32; 4]; 4],
    pub body_id: BodyId,
}

/// Convert position and rotation to a 4x4 transformation matrix
#[must_use]
pub fn to_transform_matrix(position: Vec3, rotation: Quat) -> [[f32; 4]; 4] {
    Mat4::from_rotation_translation(rotation, position).to_cols_array_2d()
}

/// Same as [`to_transform_matrix`] with a scale applied before rotating.
#[must_use]
pub fn to_transform_matrix_scaled(position: Vec3, rotation: Quat, scale: Vec3) -> [[f32; 4]; 4] {
    Mat4::from_scale_rotation_translation(scale, rotation, position).to_cols_array_2d()
}

impl PhysicsSystem {
    /// Matrices of all bodies in id order. Translations are relative to
    /// `origin` so large worlds stay precise in single precision.
    #[must_use]
    pub fn body_transforms(&self, origin: RVec3) -> Vec<BodyTransform> {
        self.bodies
            .body_ids()
            .into_iter()
            .filter_map(|id| {
                let body = self.bodies.lock_read(id)?;
                Some(BodyTransform {
                    matrix: to_transform_matrix(to_f32(body.position() - origin), body.rotation()),
                    body_id: id,
                })
            })
            .collect()
    }
}
