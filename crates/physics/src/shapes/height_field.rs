//! Square grid of height samples over the local XZ plane. The grid is
//! triangulated once and collides through the mesh path; the two triangles of
//! cell `(x, z)` have sub-shape indices `2 * (z * cells + x)` and the one
//! after it.

use glam::Vec3;

use super::mesh::MeshShape;
use super::sub_shape_id::SubShapeId;
use crate::error::PhysicsError;

/// Largest number of samples along one side.
pub const MAX_HEIGHT_FIELD_SAMPLES: u32 = 1 << 15;

#[derive(Clone, Debug)]
pub struct HeightFieldShape {
    sample_count: u32,
    offset: Vec3,
    scale: Vec3,
    heights: Vec<f32>,
    pub(super) mesh: MeshShape,
}

impl HeightFieldShape {
    /// `heights` holds `sample_count²` samples, row by row along +Z. Sample
    /// `(x, z)` sits at `offset + scale * (x, height, z)`.
    pub fn new(heights: Vec<f32>, sample_count: u32, offset: Vec3, scale: Vec3) -> Result<Self, PhysicsError> {
        if !(2..=MAX_HEIGHT_FIELD_SAMPLES).contains(&sample_count) {
            return Err(PhysicsError::InvalidGeometry("height field needs 2 to 32768 samples per side"));
        }
        let n = sample_count as usize;
        if heights.len() != n * n {
            return Err(PhysicsError::InvalidGeometry("height field sample count does not match"));
        }
        if heights.iter().any(|h| !h.is_finite()) || !offset.is_finite() {
            return Err(PhysicsError::InvalidGeometry("height field sample is not finite"));
        }
        if !scale.is_finite() || scale.min_element() <= 0.0 {
            return Err(PhysicsError::InvalidGeometry("height field scale must be positive"));
        }

        let mut vertices = Vec::with_capacity(heights.len());
        for z in 0..sample_count {
            for x in 0..sample_count {
                let h = heights[z as usize * n + x as usize];
                vertices.push(offset + scale * Vec3::new(x as f32, h, z as f32));
            }
        }
        let cells = sample_count - 1;
        let mut triangles = Vec::with_capacity(2 * (cells as usize) * (cells as usize));
        for z in 0..cells {
            for x in 0..cells {
                let i0 = z * sample_count + x;
                let i1 = i0 + 1;
                let i2 = i0 + sample_count;
                let i3 = i2 + 1;
                triangles.push([i0, i2, i1]);
                triangles.push([i1, i2, i3]);
            }
        }

        Ok(Self {
            mesh: MeshShape::new(vertices, &triangles)?,
            sample_count,
            offset,
            scale,
            heights,
        })
    }

    #[must_use]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    #[must_use]
    pub fn mesh(&self) -> &MeshShape {
        &self.mesh
    }

    /// Local height of sample `(x, z)`.
    #[must_use]
    pub fn height(&self, x: u32, z: u32) -> Option<f32> {
        if x >= self.sample_count || z >= self.sample_count {
            return None;
        }
        let h = self.heights[(z * self.sample_count + x) as usize];
        Some(self.offset.y + self.scale.y * h)
    }

    /// Grid cell `(x, z)` containing the triangle `id` points at.
    #[must_use]
    pub fn cell_of(&self, id: SubShapeId) -> Option<(u32, u32)> {
        let (index, _) = id.pop(self.mesh.id_bits());
        let cells = self.sample_count - 1;
        let cell = index / 2;
        (cell < cells * cells).then(|| (cell % cells, cell / cells))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::SubShapeIdCreator;

    /// 3 x 3 samples, one meter apart, with a bump in the middle.
    fn bump() -> HeightFieldShape {
        let heights = vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        HeightFieldShape::new(heights, 3, Vec3::new(-1.0, 0.0, -1.0), Vec3::ONE).unwrap()
    }

    #[test]
    fn grid_becomes_two_triangles_per_cell() {
        let field = bump();
        assert_eq!(field.mesh().triangles().len(), 8);
        assert_eq!(field.height(1, 1), Some(1.0));
        assert_eq!(field.height(3, 0), None);
        let bounds = field.mesh().local_bounds();
        assert_eq!(bounds.min, Vec3::new(-1.0, 0.0, -1.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 1.0, 1.0));
        // every triangle faces up
        for index in 0..8 {
            let [a, b, c] = field.mesh().triangle(index).unwrap().vertices;
            assert!((b - a).cross(c - a).y > 0.0);
        }
    }

    #[test]
    fn ray_hit_names_the_cell() {
        let field = bump();
        let (fraction, id) = field
            .mesh()
            .cast_ray(Vec3::new(0.25, 5.0, 0.25), Vec3::new(0.0, -10.0, 0.0), 1.0, SubShapeIdCreator::new())
            .unwrap();
        assert!((fraction - 0.45).abs() < 1e-5);
        assert_eq!(field.cell_of(id), Some((1, 1)));
    }

    #[test]
    fn bad_grids_are_rejected() {
        let invalid = |r: Result<HeightFieldShape, PhysicsError>| matches!(r, Err(PhysicsError::InvalidGeometry(_)));
        assert!(invalid(HeightFieldShape::new(vec![0.0], 1, Vec3::ZERO, Vec3::ONE)));
        assert!(invalid(HeightFieldShape::new(vec![0.0; 5], 2, Vec3::ZERO, Vec3::ONE)));
        assert!(invalid(HeightFieldShape::new(vec![0.0, f32::NAN, 0.0, 0.0], 2, Vec3::ZERO, Vec3::ONE)));
        assert!(invalid(HeightFieldShape::new(vec![0.0; 4], 2, Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0))));
    }
}
