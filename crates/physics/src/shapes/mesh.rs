//! Static triangle mesh. Triangles are addressed by sub-shape id and indexed
//! by a bounding volume tree for ray casts and overlap queries.

use glam::Vec3;

use super::convex::TriangleShape;
use super::sub_shape_id::{bits_for_count, SubShapeId, SubShapeIdCreator};
use crate::broad_phase::DynamicTree;
use crate::error::PhysicsError;
use crate::types::Aabb;

/// Triangles thinner than this (twice the area) are dropped on creation.
const DEGENERATE_AREA: f32 = 1.0e-12;

#[derive(Clone, Debug)]
pub struct MeshShape {
    vertices: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
    tree: DynamicTree<u32>,
    bounds: Aabb,
    id_bits: u32,
}

impl MeshShape {
    pub fn new(vertices: Vec<Vec3>, triangles: &[[u32; 3]]) -> Result<Self, PhysicsError> {
        if triangles.is_empty() {
            return Err(PhysicsError::InvalidGeometry("mesh has no triangles"));
        }
        if vertices.iter().any(|v| !v.is_finite()) {
            return Err(PhysicsError::InvalidGeometry("mesh vertex is not finite"));
        }
        let mut kept = Vec::with_capacity(triangles.len());
        for tri in triangles {
            if tri.iter().any(|&i| i as usize >= vertices.len()) {
                return Err(PhysicsError::InvalidGeometry("mesh triangle index out of range"));
            }
            let [a, b, c] = tri.map(|i| vertices[i as usize]);
            if (b - a).cross(c - a).length_squared() > DEGENERATE_AREA {
                kept.push(*tri);
            }
        }
        if kept.is_empty() {
            return Err(PhysicsError::InvalidGeometry("mesh has only degenerate triangles"));
        }

        let mut tree = DynamicTree::new(0.0);
        let mut bounds = Aabb::EMPTY;
        for (index, tri) in kept.iter().enumerate() {
            let aabb = Aabb::from_points(tri.map(|i| vertices[i as usize]));
            bounds = bounds.union(aabb);
            tree.insert(aabb, u32::try_from(index).unwrap_or(u32::MAX));
        }
        tree.optimize();

        Ok(Self {
            id_bits: bits_for_count(kept.len()),
            vertices,
            triangles: kept,
            tree,
            bounds,
        })
    }

    #[must_use]
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    #[must_use]
    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    #[must_use]
    pub fn local_bounds(&self) -> Aabb {
        self.bounds
    }

    /// Bits this mesh adds to a sub-shape id.
    #[must_use]
    pub fn id_bits(&self) -> u32 {
        self.id_bits
    }

    #[must_use]
    pub fn triangle(&self, index: u32) -> Option<TriangleShape> {
        self.triangles.get(index as usize).map(|tri| TriangleShape {
            vertices: tri.map(|i| self.vertices[i as usize]),
        })
    }

    /// Resolves the triangle a sub-shape id points at.
    #[must_use]
    pub fn triangle_for_id(&self, id: SubShapeId) -> Option<TriangleShape> {
        let (index, _) = id.pop(self.id_bits);
        self.triangle(index)
    }

    /// Closest hit along the ray, both faces of a triangle count.
    #[must_use]
    pub fn cast_ray(&self, origin: Vec3, direction: Vec3, max_fraction: f32, creator: SubShapeIdCreator) -> Option<(f32, SubShapeId)> {
        let mut best: Option<(f32, SubShapeId)> = None;
        self.tree.cast_ray(origin, direction, max_fraction, |index, _entry| {
            let tri = self.triangle(index)?;
            let limit = best.map_or(max_fraction, |b| b.0);
            let t = ray_triangle(origin, direction, &tri.vertices, limit)?;
            best = Some((t, creator.push(index, self.id_bits).id()));
            Some(t)
        });
        best
    }

    /// Visits every triangle whose bounds overlap `aabb` (mesh local space).
    pub fn for_each_triangle(&self, aabb: &Aabb, creator: SubShapeIdCreator, mut visit: impl FnMut(TriangleShape, SubShapeId)) {
        let mut hits = Vec::new();
        self.tree.query(aabb, |_, index| hits.push(index));
        // Tree order depends on insertion history; sort for stable output.
        hits.sort_unstable();
        for index in hits {
            if let Some(tri) = self.triangle(index) {
                visit(tri, creator.push(index, self.id_bits).id());
            }
        }
    }
}

/// Möller-Trumbore, double sided. Returns the hit fraction in `[0, max_fraction]`.
pub(crate) fn ray_triangle(origin: Vec3, direction: Vec3, [a, b, c]: &[Vec3; 3], max_fraction: f32) -> Option<f32> {
    let e1 = *b - *a;
    let e2 = *c - *a;
    let p = direction.cross(e2);
    let det = e1.dot(p);
    if det.abs() < 1.0e-12 {
        return None;
    }
    let inv = 1.0 / det;
    let s = origin - *a;
    let u = s.dot(p) * inv;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = direction.dot(q) * inv;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv;
    (0.0..=max_fraction).contains(&t).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: u32) -> MeshShape {
        let mut vertices = Vec::new();
        for z in 0..=n {
            for x in 0..=n {
                #[allow(clippy::cast_precision_loss)]
                vertices.push(Vec3::new(x as f32, 0.0, z as f32));
            }
        }
        let mut triangles = Vec::new();
        for z in 0..n {
            for x in 0..n {
                let i = z * (n + 1) + x;
                triangles.push([i, i + n + 1, i + 1]);
                triangles.push([i + 1, i + n + 1, i + n + 2]);
            }
        }
        MeshShape::new(vertices, &triangles).unwrap()
    }

    #[test]
    fn ray_reports_triangle_id() {
        let mesh = grid(4);
        let (t, id) = mesh
            .cast_ray(Vec3::new(2.25, 1.0, 1.5), Vec3::new(0.0, -2.0, 0.0), 1.0, SubShapeIdCreator::new())
            .unwrap();
        assert!((t - 0.5).abs() < 1e-6);
        let tri = mesh.triangle_for_id(id).unwrap();
        assert!(ray_triangle(Vec3::new(2.25, 1.0, 1.5), Vec3::new(0.0, -2.0, 0.0), &tri.vertices, 1.0).is_some());
    }

    #[test]
    fn invalid_meshes_rejected() {
        let v = vec![Vec3::ZERO, Vec3::X, Vec3::Z];
        assert!(MeshShape::new(v.clone(), &[]).is_err());
        assert!(MeshShape::new(v.clone(), &[[0, 1, 5]]).is_err());
        assert!(MeshShape::new(v, &[[0, 0, 1]]).is_err());
    }

    #[test]
    fn overlap_query_finds_local_triangles() {
        let mesh = grid(8);
        let mut found = Vec::new();
        let query = Aabb::new(Vec3::new(0.1, -1.0, 0.1), Vec3::new(0.9, 1.0, 0.9));
        mesh.for_each_triangle(&query, SubShapeIdCreator::new(), |_, id| found.push(id));
        assert_eq!(found.len(), 2);
        assert_eq!(mesh.id_bits(), 7);
    }
}
