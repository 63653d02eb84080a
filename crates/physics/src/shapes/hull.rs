//! Convex hull built from a point cloud.
//!
//! Faces are found by brute force over point triples, which is fine for the
//! small point counts hulls are limited to. Each face keeps its vertices in
//! counter clockwise order seen from outside.

use glam::{Mat3, Vec3};

use super::convex::ConvexShape;
use super::mass::{self, MassProperties};
use crate::error::PhysicsError;
use crate::types::Aabb;

/// Largest point cloud accepted by [`ConvexHullShape::new`].
pub const MAX_HULL_POINTS: usize = 64;

const PLANE_TOLERANCE: f32 = 1.0e-4;

#[derive(Clone, Debug, PartialEq)]
pub struct HullFace {
    pub normal: Vec3,
    /// Plane offset: `normal.dot(p) == distance` for points on the face.
    pub distance: f32,
    /// Indices into [`ConvexHullShape::points`].
    pub vertices: Vec<u16>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConvexHullShape {
    points: Vec<Vec3>,
    faces: Vec<HullFace>,
    density: f32,
    volume: f32,
    center_of_mass: Vec3,
    unit_inertia: Mat3,
}

impl ConvexHullShape {
    /// Builds the hull of `input`. Interior points are discarded.
    pub fn new(input: &[Vec3], density: f32) -> Result<Self, PhysicsError> {
        if input.len() < 3 {
            return Err(PhysicsError::InvalidGeometry("convex hull needs at least 3 points"));
        }
        if input.len() > MAX_HULL_POINTS {
            return Err(PhysicsError::InvalidGeometry("too many convex hull points"));
        }
        if input.iter().any(|p| !p.is_finite()) {
            return Err(PhysicsError::InvalidGeometry("convex hull point is not finite"));
        }

        let mut unique: Vec<Vec3> = Vec::with_capacity(input.len());
        for &p in input {
            if !unique.iter().any(|q| q.distance_squared(p) < PLANE_TOLERANCE * PLANE_TOLERANCE) {
                unique.push(p);
            }
        }

        let planes = find_planes(&unique);
        if planes.len() < 4 {
            return Err(PhysicsError::InvalidGeometry("convex hull points are coplanar"));
        }

        let mut points: Vec<Vec3> = Vec::new();
        let mut faces = Vec::with_capacity(planes.len());
        for (normal, distance) in planes {
            let on_plane: Vec<Vec3> = unique
                .iter()
                .copied()
                .filter(|p| (normal.dot(*p) - distance).abs() <= PLANE_TOLERANCE)
                .collect();
            let polygon = planar_hull(&on_plane, normal);
            if polygon.len() < 3 {
                continue;
            }
            let vertices = polygon
                .into_iter()
                .map(|p| {
                    let index = points.iter().position(|q| *q == p).unwrap_or_else(|| {
                        points.push(p);
                        points.len() - 1
                    });
                    u16::try_from(index).unwrap_or(u16::MAX)
                })
                .collect();
            faces.push(HullFace { normal, distance, vertices });
        }

        let reference = points.iter().copied().sum::<Vec3>() / points.len() as f32;
        let pts = &points;
        let triangles = faces.iter().flat_map(|f| {
            let v = &f.vertices;
            (1..v.len() - 1).map(move |i| [pts[v[0] as usize], pts[v[i] as usize], pts[v[i + 1] as usize]])
        });
        let (volume, center_of_mass, unit_inertia) = mass::closed_mesh(triangles, reference);
        if volume <= 0.0 {
            return Err(PhysicsError::InvalidGeometry("convex hull has no volume"));
        }

        Ok(Self {
            points,
            faces,
            density,
            volume,
            center_of_mass,
            unit_inertia,
        })
    }

    #[must_use]
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    #[must_use]
    pub fn faces(&self) -> &[HullFace] {
        &self.faces
    }

    #[must_use]
    pub fn volume(&self) -> f32 {
        self.volume
    }

    #[must_use]
    pub fn center_of_mass(&self) -> Vec3 {
        self.center_of_mass
    }

    #[must_use]
    pub fn local_bounds(&self) -> Aabb {
        Aabb::from_points(self.points.iter().copied())
    }

    #[must_use]
    pub fn mass_properties(&self) -> MassProperties {
        MassProperties::new(self.volume * self.density, self.unit_inertia * self.density)
    }

    /// Distance from the center of mass to the closest face.
    #[must_use]
    pub fn inner_radius(&self) -> f32 {
        self.faces
            .iter()
            .map(|f| f.distance - f.normal.dot(self.center_of_mass))
            .fold(f32::MAX, f32::min)
            .max(0.0)
    }

    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.faces.iter().all(|f| f.normal.dot(point) - f.distance <= PLANE_TOLERANCE)
    }

    #[must_use]
    pub fn surface_normal(&self, point: Vec3) -> Vec3 {
        self.faces
            .iter()
            .max_by(|a, b| {
                let da = a.normal.dot(point) - a.distance;
                let db = b.normal.dot(point) - b.distance;
                da.total_cmp(&db)
            })
            .map_or(Vec3::Y, |f| f.normal)
    }

    /// Clips the ray against every face plane.
    #[must_use]
    pub fn cast_ray(&self, origin: Vec3, direction: Vec3, max_fraction: f32) -> Option<f32> {
        let mut t_enter = 0.0_f32;
        let mut t_exit = max_fraction;
        for face in &self.faces {
            let dist = face.normal.dot(origin) - face.distance;
            let denom = face.normal.dot(direction);
            if denom.abs() < 1.0e-12 {
                if dist > 0.0 {
                    return None;
                }
                continue;
            }
            let t = -dist / denom;
            if denom < 0.0 {
                t_enter = t_enter.max(t);
            } else {
                t_exit = t_exit.min(t);
            }
            if t_enter > t_exit {
                return None;
            }
        }
        Some(t_enter)
    }

    fn face_vertices(&self, face: &HullFace) -> Vec<Vec3> {
        face.vertices.iter().map(|&i| self.points[i as usize]).collect()
    }
}

impl ConvexShape for ConvexHullShape {
    fn support_core(&self, direction: Vec3) -> Vec3 {
        self.points
            .iter()
            .copied()
            .max_by(|a, b| a.dot(direction).total_cmp(&b.dot(direction)))
            .unwrap_or(Vec3::ZERO)
    }

    fn convex_radius(&self) -> f32 {
        0.0
    }

    fn supporting_face(&self, direction: Vec3) -> Vec<Vec3> {
        self.faces
            .iter()
            .max_by(|a, b| a.normal.dot(direction).total_cmp(&b.normal.dot(direction)))
            .map(|f| self.face_vertices(f))
            .unwrap_or_default()
    }
}

/// All distinct supporting planes through three or more of `points`.
fn find_planes(points: &[Vec3]) -> Vec<(Vec3, f32)> {
    let mut planes: Vec<(Vec3, f32)> = Vec::new();
    let n = points.len();
    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                let Some(normal) = (points[j] - points[i]).cross(points[k] - points[i]).try_normalize() else {
                    continue;
                };
                let d = normal.dot(points[i]);
                let mut above = false;
                let mut below = false;
                for p in points {
                    let s = normal.dot(*p) - d;
                    above |= s > PLANE_TOLERANCE;
                    below |= s < -PLANE_TOLERANCE;
                }
                let plane = match (above, below) {
                    (false, _) => (normal, d),
                    (true, false) => (-normal, -d),
                    (true, true) => continue,
                };
                let duplicate = planes
                    .iter()
                    .any(|(pn, pd)| pn.dot(plane.0) > 1.0 - 1.0e-5 && (pd - plane.1).abs() <= PLANE_TOLERANCE);
                if !duplicate {
                    planes.push(plane);
                }
            }
        }
    }
    planes
}

/// Andrew's monotone chain on points projected onto the plane with `normal`.
/// Output is counter clockwise seen from the side `normal` points to.
fn planar_hull(points: &[Vec3], normal: Vec3) -> Vec<Vec3> {
    let u = normal.any_orthogonal_vector().normalize();
    let v = normal.cross(u);
    let mut projected: Vec<(f32, f32, Vec3)> = points.iter().map(|p| (p.dot(u), p.dot(v), *p)).collect();
    projected.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    if projected.len() < 3 {
        return projected.into_iter().map(|p| p.2).collect();
    }
    let cross = |o: &(f32, f32, Vec3), a: &(f32, f32, Vec3), b: &(f32, f32, Vec3)| {
        (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
    };
    let mut hull: Vec<(f32, f32, Vec3)> = Vec::with_capacity(projected.len() * 2);
    for pass in 0..2 {
        let start = hull.len();
        let iter: Box<dyn Iterator<Item = &(f32, f32, Vec3)>> = if pass == 0 {
            Box::new(projected.iter())
        } else {
            Box::new(projected.iter().rev())
        };
        for p in iter {
            while hull.len() >= start + 2 && cross(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= 1.0e-9 {
                hull.pop();
            }
            hull.push(*p);
        }
        hull.pop();
    }
    hull.into_iter().map(|p| p.2).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_points() -> Vec<Vec3> {
        let mut pts = Vec::new();
        for x in [-1.0, 1.0] {
            for y in [-1.0, 1.0] {
                for z in [-1.0, 1.0] {
                    pts.push(Vec3::new(x, y, z));
                }
            }
        }
        pts
    }

    #[test]
    fn cube_hull_has_six_faces() {
        let mut pts = cube_points();
        pts.push(Vec3::ZERO);
        pts.push(Vec3::new(0.5, 0.5, 1.0));
        let hull = ConvexHullShape::new(&pts, 1.0).unwrap();
        assert_eq!(hull.faces().len(), 6);
        assert_eq!(hull.points().len(), 8);
        assert!((hull.volume() - 8.0).abs() < 1e-3);
        assert!(hull.center_of_mass().length() < 1e-4);
        assert!((hull.inner_radius() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn faces_wind_outward() {
        let hull = ConvexHullShape::new(&cube_points(), 1.0).unwrap();
        for face in hull.faces() {
            let v = hull.face_vertices(face);
            let n = (v[1] - v[0]).cross(v[2] - v[0]);
            assert!(n.dot(face.normal) > 0.0);
        }
    }

    #[test]
    fn degenerate_inputs_rejected() {
        let two = [Vec3::ZERO, Vec3::X];
        assert!(ConvexHullShape::new(&two, 1.0).is_err());
        let flat = [Vec3::ZERO, Vec3::X, Vec3::Z, Vec3::new(1.0, 0.0, 1.0)];
        assert!(matches!(
            ConvexHullShape::new(&flat, 1.0),
            Err(PhysicsError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn ray_hits_face() {
        let hull = ConvexHullShape::new(&cube_points(), 1.0).unwrap();
        let t = hull.cast_ray(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, -8.0, 0.0), 1.0).unwrap();
        assert!((t - 0.5).abs() < 1e-5);
        assert!(hull.cast_ray(Vec3::new(3.0, 5.0, 0.0), Vec3::new(0.0, -8.0, 0.0), 1.0).is_none());
        assert_eq!(hull.surface_normal(Vec3::new(0.1, 0.99, 0.0)), Vec3::Y);
    }
}
