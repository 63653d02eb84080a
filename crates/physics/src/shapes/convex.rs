//! Convex primitives: sphere, box, capsule, cylinder and the mesh triangle.
//!
//! Each primitive is described as a core shape swept by a sphere of
//! `convex_radius`; collision detection works on the core and adds the radius
//! afterwards, which keeps shallow contacts out of the penetration solver.

use glam::Vec3;

use super::mass::{self, MassProperties};
use crate::types::Aabb;

/// Default rounding of box and cylinder edges.
pub const DEFAULT_CONVEX_RADIUS: f32 = 0.05;

/// Number of points used to approximate a cylinder cap.
const CYLINDER_CAP_POINTS: usize = 8;

/// Support mapping used by GJK/EPA and manifold generation. All vectors are
/// in the shape's local space.
pub trait ConvexShape: Sync {
    /// Furthest point of the core shape along `direction`.
    fn support_core(&self, direction: Vec3) -> Vec3;

    fn convex_radius(&self) -> f32;

    /// Furthest point of the full shape along `direction`.
    fn support(&self, direction: Vec3) -> Vec3 {
        self.support_core(direction) + direction.normalize_or_zero() * self.convex_radius()
    }

    /// Vertices of the face whose normal best matches `direction`. Empty for
    /// shapes without flat features in that direction.
    fn supporting_face(&self, direction: Vec3) -> Vec<Vec3>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct SphereShape {
    pub radius: f32,
    pub density: f32,
}

impl SphereShape {
    #[must_use]
    pub fn local_bounds(&self) -> Aabb {
        Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(self.radius))
    }

    #[must_use]
    pub fn mass_properties(&self) -> MassProperties {
        mass::sphere(self.radius, self.density)
    }

    #[must_use]
    pub fn cast_ray(&self, origin: Vec3, direction: Vec3, max_fraction: f32) -> Option<f32> {
        ray_sphere(origin, direction, Vec3::ZERO, self.radius, max_fraction)
    }

    #[must_use]
    pub fn surface_normal(&self, point: Vec3) -> Vec3 {
        point.try_normalize().unwrap_or(Vec3::Y)
    }
}

impl ConvexShape for SphereShape {
    fn support_core(&self, _direction: Vec3) -> Vec3 {
        Vec3::ZERO
    }

    fn convex_radius(&self) -> f32 {
        self.radius
    }

    fn supporting_face(&self, _direction: Vec3) -> Vec<Vec3> {
        Vec::new()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoxShape {
    pub half_extent: Vec3,
    pub convex_radius: f32,
    pub density: f32,
}

impl BoxShape {
    #[must_use]
    pub fn local_bounds(&self) -> Aabb {
        Aabb::from_center_half_extents(Vec3::ZERO, self.half_extent)
    }

    #[must_use]
    pub fn mass_properties(&self) -> MassProperties {
        mass::cuboid(self.half_extent, self.density)
    }

    #[must_use]
    pub fn cast_ray(&self, origin: Vec3, direction: Vec3, max_fraction: f32) -> Option<f32> {
        self.local_bounds().ray_entry(origin, direction, max_fraction)
    }

    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.abs().cmple(self.half_extent).all()
    }

    #[must_use]
    pub fn surface_normal(&self, point: Vec3) -> Vec3 {
        let gap = self.half_extent - point.abs();
        let axis = if gap.x <= gap.y && gap.x <= gap.z {
            0
        } else if gap.y <= gap.z {
            1
        } else {
            2
        };
        let mut n = Vec3::ZERO;
        n[axis] = if point[axis] < 0.0 { -1.0 } else { 1.0 };
        n
    }
}

impl ConvexShape for BoxShape {
    fn support_core(&self, direction: Vec3) -> Vec3 {
        let core = self.half_extent - Vec3::splat(self.convex_radius);
        Vec3::select(direction.cmplt(Vec3::ZERO), -core, core)
    }

    fn convex_radius(&self) -> f32 {
        self.convex_radius
    }

    fn supporting_face(&self, direction: Vec3) -> Vec<Vec3> {
        let abs = direction.abs();
        let axis = if abs.x >= abs.y && abs.x >= abs.z {
            0
        } else if abs.y >= abs.z {
            1
        } else {
            2
        };
        let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
        let sign = if direction[axis] < 0.0 { -1.0 } else { 1.0 };
        let h = self.half_extent;
        let corner = |su: f32, sv: f32| {
            let mut p = Vec3::ZERO;
            p[axis] = sign * h[axis];
            p[u] = su * h[u];
            p[v] = sv * h[v];
            p
        };
        let mut face = vec![corner(-1.0, -1.0), corner(1.0, -1.0), corner(1.0, 1.0), corner(-1.0, 1.0)];
        if sign < 0.0 {
            face.reverse();
        }
        face
    }
}

/// Capsule along the Y axis.
#[derive(Clone, Debug, PartialEq)]
pub struct CapsuleShape {
    pub half_height: f32,
    pub radius: f32,
    pub density: f32,
}

impl CapsuleShape {
    #[must_use]
    pub fn local_bounds(&self) -> Aabb {
        Aabb::from_center_half_extents(
            Vec3::ZERO,
            Vec3::new(self.radius, self.half_height + self.radius, self.radius),
        )
    }

    #[must_use]
    pub fn mass_properties(&self) -> MassProperties {
        mass::capsule(self.half_height, self.radius, self.density)
    }

    fn closest_on_axis(&self, point: Vec3) -> Vec3 {
        Vec3::new(0.0, point.y.clamp(-self.half_height, self.half_height), 0.0)
    }

    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        (point - self.closest_on_axis(point)).length_squared() <= self.radius * self.radius
    }

    #[must_use]
    pub fn surface_normal(&self, point: Vec3) -> Vec3 {
        (point - self.closest_on_axis(point)).try_normalize().unwrap_or(Vec3::X)
    }

    #[must_use]
    pub fn cast_ray(&self, origin: Vec3, direction: Vec3, max_fraction: f32) -> Option<f32> {
        if self.contains_point(origin) {
            return Some(0.0);
        }
        let top = Vec3::new(0.0, self.half_height, 0.0);
        let side = ray_cylinder_side(origin, direction, self.radius, self.half_height, max_fraction);
        let caps = [
            ray_sphere(origin, direction, top, self.radius, max_fraction),
            ray_sphere(origin, direction, -top, self.radius, max_fraction),
        ];
        side.into_iter().chain(caps.into_iter().flatten()).reduce(f32::min)
    }
}

impl ConvexShape for CapsuleShape {
    fn support_core(&self, direction: Vec3) -> Vec3 {
        Vec3::new(0.0, if direction.y < 0.0 { -self.half_height } else { self.half_height }, 0.0)
    }

    fn convex_radius(&self) -> f32 {
        self.radius
    }

    fn supporting_face(&self, direction: Vec3) -> Vec<Vec3> {
        let d = direction.normalize_or_zero();
        // Only the side of a capsule is flat enough to form a face.
        if d.y.abs() > 0.1 {
            return Vec::new();
        }
        let radial = Vec3::new(d.x, 0.0, d.z).normalize_or_zero() * self.radius;
        vec![
            Vec3::new(0.0, self.half_height, 0.0) + radial,
            Vec3::new(0.0, -self.half_height, 0.0) + radial,
        ]
    }
}

/// Cylinder along the Y axis.
#[derive(Clone, Debug, PartialEq)]
pub struct CylinderShape {
    pub half_height: f32,
    pub radius: f32,
    pub convex_radius: f32,
    pub density: f32,
}

impl CylinderShape {
    #[must_use]
    pub fn local_bounds(&self) -> Aabb {
        Aabb::from_center_half_extents(Vec3::ZERO, Vec3::new(self.radius, self.half_height, self.radius))
    }

    #[must_use]
    pub fn mass_properties(&self) -> MassProperties {
        mass::cylinder(self.half_height, self.radius, self.density)
    }

    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.y.abs() <= self.half_height && point.x * point.x + point.z * point.z <= self.radius * self.radius
    }

    #[must_use]
    pub fn surface_normal(&self, point: Vec3) -> Vec3 {
        let radial = Vec3::new(point.x, 0.0, point.z);
        let side_gap = self.radius - radial.length();
        let cap_gap = self.half_height - point.y.abs();
        if cap_gap < side_gap {
            Vec3::new(0.0, point.y.signum(), 0.0)
        } else {
            radial.try_normalize().unwrap_or(Vec3::X)
        }
    }

    #[must_use]
    pub fn cast_ray(&self, origin: Vec3, direction: Vec3, max_fraction: f32) -> Option<f32> {
        if self.contains_point(origin) {
            return Some(0.0);
        }
        let side = ray_cylinder_side(origin, direction, self.radius, self.half_height, max_fraction);
        let mut caps = None;
        if direction.y.abs() > 1.0e-12 {
            for y in [self.half_height, -self.half_height] {
                let t = (y - origin.y) / direction.y;
                if (0.0..=max_fraction).contains(&t) {
                    let p = origin + direction * t;
                    if p.x * p.x + p.z * p.z <= self.radius * self.radius {
                        caps = Some(caps.map_or(t, |c: f32| c.min(t)));
                    }
                }
            }
        }
        side.into_iter().chain(caps).reduce(f32::min)
    }
}

impl ConvexShape for CylinderShape {
    fn support_core(&self, direction: Vec3) -> Vec3 {
        let core_radius = self.radius - self.convex_radius;
        let core_half_height = self.half_height - self.convex_radius;
        let radial = Vec3::new(direction.x, 0.0, direction.z).normalize_or_zero() * core_radius;
        Vec3::new(radial.x, if direction.y < 0.0 { -core_half_height } else { core_half_height }, radial.z)
    }

    fn convex_radius(&self) -> f32 {
        self.convex_radius
    }

    fn supporting_face(&self, direction: Vec3) -> Vec<Vec3> {
        let d = direction.normalize_or_zero();
        let radial_dir = Vec3::new(d.x, 0.0, d.z);
        if d.y.abs() > radial_dir.length() {
            let y = if d.y < 0.0 { -self.half_height } else { self.half_height };
            let mut face: Vec<Vec3> = (0..CYLINDER_CAP_POINTS)
                .map(|i| {
                    #[allow(clippy::cast_precision_loss)]
                    let a = i as f32 * std::f32::consts::TAU / CYLINDER_CAP_POINTS as f32;
                    Vec3::new(a.cos() * self.radius, y, -a.sin() * self.radius)
                })
                .collect();
            if d.y < 0.0 {
                face.reverse();
            }
            face
        } else {
            let radial = radial_dir.normalize_or_zero() * self.radius;
            vec![
                Vec3::new(radial.x, self.half_height, radial.z),
                Vec3::new(radial.x, -self.half_height, radial.z),
            ]
        }
    }
}

/// A single mesh triangle, produced on the fly during collision detection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriangleShape {
    pub vertices: [Vec3; 3],
}

impl ConvexShape for TriangleShape {
    fn support_core(&self, direction: Vec3) -> Vec3 {
        let [a, b, c] = self.vertices;
        let (da, db, dc) = (a.dot(direction), b.dot(direction), c.dot(direction));
        if da >= db && da >= dc {
            a
        } else if db >= dc {
            b
        } else {
            c
        }
    }

    fn convex_radius(&self) -> f32 {
        0.0
    }

    fn supporting_face(&self, direction: Vec3) -> Vec<Vec3> {
        let [a, b, c] = self.vertices;
        let n = (b - a).cross(c - a);
        if n.dot(direction) >= 0.0 {
            vec![a, b, c]
        } else {
            vec![a, c, b]
        }
    }
}

/// Ray against a solid sphere. Rays starting inside hit at fraction 0.
pub(crate) fn ray_sphere(origin: Vec3, direction: Vec3, center: Vec3, radius: f32, max_fraction: f32) -> Option<f32> {
    let m = origin - center;
    let c = m.length_squared() - radius * radius;
    if c <= 0.0 {
        return Some(0.0);
    }
    let a = direction.length_squared();
    if a < 1.0e-12 {
        return None;
    }
    let b = m.dot(direction);
    if b > 0.0 {
        return None;
    }
    let disc = b * b - a * c;
    if disc < 0.0 {
        return None;
    }
    let t = (-b - disc.sqrt()) / a;
    (t <= max_fraction).then_some(t.max(0.0))
}

/// Ray against the open side of a Y aligned cylinder of the given height.
fn ray_cylinder_side(origin: Vec3, direction: Vec3, radius: f32, half_height: f32, max_fraction: f32) -> Option<f32> {
    let a = direction.x * direction.x + direction.z * direction.z;
    if a < 1.0e-12 {
        return None;
    }
    let b = origin.x * direction.x + origin.z * direction.z;
    let c = origin.x * origin.x + origin.z * origin.z - radius * radius;
    let disc = b * b - a * c;
    if disc < 0.0 {
        return None;
    }
    let t = (-b - disc.sqrt()) / a;
    if t < 0.0 || t > max_fraction {
        return None;
    }
    let y = origin.y + direction.y * t;
    (y.abs() <= half_height).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_support_includes_radius() {
        let b = BoxShape { half_extent: Vec3::new(1.0, 2.0, 3.0), convex_radius: 0.1, density: 1.0 };
        let s = b.support(Vec3::new(1.0, 0.0, 0.0));
        assert!((s.x - 1.0).abs() < 1e-6);
        let c = b.support_core(Vec3::new(-1.0, -1.0, -1.0));
        assert_eq!(c, Vec3::new(-0.9, -1.9, -2.9));
    }

    #[test]
    fn box_supporting_face_is_outward() {
        let b = BoxShape { half_extent: Vec3::ONE, convex_radius: 0.0, density: 1.0 };
        for dir in [Vec3::X, -Vec3::X, Vec3::Y, -Vec3::Y, Vec3::Z, -Vec3::Z] {
            let f = b.supporting_face(dir);
            let n = (f[1] - f[0]).cross(f[2] - f[0]);
            assert!(n.dot(dir) > 0.0, "face for {dir:?} is wound inward");
        }
    }

    #[test]
    fn capsule_ray_hits_cap() {
        let c = CapsuleShape { half_height: 1.0, radius: 0.5, density: 1.0 };
        let t = c.cast_ray(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, -10.0, 0.0), 1.0).unwrap();
        assert!((t - 0.35).abs() < 1e-5);
        let side = c.cast_ray(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(10.0, 0.0, 0.0), 1.0).unwrap();
        assert!((side - 0.45).abs() < 1e-5);
    }

    #[test]
    fn cylinder_ray_and_normal() {
        let c = CylinderShape { half_height: 1.0, radius: 1.0, convex_radius: 0.05, density: 1.0 };
        let t = c.cast_ray(Vec3::new(0.0, 3.0, 0.0), Vec3::new(0.0, -4.0, 0.0), 1.0).unwrap();
        assert!((t - 0.5).abs() < 1e-5);
        assert_eq!(c.surface_normal(Vec3::new(0.0, 1.0, 0.2)), Vec3::Y);
        assert!((c.surface_normal(Vec3::new(1.0, 0.0, 0.0)) - Vec3::X).length() < 1e-6);
    }

    #[test]
    fn sphere_ray_from_inside_hits_at_zero() {
        assert_eq!(ray_sphere(Vec3::ZERO, Vec3::X, Vec3::ZERO, 1.0, 1.0), Some(0.0));
        let t = ray_sphere(Vec3::new(-3.0, 0.0, 0.0), Vec3::new(4.0, 0.0, 0.0), Vec3::ZERO, 1.0, 1.0);
        assert!((t.unwrap() - 0.5).abs() < 1e-6);
    }
}
