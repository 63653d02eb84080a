//! Closed form contacts for sphere pairs and sphere-box pairs.
//!
//! All inputs live in the space of the pair; results follow the usual
//! convention of a normal pointing from `a` to `b`.

use glam::Vec3;

use super::LeafContact;
use crate::shapes::BoxShape;
use crate::types::Isometry;

/// Contact between two spheres, or `None` when they are further apart than
/// `max_separation`.
pub(crate) fn sphere_vs_sphere(
    center_a: Vec3,
    radius_a: f32,
    center_b: Vec3,
    radius_b: f32,
    max_separation: f32,
) -> Option<LeafContact> {
    let delta = center_b - center_a;
    let distance = delta.length();
    let separation = distance - radius_a - radius_b;
    if separation > max_separation {
        return None;
    }
    // Coincident centers have no preferred direction.
    let normal = if distance > 1.0e-6 { delta / distance } else { Vec3::Y };
    Some(LeafContact {
        normal,
        depth: -separation,
        point_a: center_a + normal * radius_a,
        point_b: center_b - normal * radius_b,
    })
}

/// Contact between a box `a` and a sphere `b`.
pub(crate) fn box_vs_sphere(
    cube: &BoxShape,
    box_transform: &Isometry,
    center: Vec3,
    radius: f32,
    max_separation: f32,
) -> Option<LeafContact> {
    let half = cube.half_extent;
    let local = box_transform.inverse_transform_point(center);
    let closest = local.clamp(-half, half);
    let delta = local - closest;
    let distance_sq = delta.length_squared();

    let (local_normal, surface, depth) = if distance_sq > 1.0e-12 {
        let distance = distance_sq.sqrt();
        let separation = distance - radius;
        if separation > max_separation {
            return None;
        }
        (delta / distance, closest, -separation)
    } else {
        // Center inside the box: push out through the nearest face.
        let gap = half - local.abs();
        let axis = if gap.x <= gap.y && gap.x <= gap.z {
            0
        } else if gap.y <= gap.z {
            1
        } else {
            2
        };
        let sign = if local[axis] >= 0.0 { 1.0 } else { -1.0 };
        let mut normal = Vec3::ZERO;
        normal[axis] = sign;
        let mut surface = local;
        surface[axis] = sign * half[axis];
        (normal, surface, gap[axis] + radius)
    };

    let normal = box_transform.transform_vector(local_normal);
    Some(LeafContact {
        normal,
        depth,
        point_a: box_transform.transform_point(surface),
        point_b: center - normal * radius,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn touching_spheres() {
        let c = sphere_vs_sphere(Vec3::ZERO, 1.0, Vec3::new(0.0, 1.9, 0.0), 1.0, 0.0).unwrap();
        assert!((c.depth - 0.1).abs() < 1e-6);
        assert_eq!(c.normal, Vec3::Y);
        assert!((c.point_a - Vec3::Y).length() < 1e-6);
        assert!((c.point_b - Vec3::new(0.0, 0.9, 0.0)).length() < 1e-6);
        assert!(sphere_vs_sphere(Vec3::ZERO, 1.0, Vec3::new(0.0, 2.1, 0.0), 1.0, 0.05).is_none());
        assert!(sphere_vs_sphere(Vec3::ZERO, 1.0, Vec3::new(0.0, 2.04, 0.0), 1.0, 0.05).is_some());
    }

    #[test]
    fn sphere_resting_on_rotated_box() {
        let cube = BoxShape {
            half_extent: Vec3::new(2.0, 0.5, 2.0),
            convex_radius: 0.05,
            density: 1.0,
        };
        let t = Isometry::new(Vec3::ZERO, Quat::from_rotation_y(0.3));
        let c = box_vs_sphere(&cube, &t, Vec3::new(0.2, 0.95, 0.1), 0.5, 0.0).unwrap();
        assert!((c.depth - 0.05).abs() < 1e-5);
        assert!((c.normal - Vec3::Y).length() < 1e-5);
        assert!((c.point_a.y - 0.5).abs() < 1e-5);
    }

    #[test]
    fn sphere_center_inside_box() {
        let cube = BoxShape {
            half_extent: Vec3::splat(1.0),
            convex_radius: 0.05,
            density: 1.0,
        };
        let c = box_vs_sphere(&cube, &Isometry::IDENTITY, Vec3::new(0.0, 0.0, 0.8), 0.25, 0.0).unwrap();
        assert_eq!(c.normal, Vec3::Z);
        assert!((c.depth - 0.45).abs() < 1e-5);
    }
}
